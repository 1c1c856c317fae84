#[macro_use]
extern crate diesel;

use crate::config::{Settings, StoreSettings};
use crate::error::Error;
use crate::filters::EventFilter;
use crate::models::SheetRow;
use crate::portal::Portal;
use crate::session::Session;
use crate::slots::Slot;
use crate::store::{RetryingStore, SheetsStore, SqliteStore, StoreError, TabularStore};
use crate::users::{NewUser, UserChanges};
use crate::views::{EventCard, FilterForm, RosterView, UserView};
use chrono::{Local, NaiveDate};
use clap::{App, Arg, ArgMatches};
use futures::{Future, Stream};
use gotham::handler::{HandlerError, HandlerFuture};
use gotham::helpers::http::response::{create_empty_response, create_response};
use gotham::middleware::session::{NewSessionMiddleware, SessionData};
use gotham::middleware::{Middleware, NewMiddleware};
use gotham::pipeline::new_pipeline;
use gotham::pipeline::single::single_pipeline;
use gotham::router::{builder::*, Router};
use gotham::state::{FromState, State};
use gotham_derive::{StateData, StaticResponseExtender};
use hyper::{Body, Response, StatusCode};
use log::{error, info};
use serde::de::DeserializeOwned;
use serde_derive::Deserialize;
use std::sync::Arc;

mod catalog;
mod config;
mod error;
mod filters;
mod levels;
mod models;
mod portal;
mod retry;
mod schema;
mod session;
mod slots;
mod store;
mod users;
mod views;
mod visibility;

include!(concat!(env!("OUT_DIR"), "/templates.rs"));

fn main() {
    let matches = App::new("volunteer-portal")
        .about("Volunteer scheduling portal backed by a spreadsheet")
        .arg(
            Arg::with_name("settings")
                .long("settings")
                .takes_value(true)
                .default_value("settings")
                .help("Settings file, with or without extension"),
        )
        .arg(
            Arg::with_name("port")
                .long("port")
                .takes_value(true)
                .help("Overrides the configured port"),
        )
        .get_matches();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(err) = run(&matches) {
        error!("{}", err);
        std::process::exit(1);
    }
}

fn run(matches: &ArgMatches) -> Result<(), Box<dyn std::error::Error>> {
    let mut settings = Settings::load(matches.value_of("settings").unwrap_or("settings"))?;
    if let Some(port) = matches.value_of("port") {
        settings.port = port.parse()?;
    }
    let portal = Arc::new(Portal::new(open_store(&settings)?, &settings));
    let addr = format!("{}:{}", settings.host, settings.port);
    info!("{} listening on http://{}", settings.portal_title, addr);
    gotham::start(addr, router(portal, &settings));
    Ok(())
}

fn open_store(settings: &Settings) -> Result<Box<dyn TabularStore>, StoreError> {
    let policy = settings.retry_policy();
    let store: Box<dyn TabularStore> = match &settings.store {
        StoreSettings::Sheets {
            spreadsheet_id,
            access_token,
            api_base,
        } => Box::new(RetryingStore::new(
            SheetsStore::new(api_base, spreadsheet_id, access_token)?,
            policy,
        )),
        StoreSettings::Sqlite { db_path } => Box::new(RetryingStore::new(
            SqliteStore::open(&format!("{}", db_path.display()))?,
            policy,
        )),
    };
    Ok(store)
}

fn router(portal: Arc<Portal>, settings: &Settings) -> Router {
    let sessions = NewSessionMiddleware::default().with_session_type::<Option<Session>>();
    let sessions = if settings.insecure_cookies {
        sessions.insecure()
    } else {
        sessions
    };
    let context = PortalMiddleware {
        portal,
        title: Arc::new(settings.portal_title.clone()),
    };
    let (chain, pipelines) = single_pipeline(new_pipeline().add(sessions).add(context).build());

    build_router(chain, pipelines, |route| {
        route.get("/").to(serve_login);
        route.post("/login").to(login_with_level);
        route.post("/login/email").to(login_with_email);
        route.post("/login/director").to(login_director);
        route.post("/logout").to(logout);

        route
            .get("/events")
            .with_query_string_extractor::<EventsQuery>()
            .to(serve_events);
        route.post("/claim").to(claim);

        route.get("/register").to(serve_register);
        route.post("/register").to(register);

        route
            .get("/admin")
            .with_query_string_extractor::<AdminQuery>()
            .to(serve_admin);
        route
            .get("/admin/assign")
            .with_query_string_extractor::<AssignQuery>()
            .to(serve_assign);
        route.post("/admin/assign").to(assign);
        route.post("/admin/release").to(release);
        route.get("/admin/users").to(serve_users);
        route.post("/admin/users").to(create_user);
        route.post("/admin/users/edit").to(edit_user);

        route
            .get("/roster")
            .with_query_string_extractor::<RosterQuery>()
            .to(serve_roster);

        route.get("/style.css").to(serve_stylesheet);
    })
}

/// Per-request handle on the portal and its title.
#[derive(Clone, StateData)]
struct PortalContext {
    portal: Arc<Portal>,
    title: Arc<String>,
}

#[derive(Clone)]
struct PortalMiddleware {
    portal: Arc<Portal>,
    title: Arc<String>,
}

impl std::panic::RefUnwindSafe for PortalMiddleware {}

impl NewMiddleware for PortalMiddleware {
    type Instance = PortalMiddleware;

    fn new_middleware(&self) -> std::io::Result<Self::Instance> {
        Ok(self.clone())
    }
}

impl Middleware for PortalMiddleware {
    fn call<Chain>(self, mut state: State, chain: Chain) -> Box<HandlerFuture>
    where
        Chain: FnOnce(State) -> Box<HandlerFuture>,
    {
        state.put(PortalContext {
            portal: self.portal,
            title: self.title,
        });
        chain(state)
    }
}

fn current_session(state: &State) -> Result<Session, Error> {
    let session: &Option<Session> = SessionData::<Option<Session>>::borrow_from(state);
    session.clone().ok_or(Error::NotLoggedIn)
}

fn set_session(state: &mut State, session: Option<Session>) {
    **SessionData::<Option<Session>>::borrow_mut_from(state) = session;
}

fn render<F>(write: F) -> Result<Vec<u8>, Error>
where
    F: FnOnce(&mut Vec<u8>) -> std::io::Result<()>,
{
    let mut buf = Vec::new();
    write(&mut buf).map_err(|err| Error::Inner(Box::new(err)))?;
    Ok(buf)
}

fn respond(state: State, page: Result<Vec<u8>, Error>) -> (State, Response<Body>) {
    let response = match page {
        Ok(body) => create_response(&state, StatusCode::OK, mime::TEXT_HTML_UTF_8, body),
        Err(err) => err.as_response(&state),
    };
    (state, response)
}

/// Collects the request body, hands it to `handle` and redirects to the
/// location it returns.
fn with_form<F>(mut state: State, handle: F) -> Box<HandlerFuture>
where
    F: FnOnce(&mut State, bytes::Bytes) -> Result<String, Error> + Send + 'static,
{
    let f = Body::take_from(&mut state).concat2().then(move |body| {
        let mut state = state;
        let response = match body {
            Ok(body) => match handle(&mut state, body.into_bytes()) {
                Ok(location) => redirect(&state, &location),
                Err(err) => err.as_response(&state),
            },
            Err(err) => Error::Inner(Box::new(err)).as_response(&state),
        };
        Ok::<_, (State, HandlerError)>((state, response))
    });
    Box::new(f)
}

fn parse_form<T: DeserializeOwned>(body: &[u8]) -> Result<T, Error> {
    serde_urlencoded::from_bytes::<T>(body)
        .map_err(|err| Error::Validation(format!("Unreadable form: {}", err)))
}

fn parse_day(value: &str) -> Result<Option<NaiveDate>, Error> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    catalog::parse_date(value)
        .map(Some)
        .ok_or_else(|| Error::Validation(format!("Not a date: {}", value)))
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_ref()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn serve_login(state: State) -> (State, Response<Body>) {
    let context = PortalContext::borrow_from(&state).clone();
    let levels = views::level_options("");
    let page = render(|buf| templates::login(buf, &context.title, &levels));
    respond(state, page)
}

#[derive(Deserialize)]
struct LevelLogin {
    #[serde(default)]
    name: String,
    #[serde(default)]
    level: String,
}

#[derive(Deserialize)]
struct EmailLogin {
    #[serde(default)]
    email: String,
}

fn login_with_level(state: State) -> Box<HandlerFuture> {
    with_form(state, |state, body| {
        let form: LevelLogin = parse_form(&body)?;
        let context = PortalContext::borrow_from(state).clone();
        let session = context.portal.login_with_level(&form.name, &form.level)?;
        set_session(state, Some(session));
        Ok("/events".to_owned())
    })
}

fn login_with_email(state: State) -> Box<HandlerFuture> {
    with_form(state, |state, body| {
        let form: EmailLogin = parse_form(&body)?;
        if form.email.trim().is_empty() {
            return Err(Error::MissingFieldError(vec!["email".to_owned()]));
        }
        let context = PortalContext::borrow_from(state).clone();
        let session = context.portal.login_with_email(&form.email)?;
        set_session(state, Some(session));
        Ok("/events".to_owned())
    })
}

fn login_director(state: State) -> Box<HandlerFuture> {
    with_form(state, |state, body| {
        let form: EmailLogin = parse_form(&body)?;
        if form.email.trim().is_empty() {
            return Err(Error::MissingFieldError(vec!["email".to_owned()]));
        }
        let context = PortalContext::borrow_from(state).clone();
        let session = context.portal.login_director(&form.email)?;
        set_session(state, Some(session));
        Ok("/admin".to_owned())
    })
}

fn logout(state: State) -> Box<HandlerFuture> {
    with_form(state, |state, _| {
        set_session(state, None);
        Ok("/".to_owned())
    })
}

#[derive(Deserialize, StateData, StaticResponseExtender)]
struct EventsQuery {
    from: Option<String>,
    department: Option<String>,
    level: Option<String>,
    q: Option<String>,
}

impl EventsQuery {
    /// The date floor defaults to today; an empty `from` lifts it.
    fn filter(&self) -> Result<EventFilter, Error> {
        let from = match &self.from {
            Some(from) => parse_day(from)?,
            None => Some(today()),
        };
        Ok(EventFilter {
            from,
            department: non_empty(&self.department),
            level: non_empty(&self.level),
            text: non_empty(&self.q),
        })
    }

    fn form(&self, filter: &EventFilter) -> FilterForm {
        FilterForm {
            from: filter
                .from
                .map(|from| from.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            department: non_empty(&self.department).unwrap_or_default(),
            level: non_empty(&self.level).unwrap_or_default(),
            text: non_empty(&self.q).unwrap_or_default(),
        }
    }
}

fn serve_events(state: State) -> (State, Response<Body>) {
    let page = render_events(&state);
    respond(state, page)
}

fn render_events(state: &State) -> Result<Vec<u8>, Error> {
    let context = PortalContext::borrow_from(state);
    let session = current_session(state)?;
    let viewer = session.viewer()?;
    let query = EventsQuery::borrow_from(state);
    let filter = query.filter()?;
    let form = query.form(&filter);

    let cards = EventCard::from_records(&context.portal.events_for(viewer, &filter)?);
    let departments =
        views::department_options(&context.portal.departments_for(viewer)?, &form.department);
    let levels = views::level_options(&form.level);
    render(|buf| {
        templates::events(
            buf,
            &context.title,
            session.display_name(),
            &viewer.level_code,
            &cards,
            &departments,
            &levels,
            &form,
        )
    })
}

#[derive(Deserialize)]
struct ClaimForm {
    row: usize,
}

fn claim(state: State) -> Box<HandlerFuture> {
    with_form(state, |state, body| {
        let session = current_session(state)?;
        let viewer = session.viewer()?;
        let form: ClaimForm = parse_form(&body)?;
        let context = PortalContext::borrow_from(state);
        context.portal.claim(viewer, SheetRow(form.row))?;
        Ok("/events".to_owned())
    })
}

fn serve_register(state: State) -> (State, Response<Body>) {
    let page = render_register(&state);
    respond(state, page)
}

fn render_register(state: &State) -> Result<Vec<u8>, Error> {
    let context = PortalContext::borrow_from(state);
    let snapshot = context.portal.snapshot()?;
    let departments = filters::departments(&snapshot.events).join(", ");
    let levels = views::level_options("");
    render(|buf| templates::register(buf, &context.title, &levels, &departments))
}

fn register(state: State) -> Box<HandlerFuture> {
    with_form(state, |state, body| {
        let user: NewUser = parse_form(&body)?;
        let email = user.email.clone();
        let context = PortalContext::borrow_from(state).clone();
        context.portal.register(user)?;
        let session = context.portal.login_with_email(&email)?;
        set_session(state, Some(session));
        Ok("/events".to_owned())
    })
}

#[derive(Deserialize, StateData, StaticResponseExtender)]
struct AdminQuery {
    from: Option<String>,
}

fn serve_admin(state: State) -> (State, Response<Body>) {
    let page = render_admin(&state);
    respond(state, page)
}

fn render_admin(state: &State) -> Result<Vec<u8>, Error> {
    let context = PortalContext::borrow_from(state);
    let director = current_session(state)?.director()?;
    let from = match &AdminQuery::borrow_from(state).from {
        Some(from) => parse_day(from)?,
        None => Some(today()),
    };
    let cards = EventCard::from_records(&context.portal.schedule_for(&director, from)?);
    let issues = context.portal.load_issues()?;
    let from = from
        .map(|from| from.format("%Y-%m-%d").to_string())
        .unwrap_or_default();
    render(|buf| {
        templates::admin(
            buf,
            &context.title,
            &director.department,
            &cards,
            &from,
            &issues,
        )
    })
}

#[derive(Deserialize, StateData, StaticResponseExtender)]
struct AssignQuery {
    row: usize,
    slot: u8,
}

fn slot_number(number: u8) -> Result<Slot, Error> {
    Slot::from_number(number).ok_or_else(|| Error::Validation(format!("No slot {}", number)))
}

fn serve_assign(state: State) -> (State, Response<Body>) {
    let page = render_assign(&state);
    respond(state, page)
}

fn render_assign(state: &State) -> Result<Vec<u8>, Error> {
    let context = PortalContext::borrow_from(state);
    let director = current_session(state)?.director()?;
    let query = AssignQuery::borrow_from(state);
    let slot = slot_number(query.slot)?;
    let (record, eligible) = context.portal.eligible_for(&director, SheetRow(query.row))?;
    let card = EventCard::from_record(&record);
    let candidates: Vec<UserView> = eligible.iter().map(UserView::from_record).collect();
    render(|buf| templates::admin_assign(buf, &context.title, &card, slot.number(), &candidates))
}

#[derive(Deserialize)]
struct AssignForm {
    row: usize,
    slot: u8,
    #[serde(default)]
    email: String,
}

fn assign(state: State) -> Box<HandlerFuture> {
    with_form(state, |state, body| {
        let director = current_session(state)?.director()?;
        let form: AssignForm = parse_form(&body)?;
        if form.email.trim().is_empty() {
            return Err(Error::MissingFieldError(vec!["email".to_owned()]));
        }
        let context = PortalContext::borrow_from(state);
        context.portal.assign(
            &director,
            SheetRow(form.row),
            slot_number(form.slot)?,
            &form.email,
        )?;
        Ok("/admin".to_owned())
    })
}

#[derive(Deserialize)]
struct SlotForm {
    row: usize,
    slot: u8,
}

fn release(state: State) -> Box<HandlerFuture> {
    with_form(state, |state, body| {
        let director = current_session(state)?.director()?;
        let form: SlotForm = parse_form(&body)?;
        let context = PortalContext::borrow_from(state);
        context
            .portal
            .release(&director, SheetRow(form.row), slot_number(form.slot)?)?;
        Ok("/admin".to_owned())
    })
}

fn serve_users(state: State) -> (State, Response<Body>) {
    let page = render_users(&state);
    respond(state, page)
}

fn render_users(state: &State) -> Result<Vec<u8>, Error> {
    let context = PortalContext::borrow_from(state);
    let director = current_session(state)?.director()?;
    let users: Vec<UserView> = context
        .portal
        .users_of(&director)?
        .iter()
        .map(UserView::from_record)
        .collect();
    let levels = views::level_options("");
    render(|buf| {
        templates::admin_users(buf, &context.title, &director.department, &users, &levels)
    })
}

fn create_user(state: State) -> Box<HandlerFuture> {
    with_form(state, |state, body| {
        let director = current_session(state)?.director()?;
        let user: NewUser = parse_form(&body)?;
        let context = PortalContext::borrow_from(state);
        context.portal.create_user(&director, user)?;
        Ok("/admin/users".to_owned())
    })
}

fn edit_user(state: State) -> Box<HandlerFuture> {
    with_form(state, |state, body| {
        let director = current_session(state)?.director()?;
        let changes: UserChanges = parse_form(&body)?;
        let context = PortalContext::borrow_from(state);
        context.portal.update_user(&director, &changes)?;
        Ok("/admin/users".to_owned())
    })
}

#[derive(Deserialize, StateData, StaticResponseExtender)]
struct RosterQuery {
    date: Option<String>,
}

fn serve_roster(state: State) -> (State, Response<Body>) {
    let page = render_roster(&state);
    respond(state, page)
}

fn render_roster(state: &State) -> Result<Vec<u8>, Error> {
    let context = PortalContext::borrow_from(state);
    let date = match &RosterQuery::borrow_from(state).date {
        Some(date) => parse_day(date)?.unwrap_or_else(today),
        None => today(),
    };
    let groups = RosterView::from_groups(&context.portal.duty_roster(date)?);
    let day = format!("{} {}", models::weekday_name(date), date.format("%d/%m/%Y"));
    let value = date.format("%Y-%m-%d").to_string();
    render(|buf| templates::roster(buf, &context.title, &day, &value, &groups))
}

fn serve_stylesheet(state: State) -> (State, Response<Body>) {
    let response = create_response(
        &state,
        StatusCode::OK,
        mime::TEXT_CSS,
        templates::statics::style_css.content,
    );
    (state, response)
}

pub fn redirect(state: &State, to: &str) -> Response<Body> {
    let mut response = create_empty_response(state, StatusCode::SEE_OTHER);
    match hyper::header::HeaderValue::from_str(to) {
        Ok(location) => {
            response
                .headers_mut()
                .insert(hyper::header::LOCATION, location);
        }
        Err(err) => error!("cannot redirect to {:?}: {}", to, err),
    }
    response
}
