use crate::store::StoreError;
use crate::templates;

use gotham::helpers::http::response::create_response;
use gotham::state::State;
use hyper::StatusCode;
use log::{error, warn};

#[derive(Debug)]
pub enum Error {
    StoreUnavailable(StoreError),
    ScheduleConflict {
        event_name: String,
        date: String,
        time: String,
    },
    SlotAlreadyFilled {
        event_name: String,
        volunteer: String,
    },
    MissingFieldError(Vec<String>),
    Validation(String),
    UnknownEvent(usize),
    UserExists(String),
    UnknownUser(String),
    NotLoggedIn,
    AccessDenied,
    Inner(Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    pub fn as_response(&self, state: &State) -> http::Response<hyper::Body> {
        if let Error::NotLoggedIn = self {
            return crate::redirect(state, "/");
        }
        match self {
            Error::StoreUnavailable(..) | Error::Inner(..) => error!("{:?}", self),
            _ => warn!("{}", self),
        }
        let mut buf = Vec::new();
        match templates::notice(&mut buf, self.title(), &self.to_string()) {
            Ok(()) => create_response(state, self.status_code(), mime::TEXT_HTML_UTF_8, buf),
            Err(..) => create_response(
                state,
                self.status_code(),
                mime::TEXT_PLAIN_UTF_8,
                format!("Error: {}", self),
            ),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        use Error::*;
        match self {
            ScheduleConflict { .. } | SlotAlreadyFilled { .. } | UserExists(..) => {
                StatusCode::CONFLICT
            }
            MissingFieldError(..) | Validation(..) => StatusCode::BAD_REQUEST,
            UnknownEvent(..) | UnknownUser(..) => StatusCode::NOT_FOUND,
            NotLoggedIn => StatusCode::SEE_OTHER,
            AccessDenied => StatusCode::FORBIDDEN,
            StoreUnavailable(..) => StatusCode::SERVICE_UNAVAILABLE,
            Inner(..) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn title(&self) -> &'static str {
        use Error::*;
        match self {
            ScheduleConflict { .. } => "Scheduling conflict",
            SlotAlreadyFilled { .. } => "Slot already taken",
            MissingFieldError(..) | Validation(..) => "Check the form",
            UserExists(..) => "Already registered",
            UnknownEvent(..) | UnknownUser(..) => "Not found",
            NotLoggedIn | AccessDenied => "Access denied",
            StoreUnavailable(..) | Inner(..) => "Something went wrong",
        }
    }
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        use Error::*;
        match self {
            StoreUnavailable(..) => write!(
                f,
                "The schedule could not be loaded right now. Please try again in a moment."
            ),
            ScheduleConflict {
                event_name,
                date,
                time,
            } => write!(
                f,
                "Already scheduled for {} on {} at {}",
                event_name, date, time
            ),
            SlotAlreadyFilled {
                event_name,
                volunteer,
            } => write!(
                f,
                "{} was just taken by {}; reload to see the current schedule",
                event_name, volunteer
            ),
            MissingFieldError(fields) => write!(
                f,
                "Missing field{}: {}",
                if fields.len() == 1 { "" } else { "s" },
                fields.join(", ")
            ),
            Validation(message) => write!(f, "{}", message),
            UnknownEvent(row) => write!(f, "Event not found: row {}", row),
            UserExists(email) => write!(f, "{} is already registered", email),
            UnknownUser(email) => write!(f, "No volunteer registered as {}", email),
            NotLoggedIn => write!(f, "Not logged in"),
            AccessDenied => write!(f, "Access denied"),
            Inner(..) => write!(f, "Unexpected error"),
        }
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        Error::StoreUnavailable(err)
    }
}
