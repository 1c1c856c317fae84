//! The operations behind the HTTP layer: everything a volunteer or a
//! director can do, checked against the cached catalog and written through
//! to the tabular store.

use crate::catalog::{CatalogCache, RowIssue, Snapshot};
use crate::config::{EventColumns, Settings, SlotColumns, TableNames};
use crate::error::Error;
use crate::filters::{self, EventFilter, RosterGroup};
use crate::models::{Director, EventRecord, SheetRow, UserRecord, Viewer};
use crate::session::{self, Session};
use crate::slots::{determine_open_slot, Slot, SlotTarget};
use crate::store::TabularStore;
use crate::users::{self, NewUser, UserChanges};
use crate::visibility::visible_to;

use chrono::NaiveDate;
use log::info;
use std::sync::Arc;

pub struct Portal {
    store: Box<dyn TabularStore>,
    cache: CatalogCache,
    tables: TableNames,
    columns: EventColumns,
    slots: SlotColumns,
    check_conflicts: bool,
}

impl Portal {
    pub fn new(store: Box<dyn TabularStore>, settings: &Settings) -> Portal {
        Portal {
            store,
            cache: CatalogCache::new(settings.cache_ttl()),
            tables: settings.tables.clone(),
            columns: settings.columns.clone(),
            slots: settings.slots,
            check_conflicts: settings.check_conflicts,
        }
    }

    pub fn snapshot(&self) -> Result<Arc<Snapshot>, Error> {
        let snapshot = self.cache.get_or_load(|| {
            Snapshot::load(self.store.as_ref(), &self.tables, &self.columns)
        })?;
        Ok(snapshot)
    }

    fn target(&self) -> SlotTarget<'_> {
        SlotTarget {
            store: self.store.as_ref(),
            table: &self.tables.events,
            columns: &self.columns,
            slots: &self.slots,
        }
    }

    fn event(snapshot: &Snapshot, row: SheetRow) -> Result<&EventRecord, Error> {
        snapshot.event(row).ok_or(Error::UnknownEvent(row.0))
    }

    fn departmental_event<'a>(
        snapshot: &'a Snapshot,
        director: &Director,
        row: SheetRow,
    ) -> Result<&'a EventRecord, Error> {
        let record = Self::event(snapshot, row)?;
        if record.department != director.department {
            return Err(Error::AccessDenied);
        }
        Ok(record)
    }

    pub fn login_with_level(&self, name: &str, level_code: &str) -> Result<Session, Error> {
        let viewer = session::viewer_from_level(name, level_code)?;
        info!("{} logged in at level {}", viewer.display_name, viewer.level_code);
        Ok(Session::Volunteer(viewer))
    }

    pub fn login_with_email(&self, email: &str) -> Result<Session, Error> {
        let snapshot = self.snapshot()?;
        let user = snapshot
            .user_by_email(email)
            .ok_or_else(|| Error::UnknownUser(email.trim().to_lowercase()))?;
        info!("{} logged in", user.email);
        Ok(Session::Volunteer(user.as_viewer()))
    }

    pub fn login_director(&self, email: &str) -> Result<Session, Error> {
        let snapshot = self.snapshot()?;
        let director = snapshot.director(email).ok_or(Error::AccessDenied)?;
        info!("director {} of {} logged in", director.email, director.department);
        Ok(Session::from(director.clone()))
    }

    /// Records the viewer may see, narrowed by `filter`, in schedule order.
    pub fn events_for(
        &self,
        viewer: &Viewer,
        filter: &EventFilter,
    ) -> Result<Vec<EventRecord>, Error> {
        let snapshot = self.snapshot()?;
        let visible = snapshot
            .events
            .iter()
            .filter(|record| visible_to(record, viewer));
        Ok(filter.apply(visible).into_iter().cloned().collect())
    }

    /// Departments that appear among the viewer's visible records.
    pub fn departments_for(&self, viewer: &Viewer) -> Result<Vec<String>, Error> {
        let snapshot = self.snapshot()?;
        Ok(filters::departments(
            snapshot
                .events
                .iter()
                .filter(|record| visible_to(record, viewer)),
        ))
    }

    /// Puts the viewer into the first open slot of `row`.
    pub fn claim(&self, viewer: &Viewer, row: SheetRow) -> Result<Slot, Error> {
        let mut snapshot = self.snapshot()?;
        let cached_full = snapshot
            .event(row)
            .map_or(false, |record| determine_open_slot(record).is_none());
        if cached_full {
            // A slot may have been freed since the snapshot was taken.
            self.cache.invalidate();
            snapshot = self.snapshot()?;
        }
        let record = Self::event(&snapshot, row)?;
        if !visible_to(record, viewer) {
            return Err(Error::AccessDenied);
        }
        let slot = determine_open_slot(record).ok_or_else(|| Error::SlotAlreadyFilled {
            event_name: record.event_name.clone(),
            volunteer: record.volunteer_2.clone(),
        })?;
        let result = self
            .target()
            .claim(record, slot, &viewer.display_name, self.check_conflicts);
        // A refused claim means the cached view was stale too.
        self.cache.invalidate();
        result.map(|()| slot)
    }

    /// Event rows the last load rejected or could not rank.
    pub fn load_issues(&self) -> Result<Vec<RowIssue>, Error> {
        let snapshot = self.snapshot()?;
        Ok(snapshot.report.issues().cloned().collect())
    }

    /// The director's department schedule from `from` on.
    pub fn schedule_for(
        &self,
        director: &Director,
        from: Option<NaiveDate>,
    ) -> Result<Vec<EventRecord>, Error> {
        let filter = EventFilter {
            from,
            department: Some(director.department.clone()),
            ..EventFilter::default()
        };
        let snapshot = self.snapshot()?;
        Ok(filter.apply(&snapshot.events).into_iter().cloned().collect())
    }

    /// The event at `row` together with the users who could fill its slots.
    pub fn eligible_for(
        &self,
        director: &Director,
        row: SheetRow,
    ) -> Result<(EventRecord, Vec<UserRecord>), Error> {
        let snapshot = self.snapshot()?;
        let record = Self::departmental_event(&snapshot, director, row)?;
        let eligible = users::eligible_volunteers(&snapshot.users, &snapshot.events, record)
            .into_iter()
            .cloned()
            .collect();
        Ok((record.clone(), eligible))
    }

    pub fn assign(
        &self,
        director: &Director,
        row: SheetRow,
        slot: Slot,
        user_email: &str,
    ) -> Result<(), Error> {
        let snapshot = self.snapshot()?;
        let record = Self::departmental_event(&snapshot, director, row)?;
        let user = snapshot
            .user_by_email(user_email)
            .ok_or_else(|| Error::UnknownUser(user_email.trim().to_lowercase()))?;
        let eligible = users::eligible_volunteers(&snapshot.users, &snapshot.events, record);
        if !eligible.iter().any(|candidate| candidate.email == user.email) {
            return Err(Error::Validation(format!(
                "{} cannot take {} on {} at {}",
                user.name,
                record.event_name,
                record.formatted_date(),
                record.time
            )));
        }
        let result = self
            .target()
            .claim(record, slot, &user.name, self.check_conflicts);
        self.cache.invalidate();
        result?;
        info!("{} assigned {} to {}", director.email, user.name, record.event_name);
        Ok(())
    }

    pub fn release(&self, director: &Director, row: SheetRow, slot: Slot) -> Result<(), Error> {
        let snapshot = self.snapshot()?;
        let record = Self::departmental_event(&snapshot, director, row)?;
        self.target().release(record, slot)?;
        self.cache.invalidate();
        Ok(())
    }

    /// Volunteer self-registration.
    pub fn register(&self, user: NewUser) -> Result<(), Error> {
        let snapshot = self.snapshot()?;
        users::register(self.store.as_ref(), &self.tables.users, &snapshot, user)?;
        self.cache.invalidate();
        Ok(())
    }

    /// A director adds a user to their own department.
    pub fn create_user(&self, director: &Director, mut user: NewUser) -> Result<(), Error> {
        user.departments = vec![director.department.clone()];
        self.register(user)
    }

    pub fn update_user(&self, director: &Director, changes: &UserChanges) -> Result<(), Error> {
        let snapshot = self.snapshot()?;
        let user = snapshot
            .user_by_email(&changes.email)
            .ok_or_else(|| Error::UnknownUser(changes.email.trim().to_lowercase()))?;
        if !user.in_department(&director.department) {
            return Err(Error::AccessDenied);
        }
        users::update_user(
            self.store.as_ref(),
            &self.tables.users,
            user,
            changes,
            &user.departments,
        )?;
        self.cache.invalidate();
        Ok(())
    }

    /// Users of the director's department, by name.
    pub fn users_of(&self, director: &Director) -> Result<Vec<UserRecord>, Error> {
        let snapshot = self.snapshot()?;
        let mut members: Vec<UserRecord> = snapshot
            .users
            .iter()
            .filter(|user| user.in_department(&director.department))
            .cloned()
            .collect();
        members.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(members)
    }

    pub fn duty_roster(&self, date: NaiveDate) -> Result<Vec<RosterGroup>, Error> {
        let snapshot = self.snapshot()?;
        Ok(filters::duty_roster(&snapshot.events, date))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::StoreSettings;
    use crate::slots::tests::{event_header, event_values, EVENTS};
    use crate::store::tests::{strings, RecordingStore};
    use crate::store::SqliteStore;
    use std::path::PathBuf;
    use std::time::Duration;

    pub(crate) fn settings() -> Settings {
        Settings {
            host: "127.0.0.1".to_owned(),
            port: 7878,
            insecure_cookies: true,
            portal_title: "Portal".to_owned(),
            store: StoreSettings::Sqlite {
                db_path: PathBuf::from(":memory:"),
            },
            tables: TableNames::default(),
            columns: EventColumns::default(),
            slots: SlotColumns::default(),
            cache_ttl_secs: 600,
            retry_attempts: 1,
            retry_backoff_ms: 0,
            check_conflicts: true,
        }
    }

    pub(crate) fn seeded() -> Arc<RecordingStore<SqliteStore>> {
        let store = SqliteStore::in_memory().unwrap();
        store.append_row(EVENTS, &event_header()).unwrap();
        for row in &[
            event_values("Culto", "Som", "AV1", "24/10/2026", "09:00", "Maria", ""),
            event_values("Recepção", "Acolhimento", "BAS", "24/10/2026", "09:00", "", ""),
            event_values("Ensaio", "Som", "AV3", "25/10/2026", "19:30", "", ""),
            event_values("Limpeza", "Acolhimento", "BAS", "10/10/2026", "08:00", "", ""),
        ] {
            store.append_row(EVENTS, row).unwrap();
        }
        store
            .append_row(
                "Usuarios",
                &strings(&["Email", "Nome", "Telefone", "Departamentos", "Nivel"]),
            )
            .unwrap();
        store
            .append_row(
                "Usuarios",
                &strings(&["ana@example.org", "Ana", "555", "Som", "AV2"]),
            )
            .unwrap();
        store
            .append_row(
                "Usuarios",
                &strings(&["bia@example.org", "Bia", "556", "Acolhimento", "BAS"]),
            )
            .unwrap();
        store
            .append_row("Diretores", &strings(&["Email", "Departamento"]))
            .unwrap();
        store
            .append_row("Diretores", &strings(&["dir@example.org", "Som"]))
            .unwrap();
        Arc::new(RecordingStore::new(store))
    }

    fn portal(store: &Arc<RecordingStore<SqliteStore>>) -> Portal {
        Portal::new(Box::new(store.clone()), &settings())
    }

    fn director() -> Director {
        Director {
            email: "dir@example.org".to_owned(),
            department: "Som".to_owned(),
        }
    }

    fn names(records: &[EventRecord]) -> Vec<&str> {
        records
            .iter()
            .map(|record| record.event_name.as_str())
            .collect()
    }

    #[test]
    fn registered_volunteer_sees_own_departments() {
        let store = seeded();
        let portal = portal(&store);
        let session = portal.login_with_email("ANA@example.org").unwrap();
        let viewer = session.viewer().unwrap();
        let events = portal.events_for(viewer, &EventFilter::default()).unwrap();
        assert_eq!(names(&events), vec!["Culto"]);
        assert_eq!(portal.departments_for(viewer).unwrap(), vec!["Som"]);
    }

    #[test]
    fn open_scheduling_sees_every_department() {
        let store = seeded();
        let portal = portal(&store);
        let session = portal.login_with_level("Carlos", "AV1").unwrap();
        let filter = EventFilter {
            from: NaiveDate::from_ymd_opt(2026, 10, 19),
            ..EventFilter::default()
        };
        let events = portal.events_for(session.viewer().unwrap(), &filter).unwrap();
        assert_eq!(names(&events), vec!["Culto", "Recepção"]);
    }

    #[test]
    fn claim_writes_and_invalidates_cache() {
        let store = seeded();
        let portal = portal(&store);
        let viewer = session::viewer_from_level("Carlos", "AV1").unwrap();
        assert_eq!(portal.claim(&viewer, SheetRow(0)).unwrap(), Slot::Two);
        assert_eq!(
            *store.writes.lock().unwrap(),
            vec![(EVENTS.to_owned(), 2, 9, "Carlos".to_owned())]
        );
        let snapshot = portal.snapshot().unwrap();
        assert_eq!(snapshot.events[0].volunteer_2, "Carlos");

        match portal.claim(&viewer, SheetRow(1)) {
            Err(Error::ScheduleConflict { event_name, .. }) => assert_eq!(event_name, "Culto"),
            other => panic!("unexpected {:?}", other),
        }
        match portal.claim(&viewer, SheetRow(0)) {
            Err(Error::SlotAlreadyFilled { .. }) => (),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(store.write_count(), 1);
    }

    #[test]
    fn claim_respects_visibility() {
        let store = seeded();
        let portal = portal(&store);
        let viewer = session::viewer_from_level("Carlos", "AV1").unwrap();
        match portal.claim(&viewer, SheetRow(2)) {
            Err(Error::AccessDenied) => (),
            other => panic!("unexpected {:?}", other),
        }
        match portal.claim(&viewer, SheetRow(40)) {
            Err(Error::UnknownEvent(40)) => (),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(store.write_count(), 0);
    }

    #[test]
    fn stale_cache_is_refreshed_after_refused_claim() {
        let store = seeded();
        let portal = portal(&store);
        let viewer = session::viewer_from_level("Carlos", "BAS").unwrap();
        portal.snapshot().unwrap();
        store.inner.write_cell(EVENTS, 3, 8, "Joao").unwrap();
        store.inner.write_cell(EVENTS, 3, 9, "Lia").unwrap();
        match portal.claim(&viewer, SheetRow(1)) {
            Err(Error::SlotAlreadyFilled { volunteer, .. }) => assert_eq!(volunteer, "Joao"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(portal.snapshot().unwrap().events[1].volunteer_2, "Lia");
    }

    #[test]
    fn claim_rereads_row_that_looked_full() {
        let store = seeded();
        store.inner.write_cell(EVENTS, 2, 9, "Joao").unwrap();
        let portal = portal(&store);
        let viewer = session::viewer_from_level("Carlos", "AV1").unwrap();
        assert_eq!(portal.snapshot().unwrap().events[0].volunteer_2, "Joao");

        store.inner.write_cell(EVENTS, 2, 9, "").unwrap();
        assert_eq!(portal.claim(&viewer, SheetRow(0)).unwrap(), Slot::Two);
        assert_eq!(
            *store.writes.lock().unwrap(),
            vec![(EVENTS.to_owned(), 2, 9, "Carlos".to_owned())]
        );
    }

    #[test]
    fn director_login_is_case_insensitive() {
        let store = seeded();
        let portal = portal(&store);
        let session = portal.login_director(" DIR@example.org ").unwrap();
        assert_eq!(session.director().unwrap(), director());
        match portal.login_director("ana@example.org") {
            Err(Error::AccessDenied) => (),
            other => panic!("unexpected {:?}", other),
        }
        match portal.login_with_email("nobody@example.org") {
            Err(Error::UnknownUser(..)) => (),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn director_works_only_in_own_department() {
        let store = seeded();
        let portal = portal(&store);
        let director = director();
        let schedule = portal
            .schedule_for(&director, NaiveDate::from_ymd_opt(2026, 10, 1))
            .unwrap();
        assert_eq!(names(&schedule), vec!["Culto", "Ensaio"]);
        match portal.release(&director, SheetRow(1), Slot::One) {
            Err(Error::AccessDenied) => (),
            other => panic!("unexpected {:?}", other),
        }
        portal.release(&director, SheetRow(0), Slot::One).unwrap();
        assert_eq!(
            *store.writes.lock().unwrap(),
            vec![(EVENTS.to_owned(), 2, 8, String::new())]
        );
        assert_eq!(portal.snapshot().unwrap().events[0].volunteer_1, "");
    }

    #[test]
    fn load_issues_name_the_sheet_rows() {
        let store = seeded();
        assert!(portal(&store).load_issues().unwrap().is_empty());
        store
            .append_row(
                EVENTS,
                &event_values("Ensaio", "Som", "AV3", "sem data", "19:30", "", ""),
            )
            .unwrap();
        store
            .append_row(
                EVENTS,
                &event_values("Culto", "Som", "XYZ", "31/10/2026", "09:00", "", ""),
            )
            .unwrap();
        let issues: Vec<String> = portal(&store)
            .load_issues()
            .unwrap()
            .iter()
            .map(|issue| issue.to_string())
            .collect();
        assert_eq!(
            issues,
            vec![
                "row 6: unreadable date \"sem data\"",
                "row 7: unknown level \"XYZ\"",
            ]
        );
    }

    #[test]
    fn director_assigns_eligible_users() {
        let store = seeded();
        let portal = portal(&store);
        let director = director();
        let (record, eligible) = portal.eligible_for(&director, SheetRow(0)).unwrap();
        assert_eq!(record.event_name, "Culto");
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].name, "Ana");

        match portal.assign(&director, SheetRow(2), Slot::One, "ana@example.org") {
            Err(Error::Validation(..)) => (),
            other => panic!("unexpected {:?}", other),
        }
        portal
            .assign(&director, SheetRow(0), Slot::Two, "ana@example.org")
            .unwrap();
        assert_eq!(portal.snapshot().unwrap().events[0].volunteer_2, "Ana");
    }

    #[test]
    fn director_manages_department_users() {
        let store = seeded();
        let portal = portal(&store);
        let director = director();
        portal
            .create_user(
                &director,
                NewUser {
                    email: "cid@example.org".to_owned(),
                    name: "Cid".to_owned(),
                    phone: String::new(),
                    departments: strings(&["Acolhimento"]),
                    level: "AV1".to_owned(),
                },
            )
            .unwrap();
        let members = portal.users_of(&director).unwrap();
        let member_names: Vec<&str> = members.iter().map(|user| user.name.as_str()).collect();
        assert_eq!(member_names, vec!["Ana", "Cid"]);

        let changes = UserChanges {
            email: "bia@example.org".to_owned(),
            name: "Beatriz".to_owned(),
            phone: String::new(),
            level: "AV1".to_owned(),
        };
        match portal.update_user(&director, &changes) {
            Err(Error::AccessDenied) => (),
            other => panic!("unexpected {:?}", other),
        }
        let changes = UserChanges {
            email: "ana@example.org".to_owned(),
            name: "Ana Paula".to_owned(),
            ..changes
        };
        portal.update_user(&director, &changes).unwrap();
        let snapshot = portal.snapshot().unwrap();
        let ana = snapshot.user_by_email("ana@example.org").unwrap();
        assert_eq!(ana.name, "Ana Paula");
        assert_eq!(ana.departments, vec!["Som"]);
    }

    #[test]
    fn roster_lists_the_day() {
        let store = seeded();
        let portal = portal(&store);
        let roster = portal
            .duty_roster(NaiveDate::from_ymd_opt(2026, 10, 24).unwrap())
            .unwrap();
        let departments: Vec<&str> = roster
            .iter()
            .map(|group| group.department.as_str())
            .collect();
        assert_eq!(departments, vec!["Acolhimento", "Som"]);
    }

    #[test]
    fn cache_ttl_comes_from_settings() {
        assert_eq!(settings().cache_ttl(), Duration::from_secs(600));
    }
}
