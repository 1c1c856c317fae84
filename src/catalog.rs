//! Validated parsing of the event, user and director tables, and the
//! time-boxed cache the parsed snapshot lives in.

use crate::config::{EventColumns, TableNames};
use crate::levels::Level;
use crate::models::{split_departments, Director, EventRecord, SheetRow, UserRecord};
use crate::store::{Row, StoreError, TabularStore};
use crate::visibility::VisibilityType;

use chrono::NaiveDate;
use log::{debug, info, warn};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub const USER_EMAIL: &str = "Email";
pub const USER_NAME: &str = "Nome";
pub const USER_PHONE: &str = "Telefone";
pub const USER_DEPARTMENTS: &str = "Departamentos";
pub const USER_LEVEL: &str = "Nivel";
pub const DIRECTOR_EMAIL: &str = "Email";
pub const DIRECTOR_DEPARTMENT: &str = "Departamento";

pub fn cell<'a>(row: &'a Row, column: &str) -> &'a str {
    row.get(column).map(|value| value.trim()).unwrap_or("")
}

/// Day first, as the sheet is filled in; ISO dates are accepted too.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%d/%m/%Y")
        .or_else(|_| NaiveDate::parse_from_str(value, "%Y-%m-%d"))
        .ok()
}

#[derive(Clone, Debug, PartialEq)]
pub struct RowIssue {
    pub row: SheetRow,
    pub reason: String,
}

impl fmt::Display for RowIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {}: {}", self.row.sheet_row(), self.reason)
    }
}

/// What the validated parse had to reject or flag.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LoadReport {
    pub rejected: Vec<RowIssue>,
    pub unknown_levels: Vec<RowIssue>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty() && self.unknown_levels.is_empty()
    }

    pub fn issues(&self) -> impl Iterator<Item = &RowIssue> {
        self.rejected.iter().chain(self.unknown_levels.iter())
    }
}

pub fn parse_events(rows: &[Row], columns: &EventColumns) -> (Vec<EventRecord>, LoadReport) {
    let mut report = LoadReport::default();
    let mut events = Vec::with_capacity(rows.len());
    for (position, row) in rows.iter().enumerate() {
        let sheet_row = SheetRow(position);
        let event_name = cell(row, &columns.event_name);
        let raw_date = cell(row, &columns.date);
        if event_name.is_empty() && raw_date.is_empty() {
            debug!("skipping blank event row {}", sheet_row.sheet_row());
            continue;
        }
        let date = match parse_date(raw_date) {
            Some(date) => date,
            None => {
                report.rejected.push(RowIssue {
                    row: sheet_row,
                    reason: format!("unreadable date {:?}", raw_date),
                });
                continue;
            }
        };
        let level = Level::parse(cell(row, &columns.level));
        if !level.is_known() {
            report.unknown_levels.push(RowIssue {
                row: sheet_row,
                reason: format!("unknown level {:?}", level.code()),
            });
        }
        events.push(EventRecord {
            row: sheet_row,
            event_name: event_name.to_owned(),
            department: cell(row, &columns.department).to_owned(),
            level,
            date,
            time: cell(row, &columns.time).to_owned(),
            volunteer_1: cell(row, &columns.volunteer_1).to_owned(),
            volunteer_2: cell(row, &columns.volunteer_2).to_owned(),
            visibility: VisibilityType::parse(cell(row, &columns.visibility)),
        });
    }
    (events, report)
}

pub fn parse_users(rows: &[Row]) -> Vec<UserRecord> {
    rows.iter()
        .enumerate()
        .filter(|(_, row)| !cell(row, USER_EMAIL).is_empty())
        .map(|(position, row)| UserRecord {
            row: SheetRow(position),
            email: cell(row, USER_EMAIL).to_lowercase(),
            name: cell(row, USER_NAME).to_owned(),
            phone: cell(row, USER_PHONE).to_owned(),
            departments: split_departments(cell(row, USER_DEPARTMENTS)),
            level: Level::parse(cell(row, USER_LEVEL)),
        })
        .collect()
}

pub fn parse_directors(rows: &[Row]) -> Vec<Director> {
    rows.iter()
        .filter(|row| !cell(row, DIRECTOR_EMAIL).is_empty())
        .map(|row| Director {
            email: cell(row, DIRECTOR_EMAIL).to_lowercase(),
            department: cell(row, DIRECTOR_DEPARTMENT).to_owned(),
        })
        .collect()
}

#[derive(Debug, Default)]
pub struct Snapshot {
    pub events: Vec<EventRecord>,
    pub users: Vec<UserRecord>,
    pub directors: Vec<Director>,
    pub report: LoadReport,
}

impl Snapshot {
    pub fn load(
        store: &dyn TabularStore,
        tables: &TableNames,
        columns: &EventColumns,
    ) -> Result<Snapshot, StoreError> {
        let (events, report) = parse_events(&store.read_all(&tables.events)?, columns);
        let users = parse_users(&store.read_all(&tables.users)?);
        let directors = parse_directors(&store.read_all(&tables.directors)?);
        if !report.is_clean() {
            warn!(
                "{}: {} rows rejected, {} rows with unknown levels",
                tables.events,
                report.rejected.len(),
                report.unknown_levels.len()
            );
            for issue in report.issues() {
                warn!("{} {}", tables.events, issue);
            }
        }
        info!(
            "loaded {} events, {} users, {} directors",
            events.len(),
            users.len(),
            directors.len()
        );
        Ok(Snapshot {
            events,
            users,
            directors,
            report,
        })
    }

    pub fn event(&self, row: SheetRow) -> Option<&EventRecord> {
        self.events.iter().find(|event| event.row == row)
    }

    pub fn user_by_email(&self, email: &str) -> Option<&UserRecord> {
        let email = email.trim().to_lowercase();
        self.users.iter().find(|user| user.email == email)
    }

    pub fn director(&self, email: &str) -> Option<&Director> {
        let email = email.trim().to_lowercase();
        self.directors
            .iter()
            .find(|director| director.email == email)
    }
}

/// Keeps one snapshot for at most `ttl`. Writers call `invalidate` so the
/// next request reads the store again.
pub struct CatalogCache {
    ttl: Duration,
    entry: Mutex<Option<(Instant, Arc<Snapshot>)>>,
}

impl CatalogCache {
    pub fn new(ttl: Duration) -> Self {
        CatalogCache {
            ttl,
            entry: Mutex::new(None),
        }
    }

    pub fn get_or_load<F>(&self, load: F) -> Result<Arc<Snapshot>, StoreError>
    where
        F: FnOnce() -> Result<Snapshot, StoreError>,
    {
        let mut entry = self
            .entry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some((loaded_at, snapshot)) = entry.as_ref() {
            if loaded_at.elapsed() < self.ttl {
                return Ok(snapshot.clone());
            }
        }
        let snapshot = Arc::new(load()?);
        *entry = Some((Instant::now(), snapshot.clone()));
        Ok(snapshot)
    }

    pub fn invalidate(&self) {
        let mut entry = self
            .entry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *entry = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::levels::UNKNOWN_RANK;
    use std::cell::Cell;

    fn row(pairs: &[(&str, &str)]) -> Row {
        pairs
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect()
    }

    fn event_row(name: &str, level: &str, date: &str) -> Row {
        row(&[
            ("Nome do Evento", name),
            ("Departamento", " Som "),
            ("Nível", level),
            ("Data Específica", date),
            ("Horario", "19:30"),
            ("Voluntário 1", "Maria"),
            ("Voluntário 2", ""),
        ])
    }

    #[test]
    fn events_are_parsed_and_annotated() {
        let rows = vec![event_row("Culto", "AV1", "24/10/2026")];
        let (events, report) = parse_events(&rows, &EventColumns::default());
        assert!(report.is_clean());
        let event = &events[0];
        assert_eq!(event.row, SheetRow(0));
        assert_eq!(event.department, "Som");
        assert_eq!(event.level_rank(), 2);
        assert_eq!(event.formatted_date(), "24/10/2026");
        assert_eq!(event.weekday(), "Sáb");
        assert_eq!(event.visibility, VisibilityType::LevelAndAbove);
    }

    #[test]
    fn bad_rows_are_rejected_or_flagged() {
        let rows = vec![
            event_row("Culto", "AV1", "not a date"),
            event_row("", "", ""),
            event_row("Ensaio", "ZZZ", "2026-10-25"),
        ];
        let (events, report) = parse_events(&rows, &EventColumns::default());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].row, SheetRow(2));
        assert_eq!(events[0].level_rank(), UNKNOWN_RANK);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].row, SheetRow(0));
        assert_eq!(report.unknown_levels.len(), 1);
        assert!(!report.is_clean());
        let issues: Vec<String> = report.issues().map(|issue| issue.to_string()).collect();
        assert_eq!(
            issues,
            vec![
                "row 2: unreadable date \"not a date\"",
                "row 4: unknown level \"ZZZ\"",
            ]
        );
    }

    #[test]
    fn users_and_directors() {
        let users = parse_users(&[
            row(&[
                ("Email", " Ana@Example.org "),
                ("Nome", "Ana"),
                ("Telefone", "555"),
                ("Departamentos", "Som, Recepção"),
                ("Nivel", "AV2"),
            ]),
            row(&[("Email", ""), ("Nome", "nobody")]),
        ]);
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].email, "ana@example.org");
        assert_eq!(users[0].departments, vec!["Som", "Recepção"]);
        assert_eq!(users[0].level.rank(), 4);

        let directors = parse_directors(&[row(&[
            ("Email", "DIR@example.org"),
            ("Departamento", "Som"),
        ])]);
        let snapshot = Snapshot {
            users,
            directors,
            ..Snapshot::default()
        };
        assert_eq!(snapshot.director(" dir@EXAMPLE.org").map(|d| d.department.as_str()), Some("Som"));
        assert!(snapshot.user_by_email("ANA@example.org").is_some());
        assert!(snapshot.user_by_email("bia@example.org").is_none());
    }

    #[test]
    fn cache_serves_until_invalidated() {
        let cache = CatalogCache::new(Duration::from_secs(60));
        let loads = Cell::new(0);
        let load = || {
            loads.set(loads.get() + 1);
            Ok(Snapshot::default())
        };
        cache.get_or_load(load).unwrap();
        cache.get_or_load(load).unwrap();
        assert_eq!(loads.get(), 1);
        cache.invalidate();
        cache.get_or_load(load).unwrap();
        assert_eq!(loads.get(), 2);
    }

    #[test]
    fn expired_cache_reloads() {
        let cache = CatalogCache::new(Duration::from_secs(0));
        let loads = Cell::new(0);
        let load = || {
            loads.set(loads.get() + 1);
            Ok(Snapshot::default())
        };
        cache.get_or_load(load).unwrap();
        cache.get_or_load(load).unwrap();
        assert_eq!(loads.get(), 2);
    }

    #[test]
    fn failed_load_is_not_cached() {
        let cache = CatalogCache::new(Duration::from_secs(60));
        assert!(cache
            .get_or_load(|| Err(StoreError::Malformed("boom".to_owned())))
            .is_err());
        assert!(cache.get_or_load(|| Ok(Snapshot::default())).is_ok());
    }
}
