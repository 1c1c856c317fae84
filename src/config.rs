use crate::retry::RetryPolicy;

use serde_derive::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Lets the session cookie travel over plain HTTP.
    #[serde(default)]
    pub insecure_cookies: bool,
    #[serde(default = "default_title")]
    pub portal_title: String,
    pub store: StoreSettings,
    #[serde(default)]
    pub tables: TableNames,
    #[serde(default)]
    pub columns: EventColumns,
    #[serde(default)]
    pub slots: SlotColumns,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_true")]
    pub check_conflicts: bool,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StoreSettings {
    Sheets {
        spreadsheet_id: String,
        access_token: String,
        #[serde(default = "default_api_base")]
        api_base: String,
    },
    Sqlite {
        db_path: PathBuf,
    },
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct TableNames {
    pub events: String,
    pub users: String,
    pub directors: String,
}

impl Default for TableNames {
    fn default() -> Self {
        TableNames {
            events: "Calendario_Eventos".to_owned(),
            users: "Usuarios".to_owned(),
            directors: "Diretores".to_owned(),
        }
    }
}

/// Header names of the event table, matched after trimming.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct EventColumns {
    pub event_name: String,
    pub department: String,
    pub level: String,
    pub date: String,
    pub time: String,
    pub volunteer_1: String,
    pub volunteer_2: String,
    pub visibility: String,
}

impl Default for EventColumns {
    fn default() -> Self {
        EventColumns {
            event_name: "Nome do Evento".to_owned(),
            department: "Departamento".to_owned(),
            level: "Nível".to_owned(),
            date: "Data Específica".to_owned(),
            time: "Horario".to_owned(),
            volunteer_1: "Voluntário 1".to_owned(),
            volunteer_2: "Voluntário 2".to_owned(),
            visibility: "Visibilidade".to_owned(),
        }
    }
}

/// Sheet column of the first volunteer slot; the second is the next one.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct SlotColumns {
    pub first_column: u32,
}

impl Default for SlotColumns {
    fn default() -> Self {
        SlotColumns { first_column: 8 }
    }
}

/// Last column a sheet can hold (ZZZ).
const MAX_COLUMN: u32 = 18_278;

impl SlotColumns {
    fn validate(&self) -> Result<(), config::ConfigError> {
        if self.first_column == 0 || self.first_column >= MAX_COLUMN {
            return Err(config::ConfigError::Message(format!(
                "slots.first_column must be between 1 and {}, got {}",
                MAX_COLUMN - 1,
                self.first_column
            )));
        }
        Ok(())
    }
}

fn default_host() -> String {
    "127.0.0.1".to_owned()
}

fn default_port() -> u16 {
    7878
}

fn default_title() -> String {
    "Volunteer Portal".to_owned()
}

fn default_api_base() -> String {
    "https://sheets.googleapis.com/".to_owned()
}

fn default_cache_ttl_secs() -> u64 {
    60
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_true() -> bool {
    true
}

impl Settings {
    /// Reads `path` (any format the config crate knows, extension optional)
    /// and overlays `PORTAL_*` environment variables.
    pub fn load(path: &str) -> Result<Settings, config::ConfigError> {
        let mut settings = config::Config::default();
        settings.merge(config::File::with_name(path))?;
        settings.merge(config::Environment::with_prefix("PORTAL"))?;
        let settings = settings.try_into::<Settings>()?;
        settings.slots.validate()?;
        Ok(settings)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.retry_attempts,
            backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn settings_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".json")
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults_fill_missing_sections() {
        let file = settings_file(r#"{ "store": { "backend": "sqlite", "db_path": "portal.db" } }"#);
        let settings = Settings::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(settings.port, 7878);
        assert_eq!(settings.tables, TableNames::default());
        assert_eq!(settings.columns, EventColumns::default());
        assert_eq!(settings.slots.first_column, 8);
        assert!(settings.check_conflicts);
        assert_eq!(settings.retry_policy(), RetryPolicy::default());
        match settings.store {
            StoreSettings::Sqlite { db_path } => assert_eq!(db_path, PathBuf::from("portal.db")),
            other => panic!("unexpected store {:?}", other),
        }
    }

    #[test]
    fn sheets_backend_and_overrides() {
        let file = settings_file(
            r#"{
                "port": 9000,
                "cache_ttl_secs": 600,
                "check_conflicts": false,
                "columns": { "time": "Horário" },
                "slots": { "first_column": 7 },
                "store": { "backend": "sheets", "spreadsheet_id": "abc", "access_token": "t" }
            }"#,
        );
        let settings = Settings::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(settings.port, 9000);
        assert_eq!(settings.cache_ttl(), Duration::from_secs(600));
        assert!(!settings.check_conflicts);
        assert_eq!(settings.columns.time, "Horário");
        assert_eq!(settings.columns.event_name, "Nome do Evento");
        assert_eq!(settings.slots.first_column, 7);
        match settings.store {
            StoreSettings::Sheets {
                spreadsheet_id,
                api_base,
                ..
            } => {
                assert_eq!(spreadsheet_id, "abc");
                assert_eq!(api_base, "https://sheets.googleapis.com/");
            }
            other => panic!("unexpected store {:?}", other),
        }
    }

    #[test]
    fn store_section_is_required() {
        let file = settings_file(r#"{ "port": 9000 }"#);
        assert!(Settings::load(file.path().to_str().unwrap()).is_err());
    }

    #[test]
    fn slot_columns_must_fit_the_sheet() {
        for first_column in &[0, MAX_COLUMN, u32::MAX] {
            let file = settings_file(&format!(
                r#"{{ "slots": {{ "first_column": {} }}, "store": {{ "backend": "sqlite", "db_path": "portal.db" }} }}"#,
                first_column
            ));
            assert!(Settings::load(file.path().to_str().unwrap()).is_err());
        }
        let file = settings_file(
            r#"{ "slots": { "first_column": 1 }, "store": { "backend": "sqlite", "db_path": "portal.db" } }"#,
        );
        assert_eq!(
            Settings::load(file.path().to_str().unwrap())
                .unwrap()
                .slots
                .first_column,
            1
        );
    }
}
