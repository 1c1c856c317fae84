use crate::catalog::Snapshot;
use crate::error::Error;
use crate::levels::Level;
use crate::models::{EventRecord, UserRecord};
use crate::slots::find_conflict;
use crate::store::TabularStore;

use log::info;
use serde_derive::Deserialize;

/// Sheet columns of the user table, after `Email` in column A.
const NAME_COLUMN: u32 = 2;
const PHONE_COLUMN: u32 = 3;
const DEPARTMENTS_COLUMN: u32 = 4;
const LEVEL_COLUMN: u32 = 5;

#[derive(Debug, Default, Deserialize)]
pub struct NewUser {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(
        default,
        with = "serde_with::rust::StringWithSeparator::<serde_with::CommaSeparator>"
    )]
    pub departments: Vec<String>,
    #[serde(default)]
    pub level: String,
}

impl NewUser {
    /// Normalises the form and checks what the user table needs.
    pub fn validate(mut self) -> Result<NewUser, Error> {
        self.email = self.email.trim().to_lowercase();
        self.name = self.name.trim().to_owned();
        self.phone = self.phone.trim().to_owned();
        self.departments = self
            .departments
            .iter()
            .map(|department| department.trim().to_owned())
            .filter(|department| !department.is_empty())
            .collect();

        let mut missing = Vec::new();
        for (field, value) in &[("email", &self.email), ("name", &self.name)] {
            if value.is_empty() {
                missing.push((*field).to_owned());
            }
        }
        if self.departments.is_empty() {
            missing.push("departments".to_owned());
        }
        if self.level.trim().is_empty() {
            missing.push("level".to_owned());
        }
        if !missing.is_empty() {
            return Err(Error::MissingFieldError(missing));
        }
        if !self.email.contains('@') {
            return Err(Error::Validation(format!(
                "Not an email address: {}",
                self.email
            )));
        }
        let level = Level::parse(&self.level);
        if !level.is_known() {
            return Err(Error::Validation(format!("Unknown level: {}", self.level)));
        }
        self.level = level.code().to_owned();
        Ok(self)
    }

    fn into_values(self) -> Vec<String> {
        vec![
            self.email,
            self.name,
            self.phone,
            self.departments.join(","),
            self.level,
        ]
    }
}

/// Appends a validated user unless the email is already registered.
pub fn register(
    store: &dyn TabularStore,
    table: &str,
    snapshot: &Snapshot,
    user: NewUser,
) -> Result<(), Error> {
    let user = user.validate()?;
    if snapshot.user_by_email(&user.email).is_some() {
        return Err(Error::UserExists(user.email));
    }
    info!("registering {} ({})", user.email, user.level);
    store.append_row(table, &user.into_values())?;
    Ok(())
}

#[derive(Debug, Default, Deserialize)]
pub struct UserChanges {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub level: String,
}

/// Rewrites name, phone, departments and level of an existing user row.
pub fn update_user(
    store: &dyn TabularStore,
    table: &str,
    user: &UserRecord,
    changes: &UserChanges,
    departments: &[String],
) -> Result<(), Error> {
    let name = changes.name.trim();
    if name.is_empty() {
        return Err(Error::MissingFieldError(vec!["name".to_owned()]));
    }
    let level = Level::parse(&changes.level);
    if !level.is_known() {
        return Err(Error::Validation(format!(
            "Unknown level: {}",
            changes.level.trim()
        )));
    }
    let row = user.row.sheet_row();
    let departments = departments.join(",");
    for (column, value) in &[
        (NAME_COLUMN, name),
        (PHONE_COLUMN, changes.phone.trim()),
        (DEPARTMENTS_COLUMN, departments.as_str()),
        (LEVEL_COLUMN, level.code()),
    ] {
        store.write_cell(table, row, *column, value)?;
    }
    info!("updated {} (row {})", user.email, row);
    Ok(())
}

/// Users who may fill a slot of `record`: same department, level high
/// enough, and not already booked at the same date and time.
pub fn eligible_volunteers<'a>(
    users: &'a [UserRecord],
    events: &[EventRecord],
    record: &EventRecord,
) -> Vec<&'a UserRecord> {
    let mut eligible: Vec<&UserRecord> = users
        .iter()
        .filter(|user| user.in_department(&record.department))
        .filter(|user| user.level.is_known() && user.level.rank() >= record.level_rank())
        .filter(|user| find_conflict(events, record, &user.name).is_none())
        .collect();
    eligible.sort_by(|a, b| a.name.cmp(&b.name));
    eligible
}
