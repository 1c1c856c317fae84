//! The per-user context carried between requests by the session middleware.

use crate::error::Error;
use crate::levels;
use crate::models::{Director, Viewer};

use serde_derive::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Session {
    Volunteer(Viewer),
    Director { email: String, department: String },
}

impl Session {
    pub fn viewer(&self) -> Result<&Viewer, Error> {
        match self {
            Session::Volunteer(viewer) => Ok(viewer),
            Session::Director { .. } => Err(Error::AccessDenied),
        }
    }

    pub fn director(&self) -> Result<Director, Error> {
        match self {
            Session::Director { email, department } => Ok(Director {
                email: email.clone(),
                department: department.clone(),
            }),
            Session::Volunteer(..) => Err(Error::AccessDenied),
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            Session::Volunteer(viewer) => viewer.first_name(),
            Session::Director { department, .. } => department.as_str(),
        }
    }
}

impl From<Director> for Session {
    fn from(director: Director) -> Self {
        Session::Director {
            email: director.email,
            department: director.department,
        }
    }
}

/// Open scheduling: a typed-in name and a self-declared level, no
/// department restriction.
pub fn viewer_from_level(name: &str, level_code: &str) -> Result<Viewer, Error> {
    let mut missing = Vec::new();
    if name.trim().is_empty() {
        missing.push("name".to_owned());
    }
    if level_code.trim().is_empty() {
        missing.push("level".to_owned());
    }
    if !missing.is_empty() {
        return Err(Error::MissingFieldError(missing));
    }
    let level = levels::Level::parse(level_code);
    if !level.is_known() {
        return Err(Error::Validation(format!(
            "Unknown level: {}",
            level_code.trim()
        )));
    }
    Ok(Viewer {
        display_name: name.trim().to_owned(),
        level_code: level.code().to_owned(),
        level_rank: level.rank(),
        eligible_departments: None,
        email: None,
    })
}
