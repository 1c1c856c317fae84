use crate::levels::Level;
use crate::schema::*;
use crate::visibility::VisibilityType;

use chrono::{Datelike, NaiveDate, Weekday};
use serde_derive::{Deserialize, Serialize};

/// Sheet rows are 1-indexed and the first one holds the headers, so the
/// first data row of a snapshot lives on sheet row 2.
pub const HEADER_ROW_OFFSET: u32 = 2;

#[derive(Debug, Identifiable, Queryable)]
pub struct SheetCell {
    pub id: i32,
    pub sheet: String,
    pub row_index: i32,
    pub column_index: i32,
    pub value: String,
}

/// Zero-based position of a row inside the snapshot it was read from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SheetRow(pub usize);

impl SheetRow {
    pub fn sheet_row(self) -> u32 {
        self.0 as u32 + HEADER_ROW_OFFSET
    }
}

/// A slot is open when its cell is blank. The sheet also carries `---` and
/// `nan` placeholders for empty cells.
pub fn is_blank(value: &str) -> bool {
    match value.trim() {
        "" | "---" | "nan" => true,
        _ => false,
    }
}

pub fn weekday_name(date: NaiveDate) -> &'static str {
    match date.weekday() {
        Weekday::Mon => "Seg",
        Weekday::Tue => "Ter",
        Weekday::Wed => "Qua",
        Weekday::Thu => "Qui",
        Weekday::Fri => "Sex",
        Weekday::Sat => "Sáb",
        Weekday::Sun => "Dom",
    }
}

#[derive(Clone, Debug)]
pub struct EventRecord {
    pub row: SheetRow,
    pub event_name: String,
    pub department: String,
    pub level: Level,
    pub date: NaiveDate,
    pub time: String,
    pub volunteer_1: String,
    pub volunteer_2: String,
    pub visibility: VisibilityType,
}

impl EventRecord {
    pub fn level_rank(&self) -> u8 {
        self.level.rank()
    }

    pub fn weekday(&self) -> &'static str {
        weekday_name(self.date)
    }

    pub fn formatted_date(&self) -> String {
        self.date.format("%d/%m/%Y").to_string()
    }

    pub fn volunteers(&self) -> [&str; 2] {
        [self.volunteer_1.trim(), self.volunteer_2.trim()]
    }

    pub fn has_volunteer(&self, name: &str) -> bool {
        let name = name.trim();
        !name.is_empty()
            && self
                .volunteers()
                .iter()
                .any(|volunteer| *volunteer == name)
    }

    pub fn same_shift(&self, other: &EventRecord) -> bool {
        self.date == other.date && self.time.trim() == other.time.trim()
    }
}

/// The identity a volunteer session renders and claims with.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Viewer {
    pub display_name: String,
    pub level_code: String,
    pub level_rank: u8,
    /// `None` means open scheduling: no department restriction applies.
    pub eligible_departments: Option<Vec<String>>,
    pub email: Option<String>,
}

impl Viewer {
    pub fn first_name(&self) -> &str {
        self.display_name
            .split_whitespace()
            .next()
            .unwrap_or(&self.display_name)
    }
}

#[derive(Clone, Debug)]
pub struct UserRecord {
    pub row: SheetRow,
    pub email: String,
    pub name: String,
    pub phone: String,
    pub departments: Vec<String>,
    pub level: Level,
}

impl UserRecord {
    pub fn in_department(&self, department: &str) -> bool {
        self.departments
            .iter()
            .any(|candidate| candidate == department.trim())
    }

    pub fn as_viewer(&self) -> Viewer {
        Viewer {
            display_name: self.name.clone(),
            level_code: self.level.code().to_owned(),
            level_rank: self.level.rank(),
            eligible_departments: Some(self.departments.clone()),
            email: Some(self.email.clone()),
        }
    }
}

pub fn split_departments(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|department| !department.is_empty())
        .map(str::to_owned)
        .collect()
}

#[derive(Clone, Debug, PartialEq)]
pub struct Director {
    pub email: String,
    pub department: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_cells_include_placeholders() {
        assert!(is_blank(""));
        assert!(is_blank("   "));
        assert!(is_blank("---"));
        assert!(is_blank("nan"));
        assert!(!is_blank("Maria"));
    }

    #[test]
    fn sheet_row_skips_header() {
        assert_eq!(SheetRow(0).sheet_row(), 2);
        assert_eq!(SheetRow(5).sheet_row(), 7);
    }

    #[test]
    fn weekday_names() {
        assert_eq!(weekday_name(NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()), "Seg");
        assert_eq!(weekday_name(NaiveDate::from_ymd_opt(2026, 10, 25).unwrap()), "Dom");
    }

    #[test]
    fn departments_are_split_and_trimmed() {
        assert_eq!(
            split_departments("Recepção, Som ,,Cozinha"),
            vec!["Recepção", "Som", "Cozinha"]
        );
        assert!(split_departments("").is_empty());
    }

    #[test]
    fn first_name_of_viewer() {
        let viewer = Viewer {
            display_name: "Carlos Alberto".to_owned(),
            level_code: "AV1".to_owned(),
            level_rank: 2,
            eligible_departments: None,
            email: None,
        };
        assert_eq!(viewer.first_name(), "Carlos");
    }
}
