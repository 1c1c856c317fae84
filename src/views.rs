//! Display-ready shapes of catalog records for the templates.

use crate::filters::RosterGroup;
use crate::levels;
use crate::models::{is_blank, EventRecord, UserRecord};
use crate::slots::{determine_open_slot, Slot, SlotStatus};

pub struct SlotView {
    pub number: u8,
    pub volunteer: String,
    pub open: bool,
}

pub struct EventCard {
    pub row: usize,
    pub event_name: String,
    pub department: String,
    pub level: String,
    pub colour: &'static str,
    pub weekday: &'static str,
    pub date: String,
    pub time: String,
    pub status_label: &'static str,
    pub status_class: &'static str,
    pub slots: Vec<SlotView>,
    pub claimable: bool,
}

impl EventCard {
    pub fn from_record(record: &EventRecord) -> EventCard {
        let status = SlotStatus::of(record);
        EventCard {
            row: record.row.0,
            event_name: record.event_name.clone(),
            department: record.department.clone(),
            level: record.level.code().to_owned(),
            colour: record.level.colour(),
            weekday: record.weekday(),
            date: record.formatted_date(),
            time: record.time.clone(),
            status_label: status.label(),
            status_class: status.css_class(),
            slots: [Slot::One, Slot::Two]
                .iter()
                .map(|slot| {
                    let volunteer = slot.value(record);
                    let open = is_blank(volunteer);
                    SlotView {
                        number: slot.number(),
                        volunteer: if open { String::new() } else { volunteer.to_owned() },
                        open,
                    }
                })
                .collect(),
            claimable: determine_open_slot(record).is_some(),
        }
    }

    pub fn from_records(records: &[EventRecord]) -> Vec<EventCard> {
        records.iter().map(EventCard::from_record).collect()
    }
}

pub struct RosterView {
    pub department: String,
    pub cards: Vec<EventCard>,
}

impl RosterView {
    pub fn from_groups(groups: &[RosterGroup]) -> Vec<RosterView> {
        groups
            .iter()
            .map(|group| RosterView {
                department: group.department.clone(),
                cards: EventCard::from_records(&group.events),
            })
            .collect()
    }
}

pub struct UserView {
    pub email: String,
    pub name: String,
    pub phone: String,
    pub departments: String,
    pub level: String,
    pub levels: Vec<SelectOption>,
}

impl UserView {
    pub fn from_record(user: &UserRecord) -> UserView {
        UserView {
            email: user.email.clone(),
            name: user.name.clone(),
            phone: user.phone.clone(),
            departments: user.departments.join(", "),
            level: user.level.code().to_owned(),
            levels: level_options(user.level.code()),
        }
    }
}

/// One entry of a select box.
pub struct SelectOption {
    pub value: String,
    pub selected: bool,
}

pub fn level_options(selected: &str) -> Vec<SelectOption> {
    levels::all()
        .iter()
        .map(|level| SelectOption {
            value: level.code.to_owned(),
            selected: level.code == selected.trim(),
        })
        .collect()
}

pub fn department_options(departments: &[String], selected: &str) -> Vec<SelectOption> {
    departments
        .iter()
        .map(|department| SelectOption {
            value: department.clone(),
            selected: department == selected.trim(),
        })
        .collect()
}

/// Values the event list filter form was submitted with.
#[derive(Default)]
pub struct FilterForm {
    pub from: String,
    pub department: String,
    pub level: String,
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visibility::tests::record;

    #[test]
    fn card_shows_slots_and_status() {
        let card = EventCard::from_record(&record("AV1", "Maria", "nan"));
        assert_eq!(card.date, "24/10/2026");
        assert_eq!(card.weekday, "Sáb");
        assert_eq!(card.status_label, "1 open slot");
        assert!(card.claimable);
        assert_eq!(card.slots[0].volunteer, "Maria");
        assert!(!card.slots[0].open);
        assert_eq!(card.slots[1].volunteer, "");
        assert!(card.slots[1].open);
    }

    #[test]
    fn full_card_is_not_claimable() {
        let card = EventCard::from_record(&record("ZZZ", "Maria", "Joao"));
        assert!(!card.claimable);
        assert_eq!(card.level, "ZZZ");
        assert_eq!(card.status_class, "status-complete");
    }

    #[test]
    fn level_select_marks_current() {
        let options = level_options("AV2");
        assert_eq!(options.len(), levels::all().len());
        assert_eq!(
            options
                .iter()
                .filter(|option| option.selected)
                .map(|option| option.value.as_str())
                .collect::<Vec<_>>(),
            vec!["AV2"]
        );
    }

    #[test]
    fn department_select_marks_current() {
        let departments = vec!["Acolhimento".to_owned(), "Som".to_owned()];
        let options = department_options(&departments, " Som ");
        assert!(!options[0].selected);
        assert!(options[1].selected);
        assert!(department_options(&departments, "")
            .iter()
            .all(|option| !option.selected));
    }
}
