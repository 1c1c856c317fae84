use crate::catalog::{self, parse_events};
use crate::config::{EventColumns, SlotColumns};
use crate::error::Error;
use crate::models::{is_blank, EventRecord};
use crate::store::TabularStore;

use log::info;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Slot {
    One,
    Two,
}

impl Slot {
    pub fn from_number(number: u8) -> Option<Slot> {
        match number {
            1 => Some(Slot::One),
            2 => Some(Slot::Two),
            _ => None,
        }
    }

    pub fn number(self) -> u8 {
        match self {
            Slot::One => 1,
            Slot::Two => 2,
        }
    }

    pub fn value(self, record: &EventRecord) -> &str {
        match self {
            Slot::One => &record.volunteer_1,
            Slot::Two => &record.volunteer_2,
        }
    }

    pub fn header(self, columns: &EventColumns) -> &str {
        match self {
            Slot::One => &columns.volunteer_1,
            Slot::Two => &columns.volunteer_2,
        }
    }

    pub fn column(self, slots: &SlotColumns) -> u32 {
        slots.first_column + u32::from(self.number()) - 1
    }
}

pub fn determine_open_slot(record: &EventRecord) -> Option<Slot> {
    if is_blank(&record.volunteer_1) {
        Some(Slot::One)
    } else if is_blank(&record.volunteer_2) {
        Some(Slot::Two)
    } else {
        None
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotStatus {
    TwoOpen,
    OneOpen,
    Complete,
}

impl SlotStatus {
    pub fn of(record: &EventRecord) -> SlotStatus {
        match (is_blank(&record.volunteer_1), is_blank(&record.volunteer_2)) {
            (true, true) => SlotStatus::TwoOpen,
            (false, false) => SlotStatus::Complete,
            _ => SlotStatus::OneOpen,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SlotStatus::TwoOpen => "2 open slots",
            SlotStatus::OneOpen => "1 open slot",
            SlotStatus::Complete => "Complete",
        }
    }

    pub fn css_class(self) -> &'static str {
        match self {
            SlotStatus::TwoOpen => "status-two-open",
            SlotStatus::OneOpen => "status-one-open",
            SlotStatus::Complete => "status-complete",
        }
    }
}

/// Any event on the same date and time that already lists `name`.
pub fn find_conflict<'a>(
    events: &'a [EventRecord],
    record: &EventRecord,
    name: &str,
) -> Option<&'a EventRecord> {
    events
        .iter()
        .find(|other| other.same_shift(record) && other.has_volunteer(name))
}

/// Where slot writes go: the event table and the fixed slot columns.
pub struct SlotTarget<'a> {
    pub store: &'a dyn TabularStore,
    pub table: &'a str,
    pub columns: &'a EventColumns,
    pub slots: &'a SlotColumns,
}

impl<'a> SlotTarget<'a> {
    /// Writes `name` into `slot` of `record` after re-reading the table: the
    /// slot must still be blank and, when `check_conflicts` is set, `name`
    /// must not already be scheduled at the same date and time.
    pub fn claim(
        &self,
        record: &EventRecord,
        slot: Slot,
        name: &str,
        check_conflicts: bool,
    ) -> Result<(), Error> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::MissingFieldError(vec!["name".to_owned()]));
        }
        let rows = self.store.read_all(self.table)?;
        let current = rows
            .get(record.row.0)
            .filter(|row| catalog::cell(row, &self.columns.event_name) == record.event_name)
            .ok_or(Error::UnknownEvent(record.row.0))?;

        let occupant = catalog::cell(current, slot.header(self.columns));
        if !is_blank(occupant) {
            return Err(Error::SlotAlreadyFilled {
                event_name: record.event_name.clone(),
                volunteer: occupant.to_owned(),
            });
        }
        if check_conflicts {
            let (fresh, _) = parse_events(&rows, self.columns);
            if let Some(conflict) = find_conflict(&fresh, record, name) {
                return Err(Error::ScheduleConflict {
                    event_name: conflict.event_name.clone(),
                    date: conflict.formatted_date(),
                    time: conflict.time.clone(),
                });
            }
        }

        self.store.write_cell(
            self.table,
            record.row.sheet_row(),
            slot.column(self.slots),
            name,
        )?;
        info!(
            "{} claimed slot {} of {} (row {})",
            name,
            slot.number(),
            record.event_name,
            record.row.sheet_row()
        );
        Ok(())
    }

    /// Clears `slot` of `record`, putting it back up for claiming.
    pub fn release(&self, record: &EventRecord, slot: Slot) -> Result<(), Error> {
        self.store.write_cell(
            self.table,
            record.row.sheet_row(),
            slot.column(self.slots),
            "",
        )?;
        info!(
            "released slot {} of {} (row {})",
            slot.number(),
            record.event_name,
            record.row.sheet_row()
        );
        Ok(())
    }
}
