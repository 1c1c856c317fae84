use crate::models::EventRecord;

use chrono::NaiveDate;

/// Optional narrowing chosen in the UI, applied after visibility.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EventFilter {
    pub from: Option<NaiveDate>,
    pub department: Option<String>,
    pub level: Option<String>,
    pub text: Option<String>,
}

impl EventFilter {
    pub fn matches(&self, record: &EventRecord) -> bool {
        if let Some(from) = self.from {
            if record.date < from {
                return false;
            }
        }
        if let Some(department) = &self.department {
            if record.department != department.trim() {
                return false;
            }
        }
        if let Some(level) = &self.level {
            if record.level.code() != level.trim() {
                return false;
            }
        }
        if let Some(text) = &self.text {
            let needle = text.trim().to_lowercase();
            let haystack = [
                record.event_name.as_str(),
                record.department.as_str(),
                record.volunteer_1.as_str(),
                record.volunteer_2.as_str(),
            ];
            if !haystack
                .iter()
                .any(|field| field.to_lowercase().contains(&needle))
            {
                return false;
            }
        }
        true
    }

    /// Matching records in schedule order.
    pub fn apply<'a, I>(&self, records: I) -> Vec<&'a EventRecord>
    where
        I: IntoIterator<Item = &'a EventRecord>,
    {
        let mut matching: Vec<&EventRecord> = records
            .into_iter()
            .filter(|record| self.matches(record))
            .collect();
        sort_by_schedule(&mut matching);
        matching
    }
}

pub fn sort_by_schedule(records: &mut Vec<&EventRecord>) {
    records.sort_by(|a, b| (a.date, a.time.as_str()).cmp(&(b.date, b.time.as_str())));
}

/// Distinct department names, sorted.
pub fn departments<'a, I>(records: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a EventRecord>,
{
    let mut departments: Vec<String> = records
        .into_iter()
        .map(|record| record.department.clone())
        .filter(|department| !department.is_empty())
        .collect();
    departments.sort();
    departments.dedup();
    departments
}

pub struct RosterGroup {
    pub department: String,
    pub events: Vec<EventRecord>,
}

/// Everything scheduled on `date`, grouped by department.
pub fn duty_roster(records: &[EventRecord], date: NaiveDate) -> Vec<RosterGroup> {
    let on_date: Vec<&EventRecord> = records.iter().filter(|record| record.date == date).collect();
    departments(on_date.iter().cloned())
        .into_iter()
        .map(|department| {
            let mut events: Vec<&EventRecord> = on_date
                .iter()
                .cloned()
                .filter(|record| record.department == department)
                .collect();
            sort_by_schedule(&mut events);
            RosterGroup {
                department,
                events: events.into_iter().cloned().collect(),
            }
        })
        .collect()
}
