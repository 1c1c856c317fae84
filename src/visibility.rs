use crate::models::{EventRecord, Viewer};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VisibilityType {
    OpenToAll,
    ExactLevel,
    LevelAndAbove,
    LevelAndBelow,
}

impl Default for VisibilityType {
    fn default() -> Self {
        VisibilityType::LevelAndAbove
    }
}

impl VisibilityType {
    /// Blank or unrecognised values fall back to the default rule.
    pub fn parse(value: &str) -> VisibilityType {
        match value.trim().to_lowercase().as_str() {
            "all" | "open" | "todos" | "aberto" => VisibilityType::OpenToAll,
            "exact" | "exato" | "exata" => VisibilityType::ExactLevel,
            "above" | "acima" => VisibilityType::LevelAndAbove,
            "below" | "abaixo" => VisibilityType::LevelAndBelow,
            _ => VisibilityType::default(),
        }
    }
}

/// Rank-based rules never match a record whose level code is not in the
/// table, including "level and below".
pub fn visible(record: &EventRecord, viewer_rank: u8) -> bool {
    let record_rank = record.level_rank();
    match record.visibility {
        VisibilityType::OpenToAll => true,
        _ if !record.level.is_known() => false,
        VisibilityType::ExactLevel => viewer_rank == record_rank,
        VisibilityType::LevelAndAbove => viewer_rank >= record_rank,
        VisibilityType::LevelAndBelow => viewer_rank <= record_rank,
    }
}

/// Rank rule plus department membership, when the viewer carries a
/// department list.
pub fn visible_to(record: &EventRecord, viewer: &Viewer) -> bool {
    let in_department = match &viewer.eligible_departments {
        Some(departments) => departments
            .iter()
            .any(|department| department == record.department.trim()),
        None => true,
    };
    in_department && visible(record, viewer.level_rank)
}
