//! The fixed level hierarchy volunteers and activities are ranked by.

use std::fmt;

/// Rank given to any level code that is not in the table. No viewer can
/// reach it, so such rows stay hidden under the default rule.
pub const UNKNOWN_RANK: u8 = 99;

pub struct LevelInfo {
    pub code: &'static str,
    pub rank: u8,
    pub colour: &'static str,
}

const LEVELS: &[LevelInfo] = &[
    LevelInfo { code: "Nenhum", rank: 0, colour: "#FFFFFF" },
    LevelInfo { code: "BAS", rank: 1, colour: "#C8E6C9" },
    LevelInfo { code: "AV1", rank: 2, colour: "#FFCDD2" },
    LevelInfo { code: "IN", rank: 3, colour: "#BBDEFB" },
    LevelInfo { code: "AV2", rank: 4, colour: "#D7CCC8" },
    LevelInfo { code: "AV2-24", rank: 4, colour: "#D7CCC8" },
    LevelInfo { code: "AV2-23", rank: 5, colour: "#D7CCC8" },
    LevelInfo { code: "AV2/", rank: 6, colour: "#D7CCC8" },
    LevelInfo { code: "AV3", rank: 7, colour: "#E1BEE7" },
    LevelInfo { code: "AV3A", rank: 8, colour: "#E1BEE7" },
    LevelInfo { code: "AV3/", rank: 9, colour: "#E1BEE7" },
    LevelInfo { code: "AV4", rank: 10, colour: "#FFF9C4" },
    LevelInfo { code: "AV4A", rank: 11, colour: "#FFF9C4" },
];

const ALIASES: &[(&str, &str)] = &[("Av.2/", "AV2/")];

const UNKNOWN_COLOUR: &str = "#F0F0F0";

/// All known levels in rank order, for select boxes.
pub fn all() -> &'static [LevelInfo] {
    LEVELS
}

fn lookup(code: &str) -> Option<&'static LevelInfo> {
    let code = code.trim();
    let code = ALIASES
        .iter()
        .find(|(alias, _)| *alias == code)
        .map(|(_, canonical)| *canonical)
        .unwrap_or(code);
    LEVELS.iter().find(|level| level.code == code)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Level {
    Known { code: String, rank: u8 },
    Unknown(String),
}

impl Level {
    pub fn parse(code: &str) -> Level {
        match lookup(code) {
            Some(level) => Level::Known {
                code: level.code.to_owned(),
                rank: level.rank,
            },
            None => Level::Unknown(code.trim().to_owned()),
        }
    }

    pub fn rank(&self) -> u8 {
        match self {
            Level::Known { rank, .. } => *rank,
            Level::Unknown(..) => UNKNOWN_RANK,
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Level::Known { code, .. } => code.as_str(),
            Level::Unknown(code) => code.as_str(),
        }
    }

    pub fn is_known(&self) -> bool {
        match self {
            Level::Known { .. } => true,
            Level::Unknown(..) => false,
        }
    }

    pub fn colour(&self) -> &'static str {
        lookup(self.code())
            .map(|level| level.colour)
            .unwrap_or(UNKNOWN_COLOUR)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
