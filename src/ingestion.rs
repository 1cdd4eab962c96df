use std::fmt;

use serde::{Deserialize, Serialize};

/// Where an input unit came from, used to tag results and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitOrigin {
    /// 1-based line number in a name list.
    Line(usize),
    /// 1-based sheet row number; the header is row 1.
    Row(usize),
}

impl fmt::Display for UnitOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitOrigin::Line(n) => write!(f, "line {n}"),
            UnitOrigin::Row(n) => write!(f, "row {n}"),
        }
    }
}

/// One place to resolve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputUnit {
    pub origin: UnitOrigin,
    pub name: String,
    /// Region prefix (usually a state code) used to pick among search results.
    pub locale_hint: Option<String>,
}

impl InputUnit {
    /// Builds a unit from a raw list line; blank lines yield `None`.
    pub fn from_line(line_number: usize, text: &str) -> Option<Self> {
        let name = text.trim();
        if name.is_empty() {
            return None;
        }
        Some(Self {
            origin: UnitOrigin::Line(line_number),
            name: name.to_string(),
            locale_hint: None,
        })
    }

    pub fn from_row(row_number: usize, name: &str, locale_hint: Option<&str>) -> Option<Self> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        Some(Self {
            origin: UnitOrigin::Row(row_number),
            name: name.to_string(),
            locale_hint: locale_hint
                .map(str::trim)
                .filter(|hint| !hint.is_empty())
                .map(str::to_string),
        })
    }
}
