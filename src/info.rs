//! INFO message annotation.
//!
//! Stations report their condition in INFO text (for example
//! `INFO FN31;PIR1=G;PIR2=Y`). The annotator checks that text against the
//! configured keyword styles and tags the record with a status, a map color
//! and an APRS icon. It can also pull the grid, and the call when missing,
//! out of the INFO text itself.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer};
use tracing::{debug, warn};

use crate::record::{AprsSymbol, ContactRecord};
use crate::text::{
    contains_ignore_case, find_char_within, find_ignore_case_within, slice_clamped, truncate_chars,
};

/// A `FIELD:VALUE` assignment applied to the record by a style.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagAssignment {
    pub field: String,
    pub value: String,
}

impl TagAssignment {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

impl FromStr for TagAssignment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (field, value) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| format!("expected FIELD:VALUE, got {:?}", s))?;
        let field = field.trim();
        if field.is_empty() {
            return Err(format!("missing field name in {:?}", s));
        }
        Ok(Self::new(field, value.trim()))
    }
}

impl fmt::Display for TagAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.field, self.value)
    }
}

impl<'de> Deserialize<'de> for TagAssignment {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// How one status level is shown downstream.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StatusStyle {
    /// Keyword that selects this style in INFO text (keyword styles only).
    #[serde(default)]
    pub search: String,

    /// Record field assignment, e.g. `PRECEDENCE:GREEN`.
    pub map: TagAssignment,

    /// Map color sent to GeoServer.
    pub color: String,

    /// APRS symbol for the YAAC export.
    pub aprs: AprsSymbol,
}

impl StatusStyle {
    fn new(search: &str, value: &str, color: &str, table: char, code: char) -> Self {
        Self {
            search: search.to_string(),
            map: TagAssignment::new("PRECEDENCE", value),
            color: color.to_string(),
            aprs: AprsSymbol::new(table, code),
        }
    }

    /// Tag the record with this style.
    pub fn apply_to(&self, record: &mut ContactRecord) {
        if !record.set_field(&self.map.field, self.map.value.clone()) {
            warn!("Style assigns unknown field {}", self.map.field);
        }
        record.status_tag = self.map.value.clone();
        record.status_color = self.color.clone();
        record.status_icon = self.aprs;
    }
}

/// The full set of styles.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StatusStyles {
    /// INFO text was empty; also the default for every new record.
    pub no_info: StatusStyle,
    /// INFO text matched no keyword.
    pub no_pir: StatusStyle,
    /// STATUS messages.
    pub status: StatusStyle,
    pub unknown: StatusStyle,
    pub green: StatusStyle,
    pub yellow: StatusStyle,
    pub red: StatusStyle,
}

impl Default for StatusStyles {
    fn default() -> Self {
        Self {
            no_info: StatusStyle::new("", "NOINFO", "gray", '\\', '!'),
            no_pir: StatusStyle::new("", "NOPIR", "white", '\\', '.'),
            status: StatusStyle::new("", "STATUS", "blue", '\\', ')'),
            unknown: StatusStyle::new("PIR1=U", "UNKNOWN", "gray", '\\', '0'),
            green: StatusStyle::new("PIR1=G", "GREEN", "green", '\\', 'W'),
            yellow: StatusStyle::new("PIR1=Y", "YELLOW", "yellow", '\\', 'U'),
            red: StatusStyle::new("PIR1=R", "RED", "red", '/', ':'),
        }
    }
}

/// Which style an INFO text resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PirLevel {
    NoInfo,
    NoPir,
    Unknown,
    Green,
    Yellow,
    Red,
}

impl fmt::Display for PirLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PirLevel::NoInfo => write!(f, "NOINFO"),
            PirLevel::NoPir => write!(f, "NOPIR"),
            PirLevel::Unknown => write!(f, "UNKNOWN"),
            PirLevel::Green => write!(f, "GREEN"),
            PirLevel::Yellow => write!(f, "YELLOW"),
            PirLevel::Red => write!(f, "RED"),
        }
    }
}

/// Applies INFO styles to records.
#[derive(Debug, Clone)]
pub struct InfoAnnotator {
    styles: StatusStyles,
    grid_from_info: bool,
    grid_length: usize,
}

impl InfoAnnotator {
    pub fn new(styles: StatusStyles, grid_from_info: bool, grid_length: usize) -> Self {
        Self {
            styles,
            grid_from_info,
            grid_length,
        }
    }

    pub fn styles(&self) -> &StatusStyles {
        &self.styles
    }

    /// Pick the style for an INFO text.
    ///
    /// Keyword styles are checked unknown, green, yellow, red; the last one
    /// that matches wins.
    pub fn classify(&self, text: &str) -> PirLevel {
        if text.trim().is_empty() {
            return PirLevel::NoInfo;
        }

        let keyword_styles = [
            (PirLevel::Unknown, &self.styles.unknown),
            (PirLevel::Green, &self.styles.green),
            (PirLevel::Yellow, &self.styles.yellow),
            (PirLevel::Red, &self.styles.red),
        ];

        keyword_styles
            .iter()
            .filter(|(_, style)| !style.search.is_empty() && contains_ignore_case(text, &style.search))
            .map(|(level, _)| *level)
            .last()
            .unwrap_or(PirLevel::NoPir)
    }

    fn style_for(&self, level: PirLevel) -> &StatusStyle {
        match level {
            PirLevel::NoInfo => &self.styles.no_info,
            PirLevel::NoPir => &self.styles.no_pir,
            PirLevel::Unknown => &self.styles.unknown,
            PirLevel::Green => &self.styles.green,
            PirLevel::Yellow => &self.styles.yellow,
            PirLevel::Red => &self.styles.red,
        }
    }

    /// Annotate a record from its comment (the INFO text).
    pub fn annotate(&self, record: &mut ContactRecord) -> PirLevel {
        let level = self.classify(&record.comment);
        self.style_for(level).apply_to(record);
        debug!(
            "INFO from {} is {} ({}, {})",
            record.call, level, record.status_color, record.status_icon
        );

        if self.grid_from_info && level != PirLevel::NoInfo {
            self.extract_position(record);
        }
        level
    }

    /// Pull `<call>: ... INFO <grid>;...` apart.
    fn extract_position(&self, record: &mut ContactRecord) {
        let text = record.comment.clone();

        let Some(end) = text.find(';') else {
            return;
        };
        let Some(start) = find_ignore_case_within(&text, "INFO ", end.saturating_sub(12), end)
        else {
            return;
        };

        let grid = slice_clamped(&text, start + 5, end).trim();
        record.gridsquare = truncate_chars(grid, self.grid_length).to_string();
        debug!("Grid {} from INFO text", record.gridsquare);

        if !record.call.is_empty() {
            return;
        }
        let Some(call_end) = find_char_within(&text, ':', end.saturating_sub(22), start) else {
            return;
        };
        let call_start =
            find_char_within(&text, ' ', call_end.saturating_sub(9), call_end).unwrap_or(0);
        record.call = slice_clamped(&text, call_start, call_end).trim().to_string();
        debug!("Call {} from INFO text", record.call);
    }
}
