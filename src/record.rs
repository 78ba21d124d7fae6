//! The contact record built for every inbound event.
//!
//! A [`ContactRecord`] is created fresh per event with type-appropriate
//! defaults, filled in by classification and enrichment, then handed to the
//! sinks read-only.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer, Visitor};
use serde::Deserialize;

use crate::config::StationConfig;
use crate::envelope::Origin;

/// Host name used when the sender is not in the host directory.
pub const UNKNOWN_HOST: &str = "---";

/// ADIF fields carried on the record for compatibility but never computed.
pub const AUX_FIELDS: &[&str] = &[
    "ARI_PROV",
    "ARRL_SECT",
    "CHECK",
    "CONTEST_ID",
    "CQZ",
    "DIG",
    "DISTRIKT",
    "DOK",
    "FREQ_RX",
    "IARU_ZONE",
    "IOTA",
    "ITUZ",
    "KDA",
    "NAQSO_SECT",
    "OBLAST",
    "PFX",
    "POINTS",
    "PRECEDENCE",
    "QTH",
    "RADIO_NR",
    "RDA",
    "RX_PWR",
    "SAC",
    "SECT",
    "SECTION",
    "SRX",
    "STATE",
    "STX",
    "TX_PWR",
    "UKEI",
    "VE_PROV",
    "WWPMC",
];

/// An APRS symbol: the table character followed by the symbol code.
///
/// Deserializes from either a two character string (`"\\W"`) or a two element
/// array (`["\\", "W"]`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AprsSymbol {
    pub table: char,
    pub code: char,
}

impl AprsSymbol {
    pub const fn new(table: char, code: char) -> Self {
        Self { table, code }
    }
}

impl Default for AprsSymbol {
    fn default() -> Self {
        // Warning triangle
        Self::new('\\', '!')
    }
}

impl fmt::Display for AprsSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.table, self.code)
    }
}

impl<'de> Deserialize<'de> for AprsSymbol {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct AprsSymbolVisitor;

        fn single_char<E: de::Error>(s: &str) -> Result<char, E> {
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(c),
                _ => Err(E::custom(format!("expected a single character, got {:?}", s))),
            }
        }

        impl<'de> Visitor<'de> for AprsSymbolVisitor {
            type Value = AprsSymbol;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a two character string or a [table, code] array")
            }

            fn visit_str<E>(self, value: &str) -> Result<AprsSymbol, E>
            where
                E: de::Error,
            {
                let mut chars = value.chars();
                match (chars.next(), chars.next(), chars.next()) {
                    (Some(table), Some(code), None) => Ok(AprsSymbol::new(table, code)),
                    _ => Err(E::custom(format!(
                        "APRS symbol must be two characters, got {:?}",
                        value
                    ))),
                }
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<AprsSymbol, A::Error>
            where
                A: de::SeqAccess<'de>,
            {
                let table: String = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let code: String = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                if seq.next_element::<String>()?.is_some() {
                    return Err(de::Error::invalid_length(3, &self));
                }
                Ok(AprsSymbol::new(single_char(&table)?, single_char(&code)?))
            }
        }

        deserializer.deserialize_any(AprsSymbolVisitor)
    }
}

/// The normalized snapshot of one event.
#[derive(Debug, Clone, PartialEq)]
pub struct ContactRecord {
    pub call: String,
    /// The station a directed message was addressed to.
    pub station: String,
    pub gridsquare: String,
    pub band: String,
    /// Dial frequency in Hz.
    pub frequency: String,
    pub tx_frequency: String,
    pub offset: String,
    pub mode: String,
    pub submode: String,
    pub comment: String,
    pub name: String,
    pub rst_rcvd: String,
    pub rst_sent: String,
    pub qso_date: String,
    pub qso_date_off: String,
    pub time_on: String,
    pub time_off: String,
    pub station_callsign: String,
    pub operator: String,
    pub my_gridsquare: String,
    pub command: String,
    /// Target radio IP for command events.
    pub radio: String,
    pub latitude: String,
    pub longitude: String,

    /// Who sent the event.
    pub host: Option<Origin>,
    pub host_name: String,

    pub status_tag: String,
    pub status_color: String,
    pub status_icon: AprsSymbol,

    /// Auxiliary ADIF fields, keyed by upper-case tag.
    pub aux: BTreeMap<String, String>,
}

impl ContactRecord {
    /// A blank record for this station.
    pub fn new(station: &StationConfig) -> Self {
        Self {
            call: String::new(),
            station: String::new(),
            gridsquare: String::new(),
            band: String::new(),
            frequency: "0".to_string(),
            tx_frequency: "0".to_string(),
            offset: "0".to_string(),
            mode: String::new(),
            submode: String::new(),
            comment: String::new(),
            name: String::new(),
            rst_rcvd: "0".to_string(),
            rst_sent: "0".to_string(),
            qso_date: String::new(),
            qso_date_off: String::new(),
            time_on: String::new(),
            time_off: String::new(),
            station_callsign: String::new(),
            operator: station.operator.clone(),
            my_gridsquare: station.my_gridsquare.clone(),
            command: String::new(),
            radio: String::new(),
            latitude: String::new(),
            longitude: String::new(),
            host: None,
            host_name: UNKNOWN_HOST.to_string(),
            status_tag: String::new(),
            status_color: String::new(),
            status_icon: AprsSymbol::default(),
            aux: BTreeMap::new(),
        }
    }

    /// A record for a directed message: JS8 over MFSK.
    pub fn directed(station: &StationConfig) -> Self {
        Self {
            mode: "MFSK".to_string(),
            submode: "JS8".to_string(),
            ..Self::new(station)
        }
    }

    /// Stamp the date and time fields from the local clock.
    ///
    /// JS8Call's own UTC fields are not reliable enough to log.
    pub fn stamp_utc(&mut self, now: DateTime<Utc>) {
        let time = now.format("%H%M%S").to_string();
        self.qso_date = now.format("%Y%m%d").to_string();
        self.time_on = time.clone();
        self.time_off = time;
    }

    /// The dial frequency in Hz, if it is a positive integer.
    pub fn frequency_hz(&self) -> Option<u64> {
        self.frequency.trim().parse::<u64>().ok().filter(|hz| *hz > 0)
    }

    /// Set a field by its ADIF tag name (case-insensitive).
    ///
    /// Returns `false` when the name is not a field of the record.
    pub fn set_field(&mut self, name: &str, value: impl Into<String>) -> bool {
        let name = name.trim().to_ascii_uppercase();
        let value = value.into();
        let slot = match name.as_str() {
            "BAND" => &mut self.band,
            "CALL" => &mut self.call,
            "COMMAND" | "CMD" => &mut self.command,
            "COMMENT" => &mut self.comment,
            "FREQ" => &mut self.frequency,
            "FREQ_TX" => &mut self.tx_frequency,
            "GRIDSQUARE" => &mut self.gridsquare,
            "LAT" => &mut self.latitude,
            "LON" => &mut self.longitude,
            "MODE" => &mut self.mode,
            "MY_GRIDSQUARE" => &mut self.my_gridsquare,
            "NAME" => &mut self.name,
            "OFFSET" => &mut self.offset,
            "OPERATOR" => &mut self.operator,
            "QSO_DATE" => &mut self.qso_date,
            "QSO_DATE_OFF" => &mut self.qso_date_off,
            "RADIO" => &mut self.radio,
            "RST_RCVD" => &mut self.rst_rcvd,
            "RST_SENT" => &mut self.rst_sent,
            "STATION" => &mut self.station,
            "STATION_CALLSIGN" => &mut self.station_callsign,
            "SUBMODE" => &mut self.submode,
            "TIME_OFF" => &mut self.time_off,
            "TIME_ON" => &mut self.time_on,
            aux if AUX_FIELDS.contains(&aux) => {
                self.aux.insert(aux.to_string(), value);
                return true;
            }
            _ => return false,
        };
        *slot = value;
        true
    }

    /// Read a field by its ADIF tag name (case-insensitive).
    pub fn field(&self, name: &str) -> Option<&str> {
        let name = name.trim().to_ascii_uppercase();
        let value = match name.as_str() {
            "BAND" => &self.band,
            "CALL" => &self.call,
            "COMMAND" | "CMD" => &self.command,
            "COMMENT" => &self.comment,
            "FREQ" => &self.frequency,
            "FREQ_TX" => &self.tx_frequency,
            "GRIDSQUARE" => &self.gridsquare,
            "LAT" => &self.latitude,
            "LON" => &self.longitude,
            "MODE" => &self.mode,
            "MY_GRIDSQUARE" => &self.my_gridsquare,
            "NAME" => &self.name,
            "OFFSET" => &self.offset,
            "OPERATOR" => &self.operator,
            "QSO_DATE" => &self.qso_date,
            "QSO_DATE_OFF" => &self.qso_date_off,
            "RADIO" => &self.radio,
            "RST_RCVD" => &self.rst_rcvd,
            "RST_SENT" => &self.rst_sent,
            "STATION" => &self.station,
            "STATION_CALLSIGN" => &self.station_callsign,
            "SUBMODE" => &self.submode,
            "TIME_OFF" => &self.time_off,
            "TIME_ON" => &self.time_on,
            aux if AUX_FIELDS.contains(&aux) => {
                return Some(self.aux.get(aux).map(String::as_str).unwrap_or(""));
            }
            _ => return None,
        };
        Some(value)
    }

    /// The fields every downstream logger receives, in wire order.
    ///
    /// `qso_date_off` repeats `qso_date` and `station_callsign` is always the
    /// configured operator.
    pub fn export_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("band", self.band.clone()),
            ("call", self.call.clone()),
            ("comment", self.comment.clone()),
            ("freq", self.frequency.clone()),
            ("gridsquare", self.gridsquare.clone()),
            ("mode", self.mode.clone()),
            ("my_gridsquare", self.my_gridsquare.clone()),
            ("operator", self.operator.clone()),
            ("qso_date", self.qso_date.clone()),
            ("qso_date_off", self.qso_date.clone()),
            ("rst_rcvd", self.rst_rcvd.clone()),
            ("rst_sent", self.rst_sent.clone()),
            ("station_callsign", self.operator.clone()),
            ("submode", self.submode.clone()),
            ("time_off", self.time_off.clone()),
            ("time_on", self.time_on.clone()),
        ]
    }
}
