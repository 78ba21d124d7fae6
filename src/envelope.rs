//! Inbound event envelopes.
//!
//! Every event that reaches the pipeline is a single line of the form
//!
//! ```text
//! ('192.168.1.20', 2242)|{"type":"RX.DIRECTED","value":"...","params":{...}}
//! ```
//!
//! The left side names the UDP peer that sent the JSON; the right side is the
//! JS8Call API message, untouched.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;

use nom::{
    IResult, Parser,
    bytes::complete::take_till,
    character::complete::{char, space0, u16 as parse_u16},
    sequence::{delimited, separated_pair},
};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::text::strip_non_ascii;

/// Errors that make an envelope unusable.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("Missing '|' between origin and payload")]
    MissingSeparator,

    #[error("Invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Payload has no type")]
    MissingType,
}

/// The UDP peer an event came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Origin {
    pub ip: String,
    pub port: u16,
}

impl Origin {
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
        }
    }
}

impl From<SocketAddr> for Origin {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "('{}', {})", self.ip, self.port)
    }
}

/// Parse `('ip', port)`.
fn parse_origin(input: &str) -> IResult<&str, Origin> {
    let quoted_ip = delimited(char('\''), take_till(|c| c == '\''), char('\''));
    let (rest, (ip, port)) = delimited(
        (char('('), space0),
        separated_pair(quoted_ip, (space0, char(','), space0), parse_u16),
        (space0, char(')')),
    )
    .parse(input)?;
    Ok((rest, Origin::new(ip, port)))
}

/// Message parameters, flattened to trimmed strings.
///
/// JS8Call sends most parameters as strings but numbers (DIAL, OFFSET, SNR)
/// arrive as JSON numbers; both read back the same way here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(HashMap<String, String>);

impl Params {
    /// Get a parameter by its exact name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Get a parameter, or an empty string when absent.
    pub fn get_or_empty(&self, name: &str) -> &str {
        self.get(name).unwrap_or("")
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

#[derive(Deserialize)]
struct RawMessage {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    params: serde_json::Map<String, Value>,
}

/// A parsed inbound event.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Sender, when the origin part could be read.
    pub origin: Option<Origin>,

    /// The JSON payload exactly as received (minus non-ASCII characters).
    pub raw: String,

    /// The message `type`, e.g. `RX.DIRECTED`.
    pub kind: String,

    /// The message `value`.
    pub value: String,

    pub params: Params,
}

impl Envelope {
    /// Build the wire form of an envelope.
    pub fn format(origin: &Origin, payload: &str) -> String {
        format!("{}|{}", origin, payload)
    }

    /// Parse an envelope line.
    ///
    /// An unreadable origin is tolerated (the event is still classified);
    /// an unreadable payload is not.
    pub fn parse(line: &str) -> Result<Self, EnvelopeError> {
        let line = strip_non_ascii(line);
        let (origin_part, payload) = line
            .split_once('|')
            .ok_or(EnvelopeError::MissingSeparator)?;

        let origin = parse_origin(origin_part.trim())
            .ok()
            .map(|(_, origin)| origin);

        let message: RawMessage = serde_json::from_str(payload)?;
        if message.kind.trim().is_empty() {
            return Err(EnvelopeError::MissingType);
        }

        let params = message
            .params
            .iter()
            .map(|(k, v)| (k.clone(), value_to_string(v)))
            .collect();

        Ok(Self {
            origin,
            raw: payload.to_string(),
            kind: message.kind.trim().to_string(),
            value: value_to_string(&message.value),
            params: Params(params),
        })
    }
}
