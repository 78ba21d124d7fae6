//! GeoServer (GeoChron) sink: grid spots and a scrolling text legend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use super::{Sink, SinkError, UdpTarget};
use crate::record::ContactRecord;
use crate::text::{find_ignore_case, truncate_chars};

/// Longest message the legend can show.
pub const GEO_MESSAGE_LIMIT: usize = 40;

#[derive(Serialize)]
struct GeoPacket<P> {
    #[serde(rename = "type")]
    kind: &'static str,
    params: P,
}

#[derive(Serialize)]
#[serde(rename_all = "UPPERCASE")]
struct SpotParams<'a> {
    auth: &'a str,
    call: &'a str,
    grid: &'a str,
    color: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "UPPERCASE")]
struct MessageParams<'a> {
    auth: &'a str,
    message: &'a str,
}

/// The legend line for a record.
///
/// INFO and STATUS texts are cut to start at their keyword and tagged with the
/// sender; anything else is sent as is. Always prefixed with the UTC time.
pub fn message_text(record: &ContactRecord, now: DateTime<Utc>) -> String {
    let dtg = now.format("%H:%M:%S");
    let comment = record.comment.as_str();

    let message = ["INFO ", "STATUS "]
        .iter()
        .find_map(|token| find_ignore_case(comment, token))
        .map(|start| format!("{} {} {}", dtg, record.call, &comment[start..]))
        .unwrap_or_else(|| format!("{} {}", dtg, comment));

    truncate_chars(&message, GEO_MESSAGE_LIMIT).to_string()
}

pub struct GeoServerSink {
    target: UdpTarget,
    token: String,
    spots: bool,
    messages: bool,
}

impl GeoServerSink {
    pub async fn new(
        host: &str,
        port: u16,
        token: impl Into<String>,
        spots: bool,
        messages: bool,
    ) -> Result<Self, SinkError> {
        Ok(Self {
            target: UdpTarget::new(host, port).await?,
            token: token.into(),
            spots,
            messages,
        })
    }

    fn spot_json(&self, record: &ContactRecord) -> Result<String, SinkError> {
        let packet = GeoPacket {
            kind: "SPOT.GRID",
            params: SpotParams {
                auth: &self.token,
                call: &record.call,
                grid: &record.gridsquare,
                color: &record.status_color,
            },
        };
        Ok(serde_json::to_string_pretty(&packet)?)
    }

    fn message_json(&self, message: &str) -> Result<String, SinkError> {
        let packet = GeoPacket {
            kind: "MESSAGE.SEND",
            params: MessageParams {
                auth: &self.token,
                message,
            },
        };
        Ok(serde_json::to_string_pretty(&packet)?)
    }
}

#[async_trait]
impl Sink for GeoServerSink {
    fn name(&self) -> &str {
        "geoserver"
    }

    async fn log_qso(&self, record: &ContactRecord, _now: DateTime<Utc>) -> Result<(), SinkError> {
        if !self.spots {
            return Ok(());
        }
        if record.call.is_empty() || record.gridsquare.is_empty() {
            debug!("GeoServer spot skipped, call or grid missing");
            return Ok(());
        }
        let json = self.spot_json(record)?;
        self.target.send(json.as_bytes()).await?;
        debug!("Sent GeoServer spot for {}", record.call);
        Ok(())
    }

    async fn message(&self, record: &ContactRecord, now: DateTime<Utc>) -> Result<(), SinkError> {
        if !self.messages {
            return Ok(());
        }
        if record.comment.is_empty() {
            debug!("GeoServer message skipped, no text");
            return Ok(());
        }
        let json = self.message_json(&message_text(record, now))?;
        self.target.send(json.as_bytes()).await?;
        debug!("Sent GeoServer message for {}", record.call);
        Ok(())
    }
}
