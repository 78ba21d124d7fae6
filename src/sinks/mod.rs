//! Downstream loggers and mappers.
//!
//! Every enabled destination implements [`Sink`]. The [`Dispatcher`] calls
//! them in a fixed sequence for each forwarded record; one sink failing never
//! stops the others.

mod files;
mod geoserver;
mod gridtracker;
mod n1mm;

pub use files::{ADIF_HEADER, AdifLogSink, AprsLogSink, aprs_line};
pub use geoserver::{GEO_MESSAGE_LIMIT, GeoServerSink, message_text};
pub use gridtracker::{
    GridTrackerSink, GridTrackerState, WSJTX_ID, WSJTX_MAGIC, WSJTX_SCHEMA, decode_text,
    millis_since_midnight,
};
pub use n1mm::{N1mmSink, n1mm_packet};

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

use crate::record::ContactRecord;
use crate::stats::MonitorStats;
use crate::text::truncate_chars;

/// Errors from delivering to a sink.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid {field} value: {value:?}")]
    InvalidField { field: &'static str, value: String },
}

/// A destination for forwarded records.
///
/// Only `log_qso` is required; the other hooks default to doing nothing
/// because most sinks only care about logged records.
#[async_trait]
pub trait Sink: Send + Sync {
    fn name(&self) -> &str;

    /// Push the latest station state.
    async fn status(&self, _state: &GridTrackerState) -> Result<(), SinkError> {
        Ok(())
    }

    /// Report the record as a decoded transmission.
    async fn decode(&self, _record: &ContactRecord, _now: DateTime<Utc>) -> Result<(), SinkError> {
        Ok(())
    }

    /// Log the record.
    async fn log_qso(&self, record: &ContactRecord, now: DateTime<Utc>) -> Result<(), SinkError>;

    /// Post the record's text as a short message.
    async fn message(&self, _record: &ContactRecord, _now: DateTime<Utc>) -> Result<(), SinkError> {
        Ok(())
    }

    /// Liveness ping, sent when a radio checks in.
    async fn heartbeat(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// A UDP destination.
///
/// Sends go out of one ephemeral socket; the host is resolved on every send
/// so a name that moves is followed.
#[derive(Debug)]
pub struct UdpTarget {
    socket: UdpSocket,
    host: String,
    port: u16,
}

impl UdpTarget {
    pub async fn new(host: impl Into<String>, port: u16) -> Result<Self, SinkError> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        Ok(Self {
            socket,
            host: host.into(),
            port,
        })
    }

    pub async fn send(&self, payload: &[u8]) -> Result<(), SinkError> {
        self.socket
            .send_to(payload, (self.host.as_str(), self.port))
            .await?;
        Ok(())
    }
}

/// Which optional steps a forward includes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Extras {
    /// Also send a decode.
    pub decode: bool,
    /// Also post a text message.
    pub message: bool,
}

impl Extras {
    pub const NONE: Extras = Extras {
        decode: false,
        message: false,
    };
    pub const DECODE: Extras = Extras {
        decode: true,
        message: false,
    };
    pub const MESSAGE: Extras = Extras {
        decode: false,
        message: true,
    };
}

/// Fans a record out to every enabled sink.
pub struct Dispatcher {
    sinks: Vec<Box<dyn Sink>>,
    grid_length: usize,
    last_state: Option<GridTrackerState>,
    stats: Option<Arc<MonitorStats>>,
}

impl Dispatcher {
    pub fn new(sinks: Vec<Box<dyn Sink>>, grid_length: usize) -> Self {
        Self {
            sinks,
            grid_length,
            last_state: None,
            stats: None,
        }
    }

    pub fn with_stats(mut self, stats: Arc<MonitorStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn sink_names(&self) -> Vec<&str> {
        self.sinks.iter().map(|s| s.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// The state sent with the last status push.
    pub fn last_state(&self) -> Option<&GridTrackerState> {
        self.last_state.as_ref()
    }

    /// Log a failed send and count it.
    fn settle(&self, sink: &dyn Sink, step: &str, result: Result<(), SinkError>) -> bool {
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!("{} {} failed: {}", sink.name(), step, e);
                if let Some(stats) = &self.stats {
                    stats.record_sink_failure(sink.name());
                }
                false
            }
        }
    }

    async fn push_status(&self, state: &GridTrackerState) -> usize {
        let mut failures = 0;
        for sink in &self.sinks {
            let result = sink.status(state).await;
            if !self.settle(sink.as_ref(), "status", result) {
                failures += 1;
            }
        }
        failures
    }

    /// Forward a record: status push, decode if asked, log, message if asked.
    ///
    /// The grid is cut to the configured length first. Returns the number
    /// of failed sends.
    pub async fn forward(
        &mut self,
        record: &mut ContactRecord,
        extras: Extras,
        now: DateTime<Utc>,
    ) -> usize {
        record.gridsquare = truncate_chars(&record.gridsquare, self.grid_length).to_string();
        let record: &ContactRecord = record;

        let state = GridTrackerState::from_record(record);
        let mut failures = self.push_status(&state).await;
        self.last_state = Some(state);

        for sink in &self.sinks {
            if extras.decode {
                let result = sink.decode(record, now).await;
                if !self.settle(sink.as_ref(), "decode", result) {
                    failures += 1;
                }
            }
        }

        for sink in &self.sinks {
            let result = sink.log_qso(record, now).await;
            if !self.settle(sink.as_ref(), "log", result) {
                failures += 1;
            }
        }

        if extras.message {
            for sink in &self.sinks {
                let result = sink.message(record, now).await;
                if !self.settle(sink.as_ref(), "message", result) {
                    failures += 1;
                }
            }
        }

        debug!(
            "Forwarded {} to {} sinks ({} failures)",
            record.call,
            self.sinks.len(),
            failures
        );
        if let Some(stats) = &self.stats {
            stats.record_forward();
        }
        failures
    }

    /// Send the last status again. Returns `false` when nothing was sent yet.
    pub async fn resend_status(&self) -> bool {
        let Some(state) = &self.last_state else {
            debug!("No status to refresh yet");
            return false;
        };
        self.push_status(state).await;
        true
    }

    /// Send a heartbeat through every sink.
    pub async fn heartbeat(&self) -> usize {
        let mut failures = 0;
        for sink in &self.sinks {
            let result = sink.heartbeat().await;
            if !self.settle(sink.as_ref(), "heartbeat", result) {
                failures += 1;
            }
        }
        failures
    }
}
