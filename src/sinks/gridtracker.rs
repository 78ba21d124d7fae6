//! GridTracker sink.
//!
//! GridTracker listens for WSJT-X UDP datagrams, so we pose as a WSJT-X
//! instance. All packets share a big-endian header:
//!
//! ```text
//! magic u32 | schema u32 | type u32 | id (u32 length + UTF-8)
//! ```
//!
//! Strings are Qt `QByteArray`s: a u32 byte length followed by the bytes.

use async_trait::async_trait;
use chrono::{DateTime, Timelike, Utc};
use serde::Serialize;
use tracing::debug;

use super::{Sink, SinkError, UdpTarget};
use crate::adif::encode_record;
use crate::record::ContactRecord;
use crate::text::{contains_ignore_case, truncate_chars};

pub const WSJTX_MAGIC: u32 = 0xadbc_cbda;
pub const WSJTX_SCHEMA: u32 = 2;
/// The client id GridTracker sees.
pub const WSJTX_ID: &str = "WSJT-X";

const VERSION: &str = "1";
const REVISION: &str = "1";

const TYPE_HEARTBEAT: u32 = 0;
const TYPE_STATUS: u32 = 1;
const TYPE_DECODE: u32 = 2;
const TYPE_LOGGED_ADIF: u32 = 12;

const LOGGED_ADIF_HEADER: &str = "<adif_ver:5>3.0.7<programid:6>WSJT-X<EOH>";

/// Builds one datagram.
struct PacketWriter {
    buf: Vec<u8>,
}

impl PacketWriter {
    fn new(kind: u32) -> Self {
        let mut writer = Self {
            buf: Vec::with_capacity(256),
        };
        writer.u32(WSJTX_MAGIC);
        writer.u32(WSJTX_SCHEMA);
        writer.u32(kind);
        writer.string(WSJTX_ID);
        writer
    }

    fn u32(&mut self, v: u32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    fn i32(&mut self, v: i32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    fn u64(&mut self, v: u64) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    fn f64(&mut self, v: f64) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    fn u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    fn bool(&mut self, v: bool) -> &mut Self {
        self.u8(u8::from(v))
    }

    fn string(&mut self, s: &str) -> &mut Self {
        let bytes = s.as_bytes();
        self.u32(bytes.len() as u32);
        self.buf.extend_from_slice(bytes);
        self
    }

    fn finish(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }
}

/// The WSJT-X status snapshot GridTracker maps from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridTrackerState {
    pub dial_frequency: u64,
    pub mode: String,
    pub dx_call: String,
    pub report: String,
    pub tx_mode: String,
    pub tx_enabled: bool,
    pub transmitting: bool,
    pub decoding: bool,
    pub rx_df: i32,
    pub tx_df: i32,
    pub de_call: String,
    pub de_grid: String,
    pub dx_grid: String,
    pub tx_watchdog: bool,
    pub sub_mode: String,
    pub fast_mode: bool,
    pub special_op_mode: u8,
}

impl GridTrackerState {
    /// Snapshot a record. Unparsable numbers become zero.
    ///
    /// The DF fields carry the reports, which is what GridTracker shows.
    pub fn from_record(record: &ContactRecord) -> Self {
        Self {
            dial_frequency: record.frequency.trim().parse().unwrap_or(0),
            mode: record.mode.clone(),
            dx_call: record.call.clone(),
            report: String::new(),
            tx_mode: record.mode.clone(),
            tx_enabled: false,
            transmitting: false,
            decoding: false,
            rx_df: record.rst_rcvd.trim().parse().unwrap_or(0),
            tx_df: record.rst_sent.trim().parse().unwrap_or(0),
            de_call: String::new(),
            de_grid: String::new(),
            dx_grid: record.gridsquare.clone(),
            tx_watchdog: false,
            sub_mode: record.submode.clone(),
            fast_mode: false,
            special_op_mode: 0,
        }
    }

    /// Encode as a status (type 1) packet.
    pub fn encode(&self) -> Vec<u8> {
        PacketWriter::new(TYPE_STATUS)
            .u64(self.dial_frequency)
            .string(&self.mode)
            .string(&self.dx_call)
            .string(&self.report)
            .string(&self.tx_mode)
            .bool(self.tx_enabled)
            .bool(self.transmitting)
            .bool(self.decoding)
            .i32(self.rx_df)
            .i32(self.tx_df)
            .string(&self.de_call)
            .string(&self.de_grid)
            .string(&self.dx_grid)
            .bool(self.tx_watchdog)
            .string(&self.sub_mode)
            .bool(self.fast_mode)
            .u8(self.special_op_mode)
            .finish()
    }
}

/// Heartbeat (type 0) packet.
pub fn encode_heartbeat() -> Vec<u8> {
    PacketWriter::new(TYPE_HEARTBEAT)
        .u32(WSJTX_SCHEMA)
        .string(VERSION)
        .string(REVISION)
        .finish()
}

/// The decode text GridTracker parses for its map.
///
/// `<station> <call> <grid4>`, or `CQ <call> <grid4>` for a CQ. A command that
/// also mentions SNR or HEARTBEAT keeps the directed form.
pub fn decode_text(record: &ContactRecord) -> String {
    let grid = truncate_chars(&record.gridsquare, 4);
    let command = record.command.as_str();
    let is_cq = contains_ignore_case(command, "CQ")
        && !contains_ignore_case(command, "SNR")
        && !contains_ignore_case(command, "HEARTBEAT");

    if is_cq {
        format!("CQ {} {}", record.call, grid)
    } else {
        format!("{} {} {}", record.station, record.call, grid)
    }
}

/// Milliseconds since UTC midnight, the WSJT-X decode timestamp.
pub fn millis_since_midnight(now: DateTime<Utc>) -> u32 {
    now.num_seconds_from_midnight() * 1000 + (now.timestamp_subsec_millis() % 1000)
}

/// Decode (type 2) packet.
pub fn encode_decode(record: &ContactRecord, now: DateTime<Utc>) -> Vec<u8> {
    PacketWriter::new(TYPE_DECODE)
        .bool(true)
        .u32(millis_since_midnight(now))
        .i32(record.rst_sent.trim().parse().unwrap_or(0))
        .f64(0.0)
        .u32(record.offset.trim().parse().unwrap_or(0))
        .string(&record.mode)
        .string(&decode_text(record))
        .bool(false)
        .bool(false)
        .finish()
}

/// Logged ADIF (type 12) packet.
pub fn encode_logged_adif(record: &ContactRecord) -> Vec<u8> {
    let adif = format!(
        "{}{}",
        LOGGED_ADIF_HEADER,
        encode_record(&record.export_fields(), "")
    );
    PacketWriter::new(TYPE_LOGGED_ADIF).string(&adif).finish()
}

pub struct GridTrackerSink {
    target: UdpTarget,
}

impl GridTrackerSink {
    pub async fn new(host: &str, port: u16) -> Result<Self, SinkError> {
        Ok(Self {
            target: UdpTarget::new(host, port).await?,
        })
    }
}

#[async_trait]
impl Sink for GridTrackerSink {
    fn name(&self) -> &str {
        "gridtracker"
    }

    async fn status(&self, state: &GridTrackerState) -> Result<(), SinkError> {
        self.target.send(&state.encode()).await?;
        debug!("Sent GridTracker status for {}", state.dx_call);
        Ok(())
    }

    async fn decode(&self, record: &ContactRecord, now: DateTime<Utc>) -> Result<(), SinkError> {
        self.target.send(&encode_decode(record, now)).await?;
        debug!("Sent GridTracker decode: {}", decode_text(record));
        Ok(())
    }

    async fn log_qso(&self, record: &ContactRecord, _now: DateTime<Utc>) -> Result<(), SinkError> {
        self.target.send(&encode_logged_adif(record)).await?;
        debug!("Sent GridTracker log for {}", record.call);
        Ok(())
    }

    async fn heartbeat(&self) -> Result<(), SinkError> {
        self.target.send(&encode_heartbeat()).await?;
        debug!("Sent GridTracker heartbeat");
        Ok(())
    }
}
