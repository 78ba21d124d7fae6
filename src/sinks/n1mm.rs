//! N1MM Logger+ sink.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use super::{Sink, SinkError, UdpTarget};
use crate::adif::encode_record;
use crate::record::ContactRecord;

/// Hz to MHz, always with a fractional part so N1MM keeps its formatting.
fn format_mhz(hz: f64) -> String {
    let mhz = hz / 1_000_000.0;
    if mhz.fract() == 0.0 {
        format!("{:.1}", mhz)
    } else {
        mhz.to_string()
    }
}

/// Build the `<command:3>Log<parameters:N>...` packet.
///
/// N1MM wants the frequency in MHz; a frequency that is not a number is an
/// error.
pub fn n1mm_packet(record: &ContactRecord) -> Result<String, SinkError> {
    let hz: f64 = record
        .frequency
        .trim()
        .parse()
        .map_err(|_| SinkError::InvalidField {
            field: "freq",
            value: record.frequency.clone(),
        })?;

    let mut fields = record.export_fields();
    for (tag, value) in fields.iter_mut() {
        if *tag == "freq" {
            *value = format_mhz(hz);
        }
    }

    let tags = encode_record(&fields, "");
    Ok(format!(
        "<command:3>Log<parameters:{}>{}",
        tags.chars().count(),
        tags
    ))
}

pub struct N1mmSink {
    target: UdpTarget,
}

impl N1mmSink {
    pub async fn new(host: &str, port: u16) -> Result<Self, SinkError> {
        Ok(Self {
            target: UdpTarget::new(host, port).await?,
        })
    }
}

#[async_trait]
impl Sink for N1mmSink {
    fn name(&self) -> &str {
        "n1mm"
    }

    async fn log_qso(&self, record: &ContactRecord, _now: DateTime<Utc>) -> Result<(), SinkError> {
        let packet = n1mm_packet(record)?;
        self.target.send(packet.as_bytes()).await?;
        debug!("Sent N1MM log for {}", record.call);
        Ok(())
    }
}
