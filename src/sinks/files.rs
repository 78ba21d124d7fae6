//! Log file sinks: a YAAC-readable APRS log and an ADIF export.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::{Sink, SinkError};
use crate::adif::encode_record;
use crate::locator::{LatLon, aprs_latitude, aprs_longitude, to_lat_lon};
use crate::record::ContactRecord;

/// First line of a new ADIF export.
pub const ADIF_HEADER: &str = "JS8Monitor ADIF Export<eoh>\n";

async fn append(path: &Path, line: &str) -> Result<(), SinkError> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

/// The record's position: its own LAT/LON if both parse, else the centre of
/// its grid square.
fn position(record: &ContactRecord) -> Option<LatLon> {
    if let (Ok(lat), Ok(lon)) = (
        record.latitude.trim().parse::<f64>(),
        record.longitude.trim().parse::<f64>(),
    ) {
        return Some(LatLon { lat, lon });
    }
    to_lat_lon(&record.gridsquare)
}

/// One APRS log line, or `None` when the record has no usable position.
///
/// ```text
/// 01/Mar/2024 12:34:56,X0AW>NULL:=4130.00N\07300.00WW FN31 comment
/// ```
pub fn aprs_line(record: &ContactRecord, now: DateTime<Utc>) -> Option<String> {
    let pos = position(record)?;
    let skip = record.call.chars().count().saturating_sub(2);
    let suffix: String = record.call.chars().skip(skip).collect();

    Some(format!(
        "{},X0{}>NULL:={}{}{}{} {} {}\n",
        now.format("%d/%b/%Y %H:%M:%S"),
        suffix,
        aprs_latitude(pos.lat),
        record.status_icon.table,
        aprs_longitude(pos.lon),
        record.status_icon.code,
        record.gridsquare,
        record.comment
    ))
}

/// Appends APRS position lines for YAAC.
pub struct AprsLogSink {
    path: PathBuf,
}

impl AprsLogSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Sink for AprsLogSink {
    fn name(&self) -> &str {
        "aprs"
    }

    async fn log_qso(&self, record: &ContactRecord, now: DateTime<Utc>) -> Result<(), SinkError> {
        let Some(line) = aprs_line(record, now) else {
            debug!("No position for {}, APRS line skipped", record.call);
            return Ok(());
        };
        append(&self.path, &line).await?;
        debug!("Wrote APRS line for {}", record.call);
        Ok(())
    }
}

/// Appends records to an ADIF file, writing the header when it creates it.
pub struct AdifLogSink {
    path: PathBuf,
}

impl AdifLogSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Sink for AdifLogSink {
    fn name(&self) -> &str {
        "adif"
    }

    async fn log_qso(&self, record: &ContactRecord, _now: DateTime<Utc>) -> Result<(), SinkError> {
        let mut out = String::new();
        if !tokio::fs::try_exists(&self.path).await? {
            out.push_str(ADIF_HEADER);
        }
        out.push_str(&encode_record(&record.export_fields(), " "));
        out.push('\n');

        append(&self.path, &out).await?;
        debug!("Wrote ADIF record for {}", record.call);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StationConfig;
    use crate::record::AprsSymbol;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 34, 56).unwrap()
    }

    fn record() -> ContactRecord {
        let mut record = ContactRecord::directed(&StationConfig::default());
        record.call = "W1AW".to_string();
        record.gridsquare = "FN31".to_string();
        record.comment = "hello".to_string();
        record.status_icon = AprsSymbol::new('\\', 'W');
        record
    }

    #[test]
    fn test_aprs_line() {
        assert_eq!(
            aprs_line(&record(), now()).unwrap(),
            "01/Mar/2024 12:34:56,X0AW>NULL:=4130.00N\\07300.00WW FN31 hello\n"
        );
    }

    #[test]
    fn test_aprs_line_prefers_explicit_position() {
        let mut rec = record();
        rec.latitude = "-33.5".to_string();
        rec.longitude = "151.25".to_string();
        let line = aprs_line(&rec, now()).unwrap();
        assert!(line.contains(":=3330.00S\\15115.00EW "));
    }

    #[test]
    fn test_aprs_line_needs_position() {
        let mut rec = record();
        rec.gridsquare = "FN3".to_string();
        assert!(aprs_line(&rec, now()).is_none());
        rec.gridsquare.clear();
        assert!(aprs_line(&rec, now()).is_none());
    }

    #[test]
    fn test_aprs_short_call() {
        let mut rec = record();
        rec.call = "K".to_string();
        assert!(aprs_line(&rec, now()).unwrap().contains(",X0K>NULL"));
    }

    #[tokio::test]
    async fn test_aprs_sink_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aprs.log");
        let sink = AprsLogSink::new(&path);

        sink.log_qso(&record(), now()).await.unwrap();
        sink.log_qso(&record(), now()).await.unwrap();
        let mut no_grid = record();
        no_grid.gridsquare.clear();
        sink.log_qso(&no_grid, now()).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_adif_sink_writes_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.adi");
        let sink = AdifLogSink::new(&path);

        sink.log_qso(&record(), now()).await.unwrap();
        sink.log_qso(&record(), now()).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "JS8Monitor ADIF Export<eoh>");
        assert!(lines[1].starts_with("<band:0> <call:4>W1AW <comment:5>hello "));
        assert!(lines[1].ends_with("<eor> "));
        assert_eq!(lines[1], lines[2]);
    }
}
