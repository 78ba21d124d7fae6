//! The event pipeline.
//!
//! [`Monitor`] takes one envelope at a time, builds a fresh
//! [`ContactRecord`] for it, fills in what JS8Call left out and hands the
//! result to the sinks. Commands from client applications are checked and
//! queued for the relay task.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::adif::{extract_field, extract_field_last};
use crate::alert::{Alerter, alert_body};
use crate::band::resolve_record_band;
use crate::config::{AuthConfig, Config, GridsConfig, StationConfig};
use crate::envelope::{Envelope, Origin};
use crate::event::{CommandKind, DirectedBranch, EventKind, classify_directed};
use crate::grid::GridResolver;
use crate::hosts::{HostDirectory, RadioRegistry};
use crate::info::InfoAnnotator;
use crate::record::{ContactRecord, UNKNOWN_HOST};
use crate::relay::RelayCommand;
use crate::sinks::{Dispatcher, Extras};
use crate::stats::MonitorStats;
use crate::text::{
    contains_ignore_case, find_ignore_case, find_ignore_case_within, slice_clamped, truncate_chars,
};

/// Fields copied out of a LOG.QSO blob.
const LOGGED_FIELDS: &[&str] = &[
    "BAND",
    "CALL",
    "COMMENT",
    "FREQ",
    "GRIDSQUARE",
    "MODE",
    "NAME",
    "QSO_DATE",
    "QSO_DATE_OFF",
    "RST_RCVD",
    "RST_SENT",
    "STATION_CALLSIGN",
    "SUBMODE",
    "TIME_OFF",
    "TIME_ON",
];

/// How far before the end marker an SNR report may start.
const SNR_WINDOW: usize = 9;

/// Start of the SNR search window ending at `end`.
///
/// When `end` is closer than [`SNR_WINDOW`] to the start of the text the
/// offset wraps around from the end of the text, so short texts only search
/// their tail (and often find nothing).
fn window_start(len: usize, end: usize) -> usize {
    match end.checked_sub(SNR_WINDOW) {
        Some(start) => start,
        None => (len + end).saturating_sub(SNR_WINDOW),
    }
}

/// Why a command never reached the relay queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// No RADIO parameter.
    NoRadio,
    /// The radio has not sent a PING yet.
    UnknownRadio,
    /// The relay task is gone.
    RelayClosed,
}

/// What happened to one event.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The envelope could not be read.
    Malformed,
    /// An echo or an unknown type; logged only.
    Ignored,
    FrequencyChanged { band: String },
    Directed {
        branch: DirectedBranch,
        record: Box<ContactRecord>,
        forwarded: bool,
    },
    Logged {
        record: Box<ContactRecord>,
        forwarded: bool,
    },
    RadioSeen { origin: Option<Origin> },
    StatusRefreshed { sent: bool },
    CommandQueued(CommandKind),
    CommandDropped { kind: CommandKind, reason: DropReason },
    /// A command or unknown event carried the wrong token.
    Unauthorized,
    /// JS8Call shut down. `exit` is set when the monitor should follow.
    Closed { exit: bool },
}

/// Owns every piece of per-event state. One event is handled at a time.
pub struct Monitor {
    station: StationConfig,
    grids: GridsConfig,
    auth: AuthConfig,
    annotator: InfoAnnotator,
    resolver: GridResolver,
    hosts: HostDirectory,
    radios: RadioRegistry,
    dispatcher: Dispatcher,
    relay: mpsc::UnboundedSender<RelayCommand>,
    alerter: Option<Arc<dyn Alerter>>,
    stats: Option<Arc<MonitorStats>>,
}

impl Monitor {
    pub fn new(
        config: &Config,
        resolver: GridResolver,
        dispatcher: Dispatcher,
        hosts: HostDirectory,
        relay: mpsc::UnboundedSender<RelayCommand>,
    ) -> Self {
        Self {
            station: config.station.clone(),
            grids: config.grids.clone(),
            auth: config.auth.clone(),
            annotator: InfoAnnotator::new(
                config.styles.clone(),
                config.grids.from_info,
                config.grids.effective_grid_length(),
            ),
            resolver,
            hosts,
            radios: RadioRegistry::new(),
            dispatcher,
            relay,
            alerter: None,
            stats: None,
        }
    }

    /// Send INFO and STATUS alerts through `alerter`.
    pub fn with_alerter(mut self, alerter: Arc<dyn Alerter>) -> Self {
        self.alerter = Some(alerter);
        self
    }

    pub fn with_stats(mut self, stats: Arc<MonitorStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Radios seen so far.
    pub fn radios(&self) -> &RadioRegistry {
        &self.radios
    }

    /// Handle one envelope line, stamped with the current time.
    pub async fn handle(&mut self, line: &str) -> Outcome {
        self.handle_at(line, Utc::now()).await
    }

    /// Handle one envelope line as if it arrived at `now`.
    pub async fn handle_at(&mut self, line: &str, now: DateTime<Utc>) -> Outcome {
        if let Some(stats) = &self.stats {
            stats.record_event(line.len() as u64);
        }

        let envelope = match Envelope::parse(line) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Dropping envelope: {}", e);
                debug!("Bad envelope: {}", line);
                if let Some(stats) = &self.stats {
                    stats.record_malformed();
                }
                return Outcome::Malformed;
            }
        };

        if let Some(stats) = &self.stats {
            stats.record_event_type(&envelope.kind);
        }

        let host_name = match &envelope.origin {
            Some(origin) => self.hosts.name_for(&origin.ip).to_string(),
            None => UNKNOWN_HOST.to_string(),
        };
        debug!("{} from {}", envelope.kind, host_name);

        match EventKind::from_type(&envelope.kind) {
            EventKind::Echo => {
                debug!("Echo {}: {}", envelope.kind, envelope.value);
                Outcome::Ignored
            }
            EventKind::RigFreq => self.rig_freq(&envelope, host_name),
            EventKind::Close => {
                info!(target: "smdr", "JS8Call has terminated.");
                Outcome::Closed {
                    exit: self.grids.auto_close,
                }
            }
            EventKind::LogQso => self.log_qso(&envelope, host_name, now).await,
            EventKind::Ping => self.ping(&envelope).await,
            EventKind::RxActivity => Outcome::StatusRefreshed {
                sent: self.dispatcher.resend_status().await,
            },
            EventKind::RxDirected => self.directed(&envelope, host_name, now).await,
            EventKind::Command(kind) => self.command(&envelope, kind),
            EventKind::Unknown => {
                if !self.authorized(&envelope) {
                    return Outcome::Unauthorized;
                }
                info!("Unhandled message type {} from {}", envelope.kind, host_name);
                Outcome::Ignored
            }
        }
    }

    fn record_for(&self, envelope: &Envelope, host_name: String, directed: bool) -> ContactRecord {
        let mut record = if directed {
            ContactRecord::directed(&self.station)
        } else {
            ContactRecord::new(&self.station)
        };
        record.host = envelope.origin.clone();
        record.host_name = host_name;
        record
    }

    fn rig_freq(&self, envelope: &Envelope, host_name: String) -> Outcome {
        let mut record = self.record_for(envelope, host_name, false);
        let params = &envelope.params;
        if let Some(dial) = params.get("DIAL") {
            record.frequency = dial.to_string();
        }
        if let Some(freq) = params.get("FREQ") {
            record.tx_frequency = freq.to_string();
        }
        if let Some(offset) = params.get("OFFSET") {
            record.offset = offset.to_string();
        }
        resolve_record_band(&mut record);

        info!(
            target: "smdr",
            "Frequency Change >> BAND: {} FREQ: {} OFFSET: {}",
            record.band,
            record.frequency,
            record.offset
        );
        Outcome::FrequencyChanged { band: record.band }
    }

    async fn log_qso(&mut self, envelope: &Envelope, host_name: String, now: DateTime<Utc>) -> Outcome {
        let mut record = self.record_for(envelope, host_name, false);
        self.annotator.styles().no_info.apply_to(&mut record);

        for field in LOGGED_FIELDS {
            let value = if *field == "MODE" {
                extract_field_last(&envelope.value, field)
            } else {
                extract_field(&envelope.value, field)
            };
            if let Some(value) = value {
                record.set_field(field, value.trim());
            }
        }
        record.frequency = record.frequency.replace('.', "");
        if let Some(command) = envelope.params.get("CMD") {
            record.command = command.to_string();
        }

        self.resolver.resolve(&mut record).await;
        record.comment = format!("{}: {}", record.call, record.comment);
        info!(target: "smdr", "{}", record.comment);

        let forwarded = self.grids.map_log;
        if forwarded {
            self.dispatcher.forward(&mut record, Extras::NONE, now).await;
        }
        Outcome::Logged {
            record: Box::new(record),
            forwarded,
        }
    }

    async fn ping(&mut self, envelope: &Envelope) -> Outcome {
        if let Some(origin) = &envelope.origin {
            self.radios.register(&origin.ip, origin.port);
        }
        self.dispatcher.heartbeat().await;
        Outcome::RadioSeen {
            origin: envelope.origin.clone(),
        }
    }

    async fn directed(&mut self, envelope: &Envelope, host_name: String, now: DateTime<Utc>) -> Outcome {
        let mut record = self.record_for(envelope, host_name, true);
        let params = &envelope.params;
        for (param, field) in [
            ("FROM", "CALL"),
            ("CMD", "COMMAND"),
            ("TEXT", "COMMENT"),
            ("DIAL", "FREQ"),
            ("GRID", "GRIDSQUARE"),
            ("OFFSET", "OFFSET"),
            ("RADIO", "RADIO"),
            ("SNR", "RST_RCVD"),
            ("TO", "STATION"),
        ] {
            if let Some(value) = params.get(param) {
                record.set_field(field, value);
            }
        }
        self.annotator.styles().no_info.apply_to(&mut record);
        record.stamp_utc(now);

        let branch = classify_directed(&record.command);
        debug!("Directed {} from {}", branch, record.call);
        if let Some(stats) = &self.stats {
            stats.record_directed(branch);
        }

        let extras = match branch {
            DirectedBranch::Query => {
                self.fill_in(&mut record).await;
                None
            }
            DirectedBranch::Cq => {
                self.fill_in(&mut record).await;
                self.grids.map_cq.then_some(Extras::DECODE)
            }
            DirectedBranch::Heartbeat => {
                self.fill_in(&mut record).await;
                self.grids.map_heartbeat.then_some(Extras::DECODE)
            }
            DirectedBranch::Snr => match self.snr_report(&record.comment) {
                Some(report) => {
                    record.rst_sent = report;
                    self.fill_in(&mut record).await;
                    self.grids.map_snr.then_some(Extras::DECODE)
                }
                None => None,
            },
            DirectedBranch::Info => {
                resolve_record_band(&mut record);
                self.annotator.annotate(&mut record);
                self.resolver.resolve(&mut record).await;
                self.grids.map_info.then_some(Extras::MESSAGE)
            }
            DirectedBranch::Status => {
                self.annotator.styles().status.apply_to(&mut record);
                self.fill_in(&mut record).await;
                self.grids.map_status.then_some(Extras::MESSAGE)
            }
            DirectedBranch::Qso => {
                self.fill_in(&mut record).await;
                self.grids.map_qso.then_some(Extras::NONE)
            }
        };

        info!(target: "smdr", "{}", record.comment);

        let forwarded = match extras {
            Some(extras) => {
                self.dispatcher.forward(&mut record, extras, now).await;
                true
            }
            None => false,
        };

        match branch {
            DirectedBranch::Info => self.alert("New Info Message", &record.comment),
            DirectedBranch::Status => self.alert("New Status Message", &record.comment),
            _ => {}
        }

        Outcome::Directed {
            branch,
            record: Box::new(record),
            forwarded,
        }
    }

    /// Band from the dial frequency, then the grid.
    async fn fill_in(&self, record: &mut ContactRecord) {
        resolve_record_band(record);
        self.resolver.resolve(record).await;
    }

    /// Pull the report out of `... SNR -12` or `... SNR -12 MSG ...`.
    ///
    /// Returns `None` when the report is not for this station (unless every
    /// SNR is mapped) or no `SNR ` sits just before the end marker. A report
    /// that is not a number reads as `0`.
    fn snr_report(&self, comment: &str) -> Option<String> {
        if !self.grids.map_all && !contains_ignore_case(comment, &self.station.operator) {
            debug!("SNR report is not for {}", self.station.operator);
            return None;
        }

        let end = find_ignore_case(comment, "MSG").unwrap_or(comment.len());
        let start = find_ignore_case_within(comment, "SNR ", window_start(comment.len(), end), end)?;
        let report = truncate_chars(slice_clamped(comment, start + 3, end).trim(), 4);

        match report.parse::<i32>() {
            Ok(_) => Some(report.to_string()),
            Err(_) => Some("0".to_string()),
        }
    }

    fn alert(&self, subject: &'static str, text: &str) {
        let Some(alerter) = &self.alerter else {
            return;
        };
        let alerter = Arc::clone(alerter);
        let body = alert_body(text);
        tokio::spawn(async move {
            if let Err(e) = alerter.send(subject, &body).await {
                warn!("Failed to send alert '{}': {}", subject, e);
            }
        });
    }

    fn authorized(&self, envelope: &Envelope) -> bool {
        if self.auth.permits(envelope.params.get("AUTH")) {
            return true;
        }
        info!(target: "smdr", "Authorization Failure.");
        debug!("Rejected {} from {:?}", envelope.kind, envelope.origin);
        false
    }

    fn command(&self, envelope: &Envelope, kind: CommandKind) -> Outcome {
        if !self.authorized(envelope) {
            if let Some(stats) = &self.stats {
                stats.record_command_dropped();
            }
            return Outcome::Unauthorized;
        }

        let outcome = self.queue(envelope, kind);
        if let Some(stats) = &self.stats {
            match &outcome {
                Outcome::CommandQueued(_) => stats.record_command_queued(),
                _ => stats.record_command_dropped(),
            }
        }
        outcome
    }

    fn queue(&self, envelope: &Envelope, kind: CommandKind) -> Outcome {
        let dropped = |reason| Outcome::CommandDropped { kind, reason };

        let radio = envelope.params.get_or_empty("RADIO");
        if radio.is_empty() {
            debug!("{} has no RADIO", kind);
            return dropped(DropReason::NoRadio);
        }
        let Some(port) = self.radios.port_for(radio) else {
            debug!("{} for {}: radio has not checked in", kind, radio);
            return dropped(DropReason::UnknownRadio);
        };

        let command = RelayCommand {
            radio: Origin::new(radio, port),
            radio_name: self.hosts.name_for(radio).to_string(),
            kind,
            payload: envelope.raw.clone(),
        };
        if self.relay.send(command).is_err() {
            warn!("Relay queue closed, dropping {}", kind);
            return dropped(DropReason::RelayClosed);
        }
        debug!("Queued {} for {}:{}", kind, radio, port);
        Outcome::CommandQueued(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertError;
    use crate::lookup::{FlatFileDb, GridLookup};
    use crate::sinks::{AdifLogSink, GridTrackerState, N1mmSink, Sink, SinkError};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::net::UdpSocket;

    #[derive(Clone, Default)]
    struct Recorder {
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl Recorder {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Sink for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        async fn status(&self, state: &GridTrackerState) -> Result<(), SinkError> {
            self.calls.lock().unwrap().push(format!("status {}", state.dx_call));
            Ok(())
        }

        async fn decode(&self, record: &ContactRecord, _now: DateTime<Utc>) -> Result<(), SinkError> {
            self.calls.lock().unwrap().push(format!("decode {}", record.call));
            Ok(())
        }

        async fn log_qso(&self, record: &ContactRecord, _now: DateTime<Utc>) -> Result<(), SinkError> {
            self.calls.lock().unwrap().push(format!("log {}", record.call));
            Ok(())
        }

        async fn message(&self, record: &ContactRecord, _now: DateTime<Utc>) -> Result<(), SinkError> {
            self.calls.lock().unwrap().push(format!("message {}", record.call));
            Ok(())
        }

        async fn heartbeat(&self) -> Result<(), SinkError> {
            self.calls.lock().unwrap().push("heartbeat".to_string());
            Ok(())
        }
    }

    struct ChannelAlerter(mpsc::UnboundedSender<(String, String)>);

    #[async_trait]
    impl Alerter for ChannelAlerter {
        async fn send(&self, subject: &str, body: &str) -> Result<(), AlertError> {
            let _ = self.0.send((subject.to_string(), body.to_string()));
            Ok(())
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 18, 4, 5).unwrap()
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.station.operator = "K1ABC".to_string();
        config.station.my_gridsquare = "FN42".to_string();
        config
    }

    fn resolver() -> GridResolver {
        let fcc: Arc<dyn GridLookup> = Arc::new(FlatFileDb::parse("fcc", "W1AW,FN31pr\nK2XYZ,FN20\n"));
        GridResolver::new(vec![fcc], Duration::from_secs(1))
    }

    struct Harness {
        monitor: Monitor,
        sink: Recorder,
        relay: mpsc::UnboundedReceiver<RelayCommand>,
    }

    fn harness(config: &Config) -> Harness {
        let sink = Recorder::default();
        let dispatcher = Dispatcher::new(vec![Box::new(sink.clone())], 6);
        let hosts = HostDirectory::parse("127.0.0.1,Shack\n");
        let (tx, relay) = mpsc::unbounded_channel();
        Harness {
            monitor: Monitor::new(config, resolver(), dispatcher, hosts, tx),
            sink,
            relay,
        }
    }

    fn directed(cmd: &str, text: &str) -> String {
        let payload = serde_json::json!({
            "type": "RX.DIRECTED",
            "value": text,
            "params": {
                "FROM": "W1AW",
                "TO": "@ALLCALL",
                "CMD": cmd,
                "TEXT": text,
                "DIAL": 14078000,
                "OFFSET": 1500,
                "SNR": -12,
                "GRID": "",
            }
        });
        Envelope::format(&Origin::new("127.0.0.1", 2242), &payload.to_string())
    }

    fn envelope(kind: &str, params: serde_json::Value) -> String {
        let payload = serde_json::json!({ "type": kind, "value": "", "params": params });
        Envelope::format(&Origin::new("127.0.0.1", 2242), &payload.to_string())
    }

    #[tokio::test]
    async fn test_cq_reaches_every_sink() {
        let dir = tempfile::tempdir().unwrap();
        let adif_path = dir.path().join("log.adi");
        let n1mm = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let n1mm_port = n1mm.local_addr().unwrap().port();

        let recorder = Recorder::default();
        let sinks: Vec<Box<dyn Sink>> = vec![
            Box::new(N1mmSink::new("127.0.0.1", n1mm_port).await.unwrap()),
            Box::new(AdifLogSink::new(&adif_path)),
            Box::new(recorder.clone()),
        ];
        let config = config();
        let (tx, _relay) = mpsc::unbounded_channel();
        let mut monitor = Monitor::new(
            &config,
            resolver(),
            Dispatcher::new(sinks, 6),
            HostDirectory::default(),
            tx,
        );

        let outcome = monitor
            .handle_at(&directed(" CQ CQ", "W1AW: @ALLCALL CQ CQ FN31"), now())
            .await;
        let Outcome::Directed {
            branch,
            record,
            forwarded,
        } = outcome
        else {
            panic!("expected a directed outcome");
        };
        assert_eq!(branch, DirectedBranch::Cq);
        assert!(forwarded);
        assert_eq!(record.call, "W1AW");
        assert_eq!(record.band, "20m");
        assert_eq!(record.gridsquare, "FN31pr");
        assert_eq!(record.qso_date, "20240309");
        assert_eq!(record.time_on, "180405");
        assert!(record.comment.starts_with("[!] "));

        assert_eq!(recorder.calls(), vec!["status W1AW", "decode W1AW", "log W1AW"]);

        let mut buf = [0u8; 2048];
        let (n, _) = tokio::time::timeout(Duration::from_secs(2), n1mm.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        let packet = String::from_utf8_lossy(&buf[..n]);
        assert!(packet.contains("<call:4>W1AW"));
        assert!(packet.contains("<band:3>20m"));

        let adif = std::fs::read_to_string(&adif_path).unwrap();
        assert!(adif.contains("<call:4>W1AW"));
        assert!(adif.contains("<gridsquare:6>FN31pr"));
    }

    #[tokio::test]
    async fn test_cq_wins_over_snr() {
        let mut h = harness(&config());
        let outcome = h.monitor.handle_at(&directed(" CQ SNR", "W1AW: CQ SNR -05"), now()).await;
        assert!(matches!(
            outcome,
            Outcome::Directed {
                branch: DirectedBranch::Cq,
                forwarded: true,
                ..
            }
        ));
        assert!(h.sink.calls().contains(&"decode W1AW".to_string()));
    }

    #[tokio::test]
    async fn test_heartbeat_not_mapped() {
        let mut config = config();
        config.grids.map_heartbeat = false;
        let mut h = harness(&config);

        let outcome = h
            .monitor
            .handle_at(&directed(" HEARTBEAT", "W1AW: @HB HEARTBEAT FN31"), now())
            .await;
        let Outcome::Directed { branch, record, forwarded } = outcome else {
            panic!("expected a directed outcome");
        };
        assert_eq!(branch, DirectedBranch::Heartbeat);
        assert!(!forwarded);
        assert_eq!(record.band, "20m");
        assert!(h.sink.calls().is_empty());
    }

    #[tokio::test]
    async fn test_query_is_never_forwarded() {
        let mut h = harness(&config());
        let outcome = h.monitor.handle_at(&directed(" SNR?", "W1AW: K1ABC SNR?"), now()).await;
        let Outcome::Directed { branch, record, forwarded } = outcome else {
            panic!("expected a directed outcome");
        };
        assert_eq!(branch, DirectedBranch::Query);
        assert!(!forwarded);
        assert_eq!(record.gridsquare, "FN31pr");
        assert!(h.sink.calls().is_empty());
    }

    #[tokio::test]
    async fn test_snr_report() {
        let mut h = harness(&config());
        let outcome = h
            .monitor
            .handle_at(&directed(" SNR", "W1AW: K1ABC SNR -07"), now())
            .await;
        let Outcome::Directed { record, forwarded, .. } = outcome else {
            panic!("expected a directed outcome");
        };
        assert!(forwarded);
        assert_eq!(record.rst_sent, "-07");
        assert_eq!(record.rst_rcvd, "-12");

        let outcome = h
            .monitor
            .handle_at(&directed(" SNR", "W1AW: K1ABC SNR +03 MSG 42"), now())
            .await;
        let Outcome::Directed { record, .. } = outcome else {
            panic!("expected a directed outcome");
        };
        assert_eq!(record.rst_sent, "+03");
    }

    #[tokio::test]
    async fn test_snr_for_another_station() {
        let mut h = harness(&config());
        let outcome = h
            .monitor
            .handle_at(&directed(" SNR", "W1AW: K9ZZZ SNR -07"), now())
            .await;
        assert!(matches!(outcome, Outcome::Directed { forwarded: false, .. }));

        let mut config = config();
        config.grids.map_all = true;
        let mut h = harness(&config);
        let outcome = h
            .monitor
            .handle_at(&directed(" SNR", "W1AW: K9ZZZ SNR -07"), now())
            .await;
        assert!(matches!(outcome, Outcome::Directed { forwarded: true, .. }));
    }

    #[test]
    fn test_snr_report_parsing() {
        let h = harness(&config());
        let m = &h.monitor;
        assert_eq!(m.snr_report("W1AW: K1ABC SNR -10").as_deref(), Some("-10"));
        assert_eq!(m.snr_report("W1AW: K1ABC SNR abc").as_deref(), Some("0"));
        assert_eq!(m.snr_report("K1ABC SNR -1234567"), None);
        assert_eq!(m.snr_report("W1AW: K1ABC hello"), None);
    }

    #[test]
    fn test_snr_window_wraps_on_short_text() {
        assert_eq!(window_start(40, 20), 11);
        assert_eq!(window_start(6, 6), 3);
        assert_eq!(window_start(30, 5), 26);
        assert_eq!(window_start(3, 3), 0);
    }

    #[tokio::test]
    async fn test_short_snr_text_is_not_forwarded() {
        let mut config = config();
        config.grids.map_all = true;
        let mut h = harness(&config);

        let outcome = h.monitor.handle_at(&directed(" SNR", "SNR -5"), now()).await;
        let Outcome::Directed { branch, record, forwarded } = outcome else {
            panic!("expected a directed outcome");
        };
        assert_eq!(branch, DirectedBranch::Snr);
        assert!(!forwarded);
        assert_eq!(record.rst_sent, "0");
        assert!(h.sink.calls().is_empty());
    }

    #[tokio::test]
    async fn test_info_sends_message_and_alert() {
        let h = harness(&config());
        let (tx, mut alerts) = mpsc::unbounded_channel();
        let mut monitor = h.monitor.with_alerter(Arc::new(ChannelAlerter(tx)));

        let outcome = monitor
            .handle_at(&directed(" INFO", "W1AW: K1ABC INFO FN31 PIR1=RED"), now())
            .await;
        let Outcome::Directed { branch, record, forwarded } = outcome else {
            panic!("expected a directed outcome");
        };
        assert_eq!(branch, DirectedBranch::Info);
        assert!(forwarded);
        assert_eq!(record.status_tag, "RED");
        assert_eq!(
            h.sink.calls(),
            vec!["status W1AW", "log W1AW", "message W1AW"]
        );

        let (subject, body) = tokio::time::timeout(Duration::from_secs(1), alerts.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(subject, "New Info Message");
        assert!(!body.contains(' '));
    }

    #[tokio::test]
    async fn test_status_style() {
        let mut h = harness(&config());
        let outcome = h
            .monitor
            .handle_at(&directed(" STATUS", "W1AW: K1ABC STATUS ON AIR"), now())
            .await;
        let Outcome::Directed { record, .. } = outcome else {
            panic!("expected a directed outcome");
        };
        let status = &config().styles.status;
        assert_eq!(record.status_tag, status.map.value);
        assert_eq!(record.status_color, status.color);
    }

    #[tokio::test]
    async fn test_log_qso() {
        let mut h = harness(&config());
        let value = "<call:4>K2XYZ <gridsquare:0> <mode:4>MFSK <submode:3>JS8 \
                     <freq:9>14.078500 <rst_sent:3>-10 <comment:5>73 OM <eor>";
        let line = Envelope::format(
            &Origin::new("127.0.0.1", 2242),
            &serde_json::json!({"type": "LOG.QSO", "value": value, "params": {"CMD": "LOG"}}).to_string(),
        );

        let outcome = h.monitor.handle_at(&line, now()).await;
        let Outcome::Logged { record, forwarded } = outcome else {
            panic!("expected a logged outcome");
        };
        assert!(forwarded);
        assert_eq!(record.call, "K2XYZ");
        assert_eq!(record.frequency, "14078500");
        assert_eq!(record.gridsquare, "FN20");
        assert_eq!(record.mode, "MFSK");
        assert_eq!(record.rst_sent, "-10");
        assert_eq!(record.command, "LOG");
        assert_eq!(record.comment, "K2XYZ: [!] 73 OM");
        assert_eq!(h.sink.calls(), vec!["status K2XYZ", "log K2XYZ"]);
    }

    #[tokio::test]
    async fn test_rig_freq() {
        let mut h = harness(&config());
        let line = envelope("RIG.FREQ", serde_json::json!({"DIAL": 7078000, "FREQ": 7079500, "OFFSET": 1500}));
        assert_eq!(
            h.monitor.handle_at(&line, now()).await,
            Outcome::FrequencyChanged {
                band: "40m".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_ping_then_command() {
        let mut h = harness(&config());

        let line = envelope("RIG.SET_FREQ", serde_json::json!({"RADIO": "127.0.0.1", "DIAL": 7078000}));
        assert_eq!(
            h.monitor.handle_at(&line, now()).await,
            Outcome::CommandDropped {
                kind: CommandKind::RigSetFreq,
                reason: DropReason::UnknownRadio
            }
        );

        let ping = envelope("PING", serde_json::json!({}));
        assert!(matches!(h.monitor.handle_at(&ping, now()).await, Outcome::RadioSeen { .. }));
        assert_eq!(h.monitor.radios().port_for("127.0.0.1"), Some(2242));
        assert_eq!(h.sink.calls(), vec!["heartbeat"]);

        assert_eq!(
            h.monitor.handle_at(&line, now()).await,
            Outcome::CommandQueued(CommandKind::RigSetFreq)
        );
        let queued = h.relay.try_recv().unwrap();
        assert_eq!(queued.radio, Origin::new("127.0.0.1", 2242));
        assert_eq!(queued.radio_name, "Shack");
        assert!(queued.payload.contains("RIG.SET_FREQ"));

        let no_radio = envelope("RIG.GET_FREQ", serde_json::json!({}));
        assert!(matches!(
            h.monitor.handle_at(&no_radio, now()).await,
            Outcome::CommandDropped {
                reason: DropReason::NoRadio,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_wrong_token_dropped() {
        let mut config = config();
        config.auth.enabled = true;
        config.auth.token = "s3cret".to_string();
        let stats = Arc::new(MonitorStats::new());
        let mut h = harness(&config);
        let mut monitor = h.monitor.with_stats(stats.clone());

        monitor.handle_at(&envelope("PING", serde_json::json!({})), now()).await;

        let bad = envelope(
            "TX.SEND_MESSAGE",
            serde_json::json!({"RADIO": "127.0.0.1", "AUTH": "guess"}),
        );
        assert_eq!(monitor.handle_at(&bad, now()).await, Outcome::Unauthorized);
        assert!(h.relay.try_recv().is_err());

        let good = envelope(
            "TX.SEND_MESSAGE",
            serde_json::json!({"RADIO": "127.0.0.1", "AUTH": "s3cret"}),
        );
        assert_eq!(
            monitor.handle_at(&good, now()).await,
            Outcome::CommandQueued(CommandKind::TxSendMessage)
        );
        assert!(h.relay.try_recv().is_ok());

        let unknown = envelope("WHAT.EVER", serde_json::json!({}));
        assert_eq!(monitor.handle_at(&unknown, now()).await, Outcome::Unauthorized);

        let summary = stats.summary();
        assert_eq!(summary.commands_dropped, 1);
        assert_eq!(summary.commands_queued, 1);
    }

    #[tokio::test]
    async fn test_wrong_token_leaves_registry_alone() {
        let mut config = config();
        config.auth.enabled = true;
        config.auth.token = "s3cret".to_string();
        let mut h = harness(&config);
        assert_eq!(h.monitor.radios().len(), 0);

        let bad = envelope(
            "RIG.SET_FREQ",
            serde_json::json!({"RADIO": "127.0.0.1", "AUTH": "wrong", "DIAL": 7078000}),
        );
        assert_eq!(h.monitor.handle_at(&bad, now()).await, Outcome::Unauthorized);
        assert_eq!(h.monitor.radios().len(), 0);
        assert!(h.relay.try_recv().is_err());
        assert!(h.sink.calls().is_empty());
    }

    #[tokio::test]
    async fn test_plain_cq_envelope() {
        let mut h = harness(&config());
        let line = r#"('127.0.0.1', 2442)|{"type":"RX.DIRECTED","params":{"FROM":"W1AW","TO":"N0CALL","CMD":"CQ","TEXT":"CQ W1AW EM12","DIAL":14078000}}"#;

        let Outcome::Directed { branch, record, forwarded } = h.monitor.handle_at(line, now()).await
        else {
            panic!("expected a directed outcome");
        };
        assert_eq!(branch, DirectedBranch::Cq);
        assert!(forwarded);
        assert_eq!(record.call, "W1AW");
        assert_eq!(record.band, "20m");
        assert_eq!(record.station, "N0CALL");
        assert_eq!(record.host, Some(Origin::new("127.0.0.1", 2442)));
        assert_eq!(h.sink.calls(), vec!["status W1AW", "decode W1AW", "log W1AW"]);
    }

    #[tokio::test]
    async fn test_close_and_echo() {
        let mut h = harness(&config());
        let close = envelope("CLOSE", serde_json::json!({}));
        assert_eq!(h.monitor.handle_at(&close, now()).await, Outcome::Closed { exit: false });

        let mut config = config();
        config.grids.auto_close = true;
        let mut h2 = harness(&config);
        assert_eq!(h2.monitor.handle_at(&close, now()).await, Outcome::Closed { exit: true });

        let echo = envelope("RX.SPOT", serde_json::json!({"CALL": "W1AW"}));
        assert_eq!(h.monitor.handle_at(&echo, now()).await, Outcome::Ignored);
        assert_eq!(h.monitor.handle_at("garbage", now()).await, Outcome::Malformed);
    }

    #[tokio::test]
    async fn test_activity_resends_status() {
        let mut h = harness(&config());
        let activity = envelope("RX.ACTIVITY", serde_json::json!({}));
        assert_eq!(
            h.monitor.handle_at(&activity, now()).await,
            Outcome::StatusRefreshed { sent: false }
        );

        h.monitor.handle_at(&directed(" CQ", "W1AW: CQ CQ"), now()).await;
        h.sink.calls.lock().unwrap().clear();

        assert_eq!(
            h.monitor.handle_at(&activity, now()).await,
            Outcome::StatusRefreshed { sent: true }
        );
        assert_eq!(h.sink.calls(), vec!["status W1AW"]);
    }
}
