//! JS8 Monitor - a bridge between the JS8Call UDP API and the loggers and
//! maps a station feeds.
//!
//! This crate provides:
//! - An envelope parser and event classifier for JS8Call API traffic
//! - Grid square resolution from flat-file databases and online lookups
//! - Sinks for N1MM, GridTracker, GeoServer, APRS and ADIF log files
//! - A command relay from client applications back to radios
//! - Statistics tracking with HDR histograms and a Prometheus endpoint
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use js8_monitor::{Config, Dispatcher, GridResolver, HostDirectory, Monitor};
//! use tokio::sync::mpsc;
//!
//! # async fn run() {
//! let config = Config::default();
//! let (relay_tx, _relay_rx) = mpsc::unbounded_channel();
//! let mut monitor = Monitor::new(
//!     &config,
//!     GridResolver::new(Vec::new(), Duration::from_secs(5)),
//!     Dispatcher::new(Vec::new(), config.grids.effective_grid_length()),
//!     HostDirectory::default(),
//!     relay_tx,
//! );
//!
//! let line = r#"('127.0.0.1', 2242)|{"type":"RIG.FREQ","params":{"DIAL":14078000}}"#;
//! println!("{:?}", monitor.handle(line).await);
//! # }
//! ```

pub mod adif;
pub mod alert;
pub mod band;
pub mod config;
pub mod envelope;
pub mod event;
pub mod grid;
pub mod hosts;
pub mod info;
pub mod listener;
pub mod locator;
pub mod lookup;
pub mod metrics;
pub mod monitor;
pub mod record;
pub mod relay;
pub mod sinks;
pub mod stats;
pub mod text;

pub use alert::{AlertError, Alerter, SmtpAlerter};
pub use config::Config;
pub use envelope::{Envelope, EnvelopeError, Origin};
pub use event::{CommandKind, DirectedBranch, EventKind, classify_directed};
pub use grid::{GridOutcome, GridResolver};
pub use hosts::{HostDirectory, RadioRegistry};
pub use listener::Listener;
pub use lookup::{GridLookup, LookupError};
pub use monitor::{DropReason, Monitor, Outcome};
pub use record::ContactRecord;
pub use relay::{CommandRelay, RelayCommand};
pub use sinks::{Dispatcher, Extras, Sink, SinkError};
pub use stats::{MonitorStats, StatsSummary};
