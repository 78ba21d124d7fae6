//! Grid square lookup backends.
//!
//! Offline backends are `CALL,GRID` flat files loaded once at startup; the
//! local one can learn new entries. Online backends query callook.info and
//! hamcall.net. All of them sit behind [`GridLookup`] so the resolver can walk
//! them in order.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// FCC database file name.
pub const FCC_DB_FILE: &str = "JS8monitor_fccgrids.dat";
/// HamCall CD database file name.
pub const HAMCALL_CD_DB_FILE: &str = "JS8monitor_hcgrids.dat";
/// RAC CD database file name.
pub const RAC_CD_DB_FILE: &str = "JS8monitor_racgrids.dat";
/// Learned grids file name.
pub const LOCAL_DB_FILE: &str = "JS8monitor_localgrids.dat";
/// Calls no backend could place.
pub const REJECTS_FILE: &str = "JS8monitor_rejects.dat";

/// Default callook.info endpoint.
pub const CALLOOK_URL: &str = "https://callook.info";
/// Default hamcall.net endpoint.
pub const HAMCALL_URL: &str = "https://hamcall.net";

/// hamcall.net raw lookups mark the grid field with this byte.
const HAMCALL_GRID_MARKER: u8 = 202;
/// Any byte above this ends a hamcall.net raw field.
const HAMCALL_FIELD_END: u8 = 180;

/// Errors from a lookup backend.
///
/// The resolver treats every one of these as "not found".
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(#[from] serde_json::Error),
}

/// A source of grid squares for callsigns.
#[async_trait]
pub trait GridLookup: Send + Sync {
    /// Short name for logs and metrics.
    fn name(&self) -> &str;

    /// Whether hits from this backend should be learned locally.
    fn is_online(&self) -> bool {
        false
    }

    /// Look up the grid for a bare callsign (no `/suffix`).
    async fn lookup(&self, call: &str) -> Result<Option<String>, LookupError>;
}

/// An in-memory `CALL,GRID` index.
#[derive(Debug, Clone, Default)]
pub struct FlatFileDb {
    name: String,
    entries: HashMap<String, String>,
}

impl FlatFileDb {
    /// Create an empty database.
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: HashMap::new(),
        }
    }

    /// Build an index from file content.
    ///
    /// The first entry for a call wins. Lines without a comma or with an
    /// empty call or grid are skipped.
    pub fn parse(name: impl Into<String>, content: &str) -> Self {
        let mut db = Self::empty(name);
        for line in content.lines() {
            db.insert_line(line);
        }
        db
    }

    /// Load a database file.
    pub async fn load(name: impl Into<String>, path: &Path) -> Result<Self, LookupError> {
        let name = name.into();
        let content = fs::read_to_string(path).await?;
        let db = Self::parse(name, &content);
        info!(
            "Loaded {} grid database: {} entries from {}",
            db.name,
            db.len(),
            path.display()
        );
        Ok(db)
    }

    fn insert_line(&mut self, line: &str) {
        let Some((call, grid)) = line.split_once(',') else {
            return;
        };
        self.insert(call, grid);
    }

    fn insert(&mut self, call: &str, grid: &str) {
        let call = call.trim();
        let grid = grid.trim();
        if call.is_empty() || grid.is_empty() {
            return;
        }
        self.entries
            .entry(call.to_ascii_uppercase())
            .or_insert_with(|| grid.to_string());
    }

    /// Find the grid for a call (case-insensitive).
    pub fn get(&self, call: &str) -> Option<&str> {
        self.entries
            .get(&call.trim().to_ascii_uppercase())
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl GridLookup for FlatFileDb {
    fn name(&self) -> &str {
        &self.name
    }

    async fn lookup(&self, call: &str) -> Result<Option<String>, LookupError> {
        Ok(self.get(call).map(str::to_string))
    }
}

/// Append one line to a file, creating it if needed.
async fn append_line(path: &Path, line: &str) -> Result<(), LookupError> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

/// The learnable local grid database.
#[derive(Debug)]
pub struct LocalDb {
    path: PathBuf,
    db: RwLock<FlatFileDb>,
}

impl LocalDb {
    /// Load the local database, starting empty if the file can't be read.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let db = match FlatFileDb::load("local", &path).await {
            Ok(db) => db,
            Err(e) => {
                debug!("Local grid database not loaded ({}), starting empty", e);
                FlatFileDb::empty("local")
            }
        };
        Self {
            path,
            db: RwLock::new(db),
        }
    }

    /// Remember a call's grid in memory and on disk.
    pub async fn learn(&self, call: &str, grid: &str) -> Result<(), LookupError> {
        if call.trim().is_empty() || grid.trim().is_empty() {
            return Ok(());
        }
        append_line(&self.path, &format!("{},{}\n", call.trim(), grid.trim())).await?;
        if let Ok(mut db) = self.db.write() {
            db.insert(call, grid);
        }
        debug!("Learned grid {} for {}", grid, call);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.db.read().map(|db| db.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl GridLookup for LocalDb {
    fn name(&self) -> &str {
        "local"
    }

    async fn lookup(&self, call: &str) -> Result<Option<String>, LookupError> {
        Ok(self
            .db
            .read()
            .ok()
            .and_then(|db| db.get(call).map(str::to_string)))
    }
}

/// Append-only log of calls no backend could place.
#[derive(Debug, Clone)]
pub struct RejectLog {
    path: PathBuf,
}

impl RejectLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn record(&self, call: &str) -> Result<(), LookupError> {
        if call.trim().is_empty() {
            return Ok(());
        }
        append_line(&self.path, &format!("{}\n", call.trim())).await
    }
}

#[derive(Debug, Deserialize)]
struct CallookResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    location: Option<CallookLocation>,
}

#[derive(Debug, Deserialize)]
struct CallookLocation {
    #[serde(default)]
    gridsquare: String,
}

/// callook.info JSON lookup (US calls).
#[derive(Debug, Clone)]
pub struct CallookLookup {
    client: reqwest::Client,
    base_url: String,
}

impl CallookLookup {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_base_url(client, CALLOOK_URL)
    }

    pub fn with_base_url(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl GridLookup for CallookLookup {
    fn name(&self) -> &str {
        "callook"
    }

    fn is_online(&self) -> bool {
        true
    }

    async fn lookup(&self, call: &str) -> Result<Option<String>, LookupError> {
        let url = format!("{}/{}/json", self.base_url, call);
        let body = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let response: CallookResponse = serde_json::from_str(&body)?;
        if response.status != "VALID" {
            return Ok(None);
        }
        Ok(response
            .location
            .map(|l| l.gridsquare.trim().to_string())
            .filter(|g| !g.is_empty()))
    }
}

/// Pull the grid out of a hamcall.net raw lookup body.
///
/// The grid follows a byte of value 202 and ends at the next byte above 180
/// within ten bytes. Non-ASCII bytes are dropped from the result.
pub fn parse_hamcall_grid(body: &[u8]) -> Option<String> {
    let start = body.iter().position(|b| *b == HAMCALL_GRID_MARKER)?;
    let end = (start + 1..(start + 11).min(body.len())).find(|&i| body[i] > HAMCALL_FIELD_END)?;
    let grid: String = body[start + 1..end]
        .iter()
        .filter(|b| b.is_ascii())
        .map(|b| *b as char)
        .collect();
    let grid = grid.trim();
    if grid.is_empty() {
        None
    } else {
        Some(grid.to_string())
    }
}

/// hamcall.net raw lookup (needs an account).
#[derive(Debug, Clone)]
pub struct HamcallLookup {
    client: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
}

impl HamcallLookup {
    pub fn new(
        client: reqwest::Client,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self::with_base_url(client, HAMCALL_URL, username, password)
    }

    pub fn with_base_url(
        client: reqwest::Client,
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            username: username.into(),
            password: password.into(),
        }
    }
}

#[async_trait]
impl GridLookup for HamcallLookup {
    fn name(&self) -> &str {
        "hamcall"
    }

    fn is_online(&self) -> bool {
        true
    }

    async fn lookup(&self, call: &str) -> Result<Option<String>, LookupError> {
        let url = format!("{}/call", self.base_url);
        let body = self
            .client
            .get(&url)
            .query(&[
                ("username", self.username.as_str()),
                ("password", self.password.as_str()),
                ("rawlookup", "1"),
                ("callsign", call),
                ("program", "JS8Call_Monitor"),
            ])
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        let grid = parse_hamcall_grid(&body);
        if grid.is_none() {
            warn!("hamcall.net returned no grid for {}", call);
        }
        Ok(grid)
    }
}
