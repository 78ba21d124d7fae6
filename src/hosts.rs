//! Known hosts and radios.
//!
//! The host directory turns sender IPs into friendly names for logs. The
//! radio registry remembers which port each JS8Call instance answers on,
//! learned from its PING events, so commands can be relayed back to it.

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, info};

use crate::lookup::LookupError;
use crate::record::UNKNOWN_HOST;

/// Host directory file name.
pub const HOSTS_FILE: &str = "JS8monitor_hosts.dat";

/// Static `IP,NAME` directory.
#[derive(Debug, Clone, Default)]
pub struct HostDirectory {
    names: HashMap<String, String>,
}

impl HostDirectory {
    /// Parse `IP,NAME` lines; the first entry for an IP wins.
    pub fn parse(content: &str) -> Self {
        let mut names = HashMap::new();
        for line in content.lines() {
            let Some((ip, name)) = line.split_once(',') else {
                continue;
            };
            let (ip, name) = (ip.trim(), name.trim());
            if ip.is_empty() || name.is_empty() {
                continue;
            }
            names
                .entry(ip.to_string())
                .or_insert_with(|| name.to_string());
        }
        Self { names }
    }

    /// Load the directory file.
    pub async fn load(path: &Path) -> Result<Self, LookupError> {
        let content = tokio::fs::read_to_string(path).await?;
        let directory = Self::parse(&content);
        info!(
            "Loaded {} host names from {}",
            directory.len(),
            path.display()
        );
        Ok(directory)
    }

    /// Friendly name for an IP, or `---`.
    pub fn name_for(&self, ip: &str) -> &str {
        self.names
            .get(ip.trim())
            .map(String::as_str)
            .unwrap_or(UNKNOWN_HOST)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Radio IP to reply port, learned from PING events.
///
/// Entries are never evicted; a radio that changes port simply overwrites
/// its entry on the next PING.
#[derive(Debug, Clone, Default)]
pub struct RadioRegistry {
    ports: HashMap<String, u16>,
}

impl RadioRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the port a radio last pinged from.
    pub fn register(&mut self, ip: &str, port: u16) {
        let previous = self.ports.insert(ip.trim().to_string(), port);
        if previous != Some(port) {
            debug!("Radio {} registered on port {}", ip, port);
        }
    }

    /// Port for a radio, if it has pinged.
    pub fn port_for(&self, ip: &str) -> Option<u16> {
        self.ports.get(ip.trim()).copied()
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }
}
