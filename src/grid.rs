//! Grid square resolution for a contact record.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;
use tracing::{debug, warn};

use crate::lookup::{GridLookup, LocalDb, RejectLog};
use crate::record::ContactRecord;
use crate::stats::MonitorStats;

/// Prefix put on the comment when a lookup supplied the grid.
pub const LOOKUP_MARKER: &str = "[!] ";

/// Outcome of a resolve attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GridOutcome {
    /// Nothing to do: no call, or the grid was already known.
    Skipped,
    /// A backend supplied the grid.
    Found { backend: String },
    /// Every backend came up empty.
    NotFound,
}

/// Walks the lookup backends in priority order.
pub struct GridResolver {
    backends: Vec<Arc<dyn GridLookup>>,
    local: Option<Arc<LocalDb>>,
    learn: bool,
    rejects: Option<RejectLog>,
    timeout: Duration,
    stats: Option<Arc<MonitorStats>>,
}

impl GridResolver {
    /// Create a resolver over `backends`, tried in the given order.
    pub fn new(backends: Vec<Arc<dyn GridLookup>>, timeout: Duration) -> Self {
        Self {
            backends,
            local: None,
            learn: false,
            rejects: None,
            timeout,
            stats: None,
        }
    }

    /// Learn online hits into the local database.
    pub fn with_learning(mut self, local: Arc<LocalDb>) -> Self {
        self.local = Some(local);
        self.learn = true;
        self
    }

    /// Record calls nothing could place.
    pub fn with_rejects(mut self, rejects: RejectLog) -> Self {
        self.rejects = Some(rejects);
        self
    }

    pub fn with_stats(mut self, stats: Arc<MonitorStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Names of the configured backends, in lookup order.
    pub fn backend_names(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    /// Ask one backend, treating errors and timeouts as a miss.
    async fn query(&self, backend: &dyn GridLookup, call: &str) -> Option<String> {
        let started = Instant::now();
        let result = timeout(self.timeout, backend.lookup(call)).await;
        if let Some(stats) = &self.stats {
            stats.record_lookup_latency(started.elapsed());
        }
        match result {
            Ok(Ok(grid)) => grid.filter(|g| !g.trim().is_empty()),
            Ok(Err(e)) => {
                warn!("{} lookup for {} failed: {}", backend.name(), call, e);
                None
            }
            Err(_) => {
                warn!(
                    "{} lookup for {} timed out after {:?}",
                    backend.name(),
                    call,
                    self.timeout
                );
                None
            }
        }
    }

    /// Fill in the record's grid square.
    ///
    /// A `/suffix` on the call is dropped first and the record keeps the bare
    /// call. On a hit the comment gets [`LOOKUP_MARKER`] in front.
    pub async fn resolve(&self, record: &mut ContactRecord) -> GridOutcome {
        if record.call.trim().is_empty() || !record.gridsquare.is_empty() {
            return GridOutcome::Skipped;
        }

        if let Some((base, _)) = record.call.split_once('/') {
            record.call = base.trim().to_string();
        }
        let call = record.call.clone();

        for backend in &self.backends {
            let Some(grid) = self.query(backend.as_ref(), &call).await else {
                continue;
            };

            debug!("{} grid {} from {}", call, grid, backend.name());
            record.gridsquare = grid.trim().to_string();
            record.comment = format!("{}{}", LOOKUP_MARKER, record.comment);

            if backend.is_online()
                && self.learn
                && let Some(local) = &self.local
                && let Err(e) = local.learn(&call, &record.gridsquare).await
            {
                warn!("Failed to learn grid for {}: {}", call, e);
            }

            if let Some(stats) = &self.stats {
                stats.record_lookup_hit(backend.name());
            }
            return GridOutcome::Found {
                backend: backend.name().to_string(),
            };
        }

        if let Some(stats) = &self.stats {
            stats.record_lookup_miss();
        }
        if let Some(rejects) = &self.rejects
            && let Err(e) = rejects.record(&call).await
        {
            warn!("Failed to record reject {}: {}", call, e);
        }
        GridOutcome::NotFound
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StationConfig;
    use crate::lookup::{FlatFileDb, LOCAL_DB_FILE, LookupError, REJECTS_FILE};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Backend with a fixed answer that counts its calls.
    struct Fixed {
        name: &'static str,
        online: bool,
        answer: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl Fixed {
        fn new(name: &'static str, online: bool, answer: Option<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                name,
                online,
                answer,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl GridLookup for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn is_online(&self) -> bool {
            self.online
        }

        async fn lookup(&self, _call: &str) -> Result<Option<String>, LookupError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            Ok(self.answer.map(str::to_string))
        }
    }

    struct Failing;

    #[async_trait]
    impl GridLookup for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn lookup(&self, _call: &str) -> Result<Option<String>, LookupError> {
            Err(LookupError::Io(std::io::Error::other("boom")))
        }
    }

    struct Slow;

    #[async_trait]
    impl GridLookup for Slow {
        fn name(&self) -> &str {
            "slow"
        }

        async fn lookup(&self, _call: &str) -> Result<Option<String>, LookupError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Some("AA00".to_string()))
        }
    }

    fn record_for(call: &str) -> ContactRecord {
        let mut record = ContactRecord::new(&StationConfig::default());
        record.call = call.to_string();
        record.comment = "hello".to_string();
        record
    }

    #[tokio::test]
    async fn test_first_hit_wins() {
        let first = Fixed::new("fcc", false, None);
        let second = Fixed::new("hamcall_cd", false, Some("FN31"));
        let third = Fixed::new("rac_cd", false, Some("EM48"));
        let resolver = GridResolver::new(
            vec![first.clone(), second.clone(), third.clone()],
            Duration::from_secs(1),
        );

        let mut record = record_for("W1AW");
        let outcome = resolver.resolve(&mut record).await;

        assert_eq!(
            outcome,
            GridOutcome::Found {
                backend: "hamcall_cd".to_string()
            }
        );
        assert_eq!(record.gridsquare, "FN31");
        assert_eq!(record.comment, "[!] hello");
        assert_eq!(first.calls.load(Ordering::Relaxed), 1);
        assert_eq!(third.calls.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_existing_grid_is_untouched() {
        let backend = Fixed::new("fcc", false, Some("EM48"));
        let resolver = GridResolver::new(vec![backend.clone()], Duration::from_secs(1));

        let mut record = record_for("W1AW");
        record.gridsquare = "FN31".to_string();
        let before = record.clone();

        assert_eq!(resolver.resolve(&mut record).await, GridOutcome::Skipped);
        assert_eq!(resolver.resolve(&mut record).await, GridOutcome::Skipped);
        assert_eq!(record, before);
        assert_eq!(backend.calls.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_empty_call_is_skipped() {
        let resolver = GridResolver::new(vec![Fixed::new("fcc", false, Some("FN31"))], Duration::from_secs(1));
        let mut record = record_for("");
        assert_eq!(resolver.resolve(&mut record).await, GridOutcome::Skipped);
        assert!(record.gridsquare.is_empty());
    }

    #[tokio::test]
    async fn test_suffix_is_stripped() {
        let db = Arc::new(FlatFileDb::parse("fcc", "W1AW,FN31\n"));
        let resolver = GridResolver::new(vec![db], Duration::from_secs(1));

        let mut record = record_for("W1AW/P");
        resolver.resolve(&mut record).await;
        assert_eq!(record.call, "W1AW");
        assert_eq!(record.gridsquare, "FN31");
    }

    #[tokio::test]
    async fn test_errors_and_timeouts_fall_through() {
        let last = Fixed::new("callook", true, Some("FN42"));
        let resolver = GridResolver::new(
            vec![Arc::new(Failing), Arc::new(Slow), last],
            Duration::from_millis(50),
        );

        let mut record = record_for("K1ABC");
        let outcome = resolver.resolve(&mut record).await;
        assert_eq!(
            outcome,
            GridOutcome::Found {
                backend: "callook".to_string()
            }
        );
        assert_eq!(record.gridsquare, "FN42");
    }

    #[tokio::test]
    async fn test_online_hit_is_learned() {
        let dir = tempfile::tempdir().unwrap();
        let local = Arc::new(LocalDb::open(dir.path().join(LOCAL_DB_FILE)).await);
        let resolver = GridResolver::new(
            vec![local.clone(), Fixed::new("callook", true, Some("FN31pr"))],
            Duration::from_secs(1),
        )
        .with_learning(local.clone());

        let mut record = record_for("W1AW");
        resolver.resolve(&mut record).await;
        assert_eq!(local.lookup("W1AW").await.unwrap().as_deref(), Some("FN31pr"));

        // Offline hits are not written back
        let mut again = record_for("W1AW");
        resolver.resolve(&mut again).await;
        assert_eq!(local.len(), 1);
        let on_disk = std::fs::read_to_string(dir.path().join(LOCAL_DB_FILE)).unwrap();
        assert_eq!(on_disk.lines().count(), 1);
    }

    #[tokio::test]
    async fn test_miss_records_reject() {
        let dir = tempfile::tempdir().unwrap();
        let rejects_path = dir.path().join(REJECTS_FILE);
        let resolver = GridResolver::new(vec![Fixed::new("fcc", false, None)], Duration::from_secs(1))
            .with_rejects(RejectLog::new(&rejects_path));

        let mut record = record_for("ZZ9ZZ");
        assert_eq!(resolver.resolve(&mut record).await, GridOutcome::NotFound);
        assert!(record.gridsquare.is_empty());
        assert_eq!(record.comment, "hello");
        assert_eq!(std::fs::read_to_string(&rejects_path).unwrap(), "ZZ9ZZ\n");
    }
}
