//! Two-tier result cache
//!
//! - Local tier: in-process map with a short TTL, consulted first
//! - Shared tier: optional cross-process `SharedCache` with a longer TTL; hits are
//!   written back locally
//!
//! Every entry carries the node and edge ids it was derived from. Invalidating a
//! set of ids removes exactly the entries whose dependency set intersects it, from
//! both tiers. Cache failures are logged and treated as misses.

use graphrag_common::cache::SharedCache;
use graphrag_common::config::CacheSettings;
use graphrag_common::metrics::record_cache;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

struct LocalEntry {
    value: serde_json::Value,
    dependencies: BTreeSet<String>,
    expires_at: Instant,
}

/// Shared-tier payload: the value plus its dependency set, so a shared hit can be
/// written back locally with invalidation intact
#[derive(Serialize, Deserialize)]
struct Envelope {
    dependencies: BTreeSet<String>,
    value: serde_json::Value,
}

/// Entries removed by an invalidation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidationReport {
    pub local_removed: usize,
    pub shared_removed: usize,
}

pub struct ResultCache {
    local: RwLock<HashMap<String, LocalEntry>>,
    shared: Option<Arc<dyn SharedCache>>,
    settings: CacheSettings,
}

impl ResultCache {
    pub fn new(settings: CacheSettings, shared: Option<Arc<dyn SharedCache>>) -> Self {
        Self {
            local: RwLock::new(HashMap::new()),
            shared,
            settings,
        }
    }

    pub fn enabled(&self) -> bool {
        self.settings.enabled
    }

    fn shared_ttl(&self) -> Duration {
        Duration::from_secs(self.settings.shared_ttl_secs.max(1))
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if !self.settings.enabled {
            return None;
        }

        let local_hit = {
            let local = self.local.read().await;
            local
                .get(key)
                .filter(|e| e.expires_at > Instant::now())
                .map(|e| e.value.clone())
        };
        if let Some(value) = local_hit {
            match serde_json::from_value(value) {
                Ok(parsed) => {
                    debug!(key, "Local cache hit");
                    record_cache(true, "local");
                    return Some(parsed);
                }
                Err(e) => {
                    warn!(key, error = %e, "Discarding undecodable local entry");
                    self.local.write().await.remove(key);
                }
            }
        }
        record_cache(false, "local");

        let shared = self.shared.as_ref()?;
        let raw = match shared.get_raw(key).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key, error = %e, "Shared cache lookup failed, treating as miss");
                None
            }
        };
        let Some(raw) = raw else {
            record_cache(false, "shared");
            return None;
        };

        let envelope: Envelope = match serde_json::from_str(&raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(key, error = %e, "Undecodable shared entry");
                record_cache(false, "shared");
                return None;
            }
        };
        let parsed = match serde_json::from_value(envelope.value.clone()) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(key, error = %e, "Shared entry has unexpected shape");
                record_cache(false, "shared");
                return None;
            }
        };

        debug!(key, "Shared cache hit");
        record_cache(true, "shared");
        self.insert_local(key, envelope.value, envelope.dependencies)
            .await;
        Some(parsed)
    }

    /// Store `value` in both tiers, tagged with the ids it was derived from
    pub async fn put<T: Serialize>(&self, key: &str, value: &T, dependencies: BTreeSet<String>) {
        if !self.settings.enabled {
            return;
        }

        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "Failed to serialize cache value");
                return;
            }
        };
        self.insert_local(key, value.clone(), dependencies.clone())
            .await;

        let Some(shared) = self.shared.as_ref() else {
            return;
        };
        let deps: Vec<String> = dependencies.iter().cloned().collect();
        let envelope = Envelope {
            dependencies,
            value,
        };
        let raw = match serde_json::to_string(&envelope) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key, error = %e, "Failed to serialize cache envelope");
                return;
            }
        };

        let ttl = self.shared_ttl();
        let stored = async {
            shared.set_raw(key, &raw, ttl).await?;
            shared.index_dependencies(key, &deps, ttl).await
        };
        if let Err(e) = stored.await {
            warn!(key, error = %e, "Shared cache write failed");
        }
    }

    async fn insert_local(&self, key: &str, value: serde_json::Value, dependencies: BTreeSet<String>) {
        let now = Instant::now();
        let mut local = self.local.write().await;

        if local.len() >= self.settings.local_capacity && !local.contains_key(key) {
            local.retain(|_, e| e.expires_at > now);
            // Still full: evict whatever expires soonest
            if local.len() >= self.settings.local_capacity {
                let soonest = local
                    .iter()
                    .min_by_key(|(_, e)| e.expires_at)
                    .map(|(k, _)| k.clone());
                if let Some(evict) = soonest {
                    local.remove(&evict);
                }
            }
        }
        if self.settings.local_capacity == 0 {
            return;
        }

        local.insert(
            key.to_string(),
            LocalEntry {
                value,
                dependencies,
                expires_at: now + self.settings.local_ttl(),
            },
        );
    }

    /// Remove every entry derived from any of `changed_ids`
    pub async fn invalidate(&self, changed_ids: &[String]) -> InvalidationReport {
        let changed: HashSet<&str> = changed_ids.iter().map(String::as_str).collect();
        let mut report = InvalidationReport::default();
        if changed.is_empty() {
            return report;
        }

        {
            let mut local = self.local.write().await;
            let before = local.len();
            local.retain(|_, e| !e.dependencies.iter().any(|d| changed.contains(d.as_str())));
            report.local_removed = before - local.len();
        }

        if let Some(shared) = self.shared.as_ref() {
            let mut keys: BTreeSet<String> = BTreeSet::new();
            for id in &changed {
                match shared.dependents_of(id).await {
                    Ok(found) => keys.extend(found),
                    Err(e) => warn!(id, error = %e, "Failed to read dependency index"),
                }
            }
            for key in &keys {
                match shared.delete(key).await {
                    Ok(true) => report.shared_removed += 1,
                    Ok(false) => {}
                    Err(e) => warn!(key = %key, error = %e, "Failed to delete shared entry"),
                }
            }
            for id in &changed {
                if let Err(e) = shared.clear_dependents(id).await {
                    warn!(id, error = %e, "Failed to clear dependency index");
                }
            }
        }

        info!(
            changed = changed.len(),
            local_removed = report.local_removed,
            shared_removed = report.shared_removed,
            "Cache invalidated"
        );
        report
    }

    /// Drop expired local entries. Returns how many were removed.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut local = self.local.write().await;
        let before = local.len();
        local.retain(|_, e| e.expires_at > now);
        before - local.len()
    }

    /// Live local entries
    pub async fn local_len(&self) -> usize {
        let now = Instant::now();
        self.local
            .read()
            .await
            .values()
            .filter(|e| e.expires_at > now)
            .count()
    }

    pub async fn ping_shared(&self) -> Option<bool> {
        let shared = self.shared.as_ref()?;
        Some(shared.ping().await.is_ok())
    }

    /// Start the periodic local sweep. The task holds a weak reference and exits
    /// once the cache is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let cache: Weak<Self> = Arc::downgrade(self);
        let period = self.settings.sweep_interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                let removed = cache.sweep().await;
                if removed > 0 {
                    debug!(removed, "Swept expired cache entries");
                }
            }
        })
    }
}
