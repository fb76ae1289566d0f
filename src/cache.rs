//! Plan cache.
//!
//! Computing a sampling plan queries the size of every working-set entity, so
//! plans are kept on disk for a short while and reused by the next run against
//! the same database.

use crate::sample::SizeConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// One planned entity, keyed by name so plans survive catalog reordering
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedEntry {
    pub entity: String,
    pub limit: usize,
}

/// A stored plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedPlan {
    /// When the plan was computed (Unix timestamp)
    pub created_at: u64,
    pub entries: Vec<CachedEntry>,
}

impl CachedPlan {
    pub fn new(entries: Vec<(String, usize)>) -> Self {
        Self {
            created_at: unix_now(),
            entries: entries
                .into_iter()
                .map(|(entity, limit)| CachedEntry { entity, limit })
                .collect(),
        }
    }
}

/// File-based plan cache for one data source
pub struct PlanCache {
    cache_dir: PathBuf,
    source: String,
    ttl: Duration,
}

impl PlanCache {
    /// Create a plan cache in the default cache directory
    pub fn new(source: impl Into<String>, ttl: Duration) -> Result<Self> {
        Self::with_dir(Self::default_cache_dir()?, source, ttl)
    }

    /// Create a plan cache in a custom directory
    pub fn with_dir(cache_dir: PathBuf, source: impl Into<String>, ttl: Duration) -> Result<Self> {
        fs::create_dir_all(&cache_dir).context("Failed to create cache directory")?;
        Ok(Self {
            cache_dir,
            source: source.into(),
            ttl,
        })
    }

    /// Get the default cache directory
    pub fn default_cache_dir() -> Result<PathBuf> {
        let cache_base = dirs::cache_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join(".cache")))
            .context("Could not determine cache directory")?;

        Ok(cache_base.join("devdb").join("plans"))
    }

    /// Key a plan by data source, sizing constants and working set
    pub fn compute_key(&self, sizes: &SizeConfig, full_required: &[String], entities: &[&str]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.source.as_bytes());
        hasher.update(b"\0");
        hasher.update(
            format!(
                "{}:{}:{}:{}",
                sizes.default_limit, sizes.large_threshold, sizes.large_limit, sizes.full_limit
            )
            .as_bytes(),
        );
        for name in full_required {
            hasher.update(b"\0+");
            hasher.update(name.to_lowercase().as_bytes());
        }
        for name in entities {
            hasher.update(b"\0");
            hasher.update(name.as_bytes());
        }
        let hash = hasher.finalize();

        hex::encode(&hash[..16])
    }

    /// Get the path where a plan would be stored
    pub fn cache_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.json", key))
    }

    /// Fetch a plan that is younger than the staleness window.
    ///
    /// A zero window never returns anything.
    pub fn get(&self, key: &str) -> Result<Option<CachedPlan>> {
        let path = self.cache_path(key);
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read cached plan: {}", path.display()))?;
        let plan: CachedPlan = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse cached plan: {}", path.display()))?;

        let age = unix_now().saturating_sub(plan.created_at);
        if age >= self.ttl.as_secs() {
            return Ok(None);
        }

        Ok(Some(plan))
    }

    /// Store a plan under `key`
    pub fn put(&self, key: &str, plan: &CachedPlan) -> Result<()> {
        let path = self.cache_path(key);
        let content = serde_json::to_string_pretty(plan).context("Failed to serialize plan")?;
        fs::write(&path, content)
            .with_context(|| format!("Failed to write cached plan: {}", path.display()))?;
        Ok(())
    }

    /// Remove every cached plan, returning how many were removed
    pub fn clear_all(&self) -> Result<usize> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.cache_dir).context("Failed to list cache directory")? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Get the cache directory path
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_test_cache(ttl: u64) -> (PlanCache, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let cache = PlanCache::with_dir(
            temp_dir.path().to_path_buf(),
            "db.duckdb",
            Duration::from_secs(ttl),
        )
        .unwrap();
        (cache, temp_dir)
    }

    #[test]
    fn test_key_computation() {
        let (cache, _temp_dir) = setup_test_cache(600);
        let sizes = SizeConfig::default();

        let key1 = cache.compute_key(&sizes, &[], &["auth_user", "blog_post"]);
        let key2 = cache.compute_key(&sizes, &[], &["auth_user", "blog_post"]);
        assert_eq!(key1, key2);
        assert_eq!(key1.len(), 32); // 16 bytes hex encoded

        let reordered = cache.compute_key(&sizes, &[], &["blog_post", "auth_user"]);
        assert_ne!(key1, reordered);

        let smaller = SizeConfig {
            default_limit: 5,
            ..SizeConfig::default()
        };
        assert_ne!(key1, cache.compute_key(&smaller, &[], &["auth_user", "blog_post"]));
    }

    #[test]
    fn test_missing_entry() {
        let (cache, _temp_dir) = setup_test_cache(600);
        assert!(cache.get("abc123").unwrap().is_none());
    }
}
