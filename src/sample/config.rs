//! YAML configuration for the sampler.
//!
//! Every key is optional; a missing file section falls back to the defaults
//! below, which reproduce the behaviour of a stock Django project.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Per-entity sample sizes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizeConfig {
    /// Limit for ordinary entities
    pub default_limit: usize,
    /// Entities whose largest key exceeds this are considered large
    pub large_threshold: u64,
    /// Limit for large entities
    pub large_limit: usize,
    /// Limit for entities that must be imported in full
    pub full_limit: usize,
}

impl Default for SizeConfig {
    fn default() -> Self {
        Self {
            default_limit: 30,
            large_threshold: 50,
            large_limit: 10,
            full_limit: 2000,
        }
    }
}

/// Initial row set expanded before general sampling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedConfig {
    /// Entity the seed rows are read from
    pub entity: String,
    /// Optional equality filter field
    #[serde(default)]
    pub field: Option<String>,
    /// Value the filter field must equal
    #[serde(default)]
    pub value: Option<serde_json::Value>,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            entity: "auth_user".to_string(),
            field: Some("is_staff".to_string()),
            value: Some(serde_json::Value::Bool(true)),
        }
    }
}

/// Rows appended after collection regardless of the working set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraConfig {
    pub entity: String,
    #[serde(default = "default_extra_count")]
    pub count: usize,
}

fn default_extra_count() -> usize {
    1
}

/// Snapshot restore settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    /// Entities populated by environment bootstrap, emptied before loading
    pub clear: Vec<String>,
    /// Row-creation hooks per entity (SQL with one `?` for the new key)
    pub hooks: BTreeMap<String, Vec<String>>,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            clear: vec![
                "django_content_type".to_string(),
                "auth_permission".to_string(),
            ],
            hooks: BTreeMap::new(),
        }
    }
}

/// Complete YAML configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Entities imported (almost) in full and sampled first
    pub full_required: Vec<String>,
    /// Name substrings of entities left out of the working set
    pub excluded: Vec<String>,
    /// Entities exempt from forward closure
    pub auxiliary: Vec<String>,
    /// Sample sizes
    pub sizes: SizeConfig,
    /// How long a cached plan stays fresh, in seconds
    pub plan_ttl_secs: u64,
    /// Seed rows; `null` disables the seed phase
    pub seed: Option<SeedConfig>,
    /// Extra rows appended after collection
    pub extra: Vec<ExtraConfig>,
    /// Restore settings
    pub load: LoadConfig,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            full_required: Vec::new(),
            excluded: [
                "celery",
                "djcelery",
                "djkombu",
                "sentry",
                "south",
                // loaded together with users
                "user_profile",
                "log",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            auxiliary: Vec::new(),
            sizes: SizeConfig::default(),
            plan_ttl_secs: 600,
            seed: Some(SeedConfig::default()),
            extra: Vec::new(),
            load: LoadConfig::default(),
        }
    }
}

impl SamplerConfig {
    /// Load configuration from a YAML file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: SamplerConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Check if an entity name contains any excluded substring
    pub fn is_excluded(&self, entity: &str) -> bool {
        let lower = entity.to_lowercase();
        self.excluded
            .iter()
            .any(|pattern| lower.contains(&pattern.to_lowercase()))
    }

    /// Check if an entity is exempt from forward closure
    pub fn is_auxiliary(&self, entity: &str) -> bool {
        self.auxiliary.iter().any(|a| a.eq_ignore_ascii_case(entity))
    }

    /// Check if an entity must be imported in full
    pub fn is_full_required(&self, entity: &str) -> bool {
        self.full_required
            .iter()
            .any(|f| f.eq_ignore_ascii_case(entity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_yaml_config() {
        let yaml = r#"
full_required:
  - django_site
excluded:
  - audit
auxiliary:
  - django_content_type
sizes:
  default_limit: 5
seed:
  entity: accounts_user
  field: is_superuser
  value: true
extra:
  - entity: example_extra
load:
  clear: [django_content_type]
  hooks:
    auth_user:
      - "INSERT INTO user_profile (user_id) VALUES (?)"
"#;

        let config: SamplerConfig = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.full_required, vec!["django_site".to_string()]);
        assert!(config.is_excluded("audit_entry"));
        assert!(!config.is_excluded("auth_user_groups"));
        assert!(config.is_auxiliary("DJANGO_CONTENT_TYPE"));
        assert_eq!(config.sizes.default_limit, 5);
        assert_eq!(config.sizes.large_limit, 10); // Falls back to default
        let seed = config.seed.unwrap();
        assert_eq!(seed.entity, "accounts_user");
        assert_eq!(seed.value, Some(serde_json::Value::Bool(true)));
        assert_eq!(config.extra[0].count, 1);
        assert_eq!(config.load.hooks["auth_user"].len(), 1);
    }

    #[test]
    fn test_defaults() {
        let config = SamplerConfig::default();
        assert!(config.is_excluded("djcelery_taskmeta"));
        assert!(config.is_excluded("admin_log"));
        assert!(config.is_excluded("accounts_user_profile"));
        assert!(!config.is_excluded("auth_user"));
        assert_eq!(config.plan_ttl_secs, 600);
        assert_eq!(config.sizes, SizeConfig::default());
        assert_eq!(config.seed.unwrap().entity, "auth_user");
    }

    #[test]
    fn test_seed_can_be_disabled() {
        let config: SamplerConfig = serde_yaml::from_str("seed: null\n").unwrap();
        assert!(config.seed.is_none());
    }
}
