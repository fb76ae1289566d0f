//! Sampling policy: the pluggable part of a run.
//!
//! The sampler never decides on its own which entities are special; it asks
//! the [`SamplingPolicy`] it was constructed with. [`ConfigPolicy`] answers
//! from a [`SamplerConfig`]; embedders can implement the trait directly.

use super::config::{SamplerConfig, SeedConfig, SizeConfig};
use crate::schema::{Row, Schema};
use crate::store::RowSource;
use anyhow::{Context, Result};
use tracing::{info, warn};

pub trait SamplingPolicy {
    /// Entities imported (almost) in full, in the order they should be sampled
    fn full_required(&self) -> Vec<String>;

    fn is_full_required(&self, entity: &str) -> bool {
        self.full_required()
            .iter()
            .any(|f| f.eq_ignore_ascii_case(entity))
    }

    /// Entities left out of the working set
    fn is_excluded(&self, entity: &str) -> bool;

    /// Entities whose references are not followed by forward expansion
    fn is_auxiliary(&self, entity: &str) -> bool;

    /// Sample size constants
    fn sizes(&self) -> &SizeConfig;

    /// Initial row set expanded ahead of general sampling
    fn seed(&self) -> Option<&SeedConfig>;

    /// Rows appended after collection and before deduplication
    fn extra_rows(&self, _schema: &Schema, _source: &dyn RowSource) -> Result<Vec<Row>> {
        Ok(Vec::new())
    }
}

/// Policy driven entirely by configuration
#[derive(Debug, Clone, Default)]
pub struct ConfigPolicy {
    config: SamplerConfig,
}

impl ConfigPolicy {
    pub fn new(config: SamplerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }
}

impl SamplingPolicy for ConfigPolicy {
    fn full_required(&self) -> Vec<String> {
        self.config.full_required.clone()
    }

    fn is_full_required(&self, entity: &str) -> bool {
        self.config.is_full_required(entity)
    }

    fn is_excluded(&self, entity: &str) -> bool {
        self.config.is_excluded(entity)
    }

    fn is_auxiliary(&self, entity: &str) -> bool {
        self.config.is_auxiliary(entity)
    }

    fn sizes(&self) -> &SizeConfig {
        &self.config.sizes
    }

    fn seed(&self) -> Option<&SeedConfig> {
        self.config.seed.as_ref()
    }

    fn extra_rows(&self, schema: &Schema, source: &dyn RowSource) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        for extra in &self.config.extra {
            let Some(entity) = schema.get_entity(&extra.entity) else {
                warn!("skipping extra rows for unknown entity {}", extra.entity);
                continue;
            };
            info!("adding {} extra rows from {}", extra.count, entity.name);
            rows.extend(
                source
                    .latest(entity, extra.count)
                    .with_context(|| format!("Failed to read extra rows from {}", entity.name))?,
            );
        }
        Ok(rows)
    }
}
