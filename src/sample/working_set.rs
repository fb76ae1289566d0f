//! Working set selection.

use super::policy::SamplingPolicy;
use crate::schema::EntityId;
use crate::store::Store;
use tracing::{error, info, warn};

/// Choose the entities that take part in sampling.
///
/// Full-required entities come first, in policy order. Every other catalog
/// entity follows in catalog order unless it is a view, matches an excluded
/// name, or fails the one-row probe. Probe failures are logged and the
/// entity is dropped so one broken table does not abort the run.
pub fn select_working_set<S: Store + ?Sized>(
    store: &S,
    policy: &dyn SamplingPolicy,
) -> Vec<EntityId> {
    let schema = store.schema();
    let mut selected: Vec<EntityId> = Vec::new();

    for name in policy.full_required() {
        match schema.entity_id(&name) {
            Some(id) if !selected.contains(&id) => selected.push(id),
            Some(_) => {}
            None => warn!("full-required entity {} is not in the catalog", name),
        }
    }

    for entity in schema.iter() {
        if selected.contains(&entity.id) || entity.is_view || policy.is_excluded(&entity.name) {
            continue;
        }
        match store.probe(entity) {
            Ok(()) => selected.push(entity.id),
            Err(e) => error!("{}: {:#}", entity.name, e),
        }
    }

    info!(
        "processing entities: {:?}",
        selected
            .iter()
            .map(|&id| schema.name(id))
            .collect::<Vec<_>>()
    );

    selected
}
