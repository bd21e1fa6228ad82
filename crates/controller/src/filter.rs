//! Event filter for Deployment change events.

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use rollgate_store::{key_of, Change};
use tracing::debug;

/// What made an update worth reconciling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateReason {
    Generation,
    Deleting,
    Annotations,
}

/// Rules, first match wins: generation change or newly set deletion marker, then
/// any annotation difference. A missing annotation map equals an empty one.
pub fn update_reason(old: &ObjectMeta, new: &ObjectMeta) -> Option<UpdateReason> {
    if old.generation != new.generation {
        return Some(UpdateReason::Generation);
    }
    if old.deletion_timestamp.is_none() && new.deletion_timestamp.is_some() {
        return Some(UpdateReason::Deleting);
    }
    let (a, b) = (old.annotations.as_ref(), new.annotations.as_ref());
    let (la, lb) = (a.map_or(0, |m| m.len()), b.map_or(0, |m| m.len()));
    if la != lb || (la > 0 && a != b) {
        return Some(UpdateReason::Annotations);
    }
    None
}

/// Create and delete always pass; updates go through [`update_reason`].
pub fn accept_deployment(change: &Change<Deployment>) -> bool {
    match change {
        Change::Created(_) | Change::Deleted(_) => true,
        Change::Updated { old, new } => match update_reason(&old.metadata, &new.metadata) {
            Some(reason) => {
                debug!(deployment = %key_of(new.as_ref()), ?reason, "observed update");
                true
            }
            None => false,
        },
    }
}
