//! Eligibility gate and context builder.
//!
//! Decides whether this controller variant acts on a fetched Deployment and,
//! if so, binds the shared capabilities and the freshly decoded strategy into
//! a [`SyncContext`]. The strategy is re-decoded on every call; annotations
//! may change between reconciles.

use std::sync::Arc;

use k8s_openapi::api::apps::v1::Deployment;
use rollgate_core::{DeploymentStrategy, RollingStyle, SkipReason, DEPLOYMENT_STRATEGY_ANNOTATION};
use rollgate_store::key_of;
use tracing::{debug, error};

use crate::context::{Shared, SyncContext};

#[derive(Debug)]
pub enum GateDecision {
    Skip(SkipReason),
    Dispatch(SyncContext),
}

/// Styles handled by a sibling controller variant.
const SIBLING_STYLES: &[RollingStyle] = &[RollingStyle::Canary];

/// The strategy annotation value, if the Deployment is under rollout control.
pub fn managed_strategy(d: &Deployment) -> Option<&str> {
    d.metadata
        .annotations
        .as_ref()?
        .get(DEPLOYMENT_STRATEGY_ANNOTATION)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
}

pub struct Gate {
    shared: Shared,
}

impl Gate {
    pub fn new(shared: Shared) -> Self { Self { shared } }

    pub fn evaluate(&self, deployment: Arc<Deployment>) -> GateDecision {
        let key = key_of(deployment.as_ref());
        let Some(raw) = managed_strategy(&deployment) else {
            debug!(deployment = %key, "not under rollout control, ignore");
            return GateDecision::Skip(SkipReason::NotManaged);
        };

        // Not retried: a bad annotation only changes through a new edit, which
        // produces its own event.
        let strategy = match DeploymentStrategy::from_annotation(raw) {
            Ok(s) => s,
            Err(e) => {
                error!(deployment = %key, error = %e, annotation = %raw, "failed to decode deployment strategy");
                return GateDecision::Skip(SkipReason::Unparseable);
            }
        };

        if SIBLING_STYLES.contains(&strategy.style()) {
            debug!(deployment = %key, style = %strategy.style(), "style owned by another controller, ignore");
            return GateDecision::Skip(SkipReason::WrongStyle);
        }

        debug!(deployment = %key, strategy = ?strategy, "processing deployment");
        GateDecision::Dispatch(SyncContext::new(deployment, strategy, self.shared.clone()))
    }
}
