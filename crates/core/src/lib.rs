//! Rollgate core types: reconciliation keys, gate outcomes, strategy and config.

#![forbid(unsafe_code)]

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod config;
pub mod strategy;

pub use config::{ConfigError, ControllerConfig};
pub use strategy::{DeploymentStrategy, RollingStyle, StrategyError};

/// Annotation carrying the JSON-encoded [`DeploymentStrategy`]. Its presence
/// also marks a Deployment as managed by this controller.
pub const DEPLOYMENT_STRATEGY_ANNOTATION: &str = "rollouts.kruise.io/deployment-strategy";

/// Name used for the event reporter and log context.
pub const CONTROLLER_NAME: &str = "advanced-deployment-controller";

/// Reconciliation key: namespace + name of a target object.
///
/// Cluster-scoped objects use an empty namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self { namespace: namespace.into(), name: name.into() }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

/// Why the eligibility gate declined to dispatch an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// Missing management marker.
    NotManaged,
    /// Strategy annotation could not be decoded or failed validation.
    Unparseable,
    /// Strategy style belongs to a sibling controller.
    WrongStyle,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NotManaged => "skip_ineligible",
            SkipReason::Unparseable => "skip_unparseable",
            SkipReason::WrongStyle => "skip_wrong_style",
        }
    }
}

/// Terminal classification of a reconciliation attempt that did not fail
/// with a retryable error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    NotFound,
    Skipped(SkipReason),
    Dispatched,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::NotFound => "skip_not_found",
            Outcome::Skipped(r) => r.as_str(),
            Outcome::Dispatched => "dispatched",
        }
    }
}
