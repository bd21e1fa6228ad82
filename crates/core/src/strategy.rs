//! Deployment strategy decoded from the strategy annotation.
//!
//! The wire format is JSON with a `rollingStyle` discriminant, for example
//! `{"rollingStyle":"Partition","maxSurge":"25%","partition":3}`. Style names
//! are accepted in PascalCase and lowercase.

use std::fmt;

use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde::{Deserialize, Serialize};

/// Closed set of rolling styles shared by every cooperating controller variant.
/// A new style has to be added here and in each variant before it is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RollingStyle {
    Canary,
    Partition,
    Rolling,
}

impl RollingStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            RollingStyle::Canary => "Canary",
            RollingStyle::Partition => "Partition",
            RollingStyle::Rolling => "Rolling",
        }
    }
}

impl fmt::Display for RollingStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Parameters for the batch-style strategies (`Partition`, `Rolling`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_surge: Option<IntOrString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_unavailable: Option<IntOrString>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub paused: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<IntOrString>,
}

/// Canary parameters are owned by the canary controller; kept opaque here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanaryParams {
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

/// `rollingStyle` is required. A value without it does not decode and is
/// never dispatched, even though every other field is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rollingStyle")]
pub enum DeploymentStrategy {
    #[serde(rename = "Canary", alias = "canary")]
    Canary(CanaryParams),
    #[serde(rename = "Partition", alias = "partition")]
    Partition(BatchParams),
    #[serde(rename = "Rolling", alias = "rolling")]
    Rolling(BatchParams),
}

#[derive(Debug, thiserror::Error)]
pub enum StrategyError {
    #[error("strategy annotation is empty")]
    Missing,
    #[error("decoding strategy: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid strategy: {0}")]
    Invalid(String),
}

impl DeploymentStrategy {
    /// Decode and validate a raw annotation value.
    pub fn from_annotation(raw: &str) -> Result<Self, StrategyError> {
        if raw.trim().is_empty() {
            return Err(StrategyError::Missing);
        }
        let strategy: DeploymentStrategy = serde_json::from_str(raw)?;
        strategy.validate()?;
        Ok(strategy)
    }

    pub fn style(&self) -> RollingStyle {
        match self {
            DeploymentStrategy::Canary(_) => RollingStyle::Canary,
            DeploymentStrategy::Partition(_) => RollingStyle::Partition,
            DeploymentStrategy::Rolling(_) => RollingStyle::Rolling,
        }
    }

    /// Batch parameters; `None` for canary.
    pub fn batch(&self) -> Option<&BatchParams> {
        match self {
            DeploymentStrategy::Canary(_) => None,
            DeploymentStrategy::Partition(p) | DeploymentStrategy::Rolling(p) => Some(p),
        }
    }

    fn validate(&self) -> Result<(), StrategyError> {
        let Some(p) = self.batch() else { return Ok(()) };
        let surge = p.max_surge.as_ref().map(|v| check_int_or_percent("maxSurge", v, None)).transpose()?;
        let unavailable =
            p.max_unavailable.as_ref().map(|v| check_int_or_percent("maxUnavailable", v, Some(100))).transpose()?;
        if let Some(v) = p.partition.as_ref() {
            check_int_or_percent("partition", v, Some(100))?;
        }
        if surge == Some(0) && unavailable == Some(0) {
            return Err(StrategyError::Invalid("maxSurge and maxUnavailable may not both be 0".into()));
        }
        Ok(())
    }
}

/// Returns the numeric part (count or percent) after range checks. Surge may
/// exceed 100%; `max_pct` bounds the fields that count existing replicas.
fn check_int_or_percent(field: &str, v: &IntOrString, max_pct: Option<i64>) -> Result<i64, StrategyError> {
    match v {
        IntOrString::Int(n) if *n < 0 => Err(StrategyError::Invalid(format!("{field} must be >= 0, got {n}"))),
        IntOrString::Int(n) => Ok(i64::from(*n)),
        IntOrString::String(s) => {
            let pct = s
                .strip_suffix('%')
                .and_then(|d| d.parse::<i64>().ok())
                .ok_or_else(|| StrategyError::Invalid(format!("{field} must be an integer or percentage, got {s:?}")))?;
            if pct < 0 || max_pct.is_some_and(|max| pct > max) {
                return Err(StrategyError::Invalid(format!("{field} percentage out of range: {s}")));
            }
            Ok(pct)
        }
    }
}
