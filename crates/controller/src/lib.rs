//! Rollgate controller: event filtering, ownership propagation, eligibility
//! gating and dispatch to the Sync Engine.

#![forbid(unsafe_code)]

pub mod context;
pub mod dispatch;
pub mod filter;
pub mod gate;
pub mod manager;
pub mod owner;
pub mod reconcile;
pub mod sync;
pub mod worker;

pub use context::{Listers, Shared, SyncContext};
pub use gate::{Gate, GateDecision};
pub use reconcile::{DeploymentSource, ReconcileError, Reconciler};
pub use sync::{ObserveOnly, SyncEngine, SyncError};
