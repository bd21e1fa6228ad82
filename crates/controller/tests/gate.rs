#![forbid(unsafe_code)]

mod support;

use std::sync::Arc;

use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use rollgate_controller::{Gate, GateDecision};
use rollgate_core::{RollingStyle, SkipReason};
use support::{deployment, managed, shared, MemRecorder};

fn gate() -> Gate { Gate::new(shared(Arc::new(MemRecorder::default()))) }

fn skip_reason(d: GateDecision) -> Option<SkipReason> {
    match d {
        GateDecision::Skip(r) => Some(r),
        GateDecision::Dispatch(_) => None,
    }
}

#[test]
fn unmanaged_deployments_are_ineligible() {
    let g = gate();
    let plain = deployment("prod", "web", 1, &[("team", "payments")]);
    assert_eq!(skip_reason(g.evaluate(Arc::new(plain))), Some(SkipReason::NotManaged));

    let empty_marker = managed("prod", "web", "");
    assert_eq!(skip_reason(g.evaluate(Arc::new(empty_marker))), Some(SkipReason::NotManaged));
}

#[test]
fn malformed_strategy_is_unparseable() {
    let g = gate();
    for raw in ["{", "[]", r#"{"rollingStyle":"Sideways"}"#, r#"{"rollingStyle":"Rolling","maxUnavailable":-1}"#] {
        assert_eq!(skip_reason(g.evaluate(Arc::new(managed("prod", "web", raw)))), Some(SkipReason::Unparseable), "{raw}");
    }
}

#[test]
fn canary_style_belongs_to_sibling_controller() {
    let g = gate();
    for raw in [r#"{"rollingStyle":"canary"}"#, r#"{"rollingStyle":"Canary","steps":[{"replicas":1}]}"#] {
        assert_eq!(skip_reason(g.evaluate(Arc::new(managed("prod", "web", raw)))), Some(SkipReason::WrongStyle));
    }
}

#[test]
fn eligible_deployment_gets_context_bound_to_decoded_strategy() {
    let g = gate();
    let d = managed("prod", "web", r#"{"rollingStyle":"rolling","maxSurge":"25%"}"#);
    let ctx = match g.evaluate(Arc::new(d)) {
        GateDecision::Dispatch(ctx) => ctx,
        GateDecision::Skip(r) => panic!("unexpected skip: {r:?}"),
    };
    assert_eq!(ctx.key().to_string(), "prod/web");
    assert_eq!(ctx.strategy().style(), RollingStyle::Rolling);
    assert_eq!(ctx.strategy().batch().and_then(|p| p.max_surge.clone()), Some(IntOrString::String("25%".into())));
    assert!(ctx.client().is_none());
    assert!(ctx.listers().replica_sets_for(ctx.deployment()).is_empty());
}

#[test]
fn strategy_is_redecoded_per_evaluation() {
    let g = gate();
    let first = managed("prod", "web", r#"{"rollingStyle":"Partition","partition":1}"#);
    let second = managed("prod", "web", r#"{"rollingStyle":"Canary"}"#);
    assert!(matches!(g.evaluate(Arc::new(first)), GateDecision::Dispatch(_)));
    assert_eq!(skip_reason(g.evaluate(Arc::new(second))), Some(SkipReason::WrongStyle));
}
