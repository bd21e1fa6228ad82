//! Ownership propagation: dependent-object changes enqueue the controlling
//! Deployment, with no content-based filtering.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Resource;
use rollgate_core::ObjectKey;
use rollgate_store::{controller_owner, Change};
use smallvec::SmallVec;

pub const OWNER_KIND: &str = "Deployment";
pub const OWNER_GROUP: &str = "apps";

/// Key of the controlling Deployment, if the controller owner reference is one.
pub fn owner_key(meta: &ObjectMeta) -> Option<ObjectKey> {
    let owner = controller_owner(meta)?;
    let group = owner.api_version.rsplit_once('/').map_or("", |(g, _)| g);
    if owner.kind != OWNER_KIND || group != OWNER_GROUP {
        return None;
    }
    Some(ObjectKey::new(meta.namespace.clone().unwrap_or_default(), owner.name.clone()))
}

/// Owner keys to enqueue for a change. Updates notify the owners of both
/// snapshots so a re-parented object reaches its old and new owner.
pub fn owner_keys<K: Resource>(change: &Change<K>) -> SmallVec<[ObjectKey; 2]> {
    let mut out: SmallVec<[ObjectKey; 2]> = SmallVec::new();
    match change {
        Change::Created(o) | Change::Deleted(o) => out.extend(owner_key(o.meta())),
        Change::Updated { old, new } => {
            out.extend(owner_key(new.meta()));
            if let Some(k) = owner_key(old.meta()) {
                if !out.contains(&k) {
                    out.push(k);
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::ReplicaSet;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
    use std::sync::Arc;

    fn rs(owner: Option<(&str, &str, &str, bool)>, replicas: i32) -> Arc<ReplicaSet> {
        Arc::new(ReplicaSet {
            metadata: ObjectMeta {
                namespace: Some("prod".into()),
                name: Some("web-abc".into()),
                owner_references: owner.map(|(api_version, kind, name, controller)| {
                    vec![OwnerReference {
                        api_version: api_version.into(),
                        kind: kind.into(),
                        name: name.into(),
                        uid: "u".into(),
                        controller: Some(controller),
                        ..Default::default()
                    }]
                }),
                ..Default::default()
            },
            spec: Some(k8s_openapi::api::apps::v1::ReplicaSetSpec { replicas: Some(replicas), ..Default::default() }),
            ..Default::default()
        })
    }

    #[test]
    fn every_change_kind_reaches_the_owner() {
        let web = ObjectKey::new("prod", "web");
        let a = rs(Some(("apps/v1", "Deployment", "web", true)), 1);
        assert_eq!(owner_keys(&Change::Created(Arc::clone(&a))).as_slice(), &[web.clone()]);
        assert_eq!(owner_keys(&Change::Deleted(Arc::clone(&a))).as_slice(), &[web.clone()]);
        // identical snapshots still propagate
        assert_eq!(owner_keys(&Change::Updated { old: Arc::clone(&a), new: a }).as_slice(), &[web]);
    }

    #[test]
    fn ignores_non_controller_and_foreign_owners() {
        assert!(owner_keys(&Change::Created(rs(None, 1))).is_empty());
        assert!(owner_keys(&Change::Created(rs(Some(("apps/v1", "Deployment", "web", false)), 1))).is_empty());
        assert!(owner_keys(&Change::Created(rs(Some(("apps/v1", "StatefulSet", "db", true)), 1))).is_empty());
        assert!(owner_keys(&Change::Created(rs(Some(("example.io/v1", "Deployment", "web", true)), 1))).is_empty());
    }

    #[test]
    fn reparenting_notifies_both_owners() {
        let old = rs(Some(("apps/v1", "Deployment", "web", true)), 1);
        let new = rs(Some(("apps/v1", "Deployment", "web-v2", true)), 1);
        let keys = owner_keys(&Change::Updated { old, new });
        assert_eq!(keys.as_slice(), &[ObjectKey::new("prod", "web-v2"), ObjectKey::new("prod", "web")]);
    }
}
