// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Owner reference accumulation for generated resources.
//!
//! Generated resources only ever gain owners. At most one owner is the
//! controller, so every owner added here is marked non-controlling.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;

/// Whether `candidate` is already among `existing`, matched by UID
pub fn has_owner(existing: &[OwnerReference], candidate: &OwnerReference) -> bool {
    existing.iter().any(|o| o.uid == candidate.uid)
}

/// Return `existing` with `candidate` appended as a non-controlling owner.
/// Unchanged when the candidate is already present.
pub fn add_non_controlling_owner(
    existing: &[OwnerReference],
    candidate: &OwnerReference,
) -> Vec<OwnerReference> {
    let mut owners = existing.to_vec();
    if !has_owner(existing, candidate) {
        owners.push(OwnerReference {
            controller: Some(false),
            ..candidate.clone()
        });
    }
    owners
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(uid: &str, controller: Option<bool>) -> OwnerReference {
        OwnerReference {
            api_version: "apps/v1".to_string(),
            kind: "ReplicaSet".to_string(),
            name: format!("rs-{}", uid),
            uid: uid.to_string(),
            controller,
            ..Default::default()
        }
    }

    #[test]
    fn test_add_marks_owner_non_controlling() {
        let existing = vec![owner("ff", Some(true))];

        let updated = add_non_controlling_owner(&existing, &owner("rs", Some(true)));

        assert_eq!(updated.len(), 2);
        assert_eq!(updated[0].controller, Some(true));
        assert_eq!(updated[1].uid, "rs");
        assert_eq!(updated[1].controller, Some(false));
        assert_eq!(
            updated.iter().filter(|o| o.controller == Some(true)).count(),
            1
        );
    }

    #[test]
    fn test_add_existing_owner_is_noop() {
        let existing = vec![owner("ff", Some(true)), owner("rs", Some(false))];

        let updated = add_non_controlling_owner(&existing, &owner("rs", None));

        assert_eq!(updated, existing);
    }

    #[test]
    fn test_has_owner_matches_on_uid() {
        let existing = vec![owner("a", None)];
        assert!(has_owner(&existing, &owner("a", Some(true))));
        assert!(!has_owner(&existing, &owner("b", None)));
    }
}
