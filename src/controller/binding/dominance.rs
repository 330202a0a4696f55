//! # Dominance election
//!
//! A subject may be referenced by several bindings in one namespace;
//! exactly one of them (the oldest non-terminating one) owns the subject's
//! Vault role. The election is a pure function of the listed bindings and
//! is recomputed on every reconciliation.

use crate::crd::VaultBinding;
use kube::ResourceExt;

/// Pick the dominant binding for `subject` among `bindings`.
///
/// Terminating bindings never win. Creation-timestamp ties (possible at
/// sub-second resolution in the cluster API) are broken by lexicographic
/// UID so the outcome is deterministic.
pub fn find_dominant_binding<'a>(
    bindings: &'a [VaultBinding],
    subject: &str,
) -> Option<&'a VaultBinding> {
    bindings
        .iter()
        .filter(|binding| binding.spec.subject.name == subject)
        .filter(|binding| binding.metadata.deletion_timestamp.is_none())
        .min_by(|a, b| {
            let a_created = a.metadata.creation_timestamp.as_ref().map(|t| t.0);
            let b_created = b.metadata.creation_timestamp.as_ref().map(|t| t.0);
            a_created
                .cmp(&b_created)
                .then_with(|| a.uid().cmp(&b.uid()))
        })
}

/// True when `binding` is the dominant binding within `bindings`.
pub fn is_dominant(binding: &VaultBinding, bindings: &[VaultBinding]) -> bool {
    find_dominant_binding(bindings, &binding.spec.subject.name)
        .is_some_and(|dominant| dominant.uid() == binding.uid())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{VaultBindingSpec, VaultBindingSubject};
    use chrono::{Duration, Utc};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

    fn binding(name: &str, subject: &str, age_secs: i64, uid: &str) -> VaultBinding {
        let mut binding = VaultBinding::new(
            name,
            VaultBindingSpec {
                subject: VaultBindingSubject {
                    name: subject.to_string(),
                },
                ..VaultBindingSpec::default()
            },
        );
        binding.metadata.namespace = Some("default".to_string());
        binding.metadata.creation_timestamp = Some(Time(Utc::now() - Duration::seconds(age_secs)));
        binding.metadata.uid = Some(uid.to_string());
        binding
    }

    #[test]
    fn oldest_binding_wins() {
        let bindings = vec![
            binding("younger", "sa", 10, "uid-b"),
            binding("older", "sa", 20, "uid-a"),
        ];
        let dominant = find_dominant_binding(&bindings, "sa").unwrap();
        assert_eq!(dominant.metadata.name.as_deref(), Some("older"));
        assert!(is_dominant(&bindings[1], &bindings));
        assert!(!is_dominant(&bindings[0], &bindings));
    }

    #[test]
    fn other_subjects_do_not_compete() {
        let bindings = vec![
            binding("for-sa", "sa", 10, "uid-a"),
            binding("for-other", "other", 100, "uid-b"),
        ];
        let dominant = find_dominant_binding(&bindings, "sa").unwrap();
        assert_eq!(dominant.metadata.name.as_deref(), Some("for-sa"));
    }

    #[test]
    fn terminating_bindings_never_win() {
        let mut older = binding("older", "sa", 20, "uid-a");
        older.metadata.deletion_timestamp = Some(Time(Utc::now()));
        let younger = binding("younger", "sa", 10, "uid-b");

        let bindings = vec![older, younger];
        let dominant = find_dominant_binding(&bindings, "sa").unwrap();
        assert_eq!(dominant.metadata.name.as_deref(), Some("younger"));
    }

    #[test]
    fn timestamp_ties_break_by_uid() {
        let now = Utc::now();
        let mut a = binding("a", "sa", 0, "uid-b");
        a.metadata.creation_timestamp = Some(Time(now));
        let mut b = binding("b", "sa", 0, "uid-a");
        b.metadata.creation_timestamp = Some(Time(now));

        let bindings = vec![a, b];
        let dominant = find_dominant_binding(&bindings, "sa").unwrap();
        assert_eq!(dominant.metadata.name.as_deref(), Some("b"));
    }

    #[test]
    fn no_candidates_yields_none() {
        let mut only = binding("only", "sa", 10, "uid-a");
        only.metadata.deletion_timestamp = Some(Time(Utc::now()));
        assert!(find_dominant_binding(&[only], "sa").is_none());
    }
}
