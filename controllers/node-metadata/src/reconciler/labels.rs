//! Label provenance.
//!
//! The operator records the node label keys it wrote in the
//! `managed.openshift.com/customlabels` annotation. Only those keys, or keys the
//! machine already carries, may be overwritten or removed; anything else on the
//! node belongs to someone else.

use crds::{Machine, MachineSet};
use k8s_openapi::api::core::v1::Node;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Node annotation listing the label keys owned by the operator.
pub const CUSTOM_LABELS_ANNOTATION: &str = "managed.openshift.com/customlabels";

/// Parse the annotation value. Empty and absent both mean "owns nothing".
pub fn parse_owned_keys(value: Option<&str>) -> BTreeSet<String> {
    value
        .unwrap_or_default()
        .split(',')
        .filter(|key| !key.is_empty())
        .map(str::to_string)
        .collect()
}

/// Encode owned keys as a sorted, comma-joined list.
pub fn encode_owned_keys<'a>(keys: impl IntoIterator<Item = &'a String>) -> String {
    let sorted: BTreeSet<&str> = keys.into_iter().map(String::as_str).collect();
    sorted.into_iter().collect::<Vec<_>>().join(",")
}

/// Keys the annotation on `node` says the operator owns.
pub fn owned_keys(node: &Node) -> BTreeSet<String> {
    parse_owned_keys(
        node.metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(CUSTOM_LABELS_ANNOTATION))
            .map(String::as_str),
    )
}

/// Operator-owned labels currently present on the node.
pub fn node_custom_labels(node: &Node) -> BTreeMap<String, String> {
    let Some(labels) = node.metadata.labels.as_ref() else {
        return BTreeMap::new();
    };
    owned_keys(node)
        .into_iter()
        .filter_map(|key| labels.get(&key).map(|value| (key, value.clone())))
        .collect()
}

/// Labels the MachineSet template may push onto this machine and node.
///
/// Works on a copy of the template labels. A key already on the node is dropped
/// unless the machine carries it or the annotation records it as owned, so
/// labels set by an admin or another controller survive.
pub fn expected_labels(machine_set: &MachineSet, machine: &Machine, node: &Node) -> BTreeMap<String, String> {
    let owned = owned_keys(node);
    let node_labels = node.metadata.labels.as_ref();
    let machine_labels = machine.custom_labels();

    let mut expected = machine_set.template_node_labels().clone();
    expected.retain(|key, _| {
        if key.contains(',') {
            warn!(
                "Label key {:?} of MachineSet {:?} contains a comma and cannot be tracked; skipping it",
                key, machine_set.metadata.name
            );
            return false;
        }
        let on_node = node_labels.is_some_and(|labels| labels.contains_key(key));
        if on_node && !machine_labels.contains_key(key) && !owned.contains(key) {
            debug!(
                "Label {} on node {:?} predates the operator, leaving it alone",
                key, node.metadata.name
            );
            return false;
        }
        true
    });
    expected
}

/// Bring the node's operator-owned labels and annotation in line with `expected`.
///
/// Returns whether the node was modified.
pub fn sync_node_labels(node: &mut Node, expected: &BTreeMap<String, String>) -> bool {
    let current = node_custom_labels(node);
    let recorded = owned_keys(node);
    let labels = node.metadata.labels.get_or_insert_with(BTreeMap::new);

    let mut changed = false;
    for key in current.keys().filter(|key| !expected.contains_key(*key)) {
        labels.remove(key);
        changed = true;
    }

    let remaining: BTreeMap<String, String> = current
        .into_iter()
        .filter(|(key, _)| expected.contains_key(key))
        .collect();
    let expected_keys: BTreeSet<String> = expected.keys().cloned().collect();
    if remaining == *expected && recorded == expected_keys {
        return changed;
    }

    labels.extend(expected.iter().map(|(k, v)| (k.clone(), v.clone())));

    let annotations = node.metadata.annotations.get_or_insert_with(BTreeMap::new);
    if expected.is_empty() {
        annotations.remove(CUSTOM_LABELS_ANNOTATION);
    } else {
        annotations.insert(CUSTOM_LABELS_ANNOTATION.to_string(), encode_owned_keys(expected.keys()));
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_parse_owned_keys() {
        assert!(parse_owned_keys(None).is_empty());
        assert!(parse_owned_keys(Some("")).is_empty());
        assert_eq!(
            parse_owned_keys(Some("b,a,,a")),
            BTreeSet::from(["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn test_encode_owned_keys_is_sorted() {
        let keys = vec!["zone".to_string(), "app".to_string(), "team".to_string()];
        assert_eq!(encode_owned_keys(&keys), "app,team,zone");
    }

    #[test]
    fn test_unowned_node_label_is_not_clobbered() {
        let ms = machine_set("ms", &[("k", "v2")]);
        let m = machine("m1", &[("owner", "ms")]);
        let n = node("n1", &[("k", "v1")], None);

        let expected = expected_labels(&ms, &m, &n);
        assert!(!expected.contains_key("k"));
    }

    #[test]
    fn test_owned_node_label_is_overridden() {
        let ms = machine_set("ms", &[("k", "v2")]);
        let m = machine("m1", &[("owner", "ms")]);
        let n = node("n1", &[("k", "v1")], Some("k"));

        let expected = expected_labels(&ms, &m, &n);
        assert_eq!(expected.get("k").map(String::as_str), Some("v2"));
    }

    #[test]
    fn test_label_carried_by_machine_is_overridden() {
        let ms = machine_set("ms", &[("k", "v2")]);
        let mut m = machine("m1", &[("owner", "ms")]);
        m.spec.metadata.labels = map(&[("k", "v1")]);
        let n = node("n1", &[("k", "v1")], None);

        assert_eq!(expected_labels(&ms, &m, &n), map(&[("k", "v2")]));
    }

    #[test]
    fn test_new_labels_are_kept_and_template_is_not_aliased() {
        let ms = machine_set("ms", &[("fresh", "1"), ("taken", "2")]);
        let m = machine("m1", &[("owner", "ms")]);
        let n = node("n1", &[("taken", "admin")], None);

        let mut expected = expected_labels(&ms, &m, &n);
        assert_eq!(expected, map(&[("fresh", "1")]));

        expected.insert("scribble".to_string(), "x".to_string());
        assert_eq!(ms.template_node_labels(), &map(&[("fresh", "1"), ("taken", "2")]));
    }

    #[test]
    fn test_comma_keys_are_dropped() {
        let ms = machine_set("ms", &[("a,b", "1"), ("c", "2")]);
        let expected = expected_labels(&ms, &machine("m1", &[]), &node("n1", &[], None));
        assert_eq!(expected, map(&[("c", "2")]));
    }

    #[test]
    fn test_sync_writes_labels_and_annotation() {
        let mut n = node("n1", &[("kubernetes.io/hostname", "n1")], None);
        let expected = map(&[("team", "storage"), ("app", "db")]);

        assert!(sync_node_labels(&mut n, &expected));
        let labels = n.metadata.labels.as_ref().unwrap();
        assert_eq!(labels.get("team").map(String::as_str), Some("storage"));
        assert_eq!(labels.get("kubernetes.io/hostname").map(String::as_str), Some("n1"));
        assert_eq!(
            n.metadata.annotations.as_ref().unwrap().get(CUSTOM_LABELS_ANNOTATION).map(String::as_str),
            Some("app,team")
        );

        assert!(!sync_node_labels(&mut n, &expected));
    }

    #[test]
    fn test_sync_removes_dropped_owned_labels_only() {
        let mut n = node("n1", &[("old", "1"), ("keep", "2"), ("admin", "3")], Some("old,keep"));
        let expected = map(&[("keep", "2")]);

        assert!(sync_node_labels(&mut n, &expected));
        assert_eq!(n.metadata.labels.as_ref().unwrap(), &map(&[("keep", "2"), ("admin", "3")]));
        assert_eq!(
            n.metadata.annotations.as_ref().unwrap().get(CUSTOM_LABELS_ANNOTATION).map(String::as_str),
            Some("keep")
        );
    }

    #[test]
    fn test_sync_clears_annotation_when_nothing_is_owned() {
        let mut n = node("n1", &[("old", "1")], Some("old"));

        assert!(sync_node_labels(&mut n, &BTreeMap::new()));
        assert!(n.metadata.labels.as_ref().unwrap().is_empty());
        assert!(!n.metadata.annotations.as_ref().unwrap().contains_key(CUSTOM_LABELS_ANNOTATION));
    }

    #[test]
    fn test_sync_prunes_stale_annotation_entries() {
        // "gone" was removed from the node by someone else.
        let mut n = node("n1", &[("keep", "2")], Some("gone,keep"));

        assert!(sync_node_labels(&mut n, &map(&[("keep", "2")])));
        assert_eq!(
            n.metadata.annotations.as_ref().unwrap().get(CUSTOM_LABELS_ANNOTATION).map(String::as_str),
            Some("keep")
        );
    }
}
