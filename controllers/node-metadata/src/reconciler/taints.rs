//! Taint set helpers.
//!
//! Taints are compared by `(key, value, effect)`; a missing value equals an empty
//! one and `timeAdded` is ignored, since the API server stamps it on its own.

use k8s_openapi::api::core::v1::Taint;

/// Key of the taint the platform sets when a node is cordoned.
pub const UNSCHEDULABLE_TAINT_KEY: &str = "node.kubernetes.io/unschedulable";

/// Effect of the cordon taint.
pub const NO_SCHEDULE: &str = "NoSchedule";

/// Whether two taints have the same identity.
pub fn same_taint(a: &Taint, b: &Taint) -> bool {
    a.key == b.key
        && a.effect == b.effect
        && a.value.as_deref().unwrap_or_default() == b.value.as_deref().unwrap_or_default()
}

/// Whether `taint` is the platform cordon taint.
pub fn is_cordon_taint(taint: &Taint) -> bool {
    taint.key == UNSCHEDULABLE_TAINT_KEY && taint.effect == NO_SCHEDULE
}

fn contains(taints: &[Taint], taint: &Taint) -> bool {
    taints.iter().any(|t| same_taint(t, taint))
}

/// Drop repeated taints, keeping the first occurrence of each.
///
/// Returns the unique taints in their original order and the dropped repeats.
pub fn dedup_taints(taints: &[Taint]) -> (Vec<Taint>, Vec<Taint>) {
    let mut unique: Vec<Taint> = Vec::with_capacity(taints.len());
    let mut duplicates = Vec::new();
    for taint in taints {
        if contains(&unique, taint) {
            duplicates.push(taint.clone());
        } else {
            unique.push(taint.clone());
        }
    }
    (unique, duplicates)
}

/// Changes needed to turn one taint set into another.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaintDiff {
    pub to_add: Vec<Taint>,
    pub to_remove: Vec<Taint>,
}

impl TaintDiff {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Set difference between the desired and current taints.
pub fn taint_diff(desired: &[Taint], current: &[Taint]) -> TaintDiff {
    TaintDiff {
        to_add: desired.iter().filter(|t| !contains(current, t)).cloned().collect(),
        to_remove: current.iter().filter(|t| !contains(desired, t)).cloned().collect(),
    }
}

/// Taints the node should end up with: the machine's (already de-duplicated)
/// taints plus any cordon taint the node carries now.
pub fn expected_node_taints(machine_taints: &[Taint], node_taints: &[Taint]) -> Vec<Taint> {
    let mut expected = machine_taints.to_vec();
    for taint in node_taints.iter().filter(|t| is_cordon_taint(t)) {
        if !contains(&expected, taint) {
            expected.push(taint.clone());
        }
    }
    expected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::taint;

    #[test]
    fn test_same_taint_ignores_missing_value_and_time_added() {
        let mut a = taint("dedicated", "", "NoSchedule");
        a.value = None;
        let mut b = taint("dedicated", "", "NoSchedule");
        b.time_added = Some(serde_json::from_value(serde_json::json!("2024-01-01T00:00:00Z")).unwrap());

        assert!(same_taint(&a, &b));
        assert!(!same_taint(&a, &taint("dedicated", "x", "NoSchedule")));
        assert!(!same_taint(&a, &taint("dedicated", "", "NoExecute")));
    }

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let taints = vec![
            taint("a", "1", "NoSchedule"),
            taint("b", "2", "NoExecute"),
            taint("a", "1", "NoSchedule"),
            taint("a", "2", "NoSchedule"),
        ];

        let (unique, duplicates) = dedup_taints(&taints);
        assert_eq!(unique, vec![taints[0].clone(), taints[1].clone(), taints[3].clone()]);
        assert_eq!(duplicates, vec![taints[2].clone()]);
    }

    #[test]
    fn test_diff_reports_both_sides() {
        let desired = vec![taint("a", "1", "NoSchedule"), taint("b", "", "NoExecute")];
        let current = vec![taint("b", "", "NoExecute"), taint("c", "3", "PreferNoSchedule")];

        let diff = taint_diff(&desired, &current);
        assert_eq!(diff.to_add, vec![taint("a", "1", "NoSchedule")]);
        assert_eq!(diff.to_remove, vec![taint("c", "3", "PreferNoSchedule")]);
        assert!(!diff.is_empty());
        assert!(taint_diff(&desired, &desired).is_empty());
    }

    #[test]
    fn test_value_change_is_a_diff() {
        let diff = taint_diff(&[taint("a", "new", "NoSchedule")], &[taint("a", "old", "NoSchedule")]);
        assert_eq!(diff.to_add.len(), 1);
        assert_eq!(diff.to_remove.len(), 1);
    }

    #[test]
    fn test_expected_taints_keep_cordon() {
        let cordon = taint(UNSCHEDULABLE_TAINT_KEY, "", NO_SCHEDULE);
        let node = vec![cordon.clone(), taint("stale", "", "NoSchedule")];

        assert_eq!(expected_node_taints(&[], &node), vec![cordon.clone()]);

        let machine = vec![taint("dedicated", "infra", "NoSchedule")];
        assert_eq!(
            expected_node_taints(&machine, &node),
            vec![machine[0].clone(), cordon.clone()]
        );

        // Already present through the machine: not doubled.
        assert_eq!(expected_node_taints(&[cordon.clone()], &node), vec![cordon]);
    }

    #[test]
    fn test_unschedulable_with_other_effect_is_not_cordon() {
        let execute = taint(UNSCHEDULABLE_TAINT_KEY, "", "NoExecute");
        assert!(!is_cordon_taint(&execute));
        assert!(expected_node_taints(&[], &[execute]).is_empty());
    }
}
