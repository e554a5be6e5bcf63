//! Reconciliation of node metadata for one MachineSet.
//!
//! This module is organized by concern:
//! - `selector`: which Machines a MachineSet owns
//! - `labels`: which template labels may be written, and the provenance annotation
//! - `taints`: taint identity, de-duplication and diffing
//!
//! A pass fetches the MachineSet, selects its Machines and, for every
//! provisioned Machine, updates in order: machine labels, machine taints, node
//! labels, node taints. The first failure aborts the pass; earlier writes stay
//! and the next pass picks up from there.

pub mod labels;
pub mod selector;
pub mod taints;


use crate::backoff::FibonacciBackoff;
use crate::error::ControllerError;
use crate::metrics::{FailureLabels, MetricsSink};
use cluster_store::{ResourceStore, StoreError};
use crds::{Machine, MachineSet};
use k8s_openapi::api::core::v1::{NodeSpec, Taint};
use kube::ResourceExt;
use labels::{expected_labels, sync_node_labels};
use selector::select_machines;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use taints::{dedup_taints, expected_node_taints, taint_diff};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Result of a pass that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// Every selected machine and node matches the template
    Synced,
    /// The MachineSet no longer exists
    Gone,
    /// Synced, but the template has problems no retry will fix
    Degraded(Vec<ReconcileWarning>),
}

/// A non-retryable problem found while reconciling.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileWarning {
    /// The machine spec lists the same taint more than once; the node got one copy.
    DuplicateTaints { machine: String, duplicates: Vec<Taint> },
}

impl fmt::Display for ReconcileWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileWarning::DuplicateTaints { machine, duplicates } => {
                let keys: Vec<String> = duplicates
                    .iter()
                    .map(|t| format!("{}={}:{}", t.key, t.value.as_deref().unwrap_or_default(), t.effect))
                    .collect();
                write!(f, "machine {} has duplicate taints [{}]", machine, keys.join(", "))
            }
        }
    }
}

/// Backoff state for a MachineSet
#[derive(Debug, Clone)]
struct BackoffState {
    backoff: FibonacciBackoff,
    error_count: u32,
}

/// Reconciles node labels and taints for MachineSets.
pub struct Reconciler {
    pub(crate) store: Box<dyn ResourceStore>,
    pub(crate) metrics: Arc<dyn MetricsSink>,
    backoff_min_seconds: u64,
    backoff_max_seconds: u64,
    /// Requeue backoff per MachineSet (namespace/name -> BackoffState)
    backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl Reconciler {
    /// Creates a new reconciler instance.
    pub fn new(
        store: impl ResourceStore + 'static,
        metrics: Arc<dyn MetricsSink>,
        backoff_min_seconds: u64,
        backoff_max_seconds: u64,
    ) -> Self {
        Self {
            store: Box::new(store),
            metrics,
            backoff_min_seconds,
            backoff_max_seconds,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Run one pass for the MachineSet `namespace/name`.
    pub async fn reconcile(
        &self,
        cancel: &CancellationToken,
        namespace: &str,
        name: &str,
    ) -> Result<ReconcileOutcome, ControllerError> {
        let machine_set = match guarded(cancel, self.store.get_machine_set(namespace, name)).await {
            Ok(ms) => ms,
            Err(ControllerError::Store(e)) if e.is_not_found() => {
                debug!("MachineSet {}/{} not found, nothing to do", namespace, name);
                self.forget_backoff(&format!("{}/{}", namespace, name));
                return Ok(ReconcileOutcome::Gone);
            }
            Err(e) => return Err(e),
        };

        let all_machines = guarded(cancel, self.store.list_machines(namespace)).await?;
        let machines = select_machines(&machine_set, all_machines).map_err(|source| {
            error!("MachineSet {}/{} failed selector validation: {}", namespace, name, source);
            ControllerError::Selector {
                machine_set: format!("{}/{}", namespace, name),
                source,
            }
        })?;
        debug!("MachineSet {}/{} selects {} machines", namespace, name, machines.len());

        let mut warnings = Vec::new();
        for machine in machines {
            self.sync_machine(cancel, &machine_set, machine, &mut warnings).await?;
        }

        if warnings.is_empty() {
            Ok(ReconcileOutcome::Synced)
        } else {
            Ok(ReconcileOutcome::Degraded(warnings))
        }
    }

    async fn sync_machine(
        &self,
        cancel: &CancellationToken,
        machine_set: &MachineSet,
        mut machine: Machine,
        warnings: &mut Vec<ReconcileWarning>,
    ) -> Result<(), ControllerError> {
        let machine_name = machine.name_any();
        let namespace = machine.namespace().unwrap_or_default();

        let Some(node_name) = machine.node_name().map(str::to_string) else {
            debug!("Machine {}/{} has no node yet, skipping", namespace, machine_name);
            return Ok(());
        };

        let mut node = guarded(cancel, self.store.get_node(&node_name))
            .await
            .inspect_err(|e| {
                error!("Failed to fetch node {} for machine {}: {}", node_name, machine_name, e);
                self.report_label_failure(&node_name, "", e);
            })?;

        let expected = expected_labels(machine_set, &machine, &node);

        if machine.spec.metadata.labels != expected {
            machine.spec.metadata.labels = expected.clone();
            machine = guarded(cancel, self.store.update_machine(&machine))
                .await
                .inspect_err(|e| {
                    error!("Failed to update labels of machine {}/{}: {}", namespace, machine_name, e);
                    self.report_label_failure(&machine_name, &namespace, e);
                })?;
            info!("Updated labels of machine {}/{}", namespace, machine_name);
        }

        if machine.spec.taints.as_slice() != machine_set.template_taints() {
            machine.spec.taints = machine_set.template_taints().to_vec();
            machine = guarded(cancel, self.store.update_machine(&machine))
                .await
                .inspect_err(|e| {
                    error!("Failed to update taints of machine {}/{}: {}", namespace, machine_name, e);
                    self.report_taint_failure(&machine_name, &namespace, e);
                })?;
            info!("Updated taints of machine {}/{}", namespace, machine_name);
        }

        if sync_node_labels(&mut node, &expected) {
            node = guarded(cancel, self.store.update_node(&node))
                .await
                .inspect_err(|e| {
                    error!("Failed to update labels of node {}: {}", node_name, e);
                    self.report_label_failure(&node_name, "", e);
                })?;
            info!("Updated labels of node {}", node_name);
        } else {
            debug!("Labels of node {} already in sync", node_name);
        }

        let (machine_taints, duplicates) = dedup_taints(&machine.spec.taints);
        if !duplicates.is_empty() {
            let warning = ReconcileWarning::DuplicateTaints {
                machine: machine_name.clone(),
                duplicates,
            };
            warn!("{}; applying one copy of each", warning);
            warnings.push(warning);
        }

        let current = node.spec.as_ref().and_then(|s| s.taints.clone()).unwrap_or_default();
        let desired = expected_node_taints(&machine_taints, &current);
        let diff = taint_diff(&desired, &current);
        if diff.is_empty() {
            debug!("Taints of node {} already in sync", node_name);
            return Ok(());
        }

        debug!(
            "Node {}: adding {} taints, removing {} taints",
            node_name,
            diff.to_add.len(),
            diff.to_remove.len()
        );
        node.spec.get_or_insert_with(NodeSpec::default).taints = (!desired.is_empty()).then_some(desired);
        guarded(cancel, self.store.update_node(&node))
            .await
            .inspect_err(|e| {
                error!("Failed to update taints of node {}: {}", node_name, e);
                self.report_taint_failure(&node_name, "", e);
            })?;
        info!("Updated taints of node {}", node_name);
        Ok(())
    }

    fn report_label_failure(&self, name: &str, namespace: &str, err: &ControllerError) {
        if !matches!(err, ControllerError::Cancelled) {
            self.metrics.label_update_failed(&FailureLabels {
                name,
                namespace,
                reason: err.reason(),
            });
        }
    }

    fn report_taint_failure(&self, name: &str, namespace: &str, err: &ControllerError) {
        if !matches!(err, ControllerError::Cancelled) {
            self.metrics.taint_update_failed(&FailureLabels {
                name,
                namespace,
                reason: err.reason(),
            });
        }
    }

    /// Next requeue delay for a MachineSet whose last pass failed
    ///
    /// Returns (backoff, error_count)
    pub fn backoff_for(&self, key: &str) -> (Duration, u32) {
        match self.backoff_states.lock() {
            Ok(mut states) => {
                let state = states.entry(key.to_string()).or_insert_with(|| BackoffState {
                    backoff: FibonacciBackoff::new(self.backoff_min_seconds, self.backoff_max_seconds),
                    error_count: 0,
                });
                state.error_count += 1;
                (state.backoff.next_backoff(), state.error_count)
            }
            Err(e) => {
                warn!("Failed to lock backoff_states: {}, using maximum backoff", e);
                (Duration::from_secs(self.backoff_max_seconds), 0)
            }
        }
    }

    /// Reset backoff for a MachineSet (on successful reconciliation)
    pub fn reset_backoff(&self, key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            if let Some(state) = states.get_mut(key) {
                state.error_count = 0;
                state.backoff.reset();
            }
        }
    }

    /// Drop backoff state for a MachineSet that no longer exists
    fn forget_backoff(&self, key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            states.remove(key);
        }
    }
}

/// Await a store call unless `cancel` fires first.
async fn guarded<T>(
    cancel: &CancellationToken,
    call: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, ControllerError> {
    if cancel.is_cancelled() {
        return Err(ControllerError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ControllerError::Cancelled),
        result = call => result.map_err(ControllerError::from),
    }
}

impl fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("backoff_min_seconds", &self.backoff_min_seconds)
            .field("backoff_max_seconds", &self.backoff_max_seconds)
            .finish_non_exhaustive()
    }
}
