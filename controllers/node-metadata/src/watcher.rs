//! Kubernetes resource watchers.
//!
//! Drives reconciliation with `kube_runtime::Controller`: MachineSet events
//! reconcile that MachineSet, and Machine events are mapped back to the
//! MachineSets that own or select the Machine. Nodes are not watched; a synced
//! MachineSet is requeued after the resync interval so out-of-band edits to its
//! Nodes get reverted.

use crate::error::ControllerError;
use crate::reconciler::selector::{controller_of, has_matching_labels, is_machine_set_reference};
use crate::reconciler::{ReconcileOutcome, Reconciler};
use crds::{Machine, MachineSet};
use futures::StreamExt;
use kube::{Api, ResourceExt};
use kube_runtime::controller::{Action, Config as ControllerConfig};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::{watcher, Controller};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Shared state handed to every reconcile call.
pub struct Context {
    pub reconciler: Arc<Reconciler>,
    pub cancel: CancellationToken,
    /// Requeue delay after a successful pass
    pub resync: Duration,
}

/// MachineSets that should be reconciled when `machine` changes.
///
/// A machine with a MachineSet controller maps to that owner. Otherwise every
/// MachineSet in its namespace whose (non-empty) selector matches its labels is
/// returned. Machines without labels map to nothing.
pub fn machine_sets_for_machine(machine: &Machine, machine_sets: &[Arc<MachineSet>]) -> Vec<ObjectRef<MachineSet>> {
    let namespace = machine.namespace().unwrap_or_default();

    if let Some(owner) = controller_of(&machine.metadata.owner_references) {
        if is_machine_set_reference(owner) {
            return vec![ObjectRef::new(&owner.name).within(&namespace)];
        }
        debug!(
            "Machine {} is controlled by a {} ({}), ignoring",
            machine.name_any(),
            owner.kind,
            owner.api_version
        );
        return Vec::new();
    }

    let labels = machine.object_labels();
    if labels.is_empty() {
        warn!("No MachineSets found for Machine {} because it has no labels", machine.name_any());
        return Vec::new();
    }

    machine_sets
        .iter()
        .filter(|ms| ms.namespace().as_deref() == Some(namespace.as_str()))
        .filter(|ms| has_matching_labels(ms, &labels))
        .map(|ms| ObjectRef::from_obj(ms.as_ref()))
        .collect()
}

fn machine_set_key(machine_set: &MachineSet) -> String {
    format!("{}/{}", machine_set.namespace().unwrap_or_default(), machine_set.name_any())
}

async fn reconcile_machine_set(machine_set: Arc<MachineSet>, ctx: Arc<Context>) -> Result<Action, ControllerError> {
    let namespace = machine_set.namespace().unwrap_or_default();
    let name = machine_set.name_any();
    debug!("Reconciling MachineSet {}/{}", namespace, name);

    let outcome = ctx.reconciler.reconcile(&ctx.cancel, &namespace, &name).await?;
    ctx.reconciler.reset_backoff(&machine_set_key(&machine_set));

    match outcome {
        ReconcileOutcome::Synced => debug!("MachineSet {}/{} in sync", namespace, name),
        ReconcileOutcome::Gone => {
            debug!("MachineSet {}/{} is gone", namespace, name);
            return Ok(Action::await_change());
        }
        ReconcileOutcome::Degraded(warnings) => {
            for warning in warnings {
                warn!("MachineSet {}/{}: {}", namespace, name, warning);
            }
        }
    }
    Ok(Action::requeue(ctx.resync))
}

fn error_policy(machine_set: Arc<MachineSet>, error: &ControllerError, ctx: Arc<Context>) -> Action {
    if matches!(error, ControllerError::Cancelled) {
        debug!("Reconcile of {} cancelled", machine_set_key(&machine_set));
        return Action::await_change();
    }
    let key = machine_set_key(&machine_set);
    let (backoff, error_count) = ctx.reconciler.backoff_for(&key);
    error!(
        "Reconciliation error for MachineSet {} (attempt {}), retrying in {:?}: {}",
        key, error_count, backoff, error
    );
    Action::requeue(backoff)
}

/// Watches MachineSets and Machines and feeds the reconciler.
pub struct Watcher {
    reconciler: Arc<Reconciler>,
    machine_set_api: Api<MachineSet>,
    machine_api: Api<Machine>,
    concurrency: u16,
    resync: Duration,
    cancel: CancellationToken,
}

impl Watcher {
    /// Creates a new watcher instance.
    pub fn new(
        reconciler: Arc<Reconciler>,
        machine_set_api: Api<MachineSet>,
        machine_api: Api<Machine>,
        concurrency: u16,
        resync: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            reconciler,
            machine_set_api,
            machine_api,
            concurrency,
            resync,
            cancel,
        }
    }

    /// Runs the MachineSet controller until the cancellation token fires.
    pub async fn watch_machine_sets(&self) -> Result<(), ControllerError> {
        info!("Starting MachineSet watcher");

        let ctx = Arc::new(Context {
            reconciler: self.reconciler.clone(),
            cancel: self.cancel.clone(),
            resync: self.resync,
        });

        // Debounce batches the burst of Machine events a scale-up produces.
        let controller_config = ControllerConfig::default()
            .debounce(Duration::from_secs(1))
            .concurrency(self.concurrency);

        let controller = Controller::new(self.machine_set_api.clone(), watcher::Config::default());
        let machine_sets = controller.store();

        controller
            .watches(self.machine_api.clone(), watcher::Config::default(), move |machine| {
                machine_sets_for_machine(&machine, &machine_sets.state())
            })
            .with_config(controller_config)
            .graceful_shutdown_on(self.cancel.clone().cancelled_owned())
            .run(reconcile_machine_set, error_policy, ctx)
            .for_each(|res| async move {
                match res {
                    Ok((obj, _)) => debug!("Reconciled {}", obj),
                    Err(e) => error!("Controller error for MachineSet: {}", e),
                }
            })
            .await;

        info!("MachineSet watcher stopped");
        Ok(())
    }
}
