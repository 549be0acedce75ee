//! The warm-VM pool: a background producer keeps a bounded channel topped up
//! with booted, probed VMs so a job runner never pays boot latency on the
//! hot path.
//!
//! Generalized from the teacher's `vm_manager.rs`, which tracks one VM per
//! in-flight job in a `HashMap<Uuid, mpsc::Sender<VmCommand>>`. This worker
//! has no per-job VM identity to track before handoff — it just needs a
//! continuously refilled buffer — so the `HashMap` collapses to a bounded
//! `tokio::sync::mpsc` channel between one producer task and many consumers.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{HypervisorConfig, POOL_PRODUCER_START_BACKOFF};
use crate::hypervisor::{self, probe, RunningVm};

pub type Pool = mpsc::Receiver<RunningVm>;

/// Spawn the producer task and return the consuming half of its channel.
/// The task runs until `shutdown` is cancelled.
pub fn spawn(config: HypervisorConfig, capacity: usize, shutdown: CancellationToken) -> Pool {
    let (tx, rx) = mpsc::channel(capacity);
    tokio::spawn(produce(config, tx, shutdown));
    rx
}

async fn produce(config: HypervisorConfig, tx: mpsc::Sender<RunningVm>, shutdown: CancellationToken) {
    loop {
        if shutdown.is_cancelled() {
            return;
        }

        let vm = match hypervisor::start(&config).await {
            Ok(vm) => vm,
            Err(e) => {
                warn!(error = %e, "failed to start a warm vm, retrying");
                tokio::select! {
                    _ = tokio::time::sleep(POOL_PRODUCER_START_BACKOFF) => continue,
                    _ = shutdown.cancelled() => return,
                }
            }
        };

        let mut vm = vm;
        if let Err(e) = probe::wait_ready(vm.guest_ip, vm.agent_port).await {
            warn!(vmm_id = %vm.vmm_id, error = %e, "warm vm failed its boot probe, discarding");
            vm.teardown().await;
            continue;
        }

        info!(vmm_id = %vm.vmm_id, "vm warmed and ready");

        tokio::select! {
            send_result = tx.send(vm) => {
                if let Err(mpsc::error::SendError(mut vm)) = send_result {
                    error!("pool receiver dropped, producer stopping");
                    vm.teardown().await;
                    return;
                }
            }
            _ = shutdown.cancelled() => {
                return;
            }
        }
    }
}

/// Dequeue a warm VM, blocking until one is available or the pool is
/// shutting down.
pub async fn acquire(pool: &mut Pool) -> Option<RunningVm> {
    pool.recv().await
}

/// Tear down every VM still sitting in the pool. Called once at shutdown so
/// warm VMs nobody claimed don't leak a hypervisor process, socket, or
/// rootfs copy (spec.md §8, S5).
pub async fn drain_and_teardown(pool: &mut Pool) {
    pool.close();
    while let Ok(mut vm) = pool.try_recv() {
        vm.teardown().await;
    }
}
