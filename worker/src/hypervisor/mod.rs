//! Owns one hypervisor process end to end: locate the binary, spawn it,
//! configure drives/network/machine over its control socket, start it, wait
//! for the guest agent to answer, and tear everything down again.
//!
//! Grounded on the teacher's `vm_impl/linux.rs` (`LinuxVm::new`/`start`/
//! `shutdown`) for the overall shape, and on `original_source/worker/main.go`
//! (`createAndStartVM`, `getFirecrackerConfig`, `shutDown`) for the exact
//! Firecracker request bodies and teardown order.

pub mod api;
pub mod cni;
pub mod process;
pub mod probe;

use std::net::Ipv4Addr;
use std::path::PathBuf;

use tokio::process::Child;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{rate_limits, HypervisorConfig, KERNEL_BOOT_ARGS};
use crate::error::HypervisorError;

/// A single booted, network-attached, probe-ready VM, handed off from the
/// warm pool to a job runner. The runner owns it exclusively from that point
/// on; nothing else touches its socket or control client concurrently.
pub struct RunningVm {
    pub vmm_id: String,
    pub guest_ip: Ipv4Addr,
    pub agent_port: u16,
    child: Child,
    control: api::ControlClient,
    socket_path: PathBuf,
    rootfs_path: PathBuf,
    cni_network: String,
    cni_ifname: String,
    cancel: CancellationToken,
    torn_down: bool,
}

impl RunningVm {
    /// Tear the VM down: stop the guest, kill and reap the hypervisor
    /// process, release its network allocation, and remove its temporary
    /// files. Idempotent — safe to call from both the job runner's normal
    /// completion path and a pool-level cleanup sweep without double work.
    /// Every step here is best-effort and logged; none of it propagates,
    /// matching spec.md §4.1's "cleanup failures never mask the original
    /// outcome" rule.
    pub async fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        if let Err(e) = self.control.stop().await {
            warn!(vmm_id = %self.vmm_id, error = %e, "graceful stop failed, killing process");
        }

        if let Err(e) = self.child.start_kill() {
            warn!(vmm_id = %self.vmm_id, error = %e, "failed to signal hypervisor process");
        }
        if let Err(e) = self.child.wait().await {
            warn!(vmm_id = %self.vmm_id, error = %e, "failed to reap hypervisor process");
        }

        self.cancel.cancel();

        if let Err(e) = cni::release(&self.cni_network, &self.cni_ifname, &self.vmm_id).await {
            warn!(vmm_id = %self.vmm_id, error = %e, "failed to release CNI allocation");
        }

        if let Err(e) = tokio::fs::remove_file(&self.socket_path).await {
            warn!(vmm_id = %self.vmm_id, error = %e, "failed to remove control socket");
        }
        if let Err(e) = tokio::fs::remove_file(&self.rootfs_path).await {
            warn!(vmm_id = %self.vmm_id, error = %e, "failed to remove rootfs copy");
        }

        info!(vmm_id = %self.vmm_id, "vm torn down");
    }
}

/// Boot one VM: find the binary, copy the rootfs template, spawn the
/// process, push drive/network/machine/boot-source config over the control
/// socket, issue `InstanceStart`, and return once the guest agent is
/// reachable.
pub async fn start(config: &HypervisorConfig) -> Result<RunningVm, HypervisorError> {
    let vmm_id = Uuid::new_v4().to_string();
    let pid_placeholder = std::process::id();

    let binary = process::locate_binary(&config.binary_name)?;
    let socket_path = process::socket_path(pid_placeholder, &vmm_id);
    let rootfs_path = process::rootfs_copy_path(&vmm_id);

    tokio::fs::copy(&config.rootfs_template_path, &rootfs_path)
        .await
        .map_err(|e| HypervisorError::RootfsCopy(rootfs_path.clone(), e))?;

    let child = match process::spawn(&binary, &socket_path) {
        Ok(child) => child,
        Err(e) => {
            if let Err(e) = tokio::fs::remove_file(&rootfs_path).await {
                warn!(vmm_id = %vmm_id, error = %e, "failed to remove rootfs copy after spawn failure");
            }
            return Err(e);
        }
    };

    // From here on the hypervisor process exists; every remaining failure
    // path must tear it (and anything allocated after it) down before
    // returning, per spec.md §4.1's "on any error the scope is cancelled
    // before returning" rule.
    let mut vm = RunningVm {
        vmm_id,
        guest_ip: Ipv4Addr::UNSPECIFIED,
        agent_port: config.agent_port,
        child,
        control: api::ControlClient::new(socket_path.clone()),
        socket_path,
        rootfs_path,
        cni_network: config.cni_network.clone(),
        cni_ifname: config.cni_ifname.clone(),
        cancel: CancellationToken::new(),
        torn_down: false,
    };

    if let Err(e) = api::wait_for_socket(&vm.socket_path, std::time::Duration::from_secs(5)).await {
        vm.teardown().await;
        return Err(e);
    }

    if let Err(e) = vm
        .control
        .configure_boot_source(&serde_json::json!({
            "kernel_image_path": config.kernel_path,
            "boot_args": KERNEL_BOOT_ARGS,
        }))
        .await
    {
        vm.teardown().await;
        return Err(e);
    }

    if let Err(e) = vm
        .control
        .configure_drive(
            "rootfs",
            &serde_json::json!({
                "drive_id": "rootfs",
                "path_on_host": vm.rootfs_path,
                "is_root_device": true,
                "is_read_only": false,
                "rate_limiter": {
                    "bandwidth": {
                        "size": rate_limits::BYTES_BUCKET_SIZE,
                        "refill_time": rate_limits::BYTES_REFILL_MS,
                    },
                    "ops": {
                        "size": rate_limits::IOPS_BUCKET_SIZE,
                        "refill_time": rate_limits::IOPS_REFILL_MS,
                    },
                },
            }),
        )
        .await
    {
        vm.teardown().await;
        return Err(e);
    }

    if let Err(e) = vm
        .control
        .configure_machine(&serde_json::json!({
            "vcpu_count": config.vcpu_count,
            "mem_size_mib": config.mem_size_mib,
        }))
        .await
    {
        vm.teardown().await;
        return Err(e);
    }

    vm.guest_ip = match cni::allocate(&vm.cni_network, &vm.cni_ifname, &vm.vmm_id).await {
        Ok(guest_ip) => guest_ip,
        Err(e) => {
            vm.teardown().await;
            return Err(e);
        }
    };

    if let Err(e) = vm
        .control
        .configure_network(
            "eth0",
            &serde_json::json!({
                "iface_id": "eth0",
                "host_dev_name": vm.cni_ifname,
            }),
        )
        .await
    {
        vm.teardown().await;
        return Err(e);
    }

    if let Err(e) = vm.control.start_instance().await {
        vm.teardown().await;
        return Err(e);
    }

    info!(vmm_id = %vm.vmm_id, guest_ip = %vm.guest_ip, "vm started");

    Ok(vm)
}

/// Remove any control sockets left behind by a previous run of this worker
/// process, keyed by pid prefix. Run at both startup and shutdown per
/// spec.md §4.1; a stale socket from a crashed prior run is otherwise
/// invisible until something tries to dial it.
pub async fn sweep_orphan_sockets(pid: u32) {
    let prefix = process::socket_prefix(pid);
    let dir = std::env::temp_dir();

    let mut entries = match tokio::fs::read_dir(&dir).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!(error = %e, "failed to scan temp dir for orphan sockets");
            return;
        }
    };

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "failed to read temp dir entry during orphan sweep");
                break;
            }
        };

        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !name.starts_with(&prefix) {
            continue;
        }

        if let Err(e) = tokio::fs::remove_file(entry.path()).await {
            warn!(path = %entry.path().display(), error = %e, "failed to remove orphan socket");
        } else {
            info!(path = %entry.path().display(), "removed orphan socket");
        }
    }
}
