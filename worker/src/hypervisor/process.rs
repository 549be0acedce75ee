//! Locating and spawning the hypervisor binary.
//!
//! Grounded on `original_source/worker/main.go`'s `createAndStartVM` (binary
//! lookup, stat checks, `VMCommandBuilder`) and on the teacher's
//! `vm_impl/linux.rs`, which spawns its VMM with `Command::new(...).spawn()`
//! and forwards stderr with `Stdio::inherit()`.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::{Child, Command};

use crate::error::HypervisorError;

/// Find `binary_name` on `PATH`, verifying it exists, is a regular file, and
/// is executable — with a distinct error for each failure per spec.md §4.1.
pub fn locate_binary(binary_name: &str) -> Result<PathBuf, HypervisorError> {
    let path_var = std::env::var_os("PATH").unwrap_or_default();
    let candidate = std::env::split_paths(&path_var)
        .map(|dir| dir.join(binary_name))
        .find(|candidate| candidate.is_file() || candidate.is_dir())
        .ok_or_else(|| HypervisorError::BinaryNotFound(binary_name.to_string()))?;

    let metadata = std::fs::metadata(&candidate)
        .map_err(|_| HypervisorError::BinaryMissing(candidate.clone()))?;

    if metadata.is_dir() {
        return Err(HypervisorError::BinaryIsDirectory(candidate));
    }

    if metadata.permissions().mode() & 0o111 == 0 {
        return Err(HypervisorError::BinaryNotExecutable(candidate));
    }

    Ok(candidate)
}

/// Spawn the hypervisor, binding its control socket and forwarding stderr to
/// our own, as spec.md §4.1 requires.
pub fn spawn(binary: &Path, socket_path: &Path) -> Result<Child, HypervisorError> {
    Command::new(binary)
        .arg("--api-sock")
        .arg(socket_path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(HypervisorError::Spawn)
}

/// The deterministic socket path naming scheme from spec.md §4.1: derived
/// from `{worker_pid, vmm_id}` so concurrent VMs never collide and an orphan
/// sweep can find every socket belonging to this worker process.
pub fn socket_path(pid: u32, vmm_id: &str) -> PathBuf {
    std::env::temp_dir().join(socket_file_name(pid, vmm_id))
}

pub fn socket_log_path(pid: u32, vmm_id: &str) -> PathBuf {
    let mut path = socket_path(pid, vmm_id).into_os_string();
    path.push(".log");
    PathBuf::from(path)
}

fn socket_file_name(pid: u32, vmm_id: &str) -> String {
    format!(".firecracker.sock-{pid}-{vmm_id}")
}

/// The fixed prefix an orphan sweep scans for: every socket belonging to
/// `pid`, regardless of `vmm_id`.
pub fn socket_prefix(pid: u32) -> String {
    format!(".firecracker.sock-{pid}-")
}

/// Path of the rootfs copy made for a given VM.
pub fn rootfs_copy_path(vmm_id: &str) -> PathBuf {
    PathBuf::from(format!("/tmp/rootfs-{vmm_id}.ext4"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_paths_are_keyed_by_pid_and_vmm_id() {
        let a = socket_path(100, "vm-a");
        let b = socket_path(100, "vm-b");
        let c = socket_path(200, "vm-a");
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn socket_prefix_matches_the_socket_file_name() {
        let prefix = socket_prefix(100);
        let path = socket_path(100, "vm-a");
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with(&prefix));
    }

    #[test]
    fn socket_prefix_does_not_match_other_pids() {
        let prefix = socket_prefix(100);
        let path = socket_path(200, "vm-a");
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(!name.starts_with(&prefix));
    }

    #[test]
    fn locate_binary_rejects_unknown_name() {
        let result = locate_binary("definitely-not-a-real-binary-xyz");
        assert!(matches!(result, Err(HypervisorError::BinaryNotFound(_))));
    }
}
