//! Dynamic guest network allocation.
//!
//! Real CNI is a chained-plugin protocol with its own JSON config schema,
//! delegating dispatch and IPAM out to separate binaries. Reproducing that
//! in full is orthogonal to this worker's job: spec.md only needs *a* dynamic
//! IP handed to a *single* named network before each VM starts, and released
//! after. This invokes one plugin binary directly with the CNI ADD/DEL
//! environment-variable contract (`CNI_COMMAND`, `CNI_CONTAINERID`,
//! `CNI_NETNS`, `CNI_IFNAME`, `CNI_PATH`) and parses the `IP4.IP` result,
//! rather than resolving a chain from `/etc/cni/net.d`. Noted as a scoping
//! simplification in DESIGN.md.

use std::net::Ipv4Addr;
use std::process::Stdio;

use serde::Deserialize;
use tokio::process::Command;

use crate::error::HypervisorError;

const CNI_PATH: &str = "/opt/cni/bin";
const CNI_BIN_DIR: &str = "/opt/cni/bin";

#[derive(Debug, Deserialize)]
struct CniResult {
    #[serde(rename = "ip4")]
    ip4: Option<Ip4Block>,
}

#[derive(Debug, Deserialize)]
struct Ip4Block {
    ip: String,
}

/// Run `CNI_COMMAND=ADD` for `network` against container id `vmm_id`,
/// returning the assigned guest IPv4 address.
pub async fn allocate(network: &str, ifname: &str, vmm_id: &str) -> Result<Ipv4Addr, HypervisorError> {
    let output = run(network, ifname, vmm_id, "ADD").await?;

    let parsed: CniResult = serde_json::from_slice(&output)
        .map_err(|e| HypervisorError::ControlApi("cni".to_string(), format!("malformed ADD result: {e}")))?;

    let cidr = parsed
        .ip4
        .ok_or_else(|| HypervisorError::ControlApi("cni".to_string(), "ADD result carried no ip4 block".to_string()))?
        .ip;

    let addr = cidr
        .split('/')
        .next()
        .unwrap_or(&cidr)
        .parse::<Ipv4Addr>()
        .map_err(|e| HypervisorError::ControlApi("cni".to_string(), format!("unparseable address {cidr:?}: {e}")))?;

    Ok(addr)
}

/// Run `CNI_COMMAND=DEL`, releasing the address assigned to `vmm_id`. Errors
/// are logged by the caller and never propagate — spec.md §4.1 treats
/// teardown cleanup as best-effort.
pub async fn release(network: &str, ifname: &str, vmm_id: &str) -> Result<(), HypervisorError> {
    run(network, ifname, vmm_id, "DEL").await?;
    Ok(())
}

async fn run(network: &str, ifname: &str, vmm_id: &str, command: &str) -> Result<Vec<u8>, HypervisorError> {
    let plugin = format!("{CNI_BIN_DIR}/{network}");

    let output = Command::new(&plugin)
        .env("CNI_COMMAND", command)
        .env("CNI_CONTAINERID", vmm_id)
        .env("CNI_NETNS", format!("/var/run/netns/{vmm_id}"))
        .env("CNI_IFNAME", ifname)
        .env("CNI_PATH", CNI_PATH)
        .stdin(Stdio::null())
        .stderr(Stdio::inherit())
        .output()
        .await
        .map_err(|e| HypervisorError::ControlApi(plugin.clone(), format!("CNI {command} failed to run: {e}")))?;

    if !output.status.success() {
        return Err(HypervisorError::ControlApi(
            plugin,
            format!("CNI {command} exited with {}", output.status),
        ));
    }

    Ok(output.stdout)
}
