//! The boot probe: poll the guest agent's `/health` endpoint until it
//! answers or a deadline elapses.
//!
//! Grounded on `original_source/worker/main.go`'s `waitForVMToBoot`, which
//! loops a short-timeout HTTP GET with a fixed sleep between attempts until
//! an overall deadline. The constants live in `config.rs` so tests can
//! shrink them.

use std::net::Ipv4Addr;
use std::time::Duration;

use crate::config::{PROBE_ATTEMPT_INTERVAL, PROBE_DEADLINE, PROBE_PER_ATTEMPT_TIMEOUT};
use crate::error::ProbeError;

pub async fn wait_ready(guest_ip: Ipv4Addr, agent_port: u16) -> Result<(), ProbeError> {
    wait_ready_with(guest_ip, agent_port, PROBE_PER_ATTEMPT_TIMEOUT, PROBE_ATTEMPT_INTERVAL, PROBE_DEADLINE).await
}

async fn wait_ready_with(
    guest_ip: Ipv4Addr,
    agent_port: u16,
    per_attempt_timeout: Duration,
    attempt_interval: Duration,
    deadline: Duration,
) -> Result<(), ProbeError> {
    let client = reqwest::Client::builder()
        .timeout(per_attempt_timeout)
        .build()
        .expect("reqwest client always builds with a timeout");

    let url = format!("http://{guest_ip}:{agent_port}/health");
    let started = tokio::time::Instant::now();

    loop {
        match client.get(&url).send().await {
            Ok(response) if response.status().is_success() => return Ok(()),
            _ => {}
        }

        if started.elapsed() >= deadline {
            return Err(ProbeError::Timeout(deadline));
        }

        tokio::time::sleep(attempt_interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn times_out_when_nothing_listens() {
        let result = wait_ready_with(
            Ipv4Addr::new(127, 0, 0, 1),
            1, // nothing listens on port 1
            Duration::from_millis(20),
            Duration::from_millis(20),
            Duration::from_millis(80),
        )
        .await;

        assert!(matches!(result, Err(ProbeError::Timeout(_))));
    }
}
