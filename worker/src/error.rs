//! Typed error leaves that callers branch on. Everything else flows through
//! `eyre::Result` the way the rest of the crate does.

use std::path::PathBuf;

/// Failures from locating, spawning, or tearing down the hypervisor process.
#[derive(Debug, thiserror::Error)]
pub enum HypervisorError {
    #[error("hypervisor binary {0:?} not found on PATH")]
    BinaryNotFound(String),

    #[error("hypervisor binary {0:?} does not exist")]
    BinaryMissing(PathBuf),

    #[error("hypervisor binary {0:?} is a directory, not a file")]
    BinaryIsDirectory(PathBuf),

    #[error("hypervisor binary {0:?} is not executable")]
    BinaryNotExecutable(PathBuf),

    #[error("failed to spawn hypervisor process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("failed to copy rootfs template to {0:?}: {1}")]
    RootfsCopy(PathBuf, #[source] std::io::Error),

    #[error("hypervisor control API request to {0} failed: {1}")]
    ControlApi(String, String),
}

/// Failures from the boot probe.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("boot probe deadline of {0:?} elapsed before the guest agent answered")]
    Timeout(std::time::Duration),
}

/// Failures from broker setup; fatal at startup per spec.md §7.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("failed to connect to broker: {0}")]
    Connect(#[source] lapin::Error),

    #[error("failed to open channel: {0}")]
    Channel(#[source] lapin::Error),

    #[error("failed to declare exchange {0:?}: {1}")]
    DeclareExchange(String, #[source] lapin::Error),

    #[error("failed to declare queue {0:?}: {1}")]
    DeclareQueue(String, #[source] lapin::Error),

    #[error("failed to bind queue {0:?} to exchange {1:?}: {2}")]
    Bind(String, String, #[source] lapin::Error),

    #[error("failed to register consumer: {0}")]
    Consume(#[source] lapin::Error),

    #[error("failed to publish: {0}")]
    Publish(#[source] lapin::Error),
}
