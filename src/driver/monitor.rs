//! Cancellable wait for a VM to reach a given power status.
//!
//! The poll runs as its own task and reports through a one-slot channel;
//! the caller races that against the deadline and aborts the poll when the
//! deadline wins.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::vcd::Session;

/// Wait until the VM at `vm_href` reports `target` (e.g. `POWERED_OFF`).
///
/// The status is read every `interval`, first after one interval. Fails with
/// [`Error::DeployTimeout`] when `deadline` elapses first, and with the read
/// error if reading the VM fails.
pub async fn wait_for_vm_status(
    session: Arc<dyn Session>,
    vm_href: String,
    target: &'static str,
    interval: Duration,
    deadline: Duration,
) -> Result<()> {
    let (tx, rx) = oneshot::channel();

    let monitor = tokio::spawn(async move {
        let outcome = poll_status(session.as_ref(), &vm_href, target, interval).await;
        let _ = tx.send(outcome);
    });

    tokio::select! {
        outcome = rx => match outcome {
            Ok(result) => result,
            Err(_) => Err(Error::TaskFailed {
                operation: "vm status monitor".into(),
                message: "monitor exited without reporting".into(),
            }),
        },
        _ = tokio::time::sleep(deadline) => {
            monitor.abort();
            warn!(target_status = target, waited_secs = deadline.as_secs(), "VM status deadline reached");
            Err(Error::DeployTimeout { waited: deadline })
        }
    }
}

async fn poll_status(
    session: &dyn Session,
    vm_href: &str,
    target: &str,
    interval: Duration,
) -> Result<()> {
    loop {
        tokio::time::sleep(interval).await;
        let vm = session.get_vm(vm_href).await?;
        let status = vm.status_label();
        if status == target {
            return Ok(());
        }
        debug!(vm = %vm.name, status, target_status = target, "waiting for VM status");
    }
}
