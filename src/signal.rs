use std::sync::mpsc::{self, Receiver};

use log::info;

use crate::core::Result;

/// Installs the process-wide SIGINT/SIGTERM handler and returns a channel that
/// receives one message per signal.
///
/// On Unix the handler also catches SIGHUP, so closing the controlling
/// terminal shuts a registry down cleanly instead of orphaning its segments.
///
/// Can only be called once per process.
pub fn termination_channel() -> Result<Receiver<()>> {
    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        info!("termination signal received");
        let _ = tx.send(());
    })?;
    Ok(rx)
}
