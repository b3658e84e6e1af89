//! Bootstrap process that provisions every declared topic.
//!
//! The registry is the only component that creates or unlinks segments. It
//! provisions once at startup, then idles until a termination signal, and
//! finally unlinks exactly the segments it created itself. Segments found
//! already present are reused untouched and never unlinked by this instance.

pub mod declaration;
#[cfg(feature = "scan")]
pub mod scan;

use std::sync::mpsc::Receiver;

use log::{error, info, warn};

use crate::core::flag::Flag;
use crate::core::naming::Naming;
use crate::core::segment::FLAG_SEGMENT_LEN;
use crate::core::shm::ShmSegment;
use crate::core::{Error, Result};

pub use declaration::{Declaration, DeclarationSource, DEFAULT_EXTENSIONS};
#[cfg(feature = "scan")]
pub use scan::CommentScanner;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    Created { capacity: usize },
    /// The data segment already existed; `capacity` is its live size if it
    /// could be read.
    AlreadyExists { capacity: Option<usize> },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProvisionReport {
    pub created: usize,
    pub existing: usize,
    pub failed: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    pub unlinked: usize,
    pub failed: usize,
}

pub struct Registry {
    naming: Naming,
    created: Vec<ShmSegment>,
    marker: Option<ShmSegment>,
}

impl Registry {
    pub fn new(naming: Naming) -> Self {
        Self {
            naming,
            created: Vec::new(),
            marker: None,
        }
    }

    pub fn naming(&self) -> &Naming {
        &self.naming
    }

    /// Claims the namespace's liveness marker so clients can tell a missing
    /// topic from a missing registry.
    pub fn start(&mut self) -> Result<()> {
        if self.marker.is_some() {
            return Ok(());
        }
        let name = self.naming.marker();
        match ShmSegment::create_exclusive(&name, 1)? {
            Some(marker) => {
                info!("registry marker {name} created");
                self.marker = Some(marker);
            }
            None => warn!("registry marker {name} already exists; another registry may be running"),
        }
        Ok(())
    }

    /// Creates the data and flag segments for one declaration.
    pub fn provision(&mut self, declaration: &Declaration) -> Result<ProvisionOutcome> {
        let address = declaration.address();
        let capacity = declaration.capacity();
        if capacity == 0 {
            return Err(Error::EmptyInitialValue {
                address: address.to_string(),
            });
        }
        let names = self.naming.resolve(&address);

        let data = match ShmSegment::create_exclusive(&names.data, capacity)? {
            Some(data) => data,
            None => {
                let live = ShmSegment::open(&names.data)
                    .ok()
                    .flatten()
                    .map(|existing| existing.len());
                if let Some(live) = live.filter(|live| *live != capacity) {
                    warn!(
                        "{} already exists with capacity {live}, declaration wants {capacity}; keeping existing",
                        names.data
                    );
                } else {
                    warn!("{} already exists; skipping", names.data);
                }
                return Ok(ProvisionOutcome::AlreadyExists { capacity: live });
            }
        };
        if let Err(err) = data.write_at(0, declaration.init.as_bytes()) {
            drop(data);
            let _ = ShmSegment::unlink(&names.data);
            return Err(err);
        }

        let flag = match ShmSegment::create_exclusive(&names.flag, FLAG_SEGMENT_LEN) {
            Ok(Some(flag)) => flag,
            Ok(None) => {
                warn!(
                    "{} already exists without its data segment; skipping {address}",
                    names.flag
                );
                drop(data);
                let _ = ShmSegment::unlink(&names.data);
                return Ok(ProvisionOutcome::AlreadyExists { capacity: None });
            }
            Err(err) => {
                drop(data);
                let _ = ShmSegment::unlink(&names.data);
                return Err(err);
            }
        };
        Flag::new(flag.atomic_u8()).set_idle();

        info!("deployed {} ({capacity} bytes) & {}", names.data, names.flag);
        self.created.push(data);
        self.created.push(flag);
        Ok(ProvisionOutcome::Created { capacity })
    }

    /// Provisions everything a source yields; a failing declaration is logged
    /// and skipped.
    pub fn provision_all<S>(&mut self, source: &S) -> ProvisionReport
    where
        S: DeclarationSource + ?Sized,
    {
        let mut report = ProvisionReport::default();
        for declaration in source.declarations() {
            match self.provision(&declaration) {
                Ok(ProvisionOutcome::Created { .. }) => report.created += 1,
                Ok(ProvisionOutcome::AlreadyExists { .. }) => report.existing += 1,
                Err(err) => {
                    error!("failed to provision {}: {err}", declaration.address());
                    report.failed += 1;
                }
            }
        }
        info!(
            "provisioned {} topics ({} existing, {} failed)",
            report.created, report.existing, report.failed
        );
        report
    }

    /// Installs the signal handler, provisions, and idles until SIGINT/SIGTERM.
    pub fn run<S>(&mut self, source: &S) -> Result<ShutdownReport>
    where
        S: DeclarationSource + ?Sized,
    {
        let shutdown = crate::signal::termination_channel()?;
        self.run_until(source, &shutdown)
    }

    /// Like [`Registry::run`], but stops when `shutdown` receives or is
    /// disconnected.
    pub fn run_until<S>(&mut self, source: &S, shutdown: &Receiver<()>) -> Result<ShutdownReport>
    where
        S: DeclarationSource + ?Sized,
    {
        self.start()?;
        self.provision_all(source);
        info!("registry active; waiting for termination signal");
        let _ = shutdown.recv();
        Ok(self.shutdown())
    }

    /// Detaches and unlinks every segment this instance created. Best effort:
    /// a failed unlink is logged and the rest still proceed.
    pub fn shutdown(&mut self) -> ShutdownReport {
        let mut report = ShutdownReport::default();
        if self.created.is_empty() && self.marker.is_none() {
            return report;
        }
        info!("registry cleaning up");
        let segments = self.created.drain(..).chain(self.marker.take());
        for segment in segments {
            let name = segment.name().to_string();
            drop(segment);
            match ShmSegment::unlink(&name) {
                Ok(true) => {
                    info!("unlinked {name}");
                    report.unlinked += 1;
                }
                Ok(false) => {
                    warn!("{name} was already unlinked");
                    report.failed += 1;
                }
                Err(err) => {
                    error!("failed to unlink {name}: {err}");
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// Names of the segments this instance owns, in creation order.
    pub fn created(&self) -> Vec<&str> {
        self.created.iter().map(|segment| segment.name()).collect()
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        self.shutdown();
    }
}
