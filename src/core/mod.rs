//! Shared-memory addressing, segment handles and the flag protocol.
//!
//! Everything a unit needs to read or write a topic lives here; the registry
//! and monitor are layered on top.

pub mod client;
pub mod error;
pub mod flag;
pub mod naming;
pub mod segment;
pub mod shm;

pub use client::{Client, ReadOptions, RetryPolicy};
pub use error::{Error, Result, Status};
pub use flag::FlagState;
pub use naming::{Address, Naming, SegmentNames};
pub use segment::{AttachCache, SegmentPair};
