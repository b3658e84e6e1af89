//! Polled blackboard over POSIX shared memory.
//!
//! Units publish small fixed-capacity values under `(unit, topic)` addresses
//! and other units poll the latest value, with no broker on the data path.
//!
//! ```text
//! ┌──────────┐  provisions   ┌──────────────────────────────┐
//! │ Registry │ ────────────▶ │ /PBB_<unit>_<topic>   (data) │
//! └──────────┘               │ /PBB_<unit>_<topic>_f (flag) │
//!                            └──────────────────────────────┘
//!                               ▲ attach            ▲ attach
//!                         ┌─────┴────┐        ┌─────┴─────┐
//!                         │  Client  │        │  Monitor  │
//!                         └──────────┘        └───────────┘
//! ```
//!
//! A writer moves the flag IDLE → BUSY → READY around each payload copy; a
//! reader trusts the payload only while the flag reads READY. The protocol
//! assumes one writer per topic.
//!
//! ```no_run
//! use pbb::core::{Address, Client, Naming, ReadOptions};
//!
//! let mut client = Client::new(Naming::default());
//! let addr = Address::new("sender", "data");
//! client.write(&addr, "001.50")?;
//! assert_eq!(client.read(&addr, ReadOptions::default())?.as_deref(), Some("001.50"));
//! # Ok::<(), pbb::core::Error>(())
//! ```

pub mod config;
pub mod core;
pub mod monitor;
pub mod registry;
pub mod signal;

pub use crate::config::BlackboardConfig;
pub use crate::core::{Address, Client, Error, FlagState, Naming, ReadOptions, Result, Status};
pub use crate::monitor::Monitor;
pub use crate::registry::{Declaration, DeclarationSource, Registry};
