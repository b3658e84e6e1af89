use std::fmt;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::core::flag::FlagState;
use crate::core::naming::{Address, Naming};
use crate::core::segment::{decode_payload, AttachCache, SegmentPair};
use crate::core::{Error, Result};

/// Bounds for every cross-process wait a client performs.
///
/// Segments carry no wake primitive, so both waits are polls. A write polls
/// while the flag reads BUSY; a read polls until it reads READY, stopping at
/// whichever of `read_attempts` or `read_budget` runs out first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub write_busy_attempts: u32,
    #[serde(with = "crate::config::duration_ms")]
    pub write_busy_delay: Duration,
    pub read_attempts: u32,
    #[serde(with = "crate::config::duration_ms")]
    pub read_poll_interval: Duration,
    #[serde(with = "crate::config::duration_ms")]
    pub read_budget: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            write_busy_attempts: 3,
            write_busy_delay: Duration::from_millis(1),
            read_attempts: 10,
            read_poll_interval: Duration::from_millis(10),
            read_budget: Duration::from_millis(100),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReadOptions {
    pub wait_for_ready: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            wait_for_ready: true,
        }
    }
}

impl ReadOptions {
    pub fn no_wait() -> Self {
        Self {
            wait_for_ready: false,
        }
    }
}

/// Reads and writes topics through segments provisioned by a registry.
///
/// A client never creates or unlinks segments; it only attaches, and keeps
/// each attachment cached until [`Client::close`] or drop.
#[derive(Debug)]
pub struct Client {
    cache: AttachCache,
    retry: RetryPolicy,
    unit: Option<String>,
}

impl Client {
    pub fn new(naming: Naming) -> Self {
        Self {
            cache: AttachCache::new(naming),
            retry: RetryPolicy::default(),
            unit: None,
        }
    }

    /// Client that publishes under `unit` via [`Client::publish`].
    pub fn for_unit(naming: Naming, unit: impl Into<String>) -> Self {
        Self {
            unit: Some(unit.into()),
            ..Self::new(naming)
        }
    }

    /// Client whose unit is the running program's file stem.
    pub fn from_current_exe(naming: Naming) -> Result<Self> {
        let program = std::env::args_os()
            .next()
            .ok_or_else(|| Error::Config("program name unavailable".to_string()))?;
        let unit = Path::new(&program)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .filter(|stem| !stem.is_empty())
            .ok_or_else(|| Error::Config("program name is not valid UTF-8".to_string()))?;
        Ok(Self::for_unit(naming, unit))
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn naming(&self) -> &Naming {
        self.cache.naming()
    }

    /// Writes the textual form of `value` to `address`.
    pub fn write(&mut self, address: &Address, value: impl fmt::Display) -> Result<()> {
        let encoded = value.to_string();
        self.write_bytes(address, encoded.as_bytes())
    }

    pub fn write_bytes(&mut self, address: &Address, payload: &[u8]) -> Result<()> {
        let pair = self.cache.attach_pair(address)?;
        if payload.len() > pair.capacity() {
            return Err(Error::SizeExceeded {
                len: payload.len(),
                capacity: pair.capacity(),
            });
        }
        self.wait_not_busy(address, &pair)?;
        pair.publish(payload)
    }

    /// Writes to `(own unit, topic)`.
    pub fn publish(&mut self, topic: &str, value: impl fmt::Display) -> Result<()> {
        let unit = self
            .unit
            .clone()
            .ok_or_else(|| Error::Config("client has no unit to publish under".to_string()))?;
        self.write(&Address::new(unit, topic), value)
    }

    /// Returns the payload if the topic is READY, `None` if it never became
    /// READY within the retry policy.
    pub fn read(&mut self, address: &Address, options: ReadOptions) -> Result<Option<String>> {
        let pair = self.cache.attach_pair(address)?;
        if !options.wait_for_ready {
            return Ok(pair.load_ready().map(|bytes| decode_payload(&bytes)));
        }

        let deadline = Instant::now() + self.retry.read_budget;
        let attempts = self.retry.read_attempts.max(1);
        for attempt in 1..=attempts {
            if let Some(bytes) = pair.load_ready() {
                return Ok(Some(decode_payload(&bytes)));
            }
            if attempt == attempts || Instant::now() >= deadline {
                break;
            }
            thread::sleep(self.retry.read_poll_interval);
        }
        debug!("{address} not ready after polling");
        Ok(None)
    }

    /// Literal flag state; touches only the flag segment and never waits.
    pub fn check_state(&mut self, address: &Address) -> Result<FlagState> {
        Ok(self.cache.attach_flag(address)?.load())
    }

    pub fn close(&mut self) {
        self.cache.release_all();
    }

    pub fn attachments(&self) -> usize {
        self.cache.len()
    }

    fn wait_not_busy(&self, address: &Address, pair: &SegmentPair) -> Result<()> {
        let attempts = self.retry.write_busy_attempts.max(1);
        for attempt in 1..=attempts {
            if pair.state() != FlagState::Busy {
                return Ok(());
            }
            debug!("{address} busy, attempt {attempt}/{attempts}");
            thread::sleep(self.retry.write_busy_delay);
        }
        Err(Error::Busy { attempts })
    }
}
