use std::collections::HashMap;
use std::sync::Arc;

use log::debug;

use crate::core::flag::{BusyGuard, Flag, FlagState};
use crate::core::naming::{Address, Naming};
use crate::core::shm::ShmSegment;
use crate::core::{Error, Result};

/// Byte used to pad unused capacity; trailing runs of it are not payload.
pub const EMPTY_SENTINEL: u8 = 0x00;
pub const FLAG_SEGMENT_LEN: usize = 1;

/// The data and flag segments of one address, attached in this process.
#[derive(Debug, Clone)]
pub struct SegmentPair {
    data: Arc<ShmSegment>,
    flag: Arc<ShmSegment>,
}

impl SegmentPair {
    pub fn new(data: Arc<ShmSegment>, flag: Arc<ShmSegment>) -> Self {
        Self { data, flag }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn flag(&self) -> Flag<'_> {
        Flag::new(self.flag.atomic_u8())
    }

    pub fn state(&self) -> FlagState {
        self.flag().load()
    }

    /// Runs the BUSY → copy → pad → READY sequence.
    ///
    /// The caller has already checked capacity; a failure after BUSY leaves
    /// the flag at IDLE.
    pub fn publish(&self, payload: &[u8]) -> Result<()> {
        let guard = BusyGuard::enter(self.flag());
        self.data.write_at(0, payload)?;
        self.data.fill_from(payload.len(), EMPTY_SENTINEL)?;
        guard.commit();
        Ok(())
    }

    /// Copies the payload if the flag reads READY before and after the copy.
    pub fn load_ready(&self) -> Option<Vec<u8>> {
        let flag = self.flag();
        if flag.load() != FlagState::Ready {
            return None;
        }
        let mut bytes = self.data.snapshot();
        if !flag.still_ready() {
            return None;
        }
        let len = trim_sentinel(&bytes).len();
        bytes.truncate(len);
        Some(bytes)
    }

    /// Flag and trimmed content as they are right now, without waiting.
    pub fn observe(&self) -> (FlagState, Vec<u8>) {
        let state = self.state();
        let mut bytes = self.data.snapshot();
        let len = trim_sentinel(&bytes).len();
        bytes.truncate(len);
        (state, bytes)
    }
}

pub fn trim_sentinel(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|b| *b != EMPTY_SENTINEL)
        .map_or(0, |pos| pos + 1);
    &bytes[..end]
}

/// Decodes a payload, substituting U+FFFD for invalid UTF-8.
pub fn decode_payload(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Error for a segment that could not be found, classified by whether the
/// namespace's registry marker exists.
pub fn missing_segment(naming: &Naming, name: &str) -> Error {
    match ShmSegment::exists(&naming.marker()) {
        Ok(true) => Error::NotFound {
            name: name.to_string(),
        },
        _ => Error::ConnectionFailed {
            name: name.to_string(),
        },
    }
}

/// Per-process attachments keyed by segment name.
#[derive(Debug)]
pub struct AttachCache {
    naming: Naming,
    entries: HashMap<String, Arc<ShmSegment>>,
}

impl AttachCache {
    pub fn new(naming: Naming) -> Self {
        Self {
            naming,
            entries: HashMap::new(),
        }
    }

    pub fn naming(&self) -> &Naming {
        &self.naming
    }

    pub fn attach(&mut self, name: &str) -> Result<Arc<ShmSegment>> {
        if let Some(segment) = self.entries.get(name) {
            return Ok(Arc::clone(segment));
        }
        let segment = match ShmSegment::open(name)? {
            Some(segment) => Arc::new(segment),
            None => return Err(missing_segment(&self.naming, name)),
        };
        debug!("attached {} ({} bytes)", name, segment.len());
        self.entries.insert(name.to_string(), Arc::clone(&segment));
        Ok(segment)
    }

    pub fn attach_pair(&mut self, address: &Address) -> Result<SegmentPair> {
        let names = self.naming.resolve(address);
        let data = self.attach(&names.data)?;
        let flag = self.attach(&names.flag)?;
        Ok(SegmentPair::new(data, flag))
    }

    pub fn attach_flag(&mut self, address: &Address) -> Result<Flag<'_>> {
        let names = self.naming.resolve(address);
        self.attach(&names.flag)?;
        let segment = &self.entries[&names.flag];
        Ok(Flag::new(segment.atomic_u8()))
    }

    /// Drops every cached handle. Never unlinks.
    pub fn release_all(&mut self) {
        if !self.entries.is_empty() {
            debug!("releasing {} attachments", self.entries.len());
        }
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
