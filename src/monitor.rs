//! Passive observer that polls every declared topic and logs state changes.
//!
//! The monitor attaches afresh on every poll and detaches immediately, so it
//! notices topics appearing, disappearing, or being re-provisioned. It never
//! creates, writes, or unlinks anything.

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

use crate::core::flag::FlagState;
use crate::core::naming::{Address, Naming, SegmentNames};
use crate::core::segment::{decode_payload, SegmentPair};
use crate::core::shm::ShmSegment;
use crate::core::Result;
use crate::registry::DeclarationSource;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
const OFFLINE_DATA: &str = "(Waiting...)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicRef {
    pub address: Address,
    pub names: SegmentNames,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    Offline,
    Online { state: FlagState, payload: String },
}

impl Observation {
    pub fn status(&self) -> &'static str {
        match self {
            Observation::Offline => "OFFLINE",
            Observation::Online { state, .. } => state.label(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub timestamp: OffsetDateTime,
    pub address: Address,
    pub observation: Observation,
}

pub struct Monitor {
    naming: Naming,
    topics: Vec<TopicRef>,
    last: HashMap<Address, Observation>,
    offset: UtcOffset,
}

impl Monitor {
    /// Captures the local UTC offset for row timestamps. The offset can only
    /// be determined while the process is single-threaded, so construct the
    /// monitor before spawning threads; otherwise rows are stamped in UTC.
    pub fn new(naming: Naming) -> Self {
        let offset = UtcOffset::current_local_offset().unwrap_or_else(|err| {
            debug!("local offset unavailable ({err}), using UTC");
            UtcOffset::UTC
        });
        Self::with_offset(naming, offset)
    }

    pub fn with_offset(naming: Naming, offset: UtcOffset) -> Self {
        Self {
            naming,
            topics: Vec::new(),
            last: HashMap::new(),
            offset,
        }
    }

    pub fn offset(&self) -> UtcOffset {
        self.offset
    }

    /// Records every declared address for polling. Never provisions.
    pub fn discover<S>(&mut self, source: &S) -> usize
    where
        S: DeclarationSource + ?Sized,
    {
        let mut seen: HashSet<Address> =
            self.topics.iter().map(|topic| topic.address.clone()).collect();
        for declaration in source.declarations() {
            let address = declaration.address();
            if !seen.insert(address.clone()) {
                continue;
            }
            info!("found topic {address}");
            let names = self.naming.resolve(&address);
            self.topics.push(TopicRef { address, names });
        }
        self.topics.len()
    }

    pub fn topics(&self) -> &[TopicRef] {
        &self.topics
    }

    /// Current state of one topic; any attach failure reads as offline.
    pub fn observe(&self, topic: &TopicRef) -> Observation {
        match attach(&topic.names) {
            Ok(Some(pair)) => {
                let (state, bytes) = pair.observe();
                Observation::Online {
                    state,
                    payload: decode_payload(&bytes),
                }
            }
            Ok(None) => Observation::Offline,
            Err(err) => {
                debug!("attach {} failed: {err}", topic.address);
                Observation::Offline
            }
        }
    }

    /// One polling cycle. Returns only the topics whose observation changed.
    pub fn poll_once(&mut self) -> Vec<ChangeEvent> {
        let mut events = Vec::new();
        for topic in &self.topics {
            let observation = self.observe(topic);
            if self.last.get(&topic.address) == Some(&observation) {
                continue;
            }
            self.last.insert(topic.address.clone(), observation.clone());
            events.push(ChangeEvent {
                timestamp: OffsetDateTime::now_utc().to_offset(self.offset),
                address: topic.address.clone(),
                observation,
            });
        }
        events
    }

    /// Polls every `interval` and writes a row per change until `stop`
    /// receives or is disconnected.
    pub fn run_until(
        &mut self,
        interval: Duration,
        out: &mut dyn Write,
        stop: &Receiver<()>,
    ) -> Result<()> {
        if self.topics.is_empty() {
            writeln!(out, "No {} declarations found.", self.naming.prefix)?;
            return Ok(());
        }
        write_header(out)?;
        loop {
            for event in self.poll_once() {
                writeln!(out, "{}", format_row(&event))?;
            }
            out.flush()?;
            match stop.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => continue,
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        Ok(())
    }
}

fn attach(names: &SegmentNames) -> Result<Option<SegmentPair>> {
    let flag = match ShmSegment::open(&names.flag)? {
        Some(flag) => flag,
        None => return Ok(None),
    };
    let data = match ShmSegment::open(&names.data)? {
        Some(data) => data,
        None => return Ok(None),
    };
    Ok(Some(SegmentPair::new(Arc::new(data), Arc::new(flag))))
}

pub fn write_header(out: &mut dyn Write) -> std::io::Result<()> {
    let rule = "-".repeat(80);
    writeln!(out, "{rule}")?;
    writeln!(
        out,
        "{:<20} | {:<12} | {:<12} | {:<7} | DATA",
        "TIMESTAMP", "UNIT", "TOPIC", "STATUS"
    )?;
    writeln!(out, "{rule}")
}

pub fn format_row(event: &ChangeEvent) -> String {
    let ts = event
        .timestamp
        .format(format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second]"
        ))
        .unwrap_or_else(|_| event.timestamp.unix_timestamp().to_string());
    let data = match &event.observation {
        Observation::Offline => OFFLINE_DATA,
        Observation::Online { payload, .. } => payload.as_str(),
    };
    format!(
        "{:<20} | {:<12} | {:<12} | {:<7} | {}",
        ts,
        event.address.unit,
        event.address.topic,
        event.observation.status(),
        data
    )
}
