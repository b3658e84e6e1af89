use std::fmt;
use std::sync::atomic::{fence, AtomicU8, Ordering};

pub const FLAG_IDLE: u8 = 0;
pub const FLAG_BUSY: u8 = 1;
pub const FLAG_READY: u8 = 2;

/// Decoded value of a topic's coordination byte.
///
/// `Unknown` carries any byte outside the protocol; it is a violation, never
/// a fourth state a writer may produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlagState {
    Idle,
    Busy,
    Ready,
    Unknown(u8),
}

impl FlagState {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            FLAG_IDLE => FlagState::Idle,
            FLAG_BUSY => FlagState::Busy,
            FLAG_READY => FlagState::Ready,
            other => FlagState::Unknown(other),
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            FlagState::Idle => FLAG_IDLE,
            FlagState::Busy => FLAG_BUSY,
            FlagState::Ready => FLAG_READY,
            FlagState::Unknown(byte) => byte,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FlagState::Idle => "IDLE",
            FlagState::Busy => "BUSY",
            FlagState::Ready => "READY",
            FlagState::Unknown(_) => "UNKNOWN",
        }
    }
}

impl fmt::Display for FlagState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Atomic view over the one-byte flag segment.
#[derive(Clone, Copy)]
pub struct Flag<'a> {
    cell: &'a AtomicU8,
}

impl<'a> Flag<'a> {
    pub fn new(cell: &'a AtomicU8) -> Self {
        Self { cell }
    }

    /// Acquire load: a READY observed here makes the payload copy visible.
    pub fn load(&self) -> FlagState {
        FlagState::from_byte(self.cell.load(Ordering::Acquire))
    }

    /// Announces an unstable payload. The fence keeps the following payload
    /// stores from being reordered ahead of the BUSY store.
    pub fn set_busy(&self) {
        self.cell.store(FLAG_BUSY, Ordering::Relaxed);
        fence(Ordering::SeqCst);
    }

    /// Release store: publishes every payload byte written before it.
    pub fn set_ready(&self) {
        self.cell.store(FLAG_READY, Ordering::Release);
    }

    pub fn set_idle(&self) {
        self.cell.store(FLAG_IDLE, Ordering::Release);
    }

    /// Re-reads the flag after a payload copy; pairs with `set_busy`.
    pub fn still_ready(&self) -> bool {
        fence(Ordering::SeqCst);
        self.cell.load(Ordering::Relaxed) == FLAG_READY
    }
}

/// Holds a topic in BUSY for the duration of a write.
///
/// Dropping the guard without [`BusyGuard::commit`] resets the flag to IDLE,
/// so an aborted write is never exposed as READY.
pub struct BusyGuard<'a> {
    flag: Flag<'a>,
    committed: bool,
}

impl<'a> BusyGuard<'a> {
    pub fn enter(flag: Flag<'a>) -> Self {
        flag.set_busy();
        Self {
            flag,
            committed: false,
        }
    }

    pub fn commit(mut self) {
        self.flag.set_ready();
        self.committed = true;
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.flag.set_idle();
        }
    }
}
