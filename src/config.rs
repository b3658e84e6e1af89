//! File-backed configuration shared by the registry, monitor and CLI.
//!
//! ```json
//! {
//!   "namespace": { "prefix": "PBB", "flag_suffix": "f" },
//!   "declarations": [
//!     { "unit": "sender", "topic": "data", "init": "000.00" }
//!   ],
//!   "source_dir": "src",
//!   "retry": { "write_busy_attempts": 3, "read_budget": 100 },
//!   "monitor_interval_ms": 100
//! }
//! ```
//!
//! Every field is optional. Durations are milliseconds.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{Error, Naming, Result, RetryPolicy};
use crate::registry::{Declaration, DEFAULT_EXTENSIONS};

const DEFAULT_MONITOR_INTERVAL_MS: u64 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlackboardConfig {
    pub namespace: Naming,
    pub declarations: Vec<Declaration>,
    pub source_dir: Option<PathBuf>,
    pub scan_extensions: Vec<String>,
    pub retry: RetryPolicy,
    pub monitor_interval_ms: u64,
}

impl Default for BlackboardConfig {
    fn default() -> Self {
        Self {
            namespace: Naming::default(),
            declarations: Vec::new(),
            source_dir: None,
            scan_extensions: DEFAULT_EXTENSIONS.iter().map(|ext| ext.to_string()).collect(),
            retry: RetryPolicy::default(),
            monitor_interval_ms: DEFAULT_MONITOR_INTERVAL_MS,
        }
    }
}

impl BlackboardConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|err| {
            Error::Config(format!("cannot open {}: {err}", path.display()))
        })?;
        serde_json::from_reader(BufReader::new(file))
            .map_err(|err| Error::Config(format!("{}: {err}", path.display())))
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }

    /// Explicit declarations followed by any found under `source_dir`.
    pub fn collect_declarations(&self) -> Result<Vec<Declaration>> {
        let mut declarations = self.declarations.clone();
        if let Some(dir) = &self.source_dir {
            declarations.extend(self.scan(dir)?);
        }
        Ok(declarations)
    }

    #[cfg(feature = "scan")]
    fn scan(&self, dir: &Path) -> Result<Vec<Declaration>> {
        use crate::registry::{CommentScanner, DeclarationSource};

        let scanner = CommentScanner::open(dir)?.with_extensions(self.scan_extensions.clone());
        Ok(scanner.declarations().collect())
    }

    #[cfg(not(feature = "scan"))]
    fn scan(&self, dir: &Path) -> Result<Vec<Declaration>> {
        Err(Error::Config(format!(
            "cannot scan {}: built without the scan feature",
            dir.display()
        )))
    }
}

/// Serde adapter storing a `Duration` as whole milliseconds.
pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
