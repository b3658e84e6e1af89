use serde::{Deserialize, Serialize};

use crate::core::Address;

/// Source file extensions searched for declarations when none are configured.
pub const DEFAULT_EXTENSIONS: &[&str] = &["py", "rs"];

/// A topic to provision: the initial value's byte length fixes its capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declaration {
    pub unit: String,
    pub topic: String,
    pub init: String,
}

impl Declaration {
    pub fn new(unit: impl Into<String>, topic: impl Into<String>, init: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            topic: topic.into(),
            init: init.into(),
        }
    }

    pub fn address(&self) -> Address {
        Address::new(self.unit.clone(), self.topic.clone())
    }

    pub fn capacity(&self) -> usize {
        self.init.len()
    }
}

/// Anything that yields declarations: a static list, or a scanner over
/// source files.
pub trait DeclarationSource {
    fn declarations(&self) -> Box<dyn Iterator<Item = Declaration> + '_>;
}

impl DeclarationSource for [Declaration] {
    fn declarations(&self) -> Box<dyn Iterator<Item = Declaration> + '_> {
        Box::new(self.iter().cloned())
    }
}

impl DeclarationSource for Vec<Declaration> {
    fn declarations(&self) -> Box<dyn Iterator<Item = Declaration> + '_> {
        self.as_slice().declarations()
    }
}
