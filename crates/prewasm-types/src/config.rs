//! Module-level configuration declared with `config` blocks.
//!
//! Values are nested tables of integers addressed by dotted key paths,
//! e.g. `memory.fixed = 65536`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Fixed memory size used when a module does not configure one.
pub const DEFAULT_FIXED_MEMORY: i64 = 65536;

/// A config entry: an integer leaf or a nested table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Int(i64),
    Table(BTreeMap<String, ConfigValue>),
}

/// A key path could not be stored because a prefix names an integer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("config path `{path}` conflicts with an existing value at `{at}`")]
pub struct ConfigPathError {
    pub path: String,
    pub at: String,
}

/// Nested module configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Config {
    root: BTreeMap<String, ConfigValue>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Config holding only the defaults.
    pub fn defaults() -> Self {
        let mut config = Self::new();
        config.apply_defaults();
        config
    }

    /// Store `value` at `path`, creating intermediate tables as needed.
    pub fn set<S: AsRef<str>>(&mut self, path: &[S], value: i64) -> Result<(), ConfigPathError> {
        let joined = || {
            path.iter()
                .map(|s| s.as_ref())
                .collect::<Vec<_>>()
                .join(".")
        };
        let Some((last, prefix)) = path.split_last() else {
            return Err(ConfigPathError {
                path: String::new(),
                at: String::new(),
            });
        };
        let mut table = &mut self.root;
        for (depth, key) in prefix.iter().enumerate() {
            let entry = table
                .entry(key.as_ref().to_string())
                .or_insert_with(|| ConfigValue::Table(BTreeMap::new()));
            table = match entry {
                ConfigValue::Table(inner) => inner,
                ConfigValue::Int(_) => {
                    return Err(ConfigPathError {
                        path: joined(),
                        at: path[..=depth]
                            .iter()
                            .map(|s| s.as_ref())
                            .collect::<Vec<_>>()
                            .join("."),
                    })
                }
            };
        }
        if let Some(ConfigValue::Table(_)) = table.get(last.as_ref()) {
            return Err(ConfigPathError {
                path: joined(),
                at: joined(),
            });
        }
        table.insert(last.as_ref().to_string(), ConfigValue::Int(value));
        Ok(())
    }

    pub fn get(&self, path: &[&str]) -> Option<&ConfigValue> {
        let (first, rest) = path.split_first()?;
        let mut value = self.root.get(*first)?;
        for key in rest {
            match value {
                ConfigValue::Table(table) => value = table.get(*key)?,
                ConfigValue::Int(_) => return None,
            }
        }
        Some(value)
    }

    pub fn get_int(&self, path: &[&str]) -> Option<i64> {
        match self.get(path)? {
            ConfigValue::Int(v) => Some(*v),
            ConfigValue::Table(_) => None,
        }
    }

    /// Fill in every default key that has not been set.
    pub fn apply_defaults(&mut self) {
        for (path, value) in [
            (["memory", "fixed"], DEFAULT_FIXED_MEMORY),
            (["memory", "shared"], 0),
        ] {
            if self.get(&path).is_none() {
                // A conflicting user value wins over the default.
                let _ = self.set(&path, value);
            }
        }
    }

    /// `memory.fixed`, falling back to the default.
    pub fn fixed_memory_size(&self) -> i64 {
        self.get_int(&["memory", "fixed"])
            .unwrap_or(DEFAULT_FIXED_MEMORY)
    }

    /// `memory.shared` as a flag.
    pub fn shared_memory(&self) -> bool {
        self.get_int(&["memory", "shared"]).unwrap_or(0) != 0
    }

    pub fn set_shared_memory(&mut self, shared: bool) {
        let _ = self.set(&["memory", "shared"], i64::from(shared));
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }
}
