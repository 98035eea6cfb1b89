//! Process-wide tunables: maximum call depth and the debug flag,
//! behind a lock so the CLI can set them once at startup and the VM /
//! REPL can read them without threading a `Config` value everywhere.
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;

use crate::vm::DEFAULT_MAX_CALL_DEPTH;

pub static CONFIG: Lazy<Arc<RwLock<Config>>> =
    Lazy::new(|| Arc::new(RwLock::new(Config::default())));

pub struct Config {
    entries: HashMap<&'static str, ValKind>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ValKind {
    Bool(bool),
    Usize(usize),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConfigErr {
    pub kind: ConfigErrKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ConfigErrKind {
    NameNotKnown(String),
    ValueIsNotValid(String, &'static str),
}

impl ConfigErr {
    fn not_known(name: &str) -> Self {
        Self { kind: ConfigErrKind::NameNotKnown(name.to_owned()) }
    }

    fn not_valid(name: &str, expected: &'static str) -> Self {
        Self { kind: ConfigErrKind::ValueIsNotValid(name.to_owned(), expected) }
    }
}

impl fmt::Display for ConfigErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ConfigErrKind::NameNotKnown(name) => write!(f, "unknown config entry: {name}"),
            ConfigErrKind::ValueIsNotValid(name, expected) => {
                write!(f, "config entry {name} {expected}")
            }
        }
    }
}

type NameResult = Result<(), ConfigErr>;

impl Default for Config {
    fn default() -> Self {
        use ValKind::*;
        let mut entries = HashMap::new();
        entries.insert("max_call_depth", Usize(DEFAULT_MAX_CALL_DEPTH));
        entries.insert("debug", Bool(false));
        entries.insert("dis", Bool(false));
        Self { entries }
    }
}

impl Config {
    fn check_name(&self, name: &str) -> NameResult {
        if self.entries.contains_key(name) {
            Ok(())
        } else {
            Err(ConfigErr::not_known(name))
        }
    }

    fn get(&self, name: &str) -> Result<&ValKind, ConfigErr> {
        self.check_name(name)?;
        Ok(self.entries.get(name).expect("checked above"))
    }

    pub fn get_bool(&self, name: &str) -> Result<bool, ConfigErr> {
        match self.get(name)? {
            ValKind::Bool(val) => Ok(*val),
            _ => Err(ConfigErr::not_valid(name, "expected bool")),
        }
    }

    pub fn get_usize(&self, name: &str) -> Result<usize, ConfigErr> {
        match self.get(name)? {
            ValKind::Usize(val) => Ok(*val),
            _ => Err(ConfigErr::not_valid(name, "expected usize")),
        }
    }

    fn set(&mut self, name: &'static str, val: ValKind) -> NameResult {
        self.check_name(name)?;
        self.entries.insert(name, val);
        Ok(())
    }

    pub fn set_bool(&mut self, name: &'static str, val: bool) -> NameResult {
        self.set(name, ValKind::Bool(val))
    }

    pub fn set_usize(&mut self, name: &'static str, val: usize) -> NameResult {
        self.set(name, ValKind::Usize(val))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.get_usize("max_call_depth").unwrap(), DEFAULT_MAX_CALL_DEPTH);
        assert!(!config.get_bool("debug").unwrap());
    }

    #[test]
    fn set_then_get() {
        let mut config = Config::default();
        config.set_usize("max_call_depth", 16).unwrap();
        assert_eq!(config.get_usize("max_call_depth").unwrap(), 16);
    }

    #[test]
    fn unknown_name_is_an_error() {
        let config = Config::default();
        assert!(config.get_bool("nope").is_err());
    }
}
