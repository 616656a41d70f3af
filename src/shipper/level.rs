use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};

use thiserror::Error;

/// Event severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("Unknown level {0:?}")]
pub struct ParseLevelError(String);

impl Level {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Level::Trace),
            1 => Some(Level::Debug),
            2 => Some(Level::Info),
            3 => Some(Level::Warn),
            4 => Some(Level::Error),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = ParseLevelError;

    /// Accepts the common spellings used by server-side level hints,
    /// including the verbose/information/warning/fatal aliases.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" | "verbose" => Ok(Level::Trace),
            "debug" => Ok(Level::Debug),
            "info" | "information" => Ok(Level::Info),
            "warn" | "warning" => Ok(Level::Warn),
            "error" | "fatal" => Ok(Level::Error),
            _ => Err(ParseLevelError(s.to_string())),
        }
    }
}

const NO_RESTRICTION: u8 = u8::MAX;

/// Server-driven minimum-level filter shared between the host's append path
/// and the shipper task.
///
/// Reads are lock-free and may come from any thread; updates come from the
/// single shipper task applying server feedback. No restriction means every
/// level is included and the host pipeline decides on its own.
#[derive(Debug)]
pub struct ControlledLevelSwitch {
    restriction: AtomicU8,
}

impl ControlledLevelSwitch {
    pub fn new(initial: Option<Level>) -> Self {
        let switch = Self {
            restriction: AtomicU8::new(NO_RESTRICTION),
        };
        switch.update(initial);
        switch
    }

    /// Hot-path check: should an event of this level be buffered at all?
    pub fn is_included(&self, level: Level) -> bool {
        match self.load() {
            Some(minimum) => level >= minimum,
            None => true,
        }
    }

    pub fn has_restriction(&self) -> bool {
        self.load().is_some()
    }

    pub fn restriction(&self) -> Option<Level> {
        self.load()
    }

    /// Applies a new server hint; `None` clears the restriction.
    pub fn update(&self, minimum: Option<Level>) {
        let encoded = match minimum {
            Some(level) => level as u8,
            None => NO_RESTRICTION,
        };
        self.restriction.store(encoded, Ordering::Relaxed);
    }

    fn load(&self) -> Option<Level> {
        Level::from_u8(self.restriction.load(Ordering::Relaxed))
    }
}

impl Default for ControlledLevelSwitch {
    fn default() -> Self {
        Self::new(None)
    }
}
