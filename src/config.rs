use std::time::Duration;

use serde::Deserialize;

use crate::error::Error;
use crate::event::{EventKind, EventKindSet, RECORD_SIZE};

/// Construction-time settings for a [`crate::Recorder`].
///
/// The recorder never reads a configuration file itself; the host constructs
/// this directly (or embeds it in its own config, which is why the fields
/// deserialize with serde defaults).
#[derive(Debug, Clone, Deserialize)]
pub struct RecorderConfig {
    /// Ring buffer capacity in bytes. Must be a positive multiple of the
    /// record size. Default: 5 MiB.
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,

    /// How long the flush thread waits between drains. Default: 100ms.
    #[serde(default = "default_flush_interval", with = "humantime_serde")]
    pub flush_interval: Duration,

    /// Event kinds to capture, by canonical name. Default: all kinds.
    #[serde(default = "default_kinds")]
    pub kinds: Vec<String>,
}

fn default_buffer_capacity() -> usize {
    5 * 1024 * 1024
}

fn default_flush_interval() -> Duration {
    Duration::from_millis(100)
}

fn default_kinds() -> Vec<String> {
    EventKind::all().iter().map(|k| k.to_string()).collect()
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: default_buffer_capacity(),
            flush_interval: default_flush_interval(),
            kinds: default_kinds(),
        }
    }
}

impl RecorderConfig {
    /// Validate all settings, returning the first violation found.
    pub fn validate(&self) -> Result<(), Error> {
        if self.buffer_capacity == 0 || self.buffer_capacity % RECORD_SIZE != 0 {
            return Err(Error::InvalidConfig(format!(
                "buffer_capacity must be a positive multiple of {RECORD_SIZE}, got {}",
                self.buffer_capacity,
            )));
        }

        if self.flush_interval.is_zero() {
            return Err(Error::InvalidConfig(
                "flush_interval must be positive".to_string(),
            ));
        }

        if self.kinds.is_empty() {
            return Err(Error::InvalidConfig(
                "kinds must name at least one event kind".to_string(),
            ));
        }

        for name in &self.kinds {
            if EventKind::from_str(name).is_none() {
                return Err(Error::InvalidConfig(format!("unknown event kind: {name}")));
            }
        }

        Ok(())
    }

    /// The configured kinds as a set. Call after `validate`; unknown names
    /// are silently skipped here.
    pub fn kind_set(&self) -> EventKindSet {
        self.kinds
            .iter()
            .filter_map(|name| EventKind::from_str(name))
            .collect()
    }
}
