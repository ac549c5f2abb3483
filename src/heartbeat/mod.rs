use std::fmt;
use std::time::{Duration, Instant};

pub const DEFAULT_INTERVAL_MS: u64 = 30_000;
pub const DEFAULT_EARLY_BEAT_MS: u64 = 1_000;
pub const MIN_INTERVAL_MS: u64 = 1_000;
pub const MAX_INTERVAL_MS: u64 = 120_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeartbeatConfig {
    pub interval_ms: u64,
    /// Delay before the first keepalive after the connection opens.
    pub early_beat_ms: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_INTERVAL_MS,
            early_beat_ms: DEFAULT_EARLY_BEAT_MS,
        }
    }
}

#[derive(Debug)]
pub enum HeartbeatError {
    InvalidInterval { provided_ms: u64 },
    InvalidEarlyBeat { provided_ms: u64, interval_ms: u64 },
}

impl fmt::Display for HeartbeatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInterval { provided_ms } => write!(
                f,
                "keepalive interval must be between {MIN_INTERVAL_MS}ms and {MAX_INTERVAL_MS}ms, got {provided_ms}ms"
            ),
            Self::InvalidEarlyBeat {
                provided_ms,
                interval_ms,
            } => write!(
                f,
                "early beat delay must be between 1ms and the interval ({interval_ms}ms), got {provided_ms}ms"
            ),
        }
    }
}

impl std::error::Error for HeartbeatError {}

/// Deadline-based keepalive schedule driven by the session pump.
///
/// Armed when the connection opens with one early beat, then a fixed interval
/// after each sent keepalive. Regained host visibility pulls the deadline to
/// now so the link is probed immediately after a background period.
pub struct HeartbeatSchedule {
    interval: Duration,
    early_beat: Duration,
    next_due: Option<Instant>,
}

impl HeartbeatSchedule {
    pub fn new(config: HeartbeatConfig) -> Result<Self, HeartbeatError> {
        if !(MIN_INTERVAL_MS..=MAX_INTERVAL_MS).contains(&config.interval_ms) {
            return Err(HeartbeatError::InvalidInterval {
                provided_ms: config.interval_ms,
            });
        }
        if config.early_beat_ms == 0 || config.early_beat_ms > config.interval_ms {
            return Err(HeartbeatError::InvalidEarlyBeat {
                provided_ms: config.early_beat_ms,
                interval_ms: config.interval_ms,
            });
        }

        Ok(Self {
            interval: Duration::from_millis(config.interval_ms),
            early_beat: Duration::from_millis(config.early_beat_ms),
            next_due: None,
        })
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval.as_millis() as u64
    }

    pub fn arm(&mut self, now: Instant) {
        self.next_due = Some(now + self.early_beat);
    }

    pub fn disarm(&mut self) {
        self.next_due = None;
    }

    pub fn is_armed(&self) -> bool {
        self.next_due.is_some()
    }

    pub fn is_due(&self, now: Instant) -> bool {
        matches!(self.next_due, Some(due) if now >= due)
    }

    pub fn mark_sent(&mut self, now: Instant) {
        if self.next_due.is_some() {
            self.next_due = Some(now + self.interval);
        }
    }

    /// Pulls the deadline to now; no-op while disarmed.
    pub fn trigger_now(&mut self, now: Instant) {
        if self.next_due.is_some() {
            self.next_due = Some(now);
        }
    }
}
