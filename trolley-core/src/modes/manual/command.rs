//! Manual command records, rate limiting and session statistics

use heapless::{Deque, HistoryBuffer, String};

/// Most timestamps the rate limiter can hold
pub const RATE_LIMIT_CAPACITY: usize = 32;

/// Commands kept in the session history
pub const HISTORY_LEN: usize = 20;

/// Longest command source label
pub const SOURCE_LEN: usize = 32;

/// Manual command kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ManualCommandType {
    SetSpeed,
    Forward,
    Backward,
    Stop,
    ArmEsc,
    DisarmEsc,
    EmergencyStop,
    IncreaseSpeed,
    DecreaseSpeed,
}

impl ManualCommandType {
    /// Map a command letter (case-insensitive)
    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'A' => Some(Self::ArmEsc),
            'D' => Some(Self::DisarmEsc),
            'F' => Some(Self::Forward),
            'B' => Some(Self::Backward),
            'S' => Some(Self::Stop),
            '+' => Some(Self::IncreaseSpeed),
            '-' => Some(Self::DecreaseSpeed),
            'E' => Some(Self::EmergencyStop),
            _ => None,
        }
    }

    /// Carries a speed that must pass the speed checks and needs an armed ESC
    pub fn is_motion(self) -> bool {
        matches!(self, Self::SetSpeed | Self::Forward | Self::Backward)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SetSpeed => "Set speed",
            Self::Forward => "Forward",
            Self::Backward => "Backward",
            Self::Stop => "Stop",
            Self::ArmEsc => "Arm ESC",
            Self::DisarmEsc => "Disarm ESC",
            Self::EmergencyStop => "Emergency stop",
            Self::IncreaseSpeed => "Increase speed",
            Self::DecreaseSpeed => "Decrease speed",
        }
    }
}

/// One operator command
#[derive(Debug, Clone, PartialEq)]
pub struct ManualCommand {
    pub kind: ManualCommandType,
    pub speed: f32,
    pub forward: bool,
    pub timestamp_ms: u64,
    pub validated: bool,
    /// Where the command came from (console, web, ...)
    pub source: String<SOURCE_LEN>,
}

impl ManualCommand {
    pub fn new(kind: ManualCommandType, speed: f32, forward: bool, now_ms: u64, source: &str) -> Self {
        let mut label = String::new();
        for c in source.chars() {
            if label.push(c).is_err() {
                break;
            }
        }
        if label.is_empty() {
            // "unknown" always fits
            let _ = label.push_str("unknown");
        }
        Self {
            kind,
            speed,
            forward,
            timestamp_ms: now_ms,
            validated: false,
            source: label,
        }
    }

    /// Build the command for a letter; forward and backward use `default_speed`
    pub fn from_char(c: char, default_speed: f32, now_ms: u64, source: &str) -> Option<Self> {
        let kind = ManualCommandType::from_char(c)?;
        let (speed, forward) = match kind {
            ManualCommandType::Forward => (default_speed, true),
            ManualCommandType::Backward => (default_speed, false),
            _ => (0.0, true),
        };
        Some(Self::new(kind, speed, forward, now_ms, source))
    }
}

/// Recent accepted commands, oldest overwritten first
pub type CommandHistory = HistoryBuffer<ManualCommand, HISTORY_LEN>;

/// Rolling-window command rate limiter
#[derive(Debug, Clone)]
pub struct RateLimiter {
    stamps: Deque<u64, RATE_LIMIT_CAPACITY>,
    max_commands: usize,
    window_ms: u64,
}

impl RateLimiter {
    pub fn new(max_commands: usize, window_ms: u32) -> Self {
        Self {
            stamps: Deque::new(),
            max_commands: max_commands.clamp(1, RATE_LIMIT_CAPACITY),
            window_ms: window_ms as u64,
        }
    }

    /// Record a command at `now_ms` if the window has room
    pub fn try_acquire(&mut self, now_ms: u64) -> bool {
        self.expire(now_ms);
        if self.stamps.len() >= self.max_commands {
            return false;
        }
        // len < max_commands <= capacity
        let _ = self.stamps.push_back(now_ms);
        true
    }

    /// Commands counted in the window ending at `now_ms`
    pub fn in_window(&mut self, now_ms: u64) -> usize {
        self.expire(now_ms);
        self.stamps.len()
    }

    pub fn clear(&mut self) {
        self.stamps.clear();
    }

    fn expire(&mut self, now_ms: u64) {
        while let Some(&oldest) = self.stamps.front() {
            if now_ms.saturating_sub(oldest) < self.window_ms {
                break;
            }
            self.stamps.pop_front();
        }
    }
}

/// Statistics for one manual session, reset on every start
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SessionStats {
    pub total_commands: u32,
    pub forward_commands: u32,
    pub backward_commands: u32,
    pub speed_changes: u32,
    pub arm_cycles: u32,
    pub rejected_commands: u32,
    pub max_speed: f32,
    pub distance_m: f32,
    pub session_duration_ms: u64,
    /// Time with a non-zero speed commanded
    pub active_time_ms: u64,
    /// Mean measured speed while active
    pub average_speed: f32,
}
