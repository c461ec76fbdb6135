//! Manual control driver

use core::fmt::{self, Write};

use libm::fabsf;

use crate::config::ManualConfig;
use crate::error::Error;
use crate::modes::{format_message, message, Message, ModeEvent};
use crate::safety::SensorSnapshot;
use crate::traits::MotionHardware;

use super::command::{CommandHistory, ManualCommand, ManualCommandType, RateLimiter, SessionStats};
use super::state::{ManualEvent, ManualState};

/// Time allowed for the ESC arm sequence
const ARM_TIMEOUT_MS: u64 = 5000;

/// Stopping settles into Active after this long
const STOP_SETTLE_MS: u64 = 200;

/// Snapshot for status egress
#[derive(Debug, Clone, PartialEq)]
pub struct ManualStatus {
    pub state: ManualState,
    pub target_speed: f32,
    pub measured_speed: f32,
    pub forward: bool,
    pub motor_active: bool,
    pub esc_armed: bool,
    pub esc_armed_ms: u64,
    pub position_m: f32,
    pub command_count: u32,
    pub last_command: Option<ManualCommand>,
    pub safety_violations: u32,
    pub error_count: u32,
    pub status: Message,
    pub error: Message,
}

/// Manual control mode
pub struct ManualMode {
    config: ManualConfig,
    state: ManualState,
    state_since_ms: u64,
    target_speed: f32,
    forward: bool,
    motor_active: bool,
    esc_armed_at_ms: Option<u64>,
    limiter: RateLimiter,
    history: CommandHistory,
    stats: SessionStats,
    speed_sum: f32,
    speed_samples: u32,
    last_position_m: f32,
    liveness_failures: u8,
    last_liveness_ms: u64,
    safety_violations: u32,
    error_count: u32,
    start_ms: u64,
    now_ms: u64,
    status: Message,
    error: Message,
}

impl ManualMode {
    pub fn new(config: ManualConfig) -> Self {
        Self {
            config,
            state: ManualState::Idle,
            state_since_ms: 0,
            target_speed: 0.0,
            forward: true,
            motor_active: false,
            esc_armed_at_ms: None,
            limiter: RateLimiter::new(config.max_commands_per_window, config.rate_window_ms),
            history: CommandHistory::new(),
            stats: SessionStats::default(),
            speed_sum: 0.0,
            speed_samples: 0,
            last_position_m: 0.0,
            liveness_failures: 0,
            last_liveness_ms: 0,
            safety_violations: 0,
            error_count: 0,
            start_ms: 0,
            now_ms: 0,
            status: message("Manual mode ready"),
            error: Message::new(),
        }
    }

    /// Enter manual mode with the ESC disarmed
    pub fn start<H: MotionHardware>(
        &mut self,
        now_ms: u64,
        hw: &mut H,
        sensors_ready: bool,
    ) -> Result<(), Error> {
        if self.state.is_active() {
            return Err(Error::invalid_state("Manual mode already active"));
        }
        if !sensors_ready {
            return Err(Error::not_ready("Sensors not validated"));
        }

        hw.reset_position();
        self.target_speed = 0.0;
        self.forward = true;
        self.motor_active = false;
        self.esc_armed_at_ms = None;
        self.limiter.clear();
        self.history = CommandHistory::new();
        self.stats = SessionStats::default();
        self.speed_sum = 0.0;
        self.speed_samples = 0;
        self.last_position_m = 0.0;
        self.liveness_failures = 0;
        self.safety_violations = 0;
        self.error_count = 0;
        self.start_ms = now_ms;
        self.now_ms = now_ms;
        self.error.clear();
        self.status = message("Manual mode active - ARM ESC to enable motor control");
        self.apply(ManualEvent::Start, now_ms);
        Ok(())
    }

    /// Leave manual mode: stop the motor and disarm
    pub fn stop<H: MotionHardware>(&mut self, hw: &mut H) {
        if !self.state.is_active() {
            return;
        }
        hw.stop_motor();
        let _ = hw.disarm();
        self.target_speed = 0.0;
        self.motor_active = false;
        self.esc_armed_at_ms = None;
        self.stats.session_duration_ms = self.now_ms.saturating_sub(self.start_ms);
        self.status = message("Manual mode stopped");
        self.apply(ManualEvent::End, self.now_ms);
    }

    /// Coordinator-level emergency stop
    pub fn handle_emergency<H: MotionHardware>(&mut self, hw: &mut H) {
        if self.state.is_active() {
            self.emergency_stop(hw);
        }
    }

    pub fn update<H: MotionHardware>(
        &mut self,
        now_ms: u64,
        hw: &mut H,
        sensors: &SensorSnapshot,
    ) -> Option<ModeEvent> {
        if !self.state.is_active() {
            return None;
        }
        let delta_ms = now_ms.saturating_sub(self.now_ms);
        self.now_ms = now_ms;
        self.track_session(delta_ms, hw);

        match self.state {
            ManualState::Initializing => {
                self.apply(ManualEvent::Initialized, now_ms);
            }
            ManualState::EscArming => {
                if hw.is_armed() {
                    self.esc_armed_at_ms = Some(now_ms);
                    self.stats.arm_cycles += 1;
                    self.status = message("ESC armed - ready for motor commands");
                    self.apply(ManualEvent::Armed, now_ms);
                } else if !hw.is_arming() || self.elapsed_in_state() > ARM_TIMEOUT_MS {
                    hw.emergency_stop();
                    let _ = hw.disarm();
                    self.error_count += 1;
                    self.error = message("Failed to arm ESC");
                    self.status = message("Error");
                    self.apply(ManualEvent::ArmFailed, now_ms);
                    return Some(ModeEvent::Fault(Error::not_ready("ESC arm failed")));
                }
            }
            ManualState::Stopping => {
                if self.elapsed_in_state() >= STOP_SETTLE_MS {
                    self.status = message("Motor stopped - ready for commands");
                    self.apply(ManualEvent::Stopped, now_ms);
                }
            }
            ManualState::EscDisarming => {
                self.status = message("ESC disarmed - ready for arming");
                self.apply(ManualEvent::Disarmed, now_ms);
            }
            _ => {}
        }

        if !self.motor_active {
            return None;
        }

        if sensors.dynamic_g > self.config.impact_threshold_g {
            self.safety_violations += 1;
            self.emergency_stop(hw);
            self.error = format_message(format_args!("Impact detected: {:.2} g", sensors.dynamic_g));
            return Some(ModeEvent::Fault(Error::safety_violation("Impact detected")));
        }

        if now_ms.saturating_sub(self.last_liveness_ms) >= self.config.liveness_check_ms as u64 {
            self.last_liveness_ms = now_ms;
            if hw.time_since_last_pulse(now_ms) > self.config.liveness_check_ms as u64 {
                self.liveness_failures += 1;
                if self.liveness_failures >= self.config.liveness_failures {
                    self.safety_violations += 1;
                    self.emergency_stop(hw);
                    self.error = message("No wheel pulses while moving");
                    return Some(ModeEvent::Fault(Error::safety_violation(
                        "Pulse sensor silent while moving",
                    )));
                }
            } else {
                self.liveness_failures = 0;
            }
        }
        None
    }

    /// Validate and run one command
    pub fn execute<H: MotionHardware>(
        &mut self,
        command: ManualCommand,
        hw: &mut H,
        sensors: &SensorSnapshot,
    ) -> Result<(), Error> {
        let now_ms = command.timestamp_ms.max(self.now_ms);
        let result = self
            .validate(&command, now_ms, hw, sensors)
            .and_then(|()| self.dispatch(&command, now_ms, hw));

        match result {
            Ok(()) => {
                self.stats.total_commands += 1;
                match command.kind {
                    ManualCommandType::Forward => self.stats.forward_commands += 1,
                    ManualCommandType::Backward => self.stats.backward_commands += 1,
                    ManualCommandType::SetSpeed
                    | ManualCommandType::IncreaseSpeed
                    | ManualCommandType::DecreaseSpeed => self.stats.speed_changes += 1,
                    _ => {}
                }
                let mut accepted = command;
                accepted.validated = true;
                self.history.write(accepted);
            }
            Err(e) => {
                self.stats.rejected_commands += 1;
                self.error_count += 1;
                self.error = message(e.reason);
            }
        }
        result
    }

    /// Run a command letter (`A D F B S + - E`)
    pub fn process_char<H: MotionHardware>(
        &mut self,
        c: char,
        now_ms: u64,
        source: &str,
        hw: &mut H,
        sensors: &SensorSnapshot,
    ) -> Result<(), Error> {
        let command = ManualCommand::from_char(c, self.config.default_speed, now_ms, source)
            .ok_or(Error::invalid_argument("Unknown manual command"))?;
        self.execute(command, hw, sensors)
    }

    /// Speed within limits and not too large a jump from the current target
    pub fn is_speed_safe(&self, speed: f32) -> bool {
        (0.0..=self.config.max_speed).contains(&speed)
            && fabsf(speed - self.target_speed) <= self.config.max_speed_jump
    }

    pub fn state(&self) -> ManualState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    pub fn is_moving(&self) -> bool {
        self.motor_active
    }

    pub fn target_speed(&self) -> f32 {
        self.target_speed
    }

    pub fn is_forward(&self) -> bool {
        self.forward
    }

    pub fn history(&self) -> &CommandHistory {
        &self.history
    }

    pub fn session_stats(&self) -> SessionStats {
        let mut stats = self.stats;
        if self.state.is_active() {
            stats.session_duration_ms = self.now_ms.saturating_sub(self.start_ms);
        }
        stats
    }

    pub fn available_commands(&self) -> &'static str {
        self.state.available_commands()
    }

    pub fn status_message(&self) -> &str {
        &self.status
    }

    pub fn error_message(&self) -> &str {
        &self.error
    }

    pub fn status<H: MotionHardware>(&self, hw: &H) -> ManualStatus {
        ManualStatus {
            state: self.state,
            target_speed: self.target_speed,
            measured_speed: hw.speed(),
            forward: self.forward,
            motor_active: self.motor_active,
            esc_armed: hw.is_armed(),
            esc_armed_ms: self
                .esc_armed_at_ms
                .map_or(0, |t| self.now_ms.saturating_sub(t)),
            position_m: hw.position(),
            command_count: self.stats.total_commands,
            last_command: self.history.recent().cloned(),
            safety_violations: self.safety_violations,
            error_count: self.error_count,
            status: self.status.clone(),
            error: self.error.clone(),
        }
    }

    /// Operator help for the command letters
    pub fn write_help<W: Write>(&self, out: &mut W) -> fmt::Result {
        writeln!(out, "MANUAL MODE COMMANDS:")?;
        writeln!(out, "A = Arm ESC (required before movement)")?;
        writeln!(out, "D = Disarm ESC (safe state)")?;
        writeln!(out, "F = Move Forward ({:.1} m/s)", self.config.default_speed)?;
        writeln!(out, "B = Move Backward ({:.1} m/s)", self.config.default_speed)?;
        writeln!(out, "S = Stop movement")?;
        writeln!(out, "+ = Increase speed (+{:.1} m/s)", self.config.speed_increment)?;
        writeln!(out, "- = Decrease speed (-{:.1} m/s)", self.config.speed_increment)?;
        writeln!(out, "E = Emergency stop (immediate)")?;
        writeln!(out, "Max Speed: {:.1} m/s", self.config.max_speed)?;
        write!(
            out,
            "Rate Limit: {} commands/second",
            self.config.max_commands_per_window
        )
    }

    /// Plain-text session summary
    pub fn write_session_summary<W: Write>(&self, out: &mut W) -> fmt::Result {
        let stats = self.session_stats();
        writeln!(out, "Session: {} ms", stats.session_duration_ms)?;
        writeln!(
            out,
            "Commands: {} ({} forward, {} backward, {} speed, {} rejected)",
            stats.total_commands,
            stats.forward_commands,
            stats.backward_commands,
            stats.speed_changes,
            stats.rejected_commands
        )?;
        writeln!(out, "Arm cycles: {}", stats.arm_cycles)?;
        writeln!(out, "Distance: {:.2} m", stats.distance_m)?;
        writeln!(out, "Active time: {} ms", stats.active_time_ms)?;
        write!(
            out,
            "Speed: max {:.2} m/s, average {:.2} m/s",
            stats.max_speed, stats.average_speed
        )
    }

    fn apply(&mut self, event: ManualEvent, now_ms: u64) {
        let next = self.state.transition(event);
        if next != self.state {
            self.state = next;
            self.state_since_ms = now_ms;
        }
    }

    fn elapsed_in_state(&self) -> u64 {
        self.now_ms.saturating_sub(self.state_since_ms)
    }

    fn track_session<H: MotionHardware>(&mut self, delta_ms: u64, hw: &H) {
        let position = hw.position();
        self.stats.distance_m += fabsf(position - self.last_position_m);
        self.last_position_m = position;

        if self.motor_active {
            self.stats.active_time_ms += delta_ms;
            self.speed_sum += hw.speed();
            self.speed_samples += 1;
            self.stats.average_speed = self.speed_sum / self.speed_samples as f32;
        }
    }

    fn validate<H: MotionHardware>(
        &mut self,
        command: &ManualCommand,
        now_ms: u64,
        hw: &H,
        sensors: &SensorSnapshot,
    ) -> Result<(), Error> {
        if !self.limiter.try_acquire(now_ms) {
            return Err(Error::invalid_argument("Command rate limit exceeded"));
        }
        if !self.state.is_active() {
            return Err(Error::invalid_state("Manual mode not active"));
        }
        // Emergency stop is never refused past this point
        if command.kind == ManualCommandType::EmergencyStop {
            return Ok(());
        }
        if command.kind.is_motion() {
            if !self.is_speed_safe(command.speed) || command.speed > hw.max_speed() {
                return Err(Error::invalid_argument("Unsafe speed request"));
            }
            if !hw.is_armed() {
                return Err(Error::invalid_state("ESC not armed"));
            }
        }
        if !sensors.ready {
            return Err(Error::not_ready("Sensor health check failed"));
        }
        Ok(())
    }

    fn dispatch<H: MotionHardware>(
        &mut self,
        command: &ManualCommand,
        now_ms: u64,
        hw: &mut H,
    ) -> Result<(), Error> {
        match command.kind {
            ManualCommandType::SetSpeed => self.set_speed(command.speed, command.forward, now_ms, hw),
            ManualCommandType::Forward => self.set_speed(command.speed, true, now_ms, hw),
            ManualCommandType::Backward => self.set_speed(command.speed, false, now_ms, hw),
            ManualCommandType::Stop => {
                self.stop_movement(now_ms, hw);
                Ok(())
            }
            ManualCommandType::IncreaseSpeed => {
                let speed = self.target_speed + self.config.speed_increment;
                if speed > self.config.max_speed {
                    return Err(Error::invalid_argument("Speed at maximum"));
                }
                self.set_speed(speed, self.forward, now_ms, hw)
            }
            ManualCommandType::DecreaseSpeed => {
                let speed = (self.target_speed - self.config.speed_increment).max(0.0);
                self.set_speed(speed, self.forward, now_ms, hw)
            }
            ManualCommandType::ArmEsc => self.arm_esc(now_ms, hw),
            ManualCommandType::DisarmEsc => {
                self.disarm_esc(now_ms, hw);
                Ok(())
            }
            ManualCommandType::EmergencyStop => {
                self.emergency_stop(hw);
                Ok(())
            }
        }
    }

    fn set_speed<H: MotionHardware>(
        &mut self,
        speed: f32,
        forward: bool,
        now_ms: u64,
        hw: &mut H,
    ) -> Result<(), Error> {
        if !self.state.accepts_motion() {
            return Err(Error::invalid_state("Motion not allowed in current state"));
        }
        if !self.is_speed_safe(speed) {
            return Err(Error::invalid_argument("Unsafe speed request"));
        }

        hw.set_speed(speed, forward)?;

        let was_active = self.motor_active;
        self.target_speed = speed;
        self.forward = forward;
        self.motor_active = speed > self.config.min_speed_step;
        self.stats.max_speed = self.stats.max_speed.max(speed);

        if self.motor_active {
            if !was_active {
                // Liveness is judged from motion start
                self.last_liveness_ms = now_ms;
                self.liveness_failures = 0;
            }
            self.status = format_message(format_args!(
                "Moving {} at {:.1} m/s",
                if forward { "forward" } else { "backward" },
                speed
            ));
            let event = if forward {
                ManualEvent::MoveForward
            } else {
                ManualEvent::MoveBackward
            };
            self.apply(event, now_ms);
        } else {
            self.status = message("Motor stopped - ready for commands");
            self.apply(ManualEvent::Halt, now_ms);
        }
        Ok(())
    }

    fn stop_movement<H: MotionHardware>(&mut self, now_ms: u64, hw: &mut H) {
        hw.stop_motor();
        self.target_speed = 0.0;
        self.motor_active = false;
        if self.state.is_moving() {
            self.status = message("Stopping motor");
            self.apply(ManualEvent::StopMotion, now_ms);
        }
    }

    fn arm_esc<H: MotionHardware>(&mut self, now_ms: u64, hw: &mut H) -> Result<(), Error> {
        if hw.is_armed() && self.state.accepts_motion() {
            return Ok(());
        }
        if !matches!(
            self.state,
            ManualState::Ready | ManualState::Error | ManualState::EmergencyStop
        ) {
            return Err(Error::invalid_state("Cannot arm in current state"));
        }
        hw.arm(now_ms)?;
        self.error.clear();
        self.status = message("Arming ESC");
        self.apply(ManualEvent::Arm, now_ms);
        Ok(())
    }

    fn disarm_esc<H: MotionHardware>(&mut self, now_ms: u64, hw: &mut H) {
        hw.stop_motor();
        let _ = hw.disarm();
        self.target_speed = 0.0;
        self.motor_active = false;
        self.esc_armed_at_ms = None;
        self.status = message("Disarming ESC");
        self.apply(ManualEvent::Disarm, now_ms);
    }

    fn emergency_stop<H: MotionHardware>(&mut self, hw: &mut H) {
        hw.emergency_stop();
        self.target_speed = 0.0;
        self.motor_active = false;
        self.status = message("EMERGENCY STOP - All motion halted");
        self.apply(ManualEvent::Emergency, self.now_ms);
    }
}
