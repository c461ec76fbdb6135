//! Wire learning driver
//!
//! Per direction: start at the minimum test speed, validate each speed
//! step by counting pulses, step up to the learning maximum and let the
//! wire-end detectors end the traversal. After both directions the mean
//! distance becomes the wire length if the two legs agree.

use libm::fabsf;

use crate::config::{CoastingCalibration, LearningConfig, WireLearningResult};
use crate::error::Error;
use crate::modes::{format_message, message, Message, ModeEvent};
use crate::safety::{DetectionInput, DetectionMethod, DetectorConfig, SensorSnapshot, WireEndDetector};
use crate::traits::{Direction, MotionHardware};

use super::state::{LearningEvent, LearningState};

/// Rough duration of a learning run, for the remaining-time estimate
const ESTIMATED_RUN_MS: u64 = 30_000;

/// Measurement of one traversal
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DirectionRecord {
    pub rotations: u32,
    pub distance_m: f32,
    pub time_ms: u32,
    pub method: DetectionMethod,
    /// Test speed commanded when the wire end was found
    pub terminal_speed: f32,
    /// Highest measured speed during the traversal
    pub max_speed: f32,
    pub completed: bool,
}

/// Snapshot for status egress
#[derive(Debug, Clone, PartialEq)]
pub struct LearningProgress {
    pub state: LearningState,
    pub direction: Direction,
    pub test_speed: f32,
    pub elapsed_ms: u64,
    pub progress_percent: i8,
    pub forward: DirectionRecord,
    pub reverse: DirectionRecord,
    pub status: Message,
    pub error: Message,
}

/// Speed-step progress within a traversal
#[derive(Debug, Clone, Copy, PartialEq)]
enum StepPhase {
    /// Counting pulses at the current test speed
    Validating { window_start_ms: u64, start_rotations: u32 },
    /// Holding speed before the next increment
    Pausing { since_ms: u64 },
}

/// Coasting calibration progress
#[derive(Debug, Clone, Copy, PartialEq)]
enum CalibrationPhase {
    SpeedingUp,
    Coasting { start_ms: u64, start_rotations: u32 },
}

/// Wire learning mode
pub struct WireLearningMode {
    config: LearningConfig,
    state: LearningState,
    detector: WireEndDetector,
    step: StepPhase,
    calibration: CalibrationPhase,
    direction: Direction,
    test_speed: f32,
    calibration_speed: f32,
    start_ms: u64,
    state_since_ms: u64,
    direction_start_ms: u64,
    max_speed_seen: f32,
    forward: DirectionRecord,
    reverse: DirectionRecord,
    calibration_pending: bool,
    stop_requested: bool,
    result: WireLearningResult,
    coasting: Option<CoastingCalibration>,
    status: Message,
    error: Message,
    now_ms: u64,
}

impl WireLearningMode {
    pub fn new(config: LearningConfig) -> Self {
        Self {
            config,
            state: LearningState::Idle,
            detector: WireEndDetector::new(DetectorConfig::from(&config)),
            step: StepPhase::Pausing { since_ms: 0 },
            calibration: CalibrationPhase::SpeedingUp,
            direction: Direction::Forward,
            test_speed: 0.0,
            calibration_speed: 0.0,
            start_ms: 0,
            state_since_ms: 0,
            direction_start_ms: 0,
            max_speed_seen: 0.0,
            forward: DirectionRecord::default(),
            reverse: DirectionRecord::default(),
            calibration_pending: false,
            stop_requested: false,
            result: WireLearningResult::default(),
            coasting: None,
            status: message("Ready"),
            error: Message::new(),
            now_ms: 0,
        }
    }

    /// Start a learning run: arm the ESC and wait for it
    pub fn start<H: MotionHardware>(
        &mut self,
        now_ms: u64,
        hw: &mut H,
        sensors_ready: bool,
    ) -> Result<(), Error> {
        if self.state.is_active() {
            return Err(Error::invalid_state("Wire learning already running"));
        }
        if !sensors_ready {
            self.error = message("Sensors not validated");
            return Err(Error::not_ready("Sensors not validated"));
        }

        hw.arm(now_ms)?;
        hw.reset_rotation_count();
        hw.reset_position();

        self.forward = DirectionRecord::default();
        self.reverse = DirectionRecord::default();
        self.result = WireLearningResult::default();
        self.coasting = None;
        self.calibration_pending = false;
        self.stop_requested = false;
        self.start_ms = now_ms;
        self.now_ms = now_ms;
        self.error.clear();
        self.status = message("Arming ESC");
        self.apply(LearningEvent::Start, now_ms);
        Ok(())
    }

    /// Advance the run by one tick
    pub fn update<H: MotionHardware>(
        &mut self,
        now_ms: u64,
        hw: &mut H,
        sensors: &SensorSnapshot,
    ) -> Option<ModeEvent> {
        self.now_ms = now_ms;

        match self.state {
            LearningState::Idle | LearningState::Complete | LearningState::Failed => None,
            LearningState::Initializing => {
                if hw.is_armed() {
                    self.status = message("Learning forward");
                    if let Err(e) = self.begin_direction(Direction::Forward, true, now_ms, hw) {
                        return self.fail(hw, e);
                    }
                    self.apply(LearningEvent::EscArmed, now_ms);
                    None
                } else if !hw.is_arming() {
                    self.fail(hw, Error::not_ready("ESC arm failed"))
                } else {
                    None
                }
            }
            LearningState::Forward | LearningState::Reverse => {
                self.update_direction(now_ms, hw, sensors)
            }
            LearningState::DirectionPause => {
                hw.stop_motor();
                let paused = now_ms.saturating_sub(self.state_since_ms);
                if paused < self.config.direction_pause_ms as u64 {
                    return None;
                }
                if self.calibration_pending {
                    self.begin_calibration(now_ms, hw)
                } else {
                    self.status = message("Learning reverse");
                    if let Err(e) = self.begin_direction(Direction::Reverse, true, now_ms, hw) {
                        return self.fail(hw, e);
                    }
                    self.apply(LearningEvent::PauseElapsed, now_ms);
                    None
                }
            }
            LearningState::CoastingCalibration => self.update_calibration(now_ms, hw, sensors),
            LearningState::CalculatingResults => self.calculate_results(now_ms, hw),
            LearningState::Stopping => {
                hw.stop_motor();
                if hw.speed() <= self.config.coasting_stop_speed {
                    // Disarm never fails
                    let _ = hw.disarm();
                    self.status = message("Stopped by user");
                    self.apply(LearningEvent::Halted, now_ms);
                }
                None
            }
        }
    }

    /// Stop the run; graceful stops finish the current direction first
    pub fn stop<H: MotionHardware>(&mut self, immediate: bool, hw: &mut H) {
        if !self.state.is_active() {
            return;
        }

        if immediate {
            hw.emergency_stop();
            let _ = hw.disarm();
            self.record_user_stop();
            self.status = message("Stopped by user");
            self.apply(LearningEvent::StopImmediate, self.now_ms);
        } else if self.state.motor_allowed() {
            self.stop_requested = true;
            self.status = message("Stopping after current direction");
        } else {
            hw.stop_motor();
            self.status = message("Stopping");
            self.apply(LearningEvent::StopGraceful, self.now_ms);
        }
    }

    /// Emergency: force neutral and fail the run
    pub fn handle_emergency<H: MotionHardware>(&mut self, hw: &mut H) {
        if !self.state.is_active() {
            return;
        }
        hw.emergency_stop();
        let _ = hw.disarm();
        self.error = message("Emergency stop");
        self.status = message("Failed");
        self.apply(LearningEvent::Fault, self.now_ms);
    }

    /// Forget any previous result; ignored while running
    pub fn clear(&mut self) {
        if self.state.is_active() {
            return;
        }
        self.state = LearningState::Idle;
        self.forward = DirectionRecord::default();
        self.reverse = DirectionRecord::default();
        self.result = WireLearningResult::default();
        self.coasting = None;
        self.status = message("Ready");
        self.error.clear();
    }

    pub fn state(&self) -> LearningState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// Completed result, if the last run succeeded
    pub fn result(&self) -> Option<&WireLearningResult> {
        if self.state == LearningState::Complete && self.result.complete {
            Some(&self.result)
        } else {
            None
        }
    }

    /// Coasting calibration measured during the last run
    pub fn coasting(&self) -> Option<&CoastingCalibration> {
        self.coasting.as_ref()
    }

    /// Result is complete and accurate enough to use
    pub fn validate_results(&self) -> bool {
        self.result().is_some_and(|r| r.is_usable(self.config.min_accuracy_percent))
    }

    pub fn status_message(&self) -> &str {
        &self.status
    }

    pub fn error_message(&self) -> &str {
        &self.error
    }

    pub fn elapsed_ms(&self) -> u64 {
        if self.state == LearningState::Idle {
            return 0;
        }
        self.now_ms.saturating_sub(self.start_ms)
    }

    pub fn estimated_time_remaining_ms(&self) -> u64 {
        if !self.state.is_active() {
            return 0;
        }
        ESTIMATED_RUN_MS.saturating_sub(self.elapsed_ms())
    }

    pub fn progress(&self) -> LearningProgress {
        LearningProgress {
            state: self.state,
            direction: self.direction,
            test_speed: self.test_speed,
            elapsed_ms: self.elapsed_ms(),
            progress_percent: self.state.progress_percent(),
            forward: self.forward,
            reverse: self.reverse,
            status: self.status.clone(),
            error: self.error.clone(),
        }
    }

    fn apply(&mut self, event: LearningEvent, now_ms: u64) {
        let next = self.state.transition(event);
        if next != self.state {
            self.state = next;
            self.state_since_ms = now_ms;
        }
    }

    fn begin_direction<H: MotionHardware>(
        &mut self,
        direction: Direction,
        reset_count: bool,
        now_ms: u64,
        hw: &mut H,
    ) -> Result<(), Error> {
        if reset_count {
            hw.reset_rotation_count();
            self.direction_start_ms = now_ms;
            self.max_speed_seen = 0.0;
            self.detector.reset(now_ms);
        } else {
            self.detector.rearm_silence(now_ms);
            self.detector.enable_speed_drop(false);
        }

        self.direction = direction;
        self.test_speed = self.config.start_speed.min(hw.max_speed());
        hw.set_speed(self.test_speed, direction.is_forward())?;
        self.step = StepPhase::Validating {
            window_start_ms: now_ms,
            start_rotations: hw.rotation_count(),
        };
        Ok(())
    }

    fn update_direction<H: MotionHardware>(
        &mut self,
        now_ms: u64,
        hw: &mut H,
        sensors: &SensorSnapshot,
    ) -> Option<ModeEvent> {
        let elapsed = now_ms.saturating_sub(self.direction_start_ms);
        if elapsed > self.config.direction_timeout_ms as u64 {
            return self.fail(hw, Error::timeout("Wire learning timeout"));
        }

        self.max_speed_seen = self.max_speed_seen.max(hw.speed());

        let input = DetectionInput {
            now_ms,
            dynamic_g: sensors.dynamic_g,
            measured_speed: hw.speed(),
            commanded_speed: hw.commanded_speed(),
            pulse_silence_ms: hw.time_since_last_pulse(now_ms),
        };
        if let Some(method) = self.detector.check(&input) {
            return self.end_direction(method, now_ms, hw);
        }

        match self.step {
            StepPhase::Validating {
                window_start_ms,
                start_rotations,
            } => {
                let pulses = hw.rotation_count().wrapping_sub(start_rotations);
                let window_done =
                    now_ms.saturating_sub(window_start_ms) >= self.config.validation_window_ms as u64;
                if pulses < self.config.validation_pulses && !window_done {
                    return None;
                }
                if pulses == 0 {
                    // Commanded but never turned: treat as the wire end
                    return self.end_direction(DetectionMethod::PulseTimeout, now_ms, hw);
                }

                self.detector.enable_speed_drop(true);
                if pulses < self.config.validation_pulses {
                    // Too few pulses to step up: hold this speed and keep counting
                    self.step = StepPhase::Validating {
                        window_start_ms: now_ms,
                        start_rotations,
                    };
                    return None;
                }
                let ceiling = self.config.max_speed.min(hw.max_speed());
                self.step = if self.test_speed < ceiling {
                    StepPhase::Pausing { since_ms: now_ms }
                } else {
                    StepPhase::Validating {
                        window_start_ms: now_ms,
                        start_rotations: hw.rotation_count(),
                    }
                };
                None
            }
            StepPhase::Pausing { since_ms } => {
                if now_ms.saturating_sub(since_ms) < self.config.step_pause_ms as u64 {
                    return None;
                }
                let ceiling = self.config.max_speed.min(hw.max_speed());
                self.test_speed = (self.test_speed + self.config.speed_increment).min(ceiling);
                if let Err(e) = hw.set_speed(self.test_speed, self.direction.is_forward()) {
                    return self.fail(hw, e.into());
                }
                // New speed must validate before speed drop is judged again
                self.detector.enable_speed_drop(false);
                self.step = StepPhase::Validating {
                    window_start_ms: now_ms,
                    start_rotations: hw.rotation_count(),
                };
                None
            }
        }
    }

    fn end_direction<H: MotionHardware>(
        &mut self,
        method: DetectionMethod,
        now_ms: u64,
        hw: &mut H,
    ) -> Option<ModeEvent> {
        hw.stop_motor();

        let rotations = hw.rotation_count();
        let record = DirectionRecord {
            rotations,
            distance_m: hw.rotations_to_distance(rotations),
            time_ms: now_ms.saturating_sub(self.direction_start_ms) as u32,
            method,
            terminal_speed: self.test_speed,
            max_speed: self.max_speed_seen,
            completed: true,
        };

        if self.direction.is_forward() {
            self.forward = record;
            if record.distance_m < self.config.min_wire_length_m
                || record.distance_m > self.config.max_wire_length_m
            {
                return self.fail(hw, Error::invalid_argument("Wire length out of valid range"));
            }
            self.calibration_pending = self.coasting.is_none()
                && record.terminal_speed >= self.config.coasting_trigger_speed;
            self.status = format_message(format_args!(
                "Forward end: {:.2} m ({})",
                record.distance_m,
                method.as_str()
            ));
        } else {
            self.reverse = record;
            self.status = format_message(format_args!(
                "Reverse end: {:.2} m ({})",
                record.distance_m,
                method.as_str()
            ));
        }

        if self.stop_requested {
            self.apply(LearningEvent::StopGraceful, now_ms);
        } else {
            self.apply(LearningEvent::DirectionEnded, now_ms);
        }
        None
    }

    fn begin_calibration<H: MotionHardware>(
        &mut self,
        now_ms: u64,
        hw: &mut H,
    ) -> Option<ModeEvent> {
        self.calibration_pending = false;
        hw.reset_rotation_count();
        self.direction = Direction::Reverse;
        self.direction_start_ms = now_ms;
        self.max_speed_seen = 0.0;
        self.detector.reset(now_ms);

        self.calibration_speed = self.config.coasting_speed.min(hw.max_speed());
        self.test_speed = self.calibration_speed;
        if let Err(e) = hw.set_speed(self.calibration_speed, false) {
            return self.fail(hw, e.into());
        }
        self.calibration = CalibrationPhase::SpeedingUp;
        self.status = message("Calibrating coasting distance");
        self.apply(LearningEvent::BeginCalibration, now_ms);
        None
    }

    fn update_calibration<H: MotionHardware>(
        &mut self,
        now_ms: u64,
        hw: &mut H,
        sensors: &SensorSnapshot,
    ) -> Option<ModeEvent> {
        self.max_speed_seen = self.max_speed_seen.max(hw.speed());

        if now_ms.saturating_sub(self.state_since_ms) > self.config.coasting_timeout_ms as u64 {
            self.status = message("Coasting calibration timed out");
            return self.resume_reverse(now_ms, hw, None);
        }

        if let CalibrationPhase::Coasting {
            start_ms,
            start_rotations,
        } = self.calibration
        {
            if hw.speed() < self.config.coasting_stop_speed {
                let rotations = hw.rotation_count().wrapping_sub(start_rotations);
                let calibration = CoastingCalibration::from_measurement(
                    self.calibration_speed,
                    hw.rotations_to_distance(rotations),
                    now_ms.saturating_sub(start_ms) as u32,
                    rotations,
                    self.config.coasting_margin_m,
                );
                self.coasting = Some(calibration);
                self.status = format_message(format_args!(
                    "Coasting distance {:.2} m",
                    calibration.coasting_distance_m
                ));
                return self.resume_reverse(now_ms, hw, Some(calibration));
            }
        }

        let input = DetectionInput {
            now_ms,
            dynamic_g: sensors.dynamic_g,
            measured_speed: hw.speed(),
            commanded_speed: hw.commanded_speed(),
            pulse_silence_ms: hw.time_since_last_pulse(now_ms),
        };
        match self.detector.check(&input) {
            // Silence is expected at the end of a coast
            Some(DetectionMethod::PulseTimeout)
                if matches!(self.calibration, CalibrationPhase::Coasting { .. }) => {}
            Some(method) => return self.end_direction(method, now_ms, hw),
            None => {}
        }

        if self.calibration == CalibrationPhase::SpeedingUp {
            let reached = self.calibration_speed
                - (self.config.coasting_speed - self.config.coasting_reached_speed);
            if hw.speed() >= reached {
                hw.stop_motor();
                self.calibration = CalibrationPhase::Coasting {
                    start_ms: now_ms,
                    start_rotations: hw.rotation_count(),
                };
            }
        }
        None
    }

    fn resume_reverse<H: MotionHardware>(
        &mut self,
        now_ms: u64,
        hw: &mut H,
        calibration: Option<CoastingCalibration>,
    ) -> Option<ModeEvent> {
        if let Err(e) = self.begin_direction(Direction::Reverse, false, now_ms, hw) {
            return self.fail(hw, e);
        }
        self.apply(LearningEvent::CalibrationFinished, now_ms);
        calibration.map(ModeEvent::CoastingCalibrated)
    }

    fn calculate_results<H: MotionHardware>(
        &mut self,
        now_ms: u64,
        hw: &mut H,
    ) -> Option<ModeEvent> {
        let forward = self.forward.distance_m;
        let reverse = self.reverse.distance_m;
        let mean = (forward + reverse) / 2.0;
        if mean <= 0.0 {
            return self.fail(hw, Error::invalid_argument("Wire length out of valid range"));
        }

        let difference = fabsf(forward - reverse) / mean * 100.0;
        if difference > self.config.tolerance_percent {
            let reason = format_message(format_args!(
                "Wire learning failed: {:.1}% difference > {:.1}% tolerance",
                difference, self.config.tolerance_percent
            ));
            let event = self.fail(hw, Error::invalid_argument("Direction measurements disagree"));
            self.error = reason;
            return event;
        }
        if mean < self.config.min_wire_length_m || mean > self.config.max_wire_length_m {
            return self.fail(hw, Error::invalid_argument("Wire length out of valid range"));
        }

        let cruise = (self.forward.terminal_speed * self.config.cruise_factor)
            .min(self.config.max_cruise_speed)
            .min(hw.max_speed());

        self.result = WireLearningResult {
            complete: true,
            wire_length_m: mean,
            forward_distance_m: forward,
            reverse_distance_m: reverse,
            forward_rotations: self.forward.rotations,
            reverse_rotations: self.reverse.rotations,
            accuracy_percent: 100.0 - difference,
            recommended_cruise_speed: cruise,
            primary_method: self.forward.method,
            total_time_ms: now_ms.saturating_sub(self.start_ms) as u32,
        };

        hw.stop_motor();
        let _ = hw.disarm();
        self.status = format_message(format_args!(
            "Wire length {:.2} m ({:.1}% accuracy)",
            mean, self.result.accuracy_percent
        ));
        self.apply(LearningEvent::ResultsAccepted, now_ms);
        Some(ModeEvent::WireLearningComplete(self.result))
    }

    fn record_user_stop(&mut self) {
        let record = DirectionRecord {
            method: DetectionMethod::UserStop,
            ..DirectionRecord::default()
        };
        match self.state {
            LearningState::Forward => self.forward = record,
            LearningState::Reverse | LearningState::CoastingCalibration => self.reverse = record,
            _ => {}
        }
    }

    fn fail<H: MotionHardware>(&mut self, hw: &mut H, error: Error) -> Option<ModeEvent> {
        hw.emergency_stop();
        let _ = hw.disarm();
        self.error = message(error.reason);
        self.status = message("Failed");
        self.apply(LearningEvent::Fault, self.now_ms);
        Some(ModeEvent::Fault(error))
    }
}
