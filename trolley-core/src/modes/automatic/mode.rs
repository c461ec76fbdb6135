//! Automatic cycling driver
//!
//! Each run ramps to cruise speed and cuts power once the remaining
//! distance (wire length minus distance covered this run) falls to the
//! coast-start distance. After the coast the trolley creeps a short way
//! at approach speed, then pauses and reverses. The first run measures
//! the coast-out distance when no calibration is available.

use crate::config::{AutomaticConfig, CoastingCalibration, WireLearningResult};
use crate::error::Error;
use crate::modes::{format_message, message, Message, ModeEvent};
use crate::motion::SpeedRamp;
use crate::safety::{DetectionInput, DetectionMethod, DetectorConfig, SensorSnapshot, WireEndDetector};
use crate::traits::{Direction, MotionHardware};

use super::state::{AutomaticEvent, AutomaticState};

/// Cycle bookkeeping, reset at mode start
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CycleRecord {
    /// Completed cycles (one forward and one reverse run each)
    pub cycle_number: u32,
    pub forward_runs: u32,
    pub reverse_runs: u32,
    pub direction: Direction,
    pub cycle_start_ms: u64,
    pub run_start_ms: u64,
    pub run_start_rotations: u32,
    /// Highest measured speed this run
    pub max_speed: f32,
    pub total_distance_m: f32,
}

/// Summary of a cycling session
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AutomaticResults {
    pub total_cycles: u32,
    pub total_runs: u32,
    pub operating_time_ms: u64,
    pub total_distance_m: f32,
    pub average_cycle_time_ms: f32,
    pub max_speed: f32,
    pub coasting: Option<CoastingCalibration>,
    pub interrupted_by_user: bool,
    pub completion_reason: Message,
}

/// Snapshot for status egress
#[derive(Debug, Clone, PartialEq)]
pub struct AutomaticProgress {
    pub state: AutomaticState,
    pub cycle: CycleRecord,
    pub target_speed: f32,
    pub cruise_speed: f32,
    pub wire_length_m: f32,
    pub run_distance_m: f32,
    pub distance_to_end_m: f32,
    pub coasting: Option<CoastingCalibration>,
    pub status: Message,
    pub error: Message,
    pub error_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CalibrationPhase {
    SpeedingUp,
    Coasting {
        start_ms: u64,
        start_rotations: u32,
        cut_speed: f32,
    },
}

/// Automatic cycling mode
pub struct AutomaticMode {
    config: AutomaticConfig,
    state: AutomaticState,
    state_since_ms: u64,
    detector: WireEndDetector,
    ramp: SpeedRamp,
    calibration: CalibrationPhase,
    calibration_speed: f32,
    coasting: Option<CoastingCalibration>,
    cycle: CycleRecord,
    wire_length_m: f32,
    cruise_speed: f32,
    approach_start_rotations: u32,
    /// Reverse run finished; a cycle completes after the direction pause
    cycle_pending: bool,
    stop_requested: bool,
    interrupted: bool,
    start_ms: u64,
    now_ms: u64,
    cycle_time_total_ms: u64,
    max_speed_seen: f32,
    run_distance_m: f32,
    completion_reason: Message,
    status: Message,
    error: Message,
    error_count: u32,
}

impl AutomaticMode {
    pub fn new(config: AutomaticConfig) -> Self {
        Self {
            config,
            state: AutomaticState::Idle,
            state_since_ms: 0,
            detector: WireEndDetector::new(DetectorConfig::from(&config)),
            ramp: SpeedRamp::new(config.acceleration, config.deceleration),
            calibration: CalibrationPhase::SpeedingUp,
            calibration_speed: 0.0,
            coasting: None,
            cycle: CycleRecord::default(),
            wire_length_m: 0.0,
            cruise_speed: 0.0,
            approach_start_rotations: 0,
            cycle_pending: false,
            stop_requested: false,
            interrupted: false,
            start_ms: 0,
            now_ms: 0,
            cycle_time_total_ms: 0,
            max_speed_seen: 0.0,
            run_distance_m: 0.0,
            completion_reason: Message::new(),
            status: message("Ready"),
            error: Message::new(),
            error_count: 0,
        }
    }

    /// Start cycling over a learned wire
    ///
    /// `coasting` is a calibration already held by the coordinator; without
    /// one the first run measures it.
    pub fn start<H: MotionHardware>(
        &mut self,
        now_ms: u64,
        hw: &mut H,
        sensors_ready: bool,
        wire: Option<&WireLearningResult>,
        coasting: Option<CoastingCalibration>,
    ) -> Result<(), Error> {
        if self.state.is_active() {
            return Err(Error::invalid_state("Automatic mode already running"));
        }
        if !sensors_ready {
            return Err(Error::not_ready("Sensors not validated"));
        }
        let wire = match wire {
            Some(result) if result.complete => result,
            _ => return Err(Error::prerequisite_missing("Wire learning required")),
        };
        if wire.wire_length_m < self.config.min_wire_length_m {
            return Err(Error::invalid_argument("Wire too short for automatic mode"));
        }

        self.wire_length_m = wire.wire_length_m;
        self.cruise_speed = wire
            .recommended_cruise_speed
            .min(self.config.max_cruise_speed)
            .min(hw.max_speed());
        if self.cruise_speed <= 0.0 {
            self.cruise_speed = self.config.approach_speed.min(hw.max_speed());
        }
        if coasting.is_some() {
            self.coasting = coasting;
        }

        hw.reset_position();
        self.cycle = CycleRecord {
            cycle_start_ms: now_ms,
            ..CycleRecord::default()
        };
        self.cycle_pending = false;
        self.stop_requested = false;
        self.interrupted = false;
        self.start_ms = now_ms;
        self.now_ms = now_ms;
        self.cycle_time_total_ms = 0;
        self.max_speed_seen = 0.0;
        self.run_distance_m = 0.0;
        self.completion_reason.clear();
        self.error.clear();
        self.status = message("Initializing");
        self.apply(AutomaticEvent::Start, now_ms);
        Ok(())
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
        let delta_ms = now_ms.saturating_sub(self.now_ms) as u32;
        self.now_ms = now_ms;

        match self.state {
            AutomaticState::Initializing => {
                if let Err(e) = hw.arm(now_ms) {
                    return self.fail(hw, e.into());
                }
                self.status = message("Arming ESC");
                self.apply(AutomaticEvent::Initialized, now_ms);
                None
            }
            AutomaticState::ArmingEsc => {
                if hw.is_armed() {
                    self.begin_run(now_ms, hw)
                } else if !hw.is_arming() {
                    self.fail(hw, Error::not_ready("ESC arm failed"))
                } else {
                    None
                }
            }
            AutomaticState::Accelerating | AutomaticState::Cruising => {
                self.update_run(now_ms, delta_ms, hw, sensors)
            }
            AutomaticState::CoastingCalibration => {
                self.update_calibration(now_ms, delta_ms, hw, sensors)
            }
            AutomaticState::Coasting => self.update_coasting(now_ms, hw, sensors),
            AutomaticState::WireEndApproach => self.update_approach(now_ms, hw, sensors),
            AutomaticState::DirectionChange => {
                hw.stop_motor();
                if self.elapsed_in_state() < self.config.direction_pause_ms as u64 {
                    return None;
                }
                if self.cycle_pending {
                    self.finish_cycle(now_ms, hw);
                    None
                } else {
                    self.begin_run(now_ms, hw)
                }
            }
            AutomaticState::CycleComplete => {
                if self.elapsed_in_state() < self.config.cycle_pause_ms as u64 {
                    return None;
                }
                self.cycle.cycle_start_ms = now_ms;
                self.begin_run(now_ms, hw)
            }
            AutomaticState::StoppingGraceful => {
                hw.stop_motor();
                if hw.speed() <= self.config.coast_stop_speed {
                    let _ = hw.disarm();
                    self.completion_reason = message("Stopped by user");
                    self.status = message("Stopped");
                    self.apply(AutomaticEvent::Halted, now_ms);
                }
                None
            }
            AutomaticState::StoppingInterrupted => {
                self.completion_reason = message("Interrupted by user");
                self.status = message("Interrupted");
                self.apply(AutomaticEvent::Halted, now_ms);
                None
            }
            AutomaticState::Idle | AutomaticState::Complete | AutomaticState::Error => None,
        }
    }

    /// Finish the current run, then stop
    pub fn stop<H: MotionHardware>(&mut self, hw: &mut H) {
        if !self.state.is_running() {
            return;
        }
        if self.state.in_run() {
            self.stop_requested = true;
            self.status = message("Finishing current run");
        } else {
            hw.stop_motor();
            self.status = message("Stopping");
            self.apply(AutomaticEvent::StopGraceful, self.now_ms);
        }
    }

    /// Stop immediately through the emergency path and disarm
    pub fn interrupt<H: MotionHardware>(&mut self, hw: &mut H) {
        if !self.state.is_active() {
            return;
        }
        hw.emergency_stop();
        let _ = hw.disarm();
        self.ramp.stop();
        self.interrupted = true;
        self.status = message("Interrupted");
        self.apply(AutomaticEvent::Interrupt, self.now_ms);
    }

    /// Interrupt and finish in the same call, leaving the mode inactive
    pub fn abort<H: MotionHardware>(&mut self, hw: &mut H) {
        self.interrupt(hw);
        if self.state == AutomaticState::StoppingInterrupted {
            self.completion_reason = message("Interrupted by user");
            self.apply(AutomaticEvent::Halted, self.now_ms);
        }
    }

    pub fn handle_emergency<H: MotionHardware>(&mut self, hw: &mut H) {
        if !self.state.is_active() {
            return;
        }
        hw.emergency_stop();
        let _ = hw.disarm();
        self.ramp.stop();
        self.error = message("Emergency stop");
        self.completion_reason = message("Emergency stop");
        self.apply(AutomaticEvent::Fault, self.now_ms);
    }

    /// Forget session data and calibration; ignored while running
    pub fn clear(&mut self) {
        if self.state.is_active() {
            return;
        }
        self.state = AutomaticState::Idle;
        self.coasting = None;
        self.cycle = CycleRecord::default();
        self.completion_reason.clear();
        self.error.clear();
        self.error_count = 0;
        self.status = message("Ready");
    }

    pub fn state(&self) -> AutomaticState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    pub fn coasting(&self) -> Option<&CoastingCalibration> {
        self.coasting.as_ref()
    }

    pub fn is_coasting_calibrated(&self) -> bool {
        self.coasting.is_some()
    }

    /// Distance from the wire end at which power is cut
    pub fn coast_start_distance(&self) -> f32 {
        self.coasting
            .map_or(self.config.safety_margin_m, |c| c.coast_start_distance_m)
    }

    /// Distance left to travel before power must be cut
    pub fn calculate_coasting_distance(&self, distance_to_end_m: f32) -> f32 {
        (distance_to_end_m - self.coast_start_distance()).max(0.0)
    }

    pub fn status_message(&self) -> &str {
        &self.status
    }

    pub fn error_message(&self) -> &str {
        &self.error
    }

    pub fn progress(&self) -> AutomaticProgress {
        AutomaticProgress {
            state: self.state,
            cycle: self.cycle,
            target_speed: self.ramp.target(),
            cruise_speed: self.cruise_speed,
            wire_length_m: self.wire_length_m,
            run_distance_m: self.run_distance_m,
            distance_to_end_m: (self.wire_length_m - self.run_distance_m).max(0.0),
            coasting: self.coasting,
            status: self.status.clone(),
            error: self.error.clone(),
            error_count: self.error_count,
        }
    }

    pub fn results(&self) -> AutomaticResults {
        let cycles = self.cycle.cycle_number;
        AutomaticResults {
            total_cycles: cycles,
            total_runs: self.cycle.forward_runs + self.cycle.reverse_runs,
            operating_time_ms: self.now_ms.saturating_sub(self.start_ms),
            total_distance_m: self.cycle.total_distance_m,
            average_cycle_time_ms: if cycles > 0 {
                self.cycle_time_total_ms as f32 / cycles as f32
            } else {
                0.0
            },
            max_speed: self.max_speed_seen,
            coasting: self.coasting,
            interrupted_by_user: self.interrupted,
            completion_reason: self.completion_reason.clone(),
        }
    }

    fn apply(&mut self, event: AutomaticEvent, now_ms: u64) {
        let next = self.state.transition(event);
        if next != self.state {
            self.state = next;
            self.state_since_ms = now_ms;
        }
    }

    fn elapsed_in_state(&self) -> u64 {
        self.now_ms.saturating_sub(self.state_since_ms)
    }

    fn begin_run<H: MotionHardware>(&mut self, now_ms: u64, hw: &mut H) -> Option<ModeEvent> {
        hw.reset_rotation_count();
        self.cycle.run_start_ms = now_ms;
        self.cycle.run_start_rotations = 0;
        self.cycle.max_speed = 0.0;
        self.run_distance_m = 0.0;
        self.detector.reset(now_ms);

        if self.coasting.is_none() {
            self.calibration_speed = self.config.coasting_speed.min(hw.max_speed());
            self.ramp.stop();
            self.ramp.set_target(self.calibration_speed);
            self.calibration = CalibrationPhase::SpeedingUp;
            self.enter_accelerating(now_ms);
            self.apply(AutomaticEvent::BeginCalibration, now_ms);
            self.status = message("Calibrating coasting distance");
            return None;
        }

        self.accelerate(now_ms, hw)
    }

    /// Ramp toward cruise from rest within the current run
    fn accelerate<H: MotionHardware>(&mut self, now_ms: u64, hw: &mut H) -> Option<ModeEvent> {
        self.ramp.stop();
        self.ramp.start_at(self.config.start_speed.min(self.cruise_speed));
        self.ramp.set_target(self.cruise_speed);
        self.detector.enable_speed_drop(false);
        self.detector.rearm_silence(now_ms);
        self.enter_accelerating(now_ms);
        self.status = format_message(format_args!(
            "Run {} {}",
            self.cycle.forward_runs + self.cycle.reverse_runs + 1,
            self.cycle.direction.as_str()
        ));

        self.run_distance_m = hw.rotations_to_distance(hw.rotation_count());
        if self.wire_length_m - self.run_distance_m <= self.coast_start_distance() {
            self.begin_coasting(now_ms, hw);
            return None;
        }
        if let Err(e) = hw.set_speed(self.ramp.current(), self.cycle.direction.is_forward()) {
            return self.fail(hw, e.into());
        }
        None
    }

    fn enter_accelerating(&mut self, now_ms: u64) {
        let event = match self.state {
            AutomaticState::ArmingEsc => AutomaticEvent::EscArmed,
            AutomaticState::CoastingCalibration => AutomaticEvent::CalibrationFinished,
            _ => AutomaticEvent::PauseElapsed,
        };
        self.apply(event, now_ms);
    }

    fn begin_coasting<H: MotionHardware>(&mut self, now_ms: u64, hw: &mut H) {
        hw.stop_motor();
        self.ramp.stop();
        self.detector.enable_speed_drop(false);
        self.status = format_message(format_args!(
            "Coasting, {:.1} m to wire end",
            (self.wire_length_m - self.run_distance_m).max(0.0)
        ));
        self.apply(AutomaticEvent::CoastPointReached, now_ms);
    }

    fn detection_input<H: MotionHardware>(
        &self,
        now_ms: u64,
        hw: &H,
        sensors: &SensorSnapshot,
    ) -> DetectionInput {
        DetectionInput {
            now_ms,
            dynamic_g: sensors.dynamic_g,
            measured_speed: hw.speed(),
            commanded_speed: hw.commanded_speed(),
            pulse_silence_ms: hw.time_since_last_pulse(now_ms),
        }
    }

    /// Track speed and distance; returns a fault when the run timed out
    fn run_bookkeeping<H: MotionHardware>(&mut self, now_ms: u64, hw: &mut H) -> Option<ModeEvent> {
        let speed = hw.speed();
        self.cycle.max_speed = self.cycle.max_speed.max(speed);
        self.max_speed_seen = self.max_speed_seen.max(speed);
        self.run_distance_m = hw.rotations_to_distance(hw.rotation_count());

        if now_ms.saturating_sub(self.cycle.run_start_ms) > self.config.run_timeout_ms as u64 {
            return self.fail(hw, Error::timeout("Automatic run timeout"));
        }
        None
    }

    fn update_run<H: MotionHardware>(
        &mut self,
        now_ms: u64,
        delta_ms: u32,
        hw: &mut H,
        sensors: &SensorSnapshot,
    ) -> Option<ModeEvent> {
        if let Some(event) = self.run_bookkeeping(now_ms, hw) {
            return Some(event);
        }

        let input = self.detection_input(now_ms, hw, sensors);
        if let Some(method) = self.detector.check(&input) {
            return self.end_run(now_ms, method, hw);
        }

        if self.wire_length_m - self.run_distance_m <= self.coast_start_distance() {
            self.begin_coasting(now_ms, hw);
            return None;
        }

        let speed = self.ramp.update(delta_ms);
        if let Err(e) = hw.set_speed(speed, self.cycle.direction.is_forward()) {
            return self.fail(hw, e.into());
        }
        if self.state == AutomaticState::Accelerating && self.ramp.is_at_target() {
            self.detector.enable_speed_drop(true);
            self.status = format_message(format_args!("Cruising at {:.1} m/s", speed));
            self.apply(AutomaticEvent::CruiseReached, now_ms);
        }
        None
    }

    fn update_calibration<H: MotionHardware>(
        &mut self,
        now_ms: u64,
        delta_ms: u32,
        hw: &mut H,
        sensors: &SensorSnapshot,
    ) -> Option<ModeEvent> {
        if let Some(event) = self.run_bookkeeping(now_ms, hw) {
            return Some(event);
        }

        let input = self.detection_input(now_ms, hw, sensors);
        match self.detector.check(&input) {
            // Silence is expected at the end of a coast
            Some(DetectionMethod::PulseTimeout)
                if matches!(self.calibration, CalibrationPhase::Coasting { .. }) => {}
            // Reached the end before the coast was measured; no calibration this run
            Some(method) => return self.end_run(now_ms, method, hw),
            None => {}
        }

        match self.calibration {
            CalibrationPhase::SpeedingUp => {
                // Never under power inside the margin, even before a coast is measured
                if self.wire_length_m - self.run_distance_m <= self.config.safety_margin_m {
                    self.begin_coasting(now_ms, hw);
                    self.status = message("Wire end near, calibration retried next run");
                    return None;
                }
                let speed = self.ramp.update(delta_ms);
                if let Err(e) = hw.set_speed(speed, self.cycle.direction.is_forward()) {
                    return self.fail(hw, e.into());
                }
                let cut_at = self.calibration_speed - self.config.coasting_reached_margin;
                if hw.speed() >= cut_at {
                    let cut_speed = hw.speed();
                    hw.stop_motor();
                    self.ramp.stop();
                    self.calibration = CalibrationPhase::Coasting {
                        start_ms: now_ms,
                        start_rotations: hw.rotation_count(),
                        cut_speed,
                    };
                    self.status = format_message(format_args!(
                        "Coasting from {:.1} m/s",
                        cut_speed
                    ));
                }
                None
            }
            CalibrationPhase::Coasting {
                start_ms,
                start_rotations,
                cut_speed,
            } => {
                if hw.speed() >= self.config.coast_stop_speed {
                    return None;
                }
                let rotations = hw.rotation_count().wrapping_sub(start_rotations);
                let distance = hw.rotations_to_distance(rotations);
                if distance < self.config.min_coasting_distance_m
                    || distance > self.config.max_coasting_distance_m
                {
                    return self.fail(hw, Error::invalid_argument("Coasting distance out of range"));
                }

                let calibration = CoastingCalibration::from_measurement(
                    cut_speed,
                    distance,
                    now_ms.saturating_sub(start_ms) as u32,
                    rotations,
                    self.config.safety_margin_m,
                );
                self.coasting = Some(calibration);
                if let Some(event) = self.accelerate(now_ms, hw) {
                    return Some(event);
                }
                self.status = format_message(format_args!(
                    "Coasting distance {:.2} m",
                    calibration.coasting_distance_m
                ));
                Some(ModeEvent::CoastingCalibrated(calibration))
            }
        }
    }

    fn update_coasting<H: MotionHardware>(
        &mut self,
        now_ms: u64,
        hw: &mut H,
        sensors: &SensorSnapshot,
    ) -> Option<ModeEvent> {
        if let Some(event) = self.run_bookkeeping(now_ms, hw) {
            return Some(event);
        }

        let input = self.detection_input(now_ms, hw, sensors);
        let silent = match self.detector.check(&input) {
            Some(DetectionMethod::PulseTimeout) => true,
            Some(method) => return self.end_run(now_ms, method, hw),
            None => false,
        };

        if silent || hw.speed() < self.config.coast_stop_speed {
            self.approach_start_rotations = hw.rotation_count();
            self.detector.rearm_silence(now_ms);
            let approach = self.config.approach_speed.min(hw.max_speed());
            if let Err(e) = hw.set_speed(approach, self.cycle.direction.is_forward()) {
                return self.fail(hw, e.into());
            }
            self.status = message("Approaching wire end");
            self.apply(AutomaticEvent::CoastFinished, now_ms);
        }
        None
    }

    fn update_approach<H: MotionHardware>(
        &mut self,
        now_ms: u64,
        hw: &mut H,
        sensors: &SensorSnapshot,
    ) -> Option<ModeEvent> {
        if let Some(event) = self.run_bookkeeping(now_ms, hw) {
            return Some(event);
        }

        let input = self.detection_input(now_ms, hw, sensors);
        if let Some(method) = self.detector.check(&input) {
            return self.end_run(now_ms, method, hw);
        }

        let crept = hw.rotation_count().wrapping_sub(self.approach_start_rotations);
        if hw.rotations_to_distance(crept) >= self.config.approach_distance_m {
            return self.end_run(now_ms, DetectionMethod::None, hw);
        }
        None
    }

    fn end_run<H: MotionHardware>(
        &mut self,
        now_ms: u64,
        method: DetectionMethod,
        hw: &mut H,
    ) -> Option<ModeEvent> {
        hw.stop_motor();
        self.ramp.stop();

        let distance = hw.rotations_to_distance(hw.rotation_count());
        self.run_distance_m = distance;
        self.cycle.total_distance_m += distance;
        match self.cycle.direction {
            Direction::Forward => self.cycle.forward_runs += 1,
            Direction::Reverse => {
                self.cycle.reverse_runs += 1;
                self.cycle_pending = true;
            }
        }
        self.cycle.direction = self.cycle.direction.reversed();

        self.status = match method {
            DetectionMethod::None => format_message(format_args!("Run complete: {:.1} m", distance)),
            _ => format_message(format_args!(
                "Run complete: {:.1} m ({})",
                distance,
                method.as_str()
            )),
        };

        if self.stop_requested {
            self.apply(AutomaticEvent::StopGraceful, now_ms);
        } else {
            self.apply(AutomaticEvent::WireEndReached, now_ms);
        }
        None
    }

    fn finish_cycle<H: MotionHardware>(&mut self, now_ms: u64, hw: &mut H) {
        self.cycle_pending = false;
        self.cycle.cycle_number += 1;
        self.cycle_time_total_ms += now_ms.saturating_sub(self.cycle.cycle_start_ms);
        self.apply(AutomaticEvent::CycleFinished, now_ms);

        if self.cycle.cycle_number >= self.config.max_cycles {
            let _ = hw.disarm();
            self.completion_reason = message("Maximum cycles reached");
            self.status = message("Complete");
            self.apply(AutomaticEvent::CyclesExhausted, now_ms);
        } else {
            self.status = format_message(format_args!("Cycle {} complete", self.cycle.cycle_number));
        }
    }

    fn fail<H: MotionHardware>(&mut self, hw: &mut H, error: Error) -> Option<ModeEvent> {
        hw.emergency_stop();
        let _ = hw.disarm();
        self.ramp.stop();
        self.error_count += 1;
        self.error = message(error.reason);
        self.completion_reason = message(error.reason);
        self.status = message("Error");
        self.apply(AutomaticEvent::Fault, self.now_ms);
        Some(ModeEvent::Fault(error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::modes::sim::{SimTrolley, TICK_MS};
    use std::vec::Vec;

    fn learned(wire_length_m: f32, cruise: f32) -> WireLearningResult {
        WireLearningResult {
            complete: true,
            wire_length_m,
            forward_distance_m: wire_length_m,
            reverse_distance_m: wire_length_m,
            accuracy_percent: 100.0,
            recommended_cruise_speed: cruise,
            ..WireLearningResult::default()
        }
    }

    fn stored_calibration() -> CoastingCalibration {
        CoastingCalibration::from_measurement(1.5, 2.25, 3000, 12, 2.0)
    }

    fn tick(mode: &mut AutomaticMode, hw: &mut SimTrolley, now: u64) -> Option<ModeEvent> {
        hw.step(now);
        let sensors = hw.snapshot();
        mode.update(now, hw, &sensors)
    }

    /// Tick until `done` holds or `limit_ms` passes
    fn run_until(
        mode: &mut AutomaticMode,
        hw: &mut SimTrolley,
        start_ms: u64,
        limit_ms: u64,
        done: impl Fn(&AutomaticMode) -> bool,
    ) -> (u64, Vec<ModeEvent>) {
        let mut events = Vec::new();
        let mut now = start_ms;
        while !done(mode) && now < start_ms + limit_ms {
            now += TICK_MS;
            if let Some(event) = tick(mode, hw, now) {
                events.push(event);
            }
        }
        (now, events)
    }

    #[test]
    fn test_start_preconditions() {
        let mut mode = AutomaticMode::new(AutomaticConfig::default());
        let mut hw = SimTrolley::new(60.0);
        let wire = learned(60.0, 1.5);

        let err = mode.start(0, &mut hw, false, Some(&wire), None).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotReady);

        let err = mode.start(0, &mut hw, true, None, None).unwrap_err();
        assert_eq!(err.kind, ErrorKind::PrerequisiteMissing);

        let incomplete = WireLearningResult {
            complete: false,
            ..wire
        };
        let err = mode.start(0, &mut hw, true, Some(&incomplete), None).unwrap_err();
        assert_eq!(err.kind, ErrorKind::PrerequisiteMissing);

        let short = learned(1.0, 1.5);
        let err = mode.start(0, &mut hw, true, Some(&short), None).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);

        assert_eq!(mode.state(), AutomaticState::Idle);
        mode.start(0, &mut hw, true, Some(&wire), None).unwrap();
        assert_eq!(mode.state(), AutomaticState::Initializing);
    }

    #[test]
    fn test_calibrates_then_cycles() {
        let config = AutomaticConfig {
            max_cycles: 2,
            ..AutomaticConfig::default()
        };
        let approach = config.approach_speed;
        let mut mode = AutomaticMode::new(config);
        let mut hw = SimTrolley::new(60.0);
        hw.coast_decel = 0.5;

        mode.start(0, &mut hw, true, Some(&learned(60.0, 1.5)), None).unwrap();

        let mut events = Vec::new();
        let mut now = 0;
        while mode.is_active() && now < 1_000_000 {
            now += TICK_MS;
            if let Some(event) = tick(&mut mode, &mut hw, now) {
                events.push(event);
            }
            // Holds during the calibration run too (margin alone until calibrated)
            if hw.commanded_speed() > approach + 1e-3 {
                let progress = mode.progress();
                assert!(progress.distance_to_end_m > mode.coast_start_distance());
            }
        }

        assert_eq!(mode.state(), AutomaticState::Complete);
        let calibrations: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                ModeEvent::CoastingCalibrated(c) => Some(*c),
                _ => None,
            })
            .collect();
        assert_eq!(calibrations.len(), 1);
        let calibration = calibrations[0];
        assert!(calibration.coasting_distance_m > 2.5 && calibration.coasting_distance_m < 4.0);
        assert!(calibration.coast_start_distance_m > calibration.coasting_distance_m);
        assert!(!events.iter().any(|e| matches!(e, ModeEvent::Fault(_))));

        let results = mode.results();
        assert_eq!(results.total_cycles, 2);
        assert_eq!(results.total_runs, 4);
        assert!(!results.interrupted_by_user);
        assert_eq!(results.completion_reason.as_str(), "Maximum cycles reached");
        assert!(results.total_distance_m > 200.0);
        assert!(results.average_cycle_time_ms > 0.0);
        assert!(!hw.is_armed());
    }

    #[test]
    fn test_stored_calibration_skips_measurement() {
        let mut mode = AutomaticMode::new(AutomaticConfig::default());
        let mut hw = SimTrolley::new(60.0);
        mode.start(0, &mut hw, true, Some(&learned(60.0, 1.5)), Some(stored_calibration()))
            .unwrap();

        let (_, events) = run_until(&mut mode, &mut hw, 0, 20_000, |m| {
            m.state() == AutomaticState::Cruising
        });
        assert!(events.is_empty());
        assert_eq!(mode.state(), AutomaticState::Cruising);
        assert!((hw.commanded_speed() - 1.5).abs() < 1e-4);
    }

    #[test]
    fn test_cruise_limited_by_hardware() {
        let mut mode = AutomaticMode::new(AutomaticConfig::default());
        let mut hw = SimTrolley::new(200.0);
        mode.start(0, &mut hw, true, Some(&learned(200.0, 4.5)), Some(stored_calibration()))
            .unwrap();
        assert!((mode.progress().cruise_speed - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_interrupt_stops_immediately() {
        let mut mode = AutomaticMode::new(AutomaticConfig::default());
        let mut hw = SimTrolley::new(60.0);
        mode.start(0, &mut hw, true, Some(&learned(60.0, 1.5)), Some(stored_calibration()))
            .unwrap();
        let (now, _) = run_until(&mut mode, &mut hw, 0, 20_000, |m| {
            m.state() == AutomaticState::Cruising
        });

        mode.interrupt(&mut hw);
        assert_eq!(mode.state(), AutomaticState::StoppingInterrupted);
        assert_eq!(hw.commanded_speed(), 0.0);
        assert_eq!(hw.emergency_stops, 1);
        assert!(!hw.is_armed());

        tick(&mut mode, &mut hw, now + TICK_MS);
        assert_eq!(mode.state(), AutomaticState::Complete);
        let results = mode.results();
        assert!(results.interrupted_by_user);
        assert_eq!(results.completion_reason.as_str(), "Interrupted by user");
    }

    #[test]
    fn test_graceful_stop_finishes_run() {
        let mut mode = AutomaticMode::new(AutomaticConfig::default());
        let mut hw = SimTrolley::new(60.0);
        mode.start(0, &mut hw, true, Some(&learned(60.0, 1.5)), Some(stored_calibration()))
            .unwrap();
        let (now, _) = run_until(&mut mode, &mut hw, 0, 10_000, |_| false);

        mode.stop(&mut hw);
        assert!(mode.is_active());
        assert!(hw.commanded_speed() > 0.0);

        run_until(&mut mode, &mut hw, now, 300_000, |m| !m.is_active());
        assert_eq!(mode.state(), AutomaticState::Complete);
        let results = mode.results();
        assert_eq!(results.total_runs, 1);
        assert_eq!(results.completion_reason.as_str(), "Stopped by user");
        assert!(!results.interrupted_by_user);
    }

    #[test]
    fn test_short_wire_cuts_power_before_calibrating() {
        let config = AutomaticConfig {
            max_cycles: 1,
            ..AutomaticConfig::default()
        };
        let approach = config.approach_speed;
        let margin = config.safety_margin_m;
        let mut mode = AutomaticMode::new(config);
        let mut hw = SimTrolley::new(3.0);
        hw.coast_decel = 0.5;
        mode.start(0, &mut hw, true, Some(&learned(3.0, 1.5)), None).unwrap();

        let mut events = Vec::new();
        let mut now = 0;
        while mode.is_active() && now < 300_000 {
            now += TICK_MS;
            if let Some(event) = tick(&mut mode, &mut hw, now) {
                events.push(event);
            }
            if hw.commanded_speed() > approach + 1e-3 {
                let to_end = mode.progress().distance_to_end_m;
                assert!(
                    to_end > margin,
                    "{} m/s commanded {} m from the wire end",
                    hw.commanded_speed(),
                    to_end
                );
            }
        }

        assert_eq!(mode.state(), AutomaticState::Complete);
        assert!(!events.iter().any(|e| matches!(e, ModeEvent::Fault(_))));
        assert!(!events
            .iter()
            .any(|e| matches!(e, ModeEvent::CoastingCalibrated(_))));
        assert!(mode.coasting().is_none());
        assert_eq!(mode.results().total_runs, 2);
        assert_eq!(mode.progress().error_count, 0);
    }

    #[test]
    fn test_run_timeout() {
        let config = AutomaticConfig {
            run_timeout_ms: 10_000,
            ..AutomaticConfig::default()
        };
        let mut mode = AutomaticMode::new(config);
        let mut hw = SimTrolley::new(60.0);
        mode.start(0, &mut hw, true, Some(&learned(60.0, 1.5)), Some(stored_calibration()))
            .unwrap();

        let (_, events) = run_until(&mut mode, &mut hw, 0, 60_000, |m| !m.is_active());
        assert_eq!(mode.state(), AutomaticState::Error);
        assert!(matches!(events.as_slice(), [ModeEvent::Fault(e)] if e.kind == ErrorKind::Timeout));
        assert_eq!(mode.error_message(), "Automatic run timeout");
    }

    #[test]
    fn test_coasting_distance_calculation() {
        let mut mode = AutomaticMode::new(AutomaticConfig::default());
        // Safety margin alone when uncalibrated
        assert!((mode.calculate_coasting_distance(10.0) - 8.0).abs() < 1e-6);
        assert_eq!(mode.calculate_coasting_distance(1.0), 0.0);

        let mut hw = SimTrolley::new(60.0);
        let calibration = stored_calibration();
        mode.start(0, &mut hw, true, Some(&learned(60.0, 1.5)), Some(calibration))
            .unwrap();
        let expected = 10.0 - calibration.coast_start_distance_m;
        assert!((mode.calculate_coasting_distance(10.0) - expected).abs() < 1e-6);
    }

    #[test]
    fn test_emergency_moves_to_error() {
        let mut mode = AutomaticMode::new(AutomaticConfig::default());
        let mut hw = SimTrolley::new(60.0);
        mode.start(0, &mut hw, true, Some(&learned(60.0, 1.5)), Some(stored_calibration()))
            .unwrap();
        run_until(&mut mode, &mut hw, 0, 5_000, |_| false);

        mode.handle_emergency(&mut hw);
        mode.handle_emergency(&mut hw);
        assert_eq!(mode.state(), AutomaticState::Error);
        assert_eq!(hw.emergency_stops, 1);
        assert_eq!(hw.commanded_speed(), 0.0);
    }
}
