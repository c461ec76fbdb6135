//! Mode arbitration
//!
//! The coordinator decides which mode may run, gates activation on sensor
//! validation and learned data, routes stop and emergency stop to the
//! active mode, and keeps the rolling error counter that locks the system
//! out after repeated faults.
//!
//! It does not own the mode drivers. The caller passes the [`ModeSet`] and
//! the motion hardware into every operation that needs them, so the only
//! cross-mode data the coordinator holds is what the producing mode pushed
//! to it (the wire learning result and the coasting calibration).

use core::fmt::{self, Write};

use crate::config::{CoastingCalibration, CoordinatorConfig, WireLearningResult};
use crate::error::Error;
use crate::modes::{format_message, message, LearningState, Message, ModeSet};
use crate::safety::SensorHealthMonitor;
use crate::traits::MotionHardware;

use super::availability::{ModeAvailability, OperationMode, SensorValidationState};

/// Mode arbitration and system error tracking
#[derive(Debug, Clone)]
pub struct ModeCoordinator {
    config: CoordinatorConfig,
    current: OperationMode,
    previous: OperationMode,
    mode_start_ms: u64,
    learning_availability: ModeAvailability,
    automatic_availability: ModeAvailability,
    manual_availability: ModeAvailability,
    validation: SensorValidationState,
    validation_start_ms: Option<u64>,
    sensors_validated: bool,
    hardware_ready: bool,
    wire_learning: Option<WireLearningResult>,
    coasting: Option<CoastingCalibration>,
    error_count: u32,
    last_error_ms: u64,
    /// Set when the error counter hit the maximum; cleared explicitly
    locked_out: bool,
    mode_status: Message,
    error: Message,
    now_ms: u64,
}

impl ModeCoordinator {
    pub fn new(config: CoordinatorConfig) -> Self {
        Self {
            config,
            current: OperationMode::None,
            previous: OperationMode::None,
            mode_start_ms: 0,
            learning_availability: ModeAvailability::BlockedSensors,
            automatic_availability: ModeAvailability::BlockedWireLearningRequired,
            manual_availability: ModeAvailability::BlockedSensors,
            validation: SensorValidationState::NotStarted,
            validation_start_ms: None,
            sensors_validated: false,
            hardware_ready: false,
            wire_learning: None,
            coasting: None,
            error_count: 0,
            last_error_ms: 0,
            locked_out: false,
            mode_status: message("System initializing"),
            error: Message::new(),
            now_ms: 0,
        }
    }

    /// Recompute validation state, system health and availability
    pub fn update(
        &mut self,
        now_ms: u64,
        monitor: &mut SensorHealthMonitor,
        hardware_ready: bool,
        modes: &ModeSet,
    ) {
        self.now_ms = now_ms;
        self.hardware_ready = hardware_ready;

        if monitor.stage().is_validating() {
            let start = *self.validation_start_ms.get_or_insert(now_ms);
            if now_ms.saturating_sub(start) > self.config.validation_timeout_ms as u64 {
                monitor.abort_validation(now_ms);
            }
        } else {
            self.validation_start_ms = None;
        }
        self.sync_validation(monitor);

        if !self.locked_out
            && self.error_count > 0
            && now_ms.saturating_sub(self.last_error_ms) > self.config.error_reset_ms as u64
        {
            self.error_count = 0;
            self.error.clear();
        }

        self.refresh(modes);
    }

    /// Stop whatever runs and start `mode`
    ///
    /// Rejected unless the mode is available. The automatic prerequisite
    /// is checked before anything else.
    pub fn activate<H: MotionHardware>(
        &mut self,
        mode: OperationMode,
        now_ms: u64,
        modes: &mut ModeSet,
        hw: &mut H,
    ) -> Result<(), Error> {
        self.now_ms = now_ms;
        match self.compute(mode, modes) {
            Some(ModeAvailability::Available) => {}
            Some(ModeAvailability::BlockedWireLearningRequired) => {
                return Err(Error::prerequisite_missing("Wire learning required"))
            }
            Some(ModeAvailability::BlockedSensors) => {
                return Err(Error::not_ready("Sensors not validated"))
            }
            Some(ModeAvailability::BlockedSystemError) => {
                return Err(Error::not_ready("System error - clear errors first"))
            }
            Some(ModeAvailability::Active | ModeAvailability::Stopping) => {
                return Err(Error::invalid_state("Mode already active"))
            }
            None => return Err(Error::invalid_argument("No mode selected")),
        }

        self.halt_all(modes, hw);

        let ready = self.sensors_validated;
        let result = match mode {
            OperationMode::WireLearning => modes.learning.start(now_ms, hw, ready),
            OperationMode::Automatic => modes.automatic.start(
                now_ms,
                hw,
                ready,
                self.wire_learning.as_ref(),
                self.coasting,
            ),
            OperationMode::Manual => modes.manual.start(now_ms, hw, ready),
            OperationMode::None => Ok(()),
        };
        if let Err(e) = result {
            self.error = message(e.reason);
        }
        self.refresh(modes);
        result
    }

    /// Route a stop to the active mode
    ///
    /// Graceful stops let the mode finish its current run or direction.
    pub fn stop_current<H: MotionHardware>(
        &mut self,
        immediate: bool,
        modes: &mut ModeSet,
        hw: &mut H,
    ) {
        match active_mode(modes) {
            OperationMode::WireLearning => modes.learning.stop(immediate, hw),
            OperationMode::Automatic if immediate => modes.automatic.interrupt(hw),
            OperationMode::Automatic => modes.automatic.stop(hw),
            OperationMode::Manual => modes.manual.stop(hw),
            OperationMode::None => {}
        }
        self.refresh(modes);
    }

    /// Force neutral, fault every mode and disarm
    ///
    /// Safe to call repeatedly; later calls leave the same state.
    pub fn emergency_stop<H: MotionHardware>(&mut self, modes: &mut ModeSet, hw: &mut H) {
        hw.emergency_stop();
        modes.learning.handle_emergency(hw);
        modes.automatic.handle_emergency(hw);
        modes.manual.handle_emergency(hw);
        let _ = hw.disarm();
        self.error = message("Emergency stop activated");
        self.refresh(modes);
    }

    /// Count a mode-fatal error; too many forces an emergency stop
    pub fn report_error<H: MotionHardware>(
        &mut self,
        now_ms: u64,
        error: Error,
        modes: &mut ModeSet,
        hw: &mut H,
    ) {
        self.now_ms = now_ms;
        self.error_count += 1;
        self.last_error_ms = now_ms;
        self.error = format_message(format_args!("{}", error));

        if self.error_count >= self.config.max_system_errors {
            self.emergency_stop(modes, hw);
            self.locked_out = true;
            self.error = message("Maximum error count reached - clear errors to continue");
        }
    }

    pub fn clear_errors(&mut self) {
        self.error_count = 0;
        self.locked_out = false;
        self.error.clear();
    }

    /// Emergency stop, then forget learned data and sensor validation
    pub fn reset_system<H: MotionHardware>(
        &mut self,
        modes: &mut ModeSet,
        hw: &mut H,
        monitor: &mut SensorHealthMonitor,
    ) {
        self.emergency_stop(modes, hw);
        modes.manual.stop(hw);
        modes.learning.clear();
        modes.automatic.clear();
        self.wire_learning = None;
        self.coasting = None;
        self.reset_sensor_validation(monitor);
        self.clear_errors();
        hw.reset_position();
        self.refresh(modes);
    }

    // Sensor validation

    pub fn start_sensor_validation(&mut self, now_ms: u64, monitor: &mut SensorHealthMonitor) {
        monitor.begin_validation(now_ms);
        self.validation_start_ms = Some(now_ms);
        self.sync_validation(monitor);
    }

    /// Operator saw the wheel rotation register
    pub fn confirm_hall_sensor(
        &mut self,
        now_ms: u64,
        monitor: &mut SensorHealthMonitor,
    ) -> Result<(), Error> {
        let result = monitor.confirm_rotation(now_ms);
        self.sync_validation(monitor);
        result
    }

    /// Operator saw the shake register
    pub fn confirm_accelerometer(
        &mut self,
        now_ms: u64,
        monitor: &mut SensorHealthMonitor,
    ) -> Result<(), Error> {
        let result = monitor.confirm_shake(now_ms);
        self.sync_validation(monitor);
        result
    }

    pub fn reset_sensor_validation(&mut self, monitor: &mut SensorHealthMonitor) {
        monitor.reset_validation();
        self.validation_start_ms = None;
        self.sync_validation(monitor);
    }

    // Learned data pushed by the modes

    pub fn set_wire_learning_results(&mut self, result: WireLearningResult) {
        self.wire_learning = Some(result);
    }

    /// The stored result, only once complete
    pub fn wire_learning_results(&self) -> Option<&WireLearningResult> {
        self.wire_learning.as_ref().filter(|r| r.complete)
    }

    pub fn set_coasting_data(&mut self, calibration: CoastingCalibration) {
        self.coasting = Some(calibration);
    }

    pub fn coasting_data(&self) -> Option<&CoastingCalibration> {
        self.coasting.as_ref()
    }

    // Queries

    pub fn current_mode(&self) -> OperationMode {
        self.current
    }

    pub fn previous_mode(&self) -> OperationMode {
        self.previous
    }

    /// Time since the current mode became active
    pub fn mode_elapsed_ms(&self) -> u64 {
        if self.current == OperationMode::None {
            return 0;
        }
        self.now_ms.saturating_sub(self.mode_start_ms)
    }

    /// Availability as of the last update; `None` for [`OperationMode::None`]
    pub fn availability(&self, mode: OperationMode) -> Option<ModeAvailability> {
        match mode {
            OperationMode::WireLearning => Some(self.learning_availability),
            OperationMode::Automatic => Some(self.automatic_availability),
            OperationMode::Manual => Some(self.manual_availability),
            OperationMode::None => None,
        }
    }

    pub fn is_mode_available(&self, mode: OperationMode) -> bool {
        self.availability(mode) == Some(ModeAvailability::Available)
    }

    pub fn validation_state(&self) -> SensorValidationState {
        self.validation
    }

    pub fn sensors_validated(&self) -> bool {
        self.sensors_validated
    }

    pub fn is_system_healthy(&self) -> bool {
        self.hardware_ready && !self.locked_out && self.error_count < self.config.max_system_errors
    }

    pub fn is_locked_out(&self) -> bool {
        self.locked_out
    }

    /// Validated sensors, healthy system and ready hardware
    pub fn is_motion_safe(&self) -> bool {
        self.sensors_validated && self.is_system_healthy()
    }

    pub fn error_count(&self) -> u32 {
        self.error_count
    }

    pub fn error_message(&self) -> &str {
        &self.error
    }

    /// One-line summary of the active mode
    pub fn mode_status_message(&self) -> &str {
        &self.mode_status
    }

    /// Multi-line status text for the console
    pub fn write_detailed_status<W: Write>(&self, out: &mut W) -> fmt::Result {
        let wire_length = self.wire_learning_results().map_or(0.0, |r| r.wire_length_m);
        let coasting = self.coasting.map_or(0.0, |c| c.coasting_distance_m);

        writeln!(out, "=== SYSTEM STATUS ===")?;
        writeln!(out, "Current Mode: {}", self.current.as_str())?;
        writeln!(out, "Sensor Validation: {}", self.validation.as_str())?;
        writeln!(out, "Wire Learning: {}", self.learning_availability.as_str())?;
        writeln!(out, "Automatic: {}", self.automatic_availability.as_str())?;
        writeln!(out, "Manual: {}", self.manual_availability.as_str())?;
        writeln!(
            out,
            "System Health: {}",
            if self.is_system_healthy() { "Healthy" } else { "Unhealthy" }
        )?;
        writeln!(out, "Error Count: {}", self.error_count)?;
        writeln!(out, "Wire Length: {:.2} m", wire_length)?;
        writeln!(out, "Coasting Distance: {:.2} m", coasting)?;
        write!(out, "Current Status: {}", self.mode_status)
    }

    fn sync_validation(&mut self, monitor: &SensorHealthMonitor) {
        let snapshot = monitor.snapshot();
        self.validation = SensorValidationState::from_snapshot(&snapshot);
        self.sensors_validated = snapshot.ready;
    }

    fn halt_all<H: MotionHardware>(&mut self, modes: &mut ModeSet, hw: &mut H) {
        modes.learning.stop(true, hw);
        modes.automatic.abort(hw);
        modes.manual.stop(hw);
    }

    fn compute(&self, mode: OperationMode, modes: &ModeSet) -> Option<ModeAvailability> {
        let (active, stopping) = match mode {
            OperationMode::WireLearning => (
                modes.learning.is_active(),
                modes.learning.state() == LearningState::Stopping,
            ),
            OperationMode::Automatic => {
                if self.wire_learning_results().is_none() {
                    return Some(ModeAvailability::BlockedWireLearningRequired);
                }
                (
                    modes.automatic.is_active(),
                    modes.automatic.is_active() && !modes.automatic.is_running(),
                )
            }
            OperationMode::Manual => (modes.manual.is_active(), false),
            OperationMode::None => return None,
        };

        let availability = if stopping {
            ModeAvailability::Stopping
        } else if active {
            ModeAvailability::Active
        } else if !self.sensors_validated {
            ModeAvailability::BlockedSensors
        } else if !self.is_system_healthy() {
            ModeAvailability::BlockedSystemError
        } else {
            ModeAvailability::Available
        };
        Some(availability)
    }

    fn refresh(&mut self, modes: &ModeSet) {
        let active = active_mode(modes);
        if active != self.current {
            self.previous = self.current;
            self.current = active;
            self.mode_start_ms = self.now_ms;
        }

        for mode in OperationMode::ALL {
            let Some(availability) = self.compute(mode, modes) else {
                continue;
            };
            match mode {
                OperationMode::WireLearning => self.learning_availability = availability,
                OperationMode::Automatic => self.automatic_availability = availability,
                OperationMode::Manual => self.manual_availability = availability,
                OperationMode::None => {}
            }
        }

        self.mode_status = match active {
            OperationMode::WireLearning => {
                let progress = modes.learning.progress();
                format_message(format_args!(
                    "Wire Learning: {} - {:.1} m/s",
                    progress.state.as_str(),
                    progress.test_speed
                ))
            }
            OperationMode::Automatic => {
                let progress = modes.automatic.progress();
                format_message(format_args!(
                    "Automatic: Cycle {}, {}",
                    progress.cycle.cycle_number,
                    progress.state.as_str()
                ))
            }
            OperationMode::Manual => format_message(format_args!(
                "Manual: {:.1} m/s {}",
                modes.manual.target_speed(),
                if modes.manual.is_forward() { "forward" } else { "reverse" }
            )),
            OperationMode::None => message("No active mode"),
        };
    }
}

/// The mode that currently reports active
fn active_mode(modes: &ModeSet) -> OperationMode {
    if modes.learning.is_active() {
        OperationMode::WireLearning
    } else if modes.automatic.is_active() {
        OperationMode::Automatic
    } else if modes.manual.is_active() {
        OperationMode::Manual
    } else {
        OperationMode::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SensorConfig, TrolleyConfig};
    use crate::error::ErrorKind;
    use crate::modes::sim::{SimTrolley, TICK_MS};
    use crate::modes::{AutomaticState, ManualState};
    use crate::traits::AccelSample;
    use proptest::prelude::*;
    use std::string::String;
    use std::vec::Vec;

    struct Rig {
        coordinator: ModeCoordinator,
        modes: ModeSet,
        hw: SimTrolley,
        monitor: SensorHealthMonitor,
        now: u64,
    }

    impl Rig {
        fn new(validated: bool) -> Self {
            let config = TrolleyConfig::default();
            let mut monitor = SensorHealthMonitor::new(SensorConfig::default());
            if validated {
                monitor.begin_validation(0);
                monitor.record_pulse(10);
                monitor.confirm_rotation(20).unwrap();
                monitor.record_accel(AccelSample::new(0.0, 0.0, 1.5), 30);
                monitor.confirm_shake(40).unwrap();
                monitor.update(50);
                assert!(monitor.is_ready());
            }
            let mut rig = Self {
                coordinator: ModeCoordinator::new(config.coordinator),
                modes: ModeSet::new(&config),
                hw: SimTrolley::new(60.0),
                monitor,
                now: 100,
            };
            rig.coordinator
                .update(rig.now, &mut rig.monitor, true, &rig.modes);
            rig
        }

        fn activate(&mut self, mode: OperationMode) -> Result<(), Error> {
            self.coordinator
                .activate(mode, self.now, &mut self.modes, &mut self.hw)
        }

        fn tick(&mut self) {
            self.now += TICK_MS;
            self.hw.step(self.now);
            let sensors = self.hw.snapshot();
            self.modes.learning.update(self.now, &mut self.hw, &sensors);
            self.modes.automatic.update(self.now, &mut self.hw, &sensors);
            self.modes.manual.update(self.now, &mut self.hw, &sensors);
            self.coordinator
                .update(self.now, &mut self.monitor, true, &self.modes);
        }

        fn ticks(&mut self, n: usize) {
            for _ in 0..n {
                self.tick();
            }
        }

        fn learn_wire(&mut self) {
            self.coordinator.set_wire_learning_results(WireLearningResult {
                complete: true,
                wire_length_m: 60.0,
                forward_distance_m: 60.0,
                reverse_distance_m: 60.0,
                accuracy_percent: 100.0,
                recommended_cruise_speed: 1.5,
                ..WireLearningResult::default()
            });
            self.coordinator
                .set_coasting_data(CoastingCalibration::from_measurement(1.5, 2.25, 3000, 12, 2.0));
            self.coordinator
                .update(self.now, &mut self.monitor, true, &self.modes);
        }
    }

    #[test]
    fn test_modes_blocked_until_sensors_validated() {
        let mut rig = Rig::new(false);
        assert_eq!(
            rig.coordinator.availability(OperationMode::Manual),
            Some(ModeAvailability::BlockedSensors)
        );
        assert_eq!(
            rig.activate(OperationMode::Manual).unwrap_err().kind,
            ErrorKind::NotReady
        );
        assert_eq!(
            rig.activate(OperationMode::WireLearning).unwrap_err().kind,
            ErrorKind::NotReady
        );
        assert_eq!(rig.modes.active_count(), 0);
        assert!(!rig.coordinator.is_motion_safe());
    }

    #[test]
    fn test_automatic_requires_wire_learning() {
        for validated in [false, true] {
            let mut rig = Rig::new(validated);
            assert_eq!(
                rig.coordinator.availability(OperationMode::Automatic),
                Some(ModeAvailability::BlockedWireLearningRequired)
            );
            assert_eq!(
                rig.activate(OperationMode::Automatic).unwrap_err().kind,
                ErrorKind::PrerequisiteMissing
            );
        }

        // An incomplete result does not count
        let mut rig = Rig::new(true);
        rig.coordinator
            .set_wire_learning_results(WireLearningResult::default());
        rig.tick();
        assert!(rig.coordinator.wire_learning_results().is_none());
        assert_eq!(
            rig.activate(OperationMode::Automatic).unwrap_err().kind,
            ErrorKind::PrerequisiteMissing
        );
    }

    #[test]
    fn test_no_mode_selected() {
        let mut rig = Rig::new(true);
        assert_eq!(
            rig.activate(OperationMode::None).unwrap_err().kind,
            ErrorKind::InvalidArgument
        );
        assert_eq!(rig.coordinator.availability(OperationMode::None), None);
    }

    #[test]
    fn test_activation_switches_modes() {
        let mut rig = Rig::new(true);
        rig.activate(OperationMode::Manual).unwrap();
        rig.tick();
        assert_eq!(rig.coordinator.current_mode(), OperationMode::Manual);
        assert_eq!(
            rig.coordinator.availability(OperationMode::Manual),
            Some(ModeAvailability::Active)
        );
        assert_eq!(
            rig.activate(OperationMode::Manual).unwrap_err().kind,
            ErrorKind::InvalidState
        );

        rig.activate(OperationMode::WireLearning).unwrap();
        assert_eq!(rig.modes.manual.state(), ManualState::Idle);
        assert!(rig.modes.learning.is_active());
        assert_eq!(rig.modes.active_count(), 1);
        assert_eq!(rig.coordinator.current_mode(), OperationMode::WireLearning);
        assert_eq!(rig.coordinator.previous_mode(), OperationMode::Manual);
        assert!(rig
            .coordinator
            .mode_status_message()
            .starts_with("Wire Learning: "));
    }

    #[test]
    fn test_switch_away_from_automatic_is_immediate() {
        let mut rig = Rig::new(true);
        rig.learn_wire();
        rig.activate(OperationMode::Automatic).unwrap();
        rig.ticks(50);
        assert!(rig.modes.automatic.is_running());
        assert!(rig.coordinator.mode_status_message().starts_with("Automatic: Cycle 0"));

        rig.activate(OperationMode::Manual).unwrap();
        assert_eq!(rig.modes.automatic.state(), AutomaticState::Complete);
        assert!(rig.modes.manual.is_active());
        assert_eq!(rig.modes.active_count(), 1);
        assert_eq!(rig.hw.commanded, 0.0);
    }

    #[test]
    fn test_graceful_stop_reports_stopping() {
        let mut rig = Rig::new(true);
        rig.activate(OperationMode::WireLearning).unwrap();
        rig.ticks(20);
        assert!(rig.modes.learning.state().motor_allowed());

        rig.coordinator
            .stop_current(false, &mut rig.modes, &mut rig.hw);
        // The direction finishes first
        assert!(rig.modes.learning.is_active());

        rig.coordinator
            .stop_current(true, &mut rig.modes, &mut rig.hw);
        assert!(!rig.modes.learning.is_active());
        assert_eq!(rig.coordinator.current_mode(), OperationMode::None);
        assert_eq!(rig.coordinator.mode_status_message(), "No active mode");
    }

    #[test]
    fn test_emergency_stop_is_idempotent() {
        let mut rig = Rig::new(true);
        rig.activate(OperationMode::Manual).unwrap();
        rig.tick();
        let sensors = rig.hw.snapshot();
        rig.modes
            .manual
            .process_char('A', rig.now, "test", &mut rig.hw, &sensors)
            .unwrap();
        rig.ticks(10);
        rig.modes
            .manual
            .process_char('F', rig.now, "test", &mut rig.hw, &sensors)
            .unwrap();
        rig.ticks(5);
        assert!(rig.hw.commanded > 0.0);

        for _ in 0..3 {
            rig.coordinator.emergency_stop(&mut rig.modes, &mut rig.hw);
            assert_eq!(rig.hw.commanded, 0.0);
            assert!(!rig.hw.armed);
            assert_eq!(rig.modes.manual.state(), ManualState::EmergencyStop);
            assert_eq!(rig.coordinator.error_message(), "Emergency stop activated");
        }
    }

    #[test]
    fn test_error_lockout_requires_clear() {
        let mut rig = Rig::new(true);
        rig.activate(OperationMode::WireLearning).unwrap();
        rig.ticks(20);

        for _ in 0..9 {
            rig.coordinator.report_error(
                rig.now,
                Error::safety_violation("Impact detected"),
                &mut rig.modes,
                &mut rig.hw,
            );
        }
        assert!(rig.coordinator.is_system_healthy());
        assert!(rig.modes.learning.is_active());

        rig.coordinator.report_error(
            rig.now,
            Error::timeout("Wire learning timeout"),
            &mut rig.modes,
            &mut rig.hw,
        );
        assert!(rig.coordinator.is_locked_out());
        assert!(!rig.modes.learning.is_active());
        assert_eq!(rig.hw.commanded, 0.0);

        // The counter does not age out while locked
        rig.now += 60_000;
        rig.tick();
        assert_eq!(
            rig.coordinator.availability(OperationMode::Manual),
            Some(ModeAvailability::BlockedSystemError)
        );
        assert_eq!(
            rig.activate(OperationMode::Manual).unwrap_err().kind,
            ErrorKind::NotReady
        );

        rig.coordinator.clear_errors();
        rig.tick();
        assert!(rig.coordinator.is_mode_available(OperationMode::Manual));
        rig.activate(OperationMode::Manual).unwrap();
    }

    #[test]
    fn test_error_count_ages_out() {
        let mut rig = Rig::new(true);
        rig.coordinator.report_error(
            1000,
            Error::not_ready("ESC arm failed"),
            &mut rig.modes,
            &mut rig.hw,
        );
        assert_eq!(rig.coordinator.error_count(), 1);
        assert_eq!(rig.coordinator.error_message(), "Not ready: ESC arm failed");

        rig.coordinator.update(31_000, &mut rig.monitor, true, &rig.modes);
        assert_eq!(rig.coordinator.error_count(), 1);
        rig.coordinator.update(31_001, &mut rig.monitor, true, &rig.modes);
        assert_eq!(rig.coordinator.error_count(), 0);
        assert_eq!(rig.coordinator.error_message(), "");
    }

    #[test]
    fn test_hardware_not_ready_blocks_modes() {
        let mut rig = Rig::new(true);
        rig.coordinator.update(200, &mut rig.monitor, false, &rig.modes);
        assert_eq!(
            rig.coordinator.availability(OperationMode::WireLearning),
            Some(ModeAvailability::BlockedSystemError)
        );
        assert!(!rig.coordinator.is_motion_safe());
    }

    #[test]
    fn test_guided_validation_flow() {
        let mut rig = Rig::new(false);
        rig.coordinator
            .start_sensor_validation(1000, &mut rig.monitor);
        assert_eq!(
            rig.coordinator.validation_state(),
            SensorValidationState::InProgress
        );
        assert_eq!(
            rig.coordinator
                .confirm_hall_sensor(1100, &mut rig.monitor)
                .unwrap_err()
                .kind,
            ErrorKind::InvalidState
        );

        rig.monitor.record_pulse(1200);
        rig.coordinator.update(1300, &mut rig.monitor, true, &rig.modes);
        assert_eq!(
            rig.coordinator.validation_state(),
            SensorValidationState::HallPending
        );
        rig.coordinator
            .confirm_hall_sensor(1400, &mut rig.monitor)
            .unwrap();
        assert_eq!(
            rig.coordinator.validation_state(),
            SensorValidationState::AccelPending
        );

        rig.monitor
            .record_accel(AccelSample::new(0.0, 0.0, 1.5), 1500);
        rig.coordinator
            .confirm_accelerometer(1600, &mut rig.monitor)
            .unwrap();
        rig.monitor.update(1700);
        rig.coordinator.update(1700, &mut rig.monitor, true, &rig.modes);
        assert_eq!(
            rig.coordinator.validation_state(),
            SensorValidationState::Complete
        );
        assert!(rig.coordinator.sensors_validated());
        assert!(rig.coordinator.is_mode_available(OperationMode::Manual));
    }

    #[test]
    fn test_validation_overall_timeout() {
        let mut rig = Rig::new(false);
        rig.coordinator.start_sensor_validation(0, &mut rig.monitor);
        rig.monitor.record_pulse(100);
        rig.coordinator
            .confirm_hall_sensor(30_000, &mut rig.monitor)
            .unwrap();

        // The shake stage alone is well within its own budget
        rig.monitor.update(60_001);
        rig.coordinator.update(60_001, &mut rig.monitor, true, &rig.modes);
        assert_eq!(
            rig.coordinator.validation_state(),
            SensorValidationState::Failed
        );
    }

    #[test]
    fn test_reset_system() {
        let mut rig = Rig::new(true);
        rig.learn_wire();
        rig.activate(OperationMode::Automatic).unwrap();
        rig.ticks(20);

        rig.coordinator
            .reset_system(&mut rig.modes, &mut rig.hw, &mut rig.monitor);
        assert_eq!(rig.modes.active_count(), 0);
        assert_eq!(rig.modes.automatic.state(), AutomaticState::Idle);
        assert!(rig.coordinator.wire_learning_results().is_none());
        assert!(rig.coordinator.coasting_data().is_none());
        assert_eq!(
            rig.coordinator.validation_state(),
            SensorValidationState::NotStarted
        );
        assert!(!rig.coordinator.sensors_validated());
        assert_eq!(rig.coordinator.error_count(), 0);
        assert_eq!(rig.hw.position_m, 0.0);
    }

    #[test]
    fn test_detailed_status() {
        let mut rig = Rig::new(true);
        rig.learn_wire();
        let mut text = String::new();
        rig.coordinator.write_detailed_status(&mut text).unwrap();
        assert!(text.contains("Current Mode: None"));
        assert!(text.contains("Sensor Validation: Complete"));
        assert!(text.contains("Automatic: Available"));
        assert!(text.contains("Wire Length: 60.00 m"));
        assert!(text.contains("Coasting Distance: 2.25 m"));
    }

    #[derive(Debug, Clone, Copy)]
    enum Op {
        Learn,
        Automatic,
        Manual,
        StopGraceful,
        StopImmediate,
        Emergency,
        Tick(u8),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Learn),
            Just(Op::Automatic),
            Just(Op::Manual),
            Just(Op::StopGraceful),
            Just(Op::StopImmediate),
            Just(Op::Emergency),
            (1u8..40).prop_map(Op::Tick),
        ]
    }

    fn run(rig: &mut Rig, op: Op) {
        match op {
            Op::Learn => {
                let _ = rig.activate(OperationMode::WireLearning);
            }
            Op::Automatic => {
                let _ = rig.activate(OperationMode::Automatic);
            }
            Op::Manual => {
                let _ = rig.activate(OperationMode::Manual);
            }
            Op::StopGraceful => rig
                .coordinator
                .stop_current(false, &mut rig.modes, &mut rig.hw),
            Op::StopImmediate => rig
                .coordinator
                .stop_current(true, &mut rig.modes, &mut rig.hw),
            Op::Emergency => rig.coordinator.emergency_stop(&mut rig.modes, &mut rig.hw),
            Op::Tick(n) => rig.ticks(n as usize),
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_at_most_one_mode_active(ops in proptest::collection::vec(op(), 1..30)) {
            let mut rig = Rig::new(true);
            rig.learn_wire();
            for op in ops {
                run(&mut rig, op);
                prop_assert!(rig.modes.active_count() <= 1);
            }
        }

        #[test]
        fn prop_emergency_stop_idempotent(
            ops in proptest::collection::vec(op(), 0..20),
            repeats in 1usize..5,
        ) {
            let mut rig = Rig::new(true);
            rig.learn_wire();
            for op in ops {
                run(&mut rig, op);
            }

            rig.coordinator.emergency_stop(&mut rig.modes, &mut rig.hw);
            let once = (
                rig.modes.learning.state(),
                rig.modes.automatic.state(),
                rig.modes.manual.state(),
                rig.coordinator.current_mode(),
            );

            let mut seen = Vec::new();
            for _ in 0..repeats {
                rig.coordinator.emergency_stop(&mut rig.modes, &mut rig.hw);
                seen.push((
                    rig.modes.learning.state(),
                    rig.modes.automatic.state(),
                    rig.modes.manual.state(),
                    rig.coordinator.current_mode(),
                ));
                prop_assert_eq!(rig.hw.commanded, 0.0);
                prop_assert!(!rig.hw.armed);
            }
            prop_assert!(seen.iter().all(|s| *s == once));
        }
    }
}
