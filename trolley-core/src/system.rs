//! System composition root
//!
//! [`TrolleySystem`] owns one instance of every component and drives them
//! in a fixed order from [`TrolleySystem::tick`]. The firmware keeps it
//! inside its tick task; host tests drive it with synthetic pulses and
//! accelerometer samples.

use heapless::Deque;

use crate::command::{Command, CommandResponse};
use crate::config::{CoastingCalibration, TrolleyConfig, WireLearningResult};
use crate::coordinator::{ModeAvailability, ModeCoordinator, OperationMode};
use crate::error::Error;
use crate::modes::manual::ManualCommandType;
use crate::modes::{message, ModeEvent, ModeSet, Truncating};
use crate::motion::{MotionController, PulseEvent};
use crate::safety::SensorHealthMonitor;
use crate::status::{ModeDetail, SystemStatus};
use crate::traits::{Accelerometer, EscOutput, MotionHardware, SensorError};

/// Pending persistence writes kept before the oldest is dropped
const PERSIST_QUEUE_LEN: usize = 4;

/// Work for the persistence layer
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PersistRequest {
    WireLearning(WireLearningResult),
    Coasting(CoastingCalibration),
    /// Forget both stored records
    EraseAll,
}

/// All components of one trolley
pub struct TrolleySystem<E, A> {
    config: TrolleyConfig,
    motion: MotionController<E>,
    accel: A,
    accel_fault: Option<SensorError>,
    sensors: SensorHealthMonitor,
    coordinator: ModeCoordinator,
    modes: ModeSet,
    persist: Deque<PersistRequest, PERSIST_QUEUE_LEN>,
    now_ms: u64,
}

impl<E: EscOutput, A: Accelerometer> TrolleySystem<E, A> {
    /// Build the system from a checked configuration
    pub fn new(config: TrolleyConfig, esc: E, accel: A) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            config,
            motion: MotionController::new(config.hardware, esc),
            accel,
            accel_fault: None,
            sensors: SensorHealthMonitor::new(config.sensors),
            coordinator: ModeCoordinator::new(config.coordinator),
            modes: ModeSet::new(&config),
            persist: Deque::new(),
            now_ms: 0,
        })
    }

    /// Put the ESC output at neutral and compute initial availability
    pub fn init(&mut self, now_ms: u64) -> Result<(), Error> {
        self.now_ms = now_ms;
        self.motion.init()?;
        self.refresh_coordinator();
        Ok(())
    }

    /// Hand back records loaded from storage at boot
    ///
    /// Incomplete learning results are ignored.
    pub fn restore(
        &mut self,
        wire: Option<WireLearningResult>,
        coasting: Option<CoastingCalibration>,
    ) {
        if let Some(result) = wire.filter(|r| r.complete) {
            self.coordinator.set_wire_learning_results(result);
        }
        if let Some(calibration) = coasting {
            self.coordinator.set_coasting_data(calibration);
        }
        self.refresh_coordinator();
    }

    /// Single consumer for hall-sensor pulses
    pub fn record_pulse(&mut self, event: PulseEvent) {
        self.motion.record_pulse(event);
        self.sensors.record_pulse(event.timestamp_ms);
    }

    /// Run one scheduler tick
    ///
    /// Pulses up to `now_ms` must already have been passed to
    /// [`record_pulse`](Self::record_pulse).
    pub fn tick(&mut self, now_ms: u64) {
        self.now_ms = now_ms;

        match self.accel.read() {
            Ok(sample) => {
                self.accel_fault = None;
                self.sensors.record_accel(sample, now_ms);
            }
            Err(e) => {
                self.accel_fault = Some(e);
                self.sensors.record_accel_failure();
            }
        }

        self.motion.update(now_ms);
        self.sensors.update(now_ms);
        self.refresh_coordinator();

        let sensors = self.sensors.snapshot();
        let events = [
            self.modes.learning.update(now_ms, &mut self.motion, &sensors),
            self.modes.automatic.update(now_ms, &mut self.motion, &sensors),
            self.modes.manual.update(now_ms, &mut self.motion, &sensors),
        ];
        for event in events.into_iter().flatten() {
            self.handle_event(event);
        }
    }

    /// Run one command letter from `source` (console, web, ...)
    pub fn process_command(&mut self, c: char, now_ms: u64, source: &str) -> CommandResponse {
        let Some(command) = Command::from_char(c) else {
            return CommandResponse::unknown(c);
        };
        self.now_ms = now_ms;

        match command {
            Command::StartWireLearning => self.activate(
                OperationMode::WireLearning,
                "Wire learning mode activated - Trolley will move slowly to find both wire ends",
                "Failed to activate wire learning",
            ),
            Command::StartAutomatic => self.activate(
                OperationMode::Automatic,
                "Automatic mode activated - Trolley will cycle between the wire ends",
                "Failed to activate automatic mode",
            ),
            Command::StartManual => self.activate(
                OperationMode::Manual,
                "Manual mode activated - Use ARM ESC (A) before motion commands",
                "Failed to activate manual mode",
            ),
            Command::StartValidation => {
                self.coordinator
                    .start_sensor_validation(now_ms, &mut self.sensors);
                CommandResponse::ok(
                    "Sensor validation started - Step 1: ROTATE THE WHEEL by hand, then press H",
                )
            }
            Command::ConfirmHall => {
                match self.coordinator.confirm_hall_sensor(now_ms, &mut self.sensors) {
                    Ok(()) => CommandResponse::ok(
                        "Hall sensor validation confirmed - Step 2: SHAKE THE TROLLEY, then press C",
                    ),
                    Err(_) => CommandResponse::failed(
                        "Hall sensor validation not ready - ensure wheel rotation is detected first",
                    ),
                }
            }
            Command::ConfirmAccelerometer => {
                match self.coordinator.confirm_accelerometer(now_ms, &mut self.sensors) {
                    Ok(()) => {
                        self.refresh_coordinator();
                        CommandResponse::ok(
                            "Accelerometer validation confirmed - All sensors validated, modes now available",
                        )
                    }
                    Err(_) => CommandResponse::failed(
                        "Accelerometer validation not ready - ensure trolley shake is detected first",
                    ),
                }
            }
            Command::Motion(kind) => self.manual_command(kind, c, now_ms, source),
            Command::GracefulStop => {
                self.coordinator
                    .stop_current(false, &mut self.modes, &mut self.motion);
                CommandResponse::ok(
                    "Current mode stopping gracefully - Will complete current operation safely",
                )
            }
            Command::Interrupt => {
                let automatic = self.modes.automatic.is_active();
                self.coordinator
                    .stop_current(true, &mut self.modes, &mut self.motion);
                if automatic {
                    CommandResponse::ok("Automatic mode interrupted - Trolley stopping now")
                } else {
                    CommandResponse::ok("Current mode stopped immediately")
                }
            }
            Command::EmergencyStop => {
                self.emergency_stop();
                CommandResponse::ok(
                    "EMERGENCY STOP ACTIVATED - All modes stopped, motor halted immediately",
                )
            }
            Command::Reset => {
                self.reset();
                CommandResponse::ok(
                    "System reset complete - Sensor validation required before operation",
                )
            }
            Command::Status => {
                let mut response = CommandResponse::ok("");
                // Truncating never reports an error
                let _ = self
                    .status()
                    .write_summary(&mut Truncating(&mut response.message));
                response
            }
        }
    }

    /// Emergency stop from any source; safe to repeat
    pub fn emergency_stop(&mut self) {
        self.coordinator
            .emergency_stop(&mut self.modes, &mut self.motion);
    }

    /// Forget learned data and sensor validation
    pub fn reset(&mut self) {
        self.coordinator
            .reset_system(&mut self.modes, &mut self.motion, &mut self.sensors);
        self.persist.clear();
        self.queue_persist(PersistRequest::EraseAll);
    }

    pub fn clear_errors(&mut self) {
        self.coordinator.clear_errors();
        self.refresh_coordinator();
    }

    /// Next record the persistence layer should write or erase
    pub fn take_persist_request(&mut self) -> Option<PersistRequest> {
        self.persist.pop_front()
    }

    pub fn status(&self) -> SystemStatus {
        let detail = match self.coordinator.current_mode() {
            OperationMode::WireLearning => ModeDetail::WireLearning(self.modes.learning.progress()),
            OperationMode::Automatic => ModeDetail::Automatic(self.modes.automatic.progress()),
            OperationMode::Manual => ModeDetail::Manual(self.modes.manual.status(&self.motion)),
            OperationMode::None => ModeDetail::Idle,
        };

        SystemStatus {
            timestamp_ms: self.now_ms,
            mode: self.coordinator.current_mode(),
            learning_availability: self.availability(OperationMode::WireLearning),
            automatic_availability: self.availability(OperationMode::Automatic),
            manual_availability: self.availability(OperationMode::Manual),
            validation: self.coordinator.validation_state(),
            sensors: self.sensors.snapshot(),
            motion: self.motion.status(),
            healthy: self.coordinator.is_system_healthy(),
            motion_safe: self.coordinator.is_motion_safe(),
            error_count: self.coordinator.error_count(),
            wire_length_m: self
                .coordinator
                .wire_learning_results()
                .map(|r| r.wire_length_m),
            coasting_distance_m: self
                .coordinator
                .coasting_data()
                .map(|c| c.coasting_distance_m),
            detail,
            mode_status: message(self.coordinator.mode_status_message()),
            error: message(self.coordinator.error_message()),
        }
    }

    pub fn config(&self) -> &TrolleyConfig {
        &self.config
    }

    pub fn coordinator(&self) -> &ModeCoordinator {
        &self.coordinator
    }

    pub fn modes(&self) -> &ModeSet {
        &self.modes
    }

    pub fn motion(&self) -> &MotionController<E> {
        &self.motion
    }

    pub fn sensors(&self) -> &SensorHealthMonitor {
        &self.sensors
    }

    /// Last accelerometer read error, cleared by the next good read
    pub fn accel_fault(&self) -> Option<SensorError> {
        self.accel_fault
    }

    pub fn accelerometer_mut(&mut self) -> &mut A {
        &mut self.accel
    }

    fn availability(&self, mode: OperationMode) -> ModeAvailability {
        self.coordinator
            .availability(mode)
            .unwrap_or(ModeAvailability::BlockedSystemError)
    }

    fn refresh_coordinator(&mut self) {
        let ready = self.motion.is_ready();
        self.coordinator
            .update(self.now_ms, &mut self.sensors, ready, &self.modes);
    }

    fn activate(&mut self, mode: OperationMode, ok: &str, failed: &str) -> CommandResponse {
        match self
            .coordinator
            .activate(mode, self.now_ms, &mut self.modes, &mut self.motion)
        {
            Ok(()) => CommandResponse::ok(ok),
            Err(e) => CommandResponse::new(false, format_args!("{}: {}", failed, e)),
        }
    }

    fn manual_command(
        &mut self,
        kind: ManualCommandType,
        c: char,
        now_ms: u64,
        source: &str,
    ) -> CommandResponse {
        if !self.modes.manual.is_active() {
            return CommandResponse::failed("Manual mode not active");
        }

        let sensors = self.sensors.snapshot();
        let manual = &mut self.modes.manual;
        if let Err(e) = manual.process_char(c, now_ms, source, &mut self.motion, &sensors) {
            return CommandResponse::new(
                false,
                format_args!("{} rejected: {}", kind.as_str(), e.reason),
            );
        }

        let speed = manual.target_speed();
        match kind {
            ManualCommandType::ArmEsc if self.motion.is_armed() => {
                CommandResponse::ok("ESC armed - Ready for motion commands")
            }
            ManualCommandType::ArmEsc => {
                CommandResponse::ok("ESC arming started - Motion commands accepted once armed")
            }
            ManualCommandType::DisarmEsc => CommandResponse::ok("ESC disarmed - Motor disabled"),
            ManualCommandType::Forward => CommandResponse::new(
                true,
                format_args!("Moving forward at {:.1} m/s - Use +/- to adjust speed", speed),
            ),
            ManualCommandType::Backward => CommandResponse::new(
                true,
                format_args!("Moving backward at {:.1} m/s - Use +/- to adjust speed", speed),
            ),
            ManualCommandType::Stop => {
                CommandResponse::ok("Motor stopped - ESC remains armed for further commands")
            }
            ManualCommandType::IncreaseSpeed => {
                CommandResponse::new(true, format_args!("Speed increased to {:.1} m/s", speed))
            }
            ManualCommandType::DecreaseSpeed => {
                CommandResponse::new(true, format_args!("Speed decreased to {:.1} m/s", speed))
            }
            ManualCommandType::EmergencyStop | ManualCommandType::SetSpeed => {
                CommandResponse::ok(kind.as_str())
            }
        }
    }

    fn handle_event(&mut self, event: ModeEvent) {
        match event {
            ModeEvent::WireLearningComplete(result) => {
                self.coordinator.set_wire_learning_results(result);
                self.queue_persist(PersistRequest::WireLearning(result));
            }
            ModeEvent::CoastingCalibrated(calibration) => {
                self.coordinator.set_coasting_data(calibration);
                self.queue_persist(PersistRequest::Coasting(calibration));
            }
            ModeEvent::Fault(error) => {
                self.coordinator
                    .report_error(self.now_ms, error, &mut self.modes, &mut self.motion);
            }
        }
        self.refresh_coordinator();
    }

    fn queue_persist(&mut self, request: PersistRequest) {
        if self.persist.is_full() {
            self.persist.pop_front();
        }
        // Space was made above
        let _ = self.persist.push_back(request);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::SensorValidationState;
    use crate::error::ErrorKind;
    use crate::modes::ManualState;
    use crate::traits::{AccelSample, EscError};

    const TICK_MS: u64 = 20;
    const CIRCUMFERENCE: f32 = 0.1916;

    #[derive(Debug, Default)]
    struct MockEsc {
        duty: u16,
        writes: u32,
    }

    impl EscOutput for MockEsc {
        fn set_duty(&mut self, duty: u16) -> Result<(), EscError> {
            self.duty = duty;
            self.writes += 1;
            Ok(())
        }
    }

    #[derive(Debug)]
    struct MockAccel {
        sample: AccelSample,
        fail: bool,
    }

    impl Accelerometer for MockAccel {
        fn read(&mut self) -> Result<AccelSample, SensorError> {
            if self.fail {
                Err(SensorError::Bus)
            } else {
                Ok(self.sample)
            }
        }
    }

    /// System plus a wheel that turns at the commanded speed
    struct Bench {
        system: TrolleySystem<MockEsc, MockAccel>,
        now: u64,
        wheel_travel_m: f32,
        /// Wheel turns with the motor; cleared to simulate a dead sensor
        pulses: bool,
    }

    impl Bench {
        fn new() -> Self {
            let accel = MockAccel {
                sample: AccelSample::at_rest(),
                fail: false,
            };
            let mut system =
                TrolleySystem::new(TrolleyConfig::default(), MockEsc::default(), accel).unwrap();
            system.init(0).unwrap();
            Self {
                system,
                now: 0,
                wheel_travel_m: 0.0,
                pulses: true,
            }
        }

        fn validated() -> Self {
            let mut bench = Self::new();
            bench.tick();
            assert!(bench.send('V').success);
            bench.system.record_pulse(PulseEvent {
                timestamp_ms: bench.now + 5,
            });
            bench.tick();
            assert!(bench.send('H').success);
            bench.system.accelerometer_mut().sample = AccelSample::new(0.0, 0.0, 1.5);
            bench.tick();
            bench.system.accelerometer_mut().sample = AccelSample::at_rest();
            assert!(bench.send('C').success);
            bench.tick();
            assert!(bench.system.coordinator().sensors_validated());
            bench
        }

        fn send(&mut self, c: char) -> CommandResponse {
            self.system.process_command(c, self.now, "test")
        }

        fn tick(&mut self) {
            let next = self.now + TICK_MS;
            let motion = self.system.motion().status();
            if self.pulses && motion.armed && motion.commanded_speed > 0.0 {
                self.wheel_travel_m += motion.commanded_speed * TICK_MS as f32 / 1000.0;
                while self.wheel_travel_m >= CIRCUMFERENCE {
                    self.wheel_travel_m -= CIRCUMFERENCE;
                    self.system.record_pulse(PulseEvent { timestamp_ms: next - 1 });
                }
            }
            self.now = next;
            self.system.tick(self.now);
        }

        fn run_for(&mut self, ms: u64) {
            let until = self.now + ms;
            while self.now < until {
                self.tick();
            }
        }

        /// Manual mode with the ESC armed
        fn manual_armed() -> Self {
            let mut bench = Self::validated();
            assert!(bench.send('M').success);
            bench.tick();
            let response = bench.send('A');
            assert!(response.success, "{}", response.as_str());
            bench.run_for(4_200);
            assert!(bench.system.motion().is_armed());
            assert_eq!(bench.system.modes().manual.state(), ManualState::Active);
            bench
        }
    }

    fn learned_wire() -> WireLearningResult {
        WireLearningResult {
            complete: true,
            wire_length_m: 42.0,
            forward_distance_m: 42.1,
            reverse_distance_m: 41.9,
            accuracy_percent: 99.5,
            recommended_cruise_speed: 1.5,
            ..WireLearningResult::default()
        }
    }

    #[test]
    fn test_new_rejects_bad_config() {
        let mut config = TrolleyConfig::default();
        config.hardware.wheel_circumference_m = 0.0;
        let accel = MockAccel {
            sample: AccelSample::at_rest(),
            fail: false,
        };
        let err = TrolleySystem::new(config, MockEsc::default(), accel)
            .err()
            .unwrap();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_init_drives_neutral() {
        let bench = Bench::new();
        let esc = bench.system.motion().output();
        assert_eq!(esc.duty, TrolleyConfig::default().hardware.esc_neutral_duty);
        assert!(esc.writes > 0);
    }

    #[test]
    fn test_modes_blocked_before_validation() {
        let mut bench = Bench::new();
        bench.tick();

        let response = bench.send('W');
        assert!(!response.success);
        assert_eq!(
            response.as_str(),
            "Failed to activate wire learning: Not ready: Sensors not validated"
        );

        let response = bench.send('U');
        assert!(!response.success);
        assert!(response.as_str().contains("Wire learning required"));
        assert_eq!(bench.system.modes().active_count(), 0);
    }

    #[test]
    fn test_guided_validation_by_commands() {
        let mut bench = Bench::new();
        bench.tick();
        assert!(bench.send('V').success);
        assert_eq!(
            bench.system.coordinator().validation_state(),
            SensorValidationState::InProgress
        );

        // Confirmation before the wheel turns is refused
        let response = bench.send('H');
        assert!(!response.success);
        assert!(response.as_str().starts_with("Hall sensor validation not ready"));

        bench.system.record_pulse(PulseEvent {
            timestamp_ms: bench.now + 5,
        });
        bench.tick();
        assert!(bench.send('H').success);

        assert!(!bench.send('C').success);
        bench.system.accelerometer_mut().sample = AccelSample::new(0.0, 0.0, 1.5);
        bench.tick();
        assert!(bench.send('C').success);
        bench.tick();

        let status = bench.system.status();
        assert_eq!(status.validation, SensorValidationState::Complete);
        assert_eq!(status.manual_availability, ModeAvailability::Available);
        assert_eq!(status.learning_availability, ModeAvailability::Available);
        assert_eq!(
            status.automatic_availability,
            ModeAvailability::BlockedWireLearningRequired
        );
    }

    #[test]
    fn test_manual_letters_need_manual_mode() {
        let mut bench = Bench::validated();
        for c in ['A', 'D', 'F', 'B', 'S', '+', '-'] {
            let response = bench.send(c);
            assert!(!response.success);
            assert_eq!(response.as_str(), "Manual mode not active");
        }
    }

    #[test]
    fn test_unknown_command() {
        let mut bench = Bench::new();
        let response = bench.send('z');
        assert!(!response.success);
        assert!(response.as_str().starts_with("Unknown command 'z'"));
    }

    #[test]
    fn test_manual_drive_and_stop() {
        let mut bench = Bench::manual_armed();

        let response = bench.send('f');
        assert!(response.success);
        assert_eq!(
            response.as_str(),
            "Moving forward at 0.5 m/s - Use +/- to adjust speed"
        );
        bench.run_for(1_000);
        assert!((bench.system.motion().commanded_speed() - 0.5).abs() < 1e-6);
        assert!(bench.system.motion().is_forward());
        assert!(bench.system.motion().position() > 0.0);

        let response = bench.send('+');
        assert_eq!(response.as_str(), "Speed increased to 0.6 m/s");

        let response = bench.send('S');
        assert!(response.success);
        assert_eq!(bench.system.motion().commanded_speed(), 0.0);
        assert!(bench.system.motion().is_armed());
    }

    #[test]
    fn test_impact_cuts_motor_on_next_tick() {
        let mut bench = Bench::manual_armed();
        assert!(bench.send('F').success);
        for _ in 0..5 {
            bench.run_for(200);
            assert!(bench.send('+').success);
        }
        bench.run_for(500);
        assert!((bench.system.motion().commanded_speed() - 1.0).abs() < 1e-3);

        bench.system.accelerometer_mut().sample = AccelSample::new(0.0, 0.0, 2.0);
        bench.tick();

        assert_eq!(bench.system.motion().commanded_speed(), 0.0);
        assert_eq!(
            bench.system.modes().manual.state(),
            ManualState::EmergencyStop
        );
        assert_eq!(bench.system.coordinator().error_count(), 1);
    }

    #[test]
    fn test_silent_pulse_sensor_stops_manual() {
        let mut bench = Bench::manual_armed();
        bench.pulses = false;
        assert!(bench.send('F').success);
        bench.run_for(8_000);

        assert_eq!(bench.system.motion().commanded_speed(), 0.0);
        assert_eq!(
            bench.system.modes().manual.state(),
            ManualState::EmergencyStop
        );
        assert!(bench.system.coordinator().error_count() >= 1);
    }

    #[test]
    fn test_emergency_stop_command_is_idempotent() {
        let mut bench = Bench::manual_armed();
        assert!(bench.send('F').success);
        bench.run_for(200);

        assert!(bench.send('E').success);
        let first = bench.system.status();
        assert!(bench.send('e').success);
        let second = bench.system.status();

        assert_eq!(first.motion.commanded_speed, 0.0);
        assert_eq!(first.mode, second.mode);
        assert_eq!(first.error_count, second.error_count);
        assert_eq!(
            bench.system.modes().manual.state(),
            ManualState::EmergencyStop
        );
    }

    #[test]
    fn test_learning_result_is_forwarded_and_persisted() {
        let mut bench = Bench::validated();
        bench.system.handle_event(ModeEvent::WireLearningComplete(learned_wire()));

        assert_eq!(
            bench.system.take_persist_request(),
            Some(PersistRequest::WireLearning(learned_wire()))
        );
        assert_eq!(bench.system.take_persist_request(), None);

        bench.tick();
        let status = bench.system.status();
        assert_eq!(status.automatic_availability, ModeAvailability::Available);
        assert_eq!(status.wire_length_m, Some(42.0));

        let calibration = CoastingCalibration::from_measurement(1.5, 2.25, 3000, 12, 2.0);
        bench.system.handle_event(ModeEvent::CoastingCalibrated(calibration));
        assert_eq!(
            bench.system.take_persist_request(),
            Some(PersistRequest::Coasting(calibration))
        );
        assert_eq!(bench.system.status().coasting_distance_m, Some(2.25));
    }

    #[test]
    fn test_restore_unblocks_automatic() {
        let mut bench = Bench::validated();
        bench.system.restore(Some(learned_wire()), None);
        bench.tick();
        assert!(bench
            .system
            .coordinator()
            .is_mode_available(OperationMode::Automatic));

        let response = bench.send('U');
        assert!(response.success, "{}", response.as_str());
        assert!(bench.system.modes().automatic.is_active());
        assert_eq!(bench.system.modes().active_count(), 1);
    }

    #[test]
    fn test_restore_ignores_incomplete_result() {
        let mut bench = Bench::validated();
        bench.system.restore(Some(WireLearningResult::default()), None);
        bench.tick();
        assert!(bench.system.coordinator().wire_learning_results().is_none());
        assert!(!bench.send('U').success);
    }

    #[test]
    fn test_reset_requests_erase() {
        let mut bench = Bench::validated();
        bench.system.restore(Some(learned_wire()), None);
        bench.system.handle_event(ModeEvent::WireLearningComplete(learned_wire()));

        let response = bench.send('R');
        assert!(response.success);
        assert_eq!(
            bench.system.take_persist_request(),
            Some(PersistRequest::EraseAll)
        );
        assert_eq!(bench.system.take_persist_request(), None);
        assert!(!bench.system.coordinator().sensors_validated());
        assert!(bench.system.coordinator().wire_learning_results().is_none());
    }

    #[test]
    fn test_persist_queue_drops_oldest() {
        let mut bench = Bench::new();
        for i in 0..(PERSIST_QUEUE_LEN as u32 + 2) {
            let mut result = learned_wire();
            result.total_time_ms = i;
            bench.system.queue_persist(PersistRequest::WireLearning(result));
        }
        match bench.system.take_persist_request() {
            Some(PersistRequest::WireLearning(result)) => assert_eq!(result.total_time_ms, 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_accelerometer_failure_is_reported() {
        let mut bench = Bench::new();
        bench.system.accelerometer_mut().fail = true;
        bench.tick();
        assert_eq!(bench.system.accel_fault(), Some(SensorError::Bus));
        assert_eq!(
            bench.system.status().sensors.accel_status,
            crate::safety::SensorStatus::Failed
        );

        bench.system.accelerometer_mut().fail = false;
        bench.tick();
        assert_eq!(bench.system.accel_fault(), None);
    }

    #[test]
    fn test_status_line() {
        let mut bench = Bench::validated();
        let response = bench.send('T');
        assert!(response.success);
        // The validation pulse moved the position by one revolution
        assert_eq!(
            response.as_str(),
            "Status: Mode=None, Sensors=Validated, ESC=Disarmed, Speed=0.0 m/s, Position=0.2 m"
        );
    }
}
