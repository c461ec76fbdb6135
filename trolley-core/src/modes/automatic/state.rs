//! Automatic cycling state machine

/// Automatic mode states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AutomaticState {
    Idle,
    Initializing,
    ArmingEsc,
    /// Ramping toward cruise speed
    Accelerating,
    Cruising,
    /// First run only: measuring the coast-out distance
    CoastingCalibration,
    /// Power cut ahead of the wire end
    Coasting,
    /// Creeping the last stretch at approach speed
    WireEndApproach,
    /// Stationary at a wire end
    DirectionChange,
    /// Pause after a forward and reverse run
    CycleComplete,
    /// Coming to rest after the current run
    StoppingGraceful,
    StoppingInterrupted,
    Complete,
    Error,
}

/// Events that drive the automatic state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AutomaticEvent {
    Start,
    Initialized,
    EscArmed,
    BeginCalibration,
    CalibrationFinished,
    CruiseReached,
    /// Within coast-start distance of the wire end
    CoastPointReached,
    CoastFinished,
    /// Run over: wire end detected or approach distance covered
    WireEndReached,
    PauseElapsed,
    CycleFinished,
    CyclesExhausted,
    StopGraceful,
    Interrupt,
    /// Trolley at rest after a stop
    Halted,
    Fault,
}

impl AutomaticState {
    /// Cycling is in progress (including stopping)
    pub fn is_active(&self) -> bool {
        !matches!(
            self,
            AutomaticState::Idle | AutomaticState::Complete | AutomaticState::Error
        )
    }

    /// Active and not on the way to a stop
    pub fn is_running(&self) -> bool {
        self.is_active()
            && !matches!(
                self,
                AutomaticState::StoppingGraceful | AutomaticState::StoppingInterrupted
            )
    }

    /// The trolley is on a run in this state
    pub fn in_run(&self) -> bool {
        matches!(
            self,
            AutomaticState::Accelerating
                | AutomaticState::Cruising
                | AutomaticState::CoastingCalibration
                | AutomaticState::Coasting
                | AutomaticState::WireEndApproach
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AutomaticState::Complete | AutomaticState::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AutomaticState::Idle => "Idle",
            AutomaticState::Initializing => "Initializing",
            AutomaticState::ArmingEsc => "Arming ESC",
            AutomaticState::Accelerating => "Accelerating",
            AutomaticState::Cruising => "Cruising",
            AutomaticState::CoastingCalibration => "Coasting calibration",
            AutomaticState::Coasting => "Coasting",
            AutomaticState::WireEndApproach => "Wire end approach",
            AutomaticState::DirectionChange => "Direction change",
            AutomaticState::CycleComplete => "Cycle complete",
            AutomaticState::StoppingGraceful => "Stopping",
            AutomaticState::StoppingInterrupted => "Interrupted",
            AutomaticState::Complete => "Complete",
            AutomaticState::Error => "Error",
        }
    }

    /// Process an event and return the next state
    pub fn transition(self, event: AutomaticEvent) -> Self {
        use AutomaticEvent::*;
        use AutomaticState::*;

        match (self, event) {
            (Idle | Complete | Error, Start) => Initializing,
            (Initializing, Initialized) => ArmingEsc,
            (ArmingEsc, EscArmed) => Accelerating,

            (Accelerating, BeginCalibration) => CoastingCalibration,
            (CoastingCalibration, CalibrationFinished) => Accelerating,
            (Accelerating, CruiseReached) => Cruising,
            (Accelerating | Cruising | CoastingCalibration, CoastPointReached) => Coasting,
            (Coasting, CoastFinished) => WireEndApproach,
            (
                Accelerating | Cruising | CoastingCalibration | Coasting | WireEndApproach,
                WireEndReached,
            ) => DirectionChange,

            (DirectionChange, PauseElapsed) => Accelerating,
            (DirectionChange, CycleFinished) => CycleComplete,
            (CycleComplete, PauseElapsed) => Accelerating,
            (CycleComplete, CyclesExhausted) => Complete,

            (StoppingGraceful | StoppingInterrupted, Halted) => Complete,

            (s, Interrupt) if s.is_active() => StoppingInterrupted,
            (s, StopGraceful) if s.is_running() => StoppingGraceful,
            (s, Fault) if s.is_active() => Error,

            _ => self,
        }
    }
}
