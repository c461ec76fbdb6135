//! Wire learning state machine
//!
//! Pure transitions; the driver in [`super::mode`] performs the motor
//! calls when the state changes.

/// Wire learning states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LearningState {
    Idle,
    /// Waiting for the ESC to arm
    Initializing,
    /// Measuring the forward traversal
    Forward,
    /// Stationary at the forward end
    DirectionPause,
    /// One-time coast-out measurement at the start of the reverse leg
    CoastingCalibration,
    /// Measuring the reverse traversal
    Reverse,
    CalculatingResults,
    Complete,
    Failed,
    /// Coming to rest after a graceful stop
    Stopping,
}

/// Events that drive the wire learning state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LearningEvent {
    Start,
    EscArmed,
    /// A wire end was detected for the current direction
    DirectionEnded,
    PauseElapsed,
    BeginCalibration,
    CalibrationFinished,
    ResultsAccepted,
    ResultsRejected,
    StopGraceful,
    StopImmediate,
    /// Trolley at rest after a graceful stop
    Halted,
    Fault,
}

impl LearningState {
    /// A run is in progress
    pub fn is_active(&self) -> bool {
        !matches!(
            self,
            LearningState::Idle | LearningState::Complete | LearningState::Failed
        )
    }

    /// The trolley is driven in this state
    pub fn motor_allowed(&self) -> bool {
        matches!(
            self,
            LearningState::Forward | LearningState::Reverse | LearningState::CoastingCalibration
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LearningState::Complete | LearningState::Failed)
    }

    /// Overall progress, or -1 when stopped or failed
    pub fn progress_percent(&self) -> i8 {
        match self {
            LearningState::Idle => 0,
            LearningState::Initializing => 5,
            LearningState::Forward => 35,
            LearningState::DirectionPause => 50,
            LearningState::CoastingCalibration => 60,
            LearningState::Reverse => 85,
            LearningState::CalculatingResults => 95,
            LearningState::Complete => 100,
            LearningState::Failed | LearningState::Stopping => -1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LearningState::Idle => "Idle",
            LearningState::Initializing => "Initializing",
            LearningState::Forward => "Learning forward",
            LearningState::DirectionPause => "Direction pause",
            LearningState::CoastingCalibration => "Coasting calibration",
            LearningState::Reverse => "Learning reverse",
            LearningState::CalculatingResults => "Calculating results",
            LearningState::Complete => "Complete",
            LearningState::Failed => "Failed",
            LearningState::Stopping => "Stopping",
        }
    }

    /// Process an event and return the next state
    pub fn transition(self, event: LearningEvent) -> Self {
        use LearningEvent::*;
        use LearningState::*;

        match (self, event) {
            // A finished or idle learner may start again
            (Idle | Complete | Failed, Start) => Initializing,

            (Initializing, EscArmed) => Forward,

            (Forward, DirectionEnded) => DirectionPause,
            (DirectionPause, PauseElapsed) => Reverse,
            (DirectionPause, BeginCalibration) => CoastingCalibration,
            (CoastingCalibration, CalibrationFinished) => Reverse,
            // The wire end can be reached while calibrating
            (CoastingCalibration, DirectionEnded) => CalculatingResults,
            (Reverse, DirectionEnded) => CalculatingResults,

            (CalculatingResults, ResultsAccepted) => Complete,
            (CalculatingResults, ResultsRejected) => Failed,

            (Stopping, Halted) => Idle,

            (s, StopImmediate) if s.is_active() => Idle,
            (s, StopGraceful) if s.is_active() => Stopping,
            (s, Fault) if s.is_active() => Failed,

            _ => self,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut state = LearningState::Idle;
        for event in [
            LearningEvent::Start,
            LearningEvent::EscArmed,
            LearningEvent::DirectionEnded,
            LearningEvent::PauseElapsed,
            LearningEvent::DirectionEnded,
            LearningEvent::ResultsAccepted,
        ] {
            state = state.transition(event);
        }
        assert_eq!(state, LearningState::Complete);
        assert!(!state.is_active());
    }

    #[test]
    fn test_calibration_branch() {
        let state = LearningState::DirectionPause.transition(LearningEvent::BeginCalibration);
        assert_eq!(state, LearningState::CoastingCalibration);
        assert_eq!(
            state.transition(LearningEvent::CalibrationFinished),
            LearningState::Reverse
        );
        assert_eq!(
            state.transition(LearningEvent::DirectionEnded),
            LearningState::CalculatingResults
        );
    }

    #[test]
    fn test_stops_from_active_states() {
        for state in [
            LearningState::Initializing,
            LearningState::Forward,
            LearningState::DirectionPause,
            LearningState::Reverse,
        ] {
            assert_eq!(state.transition(LearningEvent::StopImmediate), LearningState::Idle);
            assert_eq!(state.transition(LearningEvent::StopGraceful), LearningState::Stopping);
            assert_eq!(state.transition(LearningEvent::Fault), LearningState::Failed);
        }
        assert_eq!(
            LearningState::Stopping.transition(LearningEvent::Halted),
            LearningState::Idle
        );
    }

    #[test]
    fn test_inactive_states_ignore_stop() {
        assert_eq!(
            LearningState::Complete.transition(LearningEvent::StopImmediate),
            LearningState::Complete
        );
        assert_eq!(
            LearningState::Idle.transition(LearningEvent::Fault),
            LearningState::Idle
        );
    }

    #[test]
    fn test_rejected_results_fail() {
        assert_eq!(
            LearningState::CalculatingResults.transition(LearningEvent::ResultsRejected),
            LearningState::Failed
        );
    }

    #[test]
    fn test_progress_table() {
        assert_eq!(LearningState::Idle.progress_percent(), 0);
        assert_eq!(LearningState::Reverse.progress_percent(), 85);
        assert_eq!(LearningState::Complete.progress_percent(), 100);
        assert_eq!(LearningState::Failed.progress_percent(), -1);
    }
}
