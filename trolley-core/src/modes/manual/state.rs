//! Manual control state machine

/// Manual mode states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ManualState {
    Idle,
    Initializing,
    /// Active with the ESC disarmed
    Ready,
    EscArming,
    /// Armed and stationary
    Active,
    MovingForward,
    MovingBackward,
    Stopping,
    EscDisarming,
    Error,
    EmergencyStop,
}

/// Events that drive the manual state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ManualEvent {
    Start,
    Initialized,
    Arm,
    Armed,
    ArmFailed,
    MoveForward,
    MoveBackward,
    /// Speed set at or below the minimum step
    Halt,
    StopMotion,
    Stopped,
    Disarm,
    Disarmed,
    Emergency,
    Fault,
    /// Mode deactivated
    End,
}

impl ManualState {
    pub fn is_active(&self) -> bool {
        *self != ManualState::Idle
    }

    /// Motion commands are accepted in this state
    pub fn accepts_motion(&self) -> bool {
        matches!(
            self,
            ManualState::Active | ManualState::MovingForward | ManualState::MovingBackward
        )
    }

    pub fn is_moving(&self) -> bool {
        matches!(self, ManualState::MovingForward | ManualState::MovingBackward)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ManualState::Idle => "Idle",
            ManualState::Initializing => "Initializing",
            ManualState::Ready => "Ready",
            ManualState::EscArming => "Arming ESC",
            ManualState::Active => "Active",
            ManualState::MovingForward => "Moving forward",
            ManualState::MovingBackward => "Moving backward",
            ManualState::Stopping => "Stopping",
            ManualState::EscDisarming => "Disarming ESC",
            ManualState::Error => "Error",
            ManualState::EmergencyStop => "Emergency stop",
        }
    }

    /// Command letters that can be sent in this state
    pub fn available_commands(&self) -> &'static str {
        match self {
            ManualState::Idle => "",
            ManualState::Initializing | ManualState::EscArming | ManualState::EscDisarming => "E",
            ManualState::Ready | ManualState::Error | ManualState::EmergencyStop => "A D E",
            ManualState::Active => "F B + D E",
            ManualState::MovingForward | ManualState::MovingBackward => "F B S + - D E",
            ManualState::Stopping => "D E",
        }
    }

    /// Process an event and return the next state
    pub fn transition(self, event: ManualEvent) -> Self {
        use ManualEvent::*;
        use ManualState::*;

        match (self, event) {
            (Idle, Start) => Initializing,
            (Initializing, Initialized) => Ready,

            // Re-arming is the way out of an error or emergency stop
            (Ready | Error | EmergencyStop, Arm) => EscArming,
            (EscArming, Armed) => Active,
            (EscArming, ArmFailed) => Error,

            (Active | MovingForward | MovingBackward, MoveForward) => MovingForward,
            (Active | MovingForward | MovingBackward, MoveBackward) => MovingBackward,
            (Active | MovingForward | MovingBackward, Halt) => Active,
            (MovingForward | MovingBackward, StopMotion) => Stopping,
            (Stopping, Stopped) => Active,

            (
                EscArming | Active | MovingForward | MovingBackward | Stopping | Error
                | EmergencyStop,
                Disarm,
            ) => EscDisarming,
            (EscDisarming, Disarmed) => Ready,

            (_, End) => Idle,
            (s, Emergency) if s.is_active() => EmergencyStop,
            (s, Fault) if s.is_active() => Error,

            _ => self,
        }
    }
}
