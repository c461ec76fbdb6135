//! Embassy async tasks
//!
//! Each task runs independently and communicates via channels/signals.

pub mod console;
pub mod hall;
pub mod monitor;
pub mod persistence;
pub mod tick;

pub use console::console_task;
pub use hall::hall_task;
pub use monitor::monitor_task;
pub use persistence::persistence_task;
pub use tick::tick_task;
