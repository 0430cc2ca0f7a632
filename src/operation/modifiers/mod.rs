//! Standard modifiers shipped with the runtime, plus the ambient `log_duration`.

pub mod controller;
pub mod default_value;
pub mod deduplicate;
pub mod enable_automatic_running;
pub mod log_duration;
pub mod rerun_on_change;
pub mod retry;
pub mod stale_when;

pub use controller::WithController;
pub use default_value::DefaultValue;
pub use deduplicate::Deduplicate;
pub use enable_automatic_running::EnableAutomaticRunning;
pub use log_duration::LogDuration;
pub use rerun_on_change::RerunOnChange;
pub use retry::Retry;
pub use stale_when::StaleWhen;
