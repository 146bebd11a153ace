pub mod clock;
pub mod hash;
pub mod log_redaction;

pub use clock::{Clock, ManualClock, SystemClock};
