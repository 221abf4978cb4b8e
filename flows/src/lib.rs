//! Stateful client flows: session polling, location watching, and the
//! attendance submission state machine. Each flow is generic over a small
//! trait seam (its data source and, where timing matters, a clock) so tests
//! drive it without a network or real time.

use chrono::{DateTime, Utc};

pub mod location;
pub mod poller;
pub mod submit;

pub use location::{FixSource, LocationError, LocationReader, LocationWatch, RawFix};
pub use poller::{SessionPoller, SessionSource, POLL_INTERVAL_SECS};
pub use submit::{AttendanceApi, AttendanceSubmitter, Phase, TOO_FAR_MESSAGE};

pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
