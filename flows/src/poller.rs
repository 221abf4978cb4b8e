//! QR session polling and countdown.

use api_client::{ApiError, AttendClient};
use domain::QrSession;
use tracing::{debug, warn};

use crate::Clock;

/// Sessions are refreshed on this fixed interval even if the countdown has
/// not run out yet.
pub const POLL_INTERVAL_SECS: i64 = 120;

pub trait SessionSource {
    async fn generate(
        &self,
        venue_id: Option<i64>,
        duration_minutes: u32,
    ) -> Result<QrSession, ApiError>;
}

impl SessionSource for AttendClient {
    async fn generate(
        &self,
        venue_id: Option<i64>,
        duration_minutes: u32,
    ) -> Result<QrSession, ApiError> {
        self.generate_session(venue_id, duration_minutes).await
    }
}

/// Holds the current QR session and replaces it on a fixed interval, on
/// countdown expiry, or on an explicit user refresh.
///
/// Each dispatch gets a monotonically increasing sequence number and a
/// response is installed only if no newer dispatch happened meanwhile, so a
/// slow in-flight request can never clobber a fresher session.
pub struct SessionPoller<S, C> {
    source: S,
    clock: C,
    duration_minutes: u32,
    venue_id: Option<i64>,
    session: Option<QrSession>,
    error: Option<String>,
    last_dispatch: Option<chrono::DateTime<chrono::Utc>>,
    latest_seq: u64,
}

impl<S: SessionSource, C: Clock> SessionPoller<S, C> {
    pub fn new(source: S, clock: C, duration_minutes: u32) -> Self {
        Self {
            source,
            clock,
            duration_minutes,
            venue_id: None,
            session: None,
            error: None,
            last_dispatch: None,
            latest_seq: 0,
        }
    }

    pub fn session(&self) -> Option<&QrSession> {
        self.session.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn venue_id(&self) -> Option<i64> {
        self.venue_id
    }

    /// Clamped seconds until the current session expires; 0 when none is
    /// held.
    pub fn remaining_seconds(&self) -> i64 {
        self.session
            .as_ref()
            .map(|s| s.remaining_seconds(self.clock.now()))
            .unwrap_or(0)
    }

    /// Record a dispatch; returns the sequence number the response must carry
    /// to be installed.
    pub fn begin_refresh(&mut self) -> u64 {
        self.latest_seq += 1;
        self.last_dispatch = Some(self.clock.now());
        self.latest_seq
    }

    /// Install a response if it is still the newest dispatch. Stale responses
    /// are dropped. Failures keep the previous session visible and surface a
    /// message; there is no automatic retry.
    pub fn complete_refresh(
        &mut self,
        seq: u64,
        result: Result<QrSession, ApiError>,
    ) -> bool {
        if seq != self.latest_seq {
            debug!(seq, latest = self.latest_seq, "dropping stale session response");
            return false;
        }
        match result {
            Ok(session) => {
                debug!(session_id = %session.session_id, "installed new QR session");
                self.session = Some(session);
                self.error = None;
            }
            Err(e) => {
                warn!("session refresh failed: {e}");
                self.error = Some(e.user_message());
            }
        }
        true
    }

    /// One full refresh, optionally scoped to a venue. Also the manual
    /// refresh entry point.
    pub async fn refresh(&mut self, venue_id: Option<i64>) {
        self.venue_id = venue_id;
        let seq = self.begin_refresh();
        let result = self.source.generate(venue_id, self.duration_minutes).await;
        self.complete_refresh(seq, result);
    }

    /// Whether the scheduled task should fire: never refreshed yet, the poll
    /// interval elapsed, or the countdown ran out. Dispatch time (not
    /// completion) is what resets the schedule, so a failed refresh does not
    /// hot-loop.
    pub fn refresh_due(&self) -> bool {
        let Some(dispatched) = self.last_dispatch else {
            return true;
        };
        let elapsed = (self.clock.now() - dispatched).num_seconds();
        if elapsed >= POLL_INTERVAL_SECS {
            return true;
        }
        self.session.is_some() && elapsed > 0 && self.remaining_seconds() == 0
    }

    /// The cancellable scheduled task body: call this on a timer tick and it
    /// refreshes at most once.
    pub async fn tick(&mut self) {
        if self.refresh_due() {
            self.refresh(self.venue_id).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    use chrono::{DateTime, Duration, Utc};

    use super::*;
    use crate::testing::ManualClock;

    struct FakeSource {
        responses: RefCell<VecDeque<Result<QrSession, ApiError>>>,
        calls: Cell<usize>,
    }

    impl FakeSource {
        fn new(responses: Vec<Result<QrSession, ApiError>>) -> Self {
            Self {
                responses: RefCell::new(responses.into()),
                calls: Cell::new(0),
            }
        }
    }

    impl SessionSource for &FakeSource {
        async fn generate(
            &self,
            _venue_id: Option<i64>,
            _duration_minutes: u32,
        ) -> Result<QrSession, ApiError> {
            self.calls.set(self.calls.get() + 1);
            self.responses
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| panic!("unexpected generate call"))
        }
    }

    fn session(id: &str, expires_at: DateTime<Utc>) -> QrSession {
        QrSession {
            session_id: id.into(),
            qr_image: String::new(),
            expires_at,
            venue_id: None,
            venue_name: None,
        }
    }

    #[tokio::test]
    async fn countdown_decreases_and_fires_exactly_one_refresh() {
        let clock = ManualClock::new();
        let t0 = (&clock).now();
        let source = FakeSource::new(vec![
            Ok(session("a", t0 + Duration::seconds(120))),
            Ok(session("b", t0 + Duration::seconds(240))),
        ]);
        let mut poller = SessionPoller::new(&source, &clock, 2);

        poller.tick().await;
        assert_eq!(source.calls.get(), 1);
        assert_eq!(poller.remaining_seconds(), 120);

        clock.advance(30);
        assert_eq!(poller.remaining_seconds(), 90);
        poller.tick().await;
        assert_eq!(source.calls.get(), 1, "no refresh while counting down");

        clock.advance(90);
        assert_eq!(poller.remaining_seconds(), 0);
        poller.tick().await;
        assert_eq!(source.calls.get(), 2, "countdown expiry triggers one refresh");
        assert_eq!(poller.session().map(|s| s.session_id.as_str()), Some("b"));

        poller.tick().await;
        assert_eq!(source.calls.get(), 2, "refresh fires only once per expiry");
    }

    #[tokio::test]
    async fn interval_elapsing_refreshes_even_before_expiry() {
        let clock = ManualClock::new();
        let t0 = (&clock).now();
        let source = FakeSource::new(vec![
            Ok(session("a", t0 + Duration::seconds(300))),
            Ok(session("b", t0 + Duration::seconds(420))),
        ]);
        let mut poller = SessionPoller::new(&source, &clock, 5);

        poller.refresh(None).await;
        clock.advance(POLL_INTERVAL_SECS);
        poller.tick().await;
        assert_eq!(source.calls.get(), 2);
    }

    #[tokio::test]
    async fn stale_response_is_discarded() {
        let clock = ManualClock::new();
        let t0 = (&clock).now();
        let source = FakeSource::new(vec![]);
        let mut poller = SessionPoller::new(&source, &clock, 2);

        let old_seq = poller.begin_refresh();
        let new_seq = poller.begin_refresh();
        assert!(poller.complete_refresh(new_seq, Ok(session("fresh", t0 + Duration::seconds(120)))));
        assert!(!poller.complete_refresh(old_seq, Ok(session("stale", t0 + Duration::seconds(60)))));
        assert_eq!(poller.session().map(|s| s.session_id.as_str()), Some("fresh"));
    }

    #[tokio::test]
    async fn failure_surfaces_message_without_retrying() {
        let clock = ManualClock::new();
        let source = FakeSource::new(vec![Err(ApiError::Status {
            status: 503,
            detail: "QR service unavailable".into(),
        })]);
        let mut poller = SessionPoller::new(&source, &clock, 2);

        poller.refresh(None).await;
        assert_eq!(poller.error(), Some("QR service unavailable"));
        assert!(poller.session().is_none());

        // not due again until the interval elapses
        poller.tick().await;
        assert_eq!(source.calls.get(), 1);
    }
}
