//! The attendance submission state machine:
//! `Editing → Validating → LocationChecking → Submitting → Succeeded`,
//! with any failure returning control to `Editing` alongside a message.

use api_client::{ApiError, AttendClient};
use domain::rules::{validate_submission, SubmissionInput};
use domain::{AttendanceForm, GeoFix};
use tracing::debug;

pub const TOO_FAR_MESSAGE: &str =
    "You are too far from campus to mark attendance. Move closer to the venue and try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Editing,
    Validating,
    LocationChecking,
    Submitting,
    Succeeded,
}

pub trait AttendanceApi {
    async fn validate_location(&self, latitude: f64, longitude: f64) -> Result<bool, ApiError>;
    async fn mark(
        &self,
        session_id: &str,
        form: &AttendanceForm,
        fix: &GeoFix,
        selfie: &[u8],
    ) -> Result<(), ApiError>;
}

impl AttendanceApi for AttendClient {
    async fn validate_location(&self, latitude: f64, longitude: f64) -> Result<bool, ApiError> {
        AttendClient::validate_location(self, latitude, longitude).await
    }

    async fn mark(
        &self,
        session_id: &str,
        form: &AttendanceForm,
        fix: &GeoFix,
        selfie: &[u8],
    ) -> Result<(), ApiError> {
        self.mark_attendance(session_id, form, fix, selfie).await
    }
}

pub struct AttendanceSubmitter<A> {
    api: A,
    phase: Phase,
    error: Option<String>,
}

impl<A: AttendanceApi> AttendanceSubmitter<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            phase: Phase::Editing,
            error: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn succeeded(&self) -> bool {
        self.phase == Phase::Succeeded
    }

    fn fail(&mut self, message: String) {
        debug!("submission failed: {message}");
        self.error = Some(message);
        self.phase = Phase::Editing;
    }

    /// Run the whole submission: ordered local checks, then the server-side
    /// location pre-check, then one multipart mark request. The first failing
    /// step aborts; nothing retries automatically.
    pub async fn submit(
        &mut self,
        form: &AttendanceForm,
        fix: Option<&GeoFix>,
        selfie: Option<&[u8]>,
        session_id: Option<&str>,
    ) {
        if self.phase == Phase::Succeeded {
            return;
        }
        self.error = None;
        self.phase = Phase::Validating;

        let input = SubmissionInput {
            form,
            has_fix: fix.is_some(),
            has_photo: selfie.is_some(),
            has_session: session_id.map_or(false, |s| !s.trim().is_empty()),
        };
        if let Err(e) = validate_submission(&input) {
            self.fail(e.to_string());
            return;
        }
        // the rule list guarantees these are present
        let (Some(fix), Some(selfie), Some(session_id)) = (fix, selfie, session_id) else {
            self.fail("Missing submission data.".into());
            return;
        };

        self.phase = Phase::LocationChecking;
        match self.api.validate_location(fix.latitude, fix.longitude).await {
            Ok(true) => {}
            Ok(false) => {
                self.fail(TOO_FAR_MESSAGE.into());
                return;
            }
            Err(e) => {
                self.fail(e.user_message());
                return;
            }
        }

        self.phase = Phase::Submitting;
        match self.api.mark(session_id, form, fix, selfie).await {
            Ok(()) => self.phase = Phase::Succeeded,
            Err(e) => self.fail(e.user_message()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use chrono::Utc;

    use super::*;

    struct FakeApi {
        verdict: Result<bool, ApiError>,
        mark_result: Result<(), ApiError>,
        validate_calls: Cell<usize>,
        mark_calls: Cell<usize>,
    }

    impl FakeApi {
        fn new(verdict: Result<bool, ApiError>, mark_result: Result<(), ApiError>) -> Self {
            Self {
                verdict,
                mark_result,
                validate_calls: Cell::new(0),
                mark_calls: Cell::new(0),
            }
        }
    }

    fn clone_result<T: Clone>(r: &Result<T, ApiError>) -> Result<T, ApiError> {
        match r {
            Ok(v) => Ok(v.clone()),
            Err(ApiError::Status { status, detail }) => Err(ApiError::Status {
                status: *status,
                detail: detail.clone(),
            }),
            Err(ApiError::OutOfRange {
                distance_meters,
                allowed_meters,
                detail,
            }) => Err(ApiError::OutOfRange {
                distance_meters: *distance_meters,
                allowed_meters: *allowed_meters,
                detail: detail.clone(),
            }),
            Err(ApiError::Unauthorized) => Err(ApiError::Unauthorized),
            Err(ApiError::Network(_)) => unreachable!("network errors are not scripted"),
        }
    }

    impl AttendanceApi for &FakeApi {
        async fn validate_location(&self, _lat: f64, _lon: f64) -> Result<bool, ApiError> {
            self.validate_calls.set(self.validate_calls.get() + 1);
            clone_result(&self.verdict)
        }

        async fn mark(
            &self,
            _session_id: &str,
            _form: &AttendanceForm,
            _fix: &GeoFix,
            _selfie: &[u8],
        ) -> Result<(), ApiError> {
            self.mark_calls.set(self.mark_calls.get() + 1);
            clone_result(&self.mark_result)
        }
    }

    fn complete_form() -> AttendanceForm {
        AttendanceForm {
            name: "Asha Rao".into(),
            email: "asha@example.edu".into(),
            roll_no: "21CS042".into(),
            phone: "9876543210".into(),
            branch: "CSE".into(),
            section: "B".into(),
        }
    }

    fn fix() -> GeoFix {
        GeoFix {
            latitude: 12.971599,
            longitude: 77.594566,
            accuracy: 10.0,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn valid_submission_succeeds_with_one_mark_call() {
        let api = FakeApi::new(Ok(true), Ok(()));
        let mut submitter = AttendanceSubmitter::new(&api);
        let form = complete_form();
        let fix = fix();
        submitter
            .submit(&form, Some(&fix), Some(b"jpeg".as_slice()), Some("sess-1"))
            .await;
        assert_eq!(submitter.phase(), Phase::Succeeded);
        assert!(submitter.error().is_none());
        assert_eq!(api.validate_calls.get(), 1);
        assert_eq!(api.mark_calls.get(), 1);
    }

    #[tokio::test]
    async fn invalid_location_returns_to_editing_with_too_far_message() {
        let api = FakeApi::new(Ok(false), Ok(()));
        let mut submitter = AttendanceSubmitter::new(&api);
        let form = complete_form();
        let fix = fix();
        submitter
            .submit(&form, Some(&fix), Some(b"jpeg".as_slice()), Some("sess-1"))
            .await;
        assert_eq!(submitter.phase(), Phase::Editing);
        assert_eq!(submitter.error(), Some(TOO_FAR_MESSAGE));
        assert_eq!(api.mark_calls.get(), 0);
    }

    #[tokio::test]
    async fn local_validation_failure_makes_no_network_calls() {
        let api = FakeApi::new(Ok(true), Ok(()));
        let mut submitter = AttendanceSubmitter::new(&api);
        let mut form = complete_form();
        form.phone = "12345".into();
        let fix = fix();
        submitter
            .submit(&form, Some(&fix), Some(b"jpeg".as_slice()), Some("sess-1"))
            .await;
        assert_eq!(submitter.phase(), Phase::Editing);
        assert_eq!(submitter.error(), Some("Phone number must be exactly 10 digits."));
        assert_eq!(api.validate_calls.get(), 0);
        assert_eq!(api.mark_calls.get(), 0);
    }

    #[tokio::test]
    async fn structured_out_of_range_renders_distances() {
        let api = FakeApi::new(
            Ok(true),
            Err(ApiError::OutOfRange {
                distance_meters: Some(412.0),
                allowed_meters: Some(100.0),
                detail: "Location out of allowed range.".into(),
            }),
        );
        let mut submitter = AttendanceSubmitter::new(&api);
        let form = complete_form();
        let fix = fix();
        submitter
            .submit(&form, Some(&fix), Some(b"jpeg".as_slice()), Some("sess-1"))
            .await;
        assert_eq!(submitter.phase(), Phase::Editing);
        let msg = submitter.error().expect("message set");
        assert!(msg.contains("412"));
        assert!(msg.contains("100"));
    }

    #[tokio::test]
    async fn success_is_terminal() {
        let api = FakeApi::new(Ok(true), Ok(()));
        let mut submitter = AttendanceSubmitter::new(&api);
        let form = complete_form();
        let fix = fix();
        submitter
            .submit(&form, Some(&fix), Some(b"jpeg".as_slice()), Some("sess-1"))
            .await;
        submitter
            .submit(&form, Some(&fix), Some(b"jpeg".as_slice()), Some("sess-1"))
            .await;
        assert_eq!(api.mark_calls.get(), 1, "succeeded state suppresses the form");
    }
}
