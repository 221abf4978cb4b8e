//! Error taxonomy for API calls, mapped from response bodies.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// No response at all: DNS, refused connection, timeout.
    #[error("could not reach the attendance server, check your connection")]
    Network(#[source] reqwest::Error),

    /// 401 anywhere; the auth gate has already cleared the stored token.
    #[error("your session has expired, please log in again")]
    Unauthorized,

    /// Structured geofence rejection from the server.
    #[error("{detail}")]
    OutOfRange {
        distance_meters: Option<f64>,
        allowed_meters: Option<f64>,
        detail: String,
    },

    /// Any other HTTP error, carrying the server's detail when present.
    #[error("{detail}")]
    Status { status: u16, detail: String },
}

impl ApiError {
    /// Text suitable for direct display, with campus guidance for geofence
    /// rejections.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::OutOfRange {
                distance_meters: Some(d),
                allowed_meters: Some(r),
                ..
            } => format!(
                "You are too far from campus: {d:.0} m away, but attendance is only allowed within {r:.0} m."
            ),
            other => other.to_string(),
        }
    }
}

/// Build an `ApiError` from an error-status body. The server reports problems
/// in a `detail` field, either a plain string or, for geofence rejections, an
/// object carrying distance figures.
pub(crate) fn from_body(status: u16, body: &serde_json::Value) -> ApiError {
    let detail = &body["detail"];
    if let Some(obj) = detail.as_object() {
        let distance = obj
            .get("distance_meters")
            .or_else(|| obj.get("distance"))
            .and_then(|v| v.as_f64());
        let allowed = obj
            .get("allowed_radius_meters")
            .or_else(|| obj.get("allowed_radius"))
            .or_else(|| obj.get("radius_meters"))
            .and_then(|v| v.as_f64());
        let message = obj
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("Location out of allowed range.")
            .to_string();
        if distance.is_some() || allowed.is_some() {
            return ApiError::OutOfRange {
                distance_meters: distance,
                allowed_meters: allowed,
                detail: message,
            };
        }
        return ApiError::Status {
            status,
            detail: message,
        };
    }
    if let Some(text) = detail.as_str() {
        let lower = text.to_lowercase();
        if lower.contains("out of range") || lower.contains("too far") {
            return ApiError::OutOfRange {
                distance_meters: None,
                allowed_meters: None,
                detail: text.to_string(),
            };
        }
        return ApiError::Status {
            status,
            detail: text.to_string(),
        };
    }
    ApiError::Status {
        status,
        detail: format!("request failed with status {status}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_detail_string_is_kept() {
        let err = from_body(400, &json!({ "detail": "Session has expired" }));
        match err {
            ApiError::Status { status, detail } => {
                assert_eq!(status, 400);
                assert_eq!(detail, "Session has expired");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn missing_detail_falls_back_to_status() {
        let err = from_body(500, &json!({}));
        assert_eq!(err.to_string(), "request failed with status 500");
    }

    #[test]
    fn structured_out_of_range_is_recognized() {
        let body = json!({
            "detail": {
                "message": "Location out of allowed range.",
                "distance_meters": 412.3,
                "allowed_radius_meters": 100.0
            }
        });
        let err = from_body(403, &body);
        match &err {
            ApiError::OutOfRange {
                distance_meters,
                allowed_meters,
                ..
            } => {
                assert_eq!(*distance_meters, Some(412.3));
                assert_eq!(*allowed_meters, Some(100.0));
            }
            other => panic!("unexpected: {other:?}"),
        }
        let msg = err.user_message();
        assert!(msg.contains("412"));
        assert!(msg.contains("100"));
    }

    #[test]
    fn textual_out_of_range_is_recognized() {
        let err = from_body(403, &json!({ "detail": "You are too far from the venue" }));
        assert!(matches!(err, ApiError::OutOfRange { .. }));
    }
}
