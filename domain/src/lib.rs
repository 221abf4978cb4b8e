//! Shared data types and pure client-side logic for the attendance tool.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod filter;
pub mod geo;
pub mod rules;

pub use geo::{plausible_fix, round6};

/// One short-lived QR session issued by the server. A refresh supersedes the
/// whole value; it is never mutated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QrSession {
    pub session_id: String,
    /// Base64-encoded PNG of the QR code, as sent by the server.
    pub qr_image: String,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub venue_id: Option<i64>,
    #[serde(default)]
    pub venue_name: Option<String>,
}

impl QrSession {
    /// Wall-clock seconds until expiry, clamped to zero.
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds().max(0)
    }
}

/// A device position sample, already normalized to 6 decimal places.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoFix {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttendanceForm {
    pub name: String,
    pub email: String,
    pub roll_no: String,
    pub phone: String,
    pub branch: String,
    pub section: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Institution {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub city: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewInstitution {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Venue {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub radius_meters: Option<f64>,
    #[serde(default)]
    pub institution_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewVenue {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub radius_meters: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub institution_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: i64,
    pub session_id: String,
    pub name: String,
    pub email: String,
    pub roll_no: String,
    pub phone: String,
    pub branch: String,
    pub section: String,
    pub marked_at: DateTime<Utc>,
    #[serde(default)]
    pub venue_name: Option<String>,
    #[serde(default)]
    pub selfie_url: Option<String>,
    #[serde(default)]
    pub location_lat: Option<f64>,
    #[serde(default)]
    pub location_lon: Option<f64>,
}

/// A server-recorded anomaly (e.g. a rejected location) surfaced to admins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlaggedLog {
    pub id: i64,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub roll_no: Option<String>,
    pub reason: String,
    #[serde(default)]
    pub distance_meters: Option<f64>,
    #[serde(default)]
    pub allowed_meters: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyStat {
    pub date: chrono::NaiveDate,
    pub count: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatsSummary {
    pub total_records: i64,
    pub total_sessions: i64,
    pub total_venues: i64,
    pub flagged_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueStat {
    pub venue_id: i64,
    pub venue_name: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session(expires_in: i64) -> QrSession {
        let now = Utc::now();
        QrSession {
            session_id: "s-1".into(),
            qr_image: String::new(),
            expires_at: now + Duration::seconds(expires_in),
            venue_id: None,
            venue_name: None,
        }
    }

    #[test]
    fn remaining_seconds_clamps_to_zero() {
        let s = session(-30);
        assert_eq!(s.remaining_seconds(Utc::now()), 0);
    }

    #[test]
    fn remaining_seconds_counts_down() {
        let s = session(120);
        let now = Utc::now();
        let later = now + Duration::seconds(45);
        assert!(s.remaining_seconds(now) > s.remaining_seconds(later));
    }
}
