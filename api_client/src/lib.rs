//! HTTP client for the attendance API.

use std::sync::Arc;

use domain::{
    AttendanceForm, AttendanceRecord, DailyStat, FlaggedLog, GeoFix, Institution, NewInstitution,
    NewVenue, QrSession, StatsSummary, UserProfile, Venue, VenueStat,
};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use tracing::debug;

mod auth;
mod config;
mod error;

pub use auth::AuthState;
pub use config::{Config, BASE_URL_VAR, DEFAULT_BASE_URL};
pub use error::ApiError;

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct LocationVerdict {
    is_valid: bool,
}

#[derive(Clone)]
pub struct AttendClient {
    client: Client,
    base_url: String,
    auth: Arc<AuthState>,
}

impl AttendClient {
    pub fn new() -> Self {
        Self::with_config(Config::load())
    }

    pub fn with_config(config: Config) -> Self {
        Self::with_auth(config, AuthState::load())
    }

    pub fn with_auth(config: Config, auth: AuthState) -> Self {
        let client = Client::builder()
            .user_agent(concat!("QrAttendance/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("reqwest client build failed");
        Self {
            client,
            base_url: config.base_url,
            auth: Arc::new(auth),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn has_token(&self) -> bool {
        self.auth.has_token()
    }

    /// True once after any request came back 401; the caller redirects to the
    /// admin login view.
    pub fn session_expired(&self) -> bool {
        self.auth.take_expired()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Single interception point for every request: attaches the bearer
    /// token, maps transport failures, clears auth on 401, and converts any
    /// other error status using the body's detail field.
    async fn execute(&self, rb: RequestBuilder) -> Result<reqwest::Response, ApiError> {
        let rb = match self.auth.token() {
            Some(token) => rb.bearer_auth(token),
            None => rb,
        };
        let resp = rb.send().await.map_err(ApiError::Network)?;
        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            self.auth.expire();
            return Err(ApiError::Unauthorized);
        }
        if status.is_success() {
            return Ok(resp);
        }
        let body: serde_json::Value = resp.json().await.unwrap_or_default();
        Err(error::from_body(status.as_u16(), &body))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let resp = self.execute(self.client.get(self.url(path))).await?;
        resp.json().await.map_err(ApiError::Network)
    }

    // --- auth ---

    /// Exchange credentials for a token, persist it, and fetch the profile.
    pub async fn login(&self, username: &str, password: &str) -> Result<UserProfile, ApiError> {
        let resp = self
            .execute(self.client.post(self.url("/auth/login")).json(
                &serde_json::json!({ "username": username, "password": password }),
            ))
            .await?;
        let token: TokenResponse = resp.json().await.map_err(ApiError::Network)?;
        self.auth.set(&token.access_token);
        self.me().await
    }

    /// Admin login is form-encoded, unlike the JSON user login.
    pub async fn admin_login(&self, username: &str, password: &str) -> Result<(), ApiError> {
        let resp = self
            .execute(
                self.client
                    .post(self.url("/admin/login"))
                    .form(&[("username", username), ("password", password)]),
            )
            .await?;
        let token: TokenResponse = resp.json().await.map_err(ApiError::Network)?;
        self.auth.set(&token.access_token);
        Ok(())
    }

    pub async fn me(&self) -> Result<UserProfile, ApiError> {
        self.get_json("/auth/me").await
    }

    /// Startup check: validate the persisted token once. Only a 401 proves
    /// the token is invalid and clears it; transient server or network
    /// failures keep the token and propagate.
    pub async fn verify(&self) -> Result<Option<UserProfile>, ApiError> {
        if !self.auth.has_token() {
            return Ok(None);
        }
        match self.me().await {
            Ok(profile) => Ok(Some(profile)),
            Err(ApiError::Unauthorized) => {
                self.auth.clear();
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub fn logout(&self) {
        debug!("logging out, clearing stored token");
        self.auth.clear();
    }

    // --- qr sessions ---

    pub async fn generate_session(
        &self,
        venue_id: Option<i64>,
        duration_minutes: u32,
    ) -> Result<QrSession, ApiError> {
        let path = match venue_id {
            Some(id) => format!("/qr-session/generate-for-venue/{id}"),
            None => "/qr-session/generate".to_string(),
        };
        let resp = self
            .execute(
                self.client
                    .post(self.url(&path))
                    .query(&[("duration_minutes", duration_minutes)]),
            )
            .await?;
        resp.json().await.map_err(ApiError::Network)
    }

    // --- attendance ---

    pub async fn validate_location(&self, latitude: f64, longitude: f64) -> Result<bool, ApiError> {
        let resp = self
            .execute(self.client.post(self.url("/attendance/validate-location")).json(
                &serde_json::json!({ "lat": latitude, "lon": longitude }),
            ))
            .await?;
        let verdict: LocationVerdict = resp.json().await.map_err(ApiError::Network)?;
        Ok(verdict.is_valid)
    }

    pub async fn mark_attendance(
        &self,
        session_id: &str,
        form: &AttendanceForm,
        fix: &GeoFix,
        selfie: &[u8],
    ) -> Result<(), ApiError> {
        let part = Part::bytes(selfie.to_vec())
            .file_name("selfie.jpg")
            .mime_str("image/jpeg")
            .map_err(ApiError::Network)?;
        let multipart = Form::new()
            .text("session_id", session_id.to_string())
            .text("name", form.name.clone())
            .text("email", form.email.clone())
            .text("roll_no", form.roll_no.clone())
            .text("phone", form.phone.clone())
            .text("branch", form.branch.clone())
            .text("section", form.section.clone())
            .text("location_lat", domain::round6(fix.latitude).to_string())
            .text("location_lon", domain::round6(fix.longitude).to_string())
            .part("selfie", part);
        self.execute(self.client.post(self.url("/attendance/mark")).multipart(multipart))
            .await?;
        Ok(())
    }

    // --- admin reference data ---

    pub async fn institutions(&self) -> Result<Vec<Institution>, ApiError> {
        self.get_json("/admin/institutions").await
    }

    pub async fn create_institution(&self, new: &NewInstitution) -> Result<Institution, ApiError> {
        let resp = self
            .execute(self.client.post(self.url("/admin/institutions")).json(new))
            .await?;
        resp.json().await.map_err(ApiError::Network)
    }

    pub async fn update_institution(
        &self,
        id: i64,
        new: &NewInstitution,
    ) -> Result<Institution, ApiError> {
        let resp = self
            .execute(
                self.client
                    .put(self.url(&format!("/admin/institutions/{id}")))
                    .json(new),
            )
            .await?;
        resp.json().await.map_err(ApiError::Network)
    }

    pub async fn delete_institution(&self, id: i64) -> Result<(), ApiError> {
        self.execute(self.client.delete(self.url(&format!("/admin/institutions/{id}"))))
            .await?;
        Ok(())
    }

    pub async fn venues(&self) -> Result<Vec<Venue>, ApiError> {
        self.get_json("/admin/venues").await
    }

    pub async fn create_venue(&self, new: &NewVenue) -> Result<Venue, ApiError> {
        let resp = self
            .execute(self.client.post(self.url("/admin/venues")).json(new))
            .await?;
        resp.json().await.map_err(ApiError::Network)
    }

    pub async fn update_venue(&self, id: i64, new: &NewVenue) -> Result<Venue, ApiError> {
        let resp = self
            .execute(
                self.client
                    .put(self.url(&format!("/admin/venues/{id}")))
                    .json(new),
            )
            .await?;
        resp.json().await.map_err(ApiError::Network)
    }

    pub async fn delete_venue(&self, id: i64) -> Result<(), ApiError> {
        self.execute(self.client.delete(self.url(&format!("/admin/venues/{id}"))))
            .await?;
        Ok(())
    }

    // --- admin records and statistics ---

    pub async fn attendance_records(&self) -> Result<Vec<AttendanceRecord>, ApiError> {
        self.get_json("/admin/attendance/all").await
    }

    pub async fn attendance_report(&self) -> Result<Vec<AttendanceRecord>, ApiError> {
        self.get_json("/admin/attendance/report").await
    }

    pub async fn flagged_logs(&self) -> Result<Vec<FlaggedLog>, ApiError> {
        self.get_json("/admin/flagged-logs").await
    }

    pub async fn stats_daily(&self) -> Result<Vec<DailyStat>, ApiError> {
        self.get_json("/admin/statistics/daily").await
    }

    pub async fn stats_summary(&self) -> Result<StatsSummary, ApiError> {
        self.get_json("/admin/statistics/summary").await
    }

    pub async fn stats_by_all_venues(&self) -> Result<Vec<VenueStat>, ApiError> {
        self.get_json("/admin/statistics/venue").await
    }

    pub async fn stats_for_venue(&self, venue_id: i64) -> Result<Vec<DailyStat>, ApiError> {
        self.get_json(&format!("/admin/statistics/by-venue/{venue_id}")).await
    }

    /// Raw client, for fetching image bytes (selfie thumbnails) directly.
    pub fn client(&self) -> &Client {
        &self.client
    }
}

impl Default for AttendClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    /// Serve one canned HTTP response on a local socket and return the base
    /// URL pointing at it.
    async fn one_shot_server(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = [0u8; 4096];
                let _ = stream.read(&mut buf).await;
                let resp = format!(
                    "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(resp.as_bytes()).await;
            }
        });
        format!("http://{addr}")
    }

    fn client_with_token(base_url: String, token: &str) -> AttendClient {
        let auth = AuthState::load_from(None);
        auth.set(token);
        AttendClient::with_auth(Config { base_url }, auth)
    }

    #[tokio::test]
    async fn startup_check_keeps_token_on_server_error() {
        let base = one_shot_server("503 Service Unavailable", r#"{"detail":"maintenance"}"#).await;
        let client = client_with_token(base, "tok-1");
        let result = client.verify().await;
        assert!(matches!(result, Err(ApiError::Status { status: 503, .. })));
        assert!(client.has_token(), "transient failure must not delete the token");
    }

    #[tokio::test]
    async fn startup_check_clears_rejected_token() {
        let base = one_shot_server("401 Unauthorized", r#"{"detail":"token expired"}"#).await;
        let client = client_with_token(base, "tok-2");
        let result = client.verify().await;
        assert!(matches!(result, Ok(None)));
        assert!(!client.has_token());
    }
}
