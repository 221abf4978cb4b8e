use std::collections::HashMap;

use api_client::AttendClient;
use base64::Engine;
use chrono::Utc;
use domain::filter::{filter_flagged, filter_named, filter_records};
use domain::{
    AttendanceForm, AttendanceRecord, DailyStat, FlaggedLog, Institution, NewInstitution,
    NewVenue, StatsSummary, UserProfile, Venue, VenueStat,
};
use eframe::{egui, Frame};
use flows::{
    AttendanceSubmitter, FixSource, LocationError, LocationWatch, Phase, RawFix, SessionPoller,
    SystemClock,
};
use image::io::Reader as ImageReader;
use qrcode::{Color, QrCode};
use tokio::runtime::Runtime;

const RECORDS_PER_PAGE: usize = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum View {
    GenerateQr,
    MarkAttendance,
    AdminLogin,
    Dashboard,
    Records,
    Selfies,
    Institutions,
    Venues,
    FlaggedLogs,
    Statistics,
}

impl View {
    fn needs_auth(self) -> bool {
        !matches!(self, View::GenerateQr | View::MarkAttendance | View::AdminLogin)
    }
}

#[derive(Default)]
struct InstitutionEditor {
    id: Option<i64>,
    name: String,
    city: String,
    error: Option<String>,
}

#[derive(Default)]
struct VenueEditor {
    id: Option<i64>,
    name: String,
    address: String,
    latitude: String,
    longitude: String,
    radius_meters: String,
    institution_id: String,
    error: Option<String>,
}

enum PendingDelete {
    Institution(i64, String),
    Venue(i64, String),
}

/// Fix source backed by the manual coordinate entry; the form's Set button
/// pushes readings into it.
struct ManualFixSource {
    rx: tokio::sync::mpsc::UnboundedReceiver<RawFix>,
}

impl FixSource for ManualFixSource {
    fn next_fix(
        &mut self,
    ) -> impl std::future::Future<Output = Option<Result<RawFix, LocationError>>> + Send {
        async move { self.rx.recv().await.map(Ok) }
    }
}

struct AttendApp {
    client: AttendClient,
    rt: Runtime,
    view: View,
    status: Option<String>,

    // QR generation
    poller: SessionPoller<AttendClient, SystemClock>,
    venue_id_input: String,
    qr_texture: Option<egui::TextureHandle>,
    qr_rendered_for: Option<String>,

    // public attendance form
    form: AttendanceForm,
    session_id_input: String,
    manual_lat: String,
    manual_lon: String,
    fix_tx: tokio::sync::mpsc::UnboundedSender<RawFix>,
    location: LocationWatch,
    selfie_path: String,
    selfie_bytes: Option<Vec<u8>>,
    selfie_error: Option<String>,
    submitter: AttendanceSubmitter<AttendClient>,

    // admin auth
    username: String,
    password: String,
    login_error: Option<String>,
    profile: Option<UserProfile>,

    // admin data
    records: Vec<AttendanceRecord>,
    record_search: String,
    record_page: usize,
    institutions: Vec<Institution>,
    institution_search: String,
    venues: Vec<Venue>,
    venue_search: String,
    flagged: Vec<FlaggedLog>,
    flagged_search: String,
    summary: Option<StatsSummary>,
    daily: Vec<DailyStat>,
    venue_stats: Vec<VenueStat>,
    venue_daily: Vec<DailyStat>,
    stats_venue_input: String,
    selfie_textures: HashMap<i64, egui::TextureHandle>,

    institution_editor: Option<InstitutionEditor>,
    venue_editor: Option<VenueEditor>,
    confirm_delete: Option<PendingDelete>,
}

impl Default for AttendApp {
    fn default() -> Self {
        let client = AttendClient::new();
        let rt = Runtime::new().expect("failed to create tokio runtime");

        // validate the persisted token once at startup
        let profile = rt.block_on(client.verify()).unwrap_or(None);

        let poller = SessionPoller::new(client.clone(), SystemClock, 2);
        let submitter = AttendanceSubmitter::new(client.clone());

        let (fix_tx, fix_rx) = tokio::sync::mpsc::unbounded_channel();
        let location = LocationWatch::spawn(rt.handle(), ManualFixSource { rx: fix_rx });

        Self {
            client,
            rt,
            view: View::GenerateQr,
            status: None,
            poller,
            venue_id_input: String::new(),
            qr_texture: None,
            qr_rendered_for: None,
            form: AttendanceForm::default(),
            session_id_input: String::new(),
            manual_lat: String::new(),
            manual_lon: String::new(),
            fix_tx,
            location,
            selfie_path: String::new(),
            selfie_bytes: None,
            selfie_error: None,
            submitter,
            username: String::new(),
            password: String::new(),
            login_error: None,
            profile,
            records: Vec::new(),
            record_search: String::new(),
            record_page: 0,
            institutions: Vec::new(),
            institution_search: String::new(),
            venues: Vec::new(),
            venue_search: String::new(),
            flagged: Vec::new(),
            flagged_search: String::new(),
            summary: None,
            daily: Vec::new(),
            venue_stats: Vec::new(),
            venue_daily: Vec::new(),
            stats_venue_input: String::new(),
            selfie_textures: HashMap::new(),
            institution_editor: None,
            venue_editor: None,
            confirm_delete: None,
        }
    }
}

impl AttendApp {
    fn bytes_to_texture(bytes: &[u8], name: &str, ctx: &egui::Context) -> Option<egui::TextureHandle> {
        let reader = ImageReader::new(std::io::Cursor::new(bytes)).with_guessed_format().ok()?;
        let img = reader.decode().ok()?;
        let size = [img.width() as usize, img.height() as usize];
        let rgba = img.into_rgba8();
        let pixels = rgba.into_raw();
        let img = egui::ColorImage::from_rgba_unmultiplied(size, &pixels);
        Some(ctx.load_texture(name, img, Default::default()))
    }

    /// Render a QR code locally (fallback when the server sends no image).
    fn local_qr_texture(contents: &str, ctx: &egui::Context) -> Option<egui::TextureHandle> {
        let code = QrCode::new(contents.as_bytes()).ok()?;
        let module_count = code.width();
        let margin_modules = 4;
        let scale = 6;
        let img_side = (module_count + margin_modules * 2) * scale;
        let mut pixels = vec![255u8; img_side * img_side * 4];

        for y in 0..module_count {
            for x in 0..module_count {
                if code[(x, y)] == Color::Dark {
                    let start_x = (x + margin_modules) * scale;
                    let start_y = (y + margin_modules) * scale;
                    for dy in 0..scale {
                        for dx in 0..scale {
                            let idx = ((start_y + dy) * img_side + (start_x + dx)) * 4;
                            pixels[idx..idx + 4].copy_from_slice(&[0, 0, 0, 255]);
                        }
                    }
                }
            }
        }

        let img = egui::ColorImage::from_rgba_unmultiplied([img_side, img_side], &pixels);
        Some(ctx.load_texture("qr", img, Default::default()))
    }

    fn qr_texture_from_session(&self, ctx: &egui::Context) -> Option<egui::TextureHandle> {
        let session = self.poller.session()?;
        let encoded = session
            .qr_image
            .rsplit("base64,")
            .next()
            .unwrap_or(session.qr_image.as_str());
        if let Ok(bytes) = base64::engine::general_purpose::STANDARD.decode(encoded.trim()) {
            if let Some(tex) = Self::bytes_to_texture(&bytes, "qr", ctx) {
                return Some(tex);
            }
        }
        let url = format!("{}/mark-attendance/{}", self.client.base_url(), session.session_id);
        Self::local_qr_texture(&url, ctx)
    }

    fn fetch_selfie_texture(&self, url: &str, name: &str, ctx: &egui::Context) -> Option<egui::TextureHandle> {
        let client = self.client.client().clone();
        let url = url.to_string();
        let bytes = self.rt.block_on(async {
            let resp = client.get(&url).send().await.ok()?;
            resp.bytes().await.ok().map(|b| b.to_vec())
        })?;
        Self::bytes_to_texture(&bytes, name, ctx)
    }

    fn venue_scope(&self) -> Option<i64> {
        self.venue_id_input.trim().parse().ok()
    }

    /// Navigate, fetching the target view's data. Admin views are guarded by
    /// token presence.
    fn open(&mut self, view: View) {
        if view.needs_auth() && !self.client.has_token() {
            self.view = View::AdminLogin;
            return;
        }
        self.status = None;
        self.view = view;
        self.refetch(view);
    }

    fn refetch(&mut self, view: View) {
        let result = match view {
            View::Records | View::Selfies => self
                .rt
                .block_on(self.client.attendance_records())
                .map(|r| self.records = r),
            View::Institutions => self
                .rt
                .block_on(self.client.institutions())
                .map(|i| self.institutions = i),
            View::Venues => self.rt.block_on(self.client.venues()).map(|v| self.venues = v),
            View::FlaggedLogs => self
                .rt
                .block_on(self.client.flagged_logs())
                .map(|f| self.flagged = f),
            View::Dashboard | View::Statistics => {
                let summary = self.rt.block_on(self.client.stats_summary());
                let daily = self.rt.block_on(self.client.stats_daily());
                let venues = self.rt.block_on(self.client.stats_by_all_venues());
                match (summary, daily, venues) {
                    (Ok(s), Ok(d), Ok(v)) => {
                        self.summary = Some(s);
                        self.daily = d;
                        self.venue_stats = v;
                        Ok(())
                    }
                    (Err(e), ..) | (_, Err(e), _) | (_, _, Err(e)) => Err(e),
                }
            }
            View::GenerateQr | View::MarkAttendance | View::AdminLogin => Ok(()),
        };
        if let Err(e) = result {
            self.status = Some(e.user_message());
        }
    }

    fn clear_admin_state(&mut self) {
        self.profile = None;
        self.records.clear();
        self.institutions.clear();
        self.venues.clear();
        self.flagged.clear();
        self.summary = None;
        self.daily.clear();
        self.venue_stats.clear();
        self.venue_daily.clear();
        self.selfie_textures.clear();
        self.institution_editor = None;
        self.venue_editor = None;
        self.confirm_delete = None;
    }

    fn nav_bar(&mut self, ui: &mut egui::Ui) {
        let mut target = None;
        ui.horizontal_wrapped(|ui| {
            if ui.selectable_label(self.view == View::GenerateQr, "QR Code").clicked() {
                target = Some(View::GenerateQr);
            }
            if ui
                .selectable_label(self.view == View::MarkAttendance, "Mark Attendance")
                .clicked()
            {
                target = Some(View::MarkAttendance);
            }
            ui.separator();
            if self.client.has_token() {
                for (view, label) in [
                    (View::Dashboard, "Dashboard"),
                    (View::Records, "Records"),
                    (View::Selfies, "Selfies"),
                    (View::Institutions, "Institutions"),
                    (View::Venues, "Venues"),
                    (View::FlaggedLogs, "Flagged"),
                    (View::Statistics, "Statistics"),
                ] {
                    if ui.selectable_label(self.view == view, label).clicked() {
                        target = Some(view);
                    }
                }
                if ui.button("Logout").clicked() {
                    self.client.logout();
                    self.clear_admin_state();
                    target = Some(View::GenerateQr);
                }
            } else if ui
                .selectable_label(self.view == View::AdminLogin, "Admin Login")
                .clicked()
            {
                target = Some(View::AdminLogin);
            }
        });
        if let Some(view) = target {
            self.open(view);
        }
    }

    fn show_generate(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        ui.heading("Attendance QR Code");
        ui.add_space(10.0);

        // the scheduled refresh task for this view
        self.rt.block_on(self.poller.tick());

        ui.horizontal(|ui| {
            ui.label("Venue ID (optional):");
            ui.add(egui::TextEdit::singleline(&mut self.venue_id_input).desired_width(80.0));
            if ui.button("Regenerate now").clicked() {
                let venue = self.venue_scope();
                self.rt.block_on(self.poller.refresh(venue));
            }
        });

        if let Some(err) = self.poller.error() {
            ui.colored_label(egui::Color32::RED, err);
        }

        let current_id = self.poller.session().map(|s| s.session_id.clone());
        if current_id != self.qr_rendered_for {
            self.qr_texture = self.qr_texture_from_session(ctx);
            self.qr_rendered_for = current_id;
        }

        if let Some(session) = self.poller.session() {
            if let Some(name) = &session.venue_name {
                ui.label(format!("Venue: {name}"));
            }
            ui.label(format!("Session: {}", session.session_id));
        }
        if let Some(tex) = &self.qr_texture {
            ui.add_space(10.0);
            ui.image((tex.id(), tex.size_vec2()));
        }
        let remaining = self.poller.remaining_seconds();
        ui.add_space(5.0);
        ui.label(format!("Refreshes in {}:{:02}", remaining / 60, remaining % 60));
        ctx.request_repaint_after(std::time::Duration::from_secs(1));
    }

    fn show_mark(&mut self, ui: &mut egui::Ui) {
        ui.heading("Mark Attendance");
        ui.add_space(10.0);

        // drain whatever the watch delivered since the last frame
        self.location.pump(Utc::now());

        if self.submitter.succeeded() {
            ui.colored_label(egui::Color32::GREEN, "Attendance marked. You can close this window.");
            return;
        }

        egui::Grid::new("attendance_form").num_columns(2).show(ui, |ui| {
            ui.label("Session ID:");
            ui.text_edit_singleline(&mut self.session_id_input);
            ui.end_row();
            ui.label("Name:");
            ui.text_edit_singleline(&mut self.form.name);
            ui.end_row();
            ui.label("Email:");
            ui.text_edit_singleline(&mut self.form.email);
            ui.end_row();
            ui.label("Roll number:");
            ui.text_edit_singleline(&mut self.form.roll_no);
            ui.end_row();
            ui.label("Phone:");
            ui.text_edit_singleline(&mut self.form.phone);
            ui.end_row();
            ui.label("Branch:");
            ui.text_edit_singleline(&mut self.form.branch);
            ui.end_row();
            ui.label("Section:");
            ui.text_edit_singleline(&mut self.form.section);
            ui.end_row();
        });

        ui.add_space(10.0);
        ui.group(|ui| {
            ui.label("Location");
            ui.horizontal(|ui| {
                ui.label("Latitude:");
                ui.add(egui::TextEdit::singleline(&mut self.manual_lat).desired_width(120.0));
                ui.label("Longitude:");
                ui.add(egui::TextEdit::singleline(&mut self.manual_lon).desired_width(120.0));
                if ui.button("Set").clicked() {
                    match (self.manual_lat.trim().parse(), self.manual_lon.trim().parse()) {
                        (Ok(latitude), Ok(longitude)) => {
                            self.status = None;
                            let _ = self.fix_tx.send(RawFix {
                                latitude,
                                longitude,
                                accuracy: 0.0,
                            });
                            // the watch delivers asynchronously; pump again soon
                            ui.ctx().request_repaint_after(std::time::Duration::from_millis(100));
                        }
                        _ => self.status = Some("Latitude and longitude must be numbers.".into()),
                    }
                }
            });
            match self.location.reader().latest() {
                Some(fix) => {
                    ui.label(format!("Current fix: {:.6}, {:.6}", fix.latitude, fix.longitude));
                }
                None => {
                    ui.label("No location yet.");
                }
            }
            if let Some(err) = self.location.reader().error() {
                ui.colored_label(egui::Color32::RED, err.to_string());
            }
        });

        ui.add_space(10.0);
        ui.group(|ui| {
            ui.label("Selfie");
            ui.horizontal(|ui| {
                ui.add(egui::TextEdit::singleline(&mut self.selfie_path).desired_width(240.0));
                if ui.button("Load photo").clicked() {
                    match std::fs::read(self.selfie_path.trim()) {
                        Ok(bytes) => {
                            if image::load_from_memory(&bytes).is_ok() {
                                self.selfie_bytes = Some(bytes);
                                self.selfie_error = None;
                            } else {
                                self.selfie_bytes = None;
                                self.selfie_error = Some("That file is not a readable image.".into());
                            }
                        }
                        Err(e) => {
                            self.selfie_bytes = None;
                            self.selfie_error = Some(format!("Could not read photo: {e}"));
                        }
                    }
                }
            });
            if self.selfie_bytes.is_some() {
                ui.label("Photo attached.");
            }
            if let Some(err) = &self.selfie_error {
                ui.colored_label(egui::Color32::RED, err);
            }
        });

        ui.add_space(10.0);
        if ui.add_sized([200.0, 30.0], egui::Button::new("Submit attendance")).clicked() {
            let session_id = self.session_id_input.trim().to_string();
            let fix = self.location.reader().latest().copied();
            let form = self.form.clone();
            let selfie = self.selfie_bytes.clone();
            let session_opt = if session_id.is_empty() { None } else { Some(session_id.as_str()) };
            self.rt.block_on(self.submitter.submit(
                &form,
                fix.as_ref(),
                selfie.as_deref(),
                session_opt,
            ));
        }
        if let Some(err) = self.submitter.error() {
            ui.colored_label(egui::Color32::RED, err);
        }
        if self.submitter.phase() == Phase::Succeeded {
            ui.colored_label(egui::Color32::GREEN, "Attendance marked.");
        }
    }

    fn show_admin_login(&mut self, ui: &mut egui::Ui) {
        ui.vertical_centered(|ui| {
            ui.heading("Admin Login");
            ui.add_space(20.0);
            egui::Grid::new("login_form").num_columns(2).show(ui, |ui| {
                ui.label("Username:");
                ui.text_edit_singleline(&mut self.username);
                ui.end_row();
                ui.label("Password:");
                ui.add(egui::TextEdit::singleline(&mut self.password).password(true));
                ui.end_row();
            });
            ui.add_space(10.0);
            if ui.add_sized([200.0, 30.0], egui::Button::new("Log in")).clicked() {
                match self
                    .rt
                    .block_on(self.client.admin_login(&self.username, &self.password))
                {
                    Ok(()) => {
                        self.password.clear();
                        self.login_error = None;
                        self.profile = self.rt.block_on(self.client.me()).ok();
                        self.open(View::Dashboard);
                    }
                    Err(e) => {
                        self.login_error = Some(e.user_message());
                    }
                }
            }
            if let Some(err) = &self.login_error {
                ui.colored_label(egui::Color32::RED, err);
            }
        });
    }

    fn show_dashboard(&mut self, ui: &mut egui::Ui) {
        ui.heading("Dashboard");
        if let Some(profile) = &self.profile {
            ui.label(format!("Signed in as {}", profile.username));
        }
        ui.add_space(10.0);
        if let Some(summary) = &self.summary {
            ui.horizontal(|ui| {
                ui.group(|ui| {
                    ui.label("Records");
                    ui.heading(summary.total_records.to_string());
                });
                ui.group(|ui| {
                    ui.label("Sessions");
                    ui.heading(summary.total_sessions.to_string());
                });
                ui.group(|ui| {
                    ui.label("Venues");
                    ui.heading(summary.total_venues.to_string());
                });
                ui.group(|ui| {
                    ui.label("Flagged");
                    ui.heading(summary.flagged_count.to_string());
                });
            });
        }
        ui.add_space(10.0);
        if ui.button("Refresh").clicked() {
            self.refetch(View::Dashboard);
        }
    }

    fn show_records(&mut self, ui: &mut egui::Ui) {
        ui.heading("Attendance Records");
        ui.horizontal(|ui| {
            ui.label("Search:");
            ui.add(egui::TextEdit::singleline(&mut self.record_search).desired_width(200.0));
            if ui.button("Refresh").clicked() {
                self.refetch(View::Records);
            }
        });
        ui.add_space(5.0);
        let filtered = filter_records(&self.records, &self.record_search);
        let pages = filtered.len().div_ceil(RECORDS_PER_PAGE).max(1);
        self.record_page = self.record_page.min(pages - 1);
        ui.horizontal(|ui| {
            ui.label(format!("{} of {} records", filtered.len(), self.records.len()));
            if ui.button("Prev").clicked() && self.record_page > 0 {
                self.record_page -= 1;
            }
            ui.label(format!("page {}/{}", self.record_page + 1, pages));
            if ui.button("Next").clicked() && self.record_page + 1 < pages {
                self.record_page += 1;
            }
        });
        let page = filtered
            .iter()
            .skip(self.record_page * RECORDS_PER_PAGE)
            .take(RECORDS_PER_PAGE);
        egui::Grid::new("records_table").striped(true).show(ui, |ui| {
            for h in ["Roll No", "Name", "Branch", "Section", "Phone", "Venue", "Marked At"] {
                ui.strong(h);
            }
            ui.end_row();
            for r in page {
                ui.label(&r.roll_no);
                ui.label(&r.name);
                ui.label(&r.branch);
                ui.label(&r.section);
                ui.label(&r.phone);
                ui.label(r.venue_name.as_deref().unwrap_or("-"));
                ui.label(r.marked_at.format("%Y-%m-%d %H:%M").to_string());
                ui.end_row();
            }
        });
    }

    fn show_selfies(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        ui.heading("Selfies");
        ui.horizontal(|ui| {
            ui.label("Search:");
            ui.add(egui::TextEdit::singleline(&mut self.record_search).desired_width(200.0));
            if ui.button("Refresh").clicked() {
                self.selfie_textures.clear();
                self.refetch(View::Selfies);
            }
        });
        ui.add_space(5.0);
        let filtered: Vec<(i64, String, String, Option<String>)> =
            filter_records(&self.records, &self.record_search)
                .into_iter()
                .map(|r| (r.id, r.name.clone(), r.roll_no.clone(), r.selfie_url.clone()))
                .collect();
        for (id, _, _, selfie_url) in &filtered {
            let Some(url) = selfie_url else { continue };
            if !self.selfie_textures.contains_key(id) {
                if let Some(tex) = self.fetch_selfie_texture(url, &format!("selfie-{id}"), ctx) {
                    self.selfie_textures.insert(*id, tex);
                }
            }
        }
        let textures = &self.selfie_textures;
        ui.horizontal_wrapped(|ui| {
            for (id, name, roll_no, _) in &filtered {
                if let Some(tex) = textures.get(id) {
                    ui.vertical(|ui| {
                        ui.image((tex.id(), egui::vec2(120.0, 120.0)));
                        ui.label(format!("{name} ({roll_no})"));
                    });
                }
            }
        });
    }

    fn show_institutions(&mut self, ui: &mut egui::Ui) {
        ui.heading("Institutions");
        ui.horizontal(|ui| {
            ui.label("Search:");
            ui.add(egui::TextEdit::singleline(&mut self.institution_search).desired_width(200.0));
            if ui.button("Refresh").clicked() {
                self.refetch(View::Institutions);
            }
            if ui.button("Add institution").clicked() {
                self.institution_editor = Some(InstitutionEditor::default());
            }
        });
        ui.add_space(5.0);
        let rows: Vec<Institution> =
            filter_named(&self.institutions, &self.institution_search, |i| &i.name)
                .into_iter()
                .cloned()
                .collect();
        egui::Grid::new("institutions_table").striped(true).show(ui, |ui| {
            for h in ["Name", "City", "", ""] {
                ui.strong(h);
            }
            ui.end_row();
            for inst in rows {
                ui.label(&inst.name);
                ui.label(inst.city.as_deref().unwrap_or("-"));
                if ui.button("Edit").clicked() {
                    self.institution_editor = Some(InstitutionEditor {
                        id: Some(inst.id),
                        name: inst.name.clone(),
                        city: inst.city.clone().unwrap_or_default(),
                        error: None,
                    });
                }
                if ui.button("Delete").clicked() {
                    self.confirm_delete = Some(PendingDelete::Institution(inst.id, inst.name.clone()));
                }
                ui.end_row();
            }
        });
    }

    fn show_venues(&mut self, ui: &mut egui::Ui) {
        ui.heading("Venues");
        ui.horizontal(|ui| {
            ui.label("Search:");
            ui.add(egui::TextEdit::singleline(&mut self.venue_search).desired_width(200.0));
            if ui.button("Refresh").clicked() {
                self.refetch(View::Venues);
            }
            if ui.button("Add venue").clicked() {
                self.venue_editor = Some(VenueEditor::default());
            }
        });
        ui.add_space(5.0);
        let rows: Vec<Venue> = filter_named(&self.venues, &self.venue_search, |v| &v.name)
            .into_iter()
            .cloned()
            .collect();
        egui::Grid::new("venues_table").striped(true).show(ui, |ui| {
            for h in ["Name", "Address", "Lat", "Lon", "Radius (m)", "", ""] {
                ui.strong(h);
            }
            ui.end_row();
            for venue in rows {
                ui.label(&venue.name);
                ui.label(venue.address.as_deref().unwrap_or("-"));
                ui.label(venue.latitude.map_or("-".into(), |v| format!("{v:.6}")));
                ui.label(venue.longitude.map_or("-".into(), |v| format!("{v:.6}")));
                ui.label(venue.radius_meters.map_or("-".into(), |v| format!("{v:.0}")));
                if ui.button("Edit").clicked() {
                    self.venue_editor = Some(VenueEditor {
                        id: Some(venue.id),
                        name: venue.name.clone(),
                        address: venue.address.clone().unwrap_or_default(),
                        latitude: venue.latitude.map(|v| v.to_string()).unwrap_or_default(),
                        longitude: venue.longitude.map(|v| v.to_string()).unwrap_or_default(),
                        radius_meters: venue
                            .radius_meters
                            .map(|v| v.to_string())
                            .unwrap_or_default(),
                        institution_id: venue
                            .institution_id
                            .map(|v| v.to_string())
                            .unwrap_or_default(),
                        error: None,
                    });
                }
                if ui.button("Delete").clicked() {
                    self.confirm_delete = Some(PendingDelete::Venue(venue.id, venue.name.clone()));
                }
                ui.end_row();
            }
        });
    }

    fn show_flagged(&mut self, ui: &mut egui::Ui) {
        ui.heading("Flagged Logs");
        ui.horizontal(|ui| {
            ui.label("Search:");
            ui.add(egui::TextEdit::singleline(&mut self.flagged_search).desired_width(200.0));
            if ui.button("Refresh").clicked() {
                self.refetch(View::FlaggedLogs);
            }
        });
        ui.add_space(5.0);
        let filtered = filter_flagged(&self.flagged, &self.flagged_search);
        egui::Grid::new("flagged_table").striped(true).show(ui, |ui| {
            for h in ["When", "Roll No", "Reason", "Distance", "Allowed"] {
                ui.strong(h);
            }
            ui.end_row();
            for log in filtered {
                ui.label(log.created_at.format("%Y-%m-%d %H:%M").to_string());
                ui.label(log.roll_no.as_deref().unwrap_or("-"));
                ui.label(&log.reason);
                ui.label(log.distance_meters.map_or("-".into(), |d| format!("{d:.0} m")));
                ui.label(log.allowed_meters.map_or("-".into(), |d| format!("{d:.0} m")));
                ui.end_row();
            }
        });
    }

    fn show_statistics(&mut self, ui: &mut egui::Ui) {
        ui.heading("Statistics");
        if ui.button("Refresh").clicked() {
            self.refetch(View::Statistics);
        }
        ui.add_space(10.0);
        if let Some(summary) = &self.summary {
            ui.label(format!(
                "{} records across {} sessions, {} venues, {} flagged",
                summary.total_records,
                summary.total_sessions,
                summary.total_venues,
                summary.flagged_count
            ));
        }
        ui.add_space(10.0);
        ui.group(|ui| {
            ui.label("Daily attendance");
            egui::Grid::new("daily_stats").striped(true).show(ui, |ui| {
                for stat in &self.daily {
                    ui.label(stat.date.to_string());
                    ui.label(stat.count.to_string());
                    ui.end_row();
                }
            });
        });
        ui.add_space(10.0);
        ui.group(|ui| {
            ui.label("Per venue");
            egui::Grid::new("venue_stats").striped(true).show(ui, |ui| {
                for stat in &self.venue_stats {
                    ui.label(&stat.venue_name);
                    ui.label(stat.count.to_string());
                    ui.end_row();
                }
            });
        });
        ui.add_space(10.0);
        ui.horizontal(|ui| {
            ui.label("Venue ID:");
            ui.add(egui::TextEdit::singleline(&mut self.stats_venue_input).desired_width(80.0));
            if ui.button("Load venue breakdown").clicked() {
                if let Ok(id) = self.stats_venue_input.trim().parse::<i64>() {
                    match self.rt.block_on(self.client.stats_for_venue(id)) {
                        Ok(daily) => self.venue_daily = daily,
                        Err(e) => self.status = Some(e.user_message()),
                    }
                }
            }
        });
        if !self.venue_daily.is_empty() {
            egui::Grid::new("venue_daily").striped(true).show(ui, |ui| {
                for stat in &self.venue_daily {
                    ui.label(stat.date.to_string());
                    ui.label(stat.count.to_string());
                    ui.end_row();
                }
            });
        }
    }

    fn show_dialogs(&mut self, ctx: &egui::Context) {
        if let Some(mut editor) = self.institution_editor.take() {
            let mut open = true;
            let mut saved = false;
            egui::Window::new(if editor.id.is_some() { "Edit institution" } else { "New institution" })
                .collapsible(false)
                .open(&mut open)
                .show(ctx, |ui| {
                    egui::Grid::new("institution_editor").num_columns(2).show(ui, |ui| {
                        ui.label("Name:");
                        ui.text_edit_singleline(&mut editor.name);
                        ui.end_row();
                        ui.label("City:");
                        ui.text_edit_singleline(&mut editor.city);
                        ui.end_row();
                    });
                    if let Some(err) = &editor.error {
                        ui.colored_label(egui::Color32::RED, err);
                    }
                    if ui.button("Save").clicked() {
                        if editor.name.trim().is_empty() {
                            editor.error = Some("Name is required.".into());
                        } else {
                            let payload = NewInstitution {
                                name: editor.name.trim().to_string(),
                                city: if editor.city.trim().is_empty() {
                                    None
                                } else {
                                    Some(editor.city.trim().to_string())
                                },
                            };
                            let result = match editor.id {
                                Some(id) => self
                                    .rt
                                    .block_on(self.client.update_institution(id, &payload))
                                    .map(|_| ()),
                                None => self
                                    .rt
                                    .block_on(self.client.create_institution(&payload))
                                    .map(|_| ()),
                            };
                            match result {
                                Ok(()) => saved = true,
                                Err(e) => editor.error = Some(e.user_message()),
                            }
                        }
                    }
                });
            if saved {
                // close optimistically and re-fetch the full list
                self.refetch(View::Institutions);
            } else if open {
                self.institution_editor = Some(editor);
            }
        }

        if let Some(mut editor) = self.venue_editor.take() {
            let mut open = true;
            let mut saved = false;
            egui::Window::new(if editor.id.is_some() { "Edit venue" } else { "New venue" })
                .collapsible(false)
                .open(&mut open)
                .show(ctx, |ui| {
                    egui::Grid::new("venue_editor").num_columns(2).show(ui, |ui| {
                        ui.label("Name:");
                        ui.text_edit_singleline(&mut editor.name);
                        ui.end_row();
                        ui.label("Address:");
                        ui.text_edit_singleline(&mut editor.address);
                        ui.end_row();
                        ui.label("Latitude:");
                        ui.text_edit_singleline(&mut editor.latitude);
                        ui.end_row();
                        ui.label("Longitude:");
                        ui.text_edit_singleline(&mut editor.longitude);
                        ui.end_row();
                        ui.label("Radius (m):");
                        ui.text_edit_singleline(&mut editor.radius_meters);
                        ui.end_row();
                        ui.label("Institution ID:");
                        ui.text_edit_singleline(&mut editor.institution_id);
                        ui.end_row();
                    });
                    if let Some(err) = &editor.error {
                        ui.colored_label(egui::Color32::RED, err);
                    }
                    if ui.button("Save").clicked() {
                        match venue_payload(&editor) {
                            Ok(payload) => {
                                let result = match editor.id {
                                    Some(id) => self
                                        .rt
                                        .block_on(self.client.update_venue(id, &payload))
                                        .map(|_| ()),
                                    None => self
                                        .rt
                                        .block_on(self.client.create_venue(&payload))
                                        .map(|_| ()),
                                };
                                match result {
                                    Ok(()) => saved = true,
                                    Err(e) => editor.error = Some(e.user_message()),
                                }
                            }
                            Err(msg) => editor.error = Some(msg),
                        }
                    }
                });
            if saved {
                self.refetch(View::Venues);
            } else if open {
                self.venue_editor = Some(editor);
            }
        }

        if let Some(pending) = self.confirm_delete.take() {
            let (label, this) = match &pending {
                PendingDelete::Institution(_, name) => (format!("Delete institution \"{name}\"?"), "institution"),
                PendingDelete::Venue(_, name) => (format!("Delete venue \"{name}\"?"), "venue"),
            };
            let mut keep = true;
            egui::Window::new(format!("Confirm delete {this}"))
                .collapsible(false)
                .show(ctx, |ui| {
                    ui.label(label);
                    ui.horizontal(|ui| {
                        if ui.button("Delete").clicked() {
                            let result = match &pending {
                                PendingDelete::Institution(id, _) => {
                                    self.rt.block_on(self.client.delete_institution(*id))
                                }
                                PendingDelete::Venue(id, _) => {
                                    self.rt.block_on(self.client.delete_venue(*id))
                                }
                            };
                            match result {
                                Ok(()) => match &pending {
                                    PendingDelete::Institution(..) => self.refetch(View::Institutions),
                                    PendingDelete::Venue(..) => self.refetch(View::Venues),
                                },
                                Err(e) => self.status = Some(e.user_message()),
                            }
                            keep = false;
                        }
                        if ui.button("Cancel").clicked() {
                            keep = false;
                        }
                    });
                });
            if keep {
                self.confirm_delete = Some(pending);
            }
        }
    }
}

fn venue_payload(editor: &VenueEditor) -> Result<NewVenue, String> {
    if editor.name.trim().is_empty() {
        return Err("Name is required.".into());
    }
    let parse_opt = |s: &str, what: &str| -> Result<Option<f64>, String> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(None);
        }
        s.parse().map(Some).map_err(|_| format!("{what} must be a number."))
    };
    Ok(NewVenue {
        name: editor.name.trim().to_string(),
        address: if editor.address.trim().is_empty() {
            None
        } else {
            Some(editor.address.trim().to_string())
        },
        latitude: parse_opt(&editor.latitude, "Latitude")?,
        longitude: parse_opt(&editor.longitude, "Longitude")?,
        radius_meters: parse_opt(&editor.radius_meters, "Radius")?,
        institution_id: {
            let s = editor.institution_id.trim();
            if s.is_empty() {
                None
            } else {
                Some(s.parse().map_err(|_| "Institution ID must be a number.".to_string())?)
            }
        },
    })
}

impl eframe::App for AttendApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut Frame) {
        // the 401 gate: any request that came back unauthorized forces the
        // login view, regardless of which view fired it
        if self.client.session_expired() {
            self.clear_admin_state();
            self.login_error = Some("Your session has expired. Please log in again.".into());
            self.view = View::AdminLogin;
        }

        egui::TopBottomPanel::top("nav").show(ctx, |ui| {
            self.nav_bar(ui);
        });

        self.show_dialogs(ctx);

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::vertical().show(ui, |ui| {
                let frame = egui::Frame::default().inner_margin(egui::Margin::same(16.0));
                frame.show(ui, |ui| {
                    if let Some(status) = &self.status {
                        ui.colored_label(egui::Color32::YELLOW, status);
                        ui.add_space(5.0);
                    }
                    match self.view {
                        View::GenerateQr => self.show_generate(ui, ctx),
                        View::MarkAttendance => self.show_mark(ui),
                        View::AdminLogin => self.show_admin_login(ui),
                        View::Dashboard => self.show_dashboard(ui),
                        View::Records => self.show_records(ui),
                        View::Selfies => self.show_selfies(ui, ctx),
                        View::Institutions => self.show_institutions(ui),
                        View::Venues => self.show_venues(ui),
                        View::FlaggedLogs => self.show_flagged(ui),
                        View::Statistics => self.show_statistics(ui),
                    }
                });
            });
        });
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut native_options = eframe::NativeOptions::default();
    native_options.viewport.inner_size = Some(egui::vec2(960.0, 700.0));
    native_options.follow_system_theme = false;
    native_options.default_theme = eframe::Theme::Dark;

    let result = eframe::run_native(
        "QR Attendance",
        native_options,
        Box::new(|_cc| Box::new(AttendApp::default())),
    );

    result.map_err(|e| anyhow::anyhow!("failed to start GUI: {e}"))
}
