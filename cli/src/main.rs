use std::io::{self, BufRead, Write};

use anyhow::{bail, Context, Result};
use api_client::AttendClient;
use chrono::Utc;
use clap::{Parser, Subcommand};
use domain::filter::filter_records;
use domain::{AttendanceForm, NewInstitution, NewVenue};
use flows::{AttendanceSubmitter, LocationReader, SessionPoller, SystemClock};
use qrcode::render::unicode;
use qrcode::QrCode;

#[derive(Parser)]
#[command(author, version, about = "QR attendance client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in with user credentials
    Login {
        username: String,
        password: String,
    },
    /// Log in with admin credentials
    AdminLogin {
        username: String,
        password: String,
    },
    /// Clear the stored token
    Logout,
    /// Show the currently authenticated user
    Whoami,
    /// Generate a QR session and render it in the terminal
    Generate {
        /// Scope the session to one venue
        #[arg(long)]
        venue: Option<i64>,
        /// Session lifetime in minutes
        #[arg(long, default_value_t = 2)]
        duration: u32,
        /// Keep running, refreshing the session as it expires
        #[arg(long)]
        watch: bool,
    },
    /// Mark attendance against a session
    Mark {
        #[arg(long)]
        session: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        roll_no: String,
        #[arg(long)]
        phone: String,
        #[arg(long)]
        branch: String,
        #[arg(long)]
        section: String,
        #[arg(long)]
        lat: f64,
        #[arg(long)]
        lon: f64,
        /// Path to the selfie image
        #[arg(long)]
        selfie: std::path::PathBuf,
    },
    /// List attendance records
    Records {
        /// Filter by name or roll number
        #[arg(long)]
        search: Option<String>,
    },
    /// Fetch the attendance report
    Report,
    /// Manage institutions
    Institutions {
        #[command(subcommand)]
        action: InstitutionCmd,
    },
    /// Manage venues
    Venues {
        #[command(subcommand)]
        action: VenueCmd,
    },
    /// List flagged logs
    Flagged,
    /// Attendance statistics
    Stats {
        #[command(subcommand)]
        action: StatsCmd,
    },
}

#[derive(Subcommand)]
enum InstitutionCmd {
    List,
    Create {
        name: String,
        #[arg(long)]
        city: Option<String>,
    },
    Delete {
        id: i64,
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum VenueCmd {
    List,
    Create {
        name: String,
        #[arg(long)]
        address: Option<String>,
        #[arg(long)]
        lat: Option<f64>,
        #[arg(long)]
        lon: Option<f64>,
        #[arg(long)]
        radius: Option<f64>,
        #[arg(long)]
        institution: Option<i64>,
    },
    Delete {
        id: i64,
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum StatsCmd {
    Daily,
    Summary,
    Venue,
    ByVenue { id: i64 },
}

fn confirm(prompt: &str) -> bool {
    print!("{prompt} [y/N] ");
    let _ = io::stdout().flush();
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line).is_err() {
        return false;
    }
    matches!(line.trim(), "y" | "Y" | "yes")
}

fn print_qr(contents: &str) -> Result<()> {
    let code = QrCode::new(contents.as_bytes()).context("QR encode failed")?;
    let rendered = code
        .render::<unicode::Dense1x2>()
        .dark_color(unicode::Dense1x2::Light)
        .light_color(unicode::Dense1x2::Dark)
        .build();
    println!("{rendered}");
    Ok(())
}

async fn run_generate(client: &AttendClient, venue: Option<i64>, duration: u32, watch: bool) -> Result<()> {
    let mut poller = SessionPoller::new(client.clone(), SystemClock, duration);
    poller.refresh(venue).await;
    let mut shown: Option<String> = None;
    loop {
        if let Some(err) = poller.error() {
            bail!("{err}");
        }
        if let Some(session) = poller.session() {
            if shown.as_deref() != Some(session.session_id.as_str()) {
                if let Some(name) = &session.venue_name {
                    println!("Venue: {name}");
                }
                println!("Session: {}", session.session_id);
                let url = format!("{}/mark-attendance/{}", client.base_url(), session.session_id);
                print_qr(&url)?;
                println!("Expires at {}", session.expires_at);
                shown = Some(session.session_id.clone());
            }
        }
        if !watch {
            return Ok(());
        }
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        poller.tick().await;
    }
}

async fn run_mark(
    client: &AttendClient,
    session: String,
    form: AttendanceForm,
    lat: f64,
    lon: f64,
    selfie_path: std::path::PathBuf,
) -> Result<()> {
    let mut location = LocationReader::new();
    location.set_manual(lat, lon, Utc::now());
    if let Some(err) = location.error() {
        bail!("{err}");
    }
    let selfie = std::fs::read(&selfie_path)
        .with_context(|| format!("could not read selfie at {}", selfie_path.display()))?;

    let mut submitter = AttendanceSubmitter::new(client.clone());
    submitter
        .submit(&form, location.latest(), Some(selfie.as_slice()), Some(session.as_str()))
        .await;
    if let Some(err) = submitter.error() {
        bail!("{err}");
    }
    println!("Attendance marked.");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let client = AttendClient::new();

    match cli.command {
        Commands::Login { username, password } => {
            let profile = client.login(&username, &password).await?;
            println!("Logged in as {}", profile.username);
        }
        Commands::AdminLogin { username, password } => {
            client.admin_login(&username, &password).await?;
            println!("Admin login successful.");
        }
        Commands::Logout => {
            client.logout();
            println!("Logged out.");
        }
        Commands::Whoami => match client.verify().await? {
            Some(profile) => println!("{} ({})", profile.username, profile.email.as_deref().unwrap_or("-")),
            None => println!("Not logged in."),
        },
        Commands::Generate { venue, duration, watch } => {
            run_generate(&client, venue, duration, watch).await?;
        }
        Commands::Mark {
            session,
            name,
            email,
            roll_no,
            phone,
            branch,
            section,
            lat,
            lon,
            selfie,
        } => {
            let form = AttendanceForm {
                name,
                email,
                roll_no,
                phone,
                branch,
                section,
            };
            run_mark(&client, session, form, lat, lon, selfie).await?;
        }
        Commands::Records { search } => {
            let records = client.attendance_records().await?;
            let query = search.unwrap_or_default();
            for r in filter_records(&records, &query) {
                println!(
                    "{}  {}  {} {}  {}  {}",
                    r.marked_at.format("%Y-%m-%d %H:%M"),
                    r.roll_no,
                    r.branch,
                    r.section,
                    r.name,
                    r.venue_name.as_deref().unwrap_or("-")
                );
            }
        }
        Commands::Report => {
            let records = client.attendance_report().await?;
            println!("{} records in report", records.len());
            for r in records {
                println!("{}  {}  {}", r.marked_at.format("%Y-%m-%d"), r.roll_no, r.name);
            }
        }
        Commands::Institutions { action } => match action {
            InstitutionCmd::List => {
                for i in client.institutions().await? {
                    println!("{}  {}  {}", i.id, i.name, i.city.as_deref().unwrap_or("-"));
                }
            }
            InstitutionCmd::Create { name, city } => {
                let created = client.create_institution(&NewInstitution { name, city }).await?;
                println!("Created institution {} ({})", created.name, created.id);
            }
            InstitutionCmd::Delete { id, yes } => {
                if yes || confirm(&format!("Delete institution {id}?")) {
                    client.delete_institution(id).await?;
                    println!("Deleted.");
                }
            }
        },
        Commands::Venues { action } => match action {
            VenueCmd::List => {
                for v in client.venues().await? {
                    println!(
                        "{}  {}  {}  ({:?}, {:?}) r={:?}",
                        v.id,
                        v.name,
                        v.address.as_deref().unwrap_or("-"),
                        v.latitude,
                        v.longitude,
                        v.radius_meters
                    );
                }
            }
            VenueCmd::Create {
                name,
                address,
                lat,
                lon,
                radius,
                institution,
            } => {
                let created = client
                    .create_venue(&NewVenue {
                        name,
                        address,
                        latitude: lat,
                        longitude: lon,
                        radius_meters: radius,
                        institution_id: institution,
                    })
                    .await?;
                println!("Created venue {} ({})", created.name, created.id);
            }
            VenueCmd::Delete { id, yes } => {
                if yes || confirm(&format!("Delete venue {id}?")) {
                    client.delete_venue(id).await?;
                    println!("Deleted.");
                }
            }
        },
        Commands::Flagged => {
            for log in client.flagged_logs().await? {
                println!(
                    "{}  {}  {}  {}",
                    log.created_at.format("%Y-%m-%d %H:%M"),
                    log.roll_no.as_deref().unwrap_or("-"),
                    log.reason,
                    log.distance_meters
                        .map(|d| format!("{d:.0} m"))
                        .unwrap_or_else(|| "-".into())
                );
            }
        }
        Commands::Stats { action } => match action {
            StatsCmd::Daily => {
                for stat in client.stats_daily().await? {
                    println!("{}  {}", stat.date, stat.count);
                }
            }
            StatsCmd::Summary => {
                let s = client.stats_summary().await?;
                println!("records:  {}", s.total_records);
                println!("sessions: {}", s.total_sessions);
                println!("venues:   {}", s.total_venues);
                println!("flagged:  {}", s.flagged_count);
            }
            StatsCmd::Venue => {
                for stat in client.stats_by_all_venues().await? {
                    println!("{}  {}  {}", stat.venue_id, stat.venue_name, stat.count);
                }
            }
            StatsCmd::ByVenue { id } => {
                for stat in client.stats_for_venue(id).await? {
                    println!("{}  {}", stat.date, stat.count);
                }
            }
        },
    }
    Ok(())
}
