use anyhow::{anyhow, bail, Result};
use clap::{Args, Parser, Subcommand};
use facemark_client::dataset::{self, REBUILD_FAILED, REBUILD_STARTED};
use facemark_client::recognition::{self, RECOGNITION_FAILED};
use facemark_client::roster::{ADD_FAILED, DELETE_FAILED, LOAD_FAILED, UPDATE_FAILED};
use facemark_client::{
    ApiClient, AttendanceLog, ClientError, Config, DatasetPanel, DeleteOutcome, NewStudent,
    PollerEvent, PollerOptions, RecognitionPoller, Roster, StillImage, StudentUpdate, WebcamSource,
};
use facemark_core::catalog::{SLOTS, SUBJECTS};
use facemark_core::export::NO_SUBJECT;
use facemark_core::{
    AttendanceFilter, ClassSession, NewAttendance, Observation, RecognitionSession, Status,
    Tolerance,
};
use facemark_hw::{CaptureRequest, EncodedImage, Webcam};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "facemark", about = "Face-recognition attendance client")]
struct Cli {
    /// Backend base URL (overrides FACEMARK_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,
    /// Print JSON instead of tables
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the student roster
    Students {
        #[command(subcommand)]
        action: StudentCommand,
    },
    /// Recognize a single still from a file or the camera
    Recognize {
        /// Image file; captures from the camera when omitted
        #[arg(short, long)]
        image: Option<PathBuf>,
        #[arg(short, long)]
        tolerance: Option<f32>,
        #[arg(short, long)]
        subject: Option<String>,
    },
    /// Poll the camera and mark students as they are recognized (Ctrl-C to stop)
    Live {
        #[arg(short, long)]
        subject: Option<String>,
        #[arg(long)]
        slot: Option<String>,
        #[arg(short, long)]
        tolerance: Option<f32>,
        /// Camera device (overrides FACEMARK_CAMERA_DEVICE)
        #[arg(short, long)]
        device: Option<String>,
    },
    /// Browse, export and edit the attendance log
    Attendance {
        #[command(subcommand)]
        action: AttendanceCommand,
    },
    /// Recognition dataset administration
    Dataset {
        #[command(subcommand)]
        action: DatasetCommand,
    },
    /// List subjects and time slots
    Subjects,
    /// Camera diagnostics
    Camera {
        #[command(subcommand)]
        action: CameraCommand,
    },
}

#[derive(Subcommand)]
enum StudentCommand {
    /// List students
    List {
        /// Case-insensitive match on name or ID
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Show one student
    Show { id: String },
    /// Add a student with a face photo
    Add {
        #[arg(short, long)]
        name: String,
        #[arg(long)]
        id: String,
        #[arg(long)]
        image: PathBuf,
        /// Send the photo inline as base64 instead of multipart
        #[arg(long)]
        inline: bool,
    },
    /// Edit a student's name, ID or photo
    Edit {
        id: String,
        #[arg(short, long)]
        name: String,
        #[arg(long)]
        new_id: Option<String>,
        #[arg(long)]
        image: Option<PathBuf>,
    },
    /// Remove a student
    Remove {
        id: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Args)]
struct FilterArgs {
    /// Earliest date, YYYY-MM-DD
    #[arg(long)]
    from: Option<String>,
    /// Latest date (inclusive), YYYY-MM-DD
    #[arg(long)]
    to: Option<String>,
    #[arg(long)]
    student: Option<String>,
    /// present, absent or late
    #[arg(long)]
    status: Option<String>,
    #[arg(long)]
    subject: Option<String>,
    /// Case-insensitive match on student name or ID
    #[arg(short, long)]
    search: Option<String>,
}

impl FilterArgs {
    fn build(&self) -> Result<AttendanceFilter> {
        let mut filter = AttendanceFilter::default();
        if let Some(from) = &self.from {
            filter.set_start_date(from)?;
        }
        if let Some(to) = &self.to {
            filter.set_end_date(to)?;
        }
        if let Some(status) = &self.status {
            filter.set_status(status)?;
        }
        filter.set_student_id(self.student.as_deref().unwrap_or(""));
        filter.set_subject(self.subject.as_deref().unwrap_or(""));
        filter.set_search(self.search.as_deref().unwrap_or(""));
        Ok(filter)
    }
}

#[derive(Subcommand)]
enum AttendanceCommand {
    /// List records matching the filters
    List {
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Export records matching the filters to CSV
    Export {
        #[command(flatten)]
        filter: FilterArgs,
        /// Output directory (overrides FACEMARK_EXPORT_DIR)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Mark attendance manually
    Mark {
        student_id: String,
        #[arg(long, default_value = "present")]
        status: String,
    },
}

#[derive(Subcommand)]
enum DatasetCommand {
    /// Trigger a backend dataset rebuild
    Rebuild,
    /// Check a selection of face photos, optionally rebuilding afterwards
    Stage {
        files: Vec<PathBuf>,
        #[arg(long)]
        rebuild: bool,
    },
}

#[derive(Subcommand)]
enum CameraCommand {
    /// List V4L2 capture devices
    Devices,
    /// Capture one still and report the negotiated resolution
    Test {
        #[arg(short, long)]
        device: Option<String>,
        /// Save the captured JPEG here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let mut config = Config::load()?;
    if let Some(url) = cli.api_url {
        config.api_url = url;
    }

    match cli.command {
        Commands::Students { action } => students(&config, action, cli.json).await,
        Commands::Recognize {
            image,
            tolerance,
            subject,
        } => recognize(&config, image, tolerance, subject).await,
        Commands::Live {
            subject,
            slot,
            tolerance,
            device,
        } => live(&config, subject, slot, tolerance, device).await,
        Commands::Attendance { action } => attendance(&config, action, cli.json).await,
        Commands::Dataset { action } => dataset_admin(&config, action).await,
        Commands::Subjects => {
            println!("Subjects:");
            for s in &SUBJECTS {
                println!("  {:<6} {:<34} {}", s.code, s.name, s.description);
            }
            println!("Slots:");
            for s in &SLOTS {
                println!("  {:<6} {:<20} {}", s.id, s.time, s.description);
            }
            Ok(())
        }
        Commands::Camera { action } => camera(&config, action),
    }
}

fn api(config: &Config) -> Result<ApiClient> {
    Ok(ApiClient::new(&config.api_url, config.request_timeout)?)
}

/// Log the full error and surface the user-facing message.
fn fail(err: ClientError, fallback: &str) -> anyhow::Error {
    tracing::debug!(error = %err, "command failed");
    anyhow!(err.user_message(fallback))
}

fn tolerance(config: &Config, flag: Option<f32>) -> Result<Tolerance> {
    match flag {
        Some(t) => Ok(Tolerance::new(t)?),
        None => Ok(config.tolerance),
    }
}

fn confirm(prompt: &str) -> bool {
    print!("{prompt} [y/N] ");
    if std::io::stdout().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    if std::io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim(), "y" | "Y" | "yes")
}

async fn students(config: &Config, action: StudentCommand, json: bool) -> Result<()> {
    let mut roster = Roster::new(api(config)?);

    match action {
        StudentCommand::List { search } => {
            roster.refresh().await.map_err(|e| fail(e, LOAD_FAILED))?;
            roster.set_query(search.unwrap_or_default());
            let shown = roster.filtered();
            if json {
                println!("{}", serde_json::to_string_pretty(&shown)?);
                return Ok(());
            }
            if shown.is_empty() {
                println!("No students found");
                return Ok(());
            }
            println!("{:<16} NAME", "ID");
            for s in &shown {
                println!("{:<16} {}", s.id, s.name);
            }
            println!("{} of {} students", shown.len(), roster.students().len());
        }
        StudentCommand::Show { id } => {
            let student = roster.get(&id).await.map_err(|e| fail(e, LOAD_FAILED))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&student)?);
            } else {
                println!("ID:    {}", student.id);
                println!("Name:  {}", student.name);
                println!("Photo: {}", if student.image.is_some() { "yes" } else { "no" });
            }
        }
        StudentCommand::Add {
            name,
            id,
            image,
            inline,
        } => {
            let photo = EncodedImage::from_file(&image)?;
            let added = if inline {
                roster.create_inline(&name, &id, &photo).await
            } else {
                roster
                    .create(NewStudent {
                        name,
                        id,
                        image: Some(photo),
                    })
                    .await
            };
            let ack = added.map_err(|e| fail(e, ADD_FAILED))?;
            println!("{}", ack.message);
        }
        StudentCommand::Edit {
            id,
            name,
            new_id,
            image,
        } => {
            let image = image.as_deref().map(EncodedImage::from_file).transpose()?;
            let update = StudentUpdate {
                name,
                new_id: new_id.unwrap_or_else(|| id.clone()),
                image,
            };
            let ack = roster
                .update(&id, update)
                .await
                .map_err(|e| fail(e, UPDATE_FAILED))?;
            println!("{}", ack.message);
        }
        StudentCommand::Remove { id, yes } => {
            roster.refresh().await.map_err(|e| fail(e, LOAD_FAILED))?;
            let outcome = roster
                .delete(&id, |s| {
                    yes || confirm(&format!("Delete {} ({})?", s.name, s.id))
                })
                .await
                .map_err(|e| fail(e, DELETE_FAILED))?;
            match outcome {
                DeleteOutcome::Deleted(ack) => println!("{}", ack.message),
                DeleteOutcome::Cancelled => println!("Cancelled"),
            }
        }
    }
    Ok(())
}

async fn recognize(
    config: &Config,
    image: Option<PathBuf>,
    tolerance_flag: Option<f32>,
    subject: Option<String>,
) -> Result<()> {
    let api = api(config)?;
    let tolerance = tolerance(config, tolerance_flag)?;
    let mut session = RecognitionSession::new(ClassSession::new(subject.as_deref(), None));

    let outcome = match image {
        Some(path) => {
            let mut still = StillImage::open(&path)?;
            recognition::recognize_once(&mut still, &api, &mut session, tolerance).await
        }
        None => {
            let mut camera = WebcamSource::acquire(&capture_request(config, None))
                .map_err(|e| fail(e, RECOGNITION_FAILED))?;
            let outcome =
                recognition::recognize_once(&mut camera, &api, &mut session, tolerance).await;
            camera.release();
            outcome
        }
    };
    let (_, observation) = outcome.map_err(|e| fail(e, RECOGNITION_FAILED))?;

    match observation {
        Observation::Marked(result) => println!("{}", session.marked_message(&result)),
        Observation::AlreadyMarked(result) => {
            println!("{} ({}) already marked", result.name, result.id)
        }
        Observation::Unknown => println!("No registered face recognized"),
    }
    Ok(())
}

fn capture_request(config: &Config, device: Option<String>) -> CaptureRequest {
    CaptureRequest {
        device_path: device.unwrap_or_else(|| config.camera_device.clone()),
        ..CaptureRequest::default()
    }
}

async fn live(
    config: &Config,
    subject: Option<String>,
    slot: Option<String>,
    tolerance_flag: Option<f32>,
    device: Option<String>,
) -> Result<()> {
    let class = ClassSession::new(subject.as_deref(), slot.as_deref());
    if !class.is_selected() {
        bail!("Please select a subject before starting recognition");
    }
    let options = PollerOptions {
        tolerance: tolerance(config, tolerance_flag)?,
        interval: config.poll_interval,
        class,
    };

    let camera = WebcamSource::acquire(&capture_request(config, device))
        .map_err(|e| fail(e, RECOGNITION_FAILED))?;
    let (tx, mut rx) = mpsc::channel(32);
    let handle = RecognitionPoller::start(camera.clone(), api(config)?, options, tx);
    println!("Recognizing every {:?}. Press Ctrl-C to stop.", config.poll_interval);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    // Deadline of the "Attendance Marked" confirmation currently shown.
    let mut flash: Option<tokio::time::Instant> = None;
    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            _ = tokio::time::sleep_until(flash.unwrap_or_else(tokio::time::Instant::now)),
                if flash.is_some() =>
            {
                flash = None;
                println!("Ready for the next student");
            }
            event = rx.recv() => match event {
                Some(PollerEvent::AttendanceMarked {
                    message,
                    flash_until,
                    ..
                }) => {
                    println!("Attendance Marked: {message}");
                    flash = Some(tokio::time::Instant::from_std(flash_until));
                }
                Some(PollerEvent::Error { message }) => eprintln!("{message}"),
                Some(PollerEvent::Observed(result)) => {
                    tracing::debug!(name = %result.name, id = %result.id, "observed");
                }
                None => break,
            },
        }
    }

    let session = handle.stop().await?;
    camera.release();

    println!(
        "\nSession ended: {} ticks, {} errors, {} marked present",
        session.ticks(),
        session.errors(),
        session.marked().len()
    );
    for result in session.marked() {
        println!("  {:<16} {}", result.id, result.name);
    }
    Ok(())
}

async fn attendance(config: &Config, action: AttendanceCommand, json: bool) -> Result<()> {
    let mut log = AttendanceLog::new(api(config)?);

    match action {
        AttendanceCommand::List { filter } => {
            log.set_filter(filter.build()?);
            log.refresh().await.map_err(|e| fail(e, LOAD_FAILED))?;
            let rows = log.filtered();
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
                return Ok(());
            }
            if rows.is_empty() {
                println!("No attendance records found");
                return Ok(());
            }
            println!(
                "{:<6} {:<14} {:<24} {:<8} {:<20} STATUS",
                "ID", "STUDENT", "NAME", "SUBJECT", "TIME"
            );
            for r in &rows {
                println!(
                    "{:<6} {:<14} {:<24} {:<8} {:<20} {}",
                    r.id,
                    r.student_id,
                    r.student_name,
                    r.subject.as_deref().unwrap_or(NO_SUBJECT),
                    r.timestamp,
                    r.status
                );
            }
            println!("{} of {} records", rows.len(), log.records().len());
        }
        AttendanceCommand::Export { filter, dir } => {
            log.set_filter(filter.build()?);
            log.refresh().await.map_err(|e| fail(e, LOAD_FAILED))?;
            let dir = dir.unwrap_or_else(|| config.export_dir.clone());
            let now = chrono::Local::now().naive_local();
            let path = log.export_to(&dir, now).await?;
            println!("Exported {} records to {}", log.filtered().len(), path.display());
        }
        AttendanceCommand::Mark { student_id, status } => {
            let status: Status = status.parse()?;
            let student = log
                .api()
                .get_student(&student_id)
                .await
                .map_err(|e| fail(e, LOAD_FAILED))?;
            let record = NewAttendance {
                student_id: student.id,
                student_name: student.name,
                timestamp: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
                status,
            };
            let ack = log
                .mark(&record)
                .await
                .map_err(|e| fail(e, "Failed to mark attendance"))?;
            println!("{}", ack.message);
        }
    }
    Ok(())
}

async fn dataset_admin(config: &Config, action: DatasetCommand) -> Result<()> {
    let panel = DatasetPanel::new(api(config)?);

    let rebuild = match action {
        DatasetCommand::Rebuild => true,
        DatasetCommand::Stage { files, rebuild } => {
            let staged = dataset::stage_selection(&files).map_err(|e| fail(e, REBUILD_FAILED))?;
            println!("{} image(s) selected", staged.len());
            for path in &staged {
                println!("  {}", path.display());
            }
            rebuild
        }
    };

    if rebuild {
        panel.rebuild().await.map_err(|e| fail(e, REBUILD_FAILED))?;
        println!("{REBUILD_STARTED}");
    }
    Ok(())
}

fn camera(config: &Config, action: CameraCommand) -> Result<()> {
    match action {
        CameraCommand::Devices => {
            let devices = facemark_hw::list_devices();
            if devices.is_empty() {
                println!("No video capture devices found");
            }
            for d in &devices {
                println!("{:<14} {} ({}, {})", d.path, d.name, d.driver, d.bus);
            }
        }
        CameraCommand::Test { device, output } => {
            let request = capture_request(config, device);
            println!("Opening {}...", request.device_path);
            let webcam = Webcam::acquire(&request).map_err(|e| anyhow!(e.user_message()))?;
            let frame = webcam.capture_frame()?;
            let still = frame.encode_jpeg()?;
            println!(
                "Captured frame #{} at {}x{} ({} bytes JPEG)",
                frame.sequence,
                still.width,
                still.height,
                still.bytes.len()
            );
            if let Some(path) = output {
                std::fs::write(&path, &still.bytes)?;
                println!("Saved to {}", path.display());
            }
            facemark_hw::release(Some(webcam));
        }
    }
    Ok(())
}
