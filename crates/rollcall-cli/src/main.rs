//! rollcall - push spreadsheet attendance to a Canvas assignment.
//!
//! Reads an attendance sheet and a Canvas ID roster, matches students by
//! name, and posts one attendance grade per student.

use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use rollcall_core::auth::{load_token, CredentialStore};
use rollcall_core::sheets;
use rollcall_core::{
    interpret, AttendanceRow, CanvasClient, Config, DryRunClient, GradingClient, ReconcileError,
    RosterIndex, RosterRow, SubmissionReport, Submitter,
};

#[derive(Parser)]
#[command(name = "rollcall", version, about = "Post attendance grades from a spreadsheet to Canvas")]
struct Cli {
    /// More log output (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Match both sheets and post grades
    Submit(SubmitArgs),
    /// Match both sheets and report problems without posting anything
    Check(InputArgs),
    /// Manage the Canvas token stored in the OS keychain
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum TokenAction {
    /// Prompt for a token and store it
    Set,
    /// Remove the stored token
    Clear,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the config file location
    Path,
}

#[derive(Args)]
struct InputArgs {
    /// Attendance workbook (.xlsx, .xls, .ods or .csv)
    #[arg(long)]
    attendance: Option<PathBuf>,

    /// Worksheet inside the attendance workbook
    #[arg(long)]
    attendance_sheet: Option<String>,

    /// Canvas ID roster workbook
    #[arg(long)]
    ids: Option<PathBuf>,

    /// Worksheet inside the ID roster workbook
    #[arg(long)]
    ids_sheet: Option<String>,
}

impl InputArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(ref path) = self.attendance {
            config.attendance_path = Some(path.clone());
        }
        if let Some(ref sheet) = self.attendance_sheet {
            config.attendance_sheet = Some(sheet.clone());
        }
        if let Some(ref path) = self.ids {
            config.ids_path = Some(path.clone());
        }
        if let Some(ref sheet) = self.ids_sheet {
            config.ids_sheet = Some(sheet.clone());
        }
    }
}

#[derive(Args)]
struct SubmitArgs {
    #[command(flatten)]
    inputs: InputArgs,

    /// Canvas course ID
    #[arg(long)]
    course: Option<u64>,

    /// Canvas assignment ID
    #[arg(long)]
    assignment: Option<u64>,

    /// Canvas API root, e.g. https://school.instructure.com/api/v1
    #[arg(long)]
    base_url: Option<String>,

    /// Maximum simultaneous grade updates
    #[arg(long)]
    max_concurrent: Option<usize>,

    /// Seconds before a single grade update is given up
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Post nothing if any attendance row names an unknown student
    #[arg(long)]
    abort_on_unknown: bool,

    /// Log the grades that would be posted instead of posting them
    #[arg(long)]
    dry_run: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

impl SubmitArgs {
    fn apply(&self, config: &mut Config) {
        self.inputs.apply(config);
        if let Some(course) = self.course {
            config.course_id = Some(course);
        }
        if let Some(assignment) = self.assignment {
            config.assignment_id = Some(assignment);
        }
        if let Some(ref url) = self.base_url {
            config.base_url = url.clone();
        }
        if let Some(n) = self.max_concurrent {
            config.max_concurrent = n;
        }
        if let Some(secs) = self.timeout_secs {
            config.request_timeout_secs = secs;
        }
        if self.abort_on_unknown {
            config.abort_on_unknown = true;
        }
    }
}

/// Initialize the tracing subscriber for logging
fn init_tracing(verbose: u8) {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = match cli.config {
        Some(ref path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Command::Submit(args) => {
            args.apply(&mut config);
            submit(&config, &args).await
        }
        Command::Check(inputs) => {
            inputs.apply(&mut config);
            check(&config)
        }
        Command::Token { action } => {
            token(&config, action)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Config { action } => {
            match action {
                ConfigAction::Show => println!("{}", serde_json::to_string_pretty(&config)?),
                ConfigAction::Path => {
                    let path = match cli.config {
                        Some(path) => path,
                        None => Config::config_path()?,
                    };
                    println!("{}", path.display());
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_index(config: &Config) -> Result<RosterIndex> {
    let path = config.ids_input()?;
    let rows = sheets::load_rows(path, config.ids_sheet.as_deref())?;
    let index = RosterIndex::build(
        sheets::data_rows(rows).map(|r| RosterRow::from_cells(r.number, &r.cells)),
    )
    .with_context(|| format!("Failed to build ID roster from {}", path.display()))?;

    info!(students = index.len(), "ID roster loaded");
    Ok(index)
}

fn load_attendance(config: &Config) -> Result<Vec<AttendanceRow>> {
    let path = config.attendance_input()?;
    let rows = sheets::load_rows(path, config.attendance_sheet.as_deref())?;
    let rows: Vec<AttendanceRow> = sheets::data_rows(rows)
        .map(|r| AttendanceRow::from_cells(r.number, &r.cells))
        .collect();

    info!(rows = rows.len(), "Attendance sheet loaded");
    Ok(rows)
}

async fn submit(config: &Config, args: &SubmitArgs) -> Result<ExitCode> {
    config.validate()?;
    let index = load_index(config)?;
    let rows = load_attendance(config)?;

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if relay_interrupts(tokio::signal::ctrl_c, stop_tx).await {
            eprintln!("Interrupted again, exiting");
            std::process::exit(130);
        }
    });

    let report = if args.dry_run {
        run_submission(DryRunClient::new(), config, stop_rx, &rows, &index).await?
    } else {
        let (token, source) = load_token(config)?;
        info!(source = %source, "Canvas token loaded");

        let course = config.course_id.context("course_id is not set")?;
        let assignment = config.assignment_id.context("assignment_id is not set")?;
        let client = CanvasClient::new(&config.base_url, course, assignment, config.request_timeout())?
            .with_token(token);
        run_submission(client, config, stop_rx, &rows, &index).await?
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report);
    }

    Ok(if report.is_complete_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

/// The first interrupt stops new grade updates while in-flight ones finish.
/// Returns `true` once a second interrupt arrives.
async fn relay_interrupts<F, Fut>(mut interrupted: F, stop: watch::Sender<bool>) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<()>>,
{
    if let Err(e) = interrupted().await {
        warn!(error = %e, "Cannot listen for Ctrl-C");
        return false;
    }
    warn!("Interrupted, finishing grade updates already in flight (Ctrl-C again to quit)");
    let _ = stop.send(true);

    interrupted().await.is_ok()
}

async fn run_submission<C: GradingClient>(
    client: C,
    config: &Config,
    stop: watch::Receiver<bool>,
    rows: &[AttendanceRow],
    index: &RosterIndex,
) -> Result<SubmissionReport> {
    let submitter = Submitter::new(client, config.submit_options()).with_stop_signal(stop);
    Ok(submitter.submit_rows(rows, index).await?)
}

fn check(config: &Config) -> Result<ExitCode> {
    let index = load_index(config)?;
    let rows = load_attendance(config)?;
    let mut problems = 0;

    for dup in index.duplicates() {
        println!(
            "roster row {:>4}  duplicate name {}: using {} instead of {}",
            dup.row, dup.identity, dup.replaced_by, dup.replaced
        );
    }

    for row in &rows {
        let problem = match interpret(row) {
            Ok(record) if index.lookup(&record.identity).is_some() => None,
            Ok(record) => Some(ReconcileError::UnknownStudent {
                identity: record.identity,
            }),
            Err(err) => Some(err),
        };
        if let Some(err) = problem {
            problems += 1;
            println!("row {:>4}  {}", row.row, err);
        }
    }

    println!("{} attendance rows checked, {} problems", rows.len(), problems);
    Ok(if problems == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn token(config: &Config, action: TokenAction) -> Result<()> {
    match action {
        TokenAction::Set => {
            let token = rpassword::prompt_password(format!("Canvas token for {}: ", config.base_url))
                .context("Failed to read token")?;
            let token = token.trim();
            if token.is_empty() {
                anyhow::bail!("Token is empty");
            }
            if CredentialStore::has_token(&config.base_url) {
                info!(base_url = %config.base_url, "Replacing stored token");
            }
            CredentialStore::store(&config.base_url, token)?;
            println!("Token stored in the OS keychain for {}", config.base_url);
        }
        TokenAction::Clear => {
            CredentialStore::delete(&config.base_url)?;
            println!("Token removed for {}", config.base_url);
        }
    }
    Ok(())
}
