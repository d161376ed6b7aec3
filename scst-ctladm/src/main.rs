use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;

use clap::{Parser, Subcommand};
use tracing::{Level, debug, error, warn};
use tracing_subscriber::FmtSubscriber;

use scst_ctladm::logging::{self, DEBUG_ENV};
use scst_ctladm::metrics;
use scst_ctladm::scst::Scst;
use scst_ctladm::{Request, execute};

#[derive(Parser, Debug)]
#[command(name = "ctladm")]
#[command(about = "ctladm replacement for Linux SCST storage targets")]
struct Args {
    /// SCST sysfs root (detected when not set)
    #[arg(long, env = "SCST_ROOT")]
    scst_root: Option<PathBuf>,

    /// Log file (default /var/log/ctladm.log, ./ctladm.log when CTLADM_DEBUG=true)
    #[arg(long, env = "CTLADM_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "debug")]
    log_level: String,

    /// Write Prometheus metrics to this file on exit (textfile collector)
    #[arg(long, env = "CTLADM_METRICS_FILE")]
    metrics_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// List devices
    Devlist {
        /// Enable XML output
        #[arg(short = 'x', long = "xml")]
        xml: bool,
    },

    /// List ports
    Portlist {
        /// Enable XML output
        #[arg(short = 'x', long = "xml")]
        xml: bool,
    },

    /// Remove port (deactivates the device behind the LUN)
    Remove {
        /// Backend type, accepts only "block"
        #[arg(short = 'b', long = "backend", default_value = "block", value_parser = ["block"])]
        backend: String,

        /// LUN ID (relative target id)
        #[arg(short = 'l', long = "lun")]
        lun: String,
    },

    /// Create port (activates the device, provisions it first with -o file=<path>)
    Create {
        /// Backend type, accepts only "block"
        #[arg(short = 'b', long = "backend", default_value = "block", value_parser = ["block"])]
        backend: String,

        /// Backend options, e.g. file=/dev/zvol/tank/disk1
        #[arg(short = 'o', long = "options")]
        options: Vec<String>,

        /// Device ID
        #[arg(short = 'd', long = "device")]
        device: String,

        /// LUN ID
        #[arg(short = 'l', long = "lun")]
        lun: Option<String>,
    },
}

impl From<Command> for Request {
    fn from(command: Command) -> Self {
        match command {
            Command::Devlist { xml } => Request::DevList { xml },
            Command::Portlist { xml } => Request::PortList { xml },
            Command::Remove { backend, lun } => Request::Remove { backend, lun },
            Command::Create {
                backend,
                options,
                device,
                lun,
            } => Request::Create {
                backend,
                options,
                device,
                lun,
            },
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_logging(&args) {
        eprintln!("failed to initialize logging: {}", e);
    }

    // Initialize the metrics recorder if a textfile is configured
    let metrics_handle = match &args.metrics_file {
        Some(_) => match metrics::init_metrics() {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("Failed to initialize metrics: {}", e);
                None
            }
        },
        None => None,
    };

    let code = run(&args);

    if let (Some(handle), Some(path)) = (&metrics_handle, &args.metrics_file) {
        if let Err(e) = metrics::write_textfile(handle, path) {
            warn!("Failed to write metrics to {}: {}", path.display(), e);
        }
    }

    code
}

fn run(args: &Args) -> ExitCode {
    let request = Request::from(args.command.clone());
    debug!(request = ?request, "Parsed command");

    let scst = match &args.scst_root {
        Some(root) => Scst::new(root),
        None => match Scst::detect() {
            Ok(scst) => scst,
            Err(e) => {
                error!("{}", e);
                eprintln!("{}", e);
                return ExitCode::FAILURE;
            }
        },
    };
    debug!(root = %scst.root().display(), "Using SCST tree");

    match execute(&scst, &request) {
        Ok(output) => {
            if !output.is_empty() {
                println!("{}", output);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// Install the global subscriber, writing to the log file or stderr.
fn init_logging(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let debug_env = std::env::var(DEBUG_ENV).ok();
    if debug_env.as_deref() == Some("true") {
        eprintln!("WARNING! Running in development environment");
    }

    let path = logging::log_file_path(args.log_file.as_deref(), debug_env.as_deref());
    match logging::open_log_file(&path) {
        Ok(file) => {
            let subscriber = FmtSubscriber::builder()
                .with_max_level(level)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        Err(e) => {
            eprintln!(
                "failed to log to file {}, using stderr: {}",
                path.display(),
                e
            );
            let subscriber = FmtSubscriber::builder()
                .with_max_level(level)
                .with_writer(std::io::stderr)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }

    Ok(())
}
