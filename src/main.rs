use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use depscan::{
    cache::ExpiringCache,
    checker::QueryMode,
    config::Config,
    model::{Exclusion, MavenArtifact, Report, Severity},
    output::{format_report_to_string, print_report, OutputFormat},
    MavenRequest, VulnerabilityService,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::future::Future;
use std::io::Read;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Exit codes for CI integration
mod exit_codes {
    pub const SUCCESS: u8 = 0;
    pub const CRITICAL_VULN: u8 = 2;
    pub const HIGH_VULN: u8 = 3;
    pub const MEDIUM_VULN: u8 = 4;
    pub const LOW_VULN: u8 = 5;
    pub const ERROR: u8 = 1;
}

#[derive(Parser)]
#[command(name = "depscan")]
#[command(
    author,
    version,
    about = "Check Maven and npm dependency graphs for known vulnerabilities"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a Maven artifact's dependency tree and check every dependency
    Maven {
        #[command(flatten)]
        artifact: ArtifactArgs,

        /// Read a pre-generated `mvn dependency:tree` report instead of running Maven ("-" for stdin)
        #[arg(long, value_name = "PATH")]
        tree_file: Option<String>,

        #[command(flatten)]
        scan: ScanArgs,
    },

    /// Check a single npm package (latest version when none is given)
    Npm {
        /// Package name
        name: String,

        /// Package version
        version: Option<String>,

        #[command(flatten)]
        scan: ScanArgs,
    },

    /// Print the resolved Maven dependency tree
    Tree {
        #[command(flatten)]
        artifact: ArtifactArgs,
    },

    /// Print the declared dependencies of an npm package
    NpmDeps {
        /// Package name
        name: String,

        /// Package version
        version: Option<String>,
    },

    /// Show or create config file
    Config {
        /// Generate default config file
        #[arg(long)]
        init: bool,

        /// Show config file path
        #[arg(long)]
        path: bool,
    },
}

#[derive(Args)]
struct ArtifactArgs {
    /// Maven groupId
    group_id: String,

    /// Maven artifactId
    artifact_id: String,

    /// Maven version
    version: String,

    /// Exclude a transitive dependency (groupId:artifactId), may be repeated
    #[arg(short = 'x', long = "exclude", value_name = "GROUP:ARTIFACT")]
    exclusions: Vec<String>,
}

impl ArtifactArgs {
    fn to_request(&self) -> Result<MavenRequest> {
        let exclusions = self
            .exclusions
            .iter()
            .map(|s| Exclusion::from_str(s))
            .collect::<depscan::Result<Vec<_>>>()?;
        Ok(MavenRequest::new(MavenArtifact::new(
            &self.group_id,
            &self.artifact_id,
            &self.version,
        ))
        .with_exclusions(exclusions))
    }
}

#[derive(Args)]
struct ScanArgs {
    /// Output format (table, json)
    #[arg(short, long)]
    format: Option<String>,

    /// Write output to file
    #[arg(short, long)]
    output: Option<String>,

    /// Query batches one at a time (stable result order)
    #[arg(long)]
    serial: bool,

    /// Exit with error if vulnerabilities at or above this severity are found
    #[arg(long, value_enum)]
    fail_on: Option<FailLevel>,
}

#[derive(Clone, Copy, ValueEnum)]
enum FailLevel {
    Critical,
    High,
    Medium,
    Low,
}

impl FailLevel {
    fn threshold(self) -> Severity {
        match self {
            FailLevel::Critical => Severity::Critical,
            FailLevel::High => Severity::High,
            FailLevel::Medium => Severity::Medium,
            FailLevel::Low => Severity::Low,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_codes::ERROR)
        }
    }
}

async fn run() -> Result<u8> {
    let cli = Cli::parse();
    let config = Config::load().context("failed to load configuration")?;
    init_tracing(&config)?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    // One cache for the lifetime of the process.
    let cache = Arc::new(ExpiringCache::new());
    let service = VulnerabilityService::from_config(&config, cache)?;

    match cli.command {
        Commands::Maven {
            artifact,
            tree_file,
            scan,
        } => {
            let mut request = artifact.to_request()?;
            if let Some(path) = tree_file {
                request = request.with_tree_report(read_tree_file(&path)?);
            }
            let mode = query_mode(&config, &scan);
            let format = output_format(&config, &scan)?;
            let report = with_spinner(
                format,
                format!("Checking {} for vulnerabilities...", request.artifact),
                service.fetch_maven(&request, mode, &cancel),
            )
            .await?;
            emit(&report, format, &scan)
        }
        Commands::Npm {
            name,
            version,
            scan,
        } => {
            let mode = query_mode(&config, &scan);
            let format = output_format(&config, &scan)?;
            let report = with_spinner(
                format,
                format!("Checking {} for vulnerabilities...", name),
                service.fetch_npm(&name, version.as_deref(), mode, &cancel),
            )
            .await?;
            emit(&report, format, &scan)
        }
        Commands::Tree { artifact } => {
            let request = artifact.to_request()?;
            let tree = service.maven_tree(&request, &cancel).await?;
            print!("{}", tree);
            Ok(exit_codes::SUCCESS)
        }
        Commands::NpmDeps { name, version } => {
            let lookup = service.npm_dependencies(&name, version.as_deref()).await?;
            println!("{}", serde_json::to_string_pretty(&lookup.dependencies)?);
            Ok(exit_codes::SUCCESS)
        }
        Commands::Config { init, path } => {
            handle_config(init, path)?;
            Ok(exit_codes::SUCCESS)
        }
    }
}

fn init_tracing(config: &Config) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing subscriber: {}", e))
}

fn query_mode(config: &Config, scan: &ScanArgs) -> QueryMode {
    if scan.serial || !config.parallel {
        QueryMode::Serial
    } else {
        QueryMode::Parallel
    }
}

fn output_format(config: &Config, scan: &ScanArgs) -> Result<OutputFormat> {
    let format = scan.format.as_deref().unwrap_or(&config.default_format);
    OutputFormat::from_str(format).map_err(|e| anyhow::anyhow!(e))
}

fn read_tree_file(path: &str) -> Result<String> {
    if path == "-" {
        let mut report = String::new();
        std::io::stdin()
            .read_to_string(&mut report)
            .context("failed to read dependency tree from stdin")?;
        return Ok(report);
    }
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path))
}

/// Shows a spinner while `work` runs, for interactive output only.
async fn with_spinner<T>(
    format: OutputFormat,
    message: String,
    work: impl Future<Output = depscan::Result<T>>,
) -> Result<T> {
    let progress = if format == OutputFormat::Table {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            pb.set_style(style);
        }
        pb.enable_steady_tick(Duration::from_millis(100));
        pb.set_message(message);
        Some(pb)
    } else {
        None
    };

    let result = work.await;
    if let Some(pb) = progress {
        pb.finish_and_clear();
    }
    Ok(result?)
}

fn emit(report: &Report, format: OutputFormat, scan: &ScanArgs) -> Result<u8> {
    if let Some(path) = &scan.output {
        let content = format_report_to_string(report, format)?;
        std::fs::write(path, content).with_context(|| format!("failed to write {}", path))?;
        if format == OutputFormat::Table {
            println!("Results written to: {}", path);
        }
    } else {
        print_report(report, format)?;
    }

    Ok(determine_exit_code(report, scan.fail_on))
}

/// Determine the exit code based on the worst severity found and --fail-on
fn determine_exit_code(report: &Report, fail_on: Option<FailLevel>) -> u8 {
    let Some(fail_on) = fail_on else {
        return exit_codes::SUCCESS;
    };

    match report.max_severity() {
        Some(worst) if worst >= fail_on.threshold() => match worst {
            Severity::Critical => exit_codes::CRITICAL_VULN,
            Severity::High => exit_codes::HIGH_VULN,
            Severity::Medium => exit_codes::MEDIUM_VULN,
            Severity::Low => exit_codes::LOW_VULN,
            Severity::Unknown => exit_codes::SUCCESS,
        },
        _ => exit_codes::SUCCESS,
    }
}

fn handle_config(init: bool, show_path: bool) -> Result<()> {
    let config_path = Config::config_path();

    if show_path {
        println!("{}", config_path.display());
        return Ok(());
    }

    if init {
        if config_path.exists() {
            println!("Config file already exists at: {}", config_path.display());
            return Ok(());
        }

        let config = Config::default();
        config.save()?;
        println!("Created config file at: {}", config_path.display());
        println!();
        println!("Default configuration:");
        println!("{}", Config::generate_default_config());
        return Ok(());
    }

    if config_path.exists() {
        let content = std::fs::read_to_string(&config_path)?;
        println!("Config file: {}", config_path.display());
        println!();
        println!("{}", content);
    } else {
        println!("No config file found.");
        println!("Run 'depscan config --init' to create one.");
        println!();
        println!("Config path: {}", config_path.display());
    }

    Ok(())
}
