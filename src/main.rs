//! Grades a photographed answer sheet and prints the result as JSON.

use std::{path::PathBuf, process::ExitCode};

use anyhow::{anyhow, Context};
use clap::{Args, Parser, Subcommand};
use omrgrade::{
    config::OmrConfig, validation::is_supported_extension, EvaluationError, ScoreWarning,
    SheetEvaluationResult,
};
use serde::Serialize;
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

/// Optical mark recognition grader for multiple-choice answer sheets
#[derive(Parser)]
#[command(name = "omrgrade")]
#[command(author, version, about, long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(flatten)]
    grade: GradeArgs,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Grade one sheet image
    Grade(GradeArgs),
    /// List the answer key versions of a config file
    Versions(VersionsArgs),
}

#[derive(Args, Clone)]
struct GradeArgs {
    /// Sheet image (jpg, jpeg, png, bmp, tiff or gif)
    image: Option<PathBuf>,

    /// TOML file with layout, options and answer keys
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Answer key version to grade against
    #[arg(short = 'k', long)]
    version_key: Option<String>,

    /// Pretty-print the JSON result
    #[arg(long)]
    pretty: bool,
}

#[derive(Args, Clone)]
struct VersionsArgs {
    /// TOML file with answer keys
    #[arg(short, long)]
    config: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Success = 0,
    EvaluationFailed = 1,
    Usage = 2,
}

impl From<Exit> for ExitCode {
    fn from(exit: Exit) -> Self {
        ExitCode::from(exit as u8)
    }
}

struct Failure {
    exit: Exit,
    error: anyhow::Error,
}

trait ExitWith<T> {
    fn exit_with(self, exit: Exit) -> Result<T, Failure>;
}

impl<T, E: Into<anyhow::Error>> ExitWith<T> for Result<T, E> {
    fn exit_with(self, exit: Exit) -> Result<T, Failure> {
        self.map_err(|error| Failure {
            exit,
            error: error.into(),
        })
    }
}

#[derive(Serialize)]
struct Report<'a> {
    #[serde(flatten)]
    result: &'a SheetEvaluationResult,
    percentage: f32,
    low_confidence: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    warning: Option<ScoreWarning>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_span_events(FmtSpan::CLOSE)
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let outcome = match cli.command {
        Some(Commands::Grade(ref args)) => grade(args),
        Some(Commands::Versions(ref args)) => versions(args),
        None => grade(&cli.grade),
    };
    match outcome {
        Ok(()) => Exit::Success.into(),
        Err(failure) => {
            eprintln!("error: {:#}", failure.error);
            failure.exit.into()
        }
    }
}

fn grade(args: &GradeArgs) -> Result<(), Failure> {
    let image = args
        .image
        .as_ref()
        .context("no image given, see --help")
        .exit_with(Exit::Usage)?;
    let config_path = args
        .config
        .as_ref()
        .context("--config is required")
        .exit_with(Exit::Usage)?;
    let version = args
        .version_key
        .as_deref()
        .context("--version-key is required")
        .exit_with(Exit::Usage)?;
    if !is_supported_extension(image) {
        return Err(anyhow!("unsupported image type: {}", image.display())).exit_with(Exit::Usage);
    }

    let mut config = OmrConfig::load(config_path).exit_with(Exit::Usage)?;
    config.options.validate_input = true;
    let evaluator = config.into_evaluator().exit_with(Exit::Usage)?;
    evaluator.keys().get(version).exit_with(Exit::Usage)?;

    let bytes = std::fs::read(image)
        .with_context(|| format!("failed to read {}", image.display()))
        .exit_with(Exit::EvaluationFailed)?;
    let result = match evaluator.evaluate_bytes(&bytes, version) {
        Ok(result) => result,
        Err(EvaluationError::Configuration(err)) => return Err(err).exit_with(Exit::Usage),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to grade {}", image.display()))
                .exit_with(Exit::EvaluationFailed)
        }
    };

    let warning = result.score_warning();
    if let Some(warning) = warning {
        log::warn!("{warning}");
    }
    let report = Report {
        result: &result,
        percentage: result.percentage(),
        low_confidence: result.is_low_confidence(),
        warning,
    };
    let json = if args.pretty {
        serde_json::to_string_pretty(&report)
    } else {
        serde_json::to_string(&report)
    };
    println!("{}", json.exit_with(Exit::EvaluationFailed)?);
    Ok(())
}

fn versions(args: &VersionsArgs) -> Result<(), Failure> {
    let config = OmrConfig::load(&args.config).exit_with(Exit::Usage)?;
    for version in config.keys.versions() {
        let key = config.keys.get(version).exit_with(Exit::Usage)?;
        println!(
            "{version}\t{} subjects\t{} questions",
            key.subjects().len(),
            key.total_questions()
        );
    }
    Ok(())
}
