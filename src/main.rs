use std::path::{Path, PathBuf};
use std::process::ExitCode;

use pdf_lighten::config::profile::CompressionProfile;
use pdf_lighten::config::settings::Settings;
use pdf_lighten::pipeline::job_runner::{ArtifactOutcome, JobConfig};
use pdf_lighten::pipeline::orchestrator::run_all_jobs;
use pdf_lighten::process::tools::ToolPaths;

fn print_usage() {
    eprintln!("Usage: pdf_lighten [OPTIONS] <input.pdf>...");
    eprintln!("  Normalize page boxes and produce compressed variants of each input.");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --out-dir <DIR>     Output directory (default: current directory)");
    eprintln!("  --bleed-mm <MM>     Bleed margin to trim when falling back to CropBox/MediaBox");
    eprintln!("  --profile <NAME>    Restrict to one profile by name (repeatable)");
    eprintln!("  --flatten           Also emit a transparency-flattened variant");
    eprintln!("  --settings <FILE>   Load settings from a YAML file");
    eprintln!("  -h, --help          Show this help");
    eprintln!("  -V, --version       Show version");
}

struct CliArgs {
    inputs: Vec<PathBuf>,
    out_dir: PathBuf,
    bleed_mm: Option<f64>,
    profile_names: Vec<String>,
    flatten: bool,
    settings_path: Option<PathBuf>,
}

fn parse_args(args: &[String]) -> Result<CliArgs, String> {
    let mut parsed = CliArgs {
        inputs: Vec::new(),
        out_dir: PathBuf::from("."),
        bleed_mm: None,
        profile_names: Vec::new(),
        flatten: false,
        settings_path: None,
    };

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--out-dir" => {
                let value = iter.next().ok_or("--out-dir requires a value")?;
                parsed.out_dir = PathBuf::from(value);
            }
            "--bleed-mm" => {
                let value = iter.next().ok_or("--bleed-mm requires a value")?;
                let mm: f64 = value
                    .parse()
                    .map_err(|_| format!("invalid --bleed-mm value: {value}"))?;
                if !(0.0..=50.0).contains(&mm) {
                    return Err(format!("--bleed-mm out of range (0-50): {mm}"));
                }
                parsed.bleed_mm = Some(mm);
            }
            "--profile" => {
                let value = iter.next().ok_or("--profile requires a value")?;
                parsed.profile_names.push(value.clone());
            }
            "--flatten" => parsed.flatten = true,
            "--settings" => {
                let value = iter.next().ok_or("--settings requires a value")?;
                parsed.settings_path = Some(PathBuf::from(value));
            }
            other if other.starts_with('-') => {
                return Err(format!("unknown option: {other}"));
            }
            input => parsed.inputs.push(PathBuf::from(input)),
        }
    }

    if parsed.inputs.is_empty() {
        return Err("no input files given".into());
    }
    Ok(parsed)
}

/// Select profiles by name, preserving request order.
fn select_profiles(
    available: &[CompressionProfile],
    names: &[String],
) -> Result<Vec<CompressionProfile>, String> {
    let mut selected = Vec::new();
    for name in names {
        let profile = available
            .iter()
            .find(|p| &p.name == name)
            .ok_or_else(|| format!("unknown profile: {name}"))?;
        selected.push(profile.clone());
    }
    Ok(selected)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return ExitCode::SUCCESS;
    }
    if args.iter().any(|a| a == "--version" || a == "-V") {
        eprintln!("pdf_lighten {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }
    if args.is_empty() {
        print_usage();
        return ExitCode::FAILURE;
    }

    let cli = match parse_args(&args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("ERROR: {e}");
            print_usage();
            return ExitCode::FAILURE;
        }
    };

    // Settings: explicit file, or settings.yaml next to the first input.
    let settings = match &cli.settings_path {
        Some(path) => match Settings::from_file(path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("ERROR: Failed to load settings {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => {
            let dir = cli.inputs[0]
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .to_path_buf();
            match pdf_lighten::config::load_settings_from_dir(&dir) {
                Ok(s) => s,
                Err(e) => {
                    eprintln!("ERROR: Failed to load settings from {}: {e}", dir.display());
                    return ExitCode::FAILURE;
                }
            }
        }
    };

    let available = settings.effective_profiles();
    let profiles = if cli.profile_names.is_empty() {
        available
    } else {
        match select_profiles(&available, &cli.profile_names) {
            Ok(p) => p,
            Err(e) => {
                eprintln!("ERROR: {e}");
                return ExitCode::FAILURE;
            }
        }
    };

    // Resolve external tools once; strategies that need a missing tool
    // fail per artifact, not up front.
    let tools = ToolPaths::discover(&settings.tools);

    let bleed_mm = cli.bleed_mm.unwrap_or(settings.bleed_mm);
    let flatten = cli.flatten || settings.flatten;

    let jobs: Vec<JobConfig> = cli
        .inputs
        .iter()
        .map(|input| JobConfig {
            input_path: input.clone(),
            output_dir: cli.out_dir.clone(),
            bleed_mm,
            color: settings.color,
            profiles: profiles.clone(),
            flatten,
        })
        .collect();

    let results = run_all_jobs(&jobs, &tools);

    let mut has_error = false;
    for (i, result) in results.iter().enumerate() {
        match result {
            Ok(job) => {
                eprintln!(
                    "OK: {} cleaned ({} pages)",
                    job.input_path.display(),
                    job.pages
                );
                for artifact in &job.artifacts {
                    match &artifact.outcome {
                        ArtifactOutcome::Produced { via } => {
                            eprintln!(
                                "  OK: {} -> {} (via {via})",
                                artifact.label,
                                artifact.path.display()
                            );
                        }
                        ArtifactOutcome::Failed { error } => {
                            eprintln!("  ERROR: {}: {error}", artifact.label);
                        }
                    }
                }
            }
            Err(e) => {
                eprintln!("ERROR: {}: {e}", jobs[i].input_path.display());
                has_error = true;
            }
        }
    }

    if has_error {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
