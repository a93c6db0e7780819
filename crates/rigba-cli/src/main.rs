use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use rigba_pipeline::{run_files, RigBundleConfig, RigBundleReport};

/// Bundle adjustment for kinematic and stereo camera rigs.
#[derive(Debug, Parser)]
#[command(author, version, about = "Rig bundle adjustment")]
struct Args {
    /// Dataset to refine.
    input: PathBuf,

    /// Where to write the refined solution.
    output: PathBuf,

    /// Optional JSON RigBundleConfig. Defaults are used if omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Optional path for a JSON RigBundleReport.
    #[arg(long)]
    report: Option<PathBuf>,
}

fn run_from_files(
    input: &Path,
    output: &Path,
    config_path: Option<&Path>,
    report_path: Option<&Path>,
) -> Result<RigBundleReport> {
    let config = match config_path {
        Some(path) => RigBundleConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => RigBundleConfig::default(),
    };

    let report = run_files(input, output, &config)
        .with_context(|| format!("refining {}", input.display()))?;

    if let Some(path) = report_path {
        report
            .save(path)
            .with_context(|| format!("writing report {}", path.display()))?;
        info!("report written to {}", path.display());
    }
    Ok(report)
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(err) = try_main() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let args = Args::parse();
    let report = run_from_files(
        &args.input,
        &args.output,
        args.config.as_deref(),
        args.report.as_deref(),
    )?;
    println!("initial RMSE: {:.6} px", report.initial_rmse);
    println!("final RMSE:   {:.6} px", report.final_rmse);
    if !report.converged {
        println!("solver stopped before convergence");
    }
    Ok(())
}
