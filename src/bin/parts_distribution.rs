//! Command line driver for the package production pipeline.
//!
//! Logging goes to stderr (`RUST_LOG`, default `info`); stdout carries only
//! the JSON summary of the stages that ran. The exit status is 1 when any
//! package failed any stage.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use parts_distribution::{
    PipelineConfig,
    collate::collate_package,
    curation::{CommandCurator, convert_package_genbank, curate_package},
    distribution::build_distribution,
    expand::expand_build_plan,
    packages::{package_dirs, package_name},
    pipeline::{BatchReport, StageSummary, run_packages},
    resolver::OfflineResolver,
    synthesis::extract_synthesis_files,
};
use parts_protocol::Document;
use serde::Serialize;
use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};

#[derive(Parser)]
#[command(
    name = "parts_distribution",
    about = "Collate, expand and assemble genetic part packages into a distribution",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Distribution root holding one directory per package
    #[arg(long, global = true, default_value = ".", env = "PARTS_DISTRIBUTION_ROOT")]
    root: PathBuf,

    /// JSON configuration file; defaults apply when absent
    #[arg(long, global = true, env = "PARTS_DISTRIBUTION_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Clone, Copy, PartialEq, Eq)]
enum Commands {
    /// Resolve package specifications into package documents
    Collate,
    /// Expand the build plans of collated packages
    Expand,
    /// Merge expanded packages into the distribution document
    Distribution,
    /// Export the synthesis-ready part of the distribution
    Synthesis,
    /// Convert package GenBank files into object-graph documents
    ConvertGenbank,
    /// Run the external curator on converted GenBank documents
    Curate,
    /// Collate, expand, assemble and export in one go
    All,
}

#[derive(Serialize)]
struct RunSummary {
    root: PathBuf,
    packages: usize,
    stages: Vec<StageSummary>,
}

fn distribution_stage(root: &Path, packages: &[PathBuf], config: &PipelineConfig) -> Result<BatchReport> {
    let assembly = build_distribution(root, packages, config).context("Could not assemble distribution")?;
    let failed: Vec<&str> = assembly.failures.iter().map(|f| f.package.as_str()).collect();
    let succeeded = packages
        .iter()
        .map(|p| package_name(p))
        .filter(|name| !failed.contains(&name.as_str()))
        .collect();
    Ok(BatchReport {
        succeeded,
        failed: assembly.failures,
    })
}

fn synthesis_stage(root: &Path, config: &PipelineConfig) -> Result<BatchReport> {
    let path = root.join(&config.distribution_name);
    let doc = Document::load_from_path(&path)
        .with_context(|| format!("Could not read distribution '{}'", path.display()))?;
    extract_synthesis_files(root, &doc, config).context("Could not extract synthesis files")?;
    Ok(BatchReport {
        succeeded: vec![config.distribution_name.clone()],
        failed: vec![],
    })
}

/// Packages from `packages` that are listed as succeeded in `report`.
fn surviving(packages: &[PathBuf], report: &BatchReport) -> Vec<PathBuf> {
    packages
        .iter()
        .filter(|p| report.succeeded.contains(&package_name(p)))
        .cloned()
        .collect()
}

fn run(cli: &Cli) -> Result<RunSummary> {
    let config = PipelineConfig::load_or_default(cli.config.as_deref()).context("Could not load configuration")?;
    let root = cli.root.as_path();
    let packages = package_dirs(root, &config)
        .with_context(|| format!("Could not list packages under '{}'", root.display()))?;
    let mut stages = vec![];

    match cli.command {
        Commands::Collate => {
            let report = run_packages(&packages, "collate", |p| collate_package(p, &config, &OfflineResolver))?;
            stages.push(report.summary("collate"));
        }
        Commands::Expand => {
            let report = run_packages(&packages, "expand", |p| expand_build_plan(p, &config))?;
            stages.push(report.summary("expand"));
        }
        Commands::Distribution => {
            stages.push(distribution_stage(root, &packages, &config)?.summary("distribution"));
        }
        Commands::Synthesis => {
            stages.push(synthesis_stage(root, &config)?.summary("synthesis"));
        }
        Commands::ConvertGenbank => {
            let report = run_packages(&packages, "convert-genbank", |p| convert_package_genbank(p, &config))?;
            stages.push(report.summary("convert-genbank"));
        }
        Commands::Curate => {
            let curator = CommandCurator::from_config(&config);
            let report = run_packages(&packages, "curate", |p| curate_package(p, &config, &curator))?;
            stages.push(report.summary("curate"));
        }
        Commands::All => {
            let collated = run_packages(&packages, "collate", |p| collate_package(p, &config, &OfflineResolver))?;
            stages.push(collated.summary("collate"));
            let ready = surviving(&packages, &collated);
            let expanded = run_packages(&ready, "expand", |p| expand_build_plan(p, &config))?;
            stages.push(expanded.summary("expand"));
            let ready = surviving(&ready, &expanded);
            stages.push(distribution_stage(root, &ready, &config)?.summary("distribution"));
            stages.push(synthesis_stage(root, &config)?.summary("synthesis"));
        }
    }

    Ok(RunSummary {
        root: root.to_path_buf(),
        packages: packages.len(),
        stages,
    })
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    match run(&cli) {
        Ok(summary) => {
            match serde_json::to_string_pretty(&summary) {
                Ok(text) => println!("{text}"),
                Err(e) => {
                    eprintln!("Could not serialize JSON output: {e}");
                    return ExitCode::FAILURE;
                }
            }
            if summary.stages.iter().all(|s| s.failed.is_empty()) {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            eprintln!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
