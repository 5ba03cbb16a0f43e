//! heightcut CLI - generate collision-safe toolpaths from mesh job files.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use heightcut_gpu::GpuContext;
use heightcut_path::{
    ComputeBackend, GpuBackend, PathGenerator, PathSettings, Progress, WorkerBackend,
};
use log::{info, warn};
use serde::Serialize;

mod job;

use job::Job;

#[derive(Parser)]
#[command(name = "heightcut")]
#[command(about = "Collision-safe height toolpaths from terrain and tool meshes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate an XY scan path
    Planar(RunArgs),
    /// Generate a rotary path about the X axis
    Radial(RunArgs),
    /// Show the GPU adapter and its limits
    Info,
}

#[derive(Args)]
struct RunArgs {
    /// JSON job file with terrain and tool triangles
    job: PathBuf,
    /// TOML settings file (overrides settings in the job)
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Output JSON file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Use CPU workers even if a GPU is available
    #[arg(long)]
    cpu: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Planar(args) => run_planar(&args),
        Commands::Radial(args) => run_radial(&args),
        Commands::Info => {
            show_info();
            Ok(())
        }
    }
}

fn run_planar(args: &RunArgs) -> Result<()> {
    let job = Job::load(&args.job)?;
    let settings = job.settings(args.config.as_deref())?;
    let generator = PathGenerator::new(select_backend(args.cpu, &settings), settings)?;

    let path =
        generator.generate_from_meshes(&job.terrain, &job.tool, job.bounds, &mut log_progress)?;
    info!(
        "{} scanlines x {} points ({} tiles, {} dispatches, tool {}/{} cells)",
        path.scanlines,
        path.points_per_line,
        path.report.tiles,
        path.report.dispatches,
        path.report.sparse_tool_cells,
        path.report.dense_tool_cells
    );
    write_output(&path, args.output.as_deref())
}

fn run_radial(args: &RunArgs) -> Result<()> {
    let job = Job::load(&args.job)?;
    let settings = job.settings(args.config.as_deref())?;
    let generator = PathGenerator::new(select_backend(args.cpu, &settings), settings)?;

    let tool = generator.build_tool(&job.tool)?;
    let path = generator.generate_radial(&job.terrain, &tool, job.bounds, &mut log_progress)?;
    info!(
        "{} rotations x {} points ({} batches)",
        path.rotations, path.points_per_line, path.report.tiles
    );
    write_output(&path, args.output.as_deref())
}

fn select_backend(cpu: bool, settings: &PathSettings) -> Box<dyn ComputeBackend> {
    if !cpu {
        match GpuBackend::init(settings.readback_timeout()) {
            Ok(backend) => return Box::new(backend),
            Err(e) => warn!("GPU unavailable ({e}); using {} CPU workers", settings.workers),
        }
    }
    Box::new(WorkerBackend::new(settings.workers))
}

fn log_progress(progress: Progress) {
    info!(
        "progress {}/{} ({:.0}%)",
        progress.completed,
        progress.total,
        progress.fraction() * 100.0
    );
}

fn write_output<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string(value)?;
    match output {
        Some(path) => {
            fs::write(path, json)?;
            println!("Wrote {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn show_info() {
    match GpuContext::init_blocking() {
        Ok(ctx) => {
            println!("Adapter: {}", ctx.adapter_name);
            println!("Max storage binding: {} bytes", ctx.max_binding_size());
            println!(
                "Max workgroups per dimension: {}",
                ctx.limits.max_compute_workgroups_per_dimension
            );
        }
        Err(e) => println!("No GPU available: {e}"),
    }
}
