use clap::Parser;
use std::path::PathBuf;

use capscan::{Pipeline, PipelineConfig, SessionInputs};

#[derive(Parser)]
#[command(name = "capscan")]
#[command(about = "Locate EEG electrodes on a textured 3D head scan")]
struct Cli {
    /// Head mesh in Wavefront OBJ format
    #[arg(value_name = "MESH")]
    mesh: PathBuf,

    /// Texture image for the mesh
    #[arg(value_name = "TEXTURE")]
    texture: PathBuf,

    /// Fiducial table, header-free `code,x,y,z` rows
    #[arg(value_name = "FIDUCIALS")]
    fiducials: PathBuf,

    /// Root directory for session output
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    output: PathBuf,

    /// Exact session directory (instead of a fresh `session-<uuid>` under --output)
    #[arg(long, value_name = "DIR")]
    session_dir: Option<PathBuf>,

    /// JSON pipeline configuration; missing fields keep their defaults
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Save debug outputs to directory (must be empty)
    #[arg(long, value_name = "DIR")]
    debug_out: Option<PathBuf>,

    /// Detect on the whole aligned mesh without cutting out the cap region
    #[arg(long)]
    no_extract: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let config = match &args.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };

    let inputs = SessionInputs::load(&args.mesh, Some(&args.texture), &args.fiducials)?;
    if args.verbose {
        println!(
            "Loaded mesh: {} vertices, {} triangles, {} fiducials\n",
            inputs.mesh.vertex_count(),
            inputs.mesh.triangle_count(),
            inputs.fiducials.len()
        );
    }

    let mut pipeline = Pipeline::new(config).with_extraction(!args.no_extract);
    if let Some(debug_dir) = args.debug_out {
        pipeline = pipeline.with_debug(debug_dir)?;
    }

    let session_dir = args
        .session_dir
        .unwrap_or_else(|| Pipeline::new_session_dir(&args.output));
    let report = pipeline.run(&inputs, &session_dir).await?;

    println!("\n=== Electrode Detection Results ===");
    println!("Session directory: {}", report.session_dir.display());
    for (method, count) in report.count_by_method() {
        println!("  {method}: {count} candidates");
    }
    println!(
        "Mapped {} points, {} markers labelled",
        report.points.len(),
        report.labelled
    );
    println!("Merged electrodes: {}", report.merged.len());

    if args.verbose && !report.merged.is_empty() {
        println!("\nElectrodes:");
        for (i, e) in report.merged.iter().enumerate() {
            println!(
                "  {:3} {:<6} ({:8.2}, {:8.2}, {:8.2}) {} / {} - support {}",
                i + 1,
                e.label.as_deref().unwrap_or("-"),
                e.x,
                e.y,
                e.z,
                e.view,
                e.method,
                e.support
            );
        }
    }

    Ok(())
}
