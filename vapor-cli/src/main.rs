use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use hf_hub::api::tokio::Api;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;
use vapor_core::{
    load_model, DeviceMap, GenerationParams, GenerationService, LoadOptions, ModelDType,
    Offloading, DEFAULT_DIM, DEFAULT_STEPS,
};

/// Fixed default seed. Batch usage favors reproducibility, so the CLI does
/// not auto-draw one; pass --seed to override.
const DEFAULT_SEED: u64 = 42;

// Define command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "Generate an image from a text prompt")]
struct Args {
    /// Text prompt for image generation
    #[arg(long)]
    prompt: String,

    /// Image height
    #[arg(long, default_value_t = DEFAULT_DIM)]
    height: usize,

    /// Image width
    #[arg(long, default_value_t = DEFAULT_DIM)]
    width: usize,

    /// Scheduler steps (9 steps = 8 transformer forwards)
    #[arg(long, default_value_t = DEFAULT_STEPS)]
    steps: usize,

    /// Random seed
    #[arg(long, default_value_t = DEFAULT_SEED)]
    seed: u64,

    /// Output image path; the extension selects the format
    #[arg(long, default_value = "output.png")]
    output: PathBuf,

    /// Turbo checkpoint to load
    #[arg(long, default_value = "black-forest-labs/FLUX.1-schnell")]
    model_path: String,

    /// Weight precision: float16, bfloat16, or float32
    #[arg(long, default_value = "bfloat16")]
    dtype: ModelDType,

    /// Run a throwaway generation after load to warm the kernels
    #[arg(long)]
    compile: bool,

    /// Keep the text encoders on the CPU to reduce accelerator memory
    #[arg(long)]
    cpu_offload: bool,

    /// Use CPU instead of GPU
    #[arg(long)]
    cpu: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Validate before paying for the model load.
    let params = GenerationParams::new(
        args.prompt,
        args.width,
        args.height,
        args.steps,
        Some(args.seed),
    )?;

    let options = LoadOptions {
        model_id: args.model_path,
        device_map: if args.cpu {
            DeviceMap::ForceCpu
        } else {
            DeviceMap::default()
        },
        dtype: args.dtype,
        offloading: if args.cpu_offload {
            Offloading::TextEncoders
        } else {
            Offloading::None
        },
    };

    let model = load_model(&options, Api::new()?).await?;
    let service = GenerationService::new(model);

    if args.compile {
        info!("running warmup generation");
        let warmup = GenerationParams::new("warmup", 256, 256, 2, Some(0))?;
        service.generate(&warmup)?;
    }

    info!(
        prompt = %params.prompt,
        width = params.width,
        height = params.height,
        steps = params.steps,
        seed = args.seed,
        "generating image"
    );
    let generation = service.generate(&params)?;

    generation
        .image
        .save(&args.output)
        .with_context(|| format!("failed to write image to {}", args.output.display()))?;
    info!(
        elapsed = format_args!("{:.2}s", generation.elapsed.as_secs_f64()),
        output = %args.output.display(),
        seed = generation.seed,
        "image saved"
    );

    Ok(())
}
