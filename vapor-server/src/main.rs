use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use hf_hub::api::tokio::Api;
use tokio::net::TcpListener;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;
use vapor_core::{
    load_model, resolved_device_label, DeviceMap, GenerationParams, GenerationService,
    LoadOptions, ModelDType, Offloading, MIN_DIM,
};

mod routes;

use routes::AppState;

// Define command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "Vapor text2image generation server")]
struct Args {
    /// Use CPU instead of GPU
    #[arg(long)]
    cpu: bool,

    /// Keep the text encoders on the CPU to reduce accelerator memory
    #[arg(long)]
    cpu_offload: bool,

    /// Turbo checkpoint to serve
    #[arg(long, default_value = "black-forest-labs/FLUX.1-schnell")]
    model: String,

    /// Weight precision: float16, bfloat16, or float32
    #[arg(long, default_value = "bfloat16")]
    dtype: ModelDType,

    /// Run a throwaway generation after load to warm the kernels
    #[arg(long)]
    compile: bool,

    /// Host address to bind the server to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to bind the server to
    #[arg(long, default_value_t = 8002)]
    port: u16,
}

/// First-run kernel warmup: one small throwaway generation so the first
/// caller does not pay the compilation cost.
fn warmup(service: &GenerationService) -> Result<()> {
    info!("running warmup generation");
    let params = GenerationParams::new("warmup", MIN_DIM, MIN_DIM, 2, Some(0))?;
    let generation = service.generate(&params)?;
    info!(elapsed = format_args!("{:.2}s", generation.elapsed.as_secs_f64()), "warmup done");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let device_map = if args.cpu {
        DeviceMap::ForceCpu
    } else {
        DeviceMap::default()
    };
    let offloading = if args.cpu_offload {
        Offloading::TextEncoders
    } else {
        Offloading::None
    };
    let options = LoadOptions {
        model_id: args.model.clone(),
        device_map,
        dtype: args.dtype,
        offloading,
    };

    // A failed load is fatal; the process must not accept requests without
    // a model.
    let model = load_model(&options, Api::new()?).await?;
    let service = GenerationService::new(model);

    if args.compile {
        warmup(&service)?;
    }

    // Build application state and wrap in Arc.
    let state = Arc::new(AppState {
        service,
        model_id: args.model,
        device: resolved_device_label(device_map),
    });

    // --- Build axum router with shared state ---
    let app = routes::router(state);

    // --- Start the server ---
    let bind_address = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&bind_address).await?;
    info!("started server on {}", listener.local_addr()?);
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
