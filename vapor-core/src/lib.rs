//! Core crate for the vapor text2image serving engine.
//!
//! The request pipeline lives here: parameter validation, seed resolution,
//! the generation service orchestrating a loaded turbo checkpoint, and the
//! PNG/base64 codec. The HTTP and CLI entry points are thin wrappers in
//! `vapor-server` and `vapor-cli`.

pub mod codec;
pub mod device_map;
mod dtype;
mod error;
pub mod loader;
mod loader_factory;
mod params;
mod seed;
mod service;

mod turbo;

use image::DynamicImage;

pub use device_map::*;
pub use dtype::ModelDType;
pub use error::GenerateError;
pub use loader::*;
pub use loader_factory::*;
pub use params::*;
pub use seed::*;
pub use service::*;
pub use turbo::TurboLoader;

/// One sampler invocation, fully resolved. Every field is already validated
/// and `seed` is the seed actually in effect for this call.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleRequest<'a> {
    pub prompt: &'a str,
    pub width: usize,
    pub height: usize,
    /// Scheduler points; the transformer runs `steps - 1` forward passes.
    pub steps: usize,
    pub guidance_scale: f64,
    pub seed: u64,
}

/// The diffusion capability: turns a prompt, resolution, step count, and a
/// seed into a pixel grid. Implementations must be deterministic for a fixed
/// request.
pub trait TextToImage: Send + Sync {
    fn sample(&self, request: SampleRequest) -> anyhow::Result<DynamicImage>;
}
