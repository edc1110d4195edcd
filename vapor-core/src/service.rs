use std::sync::Arc;
use std::time::{Duration, Instant};

use image::DynamicImage;

use crate::{
    EntropySeedSource, GenerateError, GenerationParams, SampleRequest, SeedSource, TextToImage,
};

/// Guidance scale handed to the sampler on every invocation. Turbo-class
/// checkpoints are distilled for zero guidance; the value is not
/// caller-configurable.
pub const GUIDANCE_SCALE: f64 = 0.0;

/// Outcome of one generation call.
#[derive(Debug)]
pub struct Generation {
    pub image: DynamicImage,
    /// Seed actually used: the caller's value verbatim, or the one drawn
    /// here. Always reported so the result can be reproduced.
    pub seed: u64,
    pub width: usize,
    pub height: usize,
    pub prompt: String,
    /// Wall-clock duration of the sampler call only.
    pub elapsed: Duration,
}

/// Orchestrates a single loaded checkpoint. Requests are stateless; the
/// model handle is immutable after load and shared across calls.
#[derive(Clone)]
pub struct GenerationService {
    model: Arc<dyn TextToImage>,
    seeds: Arc<dyn SeedSource>,
}

impl GenerationService {
    pub fn new(model: Arc<dyn TextToImage>) -> Self {
        Self::with_seed_source(model, Arc::new(EntropySeedSource))
    }

    pub fn with_seed_source(model: Arc<dyn TextToImage>, seeds: Arc<dyn SeedSource>) -> Self {
        Self { model, seeds }
    }

    /// Runs one sampler invocation. Synchronous and compute-bound for its
    /// whole duration; callers serving an event loop must dispatch it to a
    /// blocking worker.
    pub fn generate(&self, params: &GenerationParams) -> Result<Generation, GenerateError> {
        let seed = params.seed.unwrap_or_else(|| self.seeds.next_seed());

        let request = SampleRequest {
            prompt: &params.prompt,
            width: params.width,
            height: params.height,
            steps: params.steps,
            guidance_scale: GUIDANCE_SCALE,
            seed,
        };

        let start = Instant::now();
        let image = self.model.sample(request).map_err(GenerateError::Sampler)?;
        let elapsed = start.elapsed();

        Ok(Generation {
            image,
            seed,
            width: params.width,
            height: params.height,
            prompt: params.prompt.clone(),
            elapsed,
        })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Mutex;

    use anyhow::bail;
    use image::{DynamicImage, RgbImage};

    use crate::{SampleRequest, TextToImage};

    /// Owned copy of a sampler invocation, for assertions.
    #[derive(Debug, Clone, PartialEq)]
    pub struct RecordedRequest {
        pub prompt: String,
        pub width: usize,
        pub height: usize,
        pub steps: usize,
        pub guidance_scale: f64,
        pub seed: u64,
    }

    /// Sampler double: records every invocation and paints a solid image
    /// whose pixels are a pure function of the request, so determinism of
    /// the surrounding pipeline is observable.
    #[derive(Default)]
    pub struct RecordingSampler {
        pub requests: Mutex<Vec<RecordedRequest>>,
        pub fail: bool,
    }

    impl RecordingSampler {
        pub fn failing() -> Self {
            Self {
                requests: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        pub fn invocations(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    impl TextToImage for RecordingSampler {
        fn sample(&self, request: SampleRequest) -> anyhow::Result<DynamicImage> {
            self.requests.lock().unwrap().push(RecordedRequest {
                prompt: request.prompt.to_string(),
                width: request.width,
                height: request.height,
                steps: request.steps,
                guidance_scale: request.guidance_scale,
                seed: request.seed,
            });
            if self.fail {
                bail!("device out of memory");
            }
            let shade = (request.seed % 251) as u8;
            let buffer = RgbImage::from_pixel(
                request.width as u32,
                request.height as u32,
                image::Rgb([shade, shade.wrapping_add(7), shade.wrapping_add(13)]),
            );
            Ok(DynamicImage::ImageRgb8(buffer))
        }
    }
}
