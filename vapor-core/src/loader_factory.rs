use std::sync::Arc;

use anyhow::{anyhow, Result};
use hf_hub::api::tokio::Api;

use crate::{LoadOptions, Loader, TextToImage, TurboLoader};

/// Checks that a model id names a turbo-class (guidance-distilled)
/// checkpoint. Anything else would need a nonzero guidance scale, which
/// this pipeline never passes.
pub fn is_turbo_checkpoint(model_id: &str) -> bool {
    let name_upper = model_id.to_uppercase();
    name_upper.contains("TURBO") || name_upper.contains("SCHNELL")
}

/// Loads the checkpoint named by `options`, rejecting ids outside the
/// supported family before any download begins.
pub async fn load_model(options: &LoadOptions, api: Api) -> Result<Arc<dyn TextToImage>> {
    if !is_turbo_checkpoint(&options.model_id) {
        return Err(anyhow!(
            "unsupported checkpoint: {} (only turbo-class distilled models are supported)",
            options.model_id
        ));
    }

    tracing::info!(
        model = %options.model_id,
        dtype = ?options.dtype,
        offloading = ?options.offloading,
        "loading checkpoint"
    );

    let model = TurboLoader::load(options, api).await?;
    Ok(Arc::new(model))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_turbo_family_ids() {
        assert!(is_turbo_checkpoint("black-forest-labs/FLUX.1-schnell"));
        assert!(is_turbo_checkpoint("Tongyi-MAI/Z-Image-Turbo"));
        assert!(is_turbo_checkpoint("sdxl-turbo"));
    }

    #[test]
    fn rejects_guidance_dependent_ids() {
        assert!(!is_turbo_checkpoint("black-forest-labs/FLUX.1-dev"));
        assert!(!is_turbo_checkpoint("stable-diffusion-v1-5"));
    }
}
