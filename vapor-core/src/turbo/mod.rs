use std::sync::Mutex;

use anyhow::{Context, Error, Result};
use candle_core::{DType, Device, IndexOp, Tensor};
use candle_nn::Module;
use candle_transformers::models::{
    clip::text_model::{self, ClipTextTransformer},
    flux::{
        autoencoder::AutoEncoder,
        model::{Config, Flux},
        sampling,
    },
    t5::{self, T5EncoderModel},
};
use hf_hub::api::tokio::Api;
use image::DynamicImage;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::StandardNormal;
use tokenizers::Tokenizer;

use crate::{
    codec::tensor_to_image, device_map::select_best_device, LoadOptions, Loader, Offloading,
    SampleRequest, TextToImage,
};

/// A loaded turbo-class flux checkpoint: text encoders, transformer, and
/// autoencoder, resident for the process lifetime. Weights are immutable
/// after load; the T5 encoder keeps internal caches, so it sits behind a
/// mutex and concurrent calls serialize there.
pub struct TurboModel {
    device: Device,
    dtype: DType,
    encoder_device: Device,
    t5_model: Mutex<T5EncoderModel>,
    t5_tokenizer: Tokenizer,
    clip_model: ClipTextTransformer,
    clip_tokenizer: Tokenizer,
    autoencoder: AutoEncoder,
    flux_model: Flux,
}

/// Builds the initial latent for one call from its own seeded generator.
/// Nothing is shared between calls, and a fixed seed reproduces the same
/// latent on every device.
fn seeded_noise(height: usize, width: usize, seed: u64, device: &Device) -> Result<Tensor> {
    let latent_height = 2 * height.div_ceil(16);
    let latent_width = 2 * width.div_ceil(16);
    let mut rng = StdRng::seed_from_u64(seed);
    let samples: Vec<f32> = (0..16 * latent_height * latent_width)
        .map(|_| rng.sample(StandardNormal))
        .collect();
    Ok(Tensor::from_vec(
        samples,
        (1, 16, latent_height, latent_width),
        device,
    )?)
}

impl TextToImage for TurboModel {
    fn sample(&self, request: SampleRequest) -> Result<DynamicImage> {
        // --- Per-call generation context: seeded noise latent ---
        let noise_img = seeded_noise(request.height, request.width, request.seed, &self.device)?
            .to_dtype(self.dtype)?;

        // --- Compute T5 embedding using the preloaded T5 model and tokenizer ---
        let mut t5_tokens = self
            .t5_tokenizer
            .encode(request.prompt, true)
            .map_err(Error::msg)?
            .get_ids()
            .to_vec();
        t5_tokens.resize(256, 0);
        let input_token_ids =
            Tensor::new(&*t5_tokens, &self.encoder_device)?.unsqueeze(0)?;
        let t5_emb = self
            .t5_model
            .lock()
            .unwrap()
            .forward(&input_token_ids)?
            .to_device(&self.device)?
            .to_dtype(self.dtype)?;

        // --- Compute CLIP embedding using the preloaded CLIP model and tokenizer ---
        let clip_tokens = self
            .clip_tokenizer
            .encode(request.prompt, true)
            .map_err(Error::msg)?
            .get_ids()
            .to_vec();
        let input_token_ids_clip =
            Tensor::new(&*clip_tokens, &self.encoder_device)?.unsqueeze(0)?;
        let clip_emb = self
            .clip_model
            .forward(&input_token_ids_clip)?
            .to_device(&self.device)?
            .to_dtype(self.dtype)?;

        // --- Create sampling state and schedule ---
        // `steps` counts scheduler points: the schedule carries that many
        // timesteps and the transformer runs `steps - 1` forward passes.
        let sampling_state = sampling::State::new(&t5_emb, &clip_emb, &noise_img)?;
        let timesteps = sampling::get_schedule(request.steps.saturating_sub(1), None);

        // --- Run denoising via the preloaded transformer ---
        let latent_img = sampling::denoise(
            &self.flux_model,
            &sampling_state.img,
            &sampling_state.img_ids,
            &sampling_state.txt,
            &sampling_state.txt_ids,
            &sampling_state.vec,
            &timesteps,
            request.guidance_scale,
        )?;

        let unpacked = sampling::unpack(&latent_img, request.height, request.width)?;

        // --- Decode the latent image using the preloaded autoencoder ---
        let decoded = self.autoencoder.decode(&unpacked)?;

        // --- Postprocessing: clamp, scale, convert to u8 RGB ---
        let img = ((decoded.clamp(-1f32, 1f32)? + 1.0)? * 127.5)?.to_dtype(DType::U8)?;
        let img_tensor = img.i(0)?;
        let image = tensor_to_image(&img_tensor)?;

        // The latent grid rounds resolutions up to multiples of 16; crop
        // back to the requested size.
        if image.width() as usize != request.width || image.height() as usize != request.height {
            return Ok(image.crop_imm(0, 0, request.width as u32, request.height as u32));
        }
        Ok(image)
    }
}

pub struct TurboLoader;

impl Loader for TurboLoader {
    type Model = TurboModel;

    async fn load(options: &LoadOptions, api: Api) -> Result<Self::Model> {
        // Configure devices. With text-encoder offloading, T5 and CLIP run
        // on the CPU while the transformer and autoencoder stay on the
        // accelerator.
        let device = select_best_device(options.device_map).context("failed to set up device")?;
        let dtype = options.dtype.to_dtype(&device);
        let encoder_device = match options.offloading {
            Offloading::TextEncoders => Device::Cpu,
            Offloading::None => device.clone(),
        };
        let encoder_dtype = options.dtype.to_dtype(&encoder_device);

        // --- Load T5 Model and Tokenizer ---
        let t5_repo = api.repo(hf_hub::Repo::with_revision(
            "google/t5-v1_1-xxl".to_string(),
            hf_hub::RepoType::Model,
            "refs/pr/2".to_string(),
        ));
        let t5_model_file = t5_repo
            .get("model.safetensors")
            .await
            .context("failed to load T5 model file")?;
        let t5_vb = unsafe {
            candle_nn::VarBuilder::from_mmaped_safetensors(
                &[t5_model_file],
                encoder_dtype,
                &encoder_device,
            )
            .context("failed to build T5 var builder")?
        };
        let config_filename = t5_repo
            .get("config.json")
            .await
            .context("failed to get T5 config")?;
        let config_str =
            std::fs::read_to_string(&config_filename).context("failed to read T5 config")?;
        let t5_config: t5::Config =
            serde_json::from_str(&config_str).context("failed to parse T5 config")?;
        let t5_model =
            T5EncoderModel::load(t5_vb, &t5_config).context("failed to load T5 model")?;
        let t5_tokenizer_filename = api
            .model("lmz/mt5-tokenizers".to_string())
            .get("t5-v1_1-xxl.tokenizer.json")
            .await
            .context("failed to get T5 tokenizer")?;
        let t5_tokenizer = Tokenizer::from_file(t5_tokenizer_filename)
            .map_err(anyhow::Error::msg)
            .context("failed to load T5 tokenizer")?;

        // --- Load CLIP Model and Tokenizer ---
        let clip_repo = api.repo(hf_hub::Repo::model(
            "openai/clip-vit-large-patch14".to_string(),
        ));
        let clip_model_file = clip_repo
            .get("model.safetensors")
            .await
            .context("failed to get CLIP model file")?;
        let clip_vb = unsafe {
            candle_nn::VarBuilder::from_mmaped_safetensors(
                &[clip_model_file],
                encoder_dtype,
                &encoder_device,
            )
            .context("failed to build CLIP var builder")?
        };
        let clip_config = text_model::ClipTextConfig {
            vocab_size: 49408,
            projection_dim: 768,
            activation: text_model::Activation::QuickGelu,
            intermediate_size: 3072,
            embed_dim: 768,
            max_position_embeddings: 77,
            pad_with: None,
            num_hidden_layers: 12,
            num_attention_heads: 12,
        };
        let clip_model = ClipTextTransformer::new(clip_vb.pp("text_model"), &clip_config)
            .context("failed to load CLIP model")?;
        let clip_tokenizer_filename = clip_repo
            .get("tokenizer.json")
            .await
            .context("failed to get CLIP tokenizer")?;
        let clip_tokenizer = Tokenizer::from_file(clip_tokenizer_filename)
            .map_err(anyhow::Error::msg)
            .context("failed to load CLIP tokenizer")?;

        // --- Load Autoencoder ---
        let checkpoint_repo = api.repo(hf_hub::Repo::model(options.model_id.clone()));
        let autoencoder_model_file = checkpoint_repo
            .get("ae.safetensors")
            .await
            .context("failed to get autoencoder model file")?;
        let autoencoder_vb = unsafe {
            candle_nn::VarBuilder::from_mmaped_safetensors(
                &[autoencoder_model_file],
                dtype,
                &device,
            )
            .context("failed to build autoencoder var builder")?
        };
        let autoencoder_config =
            candle_transformers::models::flux::autoencoder::Config::schnell();
        let autoencoder = AutoEncoder::new(&autoencoder_config, autoencoder_vb)
            .context("failed to load autoencoder")?;

        // --- Load the transformer ---
        let flux_model_file = checkpoint_repo
            .get("flux1-schnell.safetensors")
            .await
            .context("failed to get transformer model file")?;
        let flux_vb = unsafe {
            candle_nn::VarBuilder::from_mmaped_safetensors(&[flux_model_file], dtype, &device)
                .context("failed to build transformer var builder")?
        };
        let flux_config = Config::schnell();
        let flux_model =
            Flux::new(&flux_config, flux_vb).context("failed to load transformer")?;

        Ok(TurboModel {
            device,
            dtype,
            encoder_device,
            t5_model: Mutex::new(t5_model),
            t5_tokenizer,
            clip_model,
            clip_tokenizer,
            autoencoder,
            flux_model,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noise_is_deterministic_per_seed() {
        let device = Device::Cpu;
        let a = seeded_noise(512, 512, 42, &device).unwrap();
        let b = seeded_noise(512, 512, 42, &device).unwrap();
        assert_eq!(
            a.flatten_all().unwrap().to_vec1::<f32>().unwrap(),
            b.flatten_all().unwrap().to_vec1::<f32>().unwrap()
        );
    }

    #[test]
    fn noise_differs_across_seeds() {
        let device = Device::Cpu;
        let a = seeded_noise(256, 256, 1, &device).unwrap();
        let b = seeded_noise(256, 256, 2, &device).unwrap();
        assert_ne!(
            a.flatten_all().unwrap().to_vec1::<f32>().unwrap(),
            b.flatten_all().unwrap().to_vec1::<f32>().unwrap()
        );
    }

    #[test]
    fn noise_shape_rounds_to_latent_grid() {
        let device = Device::Cpu;
        let noise = seeded_noise(1000, 512, 0, &device).unwrap();
        // 1000 rounds up to 63 groups of 16, doubled to 126.
        assert_eq!(noise.dims(), &[1, 16, 126, 64]);
    }
}
