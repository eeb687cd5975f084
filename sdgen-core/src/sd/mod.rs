use anyhow::{Context, Error, Result};
use candle_core::{DType, Device, IndexOp, Tensor};
use candle_nn::Module;
use candle_transformers::models::stable_diffusion::{
    self, clip::ClipTextTransformer, schedulers::PredictionType, unet_2d::UNet2DConditionModel,
    vae::AutoEncoderKL, StableDiffusionConfig,
};
use hf_hub::api::sync::{Api, ApiRepo};
use image::DynamicImage;
use std::path::PathBuf;
use tokenizers::Tokenizer;

mod noise;
mod scheduler;

use noise::LatentNoise;

pub use scheduler::SchedulerKind;

use crate::{
    image_to_tensor, select_best_device, tensor_to_image, Conditioning, GeneratorConfig, Loader,
    Mode, ModelVariant, PipelineLike, PipelineParams, ProgressCallback,
};

const VAE_SCALE: f64 = 0.18215;

pub struct StableDiffusionPipeline {
    mode: Mode,
    device: Device,
    dtype: DType,
    sd_config: StableDiffusionConfig,
    prediction_type: PredictionType,
    scheduler: SchedulerKind,
    tokenizer: Tokenizer,
    pad_id: u32,
    clip_model: ClipTextTransformer,
    autoencoder: AutoEncoderKL,
    unet: UNet2DConditionModel,
}

impl StableDiffusionPipeline {
    fn encode_prompt(&self, prompt: &str) -> Result<Tensor> {
        let max_len = self.sd_config.clip.max_position_embeddings;
        let tokens = self
            .tokenizer
            .encode(prompt, true)
            .map_err(Error::msg)?
            .get_ids()
            .to_vec();
        let count = tokens.len();
        let tokens = fit_tokens(tokens, max_len, self.pad_id);
        if count > max_len {
            log::warn!("prompt is {count} tokens, truncated to the first {max_len}");
        }
        let tokens = Tensor::new(tokens.as_slice(), &self.device)?.unsqueeze(0)?;
        Ok(self.clip_model.forward(&tokens)?)
    }

    fn text_embeddings(&self, params: &PipelineParams, guided: bool) -> Result<Tensor> {
        let cond = self.encode_prompt(&params.prompt)?;
        let embeddings = if guided {
            let uncond = self.encode_prompt(params.negative_prompt.as_deref().unwrap_or(""))?;
            Tensor::cat(&[uncond, cond], 0)?
        } else {
            cond
        };
        Ok(embeddings.to_dtype(self.dtype)?)
    }

    fn decode(&self, latents: &Tensor) -> Result<DynamicImage> {
        let image = self.autoencoder.decode(&(latents / VAE_SCALE)?)?;
        let image = ((image / 2.)? + 0.5)?
            .to_device(&Device::Cpu)?
            .to_dtype(DType::F32)?;
        let image = (image.clamp(0f32, 1.)? * 255.)?.to_dtype(DType::U8)?;
        tensor_to_image(&image.i(0)?)
    }
}

/// Pads CLIP token ids to `max_len`, or truncates them while keeping the
/// end-of-text marker as the final token.
fn fit_tokens(mut tokens: Vec<u32>, max_len: usize, pad_id: u32) -> Vec<u32> {
    if tokens.len() > max_len {
        let end = tokens[tokens.len() - 1];
        tokens.truncate(max_len);
        if let Some(last) = tokens.last_mut() {
            *last = end;
        }
    } else {
        tokens.resize(max_len, pad_id);
    }
    tokens
}

impl PipelineLike for StableDiffusionPipeline {
    fn mode(&self) -> Mode {
        self.mode
    }

    fn run(
        &mut self,
        params: &PipelineParams,
        progress: &mut dyn ProgressCallback,
    ) -> Result<Vec<DynamicImage>> {
        let mut noise = LatentNoise::new(&self.device, params.seed)?;

        let mut scheduler = self
            .scheduler
            .build(self.prediction_type, params.num_inference_steps)?;
        let timesteps = scheduler.timesteps().to_vec();
        let guided = params.guidance_scale > 1.;
        let text_embeddings = self.text_embeddings(params, guided)?;

        // --- Initial latents: pure noise, or the noised seed image ---
        let (mut latents, t_start) = match (&params.conditioning, self.mode) {
            (Conditioning::Dimensions { width, height }, Mode::TextToImage) => {
                let latents = noise.randn((1, 4, height / 8, width / 8), &self.device)?;
                let latents = (latents * scheduler.init_noise_sigma())?.to_dtype(self.dtype)?;
                (latents, 0)
            }
            (Conditioning::SeedImage { image, strength }, Mode::ImageToImage) => {
                let steps = timesteps.len();
                let t_start = steps - (steps as f64 * strength) as usize;
                if t_start >= steps {
                    anyhow::bail!("strength {strength} leaves no denoising steps to run");
                }
                let init_image = image_to_tensor(image, &self.device, self.dtype)?;
                let init_latents = (self.autoencoder.encode(&init_image)?.sample()? * VAE_SCALE)?;
                let latent_noise = noise
                    .randn(init_latents.dims4()?, &self.device)?
                    .to_dtype(init_latents.dtype())?;
                let latents =
                    scheduler.add_noise(&init_latents, latent_noise, timesteps[t_start])?;
                (latents.to_dtype(self.dtype)?, t_start)
            }
            (_, mode) => {
                anyhow::bail!("a {mode} pipeline cannot run these parameters")
            }
        };

        // --- Denoising loop ---
        let total = timesteps.len() - t_start;
        for (index, &timestep) in timesteps.iter().enumerate().skip(t_start) {
            let latent_model_input = if guided {
                Tensor::cat(&[&latents, &latents], 0)?
            } else {
                latents.clone()
            };
            let latent_model_input = scheduler.scale_model_input(latent_model_input, timestep)?;
            let noise_pred =
                self.unet
                    .forward(&latent_model_input, timestep as f64, &text_embeddings)?;
            let noise_pred = if guided {
                let chunks = noise_pred.chunk(2, 0)?;
                let (uncond, text) = (&chunks[0], &chunks[1]);
                (uncond + ((text - uncond)? * params.guidance_scale)?)?
            } else {
                noise_pred
            };
            latents = scheduler.step(&noise_pred, timestep, &latents)?;
            progress.on_step(index + 1 - t_start, total);
        }

        Ok(vec![self.decode(&latents)?])
    }

    fn release_memory(&self) -> Result<()> {
        self.device.synchronize()?;
        Ok(())
    }
}

/// Fetches Stable Diffusion weights from the hub (or the configured local
/// overrides) and builds a pipeline for either mode.
pub struct StableDiffusionLoader {
    api: Api,
    config: GeneratorConfig,
    variant: ModelVariant,
    device: Device,
    dtype: DType,
}

impl StableDiffusionLoader {
    pub fn new(config: GeneratorConfig) -> Result<Self> {
        let variant = ModelVariant::from_name(&config.model_id)
            .ok_or_else(|| anyhow::anyhow!("Unsupported model: {}", config.model_id))?;
        let device = select_best_device(config.device).context("failed to set up device")?;
        let dtype = if config.use_f16 && !device.is_cpu() {
            DType::F16
        } else {
            DType::F32
        };
        log::info!(
            "Using {} (detected variant: {variant:?}) on {device:?} with {dtype:?}",
            config.model_id
        );
        let api = Api::new().context("failed to create hf hub API")?;
        Ok(Self {
            api,
            config,
            variant,
            device,
            dtype,
        })
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    fn model_repo(&self) -> ApiRepo {
        self.api.repo(hf_hub::Repo::with_revision(
            self.config.model_id.clone(),
            hf_hub::RepoType::Model,
            self.config.revision.clone(),
        ))
    }

    fn weights_file(&self, local: &Option<PathBuf>, component: &str, name: &str) -> Result<PathBuf> {
        if let Some(path) = local {
            return Ok(path.clone());
        }
        let file = if self.dtype == DType::F16 {
            format!("{component}/{name}.fp16.safetensors")
        } else {
            format!("{component}/{name}.safetensors")
        };
        log::info!("Fetching {file}");
        self.model_repo()
            .get(&file)
            .with_context(|| format!("failed to get {file}"))
    }
}

impl Loader for StableDiffusionLoader {
    type Pipeline = StableDiffusionPipeline;

    fn load(&self, mode: Mode) -> Result<Self::Pipeline> {
        let sd_config = self.variant.sd_config(self.config.sliced_attention_size);
        let weights = &self.config.weights;

        // --- Tokenizer ---
        let tokenizer_file = match &weights.tokenizer {
            Some(path) => path.clone(),
            None => self
                .api
                .model(self.config.tokenizer_repo.clone())
                .get("tokenizer.json")
                .context("failed to get CLIP tokenizer")?,
        };
        let tokenizer = Tokenizer::from_file(tokenizer_file)
            .map_err(Error::msg)
            .context("failed to load CLIP tokenizer")?;
        let pad_token = sd_config.clip.pad_with.as_deref().unwrap_or("<|endoftext|>");
        let pad_id = tokenizer
            .token_to_id(pad_token)
            .ok_or_else(|| anyhow::anyhow!("tokenizer has no {pad_token} token"))?;

        // --- CLIP text encoder ---
        let clip_file = self.weights_file(&weights.clip, "text_encoder", "model")?;
        let clip_model = stable_diffusion::build_clip_transformer(
            &sd_config.clip,
            clip_file,
            &self.device,
            self.dtype,
        )
        .context("failed to load CLIP model")?;

        // --- Autoencoder ---
        let vae_file = self.weights_file(&weights.vae, "vae", "diffusion_pytorch_model")?;
        let autoencoder = sd_config
            .build_vae(vae_file, &self.device, self.dtype)
            .context("failed to load autoencoder")?;

        // --- UNet ---
        let unet_file = self.weights_file(&weights.unet, "unet", "diffusion_pytorch_model")?;
        let unet = sd_config
            .build_unet(
                unet_file,
                &self.device,
                4,
                self.config.use_flash_attn,
                self.dtype,
            )
            .context("failed to load unet")?;

        log::info!("Loaded {mode} pipeline with {} scheduler", self.config.scheduler);
        Ok(StableDiffusionPipeline {
            mode,
            device: self.device.clone(),
            dtype: self.dtype,
            sd_config,
            prediction_type: self.variant.prediction_type(),
            scheduler: self.config.scheduler,
            tokenizer,
            pad_id,
            clip_model,
            autoencoder,
            unet,
        })
    }
}
