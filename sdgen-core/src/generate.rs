//! The generation orchestrator.
//!
//! A call validates the request and assembles the mode-specific parameter set
//! before any pipeline is touched. It then fetches the cached pipeline, runs it
//! with the caller's progress hook, and persists the first image it returns.

use anyhow::anyhow;
use image::DynamicImage;

use crate::{
    CachePolicy, Conditioning, GenerateError, GenerationRequest, GeneratorConfig, Loader, Mode,
    OutputFiles, OutputStore, PipelineLike, PipelineParams, PipelineProvider, ProgressCallback,
    Result, StableDiffusionLoader,
};

#[derive(Debug, Clone)]
pub struct Generation {
    pub image: DynamicImage,
    pub files: OutputFiles,
}

/// Validates `request` for the named mode and builds the parameter set.
///
/// text2img takes the request's width and height and ignores any seed image.
/// img2img takes the seed image (and strength) and ignores the dimensions.
pub fn assemble_params(
    request: &GenerationRequest,
    mode: &str,
    seed_image: Option<DynamicImage>,
) -> Result<PipelineParams> {
    let invalid = |reason: &str| GenerateError::invalid(mode, request.prompt.as_str(), reason);

    let mode = Mode::from_name(mode).ok_or_else(|| invalid("unknown mode"))?;
    if request.prompt.is_empty() {
        return Err(invalid("prompt is empty"));
    }
    if request.steps == 0 {
        return Err(invalid("steps must be positive"));
    }

    let conditioning = match (mode, seed_image) {
        (Mode::TextToImage, _) => {
            let (width, height) = (request.width, request.height);
            if width == 0 || height == 0 {
                return Err(invalid("width and height must be positive"));
            }
            if width % 8 != 0 || height % 8 != 0 {
                return Err(invalid("width and height must be multiples of 8"));
            }
            Conditioning::Dimensions { width, height }
        }
        (Mode::ImageToImage, Some(image)) => {
            if !(0. ..=1.).contains(&request.strength) {
                return Err(invalid("strength must be between 0 and 1"));
            }
            if (request.steps as f64 * request.strength) as usize == 0 {
                return Err(invalid("strength leaves no denoising steps to run"));
            }
            Conditioning::SeedImage {
                image,
                strength: request.strength,
            }
        }
        (Mode::ImageToImage, None) => return Err(invalid("img2img requires a seed image")),
    };

    let negative_prompt = request
        .negative_prompt
        .as_ref()
        .filter(|p| !p.is_empty())
        .cloned();

    Ok(PipelineParams {
        mode,
        prompt: request.prompt.clone(),
        negative_prompt,
        num_inference_steps: request.steps,
        guidance_scale: request.guidance_scale,
        seed: request.seed,
        conditioning,
    })
}

pub struct Generator<L: Loader> {
    provider: PipelineProvider<L>,
    store: OutputStore,
}

impl Generator<StableDiffusionLoader> {
    pub fn from_config(config: GeneratorConfig) -> anyhow::Result<Self> {
        let store = OutputStore::new(config.output_dir.clone());
        let policy = config.cache_policy;
        let loader = StableDiffusionLoader::new(config)?;
        Ok(Self::new(loader, policy, store))
    }
}

impl<L: Loader> Generator<L> {
    pub fn new(loader: L, policy: CachePolicy, store: OutputStore) -> Self {
        Self {
            provider: PipelineProvider::new(loader, policy),
            store,
        }
    }

    pub fn provider(&self) -> &PipelineProvider<L> {
        &self.provider
    }

    pub fn provider_mut(&mut self) -> &mut PipelineProvider<L> {
        &mut self.provider
    }

    pub fn store(&self) -> &OutputStore {
        &self.store
    }

    pub fn generate(
        &mut self,
        request: &GenerationRequest,
        mode: &str,
        seed_image: Option<DynamicImage>,
        progress: &mut dyn ProgressCallback,
    ) -> Result<Generation> {
        let params = assemble_params(request, mode, seed_image)?;
        let mode = params.mode;

        let pipeline = self.provider.get_pipeline(mode)?;
        if let Err(e) = pipeline.release_memory() {
            log::warn!("Failed to release accelerator memory: {e:#}");
        }

        log::debug!(
            "Running {mode} with prompt={:?} negative_prompt={:?} steps={} guidance_scale={} seed={:?} dimensions={:?} seed_image={}",
            params.prompt,
            params.negative_prompt,
            params.num_inference_steps,
            params.guidance_scale,
            params.seed,
            params.conditioning.dimensions(),
            params.conditioning.seed_image().is_some(),
        );

        let image = pipeline
            .run(&params, progress)?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("pipeline returned no images"))?;

        let files = self.store.save(&request.prompt, &image)?;
        Ok(Generation { image, files })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed() -> Option<DynamicImage> {
        Some(DynamicImage::new_rgb8(64, 64))
    }

    #[test]
    fn text2img_params_carry_dimensions_only() {
        let request = GenerationRequest::new("a cat").with_size(768, 512);
        for image in [None, seed()] {
            let params = assemble_params(&request, "text2img", image).unwrap();
            assert_eq!(params.mode, Mode::TextToImage);
            assert_eq!(params.conditioning.dimensions(), Some((768, 512)));
            assert!(params.conditioning.seed_image().is_none());
        }
    }

    #[test]
    fn img2img_params_carry_the_seed_image_only() {
        let request = GenerationRequest::new("a cat").with_strength(0.6);
        let params = assemble_params(&request, "img2img", seed()).unwrap();
        assert!(params.conditioning.dimensions().is_none());
        assert_eq!(params.conditioning.seed_image().map(|i| i.width()), Some(64));
        assert!(matches!(
            params.conditioning,
            Conditioning::SeedImage { strength, .. } if strength == 0.6
        ));
    }

    #[test]
    fn common_fields_are_forwarded() {
        let request = GenerationRequest::new("a cat")
            .with_negative_prompt("blurry")
            .with_steps(12)
            .with_guidance_scale(3.0)
            .with_seed(7);
        let params = assemble_params(&request, "text2img", None).unwrap();
        assert_eq!(params.prompt, "a cat");
        assert_eq!(params.negative_prompt.as_deref(), Some("blurry"));
        assert_eq!(params.num_inference_steps, 12);
        assert_eq!(params.guidance_scale, 3.0);
        assert_eq!(params.seed, Some(7));
    }

    #[test]
    fn empty_negative_prompt_is_absent() {
        let request = GenerationRequest::new("a cat").with_negative_prompt("");
        let params = assemble_params(&request, "text2img", None).unwrap();
        assert_eq!(params.negative_prompt, None);
    }

    #[test]
    fn img2img_without_seed_is_invalid() {
        let err = assemble_params(&GenerationRequest::new("a cat"), "img2img", None).unwrap_err();
        match err {
            GenerateError::InvalidRequest { mode, prompt, .. } => {
                assert_eq!(mode, "img2img");
                assert_eq!(prompt, "a cat");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn unknown_modes_are_invalid() {
        for mode in ["txt2img", "inpaint", ""] {
            let err = assemble_params(&GenerationRequest::new("a cat"), mode, seed()).unwrap_err();
            assert!(err.is_invalid_request());
            assert!(err.to_string().contains("a cat"));
        }
    }

    #[test]
    fn out_of_range_inputs_are_invalid() {
        let cases = [
            (GenerationRequest::new(""), "text2img"),
            (GenerationRequest::new("a cat").with_steps(0), "text2img"),
            (GenerationRequest::new("a cat").with_size(0, 512), "text2img"),
            (GenerationRequest::new("a cat").with_size(500, 512), "text2img"),
            (GenerationRequest::new("a cat").with_strength(1.5), "img2img"),
            (GenerationRequest::new("a cat").with_strength(0.0), "img2img"),
            (GenerationRequest::new("a cat").with_strength(0.01), "img2img"),
        ];
        for (request, mode) in cases {
            let err = assemble_params(&request, mode, seed()).unwrap_err();
            assert!(err.is_invalid_request(), "{request:?} should be rejected");
        }
    }

    #[test]
    fn img2img_ignores_dimensions() {
        let request = GenerationRequest::new("a cat").with_size(0, 3);
        assert!(assemble_params(&request, "img2img", seed()).is_ok());
    }
}
