use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::Mode;

pub const DEFAULT_STEPS: usize = 50;
pub const DEFAULT_WIDTH: usize = 512;
pub const DEFAULT_HEIGHT: usize = 512;
pub const DEFAULT_GUIDANCE_SCALE: f64 = 7.5;
pub const DEFAULT_STRENGTH: f64 = 0.8;

/// User-facing parameters of a single generation. The mode and the seed image
/// travel beside it.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, PartialOrd)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: Option<String>,
    #[serde(default = "default_steps")]
    pub steps: usize,
    #[serde(default = "default_width")]
    pub width: usize,
    #[serde(default = "default_height")]
    pub height: usize,
    #[serde(default = "default_guidance_scale")]
    pub guidance_scale: f64,
    #[serde(default)]
    pub seed: Option<u64>,
    /// How much of the seed image is repainted. Only read in img2img mode.
    #[serde(default = "default_strength")]
    pub strength: f64,
}

fn default_steps() -> usize {
    DEFAULT_STEPS
}

fn default_width() -> usize {
    DEFAULT_WIDTH
}

fn default_height() -> usize {
    DEFAULT_HEIGHT
}

fn default_guidance_scale() -> f64 {
    DEFAULT_GUIDANCE_SCALE
}

fn default_strength() -> f64 {
    DEFAULT_STRENGTH
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            negative_prompt: None,
            steps: DEFAULT_STEPS,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            guidance_scale: DEFAULT_GUIDANCE_SCALE,
            seed: None,
            strength: DEFAULT_STRENGTH,
        }
    }

    pub fn with_negative_prompt(mut self, negative_prompt: impl Into<String>) -> Self {
        self.negative_prompt = Some(negative_prompt.into());
        self
    }

    pub fn with_steps(mut self, steps: usize) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_size(mut self, width: usize, height: usize) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_guidance_scale(mut self, guidance_scale: f64) -> Self {
        self.guidance_scale = guidance_scale;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_strength(mut self, strength: f64) -> Self {
        self.strength = strength;
        self
    }
}

/// Mode-specific input. A parameter set holds exactly one of these, so a
/// text2img call can never carry an image and an img2img call never carries
/// dimensions.
#[derive(Debug, Clone)]
pub enum Conditioning {
    Dimensions { width: usize, height: usize },
    SeedImage { image: DynamicImage, strength: f64 },
}

impl Conditioning {
    pub fn dimensions(&self) -> Option<(usize, usize)> {
        match self {
            Conditioning::Dimensions { width, height } => Some((*width, *height)),
            Conditioning::SeedImage { .. } => None,
        }
    }

    pub fn seed_image(&self) -> Option<&DynamicImage> {
        match self {
            Conditioning::SeedImage { image, .. } => Some(image),
            Conditioning::Dimensions { .. } => None,
        }
    }
}

/// The assembled parameter set handed to a pipeline.
#[derive(Debug, Clone)]
pub struct PipelineParams {
    pub mode: Mode,
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub num_inference_steps: usize,
    pub guidance_scale: f64,
    pub seed: Option<u64>,
    pub conditioning: Conditioning,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let request: GenerationRequest =
            serde_json::from_str(r#"{"prompt": "a lighthouse at dusk"}"#).unwrap();
        assert_eq!(request, GenerationRequest::new("a lighthouse at dusk"));
        assert_eq!(request.steps, 50);
        assert_eq!((request.width, request.height), (512, 512));
        assert_eq!(request.guidance_scale, 7.5);
        assert_eq!(request.negative_prompt, None);
    }

    #[test]
    fn conditioning_accessors() {
        let dims = Conditioning::Dimensions {
            width: 640,
            height: 384,
        };
        assert_eq!(dims.dimensions(), Some((640, 384)));
        assert!(dims.seed_image().is_none());

        let seed = Conditioning::SeedImage {
            image: DynamicImage::new_rgb8(8, 8),
            strength: 0.5,
        };
        assert!(seed.dimensions().is_none());
        assert_eq!(seed.seed_image().map(|i| i.width()), Some(8));
    }
}
