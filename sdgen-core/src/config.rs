use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{CachePolicy, DeviceMap, SchedulerKind, DEFAULT_OUTPUT_DIR};

pub const DEFAULT_MODEL_ID: &str = "stabilityai/stable-diffusion-2-1-base";
pub const DEFAULT_TOKENIZER_REPO: &str = "openai/clip-vit-base-patch32";

/// Local weight files that take precedence over hub downloads.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct WeightOverrides {
    pub unet: Option<PathBuf>,
    pub vae: Option<PathBuf>,
    pub clip: Option<PathBuf>,
    pub tokenizer: Option<PathBuf>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct GeneratorConfig {
    pub model_id: String,
    pub revision: String,
    pub tokenizer_repo: String,
    pub output_dir: PathBuf,
    pub device: DeviceMap,
    /// Run in half precision when an accelerator is available.
    pub use_f16: bool,
    pub use_flash_attn: bool,
    pub scheduler: SchedulerKind,
    pub cache_policy: CachePolicy,
    pub sliced_attention_size: Option<usize>,
    pub weights: WeightOverrides,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            model_id: DEFAULT_MODEL_ID.to_string(),
            revision: "main".to_string(),
            tokenizer_repo: DEFAULT_TOKENIZER_REPO.to_string(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            device: DeviceMap::default(),
            use_f16: true,
            use_flash_attn: false,
            scheduler: SchedulerKind::default(),
            cache_policy: CachePolicy::default(),
            sliced_attention_size: None,
            weights: WeightOverrides::default(),
        }
    }
}

impl GeneratorConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config {}", path.display()))
    }
}
