//! Generation modes.

use serde::{Deserialize, Serialize};

/// Selects which pipeline variant is built and which inputs a request needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    /// Start from pure noise; the request supplies output dimensions.
    #[serde(rename = "text2img")]
    TextToImage,
    /// Start from a seed image; the request supplies the image.
    #[serde(rename = "img2img")]
    ImageToImage,
}

serde_plain::derive_display_from_serialize!(Mode);
serde_plain::derive_fromstr_from_deserialize!(Mode);

impl Mode {
    pub const ALL: [Mode; 2] = [Mode::TextToImage, Mode::ImageToImage];

    /// Look a mode up by its wire name. Anything else yields `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        name.parse().ok()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::TextToImage => "text2img",
            Mode::ImageToImage => "img2img",
        }
    }

    pub fn needs_seed_image(&self) -> bool {
        matches!(self, Mode::ImageToImage)
    }
}
