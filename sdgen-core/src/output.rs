//! Writes each generated image next to the prompt that produced it.

use image::DynamicImage;
use regex::Regex;
use serde::Serialize;
use std::{
    path::{Path, PathBuf},
    sync::OnceLock,
    time::{SystemTime, UNIX_EPOCH},
};

pub const DEFAULT_OUTPUT_DIR: &str = "outputs";
const STEM_PREFIX_CHARS: usize = 50;

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct OutputFiles {
    pub image: PathBuf,
    pub prompt: PathBuf,
}

fn whitespace() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("static regex"))
}

/// `<prompt prefix>_<unix seconds>.<micros>`: whitespace runs become `_`,
/// path separators are replaced and the prefix is cut at 50 characters.
pub fn file_stem(prompt: &str, timestamp: SystemTime) -> String {
    let collapsed = whitespace().replace_all(prompt, "_");
    let prefix: String = collapsed
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .take(STEM_PREFIX_CHARS)
        .collect();
    // Clocks set before 1970 collapse to zero rather than failing the save.
    let since_epoch = timestamp.duration_since(UNIX_EPOCH).unwrap_or_default();
    format!(
        "{prefix}_{}.{:06}",
        since_epoch.as_secs(),
        since_epoch.subsec_micros()
    )
}

#[derive(Debug, Clone)]
pub struct OutputStore {
    dir: PathBuf,
}

impl Default for OutputStore {
    fn default() -> Self {
        Self::new(DEFAULT_OUTPUT_DIR)
    }
}

impl OutputStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn save(&self, prompt: &str, image: &DynamicImage) -> crate::Result<OutputFiles> {
        self.save_at(prompt, image, SystemTime::now())
    }

    pub fn save_at(
        &self,
        prompt: &str,
        image: &DynamicImage,
        timestamp: SystemTime,
    ) -> crate::Result<OutputFiles> {
        std::fs::create_dir_all(&self.dir)?;
        let stem = file_stem(prompt, timestamp);
        let files = OutputFiles {
            image: self.dir.join(format!("{stem}.png")),
            prompt: self.dir.join(format!("{stem}.txt")),
        };
        image.save_with_format(&files.image, image::ImageFormat::Png)?;
        std::fs::write(&files.prompt, prompt)?;
        log::info!("Saved {}", files.image.display());
        Ok(files)
    }
}
