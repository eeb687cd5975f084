use anyhow::Result;
use image::DynamicImage;

use crate::{Mode, PipelineParams, ProgressCallback};

/// A loaded, device-bound generation pipeline.
pub trait PipelineLike: Send {
    /// The mode this pipeline was constructed for.
    fn mode(&self) -> Mode;

    /// Runs one generation and returns every image the pipeline produced.
    fn run(
        &mut self,
        params: &PipelineParams,
        progress: &mut dyn ProgressCallback,
    ) -> Result<Vec<DynamicImage>>;

    /// Flushes outstanding accelerator work before a new run.
    fn release_memory(&self) -> Result<()> {
        Ok(())
    }
}

/// Builds pipelines. Construction is expensive: it picks a scheduler, loads
/// pretrained weights and moves them to the compute device.
pub trait Loader {
    type Pipeline: PipelineLike;

    fn load(&self, mode: Mode) -> Result<Self::Pipeline>;
}
