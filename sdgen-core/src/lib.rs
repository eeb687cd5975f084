#[cfg(feature = "accelerate")]
extern crate accelerate_src;

#[cfg(feature = "mkl")]
extern crate intel_mkl_src;

pub mod config;
pub mod device_map;
pub mod error;
pub mod generate;
pub mod loader;
pub mod mode;
pub mod output;
pub mod progress;
pub mod provider;
pub mod request;
mod util;
mod variant;

mod sd;

pub use config::*;
pub use device_map::*;
pub use error::{GenerateError, Result};
pub use generate::*;
pub use loader::*;
pub use mode::Mode;
pub use output::*;
pub use progress::*;
pub use provider::*;
pub use request::*;
pub use sd::{SchedulerKind, StableDiffusionLoader, StableDiffusionPipeline};
pub(crate) use util::*;
pub use variant::ModelVariant;
