use anyhow::Result;
use clap::Parser;
use sdgen_core::{CachePolicy, DeviceMap, Generator, GeneratorConfig, Mode, SchedulerKind};
use std::path::PathBuf;
use tokio::{self, net::TcpListener};

mod api;

// Define command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "Stable Diffusion image generation server")]
struct Args {
    /// JSON file with generator settings; flags below override it
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Use CPU instead of GPU
    #[arg(long)]
    cpu: bool,

    /// Hugging Face model id to load
    #[arg(long)]
    model: Option<String>,

    /// Directory generated images and prompts are written to
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Noise scheduler: euler_ancestral or ddim
    #[arg(long)]
    scheduler: Option<SchedulerKind>,

    /// Keep full precision even on an accelerator
    #[arg(long)]
    no_f16: bool,

    /// Use flash attention in the UNet (needs the flash-attn feature)
    #[arg(long)]
    use_flash_attn: bool,

    /// The size of the sliced attention, or unset to disable slicing
    #[arg(long)]
    sliced_attention_size: Option<usize>,

    /// Keep returning the first cached pipeline even when another mode is requested
    #[arg(long)]
    parity_cache: bool,

    /// Build the pipeline for this mode before accepting requests
    #[arg(long)]
    preload: Option<Mode>,

    /// Host address to bind the server to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to bind the server to
    #[arg(long, default_value_t = 8000)]
    port: u16,
}

impl Args {
    fn generator_config(&self) -> Result<GeneratorConfig> {
        let mut config = match &self.config {
            Some(path) => GeneratorConfig::from_json_file(path)?,
            None => GeneratorConfig::default(),
        };
        if self.cpu {
            config.device = DeviceMap::ForceCpu;
        }
        if let Some(model) = &self.model {
            config.model_id = model.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(scheduler) = self.scheduler {
            config.scheduler = scheduler;
        }
        if self.no_f16 {
            config.use_f16 = false;
        }
        if self.use_flash_attn {
            config.use_flash_attn = true;
        }
        if self.sliced_attention_size.is_some() {
            config.sliced_attention_size = self.sliced_attention_size;
        }
        if self.parity_cache {
            config.cache_policy = CachePolicy::MostRecent;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let config = args.generator_config()?;

    let mut generator = Generator::from_config(config)?;
    if let Some(mode) = args.preload {
        generator.provider_mut().get_pipeline(mode)?;
    }

    let app = api::router(api::AppState::new(generator));

    // --- Start the server ---
    let bind_address = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&bind_address).await?;
    log::info!("Started server on {}", listener.local_addr()?);
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
