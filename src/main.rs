use std::net::IpAddr;

use clap::Parser;
use log::info;

use mathpng::rendering::typeset::{MathJax, Typesetter};
use mathpng::server::{Server, Service};
use mathpng::{Fit, RasterOptions, Renderer, Rgb, ServerConfig};

#[derive(Parser)]
#[command(name = "mathpng")]
#[command(about = "Render TeX math to PNG over HTTP")]
struct Cli {
    /// Interface to listen on
    #[arg(long, default_value = "0.0.0.0")]
    host: IpAddr,

    /// Port to listen on
    #[arg(short, long, default_value_t = 3000)]
    port: u16,

    /// Async worker threads (defaults to the number of CPUs)
    #[arg(long)]
    workers: Option<usize>,

    /// Renders allowed to run at once (defaults to the number of CPUs)
    #[arg(long)]
    max_renders: Option<usize>,

    /// Per-request render timeout in milliseconds, 0 to disable
    #[arg(long, default_value_t = 30000)]
    timeout_ms: u64,

    /// Multiplier applied to the SVG's intrinsic size
    #[arg(long, default_value_t = 10.0)]
    scale: f32,

    /// Margin around the formula in pixels
    #[arg(long, default_value_t = 20)]
    padding: u32,

    /// Background colour behind the formula (#rrggbb)
    #[arg(long, default_value = "#ffffff")]
    background: Rgb,

    /// Margin colour (#rrggbb)
    #[arg(long, default_value = "#ffffff")]
    padding_color: Rgb,

    /// Placement of the formula in its box: contain or fill
    #[arg(long, default_value = "contain")]
    fit: Fit,

    /// Largest accepted `w` query parameter
    #[arg(long, default_value_t = 4096)]
    max_width: u32,

    /// Largest output width or height in pixels
    #[arg(long, default_value_t = 16384)]
    max_dimension: u32,

    /// Largest output area in pixels
    #[arg(long, default_value_t = 16_777_216)]
    max_pixels: u64,
}

impl Cli {
    fn config(&self) -> ServerConfig {
        ServerConfig {
            host: self.host,
            port: self.port,
            timeout_ms: self.timeout_ms,
            max_width: self.max_width,
            max_concurrent_renders: self.max_renders.unwrap_or_else(num_cpus::get).max(1),
            raster: RasterOptions {
                scale_factor: self.scale,
                padding_px: self.padding,
                background: self.background,
                padding_color: self.padding_color,
                fit: self.fit,
                max_dimension: self.max_dimension,
                max_pixels: self.max_pixels,
            },
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if !(cli.scale.is_finite() && cli.scale > 0.0) {
        anyhow::bail!("--scale must be a positive number, got {}", cli.scale);
    }

    // The engine's process-wide setup is not safe to race from several
    // threads; run it once here before any request thread can.
    let engine = MathJax::new();
    engine.typeset("x")?;
    info!("MathJax engine ready");

    let workers = cli.workers.unwrap_or_else(num_cpus::get).max(1);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(workers)
        .enable_all()
        .build()?;

    runtime.block_on(serve(engine, cli.config()))
}

async fn serve(engine: MathJax, config: ServerConfig) -> anyhow::Result<()> {
    let renderer = Renderer::new(engine, config.raster.clone());
    let server = Server::bind(config.addr(), Service::new(renderer, &config))?;
    info!(
        "Server is listening on {} ({} concurrent renders)",
        config.addr(),
        config.max_concurrent_renders
    );

    let handle = server.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutting down");
            handle.shutdown();
        }
    });

    server.run().await?;
    Ok(())
}
