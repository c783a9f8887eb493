use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use stackview::AppConfig;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stackview", about = "Chase-camera demo level on a matrix-stack renderer")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Window width in pixels
    #[arg(long, default_value_t = 640)]
    width: u32,

    /// Window height in pixels
    #[arg(long, default_value_t = 480)]
    height: u32,

    /// Simulation ticks per second
    #[arg(long, default_value_t = stackview::DEFAULT_TICK_RATE_HZ)]
    tick_rate: u32,

    /// Directory containing mesh.vert.wgsl and mesh.frag.wgsl
    #[arg(long)]
    shaders: Option<PathBuf>,

    /// Image file applied to the player cube
    #[arg(long)]
    texture: Option<PathBuf>,
}

impl Cli {
    fn into_config(self) -> AppConfig {
        let mut config = AppConfig::new()
            .size(self.width, self.height)
            .tick_rate(self.tick_rate);
        if let Some(dir) = self.shaders {
            config = config.shader_dir(dir);
        }
        if let Some(path) = self.texture {
            config = config.texture(path);
        }
        config
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("stackview starting");

    match stackview::run(cli.into_config()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "stackview exited with an error");
            ExitCode::FAILURE
        }
    }
}
