// SPDX-License-Identifier: GPL-3.0-only

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use vidmask::Config;
use vidmask::media::segmentation::SegmenterKind;

mod cli;

#[derive(Parser)]
#[command(name = "vidmask")]
#[command(about = "Replace your webcam background and publish it as a virtual camera")]
#[command(version = vidmask::constants::app_info::version())]
#[command(subcommand_required = false)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    overrides: Overrides,

    /// Config file (default: ~/.config/vidmask/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log at info level (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive terminal UI with live preview (default)
    Terminal,

    /// Stream without a UI until interrupted
    Stream {
        /// Stop after this many seconds
        #[arg(short, long)]
        duration: Option<u64>,
    },

    /// List video devices and mark loopback outputs
    List,
}

/// Command-line settings that take precedence over the config file
#[derive(Args, Default)]
struct Overrides {
    /// Capture device
    #[arg(short, long, global = true)]
    input: Option<String>,

    /// Stream an image file instead of a capture device
    #[arg(long, global = true)]
    input_image: Option<PathBuf>,

    /// v4l2loopback output device
    #[arg(short, long, global = true)]
    output: Option<String>,

    /// Background image
    #[arg(short, long, global = true)]
    background: Option<PathBuf>,

    #[arg(long, global = true)]
    width: Option<u32>,

    #[arg(long, global = true)]
    height: Option<u32>,

    #[arg(long, global = true)]
    fps: Option<u32>,

    /// Foreground scale factor
    #[arg(long, global = true)]
    scale: Option<f32>,

    /// Segmentation backend
    #[arg(long, value_enum, global = true)]
    segmenter: Option<SegmenterArg>,

    /// Directory containing the ONNX models
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,

    /// Mirror the foreground horizontally
    #[arg(long, global = true)]
    flip: bool,

    /// Don't fill the preview queue
    #[arg(long, global = true)]
    no_preview: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum SegmenterArg {
    Auto,
    FullForeground,
    ChromaKey,
    Onnx,
}

impl From<SegmenterArg> for SegmenterKind {
    fn from(arg: SegmenterArg) -> Self {
        match arg {
            SegmenterArg::Auto => SegmenterKind::Auto,
            SegmenterArg::FullForeground => SegmenterKind::FullForeground,
            SegmenterArg::ChromaKey => SegmenterKind::ChromaKey,
            SegmenterArg::Onnx => SegmenterKind::Onnx,
        }
    }
}

impl Overrides {
    fn apply(self, config: &mut Config) {
        if let Some(input) = self.input {
            config.input_device = input;
        }
        if self.input_image.is_some() {
            config.input_image = self.input_image;
        }
        if self.output.is_some() {
            config.output_device = self.output;
        }
        if self.background.is_some() {
            config.background = self.background;
        }
        if let Some(width) = self.width {
            config.width = width;
        }
        if let Some(height) = self.height {
            config.height = height;
        }
        if let Some(fps) = self.fps {
            config.fps = fps;
        }
        if let Some(scale) = self.scale {
            config.scale = scale;
        }
        if let Some(segmenter) = self.segmenter {
            config.segmenter = segmenter.into();
        }
        if self.model_dir.is_some() {
            config.model_dir = self.model_dir;
        }
        if self.flip {
            config.flip_horizontal = true;
        }
        if self.no_preview {
            config.show_preview = false;
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // RUST_LOG overrides the default level, e.g. RUST_LOG=vidmask=debug
    let default_level = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .init();

    if let Some(Commands::List) = cli.command {
        return cli::list_devices();
    }

    let mut config = Config::load(cli.config.as_deref())?;
    cli.overrides.apply(&mut config);

    match cli.command {
        Some(Commands::Stream { duration }) => cli::stream(&config, duration),
        Some(Commands::Terminal) | None => vidmask::terminal::run(&config),
        Some(Commands::List) => Ok(()),
    }
}
