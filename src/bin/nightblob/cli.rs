use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "nightblob",
    version,
    about = "Multiscale headlight (blob) detection on video frames",
    long_about = "Detect bright, roughly circular blobs in a frame and print their bounding boxes \
                  as JSON. Frames are PNG/JPEG images or raw RGBA buffers."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// Detect blobs in one frame
    Detect(DetectArgs),
    /// Print the default configuration as JSON
    Config,
}

#[derive(Args)]
pub struct DetectArgs {
    /// Input frame (PNG/JPEG, or raw RGBA with --raw)
    pub input: PathBuf,

    /// Treat the input as a raw RGBA buffer (4 bytes per pixel, red first)
    #[arg(long, requires_all = ["width", "height"])]
    pub raw: bool,

    /// Frame width for --raw input
    #[arg(long)]
    pub width: Option<usize>,

    /// Frame height for --raw input
    #[arg(long)]
    pub height: Option<usize>,

    /// Detector configuration (JSON); frame size is taken from the input
    #[arg(long, env = "NIGHTBLOB_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the per-frame bounding-box cap
    #[arg(long)]
    pub max_bboxes: Option<usize>,

    /// Run the stages one after another instead of one thread per stage
    #[arg(long)]
    pub sequential: bool,

    /// Write JSON here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Compact JSON output
    #[arg(long)]
    pub compact: bool,
}
