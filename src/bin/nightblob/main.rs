use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;
use serde::Serialize;

use nightblob::pyramid::ScaleLevel;
use nightblob::{BlobDetector, BoundingBox, DetectorConfig, Image, Rgba};

mod cli;

use cli::{Cli, Command, DetectArgs};

#[derive(Serialize)]
struct DetectionReport<'a> {
    width: usize,
    height: usize,
    levels: &'a [ScaleLevel],
    boxes: Vec<BoundingBox>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    match cli.command {
        Command::Detect(args) => detect(args),
        Command::Config => {
            let json = serde_json::to_string_pretty(&DetectorConfig::default())?;
            println!("{json}");
            Ok(())
        }
    }
}

fn detect(args: DetectArgs) -> Result<()> {
    let frame = load_frame(&args)?;

    let mut config = match &args.config {
        Some(path) => DetectorConfig::from_json_file(path)
            .with_context(|| format!("failed to load config '{}'", path.display()))?,
        None => DetectorConfig::default(),
    };
    config.width = frame.width();
    config.height = frame.height();
    if let Some(cap) = args.max_bboxes {
        config.max_bboxes = cap;
    }

    let detector = BlobDetector::new(config).context("invalid detector configuration")?;
    let boxes = if args.sequential {
        detector.detect_sequential(&frame)?
    } else {
        detector.detect(&frame)?
    };
    info!("{} detection(s)", boxes.len());

    let report = DetectionReport {
        width: frame.width(),
        height: frame.height(),
        levels: detector.levels(),
        boxes,
    };
    let json = if args.compact {
        serde_json::to_string(&report)?
    } else {
        serde_json::to_string_pretty(&report)?
    };
    write_output(&json, args.output.as_deref())
}

fn load_frame(args: &DetectArgs) -> Result<Image<Rgba>> {
    if args.raw {
        let (Some(width), Some(height)) = (args.width, args.height) else {
            bail!("--raw needs --width and --height");
        };
        let bytes = std::fs::read(&args.input)
            .with_context(|| format!("failed to read '{}'", args.input.display()))?;
        return Ok(Image::from_rgba_bytes(width, height, &bytes)?);
    }

    let img = image::open(&args.input)
        .with_context(|| format!("failed to open image '{}'", args.input.display()))?
        .to_rgba8();
    let (width, height) = (img.width() as usize, img.height() as usize);
    Ok(Image::from_rgba_bytes(width, height, img.as_raw())?)
}

fn write_output(json: &str, path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("failed to write output file '{}'", path.display())),
        None => {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            handle.write_all(json.as_bytes())?;
            handle.write_all(b"\n")?;
            Ok(())
        }
    }
}
