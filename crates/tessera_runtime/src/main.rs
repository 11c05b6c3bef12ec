//! Tessera Runtime
//!
//! Headless frame loop driving the ring allocator with synthetic camera and
//! instance data, on host memory or (with `--gpu`) on wgpu buffers.

mod gpu;
mod host;
mod scene;

use anyhow::{bail, Context, Result};
use tessera_core::{AllocatorSettings, UsageHistory};

const USAGE: &str = "usage: tessera [SETTINGS.json] [--frames N] [--gpu]";

#[derive(Debug, Default, PartialEq)]
struct Options {
    settings_path: Option<String>,
    frames: Option<u64>,
    gpu: bool,
    help: bool,
}

impl Options {
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut options = Options::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--gpu" => options.gpu = true,
                "-h" | "--help" => options.help = true,
                "--frames" => {
                    let value = args.next().context("--frames needs a value")?;
                    options.frames = Some(
                        value
                            .parse()
                            .with_context(|| format!("invalid frame count '{value}'"))?,
                    );
                }
                flag if flag.starts_with('-') => bail!("unknown flag '{flag}'\n{USAGE}"),
                path => {
                    if options.settings_path.replace(path.to_string()).is_some() {
                        bail!("more than one settings file given\n{USAGE}");
                    }
                }
            }
        }
        Ok(options)
    }
}

fn log_summary(history: &UsageHistory, capacity: u64) {
    tracing::info!(
        frames = history.len(),
        peak_bytes = history.peak_bytes(),
        max_recent_bytes = history.max_recent_bytes(),
        average_bytes = history.average_bytes(),
        capacity,
        "ring usage"
    );
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let options = Options::parse(std::env::args().skip(1))?;
    if options.help {
        println!("{USAGE}");
        return Ok(());
    }

    tracing::info!("Tessera v{}", tessera_core::VERSION);

    let settings = match &options.settings_path {
        Some(path) => AllocatorSettings::load(path)
            .with_context(|| format!("failed to load settings from '{path}'"))?,
        None => AllocatorSettings::default(),
    };
    let frames = options.frames.unwrap_or(300);
    let scene = scene::Scene::default();

    if options.gpu {
        gpu::run(&settings, frames, &scene)?;
    } else {
        let ring = host::run(&settings, frames, &scene)?;
        log_summary(ring.history(), ring.buffer_size());
    }

    tracing::info!(frames, "frame loop finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Options> {
        Options::parse(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn parses_flags_and_path() {
        let options = parse(&["ring.json", "--frames", "12", "--gpu"]).unwrap();
        assert_eq!(
            options,
            Options {
                settings_path: Some("ring.json".to_string()),
                frames: Some(12),
                gpu: true,
                help: false,
            }
        );
        assert_eq!(parse(&[]).unwrap(), Options::default());
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(parse(&["--frames"]).is_err());
        assert!(parse(&["--frames", "many"]).is_err());
        assert!(parse(&["--fast"]).is_err());
        assert!(parse(&["a.json", "b.json"]).is_err());
    }
}
