//! Offline rendering to WAV.

use std::path::PathBuf;

use anyhow::Context as _;
use clap::Args;
use hound::{SampleFormat, WavSpec, WavWriter};
use murmur_config::{EngineConfig, PatchConfig};

#[derive(Args)]
pub struct RenderArgs {
    /// Patch file (TOML)
    #[arg(value_name = "PATCH")]
    patch: PathBuf,

    /// Output WAV file
    #[arg(short, long, value_name = "OUTPUT")]
    output: PathBuf,

    /// Duration in seconds
    #[arg(long, default_value = "1.0")]
    seconds: f64,
}

pub fn run(args: RenderArgs, config: &EngineConfig) -> anyhow::Result<()> {
    let settings = config.settings();
    if settings.output_channels == 0 {
        anyhow::bail!("cannot render with zero output channels");
    }
    if args.seconds.is_nan() || args.seconds < 0.0 {
        anyhow::bail!("invalid duration: {}", args.seconds);
    }

    let patch = PatchConfig::load(&args.patch)
        .with_context(|| format!("loading patch {}", args.patch.display()))?;
    let context = patch.build_default(settings)?.into_context();

    let block = settings.block_size;
    let channels = settings.output_channels;
    let total = (args.seconds * f64::from(settings.sample_rate)).round() as usize;

    let spec = WavSpec {
        channels: u16::try_from(channels).context("too many output channels for WAV")?,
        sample_rate: config.audio.sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(&args.output, spec)
        .with_context(|| format!("creating {}", args.output.display()))?;

    let input = vec![0.0; settings.input_len()];
    let mut output = vec![0.0; settings.output_len()];
    let mut written = 0;
    let mut peak = 0.0f32;
    while written < total {
        context.process(&input, &mut output);
        let frames = block.min(total - written);
        for frame in 0..frames {
            for channel in 0..channels {
                let sample = output[channel * block + frame];
                peak = peak.max(sample.abs());
                writer.write_sample(sample)?;
            }
        }
        written += frames;
    }
    writer.finalize()?;

    tracing::info!(frames = written, channels, peak, "render complete");
    println!(
        "Rendered {} frames ({:.2}s, {} ch) to {}",
        written,
        args.seconds,
        channels,
        args.output.display()
    );
    Ok(())
}
