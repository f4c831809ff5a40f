use anyhow::{Context, Result, bail};
use clap::Parser;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};

use pedalboard::audio::Engine;
use pedalboard::board::{EffectChain, EffectFactory};
use pedalboard::dsp::AudioBuffer;
use pedalboard::effects::EffectType;
use pedalboard::preset::manager::load_preset_file;
use pedalboard::preset::{Manager, Preset};
use pedalboard::settings::Settings;

#[derive(Parser, Debug)]
#[command(name = "pedalboard-render")]
#[command(version)]
#[command(about = "Run a WAV file through a guitar effects chain.")]
struct Args {
    #[arg(help = "WAV file to process")]
    input: PathBuf,

    #[arg(short, long, help = "Output WAV file (defaults to a timestamped file in --output-dir)")]
    output: Option<PathBuf>,

    #[arg(
        long,
        env = "RENDER_DIR",
        default_value = "./renders",
        help = "Directory for timestamped output files"
    )]
    output_dir: PathBuf,

    #[arg(
        short,
        long,
        help = "Preset file or name in the preset directory (defaults to the selected preset in settings)"
    )]
    preset: Option<String>,

    #[arg(
        short,
        long,
        value_enum,
        value_delimiter = ',',
        conflicts_with = "preset",
        help = "Comma-separated effect list, processed in order"
    )]
    effects: Vec<EffectType>,

    #[arg(long, env = "PRESET_DIR", help = "Preset directory (overrides settings)")]
    preset_dir: Option<String>,

    #[arg(long, help = "Save the chain used for this render as a named preset")]
    save_preset: Option<String>,

    #[arg(long, help = "Processing block size (overrides settings)")]
    block_size: Option<usize>,

    #[arg(long, allow_negative_numbers = true, help = "Input gain in dB")]
    input_gain: Option<f32>,

    #[arg(long, allow_negative_numbers = true, help = "Output gain in dB")]
    output_gain: Option<f32>,

    #[arg(long, help = "Log the tuner reading once per second of audio")]
    show_tuner: bool,
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    info!("Pedalboard v{}", env!("CARGO_PKG_VERSION"));
    debug!("Args: {args:?}");

    let settings = Settings::load().context("Failed to load settings")?;
    info!("Settings:\n{settings}");

    let preset_dir = args
        .preset_dir
        .clone()
        .unwrap_or_else(|| settings.preset_dir.clone());
    let block_size = args
        .block_size
        .unwrap_or(settings.audio.block_size as usize)
        .max(1);

    let (input, sample_rate) = read_wav(&args.input)?;
    info!(
        "Read {} frames, {} channels at {sample_rate} Hz from {}",
        input.num_frames(),
        input.num_channels(),
        args.input.display()
    );

    if !settings.audio.matches_sample_rate(sample_rate) {
        warn!(
            "{} is {sample_rate} Hz but settings expect {} Hz, processing at the file rate",
            args.input.display(),
            settings.audio.sample_rate
        );
    }

    let default_preset = if args.effects.is_empty() {
        settings.default_preset()
    } else {
        None
    };
    let preset = args.preset.as_deref().or(default_preset);
    let chain = build_chain(
        preset,
        &args.effects,
        &preset_dir,
        sample_rate as f32,
        block_size,
    )?;
    info!("Chain: {:?}", chain.effect_types());

    if let Some(name) = &args.save_preset {
        let mut manager = Manager::new(&preset_dir)?;
        let preset = Preset::new(name.clone(), chain.get_state());
        manager.save_preset(&preset)?;
        info!("Saved preset '{name}' to {preset_dir}");
    }

    let tuner = chain.tuner_handle();
    if args.show_tuner && tuner.is_none() {
        warn!("--show-tuner given but the chain has no tuner");
    }

    let (mut engine, handle) = Engine::new(sample_rate as f32, block_size);
    handle.set_chain(chain)?;
    handle.set_input_gain(args.input_gain.unwrap_or(settings.input_gain_db))?;
    handle.set_output_gain(args.output_gain.unwrap_or(settings.output_gain_db))?;

    let mut output = input.clone();
    let mut block = AudioBuffer::new(input.num_channels(), block_size);
    let report_every = sample_rate as usize;
    let mut next_report = report_every;

    let mut offset = 0;
    while offset < input.num_frames() {
        let len = block_size.min(input.num_frames() - offset);
        block.set_num_frames(len);
        block.copy_frames_from(&input, offset, len);
        engine.process(&mut block);
        block.copy_frames_to(&mut output, offset, len);
        offset += len;

        if args.show_tuner
            && offset >= next_report
            && let Some(tuner) = &tuner
        {
            info!(
                "[{:6.2}s] tuner: {} {:+.1} cents ({:.2} Hz)",
                offset as f32 / sample_rate as f32,
                tuner.note_name(),
                tuner.cents_deviation(),
                tuner.detected_frequency()
            );
            next_report += report_every;
        }
    }
    handle.collect_retired();

    let output_path = match &args.output {
        Some(path) => path.clone(),
        None => {
            std::fs::create_dir_all(&args.output_dir)
                .context("Failed to create output directory")?;
            args.output_dir.join(format!(
                "render_{}.wav",
                chrono::Local::now().format("%Y%m%d_%H%M%S")
            ))
        }
    };
    write_wav(&output_path, &output, sample_rate)?;
    info!(
        "Wrote {} (peak {:.3})",
        output_path.display(),
        output.peak()
    );

    Ok(())
}

/// Chain from a preset when one is given (on the command line or as the settings default),
/// otherwise from the effect list.
fn build_chain(
    preset: Option<&str>,
    effects: &[EffectType],
    preset_dir: &str,
    sample_rate: f32,
    block_size: usize,
) -> Result<EffectChain> {
    if let Some(preset) = preset {
        let preset = find_preset(preset, preset_dir)?;
        info!("Using preset '{}'", preset.name);
        return Ok(EffectChain::from_state(&preset.chain, sample_rate, block_size));
    }

    if effects.is_empty() {
        warn!("No preset or effects given, output will equal input");
    }

    let mut chain = EffectChain::new();
    chain.prepare(sample_rate, block_size);
    for &effect_type in effects {
        chain.add_effect(EffectFactory::create(effect_type));
    }
    Ok(chain)
}

fn find_preset(preset: &str, preset_dir: &str) -> Result<Preset> {
    let path = Path::new(preset);
    if path.is_file() {
        return load_preset_file(path)
            .with_context(|| format!("Failed to load preset '{}'", path.display()));
    }

    let manager = Manager::new(preset_dir)?;
    match manager.get_preset_by_name(preset) {
        Some(found) => Ok(found.clone()),
        None => bail!("No preset named '{preset}' in {preset_dir}"),
    }
}

fn read_wav(path: &Path) -> Result<(AudioBuffer, u32)> {
    let reader = WavReader::open(path)
        .with_context(|| format!("Failed to open WAV file '{}'", path.display()))?;
    let spec = reader.spec();

    let samples: Vec<f32> = if spec.sample_format == SampleFormat::Float {
        reader
            .into_samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read float samples")?
    } else {
        let max_val = (1_i64 << (spec.bits_per_sample - 1)) as f32;
        reader
            .into_samples::<i32>()
            .map(|s| s.map(|v| v as f32 / max_val))
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read integer samples")?
    };

    let buffer = AudioBuffer::from_interleaved(&samples, usize::from(spec.channels))?;
    Ok((buffer, spec.sample_rate))
}

fn write_wav(path: &Path, buffer: &AudioBuffer, sample_rate: u32) -> Result<()> {
    let spec = WavSpec {
        channels: u16::try_from(buffer.num_channels()).context("Too many channels")?,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };

    let mut writer = WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create WAV file '{}'", path.display()))?;
    for sample in buffer.to_interleaved() {
        writer.write_sample(sample)?;
    }
    writer.finalize().context("Failed to finalize WAV file")?;

    Ok(())
}
