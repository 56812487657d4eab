//! Pokes a [`tonegen_core::Chip`] through a line-oriented register-dump script and
//! renders the result to a stereo WAV file.
//!
//! Script grammar, one command per line, `#` starts a trailing comment:
//!   rom <path>           load a PCM ROM image from `path`, sized to the file
//!   w <port> <value>     write `value` (hex byte) to register port `port` (hex byte)
//!   reset                reconstruct chip state, keeping the loaded ROM attached
//!   timera / timerb      fire the corresponding timer as if its period had elapsed
//!   tick <n>             render `n` samples (decimal) and append them to the WAV file

use std::fs;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use env_logger::Env;
use tonegen_core::{Chip, ChipConfig};

type Writer = hound::WavWriter<BufWriter<fs::File>>;

#[derive(Parser)]
struct Args {
    /// Register-dump script path
    #[arg(short = 's', long)]
    script: PathBuf,

    /// Output WAV file path
    #[arg(short = 'o', long)]
    output: PathBuf,

    /// Output sample rate in Hz
    #[arg(long, default_value_t = 44_100.0)]
    sample_rate: f64,

    /// Chip clock in Hz
    #[arg(long, default_value_t = 16_934_400.0)]
    clock_hz: f64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config =
        ChipConfig { clock_hz: args.clock_hz, sample_rate: args.sample_rate, ..ChipConfig::default() };
    let mut chip = Chip::new(config);

    let script = fs::read_to_string(&args.script)
        .with_context(|| format!("failed to read script {}", args.script.display()))?;

    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: args.sample_rate as u32,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&args.output, spec)
        .with_context(|| format!("failed to create {}", args.output.display()))?;

    for (lineno, raw_line) in script.lines().enumerate() {
        let line = raw_line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        run_command(&mut chip, &mut writer, line)
            .with_context(|| format!("{}:{}: {raw_line}", args.script.display(), lineno + 1))?;
    }

    writer.finalize().context("failed to finalize WAV file")?;
    log::info!("wrote {}", args.output.display());
    Ok(())
}

fn run_command(chip: &mut Chip, writer: &mut Writer, line: &str) -> Result<()> {
    let mut tokens = line.split_whitespace();
    let Some(cmd) = tokens.next() else { return Ok(()) };

    match cmd {
        "rom" => {
            let path: PathBuf = tokens.next().context("rom: missing file path")?.into();
            let bytes =
                fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
            chip.alloc_rom(bytes.len())?;
            chip.write_rom(0, &bytes);
        }
        "w" => {
            let port = parse_byte(tokens.next().context("w: missing port")?)?;
            let value = parse_byte(tokens.next().context("w: missing value")?)?;
            chip.write_port(port, value);
        }
        "reset" => chip.reset(),
        "timera" => chip.timer_a_fire(),
        "timerb" => chip.timer_b_fire(),
        "tick" => {
            let n: usize = tokens
                .next()
                .context("tick: missing sample count")?
                .parse()
                .context("tick: sample count must be a decimal integer")?;
            render(chip, writer, n)?;
        }
        other => bail!("unrecognized command {other:?}"),
    }
    Ok(())
}

fn parse_byte(token: &str) -> Result<u8> {
    let digits = token.trim_start_matches("0x");
    u8::from_str_radix(digits, 16).with_context(|| format!("{token:?} is not a hex byte"))
}

fn render(chip: &mut Chip, writer: &mut Writer, n: usize) -> Result<()> {
    const CHUNK: usize = 4096;
    let mut out_l = vec![0i32; CHUNK.min(n.max(1))];
    let mut out_r = vec![0i32; CHUNK.min(n.max(1))];
    let mut remaining = n;
    while remaining > 0 {
        let this = remaining.min(CHUNK);
        chip.update(this, &mut out_l[..this], &mut out_r[..this]);
        for i in 0..this {
            writer.write_sample(clamp_to_i16(out_l[i]))?;
            writer.write_sample(clamp_to_i16(out_r[i]))?;
        }
        remaining -= this;
    }
    Ok(())
}

fn clamp_to_i16(sample: i32) -> i16 {
    sample.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
}
