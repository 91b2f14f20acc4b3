//! # framewatch
//!
//! Interactive decode-corruption probe for a single video stream: decode,
//! jump around with `s`/`a`, and compare fingerprints between software and
//! hardware decode runs of the same source.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, ValueEnum};

use framewatch_core::input::TermGuard;
use framewatch_core::session::{DecoderMode, EngineLogLevel, Session, SessionConfig, Shared};

#[derive(Parser, Debug)]
#[command(
    name = "framewatch",
    version = framewatch_core::VERSION,
    about = "Decode a video stream, seek interactively, and flag corrupt frames"
)]
struct Args {
    /// Input media file
    #[arg(short = 'i', value_name = "FILE")]
    input: PathBuf,

    /// Decoder mode
    #[arg(short = 'd', value_enum, value_name = "SW|HW")]
    decoder: ModeArg,

    /// Decoder name (e.g. hevc_v4l2m2m for HW; use `auto` in SW mode)
    #[arg(short = 'c', value_name = "NAME")]
    codec: String,

    /// Engine log verbosity
    #[arg(short = 'v', value_enum, value_name = "LEVEL")]
    verbosity: Option<VerbosityArg>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    #[value(name = "SW")]
    Sw,
    #[value(name = "HW")]
    Hw,
}

impl From<ModeArg> for DecoderMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Sw => DecoderMode::Software,
            ModeArg::Hw => DecoderMode::Hardware,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum VerbosityArg {
    Trace,
    Debug,
    Info,
}

impl From<VerbosityArg> for EngineLogLevel {
    fn from(level: VerbosityArg) -> Self {
        match level {
            VerbosityArg::Trace => EngineLogLevel::Trace,
            VerbosityArg::Debug => EngineLogLevel::Debug,
            VerbosityArg::Info => EngineLogLevel::Info,
        }
    }
}

fn main() -> ExitCode {
    // Usage problems and -h both exit 1, matching the documented contract.
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter("framewatch=info")
        .init();

    // Captured before the session so the terminal is restored on every exit
    // path, including construction failures.
    let _term = TermGuard::capture();

    let config = SessionConfig {
        input: args.input,
        mode: args.decoder.into(),
        decoder_name: args.codec,
        log_level: args
            .verbosity
            .map(EngineLogLevel::from)
            .unwrap_or(EngineLogLevel::Info),
    };

    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

fn run(config: SessionConfig) -> Result<()> {
    let session = Session::open(&config, Shared::new())?;
    session.run();
    Ok(())
}
