//! Session lifecycle and the demux/decode/seek loop.
//!
//! One [`Session`] exists per run. It owns the container and codec handles
//! for its whole lifetime and releases them in codec-then-container order by
//! field order, covering normal and error exits alike. The decode loop runs
//! on the caller's thread; the operator listener runs on a second thread and
//! talks to the loop only through [`Shared`].

use std::os::raw::c_int;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use ffmpeg_next as ffmpeg;
use ffmpeg::util::log as engine_log;
use ffmpeg::{codec, decoder, format, media};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::corruption;
use crate::frame::FrameView;
use crate::input;
use crate::report::FrameReporter;
use crate::seek::{resolve_target, SeekSlot};

/// Engine time-base units per second.
const TIME_BASE_US: i64 = 1_000_000;

/// Pacing between packets; approximates real-time delivery so the loop does
/// not saturate a core. Not load-bearing for correctness.
const PACING_DELAY: Duration = Duration::from_micros(9_000);

// libavcodec error-recognition bits (AV_EF_*), software decoders only
const EF_CRCCHECK: c_int = 1;
const EF_BITSTREAM: c_int = 1 << 1;
const EF_BUFFER: c_int = 1 << 2;
const EF_EXPLODE: c_int = 1 << 3;
const EF_CAREFUL: c_int = 1 << 16;

// AV_CODEC_FLAG2_SHOW_ALL
const FLAG2_SHOW_ALL: c_int = 1 << 22;

/// Which decoder family to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderMode {
    /// The codec's default software decoder.
    Software,
    /// A named hardware decoder (e.g. `h264_v4l2m2m`).
    Hardware,
}

/// Verbosity forwarded to the engine's own logger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineLogLevel {
    Info,
    Debug,
    Trace,
}

impl From<EngineLogLevel> for engine_log::Level {
    fn from(level: EngineLogLevel) -> Self {
        match level {
            EngineLogLevel::Info => engine_log::Level::Info,
            EngineLogLevel::Debug => engine_log::Level::Debug,
            EngineLogLevel::Trace => engine_log::Level::Trace,
        }
    }
}

/// Everything a session needs to construct, threaded explicitly instead of
/// read from process-global state.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub input: PathBuf,
    pub mode: DecoderMode,
    /// Hardware decoder name; a pass-through sentinel such as `auto` in
    /// software mode.
    pub decoder_name: String,
    pub log_level: EngineLogLevel,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("engine initialization failed: {0}")]
    Init(ffmpeg::Error),
    #[error("failed to open input: {0}")]
    Open(ffmpeg::Error),
    #[error("no video stream found")]
    NoVideoStream,
    #[error("decoder not found: {0}")]
    DecoderNotFound(String),
    #[error("unsupported codec")]
    UnsupportedCodec,
    #[error("failed to open codec: {0}")]
    CodecOpen(ffmpeg::Error),
}

/// Control-plane state shared between the decode and input threads.
pub struct Shared {
    pub quit: AtomicBool,
    pub seek: SeekSlot,
}

impl Shared {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            quit: AtomicBool::new(false),
            seek: SeekSlot::new(),
        })
    }
}

pub struct Session {
    // Field order fixes release order: codec context first, container second.
    decoder: decoder::Video,
    input: format::context::Input,
    stream_index: usize,
    duration_us: i64,
    /// Authoritative playback position. Written only by the decode loop.
    position_us: i64,
    frame_number: u64,
    reporter: FrameReporter,
    shared: Arc<Shared>,
}

impl Session {
    /// Open the container, pick the video stream, and open the requested
    /// decoder. Prints the stream summary on success. Any failure here is
    /// fatal for the run; partially acquired handles are dropped on the way
    /// out.
    pub fn open(config: &SessionConfig, shared: Arc<Shared>) -> Result<Self, SessionError> {
        ffmpeg::init().map_err(SessionError::Init)?;
        engine_log::set_level(config.log_level.into());
        debug!("engine log level: {:?}", config.log_level);

        let input = format::input(&config.input).map_err(SessionError::Open)?;

        let (stream_index, time_base, parameters) = {
            let stream = input
                .streams()
                .best(media::Type::Video)
                .ok_or(SessionError::NoVideoStream)?;
            (stream.index(), stream.time_base(), stream.parameters())
        };

        let codec = match config.mode {
            DecoderMode::Software => {
                decoder::find(parameters.id()).ok_or(SessionError::UnsupportedCodec)?
            }
            DecoderMode::Hardware => decoder::find_by_name(&config.decoder_name)
                .ok_or_else(|| SessionError::DecoderNotFound(config.decoder_name.clone()))?,
        };
        let decoder_name = codec.name().to_string();
        let codec_long_name = codec.description().to_string();

        let mut context = codec::context::Context::new_with_codec(codec);
        context
            .set_parameters(parameters.clone())
            .map_err(SessionError::CodecOpen)?;

        // Surface corrupt output instead of dropping it; on the software
        // path also enable the full error-recognition suite (hardware
        // decoders ignore these bits, hence the visual heuristics).
        context.set_flags(codec::Flags::OUTPUT_CORRUPT);
        unsafe {
            let raw = context.as_mut_ptr();
            (*raw).flags2 |= FLAG2_SHOW_ALL;
            if config.mode == DecoderMode::Software {
                (*raw).err_recognition =
                    EF_CAREFUL | EF_CRCCHECK | EF_BITSTREAM | EF_BUFFER | EF_EXPLODE;
            }
        }

        let decoder = context
            .decoder()
            .open_as(codec)
            .and_then(|opened| opened.video())
            .map_err(SessionError::CodecOpen)?;

        let duration_us = input.duration().max(0);

        // Bitrates have no safe accessors on either handle.
        let (overall_bit_rate, stream_bit_rate) =
            unsafe { ((*input.as_ptr()).bit_rate, (*parameters.as_ptr()).bit_rate) };
        println!(
            "Loaded: {}, duration: {} sec",
            config.input.display(),
            duration_us / TIME_BASE_US
        );
        println!("Video stream index: {stream_index}");
        println!("Encoded format: {codec_long_name}");
        println!("Codec ID: {:?}", parameters.id());
        println!("Resolution: {}x{}", decoder.width(), decoder.height());
        println!(
            "Pixel format: {}",
            decoder
                .format()
                .descriptor()
                .map(|d| d.name())
                .unwrap_or("unknown")
        );
        println!(
            "Duration: {:.3} seconds",
            duration_us as f64 / TIME_BASE_US as f64
        );
        println!("Overall bitrate (all streams): {} kbps", overall_bit_rate / 1000);
        println!("Video stream bitrate: {} kbps", stream_bit_rate / 1000);
        println!("Decoder used: {decoder_name}");

        Ok(Self {
            decoder,
            input,
            stream_index,
            duration_us,
            position_us: 0,
            frame_number: 0,
            reporter: FrameReporter::new(time_base),
            shared,
        })
    }

    /// Spawn the operator listener and run the decode loop to completion.
    pub fn run(mut self) {
        let shared = Arc::clone(&self.shared);
        let listener = thread::spawn(move || input::listen(&shared));

        self.decode_loop();

        // The loop has set the quit flag by now (EOF, fatal read error, or
        // the operator did); the listener notices within one poll interval.
        if listener.join().is_err() {
            error!("input listener thread panicked");
        }
    }

    /// State machine per iteration: consume a pending seek, read one packet,
    /// decode and report its frames, pace. Terminal states are end-of-stream
    /// and an unrecoverable read error.
    fn decode_loop(&mut self) {
        let mut decoded = ffmpeg::frame::Video::empty();

        while !self.shared.quit.load(Ordering::SeqCst) {
            self.apply_pending_seek();

            let mut packet = ffmpeg::Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {}
                Err(ffmpeg::Error::Eof) => {
                    println!("[EOF reached]");
                    self.shared.quit.store(true, Ordering::SeqCst);
                    break;
                }
                Err(e) => {
                    // Unrecoverable for this run; the session is done, not
                    // the tool.
                    eprintln!("[Error reading packet: {e}]");
                    self.shared.quit.store(true, Ordering::SeqCst);
                    break;
                }
            }

            if packet.stream() == self.stream_index {
                let packet_corrupt = packet.flags().contains(ffmpeg::packet::Flags::CORRUPT);
                match self.decoder.send_packet(&packet) {
                    Ok(()) => self.drain_frames(&mut decoded, packet_corrupt, packet.pts()),
                    // A rejected packet (error recognition in explode mode)
                    // costs one packet, not the run.
                    Err(e) => debug!("decoder rejected packet: {e}"),
                }
            }

            thread::sleep(PACING_DELAY);
        }
    }

    /// Drain every frame the decoder yields for the packet just sent; some
    /// codecs buffer internally and emit zero or several per packet.
    fn drain_frames(
        &mut self,
        decoded: &mut ffmpeg::frame::Video,
        packet_corrupt: bool,
        packet_pts: Option<i64>,
    ) {
        while self.decoder.receive_frame(decoded).is_ok() {
            let view = FrameView::from_decoded(decoded);
            let verdict = corruption::classify(&view, packet_corrupt);

            if verdict.corrupt() {
                println!();
                println!("=== CORRUPTION DETECTED ===");
                println!("Packet PTS: {}", packet_pts.unwrap_or(-1));
                println!("Frame PTS: {}", view.pts.unwrap_or(-1));
                println!("Error flags: {:#x}", view.errors.0);
                println!("Reasons: {verdict}");
                if view.errors.invalid_bitstream() {
                    println!("[WARNING] Invalid bitstream");
                }
                if view.errors.missing_reference() {
                    println!("[WARNING] Missing reference");
                }
                if view.errors.concealment_active() {
                    println!(
                        "[WARNING] Error concealment active (PTS: {})",
                        view.pts.unwrap_or(-1)
                    );
                }
            }

            if view.pts.is_none() {
                println!("[NOTICE] Frame missing PTS");
            }
            if view.picture_type == '?' {
                println!("[NOTICE] Frame picture type unknown");
            }

            // Corruption is annotated, never filtered: every frame reports.
            let report = self.reporter.report(self.frame_number, &view, &verdict);
            println!("{report}");
            self.frame_number += 1;

            if let Some(position) = report.position_us {
                self.position_us = position;
            }
        }
    }

    /// Consume the pending seek, if any: clamp the target into the stream
    /// range, seek backward-biased, and flush buffered decoder state so no
    /// stale reference frames survive the jump. A failed seek leaves the
    /// position untouched and the loop running.
    fn apply_pending_seek(&mut self) {
        let Some(offset_us) = self.shared.seek.take() else {
            return;
        };

        let target_us = resolve_target(self.position_us, offset_us, self.duration_us);
        match self.input.seek(target_us, ..=target_us) {
            Ok(()) => {
                self.decoder.flush();
                self.position_us = target_us;
                println!("[Seek] Jumped to {} sec", target_us / TIME_BASE_US);
            }
            Err(e) => {
                warn!("seek to {target_us} failed: {e}");
                eprintln!("[Seek] Failed");
            }
        }
    }
}
