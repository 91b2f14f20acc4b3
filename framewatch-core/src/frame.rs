//! Borrowed views over decoded frames.
//!
//! The decoder owns frame buffers and reuses them on the next receive call,
//! so analysis runs against a [`FrameView`] that borrows the planes for one
//! synchronous pass and is dropped before the loop advances. Tests build
//! views directly from synthetic buffers without touching the engine.

use std::os::raw::c_int;

use ffmpeg_next::format::Pixel;
use ffmpeg_next::util::picture;
use ffmpeg_next::{ffi, frame};

// libavutil decode_error_flags bits (FF_DECODE_ERROR_*)
const ERROR_INVALID_BITSTREAM: c_int = 1;
const ERROR_MISSING_REFERENCE: c_int = 1 << 1;
const ERROR_CONCEALMENT_ACTIVE: c_int = 1 << 2;

/// Decoder-reported error bits attached to a frame.
///
/// Software decoders populate these when error recognition is enabled;
/// hardware decoders usually leave them zero, which is why the visual
/// heuristics in [`crate::corruption`] exist at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeErrorFlags(pub i32);

impl DecodeErrorFlags {
    pub fn any(self) -> bool {
        self.0 != 0
    }

    pub fn invalid_bitstream(self) -> bool {
        self.0 & ERROR_INVALID_BITSTREAM != 0
    }

    pub fn missing_reference(self) -> bool {
        self.0 & ERROR_MISSING_REFERENCE != 0
    }

    pub fn concealment_active(self) -> bool {
        self.0 & ERROR_CONCEALMENT_ACTIVE != 0
    }
}

/// One color-component buffer of a frame.
///
/// `stride` is the allocated bytes per row and may exceed `row_bytes`, the
/// logical row width. `rows` is how many rows of this plane carry picture
/// content for fingerprinting (full height for luma, half for subsampled
/// chroma).
pub struct PlaneView<'a> {
    pub data: &'a [u8],
    pub stride: usize,
    pub row_bytes: usize,
    pub rows: usize,
}

/// A decoded picture plus the timing and error metadata the diagnostics need.
pub struct FrameView<'a> {
    pub width: u32,
    pub height: u32,
    pub format: Pixel,
    pub pts: Option<i64>,
    pub dts: Option<i64>,
    pub picture_type: char,
    pub errors: DecodeErrorFlags,
    /// Container/decoder marked the whole frame corrupt (display-level flag).
    pub display_corrupt: bool,
    pub planes: Vec<PlaneView<'a>>,
}

impl<'a> FrameView<'a> {
    /// Build a view over a freshly decoded frame.
    ///
    /// Valid only until the next decode call; callers must not retain it.
    pub fn from_decoded(decoded: &'a frame::Video) -> Self {
        let width = decoded.width();
        let height = decoded.height();
        let format = decoded.format();

        // pkt_dts and decode_error_flags have no safe accessors.
        let (dts, error_bits) = unsafe {
            let raw = decoded.as_ptr();
            ((*raw).pkt_dts, (*raw).decode_error_flags)
        };
        let dts = (dts != ffi::AV_NOPTS_VALUE).then_some(dts);

        let mut planes = Vec::with_capacity(decoded.planes());
        for index in 0..decoded.planes() {
            planes.push(PlaneView {
                data: decoded.data(index),
                stride: decoded.stride(index),
                row_bytes: logical_row_bytes(format, width, index)
                    .min(decoded.stride(index)),
                rows: plane_rows(height, index),
            });
        }

        Self {
            width,
            height,
            format,
            pts: decoded.pts(),
            dts,
            picture_type: picture_type_char(decoded.kind()),
            errors: DecodeErrorFlags(error_bits),
            display_corrupt: decoded.is_corrupt(),
            planes,
        }
    }

    /// Name of the pixel format, or `unknown` when the engine has none.
    pub fn format_name(&self) -> &'static str {
        self.format
            .descriptor()
            .map(|d| d.name())
            .unwrap_or("unknown")
    }
}

/// Rows of plane `index` that carry picture content: full frame height for
/// the first plane (and thus any single-plane grayscale format), half for
/// the vertically subsampled chroma planes that follow.
pub(crate) fn plane_rows(height: u32, index: usize) -> usize {
    if index == 0 {
        height as usize
    } else {
        height as usize / 2
    }
}

/// Logical bytes per row of plane `index`, excluding stride padding.
fn logical_row_bytes(format: Pixel, width: u32, index: usize) -> usize {
    let bytes = unsafe {
        ffi::av_image_get_linesize(format.into(), width as c_int, index as c_int)
    };
    bytes.max(0) as usize
}

fn picture_type_char(kind: picture::Type) -> char {
    match kind {
        picture::Type::I => 'I',
        picture::Type::P => 'P',
        picture::Type::B => 'B',
        picture::Type::S => 'S',
        picture::Type::SI => 'i',
        picture::Type::SP => 'p',
        picture::Type::BI => 'b',
        picture::Type::None => '?',
    }
}
