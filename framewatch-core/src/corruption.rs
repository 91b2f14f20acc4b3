//! Visual-artifact corruption heuristics.
//!
//! Hardware decoders rarely populate the bitstream/CRC/buffer error
//! recognition flags software decoders carry, so for that path the only
//! corruption signal is the look of the output itself: concealment tends to
//! produce solid black/green/pink frames (uniform luma) and gray/green block
//! artifacts (flat chroma). The checks sample rows rather than scanning full
//! planes to stay cheap inside the decode loop.
//!
//! The heuristics gate on the interleaved-chroma NV12 format, not on which
//! decoder produced the frame. Software-decoded NV12 frames are scanned too.

use std::fmt;

use ffmpeg_next::format::Pixel;

use crate::frame::FrameView;

/// Luma rows sampled by the solid-color check.
const LUMA_SAMPLE_ROWS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorruptionReason {
    /// Decoder error flags, the display-corrupt flag, or a corrupt-marked
    /// source packet.
    DecoderFlagged,
    /// Every sampled luma row is a single solid value.
    LumaSolid,
    /// Every interleaved chroma pair in the first row matches the first.
    ChromaFlat,
}

impl CorruptionReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DecoderFlagged => "decoder-flagged",
            Self::LumaSolid => "heuristic-luma-solid",
            Self::ChromaFlat => "heuristic-chroma-flat",
        }
    }
}

impl fmt::Display for CorruptionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of classifying one frame.
#[derive(Debug, Default)]
pub struct CorruptionVerdict {
    pub reasons: Vec<CorruptionReason>,
}

impl CorruptionVerdict {
    pub fn corrupt(&self) -> bool {
        !self.reasons.is_empty()
    }
}

impl fmt::Display for CorruptionVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, reason) in self.reasons.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{reason}")?;
        }
        Ok(())
    }
}

/// Classify a decoded frame: decoder-reported state plus pixel heuristics.
///
/// `packet_corrupt` is the corrupt flag of the packet the frame came from.
pub fn classify(view: &FrameView, packet_corrupt: bool) -> CorruptionVerdict {
    let mut reasons = Vec::new();

    if view.errors.any() || view.display_corrupt || packet_corrupt {
        reasons.push(CorruptionReason::DecoderFlagged);
    }
    reasons.extend(heuristic_reasons(view));

    CorruptionVerdict { reasons }
}

/// Pixel-content heuristics. Frames outside the interleaved-chroma format
/// family come back clean from this path regardless of content.
pub fn heuristic_reasons(view: &FrameView) -> Vec<CorruptionReason> {
    let mut reasons = Vec::new();
    if view.format != Pixel::NV12 {
        return reasons;
    }

    // Both checks run every time so both reasons can be reported.
    if luma_solid(view) {
        reasons.push(CorruptionReason::LumaSolid);
    }
    if chroma_flat(view) {
        reasons.push(CorruptionReason::ChromaFlat);
    }
    reasons
}

/// Solid-color check over the first `min(10, height)` luma rows.
///
/// A row is uniform when every pixel equals the row's first pixel; the frame
/// is flagged only when every sampled row is uniform.
fn luma_solid(view: &FrameView) -> bool {
    let width = view.width as usize;
    let Some(luma) = view.planes.first() else {
        return false;
    };
    if width == 0 || view.height == 0 || luma.stride == 0 {
        return false;
    }

    let sample_rows = LUMA_SAMPLE_ROWS.min(view.height as usize);
    for y in 0..sample_rows {
        let start = y * luma.stride;
        let end = start + width;
        let Some(row) = luma.data.get(start..end) else {
            return false;
        };
        let reference = row[0];
        if row.iter().any(|&pixel| pixel != reference) {
            return false;
        }
    }
    true
}

/// Flatness check over the first interleaved chroma row.
///
/// Reads the first (U, V) pair and scans subsequent pairs across the frame
/// width; any deviation clears the flag.
fn chroma_flat(view: &FrameView) -> bool {
    let width = view.width as usize;
    let Some(chroma) = view.planes.get(1) else {
        return false;
    };
    let row = &chroma.data[..width.min(chroma.data.len())];
    if row.len() < 2 {
        return false;
    }

    let (u0, v0) = (row[0], row[1]);
    row.chunks_exact(2)
        .skip(1)
        .all(|pair| pair[0] == u0 && pair[1] == v0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{DecodeErrorFlags, PlaneView};

    fn nv12_view<'a>(
        width: u32,
        height: u32,
        luma: &'a [u8],
        chroma: &'a [u8],
        stride: usize,
    ) -> FrameView<'a> {
        FrameView {
            width,
            height,
            format: Pixel::NV12,
            pts: Some(0),
            dts: Some(0),
            picture_type: 'I',
            errors: DecodeErrorFlags::default(),
            display_corrupt: false,
            planes: vec![
                PlaneView {
                    data: luma,
                    stride,
                    row_bytes: width as usize,
                    rows: height as usize,
                },
                PlaneView {
                    data: chroma,
                    stride,
                    row_bytes: width as usize,
                    rows: height as usize / 2,
                },
            ],
        }
    }

    fn varying(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_solid_luma_flagged() {
        let luma = vec![0u8; 16 * 16];
        let chroma = varying(16 * 8);
        let view = nv12_view(16, 16, &luma, &chroma, 16);

        let reasons = heuristic_reasons(&view);
        assert_eq!(reasons, vec![CorruptionReason::LumaSolid]);
        assert!(classify(&view, false).corrupt());
    }

    #[test]
    fn test_flat_chroma_flagged() {
        let luma = varying(16 * 16);
        let chroma = vec![0x80u8; 16 * 8];
        let view = nv12_view(16, 16, &luma, &chroma, 16);

        let reasons = heuristic_reasons(&view);
        assert_eq!(reasons, vec![CorruptionReason::ChromaFlat]);
    }

    #[test]
    fn test_both_reasons_reported() {
        let luma = vec![0u8; 16 * 16];
        let chroma = vec![0x80u8; 16 * 8];
        let view = nv12_view(16, 16, &luma, &chroma, 16);

        let reasons = heuristic_reasons(&view);
        assert_eq!(
            reasons,
            vec![CorruptionReason::LumaSolid, CorruptionReason::ChromaFlat]
        );
    }

    #[test]
    fn test_varying_frame_is_clean() {
        let luma = varying(16 * 16);
        let chroma = varying(16 * 8);
        let view = nv12_view(16, 16, &luma, &chroma, 16);

        assert!(heuristic_reasons(&view).is_empty());
        assert!(!classify(&view, false).corrupt());
    }

    #[test]
    fn test_padding_does_not_defeat_solid_check() {
        // Stride wider than the row; padding bytes vary but the visible
        // pixels are solid.
        let stride = 24;
        let mut luma = varying(stride * 16);
        for y in 0..16 {
            luma[y * stride..y * stride + 16].fill(0x10);
        }
        let chroma = varying(stride * 8);
        let view = nv12_view(16, 16, &luma, &chroma, stride);

        assert!(heuristic_reasons(&view).contains(&CorruptionReason::LumaSolid));
    }

    #[test]
    fn test_non_nv12_never_heuristic() {
        let luma = vec![0u8; 16 * 16];
        let chroma = vec![0x80u8; 16 * 8];
        let mut view = nv12_view(16, 16, &luma, &chroma, 16);
        view.format = Pixel::YUV420P;

        assert!(heuristic_reasons(&view).is_empty());
        assert!(!classify(&view, false).corrupt());
    }

    #[test]
    fn test_decoder_flags_apply_regardless_of_format() {
        let luma = varying(16 * 16);
        let chroma = varying(16 * 8);
        let mut view = nv12_view(16, 16, &luma, &chroma, 16);
        view.format = Pixel::YUV420P;
        view.errors = DecodeErrorFlags(1);

        let verdict = classify(&view, false);
        assert_eq!(verdict.reasons, vec![CorruptionReason::DecoderFlagged]);
    }

    #[test]
    fn test_corrupt_packet_flags_frame() {
        let luma = varying(16 * 16);
        let chroma = varying(16 * 8);
        let view = nv12_view(16, 16, &luma, &chroma, 16);

        let verdict = classify(&view, true);
        assert_eq!(verdict.reasons, vec![CorruptionReason::DecoderFlagged]);
    }

    #[test]
    fn test_verdict_display_joins_reasons() {
        let verdict = CorruptionVerdict {
            reasons: vec![CorruptionReason::LumaSolid, CorruptionReason::ChromaFlat],
        };
        assert_eq!(
            verdict.to_string(),
            "heuristic-luma-solid,heuristic-chroma-flat"
        );
    }
}
