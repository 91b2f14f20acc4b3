//! Frame fingerprinting and the per-frame diagnostic report.
//!
//! The fingerprint exists so two independent decode runs of the same source
//! (software vs. hardware) can be compared byte-for-byte. It must therefore
//! be computed the same way everywhere: plane by plane, hashing only the
//! logical row bytes of each row — stride padding never enters the digest.

use std::fmt::{self, Write as _};

use ffmpeg_next::{rescale, Rational, Rescale};
use md5::{Digest, Md5};

use crate::corruption::CorruptionVerdict;
use crate::frame::FrameView;

/// Everything one diagnostic line carries.
#[derive(Debug)]
pub struct FrameReport {
    pub frame_number: u64,
    pub pts: Option<i64>,
    pub dts: Option<i64>,
    pub timestamp_secs: Option<f64>,
    pub width: u32,
    pub height: u32,
    pub pixel_format: &'static str,
    pub picture_type: char,
    pub fingerprint: String,
    pub annotations: Vec<&'static str>,
    /// New playback position derived from the frame's PTS, when present.
    pub position_us: Option<i64>,
}

impl fmt::Display for FrameReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Frame #{} | Type: {} | PTS: {} | DTS: {} | Timestamp: {} | Resolution: {}x{} | Pixel fmt: {} | Decoded frm MD5: {}",
            self.frame_number,
            self.picture_type,
            fmt_ts(self.pts),
            fmt_ts(self.dts),
            fmt_secs(self.timestamp_secs),
            self.width,
            self.height,
            self.pixel_format,
            self.fingerprint,
        )?;
        if !self.annotations.is_empty() {
            write!(f, " | Corrupt: {}", self.annotations.join(","))?;
        }
        Ok(())
    }
}

fn fmt_ts(ts: Option<i64>) -> String {
    match ts {
        Some(value) => value.to_string(),
        None => "unknown".into(),
    }
}

fn fmt_secs(secs: Option<f64>) -> String {
    match secs {
        Some(value) => format!("{value:.3}s"),
        None => "unknown".into(),
    }
}

/// Builds [`FrameReport`]s for one stream.
pub struct FrameReporter {
    time_base: Rational,
}

impl FrameReporter {
    pub fn new(time_base: Rational) -> Self {
        Self { time_base }
    }

    /// Fingerprint and describe one decoded frame.
    ///
    /// Timestamps derive from the raw PTS only — no best-effort substitution,
    /// so a run is comparable against another run of the same source.
    pub fn report(
        &self,
        frame_number: u64,
        view: &FrameView,
        verdict: &CorruptionVerdict,
    ) -> FrameReport {
        let timestamp_secs = view.pts.map(|pts| pts as f64 * f64::from(self.time_base));
        let position_us = view
            .pts
            .map(|pts| pts.rescale(self.time_base, rescale::TIME_BASE));

        FrameReport {
            frame_number,
            pts: view.pts,
            dts: view.dts,
            timestamp_secs,
            width: view.width,
            height: view.height,
            pixel_format: view.format_name(),
            picture_type: view.picture_type,
            fingerprint: fingerprint(view),
            annotations: verdict.reasons.iter().map(|r| r.as_str()).collect(),
            position_us,
        }
    }
}

/// 128-bit content digest over the frame's pixel bytes, as lowercase hex.
///
/// Hashes `row_bytes` of each of `rows` rows per plane, in plane order.
pub fn fingerprint(view: &FrameView) -> String {
    let mut hasher = Md5::new();
    for plane in &view.planes {
        for y in 0..plane.rows {
            let start = y * plane.stride;
            let end = start + plane.row_bytes;
            let Some(row) = plane.data.get(start..end) else {
                break;
            };
            hasher.update(row);
        }
    }

    let digest = hasher.finalize();
    let mut hex = String::with_capacity(32);
    for byte in digest {
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corruption::{CorruptionReason, CorruptionVerdict};
    use crate::frame::{DecodeErrorFlags, PlaneView};
    use ffmpeg_next::format::Pixel;

    fn view_over<'a>(luma: &'a [u8], chroma: &'a [u8], stride: usize) -> FrameView<'a> {
        FrameView {
            width: 8,
            height: 8,
            format: Pixel::NV12,
            pts: Some(3600),
            dts: Some(3600),
            picture_type: 'P',
            errors: DecodeErrorFlags::default(),
            display_corrupt: false,
            planes: vec![
                PlaneView {
                    data: luma,
                    stride,
                    row_bytes: 8,
                    rows: 8,
                },
                PlaneView {
                    data: chroma,
                    stride,
                    row_bytes: 8,
                    rows: 4,
                },
            ],
        }
    }

    fn ramp(len: usize) -> Vec<u8> {
        (0..len).map(|i| i as u8).collect()
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let luma = ramp(8 * 8);
        let chroma = ramp(8 * 4);
        let view = view_over(&luma, &chroma, 8);

        let first = fingerprint(&view);
        let second = fingerprint(&view);
        assert_eq!(first, second);
        assert_eq!(first.len(), 32);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_fingerprint_sees_every_pixel() {
        let luma = ramp(8 * 8);
        let chroma = ramp(8 * 4);
        let baseline = fingerprint(&view_over(&luma, &chroma, 8));

        let mut tweaked = luma.clone();
        tweaked[63] ^= 1;
        assert_ne!(baseline, fingerprint(&view_over(&tweaked, &chroma, 8)));

        let mut tweaked = chroma.clone();
        tweaked[0] ^= 1;
        assert_ne!(baseline, fingerprint(&view_over(&luma, &tweaked, 8)));
    }

    #[test]
    fn test_fingerprint_ignores_stride_padding() {
        let luma = ramp(8 * 8);
        let chroma = ramp(8 * 4);
        let tight = fingerprint(&view_over(&luma, &chroma, 8));

        // Same logical content, rows padded out to a 16-byte stride with
        // garbage in the padding.
        let stride = 16;
        let mut padded_luma = vec![0xAAu8; stride * 8];
        let mut padded_chroma = vec![0xBBu8; stride * 4];
        for y in 0..8 {
            padded_luma[y * stride..y * stride + 8].copy_from_slice(&luma[y * 8..y * 8 + 8]);
        }
        for y in 0..4 {
            padded_chroma[y * stride..y * stride + 8].copy_from_slice(&chroma[y * 8..y * 8 + 8]);
        }
        let padded = fingerprint(&view_over(&padded_luma, &padded_chroma, stride));

        assert_eq!(tight, padded);
    }

    #[test]
    fn test_report_line_format() {
        let luma = ramp(8 * 8);
        let chroma = ramp(8 * 4);
        let view = view_over(&luma, &chroma, 8);

        let reporter = FrameReporter::new(Rational::new(1, 90_000));
        let report = reporter.report(7, &view, &CorruptionVerdict::default());

        let line = report.to_string();
        assert!(line.starts_with("Frame #7 | Type: P | PTS: 3600 | DTS: 3600 | Timestamp: 0.040s"));
        assert!(line.contains("Resolution: 8x8"));
        assert!(line.contains("Pixel fmt: nv12"));
        assert!(!line.contains("Corrupt:"));

        // 3600 ticks at 1/90000 is 40 ms in engine time units.
        assert_eq!(report.position_us, Some(40_000));
    }

    #[test]
    fn test_report_without_pts_uses_unknown_sentinel() {
        let luma = ramp(8 * 8);
        let chroma = ramp(8 * 4);
        let mut view = view_over(&luma, &chroma, 8);
        view.pts = None;
        view.dts = None;

        let reporter = FrameReporter::new(Rational::new(1, 90_000));
        let report = reporter.report(0, &view, &CorruptionVerdict::default());

        assert_eq!(report.position_us, None);
        let line = report.to_string();
        assert!(line.contains("PTS: unknown"));
        assert!(line.contains("DTS: unknown"));
        assert!(line.contains("Timestamp: unknown"));
    }

    #[test]
    fn test_report_annotates_corruption() {
        let luma = ramp(8 * 8);
        let chroma = ramp(8 * 4);
        let view = view_over(&luma, &chroma, 8);

        let verdict = CorruptionVerdict {
            reasons: vec![CorruptionReason::LumaSolid, CorruptionReason::ChromaFlat],
        };
        let reporter = FrameReporter::new(Rational::new(1, 90_000));
        let report = reporter.report(1, &view, &verdict);

        assert!(report
            .to_string()
            .ends_with("| Corrupt: heuristic-luma-solid,heuristic-chroma-flat"));
    }
}
