//! # framewatch Core
//!
//! Decode-loop diagnostics for one video elementary stream: concurrent
//! demux/decode/seek, visual-artifact corruption heuristics, and per-frame
//! content fingerprinting for cross-run comparison.

// ============================================================================
// Engine-facing
// ============================================================================
pub mod frame;
pub mod session;

// ============================================================================
// Frame Analysis
// ============================================================================
pub mod corruption;
pub mod report;

// ============================================================================
// Operator Control
// ============================================================================
pub mod input;
pub mod seek;

// ============================================================================
// Version
// ============================================================================
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
