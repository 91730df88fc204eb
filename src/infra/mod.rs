// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting persistence used by the ML and application layers:
//
//   checkpoint.rs — network weights and optimiser state via Burn's
//                   CompactRecorder; options, `latest` pointer and
//                   scheduler state as JSON.
//
//   metrics.rs    — validation metrics (PSNR-L / PSNR-mu) appended
//                   to a CSV file for plotting learning curves.
//
// Reference: Burn Book §5 (Checkpointing)

/// Network / training-state saving and loading
pub mod checkpoint;

/// Validation metrics CSV logger
pub mod metrics;
