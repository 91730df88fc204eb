// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// Everything that touches tensors lives here. The domain layer
// only ever sees host-side copies (HostImage, TrainLog).
//
// What's in this layer:
//
//   tonemap.rs          — percentile normalisation, tanh + mu-law
//                         tonemap and its inverse
//   loss.rs             — pixel criteria, selected by name
//   scheduler.rs        — multi-step and cosine LR schedules with
//                         warm restarts
//   network.rs          — HdrNetwork trait + generator factory
//   generation_model.rs — the training/inference wrapper
//   evaluation.rs       — PSNR-L / PSNR-mu
//   trainer.rs          — iteration loop, validation, checkpoints
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)

/// Loss-domain tonemap and percentile normalisation
pub mod tonemap;

/// L1 / L2 (plain or tanh-squashed) pixel losses
pub mod loss;

/// MultiStepLR_Restart and CosineAnnealingLR_Restart
pub mod scheduler;

/// Generator architecture and factory
pub mod network;

/// feed_data / optimize_parameters / test / save / load
pub mod generation_model;

/// PSNR metrics for validation
pub mod evaluation;

/// Full training loop with validation and checkpointing
pub mod trainer;
