// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Produces the tensors GenerationModel::feed_data expects.
//
//   scene indices
//       │
//       ▼
//   split_train_val     → seeded shuffle, train / validation indices
//       │
//       ▼
//   SyntheticHdrDataset → implements Burn's Dataset trait,
//       │                 renders HDR scene + LDR brackets
//       ▼
//   HdrBatcher          → stacks samples into [B, ...] tensors
//
// Reference: Burn Book §4 (Datasets)

/// Implements Burn's Dataset trait for synthetic bracketed scenes
pub mod dataset;

/// Stacks samples into ldrs / exposures / gt tensors
pub mod batcher;

/// Shuffles and splits scene indices into train/validation sets
pub mod splitter;
