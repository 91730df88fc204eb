// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Pure Rust structs that describe a training run and what it
// hands back to callers.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain Rust structs, enums, and serde derives
//
// The ML layer converts tensors into these types at its
// boundary (see HostImage), so the CLI and application layers
// never touch a Tensor.

// Run options: network, paths, optimiser, scheduler, tonemap
pub mod options;

// Ordered name → value dictionary filled by each training step
pub mod log;

// Host-side image buffers returned as visual outputs
pub mod image;
