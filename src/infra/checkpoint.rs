// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores everything a run needs to continue or to be
// evaluated later. Network weights and optimiser state go through
// Burn's CompactRecorder; everything else is plain JSON.
//
// Layout under the experiment directory:
//
//   experiments/<name>/
//     options.json                  ← options the run was started with
//     models/
//       1000_G.mpk.gz               ← network weights at iteration 1000
//       latest_G.mpk.gz             ← weights at the end of training
//       latest_G.json               ← label of the most recent save
//     training_state/
//       1000.state.json             ← epoch, iteration, scheduler state
//       1000_optimizer.mpk.gz       ← Adam moment estimates
//
// The network architecture is rebuilt from options.json before
// weights are loaded: CompactRecorder records are type-checked
// against the module they are loaded into, so the options must
// describe the same network that was saved.
//
// Reference: Burn Book §5 (Records and Checkpointing)

use anyhow::{Context, Result};
use burn::{
    prelude::*,
    record::{CompactRecorder, Record, Recorder},
};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::domain::options::Options;
use crate::ml::scheduler::LrScheduler;

/// Resumable training progress (everything except the weights)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingState {
    pub epoch:     usize,
    pub iter:      usize,
    pub scheduler: LrScheduler,
    /// Optimiser record file name, relative to the training_state directory
    pub optimizer_file: String,
}

/// Manages saving and loading of checkpoints for one experiment.
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Create the experiment directory tree if it does not exist yet.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        for sub in ["models", "training_state"] {
            let path = dir.join(sub);
            fs::create_dir_all(&path)
                .with_context(|| format!("Cannot create directory '{}'", path.display()))?;
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn models_dir(&self) -> PathBuf {
        self.dir.join("models")
    }

    pub fn training_state_dir(&self) -> PathBuf {
        self.dir.join("training_state")
    }

    // ─── Network weights ──────────────────────────────────────────────────────

    /// Save network weights as models/{iter_label}_{label}.mpk.gz
    /// and point latest_{label}.json at them.
    pub fn save_network<B: Backend, M: Module<B>>(
        &self,
        net:        &M,
        label:      &str,
        iter_label: &str,
    ) -> Result<PathBuf> {
        // Path without extension — the recorder adds it
        let path = self.models_dir().join(format!("{iter_label}_{label}"));

        <CompactRecorder as Recorder<B>>::record(
            &CompactRecorder::new(),
            net.clone().into_record(),
            path.clone(),
        )
        .with_context(|| format!("Failed to save network to '{}'", path.display()))?;

        let latest = self.models_dir().join(format!("latest_{label}.json"));
        fs::write(&latest, serde_json::to_string(iter_label)?)
            .with_context(|| format!("Failed to write '{}'", latest.display()))?;

        tracing::debug!("Saved network {} at '{}'", label, path.display());
        Ok(path)
    }

    /// Path (without extension) of the most recently saved network
    pub fn latest_network_path(&self, label: &str) -> Result<PathBuf> {
        let latest = self.models_dir().join(format!("latest_{label}.json"));
        let s = fs::read_to_string(&latest).with_context(|| {
            format!("Cannot find '{}'. Have you run 'train' first?", latest.display())
        })?;
        let iter_label: String = serde_json::from_str(&s)?;
        Ok(self.models_dir().join(format!("{iter_label}_{label}")))
    }

    // ─── Options ──────────────────────────────────────────────────────────────

    /// Save the run options so `eval` can rebuild the same network.
    pub fn save_options(&self, opts: &Options) -> Result<()> {
        let path = self.dir.join("options.json");
        let json = serde_json::to_string_pretty(opts)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write options to '{}'", path.display()))?;
        tracing::debug!("Saved options to '{}'", path.display());
        Ok(())
    }

    pub fn load_options(&self) -> Result<Options> {
        let path = self.dir.join("options.json");
        let json = fs::read_to_string(&path).with_context(|| {
            format!(
                "Cannot read options from '{}'. Make sure you have run 'train' first.",
                path.display()
            )
        })?;
        Options::from_json_str(&json)
    }

    // ─── Training state ───────────────────────────────────────────────────────

    /// Write training_state/{iter}.state.json and the optimiser record.
    pub fn save_training_state<B: Backend, R: Record<B>>(
        &self,
        epoch:            usize,
        iter:             usize,
        scheduler:        &LrScheduler,
        optimizer_record: R,
    ) -> Result<PathBuf> {
        let optimizer_file = format!("{iter}_optimizer");
        let optimizer_path = self.training_state_dir().join(&optimizer_file);

        <CompactRecorder as Recorder<B>>::record(
            &CompactRecorder::new(),
            optimizer_record,
            optimizer_path.clone(),
        )
        .with_context(|| {
            format!("Failed to save optimizer state to '{}'", optimizer_path.display())
        })?;

        let state = TrainingState { epoch, iter, scheduler: scheduler.clone(), optimizer_file };
        let state_path = self.training_state_dir().join(format!("{iter}.state.json"));
        fs::write(&state_path, serde_json::to_string_pretty(&state)?)
            .with_context(|| format!("Failed to write '{}'", state_path.display()))?;

        tracing::debug!("Saved training state at iteration {}", iter);
        Ok(state_path)
    }
}

/// Load network weights from `path` (with or without the .mpk.gz extension).
pub fn load_network<B: Backend, M: Module<B>>(
    path:   &Path,
    net:    M,
    device: &B::Device,
) -> Result<M> {
    let path = strip_record_extension(path);
    let record = <CompactRecorder as Recorder<B>>::load(&CompactRecorder::new(), path.clone(), device)
        .with_context(|| {
            format!(
                "Cannot load network '{}'. Does it match the configured architecture?",
                path.display()
            )
        })?;
    Ok(net.load_record(record))
}

/// Read a training-state JSON file.
pub fn load_training_state(path: &Path) -> Result<TrainingState> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Cannot read training state '{}'", path.display()))?;
    serde_json::from_str(&json)
        .with_context(|| format!("Training state '{}' is malformed", path.display()))
}

/// Load the optimiser record that sits next to a training-state file.
pub fn load_optimizer_record<B: Backend, R: Record<B>>(
    state_path: &Path,
    state:      &TrainingState,
    device:     &B::Device,
) -> Result<R> {
    let dir  = state_path.parent().unwrap_or_else(|| Path::new("."));
    let path = dir.join(&state.optimizer_file);
    <CompactRecorder as Recorder<B>>::load(&CompactRecorder::new(), path.clone(), device)
        .with_context(|| format!("Cannot load optimizer state '{}'", path.display()))
}

/// `foo_G.mpk.gz` → `foo_G`; the recorder appends the extension itself.
fn strip_record_extension(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    match s.strip_suffix(".mpk.gz") {
        Some(stem) => PathBuf::from(stem),
        None       => path.to_path_buf(),
    }
}
