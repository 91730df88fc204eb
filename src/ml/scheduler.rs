// ============================================================
// Layer 5 — Learning-Rate Schedulers with Warm Restarts
// ============================================================
// Both schedulers are stepped once per training iteration and
// return the learning rate to pass to `Optimizer::step`.
//
//   MultiStepLR
//     lr *= gamma^k  at every milestone (k = how often that
//                    milestone is listed)
//
//   CosineAnnealingLR_Restart
//     lr follows a cosine from its value at the last restart down
//     to eta_min over T_max iterations, computed recursively from
//     the previous lr so that warm-up overrides carry through.
//
// Restarts:
//   `restarts` lists iteration numbers; the restart itself fires
//   one iteration later (restart + 1). At a restart the lr jumps
//   back to initial_lr * restart_weights[i]. The MultiStep variant
//   can also ask the caller to drop optimiser state (clear_state).
//
// Burn ships cosine/linear schedulers, but neither restarts nor
// reports a state reset, so these are kept as small plain structs
// whose state is serialised alongside the training checkpoint.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::domain::options::TrainOptions;

/// Outcome of one scheduler step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LrStep {
    pub lr: f64,
    /// The optimiser's moment estimates should be reset
    pub clear_state: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "scheme")]
pub enum LrScheduler {
    MultiStep(MultiStepRestart),
    Cosine(CosineAnnealingRestart),
}

impl LrScheduler {
    /// Build the scheduler named by `lr_scheme`.
    pub fn from_options(initial_lr: f64, opt: &TrainOptions) -> Result<Self> {
        match opt.lr_scheme.as_str() {
            "MultiStepLR" => Ok(Self::MultiStep(MultiStepRestart::new(
                initial_lr,
                opt.lr_steps.clone(),
                opt.lr_gamma,
                opt.restarts.clone(),
                opt.restart_weights.clone(),
                opt.clear_state,
            )?)),
            "CosineAnnealingLR_Restart" => Ok(Self::Cosine(CosineAnnealingRestart::new(
                initial_lr,
                opt.t_period.clone(),
                opt.eta_min,
                opt.restarts.clone(),
                opt.restart_weights.clone(),
            )?)),
            other => bail!(
                "Learning rate scheme [{other}] is not implemented. \
                 Use MultiStepLR or CosineAnnealingLR_Restart."
            ),
        }
    }

    /// Advance one iteration and return the new learning rate
    pub fn step(&mut self) -> LrStep {
        match self {
            Self::MultiStep(s) => s.step(),
            Self::Cosine(s)    => s.step(),
        }
    }

    pub fn lr(&self) -> f64 {
        match self {
            Self::MultiStep(s) => s.lr,
            Self::Cosine(s)    => s.lr,
        }
    }

    pub fn initial_lr(&self) -> f64 {
        match self {
            Self::MultiStep(s) => s.initial_lr,
            Self::Cosine(s)    => s.initial_lr,
        }
    }

    pub fn last_epoch(&self) -> usize {
        match self {
            Self::MultiStep(s) => s.last_epoch,
            Self::Cosine(s)    => s.last_epoch,
        }
    }

    /// Override the current lr (used by warm-up). Later steps build on it.
    pub fn set_lr(&mut self, lr: f64) {
        match self {
            Self::MultiStep(s) => s.lr = lr,
            Self::Cosine(s)    => s.lr = lr,
        }
    }
}

/// Validate restart lists and shift them to the iteration they fire on.
fn restart_schedule(restarts: Vec<usize>, weights: Vec<f64>) -> Result<(Vec<usize>, Vec<f64>)> {
    if restarts.len() != weights.len() {
        bail!(
            "restarts ({}) and restart_weights ({}) must have the same length",
            restarts.len(),
            weights.len()
        );
    }
    Ok((restarts.into_iter().map(|r| r + 1).collect(), weights))
}

// ─── MultiStepRestart ─────────────────────────────────────────────────────────
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiStepRestart {
    initial_lr:      f64,
    milestones:      Vec<usize>,
    gamma:           f64,
    restarts:        Vec<usize>,
    restart_weights: Vec<f64>,
    clear_state:     bool,
    last_epoch:      usize,
    lr:              f64,
}

impl MultiStepRestart {
    pub fn new(
        initial_lr:      f64,
        milestones:      Vec<usize>,
        gamma:           f64,
        restarts:        Vec<usize>,
        restart_weights: Vec<f64>,
        clear_state:     bool,
    ) -> Result<Self> {
        let (restarts, restart_weights) = restart_schedule(restarts, restart_weights)?;
        Ok(Self {
            initial_lr,
            milestones,
            gamma,
            restarts,
            restart_weights,
            clear_state,
            last_epoch: 0,
            lr: initial_lr,
        })
    }

    pub fn step(&mut self) -> LrStep {
        self.last_epoch += 1;
        let epoch = self.last_epoch;

        if let Some(i) = self.restarts.iter().position(|&r| r == epoch) {
            self.lr = self.initial_lr * self.restart_weights[i];
            return LrStep { lr: self.lr, clear_state: self.clear_state };
        }

        let hits = self.milestones.iter().filter(|&&m| m == epoch).count();
        if hits > 0 {
            self.lr *= self.gamma.powi(hits as i32);
        }
        LrStep { lr: self.lr, clear_state: false }
    }
}

// ─── CosineAnnealingRestart ───────────────────────────────────────────────────
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CosineAnnealingRestart {
    initial_lr:      f64,
    t_period:        Vec<usize>,
    eta_min:         f64,
    restarts:        Vec<usize>,
    restart_weights: Vec<f64>,
    t_max:           usize,
    last_restart:    usize,
    last_epoch:      usize,
    lr:              f64,
}

impl CosineAnnealingRestart {
    pub fn new(
        initial_lr:      f64,
        t_period:        Vec<usize>,
        eta_min:         f64,
        restarts:        Vec<usize>,
        restart_weights: Vec<f64>,
    ) -> Result<Self> {
        let (restarts, restart_weights) = restart_schedule(restarts, restart_weights)?;
        if t_period.len() < restarts.len() + 1 {
            bail!(
                "T_period needs one period per restart plus the first ({} given, {} needed)",
                t_period.len(),
                restarts.len() + 1
            );
        }
        if t_period.iter().any(|&t| t == 0) {
            bail!("T_period entries must be positive");
        }
        Ok(Self {
            initial_lr,
            t_max: t_period[0],
            t_period,
            eta_min,
            restarts,
            restart_weights,
            last_restart: 0,
            last_epoch:   0,
            lr:           initial_lr,
        })
    }

    pub fn step(&mut self) -> LrStep {
        self.last_epoch += 1;
        let epoch = self.last_epoch;

        if let Some(i) = self.restarts.iter().position(|&r| r == epoch) {
            self.last_restart = epoch;
            self.t_max        = self.t_period[i + 1];
            self.lr           = self.initial_lr * self.restart_weights[i];
            return LrStep { lr: self.lr, clear_state: false };
        }

        let t_max   = self.t_max as f64;
        let elapsed = (epoch - self.last_restart) as f64;
        let offset  = epoch as i64 - self.last_restart as i64 - 1 - self.t_max as i64;

        self.lr = if offset.rem_euclid(2 * self.t_max as i64) == 0 {
            // Bottom of the cosine: the recursive ratio below would divide by zero
            self.lr + (self.initial_lr - self.eta_min) * (1.0 - (PI / t_max).cos()) / 2.0
        } else {
            (1.0 + (PI * elapsed / t_max).cos())
                / (1.0 + (PI * (elapsed - 1.0) / t_max).cos())
                * (self.lr - self.eta_min)
                + self.eta_min
        };
        LrStep { lr: self.lr, clear_state: false }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_multistep_milestones() {
        let mut s = MultiStepRestart::new(1.0, vec![2, 4], 0.5, vec![], vec![], false).unwrap();
        let lrs: Vec<f64> = (0..4).map(|_| s.step().lr).collect();
        assert_eq!(lrs, vec![1.0, 0.5, 0.5, 0.25]);
    }

    #[test]
    fn test_multistep_repeated_milestone() {
        let mut s = MultiStepRestart::new(1.0, vec![2, 2], 0.5, vec![], vec![], false).unwrap();
        s.step();
        assert!(close(s.step().lr, 0.25));
    }

    #[test]
    fn test_multistep_restart_and_clear_state() {
        let mut s = MultiStepRestart::new(1.0, vec![1], 0.1, vec![2], vec![0.5], true).unwrap();
        assert!(close(s.step().lr, 0.1));
        assert!(!s.step().clear_state);
        // restart at iteration 2 fires on iteration 3
        let step = s.step();
        assert!(close(step.lr, 0.5));
        assert!(step.clear_state);
    }

    #[test]
    fn test_cosine_matches_closed_form() {
        let mut s = CosineAnnealingRestart::new(1.0, vec![4], 0.0, vec![], vec![]).unwrap();
        for k in 1..=4 {
            let expected = (1.0 + (PI * k as f64 / 4.0).cos()) / 2.0;
            let lr = s.step().lr;
            assert!((lr - expected).abs() < 1e-9, "k={k}: {lr} vs {expected}");
        }
    }

    #[test]
    fn test_cosine_restart() {
        let mut s = CosineAnnealingRestart::new(1.0, vec![4, 2], 0.0, vec![4], vec![0.5]).unwrap();
        for _ in 0..4 {
            s.step();
        }
        assert!(s.lr.abs() < 1e-9);
        assert!(close(s.step().lr, 0.5));  // iteration 5: restart
        assert!(close(s.step().lr, 0.25)); // halfway through T = 2
        assert!(s.step().lr.abs() < 1e-9); // bottom
    }

    #[test]
    fn test_unknown_scheme_fails() {
        let opt = TrainOptions { lr_scheme: "StepLR".to_string(), ..Default::default() };
        let err = LrScheduler::from_options(1e-4, &opt).unwrap_err();
        assert!(err.to_string().contains("StepLR"));
    }

    #[test]
    fn test_mismatched_restarts_fail() {
        assert!(MultiStepRestart::new(1.0, vec![], 0.5, vec![10], vec![], false).is_err());
        assert!(CosineAnnealingRestart::new(1.0, vec![10], 0.0, vec![10], vec![1.0]).is_err());
    }

    #[test]
    fn test_set_lr_feeds_next_step() {
        let opt = TrainOptions { lr_steps: vec![2], lr_gamma: 0.5, ..Default::default() };
        let mut s = LrScheduler::from_options(1.0, &opt).unwrap();
        s.step();
        s.set_lr(0.2);
        assert!(close(s.step().lr, 0.1));
        assert_eq!(s.last_epoch(), 2);
        assert!(close(s.initial_lr(), 1.0));
    }

    #[test]
    fn test_state_serialises() {
        let opt = TrainOptions::default();
        let mut s = LrScheduler::from_options(1e-3, &opt).unwrap();
        s.step();
        let json = serde_json::to_string(&s).unwrap();
        let back: LrScheduler = serde_json::from_str(&json).unwrap();
        assert_eq!(back.last_epoch(), 1);
        assert!(close(back.lr(), s.lr()));
    }
}
