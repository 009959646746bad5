//! Autofocus sweep: step a focus control and find the sharpest setting.
//!
//! The caller owns the focus hardware. For each step it moves the control,
//! scores the next frame with [`crate::focus::FocusScorer`], and pushes the
//! pair here. The sweep reports a peak once the score has fallen well below
//! the best seen for several consecutive steps.

/// Tuning for a [`FocusSweep`].
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// A score below `best * drop_ratio` counts as "past the peak".
    pub drop_ratio: f64,

    /// Consecutive past-the-peak samples required to stop.
    pub patience: usize,

    /// Hard limit on the number of samples.
    pub max_steps: usize,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            drop_ratio: 0.8,
            patience: 3,
            max_steps: 100,
        }
    }
}

/// Best focus setting found so far.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FocusPeak {
    pub setting: f64,
    pub score: f64,
}

/// Outcome of pushing one sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SweepStatus {
    /// Keep stepping.
    Searching,
    /// Scores have dropped off after this peak.
    PeakFound(FocusPeak),
    /// Step budget exhausted; the best sample seen, if any.
    Exhausted(Option<FocusPeak>),
}

impl SweepStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, SweepStatus::Searching)
    }
}

/// Hill-climbing peak detector over `(setting, score)` samples.
#[derive(Debug, Clone)]
pub struct FocusSweep {
    config: SweepConfig,
    best: Option<FocusPeak>,
    below_count: usize,
    history: Vec<(f64, f64)>,
    finished: Option<SweepStatus>,
}

impl FocusSweep {
    pub fn new(config: SweepConfig) -> Self {
        Self {
            config,
            best: None,
            below_count: 0,
            history: Vec::new(),
            finished: None,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(SweepConfig::default())
    }

    /// Record the score measured at `setting`.
    ///
    /// Once the sweep has finished, further samples are ignored and the
    /// final status is returned again.
    pub fn push(&mut self, setting: f64, score: f64) -> SweepStatus {
        if let Some(done) = self.finished {
            return done;
        }

        self.history.push((setting, score));

        match self.best {
            Some(best) if score <= best.score => {
                if score < best.score * self.config.drop_ratio {
                    self.below_count += 1;
                } else {
                    self.below_count = 0;
                }
            }
            _ => {
                self.best = Some(FocusPeak { setting, score });
                self.below_count = 0;
            }
        }

        let status = match self.best {
            Some(best) if self.below_count >= self.config.patience.max(1) => {
                tracing::debug!(setting = best.setting, score = best.score, "Focus peak found");
                SweepStatus::PeakFound(best)
            }
            best if self.history.len() >= self.config.max_steps => SweepStatus::Exhausted(best),
            _ => SweepStatus::Searching,
        };

        if status.is_finished() {
            self.finished = Some(status);
        }
        status
    }

    /// Best sample seen so far.
    pub fn best(&self) -> Option<FocusPeak> {
        self.best
    }

    /// Every `(setting, score)` pushed, in order.
    pub fn history(&self) -> &[(f64, f64)] {
        &self.history
    }

    /// Start over with the same configuration.
    pub fn reset(&mut self) {
        self.best = None;
        self.below_count = 0;
        self.history.clear();
        self.finished = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bell(setting: f64) -> f64 {
        1000.0 * (-(setting - 5.0).powi(2) / 4.0).exp()
    }

    #[test]
    fn test_finds_peak_of_unimodal_curve() {
        let mut sweep = FocusSweep::with_defaults();
        let mut status = SweepStatus::Searching;
        for step in 0..20 {
            status = sweep.push(step as f64, bell(step as f64));
            if status.is_finished() {
                break;
            }
        }
        match status {
            SweepStatus::PeakFound(peak) => {
                assert_eq!(peak.setting, 5.0);
                assert!((peak.score - 1000.0).abs() < 1e-9);
            }
            other => panic!("expected a peak, got {other:?}"),
        }
        // Stopped shortly after the peak rather than scanning everything.
        assert!(sweep.history().len() < 12);
    }

    #[test]
    fn test_noise_near_peak_does_not_stop() {
        let mut sweep = FocusSweep::new(SweepConfig {
            drop_ratio: 0.8,
            patience: 2,
            max_steps: 100,
        });
        assert_eq!(sweep.push(0.0, 100.0), SweepStatus::Searching);
        // Small dips stay above the drop threshold.
        assert_eq!(sweep.push(1.0, 95.0), SweepStatus::Searching);
        assert_eq!(sweep.push(2.0, 90.0), SweepStatus::Searching);
        assert_eq!(sweep.push(3.0, 50.0), SweepStatus::Searching);
        assert!(matches!(sweep.push(4.0, 40.0), SweepStatus::PeakFound(p) if p.setting == 0.0));
    }

    #[test]
    fn test_exhausts_step_budget() {
        let mut sweep = FocusSweep::new(SweepConfig {
            max_steps: 3,
            ..SweepConfig::default()
        });
        sweep.push(0.0, 1.0);
        sweep.push(1.0, 2.0);
        let status = sweep.push(2.0, 3.0);
        assert_eq!(
            status,
            SweepStatus::Exhausted(Some(FocusPeak {
                setting: 2.0,
                score: 3.0
            }))
        );
        // Finished sweeps ignore further input.
        assert_eq!(sweep.push(3.0, 99.0), status);
        assert_eq!(sweep.history().len(), 3);

        sweep.reset();
        assert!(sweep.best().is_none());
        assert_eq!(sweep.push(0.0, 1.0), SweepStatus::Searching);
    }
}
