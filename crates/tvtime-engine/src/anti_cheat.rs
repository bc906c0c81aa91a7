//! Per-frame admissibility gate: the face must be visible and the body must
//! not be perfectly still over the liveness window.

use std::collections::VecDeque;

use tracing::{debug, warn};
use tvtime_common::{AntiCheatReason, Error, LandmarkFrame, PoseLandmark, Result};

use crate::config::AntiCheatConfig;
use crate::geometry::population_variance;

/// Change in the anti-cheat cue shown to the child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateSignal {
    Violation(AntiCheatReason),
    Cleared,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateVerdict {
    pub reason: Option<AntiCheatReason>,
    /// Set only when the surfaced cue changes.
    pub signal: Option<GateSignal>,
}

impl GateVerdict {
    pub fn into_result(self) -> Result<()> {
        match self.reason {
            Some(reason) => Err(Error::AntiCheatViolation(reason)),
            None => Ok(()),
        }
    }
}

pub struct AntiCheatGate {
    config: AntiCheatConfig,
    window: VecDeque<f64>,
    surfaced: Option<AntiCheatReason>,
}

impl AntiCheatGate {
    pub fn new(config: AntiCheatConfig) -> Self {
        let window = VecDeque::with_capacity(config.window_size);
        Self { config, window, surfaced: None }
    }

    pub fn admit(&mut self, frame: &LandmarkFrame) -> GateVerdict {
        let reason = self.check(frame);
        let signal = self.surface(reason);
        GateVerdict { reason, signal }
    }

    fn check(&mut self, frame: &LandmarkFrame) -> Option<AntiCheatReason> {
        let nose = match frame.visible(PoseLandmark::Nose, self.config.min_face_visibility) {
            Some(nose) => nose,
            None => return Some(AntiCheatReason::FaceNotVisible),
        };

        if self.window.len() == self.config.window_size {
            self.window.pop_front();
        }
        self.window.push_back(f64::from(nose.y));

        if self.window.len() < self.config.window_size {
            return None;
        }

        let variance = population_variance(self.window.iter().copied());
        if variance < self.config.variance_threshold {
            debug!("Nose variance {:.3e} below liveness threshold", variance);
            return Some(AntiCheatReason::StaticImageSuspected);
        }

        None
    }

    fn surface(&mut self, reason: Option<AntiCheatReason>) -> Option<GateSignal> {
        match (self.surfaced, reason) {
            (previous, Some(current)) if previous != Some(current) => {
                warn!("Anti-cheat violation: {}", current.code());
                self.surfaced = Some(current);
                Some(GateSignal::Violation(current))
            }
            (Some(_), None) => {
                self.surfaced = None;
                Some(GateSignal::Cleared)
            }
            _ => None,
        }
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    /// Forget the liveness window, e.g. when the exercise changes.
    pub fn reset(&mut self) {
        self.window.clear();
        self.surfaced = None;
    }
}
