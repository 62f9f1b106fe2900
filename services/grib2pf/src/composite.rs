//! Readiness gate for feeds built from several upstream inputs.

use freshness::FetchTarget;

/// Holds each input's latest target until every input has changed since
/// the last generation.
#[derive(Debug, Clone)]
pub struct CompositeGate {
    latest: Vec<Option<FetchTarget>>,
    refresh_needed: Vec<bool>,
}

impl CompositeGate {
    pub fn new(inputs: usize) -> Self {
        Self {
            latest: vec![None; inputs],
            refresh_needed: vec![false; inputs],
        }
    }

    pub fn inputs(&self) -> usize {
        self.latest.len()
    }

    /// Note a change on input `index`, replacing any target it held.
    pub fn record(&mut self, index: usize, target: FetchTarget) {
        if let Some(slot) = self.latest.get_mut(index) {
            *slot = Some(target);
            self.refresh_needed[index] = true;
        }
    }

    /// Inputs that have changed since the last launch.
    pub fn pending(&self) -> usize {
        self.refresh_needed.iter().filter(|r| **r).count()
    }

    /// Every input's latest target once all have changed; clears the flags.
    pub fn take_ready(&mut self) -> Option<Vec<FetchTarget>> {
        if self.latest.is_empty() || !self.refresh_needed.iter().all(|r| *r) {
            return None;
        }

        let targets = self.latest.iter().cloned().collect::<Option<Vec<_>>>()?;
        self.refresh_needed.iter_mut().for_each(|r| *r = false);
        Some(targets)
    }
}
