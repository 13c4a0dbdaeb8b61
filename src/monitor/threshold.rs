//! Warning and critical threshold evaluation over a monitor's history.
//!
//! Each level only fires once the most recent `window_size` outcomes are all
//! present; a half-filled history never triggers.

use serde::Deserialize;

use super::history::{HistoryWindow, DEFAULT_HISTORY_SIZE};

/// A trigger rule for one level.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Threshold {
    /// Fires when the down ratio of the window is strictly above this percentage.
    Percentage(f64),
    /// Fires when the window holds exactly this many down outcomes.
    Count(u32),
}

impl Threshold {
    /// Number of outcomes this level looks at.
    pub fn window_size(&self, history_size: usize) -> usize {
        match self {
            Threshold::Percentage(_) => history_size,
            Threshold::Count(count) => *count as usize,
        }
    }

    pub fn is_triggered(&self, down: usize, window_size: usize) -> bool {
        match self {
            // down / size * 100 > pct, kept in multiplication form so that the
            // boundary case compares exactly
            Threshold::Percentage(pct) => (down as f64) * 100.0 > pct * window_size as f64,
            Threshold::Count(count) => down == *count as usize,
        }
    }

    fn is_unset(&self) -> bool {
        match self {
            Threshold::Percentage(pct) => *pct <= 0.0,
            Threshold::Count(count) => *count == 0,
        }
    }
}

impl Default for Threshold {
    fn default() -> Self {
        Threshold::Percentage(100.0)
    }
}

/// Outcome of one level for the current history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelState {
    pub saturated: bool,
    pub down: usize,
    pub window_size: usize,
    pub triggered: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub warning: LevelState,
    pub critical: Option<LevelState>,
}

impl Evaluation {
    pub fn warning_triggered(&self) -> bool {
        self.warning.triggered
    }

    pub fn critical_triggered(&self) -> bool {
        self.critical.map(|c| c.triggered).unwrap_or(false)
    }
}

/// Warning and optional critical thresholds of one monitor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub warning: Threshold,
    pub critical: Option<Threshold>,
    pub history_size: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            warning: Threshold::default(),
            critical: None,
            history_size: DEFAULT_HISTORY_SIZE,
        }
    }
}

impl Thresholds {
    /// Fill in defaults: an unset warning level becomes 100 in its own mode,
    /// an unset critical level is disabled.
    pub fn normalize(&mut self) {
        if self.history_size == 0 {
            self.history_size = DEFAULT_HISTORY_SIZE;
        }
        if self.warning.is_unset() {
            self.warning = match self.warning {
                Threshold::Percentage(_) => Threshold::Percentage(100.0),
                Threshold::Count(_) => Threshold::Count(100),
            };
        }
        if self.critical.is_some_and(|c| c.is_unset()) {
            self.critical = None;
        }
    }

    /// History capacity needed so every level can saturate.
    pub fn capacity(&self) -> usize {
        let warning = self.warning.window_size(self.history_size);
        let critical = self
            .critical
            .map(|c| c.window_size(self.history_size))
            .unwrap_or(0);
        warning.max(critical).max(1)
    }

    pub fn evaluate(&self, history: &HistoryWindow) -> Evaluation {
        Evaluation {
            warning: self.evaluate_level(&self.warning, history),
            critical: self.critical.as_ref().map(|c| self.evaluate_level(c, history)),
        }
    }

    fn evaluate_level(&self, threshold: &Threshold, history: &HistoryWindow) -> LevelState {
        let window_size = threshold.window_size(self.history_size);
        let saturated = window_size > 0 && history.size() >= window_size;
        let down = history.recent_down_count(window_size);

        LevelState {
            saturated,
            down,
            window_size,
            triggered: saturated && threshold.is_triggered(down, window_size),
        }
    }
}
