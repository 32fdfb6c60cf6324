//! Display position between authoritative updates

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};

use crate::model::PlaybackState;

/// Extrapolates the canonical position for the current instant.
///
/// The target is always computed from the absolute baseline; `max_step` only
/// limits how far one sample may move the displayed value.
#[derive(Debug)]
pub struct ProgressInterpolator {
    max_step_ms: u64,
    baseline_revision: Option<u64>,
    displayed_ms: u64,
}

impl ProgressInterpolator {
    pub fn new(max_step: Duration) -> Self {
        Self {
            max_step_ms: max_step.as_millis() as u64,
            baseline_revision: None,
            displayed_ms: 0,
        }
    }

    pub fn sample(&mut self, state: &PlaybackState, now: Instant) -> u64 {
        let target = state.position_at(now);

        if self.baseline_revision != Some(state.revision) || !state.is_playing {
            self.baseline_revision = Some(state.revision);
            self.displayed_ms = target;
            return target;
        }

        let capped = self.displayed_ms.saturating_add(self.max_step_ms);
        self.displayed_ms = target.min(capped).max(self.displayed_ms);
        self.displayed_ms
    }
}

/// Publish `displayPositionMs` on every tick while playing.
///
/// Scheduling depends on `is_playing` alone; each tick reads the latest
/// baseline from `state`, so new baselines never restart the loop.
pub async fn run(
    mut state: watch::Receiver<Arc<PlaybackState>>,
    position: watch::Sender<u64>,
    tick: Duration,
    max_step: Duration,
) {
    let mut interpolator = ProgressInterpolator::new(max_step);
    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        let current = state.borrow_and_update().clone();
        let value = interpolator.sample(&current, Instant::now());
        position.send_if_modified(|shown| {
            if *shown == value {
                return false;
            }
            *shown = value;
            true
        });

        if current.is_playing {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = state.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        } else if state.changed().await.is_err() {
            break;
        }
    }
    tracing::debug!("Progress interpolator stopped");
}
