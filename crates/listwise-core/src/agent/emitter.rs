//! Ordered step emission for one turn
//!
//! Steps may only move forward through planning → executing → synthesizing →
//! complete. A step from an earlier phase, or any step after `complete`, is
//! dropped and logged. Accepted steps are both recorded (for the response
//! frame) and sent down the turn's channel in production order.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::loop_events::{StepType, StepUpdate, StreamFrame};

#[derive(Default)]
struct EmitterState {
    phase: Option<StepType>,
    steps: Vec<StepUpdate>,
}

/// Cloneable handle; all clones share one ordered stream.
#[derive(Clone)]
pub struct StepEmitter {
    tx: Option<mpsc::UnboundedSender<StreamFrame>>,
    state: Arc<Mutex<EmitterState>>,
}

impl StepEmitter {
    pub fn new(tx: mpsc::UnboundedSender<StreamFrame>) -> Self {
        Self {
            tx: Some(tx),
            state: Arc::default(),
        }
    }

    /// An emitter that only records, for callers that don't stream.
    pub fn recording() -> Self {
        Self {
            tx: None,
            state: Arc::default(),
        }
    }

    /// Emit a step. Returns `false` if it was dropped as out of order.
    pub fn emit(&self, step: StepUpdate) -> bool {
        // Hold the lock across send so concurrent emitters can't reorder
        let mut state = self.state.lock();
        if let Some(phase) = state.phase {
            if phase == StepType::Complete {
                tracing::warn!(step = step.step_type.as_str(), "Dropping step after complete");
                return false;
            }
            if step.step_type < phase {
                tracing::warn!(
                    step = step.step_type.as_str(),
                    current = phase.as_str(),
                    "Dropping out-of-order step"
                );
                return false;
            }
        }
        state.phase = Some(step.step_type);
        if let Some(tx) = &self.tx {
            // Receiver gone means the client left; keep recording anyway
            let _ = tx.send(StreamFrame::Step(step.clone()));
        }
        state.steps.push(step);
        true
    }

    pub fn phase(&self) -> Option<StepType> {
        self.state.lock().phase
    }

    pub fn is_complete(&self) -> bool {
        self.phase() == Some(StepType::Complete)
    }

    /// Every accepted step so far.
    pub fn steps(&self) -> Vec<StepUpdate> {
        self.state.lock().steps.clone()
    }
}
