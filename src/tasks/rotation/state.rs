use std::sync::Arc;
use std::time::Instant;

use crate::events::PreparedImage;

#[derive(Debug, Clone)]
pub enum RotationState {
    Idle,
    Loading,
    Displaying {
        image: Arc<PreparedImage>,
        since: Instant,
    },
    Error {
        reason: String,
    },
}

impl RotationState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Displaying { .. } => "displaying",
            Self::Error { .. } => "error",
        }
    }
}

/// Everything a presentation layer needs to render one frame.
///
/// Transitions return whether anything observable changed so that the
/// controller can publish through `watch::Sender::send_if_modified`.
#[derive(Debug, Clone)]
pub struct RotationSnapshot {
    state: RotationState,
    current: Option<Arc<PreparedImage>>,
    elapsed_steps: u32,
    total_steps: u32,
}

impl RotationSnapshot {
    pub fn new(total_steps: u32) -> Self {
        Self {
            state: RotationState::Idle,
            current: None,
            elapsed_steps: 0,
            total_steps: total_steps.max(1),
        }
    }

    pub fn state(&self) -> &RotationState {
        &self.state
    }

    /// Last successfully displayed image; survives `Loading` and `Error`.
    pub fn current(&self) -> Option<&Arc<PreparedImage>> {
        self.current.as_ref()
    }

    pub fn elapsed_steps(&self) -> u32 {
        self.elapsed_steps
    }

    pub fn total_steps(&self) -> u32 {
        self.total_steps
    }

    /// Elapsed fraction of the display interval in `0.0..=1.0`.
    pub fn progress(&self) -> f32 {
        self.elapsed_steps as f32 / self.total_steps as f32
    }

    pub fn begin_loading(&mut self) -> bool {
        match self.state {
            // The displayed image stays current until its successor is ready.
            RotationState::Displaying { .. } | RotationState::Loading => false,
            RotationState::Idle | RotationState::Error { .. } => {
                self.state = RotationState::Loading;
                true
            }
        }
    }

    pub fn display(&mut self, image: Arc<PreparedImage>, now: Instant) -> bool {
        self.current = Some(image.clone());
        self.state = RotationState::Displaying { image, since: now };
        self.elapsed_steps = 0;
        true
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> bool {
        self.state = RotationState::Error {
            reason: reason.into(),
        };
        true
    }

    pub fn tick(&mut self) -> bool {
        if self.current.is_none() || self.elapsed_steps >= self.total_steps {
            return false;
        }
        self.elapsed_steps += 1;
        true
    }

    pub fn reset(&mut self) -> bool {
        if matches!(self.state, RotationState::Idle) && self.current.is_none() {
            return false;
        }
        self.state = RotationState::Idle;
        self.current = None;
        self.elapsed_steps = 0;
        true
    }
}
