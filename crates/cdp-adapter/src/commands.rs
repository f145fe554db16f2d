//! Command parameter types exposed by the CDP adapter interface.

use serde::{Deserialize, Serialize};

/// Viewport point an input event is dispatched at (already offset for frames).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    pub x: f64,
    pub y: f64,
}

impl Anchor {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Linear interpolation toward `to`, used to synthesise drag paths.
    pub fn lerp(&self, to: &Anchor, t: f64) -> Anchor {
        Anchor {
            x: self.x + (to.x - self.x) * t,
            y: self.y + (to.y - self.y) * t,
        }
    }
}

/// Wait gate definitions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaitGate {
    DomReady,
    NetworkQuiet { window_ms: u64, max_inflight: u32 },
}

/// Mouse phases accepted by `Input.dispatchMouseEvent`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MousePhase {
    Moved,
    Pressed,
    Released,
}

impl MousePhase {
    pub fn as_cdp(&self) -> &'static str {
        match self {
            MousePhase::Moved => "mouseMoved",
            MousePhase::Pressed => "mousePressed",
            MousePhase::Released => "mouseReleased",
        }
    }
}
