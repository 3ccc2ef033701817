//! Last-value store for the four analog stick axes
//!
//! One writer (the bus dispatcher) overwrites, many readers (the control loop
//! tickers) load. There is no read-modify-write anywhere, so plain atomic
//! stores and loads are enough and nobody ever waits on a lock.

use std::sync::atomic::{AtomicI32, Ordering};

/// Largest magnitude an axis reading can take
pub const AXIS_FULL_SCALE: i32 = 32767;

/// Analog stick axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    LeftX,
    LeftY,
    RightX,
    RightY,
}

/// Physical stick on the gamepad
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stick {
    Left,
    Right,
}

impl Stick {
    pub fn axes(self) -> (Axis, Axis) {
        match self {
            Stick::Left => (Axis::LeftX, Axis::LeftY),
            Stick::Right => (Axis::RightX, Axis::RightY),
        }
    }
}

/// Read-time snapshot of one stick
///
/// Built from two independent loads, so `x` and `y` may come from different
/// physical instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StickPair {
    pub x: i32,
    pub y: i32,
}

/// Concurrency-safe latest-value holder for all four axes
#[derive(Debug, Default)]
pub struct AxisState {
    left_x: AtomicI32,
    left_y: AtomicI32,
    right_x: AtomicI32,
    right_y: AtomicI32,
}

impl AxisState {
    /// All axes start centred at 0
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, axis: Axis) -> &AtomicI32 {
        match axis {
            Axis::LeftX => &self.left_x,
            Axis::LeftY => &self.left_y,
            Axis::RightX => &self.right_x,
            Axis::RightY => &self.right_y,
        }
    }

    /// Unconditional overwrite, last write wins
    pub fn store(&self, axis: Axis, value: i32) {
        let value = value.clamp(-AXIS_FULL_SCALE, AXIS_FULL_SCALE);
        self.slot(axis).store(value, Ordering::Release);
    }

    /// Most recent stored value, 0 if nothing was ever stored
    pub fn load(&self, axis: Axis) -> i32 {
        self.slot(axis).load(Ordering::Acquire)
    }

    pub fn stick(&self, stick: Stick) -> StickPair {
        let (x_axis, y_axis) = stick.axes();
        StickPair {
            x: self.load(x_axis),
            y: self.load(y_axis),
        }
    }

    pub fn left_stick(&self) -> StickPair {
        self.stick(Stick::Left)
    }

    pub fn right_stick(&self) -> StickPair {
        self.stick(Stick::Right)
    }
}
