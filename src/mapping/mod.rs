//! Stick state to movement commands
//!
//! [`pitch`] normalizes a raw reading into a percentage, [`control_loop`] runs
//! the fixed-rate tickers that apply deadzones and issue one command per axis
//! per tick.

pub mod control_loop;
pub mod pitch;

pub use control_loop::{ControlLoop, ControlLoopHandle, ControlSettings};
