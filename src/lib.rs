//! Telebridge
//!
//! Bridges a gamepad to a remote robot: stick positions become movement
//! commands at a fixed rate, buttons become one-shot commands, and the
//! robot's compressed video is piped through an external decoder.

pub mod command;
pub mod config;
pub mod controller;
pub mod mapping;
pub mod video;
