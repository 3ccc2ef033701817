use crate::controller::axis_state::{Axis, AXIS_FULL_SCALE};
use crate::controller::event_bus::{BusError, EventName, EventPublisher, InputEvent};
use chrono::Local;
use gilrs::{Axis as GilrsAxis, Button, Event, EventType, GamepadId, Gilrs};
use statum::{machine, state};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

// Collector errors
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("Failed to initialize collector: {0}")]
    InitializationError(String),

    #[error("Failed to spawn collector thread: {0}")]
    SpawnError(#[from] std::io::Error),
}

// Define collector states using statum's state macro
#[state]
#[derive(Debug, Clone)]
pub enum CollectionState {
    Initializing,
    Collecting,
}

#[machine]
pub struct EventCollector<S: CollectionState> {
    // Gilrs context
    gilrs: Gilrs,

    // Active gamepad
    active_gamepad: Option<GamepadId>,

    // Device side of the input bus
    publisher: EventPublisher,

    cancel: CancellationToken,
}

impl EventCollector<Initializing> {
    pub fn create(
        publisher: EventPublisher,
        cancel: CancellationToken,
    ) -> Result<Self, CollectorError> {
        info!("Initializing gilrs controller interface");
        let gilrs = match Gilrs::new() {
            Ok(g) => {
                info!("Successfully initialized gilrs");
                g
            }
            Err(e) => {
                error!("Failed to initialize gilrs: {}", e);
                return Err(CollectorError::InitializationError(e.to_string()));
            }
        };

        Ok(Self::new(gilrs, None, publisher, cancel))
    }

    // Pick a gamepad and transition to Collecting state
    pub fn initialize(mut self) -> EventCollector<Collecting> {
        let gamepads: Vec<(GamepadId, String)> = self
            .gilrs
            .gamepads()
            .map(|(id, gamepad)| (id, gamepad.name().to_string()))
            .collect();

        if gamepads.is_empty() {
            warn!("No gamepad connected, continuing in idle mode");
        } else {
            info!("Found {} gamepads:", gamepads.len());
            for (idx, (id, name)) in gamepads.iter().enumerate() {
                info!("  [{}] ID: {}, Name: {}", idx, id, name);
            }
            let (id, name) = &gamepads[0];
            self.active_gamepad = Some(*id);
            info!("Selected gamepad: {} ({})", name, id);
        }

        self.transition()
    }
}

impl EventCollector<Collecting> {
    // Drain every pending gilrs event onto the bus, returns how many were published
    pub fn collect_pending(&mut self) -> usize {
        let mut published = 0;

        while let Some(Event { id, event, .. }) = self.gilrs.next_event() {
            match event {
                EventType::Connected if self.active_gamepad.is_none() => {
                    info!("Gamepad {} connected, selecting it", id);
                    self.active_gamepad = Some(id);
                    continue;
                }
                EventType::Disconnected if self.active_gamepad == Some(id) => {
                    warn!("Active gamepad {} disconnected", id);
                    self.active_gamepad = None;
                    continue;
                }
                _ => {}
            }

            if self.active_gamepad != Some(id) {
                debug!("Skipping event from non-active gamepad: {:?}", id);
                continue;
            }

            let Some(input) = convert_event(event) else {
                continue;
            };

            if input.name.is_button() {
                info!(
                    "Button pressed: {} at {}",
                    input.name,
                    Local::now().format("%H:%M:%S.%3f")
                );
            }

            match self.publisher.publish(input) {
                Ok(()) => published += 1,
                Err(BusError::QueueFull(name)) => warn!("Input queue full, dropped {}", name),
                Err(e) => {
                    debug!("Publishing stopped: {}", e);
                    self.cancel.cancel();
                    break;
                }
            }
        }

        published
    }

    // Run the collector until cancelled
    pub fn run_collection_loop(&mut self) {
        info!("Starting Event Collector loop");

        let mut event_count = 0;
        let mut last_log_time = Local::now();
        let log_interval = chrono::Duration::seconds(10);

        while !self.cancel.is_cancelled() {
            event_count += self.collect_pending();

            let now = Local::now();
            if now - last_log_time > log_interval {
                debug!(
                    "Event Collector stats: published {} events in last {} seconds",
                    event_count,
                    log_interval.num_seconds()
                );
                event_count = 0;
                last_log_time = now;
            }

            std::thread::sleep(Duration::from_micros(500));
        }

        info!("Event Collector loop stopped");
    }
}

// Public interface for spawning the collector on its own thread
pub struct CollectorHandle {
    thread: Option<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl CollectorHandle {
    pub fn spawn(
        publisher: EventPublisher,
        cancel: CancellationToken,
    ) -> Result<Self, CollectorError> {
        info!("Spawning Event Collector thread");
        let thread_cancel = cancel.clone();

        // gilrs polls synchronously, keep it off the runtime
        let thread = std::thread::Builder::new()
            .name("gamepad-collector".to_string())
            .spawn(move || match EventCollector::create(publisher, thread_cancel) {
                Ok(collector) => collector.initialize().run_collection_loop(),
                Err(e) => error!("Event Collector not started: {}", e),
            })?;

        Ok(Self {
            thread: Some(thread),
            cancel,
        })
    }

    pub fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Event Collector thread panicked");
            }
        }
    }
}

/// Device input with the platform event code stripped
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawInput {
    ButtonPressed(Button),
    ButtonRepeated(Button),
    ButtonReleased(Button),
    AxisChanged(GilrsAxis, f32),
    Other,
}

impl From<EventType> for RawInput {
    fn from(event: EventType) -> Self {
        match event {
            EventType::ButtonPressed(button, _) => RawInput::ButtonPressed(button),
            EventType::ButtonRepeated(button, _) => RawInput::ButtonRepeated(button),
            EventType::ButtonReleased(button, _) => RawInput::ButtonReleased(button),
            EventType::AxisChanged(axis, value, _) => RawInput::AxisChanged(axis, value),
            _ => RawInput::Other,
        }
    }
}

// Translate a gilrs event into a bus event
pub fn convert_event(event: EventType) -> Option<InputEvent> {
    convert_input(RawInput::from(event))
}

// Presses are edge-triggered: releases and repeats stay silent
pub fn convert_input(input: RawInput) -> Option<InputEvent> {
    match input {
        RawInput::ButtonPressed(button) => map_button(button).map(InputEvent::press),
        RawInput::AxisChanged(axis, value) => {
            map_axis(axis).map(|axis| InputEvent::axis(axis, scale_axis(value)))
        }
        RawInput::ButtonRepeated(_) | RawInput::ButtonReleased(_) | RawInput::Other => None,
    }
}

// Helper function to map gilrs Button to a press event
pub fn map_button(button: Button) -> Option<EventName> {
    match button {
        Button::Start => Some(EventName::StartPress),
        Button::Select => Some(EventName::BackPress),
        Button::DPadUp => Some(EventName::UpPress),
        Button::DPadDown => Some(EventName::DownPress),
        Button::DPadLeft => Some(EventName::LeftPress),
        Button::DPadRight => Some(EventName::RightPress),
        Button::South => Some(EventName::APress),
        Button::East => Some(EventName::BPress),
        Button::LeftTrigger => Some(EventName::LBPress),
        Button::RightTrigger => Some(EventName::RBPress),
        _ => None,
    }
}

pub fn map_axis(axis: GilrsAxis) -> Option<Axis> {
    match axis {
        GilrsAxis::LeftStickX => Some(Axis::LeftX),
        GilrsAxis::LeftStickY => Some(Axis::LeftY),
        GilrsAxis::RightStickX => Some(Axis::RightX),
        GilrsAxis::RightStickY => Some(Axis::RightY),
        _ => None,
    }
}

// gilrs reports [-1.0, 1.0], the bus carries the raw device range
pub fn scale_axis(value: f32) -> i32 {
    let full = AXIS_FULL_SCALE as f32;
    ((value * full).round() as i32).clamp(-AXIS_FULL_SCALE, AXIS_FULL_SCALE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn face_and_dpad_buttons_map_to_presses() {
        assert_eq!(map_button(Button::South), Some(EventName::APress));
        assert_eq!(map_button(Button::East), Some(EventName::BPress));
        assert_eq!(map_button(Button::Start), Some(EventName::StartPress));
        assert_eq!(map_button(Button::Select), Some(EventName::BackPress));
        assert_eq!(map_button(Button::DPadLeft), Some(EventName::LeftPress));
        assert_eq!(map_button(Button::LeftTrigger), Some(EventName::LBPress));
        assert_eq!(map_button(Button::RightTrigger), Some(EventName::RBPress));
        assert_eq!(map_button(Button::North), None);
    }

    #[test]
    fn stick_axes_map_and_triggers_do_not() {
        assert_eq!(map_axis(GilrsAxis::RightStickY), Some(Axis::RightY));
        assert_eq!(map_axis(GilrsAxis::LeftStickX), Some(Axis::LeftX));
        assert_eq!(map_axis(GilrsAxis::LeftZ), None);
    }

    #[test]
    fn press_converts_once_repeat_and_release_are_silent() {
        assert_eq!(
            convert_input(RawInput::ButtonPressed(Button::South)),
            Some(InputEvent::press(EventName::APress))
        );
        assert_eq!(convert_input(RawInput::ButtonRepeated(Button::South)), None);
        assert_eq!(convert_input(RawInput::ButtonReleased(Button::South)), None);
        assert_eq!(convert_input(RawInput::Other), None);
    }

    #[test]
    fn held_button_yields_single_press() {
        let mut held = vec![RawInput::ButtonPressed(Button::South)];
        held.extend(std::iter::repeat(RawInput::ButtonRepeated(Button::South)).take(25));
        held.push(RawInput::ButtonReleased(Button::South));

        let presses: Vec<InputEvent> = held.into_iter().filter_map(convert_input).collect();
        assert_eq!(presses, vec![InputEvent::press(EventName::APress)]);
    }

    #[test]
    fn stick_motion_converts_to_scaled_axis_event() {
        assert_eq!(
            convert_input(RawInput::AxisChanged(GilrsAxis::RightStickY, -1.0)),
            Some(InputEvent::axis(Axis::RightY, -32767))
        );
        assert_eq!(convert_input(RawInput::AxisChanged(GilrsAxis::LeftZ, 0.3)), None);
    }

    #[test]
    fn axis_values_scale_to_device_range() {
        assert_eq!(scale_axis(0.0), 0);
        assert_eq!(scale_axis(1.0), 32767);
        assert_eq!(scale_axis(-1.0), -32767);
        assert_eq!(scale_axis(-1.5), -32767);
        assert_eq!(scale_axis(0.5), 16384);
    }
}
