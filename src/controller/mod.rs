//! Controller subsystem for gamepad input handling
//!
//! Turns asynchronously arriving gamepad events into shared stick state and
//! one-shot commands:
//!
//! 1. [`event_collector`] - Raw gamepad input collection (gilrs, own thread)
//! 2. [`event_bus`] - Named event delivery to registered handlers
//! 3. [`axis_state`] - Last-value store read by the control loop
//! 4. [`button_router`] - Button presses to robot commands
//!
//! # Architecture
//!
//! ```text
//! Gamepad ──► Collector ──► EventBus ──┬─► AxisState ──► ControlLoop
//!             (thread)     (dispatcher) └─► ButtonCommandRouter ──► CommandChannel
//! ```

pub mod axis_state;
pub mod button_router;
pub mod event_bus;
pub mod event_collector;

pub use axis_state::{Axis, AxisState, Stick, StickPair};
pub use button_router::ButtonCommandRouter;
pub use event_bus::{BusError, EventName, EventPayload, EventPublisher, InputEvent, InputEventBus};
pub use event_collector::{CollectorError, CollectorHandle};

use std::sync::Arc;

/// Stores an axis reading into the shared state
pub fn store_axis(state: &AxisState, axis: Axis, payload: &EventPayload) {
    if let EventPayload::Axis(value) = payload {
        state.store(axis, *value);
    }
}

/// Wires the four stick events on the bus into `state`
pub fn wire_axes(bus: &mut InputEventBus, state: &Arc<AxisState>) {
    for name in EventName::ALL {
        if let Some(axis) = name.axis() {
            let state = state.clone();
            bus.on(name, move |payload| store_axis(&state, axis, payload));
        }
    }
}
