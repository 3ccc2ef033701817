//! Input event bus
//!
//! Delivers named gamepad events to registered handlers. The device side
//! publishes into a bounded queue and returns immediately; a single dispatcher
//! task drains the queue and runs the handlers in arrival order.
//!
//! ```text
//! EventCollector ─[EventPublisher]─► queue ─► dispatcher ─► handlers
//! ```
//!
//! There is no backpressure towards the device: a full queue drops the event,
//! and a slow handler delays everything queued behind it.

use crate::controller::axis_state::Axis;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Names of every event the input device can emit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    StartPress,
    BackPress,
    UpPress,
    DownPress,
    LeftPress,
    RightPress,
    APress,
    BPress,
    LBPress,
    RBPress,
    LeftX,
    LeftY,
    RightX,
    RightY,
}

impl EventName {
    pub const ALL: [EventName; 14] = [
        EventName::StartPress,
        EventName::BackPress,
        EventName::UpPress,
        EventName::DownPress,
        EventName::LeftPress,
        EventName::RightPress,
        EventName::APress,
        EventName::BPress,
        EventName::LBPress,
        EventName::RBPress,
        EventName::LeftX,
        EventName::LeftY,
        EventName::RightX,
        EventName::RightY,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventName::StartPress => "StartPress",
            EventName::BackPress => "BackPress",
            EventName::UpPress => "UpPress",
            EventName::DownPress => "DownPress",
            EventName::LeftPress => "LeftPress",
            EventName::RightPress => "RightPress",
            EventName::APress => "APress",
            EventName::BPress => "BPress",
            EventName::LBPress => "LBPress",
            EventName::RBPress => "RBPress",
            EventName::LeftX => "LeftX",
            EventName::LeftY => "LeftY",
            EventName::RightX => "RightX",
            EventName::RightY => "RightY",
        }
    }

    /// Stick axis carried by a continuous event
    pub fn axis(self) -> Option<Axis> {
        match self {
            EventName::LeftX => Some(Axis::LeftX),
            EventName::LeftY => Some(Axis::LeftY),
            EventName::RightX => Some(Axis::RightX),
            EventName::RightY => Some(Axis::RightY),
            _ => None,
        }
    }

    pub fn is_button(self) -> bool {
        self.axis().is_none()
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventName {
    type Err = BusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| BusError::UnknownEvent(s.to_string()))
    }
}

/// Payload attached to an event occurrence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventPayload {
    /// Discrete button press
    None,
    /// Signed axis reading in [-32767, 32767]
    Axis(i32),
}

/// One occurrence of a named event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputEvent {
    pub name: EventName,
    pub payload: EventPayload,
}

impl InputEvent {
    pub fn press(name: EventName) -> Self {
        Self {
            name,
            payload: EventPayload::None,
        }
    }

    pub fn axis(axis: Axis, value: i32) -> Self {
        let name = match axis {
            Axis::LeftX => EventName::LeftX,
            Axis::LeftY => EventName::LeftY,
            Axis::RightX => EventName::RightX,
            Axis::RightY => EventName::RightY,
        };
        Self {
            name,
            payload: EventPayload::Axis(value),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// Subscription to a name the device never emits
    #[error("Unknown input event: {0}")]
    UnknownEvent(String),

    #[error("Event queue full, dropped {0}")]
    QueueFull(EventName),

    #[error("Event queue closed")]
    QueueClosed,
}

pub type Handler = Arc<dyn Fn(&EventPayload) + Send + Sync>;

/// Device-side handle for publishing events onto the bus
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: mpsc::Sender<InputEvent>,
}

impl EventPublisher {
    /// Never waits; safe to call from the blocking collector thread
    pub fn publish(&self, event: InputEvent) -> Result<(), BusError> {
        self.sender.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(ev) => BusError::QueueFull(ev.name),
            mpsc::error::TrySendError::Closed(_) => BusError::QueueClosed,
        })
    }
}

/// Handler registry plus the dispatch loop
#[derive(Default)]
pub struct InputEventBus {
    handlers: HashMap<EventName, Vec<Handler>>,
}

impl InputEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for every occurrence of the event called `name`
    ///
    /// Fails at setup time when the device has no event of that name.
    pub fn subscribe<F>(&mut self, name: &str, handler: F) -> Result<(), BusError>
    where
        F: Fn(&EventPayload) + Send + Sync + 'static,
    {
        let event_name: EventName = name.parse()?;
        self.on(event_name, handler);
        Ok(())
    }

    /// Typed registration, cannot fail
    pub fn on<F>(&mut self, name: EventName, handler: F)
    where
        F: Fn(&EventPayload) + Send + Sync + 'static,
    {
        debug!("Subscribing handler to {}", name);
        self.handlers
            .entry(name)
            .or_default()
            .push(Arc::new(handler));
    }

    /// Runs every handler registered for the event, returns how many ran
    pub fn dispatch(&self, event: &InputEvent) -> usize {
        match self.handlers.get(&event.name) {
            Some(handlers) => {
                for handler in handlers {
                    handler(&event.payload);
                }
                handlers.len()
            }
            None => {
                debug!("No handler for {}", event.name);
                0
            }
        }
    }

    /// Moves the bus into a dispatcher task
    ///
    /// Returns the publisher for the device side and the task handle. The task
    /// ends when every publisher is dropped or `cancel` fires.
    pub fn spawn(
        self,
        queue_capacity: usize,
        cancel: CancellationToken,
    ) -> (EventPublisher, JoinHandle<u64>) {
        let (sender, mut receiver) = mpsc::channel(queue_capacity.max(1));
        info!(
            "Starting input event dispatcher ({} event names wired, queue {})",
            self.handlers.len(),
            queue_capacity.max(1)
        );

        let task = tokio::spawn(async move {
            let mut delivered = 0u64;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("Input event dispatcher cancelled");
                        break;
                    }
                    event = receiver.recv() => match event {
                        Some(event) => {
                            self.dispatch(&event);
                            delivered += 1;
                        }
                        None => {
                            warn!("All event publishers dropped, dispatcher stopping");
                            break;
                        }
                    }
                }
            }
            delivered
        });

        (EventPublisher { sender }, task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn unknown_name_fails_at_subscription() {
        let mut bus = InputEventBus::new();
        let err = bus.subscribe("XPress", |_| {}).unwrap_err();
        assert!(matches!(err, BusError::UnknownEvent(ref n) if n == "XPress"));
        // names are case sensitive
        assert!(bus.subscribe("apress", |_| {}).is_err());
    }

    #[test]
    fn every_device_name_parses() {
        for name in EventName::ALL {
            assert_eq!(name.as_str().parse::<EventName>().unwrap(), name);
        }
    }

    #[test]
    fn dispatch_reaches_only_matching_handlers() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut bus = InputEventBus::new();

        let s = seen.clone();
        bus.subscribe("RightY", move |p| s.lock().unwrap().push(("RightY", *p)))
            .unwrap();
        let s = seen.clone();
        bus.subscribe("APress", move |p| s.lock().unwrap().push(("APress", *p)))
            .unwrap();

        assert_eq!(bus.dispatch(&InputEvent::axis(Axis::RightY, -5000)), 1);
        assert_eq!(bus.dispatch(&InputEvent::press(EventName::APress)), 1);
        assert_eq!(bus.dispatch(&InputEvent::press(EventName::BPress)), 0);

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                ("RightY", EventPayload::Axis(-5000)),
                ("APress", EventPayload::None)
            ]
        );
    }

    #[tokio::test]
    async fn dispatcher_preserves_arrival_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut bus = InputEventBus::new();
        let s = seen.clone();
        bus.on(EventName::LeftX, move |p| {
            if let EventPayload::Axis(v) = p {
                s.lock().unwrap().push(*v);
            }
        });

        let (publisher, task) = bus.spawn(64, CancellationToken::new());
        for v in 0..50 {
            publisher.publish(InputEvent::axis(Axis::LeftX, v)).unwrap();
        }
        drop(publisher);

        assert_eq!(task.await.unwrap(), 50);
        assert_eq!(*seen.lock().unwrap(), (0..50).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn publish_after_shutdown_reports_closed() {
        let bus = InputEventBus::new();
        let cancel = CancellationToken::new();
        let (publisher, task) = bus.spawn(4, cancel.clone());
        cancel.cancel();
        task.await.unwrap();

        let err = publisher
            .publish(InputEvent::press(EventName::StartPress))
            .unwrap_err();
        assert!(matches!(err, BusError::QueueClosed));
    }
}
