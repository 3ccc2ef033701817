//! Button presses to one-shot robot commands
//!
//! Edge-triggered: the bus only ever sees press transitions, so one press is
//! one command no matter how long the button stays down. Releases are not
//! wired. The bumpers request a speed mode; which mode the robot is currently
//! in stays with the robot driver.

use crate::command::{Command, CommandChannel};
use crate::controller::event_bus::{EventName, InputEventBus};
use tracing::{info, warn};

/// Button → command table
pub fn command_for(button: EventName) -> Option<Command> {
    match button {
        EventName::StartPress => Some(Command::TakeOff),
        EventName::BackPress => Some(Command::Land),
        EventName::UpPress => Some(Command::FrontFlip),
        EventName::DownPress => Some(Command::BackFlip),
        EventName::LeftPress => Some(Command::LeftFlip),
        EventName::RightPress => Some(Command::RightFlip),
        EventName::APress => Some(Command::ThrowTakeOff),
        EventName::BPress => Some(Command::Bounce),
        EventName::LBPress => Some(Command::SetSlowMode),
        EventName::RBPress => Some(Command::SetFastMode),
        _ => None,
    }
}

fn announce(command: Command) -> &'static str {
    match command {
        Command::TakeOff => "Take off!",
        Command::Land => "Attempting to land",
        Command::FrontFlip => "Front flip",
        Command::BackFlip => "Back flip",
        Command::LeftFlip => "Left flip",
        Command::RightFlip => "Right flip",
        Command::ThrowTakeOff => "Ready for throw takeoff",
        Command::Bounce => "Boing!!",
        Command::SetSlowMode => "Slow mode enabled",
        Command::SetFastMode => "Slow mode disabled",
        _ => "Command",
    }
}

/// Issues the command bound to `button`, if any
pub fn route_press(button: EventName, commands: &CommandChannel) -> Option<Command> {
    let command = command_for(button)?;
    info!("{} ({} -> {})", announce(command), button, command);
    if let Err(e) = commands.issue(command) {
        warn!("Button command not delivered: {}", e);
    }
    Some(command)
}

pub struct ButtonCommandRouter;

impl ButtonCommandRouter {
    /// Wires every button event on the bus to its command
    pub fn register(bus: &mut InputEventBus, commands: &CommandChannel) -> usize {
        let mut wired = 0;
        for button in EventName::ALL.into_iter().filter(|n| n.is_button()) {
            if command_for(button).is_none() {
                continue;
            }
            let commands = commands.clone();
            bus.on(button, move |_| {
                route_press(button, &commands);
            });
            wired += 1;
        }
        info!("Button router wired {} buttons", wired);
        wired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::event_bus::InputEvent;

    #[test]
    fn every_button_has_a_command() {
        for button in EventName::ALL.into_iter().filter(|n| n.is_button()) {
            assert!(command_for(button).is_some(), "{} unmapped", button);
        }
        assert_eq!(command_for(EventName::LeftX), None);
    }

    #[test]
    fn bumpers_request_speed_modes() {
        assert_eq!(command_for(EventName::LBPress), Some(Command::SetSlowMode));
        assert_eq!(command_for(EventName::RBPress), Some(Command::SetFastMode));
    }

    #[test]
    fn one_a_press_is_one_throw_takeoff() {
        let (commands, mut receiver) = CommandChannel::bounded(16);
        let mut bus = InputEventBus::new();
        assert_eq!(ButtonCommandRouter::register(&mut bus, &commands), 10);

        bus.dispatch(&InputEvent::press(EventName::APress));

        assert_eq!(receiver.try_recv().unwrap(), Command::ThrowTakeOff);
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn axis_events_do_not_route() {
        let (commands, mut receiver) = CommandChannel::bounded(16);
        let mut bus = InputEventBus::new();
        ButtonCommandRouter::register(&mut bus, &commands);

        bus.dispatch(&InputEvent::axis(
            crate::controller::axis_state::Axis::LeftX,
            20000,
        ));
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn route_press_survives_closed_channel() {
        let (commands, receiver) = CommandChannel::bounded(1);
        drop(receiver);
        assert_eq!(
            route_press(EventName::StartPress, &commands),
            Some(Command::TakeOff)
        );
    }
}
