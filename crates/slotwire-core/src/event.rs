//! UI events and event observation.
//!
//! Events are delivered synchronously with [`send_event`]. Before the target
//! sees an event through [`Object::event`], every [`EventFilter`] installed
//! on it gets a first look, most recently installed first; a filter that
//! returns `true` consumes the event and stops delivery.

use bitflags::bitflags;
use tracing::trace;

use crate::object::Object;

/// Kind of an [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    MouseButtonPress,
    MouseButtonRelease,
    MouseButtonDblClick,
    MouseMove,
    KeyPress,
    KeyRelease,
    FocusIn,
    FocusOut,
    Enter,
    Leave,
    Resize,
    Show,
    Hide,
    Close,
    Timer,
    DeferredDelete,
    /// Application-defined event kind.
    User(u16),
}

bitflags! {
    /// Keyboard modifiers held during an input event.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Modifiers: u8 {
        const NONE  = 0;
        const SHIFT = 1 << 0;
        const CTRL  = 1 << 1;
        const ALT   = 1 << 2;
        const META  = 1 << 3;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// Position in the target's coordinate space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    Char(char),
    Enter,
    Escape,
    Backspace,
    Tab,
    Delete,
    Insert,
    Home,
    End,
    PageUp,
    PageDown,
    Up,
    Down,
    Left,
    Right,
    F(u8),
}

/// Payload of an [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventData {
    None,
    Mouse {
        button: Option<MouseButton>,
        pos: Position,
        modifiers: Modifiers,
    },
    Key {
        code: KeyCode,
        modifiers: Modifiers,
    },
    Resize {
        width: u32,
        height: u32,
    },
    Timer {
        timer_id: u64,
    },
}

/// An event addressed to one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    kind: EventType,
    data: EventData,
}

impl Event {
    /// Event without payload.
    #[must_use]
    pub const fn new(kind: EventType) -> Self {
        Self {
            kind,
            data: EventData::None,
        }
    }

    #[must_use]
    pub const fn mouse(
        kind: EventType,
        button: Option<MouseButton>,
        pos: Position,
        modifiers: Modifiers,
    ) -> Self {
        Self {
            kind,
            data: EventData::Mouse {
                button,
                pos,
                modifiers,
            },
        }
    }

    #[must_use]
    pub const fn key(kind: EventType, code: KeyCode, modifiers: Modifiers) -> Self {
        Self {
            kind,
            data: EventData::Key { code, modifiers },
        }
    }

    #[must_use]
    pub const fn resize(width: u32, height: u32) -> Self {
        Self {
            kind: EventType::Resize,
            data: EventData::Resize { width, height },
        }
    }

    #[must_use]
    pub const fn timer(timer_id: u64) -> Self {
        Self {
            kind: EventType::Timer,
            data: EventData::Timer { timer_id },
        }
    }

    #[must_use]
    pub const fn kind(&self) -> EventType {
        self.kind
    }

    #[must_use]
    pub const fn data(&self) -> &EventData {
        &self.data
    }

    #[must_use]
    pub const fn mouse_button(&self) -> Option<MouseButton> {
        match self.data {
            EventData::Mouse { button, .. } => button,
            _ => None,
        }
    }

    #[must_use]
    pub const fn key_code(&self) -> Option<KeyCode> {
        match self.data {
            EventData::Key { code, .. } => Some(code),
            _ => None,
        }
    }

    #[must_use]
    pub const fn modifiers(&self) -> Modifiers {
        match self.data {
            EventData::Mouse { modifiers, .. } | EventData::Key { modifiers, .. } => modifiers,
            _ => Modifiers::NONE,
        }
    }
}

/// Observer with a first look at events sent to the objects it watches.
pub trait EventFilter {
    /// Return `true` to consume `event`; `false` lets it continue.
    fn event_filter(&self, watched: &dyn Object, event: &Event) -> bool;
}

/// Deliver `event` to `target` through its filters.
///
/// Returns whether the event was consumed by a filter or handled by the
/// target.
pub fn send_event(target: &dyn Object, event: &Event) -> bool {
    for filter in target.core().event_filters() {
        if filter.event_filter(target, event) {
            trace!(target = %target.core().id(), kind = ?event.kind(), "event consumed by filter");
            return true;
        }
    }
    target.event(event)
}
