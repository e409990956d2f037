//! Core types for trellis.
//!
//! These types define the foundation that everything builds on: the closed
//! event-name vocabulary, the per-instance handler mask used to scope hit
//! testing, and the frameloop mode of a root.

use bitflags::bitflags;

// =============================================================================
// Pointer Ids
// =============================================================================

/// Native pointer identifier as forwarded by the input shim.
pub type PointerId = i32;

// =============================================================================
// Event Names
// =============================================================================

/// The closed set of synthetic event names the engine dispatches.
///
/// Prop keys like `onClick` or `onPointerMove` parse into this enum; there is
/// no string matching past the prop boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    Click,
    ContextMenu,
    DoubleClick,
    Wheel,
    PointerDown,
    PointerUp,
    PointerMove,
    PointerOver,
    PointerOut,
    PointerEnter,
    PointerLeave,
    PointerCancel,
    PointerMissed,
    LostPointerCapture,
}

impl EventName {
    /// Parse a handler prop key (`onClick`, `onPointerMove`, ...).
    ///
    /// Returns `None` for anything that is not a recognized handler key, in
    /// which case the key is treated as a host-object slot path.
    pub fn parse(key: &str) -> Option<Self> {
        match key {
            "onClick" => Some(Self::Click),
            "onContextMenu" => Some(Self::ContextMenu),
            "onDoubleClick" => Some(Self::DoubleClick),
            "onWheel" => Some(Self::Wheel),
            "onPointerDown" => Some(Self::PointerDown),
            "onPointerUp" => Some(Self::PointerUp),
            "onPointerMove" => Some(Self::PointerMove),
            "onPointerOver" => Some(Self::PointerOver),
            "onPointerOut" => Some(Self::PointerOut),
            "onPointerEnter" => Some(Self::PointerEnter),
            "onPointerLeave" => Some(Self::PointerLeave),
            "onPointerCancel" => Some(Self::PointerCancel),
            "onPointerMissed" => Some(Self::PointerMissed),
            "onLostPointerCapture" => Some(Self::LostPointerCapture),
            _ => None,
        }
    }

    /// The handler prop key this name parses from.
    pub fn key(self) -> &'static str {
        match self {
            Self::Click => "onClick",
            Self::ContextMenu => "onContextMenu",
            Self::DoubleClick => "onDoubleClick",
            Self::Wheel => "onWheel",
            Self::PointerDown => "onPointerDown",
            Self::PointerUp => "onPointerUp",
            Self::PointerMove => "onPointerMove",
            Self::PointerOver => "onPointerOver",
            Self::PointerOut => "onPointerOut",
            Self::PointerEnter => "onPointerEnter",
            Self::PointerLeave => "onPointerLeave",
            Self::PointerCancel => "onPointerCancel",
            Self::PointerMissed => "onPointerMissed",
            Self::LostPointerCapture => "onLostPointerCapture",
        }
    }

    /// The handler-mask bit for this event name.
    pub fn mask(self) -> HandlerMask {
        match self {
            Self::Click => HandlerMask::CLICK,
            Self::ContextMenu => HandlerMask::CONTEXT_MENU,
            Self::DoubleClick => HandlerMask::DOUBLE_CLICK,
            Self::Wheel => HandlerMask::WHEEL,
            Self::PointerDown => HandlerMask::POINTER_DOWN,
            Self::PointerUp => HandlerMask::POINTER_UP,
            Self::PointerMove => HandlerMask::POINTER_MOVE,
            Self::PointerOver => HandlerMask::POINTER_OVER,
            Self::PointerOut => HandlerMask::POINTER_OUT,
            Self::PointerEnter => HandlerMask::POINTER_ENTER,
            Self::PointerLeave => HandlerMask::POINTER_LEAVE,
            Self::PointerCancel => HandlerMask::POINTER_CANCEL,
            Self::PointerMissed => HandlerMask::POINTER_MISSED,
            Self::LostPointerCapture => HandlerMask::LOST_POINTER_CAPTURE,
        }
    }

    /// Pure hover-class events only need objects that registered hover
    /// handlers, which lets move hit-testing skip everything else.
    pub fn is_hover_class(self) -> bool {
        matches!(
            self,
            Self::PointerMove
                | Self::PointerOver
                | Self::PointerOut
                | Self::PointerEnter
                | Self::PointerLeave
        )
    }

    /// Click-class events carry a press-to-release pixel delta and are
    /// subject to the drag threshold.
    pub fn is_click_class(self) -> bool {
        matches!(self, Self::Click | Self::ContextMenu | Self::DoubleClick)
    }
}

bitflags! {
    /// Which handlers an instance currently has registered.
    ///
    /// Derived from the handler map; used to pre-filter raycast candidates
    /// for hover-class events.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct HandlerMask: u16 {
        const CLICK = 1 << 0;
        const CONTEXT_MENU = 1 << 1;
        const DOUBLE_CLICK = 1 << 2;
        const WHEEL = 1 << 3;
        const POINTER_DOWN = 1 << 4;
        const POINTER_UP = 1 << 5;
        const POINTER_MOVE = 1 << 6;
        const POINTER_OVER = 1 << 7;
        const POINTER_OUT = 1 << 8;
        const POINTER_ENTER = 1 << 9;
        const POINTER_LEAVE = 1 << 10;
        const POINTER_CANCEL = 1 << 11;
        const POINTER_MISSED = 1 << 12;
        const LOST_POINTER_CAPTURE = 1 << 13;
    }
}

impl HandlerMask {
    /// Mask of all hover-class handler bits.
    pub const HOVER: Self = Self::POINTER_MOVE
        .union(Self::POINTER_OVER)
        .union(Self::POINTER_OUT)
        .union(Self::POINTER_ENTER)
        .union(Self::POINTER_LEAVE);
}

// =============================================================================
// Frameloop
// =============================================================================

/// How a root wants to be driven by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Frameloop {
    /// Render every tick, unconditionally.
    #[default]
    Always,
    /// Render only while the frame counter is non-zero; `invalidate()`
    /// bumps it (capped at 60).
    OnDemand,
    /// Never self-schedule. An external driver calls `advance(timestamp)`.
    Manual,
}

// =============================================================================
// XR Frame
// =============================================================================

/// Opaque per-frame payload handed through by an XR session's own frame
/// callback. Subscribers receive it as `Option<&XrFrame>`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct XrFrame {
    pub predicted_display_time: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_handler_keys() {
        assert_eq!(EventName::parse("onClick"), Some(EventName::Click));
        assert_eq!(EventName::parse("onPointerMove"), Some(EventName::PointerMove));
        assert_eq!(
            EventName::parse("onLostPointerCapture"),
            Some(EventName::LostPointerCapture)
        );
        // Slot paths never parse as handlers
        assert_eq!(EventName::parse("position-x"), None);
        assert_eq!(EventName::parse("onclick"), None);
        assert_eq!(EventName::parse("once"), None);
    }

    #[test]
    fn test_hover_class_membership() {
        assert!(EventName::PointerMove.is_hover_class());
        assert!(EventName::PointerLeave.is_hover_class());
        assert!(!EventName::Click.is_hover_class());
        assert!(!EventName::PointerDown.is_hover_class());
    }

    #[test]
    fn test_click_class_membership() {
        assert!(EventName::Click.is_click_class());
        assert!(EventName::ContextMenu.is_click_class());
        assert!(EventName::DoubleClick.is_click_class());
        assert!(!EventName::PointerUp.is_click_class());
    }

    #[test]
    fn test_hover_mask_covers_hover_bits() {
        for name in [
            EventName::PointerMove,
            EventName::PointerOver,
            EventName::PointerOut,
            EventName::PointerEnter,
            EventName::PointerLeave,
        ] {
            assert!(HandlerMask::HOVER.contains(name.mask()));
        }
        assert!(!HandlerMask::HOVER.contains(EventName::Click.mask()));
    }
}
