//! Canonical multi-touch frame types as delivered by the capture source.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::geometry::Point;

/// Which physical trackpad half a frame or contact belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
    #[default]
    Unknown,
}

impl Side {
    /// Device index 0 is the left surface, 1 the right.
    pub const fn from_device_index(index: i32) -> Self {
        match index {
            0 => Side::Left,
            1 => Side::Right,
            _ => Side::Unknown,
        }
    }

    pub const fn device_index(self) -> i32 {
        match self {
            Side::Left => 0,
            Side::Right => 1,
            Side::Unknown => -1,
        }
    }

    pub const fn opposite(self) -> Self {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
            Side::Unknown => Side::Unknown,
        }
    }
}

/// Per-contact tracking phase reported by the digitizer.
///
/// Wire codes 0..=7 are fixed by the capture format and must not be
/// renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ContactPhase {
    NotTouching = 0,
    Starting = 1,
    Hovering = 2,
    Making = 3,
    Touching = 4,
    Breaking = 5,
    Lingering = 6,
    Leaving = 7,
}

impl ContactPhase {
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub const fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => ContactPhase::NotTouching,
            1 => ContactPhase::Starting,
            2 => ContactPhase::Hovering,
            3 => ContactPhase::Making,
            4 => ContactPhase::Touching,
            5 => ContactPhase::Breaking,
            6 => ContactPhase::Lingering,
            7 => ContactPhase::Leaving,
            _ => return None,
        })
    }

    /// Whether the finger tip counts as down. Hovering never does.
    pub const fn is_tip_down(self) -> bool {
        matches!(
            self,
            ContactPhase::Starting
                | ContactPhase::Making
                | ContactPhase::Touching
                | ContactPhase::Breaking
                | ContactPhase::Lingering
                | ContactPhase::Leaving
        )
    }
}

/// One finger in one frame. Coordinates are normalized to `[0, 1]` with the
/// origin at the top-left of that side's surface. Never serde-serialized;
/// the capture codec owns the only wire form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawContact {
    /// Stable per-touch-lifetime identifier on this device.
    pub id: i32,
    pub x: f32,
    pub y: f32,
    pub total: f32,
    pub pressure: f32,
    pub major_axis: f32,
    pub minor_axis: f32,
    pub angle: f32,
    pub density: f32,
    pub phase: ContactPhase,
}

impl RawContact {
    pub const fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub const fn is_tip_down(&self) -> bool {
        self.phase.is_tip_down()
    }
}

/// Contacts per frame rarely exceed five per side; sixteen covers both
/// surfaces plus palm noise without heap allocation.
pub type ContactList = SmallVec<[RawContact; 16]>;

/// A complete frame from one side's surface.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    /// Assigned by frame ingest, strictly increasing across the session.
    pub sequence: u64,
    /// Seconds, monotonic from the first frame of the session.
    pub timestamp: f64,
    /// Opaque numeric id of the originating device.
    pub device_id: u64,
    /// 0 = left, 1 = right, -1 = meta/unknown.
    pub device_index: i32,
    pub contacts: ContactList,
}

impl RawFrame {
    pub const fn side(&self) -> Side {
        Side::from_device_index(self.device_index)
    }

    pub fn tip_down_count(&self) -> usize {
        self.contacts.iter().filter(|c| c.is_tip_down()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_codes_round_trip() {
        for code in 0..8u8 {
            let phase = ContactPhase::from_code(code).unwrap();
            assert_eq!(phase.code(), code);
        }
        assert_eq!(ContactPhase::from_code(8), None);
    }

    #[test]
    fn hovering_is_not_tip_down() {
        assert!(!ContactPhase::Hovering.is_tip_down());
        assert!(!ContactPhase::NotTouching.is_tip_down());
        assert!(ContactPhase::Touching.is_tip_down());
        assert!(ContactPhase::Leaving.is_tip_down());
    }

    #[test]
    fn side_from_device_index() {
        assert_eq!(Side::from_device_index(0), Side::Left);
        assert_eq!(Side::from_device_index(1), Side::Right);
        assert_eq!(Side::from_device_index(7), Side::Unknown);
    }
}
