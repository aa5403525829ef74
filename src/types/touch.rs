//! Touch input types.

/// Touch on a component with "send component ID" enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchEvent {
    /// Page the component is on.
    pub page: u8,
    /// Panel-assigned component ID.
    pub component: u8,
    /// Raw event byte (`0x01` press, `0x00` release).
    pub press: u8,
}

impl TouchEvent {
    /// Returns true for a press, false for a release.
    #[must_use]
    pub const fn is_press(&self) -> bool {
        self.press != 0
    }
}

/// Raw touch coordinate, reported when `sendxy=1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchCoordinate {
    /// X coordinate in pixels.
    pub x: u16,
    /// Y coordinate in pixels.
    pub y: u16,
    /// Press (true) or release (false).
    pub pressed: bool,
    /// The touch woke the panel from sleep.
    pub woke: bool,
}
