//! Panel elements and their state synchronization.

use crate::bus::{BusAdapter, Entity, EntityKind};
use crate::protocol::PanelCommand;

/// State string for an active boolean element.
pub const STATE_ON: &str = "ON";

/// State string for an inactive boolean element.
pub const STATE_OFF: &str = "OFF";

/// Element variants the bridge knows how to mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    /// Momentary button, mirrored as a binary sensor.
    Button,
    /// Dual-state button, mirrored as a switch.
    DualStateButton,
    /// Switch, mirrored as a switch.
    Switch,
    /// Text field, mirrored as a text entity.
    Text,
}

impl ElementKind {
    /// All kinds, one discovery family each.
    pub const ALL: [Self; 4] = [Self::Button, Self::DualStateButton, Self::Switch, Self::Text];

    /// Short-name prefix of this family (`b0`, `bt0`, `s0`, `t0`).
    #[must_use]
    pub const fn prefix(&self) -> &'static str {
        match self {
            Self::Button => "b",
            Self::DualStateButton => "bt",
            Self::Switch => "s",
            Self::Text => "t",
        }
    }

    /// Bus entity kind for this element kind.
    #[must_use]
    pub const fn entity_kind(&self) -> EntityKind {
        match self {
            Self::Button => EntityKind::BinarySensor,
            Self::DualStateButton | Self::Switch => EntityKind::Switch,
            Self::Text => EntityKind::Text,
        }
    }

    /// Returns true if the state is `ON`/`OFF`.
    #[must_use]
    pub const fn is_boolean(&self) -> bool {
        !matches!(self, Self::Text)
    }
}

/// A discovered panel element.
#[derive(Debug, Clone)]
pub struct Element {
    page: u8,
    short: String,
    kind: ElementKind,
    state: String,
    id: Option<u32>,
    entity: Entity,
}

impl Element {
    /// Creates an element and its bus entity.
    ///
    /// `label` is the text read from the panel during discovery; text
    /// elements are named after their short-name instead.
    #[must_use]
    pub fn new(kind: ElementKind, page: u8, short: impl Into<String>, label: &str) -> Self {
        let short = short.into();
        let name = match kind {
            ElementKind::Text => format!("Text {short}"),
            _ => label.to_owned(),
        };
        let entity = Entity::new(page, &short, name, kind.entity_kind());
        Self {
            page,
            short,
            kind,
            state: String::new(),
            id: None,
            entity,
        }
    }

    /// Page the element lives on.
    #[must_use]
    pub const fn page(&self) -> u8 {
        self.page
    }

    /// Short-name, unique within the page.
    #[must_use]
    pub fn short(&self) -> &str {
        &self.short
    }

    /// Element kind.
    #[must_use]
    pub const fn kind(&self) -> ElementKind {
        self.kind
    }

    /// Cached state. Empty until first seeded.
    #[must_use]
    pub fn state(&self) -> &str {
        &self.state
    }

    /// Panel-assigned component ID, once resolved.
    #[must_use]
    pub const fn id(&self) -> Option<u32> {
        self.id
    }

    /// Bus entity of this element.
    #[must_use]
    pub const fn entity(&self) -> &Entity {
        &self.entity
    }

    pub(crate) fn set_id(&mut self, id: u32) {
        self.id = Some(id);
    }

    /// Caches a state reported by the panel and publishes it to the bus.
    pub fn set_state_from_panel(&mut self, state: impl Into<String>, bus: &dyn BusAdapter) {
        self.state = state.into();
        tracing::debug!("panel set state {:?} for {}", self.state, self.short);
        bus.publish(&self.entity.unique_id, &self.state);
    }

    /// Seeds a boolean element from a numeric `val` reply.
    pub fn set_value_from_panel(&mut self, value: u32, bus: &dyn BusAdapter) {
        let state = if value > 0 { STATE_ON } else { STATE_OFF };
        self.set_state_from_panel(state, bus);
    }

    /// Caches a state commanded from the bus.
    ///
    /// Returns the panel write command that applies it, or `None` for
    /// read-only buttons.
    pub fn set_state_from_bus(&mut self, payload: &str) -> Option<PanelCommand> {
        if self.kind == ElementKind::Button {
            tracing::warn!("ignoring bus command for read-only button {}", self.short);
            return None;
        }
        self.state = payload.to_owned();
        tracing::debug!("bus set state {:?} for {}", self.state, self.short);
        Some(self.panel_command())
    }

    /// Write command that re-sends the cached state to the panel.
    #[must_use]
    pub fn panel_command(&self) -> PanelCommand {
        match self.kind {
            ElementKind::Text => PanelCommand::SetText {
                component: self.short.clone(),
                text: self.state.clone(),
            },
            _ => PanelCommand::SetValue {
                component: self.short.clone(),
                value: u32::from(self.state == STATE_ON),
            },
        }
    }

    /// Applies a touch event.
    ///
    /// Buttons follow the press byte (nonzero is `ON`). Switches and
    /// dual-state buttons toggle on the release byte (`0`) and ignore the
    /// press. Text elements re-announce their state.
    ///
    /// Returns true if the bus was notified.
    pub fn touch(&mut self, press: u8, bus: &dyn BusAdapter) -> bool {
        match self.kind {
            ElementKind::Button => {
                let state = if press > 0 { STATE_ON } else { STATE_OFF };
                self.set_state_from_panel(state, bus);
                true
            }
            ElementKind::DualStateButton | ElementKind::Switch => {
                if press != 0 {
                    return false;
                }
                let state = if self.state == STATE_OFF {
                    STATE_ON
                } else {
                    STATE_OFF
                };
                self.set_state_from_panel(state, bus);
                true
            }
            ElementKind::Text => {
                bus.publish(&self.entity.unique_id, &self.state);
                true
            }
        }
    }
}
