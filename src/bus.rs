//! Boundary to the home-automation message bus.
//!
//! The bridge does not speak to a broker itself. An embedding application
//! implements [`BusAdapter`] on top of its bus client and forwards incoming
//! commands as [`BusCommand`]s. [`MemoryBus`] is an in-process implementation.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use tokio::sync::broadcast;

/// Kind of entity announced on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// Read-only on/off sensor.
    BinarySensor,
    /// Commandable on/off switch.
    Switch,
    /// Commandable text value.
    Text,
}

/// Bus-side half of a panel element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    /// Unique entity ID, `p<page><short>`.
    pub unique_id: String,
    /// Display name.
    pub name: String,
    /// Entity kind.
    pub kind: EntityKind,
}

impl Entity {
    /// Creates the entity for element `short` on `page`.
    #[must_use]
    pub fn new(page: u8, short: &str, name: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            unique_id: entity_id(page, short),
            name: name.into(),
            kind,
        }
    }
}

/// Builds the bus entity ID for an element.
#[must_use]
pub fn entity_id(page: u8, short: &str) -> String {
    format!("p{page}{short}").replace(' ', "-")
}

/// Command received from the bus for one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusCommand {
    /// Target entity ID.
    pub entity_id: String,
    /// Raw command payload (`ON`/`OFF` or text).
    pub payload: String,
}

impl BusCommand {
    /// Creates a new bus command.
    #[must_use]
    pub fn new(entity_id: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            payload: payload.into(),
        }
    }
}

/// Interface the bridge uses to talk to the bus.
pub trait BusAdapter: Send + Sync {
    /// Registers an entity. Called once per element, at discovery.
    fn register(&self, entity: &Entity);

    /// Publishes the state of an entity.
    fn publish(&self, entity_id: &str, state: &str);
}

/// Published state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateUpdate {
    /// Entity ID.
    pub entity_id: String,
    /// New state.
    pub state: String,
}

/// In-memory bus that records registrations and the latest states.
pub struct MemoryBus {
    entities: Mutex<Vec<Entity>>,
    states: Mutex<HashMap<String, String>>,
    updates: broadcast::Sender<StateUpdate>,
}

impl MemoryBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        let (updates, _) = broadcast::channel(256);
        Self {
            entities: Mutex::new(Vec::new()),
            states: Mutex::new(HashMap::new()),
            updates,
        }
    }

    /// Returns all registered entities in registration order.
    #[must_use]
    pub fn entities(&self) -> Vec<Entity> {
        self.entities
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the last published state of an entity.
    #[must_use]
    pub fn state(&self, entity_id: &str) -> Option<String> {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(entity_id)
            .cloned()
    }

    /// Subscribes to published state changes.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StateUpdate> {
        self.updates.subscribe()
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl BusAdapter for MemoryBus {
    fn register(&self, entity: &Entity) {
        tracing::debug!("registering entity {} ({:?})", entity.unique_id, entity.kind);
        self.entities
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entity.clone());
    }

    fn publish(&self, entity_id: &str, state: &str) {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(entity_id.to_owned(), state.to_owned());
        // No subscribers is fine
        let _ = self.updates.send(StateUpdate {
            entity_id: entity_id.to_owned(),
            state: state.to_owned(),
        });
    }
}
