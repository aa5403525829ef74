//! Event system for panel notifications.
//!
//! Everything the panel reports, plus the bridge's own discovery milestones,
//! is broadcast as an [`Event`] to any number of subscribers.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::protocol::ReturnCode;
use crate::types::{ElementKind, TouchCoordinate, TouchEvent};

/// Event types that can be dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Panel started or was reset.
    Startup,
    /// Panel finished initialization.
    Ready,
    /// Instruction succeeded.
    InstructionOk,
    /// Instruction failed with the given reason.
    Failure(ReturnCode),
    /// Panel's serial receive buffer overflowed.
    BufferOverflow,
    /// Panel reported its current page.
    PageChanged { page: u8 },
    /// Component touched.
    Touch(TouchEvent),
    /// Raw touch coordinate.
    TouchCoordinate(TouchCoordinate),
    /// Panel entered sleep.
    AutoSleep,
    /// Panel left sleep.
    AutoWake,
    /// Panel started a microSD upgrade.
    SdUpgradeStarted,
    /// Panel ready for transparent data.
    TransparentDataReady,
    /// Transparent data transfer finished.
    TransparentDataFinished,
    /// Element found during discovery.
    ElementDiscovered {
        page: u8,
        short: String,
        kind: ElementKind,
    },
    /// All discovery families of a page finished.
    PageDiscovered { page: u8, elements: usize },
    /// Cached element state changed from the panel side.
    StateChanged {
        page: u8,
        short: String,
        state: String,
    },
}

impl Event {
    /// Returns the return code that produced this event, if any.
    #[must_use]
    pub const fn return_code(&self) -> Option<ReturnCode> {
        match self {
            Self::Startup => Some(ReturnCode::InvalidInstruction),
            Self::Ready => Some(ReturnCode::Ready),
            Self::InstructionOk => Some(ReturnCode::InstructionSuccessful),
            Self::Failure(code) => Some(*code),
            Self::BufferOverflow => Some(ReturnCode::SerialBufferOverflow),
            Self::PageChanged { .. } => Some(ReturnCode::CurrentPage),
            Self::Touch(_) => Some(ReturnCode::TouchEvent),
            Self::TouchCoordinate(coord) => {
                if coord.woke {
                    Some(ReturnCode::TouchCoordinateSleep)
                } else {
                    Some(ReturnCode::TouchCoordinateAwake)
                }
            }
            Self::AutoSleep => Some(ReturnCode::AutoSleep),
            Self::AutoWake => Some(ReturnCode::AutoWake),
            Self::SdUpgradeStarted => Some(ReturnCode::StartSdUpgrade),
            Self::TransparentDataReady => Some(ReturnCode::TransparentDataReady),
            Self::TransparentDataFinished => Some(ReturnCode::TransparentDataFinished),
            Self::ElementDiscovered { .. }
            | Self::PageDiscovered { .. }
            | Self::StateChanged { .. } => None,
        }
    }
}

/// A subscription to events.
pub struct Subscription {
    receiver: broadcast::Receiver<Event>,
}

impl Subscription {
    /// Receives the next event.
    ///
    /// Returns `None` once the dispatcher is gone.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::debug!("subscription lagged by {} events", n);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Subscription filter for specific events.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Filter by return codes.
    pub return_codes: Option<Vec<ReturnCode>>,
    /// Filter for the discovery of a specific page.
    pub discovered_page: Option<u8>,
}

impl EventFilter {
    /// Creates a filter for specific return codes.
    #[must_use]
    pub const fn return_codes(codes: Vec<ReturnCode>) -> Self {
        Self {
            return_codes: Some(codes),
            discovered_page: None,
        }
    }

    /// Creates a filter for the end of a page's discovery.
    #[must_use]
    pub const fn page_discovered(page: u8) -> Self {
        Self {
            return_codes: None,
            discovered_page: Some(page),
        }
    }

    /// Checks if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(ref codes) = self.return_codes {
            match event.return_code() {
                Some(code) if codes.contains(&code) => {}
                _ => return false,
            }
        }

        if let Some(expected) = self.discovered_page {
            match event {
                Event::PageDiscovered { page, .. } if *page == expected => {}
                _ => return false,
            }
        }

        true
    }
}

struct EventDispatcherInner {
    sender: broadcast::Sender<Event>,
}

/// Dispatches events to subscribers.
#[derive(Clone)]
pub struct EventDispatcher {
    inner: Arc<EventDispatcherInner>,
}

impl EventDispatcher {
    /// Creates a new event dispatcher.
    ///
    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(EventDispatcherInner { sender }),
        }
    }

    /// Dispatches an event to all subscribers.
    pub fn dispatch(&self, event: Event) {
        // No receivers is fine
        let _ = self.inner.sender.send(event);
    }

    /// Subscribes to all events.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.inner.sender.subscribe(),
        }
    }

    /// Waits for an event matching the filter with timeout.
    ///
    /// Only events dispatched after this call are considered; subscribe
    /// first and use [`Subscription::recv`] when the trigger may race.
    pub async fn wait_for(
        &self,
        filter: EventFilter,
        timeout: std::time::Duration,
    ) -> Option<Event> {
        let mut subscription = self.subscribe();

        tokio::select! {
            biased;
            result = async {
                loop {
                    if let Some(event) = subscription.recv().await {
                        if filter.matches(&event) {
                            return Some(event);
                        }
                    } else {
                        return None;
                    }
                }
            } => result,
            () = tokio::time::sleep(timeout) => None,
        }
    }
}
