//! Opcode routing table.
//!
//! Maps the first byte of an incoming frame to the handler registered for
//! it. Handlers run on their own tasks so a slow handler never stalls the
//! read loop.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use futures::FutureExt;
use futures::future::BoxFuture;

use crate::error::{Error, Result};

/// Frame handler. Receives the frame payload without its opcode byte.
pub type Handler = Arc<dyn Fn(Bytes) -> BoxFuture<'static, ()> + Send + Sync>;

/// Routes frames to handlers by opcode.
#[derive(Default, Clone)]
pub struct OpcodeDispatcher {
    handlers: HashMap<u8, Handler>,
}

impl OpcodeDispatcher {
    /// Creates an empty routing table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the handler for an opcode.
    ///
    /// # Errors
    ///
    /// Returns `Error::DuplicateHandler` if the opcode already has a handler.
    pub fn register<F, Fut>(&mut self, opcode: impl Into<u8>, handler: F) -> Result<()>
    where
        F: Fn(Bytes) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let opcode = opcode.into();
        if self.handlers.contains_key(&opcode) {
            return Err(Error::DuplicateHandler { opcode });
        }
        let handler: Handler = Arc::new(move |payload| handler(payload).boxed());
        self.handlers.insert(opcode, handler);
        Ok(())
    }

    /// Returns true if the opcode has a handler.
    #[must_use]
    pub fn is_registered(&self, opcode: u8) -> bool {
        self.handlers.contains_key(&opcode)
    }

    /// Number of registered opcodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Routes a frame to its handler on a new task.
    ///
    /// Returns false, after logging, if the frame is empty or its opcode has
    /// no handler. Must be called from within a Tokio runtime.
    pub fn dispatch(&self, frame: Bytes) -> bool {
        let Some(&opcode) = frame.first() else {
            return false;
        };

        let Some(handler) = self.handlers.get(&opcode) else {
            tracing::warn!("no handler for opcode 0x{opcode:02x}, dropping {}", hex::encode(&frame));
            return false;
        };

        tracing::trace!("routing opcode 0x{opcode:02x}, {} bytes", frame.len() - 1);
        tokio::spawn(handler(frame.slice(1..)));
        true
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::protocol::ReturnCode;

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut dispatcher = OpcodeDispatcher::new();
        dispatcher.register(ReturnCode::Ready, |_| async {}).unwrap();

        let err = dispatcher.register(0x88_u8, |_| async {}).unwrap_err();
        assert!(matches!(err, Error::DuplicateHandler { opcode: 0x88 }));
        assert_eq!(dispatcher.len(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_passes_payload() {
        let (tx, mut rx) = mpsc::channel(1);
        let mut dispatcher = OpcodeDispatcher::new();
        dispatcher
            .register(ReturnCode::CurrentPage, move |payload| {
                let tx = tx.clone();
                async move {
                    tx.send(payload).await.unwrap();
                }
            })
            .unwrap();

        assert!(dispatcher.dispatch(Bytes::from_static(&[0x66, 0x02])));
        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(&[0x02]));
    }

    #[tokio::test]
    async fn test_unknown_and_empty_frames_dropped() {
        let dispatcher = OpcodeDispatcher::new();
        assert!(!dispatcher.dispatch(Bytes::from_static(&[0x42, 0x01])));
        assert!(!dispatcher.dispatch(Bytes::new()));
    }
}
