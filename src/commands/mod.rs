//! Command handling and query correlation.
//!
//! The panel does not tag its replies: the next string or numeric data frame
//! answers the last `get` that was sent. [`CommandHandler`] therefore allows
//! exactly one query in flight. A query holds the single permit from the
//! moment it is stored until its reply (or a failure code) arrives.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore, oneshot};

use crate::error::{Error, Result};
use crate::protocol::{Attribute, PanelCommand, ReturnCode};
use crate::transport::FrameSender;

/// Default query timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Reply to a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// String data (`0x70`).
    Text(String),
    /// Numeric data (`0x71`).
    Number(u32),
}

impl Reply {
    fn matches(&self, attribute: Attribute) -> bool {
        matches!(
            (self, attribute),
            (Self::Text(_), Attribute::Text) | (Self::Number(_), Attribute::Value | Attribute::Id)
        )
    }
}

struct Pending {
    seq: u64,
    command: PanelCommand,
    attribute: Attribute,
    reply: oneshot::Sender<Reply>,
    // Released when the entry is dropped.
    _permit: OwnedSemaphorePermit,
}

/// Sends commands and correlates query replies.
pub struct CommandHandler {
    sender: FrameSender,
    permits: Arc<Semaphore>,
    pending: Mutex<Option<Pending>>,
    timeout: Option<Duration>,
    seq: AtomicU64,
}

impl CommandHandler {
    /// Creates a new command handler.
    #[must_use]
    pub fn new(sender: FrameSender) -> Self {
        Self {
            sender,
            permits: Arc::new(Semaphore::new(1)),
            pending: Mutex::new(None),
            timeout: Some(DEFAULT_TIMEOUT),
            seq: AtomicU64::new(0),
        }
    }

    /// Sets the query timeout. `None` waits for the panel indefinitely.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    /// Sends a `get` and waits for its reply.
    ///
    /// Waits for any outstanding query to finish first. Returns `Ok(None)`
    /// if the panel answered with a failure code.
    async fn query(&self, component: &str, attribute: Attribute) -> Result<Option<Reply>> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| Error::ChannelClosed)?;

        let command = PanelCommand::get(component, attribute);
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            *pending = Some(Pending {
                seq,
                command: command.clone(),
                attribute,
                reply: tx,
                _permit: permit,
            });
        }

        tracing::debug!("query {}", command);
        if let Err(e) = self.sender.send(command.encode()).await {
            self.abandon(seq).await;
            return Err(e);
        }

        let outcome = match self.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, rx).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    self.abandon(seq).await;
                    tracing::warn!("no reply to {} within {:?}", command, timeout);
                    return Err(Error::Timeout {
                        timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    });
                }
            },
            None => rx.await,
        };

        // A dropped sender means the panel answered with a failure code.
        Ok(outcome.ok())
    }

    /// Clears the pending slot if it still belongs to query `seq`.
    async fn abandon(&self, seq: u64) {
        let mut pending = self.pending.lock().await;
        if pending.as_ref().is_some_and(|p| p.seq == seq) {
            *pending = None;
        }
    }

    /// Reads `<component>.txt`.
    pub async fn get_text(&self, component: &str) -> Result<Option<String>> {
        match self.query(component, Attribute::Text).await? {
            Some(Reply::Text(text)) => Ok(Some(text)),
            _ => Ok(None),
        }
    }

    /// Reads `<component>.val`.
    pub async fn get_value(&self, component: &str) -> Result<Option<u32>> {
        match self.query(component, Attribute::Value).await? {
            Some(Reply::Number(value)) => Ok(Some(value)),
            _ => Ok(None),
        }
    }

    /// Reads `<component>.id`.
    pub async fn get_id(&self, component: &str) -> Result<Option<u32>> {
        match self.query(component, Attribute::Id).await? {
            Some(Reply::Number(id)) => Ok(Some(id)),
            _ => Ok(None),
        }
    }

    /// Sends a command that expects no reply.
    pub async fn send(&self, command: &PanelCommand) -> Result<()> {
        tracing::debug!("command {}", command);
        self.sender.send(command.encode()).await
    }

    /// Writes `<component>.txt=<text>`.
    pub async fn set_text(&self, component: &str, text: &str) -> Result<()> {
        self.send(&PanelCommand::SetText {
            component: component.to_owned(),
            text: text.to_owned(),
        })
        .await
    }

    /// Writes `<component>.val=<value>`.
    pub async fn set_value(&self, component: &str, value: u32) -> Result<()> {
        self.send(&PanelCommand::SetValue {
            component: component.to_owned(),
            value,
        })
        .await
    }

    /// Asks the panel to report its current page.
    pub async fn send_me(&self) -> Result<()> {
        self.send(&PanelCommand::SendMe).await
    }

    /// Delivers a reply to the pending query and releases the slot.
    ///
    /// Returns false if nothing was pending or the reply kind did not match;
    /// a mismatched reply still releases the slot.
    pub async fn resolve(&self, reply: Reply) -> bool {
        let Some(pending) = self.pending.lock().await.take() else {
            tracing::warn!("unsolicited reply {:?}", reply);
            return false;
        };

        if !reply.matches(pending.attribute) {
            tracing::warn!("reply {:?} does not answer {}", reply, pending.command);
            return false;
        }

        tracing::trace!("reply to {}: {:?}", pending.command, reply);
        if pending.reply.send(reply).is_err() {
            tracing::debug!("query {} was abandoned", pending.command);
        }
        true
    }

    /// Releases the pending query without a reply.
    ///
    /// Returns true if a query was pending.
    pub async fn fail(&self, code: ReturnCode) -> bool {
        match self.pending.lock().await.take() {
            Some(pending) => {
                tracing::debug!("{} failed: {}", pending.command, code.description());
                true
            }
            None => false,
        }
    }

    /// Returns true if a query is waiting for its reply.
    pub async fn is_pending(&self) -> bool {
        self.pending.lock().await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use tokio::sync::mpsc;

    use super::*;
    use crate::transport::FrameSender;

    fn handler() -> (Arc<CommandHandler>, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(10);
        (Arc::new(CommandHandler::new(FrameSender::from_channel(tx))), rx)
    }

    #[tokio::test]
    async fn test_reply_resolves_query() {
        let (commands, mut sent) = handler();

        let query = tokio::spawn({
            let commands = Arc::clone(&commands);
            async move { commands.get_text("b0").await }
        });

        assert_eq!(sent.recv().await.unwrap(), Bytes::from_static(b"get b0.txt"));
        assert!(commands.resolve(Reply::Text("Light".into())).await);

        assert_eq!(query.await.unwrap().unwrap().as_deref(), Some("Light"));
        assert!(!commands.is_pending().await);
    }

    #[tokio::test]
    async fn test_failure_code_releases_without_reply() {
        let (commands, mut sent) = handler();

        let query = tokio::spawn({
            let commands = Arc::clone(&commands);
            async move { commands.get_value("s5").await }
        });

        assert_eq!(sent.recv().await.unwrap(), Bytes::from_static(b"get s5.val"));
        assert!(commands.fail(ReturnCode::InvalidVariableName).await);

        assert_eq!(query.await.unwrap().unwrap(), None);
        assert!(!commands.fail(ReturnCode::InvalidVariableName).await);
    }

    #[tokio::test]
    async fn test_second_query_waits_for_first_reply() {
        let (commands, mut sent) = handler();

        let first = tokio::spawn({
            let commands = Arc::clone(&commands);
            async move { commands.get_id("b0").await }
        });
        assert_eq!(sent.recv().await.unwrap(), Bytes::from_static(b"get b0.id"));

        let second = tokio::spawn({
            let commands = Arc::clone(&commands);
            async move { commands.get_id("b1").await }
        });

        // Nothing else goes out while the first query is pending.
        let early = tokio::time::timeout(Duration::from_millis(50), sent.recv()).await;
        assert!(early.is_err());

        commands.resolve(Reply::Number(3)).await;
        assert_eq!(first.await.unwrap().unwrap(), Some(3));

        assert_eq!(sent.recv().await.unwrap(), Bytes::from_static(b"get b1.id"));
        commands.resolve(Reply::Number(4)).await;
        assert_eq!(second.await.unwrap().unwrap(), Some(4));
    }

    #[tokio::test]
    async fn test_mismatched_reply_releases_slot() {
        let (commands, mut sent) = handler();

        let query = tokio::spawn({
            let commands = Arc::clone(&commands);
            async move { commands.get_value("s0").await }
        });
        sent.recv().await.unwrap();

        assert!(!commands.resolve(Reply::Text("oops".into())).await);
        assert_eq!(query.await.unwrap().unwrap(), None);
    }

    #[tokio::test]
    async fn test_unsolicited_reply_dropped() {
        let (commands, _sent) = handler();
        assert!(!commands.resolve(Reply::Number(1)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_frees_slot() {
        let (tx, mut sent) = mpsc::channel(10);
        let mut commands = CommandHandler::new(FrameSender::from_channel(tx));
        commands.set_timeout(Some(Duration::from_millis(100)));

        let err = commands.get_text("t0").await.unwrap_err();
        assert!(matches!(err, Error::Timeout { timeout_ms: 100 }));
        assert!(!commands.is_pending().await);

        // A late reply finds nothing pending.
        assert!(!commands.resolve(Reply::Text("late".into())).await);
        assert_eq!(sent.recv().await.unwrap(), Bytes::from_static(b"get t0.txt"));
    }
}
