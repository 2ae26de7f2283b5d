//! In-process transport: each connection is a bounded channel whose receiving
//! half belongs to whoever writes to the wire.

use crate::domain::market::messages::OhlcvMessage;
use crate::domain::ports::{Connection, DisconnectHandler, Subscriber, SubscriberId};
use anyhow::Result;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc::{self, Receiver, Sender, error::TrySendError};
use tracing::debug;
use uuid::Uuid;

struct ConnectionState {
    closed: bool,
    handlers: Vec<DisconnectHandler>,
}

/// Subscriber connection over a bounded tokio mpsc channel.
///
/// Messages that do not fit in the buffer are refused rather than awaited.
pub struct MpscConnection {
    id: SubscriberId,
    sender: Sender<OhlcvMessage>,
    state: Mutex<ConnectionState>,
}

impl MpscConnection {
    pub fn new(buffer: usize) -> (Arc<Self>, Receiver<OhlcvMessage>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        let connection = Arc::new(Self {
            id: Uuid::new_v4(),
            sender,
            state: Mutex::new(ConnectionState {
                closed: false,
                handlers: Vec::new(),
            }),
        });
        (connection, receiver)
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Close the connection and run its disconnect handlers.
    ///
    /// Handlers run at most once, outside the state lock.
    pub fn disconnect(&self) {
        let handlers = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            std::mem::take(&mut state.handlers)
        };

        debug!(
            "MpscConnection {}: disconnected, running {} handlers",
            self.id,
            handlers.len()
        );
        for handler in handlers {
            handler();
        }
    }
}

impl Subscriber for MpscConnection {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn send(&self, message: OhlcvMessage) -> Result<()> {
        if self.is_closed() {
            anyhow::bail!("connection {} is closed", self.id);
        }
        match self.sender.try_send(message) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => anyhow::bail!("connection {} buffer is full", self.id),
            Err(TrySendError::Closed(_)) => {
                anyhow::bail!("connection {} receiver dropped", self.id)
            }
        }
    }
}

impl Connection for MpscConnection {
    fn register_disconnect_handler(&self, handler: DisconnectHandler) {
        let mut state = self.state.lock();
        if state.closed {
            drop(state);
            handler();
            return;
        }
        state.handlers.push(handler);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn error_message(channel: &str) -> OhlcvMessage {
        OhlcvMessage::Error {
            channel: channel.to_string(),
            code: "TEST".to_string(),
            message: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn test_send_and_receive() {
        let (conn, mut rx) = MpscConnection::new(4);
        conn.send(error_message("a")).unwrap();
        conn.send(error_message("b")).unwrap();

        assert_eq!(rx.recv().await.unwrap().channel(), "a");
        assert_eq!(rx.recv().await.unwrap().channel(), "b");
    }

    #[test]
    fn test_full_buffer_refuses_without_blocking() {
        let (conn, _rx) = MpscConnection::new(1);
        conn.send(error_message("a")).unwrap();
        assert!(conn.send(error_message("b")).is_err());
    }

    #[test]
    fn test_dropped_receiver_is_an_error() {
        let (conn, rx) = MpscConnection::new(1);
        drop(rx);
        assert!(conn.send(error_message("a")).is_err());
    }

    #[test]
    fn test_disconnect_handlers_run_once() {
        let (conn, _rx) = MpscConnection::new(1);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        conn.register_disconnect_handler(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        conn.disconnect();
        conn.disconnect();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(conn.send(error_message("a")).is_err());
    }

    #[test]
    fn test_handler_on_closed_connection_runs_immediately() {
        let (conn, _rx) = MpscConnection::new(1);
        conn.disconnect();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        conn.register_disconnect_handler(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
