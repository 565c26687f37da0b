//! Per-agent mailbox

use super::Message;
use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::Notify;

/// Unbounded FIFO of delivered messages owned by one agent
///
/// Anyone holding a valid address may deliver; only the owner reads. Once
/// closed the mailbox refuses deliveries for good.
#[derive(Debug, Default)]
pub struct Mailbox {
    inner: Mutex<MailboxInner>,
    arrivals: Notify,
}

#[derive(Debug, Default)]
struct MailboxInner {
    messages: VecDeque<Message>,
    closed: bool,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message; hands it back if the mailbox is closed
    pub(crate) fn deliver(&self, message: Message) -> Result<(), Message> {
        {
            let mut inner = self.inner.lock();
            if inner.closed {
                return Err(message);
            }
            inner.messages.push_back(message);
        }
        self.arrivals.notify_waiters();
        Ok(())
    }

    /// Close the mailbox and drop anything still queued
    pub(crate) fn close(&self) {
        {
            let mut inner = self.inner.lock();
            inner.closed = true;
            inner.messages.clear();
        }
        self.arrivals.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Oldest message, if any
    pub fn pop(&self) -> Option<Message> {
        self.inner.lock().messages.pop_front()
    }

    /// Oldest message satisfying `predicate`; the others keep their order
    pub fn pop_matching<F>(&self, predicate: F) -> Option<Message>
    where
        F: Fn(&Message) -> bool,
    {
        let mut inner = self.inner.lock();
        let index = inner.messages.iter().position(|m| predicate(m))?;
        inner.messages.remove(index)
    }

    /// Drop every queued message, returning how many were dropped
    pub fn purge(&self) -> usize {
        let mut inner = self.inner.lock();
        let dropped = inner.messages.len();
        inner.messages.clear();
        dropped
    }

    /// Wait for the oldest message satisfying `predicate`
    ///
    /// Resolves to `None` once the mailbox is closed.
    pub async fn recv_matching<F>(&self, predicate: F) -> Option<Message>
    where
        F: Fn(&Message) -> bool,
    {
        loop {
            let notified = self.arrivals.notified();
            tokio::pin!(notified);
            // Register before checking so a delivery between the check and
            // the await is not missed.
            notified.as_mut().enable();

            {
                let mut inner = self.inner.lock();
                if let Some(index) = inner.messages.iter().position(|m| predicate(m)) {
                    return inner.messages.remove(index);
                }
                if inner.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Wait for the next message in arrival order
    pub async fn recv(&self) -> Option<Message> {
        self.recv_matching(|_| true).await
    }
}
