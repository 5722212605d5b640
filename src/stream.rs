//! # Publication Module
//!
//! Single-producer, single-reader observable streams with explicit
//! completion and failure.
//!
//! ## Contract
//! A `Subscription` yields `Some(Ok(value))` for each published value, at most
//! one `Some(Err(error))` if the stream fails, and `None` once it has
//! terminated. `termination()` tells a normal completion apart from a
//! publisher that went away without finishing the stream (`Abandoned`).
//!
//! ## Why Unbounded
//! Publishers run inside backend callbacks and must never wait for a slow
//! reader. One live dashboard per stream is the expected consumer.

use crate::error::SessionError;
use crate::metrics::LiveSnapshot;
use crate::state::SessionState;
use tokio::sync::mpsc::{self, error::TryRecvError};

/// Live metric snapshots for one session
pub type SnapshotStream = Subscription<LiveSnapshot>;
/// Lifecycle states for one session
pub type StateStream = Subscription<SessionState>;

#[derive(Debug)]
enum Item<T> {
    Value(T),
    Complete,
    Fail(SessionError),
}

/// How a stream ended
#[derive(Debug, Clone, PartialEq)]
pub enum Termination {
    /// Still open
    Pending,
    /// Publisher completed normally
    Completed,
    /// Publisher failed with an error
    Failed(SessionError),
    /// Publisher dropped without completing or failing
    Abandoned,
}

/// Create a connected publisher/subscription pair.
pub fn channel<T>(name: &'static str) -> (Publisher<T>, Subscription<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        Publisher { tx, name },
        Subscription {
            rx,
            termination: Termination::Pending,
        },
    )
}

/// Producing half of a stream
#[derive(Debug)]
pub struct Publisher<T> {
    tx: mpsc::UnboundedSender<Item<T>>,
    name: &'static str,
}

impl<T> Clone for Publisher<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            name: self.name,
        }
    }
}

impl<T> Publisher<T> {
    /// Publish a value. Returns false when the reader is gone or the stream
    /// already terminated.
    pub fn send(&self, value: T) -> bool {
        if self.tx.send(Item::Value(value)).is_err() {
            log::debug!("{} stream has no reader, dropping value", self.name);
            return false;
        }
        true
    }

    /// Finish the stream normally.
    pub fn complete(self) {
        log::debug!("{} stream completed", self.name);
        let _ = self.tx.send(Item::Complete);
    }

    /// Finish the stream with an error.
    pub fn fail(self, error: SessionError) {
        log::error!("{} stream failed: {}", self.name, error);
        let _ = self.tx.send(Item::Fail(error));
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consuming half of a stream
#[derive(Debug)]
pub struct Subscription<T> {
    rx: mpsc::UnboundedReceiver<Item<T>>,
    termination: Termination,
}

impl<T> Subscription<T> {
    /// Wait for the next event.
    pub async fn next(&mut self) -> Option<Result<T, SessionError>> {
        if self.is_terminated() {
            return None;
        }
        let item = self.rx.recv().await;
        self.accept(item)
    }

    /// Take the next event if one is already queued.
    ///
    /// Returns `None` both when nothing is queued yet and after termination;
    /// check `termination()` to tell them apart.
    pub fn try_next(&mut self) -> Option<Result<T, SessionError>> {
        if self.is_terminated() {
            return None;
        }
        match self.rx.try_recv() {
            Ok(item) => self.accept(Some(item)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => self.accept(None),
        }
    }

    /// Drain every value until the stream terminates.
    pub async fn collect(mut self) -> (Vec<T>, Termination) {
        let mut values = Vec::new();
        while let Some(event) = self.next().await {
            if let Ok(value) = event {
                values.push(value);
            }
        }
        (values, self.termination)
    }

    pub fn termination(&self) -> &Termination {
        &self.termination
    }

    pub fn is_terminated(&self) -> bool {
        !matches!(self.termination, Termination::Pending)
    }

    fn accept(&mut self, item: Option<Item<T>>) -> Option<Result<T, SessionError>> {
        match item {
            Some(Item::Value(value)) => Some(Ok(value)),
            Some(Item::Complete) => {
                self.finish(Termination::Completed);
                None
            }
            Some(Item::Fail(error)) => {
                self.finish(Termination::Failed(error.clone()));
                Some(Err(error))
            }
            None => {
                self.finish(Termination::Abandoned);
                None
            }
        }
    }

    fn finish(&mut self, termination: Termination) {
        self.termination = termination;
        // Late publishes from other clones are refused rather than queued
        self.rx.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendError;

    #[tokio::test]
    async fn test_values_then_completion() {
        let (publisher, mut subscription) = channel::<u32>("test");
        assert!(publisher.send(1));
        assert!(publisher.send(2));
        publisher.complete();

        assert_eq!(subscription.next().await, Some(Ok(1)));
        assert_eq!(subscription.next().await, Some(Ok(2)));
        assert_eq!(subscription.next().await, None);
        assert_eq!(subscription.termination(), &Termination::Completed);
        assert_eq!(subscription.next().await, None);
    }

    #[tokio::test]
    async fn test_failure_is_terminal() {
        let (publisher, mut subscription) = channel::<u32>("test");
        let late = publisher.clone();
        publisher.fail(SessionError::BackendFailure(BackendError::new("lost")));

        let event = subscription.next().await;
        assert!(matches!(event, Some(Err(SessionError::BackendFailure(_)))));
        assert!(!late.send(7));
        assert_eq!(subscription.next().await, None);
        assert!(matches!(subscription.termination(), Termination::Failed(_)));
    }

    #[tokio::test]
    async fn test_dropped_publisher_is_abandoned() {
        let (publisher, subscription) = channel::<u32>("test");
        publisher.send(5);
        drop(publisher);

        let (values, termination) = subscription.collect().await;
        assert_eq!(values, vec![5]);
        assert_eq!(termination, Termination::Abandoned);
    }

    #[test]
    fn test_try_next_pending_when_empty() {
        let (publisher, mut subscription) = channel::<u32>("test");
        assert_eq!(subscription.try_next(), None);
        assert_eq!(subscription.termination(), &Termination::Pending);
        publisher.send(3);
        assert_eq!(subscription.try_next(), Some(Ok(3)));
    }

    #[test]
    fn test_send_without_reader() {
        let (publisher, subscription) = channel::<u32>("test");
        drop(subscription);
        assert!(publisher.is_closed());
        assert!(!publisher.send(1));
    }
}
