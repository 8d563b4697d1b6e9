//! Single-settlement requests
//!
//! Every unit of blocking storage work is issued as a [`Request`] whose
//! [`Completion`] is settled exactly once: `succeed` and `fail` consume it,
//! and a completion dropped unsettled resolves the request as aborted.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::{ConnectionError, TransactionError};

/// Errors that can describe a request whose completion vanished.
pub trait Abort {
    fn aborted(what: &str) -> Self;
}

impl Abort for ConnectionError {
    fn aborted(what: &str) -> Self {
        ConnectionError::Aborted(what.to_string())
    }
}

impl Abort for TransactionError {
    fn aborted(what: &str) -> Self {
        TransactionError::Aborted(what.to_string())
    }
}

/// Settling side of a request.
pub struct Completion<T, E> {
    tx: oneshot::Sender<Result<T, E>>,
}

impl<T, E> Completion<T, E> {
    pub fn succeed(self, value: T) {
        self.settle(Ok(value));
    }

    pub fn fail(self, error: E) {
        self.settle(Err(error));
    }

    pub fn settle(self, result: Result<T, E>) {
        // The caller may have stopped waiting; the work still ran to completion.
        let _ = self.tx.send(result);
    }
}

/// Awaiting side of a request. Resolves once, with the settled result.
pub struct Request<T, E> {
    rx: oneshot::Receiver<Result<T, E>>,
    what: &'static str,
}

impl<T, E: Abort> Future for Request<T, E> {
    type Output = Result<T, E>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let what = self.what;
        Pin::new(&mut self.rx).poll(cx).map(|settled| match settled {
            Ok(result) => result,
            Err(_) => Err(E::aborted(what)),
        })
    }
}

pub fn channel<T, E>(what: &'static str) -> (Completion<T, E>, Request<T, E>) {
    let (tx, rx) = oneshot::channel();
    (Completion { tx }, Request { rx, what })
}

/// Run `work` on the blocking pool and hand back its request.
pub fn spawn<T, E, F>(what: &'static str, work: F) -> Request<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
    F: FnOnce() -> Result<T, E> + Send + 'static,
{
    let (completion, request) = channel(what);
    tokio::task::spawn_blocking(move || completion.settle(work()));
    request
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_success_settles_once() {
        let (completion, request) = channel::<u32, TransactionError>("test");
        completion.succeed(7);
        assert_eq!(request.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_failure_is_typed() {
        let (completion, request) = channel::<u32, TransactionError>("test");
        completion.fail(TransactionError::StoreNotFound("books".to_string()));
        assert!(matches!(
            request.await,
            Err(TransactionError::StoreNotFound(name)) if name == "books"
        ));
    }

    #[tokio::test]
    async fn test_dropped_completion_aborts() {
        let (completion, request) = channel::<u32, ConnectionError>("open");
        drop(completion);
        assert!(matches!(request.await, Err(ConnectionError::Aborted(what)) if what == "open"));
    }

    #[tokio::test]
    async fn test_spawned_work_resolves() {
        let request = spawn::<_, TransactionError, _>("add", || Ok(1 + 1));
        assert_eq!(request.await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_panicking_work_aborts() {
        let request = spawn::<u32, TransactionError, _>("add", || panic!("engine crashed"));
        assert!(matches!(request.await, Err(TransactionError::Aborted(_))));
    }
}
