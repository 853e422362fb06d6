//! Transport trait and response stream.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures_core::Stream;

use crate::types::{Operation, Response};
use crate::Result;

/// A stream of responses for one operation.
///
/// Request/response transports yield a single item then end. Subscriptions
/// yield until the server completes them, the transport is closed, or the
/// stream is dropped.
pub struct ResponseStream {
    inner: Pin<Box<dyn Stream<Item = Result<Response>> + Send>>,
}

impl ResponseStream {
    /// Create a new stream from an async stream.
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Response>> + Send + 'static,
    {
        Self {
            inner: Box::pin(stream),
        }
    }

    /// A stream yielding exactly one item.
    pub fn once(item: Result<Response>) -> Self {
        Self::new(Once(Some(item)))
    }
}

impl Stream for ResponseStream {
    type Item = Result<Response>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl fmt::Debug for ResponseStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseStream").finish_non_exhaustive()
    }
}

struct Once(Option<Result<Response>>);

impl Stream for Once {
    type Item = Result<Response>;

    fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Poll::Ready(self.0.take())
    }
}

/// A transport that executes GraphQL operations.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name used in logs ("http", "stream").
    fn name(&self) -> &'static str;

    /// Execute an operation.
    async fn execute(&self, operation: Operation) -> Result<ResponseStream>;
}
