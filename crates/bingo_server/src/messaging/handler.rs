//! Operation handler abstraction.
//!
//! Sessions store handlers behind the object-safe [`OperationHandler`] trait.
//! Most code never implements it directly and instead registers a closure
//! through [`Session::register_operation`](crate::Session::register_operation),
//! which wraps it in a [`TypedOperationHandler`] that deserializes the payload
//! into the closure's request type first.

use crate::{connection::Session, error::OperationError, messaging::Payload};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// Handler trait for processing one operation asynchronously.
#[async_trait]
pub trait OperationHandler: Send + Sync + 'static {
    /// Handles one invocation of the operation.
    ///
    /// Errors are not caught by the dispatcher; they reach the connection
    /// task, which terminates the transport.
    async fn handle(&self, session: Arc<Session>, payload: Payload) -> Result<(), OperationError>;

    /// Returns a human-readable name for this handler for debugging.
    fn handler_name(&self) -> &str;
}

/// Type-safe wrapper bridging a closure over a request type `T` to
/// [`OperationHandler`].
///
/// A payload that does not deserialize into `T` fails the call with
/// [`OperationError::InvalidPayload`].
pub struct TypedOperationHandler<T, F> {
    handler: F,
    name: String,
    _phantom: PhantomData<fn() -> T>,
}

impl<T, F> TypedOperationHandler<T, F> {
    pub fn new(name: impl Into<String>, handler: F) -> Self {
        Self {
            handler,
            name: name.into(),
            _phantom: PhantomData,
        }
    }
}

impl<T, F> std::fmt::Debug for TypedOperationHandler<T, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypedOperationHandler")
            .field("name", &self.name)
            .finish()
    }
}

#[async_trait]
impl<T, F, Fut> OperationHandler for TypedOperationHandler<T, F>
where
    T: DeserializeOwned + Send + 'static,
    F: Fn(Arc<Session>, T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), OperationError>> + Send + 'static,
{
    async fn handle(&self, session: Arc<Session>, payload: Payload) -> Result<(), OperationError> {
        let request: T = serde_json::from_value(Value::Object(payload))?;
        (self.handler)(session, request).await
    }

    fn handler_name(&self) -> &str {
        &self.name
    }
}

/// Request type for operations that take no payload.
///
/// Accepts any object, ignoring its fields.
#[derive(Debug, Clone, Copy, Default, serde::Deserialize)]
pub struct NoPayload {}
