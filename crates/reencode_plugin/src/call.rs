//! Promise-style plugin calls.
//!
//! A [`PluginCall`] carries the method name and JSON options in, and is
//! answered exactly once with [`PluginCall::resolve`] or
//! [`PluginCall::reject`]. The caller keeps the [`CallHandle`] and waits on
//! it or awaits it. Dropping an unanswered call rejects it.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use serde_json::Value;
use tokio::sync::oneshot;

use crate::errors::PluginError;

/// What a call settled with: `Ok(payload)` or `Err(message)`.
///
/// Calls resolved without data carry `Value::Null`.
pub type CallResult = Result<Value, String>;

/// One inbound call, answered exactly once.
#[derive(Debug)]
pub struct PluginCall {
    method: String,
    options: Value,
    tx: Option<oneshot::Sender<CallResult>>,
}

impl PluginCall {
    pub fn new(method: impl Into<String>, options: Value) -> (Self, CallHandle) {
        let (tx, rx) = oneshot::channel();
        let call = Self {
            method: method.into(),
            options,
            tx: Some(tx),
        };
        (call, CallHandle { rx })
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn options(&self) -> &Value {
        &self.options
    }

    pub fn resolve(mut self, data: Value) {
        self.settle(Ok(data));
    }

    pub fn resolve_empty(self) {
        self.resolve(Value::Null);
    }

    pub fn reject(mut self, message: impl Into<String>) {
        self.settle(Err(message.into()));
    }

    pub fn reject_with(self, error: &PluginError) {
        tracing::debug!(method = %self.method, "Rejecting call: {}", error);
        self.reject(error.to_string());
    }

    fn settle(&mut self, result: CallResult) {
        if let Some(tx) = self.tx.take() {
            // The caller may have stopped listening; nothing to do then
            let _ = tx.send(result);
        }
    }
}

impl Drop for PluginCall {
    fn drop(&mut self) {
        if self.tx.is_some() {
            tracing::warn!(method = %self.method, "Call dropped without a response");
            self.settle(Err(PluginError::Unanswered.to_string()));
        }
    }
}

/// Caller side of a [`PluginCall`].
#[derive(Debug)]
pub struct CallHandle {
    rx: oneshot::Receiver<CallResult>,
}

impl CallHandle {
    /// Block until the call is answered.
    ///
    /// # Panics
    /// Panics if called from within an async runtime; await instead.
    pub fn wait(self) -> CallResult {
        self.rx
            .blocking_recv()
            .unwrap_or_else(|_| Err(PluginError::Unanswered.to_string()))
    }

    /// The answer, if the call has already been settled.
    pub fn try_result(&mut self) -> Option<CallResult> {
        self.rx.try_recv().ok()
    }
}

impl Future for CallHandle {
    type Output = CallResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(PluginError::Unanswered.to_string())))
    }
}
