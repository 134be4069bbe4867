//! Owned engine results.
//!
//! An [`OperationResult`] wraps the `CResult` record returned by the engine
//! together with the engine's free entry point. Releasing is tied to
//! ownership: `release(self)` consumes the value, and dropping an unreleased
//! result releases it, so every record is freed exactly once. The error text
//! is only reachable through a borrow of the result, so it cannot be read
//! after the record is gone.

use std::borrow::Cow;
use std::ffi::CStr;
use std::fmt;
use std::ptr::NonNull;

use crate::abi::{CResult, FreeResultFn};

/// Fallback text when the engine reports failure without a message.
pub const MISSING_ERROR_MESSAGE: &str = "Engine reported a failure without a message";

/// Result of one engine call, freed through the engine on drop.
pub struct OperationResult {
    raw: NonNull<CResult>,
    free: FreeResultFn,
}

impl OperationResult {
    /// Take ownership of a record returned by the engine.
    ///
    /// # Safety
    /// - `raw` must have been returned by the engine's re-encode entry point
    ///   and must not have been freed yet.
    /// - `free` must be the free entry point of that same engine.
    /// - Nobody else may free `raw` afterwards.
    pub unsafe fn from_raw(raw: NonNull<CResult>, free: FreeResultFn) -> Self {
        Self { raw, free }
    }

    fn record(&self) -> &CResult {
        // SAFETY: `raw` stays valid until `Drop` hands it back to the engine.
        unsafe { self.raw.as_ref() }
    }

    /// Whether the engine reported success.
    pub fn is_ok(&self) -> bool {
        self.record().ok
    }

    /// The engine's error text, borrowed from the record.
    ///
    /// Returns `None` on success, or if the engine broke the contract by
    /// returning a failure without a message.
    pub fn error_message(&self) -> Option<&CStr> {
        let record = self.record();
        if record.ok || record.error_message.is_null() {
            return None;
        }
        // SAFETY: non-null and owned by the record we borrow from.
        Some(unsafe { CStr::from_ptr(record.error_message) })
    }

    /// Borrowed view of the outcome, valid until the result is released.
    pub fn outcome(&self) -> EngineOutcome<'_> {
        if self.is_ok() {
            return EngineOutcome::Ok;
        }
        match self.error_message() {
            Some(message) => EngineOutcome::Err(message.to_string_lossy()),
            None => EngineOutcome::Err(Cow::Borrowed(MISSING_ERROR_MESSAGE)),
        }
    }

    /// Copy the outcome out and release the record.
    pub fn into_outcome(self) -> Result<(), String> {
        let outcome = self.outcome().into_owned();
        self.release();
        outcome
    }

    /// Hand the record back to the engine.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for OperationResult {
    fn drop(&mut self) {
        // SAFETY: `from_raw` guarantees the pointer came from this engine and
        // ownership makes this the only free.
        unsafe { (self.free)(self.raw.as_ptr()) };
    }
}

impl fmt::Debug for OperationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationResult")
            .field("ok", &self.is_ok())
            .field("error_message", &self.error_message())
            .finish()
    }
}

/// Borrowed outcome of an engine call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineOutcome<'a> {
    Ok,
    Err(Cow<'a, str>),
}

impl EngineOutcome<'_> {
    /// Detach from the result so it can be released.
    pub fn into_owned(self) -> Result<(), String> {
        match self {
            EngineOutcome::Ok => Ok(()),
            EngineOutcome::Err(message) => Err(message.into_owned()),
        }
    }
}
