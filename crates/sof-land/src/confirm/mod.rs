//! Single-transaction confirmation with rebroadcast-until-terminal semantics.

/// Post-timeout simulation diagnosis.
mod diagnose;
/// Confirmation engine implementation.
mod engine;
#[cfg(test)]
/// Confirmation module unit tests.
mod tests;
/// Confirmation tuning, observer hooks, and errors.
mod types;

pub use engine::ConfirmationEngine;
pub use types::{
    BlockWaitError, ConfirmConfig, ConfirmationError, ConfirmationObserver, NoopObserver,
};
