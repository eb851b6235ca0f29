//! Core types and error definitions for the Ensemble orchestration engine.
//!
//! This crate provides the pieces shared by every Ensemble crate: the error
//! taxonomy and the publish/subscribe capability used to hand tasks to
//! agents.
//!
//! # Main types
//!
//! - [`EnsembleError`]: Unified error enum.
//! - [`EnsembleResult`]: Convenience alias for `Result<T, EnsembleError>`.
//! - [`MessageBus`]: Publish/subscribe transport trait.
//! - [`InMemoryBus`]: Process-local [`MessageBus`] implementation.

/// Message-bus capability and the in-memory implementation.
pub mod bus;
/// Error taxonomy.
pub mod error;

pub use bus::{agent_task_subject, BusMessage, InMemoryBus, MessageBus, MessageHandler};
pub use error::{EnsembleError, EnsembleResult};
