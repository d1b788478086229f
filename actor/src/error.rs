// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Errors module
//!

use crate::ActorPath;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for the dispatch engine.
///
/// Configuration errors are raised once, when an actor type is resolved, and
/// make that type unusable. Every other variant is a runtime fault that is
/// propagated unchanged to the caller. `Unhandled` is never an error.
#[derive(Clone, Debug, Error, PartialEq, Serialize, Deserialize)]
pub enum Error {
    /// The actor declares both full and conditional reentrancy.
    #[error(
        "'{0}' actor can be only designated either as fully reentrant or partially reentrant. Choose one of the approaches."
    )]
    ConflictingReentrancy(String),
    /// The interleave callback named by the marker is not declared.
    #[error(
        "Actor {actor} doesn't declare a callback method with name {callback}."
    )]
    CallbackNotFound {
        /// Actor type name.
        actor: String,
        /// Callback name.
        callback: String,
    },
    /// The interleave callback does not return `bool`.
    #[error(
        "Wrong return type of callback method {callback} for actor {actor}: expected bool, found {found}."
    )]
    CallbackReturnType {
        /// Actor type name.
        actor: String,
        /// Callback name.
        callback: String,
        /// Declared return type.
        found: String,
    },
    /// The interleave callback does not take exactly one invocation.
    #[error(
        "Wrong parameters of callback method {callback} for actor {actor}: expected ({expected}), found ({found})."
    )]
    CallbackParameters {
        /// Actor type name.
        actor: String,
        /// Callback name.
        callback: String,
        /// Expected parameter list.
        expected: String,
        /// Declared parameter list.
        found: String,
    },
    /// A handler composition was built without a base handler.
    #[error("A composed handler requires a base handler.")]
    MissingBase,
    /// The behavior is not declared.
    #[error("Behavior {0} is not declared.")]
    UnknownBehavior(String),
    /// A message arrived before an initial behavior was selected.
    #[error("Initial behavior has not been specified.")]
    BehaviorNotSet,
    /// A result could not be converted to the type the caller expected.
    #[error("Unexpected result type: expected {expected}, found {found}.")]
    ResultType {
        /// Expected type name.
        expected: String,
        /// What was actually returned.
        found: String,
    },
    /// An error occurred while sending a message to an actor.
    #[error("An error occurred while sending a message to actor {0}: {1}.")]
    Send(ActorPath, String),
    /// Fault raised by a handler, trait or middleware.
    #[error("Error: {0}")]
    Functional(String),
}

impl Error {
    /// True for errors detected while resolving an actor type.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::ConflictingReentrancy(_)
                | Error::CallbackNotFound { .. }
                | Error::CallbackReturnType { .. }
                | Error::CallbackParameters { .. }
        )
    }
}
