// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor reference
//!

use crate::{
    ActorPath, Error, Message, Outcome,
    middleware::MiddlewareChain,
    receive::BoxedReceive,
};

use tracing::debug;

use std::any::Any;

/// Reference used to send messages to an actor through a middleware chain.
///
/// Cloning is cheap: the target handler and the chain are shared.
#[derive(Clone)]
pub struct ActorRef {
    path: ActorPath,
    target: BoxedReceive,
    chain: MiddlewareChain,
}

impl ActorRef {
    /// Creates a reference that sends directly to `target`.
    pub fn new(path: ActorPath, target: BoxedReceive) -> Self {
        Self {
            path,
            target,
            chain: MiddlewareChain::default(),
        }
    }

    /// Replaces the middleware chain.
    pub fn with_middleware(mut self, chain: MiddlewareChain) -> Self {
        self.chain = chain;
        self
    }

    /// Actor path.
    pub fn path(&self) -> &ActorPath {
        &self.path
    }

    /// Sends a message and returns the raw outcome.
    pub async fn send(&self, message: Message) -> Result<Outcome, Error> {
        self.chain
            .send_outcome(&self.path, message, &self.target)
            .await
    }

    /// Sends a payload and waits for a typed result (request-response).
    ///
    /// # Errors
    ///
    /// Returns any fault from the chain or the actor, or
    /// [`Error::ResultType`] if the actor did not answer with an `R`.
    ///
    pub async fn ask<T, R>(&self, payload: T) -> Result<R, Error>
    where
        T: Any + Send + Sync,
        R: Any + Clone + Send + Sync,
    {
        debug!("Asking message to actor {}.", self.path);
        self.chain
            .send::<R>(&self.path, Message::new(payload), &self.target)
            .await
    }

    /// Sends a payload and discards the outcome. Faults are still returned.
    pub async fn tell<T>(&self, payload: T) -> Result<(), Error>
    where
        T: Any + Send + Sync,
    {
        debug!("Telling message to actor {}.", self.path);
        self.send(Message::new(payload)).await.map(|_| ())
    }
}

impl std::fmt::Debug for ActorRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorRef")
            .field("path", &self.path)
            .field("middleware", &self.chain.len())
            .finish()
    }
}
