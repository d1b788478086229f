// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Send middleware
//!
//! Outbound sends go through an immutable chain of [`Middleware`] links that
//! ends in [`DefaultDelivery`]. A link either delegates to [`Next`] or
//! short-circuits with its own outcome or fault. An empty chain behaves
//! exactly like calling the target handler directly.
//!

use crate::{
    ActorPath, Error, Message, Outcome,
    receive::{BoxedReceive, Receive},
};

use async_trait::async_trait;
use tracing::debug;

use std::{any::Any, sync::Arc};

/// Interceptor around an outbound send.
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    /// Intercepts a send to `actor`. The default implementation delegates.
    async fn send(
        &self,
        actor: &ActorPath,
        message: Message,
        sender: &BoxedReceive,
        next: Next<'_>,
    ) -> Result<Outcome, Error> {
        next.send(actor, message, sender).await
    }
}

/// Terminal step of every chain: hands the message to the sender.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultDelivery;

impl DefaultDelivery {
    /// Invokes the sender and returns its outcome unchanged.
    pub async fn deliver(
        &self,
        actor: &ActorPath,
        message: Message,
        sender: &BoxedReceive,
    ) -> Result<Outcome, Error> {
        debug!("Delivering message to {}.", actor);
        sender.receive(message).await
    }
}

/// Remaining links of a chain.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    links: &'a [Arc<dyn Middleware>],
    terminal: &'a DefaultDelivery,
}

impl Next<'_> {
    /// Runs the next link, or the terminal delivery when none is left.
    pub async fn send(
        self,
        actor: &ActorPath,
        message: Message,
        sender: &BoxedReceive,
    ) -> Result<Outcome, Error> {
        match self.links.split_first() {
            Some((link, rest)) => {
                let next = Next {
                    links: rest,
                    terminal: self.terminal,
                };
                link.send(actor, message, sender, next).await
            }
            None => self.terminal.deliver(actor, message, sender).await,
        }
    }
}

/// Builder for a [`MiddlewareChain`].
#[derive(Default)]
pub struct MiddlewareChainBuilder {
    links: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChainBuilder {
    /// Appends a link. The first link added runs first.
    pub fn with(mut self, link: impl Middleware) -> Self {
        self.links.push(Arc::new(link));
        self
    }

    /// Appends a shared link.
    pub fn with_shared(mut self, link: Arc<dyn Middleware>) -> Self {
        self.links.push(link);
        self
    }

    /// Builds the immutable chain.
    pub fn build(self) -> MiddlewareChain {
        debug!("Building middleware chain with {} links.", self.links.len());
        MiddlewareChain {
            links: self.links.into(),
            terminal: DefaultDelivery,
        }
    }
}

/// Immutable middleware chain, shared by every send.
#[derive(Clone)]
pub struct MiddlewareChain {
    links: Arc<[Arc<dyn Middleware>]>,
    terminal: DefaultDelivery,
}

impl Default for MiddlewareChain {
    fn default() -> Self {
        MiddlewareChainBuilder::default().build()
    }
}

impl MiddlewareChain {
    /// Starts building a chain.
    pub fn builder() -> MiddlewareChainBuilder {
        MiddlewareChainBuilder::default()
    }

    /// Number of links, the terminal excluded.
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// True if sends go straight to the terminal delivery.
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Sends through the chain and returns the raw outcome.
    pub async fn send_outcome(
        &self,
        actor: &ActorPath,
        message: Message,
        sender: &BoxedReceive,
    ) -> Result<Outcome, Error> {
        let next = Next {
            links: &self.links,
            terminal: &self.terminal,
        };
        next.send(actor, message, sender).await
    }

    /// Sends through the chain and converts the outcome to `R`.
    ///
    /// Links run in the order they were added, each deciding whether to call
    /// the rest of the chain. The terminal step delivers the message to
    /// `sender`. The conversion happens once the chain returns.
    ///
    /// # Arguments
    ///
    /// * `actor` - Path of the destination actor.
    /// * `message` - The message to send.
    /// * `sender` - Handler of the destination actor.
    ///
    /// # Returns
    ///
    /// Returns the handled value as `R`.
    ///
    /// # Errors
    ///
    /// Faults from any link or the sender are returned unchanged. An
    /// `Unhandled` outcome, or a handled value that is not an `R`, is an
    /// [`Error::ResultType`] fault.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let chain = MiddlewareChain::builder().with(Logging).build();
    /// let path = ActorPath::from("/user/counter");
    ///
    /// let total: u64 = chain.send(&path, Message::new(Add(2)), &counter).await?;
    /// ```
    ///
    pub async fn send<R>(
        &self,
        actor: &ActorPath,
        message: Message,
        sender: &BoxedReceive,
    ) -> Result<R, Error>
    where
        R: Any + Clone + Send + Sync,
    {
        self.send_outcome(actor, message, sender)
            .await?
            .into_result::<R>()
    }
}
