// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Receive and trait composition
//!
//! [`Receive`] is the single contract shared by base handlers, traits and
//! behaviors. A [`Composer`] folds a base handler and an ordered list of
//! [`Trait`]s into one [`Composed`] handler:
//!
//! - User messages fall through: the base runs first, then each trait in
//!   declaration order, and the first `Handled` outcome wins.
//! - `Activate` and `Deactivate` are broadcast: every trait runs in reverse
//!   declaration order, then the base. The base outcome is returned.
//!
//! Fragments always run one after another, never concurrently.
//!

use crate::{Error, Message, Outcome};

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use std::{future::Future, sync::Arc};

/// Asynchronous message handler.
#[async_trait]
pub trait Receive: Send + Sync + 'static {
    /// Handles a message. Returning [`Outcome::Unhandled`] is not a fault.
    async fn receive(&self, message: Message) -> Result<Outcome, Error>;
}

/// Shared handler reference.
pub type BoxedReceive = Arc<dyn Receive>;

/// Adapter turning an async closure into a [`Receive`].
pub struct FnReceive<F> {
    inner: F,
}

#[async_trait]
impl<F> Receive for FnReceive<F>
where
    F: Fn(Message) -> BoxFuture<'static, Result<Outcome, Error>>
        + Send
        + Sync
        + 'static,
{
    async fn receive(&self, message: Message) -> Result<Outcome, Error> {
        (self.inner)(message).await
    }
}

/// Builds a shared handler from an async closure.
pub fn receive_fn<F, Fut>(f: F) -> BoxedReceive
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Outcome, Error>> + Send + 'static,
{
    let inner = move |message: Message| -> BoxFuture<'static, Result<Outcome, Error>> {
        Box::pin(f(message))
    };
    Arc::new(FnReceive { inner })
}

/// Named handler fragment mixed into one or more behaviors.
#[derive(Clone)]
pub struct Trait {
    name: String,
    receive: BoxedReceive,
}

impl Trait {
    /// Creates a trait from a shared handler.
    pub fn new(name: &str, receive: BoxedReceive) -> Self {
        Self {
            name: name.to_owned(),
            receive,
        }
    }

    /// Creates a trait from an async closure.
    pub fn from_fn<F, Fut>(name: &str, f: F) -> Self
    where
        F: Fn(Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Outcome, Error>> + Send + 'static,
    {
        Self::new(name, receive_fn(f))
    }

    /// Trait name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for Trait {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Trait").field(&self.name).finish()
    }
}

/// What a lifecycle broadcast does when a fragment faults.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize,
)]
pub enum BroadcastPolicy {
    /// Stop the broadcast and propagate the fault.
    #[default]
    AbortOnFault,
    /// Run every fragment, then propagate the first fault.
    RunAll,
}

/// Builder for a [`Composed`] handler.
#[derive(Default)]
pub struct Composer {
    base: Option<BoxedReceive>,
    traits: Vec<Trait>,
    policy: BroadcastPolicy,
}

impl Composer {
    /// Creates an empty composer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base handler.
    pub fn base(mut self, base: BoxedReceive) -> Self {
        self.base = Some(base);
        self
    }

    /// Appends a trait. Declaration order is preserved.
    pub fn with_trait(mut self, fragment: Trait) -> Self {
        self.traits.push(fragment);
        self
    }

    /// Appends several traits in order.
    pub fn with_traits<I>(mut self, traits: I) -> Self
    where
        I: IntoIterator<Item = Trait>,
    {
        self.traits.extend(traits);
        self
    }

    /// Sets the lifecycle broadcast policy.
    pub fn policy(mut self, policy: BroadcastPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Builds the composed handler.
    ///
    /// The traits keep the order they were added in. User messages try the
    /// base and then each trait in that order, lifecycle messages reach every
    /// trait in reverse order and then the base.
    ///
    /// # Returns
    ///
    /// Returns the immutable [`Composed`] handler.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingBase`] if no base handler was supplied.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let composed = Composer::new()
    ///     .base(receive_fn(|_| async { Ok(Outcome::Unhandled) }))
    ///     .with_trait(Trait::from_fn("ping", |_| async { Ok(Outcome::handled("pong")) }))
    ///     .build()?;
    ///
    /// let pong: &str = composed.receive(Message::new("ping")).await?.into_result()?;
    /// ```
    ///
    pub fn build(self) -> Result<Composed, Error> {
        let Some(base) = self.base else {
            error!("Cannot compose handler without a base handler.");
            return Err(Error::MissingBase);
        };
        debug!("Composing handler with {} traits.", self.traits.len());
        Ok(Composed {
            base,
            traits: self.traits.into(),
            policy: self.policy,
        })
    }
}

/// Handler made of a base and an ordered list of traits. Immutable once built.
#[derive(Clone)]
pub struct Composed {
    base: BoxedReceive,
    traits: Arc<[Trait]>,
    policy: BroadcastPolicy,
}

impl Composed {
    /// Trait names in declaration order.
    pub fn trait_names(&self) -> Vec<&str> {
        self.traits.iter().map(Trait::name).collect()
    }

    /// Lifecycle broadcast policy.
    pub fn policy(&self) -> BroadcastPolicy {
        self.policy
    }

    async fn fall_through(&self, message: Message) -> Result<Outcome, Error> {
        let outcome = self.base.receive(message.clone()).await?;
        if outcome.is_handled() {
            return Ok(outcome);
        }

        for fragment in self.traits.iter() {
            let outcome = fragment.receive.receive(message.clone()).await?;
            if outcome.is_handled() {
                debug!("Message handled by trait {}.", fragment.name);
                return Ok(outcome);
            }
        }

        Ok(Outcome::Unhandled)
    }

    async fn broadcast(&self, message: Message) -> Result<Outcome, Error> {
        let mut fault: Option<Error> = None;

        for fragment in self.traits.iter().rev() {
            if let Err(e) = fragment.receive.receive(message.clone()).await {
                match self.policy {
                    BroadcastPolicy::AbortOnFault => {
                        error!(
                            "Trait {} failed on {:?}, aborting broadcast: {}",
                            fragment.name, message, e
                        );
                        return Err(e);
                    }
                    BroadcastPolicy::RunAll => {
                        warn!(
                            "Trait {} failed on {:?}: {}",
                            fragment.name, message, e
                        );
                        fault.get_or_insert(e);
                    }
                }
            }
        }

        let outcome = self.base.receive(message).await;
        match fault {
            Some(e) => Err(e),
            None => outcome,
        }
    }
}

#[async_trait]
impl Receive for Composed {
    async fn receive(&self, message: Message) -> Result<Outcome, Error> {
        if message.is_lifecycle() {
            self.broadcast(message).await
        } else {
            self.fall_through(message).await
        }
    }
}

/// Composition shorthand for an existing base handler.
pub trait ReceiveExt {
    /// Composes `self` as the base with the given traits.
    fn with_traits<I>(self, traits: I) -> Composed
    where
        I: IntoIterator<Item = Trait>;
}

impl ReceiveExt for BoxedReceive {
    fn with_traits<I>(self, traits: I) -> Composed
    where
        I: IntoIterator<Item = Trait>,
    {
        Composed {
            base: self,
            traits: traits.into_iter().collect::<Vec<_>>().into(),
            policy: BroadcastPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;
    use tracing_test::traced_test;

    type Events = Arc<Mutex<Vec<String>>>;

    fn recording(
        events: &Events,
        name: &'static str,
        outcome: fn() -> Result<Outcome, Error>,
    ) -> BoxedReceive {
        let events = events.clone();
        receive_fn(move |_message| {
            events.lock().unwrap().push(name.to_owned());
            std::future::ready(outcome())
        })
    }

    fn log(events: &Events) -> Vec<String> {
        events.lock().unwrap().clone()
    }

    #[test]
    #[traced_test]
    fn test_missing_base() {
        let result = Composer::new()
            .with_trait(Trait::from_fn("x", |_| async { Ok(Outcome::Unhandled) }))
            .build();
        assert!(matches!(result, Err(Error::MissingBase)));
        assert!(logs_contain("Cannot compose handler without a base handler."));
    }

    #[tokio::test]
    async fn test_base_without_traits() {
        let events = Events::default();
        let composed = Composer::new()
            .base(recording(&events, "base", || Ok(Outcome::unhandled())))
            .build()
            .unwrap();
        let outcome = composed.receive(Message::new(1u8)).await.unwrap();
        assert!(outcome.is_unhandled());
        assert_eq!(log(&events), vec!["base"]);
    }

    #[tokio::test]
    async fn test_first_handling_trait_wins() {
        let events = Events::default();
        let composed = recording(&events, "base", || Ok(Outcome::Unhandled))
            .with_traits([
                Trait::new("x", recording(&events, "x", || Ok(Outcome::handled("x")))),
                Trait::new("y", recording(&events, "y", || Ok(Outcome::handled("y")))),
            ]);
        assert_eq!(composed.trait_names(), vec!["x", "y"]);

        let outcome = composed.receive(Message::new("foo")).await.unwrap();
        assert_eq!(outcome.into_result::<&str>().unwrap(), "x");
        assert_eq!(log(&events), vec!["base", "x"]);
    }

    #[tokio::test]
    async fn test_fault_is_not_unhandled() {
        let events = Events::default();
        let composed = recording(&events, "base", || Ok(Outcome::Unhandled))
            .with_traits([
                Trait::new("x", recording(&events, "x", || {
                    Err(Error::Functional("x failed".to_owned()))
                })),
                Trait::new("y", recording(&events, "y", || Ok(Outcome::done()))),
            ]);

        let error = composed.receive(Message::new("foo")).await.unwrap_err();
        assert_eq!(error, Error::Functional("x failed".to_owned()));
        assert_eq!(log(&events), vec!["base", "x"]);
    }

    #[tokio::test]
    async fn test_broadcast_aborts_on_fault() {
        let events = Events::default();
        let composed = Composer::new()
            .base(recording(&events, "base", || Ok(Outcome::done())))
            .with_traits([
                Trait::new("x", recording(&events, "x", || Ok(Outcome::done()))),
                Trait::new("y", recording(&events, "y", || {
                    Err(Error::Functional("y failed".to_owned()))
                })),
            ])
            .build()
            .unwrap();
        assert_eq!(composed.policy(), BroadcastPolicy::AbortOnFault);

        let error = composed.receive(Message::Activate).await.unwrap_err();
        assert_eq!(error, Error::Functional("y failed".to_owned()));
        assert_eq!(log(&events), vec!["y"]);
    }

    #[tokio::test]
    async fn test_broadcast_run_all_returns_first_fault() {
        let events = Events::default();
        let composed = Composer::new()
            .base(recording(&events, "base", || {
                Err(Error::Functional("base failed".to_owned()))
            }))
            .with_traits([
                Trait::new("x", recording(&events, "x", || {
                    Err(Error::Functional("x failed".to_owned()))
                })),
                Trait::new("y", recording(&events, "y", || {
                    Err(Error::Functional("y failed".to_owned()))
                })),
            ])
            .policy(BroadcastPolicy::RunAll)
            .build()
            .unwrap();

        let error = composed.receive(Message::Deactivate).await.unwrap_err();
        assert_eq!(error, Error::Functional("y failed".to_owned()));
        assert_eq!(log(&events), vec!["y", "x", "base"]);
    }

    #[test]
    fn test_policy_serialization() {
        for policy in [BroadcastPolicy::AbortOnFault, BroadcastPolicy::RunAll] {
            let bytes = bincode::serialize(&policy).unwrap();
            let decoded: BroadcastPolicy = bincode::deserialize(&bytes).unwrap();
            assert_eq!(decoded, policy);
        }
        assert_eq!(BroadcastPolicy::default(), BroadcastPolicy::AbortOnFault);
    }

    #[tokio::test]
    async fn test_broadcast_returns_base_outcome() {
        let events = Events::default();
        let composed = recording(&events, "base", || Ok(Outcome::handled(42u32)))
            .with_traits([Trait::new(
                "x",
                recording(&events, "x", || Ok(Outcome::handled(7u32))),
            )]);

        let outcome = composed.receive(Message::Activate).await.unwrap();
        assert_eq!(outcome.into_result::<u32>().unwrap(), 42);
        assert_eq!(log(&events), vec!["x", "base"]);
    }
}
