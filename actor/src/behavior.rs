// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Behaviors
//!
//! A [`Behavior`] is one named state of an actor. It owns a base handler and
//! the traits mixed into it. The `background` flag only tells the host how to
//! order a state transition: foreground transitions complete their
//! `Deactivate`/`Activate` side effects before the next message, background
//! transitions may still be running. It never changes message admission.
//!

use crate::{
    BroadcastPolicy, Error, Message, Outcome,
    receive::{BoxedReceive, Composed, Composer, Receive, Trait, receive_fn},
};

use tokio::task::JoinHandle;
use tracing::{debug, error};

use std::{collections::BTreeMap, future::Future, sync::Arc};

/// Named actor state.
#[derive(Clone)]
pub struct Behavior {
    name: String,
    receive: BoxedReceive,
    traits: Vec<Trait>,
    background: bool,
}

impl Behavior {
    /// Creates a foreground behavior.
    pub fn new(name: &str, receive: BoxedReceive) -> Self {
        Self {
            name: name.to_owned(),
            receive,
            traits: Vec::new(),
            background: false,
        }
    }

    /// Creates a foreground behavior from an async closure.
    pub fn from_fn<F, Fut>(name: &str, f: F) -> Self
    where
        F: Fn(Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Outcome, Error>> + Send + 'static,
    {
        Self::new(name, receive_fn(f))
    }

    /// Marks the behavior's transitions as background.
    pub fn background(mut self, background: bool) -> Self {
        self.background = background;
        self
    }

    /// Mixes a trait into this behavior.
    pub fn with_trait(mut self, fragment: Trait) -> Self {
        self.traits.push(fragment);
        self
    }

    /// Behavior name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True if transitions to or from this behavior may finish in the
    /// background.
    pub fn is_background(&self) -> bool {
        self.background
    }

    /// Composes the behavior handler with its traits.
    pub fn compose(&self, policy: BroadcastPolicy) -> Result<Composed, Error> {
        Composer::new()
            .base(self.receive.clone())
            .with_traits(self.traits.iter().cloned())
            .policy(policy)
            .build()
    }
}

impl std::fmt::Debug for Behavior {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Behavior")
            .field("name", &self.name)
            .field("traits", &self.traits)
            .field("background", &self.background)
            .finish()
    }
}

/// Declared behaviors of an actor type.
#[derive(Clone, Debug, Default)]
pub struct Behaviors {
    behaviors: BTreeMap<String, Behavior>,
    policy: BroadcastPolicy,
}

impl Behaviors {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a behavior. A later declaration replaces an earlier one with
    /// the same name.
    pub fn with(mut self, behavior: Behavior) -> Self {
        self.behaviors.insert(behavior.name.clone(), behavior);
        self
    }

    /// Lifecycle broadcast policy used by every composed behavior.
    pub fn policy(mut self, policy: BroadcastPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Looks up a behavior.
    pub fn get(&self, name: &str) -> Option<&Behavior> {
        self.behaviors.get(name)
    }

    /// True if the named behavior is declared background. Undeclared
    /// behaviors are foreground.
    pub fn is_background(&self, name: &str) -> bool {
        self.get(name).is_some_and(Behavior::is_background)
    }

    /// Declared names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.behaviors.keys().map(String::as_str)
    }

    /// True if nothing is declared.
    pub fn is_empty(&self) -> bool {
        self.behaviors.is_empty()
    }
}

/// Side effects of a behavior switch.
#[derive(Debug)]
pub enum Transition {
    /// The transition completed before the switch returned.
    Completed,
    /// The transition is still running.
    Background(JoinHandle<Result<(), Error>>),
}

impl Transition {
    /// Waits for the transition side effects.
    pub async fn wait(self) -> Result<(), Error> {
        match self {
            Transition::Completed => Ok(()),
            Transition::Background(handle) => handle
                .await
                .map_err(|e| Error::Functional(e.to_string()))?,
        }
    }

    /// True if the side effects may still be running.
    pub fn is_background(&self) -> bool {
        matches!(self, Transition::Background(_))
    }
}

struct Current {
    name: String,
    handler: Composed,
}

/// Current behavior of one actor instance.
///
/// Switching rebuilds the composed handler of the target behavior, it never
/// mutates a composition in place.
pub struct BehaviorMachine {
    behaviors: Arc<Behaviors>,
    current: Option<Current>,
}

impl BehaviorMachine {
    /// Creates a machine with no behavior selected.
    pub fn new(behaviors: Arc<Behaviors>) -> Self {
        Self {
            behaviors,
            current: None,
        }
    }

    /// Current behavior name.
    pub fn current(&self) -> Option<&str> {
        self.current.as_ref().map(|current| current.name.as_str())
    }

    /// Selects the starting behavior without running lifecycle side effects.
    /// They run when the host delivers `Activate`.
    pub fn initial(&mut self, name: &str) -> Result<(), Error> {
        self.current = Some(self.build(name)?);
        debug!("Initial behavior set to {}.", name);
        Ok(())
    }

    /// Switches the actor to another declared behavior.
    ///
    /// The target behavior is composed again from its base handler and traits,
    /// then the lifecycle side effects run: `Deactivate` goes to the composition
    /// being left, `Activate` to the new one. Switching to the current behavior
    /// is a no-op and sends no lifecycle message.
    ///
    /// How the side effects are ordered depends on the target behavior:
    ///
    /// - **Foreground**: `Deactivate` runs while the old behavior is still
    ///   current. Only when it succeeds is the new behavior swapped in and
    ///   activated, so the switch returns [`Transition::Completed`] with every
    ///   side effect finished.
    /// - **Background**: the new behavior is swapped in at once and both side
    ///   effects run on a spawned task, returned as [`Transition::Background`].
    ///   The next message is routed to the new behavior even if they are still
    ///   running.
    ///
    /// # Arguments
    ///
    /// * `name` - Name of the target behavior.
    ///
    /// # Returns
    ///
    /// Returns the [`Transition`] describing the pending side effects.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownBehavior`] if `name` is not declared. Nothing changes.
    /// - The fault of a foreground `Deactivate`. The old behavior stays current.
    /// - The fault of a foreground `Activate`. The new behavior is current, since
    ///   the old one has already been deactivated.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let mut machine = BehaviorMachine::new(Arc::new(behaviors));
    /// machine.initial("idle")?;
    ///
    /// // Waits for idle's Deactivate and busy's Activate when busy is foreground.
    /// machine.transition("busy").await?.wait().await?;
    /// assert_eq!(machine.current(), Some("busy"));
    /// ```
    ///
    pub async fn transition(&mut self, name: &str) -> Result<Transition, Error> {
        if self.current() == Some(name) {
            debug!("Already in behavior {}.", name);
            return Ok(Transition::Completed);
        }

        let next = self.build(name)?;
        let handler = next.handler.clone();

        if self.behaviors.is_background(name) {
            debug!("Switching to behavior {} in background.", name);
            let previous = self.current.replace(next).map(|current| {
                debug!("Leaving behavior {}.", current.name);
                current.handler
            });
            let effects = async move {
                if let Some(previous) = previous {
                    previous.receive(Message::Deactivate).await?;
                }
                handler.receive(Message::Activate).await?;
                Ok::<(), Error>(())
            };
            return Ok(Transition::Background(tokio::spawn(effects)));
        }

        debug!("Switching to behavior {}.", name);
        if let Some(current) = &self.current {
            debug!("Leaving behavior {}.", current.name);
            if let Err(e) = current.handler.receive(Message::Deactivate).await {
                error!(
                    "Leaving behavior {} failed, staying in it: {}",
                    current.name, e
                );
                return Err(e);
            }
        }

        self.current = Some(next);
        handler
            .receive(Message::Activate)
            .await
            .map(|_| Transition::Completed)
            .inspect_err(|e| {
                error!("Activating behavior {} failed: {}", name, e);
            })
    }

    /// Handles a message with the current behavior.
    pub async fn receive(&self, message: Message) -> Result<Outcome, Error> {
        match &self.current {
            Some(current) => current.handler.receive(message).await,
            None => Err(Error::BehaviorNotSet),
        }
    }

    fn build(&self, name: &str) -> Result<Current, Error> {
        let behavior = self
            .behaviors
            .get(name)
            .ok_or_else(|| Error::UnknownBehavior(name.to_owned()))?;
        Ok(Current {
            name: name.to_owned(),
            handler: behavior.compose(self.behaviors.policy)?,
        })
    }
}
