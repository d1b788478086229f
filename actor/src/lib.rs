// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Rush Dispatch
//!
//! The message-handling core of an actor activation: how a handler is assembled
//! from reusable traits and named behaviors, how lifecycle messages fan out
//! through that assembly, whether two invocations on the same activation may
//! interleave, and how outbound sends are intercepted by a middleware chain.
//!
//! The host (placement, mailboxes, turn scheduling, transport) is not part of
//! this crate. It consumes three things from it:
//!
//! - a composed [`Receive`] per actor instance, invoked once per admitted message,
//! - a [`ReentrancyDecision`] per actor type, consulted before admitting an invocation,
//! - [`Behaviors::is_background`], consulted when scheduling a behavior switch.
//!
//! ## Handlers and traits
//!
//! Every piece of handling logic is a [`Receive`]: an async function from
//! [`Message`] to [`Outcome`]. `Outcome::Unhandled` means "not mine" and is not
//! an error; faults travel as [`Error`] and are never turned into `Unhandled`.
//!
//! ```ignore
//! use actor::{Composer, Message, Outcome, Trait, receive_fn};
//!
//! let base = receive_fn(|message| async move {
//!     match message.payload::<Ping>() {
//!         Some(_) => Ok(Outcome::handled(Pong)),
//!         None => Ok(Outcome::Unhandled),
//!     }
//! });
//!
//! let handler = Composer::new()
//!     .base(base)
//!     .with_trait(Trait::from_fn("health", health_check))
//!     .with_trait(Trait::from_fn("metrics", metrics))
//!     .build()?;
//!
//! // User messages: base, then health, then metrics; first Handled wins.
//! // Activate/Deactivate: metrics, health, base; all of them run.
//! let outcome = handler.receive(Message::new(Ping)).await?;
//! ```
//!
//! ## Reentrancy
//!
//! ```ignore
//! use actor::{ActorDeclaration, ActorType, Invocation, reentrancy_decision};
//!
//! struct Account;
//!
//! impl ActorType for Account {
//!     fn declare() -> ActorDeclaration {
//!         ActorDeclaration::of::<Account>()
//!             .may_interleave_with("is_query", |req: &Invocation| req.method() == "balance")
//!     }
//! }
//!
//! let decision = reentrancy_decision::<Account>()?;
//! if decision.admits(&invocation) {
//!     // run concurrently with the invocation in flight
//! }
//! ```
//!
//! ## Middleware
//!
//! ```ignore
//! use actor::{ActorPath, ActorRef, MiddlewareChain};
//!
//! let chain = MiddlewareChain::builder().with(Tracing).with(Auth).build();
//! let account = ActorRef::new(ActorPath::from("/user/account"), handler)
//!     .with_middleware(chain);
//! let balance: u64 = account.ask(Balance).await?;
//! ```
//!

mod behavior;
mod error;
mod message;
mod middleware;
mod path;
mod receive;
mod reentrancy;
mod reference;

//
// Result contract
//

/// Message delivered to a handler, lifecycle markers included.
pub use message::Message;

/// Result of handling a message: `Handled(value)` or the `Unhandled` sentinel.
pub use message::Outcome;

/// Opaque payload carried by messages and outcomes.
pub use message::Value;

//
// Handlers and composition
//

pub use receive::{
    BoxedReceive, BroadcastPolicy, Composed, Composer, FnReceive, Receive,
    ReceiveExt, Trait, receive_fn,
};

//
// Behaviors
//

pub use behavior::{Behavior, BehaviorMachine, Behaviors, Transition};

//
// Reentrancy
//

/// Declarative configuration of an actor type, markers and callback methods.
pub use reentrancy::ActorDeclaration;

/// Actor type with a static declaration.
pub use reentrancy::ActorType;

pub use reentrancy::{
    InterleavePredicate, IntoMethod, Invocation, Marker, Method,
    ReentrancyCache, ReentrancyDecision, reentrancy_decision, resolve,
};

//
// Sending
//

pub use middleware::{
    DefaultDelivery, Middleware, MiddlewareChain, MiddlewareChainBuilder, Next,
};

/// Reference used to send messages to an actor through its middleware chain.
pub use reference::ActorRef;

/// Hierarchical actor path, the destination identity of a send.
pub use path::ActorPath;

//
// Error handling
//

/// Error type for configuration errors and runtime faults.
pub use error::Error;
