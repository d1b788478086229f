

//! Core library for the Rush dispatch engine.
//! Provides the message-handling surface of an actor activation: trait and behavior
//! composition, reentrancy policy resolution and send middleware.
//! Hosting concerns (placement, mailboxes, transport, persistence) live outside this crate.

pub use actor::{
    ActorDeclaration, ActorPath, ActorRef, ActorType, Behavior, BehaviorMachine,
    Behaviors, BoxedReceive, BroadcastPolicy, Composed, Composer,
    DefaultDelivery, Error as ActorError, InterleavePredicate, Invocation,
    Marker, Message, Middleware, MiddlewareChain, Next, Outcome, Receive,
    ReceiveExt, ReentrancyCache, ReentrancyDecision, Trait, Transition, Value,
    reentrancy_decision, receive_fn, resolve,
};
