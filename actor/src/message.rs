// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Messages and results
//!
//! Every handler speaks the same vocabulary: it receives a [`Message`] and
//! answers with an [`Outcome`]. An outcome is either `Handled` with an opaque
//! [`Value`] (which may be "no value") or the `Unhandled` variant. Because the
//! sentinel is an enum variant, no payload can ever be mistaken for it.
//!

use crate::Error;

use std::{
    any::{Any, TypeId, type_name},
    fmt::{Debug, Formatter},
    sync::Arc,
};

/// Opaque, cheaply cloneable payload.
#[derive(Clone)]
pub struct Value {
    inner: Option<Arc<dyn Any + Send + Sync>>,
    type_name: &'static str,
}

impl Value {
    /// Wraps a payload.
    pub fn new<T>(value: T) -> Self
    where
        T: Any + Send + Sync,
    {
        Self {
            inner: Some(Arc::new(value)),
            type_name: type_name::<T>(),
        }
    }

    /// The explicit "no value" payload.
    pub fn none() -> Self {
        Self {
            inner: None,
            type_name: "()",
        }
    }

    /// True for the "no value" payload.
    pub fn is_none(&self) -> bool {
        self.inner.is_none()
    }

    /// Name of the wrapped type.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// True if the payload is a `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.inner.as_ref().is_some_and(|inner| inner.is::<T>())
    }

    /// Borrows the payload as a `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.as_ref().and_then(|inner| inner.downcast_ref::<T>())
    }

    /// Converts the payload into a `T`.
    ///
    /// "No value" converts only to `()`. Any other mismatch is a
    /// [`Error::ResultType`] fault.
    pub fn downcast<T>(self) -> Result<T, Error>
    where
        T: Any + Clone + Send + Sync,
    {
        let mismatch = |found: &str| Error::ResultType {
            expected: type_name::<T>().to_owned(),
            found: found.to_owned(),
        };

        match self.inner {
            None if TypeId::of::<T>() == TypeId::of::<()>() => {
                let unit: Box<dyn Any> = Box::new(());
                unit.downcast::<T>()
                    .map(|value| *value)
                    .map_err(|_| mismatch(self.type_name))
            }
            None => Err(mismatch("no value")),
            Some(inner) => inner
                .downcast::<T>()
                .map(|value| {
                    Arc::try_unwrap(value).unwrap_or_else(|shared| (*shared).clone())
                })
                .map_err(|_| mismatch(self.type_name)),
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::none()
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_none() {
            write!(f, "Value(none)")
        } else {
            write!(f, "Value({})", self.type_name)
        }
    }
}

/// Message delivered to a handler.
///
/// `Activate` and `Deactivate` mark lifecycle transitions and are broadcast to
/// every fragment of a composed handler. Everything else is user traffic.
#[derive(Clone, Debug)]
pub enum Message {
    /// The activation (or behavior) is starting.
    Activate,
    /// The activation (or behavior) is stopping.
    Deactivate,
    /// User traffic.
    User(Value),
}

impl Message {
    /// Wraps a user payload.
    pub fn new<T>(payload: T) -> Self
    where
        T: Any + Send + Sync,
    {
        Message::User(Value::new(payload))
    }

    /// True for `Activate` and `Deactivate`.
    pub fn is_lifecycle(&self) -> bool {
        matches!(self, Message::Activate | Message::Deactivate)
    }

    /// Borrows the user payload as a `T`.
    pub fn payload<T: Any>(&self) -> Option<&T> {
        match self {
            Message::User(value) => value.downcast_ref::<T>(),
            _ => None,
        }
    }
}

/// Result of handling a message.
#[derive(Clone, Debug, Default)]
pub enum Outcome {
    /// The message was claimed. The value may be [`Value::none`].
    Handled(Value),
    /// No fragment claimed the message.
    #[default]
    Unhandled,
}

impl Outcome {
    /// Handled with a payload.
    pub fn handled<T>(value: T) -> Self
    where
        T: Any + Send + Sync,
    {
        Outcome::Handled(Value::new(value))
    }

    /// Handled without a payload.
    pub fn done() -> Self {
        Outcome::Handled(Value::none())
    }

    /// The unhandled sentinel.
    pub fn unhandled() -> Self {
        Outcome::Unhandled
    }

    /// True unless this is the unhandled sentinel.
    pub fn is_handled(&self) -> bool {
        matches!(self, Outcome::Handled(_))
    }

    /// True for the unhandled sentinel.
    pub fn is_unhandled(&self) -> bool {
        matches!(self, Outcome::Unhandled)
    }

    /// Borrows the handled payload.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Outcome::Handled(value) => Some(value),
            Outcome::Unhandled => None,
        }
    }

    /// Converts a handled payload into a `T`. The sentinel never converts.
    pub fn into_result<T>(self) -> Result<T, Error>
    where
        T: Any + Clone + Send + Sync,
    {
        match self {
            Outcome::Handled(value) => value.downcast::<T>(),
            Outcome::Unhandled => Err(Error::ResultType {
                expected: type_name::<T>().to_owned(),
                found: "unhandled".to_owned(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_is_not_unhandled() {
        let outcome = Outcome::done();
        assert!(outcome.is_handled());
        assert!(outcome.value().is_some_and(Value::is_none));

        let outcome = Outcome::handled(Option::<u32>::None);
        assert!(outcome.is_handled());
        assert!(Outcome::unhandled().is_unhandled());
    }

    #[test]
    fn test_downcast() {
        let value = Value::new("y".to_owned());
        assert!(value.is::<String>());
        assert_eq!(value.downcast_ref::<String>().map(String::as_str), Some("y"));
        assert_eq!(value.clone().downcast::<String>().unwrap(), "y");

        let shared = value.clone();
        assert_eq!(shared.downcast::<String>().unwrap(), "y");
        drop(value);
    }

    #[test]
    fn test_downcast_mismatch() {
        let error = Value::new(7u32).downcast::<String>().unwrap_err();
        assert_eq!(
            error,
            Error::ResultType {
                expected: type_name::<String>().to_owned(),
                found: "u32".to_owned(),
            }
        );
        assert!(Value::none().downcast::<u32>().is_err());
        Value::none().downcast::<()>().unwrap();
    }

    #[test]
    fn test_unhandled_into_result() {
        let error = Outcome::Unhandled.into_result::<String>().unwrap_err();
        assert!(matches!(error, Error::ResultType { found, .. } if found == "unhandled"));
        assert_eq!(Outcome::handled(3i64).into_result::<i64>().unwrap(), 3);
    }

    #[test]
    fn test_message_kinds() {
        assert!(Message::Activate.is_lifecycle());
        assert!(Message::Deactivate.is_lifecycle());
        let message = Message::new("foo");
        assert!(!message.is_lifecycle());
        assert_eq!(message.payload::<&str>(), Some(&"foo"));
        assert_eq!(Message::Activate.payload::<&str>(), None);
    }
}
