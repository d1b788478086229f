// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Reentrancy policy
//!
//! Each actor type declares at most one reentrancy strategy through its
//! [`ActorDeclaration`]:
//!
//! - nothing: the host serializes every invocation,
//! - [`Marker::Reentrant`]: the host may interleave any two invocations,
//! - [`Marker::MayInterleave`]: a callback method, registered on the
//!   declaration under the marker's name, decides per invocation.
//!
//! [`resolve`] turns a declaration into a [`ReentrancyDecision`] once, binding
//! the callback to a typed predicate. [`ReentrancyCache`] keeps one decision
//! per actor type for the lifetime of the process.
//!

use crate::{Error, Message};

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use std::{
    any::{Any, TypeId, type_name},
    collections::{BTreeMap, HashMap},
    fmt::{Debug, Formatter},
    sync::{
        Arc, OnceLock, PoisonError, RwLock,
        atomic::{AtomicUsize, Ordering},
    },
};

/// Descriptor of a pending invocation, handed opaquely to interleave
/// predicates.
#[derive(Clone, Debug)]
pub struct Invocation {
    method: String,
    message: Message,
}

impl Invocation {
    /// Creates a descriptor.
    pub fn new(method: &str, message: Message) -> Self {
        Self {
            method: method.to_owned(),
            message,
        }
    }

    /// Invoked method name.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Invocation argument.
    pub fn message(&self) -> &Message {
        &self.message
    }
}

/// Declarative reentrancy marker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Marker {
    /// Any two invocations may interleave.
    Reentrant,
    /// The named callback decides per invocation.
    MayInterleave {
        /// Callback method name.
        callback: String,
    },
}

/// Type signature element: id plus readable name.
#[derive(Clone, Copy)]
struct TypeSlot {
    id: TypeId,
    name: &'static str,
}

impl TypeSlot {
    fn of<T: Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }
}

/// Callback method declared on an actor type.
///
/// The signature is kept next to the type-erased body so resolution can
/// report exactly what is wrong with a callback.
#[derive(Clone)]
pub struct Method {
    name: String,
    returns: TypeSlot,
    params: Vec<TypeSlot>,
    body: Arc<dyn Any + Send + Sync>,
}

impl Method {
    /// Method name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return type name.
    pub fn return_type(&self) -> &'static str {
        self.returns.name
    }

    /// Parameter type names.
    pub fn parameter_types(&self) -> Vec<&'static str> {
        self.params.iter().map(|param| param.name).collect()
    }

    fn signature(&self) -> String {
        self.parameter_types().join(", ")
    }
}

impl Debug for Method {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "fn {}({}) -> {}",
            self.name,
            self.signature(),
            self.returns.name
        )
    }
}

/// Conversion of a function into a [`Method`]. Parameters are taken by
/// reference.
pub trait IntoMethod<Args> {
    /// Wraps the function under `name`.
    fn into_method(self, name: &str) -> Method;
}

impl<F, R> IntoMethod<()> for F
where
    F: Fn() -> R + Send + Sync + 'static,
    R: Any,
{
    fn into_method(self, name: &str) -> Method {
        let body: Arc<dyn Fn() -> R + Send + Sync> = Arc::new(self);
        Method {
            name: name.to_owned(),
            returns: TypeSlot::of::<R>(),
            params: Vec::new(),
            body: Arc::new(body),
        }
    }
}

impl<F, A, R> IntoMethod<(A,)> for F
where
    F: Fn(&A) -> R + Send + Sync + 'static,
    A: Any,
    R: Any,
{
    fn into_method(self, name: &str) -> Method {
        let body: Arc<dyn Fn(&A) -> R + Send + Sync> = Arc::new(self);
        Method {
            name: name.to_owned(),
            returns: TypeSlot::of::<R>(),
            params: vec![TypeSlot::of::<A>()],
            body: Arc::new(body),
        }
    }
}

impl<F, A, B, R> IntoMethod<(A, B)> for F
where
    F: Fn(&A, &B) -> R + Send + Sync + 'static,
    A: Any,
    B: Any,
    R: Any,
{
    fn into_method(self, name: &str) -> Method {
        let body: Arc<dyn Fn(&A, &B) -> R + Send + Sync> = Arc::new(self);
        Method {
            name: name.to_owned(),
            returns: TypeSlot::of::<R>(),
            params: vec![TypeSlot::of::<A>(), TypeSlot::of::<B>()],
            body: Arc::new(body),
        }
    }
}

/// Declarative configuration of an actor type.
///
/// A parent declaration can be inherited: its markers apply unless the child
/// declares a marker of the same kind, and its methods are visible unless the
/// child declares one with the same name.
#[derive(Clone, Debug, Default)]
pub struct ActorDeclaration {
    name: String,
    reentrant: bool,
    interleave: Option<String>,
    methods: BTreeMap<String, Method>,
    parent: Option<Box<ActorDeclaration>>,
}

impl ActorDeclaration {
    /// Creates an empty declaration.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            ..Default::default()
        }
    }

    /// Creates an empty declaration named after `A`.
    pub fn of<A: ?Sized>() -> Self {
        Self::new(type_name::<A>())
    }

    /// Actor type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds the fully reentrant marker.
    pub fn reentrant(mut self) -> Self {
        self.reentrant = true;
        self
    }

    /// Adds the conditional marker naming a callback method.
    pub fn may_interleave(mut self, callback: &str) -> Self {
        self.interleave = Some(callback.to_owned());
        self
    }

    /// Registers `predicate` as callback method and adds the conditional
    /// marker naming it.
    pub fn may_interleave_with<F>(self, callback: &str, predicate: F) -> Self
    where
        F: Fn(&Invocation) -> bool + Send + Sync + 'static,
    {
        self.method::<(Invocation,), _>(callback, predicate)
            .may_interleave(callback)
    }

    /// Declares a callback method.
    pub fn method<Args, F>(mut self, name: &str, f: F) -> Self
    where
        F: IntoMethod<Args>,
    {
        self.methods.insert(name.to_owned(), f.into_method(name));
        self
    }

    /// Inherits markers and methods from a parent declaration.
    pub fn inherit(mut self, parent: ActorDeclaration) -> Self {
        self.parent = Some(Box::new(parent));
        self
    }

    /// Effective markers, inherited ones included.
    pub fn markers(&self) -> Vec<Marker> {
        let mut markers = Vec::new();
        if self.is_reentrant() {
            markers.push(Marker::Reentrant);
        }
        if let Some(callback) = self.interleave_callback() {
            markers.push(Marker::MayInterleave {
                callback: callback.to_owned(),
            });
        }
        markers
    }

    /// Looks up a method here, then up the inheritance chain.
    pub fn find_method(&self, name: &str) -> Option<&Method> {
        self.methods.get(name).or_else(|| {
            self.parent
                .as_ref()
                .and_then(|parent| parent.find_method(name))
        })
    }

    fn is_reentrant(&self) -> bool {
        self.reentrant
            || self.parent.as_ref().is_some_and(|parent| parent.is_reentrant())
    }

    fn interleave_callback(&self) -> Option<&str> {
        self.interleave.as_deref().or_else(|| {
            self.parent
                .as_ref()
                .and_then(|parent| parent.interleave_callback())
        })
    }
}

/// Actor type whose declaration is known statically.
pub trait ActorType: 'static {
    /// Declaration used for reentrancy resolution.
    fn declare() -> ActorDeclaration;
}

/// Predicate bound once to an interleave callback.
#[derive(Clone)]
pub struct InterleavePredicate {
    callback: String,
    inner: Arc<dyn Fn(&Invocation) -> bool + Send + Sync>,
}

impl InterleavePredicate {
    /// Creates a predicate directly from a function.
    pub fn new<F>(callback: &str, predicate: F) -> Self
    where
        F: Fn(&Invocation) -> bool + Send + Sync + 'static,
    {
        Self {
            callback: callback.to_owned(),
            inner: Arc::new(predicate),
        }
    }

    /// Bound callback name.
    pub fn callback(&self) -> &str {
        &self.callback
    }

    /// True if `invocation` may interleave with the one in flight.
    pub fn may_interleave(&self, invocation: &Invocation) -> bool {
        (self.inner)(invocation)
    }
}

impl Debug for InterleavePredicate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("InterleavePredicate")
            .field(&self.callback)
            .finish()
    }
}

/// Reentrancy decision for one actor type.
#[derive(Clone, Debug)]
pub enum ReentrancyDecision {
    /// Invocations are fully serialized.
    NotSpecial,
    /// Any two invocations may interleave.
    FullyReentrant,
    /// The predicate decides per invocation.
    Predicate(InterleavePredicate),
}

impl ReentrancyDecision {
    /// True if `invocation` may be admitted while another one is in flight.
    pub fn admits(&self, invocation: &Invocation) -> bool {
        match self {
            ReentrancyDecision::NotSpecial => false,
            ReentrancyDecision::FullyReentrant => true,
            ReentrancyDecision::Predicate(predicate) => {
                predicate.may_interleave(invocation)
            }
        }
    }

    /// True for [`ReentrancyDecision::FullyReentrant`].
    pub fn is_reentrant(&self) -> bool {
        matches!(self, ReentrancyDecision::FullyReentrant)
    }

    /// The interleave predicate, if any.
    pub fn predicate(&self) -> Option<&InterleavePredicate> {
        match self {
            ReentrancyDecision::Predicate(predicate) => Some(predicate),
            _ => None,
        }
    }
}

/// Resolves a declaration into a reentrancy decision.
///
/// Markers are read with inheritance applied. A type with no marker is
/// [`ReentrancyDecision::NotSpecial`], a `Reentrant` type is
/// [`ReentrancyDecision::FullyReentrant`]. A `MayInterleave` marker looks its
/// callback up by name, here first and then up the inheritance chain, checks
/// its signature and binds it into an [`InterleavePredicate`].
///
/// # Arguments
///
/// * `declaration` - The declaration of the actor type.
///
/// # Returns
///
/// Returns the [`ReentrancyDecision`] for the type.
///
/// # Errors
///
/// - [`Error::ConflictingReentrancy`] if both markers are present.
/// - [`Error::CallbackNotFound`] if the named callback is not declared.
/// - [`Error::CallbackReturnType`] if the callback does not return `bool`.
/// - [`Error::CallbackParameters`] if the callback does not take exactly one
///   [`Invocation`].
///
/// # Examples
///
/// ```ignore
/// let declaration = ActorDeclaration::new("Account")
///     .may_interleave_with("is_query", |invocation: &Invocation| {
///         invocation.method() == "balance"
///     });
///
/// let decision = resolve(&declaration)?;
/// assert!(decision.admits(&Invocation::new("balance", Message::new(()))));
/// ```
///
pub fn resolve(
    declaration: &ActorDeclaration,
) -> Result<ReentrancyDecision, Error> {
    let actor = declaration.name();
    match (declaration.is_reentrant(), declaration.interleave_callback()) {
        (false, None) => {
            debug!("Actor {} has no reentrancy rule.", actor);
            Ok(ReentrancyDecision::NotSpecial)
        }
        (true, Some(_)) => {
            error!("Actor {} declares conflicting reentrancy markers.", actor);
            Err(Error::ConflictingReentrancy(actor.to_owned()))
        }
        (true, None) => {
            debug!("Actor {} is fully reentrant.", actor);
            Ok(ReentrancyDecision::FullyReentrant)
        }
        (false, Some(callback)) => bind(declaration, callback)
            .map(ReentrancyDecision::Predicate)
            .inspect_err(|e| error!("Invalid interleave callback: {}", e)),
    }
}

fn bind(
    declaration: &ActorDeclaration,
    callback: &str,
) -> Result<InterleavePredicate, Error> {
    let actor = declaration.name().to_owned();
    let method = declaration.find_method(callback).ok_or_else(|| {
        Error::CallbackNotFound {
            actor: actor.clone(),
            callback: callback.to_owned(),
        }
    })?;

    if method.returns.id != TypeId::of::<bool>() {
        return Err(Error::CallbackReturnType {
            actor,
            callback: callback.to_owned(),
            found: method.returns.name.to_owned(),
        });
    }

    let expected = TypeSlot::of::<Invocation>();
    let parameters_error = || Error::CallbackParameters {
        actor: actor.clone(),
        callback: callback.to_owned(),
        expected: expected.name.to_owned(),
        found: method.signature(),
    };
    if method.params.len() != 1 || method.params[0].id != expected.id {
        return Err(parameters_error());
    }

    let inner = method
        .body
        .downcast_ref::<Arc<dyn Fn(&Invocation) -> bool + Send + Sync>>()
        .cloned()
        .ok_or_else(parameters_error)?;

    debug!("Actor {} interleaves through {}.", actor, callback);
    Ok(InterleavePredicate {
        callback: callback.to_owned(),
        inner,
    })
}

/// Process-wide cache of reentrancy decisions, one per actor type.
///
/// Two callers racing on the first lookup may both resolve; the first
/// inserted result is kept and both results are equivalent.
#[derive(Default)]
pub struct ReentrancyCache {
    decisions: RwLock<HashMap<TypeId, Result<ReentrancyDecision, Error>>>,
    resolutions: AtomicUsize,
}

impl ReentrancyCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared process-wide cache.
    pub fn global() -> &'static ReentrancyCache {
        static CACHE: OnceLock<ReentrancyCache> = OnceLock::new();
        CACHE.get_or_init(ReentrancyCache::new)
    }

    /// Decision for `A`, resolved on first use. Configuration errors are
    /// cached too.
    pub fn decision<A: ActorType>(&self) -> Result<ReentrancyDecision, Error> {
        let key = TypeId::of::<A>();
        if let Some(cached) = self
            .decisions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return cached.clone();
        }

        self.resolutions.fetch_add(1, Ordering::Relaxed);
        let resolved = resolve(&A::declare());

        self.decisions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_insert(resolved)
            .clone()
    }

    /// Number of resolutions performed so far.
    pub fn resolutions(&self) -> usize {
        self.resolutions.load(Ordering::Relaxed)
    }

    /// Number of cached actor types.
    pub fn len(&self) -> usize {
        self.decisions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// True if nothing has been resolved.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Decision for `A` from the process-wide cache.
pub fn reentrancy_decision<A: ActorType>() -> Result<ReentrancyDecision, Error> {
    ReentrancyCache::global().decision::<A>()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_read(invocation: &Invocation) -> bool {
        invocation.method().starts_with("get")
    }

    fn read() -> Invocation {
        Invocation::new("get_state", Message::new(()))
    }

    fn write() -> Invocation {
        Invocation::new("set_state", Message::new(1u32))
    }

    #[test]
    fn test_no_markers() {
        let decision = resolve(&ActorDeclaration::new("Plain")).unwrap();
        assert!(matches!(decision, ReentrancyDecision::NotSpecial));
        assert!(!decision.admits(&read()));
        assert!(!decision.is_reentrant());
    }

    #[test]
    fn test_fully_reentrant() {
        let declaration = ActorDeclaration::new("Free").reentrant().reentrant();
        assert_eq!(declaration.markers(), vec![Marker::Reentrant]);
        let decision = resolve(&declaration).unwrap();
        assert!(decision.is_reentrant());
        assert!(decision.admits(&write()));
        assert!(decision.predicate().is_none());
    }

    #[test]
    fn test_conflicting_markers() {
        let declaration = ActorDeclaration::new("Both")
            .reentrant()
            .may_interleave_with("is_read", is_read);
        let error = resolve(&declaration).unwrap_err();
        assert_eq!(error, Error::ConflictingReentrancy("Both".to_owned()));
        assert!(error.is_configuration());
    }

    #[test]
    fn test_conflict_through_inheritance() {
        let parent = ActorDeclaration::new("Base").reentrant();
        let declaration = ActorDeclaration::new("Derived")
            .inherit(parent)
            .may_interleave_with("is_read", is_read);
        assert_eq!(declaration.markers().len(), 2);
        assert_eq!(
            resolve(&declaration).unwrap_err(),
            Error::ConflictingReentrancy("Derived".to_owned())
        );
    }

    #[test]
    fn test_missing_callback() {
        let declaration = ActorDeclaration::new("Missing").may_interleave("nope");
        assert_eq!(
            resolve(&declaration).unwrap_err(),
            Error::CallbackNotFound {
                actor: "Missing".to_owned(),
                callback: "nope".to_owned(),
            }
        );
    }

    #[test]
    fn test_callback_return_type() {
        let declaration = ActorDeclaration::new("Returns")
            .method("check", |_: &Invocation| 1u8)
            .may_interleave("check");
        let error = resolve(&declaration).unwrap_err();
        assert!(
            matches!(error, Error::CallbackReturnType { ref found, .. } if found == "u8")
        );
    }

    #[test]
    fn test_callback_parameters() {
        let no_params = ActorDeclaration::new("Arity0")
            .method("check", || true)
            .may_interleave("check");
        assert!(matches!(
            resolve(&no_params).unwrap_err(),
            Error::CallbackParameters { ref found, .. } if found.is_empty()
        ));

        let two_params = ActorDeclaration::new("Arity2")
            .method("check", |_: &Invocation, _: &Invocation| true)
            .may_interleave("check");
        assert!(matches!(
            resolve(&two_params).unwrap_err(),
            Error::CallbackParameters { .. }
        ));

        let wrong_type = ActorDeclaration::new("WrongType")
            .method("check", |_: &String| true)
            .may_interleave("check");
        let error = resolve(&wrong_type).unwrap_err();
        assert!(matches!(
            error,
            Error::CallbackParameters { ref found, .. } if found.contains("String")
        ));
    }

    #[test]
    fn test_method_signature() {
        let parent = ActorDeclaration::new("Base")
            .method("pair", |_: &Invocation, _: &String| 0u8);
        let declaration = ActorDeclaration::new("Derived")
            .inherit(parent)
            .method("is_read", is_read)
            .method("ready", || true);

        let method = declaration.find_method("is_read").unwrap();
        assert_eq!(method.name(), "is_read");
        assert_eq!(method.return_type(), "bool");
        assert_eq!(method.parameter_types(), vec![type_name::<Invocation>()]);

        let ready = declaration.find_method("ready").unwrap();
        assert!(ready.parameter_types().is_empty());

        let pair = declaration.find_method("pair").unwrap();
        assert_eq!(pair.return_type(), "u8");
        assert_eq!(
            pair.parameter_types(),
            vec![type_name::<Invocation>(), type_name::<String>()]
        );
        assert!(declaration.find_method("missing").is_none());
    }

    #[test]
    fn test_marker_serialization() {
        let declaration = ActorDeclaration::new("Reader")
            .may_interleave_with("is_read", is_read);
        let markers = declaration.markers();
        assert_eq!(
            markers,
            vec![Marker::MayInterleave {
                callback: "is_read".to_owned()
            }]
        );

        let bytes = bincode::serialize(&markers).unwrap();
        let decoded: Vec<Marker> = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded, markers);
    }

    #[test]
    fn test_predicate_from_inherited_method() {
        let parent = ActorDeclaration::new("Base").method("is_read", is_read);
        let declaration = ActorDeclaration::new("Derived")
            .inherit(parent)
            .may_interleave("is_read");
        let decision = resolve(&declaration).unwrap();
        let predicate = decision.predicate().unwrap();
        assert_eq!(predicate.callback(), "is_read");
        assert!(decision.admits(&read()));
        assert!(!decision.admits(&write()));
    }

    #[test]
    fn test_child_method_shadows_parent() {
        let parent = ActorDeclaration::new("Base")
            .method("check", |_: &Invocation| 0u8)
            .may_interleave("check");
        let declaration = ActorDeclaration::new("Derived")
            .inherit(parent)
            .method("check", |_: &Invocation| true);
        assert!(resolve(&declaration).unwrap().admits(&write()));
    }

    struct Reader;

    impl ActorType for Reader {
        fn declare() -> ActorDeclaration {
            ActorDeclaration::of::<Reader>().may_interleave_with("is_read", is_read)
        }
    }

    struct Broken;

    impl ActorType for Broken {
        fn declare() -> ActorDeclaration {
            ActorDeclaration::of::<Broken>().may_interleave("missing")
        }
    }

    #[test]
    fn test_cache_resolves_once() {
        let cache = ReentrancyCache::new();
        assert!(cache.is_empty());
        let first = cache.decision::<Reader>().unwrap();
        for _ in 0..10 {
            assert!(first.admits(&read()));
            assert!(!first.admits(&write()));
        }
        let second = cache.decision::<Reader>().unwrap();
        assert!(second.admits(&read()));
        assert_eq!(cache.resolutions(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_keeps_configuration_error() {
        let cache = ReentrancyCache::new();
        let first = cache.decision::<Broken>().unwrap_err();
        let second = cache.decision::<Broken>().unwrap_err();
        assert_eq!(first, second);
        assert!(matches!(first, Error::CallbackNotFound { .. }));
        assert_eq!(cache.resolutions(), 1);
    }

    #[test]
    fn test_global_cache() {
        let decision = reentrancy_decision::<Reader>().unwrap();
        assert!(decision.predicate().is_some());
        assert!(ReentrancyCache::global().len() >= 1);
    }
}
