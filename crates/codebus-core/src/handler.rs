//! Handler declaration and type erasure.
//!
//! A subscriber type lists its handlers once, in [`Subscriber::subscriptions`].
//! Each handler is an ordinary method (`fn(&self, ..)`) or an associated
//! function without a receiver (a *static* handler, shared by every instance
//! of the type). Parameters are any types implementing [`FromArg`].
//!
//! ```rust,ignore
//! use codebus_core::{Subscriber, Subscriptions, CURRENT_THREAD, IO_POOL};
//!
//! struct Fetcher;
//!
//! impl Fetcher {
//!     fn on_name(&self, name: String) {}
//!     fn on_user(&self, name: String, age: i32, male: bool) {}
//!     fn on_any(code: i64) {}
//! }
//!
//! impl Subscriber for Fetcher {
//!     fn subscriptions(subs: &mut Subscriptions<Self>) {
//!         subs.method("on_name", 1, CURRENT_THREAD, Self::on_name)
//!             .method("on_user", 2, IO_POOL, Self::on_user)
//!             .function("on_any", 3, CURRENT_THREAD, Self::on_any);
//!     }
//! }
//! ```
//!
//! The `#[subscriber]` attribute from the macros crate writes that impl for
//! you.

use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::args::{ParamType, Value};
use crate::error::{InvokeError, InvokeResult};

// ============================================================================
// FromArg
// ============================================================================

/// A type that can be produced from one posted argument.
///
/// `param_type` is what the matcher compares posted arguments against;
/// `from_arg` performs the actual conversion at invocation time and returns
/// `None` when the value does not fit.
///
/// For your own `Clone` types, [`impl_from_arg!`](crate::impl_from_arg) writes
/// the impl. Shared payloads can be taken as `Arc<T>` without any impl.
pub trait FromArg: Sized + Send + 'static {
    /// The declared parameter shape.
    fn param_type() -> ParamType;

    /// Converts a posted value (`None` for null).
    fn from_arg(value: Option<&Value>) -> Option<Self>;
}

macro_rules! impl_from_arg_primitive {
    ($($p:ty),* $(,)?) => {
        $(
            impl FromArg for $p {
                fn param_type() -> ParamType {
                    ParamType::of::<$p>()
                }

                fn from_arg(value: Option<&Value>) -> Option<Self> {
                    let value = value?;
                    value
                        .downcast_ref::<$p>()
                        .copied()
                        .or_else(|| value.downcast_ref::<Box<$p>>().map(|b| **b))
                }
            }

            impl FromArg for Box<$p> {
                fn param_type() -> ParamType {
                    ParamType::of::<Box<$p>>()
                }

                fn from_arg(value: Option<&Value>) -> Option<Self> {
                    let value = value?;
                    value
                        .downcast_ref::<Box<$p>>()
                        .cloned()
                        .or_else(|| value.downcast_ref::<$p>().map(|p| Box::new(*p)))
                }
            }
        )*
    };
}

impl_from_arg_primitive!(
    i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64, bool, char
);

impl FromArg for String {
    fn param_type() -> ParamType {
        ParamType::of::<String>()
    }

    fn from_arg(value: Option<&Value>) -> Option<Self> {
        let value = value?;
        value
            .downcast_ref::<String>()
            .cloned()
            .or_else(|| value.downcast_ref::<&'static str>().map(|s| s.to_string()))
    }
}

/// Nullable parameter. Receives `None` for a typed null; this is the only
/// parameter kind a typed null can reach.
impl<T: FromArg> FromArg for Option<T> {
    fn param_type() -> ParamType {
        T::param_type().nullable()
    }

    fn from_arg(value: Option<&Value>) -> Option<Self> {
        match value {
            None => Some(None),
            Some(_) => T::from_arg(value).map(Some),
        }
    }
}

/// Shared payload of type `T`, posted either through [`Arg::shared`] or as a
/// plain `Arc<T>` value.
///
/// [`Arg::shared`]: crate::Arg::shared
impl<T: Any + Send + Sync> FromArg for Arc<T> {
    fn param_type() -> ParamType {
        ParamType::shared::<T>()
    }

    fn from_arg(value: Option<&Value>) -> Option<Self> {
        let value = value?;
        Arc::downcast::<T>(value.clone())
            .ok()
            .or_else(|| value.downcast_ref::<Arc<T>>().cloned())
    }
}

/// Accepts any non-null value, still erased.
impl FromArg for Value {
    fn param_type() -> ParamType {
        ParamType::any()
    }

    fn from_arg(value: Option<&Value>) -> Option<Self> {
        value.cloned()
    }
}

/// Implements [`FromArg`] for `Clone` types by downcast-and-clone.
///
/// ```rust,ignore
/// #[derive(Clone)]
/// struct Login { user: String }
///
/// codebus_core::impl_from_arg!(Login);
/// ```
#[macro_export]
macro_rules! impl_from_arg {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::FromArg for $ty {
                fn param_type() -> $crate::ParamType {
                    $crate::ParamType::of::<$ty>()
                }

                fn from_arg(
                    value: ::std::option::Option<&$crate::Value>,
                ) -> ::std::option::Option<Self> {
                    value?.downcast_ref::<$ty>().cloned()
                }
            }
        )+
    };
}

// ============================================================================
// HandlerOutput
// ============================================================================

/// Return types a handler may have.
pub trait HandlerOutput {
    /// Folds the return value into an invocation result.
    fn into_result(self) -> InvokeResult<()>;
}

impl HandlerOutput for () {
    fn into_result(self) -> InvokeResult<()> {
        Ok(())
    }
}

impl<E: fmt::Display> HandlerOutput for Result<(), E> {
    fn into_result(self) -> InvokeResult<()> {
        self.map_err(|e| InvokeError::Failed(e.to_string()))
    }
}

// ============================================================================
// Method / Function
// ============================================================================

/// An instance handler on subscriber type `S`, taking parameters `T`.
///
/// Implemented for every `Fn(&S, T1, .., Tn)` with `n <= 12`.
pub trait Method<S, T>: Send + Sync + 'static {
    /// Declared parameter shapes, in order.
    fn params() -> Vec<ParamType>;

    /// Extracts arguments and calls the handler.
    fn call(&self, subscriber: &S, args: &[Option<Value>]) -> InvokeResult<()>;
}

/// A static handler taking parameters `T`.
///
/// Implemented for every `Fn(T1, .., Tn)` with `n <= 12`.
pub trait Function<T>: Send + Sync + 'static {
    /// Declared parameter shapes, in order.
    fn params() -> Vec<ParamType>;

    /// Extracts arguments and calls the handler.
    fn call(&self, args: &[Option<Value>]) -> InvokeResult<()>;
}

fn check_arity(expected: usize, got: usize) -> InvokeResult<()> {
    if expected == got {
        Ok(())
    } else {
        Err(InvokeError::ArityMismatch { expected, got })
    }
}

fn extract<T: FromArg>(index: usize, args: &[Option<Value>]) -> InvokeResult<T> {
    let value = args.get(index).ok_or(InvokeError::ArityMismatch {
        expected: index + 1,
        got: args.len(),
    })?;
    T::from_arg(value.as_ref()).ok_or(InvokeError::ArgumentMismatch {
        index,
        expected: T::param_type().name(),
    })
}

macro_rules! impl_handler {
    ($($ty:ident),*) => {
        #[allow(non_snake_case, unused_mut, unused_variables, unused_assignments)]
        impl<S, F, R, $($ty,)*> Method<S, ($($ty,)*)> for F
        where
            S: 'static,
            F: Fn(&S, $($ty,)*) -> R + Send + Sync + 'static,
            R: HandlerOutput,
            $( $ty: FromArg, )*
        {
            fn params() -> Vec<ParamType> {
                vec![$($ty::param_type(),)*]
            }

            fn call(&self, subscriber: &S, args: &[Option<Value>]) -> InvokeResult<()> {
                check_arity(<[&str]>::len(&[$(stringify!($ty),)*]), args.len())?;
                let mut index = 0;
                $(
                    let $ty = extract::<$ty>(index, args)?;
                    index += 1;
                )*
                (self)(subscriber, $($ty,)*).into_result()
            }
        }

        #[allow(non_snake_case, unused_mut, unused_variables, unused_assignments)]
        impl<F, R, $($ty,)*> Function<($($ty,)*)> for F
        where
            F: Fn($($ty,)*) -> R + Send + Sync + 'static,
            R: HandlerOutput,
            $( $ty: FromArg, )*
        {
            fn params() -> Vec<ParamType> {
                vec![$($ty::param_type(),)*]
            }

            fn call(&self, args: &[Option<Value>]) -> InvokeResult<()> {
                check_arity(<[&str]>::len(&[$(stringify!($ty),)*]), args.len())?;
                let mut index = 0;
                $(
                    let $ty = extract::<$ty>(index, args)?;
                    index += 1;
                )*
                (self)($($ty,)*).into_result()
            }
        }
    };
}

impl_handler!();
impl_handler!(T1);
impl_handler!(T1, T2);
impl_handler!(T1, T2, T3);
impl_handler!(T1, T2, T3, T4);
impl_handler!(T1, T2, T3, T4, T5);
impl_handler!(T1, T2, T3, T4, T5, T6);
impl_handler!(T1, T2, T3, T4, T5, T6, T7);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11, T12);

// ============================================================================
// Erasure
// ============================================================================

/// Object-safe form of a declared handler.
pub(crate) trait ErasedHandler: Send + Sync {
    fn invoke(
        &self,
        target: Option<&(dyn Any + Send + Sync)>,
        args: &[Option<Value>],
    ) -> InvokeResult<()>;
}

struct MethodHandler<S, M, T> {
    method: M,
    _marker: PhantomData<fn() -> (S, T)>,
}

impl<S, M, T> ErasedHandler for MethodHandler<S, M, T>
where
    S: Any + Send + Sync,
    M: Method<S, T>,
    T: 'static,
{
    fn invoke(
        &self,
        target: Option<&(dyn Any + Send + Sync)>,
        args: &[Option<Value>],
    ) -> InvokeResult<()> {
        let subscriber = target
            .ok_or(InvokeError::MissingTarget)?
            .downcast_ref::<S>()
            .ok_or(InvokeError::TargetMismatch {
                expected: type_name::<S>(),
            })?;
        self.method.call(subscriber, args)
    }
}

struct FunctionHandler<F, T> {
    function: F,
    _marker: PhantomData<fn() -> T>,
}

impl<F, T> ErasedHandler for FunctionHandler<F, T>
where
    F: Function<T>,
    T: 'static,
{
    fn invoke(
        &self,
        _target: Option<&(dyn Any + Send + Sync)>,
        args: &[Option<Value>],
    ) -> InvokeResult<()> {
        self.function.call(args)
    }
}

// ============================================================================
// HandlerTemplate
// ============================================================================

/// One declared handler of a subscriber type, not yet bound to an instance.
#[derive(Clone)]
pub struct HandlerTemplate {
    owner: TypeId,
    owner_name: &'static str,
    name: &'static str,
    code: i32,
    scheduler: i32,
    params: Arc<[ParamType]>,
    signature: Arc<str>,
    is_static: bool,
    callable: Arc<dyn ErasedHandler>,
}

impl HandlerTemplate {
    fn new<S: 'static>(
        name: &'static str,
        code: i32,
        scheduler: i32,
        params: Vec<ParamType>,
        is_static: bool,
        callable: Arc<dyn ErasedHandler>,
    ) -> Self {
        let owner_name = type_name::<S>();
        let signature: String = params.iter().map(|p| format!("{};", p.name())).collect();
        Self {
            owner: TypeId::of::<S>(),
            owner_name,
            name,
            code,
            scheduler,
            params: params.into(),
            signature: format!("{owner_name}#{name}({signature})").into(),
            is_static,
            callable,
        }
    }

    /// The declaring subscriber type.
    pub fn owner(&self) -> TypeId {
        self.owner
    }

    /// The declaring subscriber type's name.
    pub fn owner_name(&self) -> &'static str {
        self.owner_name
    }

    /// The handler's name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The message code this handler receives.
    pub fn code(&self) -> i32 {
        self.code
    }

    /// The scheduler code the handler runs on.
    pub fn scheduler(&self) -> i32 {
        self.scheduler
    }

    /// Declared parameter shapes, in order.
    pub fn params(&self) -> &[ParamType] {
        &self.params
    }

    /// `Type#name(param;param;)`.
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Whether this handler has no receiver.
    pub fn is_static(&self) -> bool {
        self.is_static
    }

    pub(crate) fn invoke(
        &self,
        target: Option<&(dyn Any + Send + Sync)>,
        args: &[Option<Value>],
    ) -> InvokeResult<()> {
        self.callable.invoke(target, args)
    }
}

impl fmt::Debug for HandlerTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerTemplate")
            .field("signature", &self.signature)
            .field("code", &self.code)
            .field("scheduler", &self.scheduler)
            .field("is_static", &self.is_static)
            .finish()
    }
}

// ============================================================================
// Subscriber / Subscriptions
// ============================================================================

/// A type whose instances can be registered on a bus.
pub trait Subscriber: Any + Send + Sync + Sized {
    /// Declares the type's handlers. Called once per type per cache miss.
    fn subscriptions(subs: &mut Subscriptions<Self>);
}

/// Declaration builder passed to [`Subscriber::subscriptions`].
pub struct Subscriptions<S> {
    templates: Vec<HandlerTemplate>,
    _marker: PhantomData<fn() -> S>,
}

impl<S: Subscriber> Subscriptions<S> {
    pub(crate) fn new() -> Self {
        Self {
            templates: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Declares an instance handler.
    pub fn method<T, M>(&mut self, name: &'static str, code: i32, scheduler: i32, method: M) -> &mut Self
    where
        T: 'static,
        M: Method<S, T>,
    {
        let callable = Arc::new(MethodHandler::<S, M, T> {
            method,
            _marker: PhantomData,
        });
        self.templates.push(HandlerTemplate::new::<S>(
            name,
            code,
            scheduler,
            M::params(),
            false,
            callable,
        ));
        self
    }

    /// Declares a static handler, invoked once per post however many
    /// instances of `S` are registered.
    pub fn function<T, F>(&mut self, name: &'static str, code: i32, scheduler: i32, function: F) -> &mut Self
    where
        T: 'static,
        F: Function<T>,
    {
        let callable = Arc::new(FunctionHandler::<F, T> {
            function,
            _marker: PhantomData,
        });
        self.templates.push(HandlerTemplate::new::<S>(
            name,
            code,
            scheduler,
            F::params(),
            true,
            callable,
        ));
        self
    }

    /// Number of handlers declared so far.
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Returns true if nothing has been declared.
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub(crate) fn into_templates(self) -> Vec<HandlerTemplate> {
        self.templates
    }
}

/// Collects the templates declared by `S`.
pub(crate) fn declare<S: Subscriber>() -> Vec<HandlerTemplate> {
    let mut subs = Subscriptions::<S>::new();
    S::subscriptions(&mut subs);
    subs.into_templates()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn on_name(&self, name: String) {
            self.seen.lock().unwrap().push(name);
        }

        fn on_user(&self, name: String, age: i32, male: bool) {
            self.seen
                .lock()
                .unwrap()
                .push(format!("{name}:{age}:{male}"));
        }

        fn on_fail(&self, _code: i64) -> Result<(), String> {
            Err("nope".into())
        }

        fn on_static(_flag: Option<bool>) {}
    }

    impl Subscriber for Recorder {
        fn subscriptions(subs: &mut Subscriptions<Self>) {
            subs.method("on_name", 1, 0, Self::on_name)
                .method("on_user", 2, 0, Self::on_user)
                .method("on_fail", 3, 0, Self::on_fail)
                .function("on_static", 4, 0, Self::on_static);
        }
    }

    fn val<T: Any + Send + Sync>(value: T) -> Option<Value> {
        Some(Arc::new(value))
    }

    #[test]
    fn test_declare_builds_signatures() {
        let templates = declare::<Recorder>();
        assert_eq!(templates.len(), 4);

        let user = &templates[1];
        assert_eq!(user.code(), 2);
        assert_eq!(user.params().len(), 3);
        assert!(user.signature().contains("Recorder#on_user("));
        assert!(user.signature().ends_with(";i32;bool;)"));
        assert!(templates[3].is_static());
        assert!(templates[3].params()[0].is_nullable());
    }

    #[test]
    fn test_invoke_method() {
        let templates = declare::<Recorder>();
        let recorder = Recorder::default();
        let args = [val(String::from("Zhang san")), val(Box::new(22_i32)), val(true)];

        templates[1].invoke(Some(&recorder), &args).unwrap();
        assert_eq!(recorder.seen.lock().unwrap().as_slice(), ["Zhang san:22:true"]);
    }

    #[test]
    fn test_static_str_reads_as_string() {
        let templates = declare::<Recorder>();
        let recorder = Recorder::default();
        templates[0]
            .invoke(Some(&recorder), &[val("Hello")])
            .unwrap();
        assert_eq!(recorder.seen.lock().unwrap().as_slice(), ["Hello"]);
    }

    #[test]
    fn test_invoke_errors() {
        let templates = declare::<Recorder>();
        let recorder = Recorder::default();

        let err = templates[0].invoke(Some(&recorder), &[]).unwrap_err();
        assert_eq!(err, InvokeError::ArityMismatch { expected: 1, got: 0 });

        let err = templates[0]
            .invoke(Some(&recorder), &[val(7_u8)])
            .unwrap_err();
        assert!(matches!(err, InvokeError::ArgumentMismatch { index: 0, .. }));

        let err = templates[0].invoke(None, &[val("x")]).unwrap_err();
        assert_eq!(err, InvokeError::MissingTarget);

        let err = templates[0]
            .invoke(Some(&42_u32), &[val("x")])
            .unwrap_err();
        assert!(matches!(err, InvokeError::TargetMismatch { .. }));

        let err = templates[2]
            .invoke(Some(&recorder), &[val(1_i64)])
            .unwrap_err();
        assert_eq!(err, InvokeError::Failed("nope".into()));
    }

    #[test]
    fn test_static_handler_needs_no_target() {
        let templates = declare::<Recorder>();
        templates[3].invoke(None, &[None]).unwrap();
    }

    #[test]
    fn test_arc_payload_extraction() {
        struct Event(u32);

        let value: Value = Arc::new(Event(5));
        let event = <Arc<Event>>::from_arg(Some(&value)).unwrap();
        assert_eq!(event.0, 5);
        assert!(<Arc<String>>::from_arg(Some(&value)).is_none());

        let nested: Value = Arc::new(Arc::new(Event(6)));
        let event = <Arc<Event>>::from_arg(Some(&nested)).unwrap();
        assert_eq!(event.0, 6);
    }
}
