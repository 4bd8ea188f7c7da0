//! Message arguments and declared parameter shapes.
//!
//! A posted message carries its arguments in one of two forms:
//!
//! - **Plain**: bare values ([`Arg`]). A null plain argument never matches a
//!   handler, because nothing says which overload it was meant for.
//! - **Typed**: explicit declared-type/value pairs ([`TypedArg`]). This is how
//!   a caller deliberately posts a null to a specific overload.
//!
//! ```rust,ignore
//! use codebus_core::{Args, TypedArg};
//!
//! bus.post(1, ("Hello",))?;
//! bus.post(2, Args::new().null().push("Lee"))?;
//! bus.post_typed(-99, [TypedArg::null::<String>()])?;
//! ```
//!
//! Handlers declare their parameters as [`ParamType`]s. Primitives treat
//! their boxed form (`Box<P>`) as equivalent in both directions, and `String`
//! treats `&'static str` the same way.
//!
//! A typed null only reaches a parameter declared as `Option<T>` whose `T`
//! matches the declared type. A plain `String` parameter never sees it.

use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::sync::Arc;

/// A type-erased, shareable argument value.
pub type Value = Arc<dyn Any + Send + Sync>;

/// Returns the concrete type id behind a [`Value`].
pub fn value_type_id(value: &Value) -> TypeId {
    let any: &dyn Any = value.as_ref();
    any.type_id()
}

// ============================================================================
// Canonical counterparts
// ============================================================================

macro_rules! counterpart_table {
    ($($p:ty),* $(,)?) => {
        /// Returns the canonical counterpart of `id`, if it has one.
        fn counterpart_of(id: TypeId) -> Option<TypeId> {
            $(
                if id == TypeId::of::<$p>() {
                    return Some(TypeId::of::<Box<$p>>());
                }
                if id == TypeId::of::<Box<$p>>() {
                    return Some(TypeId::of::<$p>());
                }
            )*
            if id == TypeId::of::<String>() {
                return Some(TypeId::of::<&'static str>());
            }
            if id == TypeId::of::<&'static str>() {
                return Some(TypeId::of::<String>());
            }
            None
        }
    };
}

counterpart_table!(
    i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64, bool, char
);

// ============================================================================
// ParamType
// ============================================================================

/// The declared shape of one handler parameter (or of one typed argument).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParamType {
    id: TypeId,
    name: &'static str,
    counterpart: Option<TypeId>,
    nullable: bool,
    any: bool,
}

impl ParamType {
    /// The shape of a non-null `T`.
    pub fn of<T: Any>() -> Self {
        let id = TypeId::of::<T>();
        Self {
            id,
            name: type_name::<T>(),
            counterpart: counterpart_of(id),
            nullable: false,
            any: false,
        }
    }

    /// The shape of a shared `T`: a value of type `T`, or an `Arc<T>` posted
    /// as a value of its own.
    pub fn shared<T: Any>() -> Self {
        Self {
            counterpart: Some(TypeId::of::<Arc<T>>()),
            ..Self::of::<T>()
        }
    }

    /// A shape that accepts any non-null value.
    pub fn any() -> Self {
        Self {
            id: TypeId::of::<Value>(),
            name: "any",
            counterpart: None,
            nullable: false,
            any: true,
        }
    }

    /// Returns this shape with null permitted.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// The base type id.
    pub fn type_id(&self) -> TypeId {
        self.id
    }

    /// The base type name, for signatures and diagnostics.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether null is permitted.
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// Whether any value is accepted.
    pub fn is_any(&self) -> bool {
        self.any
    }

    /// Returns true if a value of concrete type `actual` is assignable here.
    pub fn accepts(&self, actual: TypeId) -> bool {
        self.any || actual == self.id || self.counterpart == Some(actual)
    }

    /// Returns true if an argument declared as `declared` is assignable here.
    pub fn accepts_declared(&self, declared: &ParamType) -> bool {
        self.any || self.accepts(declared.id)
    }
}

impl fmt::Debug for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nullable {
            write!(f, "Option<{}>", self.name)
        } else {
            f.write_str(self.name)
        }
    }
}

// ============================================================================
// Plain arguments
// ============================================================================

/// One plain argument: a value, or null.
#[derive(Clone)]
pub struct Arg {
    value: Option<Value>,
    type_name: &'static str,
}

impl Arg {
    /// Wraps a value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            value: Some(Arc::new(value)),
            type_name: type_name::<T>(),
        }
    }

    /// Wraps an already shared value without adding another `Arc` layer.
    pub fn shared<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self {
            value: Some(value),
            type_name: type_name::<T>(),
        }
    }

    /// Wraps an erased value.
    pub fn from_value(value: Value) -> Self {
        Self {
            value: Some(value),
            type_name: "dyn Any",
        }
    }

    /// A null argument.
    pub fn null() -> Self {
        Self {
            value: None,
            type_name: "null",
        }
    }

    /// The wrapped value, if not null.
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// The concrete type id of the value, if not null.
    pub fn type_id(&self) -> Option<TypeId> {
        self.value.as_ref().map(value_type_id)
    }

    /// Returns true if this argument is null.
    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }
}

impl fmt::Debug for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name)
    }
}

/// An ordered list of plain arguments.
#[derive(Clone, Debug, Default)]
pub struct Args(Vec<Arg>);

impl Args {
    /// Creates an empty argument list.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Appends a value (builder pattern).
    pub fn push<T: Any + Send + Sync>(mut self, value: T) -> Self {
        self.0.push(Arg::new(value));
        self
    }

    /// Appends a null (builder pattern).
    pub fn null(mut self) -> Self {
        self.0.push(Arg::null());
        self
    }

    /// Appends a prepared argument (builder pattern).
    pub fn arg(mut self, arg: Arg) -> Self {
        self.0.push(arg);
        self
    }

    /// Number of arguments.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no arguments.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consumes the list.
    pub fn into_vec(self) -> Vec<Arg> {
        self.0
    }
}

impl From<Vec<Arg>> for Args {
    fn from(args: Vec<Arg>) -> Self {
        Self(args)
    }
}

impl FromIterator<Arg> for Args {
    fn from_iter<I: IntoIterator<Item = Arg>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Conversion into a plain argument list.
///
/// Implemented for [`Args`], `Vec<Arg>`, `()` and tuples of up to eight
/// values. Tuple elements are always values; use [`Args::null`] for nulls.
pub trait IntoArgs {
    /// Performs the conversion.
    fn into_args(self) -> Args;
}

impl IntoArgs for Args {
    fn into_args(self) -> Args {
        self
    }
}

impl IntoArgs for Vec<Arg> {
    fn into_args(self) -> Args {
        Args(self)
    }
}

impl IntoArgs for () {
    fn into_args(self) -> Args {
        Args::new()
    }
}

macro_rules! impl_into_args {
    ($($ty:ident),+) => {
        #[allow(non_snake_case)]
        impl<$($ty,)+> IntoArgs for ($($ty,)+)
        where
            $( $ty: Any + Send + Sync, )+
        {
            fn into_args(self) -> Args {
                let ($($ty,)+) = self;
                Args(vec![$(Arg::new($ty),)+])
            }
        }
    };
}

impl_into_args!(A1);
impl_into_args!(A1, A2);
impl_into_args!(A1, A2, A3);
impl_into_args!(A1, A2, A3, A4);
impl_into_args!(A1, A2, A3, A4, A5);
impl_into_args!(A1, A2, A3, A4, A5, A6);
impl_into_args!(A1, A2, A3, A4, A5, A6, A7);
impl_into_args!(A1, A2, A3, A4, A5, A6, A7, A8);

// ============================================================================
// Typed arguments
// ============================================================================

/// One typed argument: an explicit declared type and an optional value.
#[derive(Clone)]
pub struct TypedArg {
    declared: Option<ParamType>,
    value: Option<Value>,
}

impl TypedArg {
    /// A non-null value declared as its own type.
    pub fn of<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            declared: Some(ParamType::of::<T>()),
            value: Some(Arc::new(value)),
        }
    }

    /// A null declared as `T`.
    pub fn null<T: Any>() -> Self {
        Self {
            declared: Some(ParamType::of::<T>()),
            value: None,
        }
    }

    /// An optional value declared as `T`.
    pub fn new<T: Any + Send + Sync>(value: Option<T>) -> Self {
        match value {
            Some(value) => Self::of(value),
            None => Self::null::<T>(),
        }
    }

    /// An explicit declared type with an erased value.
    pub fn with_type(declared: ParamType, value: Option<Value>) -> Self {
        Self {
            declared: Some(declared),
            value,
        }
    }

    /// A value with no declared type. Never matches a handler.
    pub fn untyped(value: Option<Value>) -> Self {
        Self {
            declared: None,
            value,
        }
    }

    /// The declared type, if present.
    pub fn declared(&self) -> Option<&ParamType> {
        self.declared.as_ref()
    }

    /// The value, if not null.
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }
}

impl fmt::Debug for TypedArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedArg")
            .field("declared", &self.declared)
            .field("null", &self.value.is_none())
            .finish()
    }
}

// ============================================================================
// PostedMessage
// ============================================================================

/// The argument payload of a posted message.
#[derive(Clone, Debug)]
pub enum Payload {
    /// Bare values.
    Plain(Vec<Arg>),
    /// Declared-type/value pairs.
    Typed(Vec<TypedArg>),
}

/// One dispatch unit. Created per post and never mutated.
#[derive(Clone, Debug)]
pub struct PostedMessage {
    code: i32,
    payload: Payload,
}

impl PostedMessage {
    /// Creates a plain-form message.
    pub fn plain(code: i32, args: impl IntoArgs) -> Self {
        Self {
            code,
            payload: Payload::Plain(args.into_args().into_vec()),
        }
    }

    /// Creates a typed-form message.
    pub fn typed(code: i32, args: impl IntoIterator<Item = TypedArg>) -> Self {
        Self {
            code,
            payload: Payload::Typed(args.into_iter().collect()),
        }
    }

    /// The message code.
    pub fn code(&self) -> i32 {
        self.code
    }

    /// Whether the payload is in typed form.
    pub fn is_typed(&self) -> bool {
        matches!(self.payload, Payload::Typed(_))
    }

    /// The argument payload.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Number of arguments (pairs count once in typed form).
    pub fn len(&self) -> usize {
        match &self.payload {
            Payload::Plain(args) => args.len(),
            Payload::Typed(args) => args.len(),
        }
    }

    /// Returns true if the message carries no arguments.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The bare values, with type information stripped.
    pub fn values(&self) -> Vec<Option<Value>> {
        match &self.payload {
            Payload::Plain(args) => args.iter().map(|a| a.value().cloned()).collect(),
            Payload::Typed(args) => args.iter().map(|a| a.value().cloned()).collect(),
        }
    }
}
