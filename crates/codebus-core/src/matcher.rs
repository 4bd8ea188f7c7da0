//! Argument validation.
//!
//! Decides whether a posted message fits a handler's declared parameters.
//! A message that does not fit is dropped for that handler without error.

use crate::args::{Arg, ParamType, Payload, PostedMessage, TypedArg, value_type_id};

/// Returns true if `message` may be delivered to a handler declaring `params`.
pub fn matches(params: &[ParamType], message: &PostedMessage) -> bool {
    match message.payload() {
        Payload::Plain(args) => matches_plain(params, args),
        Payload::Typed(args) => matches_typed(params, args),
    }
}

/// Plain form. Every argument must be non-null and assignable.
pub fn matches_plain(params: &[ParamType], args: &[Arg]) -> bool {
    params.len() == args.len()
        && params
            .iter()
            .zip(args)
            .all(|(param, arg)| arg.type_id().is_some_and(|actual| param.accepts(actual)))
}

/// Typed form. Every pair must carry a declared type that is assignable to
/// the parameter; nulls only reach nullable parameters.
pub fn matches_typed(params: &[ParamType], args: &[TypedArg]) -> bool {
    params.len() == args.len()
        && params
            .iter()
            .zip(args)
            .all(|(param, arg)| typed_fits(param, arg))
}

fn typed_fits(param: &ParamType, arg: &TypedArg) -> bool {
    let Some(declared) = arg.declared() else {
        return false;
    };
    match arg.value() {
        Some(value) => {
            let actual = value_type_id(value);
            declared.accepts(actual) && param.accepts(actual)
        }
        None => param.is_nullable() && param.accepts_declared(declared),
    }
}
