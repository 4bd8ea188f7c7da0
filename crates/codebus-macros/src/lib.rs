//! Procedural macros for codebus.
//!
//! This crate provides:
//!
//! - `#[subscriber]` - Implements `Subscriber` from `#[subscribe]` markers
//!
//! # Example
//!
//! ```rust,ignore
//! use codebus::prelude::*;
//!
//! struct Fetcher;
//!
//! #[subscriber]
//! impl Fetcher {
//!     #[subscribe(code = -99, scheduler = CURRENT_THREAD)]
//!     fn on_name(&self, name: String) {}
//!
//!     #[subscribe(code = -99, scheduler = CURRENT_THREAD)]
//!     fn on_id(&self, id: Box<i32>) {}
//!
//!     // No receiver: a static handler, invoked once per post.
//!     #[subscribe(code = 7, scheduler = IO_POOL)]
//!     fn on_tick(tick: i64) {}
//!
//!     // Unmarked methods are left alone.
//!     fn helper(&self) {}
//! }
//! ```

mod subscriber;

use proc_macro::TokenStream;
use syn::{ItemImpl, parse_macro_input};

/// Implements `Subscriber` for the type of an inherent impl block.
///
/// Every method marked `#[subscribe(code = …, scheduler = …)]` becomes a
/// handler. Both keys are required and take any `i32` expression.
///
/// # Attributes
///
/// - `#[subscriber(crate = "…")]` - Path to the core crate (default:
///   `::codebus_core`)
#[proc_macro_attribute]
pub fn subscriber(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = match subscriber::SubscriberArgs::parse(attr.into()) {
        Ok(args) => args,
        Err(err) => return err.to_compile_error().into(),
    };
    let item = parse_macro_input!(item as ItemImpl);

    match subscriber::expand(args, item) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}
