//! Two-way value bridging between Rust hosts and an embedded JavaScript
//! engine.
//!
//! A [`Context`] owns one [`rivet_js::Engine`] instance and moves values
//! across the boundary between two independently managed heaps:
//!
//! - **primitives** convert losslessly in both directions ([`HostValue`]
//!   integers refuse to cross if they would lose precision as doubles);
//! - **compound host values** (lists, maps, callables, objects) enter the
//!   guest as lazy stand-ins, so script mutation and calls operate on the
//!   original host value;
//! - **compound guest values** come back as [`JsRef`] handles that read,
//!   write, call, and iterate the original guest value on demand;
//! - a per-context registry deduplicates stand-ins and pins, so a value
//!   round-tripping through the other heap comes back *identical*, and
//!   collection on either side releases the pairing exactly once.
//!
//! The engine handle is single-threaded. Contexts and handles may move
//! between threads, but every operation checks the owning thread first and
//! fails with [`Error::WrongThread`] from anywhere else. Independent
//! contexts on independent threads are fully parallel.
//!
//! ```
//! use rivet::{Context, HostValue};
//!
//! let ctx = Context::new();
//! ctx.set_global("nums", HostValue::list(vec![
//!     HostValue::Int(1),
//!     HostValue::Int(2),
//! ])).unwrap();
//! assert_eq!(ctx.eval("nums[0] + nums[1]").unwrap(), HostValue::Int(3));
//! ```

pub mod context;
pub mod error;
pub mod host;
pub mod js_ref;

mod convert;
mod guest_proxy;
mod registry;
mod thread;

pub use context::Context;
pub use error::{Error, Result};
pub use host::{HostFn, HostList, HostMap, HostObject, HostValue};
pub use js_ref::{Elements, JsKind, JsRef};
