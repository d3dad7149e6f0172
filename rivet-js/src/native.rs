//! Native object hook.
//!
//! An embedder can hand the engine an object backed by a [`NativeObject`]
//! payload. The interpreter forwards property access, membership tests,
//! enumeration, calls, and construction on such an object to the payload
//! instead of the object's own tables.
//!
//! The payload doubles as the collection hook: the engine's heap is
//! reference counted, so when the last reference to a native-backed object
//! goes away the payload's `Drop` implementation runs. That drop is the
//! finalizer callback: it fires synchronously, inside whatever engine
//! operation released the reference, on the thread driving the engine.

use std::any::Any;

use crate::error::JsResult;
use crate::interpreter::Engine;
use crate::object::PropertyKey;
use crate::value::Value;

/// Operations the interpreter forwards to a native payload.
pub trait NativeObject {
    /// Human-readable class name, used in error messages.
    fn class_name(&self) -> &'static str {
        "native object"
    }

    /// Whether the object can be called as a function.
    fn is_callable(&self) -> bool {
        false
    }

    /// Property get.
    fn get(&self, engine: &Engine, key: &PropertyKey) -> JsResult<Value>;

    /// Property set.
    fn set(&self, engine: &Engine, key: &PropertyKey, value: Value) -> JsResult<()>;

    /// Membership test (the `in` operator).
    fn has(&self, engine: &Engine, key: &PropertyKey) -> JsResult<bool>;

    /// Own enumerable keys (for `for..in`).
    fn own_keys(&self, engine: &Engine) -> JsResult<Vec<String>>;

    /// Invoke the object as a function.
    fn call(&self, engine: &Engine, this: &Value, args: &[Value]) -> JsResult<Value>;

    /// Invoke the object as a constructor (`new`).
    fn construct(&self, engine: &Engine, args: &[Value]) -> JsResult<Value>;

    /// Downcast support for embedders that need their payload back.
    fn as_any(&self) -> &dyn Any;
}
