//! Host-side proxies: handles to guest values.
//!
//! A [`JsRef`] stands in the host for a compound guest value. It holds a
//! pin-table slot rather than the value itself, so the single strong guest
//! reference lives in the registry and is released exactly once, when the
//! last handle (or the context) goes away. Every operation checks the
//! owning thread and the context's liveness before touching the guest heap,
//! so a handle that outlives its context or wanders to another thread fails
//! deterministically instead of corrupting the engine.

use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use rivet_js::object::PropertyKey;
use rivet_js::Value;

use crate::context::ContextInner;
use crate::convert;
use crate::error::{Error, Result};
use crate::host::HostValue;
use crate::thread::ThreadBound;

/// Shape of the wrapped guest value, probed once at wrap time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JsKind {
    /// Array-like: has a length, integer indices, element iteration.
    Array,
    /// Plain object: attribute access and key enumeration, no length.
    Object,
    /// Callable: supports invocation and construction.
    Function,
}

/// A host-side handle to a guest value.
#[derive(Clone)]
pub struct JsRef {
    shared: Arc<Shared>,
}

struct Shared {
    ctx: ThreadBound<Weak<ContextInner>>,
    ctx_id: usize,
    slot: usize,
    kind: JsKind,
}

impl JsRef {
    /// Wrap a guest object, pinning it against the guest collector.
    pub(crate) fn wrap(ctx: &Rc<ContextInner>, value: &Value) -> Result<JsRef> {
        let kind = match value {
            Value::Object(obj) => {
                let obj = obj.borrow();
                if obj.is_callable() {
                    JsKind::Function
                } else if obj.is_array() {
                    JsKind::Array
                } else {
                    JsKind::Object
                }
            }
            _ => return Err(Error::js("only guest objects can be wrapped")),
        };
        let slot = ctx.registry.borrow_mut().pin(value.clone());
        Ok(JsRef {
            shared: Arc::new(Shared {
                ctx: ThreadBound::new(Rc::downgrade(ctx)),
                ctx_id: Rc::as_ptr(ctx) as usize,
                slot,
                kind,
            }),
        })
    }

    /// The wrapped value's shape.
    pub fn kind(&self) -> JsKind {
        self.shared.kind
    }

    /// Whether this wraps a guest array.
    pub fn is_array(&self) -> bool {
        self.shared.kind == JsKind::Array
    }

    /// Whether this wraps a guest function.
    pub fn is_function(&self) -> bool {
        self.shared.kind == JsKind::Function
    }

    /// Array length. Fails on non-arrays: a plain guest object has no
    /// length.
    pub fn len(&self) -> Result<usize> {
        if self.shared.kind != JsKind::Array {
            return Err(Error::not_found("length"));
        }
        self.with(|ctx, value| ctx.engine.array_length(value).map_err(Error::from))
    }

    /// Whether the wrapped array is empty. Fails on non-arrays.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Element access on an array-kind handle. An out-of-range index is a
    /// value-level miss ([`Error::NotFound`]), never a script error.
    pub fn index(&self, index: usize) -> Result<HostValue> {
        if self.shared.kind != JsKind::Array {
            return Err(Error::not_found(format!("[{}]", index)));
        }
        self.with(|ctx, value| {
            let len = ctx.engine.array_length(value)?;
            if index >= len {
                return Err(Error::not_found(format!("[{}]", index)));
            }
            let element = ctx
                .engine
                .get_property(value, &PropertyKey::Index(index as u32))?;
            convert::guest_to_host(ctx, &element)
        })
    }

    /// Lazy iteration over an array-kind handle's elements. Each element is
    /// materialized through the conversion machinery on demand.
    pub fn iter(&self) -> Result<Elements> {
        Ok(Elements {
            target: self.clone(),
            len: self.len()?,
            index: 0,
        })
    }

    /// Strict attribute access: an absent attribute is an error.
    pub fn attr(&self, name: &str) -> Result<HostValue> {
        self.with(|ctx, value| {
            let key = PropertyKey::string(name);
            if !ctx.engine.has_property(value, &key)? {
                return Err(Error::not_found(name));
            }
            let attr = ctx.engine.get_property(value, &key)?;
            convert::guest_to_host(ctx, &attr)
        })
    }

    /// Lenient key access: an absent key yields the host "no value".
    pub fn get(&self, name: &str) -> Result<HostValue> {
        self.with(|ctx, value| {
            let attr = ctx.engine.get_property(value, &PropertyKey::string(name))?;
            convert::guest_to_host(ctx, &attr)
        })
    }

    /// Set a named property on the wrapped guest value.
    pub fn set(&self, name: &str, value: HostValue) -> Result<()> {
        self.with(|ctx, guest| {
            let converted = convert::host_to_guest(ctx, &value)?;
            ctx.engine
                .set_property(guest, PropertyKey::string(name), converted)
                .map_err(Error::from)
        })
    }

    /// Set an element of the wrapped guest array.
    pub fn set_index(&self, index: usize, value: HostValue) -> Result<()> {
        self.with(|ctx, guest| {
            let converted = convert::host_to_guest(ctx, &value)?;
            ctx.engine
                .set_property(guest, PropertyKey::Index(index as u32), converted)
                .map_err(Error::from)
        })
    }

    /// Membership test.
    pub fn has(&self, name: &str) -> Result<bool> {
        self.with(|ctx, value| {
            ctx.engine
                .has_property(value, &PropertyKey::string(name))
                .map_err(Error::from)
        })
    }

    /// Own enumerable keys of the wrapped guest object.
    pub fn keys(&self) -> Result<Vec<String>> {
        self.with(|ctx, value| {
            let keys = ctx.engine.own_keys(value)?;
            Ok(keys.iter().map(|k| k.to_string()).collect())
        })
    }

    /// Invoke a function-kind handle.
    pub fn call(&self, args: &[HostValue]) -> Result<HostValue> {
        if self.shared.kind != JsKind::Function {
            return Err(Error::js("guest value is not callable"));
        }
        self.with(|ctx, func| {
            let mut guest_args = Vec::with_capacity(args.len());
            for arg in args {
                guest_args.push(convert::host_to_guest(ctx, arg)?);
            }
            let result = ctx
                .engine
                .call_function(func, &Value::Undefined, &guest_args)?;
            convert::guest_to_host(ctx, &result)
        })
    }

    /// Invoke a function-kind handle as a constructor, returning a handle
    /// to the constructed guest object.
    pub fn construct(&self, args: &[HostValue]) -> Result<HostValue> {
        if self.shared.kind != JsKind::Function {
            return Err(Error::js("guest value is not a constructor"));
        }
        self.with(|ctx, func| {
            let mut guest_args = Vec::with_capacity(args.len());
            for arg in args {
                guest_args.push(convert::host_to_guest(ctx, arg)?);
            }
            let result = ctx.engine.construct(func, &guest_args)?;
            convert::guest_to_host(ctx, &result)
        })
    }

    /// The identity of the owning context.
    pub(crate) fn context_id(&self) -> usize {
        self.shared.ctx_id
    }

    /// The wrapped guest value (owning thread only).
    pub(crate) fn guest_value(&self) -> Result<Value> {
        self.with(|_, value| Ok(value.clone()))
    }

    /// Run an operation against the live context: checks the owning thread,
    /// then context liveness, then fetches the pinned guest value.
    fn with<R>(&self, f: impl FnOnce(&Rc<ContextInner>, &Value) -> Result<R>) -> Result<R> {
        let weak = self.shared.ctx.get()?;
        let ctx = weak.upgrade().ok_or(Error::ContextDestroyed)?;
        if !ctx.alive.get() {
            return Err(Error::ContextDestroyed);
        }
        let value = ctx
            .registry
            .borrow()
            .pinned(self.shared.slot)
            .ok_or(Error::ContextDestroyed)?;
        f(&ctx, &value)
    }
}

impl PartialEq for JsRef {
    fn eq(&self, other: &Self) -> bool {
        self.shared.ctx_id == other.shared.ctx_id && self.shared.slot == other.shared.slot
    }
}

impl fmt::Debug for JsRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JsRef({:?}, slot {})", self.shared.kind, self.shared.slot)
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        // Release our share of the pin. Off-thread or post-teardown the pin
        // is left to context teardown, which force-releases everything.
        let Ok(weak) = self.ctx.get() else {
            log::warn!("guest handle dropped on a foreign thread; pin released at teardown");
            return;
        };
        if let Some(ctx) = weak.upgrade() {
            if ctx.alive.get() {
                let evicted = ctx.registry.borrow_mut().unpin(self.slot);
                drop(evicted);
            }
        }
    }
}

/// Lazy iterator over an array-kind handle.
pub struct Elements {
    target: JsRef,
    len: usize,
    index: usize,
}

impl Iterator for Elements {
    type Item = Result<HostValue>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.len {
            return None;
        }
        let item = self.target.index(self.index);
        self.index += 1;
        Some(item)
    }
}
