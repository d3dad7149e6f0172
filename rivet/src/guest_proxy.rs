//! Guest-side proxies: host values standing in the engine's heap.
//!
//! A [`HostProxy`] implements the engine's native-object hook and forwards
//! every operation script performs on it to the wrapped host value. Which
//! forwarding behavior applies is decided once, at creation, by probing the
//! host value's capability ([`HostKind`]); the discriminator is fixed for
//! the proxy's lifetime.

use std::any::Any;
use std::rc::{Rc, Weak};

use rivet_js::error::{JsError, JsResult};
use rivet_js::native::NativeObject;
use rivet_js::object::PropertyKey;
use rivet_js::{Engine, Value};

use crate::context::ContextInner;
use crate::convert;
use crate::error::Error;
use crate::host::{lock, HostValue};

/// Capability discriminator for a host value exposed to script.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum HostKind {
    /// Index-addressed sequence (list).
    Sequence,
    /// Key-addressed mapping (dict).
    Mapping,
    /// Callable.
    Callable,
    /// Attribute-style object.
    Plain,
}

impl HostKind {
    /// Probe a host value's capability.
    pub fn probe(value: &HostValue) -> HostKind {
        match value {
            HostValue::List(_) => HostKind::Sequence,
            HostValue::Map(_) => HostKind::Mapping,
            HostValue::Func(_) => HostKind::Callable,
            _ => HostKind::Plain,
        }
    }
}

/// A guest-heap stand-in for a host value.
pub(crate) struct HostProxy {
    ctx: Weak<ContextInner>,
    host: HostValue,
    identity: usize,
    kind: HostKind,
}

impl HostProxy {
    pub fn new(ctx: Weak<ContextInner>, host: HostValue, identity: usize, kind: HostKind) -> Self {
        HostProxy {
            ctx,
            host,
            identity,
            kind,
        }
    }

    /// The wrapped host value.
    pub fn host(&self) -> &HostValue {
        &self.host
    }

    fn ctx(&self) -> JsResult<Rc<ContextInner>> {
        let ctx = self
            .ctx
            .upgrade()
            .ok_or_else(|| JsError::host("context destroyed"))?;
        if !ctx.alive.get() {
            return Err(JsError::host("context destroyed"));
        }
        Ok(ctx)
    }

    fn key_index(&self, key: &PropertyKey) -> Option<usize> {
        key.as_index().map(|i| i as usize)
    }
}

fn to_js(err: Error) -> JsError {
    JsError::host(err.to_string())
}

impl NativeObject for HostProxy {
    fn class_name(&self) -> &'static str {
        "host object"
    }

    fn is_callable(&self) -> bool {
        self.kind == HostKind::Callable
    }

    fn get(&self, _engine: &Engine, key: &PropertyKey) -> JsResult<Value> {
        let ctx = self.ctx()?;
        match (&self.host, self.kind) {
            (HostValue::List(list), HostKind::Sequence) => {
                if matches!(key, PropertyKey::String(s) if s == "length") {
                    return Ok(Value::Number(lock(list).len() as f64));
                }
                let element = self
                    .key_index(key)
                    .and_then(|i| lock(list).get(i).cloned());
                match element {
                    Some(element) => convert::host_to_guest(&ctx, &element).map_err(to_js),
                    None => Ok(Value::Undefined),
                }
            }
            (HostValue::Map(map), HostKind::Mapping) => {
                let entry = lock(map).get(&key.to_string()).cloned();
                match entry {
                    Some(entry) => convert::host_to_guest(&ctx, &entry).map_err(to_js),
                    None => Ok(Value::Undefined),
                }
            }
            (HostValue::Object(object), HostKind::Plain) => match object.attr(&key.to_string()) {
                Some(value) => convert::host_to_guest(&ctx, &value).map_err(to_js),
                None => Ok(Value::Undefined),
            },
            _ => Ok(Value::Undefined),
        }
    }

    fn set(&self, _engine: &Engine, key: &PropertyKey, value: Value) -> JsResult<()> {
        let ctx = self.ctx()?;
        let value = convert::guest_to_host(&ctx, &value).map_err(to_js)?;
        match (&self.host, self.kind) {
            (HostValue::List(list), HostKind::Sequence) => {
                let index = self.key_index(key).ok_or_else(|| {
                    JsError::type_error(format!("invalid index '{}' for host list", key))
                })?;
                let mut list = lock(list);
                // no silent extension of host sequences
                if index >= list.len() {
                    return Err(JsError::range(format!(
                        "index {} out of range for host list of length {}",
                        index,
                        list.len()
                    )));
                }
                list[index] = value;
                Ok(())
            }
            (HostValue::Map(map), HostKind::Mapping) => {
                lock(map).insert(key.to_string(), value);
                Ok(())
            }
            (HostValue::Object(object), HostKind::Plain) => {
                object.set_attr(&key.to_string(), value).map_err(to_js)
            }
            _ => Err(JsError::type_error(format!(
                "cannot set property '{}' on this {}",
                key,
                self.class_name()
            ))),
        }
    }

    fn has(&self, _engine: &Engine, key: &PropertyKey) -> JsResult<bool> {
        match (&self.host, self.kind) {
            (HostValue::List(list), HostKind::Sequence) => {
                if matches!(key, PropertyKey::String(s) if s == "length") {
                    return Ok(true);
                }
                Ok(self
                    .key_index(key)
                    .map_or(false, |i| i < lock(list).len()))
            }
            (HostValue::Map(map), HostKind::Mapping) => {
                Ok(lock(map).contains_key(&key.to_string()))
            }
            (HostValue::Object(object), HostKind::Plain) => {
                let name = key.to_string();
                Ok(object.attr(&name).is_some() || object.attr_names().contains(&name))
            }
            _ => Ok(false),
        }
    }

    fn own_keys(&self, _engine: &Engine) -> JsResult<Vec<String>> {
        let keys = match (&self.host, self.kind) {
            (HostValue::List(list), HostKind::Sequence) => {
                (0..lock(list).len()).map(|i| i.to_string()).collect()
            }
            (HostValue::Map(map), HostKind::Mapping) => lock(map).keys().cloned().collect(),
            (HostValue::Object(object), HostKind::Plain) => object.attr_names(),
            _ => Vec::new(),
        };
        Ok(keys)
    }

    fn call(&self, _engine: &Engine, _this: &Value, args: &[Value]) -> JsResult<Value> {
        let ctx = self.ctx()?;
        let HostValue::Func(func) = &self.host else {
            return Err(JsError::type_error(format!(
                "this {} is not callable",
                self.class_name()
            )));
        };
        let mut host_args = Vec::with_capacity(args.len());
        for arg in args {
            host_args.push(convert::guest_to_host(&ctx, arg).map_err(to_js)?);
        }
        let result = (func.as_ref())(&host_args).map_err(to_js)?;
        convert::host_to_guest(&ctx, &result).map_err(to_js)
    }

    fn construct(&self, _engine: &Engine, _args: &[Value]) -> JsResult<Value> {
        // Host construction semantics (constructor side effects, inheritance)
        // are not reproducible from script.
        Err(JsError::type_error("can't use new on host objects"))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for HostProxy {
    fn drop(&mut self) {
        // Guest collector finalizer: the stand-in is gone, release the
        // registry entry that kept the host value alive.
        if let Some(ctx) = self.ctx.upgrade() {
            let evicted = ctx.registry.borrow_mut().release_export(self.identity);
            drop(evicted);
        }
    }
}
