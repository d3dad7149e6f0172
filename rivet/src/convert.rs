//! Bidirectional value conversion.
//!
//! Primitives are converted losslessly in both directions; compound values
//! are never copied: they cross the boundary as lazy proxies created by
//! [`crate::guest_proxy`] (host → guest) and [`crate::js_ref`] (guest →
//! host), deduplicated through the registry so identity survives a round
//! trip in either direction.

use std::rc::Rc;

use rivet_js::object::JsObject;
use rivet_js::Value;

use crate::context::ContextInner;
use crate::error::{Error, Result};
use crate::guest_proxy::{HostKind, HostProxy};
use crate::host::HostValue;
use crate::js_ref::JsRef;

/// Largest magnitude an integer may have and still convert exactly to a
/// double: 2^53.
pub(crate) const MAX_EXACT_INT: u64 = 1 << 53;

/// Convert a host value into a guest value, wrapping compounds as guest-side
/// proxies.
pub(crate) fn host_to_guest(ctx: &Rc<ContextInner>, value: &HostValue) -> Result<Value> {
    match value {
        HostValue::None => Ok(Value::Null),
        HostValue::Bool(b) => Ok(Value::Boolean(*b)),
        HostValue::Int(n) => {
            if n.unsigned_abs() > MAX_EXACT_INT {
                return Err(Error::Overflow { value: *n });
            }
            Ok(Value::Number(*n as f64))
        }
        HostValue::Float(f) => Ok(Value::Number(*f)),
        HostValue::Str(s) => Ok(Value::string(s.clone())),
        HostValue::Js(r) => {
            // A guest value going back in: hand the original back instead of
            // proxying a proxy.
            if r.context_id() != Rc::as_ptr(ctx) as usize {
                return Err(Error::js("value belongs to a different context"));
            }
            r.guest_value()
        }
        HostValue::List(_) | HostValue::Map(_) | HostValue::Func(_) | HostValue::Object(_) => {
            export_proxy(ctx, value)
        }
    }
}

/// Find or create the guest-side stand-in for a compound host value.
fn export_proxy(ctx: &Rc<ContextInner>, value: &HostValue) -> Result<Value> {
    let identity = match value.identity() {
        Some(identity) => identity,
        None => return Err(Error::js("value cannot cross into the engine")),
    };
    if let Some(existing) = ctx.registry.borrow().lookup_export(identity) {
        return Ok(existing);
    }
    let kind = HostKind::probe(value);
    let proxy = HostProxy::new(Rc::downgrade(ctx), value.clone(), identity, kind);
    let obj = Rc::new(std::cell::RefCell::new(JsObject::native_object(Rc::new(
        proxy,
    ))));
    let stale = ctx
        .registry
        .borrow_mut()
        .insert_export(identity, value.clone(), &obj);
    drop(stale);
    Ok(Value::Object(obj))
}

/// Convert a guest value into a host value, wrapping compounds as host-side
/// proxies.
pub(crate) fn guest_to_host(ctx: &Rc<ContextInner>, value: &Value) -> Result<HostValue> {
    match value {
        // Both nothing-values collapse to the host's single one.
        Value::Undefined | Value::Null => Ok(HostValue::None),
        Value::Boolean(b) => Ok(HostValue::Bool(*b)),
        Value::Number(n) => Ok(number_to_host(*n)),
        Value::String(s) => Ok(HostValue::Str(s.clone())),
        Value::Object(obj) => {
            // A host value coming back out: return the original, not a
            // proxy of its own stand-in.
            let native = obj.borrow().native().cloned();
            if let Some(native) = native {
                if let Some(proxy) = native.as_any().downcast_ref::<HostProxy>() {
                    return Ok(proxy.host().clone());
                }
            }
            Ok(HostValue::Js(JsRef::wrap(ctx, value)?))
        }
    }
}

/// Integral doubles within the exact range come back as integers, so
/// integer round trips are exact; everything else stays a double.
pub(crate) fn number_to_host(n: f64) -> HostValue {
    if n.is_finite() && n.fract() == 0.0 && n.abs() <= MAX_EXACT_INT as f64 {
        HostValue::Int(n as i64)
    } else {
        HostValue::Float(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_mapping() {
        assert_eq!(number_to_host(2.0), HostValue::Int(2));
        assert_eq!(number_to_host(-7.0), HostValue::Int(-7));
        assert_eq!(number_to_host(2.5), HostValue::Float(2.5));
        assert_eq!(
            number_to_host(1.23456789012345678909),
            HostValue::Float(1.23456789012345678909)
        );
        assert!(matches!(number_to_host(f64::NAN), HostValue::Float(_)));
        assert!(matches!(number_to_host(1e300), HostValue::Float(_)));
    }

    #[test]
    fn exact_integer_bound() {
        let max = MAX_EXACT_INT as i64;
        assert_eq!(number_to_host(max as f64), HostValue::Int(max));
        // one past the bound stays a float
        assert!(matches!(
            number_to_host((max as f64) * 2.0),
            HostValue::Float(_)
        ));
    }
}
