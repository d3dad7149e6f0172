//! The host-side value model.
//!
//! `HostValue` is the embedding program's object model as the bridge sees
//! it. Compound values are `Arc`-shared: they stay alive while either side
//! holds them, they have a stable identity (the allocation address), and
//! they can cross threads on the host side. Only the *guest-facing*
//! operations are thread-bound.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use hashbrown::HashMap;

use crate::error::{Error, Result};
use crate::js_ref::JsRef;

/// A shared, mutable host sequence.
pub type HostList = Arc<Mutex<Vec<HostValue>>>;

/// A shared, mutable host mapping.
pub type HostMap = Arc<Mutex<HashMap<String, HostValue>>>;

/// A host callable.
pub type HostFn = Arc<dyn Fn(&[HostValue]) -> Result<HostValue> + Send + Sync>;

/// Attribute-style capability for host objects exposed to script.
///
/// `attr` may return bound methods as [`HostValue::Func`] closures; script
/// sees those as callables that operate on the original object.
pub trait HostObject: Send + Sync {
    /// Attribute lookup.
    fn attr(&self, name: &str) -> Option<HostValue>;

    /// Attribute assignment. Objects are read-only unless they override.
    fn set_attr(&self, name: &str, _value: HostValue) -> Result<()> {
        Err(Error::js(format!("attribute '{}' is read-only", name)))
    }

    /// The attribute names enumeration yields.
    fn attr_names(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Any value native to the host.
#[derive(Clone)]
pub enum HostValue {
    /// The single "no value" representation; both guest `null` and guest
    /// `undefined` collapse to it.
    None,
    /// A boolean.
    Bool(bool),
    /// An integer.
    Int(i64),
    /// A double.
    Float(f64),
    /// A string.
    Str(String),
    /// A shared sequence.
    List(HostList),
    /// A shared string-keyed mapping.
    Map(HostMap),
    /// A callable.
    Func(HostFn),
    /// An attribute-style object.
    Object(Arc<dyn HostObject>),
    /// A handle to a guest value (host-side proxy).
    Js(JsRef),
}

impl HostValue {
    /// Create a shared list value.
    pub fn list(values: Vec<HostValue>) -> Self {
        HostValue::List(Arc::new(Mutex::new(values)))
    }

    /// Create a shared map value.
    pub fn map(entries: HashMap<String, HostValue>) -> Self {
        HostValue::Map(Arc::new(Mutex::new(entries)))
    }

    /// Create a callable value.
    pub fn func<F>(f: F) -> Self
    where
        F: Fn(&[HostValue]) -> Result<HostValue> + Send + Sync + 'static,
    {
        HostValue::Func(Arc::new(f))
    }

    /// Create an object value.
    pub fn object<O: HostObject + 'static>(object: O) -> Self {
        HostValue::Object(Arc::new(object))
    }

    /// Check for the "no value" value.
    pub fn is_none(&self) -> bool {
        matches!(self, HostValue::None)
    }

    /// The integer, if this is one.
    pub fn as_int(&self) -> Option<i64> {
        if let HostValue::Int(n) = self {
            Some(*n)
        } else {
            None
        }
    }

    /// The value as a double, if numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HostValue::Int(n) => Some(*n as f64),
            HostValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// The string, if this is one.
    pub fn as_str(&self) -> Option<&str> {
        if let HostValue::Str(s) = self {
            Some(s)
        } else {
            None
        }
    }

    /// The boolean, if this is one.
    pub fn as_bool(&self) -> Option<bool> {
        if let HostValue::Bool(b) = self {
            Some(*b)
        } else {
            None
        }
    }

    /// The guest handle, if this wraps one.
    pub fn as_js(&self) -> Option<&JsRef> {
        if let HostValue::Js(r) = self {
            Some(r)
        } else {
            None
        }
    }

    /// Stable identity of a compound value: the shared allocation address.
    /// Primitives (and guest handles) have no host-side identity.
    pub fn identity(&self) -> Option<usize> {
        match self {
            HostValue::List(l) => Some(Arc::as_ptr(l) as *const () as usize),
            HostValue::Map(m) => Some(Arc::as_ptr(m) as *const () as usize),
            HostValue::Func(f) => Some(Arc::as_ptr(f) as *const () as usize),
            HostValue::Object(o) => Some(Arc::as_ptr(o) as *const () as usize),
            _ => None,
        }
    }

    /// Whether two values are the same shared compound value.
    pub fn same_identity(&self, other: &HostValue) -> bool {
        match (self.identity(), other.identity()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialEq for HostValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (HostValue::None, HostValue::None) => true,
            (HostValue::Bool(a), HostValue::Bool(b)) => a == b,
            (HostValue::Int(a), HostValue::Int(b)) => a == b,
            (HostValue::Float(a), HostValue::Float(b)) => a == b,
            (HostValue::Int(a), HostValue::Float(b)) => (*a as f64) == *b,
            (HostValue::Float(a), HostValue::Int(b)) => *a == (*b as f64),
            (HostValue::Str(a), HostValue::Str(b)) => a == b,
            (HostValue::List(a), HostValue::List(b)) => {
                Arc::ptr_eq(a, b) || *lock(a) == *lock(b)
            }
            (HostValue::Map(a), HostValue::Map(b)) => Arc::ptr_eq(a, b) || *lock(a) == *lock(b),
            (HostValue::Func(_), HostValue::Func(_))
            | (HostValue::Object(_), HostValue::Object(_)) => self.same_identity(other),
            (HostValue::Js(a), HostValue::Js(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::None => write!(f, "None"),
            HostValue::Bool(b) => write!(f, "Bool({})", b),
            HostValue::Int(n) => write!(f, "Int({})", n),
            HostValue::Float(x) => write!(f, "Float({})", x),
            HostValue::Str(s) => write!(f, "Str({:?})", s),
            HostValue::List(l) => write!(f, "List(len={})", lock(l).len()),
            HostValue::Map(m) => write!(f, "Map(len={})", lock(m).len()),
            HostValue::Func(_) => write!(f, "Func"),
            HostValue::Object(_) => write!(f, "Object"),
            HostValue::Js(r) => write!(f, "Js({:?})", r),
        }
    }
}

impl From<bool> for HostValue {
    fn from(b: bool) -> Self {
        HostValue::Bool(b)
    }
}

impl From<i64> for HostValue {
    fn from(n: i64) -> Self {
        HostValue::Int(n)
    }
}

impl From<i32> for HostValue {
    fn from(n: i32) -> Self {
        HostValue::Int(n as i64)
    }
}

impl From<f64> for HostValue {
    fn from(f: f64) -> Self {
        HostValue::Float(f)
    }
}

impl From<&str> for HostValue {
    fn from(s: &str) -> Self {
        HostValue::Str(s.into())
    }
}

impl From<String> for HostValue {
    fn from(s: String) -> Self {
        HostValue::Str(s)
    }
}

impl From<JsRef> for HostValue {
    fn from(r: JsRef) -> Self {
        HostValue::Js(r)
    }
}

/// Lock a shared host container, tolerating poisoning: a panicked writer
/// leaves data that is still structurally valid for bridging purposes.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_equality_crosses_variants() {
        assert_eq!(HostValue::Int(2), HostValue::Float(2.0));
        assert_ne!(HostValue::Int(2), HostValue::Float(2.5));
        assert_ne!(HostValue::Int(1), HostValue::Str("1".into()));
    }

    #[test]
    fn identity_is_per_allocation() {
        let a = HostValue::list(vec![HostValue::Int(1)]);
        let b = a.clone();
        let c = HostValue::list(vec![HostValue::Int(1)]);
        assert!(a.same_identity(&b));
        assert!(!a.same_identity(&c));
        // contents still compare equal
        assert_eq!(a, c);
        assert!(HostValue::Int(3).identity().is_none());
    }

    #[test]
    fn object_attrs() {
        struct Config;
        impl HostObject for Config {
            fn attr(&self, name: &str) -> Option<HostValue> {
                (name == "version").then(|| HostValue::Int(3))
            }
            fn attr_names(&self) -> Vec<String> {
                vec!["version".into()]
            }
        }
        let v = HostValue::object(Config);
        let HostValue::Object(obj) = &v else {
            panic!("expected object");
        };
        assert_eq!(obj.attr("version"), Some(HostValue::Int(3)));
        assert!(obj.attr("missing").is_none());
        assert!(obj.set_attr("version", HostValue::Int(4)).is_err());
    }
}
