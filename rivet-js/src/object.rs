//! JavaScript object system.
//!
//! Objects carry a kind tag, a flat property table, array element storage,
//! an optional callable, and an optional native payload the interpreter
//! defers to (see [`crate::native::NativeObject`]).

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::ast::Statement;
use crate::error::{JsError, JsResult};
use crate::interpreter::Engine;
use crate::native::NativeObject;
use crate::value::Value;

/// Property key (string or array index).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    /// String key.
    String(String),
    /// Index key (for arrays).
    Index(u32),
}

impl PropertyKey {
    /// Create a string key.
    pub fn string<S: Into<String>>(s: S) -> Self {
        PropertyKey::String(s.into())
    }

    /// Create an index key.
    pub fn index(i: u32) -> Self {
        PropertyKey::Index(i)
    }

    /// The index this key addresses, if any. Numeric string keys count.
    pub fn as_index(&self) -> Option<u32> {
        match self {
            PropertyKey::Index(i) => Some(*i),
            PropertyKey::String(s) => {
                if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
                    None
                } else {
                    s.parse::<u32>().ok()
                }
            }
        }
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyKey::String(s) => write!(f, "{}", s),
            PropertyKey::Index(i) => write!(f, "{}", i),
        }
    }
}

impl From<&str> for PropertyKey {
    fn from(s: &str) -> Self {
        PropertyKey::String(s.into())
    }
}

impl From<u32> for PropertyKey {
    fn from(i: u32) -> Self {
        PropertyKey::Index(i)
    }
}

/// Property storage.
#[derive(Clone)]
pub struct Property {
    /// The key.
    pub key: PropertyKey,
    /// The value.
    pub value: Value,
    /// Whether the property shows up in enumeration.
    pub enumerable: bool,
}

/// Object type classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectKind {
    /// Ordinary object.
    Ordinary,
    /// Array object.
    Array,
    /// Function object.
    Function,
    /// Error object.
    Error,
}

/// A JavaScript object.
pub struct JsObject {
    /// Object kind.
    kind: ObjectKind,
    /// Properties.
    properties: Vec<Property>,
    /// Array elements (holes are stored as `undefined`).
    elements: Vec<Value>,
    /// Call internal method (for functions).
    callable: Option<Callable>,
    /// Native payload; when present the interpreter forwards property and
    /// call operations to it instead of the tables above.
    native: Option<Rc<dyn NativeObject>>,
}

impl JsObject {
    /// Create a new ordinary object.
    pub fn new() -> Self {
        JsObject {
            kind: ObjectKind::Ordinary,
            properties: Vec::new(),
            elements: Vec::new(),
            callable: None,
            native: None,
        }
    }

    /// Create an array object.
    pub fn array(elements: Vec<Value>) -> Self {
        JsObject {
            kind: ObjectKind::Array,
            properties: Vec::new(),
            elements,
            callable: None,
            native: None,
        }
    }

    /// Create a function object.
    pub fn function(callable: Callable) -> Self {
        JsObject {
            kind: ObjectKind::Function,
            properties: Vec::new(),
            elements: Vec::new(),
            callable: Some(callable),
            native: None,
        }
    }

    /// Create an error object.
    pub fn error<S: Into<String>, M: Into<String>>(name: S, message: M) -> Self {
        let mut obj = JsObject {
            kind: ObjectKind::Error,
            properties: Vec::new(),
            elements: Vec::new(),
            callable: None,
            native: None,
        };
        obj.insert(PropertyKey::string("name"), Value::string(name.into()));
        obj.insert(PropertyKey::string("message"), Value::string(message.into()));
        obj
    }

    /// Create an object backed by a native payload.
    pub fn native_object(native: Rc<dyn NativeObject>) -> Self {
        let kind = if native.is_callable() {
            ObjectKind::Function
        } else {
            ObjectKind::Ordinary
        };
        JsObject {
            kind,
            properties: Vec::new(),
            elements: Vec::new(),
            callable: None,
            native: Some(native),
        }
    }

    /// Get the object kind.
    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    /// Check if object is callable.
    pub fn is_callable(&self) -> bool {
        self.callable.is_some() || self.native.as_ref().map_or(false, |n| n.is_callable())
    }

    /// Check if object is an array.
    pub fn is_array(&self) -> bool {
        self.kind == ObjectKind::Array
    }

    /// Get the callable.
    pub fn callable(&self) -> Option<&Callable> {
        self.callable.as_ref()
    }

    /// Get the native payload, if any.
    pub fn native(&self) -> Option<&Rc<dyn NativeObject>> {
        self.native.as_ref()
    }

    /// Get an own property or array element.
    pub fn get(&self, key: &PropertyKey) -> Option<Value> {
        if self.kind == ObjectKind::Array {
            if let Some(i) = key.as_index() {
                return self.elements.get(i as usize).cloned();
            }
            if let PropertyKey::String(s) = key {
                if s == "length" {
                    return Some(Value::Number(self.elements.len() as f64));
                }
            }
        }
        self.properties
            .iter()
            .find(|p| &p.key == key)
            .map(|p| p.value.clone())
    }

    /// Set an own property or array element. Array element writes past the
    /// end extend the array with holes, per JS assignment semantics.
    pub fn set(&mut self, key: PropertyKey, value: Value) -> JsResult<()> {
        if self.kind == ObjectKind::Array {
            if let Some(i) = key.as_index() {
                let i = i as usize;
                while self.elements.len() <= i {
                    self.elements.push(Value::Undefined);
                }
                self.elements[i] = value;
                return Ok(());
            }
            if let PropertyKey::String(s) = &key {
                if s == "length" {
                    return Err(JsError::type_error("array length is not writable"));
                }
            }
        }
        self.insert(key, value);
        Ok(())
    }

    fn insert(&mut self, key: PropertyKey, value: Value) {
        if let Some(prop) = self.properties.iter_mut().find(|p| p.key == key) {
            prop.value = value;
        } else {
            self.properties.push(Property {
                key,
                value,
                enumerable: true,
            });
        }
    }

    /// Check if object has an own property or in-range element.
    pub fn has(&self, key: &PropertyKey) -> bool {
        if self.kind == ObjectKind::Array {
            if let Some(i) = key.as_index() {
                return (i as usize) < self.elements.len();
            }
            if let PropertyKey::String(s) = key {
                if s == "length" {
                    return true;
                }
            }
        }
        self.properties.iter().any(|p| &p.key == key)
    }

    /// Get own enumerable property keys, array indices first.
    pub fn own_keys(&self) -> Vec<PropertyKey> {
        let mut keys = Vec::new();
        for i in 0..self.elements.len() {
            keys.push(PropertyKey::Index(i as u32));
        }
        for prop in &self.properties {
            if prop.enumerable {
                keys.push(prop.key.clone());
            }
        }
        keys
    }

    /// Get array length.
    pub fn array_length(&self) -> usize {
        self.elements.len()
    }

    /// If this is an error object, return its name and message.
    pub fn error_parts(&self) -> Option<(String, String)> {
        if self.kind != ObjectKind::Error {
            return None;
        }
        let name = self.get(&PropertyKey::string("name"))?;
        let message = self.get(&PropertyKey::string("message"))?;
        Some((name.to_display_string(), message.to_display_string()))
    }
}

impl Default for JsObject {
    fn default() -> Self {
        Self::new()
    }
}

/// Callable function type.
#[derive(Clone)]
pub enum Callable {
    /// Native function.
    Native(NativeFunction),
    /// User-defined function.
    User(UserFunction),
}

/// Signature of a native function: engine, `this`, arguments.
pub type NativeFn = dyn Fn(&Engine, &Value, &[Value]) -> JsResult<Value>;

/// Native function.
#[derive(Clone)]
pub struct NativeFunction {
    /// Function name.
    pub name: String,
    /// Function body.
    pub func: Rc<NativeFn>,
}

/// User-defined function.
#[derive(Clone)]
pub struct UserFunction {
    /// Function name.
    pub name: Option<String>,
    /// Parameters.
    pub params: Rc<Vec<String>>,
    /// Function body.
    pub body: Rc<Vec<Statement>>,
    /// Captured environment.
    pub environment: Rc<RefCell<Environment>>,
}

/// Environment record: a scope's variable bindings.
pub struct Environment {
    /// Variable bindings.
    bindings: Vec<(String, Value)>,
    /// Outer environment.
    outer: Option<Rc<RefCell<Environment>>>,
    /// This binding.
    this_binding: Option<Value>,
}

impl Environment {
    /// Create a new global environment.
    pub fn global() -> Self {
        Environment {
            bindings: Vec::new(),
            outer: None,
            this_binding: Some(Value::Undefined),
        }
    }

    /// Create a child environment.
    pub fn child(outer: Rc<RefCell<Environment>>) -> Self {
        Environment {
            bindings: Vec::new(),
            outer: Some(outer),
            this_binding: None,
        }
    }

    /// Create a function environment.
    pub fn function(outer: Rc<RefCell<Environment>>, this_value: Value) -> Self {
        Environment {
            bindings: Vec::new(),
            outer: Some(outer),
            this_binding: Some(this_value),
        }
    }

    /// Declare and initialize a variable in this scope, overwriting any
    /// existing binding of the same name.
    pub fn declare(&mut self, name: &str, value: Value) {
        if let Some(binding) = self.bindings.iter_mut().find(|(n, _)| n == name) {
            binding.1 = value;
        } else {
            self.bindings.push((name.into(), value));
        }
    }

    /// Get a variable, walking the scope chain.
    pub fn get(&self, name: &str) -> JsResult<Value> {
        if let Some(value) = self.try_get(name) {
            return Ok(value);
        }
        Err(JsError::reference(format!("{} is not defined", name)))
    }

    /// Get a variable, walking the scope chain, without erroring.
    pub fn try_get(&self, name: &str) -> Option<Value> {
        if let Some((_, value)) = self.bindings.iter().find(|(n, _)| n == name) {
            return Some(value.clone());
        }
        self.outer.as_ref().and_then(|outer| outer.borrow().try_get(name))
    }

    /// Set a variable, walking the scope chain; creates a global binding if
    /// the name is unbound anywhere (sloppy mode).
    pub fn set(&mut self, name: &str, value: Value) {
        if let Some(binding) = self.bindings.iter_mut().find(|(n, _)| n == name) {
            binding.1 = value;
            return;
        }
        if let Some(outer) = &self.outer {
            outer.borrow_mut().set(name, value);
            return;
        }
        self.bindings.push((name.into(), value));
    }

    /// Remove a binding from this scope. Returns the previous value.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        if let Some(pos) = self.bindings.iter().position(|(n, _)| n == name) {
            return Some(self.bindings.remove(pos).1);
        }
        None
    }

    /// Check if a variable is bound anywhere on the chain.
    pub fn has(&self, name: &str) -> bool {
        self.try_get(name).is_some()
    }

    /// Get the `this` value.
    pub fn get_this(&self) -> Value {
        if let Some(this) = &self.this_binding {
            return this.clone();
        }
        if let Some(outer) = &self.outer {
            return outer.borrow().get_this();
        }
        Value::Undefined
    }

    /// Take every binding out of this scope, leaving it empty. Callers that
    /// hold a borrow of the environment can drop the returned values after
    /// releasing it.
    pub fn take_bindings(&mut self) -> Vec<(String, Value)> {
        std::mem::take(&mut self.bindings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_get_set_and_length() {
        let mut arr = JsObject::array(vec![Value::Number(1.0), Value::Number(2.0)]);
        assert_eq!(arr.array_length(), 2);
        assert!(arr
            .get(&PropertyKey::string("length"))
            .unwrap()
            .strict_equals(&Value::Number(2.0)));

        arr.set(PropertyKey::Index(4), Value::Number(5.0)).unwrap();
        assert_eq!(arr.array_length(), 5);
        assert!(arr.get(&PropertyKey::Index(2)).unwrap().is_undefined());
        assert!(arr.get(&PropertyKey::Index(9)).is_none());
    }

    #[test]
    fn numeric_string_keys_address_elements() {
        let arr = JsObject::array(vec![Value::Number(7.0)]);
        let v = arr.get(&PropertyKey::string("0")).unwrap();
        assert!(v.strict_equals(&Value::Number(7.0)));
    }

    #[test]
    fn own_keys_order() {
        let mut obj = JsObject::new();
        obj.set(PropertyKey::string("a"), Value::Number(1.0)).unwrap();
        obj.set(PropertyKey::string("b"), Value::Number(2.0)).unwrap();
        let keys: Vec<String> = obj.own_keys().iter().map(|k| k.to_string()).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn environment_scope_chain() {
        let global = Rc::new(RefCell::new(Environment::global()));
        global.borrow_mut().declare("x", Value::Number(1.0));

        let child = Rc::new(RefCell::new(Environment::child(global.clone())));
        assert!(child.borrow().try_get("x").is_some());

        child.borrow_mut().set("x", Value::Number(2.0));
        assert!(global
            .borrow()
            .try_get("x")
            .unwrap()
            .strict_equals(&Value::Number(2.0)));

        assert!(child.borrow().get("missing").is_err());
    }
}
