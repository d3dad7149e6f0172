//! JavaScript interpreter.
//!
//! Tree-walking interpreter for the JavaScript AST. The engine takes `&self`
//! everywhere and threads the active environment down the call tree, so
//! embedder callbacks invoked from script may re-enter the engine (nested
//! `eval`, calls back into guest functions) without aliasing conflicts.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::ast::*;
use crate::error::{JsError, JsResult};
use crate::object::{
    Callable, Environment, JsObject, NativeFunction, PropertyKey, UserFunction,
};
use crate::parser;
use crate::value::{format_number, Completion, Value};

type EnvRef = Rc<RefCell<Environment>>;

/// JavaScript engine.
pub struct Engine {
    /// Global environment.
    global_env: EnvRef,
    /// Current call stack depth.
    call_depth: Cell<usize>,
    /// Maximum call stack depth.
    max_call_depth: usize,
}

impl Engine {
    /// Create a new engine with built-in globals installed.
    pub fn new() -> Self {
        let engine = Engine {
            global_env: Rc::new(RefCell::new(Environment::global())),
            call_depth: Cell::new(0),
            max_call_depth: 256,
        };
        engine.install_builtins();
        engine
    }

    fn install_builtins(&self) {
        self.set_global("undefined", Value::Undefined);
        self.set_global("NaN", Value::Number(f64::NAN));
        self.set_global("Infinity", Value::Number(f64::INFINITY));
        self.define_native_function("Error", |_engine, _this, args| {
            let message = args
                .first()
                .map(|v| v.to_display_string())
                .unwrap_or_default();
            Ok(Value::object(JsObject::error("Error", message)))
        });
    }

    /// Evaluate JavaScript source code.
    pub fn eval(&self, source: &str) -> JsResult<Value> {
        let program = parser::parse(source)?;
        self.execute(&program)
    }

    /// Execute a parsed program; the result is the value of the last
    /// normally-completing statement.
    pub fn execute(&self, program: &Program) -> JsResult<Value> {
        let env = self.global_env.clone();
        let mut last_value = Value::Undefined;
        for statement in &program.body {
            match self.execute_statement(statement, &env)? {
                Completion::Normal(v) => last_value = v,
                Completion::Return(v) => return Ok(v),
                Completion::Break => {
                    return Err(JsError::syntax("illegal break statement"));
                }
                Completion::Continue => {
                    return Err(JsError::syntax("illegal continue statement"));
                }
            }
        }
        Ok(last_value)
    }

    /// Set a global binding.
    pub fn set_global(&self, name: &str, value: Value) {
        self.global_env.borrow_mut().declare(name, value);
    }

    /// Look up a global binding.
    pub fn lookup_global(&self, name: &str) -> Option<Value> {
        self.global_env.borrow().try_get(name)
    }

    /// Remove a global binding, returning its previous value.
    pub fn remove_global(&self, name: &str) -> Option<Value> {
        self.global_env.borrow_mut().remove(name)
    }

    /// Drop every global binding. Values are released after the environment
    /// borrow ends, so native payload finalizers may run embedder code.
    pub fn clear_globals(&self) {
        let removed = { self.global_env.borrow_mut().take_bindings() };
        drop(removed);
    }

    /// Define a global native function.
    pub fn define_native_function<F>(&self, name: &str, func: F)
    where
        F: Fn(&Engine, &Value, &[Value]) -> JsResult<Value> + 'static,
    {
        let callable = Callable::Native(NativeFunction {
            name: name.into(),
            func: Rc::new(func),
        });
        self.set_global(name, Value::object(JsObject::function(callable)));
    }

    // -----------------------------------------------------------------
    // Value exchange operations used by embedders
    // -----------------------------------------------------------------

    /// Get a property of a value.
    pub fn get_property(&self, value: &Value, key: &PropertyKey) -> JsResult<Value> {
        match value {
            Value::Object(obj) => {
                let native = obj.borrow().native().cloned();
                if let Some(native) = native {
                    return native.get(self, key);
                }
                Ok(obj.borrow().get(key).unwrap_or(Value::Undefined))
            }
            Value::String(s) => {
                if matches!(key, PropertyKey::String(name) if name == "length") {
                    return Ok(Value::Number(s.chars().count() as f64));
                }
                Ok(Value::Undefined)
            }
            Value::Undefined | Value::Null => Err(JsError::type_error(format!(
                "cannot read property '{}' of {}",
                key,
                value.to_display_string()
            ))),
            _ => Ok(Value::Undefined),
        }
    }

    /// Set a property of a value.
    pub fn set_property(&self, value: &Value, key: PropertyKey, v: Value) -> JsResult<()> {
        match value {
            Value::Object(obj) => {
                let native = obj.borrow().native().cloned();
                if let Some(native) = native {
                    return native.set(self, &key, v);
                }
                obj.borrow_mut().set(key, v)
            }
            Value::Undefined | Value::Null => Err(JsError::type_error(format!(
                "cannot set property '{}' of {}",
                key,
                value.to_display_string()
            ))),
            _ => Ok(()),
        }
    }

    /// Membership test (the `in` operator).
    pub fn has_property(&self, value: &Value, key: &PropertyKey) -> JsResult<bool> {
        match value {
            Value::Object(obj) => {
                let native = obj.borrow().native().cloned();
                if let Some(native) = native {
                    return native.has(self, key);
                }
                Ok(obj.borrow().has(key))
            }
            _ => Err(JsError::type_error(format!(
                "cannot use 'in' on {}",
                value.to_display_string()
            ))),
        }
    }

    /// Own enumerable keys of a value; empty for non-objects.
    pub fn own_keys(&self, value: &Value) -> JsResult<Vec<PropertyKey>> {
        match value {
            Value::Object(obj) => {
                let native = obj.borrow().native().cloned();
                if let Some(native) = native {
                    let keys = native.own_keys(self)?;
                    return Ok(keys.into_iter().map(PropertyKey::String).collect());
                }
                Ok(obj.borrow().own_keys())
            }
            _ => Ok(Vec::new()),
        }
    }

    /// Array length of a value.
    pub fn array_length(&self, value: &Value) -> JsResult<usize> {
        if let Value::Object(obj) = value {
            if obj.borrow().is_array() {
                return Ok(obj.borrow().array_length());
            }
        }
        Err(JsError::type_error("value has no length"))
    }

    /// Call a function value.
    pub fn call_function(&self, func: &Value, this: &Value, args: &[Value]) -> JsResult<Value> {
        let Value::Object(obj) = func else {
            return Err(JsError::type_error(format!(
                "{} is not a function",
                func.to_display_string()
            )));
        };
        let native = obj.borrow().native().cloned();
        if let Some(native) = native {
            if native.is_callable() {
                let _guard = self.enter_call()?;
                return native.call(self, this, args);
            }
        }
        let callable = obj.borrow().callable().cloned();
        match callable {
            Some(callable) => {
                let _guard = self.enter_call()?;
                self.call_callable(&callable, this, args)
            }
            None => Err(JsError::type_error(format!(
                "{} is not a function",
                func.to_display_string()
            ))),
        }
    }

    /// Invoke a function value as a constructor.
    pub fn construct(&self, func: &Value, args: &[Value]) -> JsResult<Value> {
        let Value::Object(obj) = func else {
            return Err(JsError::type_error("value is not a constructor"));
        };
        let native = obj.borrow().native().cloned();
        if let Some(native) = native {
            let _guard = self.enter_call()?;
            return native.construct(self, args);
        }
        if obj.borrow().callable().is_none() {
            return Err(JsError::type_error("value is not a constructor"));
        }
        let new_obj = Value::object(JsObject::new());
        let result = self.call_function(func, &new_obj, args)?;
        if result.is_object() {
            Ok(result)
        } else {
            Ok(new_obj)
        }
    }

    // -----------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------

    fn execute_statement(&self, stmt: &Statement, env: &EnvRef) -> JsResult<Completion> {
        match stmt {
            Statement::Empty => Ok(Completion::empty()),
            Statement::Expression(expr) => {
                let value = self.evaluate(expr, env)?;
                Ok(Completion::normal(value))
            }
            Statement::Block(body) => self.execute_block(body, env),
            Statement::Var { declarations, .. } => {
                for decl in declarations {
                    let value = match &decl.init {
                        Some(init) => self.evaluate(init, env)?,
                        None => Value::Undefined,
                    };
                    env.borrow_mut().declare(&decl.name, value);
                }
                Ok(Completion::empty())
            }
            Statement::Function { name, params, body } => {
                let func = self.make_function(Some(name.clone()), params, body, env);
                env.borrow_mut().declare(name, func);
                Ok(Completion::empty())
            }
            Statement::If {
                test,
                consequent,
                alternate,
            } => {
                if self.evaluate(test, env)?.to_boolean() {
                    self.execute_statement(consequent, env)
                } else if let Some(alternate) = alternate {
                    self.execute_statement(alternate, env)
                } else {
                    Ok(Completion::empty())
                }
            }
            Statement::While { test, body } => {
                while self.evaluate(test, env)?.to_boolean() {
                    match self.execute_statement(body, env)? {
                        Completion::Break => break,
                        Completion::Return(v) => return Ok(Completion::Return(v)),
                        Completion::Continue | Completion::Normal(_) => {}
                    }
                }
                Ok(Completion::empty())
            }
            Statement::DoWhile { body, test } => {
                loop {
                    match self.execute_statement(body, env)? {
                        Completion::Break => break,
                        Completion::Return(v) => return Ok(Completion::Return(v)),
                        Completion::Continue | Completion::Normal(_) => {}
                    }
                    if !self.evaluate(test, env)?.to_boolean() {
                        break;
                    }
                }
                Ok(Completion::empty())
            }
            Statement::For {
                init,
                test,
                update,
                body,
            } => {
                let loop_env = Rc::new(RefCell::new(Environment::child(env.clone())));
                if let Some(init) = init {
                    self.execute_statement(init, &loop_env)?;
                }
                loop {
                    if let Some(test) = test {
                        if !self.evaluate(test, &loop_env)?.to_boolean() {
                            break;
                        }
                    }
                    match self.execute_statement(body, &loop_env)? {
                        Completion::Break => break,
                        Completion::Return(v) => return Ok(Completion::Return(v)),
                        Completion::Continue | Completion::Normal(_) => {}
                    }
                    if let Some(update) = update {
                        self.evaluate(update, &loop_env)?;
                    }
                }
                Ok(Completion::empty())
            }
            Statement::ForIn {
                decl,
                binding,
                object,
                body,
            } => {
                let object = self.evaluate(object, env)?;
                let keys = self.own_keys(&object)?;
                let loop_env = Rc::new(RefCell::new(Environment::child(env.clone())));
                for key in keys {
                    let key_value = Value::string(key.to_string());
                    if decl.is_some() {
                        loop_env.borrow_mut().declare(binding, key_value);
                    } else {
                        loop_env.borrow_mut().set(binding, key_value);
                    }
                    match self.execute_statement(body, &loop_env)? {
                        Completion::Break => break,
                        Completion::Return(v) => return Ok(Completion::Return(v)),
                        Completion::Continue | Completion::Normal(_) => {}
                    }
                }
                Ok(Completion::empty())
            }
            Statement::Break => Ok(Completion::Break),
            Statement::Continue => Ok(Completion::Continue),
            Statement::Return(argument) => {
                let value = match argument {
                    Some(expr) => self.evaluate(expr, env)?,
                    None => Value::Undefined,
                };
                Ok(Completion::Return(value))
            }
            Statement::Throw(expr) => {
                let value = self.evaluate(expr, env)?;
                Err(JsError::Thrown(value))
            }
            Statement::Try {
                block,
                param,
                handler,
                finalizer,
            } => {
                let mut result = self.execute_block(block, env);
                if let Err(err) = &result {
                    if let Some(handler) = handler {
                        let handler_env =
                            Rc::new(RefCell::new(Environment::child(env.clone())));
                        if let Some(param) = param {
                            handler_env
                                .borrow_mut()
                                .declare(param, error_to_value(err.clone()));
                        }
                        result = self.execute_statements(handler, &handler_env);
                    }
                }
                if let Some(finalizer) = finalizer {
                    let completion = self.execute_block(finalizer, env)?;
                    if !matches!(completion, Completion::Normal(_)) {
                        return Ok(completion);
                    }
                }
                result
            }
        }
    }

    fn execute_block(&self, body: &[Statement], env: &EnvRef) -> JsResult<Completion> {
        let block_env = Rc::new(RefCell::new(Environment::child(env.clone())));
        self.execute_statements(body, &block_env)
    }

    fn execute_statements(&self, body: &[Statement], env: &EnvRef) -> JsResult<Completion> {
        let mut last_value = Value::Undefined;
        for statement in body {
            match self.execute_statement(statement, env)? {
                Completion::Normal(v) => last_value = v,
                abrupt => return Ok(abrupt),
            }
        }
        Ok(Completion::Normal(last_value))
    }

    // -----------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------

    fn evaluate(&self, expr: &Expression, env: &EnvRef) -> JsResult<Value> {
        match expr {
            Expression::Number(n) => Ok(Value::Number(*n)),
            Expression::String(s) => Ok(Value::string(s.clone())),
            Expression::Boolean(b) => Ok(Value::Boolean(*b)),
            Expression::Null => Ok(Value::Null),
            Expression::This => Ok(env.borrow().get_this()),
            Expression::Identifier(name) => env.borrow().get(name),
            Expression::Array(elements) => {
                let mut values = Vec::with_capacity(elements.len());
                for element in elements {
                    values.push(self.evaluate(element, env)?);
                }
                Ok(Value::object(JsObject::array(values)))
            }
            Expression::Object(properties) => {
                let mut obj = JsObject::new();
                for (name, value) in properties {
                    let value = self.evaluate(value, env)?;
                    obj.set(PropertyKey::string(name.as_key()), value)?;
                }
                Ok(Value::object(obj))
            }
            Expression::Function { name, params, body } => {
                Ok(self.make_function(name.clone(), params, body, env))
            }
            Expression::Unary { op, argument } => self.evaluate_unary(*op, argument, env),
            Expression::Update {
                op,
                prefix,
                argument,
            } => {
                let current = self.evaluate(argument, env)?.to_number();
                let delta = match op {
                    UpdateOp::Increment => 1.0,
                    UpdateOp::Decrement => -1.0,
                };
                let updated = Value::Number(current + delta);
                self.store_target(argument, updated.clone(), env)?;
                if *prefix {
                    Ok(updated)
                } else {
                    Ok(Value::Number(current))
                }
            }
            Expression::Binary { op, left, right } => {
                if *op == BinaryOp::In {
                    let key = value_to_key(&self.evaluate(left, env)?);
                    let object = self.evaluate(right, env)?;
                    return Ok(Value::Boolean(self.has_property(&object, &key)?));
                }
                let lhs = self.evaluate(left, env)?;
                let rhs = self.evaluate(right, env)?;
                Ok(apply_binary(*op, &lhs, &rhs))
            }
            Expression::Logical { op, left, right } => {
                let lhs = self.evaluate(left, env)?;
                match op {
                    LogicalOp::And => {
                        if lhs.to_boolean() {
                            self.evaluate(right, env)
                        } else {
                            Ok(lhs)
                        }
                    }
                    LogicalOp::Or => {
                        if lhs.to_boolean() {
                            Ok(lhs)
                        } else {
                            self.evaluate(right, env)
                        }
                    }
                }
            }
            Expression::Assign { op, target, value } => {
                let value = match op {
                    AssignOp::Assign => self.evaluate(value, env)?,
                    AssignOp::AddAssign => {
                        let current = self.evaluate(target, env)?;
                        let rhs = self.evaluate(value, env)?;
                        apply_binary(BinaryOp::Add, &current, &rhs)
                    }
                    AssignOp::SubAssign => {
                        let current = self.evaluate(target, env)?;
                        let rhs = self.evaluate(value, env)?;
                        apply_binary(BinaryOp::Sub, &current, &rhs)
                    }
                };
                self.store_target(target, value.clone(), env)?;
                Ok(value)
            }
            Expression::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.evaluate(test, env)?.to_boolean() {
                    self.evaluate(consequent, env)
                } else {
                    self.evaluate(alternate, env)
                }
            }
            Expression::Call { callee, arguments } => {
                let (func, this) = match &**callee {
                    Expression::Member { object, property } => {
                        let object = self.evaluate(object, env)?;
                        let func = self
                            .get_property(&object, &PropertyKey::string(property.clone()))?;
                        (func, object)
                    }
                    Expression::Index { object, index } => {
                        let object = self.evaluate(object, env)?;
                        let key = value_to_key(&self.evaluate(index, env)?);
                        let func = self.get_property(&object, &key)?;
                        (func, object)
                    }
                    other => (self.evaluate(other, env)?, Value::Undefined),
                };
                let args = self.evaluate_arguments(arguments, env)?;
                self.call_function(&func, &this, &args)
            }
            Expression::New { callee, arguments } => {
                let func = self.evaluate(callee, env)?;
                let args = self.evaluate_arguments(arguments, env)?;
                self.construct(&func, &args)
            }
            Expression::Member { object, property } => {
                let object = self.evaluate(object, env)?;
                self.get_property(&object, &PropertyKey::string(property.clone()))
            }
            Expression::Index { object, index } => {
                let object = self.evaluate(object, env)?;
                let key = value_to_key(&self.evaluate(index, env)?);
                self.get_property(&object, &key)
            }
        }
    }

    fn evaluate_unary(
        &self,
        op: UnaryOp,
        argument: &Expression,
        env: &EnvRef,
    ) -> JsResult<Value> {
        if op == UnaryOp::Typeof {
            // typeof tolerates unresolved identifiers
            if let Expression::Identifier(name) = argument {
                let value = env.borrow().try_get(name);
                return Ok(Value::string(
                    value.map_or("undefined", |v| v.type_of()),
                ));
            }
            let value = self.evaluate(argument, env)?;
            return Ok(Value::string(value.type_of()));
        }
        let value = self.evaluate(argument, env)?;
        let result = match op {
            UnaryOp::Not => Value::Boolean(!value.to_boolean()),
            UnaryOp::Minus => Value::Number(-value.to_number()),
            UnaryOp::Plus => Value::Number(value.to_number()),
            UnaryOp::Typeof => unreachable!("handled above"),
        };
        Ok(result)
    }

    fn evaluate_arguments(
        &self,
        arguments: &[Expression],
        env: &EnvRef,
    ) -> JsResult<Vec<Value>> {
        let mut args = Vec::with_capacity(arguments.len());
        for argument in arguments {
            args.push(self.evaluate(argument, env)?);
        }
        Ok(args)
    }

    fn store_target(&self, target: &Expression, value: Value, env: &EnvRef) -> JsResult<()> {
        match target {
            Expression::Identifier(name) => {
                env.borrow_mut().set(name, value);
                Ok(())
            }
            Expression::Member { object, property } => {
                let object = self.evaluate(object, env)?;
                self.set_property(&object, PropertyKey::string(property.clone()), value)
            }
            Expression::Index { object, index } => {
                let object = self.evaluate(object, env)?;
                let key = value_to_key(&self.evaluate(index, env)?);
                self.set_property(&object, key, value)
            }
            _ => Err(JsError::syntax("invalid assignment target")),
        }
    }

    fn make_function(
        &self,
        name: Option<String>,
        params: &[String],
        body: &[Statement],
        env: &EnvRef,
    ) -> Value {
        let func = UserFunction {
            name,
            params: Rc::new(params.to_vec()),
            body: Rc::new(body.to_vec()),
            environment: env.clone(),
        };
        Value::object(JsObject::function(Callable::User(func)))
    }

    fn call_callable(
        &self,
        callable: &Callable,
        this: &Value,
        args: &[Value],
    ) -> JsResult<Value> {
        match callable {
            Callable::Native(native) => (native.func.as_ref())(self, this, args),
            Callable::User(func) => self.call_user_function(func, this, args),
        }
    }

    fn call_user_function(
        &self,
        func: &UserFunction,
        this: &Value,
        args: &[Value],
    ) -> JsResult<Value> {
        let env = Rc::new(RefCell::new(Environment::function(
            func.environment.clone(),
            this.clone(),
        )));
        {
            let mut scope = env.borrow_mut();
            for (i, param) in func.params.iter().enumerate() {
                scope.declare(param, args.get(i).cloned().unwrap_or(Value::Undefined));
            }
            scope.declare("arguments", Value::object(JsObject::array(args.to_vec())));
        }
        match self.execute_statements(&func.body, &env)? {
            Completion::Return(v) => Ok(v),
            Completion::Normal(_) => Ok(Value::Undefined),
            Completion::Break | Completion::Continue => {
                Err(JsError::syntax("illegal break statement"))
            }
        }
    }

    fn enter_call(&self) -> JsResult<CallGuard<'_>> {
        let depth = self.call_depth.get();
        if depth >= self.max_call_depth {
            return Err(JsError::range("maximum call stack size exceeded"));
        }
        self.call_depth.set(depth + 1);
        Ok(CallGuard {
            depth: &self.call_depth,
        })
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

struct CallGuard<'a> {
    depth: &'a Cell<usize>,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        self.depth.set(self.depth.get() - 1);
    }
}

/// Convert an error into the value a `catch` clause binds.
fn error_to_value(err: JsError) -> Value {
    match err {
        JsError::Thrown(value) => value,
        other => Value::object(JsObject::error(other.name(), other.message())),
    }
}

/// Derive a property key from an index-expression value.
fn value_to_key(value: &Value) -> PropertyKey {
    match value {
        Value::Number(n) => {
            if n.fract() == 0.0 && *n >= 0.0 && *n < u32::MAX as f64 {
                PropertyKey::Index(*n as u32)
            } else {
                PropertyKey::String(format_number(*n))
            }
        }
        Value::String(s) => {
            if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
                if let Ok(i) = s.parse::<u32>() {
                    return PropertyKey::Index(i);
                }
            }
            PropertyKey::String(s.clone())
        }
        other => PropertyKey::String(other.to_display_string()),
    }
}

fn apply_binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> Value {
    match op {
        BinaryOp::Add => {
            if matches!(lhs, Value::String(_)) || matches!(rhs, Value::String(_)) {
                Value::string(format!(
                    "{}{}",
                    lhs.to_display_string(),
                    rhs.to_display_string()
                ))
            } else {
                Value::Number(lhs.to_number() + rhs.to_number())
            }
        }
        BinaryOp::Sub => Value::Number(lhs.to_number() - rhs.to_number()),
        BinaryOp::Mul => Value::Number(lhs.to_number() * rhs.to_number()),
        BinaryOp::Div => Value::Number(lhs.to_number() / rhs.to_number()),
        BinaryOp::Rem => Value::Number(lhs.to_number() % rhs.to_number()),
        BinaryOp::Eq => Value::Boolean(lhs.loose_equals(rhs)),
        BinaryOp::NotEq => Value::Boolean(!lhs.loose_equals(rhs)),
        BinaryOp::StrictEq => Value::Boolean(lhs.strict_equals(rhs)),
        BinaryOp::StrictNotEq => Value::Boolean(!lhs.strict_equals(rhs)),
        BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
            compare(op, lhs, rhs)
        }
        BinaryOp::In => Value::Boolean(false),
    }
}

fn compare(op: BinaryOp, lhs: &Value, rhs: &Value) -> Value {
    if let (Value::String(a), Value::String(b)) = (lhs, rhs) {
        let result = match op {
            BinaryOp::Lt => a < b,
            BinaryOp::LtEq => a <= b,
            BinaryOp::Gt => a > b,
            BinaryOp::GtEq => a >= b,
            _ => false,
        };
        return Value::Boolean(result);
    }
    let a = lhs.to_number();
    let b = rhs.to_number();
    if a.is_nan() || b.is_nan() {
        return Value::Boolean(false);
    }
    let result = match op {
        BinaryOp::Lt => a < b,
        BinaryOp::LtEq => a <= b,
        BinaryOp::Gt => a > b,
        BinaryOp::GtEq => a >= b,
        _ => false,
    };
    Value::Boolean(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(source: &str) -> Value {
        Engine::new().eval(source).expect("eval")
    }

    fn eval_number(source: &str) -> f64 {
        match eval(source) {
            Value::Number(n) => n,
            other => panic!("expected number, got {:?}", other),
        }
    }

    #[test]
    fn arithmetic_and_precedence() {
        assert_eq!(eval_number("1 + 2 * 3"), 7.0);
        assert_eq!(eval_number("(1 + 2) * 3"), 9.0);
        assert_eq!(eval_number("7 % 4"), 3.0);
        assert_eq!(eval_number("-3 + 1"), -2.0);
    }

    #[test]
    fn string_concatenation() {
        let v = eval("'a' + 'b' + 1");
        assert!(v.strict_equals(&Value::string("ab1")));
    }

    #[test]
    fn variables_and_scope() {
        assert_eq!(eval_number("var x = 2; x + 3"), 5.0);
        assert_eq!(
            eval_number("var x = 1; function f() { x = 10; } f(); x"),
            10.0
        );
    }

    #[test]
    fn functions_and_closures() {
        assert_eq!(
            eval_number(
                "function adder(n) { return function (m) { return n + m; }; }\n\
                 var add2 = adder(2); add2(40)"
            ),
            42.0
        );
        assert_eq!(eval_number("(function () { return arguments.length; })(1, 2, 3)"), 3.0);
    }

    #[test]
    fn control_flow() {
        assert_eq!(
            eval_number("var n = 0; for (var i = 0; i < 5; i++) { n += i; } n"),
            10.0
        );
        assert_eq!(
            eval_number("var n = 0; while (n < 7) { n++; if (n === 3) { continue; } } n"),
            7.0
        );
        assert_eq!(
            eval_number("var n = 0; do { n++; } while (n < 2); n"),
            2.0
        );
    }

    #[test]
    fn arrays_and_objects() {
        assert_eq!(eval_number("[1, 2, 3].length"), 3.0);
        assert_eq!(eval_number("[1, 2, 3][1]"), 2.0);
        assert_eq!(eval_number("var o = {a: 1, b: {c: 2}}; o.b.c"), 2.0);
        assert_eq!(eval_number("var a = [1]; a[3] = 9; a.length"), 4.0);
        assert_eq!(
            eval_number("var o = {}; var n = 0; o.x = 1; o.y = 2; for (var k in o) { n++; } n"),
            2.0
        );
    }

    #[test]
    fn in_operator() {
        assert!(eval("'a' in {a: 1}").to_boolean());
        assert!(!eval("'b' in {a: 1}").to_boolean());
        assert!(eval("0 in [7]").to_boolean());
        assert!(!eval("1 in [7]").to_boolean());
    }

    #[test]
    fn typeof_operator() {
        assert!(eval("typeof 1").strict_equals(&Value::string("number")));
        assert!(eval("typeof missing").strict_equals(&Value::string("undefined")));
        assert!(eval("typeof function () {}").strict_equals(&Value::string("function")));
        assert!(eval("typeof null").strict_equals(&Value::string("object")));
    }

    #[test]
    fn constructors() {
        assert_eq!(
            eval_number("function Point(x, y) { this.x = x; this.y = y; } new Point(3, 4).y"),
            4.0
        );
    }

    #[test]
    fn throw_and_catch() {
        assert_eq!(
            eval_number("var v = 0; try { throw 5; } catch (e) { v = e; } v"),
            5.0
        );
        let v = eval("try { undefined.x; } catch (e) { e.name }");
        assert!(v.strict_equals(&Value::string("TypeError")));
        assert_eq!(
            eval_number("var n = 0; try { throw 1; } catch (e) { n += 1; } finally { n += 10; } n"),
            11.0
        );
        let err = Engine::new().eval("throw 'boom'").expect_err("must throw");
        assert!(matches!(err, JsError::Thrown(_)));
    }

    #[test]
    fn error_builtin() {
        let v = eval("new Error('bad').message");
        assert!(v.strict_equals(&Value::string("bad")));
        let err = Engine::new()
            .eval("throw new Error('kaput')")
            .expect_err("must throw");
        assert_eq!(err.message(), "Error: kaput");
    }

    #[test]
    fn native_functions() {
        let engine = Engine::new();
        engine.define_native_function("double", |_engine, _this, args| {
            let n = args.first().map(|v| v.to_number()).unwrap_or(f64::NAN);
            Ok(Value::Number(n * 2.0))
        });
        let result = engine.eval("double(21)").expect("eval");
        assert!(result.strict_equals(&Value::Number(42.0)));
    }

    #[test]
    fn reentrant_native_calls() {
        let engine = Engine::new();
        engine.define_native_function("reenter", |engine, _this, _args| {
            engine.eval("3 * 3")
        });
        assert!(engine
            .eval("reenter() + 1")
            .expect("eval")
            .strict_equals(&Value::Number(10.0)));
    }

    #[test]
    fn call_depth_is_bounded() {
        let err = Engine::new()
            .eval("function f() { return f(); } f()")
            .expect_err("must overflow");
        assert!(matches!(err, JsError::RangeError(_)));
    }

    #[test]
    fn globals_roundtrip() {
        let engine = Engine::new();
        engine.set_global("x", Value::Number(5.0));
        assert_eq!(
            engine.eval("x + 1").expect("eval").to_number(),
            6.0
        );
        assert!(engine.lookup_global("x").is_some());
        engine.remove_global("x");
        assert!(engine.lookup_global("x").is_none());
    }
}
