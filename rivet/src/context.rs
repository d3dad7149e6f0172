//! The execution context: one engine instance, its registry, and the
//! thread guard around both.

use std::cell::{Cell, RefCell};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::thread;

use hashbrown::HashMap;

use rivet_js::error::JsError;
use rivet_js::object::{JsObject, PropertyKey};
use rivet_js::{Engine, Value};

use crate::convert;
use crate::error::{Error, Result};
use crate::host::HostValue;
use crate::registry::Registry;
use crate::thread::ThreadBound;

/// Everything a context owns. Proxies hold weak references to this; the
/// [`Context`] holds the only strong one.
pub(crate) struct ContextInner {
    /// The guest engine instance.
    pub(crate) engine: Engine,
    /// The identity & lifetime registry.
    pub(crate) registry: RefCell<Registry>,
    /// Cached module exports, by module name.
    pub(crate) modules: RefCell<HashMap<String, Value>>,
    /// Base directory for script files and modules.
    pub(crate) base_path: RefCell<PathBuf>,
    /// Cleared on teardown; gates every operation afterwards.
    pub(crate) alive: Cell<bool>,
}

impl ContextInner {
    /// Resolve a script name to a file under the base path, trying the name
    /// as given and with a `.js` extension.
    fn resolve_source(&self, name: &str) -> Result<PathBuf> {
        let base = self.base_path.borrow();
        let direct = base.join(name);
        if direct.is_file() {
            return Ok(direct);
        }
        let with_ext = base.join(format!("{}.js", name));
        if with_ext.is_file() {
            return Ok(with_ext);
        }
        Err(Error::File { path: direct })
    }

    /// The `require` implementation: resolve, evaluate once with fresh
    /// `module`/`exports` bindings, cache `module.exports` per context.
    fn require(ctx: &Rc<ContextInner>, name: &str) -> Result<Value> {
        if let Some(cached) = ctx.modules.borrow().get(name) {
            log::trace!("require({}): cached", name);
            return Ok(cached.clone());
        }
        let path = ctx.resolve_source(name)?;
        let source = fs::read_to_string(&path).map_err(|_| Error::File { path: path.clone() })?;
        log::debug!("require({}): loading {}", name, path.display());

        let exports = Value::object(JsObject::new());
        let mut module = JsObject::new();
        module.set(PropertyKey::string("exports"), exports.clone())?;
        let module = Value::object(module);

        // Shadow any outer module bindings for the duration of the load;
        // requires nest, so the previous values are restored either way.
        let prev_module = ctx.engine.remove_global("module");
        let prev_exports = ctx.engine.remove_global("exports");
        ctx.engine.set_global("module", module.clone());
        ctx.engine.set_global("exports", exports);

        let evaluated = ctx.engine.eval(&source);

        restore_global(&ctx.engine, "module", prev_module);
        restore_global(&ctx.engine, "exports", prev_exports);
        evaluated?;

        let result = ctx
            .engine
            .get_property(&module, &PropertyKey::string("exports"))?;
        ctx.modules.borrow_mut().insert(name.into(), result.clone());
        Ok(result)
    }

    /// Force-release everything the context owns. Idempotent.
    fn teardown(&self) {
        if !self.alive.get() {
            return;
        }
        self.alive.set(false);
        log::debug!("context teardown on {:?}", thread::current().id());

        // Evict registry state and module cache under short borrows, then
        // drop the values: their finalizers re-enter the registry.
        let (hosts, pins) = { self.registry.borrow_mut().take_all() };
        drop(hosts);
        drop(pins);
        let modules: Vec<Value> = {
            self.modules
                .borrow_mut()
                .drain()
                .map(|(_, value)| value)
                .collect()
        };
        drop(modules);
        self.engine.clear_globals();
    }
}

fn restore_global(engine: &Engine, name: &str, previous: Option<Value>) {
    match previous {
        Some(value) => engine.set_global(name, value),
        None => {
            engine.remove_global(name);
        }
    }
}

/// One guest engine instance plus its registry, bound to the creating
/// thread for its whole lifetime.
///
/// A `Context` may be moved between threads, but every operation (on the
/// context or on any proxy it produced) fails with
/// [`Error::WrongThread`] unless invoked from the owning thread. After
/// [`Context::destroy`] (or drop) every operation fails with
/// [`Error::ContextDestroyed`].
///
/// ```
/// use rivet::{Context, HostValue};
///
/// let ctx = Context::new();
/// ctx.set_global("x", HostValue::Int(20)).unwrap();
/// assert_eq!(ctx.eval("x * 2 + 2").unwrap(), HostValue::Int(42));
/// ```
pub struct Context {
    inner: ThreadBound<Rc<ContextInner>>,
}

impl Context {
    /// Create a context on the current thread.
    pub fn new() -> Context {
        let inner = Rc::new(ContextInner {
            engine: Engine::new(),
            registry: RefCell::new(Registry::new()),
            modules: RefCell::new(HashMap::new()),
            base_path: RefCell::new(PathBuf::from(".")),
            alive: Cell::new(true),
        });

        let weak = Rc::downgrade(&inner);
        inner
            .engine
            .define_native_function("require", move |_engine, _this, args| {
                let ctx = weak
                    .upgrade()
                    .ok_or_else(|| JsError::host("context destroyed"))?;
                let name = match args.first() {
                    Some(Value::String(name)) => name.clone(),
                    _ => return Err(JsError::type_error("require expects a module name")),
                };
                ContextInner::require(&ctx, &name).map_err(|err| JsError::host(err.to_string()))
            });

        log::debug!("context created on {:?}", thread::current().id());
        Context {
            inner: ThreadBound::new(inner),
        }
    }

    /// Thread- and liveness-checked access to the interior.
    fn inner(&self) -> Result<&Rc<ContextInner>> {
        let inner = self.inner.get()?;
        if !inner.alive.get() {
            return Err(Error::ContextDestroyed);
        }
        Ok(inner)
    }

    /// Evaluate a source string, converting the result for the host.
    pub fn eval(&self, source: &str) -> Result<HostValue> {
        let ctx = self.inner()?;
        let value = ctx.engine.eval(source)?;
        convert::guest_to_host(ctx, &value)
    }

    /// Evaluate a script file, resolved as `path` or `path + ".js"` under
    /// the configured base path.
    pub fn eval_file(&self, path: &str) -> Result<HostValue> {
        let ctx = self.inner()?;
        let resolved = ctx.resolve_source(path)?;
        let source =
            fs::read_to_string(&resolved).map_err(|_| Error::File { path: resolved.clone() })?;
        log::debug!("eval_file: {}", resolved.display());
        let value = ctx.engine.eval(&source)?;
        convert::guest_to_host(ctx, &value)
    }

    /// Configure the base directory for `eval_file` and `require`.
    pub fn set_base_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let ctx = self.inner()?;
        *ctx.base_path.borrow_mut() = path.as_ref().to_path_buf();
        Ok(())
    }

    /// Install a host value as a global binding in the guest.
    pub fn set_global<V: Into<HostValue>>(&self, name: &str, value: V) -> Result<()> {
        let ctx = self.inner()?;
        let guest = convert::host_to_guest(ctx, &value.into())?;
        ctx.engine.set_global(name, guest);
        Ok(())
    }

    /// Read a global binding from the guest; an unbound name is the host
    /// "no value".
    pub fn get_global(&self, name: &str) -> Result<HostValue> {
        let ctx = self.inner()?;
        match ctx.engine.lookup_global(name) {
            Some(value) => convert::guest_to_host(ctx, &value),
            None => Ok(HostValue::None),
        }
    }

    /// Explicit teardown. All proxies on both sides become permanently
    /// invalid. Idempotent; using the context afterwards fails with
    /// [`Error::ContextDestroyed`].
    pub fn destroy(&self) -> Result<()> {
        let inner = self.inner.get()?;
        inner.teardown();
        Ok(())
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        // Teardown runs only on the owning thread; a context dropped
        // elsewhere leaks its interior (ThreadBound logs it) rather than
        // touching the single-threaded heap.
        if let Ok(inner) = self.inner.get() {
            inner.teardown();
        }
    }
}
