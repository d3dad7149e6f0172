//! Integration tests for the host/guest bridge.
//!
//! These tests exercise the public API: evaluating scripts, converting
//! values in both directions, proxying compound values, identity across
//! round trips, thread affinity, and context lifetime.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use rivet::{Context, Error, HostObject, HostValue, JsKind, JsRef};

fn eval_js(source: &str) -> HostValue {
    Context::new().eval(source).expect("eval")
}

fn as_js(value: HostValue) -> JsRef {
    match value {
        HostValue::Js(r) => r,
        other => panic!("expected a guest handle, got {:?}", other),
    }
}

/// A scratch directory unique to one test.
fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("rivet-it-{}-{}", std::process::id(), name));
    fs::create_dir_all(&dir).expect("create scratch dir");
    dir
}

// ---------------------------------------------------------------------------
// Primitive conversion
// ---------------------------------------------------------------------------

#[test]
fn test_eval_simple_expression() {
    assert_eq!(eval_js("1 + 1"), HostValue::Int(2));
}

#[test]
fn test_primitives_cross_both_ways() {
    let ctx = Context::new();
    ctx.set_global("b", true).unwrap();
    ctx.set_global("f", 2.5).unwrap();
    ctx.set_global("s", "hi").unwrap();
    assert_eq!(ctx.eval("b").unwrap(), HostValue::Bool(true));
    assert_eq!(ctx.eval("f").unwrap(), HostValue::Float(2.5));
    assert_eq!(ctx.eval("s").unwrap(), HostValue::Str("hi".into()));
    assert_eq!(ctx.eval("null").unwrap(), HostValue::None);
    assert_eq!(ctx.eval("undefined").unwrap(), HostValue::None);
}

#[test]
fn test_none_enters_as_null() {
    let ctx = Context::new();
    ctx.set_global("nothing", HostValue::None).unwrap();
    assert_eq!(ctx.eval("nothing === null").unwrap(), HostValue::Bool(true));
}

#[test]
fn test_double_roundtrip_preserves_precision() {
    let ctx = Context::new();
    let value = 1.23456789012345678909_f64;
    ctx.set_global("x", value).unwrap();
    assert_eq!(ctx.eval("x").unwrap(), HostValue::Float(value));
}

#[test]
fn test_non_ascii_text_roundtrip() {
    let ctx = Context::new();
    ctx.set_global("x", "\u{05D4}").unwrap();
    assert_eq!(ctx.eval("x").unwrap(), HostValue::Str("\u{05D4}".into()));
    assert_eq!(
        ctx.eval("x + x").unwrap(),
        HostValue::Str("\u{05D4}\u{05D4}".into())
    );
}

#[test]
fn test_integer_roundtrip_is_exact() {
    let ctx = Context::new();
    let max = 1_i64 << 53;
    ctx.set_global("n", max).unwrap();
    assert_eq!(ctx.eval("n").unwrap(), HostValue::Int(max));
    ctx.set_global("m", -max).unwrap();
    assert_eq!(ctx.eval("m").unwrap(), HostValue::Int(-max));
}

#[test]
fn test_oversized_integer_overflows_instead_of_truncating() {
    let ctx = Context::new();
    let err = ctx.set_global("n", 1_i64 << 54).expect_err("must overflow");
    assert!(matches!(err, Error::Overflow { value } if value == 1_i64 << 54));
}

#[test]
fn test_syntax_error_is_a_js_error() {
    let err = Context::new().eval("1 +").expect_err("must fail");
    assert!(err.is_js());
}

#[test]
fn test_guest_throw_surfaces_with_message() {
    let err = Context::new()
        .eval("throw new Error('kaput')")
        .expect_err("must fail");
    let Error::Js { message } = err else {
        panic!("expected a script error");
    };
    assert!(message.contains("kaput"));
}

// ---------------------------------------------------------------------------
// Globals
// ---------------------------------------------------------------------------

#[test]
fn test_get_global_reads_script_state() {
    let ctx = Context::new();
    ctx.eval("var answer = 6 * 7;").unwrap();
    assert_eq!(ctx.get_global("answer").unwrap(), HostValue::Int(42));
    assert_eq!(ctx.get_global("missing").unwrap(), HostValue::None);
}

// ---------------------------------------------------------------------------
// Host values inside the guest (guest-side proxies)
// ---------------------------------------------------------------------------

#[test]
fn test_host_object_identity_survives_roundtrip() {
    let ctx = Context::new();
    let list = HostValue::list(vec![HostValue::Int(1)]);
    ctx.set_global("x", list.clone()).unwrap();
    let back = ctx.eval("x").unwrap();
    assert!(back.same_identity(&list));
}

#[test]
fn test_same_host_value_enters_as_same_guest_object() {
    let ctx = Context::new();
    let list = HostValue::list(vec![]);
    ctx.set_global("x", list.clone()).unwrap();
    ctx.set_global("y", list).unwrap();
    assert_eq!(ctx.eval("x === y").unwrap(), HostValue::Bool(true));
}

#[test]
fn test_guest_reads_and_mutates_host_list() {
    let ctx = Context::new();
    let shared = Arc::new(Mutex::new(vec![HostValue::Int(1), HostValue::Int(3)]));
    ctx.set_global("x", HostValue::List(shared.clone())).unwrap();

    assert_eq!(ctx.eval("x.length").unwrap(), HostValue::Int(2));
    assert_eq!(ctx.eval("x[1]").unwrap(), HostValue::Int(3));

    ctx.eval("x[0] = 2").unwrap();
    assert_eq!(*shared.lock().unwrap(), vec![HostValue::Int(2), HostValue::Int(3)]);
}

#[test]
fn test_out_of_range_host_list_write_raises() {
    let ctx = Context::new();
    ctx.set_global("x", HostValue::list(vec![HostValue::Int(1), HostValue::Int(3)]))
        .unwrap();
    let err = ctx.eval("x[2] = 0").expect_err("must fail");
    assert!(err.is_js());
    // the guest can observe it too
    assert_eq!(
        ctx.eval("var seen = false; try { x[9] = 1; } catch (e) { seen = true; } seen")
            .unwrap(),
        HostValue::Bool(true)
    );
}

#[test]
fn test_guest_uses_host_map_as_object() {
    let ctx = Context::new();
    let mut map = hashbrown::HashMap::new();
    map.insert("a".to_string(), HostValue::Int(1));
    ctx.set_global("m", HostValue::map(map)).unwrap();

    assert_eq!(ctx.eval("m.a").unwrap(), HostValue::Int(1));
    assert_eq!(ctx.eval("'a' in m").unwrap(), HostValue::Bool(true));
    assert_eq!(ctx.eval("'b' in m").unwrap(), HostValue::Bool(false));
    ctx.eval("m.b = 2").unwrap();
    assert_eq!(ctx.eval("m.b").unwrap(), HostValue::Int(2));
    assert_eq!(
        ctx.eval("var n = 0; for (var k in m) { n++; } n").unwrap(),
        HostValue::Int(2)
    );
}

#[test]
fn test_guest_calls_host_function() {
    let ctx = Context::new();
    ctx.set_global(
        "add",
        HostValue::func(|args| {
            let a = args.first().and_then(HostValue::as_int).unwrap_or(0);
            let b = args.get(1).and_then(HostValue::as_int).unwrap_or(0);
            Ok(HostValue::Int(a + b))
        }),
    )
    .unwrap();
    assert_eq!(ctx.eval("add(2, 3)").unwrap(), HostValue::Int(5));
}

#[test]
fn test_host_function_failure_becomes_guest_error() {
    let ctx = Context::new();
    ctx.set_global(
        "explode",
        HostValue::func(|_args| Err(Error::js("host failure"))),
    )
    .unwrap();
    let err = ctx.eval("explode()").expect_err("must fail");
    assert!(err.is_js());
    assert_eq!(
        ctx.eval("var caught = ''; try { explode(); } catch (e) { caught = e.message; } caught")
            .unwrap(),
        HostValue::Str("host failure".into())
    );
}

#[test]
fn test_host_object_attributes_and_bound_methods() {
    struct Greeter {
        salutation: String,
    }
    impl HostObject for Greeter {
        fn attr(&self, name: &str) -> Option<HostValue> {
            match name {
                "salutation" => Some(HostValue::Str(self.salutation.clone())),
                "greet" => {
                    let salutation = self.salutation.clone();
                    Some(HostValue::func(move |args| {
                        let who = args
                            .first()
                            .and_then(|v| v.as_str().map(str::to_string))
                            .unwrap_or_default();
                        Ok(HostValue::Str(format!("{} {}", salutation, who)))
                    }))
                }
                _ => None,
            }
        }
        fn attr_names(&self) -> Vec<String> {
            vec!["salutation".into(), "greet".into()]
        }
    }

    let ctx = Context::new();
    ctx.set_global(
        "greeter",
        HostValue::object(Greeter {
            salutation: "hello".into(),
        }),
    )
    .unwrap();

    assert_eq!(
        ctx.eval("greeter.salutation").unwrap(),
        HostValue::Str("hello".into())
    );
    assert_eq!(
        ctx.eval("greeter.greet('world')").unwrap(),
        HostValue::Str("hello world".into())
    );
    assert_eq!(
        ctx.eval("'greet' in greeter").unwrap(),
        HostValue::Bool(true)
    );
}

#[test]
fn test_new_on_host_value_is_rejected() {
    let ctx = Context::new();
    ctx.set_global("Thing", HostValue::func(|_| Ok(HostValue::None)))
        .unwrap();
    let err = ctx.eval("new Thing()").expect_err("must fail");
    let Error::Js { message } = err else {
        panic!("expected a script error");
    };
    assert!(message.contains("can't use new on host objects"));
}

// ---------------------------------------------------------------------------
// Guest values in the host (host-side proxies)
// ---------------------------------------------------------------------------

#[test]
fn test_array_handle_length_indexing_and_iteration() {
    let ctx = Context::new();
    let arr = as_js(ctx.eval("[1, 2, 3, [4, 5]]").unwrap());
    assert_eq!(arr.kind(), JsKind::Array);
    assert_eq!(arr.len().unwrap(), 4);

    assert_eq!(arr.index(0).unwrap(), HostValue::Int(1));
    assert!(matches!(arr.index(4), Err(Error::NotFound { .. })));

    let elements: Vec<HostValue> = arr.iter().unwrap().map(|e| e.unwrap()).collect();
    assert_eq!(elements[0], HostValue::Int(1));
    assert_eq!(elements[1], HostValue::Int(2));
    assert_eq!(elements[2], HostValue::Int(3));
    let nested = match &elements[3] {
        HostValue::Js(r) => r,
        other => panic!("expected nested handle, got {:?}", other),
    };
    assert_eq!(nested.kind(), JsKind::Array);
    assert_eq!(nested.index(1).unwrap(), HostValue::Int(5));
}

#[test]
fn test_object_handle_has_no_length() {
    let ctx = Context::new();
    let obj = as_js(ctx.eval("({a: 1, b: 2, c: {d: 4}})").unwrap());
    assert_eq!(obj.kind(), JsKind::Object);
    assert!(matches!(obj.len(), Err(Error::NotFound { .. })));

    let mut keys = obj.keys().unwrap();
    keys.sort();
    assert_eq!(keys, vec!["a", "b", "c"]);

    assert_eq!(obj.attr("a").unwrap(), HostValue::Int(1));
    let nested = as_js(obj.attr("c").unwrap());
    assert_eq!(nested.attr("d").unwrap(), HostValue::Int(4));

    // strict access raises, lenient access yields "no value"
    assert!(matches!(obj.attr("zzz"), Err(Error::NotFound { .. })));
    assert_eq!(obj.get("zzz").unwrap(), HostValue::None);
}

#[test]
fn test_object_handle_writes_reach_the_guest() {
    let ctx = Context::new();
    ctx.eval("var state = {count: 1};").unwrap();
    let obj = as_js(ctx.eval("state").unwrap());
    obj.set("count", HostValue::Int(7)).unwrap();
    assert_eq!(ctx.eval("state.count").unwrap(), HostValue::Int(7));
}

#[test]
fn test_function_handle_call_and_construct() {
    let ctx = Context::new();
    let add = as_js(ctx.eval("(function (a, b) { return a + b; })").unwrap());
    assert_eq!(add.kind(), JsKind::Function);
    assert_eq!(
        add.call(&[HostValue::Int(1), HostValue::Int(2)]).unwrap(),
        HostValue::Int(3)
    );

    let point = as_js(
        ctx.eval("(function Point(x, y) { this.x = x; this.y = y; })")
            .unwrap(),
    );
    let made = as_js(point.construct(&[HostValue::Int(3), HostValue::Int(4)]).unwrap());
    assert_eq!(made.kind(), JsKind::Object);
    assert_eq!(made.attr("x").unwrap(), HostValue::Int(3));
    assert_eq!(made.attr("y").unwrap(), HostValue::Int(4));
}

#[test]
fn test_guest_value_reenters_as_original() {
    let ctx = Context::new();
    let obj = ctx.eval("var o = {tag: 1}; o").unwrap();
    ctx.set_global("back", obj).unwrap();
    assert_eq!(ctx.eval("back === o").unwrap(), HostValue::Bool(true));
}

#[test]
fn test_same_guest_object_shares_one_pin() {
    let ctx = Context::new();
    ctx.eval("var o = {n: 1};").unwrap();
    let first = as_js(ctx.eval("o").unwrap());
    let second = as_js(ctx.eval("o").unwrap());
    assert_eq!(first, second);
    assert_eq!(first.get("n").unwrap(), HostValue::Int(1));
    drop(first);
    // the pin survives until the last handle is gone
    assert_eq!(second.get("n").unwrap(), HostValue::Int(1));
}

// ---------------------------------------------------------------------------
// Reentrancy
// ---------------------------------------------------------------------------

#[test]
fn test_nested_host_and_guest_calls() {
    let ctx = Arc::new(Context::new());
    let reenter = ctx.clone();
    ctx.set_global(
        "host_eval",
        HostValue::func(move |_args| reenter.eval("3 * 3")),
    )
    .unwrap();
    assert_eq!(ctx.eval("host_eval() + 1").unwrap(), HostValue::Int(10));
}

#[test]
fn test_host_calls_guest_function_that_calls_host() {
    let ctx = Context::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    ctx.set_global(
        "tally",
        HostValue::func(move |_args| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(HostValue::Int(10))
        }),
    )
    .unwrap();
    let f = as_js(ctx.eval("(function (n) { return tally() + n; })").unwrap());
    assert_eq!(f.call(&[HostValue::Int(5)]).unwrap(), HostValue::Int(15));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

// ---------------------------------------------------------------------------
// Thread affinity
// ---------------------------------------------------------------------------

#[test]
fn test_context_rejects_foreign_thread() {
    let ctx = Context::new();
    let handle = thread::spawn(move || matches!(ctx.eval("1"), Err(Error::WrongThread { .. })));
    assert!(handle.join().expect("join"));
}

#[test]
fn test_proxy_rejects_foreign_thread() {
    let ctx = Context::new();
    let arr = as_js(ctx.eval("[1, 2, 3]").unwrap());
    assert_eq!(arr.len().unwrap(), 3);
    let handle = thread::spawn(move || {
        matches!(arr.len(), Err(Error::WrongThread { .. }))
            && matches!(arr.index(0), Err(Error::WrongThread { .. }))
    });
    assert!(handle.join().expect("join"));
    // the owner keeps working
    assert_eq!(ctx.eval("1").unwrap(), HostValue::Int(1));
}

#[test]
fn test_hundred_contexts_on_their_own_threads() {
    let mut handles = Vec::new();
    for i in 0..100_i64 {
        handles.push(thread::spawn(move || {
            let ctx = Context::new();
            ctx.set_global("i", i).unwrap();
            let result = ctx.eval("i * 2").unwrap();
            ctx.destroy().unwrap();
            result == HostValue::Int(i * 2)
        }));
    }
    for handle in handles {
        assert!(handle.join().expect("join"));
    }
}

// ---------------------------------------------------------------------------
// Context lifetime
// ---------------------------------------------------------------------------

#[test]
fn test_destroyed_context_invalidates_everything() {
    let ctx = Context::new();
    let arr = as_js(ctx.eval("[1]").unwrap());
    ctx.destroy().unwrap();

    assert!(matches!(ctx.eval("1"), Err(Error::ContextDestroyed)));
    assert!(matches!(
        ctx.set_global("x", 1_i64),
        Err(Error::ContextDestroyed)
    ));
    assert!(matches!(arr.len(), Err(Error::ContextDestroyed)));
    // destroy is idempotent
    ctx.destroy().unwrap();
}

#[test]
fn test_handles_fail_after_context_drop() {
    let ctx = Context::new();
    let arr = as_js(ctx.eval("[1]").unwrap());
    drop(ctx);
    assert!(matches!(arr.len(), Err(Error::ContextDestroyed)));
}

// ---------------------------------------------------------------------------
// Files and modules
// ---------------------------------------------------------------------------

#[test]
fn test_eval_file_resolves_with_and_without_extension() {
    let dir = scratch_dir("eval-file");
    fs::write(dir.join("answer.js"), "6 * 7").unwrap();

    let ctx = Context::new();
    ctx.set_base_path(&dir).unwrap();
    assert_eq!(ctx.eval_file("answer").unwrap(), HostValue::Int(42));
    assert_eq!(ctx.eval_file("answer.js").unwrap(), HostValue::Int(42));

    let err = ctx.eval_file("missing").expect_err("must fail");
    assert!(matches!(err, Error::File { .. }));
}

#[test]
fn test_require_loads_and_caches_per_context() {
    let dir = scratch_dir("require");
    fs::write(
        dir.join("mod.js"),
        "bump(); exports.value = 40; exports.next = exports.value + 1;",
    )
    .unwrap();

    let ctx = Context::new();
    ctx.set_base_path(&dir).unwrap();

    let loads = Arc::new(AtomicUsize::new(0));
    let seen = loads.clone();
    ctx.set_global(
        "bump",
        HostValue::func(move |_args| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(HostValue::None)
        }),
    )
    .unwrap();

    assert_eq!(
        ctx.eval("require('mod').value").unwrap(),
        HostValue::Int(40)
    );
    assert_eq!(ctx.eval("require('mod').next").unwrap(), HostValue::Int(41));
    // the module body ran once
    assert_eq!(loads.load(Ordering::SeqCst), 1);

    // a fresh context has its own cache
    let other = Context::new();
    other.set_base_path(&dir).unwrap();
    other.set_global("bump", HostValue::func(|_| Ok(HostValue::None))).unwrap();
    assert_eq!(
        other.eval("require('mod').value").unwrap(),
        HostValue::Int(40)
    );
}

#[test]
fn test_require_missing_module_fails() {
    let dir = scratch_dir("require-missing");
    let ctx = Context::new();
    ctx.set_base_path(&dir).unwrap();
    let err = ctx.eval("require('nope')").expect_err("must fail");
    assert!(err.is_js());
}

#[test]
fn test_module_exports_reassignment() {
    let dir = scratch_dir("require-reassign");
    fs::write(dir.join("fn.js"), "module.exports = function (n) { return n + 1; };").unwrap();

    let ctx = Context::new();
    ctx.set_base_path(&dir).unwrap();
    assert_eq!(ctx.eval("require('fn')(41)").unwrap(), HostValue::Int(42));
}
