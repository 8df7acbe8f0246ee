//! Integration tests for host callbacks: exactly-once delivery, threading,
//! and teardown behavior.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use boa_engine::JsString;
use rfbridge::{
    BridgeConfig, CompletionHandle, Error, HostMethods, HostValue, MethodCall, MousePointer,
    ScriptContext, SnapshotDirectory,
};
use serde_json::json;

const WAIT: Duration = Duration::from_secs(5);

type Parked = Arc<Mutex<Vec<(MethodCall, CompletionHandle)>>>;

/// Host whose `invokeMethod` parks every handle for the test to complete.
fn parking_host() -> (HostMethods, Parked) {
    let parked: Parked = Arc::new(Mutex::new(Vec::new()));
    let sink = parked.clone();
    let host = HostMethods::new().with_invoke_method(move |call, handle| {
        sink.lock().unwrap().push((call, handle));
    });
    (host, parked)
}

fn context_with(host: HostMethods) -> ScriptContext {
    let config = BridgeConfig {
        context_id: 7,
        ..Default::default()
    };
    ScriptContext::new(config, host).expect("context")
}

fn run(ctx: &mut ScriptContext, code: &str) {
    let result = ctx.evaluate_script(code).expect("evaluate");
    assert!(!result.is_error, "script failed: {}", result.value);
}

fn global_json(ctx: &mut ScriptContext, name: &str) -> serde_json::Value {
    let global = ctx.global_object();
    let value = global
        .get(JsString::from(name), ctx.context_mut())
        .expect("global lookup");
    value.to_json(ctx.context_mut()).expect("json")
}

fn take_parked(parked: &Parked) -> Vec<(MethodCall, CompletionHandle)> {
    std::mem::take(&mut *parked.lock().unwrap())
}

#[test]
fn success_payload_is_delivered_once() {
    let (host, parked) = parking_host();
    let mut ctx = context_with(host);
    run(
        &mut ctx,
        "globalThis.calls = []; __rfox_invoke_method__('ping', {n: 1}, v => calls.push(v));",
    );
    assert_eq!(ctx.pending_callbacks(), 1);

    let (call, handle) = take_parked(&parked).pop().unwrap();
    assert_eq!(call.context_id, 7);
    assert_eq!(call.method, "ping");
    assert_eq!(call.arguments, json!({"n": 1}));

    handle.complete(HostValue::Json(json!({"pong": true}))).unwrap();
    ctx.wait_for_pending(WAIT).unwrap();
    // Nothing else is queued for that callback.
    assert_eq!(ctx.run_pending_tasks(), 0);

    assert_eq!(global_json(&mut ctx, "calls"), json!([{"pong": true}]));
    let stats = ctx.bridge_stats();
    assert_eq!(stats.registered, 1);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.live(), 0);
    assert_eq!(ctx.pending_callbacks(), 0);
}

#[test]
fn error_payload_arrives_as_error_object() {
    let (host, parked) = parking_host();
    let mut ctx = context_with(host);
    run(
        &mut ctx,
        "globalThis.seen = []; __rfox_invoke_method__('fail', null, e => seen.push([e instanceof Error, e.message]));",
    );
    let (call, handle) = take_parked(&parked).pop().unwrap();
    assert_eq!(call.arguments, serde_json::Value::Null);

    handle.fail("no such method").unwrap();
    ctx.wait_for_pending(WAIT).unwrap();

    assert_eq!(global_json(&mut ctx, "seen"), json!([[true, "no such method"]]));
    assert_eq!(ctx.bridge_stats().completed, 1);
}

#[test]
fn completions_in_reverse_order_each_fire_once() {
    let (host, parked) = parking_host();
    let mut ctx = context_with(host);
    run(
        &mut ctx,
        r#"globalThis.order = [];
           for (const name of ['a', 'b', 'c']) {
               __rfox_invoke_method__(name, null, v => order.push(v));
           }"#,
    );
    assert_eq!(ctx.pending_callbacks(), 3);

    let mut handles = take_parked(&parked);
    while let Some((call, handle)) = handles.pop() {
        handle.complete(HostValue::String(call.method)).unwrap();
    }
    ctx.wait_for_pending(WAIT).unwrap();

    assert_eq!(global_json(&mut ctx, "order"), json!(["c", "b", "a"]));
    let stats = ctx.bridge_stats();
    assert_eq!((stats.registered, stats.completed), (3, 3));
}

#[test]
fn completion_from_another_thread_runs_on_engine_thread() {
    let host = HostMethods::new().with_invoke_method(|call, handle| {
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            let _ = handle.complete(HostValue::Number(call.arguments.as_f64().unwrap_or(0.0) * 2.0));
        });
    });
    let mut ctx = context_with(host);
    run(
        &mut ctx,
        "new Promise(r => __rfox_invoke_method__('double', 21, r)).then(v => globalThis.answer = v);",
    );
    ctx.wait_for_pending(WAIT).unwrap();
    assert_eq!(global_json(&mut ctx, "answer").as_f64(), Some(42.0));
}

#[test]
fn dropped_handle_releases_without_invoking() {
    let host = HostMethods::new().with_invoke_method(|_call, handle| drop(handle));
    let mut ctx = context_with(host);
    run(
        &mut ctx,
        "globalThis.fired = 0; __rfox_invoke_method__('x', null, () => fired++);",
    );
    ctx.wait_for_pending(WAIT).unwrap();

    assert_eq!(global_json(&mut ctx, "fired").as_f64(), Some(0.0));
    let stats = ctx.bridge_stats();
    assert_eq!(stats.abandoned, 1);
    assert_eq!(stats.completed, 0);
    assert_eq!(ctx.pending_callbacks(), 0);
}

#[test]
fn missing_capability_throws_type_error_and_registers_nothing() {
    let mut ctx = context_with(HostMethods::new());
    run(
        &mut ctx,
        r#"try {
               __rfox_invoke_method__('x', null, () => {});
               globalThis.caught = null;
           } catch (e) {
               globalThis.caught = [e instanceof TypeError, e.message];
           }"#,
    );
    assert_eq!(
        global_json(&mut ctx, "caught"),
        json!([
            true,
            "Failed to execute '__rfox_invoke_method__': host method (invokeMethod) is not registered."
        ])
    );
    assert_eq!(ctx.bridge_stats().registered, 0);
    assert_eq!(ctx.pending_callbacks(), 0);
}

#[test]
fn wrong_argument_type_throws_before_host_is_called() {
    let (host, parked) = parking_host();
    let mut ctx = context_with(host.with_simulate_input_text(|_| panic!("must not be called")));
    run(
        &mut ctx,
        r#"globalThis.errors = [];
           for (const f of [
               () => __rfox_simulate_inputtext__(5),
               () => __rfox_invoke_method__('m', null, 'not a function'),
           ]) {
               try { f(); } catch (e) { errors.push([e instanceof TypeError, e.message]); }
           }"#,
    );
    assert_eq!(
        global_json(&mut ctx, "errors"),
        json!([
            [true, "Failed to execute '__rfox_simulate_inputtext__': parameter 1 (text) must be a string."],
            [true, "Failed to execute '__rfox_invoke_method__': parameter 3 (callback) is not a function."]
        ])
    );
    assert!(parked.lock().unwrap().is_empty());
    assert_eq!(ctx.pending_callbacks(), 0);
}

#[test]
fn uncaught_callback_exception_is_reported() {
    let (host, parked) = parking_host();
    let mut ctx = context_with(host);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    ctx.on_exception(move |e| sink.lock().unwrap().push(e.clone()));

    run(&mut ctx, "__rfox_invoke_method__('x', null, () => { throw new Error('cb failed'); });");
    let (_, handle) = take_parked(&parked).pop().unwrap();
    handle.complete(HostValue::Null).unwrap();
    ctx.wait_for_pending(WAIT).unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].context_id, 7);
    assert!(seen[0].message.contains("cb failed"));
    assert_eq!(ctx.bridge_stats().completed, 1);
}

#[test]
fn teardown_orphans_pending_callbacks() {
    let (host, parked) = parking_host();
    let mut ctx = context_with(host);
    run(&mut ctx, "__rfox_invoke_method__('a', null, () => {}); __rfox_invoke_method__('b', null, () => {});");
    assert_eq!(ctx.pending_callbacks(), 2);
    drop(ctx);

    let mut handles = take_parked(&parked);
    let (_, first) = handles.remove(0);
    assert!(matches!(first.complete(HostValue::Null), Err(Error::ContextClosed(7))));
    // Dropping the other handle after teardown is harmless.
    drop(handles);
}

#[test]
fn wait_for_pending_times_out() {
    let (host, _parked) = parking_host();
    let mut ctx = context_with(host);
    run(&mut ctx, "__rfox_invoke_method__('never', null, () => {});");
    assert!(matches!(
        ctx.wait_for_pending(Duration::from_millis(20)),
        Err(Error::Timeout(20))
    ));
    assert_eq!(ctx.pending_callbacks(), 1);
}

#[test]
fn environment_is_parsed_json() {
    let host = HostMethods::new().with_environment(|| r#"{"platform":"test","dpr":2}"#.to_string());
    let mut ctx = context_with(host);
    run(&mut ctx, "globalThis.env = __rfox_environment__();");
    assert_eq!(global_json(&mut ctx, "env"), json!({"platform": "test", "dpr": 2}));
}

#[test]
fn invalid_environment_json_throws() {
    let host = HostMethods::new().with_environment(|| "{not json".to_string());
    let mut ctx = context_with(host);
    let result = ctx.evaluate_script("__rfox_environment__()").unwrap();
    assert!(result.is_error);
}

#[test]
fn pointer_and_text_reach_the_host() {
    let pointers: Arc<Mutex<Vec<(Vec<MousePointer>, u32)>>> = Arc::default();
    let texts: Arc<Mutex<Vec<String>>> = Arc::default();
    let (p, t) = (pointers.clone(), texts.clone());
    let host = HostMethods::new()
        .with_simulate_pointer(move |list, pointer| p.lock().unwrap().push((list.to_vec(), pointer)))
        .with_simulate_input_text(move |text| t.lock().unwrap().push(text.to_string()));
    let mut ctx = context_with(host);

    run(
        &mut ctx,
        "__rfox_simulate_pointer__([[1, 2, 0.5], [3, 4, 1]], 1); __rfox_simulate_inputtext__('hello');",
    );

    let pointers = pointers.lock().unwrap();
    assert_eq!(pointers.len(), 1);
    let (list, pointer) = &pointers[0];
    assert_eq!(*pointer, 1);
    assert_eq!(
        list,
        &vec![
            MousePointer { context_id: 7, x: 1.0, y: 2.0, change: 0.5 },
            MousePointer { context_id: 7, x: 3.0, y: 4.0, change: 1.0 },
        ]
    );
    assert_eq!(*texts.lock().unwrap(), vec!["hello".to_string()]);
}

#[test]
fn execute_test_hands_callback_a_done_function() {
    let mut ctx = context_with(HostMethods::new());
    run(
        &mut ctx,
        "__rfox_execute_test__(function (done) { globalThis.arity = done.length; done('passed'); });",
    );

    let statuses = Rc::new(RefCell::new(Vec::new()));
    let sink = statuses.clone();
    assert!(ctx
        .invoke_execute_test(move |id, status| sink.borrow_mut().push((id, status)))
        .unwrap());
    assert_eq!(*statuses.borrow(), vec![(7, "passed".to_string())]);
    assert_eq!(global_json(&mut ctx, "arity").as_f64(), Some(1.0));

    // The callback is released after one run.
    assert!(!ctx.invoke_execute_test(|_, _| {}).unwrap());
}

#[test]
fn snapshot_directory_records_then_compares() {
    let root = std::env::temp_dir().join(format!("rfbridge-snapshots-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&root);
    let host = HostMethods::new().with_match_image_snapshot({
        let capability = SnapshotDirectory::new(&root).into_capability();
        move |request, handle| capability(request, handle)
    });
    let mut ctx = context_with(host);

    run(
        &mut ctx,
        r#"globalThis.results = [];
           __rfox_match_image_snapshot__([1, 2, 3], 'shot', m => results.push(m));"#,
    );
    ctx.wait_for_pending(WAIT).unwrap();
    run(
        &mut ctx,
        r#"__rfox_match_image_snapshot__([1, 2, 3], 'shot', m => results.push(m));
           __rfox_match_image_snapshot__([9, 9, 9], 'shot', m => results.push(m));"#,
    );
    ctx.wait_for_pending(WAIT).unwrap();

    let mut results: Vec<bool> = serde_json::from_value(global_json(&mut ctx, "results")).unwrap();
    // Comparisons run on separate threads; only the first result is ordered.
    assert!(results.remove(0));
    results.sort();
    assert_eq!(results, vec![false, true]);
    assert!(root.join("shot.sha256").exists());
    let _ = std::fs::remove_dir_all(&root);
}

#[test]
fn teardown_releases_host_capabilities() {
    let marker = Arc::new(());
    let held = marker.clone();
    let ctx = context_with(HostMethods::new().with_simulate_input_text(move |_| drop(held.clone())));
    assert_eq!(Arc::strong_count(&marker), 2);
    drop(ctx);
    assert_eq!(Arc::strong_count(&marker), 1);
}
