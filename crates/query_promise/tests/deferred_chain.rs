//! Callback chain semantics of deferred resolution.
//!
//! Covers ordered dispatch, value threading through `then`, observers that
//! cannot change the result, and recovery/propagation through `fail`.

#![allow(clippy::expect_used, reason = "Tests assert on expected outcomes")]

use parking_lot::Mutex;
use query_promise::{
    CallbackTag, Context, Deferred, ErrorKind, Function, Item, QueryError, QueryResult, Value,
    WorkRef, WorkUnit,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

type Log = Arc<Mutex<Vec<String>>>;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn int(value: i64) -> Value {
    Value::from(value)
}

fn ints(values: &[i64]) -> Value {
    values.iter().copied().map(Item::from).collect()
}

/// Wraps a closure over the argument list as a work unit.
fn unit<F>(name: &'static str, arity: usize, body: F) -> WorkRef
where
    F: Fn(&[Value]) -> QueryResult<Value> + Send + Sync + 'static,
{
    Function::new(name, arity, move |_ctx, args| body(args))
}

fn raising(name: &'static str, code: &'static str) -> WorkRef {
    unit(name, 0, move |_args| {
        Err(QueryError::invocation(code, format!("{name} failed")))
    })
}

/// A callback that records `name` and returns `result` (or raises `code`).
fn recorder(log: &Log, name: &'static str, result: Result<i64, &'static str>) -> WorkRef {
    let log = Arc::clone(log);
    unit(name, 1, move |_args| {
        log.lock().push(name.to_owned());
        match result {
            Ok(value) => Ok(int(value)),
            Err(code) => Err(QueryError::invocation(code, format!("{name} raised"))),
        }
    })
}

fn add() -> WorkRef {
    unit("add", 2, |args| {
        Ok(int(args.iter().filter_map(Value::as_integer).sum()))
    })
}

fn times(factor: i64) -> WorkRef {
    unit("times", 1, move |args| {
        let value = args[0].as_integer().expect("integer input");
        Ok(int(value * factor))
    })
}

fn pair(lhs: i64, rhs: i64) -> Vec<Value> {
    vec![Value::array([int(lhs), int(rhs)])]
}

#[test]
fn no_callbacks_concatenates_unit_results_in_order() {
    init_logging();
    let multiply = unit("multiply", 2, |args| {
        Ok(int(args.iter().filter_map(Value::as_integer).product()))
    });
    let deferred = Deferred::new(vec![add(), multiply], pair(2, 3)).expect("deferred");

    let value = deferred.resolve(&Context::default()).expect("resolves");
    assert_eq!(value, ints(&[5, 6]));
}

#[test]
fn then_composes_with_the_uncallbacked_result() {
    init_logging();
    let ctx = Context::default();
    let plain = Deferred::new(vec![add()], pair(2, 3)).expect("deferred");
    let chained = Deferred::new(vec![add()], pair(2, 3)).expect("deferred");
    chained
        .add_callback(CallbackTag::Then, times(10))
        .expect("registers");

    let base = plain.resolve(&ctx).expect("plain resolves");
    let composed = chained.resolve(&ctx).expect("chained resolves");
    let direct = times(10).invoke(&ctx, &[base]).expect("direct call");
    assert_eq!(composed, direct);
    assert_eq!(composed, int(50));
}

#[test]
fn then_callbacks_thread_values_in_registration_order() {
    init_logging();
    let deferred = Deferred::new(vec![add()], pair(1, 1)).expect("deferred");
    let plus_one = unit("plus_one", 1, |args| {
        Ok(int(args[0].as_integer().expect("integer") + 1))
    });
    deferred
        .add_callback(CallbackTag::Then, times(3))
        .and_then(|deferred| deferred.add_callback(CallbackTag::Then, plus_one))
        .expect("registers");

    // (1 + 1) * 3 + 1
    assert_eq!(deferred.resolve(&Context::default()).ok(), Some(int(7)));
}

#[test]
fn done_and_always_observe_without_changing_the_result() {
    init_logging();
    let log: Log = Arc::default();
    let deferred = Deferred::new(vec![add()], pair(2, 3)).expect("deferred");
    deferred
        .add_callback(CallbackTag::Done, recorder(&log, "done", Ok(-1)))
        .and_then(|deferred| {
            deferred.add_callback(CallbackTag::Always, recorder(&log, "always", Ok(-2)))
        })
        .and_then(|deferred| {
            deferred.add_callback(CallbackTag::Fail, recorder(&log, "fail", Ok(-3)))
        })
        .expect("registers");

    assert_eq!(deferred.resolve(&Context::default()).ok(), Some(int(5)));
    assert_eq!(*log.lock(), ["done", "always"]);
}

#[test]
fn fail_callback_recovers_with_the_mapped_error() {
    init_logging();
    let deferred = Deferred::new(vec![raising("boom", "err:BOOM")], Vec::new()).expect("deferred");
    let describe = unit("describe", 1, |args| {
        Ok(args[0].get("code").cloned().unwrap_or_default())
    });
    deferred
        .add_callback(CallbackTag::Fail, describe)
        .expect("registers");

    let value = deferred.resolve(&Context::default()).expect("mitigated");
    assert_eq!(value, Value::from("err:BOOM"));
}

#[test]
fn always_runs_on_failure_but_cannot_suppress_it() {
    init_logging();
    let log: Log = Arc::default();
    let deferred = Deferred::new(vec![raising("boom", "err:BOOM")], Vec::new()).expect("deferred");
    deferred
        .add_callback(CallbackTag::Then, recorder(&log, "then", Ok(1)))
        .and_then(|deferred| {
            deferred.add_callback(CallbackTag::Always, recorder(&log, "always", Ok(2)))
        })
        .expect("registers");

    let err = deferred
        .resolve(&Context::default())
        .expect_err("unmitigated failure propagates");
    assert_eq!(err.code(), "err:BOOM");
    assert_eq!(*log.lock(), ["always"]);
}

#[test]
fn failing_fail_callback_chains_and_the_original_error_surfaces() {
    init_logging();
    let log: Log = Arc::default();
    let deferred =
        Deferred::new(vec![raising("boom", "err:ORIGINAL")], Vec::new()).expect("deferred");
    deferred
        .add_callback(CallbackTag::Fail, recorder(&log, "fail1", Err("err:SECONDARY")))
        .and_then(|deferred| {
            deferred.add_callback(CallbackTag::Always, recorder(&log, "always", Ok(0)))
        })
        .expect("registers");

    let err = deferred
        .resolve(&Context::default())
        .expect_err("nothing mitigates");
    assert_eq!(err.code(), "err:ORIGINAL");
    assert_eq!(*log.lock(), ["fail1", "always"]);
}

#[test]
fn later_fail_can_mitigate_a_failing_fail() {
    init_logging();
    let log: Log = Arc::default();
    let deferred =
        Deferred::new(vec![raising("boom", "err:ORIGINAL")], Vec::new()).expect("deferred");
    deferred
        .add_callback(CallbackTag::Fail, recorder(&log, "fail1", Err("err:SECONDARY")))
        .and_then(|deferred| {
            deferred.add_callback(CallbackTag::Fail, recorder(&log, "fail2", Ok(42)))
        })
        .and_then(|deferred| deferred.add_callback(CallbackTag::Then, times(2)))
        .expect("registers");

    assert_eq!(deferred.resolve(&Context::default()).ok(), Some(int(84)));
    assert_eq!(*log.lock(), ["fail1", "fail2"]);
}

#[test]
fn mid_chain_failure_resumes_after_the_failing_callback() {
    init_logging();
    let log: Log = Arc::default();
    let deferred = Deferred::new(vec![add()], pair(2, 3)).expect("deferred");
    deferred
        // Registered before the failure point: never consulted for it.
        .add_callback(CallbackTag::Fail, recorder(&log, "early_fail", Ok(-1)))
        .and_then(|deferred| {
            deferred.add_callback(CallbackTag::Then, recorder(&log, "then_raises", Err("err:MID")))
        })
        .and_then(|deferred| {
            deferred.add_callback(CallbackTag::Then, recorder(&log, "skipped_then", Ok(-2)))
        })
        .and_then(|deferred| {
            deferred.add_callback(CallbackTag::Fail, recorder(&log, "late_fail", Ok(7)))
        })
        .and_then(|deferred| deferred.add_callback(CallbackTag::Then, times(3)))
        .expect("registers");

    assert_eq!(deferred.resolve(&Context::default()).ok(), Some(int(21)));
    assert_eq!(*log.lock(), ["then_raises", "late_fail"]);
}

#[test]
fn mid_chain_fail_receives_the_current_value() {
    init_logging();
    let deferred = Deferred::new(vec![add()], pair(2, 3)).expect("deferred");
    let echo = unit("echo", 1, |args| Ok(args[0].clone()));
    deferred
        .add_callback(CallbackTag::Then, raising("then_raises", "err:MID"))
        .and_then(|deferred| deferred.add_callback(CallbackTag::Fail, echo))
        .expect("registers");

    assert_eq!(deferred.resolve(&Context::default()).ok(), Some(int(5)));
}

#[test]
fn unmitigated_mid_chain_failure_reports_the_callback_error() {
    init_logging();
    let deferred = Deferred::new(vec![add()], pair(2, 3)).expect("deferred");
    deferred
        .add_callback(CallbackTag::Done, raising("done_raises", "err:DONE"))
        .expect("registers");

    let err = deferred.resolve(&Context::default()).expect_err("propagates");
    assert_eq!(err.code(), "err:DONE");
}

#[test]
fn always_raising_during_failure_propagates_its_own_error() {
    init_logging();
    let log: Log = Arc::default();
    let deferred =
        Deferred::new(vec![raising("boom", "err:ORIGINAL")], Vec::new()).expect("deferred");
    deferred
        .add_callback(CallbackTag::Always, recorder(&log, "always", Err("err:ALWAYS")))
        .and_then(|deferred| {
            deferred.add_callback(CallbackTag::Fail, recorder(&log, "fail", Ok(1)))
        })
        .expect("registers");

    let err = deferred.resolve(&Context::default()).expect_err("propagates");
    assert_eq!(err.code(), "err:ALWAYS");
    assert_eq!(*log.lock(), ["always"]);
}

#[test]
fn then_of_arity_three_rejects_a_pair() {
    init_logging();
    let pair_unit = unit("pair", 0, |_args| Ok(Value::array([int(1), int(2)])));
    let triple = unit("triple", 3, |_args| Ok(Value::empty()));
    let deferred = Deferred::new(vec![pair_unit], Vec::new()).expect("deferred");
    deferred
        .add_callback(CallbackTag::Then, triple)
        .expect("registers");

    let err = deferred.resolve(&Context::default()).expect_err("shape error");
    assert_eq!(err.kind(), ErrorKind::Shape);
    assert!(err.message().contains("expected 3, got 2"), "{err}");
}

#[test]
fn every_resolution_reruns_the_pipeline() {
    init_logging();
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&calls);
    let counter = unit("counter", 0, move |_args| {
        let seen = counted.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(int(i64::try_from(seen).expect("small count")))
    });
    let deferred = Deferred::new(vec![counter], Vec::new()).expect("deferred");
    let ctx = Context::default();

    assert_eq!(deferred.resolve(&ctx).ok(), Some(int(1)));
    assert_eq!(deferred.resolve(&ctx).ok(), Some(int(2)));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn nested_deferreds_ignore_upstream_arguments() {
    init_logging();
    let ctx = Context::default();
    let inner = Deferred::new(vec![add()], pair(4, 5)).expect("inner");
    let outer = Deferred::new(vec![inner.to_work()], pair(100, 200)).expect("outer");
    assert_eq!(outer.resolve(&ctx).ok(), Some(int(9)));
}

#[test]
fn callback_map_registers_in_key_order() {
    init_logging();
    let log: Log = Arc::default();
    let deferred = Deferred::new(vec![add()], pair(2, 3)).expect("deferred");
    let callbacks = Value::map([
        ("then", Value::function(times(2))),
        ("done", Value::function(recorder(&log, "done", Ok(0)))),
    ]);
    deferred.attach(&callbacks).expect("registers");

    let tags: Vec<CallbackTag> = deferred.callbacks().iter().map(|callback| callback.tag).collect();
    assert_eq!(tags, [CallbackTag::Done, CallbackTag::Then]);
    assert_eq!(deferred.resolve(&Context::default()).ok(), Some(int(10)));
}

#[test]
fn deferred_as_function_item_attaches_or_resolves() {
    init_logging();
    let ctx = Context::default();
    let deferred = Deferred::new(vec![add()], pair(2, 3)).expect("deferred");
    let callbacks = Value::map([("then", Value::function(times(4)))]);

    let returned = deferred.invoke(&ctx, &[callbacks]).expect("attaches");
    assert!(returned.as_single().and_then(Item::as_function).is_some());
    assert_eq!(deferred.invoke(&ctx, &[Value::empty()]).ok(), Some(int(20)));

    let err = deferred.invoke(&ctx, &[int(1)]).expect_err("neither empty nor a map");
    assert_eq!(err.kind(), ErrorKind::Registration);
}

#[test]
fn invalid_registrations_are_rejected() {
    init_logging();
    let deferred = Deferred::new(vec![add()], pair(2, 3)).expect("deferred");

    let not_callable = deferred.register(CallbackTag::Then, &int(3)).err();
    assert_eq!(not_callable.map(|err| err.kind()), Some(ErrorKind::Registration));

    let unknown_tag = deferred
        .attach(&Value::map([("finally", Value::function(times(1)))]))
        .err();
    assert_eq!(unknown_tag.map(|err| err.kind()), Some(ErrorKind::Registration));

    assert!(deferred.callbacks().is_empty());
    assert!(Deferred::new(Vec::new(), Vec::new()).is_err());
}

#[test]
fn custom_error_mapper_feeds_fail_callbacks() {
    init_logging();
    let ctx = Context::new(Arc::new(
        |error: &QueryError, work: &[WorkRef], _arguments: &[Value]| {
            Value::from(format!("{}:{}", error.code(), work.len()))
        },
    ));
    let deferred =
        Deferred::new(vec![raising("boom", "err:MAPPED")], Vec::new()).expect("deferred");
    deferred
        .add_callback(CallbackTag::Fail, unit("echo", 1, |args| Ok(args[0].clone())))
        .expect("registers");

    assert_eq!(deferred.resolve(&ctx).ok(), Some(Value::from("err:MAPPED:1")));
}
