use criterion::{Criterion, criterion_group, criterion_main};
use microjs::{
    EvalError, MutationContext, NativeFunction, Realm, Runtime, Value, call_function_with_this, call_method, construct,
    make_native_fn_obj,
};
use std::hint::black_box;

// cargo bench --profile dev

// Initialize logger for benchmark so `RUST_LOG` is honored.
#[ctor::ctor]
fn __init_bench_logger() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default()).try_init();
}

fn resolve_now<'gc>(
    mc: &MutationContext<'gc>,
    realm: &Realm<'_, 'gc>,
    _this: &Value<'gc>,
    args: &[Value<'gc>],
) -> Result<Value<'gc>, EvalError<'gc>> {
    let settle = args.first().cloned().unwrap_or(Value::Undefined);
    call_function_with_this(mc, realm, &settle, &Value::Undefined, &[Value::Number(42.0)])?;
    Ok(Value::Undefined)
}

fn reject_now<'gc>(
    mc: &MutationContext<'gc>,
    realm: &Realm<'_, 'gc>,
    _this: &Value<'gc>,
    args: &[Value<'gc>],
) -> Result<Value<'gc>, EvalError<'gc>> {
    let settle = args.get(1).cloned().unwrap_or(Value::Undefined);
    call_function_with_this(mc, realm, &settle, &Value::Undefined, &[Value::from("error")])?;
    Ok(Value::Undefined)
}

fn ignore<'gc>(
    _mc: &MutationContext<'gc>,
    _realm: &Realm<'_, 'gc>,
    _this: &Value<'gc>,
    args: &[Value<'gc>],
) -> Result<Value<'gc>, EvalError<'gc>> {
    Ok(args.first().cloned().unwrap_or(Value::Undefined))
}

const RESOLVE_NOW: NativeFunction = NativeFunction::new("resolveNow", resolve_now);
const REJECT_NOW: NativeFunction = NativeFunction::new("rejectNow", reject_now);
const IGNORE: NativeFunction = NativeFunction::new("ignore", ignore);

fn settle_and_drain(rt: &mut Runtime, executor: NativeFunction, method: &'static str, promises: usize) {
    rt.mutate(move |mc, realm| {
        let ctor = realm.get_global("Promise");
        let executor = Value::Object(make_native_fn_obj(mc, executor, 2));
        let handler = Value::Object(make_native_fn_obj(mc, IGNORE, 1));
        for _ in 0..promises {
            // Register after the executor ran; the job has not been drained yet.
            let p = construct(mc, realm, &ctor, std::slice::from_ref(&executor))?;
            call_method(mc, realm, &p, method, std::slice::from_ref(&handler))?;
        }
        Ok(())
    })
    .unwrap();
    black_box(rt.run_event_loop().unwrap());
}

fn benchmark_promise_operations(c: &mut Criterion) {
    c.bench_function("promise_runtime_new", |b| {
        b.iter(|| black_box(Runtime::new().unwrap()));
    });

    let mut rt = Runtime::new().unwrap();

    c.bench_function("promise_basic_resolution", |b| {
        b.iter(|| settle_and_drain(&mut rt, RESOLVE_NOW, "then", 1));
    });

    c.bench_function("promise_rejection_catch", |b| {
        b.iter(|| settle_and_drain(&mut rt, REJECT_NOW, "catch", 1));
    });

    // A full default-sized queue drained in one idle loop.
    c.bench_function("promise_full_queue_drain", |b| {
        b.iter(|| settle_and_drain(&mut rt, RESOLVE_NOW, "then", microjs::DEFAULT_TASK_QUEUE_CAPACITY));
    });

    c.bench_function("promise_collect_garbage", |b| {
        b.iter(|| {
            settle_and_drain(&mut rt, RESOLVE_NOW, "then", 16);
            rt.collect_garbage();
        })
    });
}

criterion_group!(benches, benchmark_promise_operations);
criterion_main!(benches);
