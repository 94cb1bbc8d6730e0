use microjs::*;

/// Simulates a hardware read that completes on a later turn of the idle loop.
#[derive(clap::Parser)]
#[command(name = "promise_demo", version, about = "Deferred settlement of a simulated hardware read")]
struct Cli {
    /// Maximum number of queued jobs
    #[arg(short, long, default_value_t = DEFAULT_TASK_QUEUE_CAPACITY)]
    capacity: usize,

    /// Fail the read instead of completing it
    #[arg(short, long)]
    reject: bool,

    /// Complete the read before `then`/`catch` are registered (the value is lost)
    #[arg(short, long)]
    settle_early: bool,

    /// Value reported by the read
    #[arg(short, long, default_value_t = 21.5)]
    value: f64,
}

fn start_read<'gc>(
    mc: &MutationContext<'gc>,
    realm: &Realm<'_, 'gc>,
    _this: &Value<'gc>,
    args: &[Value<'gc>],
) -> Result<Value<'gc>, EvalError<'gc>> {
    // The "driver" keeps the settle functions until the read completes.
    realm.set_global(mc, "__read_resolve", args.first().cloned().unwrap_or(Value::Undefined));
    realm.set_global(mc, "__read_reject", args.get(1).cloned().unwrap_or(Value::Undefined));
    println!("read started");
    Ok(Value::Undefined)
}

fn on_reading<'gc>(
    _mc: &MutationContext<'gc>,
    _realm: &Realm<'_, 'gc>,
    _this: &Value<'gc>,
    args: &[Value<'gc>],
) -> Result<Value<'gc>, EvalError<'gc>> {
    println!("then: reading = {}", value_to_string(args.first().unwrap_or(&Value::Undefined)));
    Ok(Value::Undefined)
}

fn on_failure<'gc>(
    _mc: &MutationContext<'gc>,
    _realm: &Realm<'_, 'gc>,
    _this: &Value<'gc>,
    args: &[Value<'gc>],
) -> Result<Value<'gc>, EvalError<'gc>> {
    println!("catch: {}", value_to_string(args.first().unwrap_or(&Value::Undefined)));
    Ok(Value::Undefined)
}

const START_READ: NativeFunction = NativeFunction::new("startRead", start_read);
const ON_READING: NativeFunction = NativeFunction::new("onReading", on_reading);
const ON_FAILURE: NativeFunction = NativeFunction::new("onFailure", on_failure);

fn complete_read(rt: &Runtime, reject: bool, value: f64) -> Result<(), JSError> {
    rt.mutate(move |mc, realm| {
        let (settle, data) = if reject {
            (realm.get_global("__read_reject"), Value::from(format!("sensor timeout after {value}ms")))
        } else {
            (realm.get_global("__read_resolve"), Value::Number(value))
        };
        call_function_with_this(mc, realm, &settle, &Value::Undefined, &[data])?;
        Ok(())
    })?;
    println!("read completed; {} job(s) pending", rt.pending_jobs());
    Ok(())
}

fn register_handlers(rt: &Runtime) -> Result<(), JSError> {
    rt.mutate(|mc, realm| {
        let p = realm.get_global("p");
        let on_reading = Value::Object(make_native_fn_obj(mc, ON_READING, 1));
        let on_failure = Value::Object(make_native_fn_obj(mc, ON_FAILURE, 1));
        call_method(mc, realm, &p, "then", &[on_reading])?;
        call_method(mc, realm, &p, "catch", &[on_failure])?;
        Ok(())
    })?;
    println!("handlers registered");
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    // Initialize logger (controlled by RUST_LOG)
    env_logger::init();

    let cli = <Cli as clap::Parser>::parse();
    let mut rt = Runtime::with_config(RuntimeConfig::default().with_task_queue_capacity(cli.capacity))?;

    rt.mutate(|mc, realm| {
        let executor = Value::Object(make_native_fn_obj(mc, START_READ, 2));
        let p = construct(mc, realm, &realm.get_global("Promise"), &[executor])?;
        realm.set_global(mc, "p", p);
        Ok(())
    })?;

    if cli.settle_early {
        complete_read(&rt, cli.reject, cli.value)?;
        let ran = rt.run_event_loop()?;
        println!("idle loop ran {ran} job(s) before any handler existed");
        register_handlers(&rt)?;
    } else {
        register_handlers(&rt)?;
        complete_read(&rt, cli.reject, cli.value)?;
    }

    let ran = rt.run_event_loop()?;
    println!("idle loop ran {ran} job(s)");
    rt.collect_garbage();
    Ok(())
}
