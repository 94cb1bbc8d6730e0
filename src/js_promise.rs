//! # Promise
//!
//! A deliberately small deferred-resolution primitive:
//! - `new Promise(executor)` runs `executor(resolve, reject)` synchronously
//! - `then(cb)` / `catch(cb)` install the single success / failure handler
//! - `Promise.all` exists but always raises "Unimplemented"
//!
//! ## Settlement model
//!
//! A promise stores no state and no result. Settling is an event: calling the
//! `resolve` / `reject` function handed to the executor queues a job on the
//! realm's [`JobQueue`], and when the idle loop gets to it the job reads
//! whichever handler is registered *at that moment* and calls it with the
//! promise as `this` and the settled value as the only argument. Consequences
//! that callers rely on:
//!
//! - registering a second handler of the same kind replaces the first
//! - settling with no handler registered drops the value
//! - every settle call is delivered; settling twice runs the handler twice
//! - a handler installed after a settle call but before its job runs still
//!   receives the value
//! - an error thrown by the executor propagates out of the constructor
//!
//! There is no chaining: `then` and `catch` return `undefined`.

use crate::core::{
    EvalError, GcPtr, InternalSlot, JSObjectData, JSObjectDataPtr, JSPromise, Job, MutationContext, Realm, Value, new_gc_cell_ptr,
    object_set_key_value, slot_get, slot_set, type_of,
};
use crate::error::JSError;
use crate::js_function::{
    NativeFunction, call_function_with_this, define_native_method, is_callable, make_bound_fn_obj, make_native_ctor_obj,
};
use crate::{raise_runtime_error, raise_type_error};

/// Which handler slot a settlement targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleKind {
    Fulfilled,
    Rejected,
}

impl std::fmt::Display for SettleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettleKind::Fulfilled => write!(f, "resolve"),
            SettleKind::Rejected => write!(f, "reject"),
        }
    }
}

const PROMISE_CTOR: NativeFunction = NativeFunction::new("Promise", handle_promise_constructor_val);
const PROMISE_THEN: NativeFunction = NativeFunction::new("then", handle_promise_then_val);
const PROMISE_CATCH: NativeFunction = NativeFunction::new("catch", handle_promise_catch_val);
const PROMISE_ALL: NativeFunction = NativeFunction::new("all", handle_promise_all_val);
const QUEUE_RESOLVE: NativeFunction = NativeFunction::new("resolve", __internal_promise_queue_resolve);
const QUEUE_REJECT: NativeFunction = NativeFunction::new("reject", __internal_promise_queue_reject);
const DISPATCH_RESOLVE: NativeFunction = NativeFunction::new("__promise_dispatch_resolve", __internal_promise_dispatch_resolve);
const DISPATCH_REJECT: NativeFunction = NativeFunction::new("__promise_dispatch_reject", __internal_promise_dispatch_reject);

/// Install `Promise`, `Promise.prototype.{then,catch}` and `Promise.all`.
pub fn initialize_promise<'gc>(mc: &MutationContext<'gc>, realm: &Realm<'_, 'gc>) -> Result<(), JSError> {
    let promise_ctor = make_native_ctor_obj(mc, PROMISE_CTOR, 1, true);
    let promise_proto = new_gc_cell_ptr(mc, JSObjectData::with_class("Object"));

    define_native_method(mc, &promise_proto, PROMISE_THEN, 1);
    define_native_method(mc, &promise_proto, PROMISE_CATCH, 1);
    object_set_key_value(mc, &promise_proto, "constructor", Value::Object(promise_ctor));

    object_set_key_value(mc, &promise_ctor, "prototype", Value::Object(promise_proto));
    define_native_method(mc, &promise_ctor, PROMISE_ALL, 1);

    realm.set_global(mc, "Promise", Value::Object(promise_ctor));
    slot_set(mc, &realm.global, InternalSlot::IntrinsicPromiseProto, Value::Object(promise_proto));
    Ok(())
}

fn get_promise_prototype<'gc>(realm: &Realm<'_, 'gc>) -> Option<JSObjectDataPtr<'gc>> {
    slot_get(&realm.global, InternalSlot::IntrinsicPromiseProto).and_then(|v| v.as_object())
}

/// Allocate a bare Promise object with an empty handler store.
pub fn make_promise_js_object<'gc>(mc: &MutationContext<'gc>, realm: &Realm<'_, 'gc>) -> JSObjectDataPtr<'gc> {
    let promise = new_gc_cell_ptr(mc, JSPromise::new());
    let mut data = JSObjectData::with_class("Promise");
    data.prototype = get_promise_prototype(realm);
    data.slots.insert(InternalSlot::Promise, Value::Promise(promise));
    let obj = new_gc_cell_ptr(mc, data);
    log::trace!("make_promise_js_object: created promise id={}", promise.borrow().id);
    obj
}

pub fn get_promise_from_js_object<'gc>(obj: &JSObjectDataPtr<'gc>) -> Option<GcPtr<'gc, JSPromise<'gc>>> {
    match slot_get(obj, InternalSlot::Promise) {
        Some(Value::Promise(p)) => Some(p),
        _ => None,
    }
}

pub fn is_promise(v: &Value<'_>) -> bool {
    matches!(v, Value::Object(obj) if get_promise_from_js_object(obj).is_some())
}

fn this_promise<'gc>(this: &Value<'gc>) -> Result<(JSObjectDataPtr<'gc>, GcPtr<'gc, JSPromise<'gc>>), JSError> {
    if let Value::Object(obj) = this
        && let Some(promise) = get_promise_from_js_object(obj)
    {
        return Ok((*obj, promise));
    }
    Err(raise_type_error!(format!("Method called on incompatible receiver {}", type_of(this))))
}

/// Create the settle function pair for `promise_obj`. Each one owns a
/// reference to the promise and queues a dispatch job when called.
pub fn create_settle_functions<'gc>(mc: &MutationContext<'gc>, promise_obj: JSObjectDataPtr<'gc>) -> (Value<'gc>, Value<'gc>) {
    let resolve = make_bound_fn_obj(mc, QUEUE_RESOLVE, 1, Value::Object(promise_obj));
    let reject = make_bound_fn_obj(mc, QUEUE_REJECT, 1, Value::Object(promise_obj));
    (Value::Object(resolve), Value::Object(reject))
}

/// Native-side counterpart of `new Promise(...)` for code that settles the
/// promise itself (e.g. on completion of a hardware operation).
pub fn create_promise_capability<'gc>(mc: &MutationContext<'gc>, realm: &Realm<'_, 'gc>) -> (JSObjectDataPtr<'gc>, Value<'gc>, Value<'gc>) {
    let promise_obj = make_promise_js_object(mc, realm);
    let (resolve, reject) = create_settle_functions(mc, promise_obj);
    (promise_obj, resolve, reject)
}

/// `new Promise(executor)`.
///
/// The executor runs before this returns, with the new promise as `this`.
/// Whatever it throws is returned unchanged; the promise is not rejected.
pub fn handle_promise_constructor_val<'gc>(
    mc: &MutationContext<'gc>,
    realm: &Realm<'_, 'gc>,
    _this: &Value<'gc>,
    args: &[Value<'gc>],
) -> Result<Value<'gc>, EvalError<'gc>> {
    let executor = args.first().cloned().unwrap_or(Value::Undefined);
    let (promise_obj, resolve, reject) = create_promise_capability(mc, realm);
    let promise_val = Value::Object(promise_obj);

    log::trace!("Promise constructor: invoking executor {:?}", executor);
    call_function_with_this(mc, realm, &executor, &promise_val, &[resolve, reject])?;
    Ok(promise_val)
}

/// Store `callback` in the handler slot for `kind`, replacing any previous one.
/// A non-callable `callback` is rejected and the slot is left untouched.
pub fn register_handler<'gc>(
    mc: &MutationContext<'gc>,
    promise: GcPtr<'gc, JSPromise<'gc>>,
    kind: SettleKind,
    callback: &Value<'gc>,
) -> Result<(), JSError> {
    if !is_callable(callback) {
        return Err(raise_type_error!(format!("Callback must be a function, got {}", type_of(callback))));
    }
    let mut p = promise.borrow_mut(mc);
    let id = p.id;
    let slot = match kind {
        SettleKind::Fulfilled => &mut p.on_fulfilled,
        SettleKind::Rejected => &mut p.on_rejected,
    };
    if slot.is_some() {
        log::trace!("promise id={id} replacing {kind} handler");
    }
    *slot = Some(callback.clone());
    Ok(())
}

pub fn handle_promise_then_val<'gc>(
    mc: &MutationContext<'gc>,
    _realm: &Realm<'_, 'gc>,
    this: &Value<'gc>,
    args: &[Value<'gc>],
) -> Result<Value<'gc>, EvalError<'gc>> {
    let (_, promise) = this_promise(this)?;
    let callback = args.first().cloned().unwrap_or(Value::Undefined);
    register_handler(mc, promise, SettleKind::Fulfilled, &callback)?;
    Ok(Value::Undefined)
}

pub fn handle_promise_catch_val<'gc>(
    mc: &MutationContext<'gc>,
    _realm: &Realm<'_, 'gc>,
    this: &Value<'gc>,
    args: &[Value<'gc>],
) -> Result<Value<'gc>, EvalError<'gc>> {
    let (_, promise) = this_promise(this)?;
    let callback = args.first().cloned().unwrap_or(Value::Undefined);
    register_handler(mc, promise, SettleKind::Rejected, &callback)?;
    Ok(Value::Undefined)
}

/// `Promise.all` has no implementation and always fails.
pub fn handle_promise_all_val<'gc>(
    _mc: &MutationContext<'gc>,
    _realm: &Realm<'_, 'gc>,
    _this: &Value<'gc>,
    _args: &[Value<'gc>],
) -> Result<Value<'gc>, EvalError<'gc>> {
    Err(raise_runtime_error!("Unimplemented").into())
}

/// Call the handler registered for `kind` right now, if any.
///
/// The handler gets the promise as `this` and `data` as its only argument.
/// With no handler registered, `data` is dropped. Errors from the handler
/// propagate.
pub fn dispatch_settlement<'gc>(
    mc: &MutationContext<'gc>,
    realm: &Realm<'_, 'gc>,
    promise_obj: JSObjectDataPtr<'gc>,
    kind: SettleKind,
    data: Value<'gc>,
) -> Result<(), EvalError<'gc>> {
    let promise = get_promise_from_js_object(&promise_obj)
        .ok_or_else(|| -> EvalError<'gc> { raise_type_error!("Settlement dispatched to a non-Promise").into() })?;
    // Read then release the handler store before calling out; the handler may re-register.
    let (id, handler) = {
        let p = promise.borrow();
        let handler = match kind {
            SettleKind::Fulfilled => p.on_fulfilled.clone(),
            SettleKind::Rejected => p.on_rejected.clone(),
        };
        (p.id, handler)
    };

    match handler {
        Some(handler) => {
            log::trace!("dispatch_settlement: promise id={id} {kind} -> handler with {:?}", data);
            call_function_with_this(mc, realm, &handler, &Value::Object(promise_obj), &[data])?;
        }
        None => log::debug!("dispatch_settlement: promise id={id} {kind} with no handler; dropping {:?}", data),
    }
    Ok(())
}

/// Defer [`dispatch_settlement`] to the realm's job queue.
pub fn queue_settlement<'gc>(
    mc: &MutationContext<'gc>,
    realm: &Realm<'_, 'gc>,
    promise_obj: JSObjectDataPtr<'gc>,
    kind: SettleKind,
    data: Value<'gc>,
) -> Result<(), JSError> {
    let callable = make_dispatch_fn(mc, promise_obj, kind);
    log::trace!("queue_settlement: {kind} queued, {} job(s) ahead", realm.jobs.len());
    realm.jobs.enqueue(mc, Job::new(Value::Object(promise_obj), callable, vec![data]))
}

fn settle_arg<'gc>(args: &[Value<'gc>]) -> Value<'gc> {
    args.first().cloned().unwrap_or(Value::Undefined)
}

/// Body of the `resolve` function handed to an executor; `this` is bound to its promise.
pub fn __internal_promise_queue_resolve<'gc>(
    mc: &MutationContext<'gc>,
    realm: &Realm<'_, 'gc>,
    this: &Value<'gc>,
    args: &[Value<'gc>],
) -> Result<Value<'gc>, EvalError<'gc>> {
    let (promise_obj, _) = this_promise(this)?;
    queue_settlement(mc, realm, promise_obj, SettleKind::Fulfilled, settle_arg(args))?;
    Ok(Value::Undefined)
}

pub fn __internal_promise_queue_reject<'gc>(
    mc: &MutationContext<'gc>,
    realm: &Realm<'_, 'gc>,
    this: &Value<'gc>,
    args: &[Value<'gc>],
) -> Result<Value<'gc>, EvalError<'gc>> {
    let (promise_obj, _) = this_promise(this)?;
    queue_settlement(mc, realm, promise_obj, SettleKind::Rejected, settle_arg(args))?;
    Ok(Value::Undefined)
}

fn __internal_promise_dispatch_resolve<'gc>(
    mc: &MutationContext<'gc>,
    realm: &Realm<'_, 'gc>,
    this: &Value<'gc>,
    args: &[Value<'gc>],
) -> Result<Value<'gc>, EvalError<'gc>> {
    let (promise_obj, _) = this_promise(this)?;
    dispatch_settlement(mc, realm, promise_obj, SettleKind::Fulfilled, settle_arg(args))?;
    Ok(Value::Undefined)
}

fn __internal_promise_dispatch_reject<'gc>(
    mc: &MutationContext<'gc>,
    realm: &Realm<'_, 'gc>,
    this: &Value<'gc>,
    args: &[Value<'gc>],
) -> Result<Value<'gc>, EvalError<'gc>> {
    let (promise_obj, _) = this_promise(this)?;
    dispatch_settlement(mc, realm, promise_obj, SettleKind::Rejected, settle_arg(args))?;
    Ok(Value::Undefined)
}

/// Direct-dispatch function for `kind`, bound to `promise_obj`. Calling it runs
/// the handler synchronously.
pub fn make_dispatch_fn<'gc>(mc: &MutationContext<'gc>, promise_obj: JSObjectDataPtr<'gc>, kind: SettleKind) -> Value<'gc> {
    let dispatch = match kind {
        SettleKind::Fulfilled => DISPATCH_RESOLVE,
        SettleKind::Rejected => DISPATCH_REJECT,
    };
    Value::Object(make_bound_fn_obj(mc, dispatch, 1, Value::Object(promise_obj)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Runtime, get_class_name, run_jobs};
    use crate::js_function::{call_method, construct, make_native_fn_obj};

    fn count_call<'gc>(
        mc: &MutationContext<'gc>,
        realm: &Realm<'_, 'gc>,
        this: &Value<'gc>,
        args: &[Value<'gc>],
    ) -> Result<Value<'gc>, EvalError<'gc>> {
        let n = match realm.get_global("count") {
            Value::Number(n) => n,
            _ => 0.0,
        };
        realm.set_global(mc, "count", Value::Number(n + 1.0));
        realm.set_global(mc, "last", settle_arg(args));
        realm.set_global(mc, "last_this", this.clone());
        Ok(Value::Undefined)
    }

    const COUNT_CALL: NativeFunction = NativeFunction::new("countCall", count_call);

    #[test]
    fn promise_objects_are_tagged() {
        let rt = Runtime::new().unwrap();
        rt.mutate(|mc, realm| {
            let (p, resolve, _reject) = create_promise_capability(mc, realm);
            let p = Value::Object(p);
            assert_eq!(get_class_name(&p), Some("Promise"));
            assert_eq!(p.to_string(), "[object Promise]");
            assert!(is_promise(&p));
            assert!(!is_promise(&resolve));
            assert_eq!(type_of(&resolve), "function");
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn direct_dispatch_runs_handler_synchronously() {
        let rt = Runtime::new().unwrap();
        let (last, this_is_promise) = rt
            .mutate(|mc, realm| {
                let (p, _, _) = create_promise_capability(mc, realm);
                let handler = Value::Object(make_native_fn_obj(mc, COUNT_CALL, 1));
                register_handler(mc, get_promise_from_js_object(&p).unwrap(), SettleKind::Fulfilled, &handler)?;
                dispatch_settlement(mc, realm, p, SettleKind::Fulfilled, Value::Number(5.0))?;
                assert!(realm.jobs.is_empty());
                let this_is_promise = realm.get_global("last_this").strict_equals(&Value::Object(p));
                Ok((realm.get_global("last").to_string(), this_is_promise))
            })
            .unwrap();
        assert_eq!(last, "5");
        assert!(this_is_promise);
    }

    #[test]
    fn direct_dispatch_without_handler_is_a_no_op() {
        let rt = Runtime::new().unwrap();
        let count = rt
            .mutate(|mc, realm| {
                let (p, _, _) = create_promise_capability(mc, realm);
                dispatch_settlement(mc, realm, p, SettleKind::Rejected, Value::Number(1.0))?;
                let direct = make_dispatch_fn(mc, p, SettleKind::Fulfilled);
                call_function_with_this(mc, realm, &direct, &Value::Undefined, &[Value::Number(2.0)])?;
                Ok(realm.get_global("count").to_string())
            })
            .unwrap();
        assert_eq!(count, "undefined");
    }

    #[test]
    fn settle_queues_instead_of_calling() {
        let rt = Runtime::new().unwrap();
        rt.mutate(|mc, realm| {
            let (p, resolve, _) = create_promise_capability(mc, realm);
            let handler = Value::Object(make_native_fn_obj(mc, COUNT_CALL, 1));
            call_method(mc, realm, &Value::Object(p), "then", &[handler])?;
            call_function_with_this(mc, realm, &resolve, &Value::Undefined, &[Value::from("x")])?;
            assert_eq!(realm.get_global("count").to_string(), "undefined");
            assert_eq!(realm.jobs.len(), 1);
            assert_eq!(run_jobs(mc, realm)?, 1);
            assert_eq!(realm.get_global("count").to_string(), "1");
            assert_eq!(realm.get_global("last").to_string(), "x");
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn then_on_non_promise_is_a_type_error() {
        let rt = Runtime::new().unwrap();
        let msg = rt
            .mutate(|mc, realm| {
                let then = Value::Object(make_native_fn_obj(mc, PROMISE_THEN, 1));
                let handler = Value::Object(make_native_fn_obj(mc, COUNT_CALL, 1));
                let err = call_function_with_this(mc, realm, &then, &Value::Number(1.0), &[handler]).unwrap_err();
                Ok(err.message())
            })
            .unwrap();
        assert_eq!(msg, "Method called on incompatible receiver number");
    }

    #[test]
    fn executor_runs_before_constructor_returns() {
        let rt = Runtime::new().unwrap();
        rt.mutate(|mc, realm| {
            let executor = Value::Object(make_native_fn_obj(mc, COUNT_CALL, 2));
            let p = construct(mc, realm, &realm.get_global("Promise"), &[executor])?;
            assert!(is_promise(&p));
            assert_eq!(realm.get_global("count").to_string(), "1");
            // the executor's first argument is the bound resolve function
            assert_eq!(type_of(&realm.get_global("last")), "function");
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn missing_executor_is_a_type_error() {
        let rt = Runtime::new().unwrap();
        let msg = rt
            .mutate(|mc, realm| {
                let err = construct(mc, realm, &realm.get_global("Promise"), &[]).unwrap_err();
                assert!(err.is_type_error());
                Ok(err.message())
            })
            .unwrap();
        assert_eq!(msg, "Expecting a function to call, got undefined");
    }
}
