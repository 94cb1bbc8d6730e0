pub mod core;
pub(crate) mod error;
pub mod js_function;
pub mod js_promise;

pub use crate::core::{
    EvalError, Gc, GcCell, GcPtr, InternalSlot, JSObjectData, JSObjectDataPtr, JSPromise, Job, JobQueue, MutationContext, PollResult,
    Realm, Runtime, RuntimeConfig, TaskQueue, Value, get_class_name, new_js_object_data, object_get_key_value, object_set_key_value,
    type_of, value_to_string,
};
pub use crate::core::{DEFAULT_TASK_QUEUE_CAPACITY, poll_event_loop, run_jobs};
pub use error::JSError;
pub use js_function::{
    Callable, NativeFn, NativeFunction, call_function, call_function_with_this, call_method, construct, is_callable, make_bound_fn_obj,
    make_native_fn_obj,
};
pub use js_promise::{
    SettleKind, create_promise_capability, dispatch_settlement, get_promise_from_js_object, is_promise, queue_settlement,
    register_handler,
};
