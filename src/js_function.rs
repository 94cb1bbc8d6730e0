use crate::core::{
    Collect, EvalError, GcTrace, InternalSlot, JSObjectData, JSObjectDataPtr, MutationContext, Realm, Value, new_gc_cell_ptr,
    object_get_key_value, object_set_key_value, slot_has, slot_set, type_of,
};
use crate::raise_type_error;

/// Signature shared by every builtin: `(mc, realm, this, args)`.
pub type NativeFn =
    for<'gc> fn(&MutationContext<'gc>, &Realm<'_, 'gc>, &Value<'gc>, &[Value<'gc>]) -> Result<Value<'gc>, EvalError<'gc>>;

#[derive(Clone, Copy)]
pub struct NativeFunction {
    pub name: &'static str,
    pub func: NativeFn,
}

impl NativeFunction {
    pub const fn new(name: &'static str, func: NativeFn) -> Self {
        Self { name, func }
    }
}

impl std::fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NativeFunction({})", self.name)
    }
}

unsafe impl<'gc> Collect<'gc> for NativeFunction {
    fn trace<T: GcTrace<'gc>>(&self, _cc: &mut T) {}
}

/// Executable body of a function object.
#[derive(Clone, Debug)]
pub enum Callable<'gc> {
    /// Receives whatever `this` the caller supplies.
    Native(NativeFunction),
    /// Always receives the captured `this`, regardless of the caller's receiver.
    Bound { func: NativeFunction, this: Value<'gc> },
}

unsafe impl<'gc> Collect<'gc> for Callable<'gc> {
    fn trace<T: GcTrace<'gc>>(&self, cc: &mut T) {
        if let Callable::Bound { this, .. } = self {
            this.trace(cc);
        }
    }
}

impl Callable<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Callable::Native(f) | Callable::Bound { func: f, .. } => f.name,
        }
    }
}

fn new_function_object<'gc>(mc: &MutationContext<'gc>, name: &str, arity: usize, callable: Callable<'gc>) -> JSObjectDataPtr<'gc> {
    let mut data = JSObjectData::with_class("Function");
    data.insert("name", Value::from(name));
    data.insert("length", Value::Number(arity as f64));
    data.callable = Some(callable);
    new_gc_cell_ptr(mc, data)
}

pub fn make_native_fn_obj<'gc>(mc: &MutationContext<'gc>, func: NativeFunction, arity: usize) -> JSObjectDataPtr<'gc> {
    new_function_object(mc, func.name, arity, Callable::Native(func))
}

/// Create a function object whose receiver is fixed to `this`.
pub fn make_bound_fn_obj<'gc>(mc: &MutationContext<'gc>, func: NativeFunction, arity: usize, this: Value<'gc>) -> JSObjectDataPtr<'gc> {
    new_function_object(mc, func.name, arity, Callable::Bound { func, this })
}

/// Create a constructor object. With `construct_only` set, plain calls are rejected.
pub fn make_native_ctor_obj<'gc>(
    mc: &MutationContext<'gc>,
    func: NativeFunction,
    arity: usize,
    construct_only: bool,
) -> JSObjectDataPtr<'gc> {
    let ctor = make_native_fn_obj(mc, func, arity);
    slot_set(mc, &ctor, InternalSlot::IsConstructor, Value::Boolean(true));
    if construct_only {
        slot_set(mc, &ctor, InternalSlot::ConstructOnly, Value::Boolean(true));
    }
    ctor
}

pub fn is_callable(v: &Value<'_>) -> bool {
    match v {
        Value::Object(obj) => obj.borrow().is_callable(),
        _ => false,
    }
}

pub fn is_constructor(v: &Value<'_>) -> bool {
    match v {
        Value::Object(obj) => obj.borrow().is_callable() && slot_has(obj, InternalSlot::IsConstructor),
        _ => false,
    }
}

/// Invoke `func` with receiver `this`. `is_construct` selects constructor-style
/// invocation; the receiver is then ignored and the callee builds its own object.
pub fn call_function<'gc>(
    mc: &MutationContext<'gc>,
    realm: &Realm<'_, 'gc>,
    func: &Value<'gc>,
    this: &Value<'gc>,
    is_construct: bool,
    args: &[Value<'gc>],
) -> Result<Value<'gc>, EvalError<'gc>> {
    let Value::Object(obj) = func else {
        return Err(raise_type_error!(format!("Expecting a function to call, got {}", type_of(func))).into());
    };
    // Clone the body out so the callee may freely mutate the function object.
    let callable = obj.borrow().callable.clone();
    let Some(callable) = callable else {
        return Err(raise_type_error!(format!("Expecting a function to call, got {}", type_of(func))).into());
    };

    if is_construct {
        if !slot_has(obj, InternalSlot::IsConstructor) {
            return Err(raise_type_error!(format!("{} is not a constructor", callable.name())).into());
        }
    } else if slot_has(obj, InternalSlot::ConstructOnly) {
        return Err(raise_type_error!(format!("Constructor {} requires 'new'", callable.name())).into());
    }

    log::trace!("call_function: {} construct={} argc={}", callable.name(), is_construct, args.len());
    match callable {
        Callable::Native(f) => {
            let receiver = if is_construct { Value::Undefined } else { this.clone() };
            (f.func)(mc, realm, &receiver, args)
        }
        Callable::Bound { func: f, this: bound } => (f.func)(mc, realm, &bound, args),
    }
}

pub fn call_function_with_this<'gc>(
    mc: &MutationContext<'gc>,
    realm: &Realm<'_, 'gc>,
    func: &Value<'gc>,
    this: &Value<'gc>,
    args: &[Value<'gc>],
) -> Result<Value<'gc>, EvalError<'gc>> {
    call_function(mc, realm, func, this, false, args)
}

/// `new ctor(...args)`
pub fn construct<'gc>(
    mc: &MutationContext<'gc>,
    realm: &Realm<'_, 'gc>,
    ctor: &Value<'gc>,
    args: &[Value<'gc>],
) -> Result<Value<'gc>, EvalError<'gc>> {
    call_function(mc, realm, ctor, &Value::Undefined, true, args)
}

/// `this[name](...args)`, looking `name` up through the prototype chain.
pub fn call_method<'gc>(
    mc: &MutationContext<'gc>,
    realm: &Realm<'_, 'gc>,
    this: &Value<'gc>,
    name: &str,
    args: &[Value<'gc>],
) -> Result<Value<'gc>, EvalError<'gc>> {
    let Value::Object(obj) = this else {
        return Err(raise_type_error!(format!("Cannot read property '{name}' of {}", type_of(this))).into());
    };
    let method = object_get_key_value(obj, name).unwrap_or(Value::Undefined);
    if !is_callable(&method) {
        return Err(raise_type_error!(format!("{name} is not a function, got {}", type_of(&method))).into());
    }
    call_function_with_this(mc, realm, &method, this, args)
}

/// Install a native method on `obj`.
pub fn define_native_method<'gc>(mc: &MutationContext<'gc>, obj: &JSObjectDataPtr<'gc>, func: NativeFunction, arity: usize) {
    let fn_obj = make_native_fn_obj(mc, func, arity);
    object_set_key_value(mc, obj, func.name, Value::Object(fn_obj));
}
