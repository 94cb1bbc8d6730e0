use crate::core::{Collect, Gc, GcPtr, GcTrace, MutationContext, new_gc_cell_ptr};
use crate::js_function::Callable;

pub type JSObjectDataPtr<'gc> = GcPtr<'gc, JSObjectData<'gc>>;

#[inline]
pub fn new_js_object_data<'gc>(mc: &MutationContext<'gc>) -> JSObjectDataPtr<'gc> {
    new_gc_cell_ptr(mc, JSObjectData::new())
}

/// Hidden per-object storage that never shows up as a named property.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InternalSlot {
    /// Handler store of a Promise instance (`Value::Promise`).
    Promise,
    /// Set on objects that may be invoked with `new`.
    IsConstructor,
    /// Set on constructors that reject plain calls.
    ConstructOnly,
    /// Realm intrinsic `Promise.prototype`, kept on the global object.
    IntrinsicPromiseProto,
}

#[derive(Clone, Default)]
pub struct JSObjectData<'gc> {
    pub properties: indexmap::IndexMap<String, Value<'gc>>,
    pub slots: indexmap::IndexMap<InternalSlot, Value<'gc>>,
    pub prototype: Option<JSObjectDataPtr<'gc>>,
    /// Class identity, e.g. `"Promise"` or `"Function"`.
    pub class_name: Option<&'static str>,
    /// Executable body for function objects.
    pub callable: Option<Callable<'gc>>,
}

unsafe impl<'gc> Collect<'gc> for JSObjectData<'gc> {
    fn trace<T: GcTrace<'gc>>(&self, cc: &mut T) {
        for v in self.properties.values() {
            v.trace(cc);
        }
        for v in self.slots.values() {
            v.trace(cc);
        }
        if let Some(p) = &self.prototype {
            p.trace(cc);
        }
        if let Some(cl) = &self.callable {
            cl.trace(cc);
        }
    }
}

impl<'gc> JSObjectData<'gc> {
    pub fn new() -> Self {
        JSObjectData::default()
    }

    pub fn with_class(class_name: &'static str) -> Self {
        JSObjectData {
            class_name: Some(class_name),
            ..JSObjectData::default()
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, val: Value<'gc>) {
        self.properties.insert(key.into(), val);
    }

    pub fn get_own(&self, key: &str) -> Option<&Value<'gc>> {
        self.properties.get(key)
    }

    pub fn is_callable(&self) -> bool {
        self.callable.is_some()
    }
}

/// Handler store of one Promise: at most one handler per settlement kind.
#[derive(Clone, Collect)]
#[collect(no_drop)]
pub struct JSPromise<'gc> {
    pub id: usize,
    pub on_fulfilled: Option<Value<'gc>>,
    pub on_rejected: Option<Value<'gc>>,
}

static UNIQUE_ID_SEED: std::sync::atomic::AtomicUsize = std::sync::atomic::AtomicUsize::new(1);

pub fn generate_unique_id() -> usize {
    UNIQUE_ID_SEED.fetch_add(1, std::sync::atomic::Ordering::SeqCst)
}

impl<'gc> JSPromise<'gc> {
    pub fn new() -> Self {
        Self {
            id: generate_unique_id(),
            on_fulfilled: None,
            on_rejected: None,
        }
    }
}

impl Default for JSPromise<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for JSPromise<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "JSPromise {{ id: {}, on_fulfilled: {}, on_rejected: {} }}",
            self.id,
            self.on_fulfilled.is_some(),
            self.on_rejected.is_some()
        )
    }
}

#[derive(Clone)]
pub enum Value<'gc> {
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
    Object(JSObjectDataPtr<'gc>),
    /// Internal handle stored in `InternalSlot::Promise`; never handed to script code.
    Promise(GcPtr<'gc, JSPromise<'gc>>),
}

unsafe impl<'gc> Collect<'gc> for Value<'gc> {
    fn trace<T: GcTrace<'gc>>(&self, cc: &mut T) {
        match self {
            Value::Object(obj) => obj.trace(cc),
            Value::Promise(p) => p.trace(cc),
            Value::Undefined | Value::Null | Value::Boolean(_) | Value::Number(_) | Value::String(_) => {}
        }
    }
}

impl<'gc> Value<'gc> {
    /// Strict equality; objects compare by identity.
    pub fn strict_equals(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Gc::ptr_eq(*a, *b),
            (Value::Promise(a), Value::Promise(b)) => Gc::ptr_eq(*a, *b),
            _ => false,
        }
    }

    pub fn as_object(&self) -> Option<JSObjectDataPtr<'gc>> {
        match self {
            Value::Object(obj) => Some(*obj),
            _ => None,
        }
    }
}

impl From<f64> for Value<'_> {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value<'_> {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<&str> for Value<'_> {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value<'_> {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl<'gc> From<JSObjectDataPtr<'gc>> for Value<'gc> {
    fn from(obj: JSObjectDataPtr<'gc>) -> Self {
        Value::Object(obj)
    }
}

impl std::fmt::Debug for Value<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{}", number_to_string(*n)),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Object(obj) => write!(f, "Object({:p})", Gc::as_ptr(*obj)),
            Value::Promise(p) => write!(f, "{:?}", *p.borrow()),
        }
    }
}

impl std::fmt::Display for Value<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", value_to_string(self))
    }
}

/// The `typeof` name of a value, as used in error messages.
pub fn type_of(val: &Value<'_>) -> &'static str {
    match val {
        Value::Undefined => "undefined",
        Value::Null => "null",
        Value::Boolean(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Object(obj) if obj.borrow().is_callable() => "function",
        Value::Object(_) | Value::Promise(_) => "object",
    }
}

fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity".to_string() } else { "-Infinity".to_string() }
    } else if n == 0.0 {
        // -0 prints as 0
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{n:.0}")
    } else {
        format!("{n}")
    }
}

pub fn value_to_string(val: &Value<'_>) -> String {
    match val {
        Value::Undefined => "undefined".to_string(),
        Value::Null => "null".to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Number(n) => number_to_string(*n),
        Value::String(s) => s.clone(),
        Value::Object(obj) => {
            let data = obj.borrow();
            if data.is_callable() {
                let name = match data.get_own("name") {
                    Some(Value::String(s)) => s.clone(),
                    _ => String::new(),
                };
                format!("function {name}() {{ [native code] }}")
            } else {
                format!("[object {}]", data.class_name.unwrap_or("Object"))
            }
        }
        Value::Promise(_) => "[object Promise]".to_string(),
    }
}

/// Look up a named property, following the prototype chain.
pub fn object_get_key_value<'gc>(obj: &JSObjectDataPtr<'gc>, key: &str) -> Option<Value<'gc>> {
    let mut current = Some(*obj);
    while let Some(cur) = current {
        if let Some(val) = cur.borrow().properties.get(key) {
            return Some(val.clone());
        }
        current = cur.borrow().prototype;
    }
    None
}

pub fn object_set_key_value<'gc>(mc: &MutationContext<'gc>, obj: &JSObjectDataPtr<'gc>, key: &str, val: Value<'gc>) {
    log::trace!("object_set_key_value: obj={:p} key={}", Gc::as_ptr(*obj), key);
    obj.borrow_mut(mc).insert(key, val);
}

pub fn slot_get<'gc>(obj: &JSObjectDataPtr<'gc>, slot: InternalSlot) -> Option<Value<'gc>> {
    obj.borrow().slots.get(&slot).cloned()
}

pub fn slot_set<'gc>(mc: &MutationContext<'gc>, obj: &JSObjectDataPtr<'gc>, slot: InternalSlot, val: Value<'gc>) {
    obj.borrow_mut(mc).slots.insert(slot, val);
}

pub fn slot_has<'gc>(obj: &JSObjectDataPtr<'gc>, slot: InternalSlot) -> bool {
    obj.borrow().slots.contains_key(&slot)
}

pub fn get_class_name(val: &Value<'_>) -> Option<&'static str> {
    match val {
        Value::Object(obj) => obj.borrow().class_name,
        Value::Promise(_) => Some("Promise"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_print_like_script_numbers() {
        assert_eq!(value_to_string(&Value::Number(42.0)), "42");
        assert_eq!(value_to_string(&Value::Number(-0.0)), "0");
        assert_eq!(value_to_string(&Value::Number(1.5)), "1.5");
        assert_eq!(value_to_string(&Value::Number(f64::NAN)), "NaN");
        assert_eq!(value_to_string(&Value::Number(f64::NEG_INFINITY)), "-Infinity");
    }

    #[test]
    fn primitive_type_names() {
        assert_eq!(type_of(&Value::Undefined), "undefined");
        assert_eq!(type_of(&Value::Null), "null");
        assert_eq!(type_of(&Value::Boolean(true)), "boolean");
        assert_eq!(type_of(&Value::Number(1.0)), "number");
        assert_eq!(type_of(&Value::from("x")), "string");
    }

    #[test]
    fn strict_equality_of_primitives() {
        assert!(Value::Number(1.0).strict_equals(&Value::Number(1.0)));
        assert!(!Value::Number(f64::NAN).strict_equals(&Value::Number(f64::NAN)));
        assert!(!Value::from("1").strict_equals(&Value::Number(1.0)));
        assert!(Value::Undefined.strict_equals(&Value::Undefined));
        assert!(!Value::Undefined.strict_equals(&Value::Null));
    }
}
