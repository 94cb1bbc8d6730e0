use crate::{
    JSError,
    core::{Value, value_to_string},
};

/// Error channel inside the managed heap. A thrown script value travels as-is
/// until it leaves the arena, where it is rendered into a `JSError`.
#[derive(Debug)]
pub enum EvalError<'gc> {
    Js(JSError),
    Throw(Value<'gc>),
}

impl<'gc> From<JSError> for EvalError<'gc> {
    fn from(e: JSError) -> Self {
        EvalError::Js(e)
    }
}

impl<'gc> From<EvalError<'gc>> for JSError {
    fn from(e: EvalError<'gc>) -> Self {
        match e {
            EvalError::Js(j) => j,
            EvalError::Throw(v) => JSError::Throw { value: value_to_string(&v) },
        }
    }
}

impl<'gc> EvalError<'gc> {
    pub fn message(&self) -> String {
        match self {
            EvalError::Js(e) => e.message(),
            EvalError::Throw(v) => value_to_string(v),
        }
    }

    /// The thrown script value, if this error carries one.
    pub fn thrown_value(&self) -> Option<&Value<'gc>> {
        match self {
            EvalError::Throw(v) => Some(v),
            EvalError::Js(_) => None,
        }
    }

    pub fn is_type_error(&self) -> bool {
        matches!(self, EvalError::Js(e) if e.is_type_error())
    }
}

impl std::fmt::Display for EvalError<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvalError::Js(e) => write!(f, "{e}"),
            EvalError::Throw(v) => write!(f, "Uncaught {}", value_to_string(v)),
        }
    }
}
