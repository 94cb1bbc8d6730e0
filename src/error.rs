#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum JSError {
    #[error("Type error: {message}")]
    TypeError { message: String },

    #[error("Runtime error: {message}")]
    RuntimeError { message: String },

    #[error("Thrown value: {value}")]
    Throw { value: String },

    #[error("Task queue full (capacity {capacity})")]
    TaskQueueFull { capacity: usize },
}

impl JSError {
    /// The bare message, without the kind prefix added by `Display`.
    pub fn message(&self) -> String {
        match self {
            JSError::TypeError { message } => message.clone(),
            JSError::RuntimeError { message } => message.clone(),
            JSError::Throw { value } => value.clone(),
            JSError::TaskQueueFull { .. } => self.to_string(),
        }
    }

    pub fn is_type_error(&self) -> bool {
        matches!(self, JSError::TypeError { .. })
    }
}

impl From<JSError> for std::io::Error {
    fn from(err: JSError) -> std::io::Error {
        std::io::Error::other(err.to_string())
    }
}

// The raise macros record the call site in the trace log. They are macros so
// that `file!()` and `line!()` expand where they are invoked.
#[macro_export]
macro_rules! raise_type_error {
    ($msg:expr) => {{
        log::trace!("TypeError raised in {} ({}:{})", $crate::function_name!(), file!(), line!());
        $crate::JSError::TypeError { message: $msg.to_string() }
    }};
}

#[macro_export]
macro_rules! raise_runtime_error {
    ($msg:expr) => {{
        log::trace!("RuntimeError raised in {} ({}:{})", $crate::function_name!(), file!(), line!());
        $crate::JSError::RuntimeError { message: $msg.to_string() }
    }};
}

#[macro_export]
macro_rules! function_name {
    () => {{
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            std::any::type_name::<T>()
        }
        let name = type_name_of(f);
        // remove the trailing "::f"
        &name[..name.len() - 3]
    }};
}
