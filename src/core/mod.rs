use crate::error::JSError;
use crate::js_promise::initialize_promise;
pub use gc_arena::Mutation as MutationContext;
pub use gc_arena::collect::Trace as GcTrace;
pub use gc_arena::lock::RefLock as GcCell;
pub use gc_arena::{Collect, Gc};
pub type GcPtr<'gc, T> = Gc<'gc, GcCell<T>>;

#[inline]
pub fn new_gc_cell_ptr<'gc, T: 'gc + Collect<'gc>>(mc: &MutationContext<'gc>, value: T) -> GcPtr<'gc, T> {
    Gc::new(mc, GcCell::new(value))
}

mod value;
pub use value::*;

pub mod js_error;
pub use js_error::*;

pub mod task_queue;
pub use task_queue::{Job, JobQueue, PollResult, TaskQueue, poll_event_loop, run_jobs};

#[derive(Collect)]
#[collect(no_drop)]
pub struct JsRoot<'gc> {
    pub global_env: JSObjectDataPtr<'gc>,
    pub task_queue: GcPtr<'gc, TaskQueue<'gc>>,
}

pub type JsArena = gc_arena::Arena<gc_arena::Rootable!['gc => JsRoot<'gc>]>;

/// What every builtin gets to see of the runtime: the global object and the
/// queue deferred work goes to.
#[derive(Clone, Copy)]
pub struct Realm<'a, 'gc> {
    pub global: JSObjectDataPtr<'gc>,
    pub jobs: &'a dyn JobQueue<'gc>,
}

impl<'a, 'gc> Realm<'a, 'gc> {
    pub fn new(global: JSObjectDataPtr<'gc>, jobs: &'a dyn JobQueue<'gc>) -> Self {
        Self { global, jobs }
    }

    pub fn get_global(&self, name: &str) -> Value<'gc> {
        object_get_key_value(&self.global, name).unwrap_or(Value::Undefined)
    }

    pub fn set_global(&self, mc: &MutationContext<'gc>, name: &str, val: Value<'gc>) {
        object_set_key_value(mc, &self.global, name, val);
    }

    /// Same global object, different job queue.
    pub fn with_jobs<'b>(&self, jobs: &'b dyn JobQueue<'gc>) -> Realm<'b, 'gc> {
        Realm { global: self.global, jobs }
    }
}

/// Fixed event buffer size of small devices.
pub const DEFAULT_TASK_QUEUE_CAPACITY: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Maximum number of jobs waiting in the deferred task queue.
    pub task_queue_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            task_queue_capacity: DEFAULT_TASK_QUEUE_CAPACITY,
        }
    }
}

impl RuntimeConfig {
    pub fn with_task_queue_capacity(mut self, capacity: usize) -> Self {
        self.task_queue_capacity = capacity;
        self
    }

    pub fn validate(&self) -> Result<(), JSError> {
        if self.task_queue_capacity == 0 {
            return Err(crate::raise_runtime_error!("task_queue_capacity must be at least 1"));
        }
        Ok(())
    }
}

pub fn initialize_global_constructors<'gc>(mc: &MutationContext<'gc>, realm: &Realm<'_, 'gc>) -> Result<(), JSError> {
    realm.set_global(mc, "globalThis", Value::Object(realm.global));
    initialize_promise(mc, realm)?;
    Ok(())
}

/// A single-threaded runtime: one managed heap, one global object, one
/// bounded task queue.
pub struct Runtime {
    arena: JsArena,
    config: RuntimeConfig,
}

impl Runtime {
    pub fn new() -> Result<Self, JSError> {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Result<Self, JSError> {
        config.validate()?;
        let capacity = config.task_queue_capacity;
        let arena = JsArena::new(|mc| JsRoot {
            global_env: new_gc_cell_ptr(mc, JSObjectData::with_class("global")),
            task_queue: new_gc_cell_ptr(mc, TaskQueue::with_capacity(capacity)),
        });

        arena.mutate(|mc, root| {
            let realm = Realm::new(root.global_env, &root.task_queue);
            initialize_global_constructors(mc, &realm)
        })?;
        log::debug!("Runtime created with {:?}", config);

        Ok(Self { arena, config })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Run one synchronous turn against the heap. Jobs queued during the turn
    /// stay queued until [`Runtime::run_event_loop`] or [`Runtime::poll_event_loop`].
    pub fn mutate<F, T>(&self, f: F) -> Result<T, JSError>
    where
        F: for<'a, 'gc> FnOnce(&'a MutationContext<'gc>, &'a Realm<'a, 'gc>) -> Result<T, EvalError<'gc>>,
    {
        self.arena.mutate(|mc, root| {
            let realm = Realm::new(root.global_env, &root.task_queue);
            f(mc, &realm).map_err(JSError::from)
        })
    }

    /// Run at most one queued job in its own turn.
    pub fn poll_event_loop(&mut self) -> Result<PollResult, JSError> {
        let result = self.arena.mutate(|mc, root| {
            let realm = Realm::new(root.global_env, &root.task_queue);
            poll_event_loop(mc, &realm).map_err(JSError::from)
        });
        self.arena.collect_debt();
        result
    }

    /// Idle loop: drain the task queue one job per turn, including jobs queued
    /// by the jobs themselves. Returns the number of jobs run. The first error
    /// stops the loop and leaves later jobs queued.
    pub fn run_event_loop(&mut self) -> Result<usize, JSError> {
        log::trace!("run_event_loop called");
        let mut executed = 0;
        loop {
            match self.poll_event_loop() {
                Ok(PollResult::Executed) => executed += 1,
                Ok(PollResult::Empty) => break,
                Err(e) => {
                    log::error!("run_event_loop: uncaught error after {executed} job(s): {e}");
                    return Err(e);
                }
            }
        }
        log::debug!("run_event_loop: executed {executed} job(s)");
        Ok(executed)
    }

    pub fn pending_jobs(&self) -> usize {
        self.arena.mutate(|_mc, root| root.task_queue.borrow().len())
    }

    /// Drop every queued job without running it.
    pub fn clear_pending_jobs(&self) {
        self.arena.mutate(|mc, root| root.task_queue.borrow_mut(mc).clear());
    }

    pub fn collect_garbage(&mut self) {
        self.arena.collect_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_capacity_is_rejected() {
        let err = Runtime::with_config(RuntimeConfig::default().with_task_queue_capacity(0)).err();
        assert!(matches!(err, Some(JSError::RuntimeError { .. })));
    }

    #[test]
    fn huge_capacity_does_not_reserve_up_front() {
        let mut rt = Runtime::with_config(RuntimeConfig::default().with_task_queue_capacity(usize::MAX)).unwrap();
        assert_eq!(rt.config().task_queue_capacity, usize::MAX);
        assert_eq!(rt.pending_jobs(), 0);
        assert_eq!(rt.run_event_loop().unwrap(), 0);
    }

    #[test]
    fn globals_are_installed() {
        let rt = Runtime::new().unwrap();
        assert_eq!(rt.config().task_queue_capacity, DEFAULT_TASK_QUEUE_CAPACITY);
        let (promise_ty, global_is_self) = rt
            .mutate(|_mc, realm| {
                let this_global = realm.get_global("globalThis");
                Ok((
                    type_of(&realm.get_global("Promise")),
                    this_global.strict_equals(&Value::Object(realm.global)),
                ))
            })
            .unwrap();
        assert_eq!(promise_ty, "function");
        assert!(global_is_self);
    }

    #[test]
    fn globals_survive_collection() {
        let mut rt = Runtime::new().unwrap();
        rt.mutate(|mc, realm| {
            realm.set_global(mc, "answer", Value::Number(42.0));
            Ok(())
        })
        .unwrap();
        rt.collect_garbage();
        let answer = rt.mutate(|_mc, realm| Ok(realm.get_global("answer").to_string())).unwrap();
        assert_eq!(answer, "42");
        assert_eq!(rt.run_event_loop().unwrap(), 0);
    }
}
