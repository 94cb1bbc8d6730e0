//! Deferred task queue.
//!
//! Native code never runs a settlement handler inline. Instead it hands a
//! [`Job`] (target, callable, arguments) to whatever [`JobQueue`] the realm
//! was created with, and the runtime's idle loop drains it later, one job per
//! turn, in FIFO order.

use crate::core::{Collect, EvalError, GcPtr, GcTrace, MutationContext, Realm, Value, value_to_string};
use crate::error::JSError;
use crate::js_function::call_function_with_this;
use std::collections::VecDeque;

/// One deferred invocation: `callable` is called with `target` as receiver.
#[derive(Clone, Collect)]
#[collect(no_drop)]
pub struct Job<'gc> {
    pub target: Value<'gc>,
    pub callable: Value<'gc>,
    pub args: Vec<Value<'gc>>,
}

impl<'gc> Job<'gc> {
    pub fn new(target: Value<'gc>, callable: Value<'gc>, args: Vec<Value<'gc>>) -> Self {
        Self { target, callable, args }
    }
}

impl std::fmt::Debug for Job<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("target", &self.target)
            .field("callable", &value_to_string(&self.callable))
            .field("args", &self.args)
            .finish()
    }
}

/// Capability used by native code to defer work to the host's event loop.
///
/// Hosts and test harnesses may supply their own implementation; the runtime
/// only relies on FIFO order between jobs of the same queue.
pub trait JobQueue<'gc> {
    fn enqueue(&self, mc: &MutationContext<'gc>, job: Job<'gc>) -> Result<(), JSError>;

    fn dequeue(&self, mc: &MutationContext<'gc>) -> Option<Job<'gc>>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Fixed-capacity FIFO, the default queue owned by a `Runtime`.
pub struct TaskQueue<'gc> {
    jobs: VecDeque<Job<'gc>>,
    capacity: usize,
    /// Total number of jobs ever accepted, for log correlation.
    accepted: usize,
}

unsafe impl<'gc> Collect<'gc> for TaskQueue<'gc> {
    fn trace<T: GcTrace<'gc>>(&self, cc: &mut T) {
        for job in &self.jobs {
            job.trace(cc);
        }
    }
}

impl<'gc> TaskQueue<'gc> {
    /// `capacity` bounds `push`; storage grows on demand.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            jobs: VecDeque::new(),
            capacity,
            accepted: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn push(&mut self, job: Job<'gc>) -> Result<(), JSError> {
        if self.jobs.len() >= self.capacity {
            log::warn!("task queue full ({} jobs); dropping {:?}", self.capacity, job);
            return Err(JSError::TaskQueueFull { capacity: self.capacity });
        }
        self.accepted += 1;
        self.jobs.push_back(job);
        log::trace!("TaskQueue::push: job #{} queued, queue_len={}", self.accepted, self.jobs.len());
        Ok(())
    }

    pub fn pop(&mut self) -> Option<Job<'gc>> {
        self.jobs.pop_front()
    }

    pub fn clear(&mut self) {
        self.jobs.clear();
    }
}

impl<'gc> JobQueue<'gc> for GcPtr<'gc, TaskQueue<'gc>> {
    fn enqueue(&self, mc: &MutationContext<'gc>, job: Job<'gc>) -> Result<(), JSError> {
        self.borrow_mut(mc).push(job)
    }

    fn dequeue(&self, mc: &MutationContext<'gc>) -> Option<Job<'gc>> {
        self.borrow_mut(mc).pop()
    }

    fn len(&self) -> usize {
        self.borrow().len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollResult {
    /// One job ran.
    Executed,
    /// Nothing was queued.
    Empty,
}

/// Run at most one queued job.
///
/// An error raised by the job's callable propagates to the caller; jobs
/// queued behind it stay queued.
pub fn poll_event_loop<'gc>(mc: &MutationContext<'gc>, realm: &Realm<'_, 'gc>) -> Result<PollResult, EvalError<'gc>> {
    let Some(job) = realm.jobs.dequeue(mc) else {
        return Ok(PollResult::Empty);
    };
    log::trace!("poll_event_loop: running {:?} ; remaining={}", job, realm.jobs.len());
    call_function_with_this(mc, realm, &job.callable, &job.target, &job.args)?;
    Ok(PollResult::Executed)
}

/// Drain the queue within the current mutation, including jobs queued by the
/// jobs themselves. Returns the number of jobs run.
pub fn run_jobs<'gc>(mc: &MutationContext<'gc>, realm: &Realm<'_, 'gc>) -> Result<usize, EvalError<'gc>> {
    let mut executed = 0;
    while poll_event_loop(mc, realm)? == PollResult::Executed {
        executed += 1;
    }
    Ok(executed)
}
