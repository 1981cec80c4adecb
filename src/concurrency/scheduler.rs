use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle, Scope, ScopedJoinHandle};

use tracing::trace;

use crate::error::{ForestError, Result};

/// Marks its task finished when dropped, including on unwind.
struct FinishGuard(Arc<AtomicBool>);

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

#[derive(Debug, Default)]
struct Registry {
    tasks: Vec<Arc<AtomicBool>>,
    peak: usize,
    started: u64,
}

/// Thread pool that admits a task only while fewer than `max_threads` are running.
///
/// Active tasks are counted by scanning the registered finish flags. A single lock guards
/// admission and accounting.
#[derive(Debug)]
pub struct ThreadScheduler {
    name: String,
    max_threads: usize,
    registry: Mutex<Registry>,
}

impl ThreadScheduler {
    pub fn new(name: impl Into<String>, max_threads: usize) -> Self {
        Self {
            name: name.into(),
            max_threads,
            registry: Mutex::new(Registry::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_threads(&self) -> usize {
        self.max_threads
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn count_active(&self, registry: &mut Registry) -> Result<usize> {
        registry
            .tasks
            .retain(|finished| !finished.load(Ordering::Acquire));
        let active = registry.tasks.len();
        if active > self.max_threads {
            return Err(ForestError::SchedulerOverflow {
                active,
                max: self.max_threads,
            });
        }
        Ok(active)
    }

    /// Number of registered tasks that have not finished.
    pub fn active(&self) -> Result<usize> {
        let mut registry = self.registry();
        self.count_active(&mut registry)
    }

    pub fn available(&self) -> Result<usize> {
        Ok(self.max_threads.saturating_sub(self.active()?))
    }

    /// Highest number of simultaneously active tasks seen so far.
    pub fn peak_usage(&self) -> usize {
        self.registry().peak
    }

    /// Total number of tasks ever admitted.
    pub fn started(&self) -> u64 {
        self.registry().started
    }

    fn admit(&self) -> Result<(FinishGuard, String)> {
        let mut registry = self.registry();
        let active = self.count_active(&mut registry)?;
        if active >= self.max_threads {
            return Err(ForestError::SchedulerExhausted {
                max: self.max_threads,
            });
        }
        let finished = Arc::new(AtomicBool::new(false));
        registry.tasks.push(finished.clone());
        registry.peak = registry.peak.max(active + 1);
        registry.started += 1;
        let thread_name = format!("{}-{}", self.name, registry.started);
        trace!(scheduler = %self.name, active = active + 1, "Admitted task");
        Ok((FinishGuard(finished), thread_name))
    }

    /// Starts a detached task, or fails with `SchedulerExhausted` when no slot is free.
    pub fn start<F, T>(&self, task: F) -> Result<TaskHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (guard, thread_name) = self.admit()?;
        let handle = thread::Builder::new()
            .name(thread_name)
            .spawn(move || {
                let _guard = guard;
                task()
            })?;
        Ok(TaskHandle { handle })
    }

    /// Starts a task inside `scope`, so it may borrow from the enclosing stack frame.
    pub fn start_scoped<'scope, 'env, F, T>(
        &self,
        scope: &'scope Scope<'scope, 'env>,
        task: F,
    ) -> Result<ScopedTaskHandle<'scope, T>>
    where
        F: FnOnce() -> T + Send + 'scope,
        T: Send + 'scope,
    {
        let (guard, thread_name) = self.admit()?;
        let handle = thread::Builder::new()
            .name(thread_name)
            .spawn_scoped(scope, move || {
                let _guard = guard;
                task()
            })?;
        Ok(ScopedTaskHandle { handle })
    }
}

/// Handle of a task started with [`ThreadScheduler::start`].
#[derive(Debug)]
pub struct TaskHandle<T> {
    handle: JoinHandle<T>,
}

impl<T> TaskHandle<T> {
    /// Waits for the task; a panic inside the task is resumed in the caller.
    pub fn join(self) -> T {
        match self.handle.join() {
            Ok(value) => value,
            Err(payload) => std::panic::resume_unwind(payload),
        }
    }
}

/// Handle of a task started with [`ThreadScheduler::start_scoped`].
#[derive(Debug)]
pub struct ScopedTaskHandle<'scope, T> {
    handle: ScopedJoinHandle<'scope, T>,
}

impl<T> ScopedTaskHandle<'_, T> {
    pub fn join(self) -> T {
        match self.handle.join() {
            Ok(value) => value,
            Err(payload) => std::panic::resume_unwind(payload),
        }
    }
}
