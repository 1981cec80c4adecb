use std::collections::VecDeque;
use std::ops::Range;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info};

use super::scheduler::{ScopedTaskHandle, ThreadScheduler};
use crate::error::{ForestError, Result};

/// Completion fraction of one worker, in `[0, 1]`, readable from any thread.
#[derive(Debug, Default)]
pub struct Progress(AtomicU32);

impl Progress {
    pub fn set(&self, fraction: f32) {
        self.0
            .store(fraction.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    /// Sets progress to `done / total` of the worker's range.
    pub fn set_done(&self, done: usize, total: usize) {
        if total > 0 {
            self.set(done as f32 / total as f32);
        }
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }
}

type Job<'a, T> = Box<dyn FnOnce(Range<usize>, &Progress) -> Result<T> + Send + 'a>;

/// A unit of parallel work bound to an index range.
pub struct Worker<'a, T> {
    range: Range<usize>,
    progress: Arc<Progress>,
    job: Job<'a, T>,
}

impl<'a, T> Worker<'a, T> {
    pub fn new<F>(range: Range<usize>, job: F) -> Self
    where
        F: FnOnce(Range<usize>, &Progress) -> Result<T> + Send + 'a,
    {
        Self {
            range,
            progress: Arc::new(Progress::default()),
            job: Box::new(job),
        }
    }

    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    pub fn progress(&self) -> f32 {
        self.progress.get()
    }

    fn run(self) -> Result<T> {
        let output = (self.job)(self.range, &self.progress)?;
        self.progress.set(1.0);
        Ok(output)
    }
}

/// Snapshot of a running group, as printed by the coordinator.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupStats {
    pub progress: f32,
    pub active: usize,
    pub peak: usize,
    pub eta_minutes: Option<f64>,
    pub resident_mb: Option<f64>,
}

impl GroupStats {
    fn eta(elapsed: Duration, progress: f32) -> Option<f64> {
        if progress <= 0.0 {
            return None;
        }
        let progress = progress as f64;
        Some(elapsed.as_secs_f64() * (1.0 - progress) / progress / 60.0)
    }
}

/// Resident memory of this process in megabytes, where the platform exposes it.
pub fn resident_memory_mb() -> Option<f64> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let pages: f64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    Some(pages * 4096.0 / (1024.0 * 1024.0))
}

/// Runs a fixed set of workers against one scheduler and waits for all of them.
///
/// A failing worker is fatal: the failure is logged and the process exits.
pub struct WorkerGroup<'a, T> {
    name: String,
    scheduler: ThreadScheduler,
    workers: Vec<Worker<'a, T>>,
    verbose: bool,
}

impl<'a, T: Send + 'a> WorkerGroup<'a, T> {
    pub fn new(name: impl Into<String>, max_threads: usize) -> Self {
        let name = name.into();
        Self {
            scheduler: ThreadScheduler::new(name.clone(), max_threads.max(1)),
            name,
            workers: Vec::new(),
            verbose: true,
        }
    }

    /// Reports progress at `debug` instead of `info`.
    pub fn quiet(mut self) -> Self {
        self.verbose = false;
        self
    }

    pub fn push(&mut self, worker: Worker<'a, T>) {
        self.workers.push(worker);
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    fn stats(&self, progresses: &[Arc<Progress>], started: Instant) -> GroupStats {
        let progress = if progresses.is_empty() {
            1.0
        } else {
            progresses.iter().map(|p| p.get()).sum::<f32>() / progresses.len() as f32
        };
        GroupStats {
            progress,
            active: self.scheduler.active().unwrap_or(self.scheduler.max_threads()),
            peak: self.scheduler.peak_usage(),
            eta_minutes: GroupStats::eta(started.elapsed(), progress),
            resident_mb: resident_memory_mb(),
        }
    }

    fn report(&self, stats: &GroupStats) {
        let eta = stats
            .eta_minutes
            .map_or_else(|| "n/a".to_string(), |eta| format!("{eta:.1}"));
        let heap = stats
            .resident_mb
            .map_or_else(|| "n/a".to_string(), |mb| format!("{mb:.0}"));
        if self.verbose {
            info!(
                group = %self.name,
                progress = %format!("{:.1}%", stats.progress * 100.0),
                active = stats.active,
                peak = stats.peak,
                eta_min = %eta,
                heap_mb = %heap,
                "Worker group progress"
            );
        } else {
            debug!(
                group = %self.name,
                progress = %format!("{:.1}%", stats.progress * 100.0),
                active = stats.active,
                eta_min = %eta,
                heap_mb = %heap,
                "Worker group progress"
            );
        }
    }

    /// Runs every worker and returns their outputs in worker order.
    ///
    /// Workers are started while the scheduler has free slots; the rest wait for a
    /// running worker to finish. Progress is reported every `poll_interval`.
    pub fn run_group(mut self, poll_interval: Duration) -> Vec<T> {
        match self.try_run_group(poll_interval) {
            Ok(outputs) => outputs,
            Err(failure) => fail_fast(&failure),
        }
    }

    fn try_run_group(&mut self, poll_interval: Duration) -> Result<Vec<T>> {
        let total = self.workers.len();
        let progresses = self
            .workers
            .iter()
            .map(|worker| worker.progress.clone())
            .collect::<Vec<_>>();
        let mut pending = std::mem::take(&mut self.workers)
            .into_iter()
            .enumerate()
            .collect::<VecDeque<_>>();
        let mut outputs = (0..total).map(|_| None).collect::<Vec<Option<T>>>();
        let started = Instant::now();
        let this = &*self;

        thread::scope(|scope| -> Result<()> {
            let (sender, receiver) = mpsc::channel::<(usize, Result<T>)>();
            let mut handles = (0..total).map(|_| None).collect::<Vec<_>>();
            let mut finished = 0;
            let mut last_report = Instant::now();

            loop {
                while this.scheduler.available()? > 0 && !pending.is_empty() {
                    // A free slot may come from a worker whose outcome is already queued;
                    // settle it first so a failure stops admission.
                    while let Ok((index, outcome)) = receiver.try_recv() {
                        settle(&this.name, &mut handles, &mut outputs, index, outcome)?;
                        finished += 1;
                    }
                    let Some((index, worker)) = pending.pop_front() else {
                        break;
                    };
                    let sender = sender.clone();
                    let group = this.name.clone();
                    let handle = this.scheduler.start_scoped(scope, move || {
                        let outcome = panic::catch_unwind(AssertUnwindSafe(|| worker.run()))
                            .unwrap_or_else(|payload| {
                                Err(ForestError::WorkerFailed {
                                    group,
                                    index,
                                    message: panic_message(payload.as_ref()),
                                })
                            });
                        let _ = sender.send((index, outcome));
                    })?;
                    handles[index] = Some(handle);
                }
                if finished == total {
                    break;
                }

                if last_report.elapsed() >= poll_interval {
                    this.report(&this.stats(&progresses, started));
                    last_report = Instant::now();
                }
                let wait = poll_interval.saturating_sub(last_report.elapsed());
                match receiver.recv_timeout(wait) {
                    Ok((index, outcome)) => {
                        settle(&this.name, &mut handles, &mut outputs, index, outcome)?;
                        finished += 1;
                    }
                    Err(mpsc::RecvTimeoutError::Timeout) => {}
                    Err(mpsc::RecvTimeoutError::Disconnected) => break,
                }
            }
            Ok(())
        })?;

        debug!(
            group = %self.name,
            workers = total,
            peak = self.scheduler.peak_usage(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Worker group finished"
        );
        Ok(outputs.into_iter().flatten().collect())
    }
}

/// Stores the outcome of a worker that reported back. Joining its thread first releases
/// the scheduler slot before the next admission check.
fn settle<T>(
    group: &str,
    handles: &mut [Option<ScopedTaskHandle<'_, ()>>],
    outputs: &mut [Option<T>],
    index: usize,
    outcome: Result<T>,
) -> Result<()> {
    if let Some(handle) = handles[index].take() {
        handle.join();
    }
    let output = outcome.map_err(|error| match error {
        ForestError::WorkerFailed { .. } => error,
        other => ForestError::WorkerFailed {
            group: group.to_string(),
            index,
            message: other.to_string(),
        },
    })?;
    outputs[index] = Some(output);
    Ok(())
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic".to_string()
    }
}

/// Logs a failure that no caller can recover from and terminates the process.
pub fn fail_fast(failure: &ForestError) -> ! {
    error!(error = %failure, "Fatal worker failure, terminating");
    std::process::exit(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::grid::partition_range;
    use std::io::{self, Write};
    use std::process::Command;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    const FAILING_GROUP_MODE: &str = "RUSTY_FOREST_FAILING_GROUP_MODE";

    /// Log sink shared with a `tracing` subscriber.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// One failing worker followed by workers that must never be started.
    fn run_failing_group(mode: &str) {
        let panics = mode == "panic";
        let mut group = WorkerGroup::new("failing", 1);
        group.push(Worker::new(0..1, move |_, _| {
            if panics {
                panic!("worker broke");
            }
            Err(ForestError::InvalidParameter("worker broke".into()))
        }));
        for i in 1..4 {
            group.push(Worker::new(i..i + 1, move |_, _| {
                println!("waiting worker {i} started");
                Ok(())
            }));
        }
        group.run_group(Duration::from_millis(5));
    }

    #[test]
    fn test_progress_is_clamped() {
        let progress = Progress::default();
        progress.set(1.5);
        assert_eq!(progress.get(), 1.0);
        progress.set_done(1, 4);
        assert_eq!(progress.get(), 0.25);
        progress.set_done(3, 0);
        assert_eq!(progress.get(), 0.25);
    }

    #[test]
    fn test_eta() {
        assert_eq!(GroupStats::eta(Duration::from_secs(60), 0.0), None);
        let eta = GroupStats::eta(Duration::from_secs(60), 0.5).unwrap();
        assert!((eta - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_run_group_returns_outputs_in_order() {
        let mut group = WorkerGroup::new("sum", 2);
        for range in partition_range(100, 7) {
            group.push(Worker::new(range, |range, progress| {
                let total = range.len();
                let mut sum = 0;
                for (done, i) in range.enumerate() {
                    sum += i;
                    progress.set_done(done + 1, total);
                }
                Ok(sum)
            }));
        }
        let sums = group.run_group(Duration::from_millis(5));
        assert_eq!(sums.len(), 7);
        assert_eq!(sums.iter().sum::<usize>(), (0..100).sum::<usize>());
        assert_eq!(sums[0], (0..15).sum::<usize>());
    }

    #[test]
    fn test_run_group_respects_cap() {
        let running = AtomicUsize::new(0);
        let most = AtomicUsize::new(0);
        let mut group = WorkerGroup::new("capped", 3);
        for i in 0..12 {
            let running = &running;
            let most = &most;
            group.push(Worker::new(i..i + 1, move |_, _| {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                most.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(2));
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }));
        }
        group.run_group(Duration::from_millis(1));
        assert!(most.load(Ordering::SeqCst) <= 3);
    }

    #[test]
    fn test_workers_write_disjoint_slices() {
        let mut buffer = vec![0usize; 10];
        let mut group = WorkerGroup::new("slices", 4).quiet();
        let mut start = 0;
        for chunk in buffer.chunks_mut(3) {
            let first = start;
            start += chunk.len();
            group.push(Worker::new(first..start, move |range, _| {
                for (slot, i) in chunk.iter_mut().zip(range) {
                    *slot = i * i;
                }
                Ok(())
            }));
        }
        group.run_group(Duration::from_millis(5));
        assert_eq!(buffer, (0..10).map(|i| i * i).collect::<Vec<_>>());
    }

    #[test]
    fn test_failing_worker_terminates_process() {
        if let Ok(mode) = std::env::var(FAILING_GROUP_MODE) {
            run_failing_group(&mode);
            return;
        }
        for mode in ["error", "panic"] {
            let output = Command::new(std::env::current_exe().unwrap())
                .args([
                    "concurrency::worker::tests::test_failing_worker_terminates_process",
                    "--exact",
                    "--nocapture",
                    "--test-threads=1",
                ])
                .env(FAILING_GROUP_MODE, mode)
                .output()
                .unwrap();
            assert_eq!(output.status.code(), Some(1), "{mode}: {output:?}");
            let stdout = String::from_utf8_lossy(&output.stdout);
            assert!(!stdout.contains("waiting worker"), "{mode}: {stdout}");
        }
    }

    #[test]
    fn test_finished_worker_frees_slot_without_waiting_for_poll() {
        let mut group = WorkerGroup::new("handoff", 1).quiet();
        for i in 0..4 {
            group.push(Worker::new(i..i + 1, |_, _| Ok(())));
        }
        let started = Instant::now();
        assert_eq!(group.run_group(Duration::from_millis(500)).len(), 4);
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn test_progress_reported_while_workers_keep_finishing() {
        let mut group = WorkerGroup::new("steady", 1);
        for i in 0..12 {
            group.push(Worker::new(i..i + 1, |_, _| {
                thread::sleep(Duration::from_millis(10));
                Ok(())
            }));
        }

        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            group.run_group(Duration::from_millis(30));
        });

        let log = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(log.matches("Worker group progress").count() >= 2, "{log}");
    }

    #[test]
    fn test_empty_group() {
        let group: WorkerGroup<'_, ()> = WorkerGroup::new("empty", 1);
        assert!(group.is_empty());
        assert!(group.run_group(Duration::from_millis(1)).is_empty());
    }
}
