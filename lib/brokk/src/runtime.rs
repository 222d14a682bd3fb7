use crate::api::{Group, JobState, MapReduce, MAX_PERCENTAGE};
use crate::barrier::{Barrier, StartGate};
use crate::cell::PhaseCell;
use crate::progress::{Progress, Stage};
use crate::shuffle::shuffle;
use anyhow::{ensure, Context, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info};

/// Everything one job owns: the client, both ends of the data, the progress
/// word, and the coordination state shared by the worker pool. Lives behind
/// an `Arc` held by the handle and by every worker; freed when the last of
/// them lets go.
pub(crate) struct JobCore<C: MapReduce> {
    pub(crate) client: C,
    pub(crate) input: Vec<(C::InputKey, C::InputValue)>,
    pub(crate) progress: Progress,
    pub(crate) barrier: Barrier,
    pub(crate) gate: StartGate,

    /// One buffer per worker. Owned by that worker through map and sort,
    /// drained by the leader during shuffle, untouched afterwards.
    pub(crate) buffers: Vec<PhaseCell<Group<C::Key, C::Value>>>,

    /// Key-equal groups built by the leader's shuffle pass. Written only
    /// between the two barriers, read only after the second one.
    pub(crate) groups: PhaseCell<Vec<PhaseCell<Group<C::Key, C::Value>>>>,

    /// Number of published groups. Finalized before the second barrier; the
    /// barrier, not the atomic, is what makes the group contents visible.
    pub(crate) group_count: AtomicUsize,

    pub(crate) next_input: AtomicUsize,
    pub(crate) next_reduce: AtomicUsize,

    pub(crate) output: Mutex<Vec<(C::OutputKey, C::OutputValue)>>,

    /// Join slots, one per worker; `None` once joined. Guarded by its own
    /// mutex so `wait` is idempotent and safe from several threads at once.
    handles: Mutex<Vec<Option<JoinHandle<()>>>>,
}

/// Monitoring handle for a job started with [`start_job`]. The job runs on
/// its own threads; the handle observes, joins, and finally collects the
/// output. An empty-input job has no threads behind its handle and reports
/// itself finished from the start.
pub struct JobHandle<C: MapReduce> {
    core: Option<Arc<JobCore<C>>>,
}

/// Spawns `workers` threads running `client` over `input` and returns a
/// handle to the job.
///
/// Fails if `workers` is zero or a worker thread cannot be spawned; on a
/// failed spawn the already-running workers are released to exit and joined
/// before the error is returned, so no partial pool is left behind.
pub fn start_job<C: MapReduce>(
    client: C,
    input: Vec<(C::InputKey, C::InputValue)>,
    workers: usize,
) -> Result<JobHandle<C>> {
    ensure!(workers >= 1, "a job needs at least one worker thread");

    if input.is_empty() {
        debug!("empty input, job is complete on arrival");
        return Ok(JobHandle { core: None });
    }

    let total = input.len();
    let core = Arc::new(JobCore {
        client,
        input,
        progress: Progress::new(total as u32),
        barrier: Barrier::new(workers),
        gate: StartGate::new(),
        buffers: (0..workers).map(|_| PhaseCell::new(Vec::new())).collect(),
        groups: PhaseCell::new(Vec::new()),
        group_count: AtomicUsize::new(0),
        next_input: AtomicUsize::new(0),
        next_reduce: AtomicUsize::new(0),
        output: Mutex::new(Vec::new()),
        handles: Mutex::new(Vec::with_capacity(workers)),
    });

    info!(workers, inputs = total, "starting map-reduce job");

    for index in 0..workers {
        let spawned = thread::Builder::new()
            .name(format!("mapreduce-worker-{index}"))
            .spawn({
                let core = Arc::clone(&core);
                move || {
                    if core.gate.wait() {
                        worker_loop(&core, index);
                    }
                }
            });
        match spawned {
            Ok(handle) => core.handles.lock().unwrap().push(Some(handle)),
            Err(err) => {
                core.gate.abort();
                join_all(&core);
                return Err(err).context("failed to spawn worker thread");
            }
        }
    }
    core.gate.open();

    Ok(JobHandle { core: Some(core) })
}

impl<C: MapReduce> JobHandle<C> {
    /// Current stage and completion percentage, decoded from one atomic
    /// snapshot. Callable from any thread at any time; never blocks.
    pub fn state(&self) -> JobState {
        let Some(core) = &self.core else {
            return JobState {
                stage: Stage::Reduce,
                percentage: MAX_PERCENTAGE,
            };
        };
        let (stage, processed, total) = core.progress.snapshot();
        let percentage = if total == 0 {
            MAX_PERCENTAGE
        } else {
            (processed as f32 / total as f32 * MAX_PERCENTAGE).min(MAX_PERCENTAGE)
        };
        JobState { stage, percentage }
    }

    /// Blocks until every worker thread has finished. Each worker is joined
    /// exactly once; calling this again, or from several threads at once, is
    /// fine, and nobody returns before the last join has happened.
    pub fn wait(&self) {
        if let Some(core) = &self.core {
            join_all(core);
        }
    }

    /// Waits for the job and hands back everything the reducers emitted.
    pub fn close(mut self) -> Vec<(C::OutputKey, C::OutputValue)> {
        let Some(core) = self.core.take() else {
            return Vec::new();
        };
        join_all(&core);
        match Arc::try_unwrap(core) {
            Ok(core) => core.output.into_inner().unwrap(),
            Err(core) => std::mem::take(&mut *core.output.lock().unwrap()),
        }
    }
}

impl<C: MapReduce> Drop for JobHandle<C> {
    /// Dropping the handle waits for the job, so worker threads never
    /// outlive the last way to observe them.
    fn drop(&mut self) {
        if let Some(core) = self.core.take() {
            join_all(&core);
        }
    }
}

/// Joins every worker exactly once. The lock is taken per slot and the join
/// happens under it, so a concurrent caller skips slots that are already
/// joined but cannot overtake one that is still being joined.
fn join_all<C: MapReduce>(core: &JobCore<C>) {
    for index in 0..core.buffers.len() {
        let mut handles = core.handles.lock().unwrap();
        if index >= handles.len() {
            break;
        }
        if let Some(handle) = handles[index].take() {
            if handle.join().is_err() {
                error!(worker = index, "worker thread panicked");
            }
        }
    }
}

/// The body every worker runs. Workers are symmetric except for index 0,
/// the leader, which performs the stage transitions and the shuffle pass.
fn worker_loop<C: MapReduce>(core: &JobCore<C>, index: usize) {
    // Only the leader re-encodes the stage, so racing writers cannot zero
    // the processed count twice and briefly under-report progress.
    if index == 0 {
        core.progress.set_stage(Stage::Map);
    }

    {
        // Map and sort. This worker's buffer is exclusively ours until the
        // barrier below hands it to the leader.
        let buffer = unsafe { &mut *core.buffers[index].get() };

        loop {
            let at = core.next_input.fetch_add(1, Ordering::Relaxed);
            if at >= core.input.len() {
                break;
            }
            let (key, value) = &core.input[at];
            core.client.do_map(key, value, &mut |k, v| buffer.push((k, v)));
            core.progress.add_processed();
        }

        // Ascending by key, so the buffer's largest key sits at its back
        // when the shuffle pass scans it.
        buffer.sort_unstable_by(|a, b| a.0.cmp(&b.0));
    }

    core.barrier.wait();

    if index == 0 {
        shuffle(core);
        let groups = core.group_count.load(Ordering::Relaxed);
        core.progress.set_all(Stage::Reduce, 0, groups as u32);
        debug!(groups, "entering reduce");
    }

    core.barrier.wait();

    // Reduce. Group indices are handed out the way input indices were; the
    // group list is frozen, so a plain shared view is enough.
    let groups = unsafe { &*core.groups.get() };
    loop {
        let at = core.next_reduce.fetch_add(1, Ordering::Relaxed);
        if at >= core.group_count.load(Ordering::Relaxed) {
            break;
        }
        // The cursor hands each index to exactly one worker, which takes
        // the group out of its slot and owns it from here on.
        let group = unsafe { std::mem::take(&mut *groups[at].get()) };
        core.client.do_reduce(group, &mut |k, v| {
            core.output.lock().unwrap().push((k, v));
        });
        core.progress.add_processed();
    }
}
