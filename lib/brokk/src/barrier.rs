use std::sync::{Condvar, Mutex};

/// Reusable rendez-vous point for a fixed set of worker threads.
///
/// A generation counter distinguishes successive uses of the same barrier:
/// waiters only leave once the generation they arrived in has ended, so a
/// thread that races ahead into the next use cannot strand a slow waiter
/// from the previous one, and spurious wakeups fall through the predicate.
pub struct Barrier {
    shared: Mutex<Shared>,
    cv: Condvar,
    parties: usize,
}

struct Shared {
    arrived: usize,
    generation: u64,
}

impl Barrier {
    pub fn new(parties: usize) -> Self {
        Self {
            shared: Mutex::new(Shared {
                arrived: 0,
                generation: 0,
            }),
            cv: Condvar::new(),
            parties,
        }
    }

    /// Blocks until `parties` threads have arrived in the current
    /// generation, then releases them all and resets for the next use.
    pub fn wait(&self) {
        let mut shared = self.shared.lock().unwrap();
        let generation = shared.generation;
        shared.arrived += 1;
        if shared.arrived < self.parties {
            while shared.generation == generation {
                shared = self.cv.wait(shared).unwrap();
            }
        } else {
            shared.arrived = 0;
            shared.generation = shared.generation.wrapping_add(1);
            self.cv.notify_all();
        }
    }
}

/// One-shot gate between the thread spawning a job and its workers.
///
/// Workers wait on the gate before doing anything; the spawner opens it once
/// every worker thread exists, or aborts it when a spawn fails. Without the
/// gate, a partially spawned pool would wait forever at the first barrier.
pub struct StartGate {
    decision: Mutex<Option<bool>>,
    cv: Condvar,
}

impl StartGate {
    pub fn new() -> Self {
        Self {
            decision: Mutex::new(None),
            cv: Condvar::new(),
        }
    }

    /// Releases the workers into the job.
    pub fn open(&self) {
        self.resolve(true);
    }

    /// Releases the workers straight to exit.
    pub fn abort(&self) {
        self.resolve(false);
    }

    fn resolve(&self, run: bool) {
        let mut decision = self.decision.lock().unwrap();
        *decision = Some(run);
        self.cv.notify_all();
    }

    /// Blocks until the spawner has decided; returns whether the job runs.
    pub fn wait(&self) -> bool {
        let mut decision = self.decision.lock().unwrap();
        loop {
            match *decision {
                Some(run) => return run,
                None => decision = self.cv.wait(decision).unwrap(),
            }
        }
    }
}

impl Default for StartGate {
    fn default() -> Self {
        Self::new()
    }
}
