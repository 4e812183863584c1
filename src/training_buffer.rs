use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::observation::TrainingObservation;

/// Observations gathered during one rendering iteration.
#[derive(Debug, Clone, Default)]
pub struct TrainingBatch {
    pub iteration: u32,
    pub observations: Vec<TrainingObservation>,
    /// Paths that contributed (including paths that produced no observation).
    pub paths: u64,
    /// Path vertices dropped by extraction as numerically degenerate.
    pub degenerate: u64,
}

/// Collects observations from all rendering workers for the current iteration.
///
/// Workers append through a shared reference; each rayon worker thread gets its own
/// shard so appends rarely contend. Draining takes &mut self, so it can only happen
/// once no worker still holds the buffer.
#[derive(Debug)]
pub struct TrainingBuffer {
    shards: Vec<Mutex<Vec<TrainingObservation>>>,
    iteration: u32,
    len: AtomicUsize,
    paths: AtomicU64,
    degenerate: AtomicU64,
}

impl Default for TrainingBuffer {
    fn default() -> Self {
        TrainingBuffer::new()
    }
}

impl TrainingBuffer {
    /// One shard per thread of the current rayon pool, plus one for outside threads.
    pub fn new() -> TrainingBuffer {
        TrainingBuffer::with_shards(rayon::current_num_threads() + 1)
    }

    pub fn with_shards(num_shards: usize) -> TrainingBuffer {
        TrainingBuffer {
            shards: (0..num_shards.max(1)).map(|_| Mutex::new(Vec::new())).collect(),
            iteration: 0,
            len: AtomicUsize::new(0),
            paths: AtomicU64::new(0),
            degenerate: AtomicU64::new(0),
        }
    }

    fn shard(&self) -> &Mutex<Vec<TrainingObservation>> {
        let index = rayon::current_thread_index().map_or(0, |i| i + 1);
        &self.shards[index % self.shards.len()]
    }

    /// Adds the observations of one finished path.
    pub fn append(&self, observations: &[TrainingObservation]) {
        self.paths.fetch_add(1, Ordering::Relaxed);
        if observations.is_empty() {
            return;
        }
        self.shard().lock().extend_from_slice(observations);
        self.len.fetch_add(observations.len(), Ordering::Relaxed);
    }

    pub fn report_degenerate(&self, count: usize) {
        if count > 0 {
            self.degenerate.fetch_add(count as u64, Ordering::Relaxed);
        }
    }

    /// Preallocates room for roughly `additional` more observations, spread over the shards.
    pub fn reserve(&mut self, additional: usize) {
        let per_shard = additional.div_ceil(self.shards.len());
        for shard in &mut self.shards {
            shard.get_mut().reserve(per_shard);
        }
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn num_paths(&self) -> u64 {
        self.paths.load(Ordering::Relaxed)
    }

    pub fn num_degenerate(&self) -> u64 {
        self.degenerate.load(Ordering::Relaxed)
    }

    /// Index of the iteration currently being collected.
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    /// Takes everything collected so far as the current iteration's batch and
    /// starts collecting the next iteration.
    pub fn drain(&mut self) -> TrainingBatch {
        let mut observations = Vec::with_capacity(*self.len.get_mut());
        for shard in &mut self.shards {
            observations.append(shard.get_mut());
        }
        let batch = TrainingBatch {
            iteration: self.iteration,
            observations,
            paths: std::mem::take(self.paths.get_mut()),
            degenerate: std::mem::take(self.degenerate.get_mut()),
        };
        *self.len.get_mut() = 0;
        self.iteration += 1;
        batch
    }

    /// Discards the current iteration's observations without advancing the iteration.
    pub fn clear(&mut self) {
        for shard in &mut self.shards {
            shard.get_mut().clear();
        }
        *self.len.get_mut() = 0;
        *self.paths.get_mut() = 0;
        *self.degenerate.get_mut() = 0;
    }
}
