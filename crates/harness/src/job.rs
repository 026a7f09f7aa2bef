//! Due-time jobs and the per-runner priority queue.

use std::sync::{
    Arc,
    Weak,
};

use parking_lot::Mutex;
use sim_time::{
    Duration,
    TimePoint,
};

/// Jobs a single runner may have in flight at once.
pub const JOB_QUEUE_CAPACITY: usize = 100;

/// Fired when a job's due time is reached (or it is removed while due).
pub trait JobListener: Send + Sync {
    fn fire(&self);
}

#[derive(Clone, Copy)]
struct JobState {
    armed: bool,
    due: TimePoint,
    heap_index: usize,
    seq: u64,
}

/// One due-time entry. Lives in at most one runner's heap while armed;
/// arming an armed job or executing a disarmed one is a harness bug.
pub struct Job {
    state: Mutex<JobState>,
    listener: Mutex<Option<Weak<dyn JobListener>>>,
}

impl Job {
    pub fn new() -> Arc<Job> {
        Arc::new(Job {
            state: Mutex::new(JobState {
                armed: false,
                due: TimePoint::END_OF_EPOCH,
                heap_index: usize::MAX,
                seq: 0,
            }),
            listener: Mutex::new(None),
        })
    }

    pub fn is_armed(&self) -> bool {
        self.state.lock().armed
    }

    pub fn due(&self) -> TimePoint {
        self.state.lock().due
    }

    pub fn is_due(&self, now: TimePoint) -> bool {
        self.state.lock().due <= now
    }

    pub fn time_until_due(&self, now: TimePoint) -> Duration {
        self.state.lock().due - now
    }

    /// Arm the job for `due` with the given listener.
    pub fn set_due(&self, due: TimePoint, listener: &Arc<dyn JobListener>) {
        let mut state = self.state.lock();
        assert!(!state.armed, "job is already armed");
        *self.listener.lock() = Some(Arc::downgrade(listener));
        state.due = due;
        state.armed = true;
    }

    /// Re-arm, shifting the previous due time by `delta`. Used by the
    /// stopwatch when resuming after a stop.
    pub fn shift_due(&self, delta: Duration) {
        let mut state = self.state.lock();
        assert!(!state.armed, "job is already armed");
        state.due = state.due + delta;
        state.armed = true;
    }

    /// Disarm without firing.
    pub fn disarm(&self) {
        let mut state = self.state.lock();
        assert!(state.armed, "job is not armed");
        state.armed = false;
    }

    /// Disarm and fire the listener.
    pub fn execute(&self) {
        self.disarm();
        let listener = self.listener.lock().clone();
        match listener.and_then(|weak| weak.upgrade()) {
            Some(listener) => listener.fire(),
            None => tracing::warn!("due job fired after its listener went away"),
        }
    }
}

/// Index-tracked binary min-heap of jobs, ordered by due time with insertion
/// order breaking ties.
pub struct JobHeap {
    entries: Vec<Arc<Job>>,
    next_seq: u64,
}

impl JobHeap {
    pub fn new() -> Self {
        JobHeap {
            entries: Vec::new(),
            next_seq: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn peek(&self) -> Option<Arc<Job>> {
        self.entries.first().cloned()
    }

    pub fn push(&mut self, job: Arc<Job>) {
        assert!(
            self.entries.len() < JOB_QUEUE_CAPACITY,
            "job queue overflow"
        );
        {
            let mut state = job.state.lock();
            assert!(state.armed, "only armed jobs can be queued");
            state.seq = self.next_seq;
            self.next_seq += 1;
        }
        self.entries.push(job);
        self.sift_up(self.entries.len() - 1);
    }

    pub fn pop(&mut self) -> Option<Arc<Job>> {
        if self.entries.is_empty() {
            return None;
        }
        Some(self.remove_at(0))
    }

    /// Remove a specific job via its stored heap index.
    pub fn remove(&mut self, job: &Arc<Job>) {
        let index = job.state.lock().heap_index;
        assert!(
            index < self.entries.len() && Arc::ptr_eq(&self.entries[index], job),
            "job is not in this heap"
        );
        self.remove_at(index);
    }

    fn remove_at(&mut self, index: usize) -> Arc<Job> {
        let last = self.entries.len() - 1;
        self.entries.swap(index, last);
        let removed = self.entries.pop().expect("heap is empty");
        removed.state.lock().heap_index = usize::MAX;
        if index < self.entries.len() {
            self.set_index(index);
            self.sift_down(index);
            self.sift_up(index);
        }
        removed
    }

    fn key(&self, index: usize) -> (TimePoint, u64) {
        let state = self.entries[index].state.lock();
        (state.due, state.seq)
    }

    fn set_index(&self, index: usize) {
        self.entries[index].state.lock().heap_index = index;
    }

    fn sift_up(&mut self, mut index: usize) {
        while index > 0 {
            let parent = (index - 1) / 2;
            if self.key(index) < self.key(parent) {
                self.entries.swap(index, parent);
                self.set_index(index);
                index = parent;
            } else {
                break;
            }
        }
        self.set_index(index);
    }

    fn sift_down(&mut self, mut index: usize) {
        loop {
            let mut smallest = index;
            for child in [2 * index + 1, 2 * index + 2] {
                if child < self.entries.len() && self.key(child) < self.key(smallest) {
                    smallest = child;
                }
            }
            if smallest == index {
                break;
            }
            self.entries.swap(index, smallest);
            self.set_index(index);
            index = smallest;
        }
        self.set_index(index);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{
            AtomicUsize,
            Ordering,
        },
        Arc,
    };

    use proptest::prelude::*;
    use sim_time::TimePoint;

    use super::{
        Job,
        JobHeap,
        JobListener,
    };

    struct CountingListener {
        fired: AtomicUsize,
    }

    impl JobListener for CountingListener {
        fn fire(&self) {
            self.fired.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn listener() -> Arc<dyn JobListener> {
        Arc::new(CountingListener {
            fired: AtomicUsize::new(0),
        })
    }

    #[test]
    fn test_pop_in_due_order() {
        let listener = listener();
        let mut heap = JobHeap::new();
        for due in [30u64, 10, 20] {
            let job = Job::new();
            job.set_due(TimePoint::from_nanos(due), &listener);
            heap.push(job);
        }
        let mut order = Vec::new();
        while let Some(job) = heap.pop() {
            order.push(job.due().as_nanos());
        }
        assert_eq!(order, vec![10, 20, 30]);
    }

    #[test]
    fn test_equal_due_times_pop_in_insertion_order() {
        let listener = listener();
        let mut heap = JobHeap::new();
        let jobs: Vec<_> = (0..5)
            .map(|_| {
                let job = Job::new();
                job.set_due(TimePoint::from_nanos(42), &listener);
                heap.push(job.clone());
                job
            })
            .collect();
        for expected in &jobs {
            let popped = heap.pop().unwrap();
            assert!(Arc::ptr_eq(&popped, expected));
        }
    }

    #[test]
    fn test_remove_from_middle() {
        let listener = listener();
        let mut heap = JobHeap::new();
        let jobs: Vec<_> = [50u64, 10, 40, 20, 30]
            .iter()
            .map(|&due| {
                let job = Job::new();
                job.set_due(TimePoint::from_nanos(due), &listener);
                heap.push(job.clone());
                job
            })
            .collect();
        heap.remove(&jobs[2]);
        let mut order = Vec::new();
        while let Some(job) = heap.pop() {
            order.push(job.due().as_nanos());
        }
        assert_eq!(order, vec![10, 20, 30, 50]);
    }

    #[test]
    #[should_panic(expected = "already armed")]
    fn test_double_arm_panics() {
        let listener = listener();
        let job = Job::new();
        job.set_due(TimePoint::from_nanos(1), &listener);
        job.set_due(TimePoint::from_nanos(2), &listener);
    }

    #[test]
    fn test_execute_fires_listener_once() {
        let counting = Arc::new(CountingListener {
            fired: AtomicUsize::new(0),
        });
        let as_listener: Arc<dyn JobListener> = counting.clone();
        let job = Job::new();
        job.set_due(TimePoint::from_nanos(1), &as_listener);
        job.execute();
        assert_eq!(counting.fired.load(Ordering::SeqCst), 1);
        assert!(!job.is_armed());
    }

    proptest! {
        #[test]
        fn proptest_heap_pops_sorted(dues in proptest::collection::vec(0u64..1000, 1..50)) {
            let listener = listener();
            let mut heap = JobHeap::new();
            for due in &dues {
                let job = Job::new();
                job.set_due(TimePoint::from_nanos(*due), &listener);
                heap.push(job);
            }
            let mut popped = Vec::new();
            while let Some(job) = heap.pop() {
                popped.push(job.due().as_nanos());
            }
            let mut sorted = dues.clone();
            sorted.sort_unstable();
            prop_assert_eq!(popped, sorted);
        }
    }
}
