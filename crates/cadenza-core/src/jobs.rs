//! Fixed-size worker pool for long-running non-real-time jobs (stem
//! separation, analysis, file decoding).
//!
//! Workers pull from one bounded MPMC queue. Each job carries a
//! [`CancelToken`] it must poll at chunk boundaries, and reports through a
//! completion queue. Results headed for the audio thread are handed over as
//! whole buffers through the command queue, never shared.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::lockfree::{AtomicCounter, AtomicFlag};
use crate::node::AudioData;

pub type JobId = u64;

/// Shared cancellation flag for one job.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicFlag>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn cancel(&self) {
        self.0.set(true);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.get()
    }
}

/// One separated source.
#[derive(Debug, Clone, PartialEq)]
pub struct Stem {
    pub name: String,
    pub audio: AudioData,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Done,
    Audio(AudioData),
    Stems(Vec<Stem>),
    Cancelled,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub id: JobId,
    pub name: String,
    pub outcome: JobOutcome,
}

/// Stem separation service. Implementations may be model-backed or purely
/// DSP; the pool only sees this contract.
pub trait StemSeparator: Send + Sync {
    fn separate(&self, input: &AudioData, cancel: &CancelToken) -> JobOutcome;
}

type Work = Box<dyn FnOnce(&CancelToken) -> JobOutcome + Send + 'static>;

struct Job {
    id: JobId,
    name: String,
    cancel: CancelToken,
    work: Work,
}

/// Handle returned by [`WorkerPool::submit`].
#[derive(Debug, Clone)]
pub struct JobHandle {
    pub id: JobId,
    cancel: CancelToken,
}

impl JobHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

pub struct WorkerPool {
    jobs: Option<Sender<Job>>,
    completions: Receiver<Completion>,
    workers: Vec<JoinHandle<()>>,
    next_id: AtomicCounter,
}

impl WorkerPool {
    /// Spawn `threads` workers sharing a queue of `queue_capacity` jobs.
    pub fn new(threads: usize, queue_capacity: usize) -> Result<Self> {
        if threads == 0 || queue_capacity == 0 {
            return Err(Error::InvalidConfig(
                "worker pool needs at least one thread and one queue slot".to_string(),
            ));
        }
        let (job_tx, job_rx) = bounded::<Job>(queue_capacity);
        let (done_tx, done_rx) = unbounded::<Completion>();

        let mut workers = Vec::with_capacity(threads);
        for index in 0..threads {
            let jobs = job_rx.clone();
            let done = done_tx.clone();
            let handle = thread::Builder::new()
                .name(format!("cadenza-worker-{index}"))
                .spawn(move || worker_loop(jobs, done))
                .map_err(|_| Error::ResourceUnavailable("worker thread"))?;
            workers.push(handle);
        }
        info!(threads, queue_capacity, "worker pool started");

        Ok(Self {
            jobs: Some(job_tx),
            completions: done_rx,
            workers,
            next_id: AtomicCounter::new(0),
        })
    }

    /// Queue a job. Fails with `ResourceUnavailable` when every queue slot
    /// is taken.
    pub fn submit<F>(&self, name: impl Into<String>, work: F) -> Result<JobHandle>
    where
        F: FnOnce(&CancelToken) -> JobOutcome + Send + 'static,
    {
        let jobs = self
            .jobs
            .as_ref()
            .ok_or(Error::ResourceUnavailable("worker pool shut down"))?;
        let id = self.next_id.increment();
        let cancel = CancelToken::new();
        let job = Job {
            id,
            name: name.into(),
            cancel: cancel.clone(),
            work: Box::new(work),
        };
        match jobs.try_send(job) {
            Ok(()) => Ok(JobHandle { id, cancel }),
            Err(TrySendError::Full(job)) => {
                debug!(id, name = %job.name, "worker queue saturated");
                Err(Error::ResourceUnavailable("worker pool saturated"))
            }
            Err(TrySendError::Disconnected(_)) => {
                Err(Error::ResourceUnavailable("worker pool shut down"))
            }
        }
    }

    /// Queue a stem separation of `input`.
    pub fn separate_stems(
        &self,
        separator: Arc<dyn StemSeparator>,
        input: AudioData,
    ) -> Result<JobHandle> {
        self.submit("stem separation", move |cancel| {
            separator.separate(&input, cancel)
        })
    }

    pub fn try_completion(&self) -> Option<Completion> {
        self.completions.try_recv().ok()
    }

    /// Block until the next job finishes or `timeout` elapses.
    pub fn wait_completion(&self, timeout: std::time::Duration) -> Option<Completion> {
        self.completions.recv_timeout(timeout).ok()
    }

    pub fn queued(&self) -> usize {
        self.jobs.as_ref().map_or(0, Sender::len)
    }

    pub fn threads(&self) -> usize {
        self.workers.len()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Closing the queue lets every worker fall out of `recv`.
        self.jobs.take();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("worker thread panicked during shutdown");
            }
        }
        debug!("worker pool stopped");
    }
}

fn worker_loop(jobs: Receiver<Job>, done: Sender<Completion>) {
    while let Ok(job) = jobs.recv() {
        let Job {
            id,
            name,
            cancel,
            work,
        } = job;
        let outcome = if cancel.is_cancelled() {
            JobOutcome::Cancelled
        } else {
            match catch_unwind(AssertUnwindSafe(|| work(&cancel))) {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(id, name = %name, "job panicked");
                    JobOutcome::Failed("job panicked".to_string())
                }
            }
        };
        debug!(id, name = %name, "job finished");
        if done.send(Completion { id, name, outcome }).is_err() {
            break;
        }
    }
}

/// Drive `total` units of work in chunks of `chunk`, stopping early when
/// cancelled. Returns the number of units processed.
pub fn run_chunked(
    total: usize,
    chunk: usize,
    cancel: &CancelToken,
    mut step: impl FnMut(core::ops::Range<usize>),
) -> usize {
    let chunk = chunk.max(1);
    let mut start = 0;
    while start < total {
        if cancel.is_cancelled() {
            break;
        }
        let end = (start + chunk).min(total);
        step(start..end);
        start = end;
    }
    start
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn test_job_completes() {
        let pool = WorkerPool::new(2, 4).unwrap();
        let handle = pool.submit("sum", |_| JobOutcome::Done).unwrap();
        let completion = pool.wait_completion(WAIT).unwrap();
        assert_eq!(completion.id, handle.id);
        assert_eq!(completion.outcome, JobOutcome::Done);
    }

    #[test]
    fn test_saturated_queue_is_resource_unavailable() {
        let pool = WorkerPool::new(1, 1).unwrap();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let (started_tx, started_rx) = mpsc::channel::<()>();

        pool.submit("blocker", move |_| {
            let _ = started_tx.send(());
            let _ = release_rx.recv();
            JobOutcome::Done
        })
        .unwrap();
        started_rx.recv_timeout(WAIT).unwrap();

        pool.submit("queued", |_| JobOutcome::Done).unwrap();
        let err = pool.submit("overflow", |_| JobOutcome::Done).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ResourceUnavailable);

        release_tx.send(()).unwrap();
        assert!(pool.wait_completion(WAIT).is_some());
        assert!(pool.wait_completion(WAIT).is_some());
    }

    #[test]
    fn test_cancel_stops_chunked_work() {
        let pool = WorkerPool::new(1, 2).unwrap();
        let (go_tx, go_rx) = mpsc::channel::<()>();
        let handle = pool
            .submit("long", move |cancel| {
                let _ = go_rx.recv();
                let done = run_chunked(1_000, 10, cancel, |_| {});
                if done < 1_000 {
                    JobOutcome::Cancelled
                } else {
                    JobOutcome::Done
                }
            })
            .unwrap();
        handle.cancel();
        go_tx.send(()).unwrap();
        let completion = pool.wait_completion(WAIT).unwrap();
        assert_eq!(completion.outcome, JobOutcome::Cancelled);
    }

    #[test]
    fn test_panicking_job_reports_failure() {
        let pool = WorkerPool::new(1, 2).unwrap();
        pool.submit("boom", |_| panic!("boom")).unwrap();
        let completion = pool.wait_completion(WAIT).unwrap();
        assert!(matches!(completion.outcome, JobOutcome::Failed(_)));

        // The worker survives.
        pool.submit("after", |_| JobOutcome::Done).unwrap();
        assert_eq!(pool.wait_completion(WAIT).unwrap().outcome, JobOutcome::Done);
    }

    #[test]
    fn test_stem_contract() {
        struct Split;
        impl StemSeparator for Split {
            fn separate(&self, input: &AudioData, _cancel: &CancelToken) -> JobOutcome {
                JobOutcome::Stems(vec![
                    Stem {
                        name: "left".into(),
                        audio: AudioData::new(input.sample_rate, vec![input.channels[0].clone()]),
                    },
                    Stem {
                        name: "right".into(),
                        audio: AudioData::new(input.sample_rate, vec![input.channels[1].clone()]),
                    },
                ])
            }
        }

        let pool = WorkerPool::new(1, 1).unwrap();
        let input = AudioData::new(48_000.0, vec![vec![1.0; 8], vec![-1.0; 8]]);
        pool.separate_stems(Arc::new(Split), input).unwrap();
        match pool.wait_completion(WAIT).unwrap().outcome {
            JobOutcome::Stems(stems) => {
                assert_eq!(stems.len(), 2);
                assert_eq!(stems[1].audio.channels[0][0], -1.0);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_run_chunked_covers_everything() {
        let mut seen = Vec::new();
        let done = run_chunked(25, 10, &CancelToken::new(), |range| seen.push(range));
        assert_eq!(done, 25);
        assert_eq!(seen, vec![0..10, 10..20, 20..25]);
    }
}
