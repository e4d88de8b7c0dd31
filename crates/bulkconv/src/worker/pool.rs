use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use log::{debug, error, info, warn};

use super::orchestrator::{JobOrchestrator, ProcessOutcome};
use super::Dispatcher;
use crate::error::DispatchError;
use crate::repository::{JobRepository, RepositoryError};

type InFlight = Arc<Mutex<HashSet<String>>>;

/// Fixed set of OS threads pulling job ids from a bounded queue and handing
/// them to a [`JobOrchestrator`].
pub struct WorkerPool {
    job_sender: Sender<String>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    in_flight: InFlight,
    repository: Arc<dyn JobRepository>,
    capacity: usize,
}

impl WorkerPool {
    pub fn new(
        orchestrator: Arc<JobOrchestrator>,
        repository: Arc<dyn JobRepository>,
        worker_count: usize,
        queue_capacity: usize,
    ) -> Result<Self, DispatchError> {
        let worker_count = worker_count.max(1);
        let capacity = queue_capacity.max(1);
        let (job_sender, job_receiver) = bounded::<String>(capacity);
        let shutdown = Arc::new(AtomicBool::new(false));
        let in_flight: InFlight = Arc::new(Mutex::new(HashSet::new()));

        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let job_rx = job_receiver.clone();
            let shutdown_flag = Arc::clone(&shutdown);
            let worker_orchestrator = Arc::clone(&orchestrator);
            let worker_in_flight = Arc::clone(&in_flight);

            let handle = thread::Builder::new()
                .name(format!("bulkconv-worker-{}", worker_id))
                .spawn(move || {
                    run_worker(
                        worker_id,
                        job_rx,
                        shutdown_flag,
                        worker_orchestrator,
                        worker_in_flight,
                    );
                })
                .map_err(|e| DispatchError::SpawnFailed(e.to_string()))?;
            workers.push(handle);
        }

        info!("Started {} workers", worker_count);

        Ok(Self {
            job_sender,
            workers,
            shutdown,
            in_flight,
            repository,
            capacity,
        })
    }

    /// Queues every job the repository still lists as PENDING or IN_PROGRESS.
    /// Returns how many were queued.
    pub fn recover_unfinished(&self) -> Result<usize, RepositoryError> {
        let jobs = self.repository.list_unfinished_jobs()?;
        let mut queued = 0;
        for job in jobs {
            match self.dispatch(&job.id) {
                Ok(()) => queued += 1,
                Err(e) => warn!("Could not requeue job {}: {}", job.id, e),
            }
        }
        if queued > 0 {
            info!("Requeued {} unfinished jobs", queued);
        }
        Ok(queued)
    }

    /// Number of jobs queued or running.
    pub fn pending(&self) -> usize {
        self.in_flight.lock().map(|set| set.len()).unwrap_or(0)
    }

    /// Stops workers after the job each is currently running. Jobs still in
    /// the queue stay unfinished in the repository.
    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Closes the queue and joins every worker. Without a prior `shutdown`,
    /// queued jobs are drained first.
    pub fn wait(self) {
        drop(self.job_sender);

        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All workers have stopped");
    }
}

impl Dispatcher for WorkerPool {
    fn dispatch(&self, job_id: &str) -> Result<(), DispatchError> {
        if self.is_shutdown() {
            return Err(DispatchError::ChannelClosed);
        }

        {
            let mut in_flight = self
                .in_flight
                .lock()
                .map_err(|_| DispatchError::ChannelClosed)?;
            if !in_flight.insert(job_id.to_string()) {
                debug!("Job {} already queued, ignoring duplicate dispatch", job_id);
                return Ok(());
            }
        }

        match self.job_sender.try_send(job_id.to_string()) {
            Ok(()) => Ok(()),
            Err(e) => {
                release(&self.in_flight, job_id);
                match e {
                    TrySendError::Full(_) => Err(DispatchError::QueueFull {
                        capacity: self.capacity,
                    }),
                    TrySendError::Disconnected(_) => Err(DispatchError::ChannelClosed),
                }
            }
        }
    }
}

fn release(in_flight: &InFlight, job_id: &str) {
    if let Ok(mut set) = in_flight.lock() {
        set.remove(job_id);
    }
}

fn run_worker(
    worker_id: usize,
    job_receiver: Receiver<String>,
    shutdown: Arc<AtomicBool>,
    orchestrator: Arc<JobOrchestrator>,
    in_flight: InFlight,
) {
    debug!("Worker {} started", worker_id);

    loop {
        if shutdown.load(Ordering::Relaxed) {
            debug!("Worker {} received shutdown signal", worker_id);
            break;
        }

        match job_receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(job_id) => {
                debug!("Worker {} processing job {}", worker_id, job_id);

                let result =
                    panic::catch_unwind(AssertUnwindSafe(|| orchestrator.process(&job_id)));
                match result {
                    Ok(Ok(ProcessOutcome::Finished(summary))) => info!(
                        "Job {} finished as {} ({} converted, {} failed)",
                        job_id, summary.status, summary.succeeded, summary.failed
                    ),
                    Ok(Ok(ProcessOutcome::AlreadyFinished(status))) => {
                        debug!("Job {} was already {}", job_id, status)
                    }
                    Ok(Ok(ProcessOutcome::NotFound)) => warn!("Job {} not found", job_id),
                    Ok(Err(e)) => error!("Job {} failed: {}", job_id, e),
                    Err(_) => error!(
                        "Worker {} panicked while processing job {}",
                        worker_id, job_id
                    ),
                }

                release(&in_flight, &job_id);
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                debug!("Worker {} job channel disconnected", worker_id);
                break;
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}
