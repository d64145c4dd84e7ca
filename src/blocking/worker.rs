//! Dedicated runtime thread for blocking callers
//!
//! A [`Worker`] owns one OS thread driving one tokio runtime. Blocking calls
//! are boxed into jobs, sent over an unbounded channel and spawned as tasks
//! on that runtime; the caller parks on a oneshot until the job finishes.
//! Several threads can be blocked on the same worker at once.
//! Stopping the worker waits for every accepted job to finish.

use keyspan_core::{Config, Error, Result};
use parking_lot::Mutex;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::runtime::{Builder, Handle};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, warn};

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

struct WorkerInner {
    jobs: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerInner {
    fn stop(&self) {
        // closing the channel ends the runtime loop
        self.jobs.lock().take();
        let Some(thread) = self.thread.lock().take() else {
            return;
        };
        if thread.thread().id() == std::thread::current().id() {
            return;
        }
        if thread.join().is_err() {
            warn!("blocking worker thread panicked");
        }
    }
}

impl Drop for WorkerInner {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Runtime thread shared by a blocking client and the handles it creates
///
/// The thread stops when the last clone is dropped or on
/// [`shutdown`](Worker::shutdown).
#[derive(Clone)]
pub struct Worker {
    inner: Arc<WorkerInner>,
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("running", &self.is_running())
            .finish()
    }
}

impl Worker {
    /// Start a worker sized by `config.worker_threads`
    pub fn start(config: &Config) -> Result<Worker> {
        config.validate()?;
        let threads = config.worker_threads;
        let built = if threads == 1 {
            Builder::new_current_thread().enable_all().build()
        } else {
            Builder::new_multi_thread()
                .worker_threads(threads)
                .thread_name("keyspan-runtime")
                .enable_all()
                .build()
        };
        let runtime = built.map_err(|e| Error::Config(format!("cannot build worker runtime: {}", e)))?;

        let (jobs, mut queue) = mpsc::unbounded_channel::<Job>();
        let thread = std::thread::Builder::new()
            .name("keyspan-worker".into())
            .spawn(move || {
                debug!(threads, "blocking worker started");
                runtime.block_on(async move {
                    let mut running = JoinSet::new();
                    loop {
                        tokio::select! {
                            job = queue.recv() => match job {
                                Some(job) => {
                                    running.spawn(job);
                                }
                                None => break,
                            },
                            Some(_) = running.join_next(), if !running.is_empty() => {}
                        }
                    }
                    // let accepted jobs finish so no commit is cut off halfway
                    while running.join_next().await.is_some() {}
                });
                debug!("blocking worker stopped");
            })
            .map_err(|e| Error::Config(format!("cannot spawn worker thread: {}", e)))?;

        Ok(Worker {
            inner: Arc::new(WorkerInner {
                jobs: Mutex::new(Some(jobs)),
                thread: Mutex::new(Some(thread)),
            }),
        })
    }

    /// Check if the worker still accepts jobs
    pub fn is_running(&self) -> bool {
        self.inner.jobs.lock().is_some()
    }

    /// Stop accepting jobs and wait for the thread to exit
    ///
    /// Jobs already accepted run to completion first. Later calls fail with
    /// `WorkerShutdown`.
    pub fn shutdown(&self) {
        self.inner.stop();
    }

    /// Run `fut` on the worker and block until it completes
    ///
    /// Fails with `Misuse` when called from inside an async runtime, where
    /// parking the thread could stall the caller's own scheduler.
    pub fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        if Handle::try_current().is_ok() {
            return Err(Error::Misuse(
                "blocking call made from inside an async runtime; use the async client instead".into(),
            ));
        }

        let (done, outcome) = oneshot::channel();
        let job: Job = Box::pin(async move {
            // the caller may have gone away; nothing to report then
            let _ = done.send(fut.await);
        });
        self.submit(job)?;
        outcome.blocking_recv().map_err(|_| Error::WorkerShutdown)?
    }

    /// Run synchronous `f` inside the worker's runtime context
    ///
    /// A panic in `f` is caught and handed back instead of killing the task.
    pub(crate) fn run_in_context<T, F>(&self, f: F) -> Result<std::thread::Result<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.run(async move { Ok(std::panic::catch_unwind(AssertUnwindSafe(f))) })
    }

    fn submit(&self, job: Job) -> Result<()> {
        let jobs = self.inner.jobs.lock();
        let sender = jobs.as_ref().ok_or(Error::WorkerShutdown)?;
        sender.send(job).map_err(|_| Error::WorkerShutdown)
    }
}
