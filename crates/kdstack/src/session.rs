pub mod configuration;

use std::io;
use std::sync::Arc;
use std::thread::JoinHandle;

use thiserror::Error;

use self::configuration::{Configuration, ConfigurationError};
use crate::cache::FrameEventCache;
use crate::drain_worker::DrainTask;
use crate::frame::{FrameDescriptor, ThreadId};
use crate::resolver::FrameResolver;
use crate::ringbuffer::{DrainStats, RingbufferError};
use crate::sink::Sink;
use crate::stop_signal::StopSignal;
use crate::task;

/// One profiling session: the shared cache plus the worker that drains it.
pub struct Session {
    pub configuration: Configuration,
    cache: Arc<FrameEventCache>,
    worker: Option<Worker>,
}

struct Worker {
    stop: StopSignal,
    handle: JoinHandle<()>,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Ringbuffer(#[from] RingbufferError),
    #[error("failed to open sink: {0}")]
    Sink(#[source] io::Error),
    #[error("failed to spawn drain worker: {0}")]
    Spawn(#[source] io::Error),
    #[error("session is already running")]
    AlreadyRunning,
    #[error("session is not running")]
    NotRunning,
    #[error("drain worker panicked")]
    WorkerPanicked,
}

impl Session {
    pub fn new(
        configuration: Configuration,
        resolver: Arc<dyn FrameResolver>,
        sink: Arc<dyn Sink>,
    ) -> Result<Self, SessionError> {
        configuration.validate()?;
        let cache = FrameEventCache::new(
            configuration.capacity,
            configuration.max_depth,
            resolver,
            sink,
        )?;
        Ok(Session {
            configuration,
            cache: Arc::new(cache),
            worker: None,
        })
    }

    /// Builds a session writing to the sink named in the configuration.
    pub fn from_configuration(
        configuration: Configuration,
        resolver: Arc<dyn FrameResolver>,
    ) -> Result<Self, SessionError> {
        let sink = configuration.sink.open().map_err(SessionError::Sink)?;
        Self::new(configuration, resolver, sink)
    }

    // async-signal-safe
    pub fn record(&self, thread_id: ThreadId, frames: &[FrameDescriptor]) {
        self.cache.record(thread_id, frames);
    }

    /// The cache producers write into. Clone the `Arc` to hand it to sampling callbacks.
    pub fn cache(&self) -> &Arc<FrameEventCache> {
        &self.cache
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Starts the background drain worker.
    pub fn start(&mut self) -> Result<(), SessionError> {
        if self.worker.is_some() {
            return Err(SessionError::AlreadyRunning);
        }

        let stop = StopSignal::new();
        let task = DrainTask::new(
            Arc::clone(&self.cache),
            stop.clone(),
            self.configuration.drain_interval,
        );
        let handle = task::spawn(&self.configuration.worker_thread_name, task)
            .map_err(SessionError::Spawn)?;
        self.worker = Some(Worker { stop, handle });

        log::debug!(
            "Session started (capacity={}, max_depth={}, interval={:?})",
            self.configuration.capacity,
            self.configuration.max_depth,
            self.configuration.drain_interval
        );
        Ok(())
    }

    /// Stops the worker, waits for it, and flushes whatever is still buffered.
    /// The flush runs even when the worker panicked.
    pub fn stop(&mut self) -> Result<DrainStats, SessionError> {
        // Taking the worker guarantees its signal is stopped at most once
        let worker = self.worker.take().ok_or(SessionError::NotRunning)?;
        worker.stop.stop();
        let panicked = worker.handle.join().is_err();

        let stats = self.cache.flush();
        log::debug!("Session stopped. Final flush emitted {} records", stats.records_emitted);
        if panicked {
            log::warn!("stop: Drain worker panicked.");
            return Err(SessionError::WorkerPanicked);
        }
        Ok(stats)
    }

    /// Drains synchronously on the calling thread. Blocks while the worker
    /// is mid-drain.
    pub fn drain(&self) -> DrainStats {
        self.cache.drain()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.worker.is_some() {
            log::trace!("Stopping drain worker on drop");
            let _ = self.stop();
        }
    }
}
