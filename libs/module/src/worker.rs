//! Worker thread and tick loop
//!
//! A module runs on its own OS thread with a current-thread tokio runtime.
//! Each pass of the loop polls the control channel, collects arrived
//! acknowledgments and then runs the user's [`Tick`]. The stop flag is
//! checked once per pass.

use crate::error::{ModuleError, Result};
use crate::module::Module;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// Whether the loop should keep going after a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickFlow {
    Continue,
    Stop,
}

/// One step of a module's processing
#[async_trait]
pub trait Tick: Send + 'static {
    async fn tick(&mut self, module: &mut Module) -> Result<TickFlow>;
}

/// Run ticks until `stop` is set or the tick asks to stop.
///
/// Transient transport conditions and writes rejected during teardown are
/// logged and the loop carries on; anything else ends it with the error.
pub async fn run_tick_loop<T: Tick + ?Sized>(
    module: &mut Module,
    tick: &mut T,
    stop: &AtomicBool,
) -> Result<()> {
    let interval = module.config().module.tick_interval();
    let mut ticks: u64 = 0;

    while !stop.load(Ordering::Acquire) {
        match module.handle_command().await {
            Ok(Some(outcome)) => debug!(?outcome, "Control command handled"),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Control channel poll failed"),
        }
        module.poll_acks().await;

        match tick.tick(module).await {
            Ok(TickFlow::Continue) => {}
            Ok(TickFlow::Stop) => {
                info!(module = %module.name(), ticks, "Tick loop finished");
                return Ok(());
            }
            Err(e @ ModuleError::Destroying { .. }) => debug!(error = %e, "Write rejected during teardown"),
            Err(e) if e.is_transient() => debug!(error = %e, "Transient tick failure"),
            Err(e) => {
                error!(module = %module.name(), ticks, error = %e, "Tick failed");
                return Err(e);
            }
        }

        ticks += 1;
        tokio::time::sleep(interval).await;
    }

    info!(module = %module.name(), ticks, "Tick loop stopped");
    Ok(())
}

/// Handle to a module running on its own thread
#[derive(Debug)]
pub struct Worker {
    module: String,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<Result<()>>>,
}

impl Worker {
    /// Start the worker thread, initialize the module there and run its tick loop.
    ///
    /// Returns once initialization finished; an initialization failure is
    /// returned here and the thread is reclaimed.
    pub async fn spawn<T: Tick>(mut module: Module, mut tick: T) -> Result<Self> {
        let name = module.name().to_string();
        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = oneshot::channel::<Result<()>>();

        let thread_stop = stop.clone();
        let handle = std::thread::Builder::new()
            .name(format!("module-{}", name.to_lowercase()))
            .spawn(move || -> Result<()> {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let message = format!("failed to build worker runtime: {}", e);
                        let _ = ready_tx.send(Err(ModuleError::worker(message.clone())));
                        return Err(ModuleError::worker(message));
                    }
                };

                runtime.block_on(async move {
                    if let Err(e) = module.init().await {
                        let message = e.to_string();
                        let _ = ready_tx.send(Err(e));
                        return Err(ModuleError::worker(message));
                    }
                    let _ = ready_tx.send(Ok(()));

                    let result = run_tick_loop(&mut module, &mut tick, &thread_stop).await;
                    module.close().await;
                    result
                })
            })
            .map_err(|e| ModuleError::worker(format!("failed to spawn worker thread: {}", e)))?;

        let mut worker = Self {
            module: name,
            stop,
            handle: Some(handle),
        };

        let ready = ready_rx
            .await
            .unwrap_or_else(|_| Err(ModuleError::worker("worker exited before initializing")));
        if let Err(e) = ready {
            worker.reclaim();
            return Err(e);
        }

        info!(module = %worker.module, "Worker started");
        Ok(worker)
    }

    /// Ask the loop to stop after the current pass
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Stop the loop and wait for the thread to exit
    pub fn stop_and_join(mut self) -> Result<()> {
        self.request_stop();
        self.join_thread()
    }

    fn join_thread(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        let result = handle
            .join()
            .unwrap_or_else(|_| Err(ModuleError::worker("worker thread panicked")));
        debug!(module = %self.module, "Worker thread joined");
        result
    }

    fn reclaim(&mut self) {
        self.request_stop();
        if let Err(e) = self.join_thread() {
            debug!(module = %self.module, error = %e, "Worker exited with an error");
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.reclaim();
        }
    }
}
