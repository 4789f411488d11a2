//! Thread bridge between a module's worker thread and a host event loop
//!
//! Ports declared with the `host_bridge` transport are not sockets but
//! channels crossing into an embedding host that runs its own
//! single-threaded loop (a [`tokio::task::LocalSet`]):
//!
//! - outbound: the worker enqueues through an [`OutboundGate`]; a drain task
//!   on the host loop receives each value and hands it to the registered
//!   callback. The gate's lock covers only the enqueue, and the drain holds
//!   no lock while the callback runs.
//! - inbound: the host sends, the worker's [`Module::read`](crate::Module::read)
//!   receives.
//!
//! Teardown never discards values already queued for the host. Once
//! [`HostBridge::destroy`] has been called the gates refuse new writes; the
//! worker keeps running until every outbound lane has been drained, and the
//! drain that empties the last lane finalizes teardown.

use crate::error::{ModuleError, Result};
use crate::module::Module;
use crate::worker::{Tick, Worker};
use parking_lot::Mutex;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use types::{PortKind, Value};

/// Worker-side entry of one outbound lane
#[derive(Debug)]
pub(crate) struct OutboundGate {
    port: String,
    /// `None` once teardown has begun
    sender: Mutex<Option<UnboundedSender<Value>>>,
    pending: AtomicUsize,
}

impl OutboundGate {
    pub(crate) fn channel(port: &str) -> (Arc<Self>, UnboundedReceiver<Value>) {
        let (sender, values) = mpsc::unbounded_channel();
        let gate = Self {
            port: port.to_string(),
            sender: Mutex::new(Some(sender)),
            pending: AtomicUsize::new(0),
        };
        (Arc::new(gate), values)
    }

    /// Enqueue one value unless teardown has begun
    pub(crate) fn push(&self, value: Value) -> Result<()> {
        let sender = self.sender.lock();
        let Some(sender) = sender.as_ref() else {
            return Err(ModuleError::Destroying {
                port: self.port.clone(),
            });
        };

        self.pending.fetch_add(1, Ordering::AcqRel);
        if sender.send(value).is_err() {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            return Err(ModuleError::Destroying {
                port: self.port.clone(),
            });
        }
        Ok(())
    }

    /// Refuse further writes; values already queued stay deliverable
    fn close(&self) {
        self.sender.lock().take();
    }

    fn delivered(&self) {
        self.pending.fetch_sub(1, Ordering::AcqRel);
    }

    pub(crate) fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }
}

pub(crate) struct OutboundLane {
    pub(crate) name: String,
    pub(crate) gate: Arc<OutboundGate>,
    pub(crate) values: UnboundedReceiver<Value>,
}

pub(crate) struct InboundLane {
    pub(crate) name: String,
    pub(crate) kind: PortKind,
    pub(crate) sender: UnboundedSender<Value>,
}

/// Host-side ends of a module's bridged ports
#[derive(Default)]
pub(crate) struct HostEndpoints {
    pub(crate) outbound: Vec<OutboundLane>,
    pub(crate) inbound: Vec<InboundLane>,
}

/// Result of [`HostBridge::destroy`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroyOutcome {
    /// Nothing was queued; the worker has been stopped and joined
    Completed,
    /// Queued values remain; teardown finishes once they are delivered
    Deferred,
}

type Callback = Box<dyn FnMut(Value)>;

struct OutboundSide {
    name: String,
    gate: Arc<OutboundGate>,
    /// Moved into the drain task when the first callback is registered
    values: Option<UnboundedReceiver<Value>>,
    callback: Rc<RefCell<Option<Callback>>>,
    drain: Option<JoinHandle<()>>,
}

struct InboundSide {
    name: String,
    kind: PortKind,
    sender: Option<UnboundedSender<Value>>,
}

struct Shared {
    module: String,
    outbound: RefCell<HashMap<String, OutboundSide>>,
    inbound: RefCell<HashMap<String, InboundSide>>,
    worker: RefCell<Option<Worker>>,
    destroying: Cell<bool>,
    finalized: Cell<bool>,
    closed: Notify,
}

impl Shared {
    fn backlog(&self) -> usize {
        self.outbound
            .borrow()
            .values()
            .map(|side| side.gate.pending())
            .sum()
    }

    /// Finish teardown if it was requested and nothing is left to deliver
    fn try_finalize(&self) -> bool {
        if self.finalized.get() {
            return true;
        }
        if !self.destroying.get() || self.backlog() > 0 {
            return false;
        }
        self.finalize();
        true
    }

    fn finalize(&self) {
        self.finalized.set(true);

        // unblocks worker reads waiting on host input
        for side in self.inbound.borrow_mut().values_mut() {
            side.sender = None;
        }

        let worker = self.worker.borrow_mut().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.stop_and_join() {
                warn!(module = %self.module, error = %e, "Worker ended with an error");
            }
        }

        info!(module = %self.module, "Module torn down");
        self.closed.notify_waiters();
    }
}

/// Host-loop handle to a module running on a worker thread.
///
/// Must be used from within a [`tokio::task::LocalSet`]; drains are spawned
/// with [`tokio::task::spawn_local`].
pub struct HostBridge {
    shared: Rc<Shared>,
}

impl HostBridge {
    /// Start `module` on a worker thread running `tick`.
    ///
    /// Returns after the module initialized on that thread.
    pub async fn spawn<T: Tick>(mut module: Module, tick: T) -> Result<Self> {
        let endpoints = module.take_host_endpoints().unwrap_or_default();
        let name = module.name().to_string();

        let outbound = endpoints
            .outbound
            .into_iter()
            .map(|lane| {
                let side = OutboundSide {
                    name: lane.name,
                    gate: lane.gate,
                    values: Some(lane.values),
                    callback: Rc::new(RefCell::new(None)),
                    drain: None,
                };
                (side.name.to_lowercase(), side)
            })
            .collect();
        let inbound = endpoints
            .inbound
            .into_iter()
            .map(|lane| {
                let side = InboundSide {
                    name: lane.name,
                    kind: lane.kind,
                    sender: Some(lane.sender),
                };
                (side.name.to_lowercase(), side)
            })
            .collect();

        let worker = Worker::spawn(module, tick).await?;

        Ok(Self {
            shared: Rc::new(Shared {
                module: name,
                outbound: RefCell::new(outbound),
                inbound: RefCell::new(inbound),
                worker: RefCell::new(Some(worker)),
                destroying: Cell::new(false),
                finalized: Cell::new(false),
                closed: Notify::new(),
            }),
        })
    }

    /// Deliver every value written to outbound port `port` to `callback`, in
    /// write order. Values written before the first registration are kept
    /// and delivered once it happens. Registering again replaces the callback.
    pub fn register_callback<F>(&self, port: &str, callback: F) -> Result<()>
    where
        F: FnMut(Value) + 'static,
    {
        let key = port.to_lowercase();
        let mut outbound = self.shared.outbound.borrow_mut();
        let Some(side) = outbound.get_mut(&key) else {
            return Err(if self.shared.inbound.borrow().contains_key(&key) {
                ModuleError::wrong_direction(port, "deliver to a callback")
            } else {
                ModuleError::unknown_port(port)
            });
        };

        *side.callback.borrow_mut() = Some(Box::new(callback));
        if let Some(values) = side.values.take() {
            let task = drain(
                self.shared.clone(),
                side.name.clone(),
                side.gate.clone(),
                side.callback.clone(),
                values,
            );
            side.drain = Some(tokio::task::spawn_local(task));
            debug!(module = %self.shared.module, port = %side.name, "Bridge drain started");
        }
        Ok(())
    }

    /// Send a value from the host to inbound port `port`.
    ///
    /// Returns `false` without queueing once teardown has begun, or when
    /// the port is unknown or carries a different kind.
    pub fn write(&self, port: &str, value: impl Into<Value>) -> bool {
        let value = value.into();
        if self.shared.destroying.get() {
            return false;
        }

        let inbound = self.shared.inbound.borrow();
        let Some(side) = inbound.get(&port.to_lowercase()) else {
            warn!(module = %self.shared.module, port, "Host write to unknown inbound port");
            return false;
        };
        if side.kind != value.kind() {
            warn!(
                port = %side.name,
                expected = %side.kind,
                actual = %value.kind(),
                "Host write of the wrong kind"
            );
            return false;
        }
        side.sender
            .as_ref()
            .is_some_and(|sender| sender.send(value).is_ok())
    }

    /// Begin teardown.
    ///
    /// Completes immediately when no outbound values are queued; otherwise
    /// new writes are refused and teardown finishes after the backlog has
    /// been delivered.
    pub fn destroy(&self) -> DestroyOutcome {
        if self.shared.finalized.get() {
            return DestroyOutcome::Completed;
        }

        if !self.shared.destroying.replace(true) {
            for side in self.shared.outbound.borrow().values() {
                side.gate.close();
            }
            info!(module = %self.shared.module, "Destroy requested");
        }

        if self.shared.try_finalize() {
            DestroyOutcome::Completed
        } else {
            info!(
                module = %self.shared.module,
                backlog = self.shared.backlog(),
                "Teardown deferred until queued values are delivered"
            );
            DestroyOutcome::Deferred
        }
    }

    pub fn is_destroying(&self) -> bool {
        self.shared.destroying.get()
    }

    pub fn is_finalized(&self) -> bool {
        self.shared.finalized.get()
    }

    /// Values queued on outbound port `port` and not yet delivered
    pub fn queued(&self, port: &str) -> usize {
        self.shared
            .outbound
            .borrow()
            .get(&port.to_lowercase())
            .map_or(0, |side| side.gate.pending())
    }

    /// Wait until teardown has completed
    pub async fn closed(&self) {
        while !self.shared.finalized.get() {
            self.shared.closed.notified().await;
        }
    }
}

impl Drop for HostBridge {
    fn drop(&mut self) {
        if self.shared.finalized.get() {
            return;
        }

        let discarded = self.shared.backlog();
        warn!(
            module = %self.shared.module,
            discarded,
            "Host bridge dropped before teardown completed"
        );

        self.shared.destroying.set(true);
        for side in self.shared.outbound.borrow_mut().values_mut() {
            side.gate.close();
            side.values = None;
            if let Some(drain) = side.drain.take() {
                drain.abort();
            }
        }
        self.shared.finalize();
    }
}

async fn drain(
    shared: Rc<Shared>,
    port: String,
    gate: Arc<OutboundGate>,
    slot: Rc<RefCell<Option<Callback>>>,
    mut values: UnboundedReceiver<Value>,
) {
    while let Some(value) = values.recv().await {
        gate.delivered();

        // the slot is released while the callback runs so it may re-register
        let callback = slot.borrow_mut().take();
        match callback {
            Some(mut callback) => {
                callback(value);
                let mut current = slot.borrow_mut();
                if current.is_none() {
                    *current = Some(callback);
                }
            }
            None => warn!(port = %port, "Callback missing during delivery"),
        }
    }

    // the gate closed and every queued value has been delivered
    debug!(module = %shared.module, port = %port, "Bridge lane drained");
    shared.try_finalize();
}
