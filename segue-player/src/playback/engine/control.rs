//! Serial control context
//!
//! A single thread executes every graph-touching operation, node event and
//! configuration change in arrival order. Public calls hand their work over
//! and block until it has run; calls made from the control thread itself
//! (e.g. from a delegate callback) run inline.

use super::core::EngineShared;
use crate::error::{Error, Result};
use crate::playback::events::NodeEvent;
use crossbeam_channel::{Receiver, Sender};
use std::sync::{Arc, OnceLock};
use std::thread::{JoinHandle, ThreadId};
use tracing::{debug, trace, Dispatch};

pub(super) type ControlJob = Box<dyn FnOnce(&EngineShared) + Send>;

pub(super) enum ControlMessage {
    /// Run a closure on the control thread
    Run(ControlJob),
    /// Event from the node identified by `token`
    Node { token: u64, event: NodeEvent },
    /// The render graph reported a configuration change
    ConfigurationChanged,
    Shutdown,
}

/// Sending half of the control context, owned by the engine state
pub(super) struct ControlQueue {
    sender: Sender<ControlMessage>,
    thread: OnceLock<ThreadId>,
}

impl ControlQueue {
    pub fn new() -> (Self, Receiver<ControlMessage>) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (
            Self {
                sender,
                thread: OnceLock::new(),
            },
            receiver,
        )
    }

    /// A sender for posting from other threads (node sinks, graph handler)
    pub fn sender(&self) -> Sender<ControlMessage> {
        self.sender.clone()
    }

    pub fn post(&self, message: ControlMessage) -> Result<()> {
        self.sender
            .send(message)
            .map_err(|_| Error::ControlContextGone)
    }

    pub fn is_control_thread(&self) -> bool {
        self.thread
            .get()
            .is_some_and(|id| *id == std::thread::current().id())
    }

    /// Start the control thread. `shared` must own this queue.
    pub fn spawn(
        shared: Arc<EngineShared>,
        receiver: Receiver<ControlMessage>,
        dispatch: Dispatch,
    ) -> Result<JoinHandle<()>> {
        let worker = Arc::clone(&shared);
        let handle = std::thread::Builder::new()
            .name("segue-control".to_string())
            .spawn(move || {
                let _guard = tracing::dispatcher::set_default(&dispatch);
                run(worker, receiver);
            })
            .map_err(|e| Error::Internal(format!("Failed to spawn control thread: {}", e)))?;

        let _ = shared.control.thread.set(handle.thread().id());
        Ok(handle)
    }
}

fn run(shared: Arc<EngineShared>, receiver: Receiver<ControlMessage>) {
    debug!("Control thread started");

    for message in receiver.iter() {
        match message {
            ControlMessage::Run(job) => job(&shared),
            ControlMessage::Node { token, event } => shared.handle_node_event(token, event),
            ControlMessage::ConfigurationChanged => shared.handle_configuration_change(),
            ControlMessage::Shutdown => {
                trace!("Control thread received shutdown");
                break;
            }
        }
    }

    debug!("Control thread stopped");
}

impl EngineShared {
    /// Run `f` on the control thread and wait for its result
    pub(super) fn run_sync<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&EngineShared) -> R + Send + 'static,
    {
        if self.control.is_control_thread() {
            return Ok(f(self));
        }

        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.control.post(ControlMessage::Run(Box::new(move |shared| {
            let _ = reply_tx.send(f(shared));
        })))?;

        // A dropped reply sender means the control thread is gone
        reply_rx.recv().map_err(|_| Error::ControlContextGone)
    }
}
