//! Priority queue of annotation tasks and the loop that sends them.
//!
//! A task is held back while any id it carries belongs to a task that was
//! sent but not yet acknowledged. Held back tasks are never dropped.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::Duration;

use hashbrown::{HashMap, HashSet};
use parking_lot::Mutex;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::label::LabelId;
use crate::task::AnnotationTask;
use crate::transport::{FrameSink, send_task};

/// Whether `candidate` shares any id with the ids already in flight.
pub fn conflicts(candidate: &HashSet<LabelId>, in_flight: &HashSet<LabelId>) -> bool {
    !candidate.is_disjoint(in_flight)
}

#[derive(Debug)]
struct Pending(AnnotationTask);

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.0.priority() == other.0.priority()
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    // BinaryHeap pops the maximum; the lowest priority key has to win
    fn cmp(&self, other: &Self) -> Ordering {
        other.0.priority().cmp(&self.0.priority())
    }
}

#[derive(Debug, Default)]
struct QueueState {
    pending: BinaryHeap<Pending>,
    in_flight: HashMap<String, HashSet<LabelId>>,
}

/// Shared between the stroke handler that enqueues and the scheduler loop.
#[derive(Debug, Clone, Default)]
pub struct TaskQueue {
    state: Arc<Mutex<QueueState>>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, task: AnnotationTask) {
        debug!(uuid = task.uuid(), id = task.id(), "Enqueued annotation task");
        self.state.lock().pending.push(Pending(task));
    }

    /// Confirms delivery of a sent task and releases its ids.
    pub fn acknowledge(&self, uuid: &str) -> bool {
        let released = self.state.lock().in_flight.remove(uuid).is_some();
        if released {
            debug!(uuid, "Annotation task acknowledged");
        }
        released
    }

    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Uuids of sent, unacknowledged tasks, sorted.
    pub fn in_flight(&self) -> Vec<String> {
        let mut uuids: Vec<String> = self.state.lock().in_flight.keys().cloned().collect();
        uuids.sort_unstable();
        uuids
    }

    /// Pops every pending task that does not conflict with the in-flight
    /// ids, in priority order, and marks it in flight. Tasks taken earlier in
    /// the same call count as in flight for later ones.
    pub fn take_dispatchable(&self) -> Vec<AnnotationTask> {
        let mut state = self.state.lock();
        let QueueState { pending, in_flight } = &mut *state;

        let mut busy: HashSet<LabelId> = in_flight.values().flatten().copied().collect();
        let mut held: Vec<Pending> = Vec::new();
        let mut ready: Vec<AnnotationTask> = Vec::new();

        while let Some(Pending(task)) = pending.pop() {
            let ids = task.id_set();
            if conflicts(&ids, &busy) {
                held.push(Pending(task));
                continue;
            }
            busy.extend(ids.iter().copied());
            in_flight.insert(task.uuid().to_string(), ids);
            ready.push(task);
        }

        if !held.is_empty() {
            debug!(held = held.len(), "Annotation tasks held back by id conflicts");
        }
        pending.extend(held);
        ready
    }

    fn release(&self, uuid: &str) {
        self.state.lock().in_flight.remove(uuid);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchEvent {
    Sent {
        uuid: String,
        id: LabelId,
        frames: usize,
    },
    Failed {
        uuid: String,
        id: LabelId,
        message: String,
    },
}

#[derive(Debug)]
pub enum SchedulerMessage {
    Exit,
    DispatchNow,
}

#[derive(Debug)]
pub struct Scheduler {
    handle: Option<JoinHandle<()>>,
    tx: UnboundedSender<SchedulerMessage>,
    queue: TaskQueue,
}

impl Scheduler {
    pub fn spawn<Sink, Callback>(
        queue: TaskQueue,
        sink: Sink,
        poll_interval: Duration,
        callback: Callback,
    ) -> Self
    where
        Sink: FrameSink + 'static,
        Callback: Fn(DispatchEvent) + Send + 'static,
    {
        let (tx, rx) = unbounded_channel::<SchedulerMessage>();
        let handle: JoinHandle<()> = tokio::spawn({
            let queue = queue.clone();
            async move {
                scheduler_loop(rx, queue, sink, poll_interval, callback).await;
            }
        });

        Self {
            handle: Some(handle),
            tx,
            queue,
        }
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    pub fn send(&self, msg: SchedulerMessage) {
        if self.tx.send(msg).is_err() {
            error!("Scheduler loop is gone");
        }
    }

    /// Runs a dispatch pass without waiting for the next tick.
    pub fn dispatch_now(&self) {
        self.send(SchedulerMessage::DispatchNow);
    }

    /// Stops polling after the current pass and waits for the loop.
    pub async fn exit(&mut self) {
        self.send(SchedulerMessage::Exit);

        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                error!("Scheduler loop failed to join: {err}");
            }
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if self.handle.is_some() {
            error!("Scheduler dropped while its loop is still running; call Scheduler::exit() first");
        }
    }
}

async fn scheduler_loop<Sink, Callback>(
    mut rx: UnboundedReceiver<SchedulerMessage>,
    queue: TaskQueue,
    mut sink: Sink,
    poll_interval: Duration,
    callback: Callback,
) where
    Sink: FrameSink,
    Callback: Fn(DispatchEvent) + Send,
{
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            msg = rx.recv() => match msg {
                None | Some(SchedulerMessage::Exit) => break,
                Some(SchedulerMessage::DispatchNow) => {}
            },
            _ = ticker.tick() => {}
        }

        for task in queue.take_dispatchable() {
            match send_task(&mut sink, &task).await {
                Ok(frames) => {
                    info!(uuid = task.uuid(), id = task.id(), frames, "Sent annotation task");
                    callback(DispatchEvent::Sent {
                        uuid: task.uuid().to_string(),
                        id: task.id(),
                        frames,
                    });
                }
                Err(err) => {
                    error!(uuid = task.uuid(), id = task.id(), "Failed to send annotation task: {err}");
                    queue.release(task.uuid());
                    callback(DispatchEvent::Failed {
                        uuid: task.uuid().to_string(),
                        id: task.id(),
                        message: err.to_string(),
                    });
                }
            }
        }
    }
}
