//! Drives a [`Controller`] on a tokio task.
//!
//! Commands arrive on an unbounded channel and are applied in order. Query
//! and bulk executions run on their own tasks and report back through an
//! internal channel, so the loop never blocks on I/O. Every applied message
//! publishes a fresh [`Snapshot`] on a `watch` channel; host notifications go
//! out on a separate event channel.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error};

use crate::bulk::{self, BulkAction, BulkExecutor};
use crate::error::{BulkError, ControllerStopped, ExecuteError};
use crate::executor::Executor;
use crate::pagination::Page;
use crate::query::Query;

use super::command::{Command, HostEvent};
use super::machine::{Controller, Effect};
use super::state::Snapshot;

/// Result of background work, fed back into the loop.
enum Completion {
    Query {
        generation: u64,
        result: Result<Page, String>,
    },
    Bulk {
        action: String,
        result: Result<serde_json::Value, BulkError>,
    },
}

/// Host-side handle to a running controller. Cheap to clone; the controller
/// stops once every handle is dropped.
#[derive(Debug, Clone)]
pub struct CollectionHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<Snapshot>,
}

impl CollectionHandle {
    pub fn send(&self, command: Command) -> Result<(), ControllerStopped> {
        self.commands.send(command).map_err(|_| ControllerStopped)
    }

    /// The most recently published state.
    pub fn snapshot(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }

    /// Wait until a published snapshot satisfies `predicate`.
    pub async fn wait_for(
        &self,
        mut predicate: impl FnMut(&Snapshot) -> bool,
    ) -> Result<Snapshot, ControllerStopped> {
        let mut rx = self.snapshots.clone();
        let snapshot = rx
            .wait_for(|s| predicate(s))
            .await
            .map_err(|_| ControllerStopped)?;
        Ok(snapshot.clone())
    }

    pub fn is_stopped(&self) -> bool {
        self.commands.is_closed()
    }

    /// Resolves once the controller task has exited.
    pub async fn stopped(&self) {
        self.commands.closed().await;
    }
}

/// Mount `controller` on a new task.
///
/// Must be called from within a tokio runtime.
pub fn spawn(
    controller: Controller,
    executor: Arc<dyn Executor>,
    bulk: Option<Arc<dyn BulkExecutor>>,
) -> (CollectionHandle, mpsc::UnboundedReceiver<HostEvent>) {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (snapshot_tx, snapshot_rx) = watch::channel(controller.snapshot());

    let runtime = Runtime {
        executor,
        bulk,
        events: event_tx,
        snapshots: snapshot_tx,
    };
    tokio::spawn(runtime.run(controller, command_rx));

    (
        CollectionHandle {
            commands: command_tx,
            snapshots: snapshot_rx,
        },
        event_rx,
    )
}

struct Runtime {
    executor: Arc<dyn Executor>,
    bulk: Option<Arc<dyn BulkExecutor>>,
    events: mpsc::UnboundedSender<HostEvent>,
    snapshots: watch::Sender<Snapshot>,
}

impl Runtime {
    async fn run(self, mut controller: Controller, mut commands: mpsc::UnboundedReceiver<Command>) {
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Completion>();

        let effects = controller.mount();
        self.apply(effects, &done_tx);
        self.snapshots.send_replace(controller.snapshot());

        loop {
            let effects = tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Unmount) | None => {
                        controller.handle(Command::Unmount);
                        break;
                    }
                    Some(command) => controller.handle(command),
                },
                Some(done) = done_rx.recv() => match done {
                    Completion::Query { generation, result } => controller.complete(generation, result),
                    Completion::Bulk { action, result } => controller.bulk_completed(&action, result),
                },
            };
            self.apply(effects, &done_tx);
            self.snapshots.send_replace(controller.snapshot());
        }

        self.snapshots.send_replace(controller.snapshot());
        debug!("collection controller stopped");
    }

    fn apply(&self, effects: Vec<Effect>, done: &mpsc::UnboundedSender<Completion>) {
        for effect in effects {
            match effect {
                Effect::Execute { generation, query } => self.execute(generation, query, done.clone()),
                Effect::RunBulk {
                    action,
                    base,
                    id_field,
                    ids,
                } => self.run_bulk(action, base, id_field, ids, done.clone()),
                Effect::Notify(event) => {
                    // The host may have stopped listening; state still updates.
                    let _ = self.events.send(event);
                }
            }
        }
    }

    fn execute(&self, generation: u64, query: Query, done: mpsc::UnboundedSender<Completion>) {
        let executor = Arc::clone(&self.executor);
        debug!(generation, resource = query.resource(), "dispatching query");
        tokio::spawn(async move {
            let task = tokio::spawn(async move { executor.execute(query).await });
            let result = match task.await {
                Ok(Ok(page)) => Ok(page),
                Ok(Err(e)) => Err(e.user_message()),
                Err(e) => {
                    error!(generation, error = %e, "executor task did not complete");
                    Err(ExecuteError::Aborted.user_message())
                }
            };
            let _ = done.send(Completion::Query { generation, result });
        });
    }

    fn run_bulk(
        &self,
        action: BulkAction,
        base: Query,
        id_field: String,
        ids: Vec<String>,
        done: mpsc::UnboundedSender<Completion>,
    ) {
        let executor = self.bulk.clone();
        let name = action.name().to_string();
        debug!(action = %name, selected = ids.len(), "dispatching bulk action");
        tokio::spawn(async move {
            let task = tokio::spawn(async move {
                bulk::run(&action, executor.as_deref(), &base, &id_field, ids).await
            });
            let result = match task.await {
                Ok(result) => result,
                Err(e) => {
                    error!(action = %name, error = %e, "bulk action task did not complete");
                    Err(BulkError::Failed(ExecuteError::Aborted.to_string()))
                }
            };
            let _ = done.send(Completion::Bulk {
                action: name,
                result,
            });
        });
    }
}
