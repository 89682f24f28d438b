//! Single-task event loop around the dashboard controller.
//!
//! The service owns the controller and is its only writer. It selects over
//! user commands and request completions; callers talk to it through a
//! cloneable `DashboardHandle`.

use tokio::sync::{mpsc, oneshot};

use sensordash_types::TimeRange;

use super::controller::{Dashboard, DashboardSnapshot};
use crate::charts::ChartSinkFactory;
use crate::coordinator::Generation;
use crate::error::ServiceError;
use crate::feedback::Interaction;

const COMMAND_BUFFER: usize = 32;

type Reply<T> = oneshot::Sender<T>;

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

/// Commands accepted by the service. Mutations reply with the generation
/// they started, or `None` when nothing changed.
#[derive(Debug)]
pub enum DashboardCommand {
    AddToken(String, Reply<Option<Generation>>),
    RemoveToken(String, Reply<Option<Generation>>),
    SetQuery(String, Reply<Option<Generation>>),
    Reset(Reply<Option<Generation>>),
    SetTimeRange(TimeRange, Reply<Option<Generation>>),
    SetSensor(Option<String>, Reply<Option<Generation>>),
    Interact(Interaction, Reply<Option<Generation>>),
    /// Re-run every query with unchanged filters.
    Refresh(Reply<Generation>),
    Snapshot(Reply<DashboardSnapshot>),
    /// Reply once no request of the current generation is outstanding.
    Settle(Reply<DashboardSnapshot>),
    Shutdown,
}

// ─────────────────────────────────────────────────────────────────────────────
// Handle
// ─────────────────────────────────────────────────────────────────────────────

/// Cloneable handle to a running `DashboardService`.
#[derive(Debug, Clone)]
pub struct DashboardHandle {
    cmd_tx: mpsc::Sender<DashboardCommand>,
}

impl DashboardHandle {
    pub async fn add_token(&self, fragment: impl Into<String>) -> Result<Option<Generation>, ServiceError> {
        let fragment = fragment.into();
        self.request(|tx| DashboardCommand::AddToken(fragment, tx)).await
    }

    pub async fn remove_token(
        &self,
        fragment: impl Into<String>,
    ) -> Result<Option<Generation>, ServiceError> {
        let fragment = fragment.into();
        self.request(|tx| DashboardCommand::RemoveToken(fragment, tx)).await
    }

    pub async fn set_query(&self, q: impl Into<String>) -> Result<Option<Generation>, ServiceError> {
        let q = q.into();
        self.request(|tx| DashboardCommand::SetQuery(q, tx)).await
    }

    pub async fn reset(&self) -> Result<Option<Generation>, ServiceError> {
        self.request(DashboardCommand::Reset).await
    }

    pub async fn set_time_range(
        &self,
        time_range: TimeRange,
    ) -> Result<Option<Generation>, ServiceError> {
        self.request(|tx| DashboardCommand::SetTimeRange(time_range, tx))
            .await
    }

    pub async fn set_sensor(
        &self,
        sensor: Option<String>,
    ) -> Result<Option<Generation>, ServiceError> {
        self.request(|tx| DashboardCommand::SetSensor(sensor, tx)).await
    }

    pub async fn interact(&self, interaction: Interaction) -> Result<Option<Generation>, ServiceError> {
        self.request(|tx| DashboardCommand::Interact(interaction, tx))
            .await
    }

    pub async fn refresh(&self) -> Result<Generation, ServiceError> {
        self.request(DashboardCommand::Refresh).await
    }

    pub async fn snapshot(&self) -> Result<DashboardSnapshot, ServiceError> {
        self.request(DashboardCommand::Snapshot).await
    }

    /// Wait until the current generation has no outstanding request.
    pub async fn settle(&self) -> Result<DashboardSnapshot, ServiceError> {
        self.request(DashboardCommand::Settle).await
    }

    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        self.cmd_tx
            .send(DashboardCommand::Shutdown)
            .await
            .map_err(|_| ServiceError::Closed)
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> DashboardCommand,
    ) -> Result<T, ServiceError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(make(tx))
            .await
            .map_err(|_| ServiceError::Closed)?;
        rx.await.map_err(|_| ServiceError::Closed)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Service
// ─────────────────────────────────────────────────────────────────────────────

pub struct DashboardService<F: ChartSinkFactory> {
    dashboard: Dashboard<F>,
    cmd_rx: mpsc::Receiver<DashboardCommand>,
    settle_waiters: Vec<Reply<DashboardSnapshot>>,
}

impl<F: ChartSinkFactory> DashboardService<F> {
    pub fn new(dashboard: Dashboard<F>) -> (Self, DashboardHandle) {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
        (
            Self {
                dashboard,
                cmd_rx,
                settle_waiters: Vec::new(),
            },
            DashboardHandle { cmd_tx },
        )
    }

    /// Run until `Shutdown` or until every handle is dropped. Tears the
    /// dashboard down on exit and returns it.
    pub async fn run(mut self) -> Dashboard<F> {
        tracing::debug!("Dashboard service started");
        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(DashboardCommand::Shutdown) | None => break,
                    Some(cmd) => self.handle_command(cmd),
                },
                Some(completion) = self.dashboard.next_completion() => {
                    self.dashboard.handle_completion(completion);
                }
            }
            self.release_settled();
        }
        // Waiters get a final snapshot rather than a closed channel.
        let snapshot = self.dashboard.snapshot();
        for waiter in self.settle_waiters.drain(..) {
            let _ = waiter.send(snapshot.clone());
        }
        self.dashboard.teardown();
        tracing::debug!("Dashboard service stopped");
        self.dashboard
    }

    fn handle_command(&mut self, cmd: DashboardCommand) {
        let dashboard = &mut self.dashboard;
        match cmd {
            DashboardCommand::AddToken(fragment, tx) => {
                let _ = tx.send(dashboard.add_token(&fragment));
            }
            DashboardCommand::RemoveToken(fragment, tx) => {
                let _ = tx.send(dashboard.remove_token(&fragment));
            }
            DashboardCommand::SetQuery(q, tx) => {
                let _ = tx.send(dashboard.set_query(&q));
            }
            DashboardCommand::Reset(tx) => {
                let _ = tx.send(dashboard.reset());
            }
            DashboardCommand::SetTimeRange(time_range, tx) => {
                let _ = tx.send(dashboard.set_time_range(time_range));
            }
            DashboardCommand::SetSensor(sensor, tx) => {
                let _ = tx.send(dashboard.set_sensor(sensor.as_deref()));
            }
            DashboardCommand::Interact(interaction, tx) => {
                let _ = tx.send(dashboard.interact(&interaction));
            }
            DashboardCommand::Refresh(tx) => {
                let _ = tx.send(dashboard.refresh());
            }
            DashboardCommand::Snapshot(tx) => {
                let _ = tx.send(dashboard.snapshot());
            }
            DashboardCommand::Settle(tx) => self.settle_waiters.push(tx),
            DashboardCommand::Shutdown => {}
        }
    }

    fn release_settled(&mut self) {
        if self.settle_waiters.is_empty() || self.dashboard.any_loading() {
            return;
        }
        let snapshot = self.dashboard.snapshot();
        for waiter in self.settle_waiters.drain(..) {
            let _ = waiter.send(snapshot.clone());
        }
    }
}
