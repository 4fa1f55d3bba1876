//! Message-passing access to the pedal controller
//!
//! The controller runs in one tokio task that selects over:
//!
//! ```text
//!   button events (midir callback) ──┐
//!   5 ms ticker ─────────────────────┼──> PedalController
//!   ControllerCommand (web layer) ───┘
//! ```
//!
//! Queries carry a oneshot sender for the reply, as in an actor.

use super::{PedalController, UpdateReport};
use crate::button::{ButtonId, ButtonUpdate, ButtonView};
use crate::midi::input::ButtonEvent;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace};

/// Detector polling period
pub const TICK_INTERVAL: Duration = Duration::from_millis(5);

/// Requests understood by the controller task
#[derive(Debug)]
pub enum ControllerCommand {
    /// Apply one button update
    Update {
        button: ButtonId,
        update: ButtonUpdate,
        response: oneshot::Sender<UpdateReport>,
    },
    /// Apply updates to several buttons in order
    UpdateMany {
        updates: Vec<(ButtonId, ButtonUpdate)>,
        response: oneshot::Sender<Vec<UpdateReport>>,
    },
    GetView {
        button: ButtonId,
        response: oneshot::Sender<ButtonView>,
    },
    GetViews {
        response: oneshot::Sender<Vec<ButtonView>>,
    },
    /// Flush storage and stop the task
    Shutdown { response: oneshot::Sender<()> },
}

/// Cloneable handle to the controller task
#[derive(Clone)]
pub struct ControllerHandle {
    cmd_tx: mpsc::UnboundedSender<ControllerCommand>,
}

impl ControllerHandle {
    /// Move `controller` into a new task fed by `events`
    pub fn spawn(
        controller: PedalController,
        events: mpsc::Receiver<ButtonEvent>,
    ) -> (Self, JoinHandle<()>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(controller, cmd_rx, events));
        info!("Controller task spawned");
        (Self { cmd_tx }, task)
    }

    /// Apply an update; `None` if the controller has stopped
    pub async fn update(&self, button: ButtonId, update: ButtonUpdate) -> Option<UpdateReport> {
        let (response, rx) = oneshot::channel();
        self.cmd_tx
            .send(ControllerCommand::Update {
                button,
                update,
                response,
            })
            .ok()?;
        rx.await.ok()
    }

    pub async fn update_many(
        &self,
        updates: Vec<(ButtonId, ButtonUpdate)>,
    ) -> Option<Vec<UpdateReport>> {
        let (response, rx) = oneshot::channel();
        self.cmd_tx
            .send(ControllerCommand::UpdateMany { updates, response })
            .ok()?;
        rx.await.ok()
    }

    pub async fn view(&self, button: ButtonId) -> Option<ButtonView> {
        let (response, rx) = oneshot::channel();
        self.cmd_tx
            .send(ControllerCommand::GetView { button, response })
            .ok()?;
        rx.await.ok()
    }

    pub async fn views(&self) -> Vec<ButtonView> {
        let (response, rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(ControllerCommand::GetViews { response })
            .is_err()
        {
            return Vec::new();
        }
        rx.await.ok().unwrap_or_default()
    }

    /// Stop the task after flushing storage; waits for the flush
    pub async fn shutdown(&self) {
        let (response, rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(ControllerCommand::Shutdown { response })
            .is_ok()
        {
            let _ = rx.await;
        }
    }
}

async fn run(
    mut controller: PedalController,
    mut cmd_rx: mpsc::UnboundedReceiver<ControllerCommand>,
    mut events: mpsc::Receiver<ButtonEvent>,
) {
    debug!("Controller loop started");

    let mut ticker = tokio::time::interval(TICK_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut events_open = true;
    let mut shutdown_ack = None;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else { break };
                trace!(?cmd, "Processing command");
                match cmd {
                    ControllerCommand::Update { button, update, response } => {
                        let _ = response.send(controller.apply_update(button, &update));
                    }
                    ControllerCommand::UpdateMany { updates, response } => {
                        let reports = updates
                            .iter()
                            .map(|(button, update)| controller.apply_update(*button, update))
                            .collect();
                        let _ = response.send(reports);
                    }
                    ControllerCommand::GetView { button, response } => {
                        let _ = response.send(controller.view(button));
                    }
                    ControllerCommand::GetViews { response } => {
                        let _ = response.send(controller.views());
                    }
                    ControllerCommand::Shutdown { response } => {
                        info!("Controller received shutdown command");
                        shutdown_ack = Some(response);
                        break;
                    }
                }
            }
            event = events.recv(), if events_open => {
                match event {
                    Some(event) => {
                        trace!(?event, "Button level");
                        controller.observe(event.button, event.pressed, event.at);
                    }
                    None => {
                        debug!("Button event channel closed");
                        events_open = false;
                    }
                }
            }
            _ = ticker.tick() => {
                controller.tick(Instant::now());
            }
        }
    }

    controller.shutdown();
    if let Some(ack) = shutdown_ack {
        let _ = ack.send(());
    }
}
