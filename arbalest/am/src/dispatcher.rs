// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! The single-threaded event dispatcher.
//!
//! Every component communicates exclusively through [AmEvent]s on one shared
//! loop; the dispatcher routes each event to the addressed state machine and
//! posts the resulting events back. State machines therefore never see two
//! events concurrently, and parallelism comes from having many subjects.

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, error, info, warn};

use arbalest_core::error::{ArbalestError, Result};
use arbalest_core::event_loop::{EventAction, EventSender};
use arbalest_core::ids::{ContainerId, TaskAttemptId, TaskId, VertexId};

use crate::launcher::LauncherEvent;
use crate::rm::SchedulerEvent;
use crate::state::container::ContainerEvent;
use crate::state::dag::{Dag, DagEvent};
use crate::state::task::TaskEvent;
use crate::state::task_attempt::AttemptEvent;
use crate::state::vertex::VertexEvent;
use crate::state::AmState;

/// The event family of the application master, addressed by subject id.
#[derive(Debug)]
pub enum AmEvent {
    Container {
        container_id: ContainerId,
        event: ContainerEvent,
    },
    Attempt {
        attempt_id: TaskAttemptId,
        event: AttemptEvent,
    },
    Task {
        task_id: TaskId,
        event: TaskEvent,
    },
    Vertex {
        vertex_id: VertexId,
        event: VertexEvent,
    },
    Dag(DagEvent),
    Scheduler(SchedulerEvent),
    Launcher(LauncherEvent),
}

impl AmEvent {
    /// `Subject::Kind` label for logging and tests.
    pub fn qualified_type(&self) -> String {
        match self {
            AmEvent::Container { event, .. } => format!("Container::{}", event.event_type()),
            AmEvent::Attempt { event, .. } => format!("Attempt::{}", event.event_type()),
            AmEvent::Task { event, .. } => format!("Task::{}", event.event_type()),
            AmEvent::Vertex { event, .. } => format!("Vertex::{}", event.event_type()),
            AmEvent::Dag(event) => format!("Dag::{}", event.event_type()),
            AmEvent::Scheduler(event) => format!("Scheduler::{}", event.event_type()),
            AmEvent::Launcher(event) => format!("Launcher::{}", event.event_type()),
        }
    }
}

/// Routes events to state machines and re-posts their side effects.
pub struct Dispatcher {
    state: Arc<AmState>,
}

impl Dispatcher {
    pub fn new(state: Arc<AmState>) -> Self {
        Self { state }
    }

    fn with_dag(
        &self,
        f: impl FnOnce(&mut Dag) -> Result<Vec<AmEvent>>,
    ) -> Result<Vec<AmEvent>> {
        let mut guard = self.state.dag.write();
        match guard.as_mut() {
            Some(dag) => f(dag),
            None => {
                warn!("Dropping event: no DAG is registered");
                Ok(vec![])
            }
        }
    }

    /// On DAG completion: announce the terminal status once and stop every
    /// live container.
    fn finalize_if_terminal(&self, sender: &EventSender<AmEvent>) -> Result<()> {
        let status = {
            let guard = self.state.dag.read();
            match guard.as_ref() {
                Some(dag) if dag.is_terminal() => Some(dag.state()),
                _ => None,
            }
        };
        let Some(status) = status else {
            return Ok(());
        };
        if self.state.mark_finalized() {
            info!("DAG reached terminal state {status:?}");
            for container_id in self.state.containers.live_container_ids() {
                sender.post_event(AmEvent::Container {
                    container_id,
                    event: ContainerEvent::StopRequest,
                })?;
            }
            self.state.announce_dag_status(status);
        }
        Ok(())
    }
}

#[async_trait]
impl EventAction<AmEvent> for Dispatcher {
    fn on_start(&self) {
        info!("Starting the application master dispatcher");
    }

    fn on_stop(&self) {
        info!("Stopping the application master dispatcher");
    }

    async fn on_receive(
        &self,
        event: AmEvent,
        sender: &EventSender<AmEvent>,
    ) -> Result<()> {
        debug!("Dispatching {}", event.qualified_type());
        let out = match event {
            AmEvent::Container {
                container_id,
                event,
            } => self.state.containers.handle(container_id, event)?,
            AmEvent::Attempt { attempt_id, event } => {
                self.with_dag(|dag| dag.handle_attempt_event(attempt_id, event))?
            }
            AmEvent::Task { task_id, event } => {
                self.with_dag(|dag| dag.handle_task_event(task_id, event))?
            }
            AmEvent::Vertex { vertex_id, event } => {
                self.with_dag(|dag| dag.handle_vertex_event(vertex_id, event))?
            }
            AmEvent::Dag(event) => self.with_dag(|dag| dag.handle_dag_event(event))?,
            AmEvent::Scheduler(event) => {
                self.state.rm.handle(event, &self.state.containers).await?
            }
            AmEvent::Launcher(event) => {
                self.state.launcher.handle(event, sender.clone());
                vec![]
            }
        };
        for event in out {
            sender.post_event(event)?;
        }
        self.finalize_if_terminal(sender)
    }

    fn on_error(&self, error: ArbalestError) {
        // Invariant violations are fatal to the DAG, everything recoverable
        // was already turned into events by the state machines.
        error!("Dispatcher error: {error}");
        let failed = {
            let mut guard = self.state.dag.write();
            match guard.as_mut() {
                Some(dag) if !dag.is_terminal() => {
                    dag.abort(&error.to_string());
                    true
                }
                _ => false,
            }
        };
        if failed && self.state.mark_finalized() {
            for container_id in self.state.containers.live_container_ids() {
                let _ = self.state.post_event(AmEvent::Container {
                    container_id,
                    event: ContainerEvent::StopRequest,
                });
            }
            self.state
                .announce_dag_status(crate::state::dag::DagState::Failed);
        }
    }
}
