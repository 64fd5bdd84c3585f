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

//! Shared application master state: the state machines and the registries
//! tying them together.
//!
//! The dispatcher owns all DAG-side mutation; the task listener reaches the
//! containers through their per-container locks and the DAG through its
//! single lock. Cross-references between entities are ids resolved through
//! these registries, never pointers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::watch;

use arbalest_core::config::AmConfig;
use arbalest_core::error::{ArbalestError, Result};
use arbalest_core::event_loop::EventSender;
use arbalest_core::ids::{ApplicationId, ContainerId, TaskAttemptId};

use crate::dispatcher::AmEvent;
use crate::heartbeat::HeartbeatMonitor;
use crate::launcher::{ContainerLauncher, LauncherCommunicator};
use crate::listener::ListenerTables;
use crate::rm::{ResourceManagerClient, RmCommunicator};
use crate::state::container::ContainerMap;
use crate::state::dag::{Dag, DagState};

pub mod container;
pub mod dag;
pub mod dag_scheduler;
pub mod task;
pub mod task_attempt;
pub mod vertex;

/// Everything the dispatcher, the task listener and the communicators share.
pub struct AmState {
    pub config: Arc<AmConfig>,
    pub app_id: ApplicationId,
    pub containers: ContainerMap,
    pub dag: RwLock<Option<Dag>>,
    pub tables: Arc<ListenerTables>,
    pub container_monitor: Arc<HeartbeatMonitor<ContainerId>>,
    pub attempt_monitor: Arc<HeartbeatMonitor<TaskAttemptId>>,
    pub rm: RmCommunicator,
    pub launcher: LauncherCommunicator,
    event_sender: RwLock<Option<EventSender<AmEvent>>>,
    dag_finalized: AtomicBool,
    dag_status: watch::Sender<Option<DagState>>,
}

impl AmState {
    pub fn new(
        config: AmConfig,
        app_id: ApplicationId,
        rm: Arc<dyn ResourceManagerClient>,
        launcher: Arc<dyn ContainerLauncher>,
    ) -> Arc<Self> {
        let tables = Arc::new(ListenerTables::new());
        let container_monitor = Arc::new(HeartbeatMonitor::new(Duration::from_millis(
            config.heartbeat_timeout_ms,
        )));
        let attempt_monitor = Arc::new(HeartbeatMonitor::new(Duration::from_millis(
            config.heartbeat_timeout_ms,
        )));
        let containers =
            ContainerMap::new(&config, tables.clone(), container_monitor.clone());
        let (dag_status, _) = watch::channel(None);
        Arc::new(Self {
            launcher: LauncherCommunicator::new(launcher, config.task_listener_threads),
            config: Arc::new(config),
            app_id,
            containers,
            dag: RwLock::new(None),
            tables,
            container_monitor,
            attempt_monitor,
            rm: RmCommunicator::new(rm),
            event_sender: RwLock::new(None),
            dag_finalized: AtomicBool::new(false),
            dag_status,
        })
    }

    pub fn set_event_sender(&self, sender: EventSender<AmEvent>) {
        *self.event_sender.write() = Some(sender);
    }

    /// Posts an event onto the dispatcher loop.
    pub fn post_event(&self, event: AmEvent) -> Result<()> {
        match self.event_sender.read().as_ref() {
            Some(sender) => sender.post_event(event),
            None => Err(ArbalestError::General(
                "the application master is not started".to_string(),
            )),
        }
    }

    /// Registers a freshly submitted DAG, resetting the completion latch.
    pub fn install_dag(&self, dag: Dag) -> Result<()> {
        let mut guard = self.dag.write();
        if let Some(existing) = guard.as_ref() {
            if !existing.is_terminal() {
                return Err(ArbalestError::General(format!(
                    "DAG {} is still running",
                    existing.name()
                )));
            }
        }
        *guard = Some(dag);
        self.dag_finalized.store(false, Ordering::SeqCst);
        self.dag_status.send_replace(None);
        Ok(())
    }

    /// Returns true exactly once per DAG, for terminal-state finalization.
    pub fn mark_finalized(&self) -> bool {
        !self.dag_finalized.swap(true, Ordering::SeqCst)
    }

    pub fn announce_dag_status(&self, status: DagState) {
        self.dag_status.send_replace(Some(status));
    }

    pub fn subscribe_dag_status(&self) -> watch::Receiver<Option<DagState>> {
        self.dag_status.subscribe()
    }
}
