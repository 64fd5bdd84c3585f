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

//! Node manager communicator: ships container launch and stop requests over
//! a bounded worker pool; results re-enter the event bus.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};
use tokio::sync::Semaphore;

use arbalest_core::error::Result;
use arbalest_core::event_loop::EventSender;
use arbalest_core::ids::{ContainerId, NodeId};
use arbalest_core::plan::{Credentials, LocalResource};

use crate::dispatcher::AmEvent;
use crate::state::container::ContainerEvent;

/// Everything the node manager needs to start a worker container.
#[derive(Debug, Clone)]
pub struct ContainerLaunchContext {
    pub commands: Vec<String>,
    pub local_resources: HashMap<String, LocalResource>,
    pub credentials: Option<Credentials>,
}

/// The node managers of the cluster, by interface.
#[async_trait]
pub trait ContainerLauncher: Send + Sync {
    async fn start_container(
        &self,
        container_id: ContainerId,
        node: NodeId,
        context: ContainerLaunchContext,
    ) -> Result<()>;

    async fn stop_container(&self, container_id: ContainerId, node: NodeId) -> Result<()>;
}

/// Events on the node-manager boundary.
#[derive(Debug)]
pub enum LauncherEvent {
    Launch {
        container_id: ContainerId,
        node: NodeId,
        context: ContainerLaunchContext,
    },
    Stop {
        container_id: ContainerId,
        node: NodeId,
    },
}

impl LauncherEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            LauncherEvent::Launch { .. } => "Launch",
            LauncherEvent::Stop { .. } => "Stop",
        }
    }
}

/// Executes launch/stop requests on a bounded pool so slow node managers
/// never stall the dispatcher.
pub struct LauncherCommunicator {
    launcher: Arc<dyn ContainerLauncher>,
    permits: Arc<Semaphore>,
}

impl LauncherCommunicator {
    pub fn new(launcher: Arc<dyn ContainerLauncher>, max_concurrent: usize) -> Self {
        Self {
            launcher,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Dispatches one request; completion re-enters the bus as a container
    /// event.
    pub fn handle(&self, event: LauncherEvent, sender: EventSender<AmEvent>) {
        let launcher = self.launcher.clone();
        let permits = self.permits.clone();
        match event {
            LauncherEvent::Launch {
                container_id,
                node,
                context,
            } => {
                tokio::spawn(async move {
                    let _permit = permits.acquire().await;
                    debug!("Launching container {container_id} on {node}");
                    let event = match launcher
                        .start_container(container_id, node, context)
                        .await
                    {
                        Ok(()) => ContainerEvent::Launched,
                        Err(e) => {
                            warn!("Launch of {container_id} failed: {e}");
                            ContainerEvent::LaunchFailed {
                                diagnostics: e.to_string(),
                            }
                        }
                    };
                    let _ = sender.post_event(AmEvent::Container {
                        container_id,
                        event,
                    });
                });
            }
            LauncherEvent::Stop { container_id, node } => {
                tokio::spawn(async move {
                    let _permit = permits.acquire().await;
                    debug!("Stopping container {container_id} on {node}");
                    let event = match launcher.stop_container(container_id, node).await {
                        Ok(()) => ContainerEvent::NmStopSent,
                        Err(e) => {
                            warn!("Stop of {container_id} failed: {e}");
                            ContainerEvent::NmStopFailed
                        }
                    };
                    let _ = sender.post_event(AmEvent::Container {
                        container_id,
                        event,
                    });
                });
            }
        }
    }
}

/// A launcher that assumes workers are started out of band; launch and stop
/// requests succeed immediately. Used for in-process and test deployments.
pub struct StandaloneLauncher;

#[async_trait]
impl ContainerLauncher for StandaloneLauncher {
    async fn start_container(
        &self,
        container_id: ContainerId,
        node: NodeId,
        _context: ContainerLaunchContext,
    ) -> Result<()> {
        debug!("Standalone launch of {container_id} on {node}");
        Ok(())
    }

    async fn stop_container(&self, container_id: ContainerId, node: NodeId) -> Result<()> {
        debug!("Standalone stop of {container_id} on {node}");
        Ok(())
    }
}
