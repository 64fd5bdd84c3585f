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

//! Resource manager communicator: maintains the priority-ordered ask list
//! and matches granted containers to outstanding asks.
//!
//! The actual cluster resource manager is reached through the
//! [ResourceManagerClient] trait; its callbacks enter the system as
//! [SchedulerEvent]s.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info, warn};
use parking_lot::Mutex;

use arbalest_core::error::Result;
use arbalest_core::ids::{ContainerId, NodeId, TaskAttemptId};
use arbalest_core::plan::{
    Credentials, LocalResource, Priority, Resource, TaskSpec,
};

use crate::dispatcher::AmEvent;
use crate::state::container::{ContainerEvent, ContainerMap};
use crate::state::task_attempt::AttemptEvent;

/// One container ask forwarded to the resource manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerAsk {
    pub priority: Priority,
    pub resource: Resource,
}

/// Everything needed to place one attempt once a container is granted.
#[derive(Debug, Clone)]
pub struct ContainerRequest {
    pub attempt_id: TaskAttemptId,
    pub priority: Priority,
    pub resource: Resource,
    pub task_spec: TaskSpec,
    pub local_resources: HashMap<String, LocalResource>,
    pub credentials: Option<Credentials>,
    /// Nodes this attempt's task must avoid.
    pub blacklisted_nodes: Vec<NodeId>,
}

/// The cluster resource manager, by interface.
#[async_trait]
pub trait ResourceManagerClient: Send + Sync {
    async fn request_containers(&self, asks: Vec<ContainerAsk>) -> Result<()>;
    async fn release_container(&self, container_id: ContainerId) -> Result<()>;
}

/// Events on the scheduler/resource-manager boundary.
#[derive(Debug)]
pub enum SchedulerEvent {
    /// An attempt asks for a container.
    ContainerRequest(ContainerRequest),
    /// RM callback: a container was granted.
    ContainerAllocated {
        container_id: ContainerId,
        node: NodeId,
        resource: Resource,
    },
    /// RM callback: a container finished.
    ContainerCompleted {
        container_id: ContainerId,
        exit_status: i32,
        diagnostics: String,
        preempted: bool,
    },
    /// RM callback: a node was lost.
    NodeFailed { node: NodeId },
    /// A container lease should be returned to the resource manager.
    ContainerDeallocate { container_id: ContainerId },
}

impl SchedulerEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            SchedulerEvent::ContainerRequest(_) => "ContainerRequest",
            SchedulerEvent::ContainerAllocated { .. } => "ContainerAllocated",
            SchedulerEvent::ContainerCompleted { .. } => "ContainerCompleted",
            SchedulerEvent::NodeFailed { .. } => "NodeFailed",
            SchedulerEvent::ContainerDeallocate { .. } => "ContainerDeallocate",
        }
    }
}

/// Ask-list maintenance and grant matching.
pub struct RmCommunicator {
    rm: Arc<dyn ResourceManagerClient>,
    asks: Mutex<BTreeMap<Priority, VecDeque<ContainerRequest>>>,
    containers_by_node: Mutex<HashMap<NodeId, Vec<ContainerId>>>,
}

impl RmCommunicator {
    pub fn new(rm: Arc<dyn ResourceManagerClient>) -> Self {
        Self {
            rm,
            asks: Mutex::new(BTreeMap::new()),
            containers_by_node: Mutex::new(HashMap::new()),
        }
    }

    pub fn pending_ask_count(&self) -> usize {
        self.asks.lock().values().map(|q| q.len()).sum()
    }

    /// Pops the lowest-priority-number outstanding ask that tolerates the
    /// granted node.
    fn match_ask(&self, node: &NodeId) -> Option<ContainerRequest> {
        let mut asks = self.asks.lock();
        let mut matched: Option<(Priority, usize)> = None;
        'outer: for (&priority, queue) in asks.iter() {
            for (index, request) in queue.iter().enumerate() {
                if !request.blacklisted_nodes.contains(node) {
                    matched = Some((priority, index));
                    break 'outer;
                }
            }
        }
        let (priority, index) = matched?;
        let queue = asks.get_mut(&priority)?;
        let request = queue.remove(index)?;
        if queue.is_empty() {
            asks.remove(&priority);
        }
        Some(request)
    }

    pub async fn handle(
        &self,
        event: SchedulerEvent,
        containers: &ContainerMap,
    ) -> Result<Vec<AmEvent>> {
        match event {
            SchedulerEvent::ContainerRequest(request) => {
                debug!(
                    "Asking for a container at priority {} for {}",
                    request.priority, request.attempt_id
                );
                let ask = ContainerAsk {
                    priority: request.priority,
                    resource: request.resource,
                };
                self.asks
                    .lock()
                    .entry(request.priority)
                    .or_default()
                    .push_back(request);
                self.rm.request_containers(vec![ask]).await?;
                Ok(vec![])
            }
            SchedulerEvent::ContainerAllocated {
                container_id,
                node,
                resource,
            } => {
                let Some(request) = self.match_ask(&node) else {
                    info!(
                        "No outstanding ask matches container {container_id} on {node}; releasing"
                    );
                    self.rm.release_container(container_id).await?;
                    return Ok(vec![]);
                };
                if !containers.add_container_if_new(container_id, node.clone(), resource) {
                    warn!("Duplicate grant for container {container_id}; releasing");
                    // Put the ask back; another grant will serve it.
                    self.asks
                        .lock()
                        .entry(request.priority)
                        .or_default()
                        .push_front(request);
                    self.rm.release_container(container_id).await?;
                    return Ok(vec![]);
                }
                info!(
                    "Container {container_id} on {node} assigned to {}",
                    request.attempt_id
                );
                self.containers_by_node
                    .lock()
                    .entry(node)
                    .or_default()
                    .push(container_id);
                Ok(vec![
                    AmEvent::Container {
                        container_id,
                        event: ContainerEvent::LaunchRequest {
                            local_resources: request.local_resources.clone(),
                            credentials: request.credentials.clone(),
                        },
                    },
                    AmEvent::Container {
                        container_id,
                        event: ContainerEvent::AssignTask {
                            attempt_id: request.attempt_id,
                            task_spec: request.task_spec,
                            additional_resources: request.local_resources,
                            credentials: request.credentials,
                        },
                    },
                    AmEvent::Attempt {
                        attempt_id: request.attempt_id,
                        event: AttemptEvent::ContainerAssigned { container_id },
                    },
                ])
            }
            SchedulerEvent::ContainerCompleted {
                container_id,
                exit_status,
                diagnostics,
                preempted,
            } => {
                let mut by_node = self.containers_by_node.lock();
                for containers_on_node in by_node.values_mut() {
                    containers_on_node.retain(|&c| c != container_id);
                }
                drop(by_node);
                Ok(vec![AmEvent::Container {
                    container_id,
                    event: ContainerEvent::Completed {
                        exit_status,
                        diagnostics,
                        preempted,
                    },
                }])
            }
            SchedulerEvent::NodeFailed { node } => {
                let affected = self
                    .containers_by_node
                    .lock()
                    .remove(&node)
                    .unwrap_or_default();
                warn!(
                    "Node {node} failed; notifying {} containers",
                    affected.len()
                );
                Ok(affected
                    .into_iter()
                    .map(|container_id| AmEvent::Container {
                        container_id,
                        event: ContainerEvent::NodeFailed {
                            diagnostics: format!("node {node} failed"),
                        },
                    })
                    .collect())
            }
            SchedulerEvent::ContainerDeallocate { container_id } => {
                debug!("Releasing container {container_id}");
                self.rm.release_container(container_id).await?;
                Ok(vec![])
            }
        }
    }
}
