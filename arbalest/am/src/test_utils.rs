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

//! Test helpers: canned ids, recording mocks for the listener registry and
//! the external managers, and a wrapped container to drive the container
//! state machine one event at a time.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use arbalest_core::error::Result;
use arbalest_core::ids::{
    ApplicationId, ContainerId, DagId, NodeId, TaskAttemptId, TaskId, VertexId,
};
use arbalest_core::plan::{
    Credentials, DagPlan, EntityDescriptor, LocalResource, Resource, TaskSpec, VertexPlan,
};

use crate::dispatcher::AmEvent;
use crate::launcher::{ContainerLaunchContext, ContainerLauncher};
use crate::rm::{ContainerAsk, ContainerRequest, ResourceManagerClient};
use crate::state::container::{
    AmContainer, ContainerEvent, ContainerHeartbeatKeeper, ContainerListenerRegistry,
    ContainerState,
};
use arbalest_core::plan::ContainerTask;

pub fn test_app_id() -> ApplicationId {
    ApplicationId::new(1710000000, 1)
}

pub fn test_dag_id() -> DagId {
    DagId::new(test_app_id(), 1)
}

pub fn test_vertex_id(index: u32) -> VertexId {
    VertexId::new(test_dag_id(), index)
}

pub fn test_task_id(index: u32) -> TaskId {
    TaskId::new(test_vertex_id(0), index)
}

pub fn test_attempt_id(task_index: u32, attempt: u32) -> TaskAttemptId {
    TaskAttemptId::new(test_task_id(task_index), attempt)
}

pub fn test_container_id(id: u64) -> ContainerId {
    ContainerId::new(test_app_id(), id)
}

/// A minimal container request for one attempt.
pub fn test_request(attempt_id: TaskAttemptId) -> ContainerRequest {
    ContainerRequest {
        attempt_id,
        priority: 2,
        resource: Resource::default(),
        task_spec: TaskSpec {
            attempt_id,
            vertex_name: "v1".to_string(),
            processor: EntityDescriptor::new("proc"),
            inputs: vec![],
            outputs: vec![],
        },
        local_resources: HashMap::new(),
        credentials: None,
        blacklisted_nodes: vec![],
    }
}

/// A single-vertex DAG plan with the given parallelism.
pub fn test_dag_plan(parallelism: u32, commits_output: bool) -> DagPlan {
    DagPlan::new("single").add_vertex(
        VertexPlan::new("v1", EntityDescriptor::new("proc"))
            .with_parallelism(parallelism)
            .with_commits_output(commits_output),
    )
}

/// `Subject::Kind` labels of a batch of events, for compact assertions.
pub fn event_types(events: &[AmEvent]) -> Vec<String> {
    events.iter().map(|e| e.qualified_type()).collect()
}

/// Records listener registrations so tests can verify them.
#[derive(Default)]
pub struct MockListenerRegistry {
    calls: Mutex<Vec<(String, String)>>,
}

impl MockListenerRegistry {
    fn record(&self, op: &str, id: String) {
        self.calls.lock().push((op.to_string(), id));
    }

    fn has(&self, op: &str, id: String) -> bool {
        self.calls
            .lock()
            .iter()
            .any(|(o, i)| o == op && *i == id)
    }

    pub fn container_registered(&self, container_id: ContainerId) -> bool {
        self.has("register_container", container_id.to_string())
    }

    pub fn container_unregistered(&self, container_id: ContainerId) -> bool {
        self.has("unregister_container", container_id.to_string())
    }

    pub fn attempt_unregistered(&self, attempt_id: TaskAttemptId) -> bool {
        self.has("unregister_attempt", attempt_id.to_string())
    }
}

impl ContainerListenerRegistry for MockListenerRegistry {
    fn register_container(&self, container_id: ContainerId) -> Result<()> {
        self.record("register_container", container_id.to_string());
        Ok(())
    }

    fn unregister_container(&self, container_id: ContainerId) {
        self.record("unregister_container", container_id.to_string());
    }

    fn register_attempt(
        &self,
        attempt_id: TaskAttemptId,
        _container_id: ContainerId,
    ) -> Result<()> {
        self.record("register_attempt", attempt_id.to_string());
        Ok(())
    }

    fn unregister_attempt(&self, attempt_id: TaskAttemptId) {
        self.record("unregister_attempt", attempt_id.to_string());
    }
}

/// Records heartbeat registrations.
#[derive(Default)]
pub struct MockHeartbeatKeeper {
    calls: Mutex<Vec<(String, ContainerId)>>,
}

impl MockHeartbeatKeeper {
    pub fn registered(&self, container_id: ContainerId) -> bool {
        self.calls
            .lock()
            .iter()
            .any(|(op, id)| op == "register" && *id == container_id)
    }

    pub fn unregistered(&self, container_id: ContainerId) -> bool {
        self.calls
            .lock()
            .iter()
            .any(|(op, id)| op == "unregister" && *id == container_id)
    }
}

impl ContainerHeartbeatKeeper for MockHeartbeatKeeper {
    fn register(&self, container_id: ContainerId) {
        self.calls.lock().push(("register".to_string(), container_id));
    }

    fn unregister(&self, container_id: ContainerId) {
        self.calls
            .lock()
            .push(("unregister".to_string(), container_id));
    }
}

/// Records container asks and releases without talking to any cluster.
#[derive(Default)]
pub struct MockResourceManager {
    asks: Mutex<Vec<ContainerAsk>>,
    releases: Mutex<Vec<ContainerId>>,
}

impl MockResourceManager {
    pub fn asks(&self) -> Vec<ContainerAsk> {
        self.asks.lock().clone()
    }

    pub fn released(&self) -> Vec<ContainerId> {
        self.releases.lock().clone()
    }
}

#[async_trait]
impl ResourceManagerClient for MockResourceManager {
    async fn request_containers(&self, asks: Vec<ContainerAsk>) -> Result<()> {
        self.asks.lock().extend(asks);
        Ok(())
    }

    async fn release_container(&self, container_id: ContainerId) -> Result<()> {
        self.releases.lock().push(container_id);
        Ok(())
    }
}

/// Records launch and stop requests; everything succeeds.
#[derive(Default)]
pub struct MockLauncher {
    launches: Mutex<Vec<ContainerId>>,
    stops: Mutex<Vec<ContainerId>>,
}

impl MockLauncher {
    pub fn launched(&self) -> Vec<ContainerId> {
        self.launches.lock().clone()
    }

    pub fn stopped(&self) -> Vec<ContainerId> {
        self.stops.lock().clone()
    }
}

#[async_trait]
impl ContainerLauncher for MockLauncher {
    async fn start_container(
        &self,
        container_id: ContainerId,
        _node: NodeId,
        _context: ContainerLaunchContext,
    ) -> Result<()> {
        self.launches.lock().push(container_id);
        Ok(())
    }

    async fn stop_container(&self, container_id: ContainerId, _node: NodeId) -> Result<()> {
        self.stops.lock().push(container_id);
        Ok(())
    }
}

/// Drives one container state machine and captures its outgoing events,
/// mirroring how the container tests exercise every transition.
pub struct WrappedContainer {
    pub container_id: ContainerId,
    pub node: NodeId,
    pub attempt_id: TaskAttemptId,
    pub listener: Arc<MockListenerRegistry>,
    pub heartbeat: Arc<MockHeartbeatKeeper>,
    pub container: AmContainer,
}

impl WrappedContainer {
    pub fn new() -> Self {
        Self::build(None)
    }

    pub fn with_profiling(opts: &str) -> Self {
        Self::build(Some(opts.to_string()))
    }

    fn build(profile_opts: Option<String>) -> Self {
        let container_id = test_container_id(1);
        let node = NodeId::new("host", 12500);
        let listener = Arc::new(MockListenerRegistry::default());
        let heartbeat = Arc::new(MockHeartbeatKeeper::default());
        let container = AmContainer::new(
            container_id,
            node.clone(),
            Resource::new(1024, 1),
            "arbalest-worker".to_string(),
            profile_opts,
            listener.clone(),
            heartbeat.clone(),
        );
        Self {
            container_id,
            node,
            attempt_id: Self::attempt_for_dag(1, 1),
            listener,
            heartbeat,
            container,
        }
    }

    fn attempt_for_dag(dag: u32, attempt: u32) -> TaskAttemptId {
        let dag_id = DagId::new(test_app_id(), dag);
        let task_id = TaskId::new(VertexId::new(dag_id, 1), 1);
        TaskAttemptId::new(task_id, attempt)
    }

    /// An attempt of the wrapped task with the given number.
    pub fn attempt(&self, attempt: u32) -> TaskAttemptId {
        TaskAttemptId::new(self.attempt_id.task_id, attempt)
    }

    /// An attempt under a different DAG, for credential-transfer flows.
    pub fn attempt_in_dag(&self, dag: u32, attempt: u32) -> TaskAttemptId {
        Self::attempt_for_dag(dag, attempt)
    }

    fn spec_for(attempt_id: TaskAttemptId) -> TaskSpec {
        TaskSpec {
            attempt_id,
            vertex_name: "v1".to_string(),
            processor: EntityDescriptor::new("proc"),
            inputs: vec![],
            outputs: vec![],
        }
    }

    pub fn state(&self) -> ContainerState {
        self.container.state()
    }

    pub fn is_in_error_state(&self) -> bool {
        self.container.is_in_error_state()
    }

    pub fn queued_attempt(&self) -> Option<TaskAttemptId> {
        self.container.queued_attempt()
    }

    pub fn running_attempt(&self) -> Option<TaskAttemptId> {
        self.container.running_attempt()
    }

    pub fn all_attempts(&self) -> &[TaskAttemptId] {
        self.container.all_attempts()
    }

    pub fn launch(&mut self) -> Vec<AmEvent> {
        self.launch_with(HashMap::new(), None)
    }

    pub fn launch_with(
        &mut self,
        local_resources: HashMap<String, LocalResource>,
        credentials: Option<Credentials>,
    ) -> Vec<AmEvent> {
        self.container
            .handle(ContainerEvent::LaunchRequest {
                local_resources,
                credentials,
            })
            .unwrap()
    }

    pub fn assign(&mut self, attempt_id: TaskAttemptId) -> Vec<AmEvent> {
        self.assign_with(attempt_id, HashMap::new(), None)
    }

    pub fn assign_with(
        &mut self,
        attempt_id: TaskAttemptId,
        additional_resources: HashMap<String, LocalResource>,
        credentials: Option<Credentials>,
    ) -> Vec<AmEvent> {
        self.container
            .handle(ContainerEvent::AssignTask {
                attempt_id,
                task_spec: Self::spec_for(attempt_id),
                additional_resources,
                credentials,
            })
            .unwrap()
    }

    pub fn launched(&mut self) -> Vec<AmEvent> {
        self.container.handle(ContainerEvent::Launched).unwrap()
    }

    pub fn launch_failed(&mut self) -> Vec<AmEvent> {
        self.container
            .handle(ContainerEvent::LaunchFailed {
                diagnostics: "launchFailed".to_string(),
            })
            .unwrap()
    }

    pub fn pull(&mut self) -> ContainerTask {
        self.container.pull_task_context()
    }

    pub fn attempt_succeeded(&mut self, attempt_id: TaskAttemptId) -> Vec<AmEvent> {
        self.container
            .handle(ContainerEvent::TaskAttemptSucceeded { attempt_id })
            .unwrap()
    }

    pub fn stop_request(&mut self) -> Vec<AmEvent> {
        self.container.handle(ContainerEvent::StopRequest).unwrap()
    }

    pub fn nm_stop_sent(&mut self) -> Vec<AmEvent> {
        self.container.handle(ContainerEvent::NmStopSent).unwrap()
    }

    pub fn nm_stop_failed(&mut self) -> Vec<AmEvent> {
        self.container.handle(ContainerEvent::NmStopFailed).unwrap()
    }

    pub fn timed_out(&mut self) -> Vec<AmEvent> {
        self.container.handle(ContainerEvent::TimedOut).unwrap()
    }

    pub fn node_failed(&mut self) -> Vec<AmEvent> {
        self.container
            .handle(ContainerEvent::NodeFailed {
                diagnostics: "node failed".to_string(),
            })
            .unwrap()
    }

    pub fn completed(&mut self, preempted: bool) -> Vec<AmEvent> {
        self.container
            .handle(ContainerEvent::Completed {
                exit_status: if preempted { -100 } else { 0 },
                diagnostics: String::new(),
                preempted,
            })
            .unwrap()
    }
}
