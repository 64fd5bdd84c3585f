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

//! The task-attempt listener: the gRPC service workers talk to.
//!
//! Three operations, all idempotent with respect to retried RPCs: task pull,
//! commit arbitration and the event-carrying heartbeat. The listener keeps
//! two maps: container → `ContainerInfo` and attempt → container. Sequence
//! validation and response caching happen under the container's monitor so
//! replays return byte-identical responses.

use std::sync::Arc;

use dashmap::DashMap;
use log::{debug, info, warn};
use parking_lot::Mutex;
use tonic::{Request, Response, Status};

use arbalest_core::error::{ArbalestError, Result};
use arbalest_core::events::WorkerEvent;
use arbalest_core::ids::{ContainerId, TaskAttemptId};
use arbalest_core::plan::ContainerTask;
use arbalest_core::serde::protobuf;
use arbalest_core::serde::protobuf::task_communicator_server::TaskCommunicator;

use crate::dispatcher::AmEvent;
use crate::state::container::ContainerListenerRegistry;
use crate::state::task_attempt::AttemptEvent;
use crate::state::vertex::VertexEvent;
use crate::state::AmState;

/// Per-container RPC bookkeeping.
pub struct ContainerInfo {
    last_request_id: i64,
    last_response: Option<protobuf::HeartbeatResult>,
    current_attempt: Option<TaskAttemptId>,
}

impl ContainerInfo {
    fn new() -> Self {
        Self {
            last_request_id: 0,
            last_response: None,
            current_attempt: None,
        }
    }
}

/// The listener's registration tables. Lookups are lock-free; updates happen
/// under the per-container monitor.
pub struct ListenerTables {
    registered: DashMap<ContainerId, Arc<Mutex<ContainerInfo>>>,
    attempt_to_container: DashMap<TaskAttemptId, ContainerId>,
}

impl Default for ListenerTables {
    fn default() -> Self {
        Self::new()
    }
}

impl ListenerTables {
    pub fn new() -> Self {
        Self {
            registered: DashMap::new(),
            attempt_to_container: DashMap::new(),
        }
    }

    pub fn is_registered(&self, container_id: ContainerId) -> bool {
        self.registered.contains_key(&container_id)
    }

    pub fn container_of(&self, attempt_id: TaskAttemptId) -> Option<ContainerId> {
        self.attempt_to_container.get(&attempt_id).map(|c| *c)
    }

    fn info(&self, container_id: ContainerId) -> Option<Arc<Mutex<ContainerInfo>>> {
        self.registered.get(&container_id).map(|info| info.clone())
    }
}

impl ContainerListenerRegistry for ListenerTables {
    fn register_container(&self, container_id: ContainerId) -> Result<()> {
        debug!("Container {container_id} registered with the task listener");
        let previous = self
            .registered
            .insert(container_id, Arc::new(Mutex::new(ContainerInfo::new())));
        if previous.is_some() {
            return Err(ArbalestError::Internal(format!(
                "multiple registrations for container {container_id}"
            )));
        }
        Ok(())
    }

    fn unregister_container(&self, container_id: ContainerId) {
        debug!("Container {container_id} unregistered from the task listener");
        self.registered.remove(&container_id);
    }

    fn register_attempt(
        &self,
        attempt_id: TaskAttemptId,
        container_id: ContainerId,
    ) -> Result<()> {
        let info = self.info(container_id).ok_or_else(|| {
            ArbalestError::Internal(format!(
                "registering attempt {attempt_id} to unknown container {container_id}"
            ))
        })?;
        let mut info = info.lock();
        if let Some(current) = info.current_attempt {
            return Err(ArbalestError::Internal(format!(
                "registering attempt {attempt_id} to container {container_id} with existing assignment to {current}"
            )));
        }
        info.current_attempt = Some(attempt_id);
        if let Some(previous) = self.attempt_to_container.insert(attempt_id, container_id)
        {
            return Err(ArbalestError::Internal(format!(
                "registering attempt {attempt_id} to container {container_id} when already assigned to {previous}"
            )));
        }
        Ok(())
    }

    fn unregister_attempt(&self, attempt_id: TaskAttemptId) {
        let Some(container_id) = self.container_of(attempt_id) else {
            warn!("Unregistering attempt {attempt_id} from unknown container");
            return;
        };
        let Some(info) = self.info(container_id) else {
            warn!(
                "Unregistering attempt {attempt_id} from non-registered container {container_id}"
            );
            return;
        };
        let mut info = info.lock();
        info.current_attempt = None;
        self.attempt_to_container.remove(&attempt_id);
    }
}

/// The gRPC service implementation.
pub struct TaskCommunicatorService {
    state: Arc<AmState>,
}

impl TaskCommunicatorService {
    pub fn new(state: Arc<AmState>) -> Self {
        Self { state }
    }

    fn ping_container(&self, container_id: ContainerId) {
        self.state.container_monitor.ping(&container_id);
    }

    fn ping_attempt(&self, attempt_id: TaskAttemptId) {
        self.state.attempt_monitor.ping(&attempt_id);
        if let Some(container_id) = self.state.tables.container_of(attempt_id) {
            self.ping_container(container_id);
        } else {
            warn!("Communication from attempt {attempt_id} with no known container");
        }
    }
}

fn invalid_worker_response() -> Response<protobuf::ContainerTask> {
    Response::new(ContainerTask::for_invalid_worker().into())
}

#[tonic::async_trait]
impl TaskCommunicator for TaskCommunicatorService {
    async fn get_task(
        &self,
        request: Request<protobuf::GetTaskParams>,
    ) -> std::result::Result<Response<protobuf::ContainerTask>, Status> {
        let params = request.into_inner();
        let Some(container_id) = params.container_id else {
            info!("Invalid task request with an empty container id");
            return Ok(invalid_worker_response());
        };
        let container_id: ContainerId = container_id
            .try_into()
            .map_err(|e: ArbalestError| Status::invalid_argument(e.to_string()))?;
        debug!("Container {container_id} asked for a task");

        if !self.state.tables.is_registered(container_id) {
            if self.state.containers.get(container_id).is_none() {
                info!("Container {container_id} is invalid and will be killed");
            } else {
                info!(
                    "Container {container_id} is valid, but no longer registered, and will be killed"
                );
            }
            return Ok(invalid_worker_response());
        }

        self.ping_container(container_id);

        let Some(container) = self.state.containers.get(container_id) else {
            return Ok(invalid_worker_response());
        };
        let task = container.lock().pull_task_context();

        if let Some(spec) = &task.task {
            let attempt_id = spec.attempt_id;
            self.state
                .tables
                .register_attempt(attempt_id, container_id)
                .map_err(|e| Status::internal(e.to_string()))?;
            self.state.attempt_monitor.register(attempt_id);
            self.state
                .post_event(AmEvent::Attempt {
                    attempt_id,
                    event: AttemptEvent::StartedRemotely,
                })
                .map_err(|e| Status::internal(e.to_string()))?;
            info!("Container {container_id} given task {attempt_id}");
        } else if task.should_die {
            info!("No more tasks for container {container_id}. Asking it to die");
        }

        Ok(Response::new(task.into()))
    }

    async fn can_commit(
        &self,
        request: Request<protobuf::CanCommitParams>,
    ) -> std::result::Result<Response<protobuf::CanCommitResult>, Status> {
        let params = request.into_inner();
        let attempt_id: TaskAttemptId = params
            .attempt_id
            .ok_or_else(|| Status::invalid_argument("missing attempt id"))?
            .try_into()
            .map_err(|e: ArbalestError| Status::invalid_argument(e.to_string()))?;
        info!("Commit go/no-go request from {attempt_id}");

        self.ping_attempt(attempt_id);

        // The decision belongs to the task managing the attempts.
        let can_commit = {
            let mut guard = self.state.dag.write();
            let dag = guard
                .as_mut()
                .ok_or_else(|| Status::failed_precondition("no DAG is running"))?;
            dag.can_commit(attempt_id)
                .map_err(|e| Status::internal(e.to_string()))?
        };
        Ok(Response::new(protobuf::CanCommitResult { can_commit }))
    }

    async fn heartbeat(
        &self,
        request: Request<protobuf::HeartbeatParams>,
    ) -> std::result::Result<Response<protobuf::HeartbeatResult>, Status> {
        let params = request.into_inner();
        let request_id = params.request_id;
        let container_id: ContainerId = params
            .container_id
            .ok_or_else(|| Status::invalid_argument("missing container id"))?
            .try_into()
            .map_err(|e: ArbalestError| Status::invalid_argument(e.to_string()))?;
        debug!("Received heartbeat {request_id} from container {container_id}");

        let Some(info) = self.state.tables.info(container_id) else {
            return Ok(Response::new(protobuf::HeartbeatResult {
                last_request_id: request_id,
                events: vec![],
                should_die: true,
            }));
        };

        let mut info = info.lock();
        self.ping_container(container_id);

        if info.last_request_id == request_id {
            warn!("Old request id received: {request_id}, re-sending the last response");
            return match &info.last_response {
                Some(response) => Ok(Response::new(response.clone())),
                None => Err(Status::failed_precondition(format!(
                    "no cached response for replayed request {request_id}"
                ))),
            };
        }

        let mut response = protobuf::HeartbeatResult {
            last_request_id: request_id,
            events: vec![],
            should_die: false,
        };

        if let Some(attempt_id) = params.current_attempt_id {
            let attempt_id: TaskAttemptId = attempt_id
                .try_into()
                .map_err(|e: ArbalestError| Status::invalid_argument(e.to_string()))?;

            match self.state.tables.container_of(attempt_id) {
                Some(registered) if registered == container_id => {}
                _ => {
                    return Err(Status::failed_precondition(format!(
                        "attempt {attempt_id} is not recognized for heartbeat"
                    )));
                }
            }
            if info.last_request_id + 1 != request_id {
                return Err(Status::failed_precondition(format!(
                    "container {} has invalid request id. Expected: {} and actual: {}",
                    container_id,
                    info.last_request_id + 1,
                    request_id
                )));
            }

            let inbound: Vec<WorkerEvent> = params
                .events
                .into_iter()
                .map(|e| e.try_into())
                .collect::<Result<Vec<_>>>()
                .map_err(|e| Status::invalid_argument(e.to_string()))?;
            debug!("Heartbeat from {attempt_id} with {} events", inbound.len());
            if !inbound.is_empty() {
                self.state
                    .post_event(AmEvent::Vertex {
                        vertex_id: attempt_id.vertex_id(),
                        event: VertexEvent::RouteEvent {
                            producer: attempt_id,
                            events: inbound,
                        },
                    })
                    .map_err(|e| Status::internal(e.to_string()))?;
            }
            self.state.attempt_monitor.ping(&attempt_id);

            let outbound = {
                let mut guard = self.state.dag.write();
                let dag = guard
                    .as_mut()
                    .ok_or_else(|| Status::failed_precondition("no DAG is running"))?;
                dag.get_task_attempt_events(
                    attempt_id,
                    params.events_start_index as usize,
                    params.max_events as usize,
                )
                .map_err(|e| Status::internal(e.to_string()))?
            };
            response.events = outbound.into_iter().map(|e| e.into()).collect();
        }

        info.last_request_id = request_id;
        info.last_response = Some(response.clone());
        Ok(Response::new(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::dag::{Dag, DagEvent};
    use crate::test_utils::{test_dag_plan, MockLauncher, MockResourceManager};
    use arbalest_core::config::AmConfig;
    use arbalest_core::events::{InputFailedEvent, TaskStatusUpdateEvent};
    use arbalest_core::ids::ApplicationId;
    use arbalest_core::plan::Resource;

    fn service() -> TaskCommunicatorService {
        let state = AmState::new(
            AmConfig::default(),
            ApplicationId::new(1710000000, 1),
            Arc::new(MockResourceManager::default()),
            Arc::new(MockLauncher::default()),
        );
        // A stand-in event sink; these tests do not run the dispatcher.
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        std::mem::forget(rx);
        state.set_event_sender(arbalest_core::event_loop::EventSender::new(tx));
        TaskCommunicatorService::new(state)
    }

    /// A service with a registered container carrying one queued attempt.
    fn service_with_queued_task() -> (TaskCommunicatorService, ContainerId, TaskAttemptId)
    {
        let service = service();
        let state = service.state.clone();

        // Install a single-vertex DAG and walk it to the point where the
        // attempt exists.
        let plan = test_dag_plan(1, true);
        let dag_id = arbalest_core::ids::DagId::new(state.app_id, 1);
        let mut dag = Dag::from_plan(dag_id, &plan, &state.config).unwrap();
        let start_events = dag.handle_dag_event(DagEvent::Start).unwrap();
        let mut pending = start_events;
        while let Some(event) = pending.pop() {
            match event {
                AmEvent::Task { task_id, event } => {
                    pending.extend(dag.handle_task_event(task_id, event).unwrap());
                }
                AmEvent::Dag(event) => {
                    pending.extend(dag.handle_dag_event(event).unwrap());
                }
                AmEvent::Attempt { attempt_id, event } => {
                    pending.extend(dag.handle_attempt_event(attempt_id, event).unwrap());
                }
                AmEvent::Scheduler(_) => {}
                other => panic!("unexpected event during setup: {other:?}"),
            }
        }
        let attempt_id = {
            let vertex = dag.vertices().next().unwrap();
            TaskAttemptId::new(vertex.task(0).unwrap().task_id(), 0)
        };
        *state.dag.write() = Some(dag);

        // Container granted, launched, task assigned.
        let container_id = ContainerId::new(state.app_id, 1);
        state.containers.add_container_if_new(
            container_id,
            arbalest_core::ids::NodeId::new("host", 12500),
            Resource::default(),
        );
        let container = state.containers.get(container_id).unwrap();
        {
            let mut container = container.lock();
            let spec = state
                .dag
                .read()
                .as_ref()
                .unwrap()
                .vertices()
                .next()
                .unwrap()
                .task_spec(attempt_id);
            container
                .handle(crate::state::container::ContainerEvent::LaunchRequest {
                    local_resources: Default::default(),
                    credentials: None,
                })
                .unwrap();
            container
                .handle(crate::state::container::ContainerEvent::Launched)
                .unwrap();
            container
                .handle(crate::state::container::ContainerEvent::AssignTask {
                    attempt_id,
                    task_spec: spec,
                    additional_resources: Default::default(),
                    credentials: None,
                })
                .unwrap();
        }
        (service, container_id, attempt_id)
    }

    fn heartbeat_params(
        container_id: ContainerId,
        request_id: i64,
        attempt: Option<TaskAttemptId>,
    ) -> protobuf::HeartbeatParams {
        protobuf::HeartbeatParams {
            container_id: Some(container_id.into()),
            request_id,
            current_attempt_id: attempt.map(|a| a.into()),
            events: vec![],
            events_start_index: 0,
            max_events: 100,
        }
    }

    #[tokio::test]
    async fn test_get_task_for_unknown_container_kills_worker() {
        let service = service();
        let params = protobuf::GetTaskParams {
            container_id: Some(ContainerId::new(service.state.app_id, 42).into()),
            pid: 1,
            hostname: "host".to_string(),
        };
        let response = service
            .get_task(Request::new(params))
            .await
            .unwrap()
            .into_inner();
        assert!(response.should_die);
    }

    #[tokio::test]
    async fn test_get_task_returns_queued_task_and_registers_attempt() {
        let (service, container_id, attempt_id) = service_with_queued_task();
        let params = protobuf::GetTaskParams {
            container_id: Some(container_id.into()),
            pid: 1,
            hostname: "host".to_string(),
        };
        let response = service
            .get_task(Request::new(params))
            .await
            .unwrap()
            .into_inner();
        assert!(!response.should_die);
        let spec = response.task_spec.unwrap();
        let shipped: TaskAttemptId = spec.attempt_id.unwrap().try_into().unwrap();
        assert_eq!(shipped, attempt_id);
        assert_eq!(
            service.state.tables.container_of(attempt_id),
            Some(container_id)
        );

        // A second pull finds nothing queued; the worker retries.
        let response = service
            .get_task(Request::new(protobuf::GetTaskParams {
                container_id: Some(container_id.into()),
                pid: 1,
                hostname: "host".to_string(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(!response.should_die);
        assert!(response.task_spec.is_none());
    }

    #[tokio::test]
    async fn test_heartbeat_unknown_container_should_die() {
        let service = service();
        let response = service
            .heartbeat(Request::new(heartbeat_params(
                ContainerId::new(service.state.app_id, 7),
                1,
                None,
            )))
            .await
            .unwrap()
            .into_inner();
        assert!(response.should_die);
    }

    #[tokio::test]
    async fn test_heartbeat_liveness_ping_and_idempotent_replay() {
        let (service, container_id, _attempt_id) = service_with_queued_task();

        // Liveness ping: no attempt, no events pulled.
        let first = service
            .heartbeat(Request::new(heartbeat_params(container_id, 1, None)))
            .await
            .unwrap()
            .into_inner();
        assert!(!first.should_die);
        assert!(first.events.is_empty());
        assert_eq!(first.last_request_id, 1);

        // Replaying the same request id returns the identical response.
        let replay = service
            .heartbeat(Request::new(heartbeat_params(container_id, 1, None)))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(replay, first);
    }

    #[tokio::test]
    async fn test_heartbeat_sequence_error() {
        let (service, container_id, attempt_id) = service_with_queued_task();
        // Pull the task so the attempt is registered with the listener.
        let _ = service
            .get_task(Request::new(protobuf::GetTaskParams {
                container_id: Some(container_id.into()),
                pid: 1,
                hostname: "host".to_string(),
            }))
            .await;

        // request_id jumps from 0 to 5 with a current attempt: rejected.
        let result = service
            .heartbeat(Request::new(heartbeat_params(
                container_id,
                5,
                Some(attempt_id),
            )))
            .await;
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().code(), tonic::Code::FailedPrecondition);
    }

    #[tokio::test]
    async fn test_heartbeat_unrecognized_attempt_rejected() {
        let (service, container_id, attempt_id) = service_with_queued_task();
        // The attempt never pulled its task, so it is not registered.
        let result = service
            .heartbeat(Request::new(heartbeat_params(
                container_id,
                1,
                Some(attempt_id),
            )))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_heartbeat_serves_queued_task_events() {
        let (service, container_id, attempt_id) = service_with_queued_task();
        let _ = service
            .get_task(Request::new(protobuf::GetTaskParams {
                container_id: Some(container_id.into()),
                pid: 1,
                hostname: "host".to_string(),
            }))
            .await;

        // Queue two events for the attempt's task.
        {
            let mut guard = service.state.dag.write();
            let dag = guard.as_mut().unwrap();
            let vertex_id = attempt_id.vertex_id();
            let vertex = dag.vertex_mut(vertex_id).unwrap();
            let task = vertex.task_mut(attempt_id.task_id.id).unwrap();
            for i in 0..2 {
                task.queue_event(WorkerEvent::InputFailed(InputFailedEvent {
                    source_index: i,
                    target_index: 0,
                    version: 0,
                }));
            }
        }

        let response = service
            .heartbeat(Request::new(heartbeat_params(
                container_id,
                1,
                Some(attempt_id),
            )))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(response.events.len(), 2);

        // The next heartbeat pages past what was already delivered.
        let mut params = heartbeat_params(container_id, 2, Some(attempt_id));
        params.events_start_index = 2;
        let response = service
            .heartbeat(Request::new(params))
            .await
            .unwrap()
            .into_inner();
        assert!(response.events.is_empty());
    }

    #[tokio::test]
    async fn test_can_commit_exactly_one_winner() {
        let (service, container_id, attempt_id) = service_with_queued_task();
        let _ = service
            .get_task(Request::new(protobuf::GetTaskParams {
                container_id: Some(container_id.into()),
                pid: 1,
                hostname: "host".to_string(),
            }))
            .await;

        let ask = |attempt: TaskAttemptId| {
            let service = &service;
            async move {
                service
                    .can_commit(Request::new(protobuf::CanCommitParams {
                        attempt_id: Some(attempt.into()),
                    }))
                    .await
                    .unwrap()
                    .into_inner()
                    .can_commit
            }
        };

        let rival = TaskAttemptId::new(attempt_id.task_id, 1);
        assert!(ask(attempt_id).await);
        assert!(!ask(rival).await);
        // The winner's retry still succeeds.
        assert!(ask(attempt_id).await);
    }

    #[tokio::test]
    async fn test_status_update_is_a_worker_event() {
        // Covers the wire conversion for progress reports.
        let event = WorkerEvent::TaskStatusUpdate(TaskStatusUpdateEvent {
            progress: 0.25,
            counters: None,
        });
        let proto: protobuf::WorkerEventProto = event.clone().into();
        let back: WorkerEvent = proto.try_into().unwrap();
        assert_eq!(back, event);
    }
}
