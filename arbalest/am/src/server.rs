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

//! Application master assembly: the dispatcher loop, the heartbeat sweeper
//! and the worker-facing gRPC service.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use log::info;
use tokio_stream::wrappers::TcpListenerStream;

use arbalest_core::config::AmConfig;
use arbalest_core::error::{ArbalestError, Result};
use arbalest_core::event_loop::{EventLoop, EventSender};
use arbalest_core::ids::{ApplicationId, DagId};
use arbalest_core::plan::DagPlan;
use arbalest_core::serde::protobuf::task_communicator_server::TaskCommunicatorServer;

use crate::dispatcher::{AmEvent, Dispatcher};
use crate::heartbeat::start_heartbeat_sweeper;
use crate::launcher::ContainerLauncher;
use crate::listener::TaskCommunicatorService;
use crate::rm::ResourceManagerClient;
use crate::state::dag::{Dag, DagState};
use crate::state::AmState;

/// The running application master.
pub struct AmServer {
    state: Arc<AmState>,
    event_loop: EventLoop<AmEvent>,
    next_dag_id: AtomicU32,
}

impl AmServer {
    pub fn new(
        config: AmConfig,
        app_id: ApplicationId,
        rm: Arc<dyn ResourceManagerClient>,
        launcher: Arc<dyn ContainerLauncher>,
    ) -> Self {
        let state = AmState::new(config, app_id, rm, launcher);
        let dispatcher = Arc::new(Dispatcher::new(state.clone()));
        let event_loop = EventLoop::new("am-dispatcher".to_string(), dispatcher);
        Self {
            state,
            event_loop,
            next_dag_id: AtomicU32::new(1),
        }
    }

    pub fn state(&self) -> Arc<AmState> {
        self.state.clone()
    }

    /// Starts the dispatcher loop and the heartbeat sweeper. Returns the
    /// event sender so external resource manager integrations can wire their
    /// callbacks in.
    pub fn start(&mut self) -> Result<EventSender<AmEvent>> {
        self.event_loop.start()?;
        let sender = self.event_loop.get_sender()?;
        self.state.set_event_sender(sender.clone());
        start_heartbeat_sweeper(
            &self.state.config,
            self.state.container_monitor.clone(),
            self.state.attempt_monitor.clone(),
            sender.clone(),
        );
        Ok(sender)
    }

    pub fn stop(&self) {
        self.event_loop.stop();
    }

    /// Validates and installs a DAG, then kicks it off. One DAG runs at a
    /// time; a new submission is accepted once the previous one is terminal.
    pub fn submit_dag(&self, plan: DagPlan) -> Result<DagId> {
        let dag_id = DagId::new(
            self.state.app_id,
            self.next_dag_id.fetch_add(1, Ordering::SeqCst),
        );
        let dag = Dag::from_plan(dag_id, &plan, &self.state.config)?;
        info!("Submitting DAG {} as {dag_id}", plan.name);
        self.state.install_dag(dag)?;
        self.state.post_event(AmEvent::Dag(crate::state::dag::DagEvent::Start))?;
        Ok(dag_id)
    }

    /// Waits for the current DAG to reach a terminal state.
    pub async fn await_dag_completion(&self) -> Result<DagState> {
        let mut status = self.state.subscribe_dag_status();
        loop {
            if let Some(state) = *status.borrow() {
                return Ok(state);
            }
            status.changed().await.map_err(|_| {
                ArbalestError::General("the application master shut down".to_string())
            })?;
        }
    }

    /// Binds the worker-facing gRPC service and serves it in the background.
    pub async fn serve_listener(
        &self,
    ) -> Result<(std::net::SocketAddr, tokio::task::JoinHandle<()>)> {
        let listener =
            tokio::net::TcpListener::bind(self.state.config.listener_address()).await?;
        let addr = listener.local_addr()?;
        info!("Task listener bound to {addr}");
        let service = TaskCommunicatorService::new(self.state.clone());
        let concurrency = self.state.config.task_listener_threads;
        let handle = tokio::spawn(async move {
            let result = tonic::transport::Server::builder()
                .concurrency_limit_per_connection(concurrency)
                .add_service(TaskCommunicatorServer::new(service))
                .serve_with_incoming(TcpListenerStream::new(listener))
                .await;
            if let Err(e) = result {
                log::error!("Task listener terminated: {e}");
            }
        });
        Ok((addr, handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launcher::StandaloneLauncher;
    use crate::standalone::StandaloneResourceManager;
    use crate::test_utils::test_dag_plan;
    use arbalest_core::events::{
        TaskAttemptCompletedEvent, TaskAttemptFailedEvent, TaskStatusUpdateEvent,
        WorkerEvent,
    };
    use arbalest_core::ids::{ContainerId, NodeId, TaskAttemptId};
    use arbalest_core::plan::TaskSpec;
    use arbalest_core::serde::protobuf;
    use arbalest_core::serde::protobuf::task_communicator_server::TaskCommunicator;
    use std::time::Duration;
    use tonic::Request;

    struct TestAm {
        server: AmServer,
        service: TaskCommunicatorService,
    }

    fn start_standalone_am() -> TestAm {
        let app_id = arbalest_core::ids::ApplicationId::new(1710000000, 1);
        let rm = Arc::new(StandaloneResourceManager::new(
            app_id,
            NodeId::new("localhost", 12500),
        ));
        let mut server = AmServer::new(
            AmConfig::default(),
            app_id,
            rm.clone(),
            Arc::new(StandaloneLauncher),
        );
        let sender = server.start().unwrap();
        rm.set_event_sender(sender);
        let service = TaskCommunicatorService::new(server.state());
        TestAm { server, service }
    }

    /// Polls the standalone container pool until some container hands out a
    /// task.
    async fn poll_for_task(am: &TestAm) -> (ContainerId, TaskSpec) {
        let app_id = am.server.state().app_id;
        for _ in 0..500 {
            for id in 1..=8u64 {
                let container_id = ContainerId::new(app_id, id);
                let response = am
                    .service
                    .get_task(Request::new(protobuf::GetTaskParams {
                        container_id: Some(container_id.into()),
                        pid: 7,
                        hostname: "localhost".to_string(),
                    }))
                    .await
                    .unwrap()
                    .into_inner();
                if let Some(spec) = response.task_spec {
                    return (container_id, spec.try_into().unwrap());
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("no task was handed out");
    }

    async fn heartbeat(
        am: &TestAm,
        container_id: ContainerId,
        request_id: i64,
        attempt_id: TaskAttemptId,
        events: Vec<WorkerEvent>,
    ) -> protobuf::HeartbeatResult {
        am.service
            .heartbeat(Request::new(protobuf::HeartbeatParams {
                container_id: Some(container_id.into()),
                request_id,
                current_attempt_id: Some(attempt_id.into()),
                events: events.into_iter().map(|e| e.into()).collect(),
                events_start_index: 0,
                max_events: 100,
            }))
            .await
            .unwrap()
            .into_inner()
    }

    async fn can_commit(am: &TestAm, attempt_id: TaskAttemptId) -> bool {
        am.service
            .can_commit(Request::new(protobuf::CanCommitParams {
                attempt_id: Some(attempt_id.into()),
            }))
            .await
            .unwrap()
            .into_inner()
            .can_commit
    }

    #[tokio::test]
    async fn test_happy_single_task_flow() {
        let am = start_standalone_am();
        am.server.submit_dag(test_dag_plan(1, true)).unwrap();

        // The worker appears, pulls its task and heartbeats progress.
        let (container_id, spec) = poll_for_task(&am).await;
        let attempt_id = spec.attempt_id;
        assert_eq!(attempt_id.id, 0);

        let response = heartbeat(
            &am,
            container_id,
            1,
            attempt_id,
            vec![WorkerEvent::TaskStatusUpdate(TaskStatusUpdateEvent {
                progress: 0.5,
                counters: None,
            })],
        )
        .await;
        assert!(!response.should_die);
        assert_eq!(response.last_request_id, 1);

        // Commit arbitration, then the success report.
        assert!(can_commit(&am, attempt_id).await);
        heartbeat(
            &am,
            container_id,
            2,
            attempt_id,
            vec![WorkerEvent::TaskAttemptCompleted(TaskAttemptCompletedEvent {})],
        )
        .await;

        let status = tokio::time::timeout(
            Duration::from_secs(5),
            am.server.await_dag_completion(),
        )
        .await
        .expect("DAG did not finish")
        .unwrap();
        assert_eq!(status, DagState::Succeeded);
        am.server.stop();
    }

    #[tokio::test]
    async fn test_worker_failure_is_retried_on_a_fresh_container() {
        let am = start_standalone_am();
        am.server.submit_dag(test_dag_plan(1, true)).unwrap();

        let (container_id, spec) = poll_for_task(&am).await;
        let first_attempt = spec.attempt_id;
        assert_eq!(first_attempt.id, 0);

        heartbeat(
            &am,
            container_id,
            1,
            first_attempt,
            vec![WorkerEvent::TaskAttemptFailed(TaskAttemptFailedEvent {
                diagnostics: "worker blew up".to_string(),
            })],
        )
        .await;

        // The rescheduled attempt shows up on a fresh container.
        let (second_container, second_spec) = poll_for_task(&am).await;
        let second_attempt = second_spec.attempt_id;
        assert_ne!(second_container, container_id);
        assert_eq!(second_attempt.task_id, first_attempt.task_id);
        assert_eq!(second_attempt.id, 1);

        assert!(can_commit(&am, second_attempt).await);
        heartbeat(
            &am,
            second_container,
            1,
            second_attempt,
            vec![WorkerEvent::TaskAttemptCompleted(TaskAttemptCompletedEvent {})],
        )
        .await;

        let status = tokio::time::timeout(
            Duration::from_secs(5),
            am.server.await_dag_completion(),
        )
        .await
        .expect("DAG did not finish")
        .unwrap();
        assert_eq!(status, DagState::Succeeded);
        am.server.stop();
    }

    #[tokio::test]
    async fn test_attempt_budget_exhaustion_fails_the_dag() {
        let app_id = arbalest_core::ids::ApplicationId::new(1710000000, 1);
        let rm = Arc::new(StandaloneResourceManager::new(
            app_id,
            NodeId::new("localhost", 12500),
        ));
        let mut server = AmServer::new(
            AmConfig::default().with_task_max_attempts(2),
            app_id,
            rm.clone(),
            Arc::new(StandaloneLauncher),
        );
        let sender = server.start().unwrap();
        rm.set_event_sender(sender);
        let service = TaskCommunicatorService::new(server.state());
        let am = TestAm { server, service };

        am.server.submit_dag(test_dag_plan(1, false)).unwrap();

        for _ in 0..2 {
            let (container_id, spec) = poll_for_task(&am).await;
            heartbeat(
                &am,
                container_id,
                1,
                spec.attempt_id,
                vec![WorkerEvent::TaskAttemptFailed(TaskAttemptFailedEvent {
                    diagnostics: "worker blew up".to_string(),
                })],
            )
            .await;
        }

        let status = tokio::time::timeout(
            Duration::from_secs(5),
            am.server.await_dag_completion(),
        )
        .await
        .expect("DAG did not finish")
        .unwrap();
        assert_eq!(status, DagState::Failed);
        am.server.stop();
    }

    #[tokio::test]
    async fn test_two_stage_dag_with_event_routing() {
        use arbalest_core::events::DataMovementEvent;
        use arbalest_core::plan::{
            edge_managers, EdgePlan, EntityDescriptor, VertexPlan,
        };

        let am = start_standalone_am();
        let plan = DagPlan::new("two-stage")
            .add_vertex(
                VertexPlan::new("producer", EntityDescriptor::new("map"))
                    .with_parallelism(1),
            )
            .add_vertex(
                VertexPlan::new("consumer", EntityDescriptor::new("reduce"))
                    .with_parallelism(1),
            )
            .add_edge(EdgePlan::new(
                "producer",
                "consumer",
                EntityDescriptor::new(edge_managers::SCATTER_GATHER),
            ));
        am.server.submit_dag(plan).unwrap();

        // Both vertices release immediately; find both tasks.
        let (first_container, first_spec) = poll_for_task(&am).await;
        let (second_container, second_spec) = poll_for_task(&am).await;

        let (producer, consumer) = if first_spec.vertex_name == "producer" {
            (
                (first_container, first_spec),
                (second_container, second_spec),
            )
        } else {
            (
                (second_container, second_spec),
                (first_container, first_spec),
            )
        };

        // The producer publishes a partition and completes.
        heartbeat(
            &am,
            producer.0,
            1,
            producer.1.attempt_id,
            vec![
                WorkerEvent::DataMovement(DataMovementEvent {
                    source_index: 0,
                    target_index: 0,
                    version: 0,
                    user_payload: b"partition-0".to_vec(),
                }),
                WorkerEvent::TaskAttemptCompleted(TaskAttemptCompletedEvent {}),
            ],
        )
        .await;

        // The consumer sees the routed data movement event on its heartbeat.
        let mut routed = vec![];
        let mut request_id = 0i64;
        for _ in 0..50 {
            request_id += 1;
            let response = heartbeat(
                &am,
                consumer.0,
                request_id,
                consumer.1.attempt_id,
                vec![],
            )
            .await;
            if !response.events.is_empty() {
                routed = response.events;
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(routed.len(), 1);

        heartbeat(
            &am,
            consumer.0,
            request_id + 1,
            consumer.1.attempt_id,
            vec![WorkerEvent::TaskAttemptCompleted(TaskAttemptCompletedEvent {})],
        )
        .await;

        let status = tokio::time::timeout(
            Duration::from_secs(5),
            am.server.await_dag_completion(),
        )
        .await
        .expect("DAG did not finish")
        .unwrap();
        assert_eq!(status, DagState::Succeeded);
        am.server.stop();
    }
}
