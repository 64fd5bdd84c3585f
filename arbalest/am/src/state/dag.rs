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

//! The DAG state machine.
//!
//! Owns the vertices, tasks and attempts of the running DAG, the edges with
//! their routing plugins, and the natural-order scheduler. Validated as
//! acyclic at construction; distance-from-root is assigned here and is
//! invariant afterwards.

use std::collections::{BTreeMap, HashMap, VecDeque};

use log::{debug, info, warn};

use arbalest_core::config::AmConfig;
use arbalest_core::error::{ArbalestError, Result};
use arbalest_core::events::{DataMovementEvent, InputFailedEvent, WorkerEvent};
use arbalest_core::ids::{DagId, TaskAttemptId, TaskId, VertexId};
use arbalest_core::plan::{Credentials, DagPlan};

use crate::dispatcher::AmEvent;
use crate::plugins::edge_manager::{create_edge_manager, EdgeManager};
use crate::rm::ContainerRequest;
use crate::state::dag_scheduler::NaturalOrderScheduler;
use crate::state::task::{Task, TaskEvent, TaskTerminalState};
use crate::state::task_attempt::{AttemptEvent, TaskAttempt};
use crate::state::vertex::{Vertex, VertexEvent, VertexTerminalState};

/// DAG lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DagState {
    New,
    Running,
    Succeeded,
    Failed,
}

/// Events addressed to the DAG itself.
#[derive(Debug)]
pub enum DagEvent {
    Start,
    /// An attempt needs a priority and a container ask.
    SchedulerUpdate {
        attempt_id: TaskAttemptId,
        is_rescheduled: bool,
    },
    VertexCompleted {
        vertex_id: VertexId,
        state: VertexTerminalState,
    },
}

impl DagEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            DagEvent::Start => "Start",
            DagEvent::SchedulerUpdate { .. } => "SchedulerUpdate",
            DagEvent::VertexCompleted { .. } => "VertexCompleted",
        }
    }
}

/// A producer → consumer edge with its instantiated routing plugin.
pub struct Edge {
    pub producer: VertexId,
    pub consumer: VertexId,
    pub manager: Box<dyn EdgeManager>,
}

/// The running DAG.
pub struct Dag {
    dag_id: DagId,
    name: String,
    state: DagState,
    vertices: BTreeMap<VertexId, Vertex>,
    by_name: HashMap<String, VertexId>,
    edges: Vec<Edge>,
    credentials: Option<Credentials>,
    scheduler: NaturalOrderScheduler,
    succeeded_vertices: usize,
    diagnostics: Vec<String>,
}

impl Dag {
    /// Builds and validates a DAG from its submission plan.
    pub fn from_plan(dag_id: DagId, plan: &DagPlan, config: &AmConfig) -> Result<Self> {
        if plan.vertices.is_empty() {
            return Err(ArbalestError::InvalidDagPlan(
                "a DAG needs at least one vertex".to_string(),
            ));
        }

        let mut by_name: HashMap<String, VertexId> = HashMap::new();
        for (index, vertex_plan) in plan.vertices.iter().enumerate() {
            let vertex_id = VertexId::new(dag_id, index as u32);
            if by_name.insert(vertex_plan.name.clone(), vertex_id).is_some() {
                return Err(ArbalestError::InvalidDagPlan(format!(
                    "duplicate vertex name: {}",
                    vertex_plan.name
                )));
            }
        }

        for edge in &plan.edges {
            for endpoint in [&edge.producer, &edge.consumer] {
                if !by_name.contains_key(endpoint) {
                    return Err(ArbalestError::InvalidDagPlan(format!(
                        "edge references unknown vertex: {endpoint}"
                    )));
                }
            }
            if edge.producer == edge.consumer {
                return Err(ArbalestError::InvalidDagPlan(format!(
                    "self-edge on vertex: {}",
                    edge.producer
                )));
            }
        }

        // Kahn's algorithm; also the base for distance-from-root.
        let n = plan.vertices.len();
        let mut in_degree = vec![0usize; n];
        let mut adjacent: Vec<Vec<usize>> = vec![vec![]; n];
        for edge in &plan.edges {
            let producer = by_name[&edge.producer].id as usize;
            let consumer = by_name[&edge.consumer].id as usize;
            adjacent[producer].push(consumer);
            in_degree[consumer] += 1;
        }
        let mut queue: VecDeque<usize> =
            (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut distance = vec![0u32; n];
        let mut visited = 0;
        while let Some(current) = queue.pop_front() {
            visited += 1;
            for &next in &adjacent[current] {
                if distance[next] < distance[current] + 1 {
                    distance[next] = distance[current] + 1;
                }
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    queue.push_back(next);
                }
            }
        }
        if visited != n {
            return Err(ArbalestError::InvalidDagPlan(format!(
                "DAG {} contains a cycle",
                plan.name
            )));
        }

        let mut vertices = BTreeMap::new();
        for (index, vertex_plan) in plan.vertices.iter().enumerate() {
            let vertex_id = VertexId::new(dag_id, index as u32);
            let mut vertex =
                Vertex::from_plan(vertex_id, vertex_plan, config.task_max_attempts)?;
            vertex.set_distance_from_root(distance[index]);
            vertices.insert(vertex_id, vertex);
        }

        // Tell each consumer how many tasks feed it, per source vertex.
        let mut source_tasks: HashMap<VertexId, HashMap<String, u32>> = HashMap::new();
        for edge in &plan.edges {
            let producer_id = by_name[&edge.producer];
            let consumer_id = by_name[&edge.consumer];
            let producer_tasks = vertices[&producer_id].num_tasks();
            source_tasks
                .entry(consumer_id)
                .or_default()
                .insert(edge.producer.clone(), producer_tasks);
        }
        for (vertex_id, sources) in source_tasks {
            if let Some(vertex) = vertices.get_mut(&vertex_id) {
                vertex.set_source_vertex_tasks(sources);
            }
        }

        let edges = plan
            .edges
            .iter()
            .map(|edge| {
                Ok(Edge {
                    producer: by_name[&edge.producer],
                    consumer: by_name[&edge.consumer],
                    manager: create_edge_manager(&edge.edge_manager)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            dag_id,
            name: plan.name.clone(),
            state: DagState::New,
            vertices,
            by_name,
            edges,
            credentials: plan.credentials.clone(),
            scheduler: NaturalOrderScheduler::new(config.reschedule_priority_boost),
            succeeded_vertices: 0,
            diagnostics: vec![],
        })
    }

    pub fn dag_id(&self) -> DagId {
        self.dag_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> DagState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, DagState::Succeeded | DagState::Failed)
    }

    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }

    pub fn vertices(&self) -> impl Iterator<Item = &Vertex> {
        self.vertices.values()
    }

    pub fn vertex(&self, vertex_id: VertexId) -> Result<&Vertex> {
        self.vertices.get(&vertex_id).ok_or_else(|| {
            ArbalestError::Internal(format!("unknown vertex: {vertex_id}"))
        })
    }

    pub fn vertex_mut(&mut self, vertex_id: VertexId) -> Result<&mut Vertex> {
        self.vertices.get_mut(&vertex_id).ok_or_else(|| {
            ArbalestError::Internal(format!("unknown vertex: {vertex_id}"))
        })
    }

    pub fn vertex_by_name(&self, name: &str) -> Option<&Vertex> {
        self.by_name.get(name).and_then(|id| self.vertices.get(id))
    }

    fn task_mut(&mut self, task_id: TaskId) -> Result<&mut Task> {
        self.vertex_mut(task_id.vertex_id)?
            .task_mut(task_id.id)
            .ok_or_else(|| ArbalestError::Internal(format!("unknown task: {task_id}")))
    }

    fn attempt_mut(&mut self, attempt_id: TaskAttemptId) -> Result<&mut TaskAttempt> {
        self.task_mut(attempt_id.task_id)?
            .attempt_mut(attempt_id)
            .ok_or_else(|| {
                ArbalestError::Internal(format!("unknown attempt: {attempt_id}"))
            })
    }

    /// Fails the DAG from outside the normal event flow; used for invariant
    /// violations surfaced by the dispatcher.
    pub fn abort(&mut self, reason: &str) {
        if !self.is_terminal() {
            self.fail(reason);
        }
    }

    fn fail(&mut self, reason: &str) {
        warn!("DAG {} failed: {reason}", self.name);
        self.state = DagState::Failed;
        self.diagnostics.push(reason.to_string());
        for vertex in self.vertices.values_mut() {
            vertex.mark_killed(reason);
        }
    }

    /// Starts the DAG: every vertex starts, its manager decides when tasks
    /// are released.
    fn start(&mut self) -> Result<Vec<AmEvent>> {
        if self.state != DagState::New {
            debug!("DAG {} already started", self.name);
            return Ok(vec![]);
        }
        info!("Starting DAG {} ({})", self.name, self.dag_id);
        self.state = DagState::Running;
        let mut out = vec![];
        let vertex_ids: Vec<VertexId> = self.vertices.keys().copied().collect();
        for vertex_id in vertex_ids {
            let (mut events, terminal) = {
                let vertex = self.vertex_mut(vertex_id)?;
                let events = vertex.start()?;
                (events, vertex.is_terminal())
            };
            self.apply_edge_updates(vertex_id)?;
            out.append(&mut events);
            // Zero-task vertices complete on the spot.
            if terminal {
                out.push(AmEvent::Dag(DagEvent::VertexCompleted {
                    vertex_id,
                    state: VertexTerminalState::Succeeded,
                }));
            }
        }
        Ok(out)
    }

    /// Applies edge-manager swaps the vertex's manager recorded, within the
    /// same event that produced them.
    fn apply_edge_updates(&mut self, vertex_id: VertexId) -> Result<()> {
        let updates = self.vertex_mut(vertex_id)?.take_pending_edge_updates();
        for (source_name, descriptor) in updates {
            let producer = *self.by_name.get(&source_name).ok_or_else(|| {
                ArbalestError::Internal(format!(
                    "edge update references unknown vertex: {source_name}"
                ))
            })?;
            let edge = self
                .edges
                .iter_mut()
                .find(|e| e.producer == producer && e.consumer == vertex_id)
                .ok_or_else(|| {
                    ArbalestError::Internal(format!(
                        "no edge from {source_name} into {vertex_id} to reconfigure"
                    ))
                })?;
            edge.manager = create_edge_manager(&descriptor)?;
            info!(
                "Edge {source_name} -> {vertex_id} now routed by {}",
                descriptor.name
            );
        }
        Ok(())
    }

    /// Every committing task of a successful DAG must hold exactly one commit
    /// grant.
    fn check_commit_invariant(&self) -> Result<()> {
        for vertex in self.vertices.values() {
            for task in vertex.tasks() {
                if task.commits_output() && task.commit_attempt().is_none() {
                    return Err(ArbalestError::Internal(format!(
                        "task {} succeeded without a commit grant",
                        task.task_id()
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn handle_dag_event(&mut self, event: DagEvent) -> Result<Vec<AmEvent>> {
        debug!("DAG {} processing {}", self.name, event.event_type());
        match event {
            DagEvent::Start => self.start(),
            DagEvent::SchedulerUpdate {
                attempt_id,
                is_rescheduled,
            } => {
                if self.is_terminal() {
                    return Ok(vec![]);
                }
                let vertex = self.vertex(attempt_id.vertex_id())?;
                let priority = self
                    .scheduler
                    .priority(vertex.distance_from_root(), is_rescheduled);
                let task = vertex.task(attempt_id.task_id.id).ok_or_else(|| {
                    ArbalestError::Internal(format!("unknown task: {}", attempt_id.task_id))
                })?;
                info!("Scheduling {attempt_id} at priority {priority}");
                let request = ContainerRequest {
                    attempt_id,
                    priority,
                    resource: vertex.resource(),
                    task_spec: vertex.task_spec(attempt_id),
                    local_resources: vertex.local_resources().clone(),
                    credentials: self.credentials.clone(),
                    blacklisted_nodes: task.blacklisted_nodes(),
                };
                Ok(vec![AmEvent::Attempt {
                    attempt_id,
                    event: AttemptEvent::Schedule { request },
                }])
            }
            DagEvent::VertexCompleted { vertex_id, state } => {
                match state {
                    VertexTerminalState::Succeeded => {
                        self.succeeded_vertices += 1;
                        if self.succeeded_vertices == self.vertices.len()
                            && self.state == DagState::Running
                        {
                            match self.check_commit_invariant() {
                                Ok(()) => {
                                    info!("DAG {} succeeded", self.name);
                                    self.state = DagState::Succeeded;
                                }
                                Err(e) => self.fail(&e.to_string()),
                            }
                        }
                    }
                    VertexTerminalState::Failed | VertexTerminalState::Killed => {
                        if self.state == DagState::Running {
                            self.fail(&format!("vertex {vertex_id} terminated as {state:?}"));
                        }
                    }
                }
                Ok(vec![])
            }
        }
    }

    pub fn handle_vertex_event(
        &mut self,
        vertex_id: VertexId,
        event: VertexEvent,
    ) -> Result<Vec<AmEvent>> {
        match event {
            VertexEvent::Start => {
                let out = self.vertex_mut(vertex_id)?.start()?;
                self.apply_edge_updates(vertex_id)?;
                Ok(out)
            }
            VertexEvent::TaskCompleted { task_id, state } => {
                let vertex = self.vertex_mut(vertex_id)?;
                let src_name = vertex.name().to_string();
                let task_index = task_id.id;
                let terminal = vertex.task_completed(task_id, state);

                let mut out = vec![];
                match state {
                    TaskTerminalState::Succeeded => {
                        // The completing attempt's data movement was already
                        // fanned out when its heartbeats arrived; consumers
                        // observe routing before this notification.
                        for edge in self.edges.iter().filter(|e| e.producer == vertex_id) {
                            out.push(AmEvent::Vertex {
                                vertex_id: edge.consumer,
                                event: VertexEvent::SourceTaskCompleted {
                                    src_vertex: src_name.clone(),
                                    task_index,
                                },
                            });
                        }
                    }
                    TaskTerminalState::Failed => {
                        self.route_source_task_failed(vertex_id, task_index)?;
                    }
                    TaskTerminalState::Killed => {}
                }
                if let Some(state) = terminal {
                    out.push(AmEvent::Dag(DagEvent::VertexCompleted { vertex_id, state }));
                }
                Ok(out)
            }
            VertexEvent::TaskRescheduled { task_id } => {
                self.vertex_mut(vertex_id)?.task_rescheduled(task_id);
                // Consumers lose the outputs of the retracted attempt.
                self.route_source_task_failed(vertex_id, task_id.id)?;
                Ok(vec![])
            }
            VertexEvent::SourceTaskCompleted {
                src_vertex,
                task_index,
            } => {
                let out = self
                    .vertex_mut(vertex_id)?
                    .source_task_completed(&src_vertex, task_index)?;
                self.apply_edge_updates(vertex_id)?;
                Ok(out)
            }
            VertexEvent::RouteEvent { producer, events } => {
                self.route_worker_events(producer, events)
            }
            VertexEvent::ManagerEvent { payload } => {
                let out = self.vertex_mut(vertex_id)?.manager_event(&payload)?;
                self.apply_edge_updates(vertex_id)?;
                Ok(out)
            }
        }
    }

    pub fn handle_task_event(
        &mut self,
        task_id: TaskId,
        event: TaskEvent,
    ) -> Result<Vec<AmEvent>> {
        self.task_mut(task_id)?.handle(event)
    }

    pub fn handle_attempt_event(
        &mut self,
        attempt_id: TaskAttemptId,
        event: AttemptEvent,
    ) -> Result<Vec<AmEvent>> {
        self.attempt_mut(attempt_id)?.handle(event)
    }

    /// Commit arbitration entry point for the task listener.
    pub fn can_commit(&mut self, attempt_id: TaskAttemptId) -> Result<bool> {
        Ok(self.task_mut(attempt_id.task_id)?.can_commit(attempt_id))
    }

    /// Serves queued events to an attempt; used by the heartbeat.
    pub fn get_task_attempt_events(
        &mut self,
        attempt_id: TaskAttemptId,
        from_index: usize,
        max_events: usize,
    ) -> Result<Vec<WorkerEvent>> {
        Ok(self
            .task_mut(attempt_id.task_id)?
            .get_attempt_events(from_index, max_events))
    }

    /// Routes worker events reported by one attempt via heartbeat.
    fn route_worker_events(
        &mut self,
        producer: TaskAttemptId,
        events: Vec<WorkerEvent>,
    ) -> Result<Vec<AmEvent>> {
        let src_vertex_id = producer.vertex_id();
        let src_task_index = producer.task_id.id;
        let mut out = vec![];
        for event in events {
            match event {
                WorkerEvent::DataMovement(dme) => {
                    self.route_data_movement(src_vertex_id, src_task_index, dme);
                }
                WorkerEvent::CompositeDataMovement(composite) => {
                    for dme in composite.expand(producer.id).collect::<Vec<_>>() {
                        self.route_data_movement(src_vertex_id, src_task_index, dme);
                    }
                }
                WorkerEvent::InputFailed(failed) => {
                    self.route_input_failed(src_vertex_id, src_task_index, failed.version);
                }
                WorkerEvent::InputReadError(error) => {
                    self.route_input_read_error(
                        src_vertex_id,
                        src_task_index,
                        &error.diagnostics,
                        error.index,
                        error.version,
                        &mut out,
                    );
                }
                WorkerEvent::VertexManager(vm_event) => {
                    match self.by_name.get(&vm_event.target_vertex).copied() {
                        Some(target) => out.push(AmEvent::Vertex {
                            vertex_id: target,
                            event: VertexEvent::ManagerEvent {
                                payload: vm_event.user_payload,
                            },
                        }),
                        None => warn!(
                            "Vertex manager event for unknown vertex {}",
                            vm_event.target_vertex
                        ),
                    }
                }
                WorkerEvent::TaskStatusUpdate(status) => {
                    out.push(AmEvent::Attempt {
                        attempt_id: producer,
                        event: AttemptEvent::StatusUpdate {
                            progress: status.progress,
                        },
                    });
                }
                WorkerEvent::TaskAttemptCompleted(_) => {
                    out.push(AmEvent::Attempt {
                        attempt_id: producer,
                        event: AttemptEvent::Done,
                    });
                }
                WorkerEvent::TaskAttemptFailed(failed) => {
                    out.push(AmEvent::Attempt {
                        attempt_id: producer,
                        event: AttemptEvent::Failed {
                            diagnostics: failed.diagnostics,
                        },
                    });
                }
            }
        }
        Ok(out)
    }

    /// Fans a data movement event out to the consumer tasks of every
    /// downstream edge, rewriting the target index to the destination's
    /// physical input.
    fn route_data_movement(
        &mut self,
        src_vertex_id: VertexId,
        src_task_index: u32,
        dme: DataMovementEvent,
    ) {
        let mut deliveries: Vec<(VertexId, u32, WorkerEvent)> = vec![];
        for edge in self.edges.iter().filter(|e| e.producer == src_vertex_id) {
            let num_dest = self
                .vertices
                .get(&edge.consumer)
                .map(|v| v.num_tasks())
                .unwrap_or(0);
            let routes = edge.manager.route_data_movement_event_to_destination(
                &dme,
                src_task_index,
                num_dest,
            );
            for (input_index, dest_tasks) in routes {
                for dest_task in dest_tasks {
                    if dest_task >= num_dest {
                        warn!(
                            "Dropping data movement event routed beyond {num_dest} tasks: {dest_task}"
                        );
                        continue;
                    }
                    deliveries.push((
                        edge.consumer,
                        dest_task,
                        WorkerEvent::DataMovement(DataMovementEvent {
                            source_index: dme.source_index,
                            target_index: input_index,
                            version: dme.version,
                            user_payload: dme.user_payload.clone(),
                        }),
                    ));
                }
            }
        }
        self.deliver(deliveries);
    }

    /// Tells consumers that a source task's outputs are gone.
    fn route_input_failed(
        &mut self,
        src_vertex_id: VertexId,
        src_task_index: u32,
        version: u32,
    ) {
        let mut deliveries: Vec<(VertexId, u32, WorkerEvent)> = vec![];
        for edge in self.edges.iter().filter(|e| e.producer == src_vertex_id) {
            let num_dest = self
                .vertices
                .get(&edge.consumer)
                .map(|v| v.num_tasks())
                .unwrap_or(0);
            let routes = edge
                .manager
                .route_input_source_task_failed_event_to_destination(
                    src_task_index,
                    num_dest,
                );
            for (input_index, dest_tasks) in routes {
                for dest_task in dest_tasks {
                    if dest_task >= num_dest {
                        continue;
                    }
                    deliveries.push((
                        edge.consumer,
                        dest_task,
                        WorkerEvent::InputFailed(InputFailedEvent {
                            source_index: src_task_index,
                            target_index: input_index,
                            version,
                        }),
                    ));
                }
            }
        }
        self.deliver(deliveries);
    }

    /// Routes a consumer-reported read error back to the producing task.
    fn route_input_read_error(
        &mut self,
        reporter_vertex_id: VertexId,
        reporter_task_index: u32,
        diagnostics: &str,
        input_index: u32,
        version: u32,
        out: &mut Vec<AmEvent>,
    ) {
        let error = arbalest_core::events::InputReadErrorEvent {
            diagnostics: diagnostics.to_string(),
            index: input_index,
            version,
        };
        for edge in self.edges.iter().filter(|e| e.consumer == reporter_vertex_id) {
            let src_task_index = edge
                .manager
                .route_input_error_event_to_source(&error, reporter_task_index);
            let num_src = self
                .vertices
                .get(&edge.producer)
                .map(|v| v.num_tasks())
                .unwrap_or(0);
            if src_task_index >= num_src {
                warn!(
                    "Dropping input error routed beyond {num_src} source tasks: {src_task_index}"
                );
                continue;
            }
            let task_id = TaskId::new(edge.producer, src_task_index);
            out.push(AmEvent::Task {
                task_id,
                event: TaskEvent::OutputLost {
                    attempt_id: TaskAttemptId::new(task_id, version),
                    diagnostics: diagnostics.to_string(),
                },
            });
        }
    }

    /// The version stamped on input-failed events for a failed source task.
    fn route_source_task_failed(
        &mut self,
        src_vertex_id: VertexId,
        src_task_index: u32,
    ) -> Result<()> {
        let version = self
            .vertex(src_vertex_id)?
            .task(src_task_index)
            .map(|t| t.attempts().len().saturating_sub(1) as u32)
            .unwrap_or(0);
        self.route_input_failed(src_vertex_id, src_task_index, version);
        Ok(())
    }

    fn deliver(&mut self, deliveries: Vec<(VertexId, u32, WorkerEvent)>) {
        for (vertex_id, dest_task, event) in deliveries {
            match self
                .vertices
                .get_mut(&vertex_id)
                .and_then(|v| v.task_mut(dest_task))
            {
                Some(task) => task.queue_event(event),
                None => warn!(
                    "Dropping event for unknown destination task {dest_task} of {vertex_id}"
                ),
            }
        }
    }
}
