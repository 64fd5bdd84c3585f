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

//! Per-vertex state machine.
//!
//! A vertex aggregates `parallelism` tasks and is driven by its vertex
//! manager plugin: the plugin fixes the parallelism (while not final) and
//! releases task indices into scheduling. Event routing between vertices goes
//! through the DAG, which owns the edges.

use std::collections::HashMap;

use log::{debug, warn};

use arbalest_core::error::{ArbalestError, Result};
use arbalest_core::events::WorkerEvent;
use arbalest_core::ids::{TaskAttemptId, TaskId, VertexId};
use arbalest_core::plan::{
    EntityDescriptor, IoDescriptor, LocalResource, Resource, TaskSpec, VertexPlan,
};

use crate::dispatcher::AmEvent;
use crate::plugins::vertex_manager::{
    create_vertex_manager, VertexManagerCommand, VertexManagerContext,
    VertexManagerPlugin,
};
use crate::state::task::{Task, TaskEvent, TaskTerminalState};

/// Vertex lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexState {
    New,
    Running,
    Succeeded,
    Failed,
    Killed,
}

/// Terminal outcome reported to the DAG.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexTerminalState {
    Succeeded,
    Failed,
    Killed,
}

/// Events addressed to one vertex.
#[derive(Debug)]
pub enum VertexEvent {
    Start,
    TaskCompleted {
        task_id: TaskId,
        state: TaskTerminalState,
    },
    /// A previously succeeded task went back to running (lost output).
    TaskRescheduled {
        task_id: TaskId,
    },
    /// A task of an upstream vertex completed.
    SourceTaskCompleted {
        src_vertex: String,
        task_index: u32,
    },
    /// Inbound worker events produced by one of this vertex's attempts.
    RouteEvent {
        producer: TaskAttemptId,
        events: Vec<WorkerEvent>,
    },
    /// A vertex-manager event addressed to this vertex by name.
    ManagerEvent {
        payload: Vec<u8>,
    },
}

impl VertexEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            VertexEvent::Start => "Start",
            VertexEvent::TaskCompleted { .. } => "TaskCompleted",
            VertexEvent::TaskRescheduled { .. } => "TaskRescheduled",
            VertexEvent::SourceTaskCompleted { .. } => "SourceTaskCompleted",
            VertexEvent::RouteEvent { .. } => "RouteEvent",
            VertexEvent::ManagerEvent { .. } => "ManagerEvent",
        }
    }
}

/// One parallel stage of the DAG.
pub struct Vertex {
    vertex_id: VertexId,
    name: String,
    state: VertexState,
    distance_from_root: u32,
    processor: EntityDescriptor,
    resource: Resource,
    inputs: Vec<IoDescriptor>,
    outputs: Vec<IoDescriptor>,
    local_resources: HashMap<String, LocalResource>,
    commits_output: bool,
    failure_tolerance: f64,
    max_attempts: usize,
    /// Parallelism can no longer change once true.
    parallelism_final: bool,
    tasks: Vec<Task>,
    manager: Box<dyn VertexManagerPlugin>,
    /// Edge-manager swaps recorded by the plugin; the DAG drains them in the
    /// same event that produced them.
    pending_edge_updates: Vec<(String, EntityDescriptor)>,
    /// Task counts of the vertices feeding this one, by name.
    source_vertex_tasks: HashMap<String, u32>,
    completed_source_tasks: HashMap<String, u32>,
    succeeded_tasks: usize,
    failed_tasks: usize,
    killed_tasks: usize,
}

impl Vertex {
    pub fn from_plan(vertex_id: VertexId, plan: &VertexPlan, max_attempts: usize) -> Result<Self> {
        let manager = create_vertex_manager(&plan.vertex_manager)?;
        let mut vertex = Self {
            vertex_id,
            name: plan.name.clone(),
            state: VertexState::New,
            distance_from_root: 0,
            processor: plan.processor.clone(),
            resource: plan.resource,
            inputs: plan.inputs.clone(),
            outputs: plan.outputs.clone(),
            local_resources: plan.local_resources.clone(),
            commits_output: plan.commits_output,
            failure_tolerance: plan.failure_tolerance,
            max_attempts,
            parallelism_final: false,
            tasks: vec![],
            manager,
            pending_edge_updates: vec![],
            source_vertex_tasks: HashMap::new(),
            completed_source_tasks: HashMap::new(),
            succeeded_tasks: 0,
            failed_tasks: 0,
            killed_tasks: 0,
        };
        if let Some(parallelism) = plan.parallelism {
            vertex.create_tasks(parallelism);
            vertex.parallelism_final = true;
        }
        Ok(vertex)
    }

    pub fn vertex_id(&self) -> VertexId {
        self.vertex_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> VertexState {
        self.state
    }

    pub fn distance_from_root(&self) -> u32 {
        self.distance_from_root
    }

    pub(crate) fn set_distance_from_root(&mut self, distance: u32) {
        self.distance_from_root = distance;
    }

    pub fn num_tasks(&self) -> u32 {
        self.tasks.len() as u32
    }

    pub fn resource(&self) -> Resource {
        self.resource
    }

    pub fn commits_output(&self) -> bool {
        self.commits_output
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            VertexState::Succeeded | VertexState::Failed | VertexState::Killed
        )
    }

    pub fn task(&self, index: u32) -> Option<&Task> {
        self.tasks.get(index as usize)
    }

    pub fn task_mut(&mut self, index: u32) -> Option<&mut Task> {
        self.tasks.get_mut(index as usize)
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn tasks_mut(&mut self) -> &mut [Task] {
        &mut self.tasks
    }

    pub(crate) fn set_source_vertex_tasks(&mut self, sources: HashMap<String, u32>) {
        for name in sources.keys() {
            self.completed_source_tasks.entry(name.clone()).or_insert(0);
        }
        self.source_vertex_tasks = sources;
    }

    /// Builds the task spec shipped to a worker for one attempt.
    pub fn task_spec(&self, attempt_id: TaskAttemptId) -> TaskSpec {
        TaskSpec {
            attempt_id,
            vertex_name: self.name.clone(),
            processor: self.processor.clone(),
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
        }
    }

    pub fn local_resources(&self) -> &HashMap<String, LocalResource> {
        &self.local_resources
    }

    fn create_tasks(&mut self, parallelism: u32) {
        for index in 0..parallelism {
            self.tasks.push(Task::new(
                TaskId::new(self.vertex_id, index),
                self.max_attempts,
                self.commits_output,
            ));
        }
    }

    /// Runs a manager callback and applies the commands it recorded.
    fn run_manager(
        &mut self,
        f: impl FnOnce(&mut dyn VertexManagerPlugin, &mut VertexManagerContext),
    ) -> Result<Vec<AmEvent>> {
        let mut ctx = VertexManagerContext::new(
            &self.name,
            self.tasks.len() as u32,
            &self.source_vertex_tasks,
            &self.completed_source_tasks,
        );
        f(self.manager.as_mut(), &mut ctx);
        let commands = ctx.take_commands();
        self.apply_commands(commands)
    }

    fn set_parallelism(&mut self, parallelism: u32) -> Result<()> {
        if self.parallelism_final {
            return Err(ArbalestError::Internal(format!(
                "vertex {} parallelism changed after it became final",
                self.name
            )));
        }
        debug!("Vertex {} parallelism set to {parallelism}", self.name);
        self.create_tasks(parallelism);
        self.parallelism_final = true;
        Ok(())
    }

    /// Edge-manager swaps queued by the last manager call.
    pub(crate) fn take_pending_edge_updates(&mut self) -> Vec<(String, EntityDescriptor)> {
        std::mem::take(&mut self.pending_edge_updates)
    }

    pub(crate) fn apply_commands(
        &mut self,
        commands: Vec<VertexManagerCommand>,
    ) -> Result<Vec<AmEvent>> {
        let mut out = vec![];
        for command in commands {
            match command {
                VertexManagerCommand::SetParallelism(parallelism) => {
                    self.set_parallelism(parallelism)?;
                }
                VertexManagerCommand::Reconfigure {
                    parallelism,
                    edge_updates,
                } => {
                    if let Some(parallelism) = parallelism {
                        self.set_parallelism(parallelism)?;
                    }
                    self.pending_edge_updates.extend(edge_updates);
                }
                VertexManagerCommand::ScheduleTasks(indices) => {
                    // Releasing tasks freezes the parallelism.
                    self.parallelism_final = true;
                    for index in indices {
                        let num_tasks = self.tasks.len() as u32;
                        if index >= num_tasks {
                            return Err(ArbalestError::Internal(format!(
                                "vertex {} scheduling task {index} beyond parallelism {num_tasks}",
                                self.name
                            )));
                        }
                        out.push(AmEvent::Task {
                            task_id: TaskId::new(self.vertex_id, index),
                            event: TaskEvent::Schedule,
                        });
                    }
                }
            }
        }
        Ok(out)
    }

    /// Starts the vertex: the manager decides which tasks to release.
    pub fn start(&mut self) -> Result<Vec<AmEvent>> {
        if self.state != VertexState::New {
            debug!("Vertex {} already started", self.name);
            return Ok(vec![]);
        }
        self.state = VertexState::Running;
        let mut out = self.run_manager(|manager, ctx| manager.on_vertex_started(ctx))?;

        // Root inputs are announced to the manager once at start.
        let root_inputs: Vec<IoDescriptor> = if self.source_vertex_tasks.is_empty() {
            self.inputs.clone()
        } else {
            vec![]
        };
        for input in root_inputs {
            let mut events = self.run_manager(|manager, ctx| {
                manager.on_root_vertex_initialized(ctx, &input.name, &input.descriptor, vec![])
            })?;
            out.append(&mut events);
        }

        // A zero-task vertex is complete the moment it starts.
        if self.parallelism_final && self.tasks.is_empty() {
            self.state = VertexState::Succeeded;
        }
        Ok(out)
    }

    /// Records a source-task completion and lets the manager react.
    pub fn source_task_completed(
        &mut self,
        src_vertex: &str,
        task_index: u32,
    ) -> Result<Vec<AmEvent>> {
        *self
            .completed_source_tasks
            .entry(src_vertex.to_string())
            .or_insert(0) += 1;
        self.run_manager(|manager, ctx| {
            manager.on_source_task_completed(ctx, src_vertex, task_index)
        })
    }

    /// Delivers a vertex-manager event addressed to this vertex.
    pub fn manager_event(&mut self, payload: &[u8]) -> Result<Vec<AmEvent>> {
        self.run_manager(|manager, ctx| manager.on_vertex_manager_event(ctx, payload))
    }

    /// Records one task's terminal state. Returns the terminal state this
    /// vertex reached, if any.
    pub fn task_completed(
        &mut self,
        task_id: TaskId,
        state: TaskTerminalState,
    ) -> Option<VertexTerminalState> {
        debug!(
            "Vertex {} task {} completed as {:?}",
            self.name, task_id, state
        );
        match state {
            TaskTerminalState::Succeeded => self.succeeded_tasks += 1,
            TaskTerminalState::Failed => self.failed_tasks += 1,
            TaskTerminalState::Killed => self.killed_tasks += 1,
        }
        if self.is_terminal() {
            return None;
        }

        let tolerated = (self.failure_tolerance * self.tasks.len() as f64).floor() as usize;
        if self.failed_tasks > tolerated || self.killed_tasks > 0 {
            warn!(
                "Vertex {} failed: {} failed / {} killed of {} tasks (tolerated: {tolerated})",
                self.name,
                self.failed_tasks,
                self.killed_tasks,
                self.tasks.len()
            );
            self.state = VertexState::Failed;
            return Some(VertexTerminalState::Failed);
        }

        let terminal = self.succeeded_tasks + self.failed_tasks + self.killed_tasks;
        if terminal == self.tasks.len() {
            self.state = VertexState::Succeeded;
            return Some(VertexTerminalState::Succeeded);
        }
        None
    }

    /// A succeeded task went back to running; its completion is retracted.
    pub fn task_rescheduled(&mut self, task_id: TaskId) {
        if self.is_terminal() {
            warn!(
                "Vertex {} cannot retract completed task {task_id}: vertex already terminal",
                self.name
            );
            return;
        }
        self.succeeded_tasks = self.succeeded_tasks.saturating_sub(1);
    }

    /// Force-kills the vertex and everything under it.
    pub(crate) fn mark_killed(&mut self, reason: &str) {
        if !self.is_terminal() {
            self.state = VertexState::Killed;
        }
        for task in &mut self.tasks {
            task.mark_killed(reason);
        }
    }
}
