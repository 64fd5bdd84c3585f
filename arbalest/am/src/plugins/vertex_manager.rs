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

//! Vertex manager plugins.
//!
//! A vertex manager decides a vertex's parallelism (while it is not yet
//! final) and when tasks are released into scheduling. The context handed to
//! a plugin is a narrow capability bundle: plugins record commands which the
//! vertex applies after the call returns, they never reach into the
//! application master directly.

use std::collections::HashMap;

use arbalest_core::error::{ArbalestError, Result};
use arbalest_core::events::WorkerEvent;
use arbalest_core::plan::{vertex_managers, EntityDescriptor};

/// Deferred mutation recorded by a plugin, applied by the owning vertex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VertexManagerCommand {
    /// Release the given task indices into scheduling.
    ScheduleTasks(Vec<u32>),
    /// Fix the vertex parallelism; only legal while it is not final.
    SetParallelism(u32),
    /// Change parallelism and swap the edge managers of the named incoming
    /// edges in one step; nothing else observes the intermediate state.
    Reconfigure {
        parallelism: Option<u32>,
        /// `(source vertex name, new edge manager descriptor)` pairs.
        edge_updates: Vec<(String, EntityDescriptor)>,
    },
}

/// The capability bundle a plugin sees.
pub struct VertexManagerContext<'a> {
    /// Name of the managed vertex.
    pub vertex_name: &'a str,
    /// Current task count of the managed vertex (0 while deferred).
    pub num_tasks: u32,
    /// Task counts of the source vertices feeding this one, by name.
    pub source_vertex_tasks: &'a HashMap<String, u32>,
    /// Completed task counts of the source vertices, by name.
    pub completed_source_tasks: &'a HashMap<String, u32>,
    commands: Vec<VertexManagerCommand>,
}

impl<'a> VertexManagerContext<'a> {
    pub fn new(
        vertex_name: &'a str,
        num_tasks: u32,
        source_vertex_tasks: &'a HashMap<String, u32>,
        completed_source_tasks: &'a HashMap<String, u32>,
    ) -> Self {
        Self {
            vertex_name,
            num_tasks,
            source_vertex_tasks,
            completed_source_tasks,
            commands: vec![],
        }
    }

    pub fn schedule_vertex_tasks(&mut self, indices: Vec<u32>) {
        self.commands.push(VertexManagerCommand::ScheduleTasks(indices));
    }

    pub fn set_vertex_parallelism(&mut self, parallelism: u32) {
        self.commands
            .push(VertexManagerCommand::SetParallelism(parallelism));
    }

    pub fn reconfigure_vertex(
        &mut self,
        parallelism: Option<u32>,
        edge_updates: Vec<(String, EntityDescriptor)>,
    ) {
        self.commands.push(VertexManagerCommand::Reconfigure {
            parallelism,
            edge_updates,
        });
    }

    pub fn take_commands(&mut self) -> Vec<VertexManagerCommand> {
        std::mem::take(&mut self.commands)
    }
}

/// Parallelism and task release policy for one vertex.
pub trait VertexManagerPlugin: Send + Sync {
    fn initialize(&mut self, ctx: &mut VertexManagerContext);

    /// The vertex started; `completed_source_tasks` on the context reflects
    /// completions observed before the start.
    fn on_vertex_started(&mut self, ctx: &mut VertexManagerContext);

    fn on_source_task_completed(
        &mut self,
        ctx: &mut VertexManagerContext,
        src_vertex: &str,
        task_index: u32,
    );

    fn on_vertex_manager_event(&mut self, ctx: &mut VertexManagerContext, payload: &[u8]);

    fn on_root_vertex_initialized(
        &mut self,
        ctx: &mut VertexManagerContext,
        input_name: &str,
        descriptor: &EntityDescriptor,
        events: Vec<WorkerEvent>,
    );
}

/// Instantiates a vertex manager from its plan descriptor, by name.
pub fn create_vertex_manager(
    descriptor: &EntityDescriptor,
) -> Result<Box<dyn VertexManagerPlugin>> {
    match descriptor.name.as_str() {
        vertex_managers::IMMEDIATE_START => Ok(Box::new(ImmediateStartVertexManager)),
        vertex_managers::SHUFFLE => Ok(Box::new(ShuffleVertexManager::from_payload(
            &descriptor.payload,
        )?)),
        other => Err(ArbalestError::InvalidDagPlan(format!(
            "unknown vertex manager: {other}"
        ))),
    }
}

/// Starts all tasks immediately on vertex start.
pub struct ImmediateStartVertexManager;

impl VertexManagerPlugin for ImmediateStartVertexManager {
    fn initialize(&mut self, _ctx: &mut VertexManagerContext) {}

    fn on_vertex_started(&mut self, ctx: &mut VertexManagerContext) {
        let indices: Vec<u32> = (0..ctx.num_tasks).collect();
        ctx.schedule_vertex_tasks(indices);
    }

    fn on_source_task_completed(
        &mut self,
        _ctx: &mut VertexManagerContext,
        _src_vertex: &str,
        _task_index: u32,
    ) {
    }

    fn on_vertex_manager_event(
        &mut self,
        _ctx: &mut VertexManagerContext,
        _payload: &[u8],
    ) {
    }

    fn on_root_vertex_initialized(
        &mut self,
        _ctx: &mut VertexManagerContext,
        _input_name: &str,
        _descriptor: &EntityDescriptor,
        _events: Vec<WorkerEvent>,
    ) {
    }
}

/// Defers task release until a fraction of source tasks completed, then
/// releases tasks proportionally up to the max-fraction point.
pub struct ShuffleVertexManager {
    slowstart_min_fraction: f64,
    slowstart_max_fraction: f64,
    started: bool,
    scheduled: u32,
}

impl ShuffleVertexManager {
    pub fn new(slowstart_min_fraction: f64, slowstart_max_fraction: f64) -> Self {
        Self {
            slowstart_min_fraction,
            slowstart_max_fraction,
            started: false,
            scheduled: 0,
        }
    }

    /// Payload format: `"<min_fraction>,<max_fraction>"`; empty payload picks
    /// the defaults.
    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        if payload.is_empty() {
            return Ok(Self::new(0.25, 0.75));
        }
        let text = std::str::from_utf8(payload).map_err(|e| {
            ArbalestError::InvalidDagPlan(format!("bad shuffle manager payload: {e}"))
        })?;
        let parts: Vec<&str> = text.split(',').collect();
        if parts.len() != 2 {
            return Err(ArbalestError::InvalidDagPlan(format!(
                "bad shuffle manager payload: {text}"
            )));
        }
        let min = parts[0].trim().parse::<f64>().map_err(|e| {
            ArbalestError::InvalidDagPlan(format!("bad slowstart fraction: {e}"))
        })?;
        let max = parts[1].trim().parse::<f64>().map_err(|e| {
            ArbalestError::InvalidDagPlan(format!("bad slowstart fraction: {e}"))
        })?;
        if !(0.0..=1.0).contains(&min) || !(0.0..=1.0).contains(&max) || min > max {
            return Err(ArbalestError::InvalidDagPlan(format!(
                "slowstart fractions out of range: {text}"
            )));
        }
        Ok(Self::new(min, max))
    }

    fn maybe_schedule(&mut self, ctx: &mut VertexManagerContext) {
        if !self.started || self.scheduled >= ctx.num_tasks {
            return;
        }

        let total_sources: u32 = ctx.source_vertex_tasks.values().sum();
        if total_sources == 0 {
            // Nothing to wait for.
            let indices: Vec<u32> = (self.scheduled..ctx.num_tasks).collect();
            self.scheduled = ctx.num_tasks;
            ctx.schedule_vertex_tasks(indices);
            return;
        }

        let completed: u32 = ctx.completed_source_tasks.values().sum();
        let fraction = completed as f64 / total_sources as f64;
        if fraction < self.slowstart_min_fraction {
            return;
        }

        let target = if fraction >= self.slowstart_max_fraction {
            ctx.num_tasks
        } else {
            let span = self.slowstart_max_fraction - self.slowstart_min_fraction;
            let progress = (fraction - self.slowstart_min_fraction) / span;
            ((ctx.num_tasks as f64 * progress).ceil() as u32).clamp(1, ctx.num_tasks)
        };

        if target > self.scheduled {
            let indices: Vec<u32> = (self.scheduled..target).collect();
            self.scheduled = target;
            ctx.schedule_vertex_tasks(indices);
        }
    }
}

impl VertexManagerPlugin for ShuffleVertexManager {
    fn initialize(&mut self, _ctx: &mut VertexManagerContext) {}

    fn on_vertex_started(&mut self, ctx: &mut VertexManagerContext) {
        self.started = true;
        self.maybe_schedule(ctx);
    }

    fn on_source_task_completed(
        &mut self,
        ctx: &mut VertexManagerContext,
        _src_vertex: &str,
        _task_index: u32,
    ) {
        self.maybe_schedule(ctx);
    }

    fn on_vertex_manager_event(
        &mut self,
        _ctx: &mut VertexManagerContext,
        _payload: &[u8],
    ) {
    }

    fn on_root_vertex_initialized(
        &mut self,
        _ctx: &mut VertexManagerContext,
        _input_name: &str,
        _descriptor: &EntityDescriptor,
        _events: Vec<WorkerEvent>,
    ) {
    }
}
