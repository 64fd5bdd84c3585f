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

//! Per-task state machine: attempt budget, rescheduling, node blacklisting,
//! commit arbitration and the outbound event queue served to attempts.

use std::collections::HashSet;

use log::{debug, info, warn};

use arbalest_core::error::Result;
use arbalest_core::events::WorkerEvent;
use arbalest_core::ids::{NodeId, TaskAttemptId, TaskId};

use crate::dispatcher::AmEvent;
use crate::state::dag::DagEvent;
use crate::state::task_attempt::{TaskAttempt, TaskAttemptState};
use crate::state::vertex::VertexEvent;

/// Task lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    New,
    Scheduled,
    Succeeded,
    Failed,
    Killed,
}

/// Terminal outcome reported to the vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskTerminalState {
    Succeeded,
    Failed,
    Killed,
}

/// Events addressed to one task.
#[derive(Debug)]
pub enum TaskEvent {
    /// Release this task into scheduling; creates attempt 0.
    Schedule,
    AttemptSucceeded {
        attempt_id: TaskAttemptId,
    },
    AttemptFailed {
        attempt_id: TaskAttemptId,
        counts_against_budget: bool,
        failed_node: Option<NodeId>,
        diagnostics: String,
    },
    /// Preemption or kill; retried without consuming the budget.
    AttemptKilled {
        attempt_id: TaskAttemptId,
    },
    /// A succeeded attempt's outputs became unavailable.
    OutputLost {
        attempt_id: TaskAttemptId,
        diagnostics: String,
    },
}

impl TaskEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            TaskEvent::Schedule => "Schedule",
            TaskEvent::AttemptSucceeded { .. } => "AttemptSucceeded",
            TaskEvent::AttemptFailed { .. } => "AttemptFailed",
            TaskEvent::AttemptKilled { .. } => "AttemptKilled",
            TaskEvent::OutputLost { .. } => "OutputLost",
        }
    }
}

/// One parallel instance of a vertex.
pub struct Task {
    task_id: TaskId,
    state: TaskState,
    max_attempts: usize,
    attempts: Vec<TaskAttempt>,
    failed_attempts: usize,
    /// Whether this task's output goes through commit arbitration.
    commits_output: bool,
    /// The single attempt the commit was granted to, if any.
    commit_attempt: Option<TaskAttemptId>,
    /// Nodes this task must avoid for future attempts.
    blacklisted_nodes: HashSet<NodeId>,
    /// Events queued for delivery to this task's attempts via heartbeat.
    outbound_events: Vec<WorkerEvent>,
}

impl Task {
    pub fn new(task_id: TaskId, max_attempts: usize, commits_output: bool) -> Self {
        Self {
            task_id,
            state: TaskState::New,
            max_attempts,
            attempts: vec![],
            failed_attempts: 0,
            commits_output,
            commit_attempt: None,
            blacklisted_nodes: HashSet::new(),
            outbound_events: vec![],
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            TaskState::Succeeded | TaskState::Failed | TaskState::Killed
        )
    }

    pub fn commits_output(&self) -> bool {
        self.commits_output
    }

    pub fn commit_attempt(&self) -> Option<TaskAttemptId> {
        self.commit_attempt
    }

    pub fn attempts(&self) -> &[TaskAttempt] {
        &self.attempts
    }

    pub fn attempt(&self, attempt_id: TaskAttemptId) -> Option<&TaskAttempt> {
        self.attempts.iter().find(|a| a.attempt_id() == attempt_id)
    }

    pub fn attempt_mut(&mut self, attempt_id: TaskAttemptId) -> Option<&mut TaskAttempt> {
        self.attempts
            .iter_mut()
            .find(|a| a.attempt_id() == attempt_id)
    }

    pub fn blacklisted_nodes(&self) -> Vec<NodeId> {
        self.blacklisted_nodes.iter().cloned().collect()
    }

    /// The succeeded attempt, if the task succeeded.
    pub fn successful_attempt(&self) -> Option<TaskAttemptId> {
        self.attempts
            .iter()
            .find(|a| a.state() == TaskAttemptState::Succeeded)
            .map(|a| a.attempt_id())
    }

    /// Commit go/no-go. The first attempt to ask wins; everyone else is
    /// denied. Idempotent for the granted attempt.
    pub fn can_commit(&mut self, attempt_id: TaskAttemptId) -> bool {
        if !self.commits_output {
            return true;
        }
        match self.commit_attempt {
            None => {
                info!("Task {} granting commit to {}", self.task_id, attempt_id);
                self.commit_attempt = Some(attempt_id);
                if let Some(attempt) = self.attempt_mut(attempt_id) {
                    attempt.enter_commit_pending();
                }
                true
            }
            Some(granted) => granted == attempt_id,
        }
    }

    /// Serves the attempt's slice of the outbound event queue.
    pub fn get_attempt_events(&self, from_index: usize, max_events: usize) -> Vec<WorkerEvent> {
        self.outbound_events
            .iter()
            .skip(from_index)
            .take(max_events)
            .cloned()
            .collect()
    }

    /// Queues an event for delivery to this task's attempts.
    pub fn queue_event(&mut self, event: WorkerEvent) {
        self.outbound_events.push(event);
    }

    /// Force-kills the task and its attempts; used on DAG termination.
    pub(crate) fn mark_killed(&mut self, reason: &str) {
        if !self.is_terminal() {
            self.state = TaskState::Killed;
        }
        for attempt in &mut self.attempts {
            attempt.mark_killed(reason);
        }
    }

    fn next_attempt_id(&self) -> TaskAttemptId {
        TaskAttemptId::new(self.task_id, self.attempts.len() as u32)
    }

    fn spawn_attempt(&mut self, is_rescheduled: bool, out: &mut Vec<AmEvent>) {
        let attempt_id = self.next_attempt_id();
        debug!(
            "Task {} spawning attempt {} (rescheduled: {is_rescheduled})",
            self.task_id, attempt_id
        );
        self.attempts.push(TaskAttempt::new(attempt_id, is_rescheduled));
        out.push(AmEvent::Dag(DagEvent::SchedulerUpdate {
            attempt_id,
            is_rescheduled,
        }));
    }

    fn complete(&mut self, terminal: TaskTerminalState, out: &mut Vec<AmEvent>) {
        self.state = match terminal {
            TaskTerminalState::Succeeded => TaskState::Succeeded,
            TaskTerminalState::Failed => TaskState::Failed,
            TaskTerminalState::Killed => TaskState::Killed,
        };
        out.push(AmEvent::Vertex {
            vertex_id: self.task_id.vertex_id,
            event: VertexEvent::TaskCompleted {
                task_id: self.task_id,
                state: terminal,
            },
        });
    }

    /// Handles one event, returning the outgoing events for the dispatcher.
    pub fn handle(&mut self, event: TaskEvent) -> Result<Vec<AmEvent>> {
        debug!(
            "Task {} processing {} at {:?}",
            self.task_id,
            event.event_type(),
            self.state
        );
        let mut out = vec![];
        match event {
            TaskEvent::Schedule => {
                if self.state == TaskState::New {
                    self.state = TaskState::Scheduled;
                    self.spawn_attempt(false, &mut out);
                } else {
                    debug!("Task {} already scheduled", self.task_id);
                }
            }
            TaskEvent::AttemptSucceeded { attempt_id } => {
                if self.is_terminal() {
                    debug!("Task {} ignoring late success of {}", self.task_id, attempt_id);
                    return Ok(out);
                }
                if self.commits_output && self.commit_attempt != Some(attempt_id) {
                    // Succeeding without holding the commit grant means the
                    // attempt skipped arbitration; its output is not usable.
                    warn!(
                        "Task {} attempt {} succeeded without the commit grant",
                        self.task_id, attempt_id
                    );
                    self.failed_attempts += 1;
                    if self.failed_attempts >= self.max_attempts {
                        self.complete(TaskTerminalState::Failed, &mut out);
                    } else {
                        self.spawn_attempt(true, &mut out);
                    }
                    return Ok(out);
                }
                self.complete(TaskTerminalState::Succeeded, &mut out);
            }
            TaskEvent::AttemptFailed {
                attempt_id,
                counts_against_budget,
                failed_node,
                diagnostics,
            } => {
                if self.is_terminal() {
                    debug!("Task {} ignoring late failure of {}", self.task_id, attempt_id);
                    return Ok(out);
                }
                if self.commit_attempt == Some(attempt_id) {
                    // The committer crashed; free the slot for a successor.
                    self.commit_attempt = None;
                }
                if let Some(node) = failed_node {
                    self.blacklisted_nodes.insert(node);
                }
                if counts_against_budget {
                    self.failed_attempts += 1;
                }
                if self.failed_attempts >= self.max_attempts {
                    warn!(
                        "Task {} failed after {} attempts: {}",
                        self.task_id, self.failed_attempts, diagnostics
                    );
                    self.complete(TaskTerminalState::Failed, &mut out);
                } else {
                    self.spawn_attempt(true, &mut out);
                }
            }
            TaskEvent::AttemptKilled { attempt_id } => {
                if self.is_terminal() {
                    debug!("Task {} ignoring late kill of {}", self.task_id, attempt_id);
                    return Ok(out);
                }
                if self.commit_attempt == Some(attempt_id) {
                    self.commit_attempt = None;
                }
                // Kills (preemption included) never consume the budget.
                self.spawn_attempt(true, &mut out);
            }
            TaskEvent::OutputLost {
                attempt_id,
                diagnostics,
            } => {
                if self.state != TaskState::Succeeded
                    || self.successful_attempt() != Some(attempt_id)
                {
                    debug!(
                        "Task {} ignoring output-lost for non-current attempt {}",
                        self.task_id, attempt_id
                    );
                    return Ok(out);
                }
                info!(
                    "Task {} lost the output of {}: {diagnostics}; re-running",
                    self.task_id, attempt_id
                );
                if let Some(attempt) = self.attempt_mut(attempt_id) {
                    attempt.mark_killed(&diagnostics);
                }
                self.commit_attempt = None;
                self.state = TaskState::Scheduled;
                self.failed_attempts += 1;
                if self.failed_attempts >= self.max_attempts {
                    self.complete(TaskTerminalState::Failed, &mut out);
                } else {
                    out.push(AmEvent::Vertex {
                        vertex_id: self.task_id.vertex_id,
                        event: VertexEvent::TaskRescheduled {
                            task_id: self.task_id,
                        },
                    });
                    self.spawn_attempt(true, &mut out);
                }
            }
        }
        Ok(out)
    }
}
