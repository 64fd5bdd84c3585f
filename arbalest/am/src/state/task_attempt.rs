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

//! Per-attempt lifecycle state machine.
//!
//! ```text
//! NEW -> START_WAIT -> SUBMITTED -> RUNNING -> (COMMIT_PENDING) -> SUCCEEDED | FAILED | KILLED
//! ```
//!
//! Failure classification lives here: container terminations and worker
//! failures count against the task's attempt budget, preemptions and
//! pre-launch terminations do not.

use log::{debug, warn};

use arbalest_core::error::{ArbalestError, Result};
use arbalest_core::ids::{ContainerId, NodeId, TaskAttemptId};

use crate::dispatcher::AmEvent;
use crate::rm::{ContainerRequest, SchedulerEvent};
use crate::state::container::ContainerEvent;
use crate::state::task::TaskEvent;

/// Attempt lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskAttemptState {
    New,
    StartWait,
    Submitted,
    Running,
    CommitPending,
    Succeeded,
    Failed,
    Killed,
}

/// Events addressed to one task attempt.
#[derive(Debug)]
pub enum AttemptEvent {
    /// From the DAG scheduler, carrying the fully built container ask.
    Schedule { request: ContainerRequest },
    /// A granted container was bound to this attempt.
    ContainerAssigned { container_id: ContainerId },
    /// The worker pulled this attempt's task.
    StartedRemotely,
    StatusUpdate { progress: f32 },
    /// The worker reported success.
    Done,
    /// The worker reported failure.
    Failed { diagnostics: String },
    KillRequest { diagnostics: String },
    ContainerTerminating { diagnostics: String },
    ContainerTerminated { diagnostics: String },
    ContainerPreempted,
    NodeFailed {
        diagnostics: String,
        node: Option<NodeId>,
    },
    TimedOut,
}

impl AttemptEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            AttemptEvent::Schedule { .. } => "Schedule",
            AttemptEvent::ContainerAssigned { .. } => "ContainerAssigned",
            AttemptEvent::StartedRemotely => "StartedRemotely",
            AttemptEvent::StatusUpdate { .. } => "StatusUpdate",
            AttemptEvent::Done => "Done",
            AttemptEvent::Failed { .. } => "Failed",
            AttemptEvent::KillRequest { .. } => "KillRequest",
            AttemptEvent::ContainerTerminating { .. } => "ContainerTerminating",
            AttemptEvent::ContainerTerminated { .. } => "ContainerTerminated",
            AttemptEvent::ContainerPreempted => "ContainerPreempted",
            AttemptEvent::NodeFailed { .. } => "NodeFailed",
            AttemptEvent::TimedOut => "TimedOut",
        }
    }
}

/// One execution try of a task. Bound to at most one container over its
/// lifetime.
#[derive(Debug)]
pub struct TaskAttempt {
    attempt_id: TaskAttemptId,
    state: TaskAttemptState,
    is_rescheduled: bool,
    container_id: Option<ContainerId>,
    progress: f32,
    diagnostics: Vec<String>,
}

impl TaskAttempt {
    pub fn new(attempt_id: TaskAttemptId, is_rescheduled: bool) -> Self {
        Self {
            attempt_id,
            state: TaskAttemptState::New,
            is_rescheduled,
            container_id: None,
            progress: 0.0,
            diagnostics: vec![],
        }
    }

    pub fn attempt_id(&self) -> TaskAttemptId {
        self.attempt_id
    }

    pub fn state(&self) -> TaskAttemptState {
        self.state
    }

    pub fn is_rescheduled(&self) -> bool {
        self.is_rescheduled
    }

    pub fn container_id(&self) -> Option<ContainerId> {
        self.container_id
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            TaskAttemptState::Succeeded | TaskAttemptState::Failed | TaskAttemptState::Killed
        )
    }

    /// Marks the attempt commit-pending once the task granted it the commit.
    pub(crate) fn enter_commit_pending(&mut self) {
        if self.state == TaskAttemptState::Running {
            self.state = TaskAttemptState::CommitPending;
        }
    }

    /// Force-kills a non-terminal attempt without notifications; used when
    /// the DAG reached a terminal state.
    pub(crate) fn mark_killed(&mut self, reason: &str) {
        if !self.is_terminal() {
            self.state = TaskAttemptState::Killed;
            self.diagnostics.push(reason.to_string());
        }
    }

    fn fail(
        &mut self,
        diagnostics: String,
        counts_against_budget: bool,
        failed_node: Option<NodeId>,
        out: &mut Vec<AmEvent>,
    ) {
        self.state = TaskAttemptState::Failed;
        self.diagnostics.push(diagnostics.clone());
        out.push(AmEvent::Task {
            task_id: self.attempt_id.task_id,
            event: TaskEvent::AttemptFailed {
                attempt_id: self.attempt_id,
                counts_against_budget,
                failed_node,
                diagnostics,
            },
        });
    }

    /// Handles one event, returning the outgoing events for the dispatcher.
    pub fn handle(&mut self, event: AttemptEvent) -> Result<Vec<AmEvent>> {
        debug!(
            "Attempt {} processing {} at {:?}",
            self.attempt_id,
            event.event_type(),
            self.state
        );
        let mut out = vec![];
        match (self.state, event) {
            (TaskAttemptState::New, AttemptEvent::Schedule { request }) => {
                self.state = TaskAttemptState::StartWait;
                out.push(AmEvent::Scheduler(SchedulerEvent::ContainerRequest(request)));
            }
            (TaskAttemptState::StartWait, AttemptEvent::ContainerAssigned { container_id }) => {
                if self.container_id.is_some() {
                    return Err(ArbalestError::Internal(format!(
                        "attempt {} assigned to {} while already bound to {:?}",
                        self.attempt_id, container_id, self.container_id
                    )));
                }
                self.container_id = Some(container_id);
                self.state = TaskAttemptState::Submitted;
            }
            (TaskAttemptState::Submitted, AttemptEvent::StartedRemotely) => {
                self.state = TaskAttemptState::Running;
            }
            (
                TaskAttemptState::Running | TaskAttemptState::CommitPending,
                AttemptEvent::StatusUpdate { progress },
            ) => {
                self.progress = progress;
            }
            (
                TaskAttemptState::Running | TaskAttemptState::CommitPending,
                AttemptEvent::Done,
            ) => {
                self.state = TaskAttemptState::Succeeded;
                self.progress = 1.0;
                out.push(AmEvent::Task {
                    task_id: self.attempt_id.task_id,
                    event: TaskEvent::AttemptSucceeded {
                        attempt_id: self.attempt_id,
                    },
                });
                if let Some(container_id) = self.container_id {
                    out.push(AmEvent::Container {
                        container_id,
                        event: ContainerEvent::TaskAttemptSucceeded {
                            attempt_id: self.attempt_id,
                        },
                    });
                }
            }
            (
                TaskAttemptState::Running | TaskAttemptState::CommitPending,
                AttemptEvent::Failed { diagnostics },
            ) => {
                self.fail(diagnostics, true, None, &mut out);
                // The worker process is done for; release its container.
                if let Some(container_id) = self.container_id {
                    out.push(AmEvent::Container {
                        container_id,
                        event: ContainerEvent::StopRequest,
                    });
                }
            }
            (_, AttemptEvent::ContainerTerminating { diagnostics }) => {
                // The container is going away; the terminal classification
                // arrives with the terminated event.
                self.diagnostics.push(diagnostics);
            }
            (state, AttemptEvent::ContainerTerminated { diagnostics }) => {
                if self.is_terminal() {
                    self.diagnostics.push(diagnostics);
                } else {
                    // Termination before RUNNING is a launch failure or a
                    // re-allocation; it does not consume the attempt budget.
                    let was_running = matches!(
                        state,
                        TaskAttemptState::Running | TaskAttemptState::CommitPending
                    );
                    self.fail(diagnostics, was_running, None, &mut out);
                }
            }
            (_, AttemptEvent::ContainerPreempted) => {
                if !self.is_terminal() {
                    self.state = TaskAttemptState::Killed;
                    self.diagnostics.push("container preempted".to_string());
                    out.push(AmEvent::Task {
                        task_id: self.attempt_id.task_id,
                        event: TaskEvent::AttemptKilled {
                            attempt_id: self.attempt_id,
                        },
                    });
                }
            }
            (TaskAttemptState::Succeeded, AttemptEvent::NodeFailed { diagnostics, .. }) => {
                // The attempt keeps its success, but its outputs are gone;
                // the task decides whether a re-run is needed.
                self.diagnostics.push(diagnostics.clone());
                out.push(AmEvent::Task {
                    task_id: self.attempt_id.task_id,
                    event: TaskEvent::OutputLost {
                        attempt_id: self.attempt_id,
                        diagnostics,
                    },
                });
            }
            (_, AttemptEvent::NodeFailed { diagnostics, node }) => {
                if self.is_terminal() {
                    self.diagnostics.push(diagnostics);
                } else {
                    self.fail(diagnostics, true, node, &mut out);
                }
            }
            (_, AttemptEvent::KillRequest { diagnostics }) => {
                if !self.is_terminal() {
                    self.state = TaskAttemptState::Killed;
                    self.diagnostics.push(diagnostics);
                    out.push(AmEvent::Task {
                        task_id: self.attempt_id.task_id,
                        event: TaskEvent::AttemptKilled {
                            attempt_id: self.attempt_id,
                        },
                    });
                    if let Some(container_id) = self.container_id {
                        out.push(AmEvent::Container {
                            container_id,
                            event: ContainerEvent::StopRequest,
                        });
                    }
                }
            }
            (_, AttemptEvent::TimedOut) => {
                if !self.is_terminal() {
                    self.fail("task attempt timed out".to_string(), true, None, &mut out);
                    if let Some(container_id) = self.container_id {
                        out.push(AmEvent::Container {
                            container_id,
                            event: ContainerEvent::StopRequest,
                        });
                    }
                }
            }
            (state, event) => {
                if self.is_terminal() {
                    // Late signals to finished attempts are tolerated.
                    debug!(
                        "Attempt {} ignoring {} at {:?}",
                        self.attempt_id,
                        event.event_type(),
                        state
                    );
                } else {
                    warn!(
                        "Attempt {} cannot handle {} at {:?}",
                        self.attempt_id,
                        event.event_type(),
                        state
                    );
                    return Err(ArbalestError::Internal(format!(
                        "attempt {} received {} at {:?}",
                        self.attempt_id,
                        event.event_type(),
                        state
                    )));
                }
            }
        }
        Ok(out)
    }
}
