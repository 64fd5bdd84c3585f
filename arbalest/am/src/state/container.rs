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

//! Per-container lifecycle state machine.
//!
//! ```text
//! ALLOCATED -> LAUNCHING -> IDLE <-> RUNNING -> STOP_REQUESTED -> STOPPING -> COMPLETED
//! ```
//!
//! A container holds at most one queued and at most one running attempt at
//! any instant. Unexpected events flip the advisory error flag; the container
//! is then never offered another task.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use dashmap::DashMap;
use log::{debug, info, warn};
use parking_lot::Mutex;

use arbalest_core::config::AmConfig;
use arbalest_core::error::Result;
use arbalest_core::ids::{ContainerId, DagId, NodeId, TaskAttemptId};
use arbalest_core::plan::{ContainerTask, Credentials, LocalResource, Resource, TaskSpec};

use crate::dispatcher::AmEvent;
use crate::launcher::{ContainerLaunchContext, LauncherEvent};
use crate::rm::SchedulerEvent;
use crate::state::task_attempt::AttemptEvent;

/// The task listener's view of containers and attempts; the state machine
/// registers and unregisters itself as it moves through its lifecycle.
pub trait ContainerListenerRegistry: Send + Sync {
    fn register_container(&self, container_id: ContainerId) -> Result<()>;
    fn unregister_container(&self, container_id: ContainerId);
    fn register_attempt(
        &self,
        attempt_id: TaskAttemptId,
        container_id: ContainerId,
    ) -> Result<()>;
    fn unregister_attempt(&self, attempt_id: TaskAttemptId);
}

/// Heartbeat watchdog registration for containers.
pub trait ContainerHeartbeatKeeper: Send + Sync {
    fn register(&self, container_id: ContainerId);
    fn unregister(&self, container_id: ContainerId);
}

/// Container lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Allocated,
    Launching,
    Idle,
    Running,
    StopRequested,
    Stopping,
    Completed,
}

/// Events addressed to one container.
#[derive(Debug)]
pub enum ContainerEvent {
    LaunchRequest {
        local_resources: HashMap<String, LocalResource>,
        credentials: Option<Credentials>,
    },
    Launched,
    LaunchFailed {
        diagnostics: String,
    },
    AssignTask {
        attempt_id: TaskAttemptId,
        task_spec: TaskSpec,
        additional_resources: HashMap<String, LocalResource>,
        credentials: Option<Credentials>,
    },
    TaskAttemptSucceeded {
        attempt_id: TaskAttemptId,
    },
    StopRequest,
    NmStopSent,
    NmStopFailed,
    NodeFailed {
        diagnostics: String,
    },
    TimedOut,
    Completed {
        exit_status: i32,
        diagnostics: String,
        preempted: bool,
    },
}

impl ContainerEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            ContainerEvent::LaunchRequest { .. } => "LaunchRequest",
            ContainerEvent::Launched => "Launched",
            ContainerEvent::LaunchFailed { .. } => "LaunchFailed",
            ContainerEvent::AssignTask { .. } => "AssignTask",
            ContainerEvent::TaskAttemptSucceeded { .. } => "TaskAttemptSucceeded",
            ContainerEvent::StopRequest => "StopRequest",
            ContainerEvent::NmStopSent => "NmStopSent",
            ContainerEvent::NmStopFailed => "NmStopFailed",
            ContainerEvent::NodeFailed { .. } => "NodeFailed",
            ContainerEvent::TimedOut => "TimedOut",
            ContainerEvent::Completed { .. } => "Completed",
        }
    }
}

/// The attempt currently queued on a container, with the deltas computed at
/// assignment time.
#[derive(Debug, Clone)]
struct QueuedTask {
    attempt_id: TaskAttemptId,
    task_spec: TaskSpec,
    additional_resources: HashMap<String, LocalResource>,
    credentials: Option<Credentials>,
    credentials_changed: bool,
}

/// One resource lease granted by the resource manager.
pub struct AmContainer {
    container_id: ContainerId,
    node: NodeId,
    #[allow(dead_code)] // recorded for diagnostics and future matching
    resource: Resource,
    state: ContainerState,
    queued: Option<QueuedTask>,
    running_attempt: Option<TaskAttemptId>,
    /// Every attempt that was ever assigned here, in assignment order.
    all_attempts: Vec<TaskAttemptId>,
    /// Attempts that were current when a stop began; they get the terminal
    /// notification once the resource manager reports completion.
    pending_termination: Vec<TaskAttemptId>,
    /// Union of everything localised into this container so far.
    local_resources: HashMap<String, LocalResource>,
    /// DAG of the last task assigned here, for the credentials delta.
    last_task_dag_id: Option<DagId>,
    in_error_state: bool,
    unregistered: bool,
    worker_command: String,
    profile_opts: Option<String>,
    listener: Arc<dyn ContainerListenerRegistry>,
    heartbeat: Arc<dyn ContainerHeartbeatKeeper>,
}

impl AmContainer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        container_id: ContainerId,
        node: NodeId,
        resource: Resource,
        worker_command: String,
        profile_opts: Option<String>,
        listener: Arc<dyn ContainerListenerRegistry>,
        heartbeat: Arc<dyn ContainerHeartbeatKeeper>,
    ) -> Self {
        Self {
            container_id,
            node,
            resource,
            state: ContainerState::Allocated,
            queued: None,
            running_attempt: None,
            all_attempts: vec![],
            pending_termination: vec![],
            local_resources: HashMap::new(),
            last_task_dag_id: None,
            in_error_state: false,
            unregistered: false,
            worker_command,
            profile_opts,
            listener,
            heartbeat,
        }
    }

    pub fn container_id(&self) -> ContainerId {
        self.container_id
    }

    pub fn node(&self) -> &NodeId {
        &self.node
    }

    pub fn state(&self) -> ContainerState {
        self.state
    }

    pub fn is_in_error_state(&self) -> bool {
        self.in_error_state
    }

    pub fn running_attempt(&self) -> Option<TaskAttemptId> {
        self.running_attempt
    }

    pub fn queued_attempt(&self) -> Option<TaskAttemptId> {
        self.queued.as_ref().map(|q| q.attempt_id)
    }

    pub fn all_attempts(&self) -> &[TaskAttemptId] {
        &self.all_attempts
    }

    #[cfg(test)]
    pub(crate) fn local_resources(&self) -> &HashMap<String, LocalResource> {
        &self.local_resources
    }

    fn unregister_once(&mut self) {
        if !self.unregistered {
            self.unregistered = true;
            self.listener.unregister_container(self.container_id);
            self.heartbeat.unregister(self.container_id);
        }
    }

    /// Moves the current attempts into the pending-termination list and
    /// emits `ContainerTerminating` for each.
    fn terminate_current_attempts(&mut self, diagnostics: &str, out: &mut Vec<AmEvent>) {
        if let Some(queued) = self.queued.take() {
            self.pending_termination.push(queued.attempt_id);
            out.push(AmEvent::Attempt {
                attempt_id: queued.attempt_id,
                event: AttemptEvent::ContainerTerminating {
                    diagnostics: diagnostics.to_string(),
                },
            });
        }
        if let Some(running) = self.running_attempt.take() {
            self.pending_termination.push(running);
            out.push(AmEvent::Attempt {
                attempt_id: running,
                event: AttemptEvent::ContainerTerminating {
                    diagnostics: diagnostics.to_string(),
                },
            });
        }
    }

    fn nm_stop_request(&self) -> AmEvent {
        AmEvent::Launcher(LauncherEvent::Stop {
            container_id: self.container_id,
            node: self.node.clone(),
        })
    }

    fn deallocate(&self) -> AmEvent {
        AmEvent::Scheduler(SchedulerEvent::ContainerDeallocate {
            container_id: self.container_id,
        })
    }

    fn unexpected(&mut self, event: &ContainerEvent) {
        warn!(
            "Container {} cannot handle {} at {:?}",
            self.container_id,
            event.event_type(),
            self.state
        );
        self.in_error_state = true;
    }

    /// Handles one event, returning the outgoing events for the dispatcher to
    /// post.
    pub fn handle(&mut self, event: ContainerEvent) -> Result<Vec<AmEvent>> {
        debug!(
            "Container {} processing {} at {:?}",
            self.container_id,
            event.event_type(),
            self.state
        );
        let mut out = vec![];
        match (self.state, event) {
            (
                ContainerState::Allocated,
                ContainerEvent::LaunchRequest {
                    local_resources,
                    credentials,
                },
            ) => {
                self.local_resources = local_resources.clone();
                self.listener.register_container(self.container_id)?;
                let mut command = self.worker_command.clone();
                if let Some(opts) = &self.profile_opts {
                    command.push(' ');
                    command.push_str(opts);
                }
                self.state = ContainerState::Launching;
                out.push(AmEvent::Launcher(LauncherEvent::Launch {
                    container_id: self.container_id,
                    node: self.node.clone(),
                    context: ContainerLaunchContext {
                        commands: vec![command],
                        local_resources,
                        credentials,
                    },
                }));
            }
            (ContainerState::Launching, ContainerEvent::Launched) => {
                self.heartbeat.register(self.container_id);
                self.state = ContainerState::Idle;
            }
            (ContainerState::Launching, ContainerEvent::LaunchFailed { diagnostics }) => {
                self.unregister_once();
                self.terminate_current_attempts(&diagnostics, &mut out);
                out.push(self.deallocate());
                self.state = ContainerState::Stopping;
            }
            (
                ContainerState::Launching | ContainerState::Idle,
                ContainerEvent::AssignTask {
                    attempt_id,
                    task_spec,
                    additional_resources,
                    credentials,
                },
            ) if self.queued.is_none() && self.running_attempt.is_none() => {
                let delta: HashMap<String, LocalResource> = additional_resources
                    .into_iter()
                    .filter(|(name, _)| !self.local_resources.contains_key(name))
                    .collect();
                self.local_resources.extend(delta.clone());

                let dag_id = attempt_id.dag_id();
                let credentials_changed = self.last_task_dag_id != Some(dag_id);
                self.last_task_dag_id = Some(dag_id);

                self.all_attempts.push(attempt_id);
                self.queued = Some(QueuedTask {
                    attempt_id,
                    task_spec,
                    additional_resources: delta,
                    credentials: if credentials_changed { credentials } else { None },
                    credentials_changed,
                });
            }
            (
                ContainerState::Launching | ContainerState::Idle | ContainerState::Running,
                ContainerEvent::AssignTask { attempt_id, .. },
            ) => {
                // A second assignment while one attempt is current violates
                // the single-assignment invariant; shoot the container.
                self.in_error_state = true;
                self.all_attempts.push(attempt_id);
                self.unregister_once();
                self.terminate_current_attempts("container assigned twice", &mut out);
                self.pending_termination.push(attempt_id);
                out.push(AmEvent::Attempt {
                    attempt_id,
                    event: AttemptEvent::ContainerTerminating {
                        diagnostics: "container assigned twice".to_string(),
                    },
                });
                out.push(self.nm_stop_request());
                self.state = ContainerState::StopRequested;
            }
            (_, ContainerEvent::AssignTask { attempt_id, .. }) => {
                // Assignment to a stopping or completed container: the
                // terminated notification is required for correctness, the
                // error flag is advisory for diagnostics.
                self.in_error_state = true;
                out.push(AmEvent::Attempt {
                    attempt_id,
                    event: AttemptEvent::ContainerTerminated {
                        diagnostics: "container completed before assignment".to_string(),
                    },
                });
            }
            (ContainerState::Running, ContainerEvent::TaskAttemptSucceeded { attempt_id })
                if self.running_attempt == Some(attempt_id) =>
            {
                self.running_attempt = None;
                self.listener.unregister_attempt(attempt_id);
                self.state = ContainerState::Idle;
            }
            (ContainerState::Completed, ContainerEvent::TaskAttemptSucceeded { .. }) => {
                // Late worker signal after the lease already ended.
            }
            (ContainerState::Allocated, ContainerEvent::StopRequest) => {
                // Never launched; nothing for the node manager to stop.
                out.push(self.deallocate());
                self.state = ContainerState::Stopping;
            }
            (
                ContainerState::Launching | ContainerState::Idle | ContainerState::Running,
                ContainerEvent::StopRequest,
            ) => {
                self.unregister_once();
                self.terminate_current_attempts("container stop requested", &mut out);
                out.push(self.nm_stop_request());
                self.state = ContainerState::StopRequested;
            }
            (
                ContainerState::Idle | ContainerState::Running,
                ContainerEvent::TimedOut,
            ) => {
                self.unregister_once();
                self.terminate_current_attempts("container heartbeat timed out", &mut out);
                out.push(self.nm_stop_request());
                self.state = ContainerState::StopRequested;
            }
            (ContainerState::StopRequested, ContainerEvent::NmStopSent) => {
                self.state = ContainerState::Stopping;
            }
            (ContainerState::StopRequested, ContainerEvent::NmStopFailed) => {
                out.push(self.deallocate());
                self.state = ContainerState::Stopping;
            }
            (ContainerState::Completed, ContainerEvent::NodeFailed { diagnostics }) => {
                // The node died after the container completed; attempts that
                // ran here may have lost their outputs.
                for attempt_id in self.all_attempts.clone() {
                    out.push(AmEvent::Attempt {
                        attempt_id,
                        event: AttemptEvent::NodeFailed {
                            diagnostics: diagnostics.clone(),
                            node: Some(self.node.clone()),
                        },
                    });
                }
            }
            (_, ContainerEvent::NodeFailed { diagnostics }) => {
                self.unregister_once();
                for attempt_id in self.all_attempts.clone() {
                    out.push(AmEvent::Attempt {
                        attempt_id,
                        event: AttemptEvent::NodeFailed {
                            diagnostics: diagnostics.clone(),
                            node: Some(self.node.clone()),
                        },
                    });
                }
                self.terminate_current_attempts(&diagnostics, &mut out);
                out.push(self.deallocate());
                self.state = ContainerState::Stopping;
            }
            (ContainerState::Completed, ContainerEvent::Completed { .. }) => {
                // Duplicate completion from the resource manager.
            }
            (
                _,
                ContainerEvent::Completed {
                    exit_status,
                    diagnostics,
                    preempted,
                },
            ) => {
                self.unregister_once();
                let mut to_notify = std::mem::take(&mut self.pending_termination);
                if let Some(queued) = self.queued.take() {
                    to_notify.push(queued.attempt_id);
                }
                if let Some(running) = self.running_attempt.take() {
                    to_notify.push(running);
                }
                for attempt_id in to_notify {
                    let event = if preempted {
                        AttemptEvent::ContainerPreempted
                    } else {
                        AttemptEvent::ContainerTerminated {
                            diagnostics: format!(
                                "container exited with status {exit_status}: {diagnostics}"
                            ),
                        }
                    };
                    out.push(AmEvent::Attempt { attempt_id, event });
                }
                // Resources are dropped with the lease.
                self.local_resources = HashMap::new();
                self.state = ContainerState::Completed;
            }
            (ContainerState::Completed, ContainerEvent::Launched) => {
                // Launched notification raced with the completion.
            }
            (ContainerState::Stopping | ContainerState::StopRequested, _) => {
                // Stop already underway; nothing more to do.
            }
            (_, event) => {
                self.unexpected(&event);
            }
        }
        Ok(out)
    }

    /// The worker pulled for a task. Synchronous with the task listener; the
    /// transition to RUNNING happens here.
    pub fn pull_task_context(&mut self) -> ContainerTask {
        match self.state {
            ContainerState::Launching => ContainerTask::empty(),
            ContainerState::Idle => match self.queued.take() {
                Some(task) => {
                    self.running_attempt = Some(task.attempt_id);
                    self.state = ContainerState::Running;
                    ContainerTask {
                        should_die: false,
                        task: Some(task.task_spec),
                        additional_resources: task.additional_resources,
                        credentials: task.credentials,
                        credentials_changed: task.credentials_changed,
                    }
                }
                None => ContainerTask::empty(),
            },
            ContainerState::Running => {
                warn!(
                    "Container {} pulled for a task while already running {:?}",
                    self.container_id, self.running_attempt
                );
                ContainerTask::empty()
            }
            ContainerState::Allocated
            | ContainerState::StopRequested
            | ContainerState::Stopping
            | ContainerState::Completed => ContainerTask::for_invalid_worker(),
        }
    }
}

/// The registry of every container the application master has ever been
/// granted, keyed by container id. Completed containers stay for diagnostics
/// and late-event tolerance.
pub struct ContainerMap {
    containers: DashMap<ContainerId, Arc<Mutex<AmContainer>>>,
    listener: Arc<dyn ContainerListenerRegistry>,
    heartbeat: Arc<dyn ContainerHeartbeatKeeper>,
    profile_containers: HashSet<u64>,
    profile_jvm_opts: String,
    worker_command: String,
}

impl ContainerMap {
    pub fn new(
        config: &AmConfig,
        listener: Arc<dyn ContainerListenerRegistry>,
        heartbeat: Arc<dyn ContainerHeartbeatKeeper>,
    ) -> Self {
        let profile_containers: HashSet<u64> =
            config.profile_containers.iter().copied().collect();
        if !profile_containers.is_empty() && config.profile_jvm_opts.is_empty() {
            warn!(
                "Profiling requested for {} containers but no profiling opts configured",
                profile_containers.len()
            );
        }
        Self {
            containers: DashMap::new(),
            listener,
            heartbeat,
            profile_containers,
            profile_jvm_opts: config.profile_jvm_opts.clone(),
            worker_command: config.worker_command.clone(),
        }
    }

    /// Registers a freshly granted container; returns false if it already
    /// exists.
    pub fn add_container_if_new(
        &self,
        container_id: ContainerId,
        node: NodeId,
        resource: Resource,
    ) -> bool {
        let should_profile = self.profile_containers.contains(&container_id.id);
        let profile_opts = (should_profile && !self.profile_jvm_opts.is_empty())
            .then(|| self.profile_jvm_opts.clone());
        let container = AmContainer::new(
            container_id,
            node,
            resource,
            self.worker_command.clone(),
            profile_opts,
            self.listener.clone(),
            self.heartbeat.clone(),
        );
        match self.containers.entry(container_id) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(Arc::new(Mutex::new(container)));
                true
            }
        }
    }

    pub fn get(&self, container_id: ContainerId) -> Option<Arc<Mutex<AmContainer>>> {
        self.containers.get(&container_id).map(|c| c.clone())
    }

    /// Routes one event to the addressed container.
    pub fn handle(
        &self,
        container_id: ContainerId,
        event: ContainerEvent,
    ) -> Result<Vec<AmEvent>> {
        match self.get(container_id) {
            Some(container) => container.lock().handle(event),
            None => {
                info!("Event for unknown container: {container_id}");
                Ok(vec![])
            }
        }
    }

    /// Ids of every container that has not completed yet.
    pub fn live_container_ids(&self) -> Vec<ContainerId> {
        self.containers
            .iter()
            .filter(|entry| entry.value().lock().state() != ContainerState::Completed)
            .map(|entry| *entry.key())
            .collect()
    }

    pub fn node_of(&self, container_id: ContainerId) -> Option<NodeId> {
        self.get(container_id).map(|c| c.lock().node().clone())
    }
}

impl std::fmt::Debug for AmContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmContainer")
            .field("container_id", &self.container_id)
            .field("state", &self.state)
            .field("queued", &self.queued.as_ref().map(|q| q.attempt_id))
            .field("running", &self.running_attempt)
            .field("error", &self.in_error_state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{event_types, WrappedContainer};

    #[test]
    fn test_single_successful_task_flow_assign_before_launch() {
        let mut wc = WrappedContainer::new();
        assert_eq!(wc.state(), ContainerState::Allocated);

        let events = wc.launch();
        assert_eq!(wc.state(), ContainerState::Launching);
        assert_eq!(event_types(&events), vec!["Launcher::Launch"]);

        let events = wc.assign(wc.attempt_id);
        assert_eq!(wc.state(), ContainerState::Launching);
        assert!(events.is_empty());
        assert_eq!(wc.queued_attempt(), Some(wc.attempt_id));

        let events = wc.launched();
        assert_eq!(wc.state(), ContainerState::Idle);
        assert!(events.is_empty());
        assert_eq!(wc.queued_attempt(), Some(wc.attempt_id));
        assert_eq!(wc.running_attempt(), None);
        assert!(wc.listener.container_registered(wc.container_id));
        assert!(wc.heartbeat.registered(wc.container_id));

        let task = wc.pull();
        assert_eq!(wc.state(), ContainerState::Running);
        assert!(!task.should_die);
        assert_eq!(task.task.unwrap().attempt_id, wc.attempt_id);
        assert_eq!(wc.running_attempt(), Some(wc.attempt_id));
        assert_eq!(wc.queued_attempt(), None);

        let events = wc.attempt_succeeded(wc.attempt_id);
        assert_eq!(wc.state(), ContainerState::Idle);
        assert!(events.is_empty());
        assert_eq!(wc.running_attempt(), None);
        assert!(wc.listener.attempt_unregistered(wc.attempt_id));

        let events = wc.completed(false);
        assert_eq!(wc.state(), ContainerState::Completed);
        assert!(events.is_empty());
        assert!(wc.listener.container_unregistered(wc.container_id));
        assert!(wc.heartbeat.unregistered(wc.container_id));

        assert_eq!(wc.all_attempts().len(), 1);
        assert!(!wc.is_in_error_state());
    }

    #[test]
    fn test_single_successful_task_flow_assign_after_launch() {
        let mut wc = WrappedContainer::new();

        let events = wc.launch();
        assert_eq!(event_types(&events), vec!["Launcher::Launch"]);

        let events = wc.launched();
        assert_eq!(wc.state(), ContainerState::Idle);
        assert!(events.is_empty());
        assert_eq!(wc.queued_attempt(), None);

        let events = wc.assign(wc.attempt_id);
        assert_eq!(wc.state(), ContainerState::Idle);
        assert!(events.is_empty());
        assert_eq!(wc.queued_attempt(), Some(wc.attempt_id));

        let task = wc.pull();
        assert_eq!(wc.state(), ContainerState::Running);
        assert!(!task.should_die);
        assert_eq!(task.task.unwrap().attempt_id, wc.attempt_id);

        let events = wc.attempt_succeeded(wc.attempt_id);
        assert_eq!(wc.state(), ContainerState::Idle);
        assert!(events.is_empty());

        let events = wc.completed(false);
        assert_eq!(wc.state(), ContainerState::Completed);
        assert!(events.is_empty());
        assert_eq!(wc.all_attempts().len(), 1);
        assert!(!wc.is_in_error_state());
    }

    #[test]
    fn test_stop_request_after_success() {
        let mut wc = WrappedContainer::new();
        wc.launch();
        wc.assign(wc.attempt_id);
        wc.launched();
        wc.pull();
        wc.attempt_succeeded(wc.attempt_id);

        let events = wc.stop_request();
        assert_eq!(wc.state(), ContainerState::StopRequested);
        assert_eq!(event_types(&events), vec!["Launcher::Stop"]);

        let events = wc.nm_stop_sent();
        assert_eq!(wc.state(), ContainerState::Stopping);
        assert!(events.is_empty());

        let events = wc.completed(false);
        assert_eq!(wc.state(), ContainerState::Completed);
        assert!(events.is_empty());
        assert_eq!(wc.all_attempts().len(), 1);
        assert!(!wc.is_in_error_state());
    }

    #[test]
    fn test_failed_nm_stop_request_deallocates() {
        let mut wc = WrappedContainer::new();
        wc.launch();
        wc.assign(wc.attempt_id);
        wc.launched();
        wc.pull();
        wc.attempt_succeeded(wc.attempt_id);

        let events = wc.stop_request();
        assert_eq!(event_types(&events), vec!["Launcher::Stop"]);

        let events = wc.nm_stop_failed();
        assert_eq!(wc.state(), ContainerState::Stopping);
        assert_eq!(event_types(&events), vec!["Scheduler::ContainerDeallocate"]);

        let events = wc.completed(false);
        assert_eq!(wc.state(), ContainerState::Completed);
        assert!(events.is_empty());
        assert!(!wc.is_in_error_state());
    }

    #[test]
    fn test_double_assignment_at_idle_is_an_error() {
        let mut wc = WrappedContainer::new();
        wc.launch();
        wc.launched();
        wc.assign(wc.attempt_id);
        assert_eq!(wc.state(), ContainerState::Idle);

        let second = wc.attempt(2);
        let events = wc.assign(second);
        assert_eq!(wc.state(), ContainerState::StopRequested);
        assert!(wc.listener.container_unregistered(wc.container_id));
        assert!(wc.heartbeat.unregistered(wc.container_id));
        let mut types = event_types(&events);
        types.sort();
        assert_eq!(
            types,
            vec![
                "Attempt::ContainerTerminating",
                "Attempt::ContainerTerminating",
                "Launcher::Stop",
            ]
        );
        assert!(wc.is_in_error_state());

        wc.nm_stop_sent();
        let events = wc.completed(false);
        let mut types = event_types(&events);
        types.sort();
        assert_eq!(
            types,
            vec![
                "Attempt::ContainerTerminated",
                "Attempt::ContainerTerminated",
            ]
        );
        assert_eq!(wc.running_attempt(), None);
        assert_eq!(wc.queued_attempt(), None);
        assert_eq!(wc.all_attempts().len(), 2);
    }

    #[test]
    fn test_double_assignment_at_running_is_an_error() {
        let mut wc = WrappedContainer::new();
        wc.launch();
        wc.launched();
        wc.assign(wc.attempt_id);
        wc.pull();
        assert_eq!(wc.state(), ContainerState::Running);

        let second = wc.attempt(2);
        let events = wc.assign(second);
        assert_eq!(wc.state(), ContainerState::StopRequested);
        let mut types = event_types(&events);
        types.sort();
        assert_eq!(
            types,
            vec![
                "Attempt::ContainerTerminating",
                "Attempt::ContainerTerminating",
                "Launcher::Stop",
            ]
        );
        assert!(wc.is_in_error_state());

        wc.nm_stop_sent();
        let events = wc.completed(false);
        assert_eq!(events.len(), 2);
        assert_eq!(wc.all_attempts().len(), 2);
    }

    #[test]
    fn test_double_assignment_at_launching_is_an_error() {
        let mut wc = WrappedContainer::new();
        wc.launch();
        wc.assign(wc.attempt_id);
        wc.pull();
        assert_eq!(wc.state(), ContainerState::Launching);

        let second = wc.attempt(2);
        let events = wc.assign(second);
        assert_eq!(wc.state(), ContainerState::StopRequested);
        let mut types = event_types(&events);
        types.sort();
        assert_eq!(
            types,
            vec![
                "Attempt::ContainerTerminating",
                "Attempt::ContainerTerminating",
                "Launcher::Stop",
            ]
        );
        assert!(wc.is_in_error_state());

        wc.nm_stop_sent();
        let events = wc.completed(false);
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_timeout_at_running() {
        let mut wc = WrappedContainer::new();
        wc.launch();
        wc.launched();
        wc.assign(wc.attempt_id);
        wc.pull();
        assert_eq!(wc.state(), ContainerState::Running);

        let events = wc.timed_out();
        assert_eq!(wc.state(), ContainerState::StopRequested);
        let mut types = event_types(&events);
        types.sort();
        assert_eq!(
            types,
            vec!["Attempt::ContainerTerminating", "Launcher::Stop"]
        );

        let events = wc.completed(false);
        assert_eq!(event_types(&events), vec!["Attempt::ContainerTerminated"]);
        assert!(!wc.is_in_error_state());
        assert_eq!(wc.all_attempts().len(), 1);
    }

    #[test]
    fn test_launch_failure() {
        let mut wc = WrappedContainer::new();
        wc.launch();
        wc.assign(wc.attempt_id);
        assert_eq!(wc.state(), ContainerState::Launching);

        let events = wc.launch_failed();
        assert_eq!(wc.state(), ContainerState::Stopping);
        assert!(wc.listener.container_registered(wc.container_id));
        assert!(wc.listener.container_unregistered(wc.container_id));
        let mut types = event_types(&events);
        types.sort();
        assert_eq!(
            types,
            vec![
                "Attempt::ContainerTerminating",
                "Scheduler::ContainerDeallocate",
            ]
        );

        let events = wc.completed(false);
        assert_eq!(event_types(&events), vec!["Attempt::ContainerTerminated"]);
        assert!(!wc.is_in_error_state());
    }

    #[test]
    fn test_completed_at_allocated() {
        let mut wc = WrappedContainer::new();
        let events = wc.completed(false);
        assert_eq!(wc.state(), ContainerState::Completed);
        assert!(events.is_empty());
        assert!(!wc.is_in_error_state());
    }

    #[test]
    fn test_completed_at_launching_and_late_launched() {
        let mut wc = WrappedContainer::new();
        wc.launch();
        wc.assign(wc.attempt_id);

        let events = wc.completed(false);
        assert_eq!(wc.state(), ContainerState::Completed);
        assert_eq!(event_types(&events), vec!["Attempt::ContainerTerminated"]);
        assert!(!wc.is_in_error_state());

        // Launched notification generated by the node manager arrives late.
        let events = wc.launched();
        assert!(events.is_empty());
        assert!(!wc.is_in_error_state());
    }

    #[test]
    fn test_completed_at_idle_and_late_pull() {
        let mut wc = WrappedContainer::new();
        wc.launch();
        wc.assign(wc.attempt_id);
        wc.launched();
        assert_eq!(wc.state(), ContainerState::Idle);

        let events = wc.completed(false);
        assert_eq!(wc.state(), ContainerState::Completed);
        assert_eq!(event_types(&events), vec!["Attempt::ContainerTerminated"]);

        // A pending worker pull after completion; the worker is told to die.
        let task = wc.pull();
        assert!(task.should_die);
        assert!(!wc.is_in_error_state());
    }

    #[test]
    fn test_completed_at_running_and_late_success() {
        let mut wc = WrappedContainer::new();
        wc.launch();
        wc.assign(wc.attempt_id);
        wc.launched();
        wc.pull();
        assert_eq!(wc.state(), ContainerState::Running);

        let events = wc.completed(false);
        assert_eq!(wc.state(), ContainerState::Completed);
        assert_eq!(event_types(&events), vec!["Attempt::ContainerTerminated"]);

        // Late success report from the worker; no further events.
        let events = wc.attempt_succeeded(wc.attempt_id);
        assert!(events.is_empty());
        assert!(!wc.is_in_error_state());
    }

    #[test]
    fn test_preemption_at_running() {
        let mut wc = WrappedContainer::new();
        wc.launch();
        wc.assign(wc.attempt_id);
        wc.launched();
        wc.pull();
        assert_eq!(wc.state(), ContainerState::Running);

        let events = wc.completed(true);
        assert_eq!(wc.state(), ContainerState::Completed);
        assert_eq!(event_types(&events), vec!["Attempt::ContainerPreempted"]);

        let events = wc.attempt_succeeded(wc.attempt_id);
        assert!(events.is_empty());
        assert!(!wc.is_in_error_state());
    }

    #[test]
    fn test_task_assigned_to_completed_container() {
        let mut wc = WrappedContainer::new();
        wc.launch();
        wc.launched();
        wc.assign(wc.attempt_id);
        wc.pull();
        wc.attempt_succeeded(wc.attempt_id);
        wc.completed(false);
        assert_eq!(wc.state(), ContainerState::Completed);

        let second = wc.attempt(2);
        let events = wc.assign(second);
        assert_eq!(event_types(&events), vec!["Attempt::ContainerTerminated"]);
        match &events[0] {
            AmEvent::Attempt { attempt_id, .. } => assert_eq!(*attempt_id, second),
            other => panic!("unexpected event {other:?}"),
        }
        assert!(wc.is_in_error_state());
    }

    #[test]
    fn test_task_pull_at_launching() {
        let mut wc = WrappedContainer::new();
        wc.launch();
        let task = wc.pull();
        assert_eq!(wc.state(), ContainerState::Launching);
        assert!(!task.should_die);
        assert!(task.task.is_none());
    }

    #[test]
    fn test_node_failed_at_idle() {
        let mut wc = WrappedContainer::new();
        wc.launch();
        wc.launched();
        wc.assign(wc.attempt_id);
        assert_eq!(wc.state(), ContainerState::Idle);

        let events = wc.node_failed();
        assert_eq!(wc.state(), ContainerState::Stopping);
        let mut types = event_types(&events);
        types.sort();
        assert_eq!(
            types,
            vec![
                "Attempt::ContainerTerminating",
                "Attempt::NodeFailed",
                "Scheduler::ContainerDeallocate",
            ]
        );
        for event in &events {
            if let AmEvent::Attempt {
                event: AttemptEvent::NodeFailed { diagnostics, .. },
                ..
            } = event
            {
                assert_eq!(diagnostics, "node failed");
            }
        }

        let events = wc.completed(false);
        assert_eq!(event_types(&events), vec!["Attempt::ContainerTerminated"]);
        assert!(!wc.is_in_error_state());
    }

    #[test]
    fn test_node_failed_at_idle_multiple_attempts() {
        let mut wc = WrappedContainer::new();
        wc.launch();
        wc.launched();
        wc.assign(wc.attempt_id);
        wc.pull();
        wc.attempt_succeeded(wc.attempt_id);

        let second = wc.attempt(2);
        wc.assign(second);
        wc.pull();
        wc.attempt_succeeded(second);
        assert_eq!(wc.state(), ContainerState::Idle);

        let events = wc.node_failed();
        assert_eq!(wc.state(), ContainerState::Stopping);
        let mut types = event_types(&events);
        types.sort();
        assert_eq!(
            types,
            vec![
                "Attempt::NodeFailed",
                "Attempt::NodeFailed",
                "Scheduler::ContainerDeallocate",
            ]
        );
        assert!(!wc.is_in_error_state());

        let events = wc.completed(false);
        assert!(events.is_empty());
        assert_eq!(wc.all_attempts().len(), 2);
    }

    #[test]
    fn test_node_failed_at_running_multiple_attempts() {
        let mut wc = WrappedContainer::new();
        wc.launch();
        wc.launched();
        wc.assign(wc.attempt_id);
        wc.pull();
        wc.attempt_succeeded(wc.attempt_id);

        let second = wc.attempt(2);
        wc.assign(second);
        wc.pull();
        assert_eq!(wc.state(), ContainerState::Running);

        let events = wc.node_failed();
        assert_eq!(wc.state(), ContainerState::Stopping);
        let mut types = event_types(&events);
        types.sort();
        assert_eq!(
            types,
            vec![
                "Attempt::ContainerTerminating",
                "Attempt::NodeFailed",
                "Attempt::NodeFailed",
                "Scheduler::ContainerDeallocate",
            ]
        );

        let events = wc.completed(false);
        assert_eq!(event_types(&events), vec!["Attempt::ContainerTerminated"]);
        assert!(!wc.is_in_error_state());
        assert_eq!(wc.all_attempts().len(), 2);
    }

    #[test]
    fn test_node_failed_at_completed_notifies_past_attempts() {
        let mut wc = WrappedContainer::new();
        wc.launch();
        wc.launched();
        wc.assign(wc.attempt_id);
        wc.pull();
        wc.attempt_succeeded(wc.attempt_id);

        let second = wc.attempt(2);
        wc.assign(second);
        wc.pull();
        wc.attempt_succeeded(second);
        wc.stop_request();
        wc.nm_stop_sent();
        wc.completed(false);
        assert_eq!(wc.state(), ContainerState::Completed);

        let events = wc.node_failed();
        let types = event_types(&events);
        assert_eq!(types, vec!["Attempt::NodeFailed", "Attempt::NodeFailed"]);
        assert_eq!(wc.all_attempts().len(), 2);
    }

    #[test]
    fn test_duplicate_completed_events() {
        let mut wc = WrappedContainer::new();
        wc.launch();
        wc.launched();
        wc.assign(wc.attempt_id);
        wc.pull();
        wc.attempt_succeeded(wc.attempt_id);
        wc.stop_request();
        wc.nm_stop_sent();

        let events = wc.completed(false);
        assert!(events.is_empty());

        let events = wc.completed(false);
        assert!(events.is_empty());
    }

    #[test]
    fn test_local_resource_deltas() {
        let mut wc = WrappedContainer::new();

        let rsrc = |name: &str| LocalResource {
            url: format!("http://localhost:2321/{name}"),
            size: 1,
            timestamp: 1000000,
        };

        wc.launch_with(HashMap::from([("rsrc1".to_string(), rsrc("rsrc1"))]), None);
        wc.launched();
        wc.assign(wc.attempt_id);
        let task1 = wc.pull();
        assert!(task1.additional_resources.is_empty());
        wc.attempt_succeeded(wc.attempt_id);

        // Two new resources arrive with the second attempt.
        let second = wc.attempt(2);
        wc.assign_with(
            second,
            HashMap::from([
                ("rsrc2".to_string(), rsrc("rsrc2")),
                ("rsrc3".to_string(), rsrc("rsrc3")),
            ]),
            None,
        );
        let task2 = wc.pull();
        assert_eq!(task2.additional_resources.len(), 2);
        assert!(task2.additional_resources.contains_key("rsrc2"));
        assert!(task2.additional_resources.contains_key("rsrc3"));
        wc.attempt_succeeded(second);

        assert_eq!(wc.container.local_resources().len(), 3);

        // Nothing new for the third attempt, so nothing is re-localised.
        let third = wc.attempt(3);
        wc.assign_with(third, HashMap::new(), None);
        let task3 = wc.pull();
        assert!(task3.additional_resources.is_empty());
        wc.attempt_succeeded(third);

        wc.completed(false);
        assert!(wc.container.local_resources().is_empty());
    }

    #[test]
    fn test_credentials_transfer_across_dags() {
        let mut wc = WrappedContainer::new();

        let creds = |alias: &str| {
            let mut c = Credentials::new();
            c.add_token(alias, b"secret".to_vec());
            c
        };

        let dag1_creds = creds("tokenDag1");
        let dag3_creds = creds("tokenDag3");

        wc.launch();
        wc.launched();

        // First attempt under DAG 1 ships the DAG 1 credentials.
        let a11 = wc.attempt_in_dag(1, 200);
        wc.assign_with(a11, HashMap::new(), Some(dag1_creds.clone()));
        let fetched = wc.pull();
        assert!(fetched.credentials_changed);
        assert!(fetched
            .credentials
            .as_ref()
            .unwrap()
            .get_token("tokenDag1")
            .is_some());
        wc.attempt_succeeded(a11);

        // Second attempt, same DAG: credentials suppressed.
        let a12 = wc.attempt_in_dag(1, 300);
        wc.assign_with(a12, HashMap::new(), Some(dag1_creds.clone()));
        let fetched = wc.pull();
        assert!(!fetched.credentials_changed);
        assert!(fetched.credentials.is_none());
        wc.attempt_succeeded(a12);

        // DAG 2 has no credentials: changed, but nothing shipped.
        let a21 = wc.attempt_in_dag(2, 200);
        wc.assign_with(a21, HashMap::new(), None);
        let fetched = wc.pull();
        assert!(fetched.credentials_changed);
        assert!(fetched.credentials.is_none());
        wc.attempt_succeeded(a21);

        let a22 = wc.attempt_in_dag(2, 300);
        wc.assign_with(a22, HashMap::new(), None);
        let fetched = wc.pull();
        assert!(!fetched.credentials_changed);
        assert!(fetched.credentials.is_none());
        wc.attempt_succeeded(a22);

        // DAG 3 brings fresh credentials; DAG 1 tokens are gone.
        let a31 = wc.attempt_in_dag(3, 200);
        wc.assign_with(a31, HashMap::new(), Some(dag3_creds.clone()));
        let fetched = wc.pull();
        assert!(fetched.credentials_changed);
        let shipped = fetched.credentials.unwrap();
        assert!(shipped.get_token("tokenDag3").is_some());
        assert!(shipped.get_token("tokenDag1").is_none());
        wc.attempt_succeeded(a31);

        let a32 = wc.attempt_in_dag(3, 300);
        wc.assign_with(a32, HashMap::new(), Some(dag1_creds));
        let fetched = wc.pull();
        assert!(!fetched.credentials_changed);
        assert!(fetched.credentials.is_none());
        wc.attempt_succeeded(a32);
    }

    #[test]
    fn test_container_profiling_appends_opts() {
        let mut wc = WrappedContainer::with_profiling("profileString");
        let events = wc.launch();
        assert_eq!(events.len(), 1);
        match &events[0] {
            AmEvent::Launcher(LauncherEvent::Launch { context, .. }) => {
                assert!(context.commands[0].contains("profileString"));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_assignment_stays_within_one_current_attempt() {
        // The queued/running occupancy invariant across the happy flow.
        let mut wc = WrappedContainer::new();
        wc.launch();
        wc.launched();
        for attempt_no in 1..=3 {
            let attempt = wc.attempt(attempt_no);
            wc.assign(attempt);
            assert!(wc.queued_attempt().is_some());
            assert!(wc.running_attempt().is_none());
            wc.pull();
            assert!(wc.queued_attempt().is_none());
            assert_eq!(wc.running_attempt(), Some(attempt));
            wc.attempt_succeeded(attempt);
            assert!(wc.running_attempt().is_none());
        }
        assert_eq!(wc.all_attempts().len(), 3);
    }
}
