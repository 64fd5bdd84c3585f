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

//! The worker event family: the values shuttled between worker tasks and the
//! application master inside heartbeats, and routed between producer and
//! consumer tasks by the edge managers.

/// Notification from a producer output that a partition is ready for a
/// consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataMovementEvent {
    /// Index of the physical output that generated the data.
    pub source_index: u32,
    /// Index of the physical input meant to receive this event.
    pub target_index: u32,
    /// Attempt number of the producer that generated this event.
    pub version: u32,
    pub user_payload: Vec<u8>,
}

/// Tells an input that one of its sources is no longer available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputFailedEvent {
    pub source_index: u32,
    pub target_index: u32,
    pub version: u32,
}

/// A consumer task reporting that it could not read one of its inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputReadErrorEvent {
    pub diagnostics: String,
    /// Physical input index on the reporting task.
    pub index: u32,
    /// Producer attempt version whose output could not be read.
    pub version: u32,
}

/// Opaque payload addressed to a vertex manager plugin by vertex name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexManagerEvent {
    pub target_vertex: String,
    pub user_payload: Vec<u8>,
}

/// Compact representation of a run of data movement events.
///
/// Expands at the consumer into `count` [DataMovementEvent]s with target
/// indices `[source_index, source_index + count)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeDataMovementEvent {
    pub source_index: u32,
    pub count: u32,
    pub user_payload: Vec<u8>,
}

impl CompositeDataMovementEvent {
    pub fn new(source_index: u32, count: u32, user_payload: Vec<u8>) -> Self {
        Self {
            source_index,
            count,
            user_payload,
        }
    }

    /// Expands into per-destination data movement events, stamped with the
    /// given producer attempt version.
    pub fn expand(&self, version: u32) -> impl Iterator<Item = DataMovementEvent> + '_ {
        (0..self.count).map(move |i| DataMovementEvent {
            source_index: self.source_index,
            target_index: self.source_index + i,
            version,
            user_payload: self.user_payload.clone(),
        })
    }
}

/// A single named counter reported by a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Counter {
    pub name: String,
    pub value: i64,
}

/// Counters reported alongside task progress.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Counters {
    pub counters: Vec<Counter>,
}

/// Periodic progress report from a running attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskStatusUpdateEvent {
    pub progress: f32,
    pub counters: Option<Counters>,
}

/// The worker reports its current attempt finished successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TaskAttemptCompletedEvent {}

/// The worker reports its current attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskAttemptFailedEvent {
    pub diagnostics: String,
}

/// Sum type of everything a heartbeat can carry.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    DataMovement(DataMovementEvent),
    InputFailed(InputFailedEvent),
    InputReadError(InputReadErrorEvent),
    VertexManager(VertexManagerEvent),
    CompositeDataMovement(CompositeDataMovementEvent),
    TaskStatusUpdate(TaskStatusUpdateEvent),
    TaskAttemptCompleted(TaskAttemptCompletedEvent),
    TaskAttemptFailed(TaskAttemptFailedEvent),
}

impl WorkerEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            WorkerEvent::DataMovement(_) => "DataMovement",
            WorkerEvent::InputFailed(_) => "InputFailed",
            WorkerEvent::InputReadError(_) => "InputReadError",
            WorkerEvent::VertexManager(_) => "VertexManager",
            WorkerEvent::CompositeDataMovement(_) => "CompositeDataMovement",
            WorkerEvent::TaskStatusUpdate(_) => "TaskStatusUpdate",
            WorkerEvent::TaskAttemptCompleted(_) => "TaskAttemptCompleted",
            WorkerEvent::TaskAttemptFailed(_) => "TaskAttemptFailed",
        }
    }
}
