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

//! Hierarchical identifiers for the entities managed by the application
//! master.
//!
//! `ApplicationId → DagId → VertexId → TaskId → TaskAttemptId`; each id is a
//! value type, totally ordered, and carries its parent as a prefix.
//! `ContainerId` is independent of the hierarchy: it is minted by the
//! resource manager.

use std::fmt::{Display, Formatter};

/// Identifies one submission of the application master to the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApplicationId {
    /// Cluster start timestamp, disambiguates ids across cluster restarts.
    pub cluster_timestamp: u64,
    pub id: u32,
}

impl ApplicationId {
    pub fn new(cluster_timestamp: u64, id: u32) -> Self {
        Self {
            cluster_timestamp,
            id,
        }
    }
}

impl Display for ApplicationId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "application_{}_{:04}", self.cluster_timestamp, self.id)
    }
}

/// Identifies one DAG submitted to an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DagId {
    pub application_id: ApplicationId,
    pub id: u32,
}

impl DagId {
    pub fn new(application_id: ApplicationId, id: u32) -> Self {
        Self { application_id, id }
    }
}

impl Display for DagId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "dag_{}_{:04}_{}",
            self.application_id.cluster_timestamp, self.application_id.id, self.id
        )
    }
}

/// Identifies one vertex of a DAG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VertexId {
    pub dag_id: DagId,
    pub id: u32,
}

impl VertexId {
    pub fn new(dag_id: DagId, id: u32) -> Self {
        Self { dag_id, id }
    }
}

impl Display for VertexId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "vertex_{}_{:02}", self.dag_id, self.id)
    }
}

/// Identifies one parallel task of a vertex, by `(vertex, index)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId {
    pub vertex_id: VertexId,
    pub id: u32,
}

impl TaskId {
    pub fn new(vertex_id: VertexId, id: u32) -> Self {
        Self { vertex_id, id }
    }
}

impl Display for TaskId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "task_{}_{:06}", self.vertex_id, self.id)
    }
}

/// Identifies one execution try of a task. Rescheduled attempts get a fresh
/// number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskAttemptId {
    pub task_id: TaskId,
    pub id: u32,
}

impl TaskAttemptId {
    pub fn new(task_id: TaskId, id: u32) -> Self {
        Self { task_id, id }
    }

    pub fn vertex_id(&self) -> VertexId {
        self.task_id.vertex_id
    }

    pub fn dag_id(&self) -> DagId {
        self.task_id.vertex_id.dag_id
    }
}

impl Display for TaskAttemptId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "attempt_{}_{}", self.task_id, self.id)
    }
}

/// A resource-manager minted lease identifier. Not part of the DAG id
/// hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContainerId {
    pub application_id: ApplicationId,
    pub id: u64,
}

impl ContainerId {
    pub fn new(application_id: ApplicationId, id: u64) -> Self {
        Self { application_id, id }
    }
}

impl Display for ContainerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "container_{}_{:06}", self.application_id, self.id)
    }
}

/// Identity of a worker node as reported by the resource manager.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId {
    pub host: String,
    pub port: u16,
}

impl NodeId {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
