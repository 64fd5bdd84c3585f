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

//! The DAG submission plan and the value types shipped to workers.
//!
//! A [DagPlan] is immutable after submission: a set of vertices and directed
//! edges, each carrying opaque descriptors for the worker-side processor,
//! input and output libraries, plus the plugin descriptors the application
//! master instantiates by name.

use std::collections::{BTreeMap, HashMap};

use crate::ids::TaskAttemptId;

/// Scheduling priority; lower numeric values are considered earlier by the
/// resource manager communicator.
pub type Priority = u32;

/// Named opaque payload describing a pluggable entity (processor, edge
/// manager, vertex manager, input, output).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EntityDescriptor {
    pub name: String,
    pub payload: Vec<u8>,
}

impl EntityDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload: vec![],
        }
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }
}

/// A named input or output attached to a vertex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IoDescriptor {
    pub name: String,
    pub descriptor: EntityDescriptor,
}

/// Size of a container ask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resource {
    pub memory_mb: u64,
    pub vcores: u32,
}

impl Resource {
    pub fn new(memory_mb: u64, vcores: u32) -> Self {
        Self { memory_mb, vcores }
    }
}

impl Default for Resource {
    fn default() -> Self {
        Self {
            memory_mb: 1024,
            vcores: 1,
        }
    }
}

/// A file localised into a container before the worker starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalResource {
    pub url: String,
    pub size: u64,
    pub timestamp: u64,
}

/// Opaque security tokens shipped to workers. Minting them is out of scope;
/// the application master only transfers them, suppressing re-sends while the
/// container keeps running tasks of the same DAG.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Credentials {
    tokens: BTreeMap<String, Vec<u8>>,
}

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_token(&mut self, alias: impl Into<String>, secret: Vec<u8>) {
        self.tokens.insert(alias.into(), secret);
    }

    pub fn get_token(&self, alias: &str) -> Option<&[u8]> {
        self.tokens.get(alias).map(|t| t.as_slice())
    }

    pub fn tokens(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.tokens.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

/// Everything a worker needs to run one task attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    pub attempt_id: TaskAttemptId,
    pub vertex_name: String,
    pub processor: EntityDescriptor,
    pub inputs: Vec<IoDescriptor>,
    pub outputs: Vec<IoDescriptor>,
}

/// Response payload of the worker task pull.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerTask {
    /// The worker must exit; the container is unknown, errored or terminal.
    pub should_die: bool,
    /// `None` with `should_die == false` means "nothing queued yet, retry".
    pub task: Option<TaskSpec>,
    /// Only the delta against what the container already localised.
    pub additional_resources: HashMap<String, LocalResource>,
    pub credentials: Option<Credentials>,
    pub credentials_changed: bool,
}

impl ContainerTask {
    /// The sentinel returned for containers the AM does not recognise.
    pub fn for_invalid_worker() -> Self {
        Self {
            should_die: true,
            task: None,
            additional_resources: HashMap::new(),
            credentials: None,
            credentials_changed: false,
        }
    }

    /// "Nothing queued yet" response; the worker retries.
    pub fn empty() -> Self {
        Self {
            should_die: false,
            task: None,
            additional_resources: HashMap::new(),
            credentials: None,
            credentials_changed: false,
        }
    }
}

/// Well-known edge manager plugin names.
pub mod edge_managers {
    pub const ONE_TO_ONE: &str = "one_to_one";
    pub const SCATTER_GATHER: &str = "scatter_gather";
    pub const BROADCAST: &str = "broadcast";
}

/// Well-known vertex manager plugin names.
pub mod vertex_managers {
    pub const IMMEDIATE_START: &str = "immediate_start";
    pub const SHUFFLE: &str = "shuffle";
}

/// One parallel stage of the DAG.
#[derive(Debug, Clone)]
pub struct VertexPlan {
    pub name: String,
    pub processor: EntityDescriptor,
    /// `None` defers parallelism to the vertex manager plugin.
    pub parallelism: Option<u32>,
    pub resource: Resource,
    pub vertex_manager: EntityDescriptor,
    pub inputs: Vec<IoDescriptor>,
    pub outputs: Vec<IoDescriptor>,
    /// Whether this vertex's output requires commit arbitration.
    pub commits_output: bool,
    /// Fraction of tasks allowed to fail without failing the vertex.
    pub failure_tolerance: f64,
    pub local_resources: HashMap<String, LocalResource>,
}

impl VertexPlan {
    pub fn new(name: impl Into<String>, processor: EntityDescriptor) -> Self {
        Self {
            name: name.into(),
            processor,
            parallelism: None,
            resource: Resource::default(),
            vertex_manager: EntityDescriptor::new(vertex_managers::IMMEDIATE_START),
            inputs: vec![],
            outputs: vec![],
            commits_output: false,
            failure_tolerance: 0.0,
            local_resources: HashMap::new(),
        }
    }

    pub fn with_parallelism(mut self, parallelism: u32) -> Self {
        self.parallelism = Some(parallelism);
        self
    }

    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.resource = resource;
        self
    }

    pub fn with_vertex_manager(mut self, descriptor: EntityDescriptor) -> Self {
        self.vertex_manager = descriptor;
        self
    }

    pub fn with_input(mut self, input: IoDescriptor) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn with_output(mut self, output: IoDescriptor) -> Self {
        self.outputs.push(output);
        self
    }

    pub fn with_commits_output(mut self, commits: bool) -> Self {
        self.commits_output = commits;
        self
    }

    pub fn with_failure_tolerance(mut self, tolerance: f64) -> Self {
        self.failure_tolerance = tolerance;
        self
    }

    pub fn with_local_resource(
        mut self,
        name: impl Into<String>,
        resource: LocalResource,
    ) -> Self {
        self.local_resources.insert(name.into(), resource);
        self
    }
}

/// A producer → consumer edge with its routing plugin.
#[derive(Debug, Clone)]
pub struct EdgePlan {
    pub producer: String,
    pub consumer: String,
    pub edge_manager: EntityDescriptor,
}

impl EdgePlan {
    pub fn new(
        producer: impl Into<String>,
        consumer: impl Into<String>,
        edge_manager: EntityDescriptor,
    ) -> Self {
        Self {
            producer: producer.into(),
            consumer: consumer.into(),
            edge_manager,
        }
    }
}

/// The user-submitted DAG. Validated as acyclic at submission.
#[derive(Debug, Clone)]
pub struct DagPlan {
    pub name: String,
    pub vertices: Vec<VertexPlan>,
    pub edges: Vec<EdgePlan>,
    pub credentials: Option<Credentials>,
}

impl DagPlan {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vertices: vec![],
            edges: vec![],
            credentials: None,
        }
    }

    pub fn add_vertex(mut self, vertex: VertexPlan) -> Self {
        self.vertices.push(vertex);
        self
    }

    pub fn add_edge(mut self, edge: EdgePlan) -> Self {
        self.edges.push(edge);
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }
}
