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

//! Domain → protobuf conversions.

use std::collections::HashMap;

use crate::events::{Counters, WorkerEvent};
use crate::ids::{ApplicationId, ContainerId, DagId, TaskAttemptId, TaskId, VertexId};
use crate::plan::{
    ContainerTask, Credentials, EntityDescriptor, IoDescriptor, LocalResource, TaskSpec,
};
use crate::serde::protobuf;

impl From<ApplicationId> for protobuf::ApplicationIdProto {
    fn from(id: ApplicationId) -> Self {
        protobuf::ApplicationIdProto {
            cluster_timestamp: id.cluster_timestamp,
            id: id.id,
        }
    }
}

impl From<DagId> for protobuf::DagIdProto {
    fn from(id: DagId) -> Self {
        protobuf::DagIdProto {
            application_id: Some(id.application_id.into()),
            id: id.id,
        }
    }
}

impl From<VertexId> for protobuf::VertexIdProto {
    fn from(id: VertexId) -> Self {
        protobuf::VertexIdProto {
            dag_id: Some(id.dag_id.into()),
            id: id.id,
        }
    }
}

impl From<TaskId> for protobuf::TaskIdProto {
    fn from(id: TaskId) -> Self {
        protobuf::TaskIdProto {
            vertex_id: Some(id.vertex_id.into()),
            id: id.id,
        }
    }
}

impl From<TaskAttemptId> for protobuf::TaskAttemptIdProto {
    fn from(id: TaskAttemptId) -> Self {
        protobuf::TaskAttemptIdProto {
            task_id: Some(id.task_id.into()),
            id: id.id,
        }
    }
}

impl From<ContainerId> for protobuf::ContainerIdProto {
    fn from(id: ContainerId) -> Self {
        protobuf::ContainerIdProto {
            application_id: Some(id.application_id.into()),
            id: id.id,
        }
    }
}

impl From<EntityDescriptor> for protobuf::EntityDescriptorProto {
    fn from(descriptor: EntityDescriptor) -> Self {
        protobuf::EntityDescriptorProto {
            name: descriptor.name,
            payload: descriptor.payload,
        }
    }
}

impl From<IoDescriptor> for protobuf::IoDescriptorProto {
    fn from(descriptor: IoDescriptor) -> Self {
        protobuf::IoDescriptorProto {
            name: descriptor.name,
            descriptor: Some(descriptor.descriptor.into()),
        }
    }
}

impl From<Credentials> for protobuf::CredentialsProto {
    fn from(credentials: Credentials) -> Self {
        protobuf::CredentialsProto {
            tokens: credentials
                .tokens()
                .map(|(alias, secret)| protobuf::TokenProto {
                    alias: alias.to_string(),
                    secret: secret.to_vec(),
                })
                .collect(),
        }
    }
}

impl From<TaskSpec> for protobuf::TaskSpecProto {
    fn from(spec: TaskSpec) -> Self {
        protobuf::TaskSpecProto {
            attempt_id: Some(spec.attempt_id.into()),
            vertex_name: spec.vertex_name,
            processor: Some(spec.processor.into()),
            inputs: spec.inputs.into_iter().map(|i| i.into()).collect(),
            outputs: spec.outputs.into_iter().map(|o| o.into()).collect(),
        }
    }
}

fn local_resources_to_proto(
    resources: HashMap<String, LocalResource>,
) -> Vec<protobuf::LocalResourceProto> {
    let mut protos: Vec<protobuf::LocalResourceProto> = resources
        .into_iter()
        .map(|(name, resource)| protobuf::LocalResourceProto {
            name,
            url: resource.url,
            size: resource.size,
            timestamp: resource.timestamp,
        })
        .collect();
    // Deterministic wire order keeps idempotent replays byte-identical.
    protos.sort_by(|a, b| a.name.cmp(&b.name));
    protos
}

impl From<ContainerTask> for protobuf::ContainerTask {
    fn from(task: ContainerTask) -> Self {
        protobuf::ContainerTask {
            should_die: task.should_die,
            task_spec: task.task.map(|t| t.into()),
            additional_resources: local_resources_to_proto(task.additional_resources),
            credentials: task.credentials.map(|c| c.into()),
            credentials_changed: task.credentials_changed,
        }
    }
}

impl From<Counters> for protobuf::CountersProto {
    fn from(counters: Counters) -> Self {
        protobuf::CountersProto {
            counters: counters
                .counters
                .into_iter()
                .map(|c| protobuf::CounterProto {
                    name: c.name,
                    value: c.value,
                })
                .collect(),
        }
    }
}

impl From<WorkerEvent> for protobuf::WorkerEventProto {
    fn from(event: WorkerEvent) -> Self {
        use protobuf::worker_event_proto::Event;

        let event = match event {
            WorkerEvent::DataMovement(e) => {
                Event::DataMovement(protobuf::DataMovementEventProto {
                    source_index: e.source_index,
                    target_index: e.target_index,
                    version: e.version,
                    user_payload: e.user_payload,
                })
            }
            WorkerEvent::InputFailed(e) => {
                Event::InputFailed(protobuf::InputFailedEventProto {
                    source_index: e.source_index,
                    target_index: e.target_index,
                    version: e.version,
                })
            }
            WorkerEvent::InputReadError(e) => {
                Event::InputReadError(protobuf::InputReadErrorEventProto {
                    diagnostics: e.diagnostics,
                    index: e.index,
                    version: e.version,
                })
            }
            WorkerEvent::VertexManager(e) => {
                Event::VertexManager(protobuf::VertexManagerEventProto {
                    target_vertex: e.target_vertex,
                    user_payload: e.user_payload,
                })
            }
            WorkerEvent::CompositeDataMovement(e) => {
                Event::CompositeDataMovement(protobuf::CompositeDataMovementEventProto {
                    source_index: e.source_index,
                    count: e.count,
                    user_payload: e.user_payload,
                })
            }
            WorkerEvent::TaskStatusUpdate(e) => {
                Event::TaskStatusUpdate(protobuf::TaskStatusUpdateEventProto {
                    progress: e.progress,
                    counters: e.counters.map(|c| c.into()),
                })
            }
            WorkerEvent::TaskAttemptCompleted(_) => {
                Event::TaskAttemptCompleted(protobuf::TaskAttemptCompletedEventProto {})
            }
            WorkerEvent::TaskAttemptFailed(e) => {
                Event::TaskAttemptFailed(protobuf::TaskAttemptFailedEventProto {
                    diagnostics: e.diagnostics,
                })
            }
        };
        protobuf::WorkerEventProto { event: Some(event) }
    }
}
