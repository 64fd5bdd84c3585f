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

//! Protobuf → domain conversions.

use std::collections::HashMap;

use crate::error::ArbalestError;
use crate::events::{
    CompositeDataMovementEvent, Counter, Counters, DataMovementEvent, InputFailedEvent,
    InputReadErrorEvent, TaskAttemptCompletedEvent, TaskAttemptFailedEvent,
    TaskStatusUpdateEvent, VertexManagerEvent, WorkerEvent,
};
use crate::ids::{
    ApplicationId, ContainerId, DagId, TaskAttemptId, TaskId, VertexId,
};
use crate::plan::{
    ContainerTask, Credentials, EntityDescriptor, IoDescriptor, LocalResource, TaskSpec,
};
use crate::serde::{proto_error, protobuf};

impl From<protobuf::ApplicationIdProto> for ApplicationId {
    fn from(proto: protobuf::ApplicationIdProto) -> Self {
        ApplicationId::new(proto.cluster_timestamp, proto.id)
    }
}

impl TryFrom<protobuf::DagIdProto> for DagId {
    type Error = ArbalestError;

    fn try_from(proto: protobuf::DagIdProto) -> Result<Self, Self::Error> {
        let application_id = proto
            .application_id
            .ok_or_else(|| proto_error("DagIdProto is missing application_id"))?;
        Ok(DagId::new(application_id.into(), proto.id))
    }
}

impl TryFrom<protobuf::VertexIdProto> for VertexId {
    type Error = ArbalestError;

    fn try_from(proto: protobuf::VertexIdProto) -> Result<Self, Self::Error> {
        let dag_id = proto
            .dag_id
            .ok_or_else(|| proto_error("VertexIdProto is missing dag_id"))?;
        Ok(VertexId::new(dag_id.try_into()?, proto.id))
    }
}

impl TryFrom<protobuf::TaskIdProto> for TaskId {
    type Error = ArbalestError;

    fn try_from(proto: protobuf::TaskIdProto) -> Result<Self, Self::Error> {
        let vertex_id = proto
            .vertex_id
            .ok_or_else(|| proto_error("TaskIdProto is missing vertex_id"))?;
        Ok(TaskId::new(vertex_id.try_into()?, proto.id))
    }
}

impl TryFrom<protobuf::TaskAttemptIdProto> for TaskAttemptId {
    type Error = ArbalestError;

    fn try_from(proto: protobuf::TaskAttemptIdProto) -> Result<Self, Self::Error> {
        let task_id = proto
            .task_id
            .ok_or_else(|| proto_error("TaskAttemptIdProto is missing task_id"))?;
        Ok(TaskAttemptId::new(task_id.try_into()?, proto.id))
    }
}

impl TryFrom<protobuf::ContainerIdProto> for ContainerId {
    type Error = ArbalestError;

    fn try_from(proto: protobuf::ContainerIdProto) -> Result<Self, Self::Error> {
        let application_id = proto
            .application_id
            .ok_or_else(|| proto_error("ContainerIdProto is missing application_id"))?;
        Ok(ContainerId::new(application_id.into(), proto.id))
    }
}

impl From<protobuf::EntityDescriptorProto> for EntityDescriptor {
    fn from(proto: protobuf::EntityDescriptorProto) -> Self {
        EntityDescriptor {
            name: proto.name,
            payload: proto.payload,
        }
    }
}

impl TryFrom<protobuf::IoDescriptorProto> for IoDescriptor {
    type Error = ArbalestError;

    fn try_from(proto: protobuf::IoDescriptorProto) -> Result<Self, Self::Error> {
        let descriptor = proto
            .descriptor
            .ok_or_else(|| proto_error("IoDescriptorProto is missing descriptor"))?;
        Ok(IoDescriptor {
            name: proto.name,
            descriptor: descriptor.into(),
        })
    }
}

impl From<protobuf::CredentialsProto> for Credentials {
    fn from(proto: protobuf::CredentialsProto) -> Self {
        let mut credentials = Credentials::new();
        for token in proto.tokens {
            credentials.add_token(token.alias, token.secret);
        }
        credentials
    }
}

impl TryFrom<protobuf::TaskSpecProto> for TaskSpec {
    type Error = ArbalestError;

    fn try_from(proto: protobuf::TaskSpecProto) -> Result<Self, Self::Error> {
        let attempt_id = proto
            .attempt_id
            .ok_or_else(|| proto_error("TaskSpecProto is missing attempt_id"))?;
        let processor = proto
            .processor
            .ok_or_else(|| proto_error("TaskSpecProto is missing processor"))?;
        Ok(TaskSpec {
            attempt_id: attempt_id.try_into()?,
            vertex_name: proto.vertex_name,
            processor: processor.into(),
            inputs: proto
                .inputs
                .into_iter()
                .map(|i| i.try_into())
                .collect::<Result<Vec<_>, _>>()?,
            outputs: proto
                .outputs
                .into_iter()
                .map(|o| o.try_into())
                .collect::<Result<Vec<_>, _>>()?,
        })
    }
}

impl TryFrom<protobuf::ContainerTask> for ContainerTask {
    type Error = ArbalestError;

    fn try_from(proto: protobuf::ContainerTask) -> Result<Self, Self::Error> {
        let task = proto.task_spec.map(|t| t.try_into()).transpose()?;
        let mut additional_resources = HashMap::new();
        for resource in proto.additional_resources {
            additional_resources.insert(
                resource.name,
                LocalResource {
                    url: resource.url,
                    size: resource.size,
                    timestamp: resource.timestamp,
                },
            );
        }
        Ok(ContainerTask {
            should_die: proto.should_die,
            task,
            additional_resources,
            credentials: proto.credentials.map(|c| c.into()),
            credentials_changed: proto.credentials_changed,
        })
    }
}

impl From<protobuf::CountersProto> for Counters {
    fn from(proto: protobuf::CountersProto) -> Self {
        Counters {
            counters: proto
                .counters
                .into_iter()
                .map(|c| Counter {
                    name: c.name,
                    value: c.value,
                })
                .collect(),
        }
    }
}

impl TryFrom<protobuf::WorkerEventProto> for WorkerEvent {
    type Error = ArbalestError;

    fn try_from(proto: protobuf::WorkerEventProto) -> Result<Self, Self::Error> {
        use protobuf::worker_event_proto::Event;

        let event = proto
            .event
            .ok_or_else(|| proto_error("WorkerEventProto is missing its payload"))?;
        Ok(match event {
            Event::DataMovement(e) => WorkerEvent::DataMovement(DataMovementEvent {
                source_index: e.source_index,
                target_index: e.target_index,
                version: e.version,
                user_payload: e.user_payload,
            }),
            Event::InputFailed(e) => WorkerEvent::InputFailed(InputFailedEvent {
                source_index: e.source_index,
                target_index: e.target_index,
                version: e.version,
            }),
            Event::InputReadError(e) => {
                WorkerEvent::InputReadError(InputReadErrorEvent {
                    diagnostics: e.diagnostics,
                    index: e.index,
                    version: e.version,
                })
            }
            Event::VertexManager(e) => WorkerEvent::VertexManager(VertexManagerEvent {
                target_vertex: e.target_vertex,
                user_payload: e.user_payload,
            }),
            Event::CompositeDataMovement(e) => {
                WorkerEvent::CompositeDataMovement(CompositeDataMovementEvent {
                    source_index: e.source_index,
                    count: e.count,
                    user_payload: e.user_payload,
                })
            }
            Event::TaskStatusUpdate(e) => {
                WorkerEvent::TaskStatusUpdate(TaskStatusUpdateEvent {
                    progress: e.progress,
                    counters: e.counters.map(|c| c.into()),
                })
            }
            Event::TaskAttemptCompleted(_) => {
                WorkerEvent::TaskAttemptCompleted(TaskAttemptCompletedEvent {})
            }
            Event::TaskAttemptFailed(e) => {
                WorkerEvent::TaskAttemptFailed(TaskAttemptFailedEvent {
                    diagnostics: e.diagnostics,
                })
            }
        })
    }
}
