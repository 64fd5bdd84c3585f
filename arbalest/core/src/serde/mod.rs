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

//! Conversions between the domain model and its protobuf wire form.
//!
//! The generated code is checked in under `generated/`; see `build.rs` for
//! how to refresh it after changing the proto file.

use crate::error::ArbalestError;

pub mod generated;

pub mod from_proto;
pub mod to_proto;

pub use generated::arbalest as protobuf;

pub(crate) fn proto_error<S: Into<String>>(message: S) -> ArbalestError {
    ArbalestError::General(message.into())
}

#[cfg(test)]
mod tests {
    use crate::events::{
        CompositeDataMovementEvent, InputFailedEvent, WorkerEvent,
    };
    use crate::serde::protobuf;

    #[test]
    fn test_input_failed_event_round_trip() {
        let event = WorkerEvent::InputFailed(InputFailedEvent {
            source_index: 7,
            target_index: 11,
            version: 3,
        });

        let proto: protobuf::WorkerEventProto = event.clone().into();
        let decoded: WorkerEvent = proto.try_into().unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_composite_expansion_survives_round_trip() {
        let composite = CompositeDataMovementEvent::new(5, 4, b"partition".to_vec());

        let expanded: Vec<WorkerEvent> = composite
            .expand(1)
            .map(WorkerEvent::DataMovement)
            .collect();

        let decoded: Vec<WorkerEvent> = expanded
            .iter()
            .cloned()
            .map(|e| {
                let proto: protobuf::WorkerEventProto = e.into();
                proto.try_into().unwrap()
            })
            .collect();

        assert_eq!(decoded.len(), 4);
        for (i, event) in decoded.iter().enumerate() {
            match event {
                WorkerEvent::DataMovement(dm) => {
                    assert_eq!(dm.source_index, 5);
                    assert_eq!(dm.target_index, 5 + i as u32);
                    assert_eq!(dm.user_payload, b"partition".to_vec());
                }
                other => panic!("expected data movement event, got {other:?}"),
            }
        }
    }
}
