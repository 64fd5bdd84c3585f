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

//! Edge manager plugins.
//!
//! An edge manager defines the bi-directional routing of events between the
//! tasks of a producer vertex and the tasks of a consumer vertex, as a pure
//! function of cardinalities and indices. Routing maps are keyed by the
//! destination task's physical input index; values are the destination task
//! indices receiving the event on that input.

use std::collections::HashMap;

use arbalest_core::error::{ArbalestError, Result};
use arbalest_core::events::{DataMovementEvent, InputReadErrorEvent};
use arbalest_core::plan::{edge_managers, EntityDescriptor};

/// Routing between the physical outputs of producer tasks and the physical
/// inputs of consumer tasks.
///
/// Implementations must be deterministic: the same event and indices always
/// produce the same routing map.
pub trait EdgeManager: Send + Sync {
    /// Number of physical inputs on the given destination task.
    fn num_destination_task_physical_inputs(
        &self,
        num_source_tasks: u32,
        dest_task_index: u32,
    ) -> u32;

    /// Number of physical outputs on the given source task.
    fn num_source_task_physical_outputs(
        &self,
        num_dest_tasks: u32,
        src_task_index: u32,
    ) -> u32;

    /// Number of destination tasks consuming data from the given source task.
    fn num_destination_consumer_tasks(
        &self,
        src_task_index: u32,
        num_dest_tasks: u32,
    ) -> u32;

    /// Routing for a data movement event produced by `src_task_index`.
    fn route_data_movement_event_to_destination(
        &self,
        event: &DataMovementEvent,
        src_task_index: u32,
        num_dest_tasks: u32,
    ) -> HashMap<u32, Vec<u32>>;

    /// Routing for the failure of a source task whose outputs are lost.
    /// Called once per source task failure; must cover all affected
    /// destinations.
    fn route_input_source_task_failed_event_to_destination(
        &self,
        src_task_index: u32,
        num_dest_tasks: u32,
    ) -> HashMap<u32, Vec<u32>>;

    /// The source task index that produced the unreadable input.
    fn route_input_error_event_to_source(
        &self,
        event: &InputReadErrorEvent,
        dest_task_index: u32,
    ) -> u32;
}

/// Instantiates an edge manager from its plan descriptor, by name.
pub fn create_edge_manager(descriptor: &EntityDescriptor) -> Result<Box<dyn EdgeManager>> {
    match descriptor.name.as_str() {
        edge_managers::ONE_TO_ONE => Ok(Box::new(OneToOneEdgeManager)),
        edge_managers::SCATTER_GATHER => Ok(Box::new(ScatterGatherEdgeManager)),
        edge_managers::BROADCAST => Ok(Box::new(BroadcastEdgeManager)),
        other => Err(ArbalestError::InvalidDagPlan(format!(
            "unknown edge manager: {other}"
        ))),
    }
}

/// Source task `i`'s single output feeds destination task `i`'s single input.
pub struct OneToOneEdgeManager;

impl EdgeManager for OneToOneEdgeManager {
    fn num_destination_task_physical_inputs(
        &self,
        _num_source_tasks: u32,
        _dest_task_index: u32,
    ) -> u32 {
        1
    }

    fn num_source_task_physical_outputs(
        &self,
        _num_dest_tasks: u32,
        _src_task_index: u32,
    ) -> u32 {
        1
    }

    fn num_destination_consumer_tasks(
        &self,
        _src_task_index: u32,
        _num_dest_tasks: u32,
    ) -> u32 {
        1
    }

    fn route_data_movement_event_to_destination(
        &self,
        _event: &DataMovementEvent,
        src_task_index: u32,
        num_dest_tasks: u32,
    ) -> HashMap<u32, Vec<u32>> {
        if num_dest_tasks == 0 {
            return HashMap::new();
        }
        HashMap::from([(0, vec![src_task_index])])
    }

    fn route_input_source_task_failed_event_to_destination(
        &self,
        src_task_index: u32,
        num_dest_tasks: u32,
    ) -> HashMap<u32, Vec<u32>> {
        if num_dest_tasks == 0 {
            return HashMap::new();
        }
        HashMap::from([(0, vec![src_task_index])])
    }

    fn route_input_error_event_to_source(
        &self,
        _event: &InputReadErrorEvent,
        dest_task_index: u32,
    ) -> u32 {
        dest_task_index
    }
}

/// Each source task produces one partition per destination task; each
/// destination task gathers one input per source task.
pub struct ScatterGatherEdgeManager;

impl EdgeManager for ScatterGatherEdgeManager {
    fn num_destination_task_physical_inputs(
        &self,
        num_source_tasks: u32,
        _dest_task_index: u32,
    ) -> u32 {
        num_source_tasks
    }

    fn num_source_task_physical_outputs(
        &self,
        num_dest_tasks: u32,
        _src_task_index: u32,
    ) -> u32 {
        num_dest_tasks
    }

    fn num_destination_consumer_tasks(
        &self,
        _src_task_index: u32,
        num_dest_tasks: u32,
    ) -> u32 {
        num_dest_tasks
    }

    fn route_data_movement_event_to_destination(
        &self,
        event: &DataMovementEvent,
        src_task_index: u32,
        num_dest_tasks: u32,
    ) -> HashMap<u32, Vec<u32>> {
        if num_dest_tasks == 0 {
            return HashMap::new();
        }
        // Partition `target_index` of source task `s` lands on destination
        // task `target_index`, physical input `s`.
        HashMap::from([(src_task_index, vec![event.target_index])])
    }

    fn route_input_source_task_failed_event_to_destination(
        &self,
        src_task_index: u32,
        num_dest_tasks: u32,
    ) -> HashMap<u32, Vec<u32>> {
        if num_dest_tasks == 0 {
            return HashMap::new();
        }
        HashMap::from([(src_task_index, (0..num_dest_tasks).collect())])
    }

    fn route_input_error_event_to_source(
        &self,
        event: &InputReadErrorEvent,
        _dest_task_index: u32,
    ) -> u32 {
        event.index
    }
}

/// Every destination task reads the whole output of every source task.
pub struct BroadcastEdgeManager;

impl EdgeManager for BroadcastEdgeManager {
    fn num_destination_task_physical_inputs(
        &self,
        num_source_tasks: u32,
        _dest_task_index: u32,
    ) -> u32 {
        num_source_tasks
    }

    fn num_source_task_physical_outputs(
        &self,
        _num_dest_tasks: u32,
        _src_task_index: u32,
    ) -> u32 {
        1
    }

    fn num_destination_consumer_tasks(
        &self,
        _src_task_index: u32,
        num_dest_tasks: u32,
    ) -> u32 {
        num_dest_tasks
    }

    fn route_data_movement_event_to_destination(
        &self,
        _event: &DataMovementEvent,
        src_task_index: u32,
        num_dest_tasks: u32,
    ) -> HashMap<u32, Vec<u32>> {
        if num_dest_tasks == 0 {
            return HashMap::new();
        }
        HashMap::from([(src_task_index, (0..num_dest_tasks).collect())])
    }

    fn route_input_source_task_failed_event_to_destination(
        &self,
        src_task_index: u32,
        num_dest_tasks: u32,
    ) -> HashMap<u32, Vec<u32>> {
        if num_dest_tasks == 0 {
            return HashMap::new();
        }
        HashMap::from([(src_task_index, (0..num_dest_tasks).collect())])
    }

    fn route_input_error_event_to_source(
        &self,
        event: &InputReadErrorEvent,
        _dest_task_index: u32,
    ) -> u32 {
        event.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dm(source_index: u32, target_index: u32) -> DataMovementEvent {
        DataMovementEvent {
            source_index,
            target_index,
            version: 0,
            user_payload: vec![],
        }
    }

    #[test]
    fn test_one_to_one_identity_routing() {
        let manager = OneToOneEdgeManager;
        assert_eq!(manager.num_destination_task_physical_inputs(5, 2), 1);
        assert_eq!(manager.num_source_task_physical_outputs(5, 2), 1);
        assert_eq!(manager.num_destination_consumer_tasks(2, 5), 1);

        let routed = manager.route_data_movement_event_to_destination(&dm(0, 0), 3, 5);
        assert_eq!(routed, HashMap::from([(0, vec![3])]));

        let failed = manager.route_input_source_task_failed_event_to_destination(3, 5);
        assert_eq!(failed, HashMap::from([(0, vec![3])]));

        let error = InputReadErrorEvent {
            diagnostics: "fetch failed".to_string(),
            index: 0,
            version: 0,
        };
        assert_eq!(manager.route_input_error_event_to_source(&error, 4), 4);
    }

    #[test]
    fn test_one_to_one_empty_edge_permitted() {
        let manager = OneToOneEdgeManager;
        assert!(manager
            .route_data_movement_event_to_destination(&dm(0, 0), 0, 0)
            .is_empty());
        assert!(manager
            .route_input_source_task_failed_event_to_destination(0, 0)
            .is_empty());
    }

    #[test]
    fn test_scatter_gather_routing() {
        let manager = ScatterGatherEdgeManager;
        assert_eq!(manager.num_destination_task_physical_inputs(4, 0), 4);
        assert_eq!(manager.num_source_task_physical_outputs(8, 0), 8);
        assert_eq!(manager.num_destination_consumer_tasks(0, 8), 8);

        // Source task 2, partition 5 -> destination task 5, input 2.
        let routed = manager.route_data_movement_event_to_destination(&dm(0, 5), 2, 8);
        assert_eq!(routed, HashMap::from([(2, vec![5])]));

        let failed = manager.route_input_source_task_failed_event_to_destination(2, 3);
        assert_eq!(failed, HashMap::from([(2, vec![0, 1, 2])]));

        // A destination failing to read input 2 points back at source task 2.
        let error = InputReadErrorEvent {
            diagnostics: "fetch failed".to_string(),
            index: 2,
            version: 0,
        };
        assert_eq!(manager.route_input_error_event_to_source(&error, 5), 2);
    }

    #[test]
    fn test_broadcast_routing() {
        let manager = BroadcastEdgeManager;
        assert_eq!(manager.num_destination_task_physical_inputs(4, 1), 4);
        assert_eq!(manager.num_source_task_physical_outputs(8, 1), 1);
        assert_eq!(manager.num_destination_consumer_tasks(1, 8), 8);

        let routed = manager.route_data_movement_event_to_destination(&dm(0, 0), 1, 3);
        assert_eq!(routed, HashMap::from([(1, vec![0, 1, 2])]));
    }

    #[test]
    fn test_routing_is_deterministic() {
        let manager = ScatterGatherEdgeManager;
        let event = dm(1, 6);
        let first = manager.route_data_movement_event_to_destination(&event, 3, 9);
        for _ in 0..10 {
            let again = manager.route_data_movement_event_to_destination(&event, 3, 9);
            assert_eq!(again, first);
        }
    }

    #[test]
    fn test_unknown_edge_manager_rejected() {
        let descriptor = EntityDescriptor::new("full_mesh");
        assert!(create_edge_manager(&descriptor).is_err());
    }
}
