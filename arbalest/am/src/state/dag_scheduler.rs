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

//! Natural-order DAG scheduling: priorities follow the vertex topology so
//! that upstream vertices always run ahead of their consumers.

use arbalest_core::plan::Priority;

/// Assigns scheduling priorities from the vertex distance-from-root. Lower
/// numeric priority means earlier consideration by the resource manager
/// communicator.
pub struct NaturalOrderScheduler {
    reschedule_priority_boost: bool,
}

impl NaturalOrderScheduler {
    pub fn new(reschedule_priority_boost: bool) -> Self {
        Self {
            reschedule_priority_boost,
        }
    }

    /// `priority = 2 * (distance + 1)`, one less for rescheduled attempts.
    ///
    /// The doubled spacing leaves exactly one gap per vertex for reschedules
    /// to outrun fresh attempts of the same vertex, which fails faulty tasks
    /// fast. Reschedules caused by lost outputs get the same bump, which may
    /// not be desirable; the boost can be switched off.
    pub fn priority(&self, distance_from_root: u32, is_rescheduled: bool) -> Priority {
        let priority = (distance_from_root + 1) * 2;
        if is_rescheduled && self.reschedule_priority_boost {
            priority - 1
        } else {
            priority
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priorities_follow_distance() {
        let scheduler = NaturalOrderScheduler::new(true);
        assert_eq!(scheduler.priority(0, false), 2);
        assert_eq!(scheduler.priority(1, false), 4);
        assert_eq!(scheduler.priority(2, false), 6);
    }

    #[test]
    fn test_reschedules_take_the_odd_slot() {
        let scheduler = NaturalOrderScheduler::new(true);
        assert_eq!(scheduler.priority(0, true), 1);
        assert_eq!(scheduler.priority(1, true), 3);
    }

    #[test]
    fn test_reschedule_boost_can_be_disabled() {
        let scheduler = NaturalOrderScheduler::new(false);
        assert_eq!(scheduler.priority(1, true), 4);
    }

    #[test]
    fn test_every_vertex_outranks_its_consumers() {
        let scheduler = NaturalOrderScheduler::new(true);
        for distance in 0..16 {
            let fresh = scheduler.priority(distance, false);
            let rescheduled = scheduler.priority(distance, true);
            let downstream = scheduler.priority(distance + 1, true);
            assert!(rescheduled < fresh);
            assert!(fresh < downstream);
        }
    }
}
