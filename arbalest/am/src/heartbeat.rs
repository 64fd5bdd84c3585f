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

//! Heartbeat watchdogs for containers and attempts.
//!
//! Every worker RPC pings the monitors; a periodic sweep times out entries
//! that stayed silent past the configured expiry. Cancellation is expressed
//! purely through state transitions, the worker learns of it with
//! `should_die` on its next RPC.

use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use log::{debug, warn};

use arbalest_core::config::AmConfig;
use arbalest_core::event_loop::EventSender;
use arbalest_core::ids::{ContainerId, TaskAttemptId};

use crate::dispatcher::AmEvent;
use crate::state::container::{ContainerEvent, ContainerHeartbeatKeeper};
use crate::state::task_attempt::AttemptEvent;

/// Tracks the last sign of life per entity.
pub struct HeartbeatMonitor<K: Eq + Hash + Clone> {
    entries: DashMap<K, Instant>,
    timeout: Duration,
}

impl<K: Eq + Hash + Clone + std::fmt::Debug> HeartbeatMonitor<K> {
    pub fn new(timeout: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            timeout,
        }
    }

    pub fn register(&self, key: K) {
        self.entries.insert(key, Instant::now());
    }

    pub fn unregister(&self, key: &K) {
        self.entries.remove(key);
    }

    pub fn ping(&self, key: &K) {
        if let Some(mut entry) = self.entries.get_mut(key) {
            *entry = Instant::now();
        } else {
            debug!("Ping for unmonitored entity {key:?}");
        }
    }

    pub fn is_registered(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Removes and returns every entry that stayed silent past the expiry.
    pub fn expired(&self) -> Vec<K> {
        let now = Instant::now();
        let expired: Vec<K> = self
            .entries
            .iter()
            .filter(|entry| now.duration_since(*entry.value()) > self.timeout)
            .map(|entry| entry.key().clone())
            .collect();
        for key in &expired {
            self.entries.remove(key);
        }
        expired
    }
}

impl ContainerHeartbeatKeeper for HeartbeatMonitor<ContainerId> {
    fn register(&self, container_id: ContainerId) {
        HeartbeatMonitor::register(self, container_id);
    }

    fn unregister(&self, container_id: ContainerId) {
        HeartbeatMonitor::unregister(self, &container_id);
    }
}

/// Spawns the periodic expiry sweep; timed-out entities re-enter the bus as
/// timeout events.
pub fn start_heartbeat_sweeper(
    config: &AmConfig,
    containers: Arc<HeartbeatMonitor<ContainerId>>,
    attempts: Arc<HeartbeatMonitor<TaskAttemptId>>,
    sender: EventSender<AmEvent>,
) -> tokio::task::JoinHandle<()> {
    let interval = Duration::from_millis(config.heartbeat_interval_ms.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            for container_id in containers.expired() {
                warn!("Container {container_id} heartbeat timed out");
                if sender
                    .post_event(AmEvent::Container {
                        container_id,
                        event: ContainerEvent::TimedOut,
                    })
                    .is_err()
                {
                    return;
                }
            }
            for attempt_id in attempts.expired() {
                warn!("Attempt {attempt_id} heartbeat timed out");
                if sender
                    .post_event(AmEvent::Attempt {
                        attempt_id,
                        event: AttemptEvent::TimedOut,
                    })
                    .is_err()
                {
                    return;
                }
            }
        }
    })
}
