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

//! In-process deployment: a resource manager that grants containers from a
//! local pool, for single-machine runs and tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use parking_lot::RwLock;

use arbalest_core::error::{ArbalestError, Result};
use arbalest_core::event_loop::EventSender;
use arbalest_core::ids::{ApplicationId, ContainerId, NodeId};

use crate::dispatcher::AmEvent;
use crate::rm::{ContainerAsk, ResourceManagerClient, SchedulerEvent};

/// Grants every ask immediately with a fresh container on the local node.
pub struct StandaloneResourceManager {
    app_id: ApplicationId,
    node: NodeId,
    next_container: AtomicU64,
    sender: RwLock<Option<EventSender<AmEvent>>>,
}

impl StandaloneResourceManager {
    pub fn new(app_id: ApplicationId, node: NodeId) -> Self {
        Self {
            app_id,
            node,
            next_container: AtomicU64::new(1),
            sender: RwLock::new(None),
        }
    }

    /// Wires the grant callbacks into the dispatcher loop.
    pub fn set_event_sender(&self, sender: EventSender<AmEvent>) {
        *self.sender.write() = Some(sender);
    }

    fn post(&self, event: AmEvent) -> Result<()> {
        match self.sender.read().as_ref() {
            Some(sender) => sender.post_event(event),
            None => Err(ArbalestError::General(
                "standalone resource manager is not wired to the dispatcher".to_string(),
            )),
        }
    }
}

#[async_trait]
impl ResourceManagerClient for StandaloneResourceManager {
    async fn request_containers(&self, asks: Vec<ContainerAsk>) -> Result<()> {
        for ask in asks {
            let container_id = ContainerId::new(
                self.app_id,
                self.next_container.fetch_add(1, Ordering::SeqCst),
            );
            debug!(
                "Standalone grant: {container_id} for priority {} ask",
                ask.priority
            );
            self.post(AmEvent::Scheduler(SchedulerEvent::ContainerAllocated {
                container_id,
                node: self.node.clone(),
                resource: ask.resource,
            }))?;
        }
        Ok(())
    }

    async fn release_container(&self, container_id: ContainerId) -> Result<()> {
        debug!("Standalone release: {container_id}");
        self.post(AmEvent::Scheduler(SchedulerEvent::ContainerCompleted {
            container_id,
            exit_status: 0,
            diagnostics: "released by the application master".to_string(),
            preempted: false,
        }))
    }
}
