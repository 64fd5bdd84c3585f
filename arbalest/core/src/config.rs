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

//! Application master configuration

/// Configuration for the Arbalest application master.
#[derive(Debug, Clone)]
pub struct AmConfig {
    /// The bind host for the task listener gRPC service.
    pub bind_host: String,
    /// The bind port for the task listener gRPC service.
    pub bind_port: u16,
    /// Number of concurrent requests the task listener will serve.
    pub task_listener_threads: usize,
    /// Numeric container ids that get the profiling opts appended to their
    /// launch command.
    pub profile_containers: Vec<u64>,
    /// JVM-opts string appended to the launch command of profiled containers.
    pub profile_jvm_opts: String,
    /// Command used to start the worker process inside a container.
    pub worker_command: String,
    /// Maximum attempts per task before the task fails.
    pub task_max_attempts: usize,
    /// Interval between heartbeat-expiry sweeps, in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// A container or attempt silent for longer than this is timed out.
    pub heartbeat_timeout_ms: u64,
    /// Whether rescheduled attempts get the single-step priority boost over
    /// fresh attempts of the same vertex. The boost makes sense for faulty
    /// tasks, less so for reschedules caused by lost outputs.
    pub reschedule_priority_boost: bool,
}

impl Default for AmConfig {
    fn default() -> Self {
        Self {
            bind_host: "localhost".to_string(),
            bind_port: 50060,
            task_listener_threads: 4,
            profile_containers: vec![],
            profile_jvm_opts: String::new(),
            worker_command: "arbalest-worker".to_string(),
            task_max_attempts: 4,
            heartbeat_interval_ms: 1000,
            heartbeat_timeout_ms: 60000,
            reschedule_priority_boost: true,
        }
    }
}

impl AmConfig {
    pub fn listener_address(&self) -> String {
        format!("{}:{}", self.bind_host, self.bind_port)
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.bind_host = hostname.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.bind_port = port;
        self
    }

    pub fn with_task_listener_threads(mut self, threads: usize) -> Self {
        self.task_listener_threads = threads;
        self
    }

    pub fn with_profile_containers(mut self, containers: Vec<u64>) -> Self {
        self.profile_containers = containers;
        self
    }

    pub fn with_profile_jvm_opts(mut self, opts: impl Into<String>) -> Self {
        self.profile_jvm_opts = opts.into();
        self
    }

    pub fn with_worker_command(mut self, command: impl Into<String>) -> Self {
        self.worker_command = command.into();
        self
    }

    pub fn with_task_max_attempts(mut self, max_attempts: usize) -> Self {
        self.task_max_attempts = max_attempts;
        self
    }

    pub fn with_heartbeat_interval_ms(mut self, interval_ms: u64) -> Self {
        self.heartbeat_interval_ms = interval_ms;
        self
    }

    pub fn with_heartbeat_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.heartbeat_timeout_ms = timeout_ms;
        self
    }

    pub fn with_reschedule_priority_boost(mut self, boost: bool) -> Self {
        self.reschedule_priority_boost = boost;
        self
    }
}
