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

//! Arbalest application master binary (standalone deployment).

use std::env;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use arbalest_am::launcher::StandaloneLauncher;
use arbalest_am::server::AmServer;
use arbalest_am::standalone::StandaloneResourceManager;
use arbalest_core::config::AmConfig;
use arbalest_core::error::Result;
use arbalest_core::ids::{ApplicationId, NodeId};

#[derive(Debug, Parser)]
#[command(name = "arbalest-am", about = "Arbalest DAG application master")]
struct Opt {
    /// Bind host for the task listener gRPC service.
    #[arg(long, default_value = "localhost")]
    bind_host: String,

    /// Bind port for the task listener gRPC service.
    #[arg(long, default_value_t = 50060)]
    bind_port: u16,

    /// Number of concurrent requests the task listener serves.
    #[arg(long, default_value_t = 4)]
    task_listener_threads: usize,

    /// Maximum attempts per task before the task fails.
    #[arg(long, default_value_t = 4)]
    task_max_attempts: usize,

    /// Comma-separated numeric container ids to attach profiling opts to.
    #[arg(long, value_delimiter = ',')]
    profile_containers: Vec<u64>,

    /// Opts string appended to the launch command of profiled containers.
    #[arg(long, default_value = "")]
    profile_jvm_opts: String,

    /// Command used to start the worker process inside a container.
    #[arg(long, default_value = "arbalest-worker")]
    worker_command: String,

    /// Interval between heartbeat-expiry sweeps, in milliseconds.
    #[arg(long, default_value_t = 1000)]
    heartbeat_interval_ms: u64,

    /// Containers and attempts silent for longer than this are timed out.
    #[arg(long, default_value_t = 60000)]
    heartbeat_timeout_ms: u64,

    /// Log level used when RUST_LOG is not set.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_io()
        .enable_time()
        .build()
        .unwrap();

    runtime.block_on(inner())
}

async fn inner() -> Result<()> {
    let opt = Opt::parse();

    let rust_log = env::var(EnvFilter::DEFAULT_ENV);
    let log_filter = EnvFilter::new(rust_log.unwrap_or(opt.log_level.clone()));
    tracing_subscriber::fmt()
        .with_ansi(false)
        .with_env_filter(log_filter)
        .init();

    let config = AmConfig::default()
        .with_hostname(opt.bind_host)
        .with_port(opt.bind_port)
        .with_task_listener_threads(opt.task_listener_threads)
        .with_task_max_attempts(opt.task_max_attempts)
        .with_profile_containers(opt.profile_containers)
        .with_profile_jvm_opts(opt.profile_jvm_opts)
        .with_worker_command(opt.worker_command)
        .with_heartbeat_interval_ms(opt.heartbeat_interval_ms)
        .with_heartbeat_timeout_ms(opt.heartbeat_timeout_ms);

    let app_id = ApplicationId::new(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default(),
        1,
    );
    let node = NodeId::new(config.bind_host.clone(), config.bind_port);
    let rm = Arc::new(StandaloneResourceManager::new(app_id, node));

    let mut server = AmServer::new(config, app_id, rm.clone(), Arc::new(StandaloneLauncher));
    let sender = server.start()?;
    rm.set_event_sender(sender);

    let (_addr, listener) = server.serve_listener().await?;

    tokio::signal::ctrl_c().await?;
    log::info!("Shutting down");
    server.stop();
    listener.abort();
    Ok(())
}
