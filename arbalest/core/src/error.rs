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

//! Arbalest error types

use std::{
    error::Error,
    fmt::{Display, Formatter},
    io, result,
};

/// Result type alias for Arbalest operations.
pub type Result<T> = result::Result<T, ArbalestError>;

/// Arbalest error types for the DAG application master.
#[derive(Debug)]
pub enum ArbalestError {
    /// General error with a descriptive message.
    General(String),
    /// Internal error indicating a bug or an invariant violation. These fail
    /// the running DAG.
    Internal(String),
    /// Configuration error with invalid settings.
    Configuration(String),
    /// The submitted DAG plan is invalid (cycle, unknown vertex, ...).
    InvalidDagPlan(String),
    /// I/O operation error.
    IoError(io::Error),
    /// gRPC transport error.
    TonicError(tonic::transport::Error),
    /// gRPC status error.
    GrpcError(Box<tonic::Status>),
    /// gRPC connection failure.
    GrpcConnectionError(String),
    /// Tokio task join error.
    TokioError(tokio::task::JoinError),
    /// Protobuf decoding error.
    DecodeError(prost::DecodeError),
    /// Operation was cancelled.
    Cancelled,
}

#[allow(clippy::from_over_into)]
impl<T> Into<Result<T>> for ArbalestError {
    fn into(self) -> Result<T> {
        Err(self)
    }
}

/// Creates a general Arbalest error from a string message.
pub fn arbalest_error(message: &str) -> ArbalestError {
    ArbalestError::General(message.to_owned())
}

impl From<String> for ArbalestError {
    fn from(e: String) -> Self {
        ArbalestError::General(e)
    }
}

impl From<io::Error> for ArbalestError {
    fn from(e: io::Error) -> Self {
        ArbalestError::IoError(e)
    }
}

impl From<tonic::transport::Error> for ArbalestError {
    fn from(e: tonic::transport::Error) -> Self {
        ArbalestError::TonicError(e)
    }
}

impl From<tonic::Status> for ArbalestError {
    fn from(e: tonic::Status) -> Self {
        ArbalestError::GrpcError(Box::new(e))
    }
}

impl From<tokio::task::JoinError> for ArbalestError {
    fn from(e: tokio::task::JoinError) -> Self {
        ArbalestError::TokioError(e)
    }
}

impl From<prost::DecodeError> for ArbalestError {
    fn from(e: prost::DecodeError) -> Self {
        ArbalestError::DecodeError(e)
    }
}

impl Display for ArbalestError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            ArbalestError::General(desc) => write!(f, "General error: {desc}"),
            ArbalestError::Internal(desc) => {
                write!(f, "Internal error: {desc}. This was likely caused by a bug in Arbalest, please report this issue.")
            }
            ArbalestError::Configuration(desc) => {
                write!(f, "Configuration error: {desc}")
            }
            ArbalestError::InvalidDagPlan(desc) => {
                write!(f, "Invalid DAG plan: {desc}")
            }
            ArbalestError::IoError(e) => write!(f, "IO error: {e}"),
            ArbalestError::TonicError(e) => write!(f, "Tonic error: {e}"),
            ArbalestError::GrpcError(e) => write!(f, "gRPC error: {e}"),
            ArbalestError::GrpcConnectionError(desc) => {
                write!(f, "gRPC connection error: {desc}")
            }
            ArbalestError::TokioError(e) => write!(f, "Tokio join error: {e}"),
            ArbalestError::DecodeError(e) => {
                write!(f, "Protobuf decoding error: {e}")
            }
            ArbalestError::Cancelled => write!(f, "Operation cancelled"),
        }
    }
}

impl Error for ArbalestError {}

impl From<ArbalestError> for tonic::Status {
    fn from(e: ArbalestError) -> Self {
        match e {
            ArbalestError::Internal(desc) => tonic::Status::internal(desc),
            ArbalestError::Cancelled => tonic::Status::cancelled("operation cancelled"),
            other => tonic::Status::internal(other.to_string()),
        }
    }
}
