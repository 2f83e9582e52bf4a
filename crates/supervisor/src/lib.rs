// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Supervisor Client (spec §4.3): a typed, fault-mapping wrapper around
//! the supervisor's XML-RPC process-control API.

mod client;
mod xmlrpc;

pub use client::{
    parse_instance_state, HttpSupervisorClient, ProcessInfo, SupervisorClient, SupervisorError,
};
pub use xmlrpc::{decode_response, encode_call, MethodResponse, Value, XmlRpcError};
