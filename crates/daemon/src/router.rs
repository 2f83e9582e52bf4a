// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Assembles the axum `Router`, wiring routes and middleware in the
//! fixed order the control plane requires (§4.6): request ID, access
//! log, panic recovery, bearer auth — in that order, outermost first.

use axum::routing::get;
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;

use crate::middleware::{access_log, bearer_auth, request_id};
use crate::routes;
use crate::state::AppState;

pub fn build(state: AppState) -> Router {
    let admin = Router::new()
        .route("/admin/instances", get(routes::list_instances).post(routes::create_instance))
        .route(
            "/admin/instances/:port",
            get(routes::get_instance).patch(routes::update_instance).delete(routes::delete_instance),
        )
        .layer(axum::middleware::from_fn_with_state(state.clone(), bearer_auth));

    let unauthenticated = Router::new()
        .route("/healthz", get(routes::healthz))
        .route("/readyz", get(routes::readyz));

    admin
        .merge(unauthenticated)
        .layer(CatchPanicLayer::new())
        .layer(axum::middleware::from_fn(access_log))
        .layer(axum::middleware::from_fn(request_id))
        .with_state(state)
}
