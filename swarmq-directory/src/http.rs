//! HTTP query and admin surface
//!
//! Thin projections over the registration database. Every handler copies its
//! snapshot out of the DB and serializes outside the lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde_json::json;

use swarmq_common::{is_valid_channel_name, is_valid_topic_name};

use crate::directory::Directory;
use crate::registration::{unix_nanos, Registration, RegistrationDb};

pub fn router(directory: Arc<Directory>) -> Router {
    Router::new()
        .route("/ping", get(|| async { "OK" }))
        .route("/info", get(info))
        .route("/lookup", get(lookup))
        .route("/topics", get(topics))
        .route("/channels", get(channels))
        .route("/nodes", get(nodes))
        .route("/topic/create", post(topic_create))
        .route("/topic/delete", post(topic_delete))
        .route("/channel/create", post(channel_create))
        .route("/channel/delete", post(channel_delete))
        .route("/tombstone_topic_producer", post(tombstone_topic_producer))
        .with_state(directory)
}

type Params = Query<HashMap<String, String>>;

fn api_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "message": message }))).into_response()
}

async fn info() -> Json<serde_json::Value> {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn lookup(State(directory): State<Arc<Directory>>, Query(params): Params) -> Response {
    let Some(topic) = params.get("topic") else {
        return api_error(StatusCode::BAD_REQUEST, "MISSING_ARG_TOPIC");
    };

    let db = &directory.db;
    if db.find_registrations("topic", topic, "").is_empty() {
        return api_error(StatusCode::NOT_FOUND, "TOPIC_NOT_FOUND");
    }

    let channels: Vec<String> = db
        .find_registrations("channel", topic, "*")
        .into_iter()
        .map(|r| r.subkey)
        .collect();
    let producers = RegistrationDb::filter_by_active(
        db.find_producers("topic", topic, ""),
        Duration::from_millis(directory.config.inactive_producer_timeout),
        Duration::from_millis(directory.config.tombstone_lifetime),
    );

    Json(json!({
        "channels": channels,
        "producers": producers,
    }))
    .into_response()
}

async fn topics(State(directory): State<Arc<Directory>>) -> Json<serde_json::Value> {
    let topics: Vec<String> = directory
        .db
        .find_registrations("topic", "*", "")
        .into_iter()
        .map(|r| r.key)
        .collect();
    Json(json!({ "topics": topics }))
}

async fn channels(State(directory): State<Arc<Directory>>, Query(params): Params) -> Response {
    let Some(topic) = params.get("topic") else {
        return api_error(StatusCode::BAD_REQUEST, "MISSING_ARG_TOPIC");
    };

    let channels: Vec<String> = directory
        .db
        .find_registrations("channel", topic, "*")
        .into_iter()
        .map(|r| r.subkey)
        .collect();
    Json(json!({ "channels": channels })).into_response()
}

async fn nodes(State(directory): State<Arc<Directory>>) -> Json<serde_json::Value> {
    let db = &directory.db;
    // tombstoned producers are still nodes, so no tombstone filtering here
    let producers = RegistrationDb::filter_by_active(
        db.find_producers("client", "", ""),
        Duration::from_millis(directory.config.inactive_producer_timeout),
        Duration::ZERO,
    );

    let now = unix_nanos();
    let tombstone_lifetime = Duration::from_millis(directory.config.tombstone_lifetime);
    let nodes: Vec<serde_json::Value> = producers
        .iter()
        .map(|p| {
            let topics: Vec<String> = db
                .lookup_registrations(&p.peer_info.id)
                .into_iter()
                .filter(|r| r.category == "topic")
                .map(|r| r.key)
                .collect();
            // tombstone state is per producer record, reported per topic
            let tombstones: Vec<bool> = topics
                .iter()
                .map(|_| p.is_tombstoned(now, tombstone_lifetime))
                .collect();

            json!({
                "remote_address": p.peer_info.remote_address,
                "hostname": p.peer_info.hostname,
                "broadcast_address": p.peer_info.broadcast_address,
                "tcp_port": p.peer_info.tcp_port,
                "http_port": p.peer_info.http_port,
                "version": p.peer_info.version,
                "tombstones": tombstones,
                "topics": topics,
            })
        })
        .collect();

    Json(json!({ "producers": nodes }))
}

async fn topic_create(State(directory): State<Arc<Directory>>, Query(params): Params) -> Response {
    let Some(topic) = params.get("topic") else {
        return api_error(StatusCode::BAD_REQUEST, "MISSING_ARG_TOPIC");
    };
    if !is_valid_topic_name(topic) {
        return api_error(StatusCode::BAD_REQUEST, "INVALID_ARG_TOPIC");
    }

    tracing::info!("DB: adding topic({})", topic);
    directory
        .db
        .add_registration(Registration::new("topic", topic.as_str(), ""));
    "OK".into_response()
}

async fn topic_delete(State(directory): State<Arc<Directory>>, Query(params): Params) -> Response {
    let Some(topic) = params.get("topic") else {
        return api_error(StatusCode::BAD_REQUEST, "MISSING_ARG_TOPIC");
    };

    let db = &directory.db;
    let registrations = db.find_registrations("topic", topic, "");
    if registrations.is_empty() {
        return api_error(StatusCode::NOT_FOUND, "TOPIC_NOT_FOUND");
    }

    for r in db.find_registrations("channel", topic, "*") {
        tracing::info!("DB: removing channel({}) from topic({})", r.subkey, topic);
        db.remove_registration(&r);
    }
    for r in registrations {
        tracing::info!("DB: removing topic({})", topic);
        db.remove_registration(&r);
    }
    "OK".into_response()
}

async fn channel_create(
    State(directory): State<Arc<Directory>>,
    Query(params): Params,
) -> Response {
    let (Some(topic), Some(channel)) = (params.get("topic"), params.get("channel")) else {
        return api_error(StatusCode::BAD_REQUEST, "MISSING_ARG_TOPIC_OR_CHANNEL");
    };
    if !is_valid_topic_name(topic) {
        return api_error(StatusCode::BAD_REQUEST, "INVALID_ARG_TOPIC");
    }
    if !is_valid_channel_name(channel) {
        return api_error(StatusCode::BAD_REQUEST, "INVALID_ARG_CHANNEL");
    }

    let db = &directory.db;
    tracing::info!("DB: adding channel({}) in topic({})", channel, topic);
    db.add_registration(Registration::new("channel", topic.as_str(), channel.as_str()));
    db.add_registration(Registration::new("topic", topic.as_str(), ""));
    "OK".into_response()
}

async fn channel_delete(
    State(directory): State<Arc<Directory>>,
    Query(params): Params,
) -> Response {
    let (Some(topic), Some(channel)) = (params.get("topic"), params.get("channel")) else {
        return api_error(StatusCode::BAD_REQUEST, "MISSING_ARG_TOPIC_OR_CHANNEL");
    };

    let db = &directory.db;
    let registrations = db.find_registrations("channel", topic, channel);
    if registrations.is_empty() {
        return api_error(StatusCode::NOT_FOUND, "CHANNEL_NOT_FOUND");
    }

    for r in registrations {
        tracing::info!("DB: removing channel({}) from topic({})", r.subkey, topic);
        db.remove_registration(&r);
    }
    "OK".into_response()
}

async fn tombstone_topic_producer(
    State(directory): State<Arc<Directory>>,
    Query(params): Params,
) -> Response {
    let (Some(topic), Some(node)) = (params.get("topic"), params.get("node")) else {
        return api_error(StatusCode::BAD_REQUEST, "MISSING_ARG_TOPIC_OR_NODE");
    };
    if !is_valid_topic_name(topic) {
        return api_error(StatusCode::BAD_REQUEST, "INVALID_ARG_TOPIC");
    }

    tracing::info!("DB: setting tombstone for producer({}) in topic({})", node, topic);
    directory
        .db
        .tombstone_topic_producer(topic, node, unix_nanos());
    "OK".into_response()
}
