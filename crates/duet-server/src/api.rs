use std::sync::Arc;

use axum::{
    extract::{Path, State, WebSocketUpgrade},
    http::{HeaderValue, Method},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use duet_shared::types::{Message, UserId};
use duet_store::User;

use crate::config::ServerConfig;
use crate::dispatcher::RelayDispatcher;
use crate::error::ServerError;
use crate::history::HistoryService;
use crate::registry::ChannelRegistry;
use crate::session;
use crate::store::MessageStore;

#[derive(Clone)]
pub struct AppState {
    pub store: MessageStore,
    pub registry: ChannelRegistry,
    pub dispatcher: Arc<RelayDispatcher>,
    pub history: HistoryService,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Wire the relay components around one store.
    pub fn new(store: MessageStore, config: ServerConfig) -> Self {
        let registry = ChannelRegistry::new();
        let dispatcher = Arc::new(RelayDispatcher::new(
            store.clone(),
            registry.clone(),
            config.max_content_len,
        ));
        let history = HistoryService::new(store.clone());

        Self {
            store,
            registry,
            dispatcher,
            history,
            config: Arc::new(config),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(allowed_origin(&state.config.cors_origin))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/login", post(login))
        .route("/api/messages/:user_id/:other_user_id", get(conversation))
        .route("/ws", get(ws_upgrade))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn allowed_origin(origin: &str) -> AllowOrigin {
    if origin == "*" {
        return AllowOrigin::any();
    }
    match HeaderValue::from_str(origin) {
        Ok(value) => AllowOrigin::exact(value),
        Err(_) => {
            warn!(origin, "Invalid CORS origin, allowing none");
            AllowOrigin::list(Vec::<HeaderValue>::new())
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    connected_users: usize,
}

#[derive(Deserialize)]
struct LoginRequest {
    username: String,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        connected_users: state.registry.user_count().await,
    })
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<User>, ServerError> {
    let user = state.store.login(req.username).await?;
    info!(user_id = %user.id, username = %user.username, "User logged in");
    Ok(Json(user))
}

async fn conversation(
    State(state): State<AppState>,
    Path((user_id, other_user_id)): Path<(String, String)>,
) -> Result<Json<Vec<Message>>, ServerError> {
    let user_id = parse_user_id(&user_id)?;
    let other_user_id = parse_user_id(&other_user_id)?;

    let messages = state
        .history
        .get_conversation(user_id, other_user_id)
        .await
        .map_err(ServerError::Storage)?;
    Ok(Json(messages))
}

fn parse_user_id(raw: &str) -> Result<UserId, ServerError> {
    raw.parse()
        .map_err(|e: duet_shared::ProtocolError| ServerError::BadRequest(e.to_string()))
}

async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| session::run_session(socket, state))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn state() -> (tempfile::TempDir, AppState) {
        let dir = tempfile::tempdir().unwrap();
        let store = MessageStore::open(Some(&dir.path().join("api.db"))).unwrap();
        (dir, AppState::new(store, ServerConfig::default()))
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn login_request(username: &str) -> Request<Body> {
        Request::post("/api/login")
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({ "username": username }).to_string(),
            ))
            .unwrap()
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (_dir, state) = state();
        let response = build_router(state)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["connected_users"], 0);
    }

    #[tokio::test]
    async fn login_is_stable_per_username() {
        let (_dir, state) = state();
        let app = build_router(state);

        let first = body_json(app.clone().oneshot(login_request("alice")).await.unwrap()).await;
        let second = body_json(app.clone().oneshot(login_request("alice")).await.unwrap()).await;
        let other = body_json(app.oneshot(login_request("bob")).await.unwrap()).await;

        assert_eq!(first["username"], "alice");
        assert_eq!(first["id"], second["id"]);
        assert_ne!(first["id"], other["id"]);
    }

    #[tokio::test]
    async fn blank_login_is_bad_request() {
        let (_dir, state) = state();
        let response = build_router(state)
            .oneshot(login_request("  "))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn history_empty_then_filled() {
        let (_dir, state) = state();
        let alice = state.store.login("alice".into()).await.unwrap().id;
        let bob = state.store.login("bob".into()).await.unwrap().id;
        let app = build_router(state.clone());
        let uri = format!("/api/messages/{alice}/{bob}");

        let response = app
            .clone()
            .oneshot(Request::get(uri.as_str()).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, serde_json::json!([]));

        state.store.append(alice, bob, "hi".into()).await.unwrap();

        let response = app
            .oneshot(Request::get(uri.as_str()).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body[0]["content"], "hi");
        assert_eq!(body[0]["sender_id"], alice.0);
        assert_eq!(body[0]["receiver_id"], bob.0);
        assert_eq!(body[0]["sender_name"], "alice");
    }

    #[tokio::test]
    async fn history_storage_failure_is_500_without_data() {
        let (dir, state) = state();
        let alice = state.store.login("alice".into()).await.unwrap().id;
        let bob = state.store.login("bob".into()).await.unwrap().id;
        state.store.append(alice, bob, "hi".into()).await.unwrap();

        let other = duet_store::Database::open_at(&dir.path().join("api.db")).unwrap();
        other.conn().execute_batch("DROP TABLE messages").unwrap();

        let uri = format!("/api/messages/{alice}/{bob}");
        let response = build_router(state)
            .oneshot(Request::get(uri.as_str()).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({ "error": "Database error" })
        );
    }

    #[tokio::test]
    async fn history_rejects_non_numeric_ids() {
        let (_dir, state) = state();
        let response = build_router(state)
            .oneshot(Request::get("/api/messages/alice/2").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
