//! Trio signaling server binary.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::HeaderValue,
    response::{Html, IntoResponse, Json},
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use trio_signaling::config::Config;
use trio_signaling::protocol::{ClientMessage, ServerMessage};
use trio_signaling::session::{Control, Session};
use trio_signaling::state::AppState;
use trio_signaling::store::{PresenceStore as _, RoomStore as _};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.log_level))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let state = Arc::new(AppState::new(config.clone()));

    // Presence sweeper: bounds storage if a connection's cleanup was missed.
    let sweep_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_state.config.sweep_interval);
        loop {
            interval.tick().await;
            if let Err(e) = sweep_state.presence.sweep_expired().await {
                tracing::warn!(error = %e, "presence sweep failed");
            }
        }
    });

    let cors = if config.cors_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    let app = Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .with_state(state.clone());

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Trio signaling server started");
    tracing::info!("Address: {}", addr);
    tracing::info!("WebSocket: ws://{}/ws", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

async fn index_handler() -> Html<&'static str> {
    Html("<h1>Trio Signaling Server</h1><p>WebSocket endpoint: /ws</p>")
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "server": "trio-signaling-rs",
        "timestamp": std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }))
}

async fn stats_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let active_users = state.presence.active_count().await.unwrap_or(0);
    let open_rooms = state.rooms.count().await.unwrap_or(0);
    Json(serde_json::json!({
        "active_users": active_users,
        "open_rooms": open_rooms,
    }))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, params))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, params: HashMap<String, String>) {
    // Authentication is fatal on failure: no presence or room side effects,
    // the socket simply closes.
    let user = match state.auth.authenticate(&params).await {
        Ok(user) => user,
        Err(e) => {
            tracing::warn!(error = %e, "connection refused");
            return;
        }
    };

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Ok(json) = serde_json::to_string(&msg) {
                if ws_sender.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
        }
    });

    let connection_id = Uuid::new_v4().to_string();
    let mut session =
        match Session::connect(state.clone(), connection_id, user, tx.clone()).await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(error = %e, "failed to register connection");
                send_task.abort();
                return;
            }
        };

    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(msg) => {
                    if session.handle(msg).await == Control::Close {
                        break;
                    }
                }
                Err(e) => {
                    // Reject the event, keep the connection.
                    tracing::warn!(
                        connection_id = %session.connection_id(),
                        error = %e,
                        "malformed client message"
                    );
                    let _ = tx.send(ServerMessage::Error {
                        code: "bad_request".to_string(),
                        message: "unrecognized message".to_string(),
                    });
                }
            },
            Ok(Message::Close(_)) => break,
            Err(_) => break,
            _ => {}
        }
    }

    // Sole cleanup path, whatever ended the loop.
    session.shutdown().await;
    send_task.abort();
}
