//! # Parlor Gateway
//!
//! HTTP and WebSocket surface of the chat server. REST handlers keep the
//! persisted state in step with the live [`parlor_hub::Hub`]; the WebSocket
//! route hands authenticated sockets to the hub as connection actors.

mod error;
mod session;
mod state;
mod transport;

pub mod routes;

pub use error::{ApiError, ErrorResponse};
pub use session::{session_token, CurrentUser};
pub use state::AppState;
pub use transport::WebSocketTransport;

use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, Method,
    },
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/signup", post(routes::auth::signup))
        .route("/login", post(routes::auth::login))
        .route("/logout", post(routes::auth::logout))
        .route("/users", get(routes::auth::current_user))
        // Room routes
        .route("/rooms", get(routes::rooms::list_rooms))
        .route("/rooms/create", post(routes::rooms::create_room))
        .route("/rooms/join", post(routes::rooms::join_room))
        .route("/rooms/leave", post(routes::rooms::leave_room))
        .route("/rooms/:room_id", delete(routes::rooms::delete_room))
        .route(
            "/rooms/:room_id/messages",
            get(routes::rooms::list_messages),
        )
        // WebSocket route
        .route("/rooms/connect", get(routes::websocket::connect))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static(session::SESSION_HEADER),
        ])
}
