pub mod auth;
pub mod health;
pub mod rooms;
pub mod websocket;
