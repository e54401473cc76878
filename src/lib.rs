//! HTTP gateway for uploading, browsing and downloading files kept in one or
//! more object-storage buckets, plus a client for it.

pub mod client;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;
pub mod services;
pub mod state;
pub mod utils;

pub use routes::routes::routes;
pub use state::AppState;
