use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::state::AppState;

pub mod dto;
pub mod handlers;
pub mod repo;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users/register", post(handlers::register))
        .route("/users/login", post(handlers::login))
        .route("/users/", get(handlers::list_users))
        .route("/users/:id", delete(handlers::delete_user))
}
