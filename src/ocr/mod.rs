pub mod dto;
pub mod engine;
pub mod handlers;
pub mod preprocess;
mod repo;
mod repo_types;
pub mod services;
mod tsv;

pub(crate) use repo::image_keys_by_user;

use crate::state::AppState;
use axum::Router;

pub fn router(max_upload_mb: usize) -> Router<AppState> {
    Router::new()
        .merge(handlers::read_routes())
        .merge(handlers::write_routes(max_upload_mb))
}
