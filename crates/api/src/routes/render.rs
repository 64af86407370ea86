use axum::routing::post;
use axum::Router;

use crate::handlers::render;
use crate::state::AppState;

/// Job submission routes.
///
/// ```text
/// POST /render-full-episode     render_full_episode
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/render-full-episode", post(render::render_full_episode))
}
