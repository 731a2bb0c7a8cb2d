pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use crate::http::server::AppState;
use self::auth::admin_auth_middleware;
use self::handlers::*;

/// Routes of the console API.
///
/// The setup flow (`/api/users/admin/*`) is open by necessity: no account
/// exists yet to authenticate with. Management routes need the API key.
pub fn setup_admin_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/users", get(list_users))
        .route_layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware));

    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/users/admin/check", get(admin_check))
        .route("/api/users/admin/init", post(admin_init))
        .merge(protected)
        .with_state(state)
}
