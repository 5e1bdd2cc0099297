use axum::Router;
use axum::middleware;
use axum::routing::get;
use tower_http::trace::TraceLayer;

use crate::auth::{require_login, resolve_session};
use crate::handlers;
use crate::state::AppState;

/// Builds the application router.
///
/// The mutation routes sit behind `require_login`, which runs after the
/// session has been resolved and before any handler body.
pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/add-list/{user_id}", get(handlers::create_new_list))
        .route("/done-task/{task_id}/{is_done}", get(handlers::done_task))
        .route("/star/{task_id}/{is_star}", get(handlers::star))
        .route("/delete/{task_id}", get(handlers::delete))
        .route_layer(middleware::from_fn(require_login));

    Router::new()
        .route("/", get(handlers::home).post(handlers::add_task))
        .route("/login", get(handlers::login_form).post(handlers::login))
        .route("/sign-up", get(handlers::sign_up_form).post(handlers::sign_up))
        .route("/logout", get(handlers::logout))
        .merge(protected)
        .layer(middleware::from_fn_with_state(state.clone(), resolve_session))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
