use axum::{
    Router, middleware,
    routing::{delete, get, post, put},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use city_api::auth::AppState;
use city_api::middleware::{optional_auth, require_auth};
use city_api::routes;

pub fn build_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(routes::health))
        .route("/auth/register", post(routes::register))
        .route("/auth/login", post(routes::login))
        .route("/tiers", get(routes::list_tiers))
        .route("/plots", get(routes::list_plots))
        .route("/plots/{id}", get(routes::get_plot))
        .route("/plots/{id}/company", get(routes::get_plot_company_info))
        .route("/company-plots", get(routes::company_plots))
        .route("/company-plots/search", get(routes::search_company_plots))
        .with_state(state.clone());

    let mail_drop = Router::new()
        .route("/mail", post(routes::send_mail))
        .layer(middleware::from_fn_with_state(state.clone(), optional_auth))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/plots", post(routes::create_plot))
        .route("/me/plots", get(routes::my_plots))
        .route("/plots/{id}/building", put(routes::update_building))
        .route("/plots/{id}/mailbox", put(routes::configure_mailbox))
        .route("/plots/{id}", delete(routes::delete_plot))
        .route("/plots/{id}/company/logo", post(routes::upload_logo))
        .route("/plots/{id}/company", put(routes::update_company_info))
        .route("/plots/{id}/company", delete(routes::remove_company_info))
        .route("/plots/{id}/mail", get(routes::plot_mail))
        .route("/plots/{id}/mail/unread", get(routes::unread_count))
        .route("/mail/{id}/read", post(routes::mark_read))
        .route("/mail/{id}", delete(routes::delete_mail))
        .route("/me/subscription", get(routes::current_subscription))
        .route("/me/subscription", post(routes::create_subscription))
        .route("/me/subscription", delete(routes::cancel_subscription))
        .route("/me/usage", get(routes::usage))
        .route("/me/ai-interactions", post(routes::record_ai_interaction))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(mail_drop)
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
