use axum::{
    Router,
    extract::Request,
    http::{HeaderValue, Method, StatusCode, header},
    middleware::{self, Next},
    response::Response,
    routing::{delete, get},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::assets::{serve_embedded, serve_index};
use crate::handler::{self, AppState};

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(serve_index))
        .route("/healthz", get(handler::healthcheck))
        .route("/api/data", get(handler::get_data))
        .route(
            "/api/playlists",
            get(handler::list_playlists).post(handler::upsert_playlist),
        )
        .route("/api/playlists/", delete(handler::delete_playlist_without_id))
        .route("/api/playlists/*rest", delete(handler::delete_playlist))
        .route(
            "/api/history",
            get(handler::list_history)
                .post(handler::record_history)
                .delete(handler::clear_history),
        )
        .fallback(serve_embedded)
        .layer(cors)
        // CorsLayer only sends these on preflight; keep them on every response.
        .layer(SetResponseHeaderLayer::if_not_present(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET, POST, PUT, DELETE, OPTIONS"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type"),
        ))
        .layer(middleware::from_fn(preflight_no_content))
        .with_state(state)
}

// Every OPTIONS request gets an empty 204; the CORS layer alone answers 200.
async fn preflight_no_content(req: Request, next: Next) -> Response {
    let is_preflight = req.method() == Method::OPTIONS;
    let mut resp = next.run(req).await;
    if is_preflight {
        *resp.status_mut() = StatusCode::NO_CONTENT;
    }
    resp
}
