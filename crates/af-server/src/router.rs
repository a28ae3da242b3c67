//! Axum router construction.
//!
//! Builds the application router with the conversion routes, middleware
//! layers, download serving and optional static assets.

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::set_status::SetStatus;
use tower_http::trace::TraceLayer;

use crate::context::AppContext;
use crate::middleware::request_id::request_id_middleware;
use crate::routes;

/// Build the complete Axum router.
pub fn build_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let max_upload = ctx.config.server.max_upload_bytes;
    let output_dir = ctx.config.storage.output_dir.clone();
    let static_dir = ctx
        .config
        .server
        .static_dir
        .clone()
        .filter(|dir| dir.exists());
    let mount = download_mount(&ctx.config.storage.download_prefix);

    let api = Router::new()
        .route("/convert", post(routes::convert::convert_url))
        .route("/jobs/active", get(routes::jobs::active_jobs))
        .route("/health", get(routes::health::health_check));

    let mut app = Router::new()
        .route(
            "/upload",
            post(routes::convert::upload).layer(DefaultBodyLimit::max(max_upload)),
        )
        .nest("/api", api);

    match (mount, static_dir) {
        (Some(mount), static_dir) if !mount.is_empty() => {
            tracing::info!("Serving downloads from {:?} at {mount}", output_dir);
            app = app.nest_service(&mount, ServeDir::new(&output_dir));
            if let Some(dir) = static_dir {
                tracing::info!("Serving static files from {:?}", dir);
                app = app.fallback_service(static_service(&dir));
            }
        }
        (Some(_), Some(dir)) => {
            tracing::info!("Serving downloads from {:?} and static files from {:?}", output_dir, dir);
            app = app.fallback_service(ServeDir::new(&output_dir).fallback(static_service(&dir)));
        }
        (Some(_), None) => {
            tracing::info!("Serving downloads from {:?}", output_dir);
            app = app.fallback_service(ServeDir::new(&output_dir));
        }
        (None, Some(dir)) => {
            tracing::info!("Serving static files from {:?}", dir);
            app = app.fallback_service(static_service(&dir));
        }
        (None, None) => {}
    }

    // Layers go on last so downloads and static files get them too.
    app.layer(middleware::from_fn(request_id_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

fn static_service(dir: &std::path::Path) -> ServeDir<SetStatus<ServeFile>> {
    ServeDir::new(dir)
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new(dir.join("index.html")))
}

/// Local path under which the output directory is served, or `None` when
/// downloads are referenced through an external URL.
///
/// An empty string means the router root.
fn download_mount(prefix: &str) -> Option<String> {
    if prefix.is_empty() {
        return Some(String::new());
    }
    if !prefix.starts_with('/') {
        tracing::info!("Download prefix {prefix} is external; not serving outputs");
        return None;
    }
    Some(prefix.trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn download_mount_variants() {
        assert_eq!(download_mount(""), Some(String::new()));
        assert_eq!(download_mount("/"), Some(String::new()));
        assert_eq!(download_mount("/downloads/"), Some("/downloads".to_string()));
        assert_eq!(download_mount("https://cdn.example/audio"), None);
    }
}
