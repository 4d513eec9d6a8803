//! Static file serving for the frontend bundle and locally stored uploads.

use axum::Router;
use tower_http::services::ServeDir;

use crate::config::Config;

/// Routes serving `uploads.dir` under `uploads.public_path` and the frontend bundle at `/`.
///
/// The bundle is installed as the fallback, so it only sees requests no API route matched.
pub fn router(config: &Config) -> Router {
    let uploads = ServeDir::new(&config.uploads.dir);
    let frontend = ServeDir::new(&config.static_assets.dir);

    Router::new()
        .nest_service(config.uploads.public_path.trim_end_matches('/'), uploads)
        .fallback_service(frontend)
}
