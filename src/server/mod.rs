//! HTTP server: keyword lookup, download proxy and the static client.

pub mod keywords;
pub mod proxy;

use std::{path::Path, sync::Arc, time::Duration};

use axum::{
    Json, Router,
    http::{Method, StatusCode, header},
    routing::{get, post},
};
use reqwest::Client;
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::{config::ServerConfig, protocol::ErrorBody};

pub use keywords::KeywordTable;

/// Shared by every request handler
#[derive(Debug)]
pub struct AppState {
    pub keywords: KeywordTable,
    pub client: Client,
    pub upstream_timeout: Duration,
}

impl AppState {
    pub fn new(keywords: KeywordTable, upstream_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().build()?;
        Ok(Self {
            keywords,
            client,
            upstream_timeout,
        })
    }
}

fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/all-keywords", get(keywords::all_keywords))
        .route("/keywords", post(keywords::lookup))
        .route("/download", get(proxy::download))
        .fallback(|| async { (StatusCode::NOT_FOUND, Json(ErrorBody::new("Not Found"))) })
}

pub fn create_router(state: AppState, static_dir: &Path) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .nest("/api", api_router())
        .fallback_service(ServeDir::new(static_dir))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

pub async fn serve(config: ServerConfig) -> color_eyre::Result<()> {
    let keywords = KeywordTable::load(&config.keywords_file)?;
    tracing::info!(
        "Loaded {} keywords covering {} URLs from {}",
        keywords.keywords().len(),
        keywords.url_count(),
        config.keywords_file.display()
    );

    let state = AppState::new(keywords, config.upstream_timeout())?;
    let app = create_router(state, &config.static_dir);

    let listener = TcpListener::bind(&config.host).await?;
    tracing::info!("Listening on: {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Throwaway servers bound to ephemeral local ports.

    use std::{collections::BTreeMap, convert::Infallible, path::Path, time::Duration};

    use axum::{
        Router,
        body::{Body, Bytes},
        http::{StatusCode, header},
        routing::get,
    };
    use tokio::net::TcpListener;

    use super::{AppState, KeywordTable, create_router};

    const STREAM_CHUNK: usize = 4096;

    fn cover_bytes() -> Vec<u8> {
        (0..3000u32).map(|i| (i % 251) as u8).collect()
    }

    fn stream_bytes() -> Vec<u8> {
        (0..5 * STREAM_CHUNK).map(|i| (i / STREAM_CHUNK) as u8 + b'a').collect()
    }

    /// A fake origin serving a handful of media paths
    pub struct Upstream {
        base: String,
    }

    impl Upstream {
        pub fn url(&self, path: &str) -> String {
            format!("{}{}", self.base, path)
        }

        pub fn cover(&self) -> Vec<u8> {
            cover_bytes()
        }

        pub fn stream_payload(&self) -> Vec<u8> {
            stream_bytes()
        }

        /// Every upstream path except `/not-listed.bin`, under the keyword `media`
        pub fn keyword_table(&self) -> KeywordTable {
            let urls = [
                "/media/cover.png",
                "/media/stream.bin",
                "/media/missing.pdf",
                "/media/slow.mp4",
            ]
            .iter()
            .map(|path| self.url(path))
            .collect();
            KeywordTable::new(BTreeMap::from([("media".to_string(), urls)]))
        }
    }

    async fn listen(app: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}")
    }

    pub async fn spawn_upstream() -> Upstream {
        let app = Router::new()
            .route(
                "/media/cover.png",
                get(|| async { ([(header::CONTENT_TYPE, "image/png")], cover_bytes()) }),
            )
            .route(
                "/media/stream.bin",
                get(|| async {
                    let chunks: Vec<Result<Bytes, Infallible>> = stream_bytes()
                        .chunks(STREAM_CHUNK)
                        .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
                        .collect();
                    Body::from_stream(futures::stream::iter(chunks))
                }),
            )
            .route("/media/missing.pdf", get(|| async { StatusCode::NOT_FOUND }))
            .route(
                "/media/slow.mp4",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(2)).await;
                    "too late"
                }),
            )
            .route("/not-listed.bin", get(|| async { "secret" }));

        Upstream {
            base: listen(app).await,
        }
    }

    /// Run the real router and return its base URL
    pub async fn spawn_server(keywords: KeywordTable, upstream_timeout: Duration) -> url::Url {
        let state = AppState::new(keywords, upstream_timeout).unwrap();
        let app = create_router(state, Path::new("client"));
        listen(app).await.parse().unwrap()
    }
}
