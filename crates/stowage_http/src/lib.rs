//! # Stowage HTTP
//!
//! `stowage_http` exposes the multipart upload service and the folder listing and download
//! endpoints as an [`axum::Router`]. It is generic over the [`stowage_core::StorageBackend`]
//! trait and therefore works with any backend implementation.
//!
//! ## Example `main.rs`
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use anyhow::Result;
//! use stowage_core::{DownloadConfig, MultipartConfig, StorageService};
//! use stowage_http::Stowage;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let backend = config.backend.new_backend().await?;
//!     let service = StorageService::new(backend, config.multipart, config.downloads);
//!
//!     let router = Stowage::new(service).router()?;
//!
//!     axum::Server::bind(&"0.0.0.0:13030".parse()?)
//!         .serve(router.into_make_service())
//!         .await?;
//!
//!     Ok(())
//! }
//! ```
use std::str::FromStr;

use axum::http::header::{self, HeaderValue};
use axum::http::Method;
use axum::Router;
use serde::{de, Deserialize, Deserializer};
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::{self, TraceLayer};

mod errors;
pub(crate) use errors::Error;

mod files;
mod uploads;

use stowage_core::StorageService;

/// Serde deserialization decorator to map empty Strings to None,
fn empty_string_as_none<'de, D, T>(de: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let opt = Option::<String>::deserialize(de)?;
    match opt.as_deref() {
        None | Some("") => Ok(None),
        Some(s) => FromStr::from_str(s).map_err(de::Error::custom).map(Some),
    }
}

async fn not_found() -> Error {
    Error::NotFound
}

/// Serves a [`StorageService`] over HTTP.
#[derive(Clone)]
pub struct Stowage {
    service: StorageService,
}

impl Stowage {
    pub fn new(service: StorageService) -> Self {
        Self { service }
    }

    /// Return an [`axum::Router`] serving the upload, folder and file endpoints. Every response
    /// is JSON and carries permissive CORS headers.
    pub fn router(&self) -> std::result::Result<axum::Router, http::header::InvalidHeaderValue> {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_headers(Any)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ]);

        let app = Router::new()
            .merge(uploads::router())
            .merge(files::router())
            .fallback(not_found)
            .with_state(self.service.clone())
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(trace::DefaultMakeSpan::new().include_headers(true))
                    .on_response(trace::DefaultOnResponse::new())
                    .on_request(trace::DefaultOnRequest::new()),
            )
            .layer(SetResponseHeaderLayer::if_not_present(
                header::CONTENT_TYPE,
                HeaderValue::from_str("application/json")?,
            ))
            .layer(cors);

        Ok(app)
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::Router;
    use http::{header, Method, Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    use stowage_core::{DownloadConfig, MultipartConfig, SessionId, StorageService};
    use stowage_objectstore::MemoryStore;

    use super::Stowage;

    pub const CDN_BASE_URL: &str = "https://cdn.example.com/external/";

    pub struct TestApp {
        pub store: MemoryStore,
        pub router: Router,
    }

    impl TestApp {
        pub fn new() -> Self {
            let store = MemoryStore::new();
            let service = StorageService::new(
                Arc::new(store.clone()),
                MultipartConfig::default(),
                DownloadConfig {
                    cdn_base_url: CDN_BASE_URL.to_string(),
                    url_ttl_secs: 3600,
                },
            );
            let router = Stowage::new(service)
                .router()
                .expect("router construction should succeed");
            Self { store, router }
        }

        pub async fn initiate(&self, key: &str) -> SessionId {
            use stowage_core::MultipartStore;
            self.store
                .initiate(key, "application/octet-stream")
                .await
                .expect("memory store initiate should succeed")
        }
    }

    pub async fn raw_request(
        app: &TestApp,
        method: Method,
        uri: &str,
        body: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(b) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(b.to_string())
            }
            None => Body::empty(),
        };
        let response = app
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();

        let status = response.status();
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .unwrap(),
            "*"
        );
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    pub async fn request(
        app: &TestApp,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let body = body.map(|b| b.to_string());
        raw_request(app, method, uri, body.as_deref()).await
    }
}
