use core::pin::Pin;
use core::task::{Context, Poll};
use core::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{ready, Stream};
use pin_project::pin_project;
use reqwest::header::{CONTENT_LENGTH, ETAG};
use reqwest::{Client, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use stowage_core::{
    CompletedPart, DownloadInfo, Error, FlatListing, IntegrityToken, Listing, ObjectLocation,
    Part, Result, SessionId, UploadTarget, DEFAULT_PART_URL_TTL,
};

use crate::source::PartBody;
use crate::transport::{CatalogClient, TransmitProgress, UploadTransport};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InitiateRequest<'a> {
    file_name: &'a str,
    file_type: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitiateResponse {
    upload_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CompleteRequest<'a> {
    file_name: &'a str,
    parts: &'a [CompletedPart],
}

#[derive(Deserialize)]
struct CompleteResponse {
    location: String,
}

#[derive(Serialize)]
struct CreateFolderRequest<'a> {
    key: &'a str,
}

#[derive(Deserialize)]
struct CreateFolderResponse {
    key: String,
}

#[derive(Deserialize)]
struct UrlResponse {
    url: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PartTargetResponse {
    url: String,
    /// Seconds the url stays usable, as configured on the server.
    expires_in: Option<u64>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

fn transport_error(e: reqwest::Error) -> Error {
    Error::Transport(e.to_string())
}

/// Talks to a stowage server over HTTP and sends part bytes straight to the storage backend's
/// upload targets.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    endpoint: Url,
}

impl HttpTransport {
    pub fn new(endpoint: &str) -> Result<Self> {
        Self::with_client(Client::new(), endpoint)
    }

    pub fn with_client(client: Client, endpoint: &str) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| Error::Validation(format!("invalid endpoint {endpoint}: {e}")))?;
        if endpoint.cannot_be_a_base() {
            return Err(Error::Validation(format!(
                "endpoint {endpoint} cannot be used as a base URL"
            )));
        }
        Ok(Self { client, endpoint })
    }

    /// Build an endpoint URL from path segments. Each segment is percent-encoded on its own, so
    /// object keys containing `/` stay a single segment.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Decode a successful service response, or turn a failed one into the error taxonomy.
    /// 400 responses become `client_error`, everything else a backend error.
    async fn read_json<T: DeserializeOwned>(
        response: Response,
        client_error: fn(String) -> Error,
    ) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            return response.json::<T>().await.map_err(transport_error);
        }

        let message = match response.json::<ErrorBody>().await {
            Ok(body) => body.error,
            Err(_) => status.to_string(),
        };
        tracing::debug!(%status, %message, "service request failed");
        match status {
            StatusCode::BAD_REQUEST => Err(client_error(message)),
            _ => Err(Error::Backend(format!("{status}: {message}"))),
        }
    }
}

#[async_trait]
impl UploadTransport for HttpTransport {
    async fn initiate(&self, key: &str, content_type: &str) -> Result<SessionId> {
        let response = self
            .client
            .post(self.url(&["uploads"]))
            .json(&InitiateRequest {
                file_name: key,
                file_type: content_type,
            })
            .send()
            .await
            .map_err(transport_error)?;
        let body: InitiateResponse = Self::read_json(response, Error::Validation).await?;
        if body.upload_id.is_empty() {
            return Err(Error::Backend(String::from("failed to start upload")));
        }
        Ok(SessionId::new(body.upload_id))
    }

    async fn authorize_part(
        &self,
        key: &str,
        session: &SessionId,
        part_number: u32,
    ) -> Result<UploadTarget> {
        let part_number = part_number.to_string();
        let response = self
            .client
            .get(self.url(&["uploads", session.as_str(), "parts", &part_number]))
            .query(&[("fileName", key)])
            .send()
            .await
            .map_err(transport_error)?;
        let body: PartTargetResponse = Self::read_json(response, Error::Validation).await?;
        if body.url.is_empty() {
            return Err(Error::Backend(format!(
                "no upload target received for part {part_number}"
            )));
        }
        Ok(UploadTarget {
            url: body.url,
            expires_in: body
                .expires_in
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_PART_URL_TTL),
        })
    }

    async fn transmit(
        &self,
        target: &UploadTarget,
        part: &Part,
        body: PartBody,
        progress: TransmitProgress<'_>,
    ) -> Result<Option<IntegrityToken>> {
        let (sent_tx, mut sent_rx) = watch::channel(0u64);
        let request = self
            .client
            .put(&target.url)
            .header(CONTENT_LENGTH, part.length)
            .body(reqwest::Body::wrap_stream(CountingBody::new(body, sent_tx)))
            .send();
        tokio::pin!(request);

        let mut watching = true;
        let response = loop {
            tokio::select! {
                response = &mut request => break response,
                changed = sent_rx.changed(), if watching => match changed {
                    Ok(()) => progress(*sent_rx.borrow_and_update()),
                    Err(_) => watching = false,
                },
            }
        };
        let response = response.map_err(|e| {
            Error::Transport(format!("network error uploading part {}: {e}", part.number))
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Transport(format!(
                "upload failed for part {} with status {status}",
                part.number
            )));
        }

        Ok(response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(IntegrityToken::new))
    }

    async fn complete(
        &self,
        key: &str,
        session: &SessionId,
        parts: &[CompletedPart],
    ) -> Result<ObjectLocation> {
        let response = self
            .client
            .post(self.url(&["uploads", session.as_str(), "complete"]))
            .json(&CompleteRequest {
                file_name: key,
                parts,
            })
            .send()
            .await
            .map_err(transport_error)?;
        let body: CompleteResponse = Self::read_json(response, Error::Assembly).await?;
        Ok(ObjectLocation::new(body.location))
    }

    async fn abort(&self, key: &str, session: &SessionId) -> Result<()> {
        let response = self
            .client
            .delete(self.url(&["uploads", session.as_str()]))
            .query(&[("fileName", key)])
            .send()
            .await
            .map_err(transport_error)?;
        let _: serde_json::Value = Self::read_json(response, Error::Validation).await?;
        Ok(())
    }
}

#[async_trait]
impl CatalogClient for HttpTransport {
    async fn list(&self, prefix: &str) -> Result<Listing> {
        let response = self
            .client
            .get(self.url(&["files"]))
            .query(&[("prefix", prefix)])
            .send()
            .await
            .map_err(transport_error)?;
        Self::read_json(response, Error::Validation).await
    }

    async fn list_flat(&self, prefix: &str) -> Result<FlatListing> {
        let response = self
            .client
            .get(self.url(&["files"]))
            .query(&[("prefix", prefix), ("flat", "true")])
            .send()
            .await
            .map_err(transport_error)?;
        Self::read_json(response, Error::Validation).await
    }

    async fn create_folder(&self, key: &str) -> Result<String> {
        let response = self
            .client
            .post(self.url(&["folders"]))
            .json(&CreateFolderRequest { key })
            .send()
            .await
            .map_err(transport_error)?;
        let body: CreateFolderResponse = Self::read_json(response, Error::Validation).await?;
        Ok(body.key)
    }

    async fn download_info(&self, key: &str) -> Result<DownloadInfo> {
        let response = self
            .client
            .get(self.url(&["files", key, "download-info"]))
            .send()
            .await
            .map_err(transport_error)?;
        Self::read_json(response, Error::Validation).await
    }

    async fn download_url(&self, key: &str) -> Result<String> {
        let response = self
            .client
            .get(self.url(&["files", key, "download-url"]))
            .send()
            .await
            .map_err(transport_error)?;
        let body: UrlResponse = Self::read_json(response, Error::Validation).await?;
        Ok(body.url)
    }
}

/// Part body that publishes the running count of bytes handed to the HTTP client.
#[pin_project]
struct CountingBody {
    #[pin]
    body: PartBody,
    sent: u64,
    progress: watch::Sender<u64>,
}

impl CountingBody {
    fn new(body: PartBody, progress: watch::Sender<u64>) -> Self {
        Self {
            body,
            sent: 0,
            progress,
        }
    }
}

impl Stream for CountingBody {
    type Item = std::io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        let item = ready!(this.body.poll_next(cx));
        if let Some(Ok(bytes)) = &item {
            *this.sent += bytes.len() as u64;
            this.progress.send_replace(*this.sent);
        }
        Poll::Ready(item)
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::sync::{Arc, Mutex};

    use axum::extract::{Path, State};
    use axum::response::{IntoResponse, Response as AxumResponse};
    use axum::routing::{get, post, put};
    use axum::{Json, Router};
    use futures::stream::{self, StreamExt};
    use rstest::*;
    use serde_json::{json, Value};

    use super::*;
    use crate::source::UploadFile;
    use crate::testing::{small_policy, KIB};
    use crate::uploader::Uploader;
    use crate::CancellationToken;

    fn bind() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        (listener, base)
    }

    fn spawn(listener: TcpListener, router: Router) {
        let server = axum::Server::from_tcp(listener)
            .unwrap()
            .serve(router.into_make_service());
        tokio::spawn(server);
    }

    fn part(number: u32, data: &'static [u8]) -> (Part, PartBody) {
        let part = Part {
            number,
            offset: 0,
            length: data.len() as u64,
        };
        let body: PartBody = Box::pin(stream::iter(vec![Ok(Bytes::from_static(data))]));
        (part, body)
    }

    /// Upload targets answering the way a storage backend might.
    async fn targets() -> HttpTransport {
        let router = Router::new()
            .route(
                "/ok",
                put(|_: Bytes| async { (StatusCode::OK, [(ETAG, "\"300000\"")]) }),
            )
            .route("/noetag", put(|_: Bytes| async { StatusCode::OK }))
            .route("/forbidden", put(|_: Bytes| async { StatusCode::FORBIDDEN }))
            .route(
                "/uploads/:id/complete",
                post(|| async {
                    (
                        StatusCode::BAD_REQUEST,
                        Json(json!({"error": "one or more parts are invalid"})),
                    )
                }),
            )
            .route(
                "/files",
                get(|| async {
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(json!({"error": "internal server error"})),
                    )
                }),
            );
        let (listener, base) = bind();
        spawn(listener, router);
        HttpTransport::new(&base).unwrap()
    }

    async fn transmit_to(
        transport: &HttpTransport,
        path: &str,
    ) -> Result<Option<IntegrityToken>> {
        let target = UploadTarget {
            url: transport.url(&[path]).to_string(),
            expires_in: DEFAULT_PART_URL_TTL,
        };
        let (part, body) = part(1, b"part bytes");
        transport.transmit(&target, &part, body, &|_: u64| {}).await
    }

    #[tokio::test]
    async fn transmit_returns_the_etag_header() {
        let transport = targets().await;
        let token = transmit_to(&transport, "ok").await.unwrap();
        assert_eq!(token, Some(IntegrityToken::new("\"300000\"")));
    }

    #[tokio::test]
    async fn transmit_without_etag_returns_none() {
        let transport = targets().await;
        assert_eq!(transmit_to(&transport, "noetag").await.unwrap(), None);
    }

    #[tokio::test]
    async fn transmit_rejected_by_target_is_a_transport_error() {
        let transport = targets().await;
        match transmit_to(&transport, "forbidden").await {
            Err(Error::Transport(message)) => {
                assert!(message.contains("part 1"));
                assert!(message.contains("403"));
            }
            other => panic!("expected a transport error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn rejected_completion_is_an_assembly_error() {
        let transport = targets().await;
        let parts = [CompletedPart {
            part_number: 1,
            e_tag: IntegrityToken::new("\"a\""),
        }];
        match transport
            .complete("k.bin", &SessionId::new("u-1"), &parts)
            .await
        {
            Err(Error::Assembly(message)) => assert_eq!(message, "one or more parts are invalid"),
            other => panic!("expected an assembly error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn server_failures_are_backend_errors() {
        let transport = targets().await;
        assert!(matches!(transport.list("").await, Err(Error::Backend(_))));
    }

    /// Stowage server plus storage backend in one, recording every request. Part 2 is accepted
    /// without an ETag.
    #[derive(Clone)]
    struct Recorder {
        base: String,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl Recorder {
        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    async fn initiate(State(recorder): State<Recorder>, Json(_): Json<Value>) -> Json<Value> {
        recorder.record(String::from("initiate"));
        Json(json!({"uploadId": "u-1"}))
    }

    async fn authorize(
        State(recorder): State<Recorder>,
        Path((_, n)): Path<(String, u32)>,
    ) -> Json<Value> {
        recorder.record(format!("authorize {n}"));
        Json(json!({"url": format!("{}/targets/{n}", recorder.base), "expiresIn": 60}))
    }

    async fn store_part(
        State(recorder): State<Recorder>,
        Path(n): Path<u32>,
        _: Bytes,
    ) -> AxumResponse {
        recorder.record(format!("put {n}"));
        if n == 2 {
            return StatusCode::OK.into_response();
        }
        (StatusCode::OK, [(ETAG, format!("\"etag-{n}\""))]).into_response()
    }

    async fn complete(State(recorder): State<Recorder>, Json(_): Json<Value>) -> Json<Value> {
        recorder.record(String::from("complete"));
        Json(json!({"location": "s3://stowage/big.bin"}))
    }

    async fn abort(State(recorder): State<Recorder>) -> Json<Value> {
        recorder.record(String::from("abort"));
        Json(json!({"aborted": true}))
    }

    fn recording_server() -> (Recorder, String) {
        let (listener, base) = bind();
        let recorder = Recorder {
            base: base.clone(),
            calls: Arc::default(),
        };
        let router = Router::new()
            .route("/uploads", post(initiate))
            .route("/uploads/:id", axum::routing::delete(abort))
            .route("/uploads/:id/parts/:n", get(authorize))
            .route("/uploads/:id/complete", post(complete))
            .route("/targets/:n", put(store_part))
            .with_state(recorder.clone());
        spawn(listener, router);
        (recorder, base)
    }

    #[tokio::test]
    async fn upload_targets_carry_the_server_lifetime() {
        let (_, base) = recording_server();
        let transport = HttpTransport::new(&base).unwrap();
        let target = transport
            .authorize_part("big.bin", &SessionId::new("u-1"), 3)
            .await
            .unwrap();
        assert_eq!(target.url, format!("{base}/targets/3"));
        assert_eq!(target.expires_in, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn missing_etag_over_http_aborts_the_upload() {
        let (recorder, base) = recording_server();
        let uploader = Uploader::with_policy(HttpTransport::new(&base).unwrap(), small_policy());
        let file = UploadFile::from_bytes("big.bin", vec![7u8; 1200 * KIB]);
        let on_progress = |_: u8| {};
        let cancel = CancellationToken::new();

        let result = uploader.upload(&file, &on_progress, &cancel).await;
        assert!(matches!(result, Err(Error::Integrity(2))));
        assert_eq!(
            *recorder.calls.lock().unwrap(),
            vec!["initiate", "authorize 1", "put 1", "authorize 2", "put 2", "abort"]
        );
    }

    #[rstest]
    #[case::root("http://localhost:13030", &["uploads"], "http://localhost:13030/uploads")]
    #[case::trailing_slash("http://localhost:13030/", &["folders"], "http://localhost:13030/folders")]
    #[case::mounted("https://example.com/api", &["uploads", "abc", "complete"], "https://example.com/api/uploads/abc/complete")]
    #[case::key_segment(
        "http://localhost:13030",
        &["files", "public/readme.pdf", "download-info"],
        "http://localhost:13030/files/public%2Freadme.pdf/download-info"
    )]
    fn endpoint_urls(#[case] endpoint: &str, #[case] segments: &[&str], #[case] expected: &str) {
        let transport = HttpTransport::new(endpoint).unwrap();
        assert_eq!(transport.url(segments).as_str(), expected);
    }

    #[rstest]
    #[case::garbage("not a url")]
    #[case::no_base("mailto:someone@example.com")]
    fn invalid_endpoints_are_rejected(#[case] endpoint: &str) {
        assert!(matches!(
            HttpTransport::new(endpoint),
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn counting_body_publishes_running_total() {
        let chunks = vec![
            Ok(Bytes::from_static(b"abc")),
            Ok(Bytes::from_static(b"defgh")),
        ];
        let body: PartBody = Box::pin(stream::iter(chunks));
        let (tx, rx) = watch::channel(0u64);
        let mut counting = CountingBody::new(body, tx);

        counting.next().await.unwrap().unwrap();
        assert_eq!(*rx.borrow(), 3);
        counting.next().await.unwrap().unwrap();
        assert_eq!(*rx.borrow(), 8);
        assert!(counting.next().await.is_none());
    }
}
