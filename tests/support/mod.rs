//! Shared fixtures: GLB builder, scripted generation client, asset server
#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
};
use bytes::Bytes;
use futures::stream::BoxStream;
use object_store::memory::InMemory;
use object_store::path::Path as StoragePath;
use object_store::signer::Signer;
use object_store::{
    GetOptions, GetResult, ListResult, MultipartUpload, ObjectMeta, ObjectStore,
    PutMultipartOptions, PutOptions, PutPayload, PutResult,
};
use reqwest::{Method, Url};
use serde_json::{Value, json};
use tempfile::TempDir;

use texbox::fetcher::{AssetFetcher, HttpClient, HttpConfig};
use texbox::generation::{GenerationClient, GenerationError, GenerationRequest};
use texbox::observability::Metrics;
use texbox::pipeline::{PipelineOptions, PipelineOrchestrator};
use texbox::storage::{LocalSigner, StorageGateway, UrlStyle};

pub const BUCKET: &str = "texbox-test";

/// Distinct fake PNG payload for image `n`
pub fn png_bytes(n: u8) -> Vec<u8> {
    let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
    bytes.extend(std::iter::repeat_n(n, 5 + n as usize));
    bytes
}

/// Binary glTF whose image table holds `images`, all embedded in the BIN chunk
pub fn glb_with_images(images: &[Vec<u8>]) -> Vec<u8> {
    let mut bin = Vec::new();
    let mut views = Vec::new();
    for image in images {
        views.push(json!({
            "buffer": 0,
            "byteOffset": bin.len(),
            "byteLength": image.len(),
        }));
        bin.extend_from_slice(image);
        while bin.len() % 4 != 0 {
            bin.push(0);
        }
    }

    let mut document = json!({ "asset": { "version": "2.0" } });
    if !images.is_empty() {
        document["buffers"] = json!([{ "byteLength": bin.len() }]);
        document["bufferViews"] = Value::Array(views);
        document["images"] = (0..images.len())
            .map(|view| json!({ "bufferView": view, "mimeType": "image/png" }))
            .collect();
    }

    let mut json_chunk = serde_json::to_vec(&document).unwrap();
    while json_chunk.len() % 4 != 0 {
        json_chunk.push(b' ');
    }

    let bin_len = if bin.is_empty() { 0 } else { 8 + bin.len() };
    let total = 12 + 8 + json_chunk.len() + bin_len;

    let mut glb = Vec::with_capacity(total);
    glb.extend_from_slice(b"glTF");
    glb.extend_from_slice(&2u32.to_le_bytes());
    glb.extend_from_slice(&(total as u32).to_le_bytes());
    glb.extend_from_slice(&(json_chunk.len() as u32).to_le_bytes());
    glb.extend_from_slice(b"JSON");
    glb.extend_from_slice(&json_chunk);
    if !bin.is_empty() {
        glb.extend_from_slice(&(bin.len() as u32).to_le_bytes());
        glb.extend_from_slice(b"BIN\0");
        glb.extend_from_slice(&bin);
    }
    glb
}

/// Generation client that replays a fixed answer and records its requests
pub struct ScriptedGenerator {
    outputs: Result<Vec<String>, String>,
    delay: Duration,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn returning(outputs: Vec<String>) -> Self {
        Self {
            outputs: Ok(outputs),
            delay: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            outputs: Err(message.to_string()),
            delay: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationClient for ScriptedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<String>, GenerationError> {
        self.requests.lock().unwrap().push(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.outputs {
            Ok(outputs) => Ok(outputs.clone()),
            Err(message) => Err(GenerationError::Failed {
                id: "stub".to_string(),
                status: "failed".to_string(),
                message: message.clone(),
            }),
        }
    }
}

/// Signer that fails its `fail_on`-th download link (1-based) and records every path
#[derive(Debug)]
pub struct FlakySigner {
    inner: LocalSigner,
    fail_on: usize,
    calls: AtomicUsize,
    pub signed: Mutex<Vec<String>>,
}

impl FlakySigner {
    pub fn new(fail_on: usize) -> Self {
        Self {
            inner: LocalSigner::new(
                Url::parse("http://storage.localhost").unwrap(),
                BUCKET,
                UrlStyle::VirtualHosted,
            ),
            fail_on,
            calls: AtomicUsize::new(0),
            signed: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Signer for FlakySigner {
    async fn signed_url(
        &self,
        method: Method,
        path: &StoragePath,
        expires_in: Duration,
    ) -> object_store::Result<Url> {
        self.signed.lock().unwrap().push(path.to_string());
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_on {
            return Err(object_store::Error::Generic {
                store: "FlakySigner",
                source: "signing backend unavailable".into(),
            });
        }
        self.inner.signed_url(method, path, expires_in).await
    }
}

/// In-memory store whose writes and deletes take as long as configured,
/// and whose metadata lookups can be made to fail
#[derive(Debug, Default)]
pub struct SlowStore {
    inner: InMemory,
    put_delay: Duration,
    delete_delay: Duration,
    head_fails: bool,
    pub deletes: AtomicUsize,
}

impl SlowStore {
    pub fn with_put_delay(mut self, delay: Duration) -> Self {
        self.put_delay = delay;
        self
    }

    pub fn with_delete_delay(mut self, delay: Duration) -> Self {
        self.delete_delay = delay;
        self
    }

    pub fn with_failing_head(mut self) -> Self {
        self.head_fails = true;
        self
    }
}

impl std::fmt::Display for SlowStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SlowStore({})", self.inner)
    }
}

#[async_trait]
impl ObjectStore for SlowStore {
    async fn put_opts(
        &self,
        location: &StoragePath,
        payload: PutPayload,
        opts: PutOptions,
    ) -> object_store::Result<PutResult> {
        tokio::time::sleep(self.put_delay).await;
        self.inner.put_opts(location, payload, opts).await
    }

    async fn put_multipart_opts(
        &self,
        location: &StoragePath,
        opts: PutMultipartOptions,
    ) -> object_store::Result<Box<dyn MultipartUpload>> {
        self.inner.put_multipart_opts(location, opts).await
    }

    async fn get_opts(
        &self,
        location: &StoragePath,
        options: GetOptions,
    ) -> object_store::Result<GetResult> {
        self.inner.get_opts(location, options).await
    }

    async fn head(&self, location: &StoragePath) -> object_store::Result<ObjectMeta> {
        if self.head_fails {
            return Err(object_store::Error::Generic {
                store: "SlowStore",
                source: "backend unreachable".into(),
            });
        }
        self.inner.head(location).await
    }

    async fn delete(&self, location: &StoragePath) -> object_store::Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delete_delay).await;
        self.inner.delete(location).await
    }

    fn list(
        &self,
        prefix: Option<&StoragePath>,
    ) -> BoxStream<'static, object_store::Result<ObjectMeta>> {
        self.inner.list(prefix)
    }

    async fn list_with_delimiter(
        &self,
        prefix: Option<&StoragePath>,
    ) -> object_store::Result<ListResult> {
        self.inner.list_with_delimiter(prefix).await
    }

    async fn copy(&self, from: &StoragePath, to: &StoragePath) -> object_store::Result<()> {
        self.inner.copy(from, to).await
    }

    async fn copy_if_not_exists(
        &self,
        from: &StoragePath,
        to: &StoragePath,
    ) -> object_store::Result<()> {
        self.inner.copy_if_not_exists(from, to).await
    }
}

/// Gateway over `store` with locally signed links
pub fn gateway_over(store: Arc<dyn ObjectStore>) -> StorageGateway {
    StorageGateway::new(
        store,
        Arc::new(LocalSigner::new(
            Url::parse("http://storage.localhost").unwrap(),
            BUCKET,
            UrlStyle::VirtualHosted,
        )),
        BUCKET,
        UrlStyle::VirtualHosted,
    )
}

/// Serves registered files under `/out/{name}`, optionally after a delay
#[derive(Clone, Default)]
pub struct AssetServer {
    files: Arc<Mutex<HashMap<String, Bytes>>>,
    delay: Arc<Mutex<Duration>>,
}

impl AssetServer {
    pub fn put(&self, name: &str, bytes: Vec<u8>) {
        self.files
            .lock()
            .unwrap()
            .insert(name.to_string(), Bytes::from(bytes));
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    /// Bind to an ephemeral port and return the base URL
    pub async fn start(&self) -> String {
        let app = Router::new()
            .route("/out/{name}", get(serve_file))
            .with_state(self.clone());

        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
        let bound_addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        format!("http://{bound_addr}")
    }
}

async fn serve_file(
    State(server): State<AssetServer>,
    Path(name): Path<String>,
) -> Result<Bytes, StatusCode> {
    let delay = *server.delay.lock().unwrap();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    server
        .files
        .lock()
        .unwrap()
        .get(&name)
        .cloned()
        .ok_or(StatusCode::NOT_FOUND)
}

/// An orchestrator over in-memory storage with a private workspace root
pub struct Harness {
    pub orchestrator: Arc<PipelineOrchestrator>,
    pub storage: Arc<StorageGateway>,
    pub metrics: Arc<Metrics>,
    pub workspace_root: TempDir,
}

impl Harness {
    pub fn new(generator: Arc<dyn GenerationClient>, options: PipelineOptions) -> Self {
        Self::with_storage(
            generator,
            StorageGateway::in_memory(BUCKET, UrlStyle::VirtualHosted),
            options,
        )
    }

    pub fn with_storage(
        generator: Arc<dyn GenerationClient>,
        storage: StorageGateway,
        options: PipelineOptions,
    ) -> Self {
        let workspace_root = TempDir::new().unwrap();
        let storage = Arc::new(storage);
        let metrics = Arc::new(Metrics::new());
        let fetcher = AssetFetcher::new(
            HttpClient::new(HttpConfig::default()).unwrap(),
            workspace_root.path(),
        );

        let orchestrator = Arc::new(PipelineOrchestrator::new(
            storage.clone(),
            generator,
            fetcher,
            options,
            metrics.clone(),
        ));

        Self {
            orchestrator,
            storage,
            metrics,
            workspace_root,
        }
    }

    /// Number of entries left under the workspace root
    pub fn leftover_workspaces(&self) -> usize {
        std::fs::read_dir(self.workspace_root.path())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}
