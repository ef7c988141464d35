//! Narrow interface to the registry-protocol source that does the transfers
//!
//! Only the operations the image stream source forwards are modelled here.
//! Results and errors from a delegate are passed to callers unchanged.

use crate::config::AuthConfig;
use crate::error::Result;
use crate::reference::{Digest, DockerReference};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

/// Blob body returned by [`DelegateSource::get_blob`]
pub type BlobStream = Box<dyn AsyncRead + Send + Unpin>;

/// Caller runtime options passed through to the delegate opener unchanged
#[derive(Debug, Clone, Default)]
pub struct SystemContext {
    pub registry_auth: Option<AuthConfig>,
    pub insecure_skip_tls_verify: bool,
    pub user_agent: Option<String>,
    pub certs_dir: Option<PathBuf>,
}

/// Identifies a blob to fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobInfo {
    pub digest: Digest,
    /// Size in bytes, or -1 if unknown
    pub size: i64,
    pub media_type: Option<String>,
}

impl BlobInfo {
    pub fn new(digest: Digest) -> Self {
        Self {
            digest,
            size: -1,
            media_type: None,
        }
    }

    pub fn with_size(mut self, size: i64) -> Self {
        self.size = size;
        self
    }
}

/// Caller-owned record of where blobs are known to live.
///
/// Delegates may write location hints here while fetching; the image
/// stream source never reads it.
pub trait BlobInfoCache: Send + Sync {
    fn record_known_location(&self, transport: &str, scope: &str, digest: &Digest, location: &str);

    fn candidate_locations(&self, transport: &str, scope: &str, digest: &Digest) -> Vec<String>;
}

/// In-memory [`BlobInfoCache`] keyed by transport, scope and digest
#[derive(Debug, Default)]
pub struct MemoryBlobInfoCache {
    locations: Mutex<HashMap<(String, String, Digest), Vec<String>>>,
}

impl MemoryBlobInfoCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobInfoCache for MemoryBlobInfoCache {
    fn record_known_location(&self, transport: &str, scope: &str, digest: &Digest, location: &str) {
        let mut locations = self.locations.lock().unwrap_or_else(|e| e.into_inner());
        let known = locations
            .entry((transport.to_string(), scope.to_string(), digest.clone()))
            .or_default();
        if !known.iter().any(|l| l == location) {
            known.push(location.to_string());
        }
    }

    fn candidate_locations(&self, transport: &str, scope: &str, digest: &Digest) -> Vec<String> {
        let locations = self.locations.lock().unwrap_or_else(|e| e.into_inner());
        locations
            .get(&(transport.to_string(), scope.to_string(), digest.clone()))
            .cloned()
            .unwrap_or_default()
    }
}

/// Registry-protocol source opened for one canonical reference
#[async_trait]
pub trait DelegateSource: Send + Sync {
    /// Manifest bytes and MIME type (which may be empty)
    async fn get_manifest(
        &self,
        instance_digest: Option<&Digest>,
        cancel: &CancellationToken,
    ) -> Result<(Vec<u8>, String)>;

    fn has_thread_safe_get_blob(&self) -> bool;

    /// Blob stream and its size, or -1 if unknown
    async fn get_blob(
        &self,
        info: &BlobInfo,
        cache: &dyn BlobInfoCache,
        cancel: &CancellationToken,
    ) -> Result<(BlobStream, i64)>;

    async fn close(&self) -> Result<()>;
}

/// Opens delegate sources for canonical references
#[async_trait]
pub trait DelegateOpener: Send + Sync {
    async fn open_for_reference(
        &self,
        reference: &DockerReference,
        sys: &SystemContext,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn DelegateSource>>;
}
