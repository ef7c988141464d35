//! Metadata module for image stream API interactions
//!
//! This module provides the request plumbing against the `/oapi/v1` image
//! stream API, the wire types it returns, and the conversion of the API's
//! native pull specs into canonical registry references.

pub mod client;
pub mod types;

pub use client::{MetadataClient, MetadataClientBuilder};
pub use types::{Image, ImageSignature, ImageStream, SignatureKind, TagEvent};

use crate::error::{Result, SourceError};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Read access to the image stream metadata API
///
/// Implementations return raw response bodies; decoding is left to the
/// caller. No caching and no retries happen at this layer.
#[async_trait]
pub trait MetadataApi: Send + Sync {
    /// `GET /oapi/v1/namespaces/{namespace}/imagestreams/{stream}`
    async fn fetch_image_stream(
        &self,
        namespace: &str,
        stream: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>>;

    /// Fetch a single image object, addressed as `{stream}@{image}` where
    /// `image` is an image identity or a digest string.
    async fn fetch_image_object(
        &self,
        namespace: &str,
        stream: &str,
        image: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>>;
}

/// Convert a native pull spec into a canonical registry reference string.
///
/// The API records pull specs against the registry service it reaches
/// internally (`172.30.1.1:5000/ns/app@sha256:...`). The host component is
/// replaced by `registry_host`, the host the caller named in its own
/// reference; the repository path and tag or digest are kept verbatim.
pub fn canonicalize_pull_spec(native: &str, registry_host: &str) -> Result<String> {
    if registry_host.is_empty() || registry_host.contains('/') {
        return Err(SourceError::MalformedReference(format!(
            "Invalid registry host {:?}",
            registry_host
        )));
    }

    let (host, path) = native.split_once('/').ok_or_else(|| {
        SourceError::MalformedReference(format!(
            "Invalid format of docker reference {}: missing '/'",
            native
        ))
    })?;
    if host.is_empty() {
        return Err(SourceError::MalformedReference(format!(
            "Invalid format of docker reference {}: empty registry host",
            native
        )));
    }

    let (repository, digest) = match path.split_once('@') {
        Some((repository, digest)) => (repository, Some(digest)),
        None => (path, None),
    };
    if repository.is_empty() || repository.split('/').any(str::is_empty) {
        return Err(SourceError::MalformedReference(format!(
            "Invalid format of docker reference {}: empty repository path segment",
            native
        )));
    }
    if digest.is_some_and(|d| d.is_empty() || d.contains('@')) {
        return Err(SourceError::MalformedReference(format!(
            "Invalid format of docker reference {}: malformed digest",
            native
        )));
    }

    Ok(format!("{}/{}", registry_host, path))
}
