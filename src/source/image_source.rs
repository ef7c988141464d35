//! Lazily resolved image source for an image stream tag
//!
//! An [`ImageStreamSource`] starts unresolved. The first operation that needs
//! image data looks the tag up through the metadata API, opens a delegate
//! registry source for the resolved pull spec and keeps it until `close()`.

use crate::config::{MetadataConfig, ResolutionPolicy};
use crate::error::{Result, SourceError};
use crate::logging::Logger;
use crate::metadata::{Image, ImageStream, MetadataApi, canonicalize_pull_spec};
use crate::reference::{Digest, DockerReference, ImageStreamReference};
use crate::source::delegate::{
    BlobInfo, BlobInfoCache, BlobStream, DelegateOpener, DelegateSource, SystemContext,
};
use crate::source::signatures::filter_atomic_signatures;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

enum Resolution {
    Unresolved,
    /// Delegate and image identity are only ever stored together
    Resolved {
        delegate: Arc<dyn DelegateSource>,
        image: String,
    },
    /// Cached permanent failure, only under `CachePermanentFailures`
    Failed(SourceError),
    Closed,
}

pub struct ImageStreamSource {
    reference: ImageStreamReference,
    client: Arc<dyn MetadataApi>,
    opener: Arc<dyn DelegateOpener>,
    sys: SystemContext,
    policy: ResolutionPolicy,
    logger: Logger,
    state: Mutex<Resolution>,
}

impl ImageStreamSource {
    /// Create an unresolved source. Nothing is fetched until first use.
    pub fn new(
        reference: ImageStreamReference,
        client: Arc<dyn MetadataApi>,
        opener: Arc<dyn DelegateOpener>,
        sys: SystemContext,
    ) -> Self {
        Self {
            reference,
            client,
            opener,
            sys,
            policy: ResolutionPolicy::default(),
            logger: Logger::default(),
            state: Mutex::new(Resolution::Unresolved),
        }
    }

    /// Create a source whose metadata client and policy come from `config`.
    pub fn from_config(
        reference: ImageStreamReference,
        config: &MetadataConfig,
        opener: Arc<dyn DelegateOpener>,
        sys: SystemContext,
        logger: Logger,
    ) -> Result<Self> {
        let client = Arc::new(config.build_client(logger.clone())?);
        Ok(Self::new(reference, client, opener, sys)
            .with_policy(config.resolution_policy)
            .with_logger(logger))
    }

    pub fn with_policy(mut self, policy: ResolutionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    /// The reference as specified by the user, not as resolved.
    pub fn reference(&self) -> &ImageStreamReference {
        &self.reference
    }

    /// Image identity the tag resolved to, if resolution has happened.
    pub async fn resolved_image(&self) -> Option<String> {
        match &*self.state.lock().await {
            Resolution::Resolved { image, .. } => Some(image.clone()),
            _ => None,
        }
    }

    /// Returns the image's manifest along with its MIME type (which may be
    /// empty when it can't be determined but the manifest is available).
    ///
    /// `instance_digest` is forwarded to the delegate as-is; it resolves
    /// manifest-list children itself.
    pub async fn get_manifest(
        &self,
        instance_digest: Option<&Digest>,
        cancel: &CancellationToken,
    ) -> Result<(Vec<u8>, String)> {
        let (delegate, _) = self.ensure_resolved(cancel).await?;
        delegate.get_manifest(instance_digest, cancel).await
    }

    /// Blob fetches on one source must be serialized by the caller.
    pub fn has_thread_safe_get_blob(&self) -> bool {
        false
    }

    /// Returns a stream for the blob and its size, or -1 if unknown.
    /// The delegate may record locations in `cache`.
    pub async fn get_blob(
        &self,
        info: &BlobInfo,
        cache: &dyn BlobInfoCache,
        cancel: &CancellationToken,
    ) -> Result<(BlobStream, i64)> {
        let (delegate, _) = self.ensure_resolved(cancel).await?;
        delegate.get_blob(info, cache, cancel).await
    }

    /// Always `None`: the layer list in the manifest is used as-is.
    pub async fn layer_infos_for_copy(
        &self,
        _instance_digest: Option<&Digest>,
        _cancel: &CancellationToken,
    ) -> Result<Option<Vec<BlobInfo>>> {
        Ok(None)
    }

    /// Returns the contents of the image's atomic signatures.
    ///
    /// With an instance digest the image object is looked up by that digest
    /// directly and the tag is never resolved.
    pub async fn get_signatures(
        &self,
        instance_digest: Option<&Digest>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Vec<u8>>> {
        let image_name = match instance_digest {
            Some(digest) => digest.to_string(),
            None => self.ensure_resolved(cancel).await?.1,
        };

        let body = self
            .client
            .fetch_image_object(
                &self.reference.namespace,
                &self.reference.stream,
                &image_name,
                cancel,
            )
            .await?;
        let image = Image::from_slice(&body)?;
        Ok(filter_atomic_signatures(&image.signatures))
    }

    /// Release the delegate, if one was opened. Safe to call more than once;
    /// later data operations fail with [`SourceError::Closed`].
    pub async fn close(&self) -> Result<()> {
        let previous = {
            let mut state = self.state.lock().await;
            std::mem::replace(&mut *state, Resolution::Closed)
        };

        match previous {
            Resolution::Resolved { delegate, image } => {
                self.logger.detail(&format!(
                    "Closing registry source for {} ({})",
                    self.reference, image
                ));
                delegate.close().await.inspect_err(|e| {
                    self.logger
                        .error(&format!("Failed to close registry source: {}", e))
                })
            }
            _ => Ok(()),
        }
    }

    async fn lock_state(&self, cancel: &CancellationToken) -> Result<MutexGuard<'_, Resolution>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SourceError::Cancelled),
            guard = self.state.lock() => Ok(guard),
        }
    }

    /// Resolve on first use and hand out the cached delegate afterwards.
    ///
    /// The state lock is held across the whole lookup, so concurrent callers
    /// wait for one resolution instead of each opening a delegate.
    async fn ensure_resolved(
        &self,
        cancel: &CancellationToken,
    ) -> Result<(Arc<dyn DelegateSource>, String)> {
        let mut state = self.lock_state(cancel).await?;
        match &*state {
            Resolution::Resolved { delegate, image } => {
                return Ok((Arc::clone(delegate), image.clone()));
            }
            Resolution::Failed(err) => return Err(err.clone()),
            Resolution::Closed => return Err(SourceError::Closed),
            Resolution::Unresolved => {}
        }

        match self.resolve(cancel).await {
            Ok((delegate, image)) => {
                let delegate: Arc<dyn DelegateSource> = Arc::from(delegate);
                *state = Resolution::Resolved {
                    delegate: Arc::clone(&delegate),
                    image: image.clone(),
                };
                Ok((delegate, image))
            }
            Err(err) => {
                if self.policy == ResolutionPolicy::CachePermanentFailures && err.is_permanent() {
                    *state = Resolution::Failed(err.clone());
                }
                Err(err)
            }
        }
    }

    async fn resolve(&self, cancel: &CancellationToken) -> Result<(Box<dyn DelegateSource>, String)> {
        let body = self
            .client
            .fetch_image_stream(&self.reference.namespace, &self.reference.stream, cancel)
            .await?;
        let stream: ImageStream = serde_json::from_slice(&body)?;

        let event = stream
            .latest_event(&self.reference.tag)
            .ok_or_else(|| SourceError::TagNotFound {
                stream: format!("{}/{}", self.reference.namespace, self.reference.stream),
                tag: self.reference.tag.clone(),
            })?;
        self.logger.trace(&format!("tag event {:?}", event));

        let canonical =
            canonicalize_pull_spec(&event.docker_image_reference, &self.reference.registry)?;
        self.logger
            .info(&format!("Resolved {} to {}", self.reference, canonical));

        let docker_ref = DockerReference::parse(&canonical).map_err(|e| SourceError::DelegateOpen {
            reference: canonical.clone(),
            message: e.to_string(),
        })?;
        let delegate = self
            .opener
            .open_for_reference(&docker_ref, &self.sys, cancel)
            .await
            .map_err(|e| match e {
                SourceError::Cancelled => SourceError::Cancelled,
                other => SourceError::DelegateOpen {
                    reference: canonical.clone(),
                    message: other.to_string(),
                },
            })?;

        Ok((delegate, event.image.clone()))
    }
}

impl Drop for ImageStreamSource {
    fn drop(&mut self) {
        if let Resolution::Resolved { .. } = self.state.get_mut() {
            self.logger.warning(&format!(
                "Image source for {} dropped without close()",
                self.reference
            ));
        }
    }
}
