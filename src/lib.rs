//! Image Stream Source Library
//!
//! Resolves a tag on an OpenShift-style image stream into a pullable
//! registry reference through the image stream metadata API, then hands
//! manifest and blob reads to a registry-protocol source opened for it.

pub mod config;
pub mod error;
pub mod logging;
pub mod metadata;
pub mod reference;
pub mod source;

pub use config::{AuthConfig, MetadataConfig, ResolutionPolicy};
pub use error::{Result, SourceError};
pub use logging::Logger;
pub use metadata::{MetadataApi, MetadataClient, canonicalize_pull_spec};
pub use reference::{Digest, DockerReference, ImageStreamReference};
pub use source::{
    BlobInfo, BlobInfoCache, DelegateOpener, DelegateSource, ImageStreamSource, SystemContext,
};
