//! Image stream source module
//!
//! This module provides the lazily resolved [`ImageStreamSource`] and the
//! delegate interface it forwards manifest and blob reads to.

pub mod delegate;
pub mod image_source;
pub mod signatures;

pub use delegate::{
    BlobInfo, BlobInfoCache, BlobStream, DelegateOpener, DelegateSource, MemoryBlobInfoCache,
    SystemContext,
};
pub use image_source::ImageStreamSource;
pub use signatures::filter_atomic_signatures;
