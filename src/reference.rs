//! Image references
//!
//! Supports formats:
//! - registry.example.com/namespace/stream:tag (image stream tag, as given by the user)
//! - registry.example.com/namespace/repo@sha256:digest (canonical registry reference)
//! - registry.example.com:5000/namespace/repo:tag (canonical registry reference)

use crate::error::{Result, SourceError};
use std::fmt;
use std::str::FromStr;

/// Registry used when a canonical reference names no host
pub const DEFAULT_REGISTRY: &str = "docker.io";

/// Tag used when a canonical reference carries neither tag nor digest
pub const DEFAULT_TAG: &str = "latest";

/// Content digest in `algorithm:encoded` form
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Digest {
    algorithm: String,
    encoded: String,
}

impl Digest {
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    pub fn encoded(&self) -> &str {
        &self.encoded
    }
}

impl FromStr for Digest {
    type Err = SourceError;

    fn from_str(s: &str) -> Result<Self> {
        let (algorithm, encoded) = s.split_once(':').ok_or_else(|| {
            SourceError::MalformedReference(format!("Digest missing algorithm prefix: {}", s))
        })?;

        let algorithm_ok = !algorithm.is_empty()
            && algorithm
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "+._-".contains(c));
        if !algorithm_ok {
            return Err(SourceError::MalformedReference(format!(
                "Invalid digest algorithm: {}",
                s
            )));
        }

        let expected_len = match algorithm {
            "sha256" => Some(64),
            "sha384" => Some(96),
            "sha512" => Some(128),
            _ => None,
        };
        let encoded_ok = !encoded.is_empty()
            && expected_len.is_none_or(|len| encoded.len() == len)
            && encoded
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));
        if !encoded_ok {
            return Err(SourceError::MalformedReference(format!(
                "Invalid {} digest: {}",
                algorithm, s
            )));
        }

        Ok(Digest {
            algorithm: algorithm.to_string(),
            encoded: encoded.to_string(),
        })
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.encoded)
    }
}

/// Reference to a tag on an image stream, as supplied by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageStreamReference {
    /// Public registry host (e.g., "registry.example.com")
    pub registry: String,
    pub namespace: String,
    pub stream: String,
    /// The only key used to look up the tag event
    pub tag: String,
}

impl ImageStreamReference {
    pub fn new(registry: &str, namespace: &str, stream: &str, tag: &str) -> Result<Self> {
        if registry.is_empty() {
            return Err(SourceError::MalformedReference(
                "Registry host cannot be empty".to_string(),
            ));
        }
        for (what, value) in [("namespace", namespace), ("stream", stream)] {
            if !is_valid_path_segment(value) {
                return Err(SourceError::MalformedReference(format!(
                    "Invalid {} name: {:?}",
                    what, value
                )));
            }
        }
        if !is_valid_tag(tag) {
            return Err(SourceError::MalformedReference(format!(
                "Invalid tag: {:?}",
                tag
            )));
        }

        Ok(Self {
            registry: registry.to_string(),
            namespace: namespace.to_string(),
            stream: stream.to_string(),
            tag: tag.to_string(),
        })
    }

    /// Parse `registry/namespace/stream:tag`. The tag is mandatory.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let (registry, path) = input.split_once('/').ok_or_else(|| {
            SourceError::MalformedReference(format!(
                "Invalid image stream reference {}: expected registry/namespace/stream:tag",
                input
            ))
        })?;
        let (namespace, stream_tag) = path.split_once('/').ok_or_else(|| {
            SourceError::MalformedReference(format!(
                "Invalid image stream reference {}: missing namespace",
                input
            ))
        })?;
        let (stream, tag) = stream_tag.split_once(':').ok_or_else(|| {
            SourceError::MalformedReference(format!(
                "Invalid image stream reference {}: missing tag",
                input
            ))
        })?;

        Self::new(registry, namespace, stream, tag)
    }
}

impl fmt::Display for ImageStreamReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}:{}",
            self.registry, self.namespace, self.stream, self.tag
        )
    }
}

/// Tag or digest part of a registry reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    Tag(String),
    Digest(Digest),
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Tag(t) => write!(f, "{}", t),
            Reference::Digest(d) => write!(f, "{}", d),
        }
    }
}

/// Parsed registry-protocol reference handed to the delegate opener
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DockerReference {
    pub registry: String,
    /// Repository path (e.g., "myproject/myapp")
    pub repository: String,
    pub reference: Reference,
}

impl DockerReference {
    /// Parse a canonical reference string
    ///
    /// Examples:
    /// - "registry.example.com/ns/app@sha256:..." -> registry.example.com, ns/app, digest
    /// - "registry.example.com:5000/ns/app:v1" -> registry.example.com:5000, ns/app, v1
    /// - "ns/app" -> docker.io, ns/app, latest
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(SourceError::MalformedReference(
                "Empty image reference".to_string(),
            ));
        }

        let (name_part, digest) = match input.rsplit_once('@') {
            Some((name, digest)) => (name, Some(digest.parse::<Digest>()?)),
            None => (input, None),
        };

        // A colon after the last slash is a tag; before it, a registry port.
        let last_slash = name_part.rfind('/');
        let (name, tag) = match name_part.rfind(':') {
            Some(colon) if last_slash.is_none_or(|slash| colon > slash) => {
                (&name_part[..colon], Some(&name_part[colon + 1..]))
            }
            _ => (name_part, None),
        };

        let reference = match (tag, digest) {
            (Some(_), Some(_)) => {
                return Err(SourceError::MalformedReference(format!(
                    "References with both a tag and digest are not supported: {}",
                    input
                )));
            }
            (Some(tag), None) => {
                if !is_valid_tag(tag) {
                    return Err(SourceError::MalformedReference(format!(
                        "Invalid tag in {}",
                        input
                    )));
                }
                Reference::Tag(tag.to_string())
            }
            (None, Some(digest)) => Reference::Digest(digest),
            (None, None) => Reference::Tag(DEFAULT_TAG.to_string()),
        };

        let (registry, repository) = split_registry(name);
        if repository.is_empty() || !repository.split('/').all(is_valid_path_segment) {
            return Err(SourceError::MalformedReference(format!(
                "Invalid repository name in {}",
                input
            )));
        }

        Ok(Self {
            registry,
            repository,
            reference,
        })
    }
}

impl FromStr for DockerReference {
    type Err = SourceError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for DockerReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reference {
            Reference::Tag(t) => write!(f, "{}/{}:{}", self.registry, self.repository, t),
            Reference::Digest(d) => write!(f, "{}/{}@{}", self.registry, self.repository, d),
        }
    }
}

/// Split off the registry host the way Docker does: the first component is
/// a host only if it contains '.' or ':' or is "localhost".
fn split_registry(name: &str) -> (String, String) {
    match name.split_once('/') {
        Some((first, rest))
            if first.contains('.') || first.contains(':') || first == "localhost" =>
        {
            (first.to_string(), rest.to_string())
        }
        _ if !name.contains('/') => (DEFAULT_REGISTRY.to_string(), format!("library/{}", name)),
        _ => (DEFAULT_REGISTRY.to_string(), name.to_string()),
    }
}

fn is_valid_path_segment(segment: &str) -> bool {
    let bytes = segment.as_bytes();
    !segment.is_empty()
        && bytes[0].is_ascii_alphanumeric()
        && bytes[bytes.len() - 1].is_ascii_alphanumeric()
        && segment
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "._-".contains(c))
}

fn is_valid_tag(tag: &str) -> bool {
    !tag.is_empty()
        && tag.len() <= 128
        && !tag.starts_with(['.', '-'])
        && tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_.-".contains(c))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEX: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    #[test]
    fn test_parse_digest() {
        let digest: Digest = format!("sha256:{}", HEX).parse().unwrap();
        assert_eq!(digest.algorithm(), "sha256");
        assert_eq!(digest.encoded(), HEX);
        assert_eq!(digest.to_string(), format!("sha256:{}", HEX));

        assert!("sha256:abc".parse::<Digest>().is_err());
        assert!(HEX.parse::<Digest>().is_err());
        assert!(format!("sha256:{}", HEX.to_uppercase()).parse::<Digest>().is_err());
    }

    #[test]
    fn test_parse_image_stream_reference() {
        let r = ImageStreamReference::parse("registry.example.com/myproject/app:latest").unwrap();
        assert_eq!(r.registry, "registry.example.com");
        assert_eq!(r.namespace, "myproject");
        assert_eq!(r.stream, "app");
        assert_eq!(r.tag, "latest");
        assert_eq!(r.to_string(), "registry.example.com/myproject/app:latest");
    }

    #[test]
    fn test_image_stream_reference_requires_tag() {
        assert!(ImageStreamReference::parse("registry.example.com/myproject/app").is_err());
        assert!(ImageStreamReference::parse("registry.example.com/app:latest").is_err());
        assert!(ImageStreamReference::parse("/myproject/app:latest").is_err());
        assert!(ImageStreamReference::parse("registry.example.com/a/b/c:latest").is_err());
    }

    #[test]
    fn test_parse_docker_reference_with_digest() {
        let input = format!("registry.example.com/ns/app@sha256:{}", HEX);
        let r = DockerReference::parse(&input).unwrap();
        assert_eq!(r.registry, "registry.example.com");
        assert_eq!(r.repository, "ns/app");
        match &r.reference {
            Reference::Digest(d) => assert_eq!(d.encoded(), HEX),
            other => panic!("expected digest, got {other:?}"),
        }
        assert_eq!(r.to_string(), input);
    }

    #[test]
    fn test_parse_docker_reference_with_port_and_tag() {
        let r = DockerReference::parse("registry.example.com:5000/ns/app:v1").unwrap();
        assert_eq!(r.registry, "registry.example.com:5000");
        assert_eq!(r.repository, "ns/app");
        assert_eq!(r.reference, Reference::Tag("v1".to_string()));
    }

    #[test]
    fn test_parse_docker_reference_defaults() {
        let r = DockerReference::parse("busybox").unwrap();
        assert_eq!(r.registry, DEFAULT_REGISTRY);
        assert_eq!(r.repository, "library/busybox");
        assert_eq!(r.reference, Reference::Tag(DEFAULT_TAG.to_string()));

        let r = DockerReference::parse("registry.example.com:5000/ns/app").unwrap();
        assert_eq!(r.registry, "registry.example.com:5000");
        assert_eq!(r.reference, Reference::Tag(DEFAULT_TAG.to_string()));
    }

    #[test]
    fn test_reject_tag_and_digest() {
        let input = format!("registry.example.com/ns/app:v1@sha256:{}", HEX);
        assert!(DockerReference::parse(&input).is_err());
    }

    #[test]
    fn test_reject_invalid_repository() {
        assert!(DockerReference::parse("registry.example.com/NS/App:v1").is_err());
        assert!(DockerReference::parse("registry.example.com//app:v1").is_err());
        assert!(DockerReference::parse("").is_err());
    }
}
