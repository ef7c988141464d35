//! Wire types of the image stream metadata API
//!
//! These mirror only the fields the resolver reads; no kind or version
//! checking is done.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Deserializer};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageStream {
    #[serde(default)]
    pub status: ImageStreamStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageStreamStatus {
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<NamedTagEventList>,
}

/// All recorded events for one tag, most recent first
#[derive(Debug, Clone, Deserialize)]
pub struct NamedTagEventList {
    pub tag: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub items: Vec<TagEvent>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagEvent {
    /// Pull spec in the API's native format, usually naming the
    /// cluster-internal registry service
    pub docker_image_reference: String,
    /// Image identity, used to look the image object up again
    pub image: String,
}

impl ImageStream {
    /// Most recent event recorded for `tag`, if the tag exists and has any.
    pub fn latest_event(&self, tag: &str) -> Option<&TagEvent> {
        self.status
            .tags
            .iter()
            .filter(|t| t.tag == tag)
            .find_map(|t| t.items.first())
    }
}

/// Signature kinds the API may attach to an image
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureKind {
    /// `AtomicImage`: simple-signing payload, verified elsewhere
    Atomic,
    Unknown(String),
}

impl SignatureKind {
    pub const ATOMIC: &'static str = "AtomicImage";
}

impl From<String> for SignatureKind {
    fn from(kind: String) -> Self {
        if kind == Self::ATOMIC {
            SignatureKind::Atomic
        } else {
            SignatureKind::Unknown(kind)
        }
    }
}

impl<'de> Deserialize<'de> for SignatureKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(String::deserialize(deserializer)?.into())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageSignature {
    #[serde(rename = "type")]
    pub kind: SignatureKind,
    #[serde(deserialize_with = "signature_content")]
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Image {
    #[serde(default, deserialize_with = "null_as_default")]
    pub signatures: Vec<ImageSignature>,
}

/// Image object bodies come either bare or wrapped in an
/// `ImageStreamImage` envelope. Both shapes are decoded strictly; a
/// present `image` field wins over top-level signatures.
#[derive(Deserialize)]
struct ImageBody {
    #[serde(default)]
    image: Option<Image>,
    #[serde(default, deserialize_with = "null_as_default")]
    signatures: Vec<ImageSignature>,
}

impl Image {
    pub fn from_slice(body: &[u8]) -> serde_json::Result<Self> {
        let body: ImageBody = serde_json::from_slice(body)?;
        Ok(body.image.unwrap_or(Image {
            signatures: body.signatures,
        }))
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Byte fields are standard base64 strings on the wire. Byte arrays are
/// accepted as-is.
fn signature_content<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Content {
        Text(String),
        Bytes(Vec<u8>),
    }

    Ok(match Content::deserialize(deserializer)? {
        Content::Text(text) => STANDARD.decode(&text).map_err(serde::de::Error::custom)?,
        Content::Bytes(bytes) => bytes,
    })
}
