//! Signature extraction from image objects

use crate::metadata::{ImageSignature, SignatureKind};

/// Contents of every atomic signature, in their original order.
/// Signatures of other kinds are dropped.
pub fn filter_atomic_signatures(signatures: &[ImageSignature]) -> Vec<Vec<u8>> {
    signatures
        .iter()
        .filter(|sig| sig.kind == SignatureKind::Atomic)
        .map(|sig| sig.content.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(kind: &str, content: &[u8]) -> ImageSignature {
        ImageSignature {
            kind: kind.to_string().into(),
            content: content.to_vec(),
        }
    }

    #[test]
    fn test_keeps_atomic_in_order() {
        let signatures = vec![
            sig("AtomicImage", b"first"),
            sig("other", b"dropped"),
            sig("AtomicImage", b"second"),
        ];
        assert_eq!(
            filter_atomic_signatures(&signatures),
            vec![b"first".to_vec(), b"second".to_vec()]
        );
    }

    #[test]
    fn test_kind_match_is_exact() {
        let signatures = vec![sig("atomicimage", b"x"), sig("AtomicImage ", b"y")];
        assert!(filter_atomic_signatures(&signatures).is_empty());
        assert!(filter_atomic_signatures(&[]).is_empty());
    }
}
