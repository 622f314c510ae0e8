use crate::error::Error;
use crate::model::Operation;
use sha2::{Digest, Sha256};
use std::path::{Component, Path};

/// SHA-256 of `payload` as lowercase hex.
pub fn digest(payload: &[u8]) -> String {
    hex::encode(Sha256::digest(payload))
}

/// Recompute the digest of `payload` and compare it to `expected`.
pub fn verify(payload: &[u8], expected: &str) -> Result<(), Error> {
    let actual = digest(payload);
    if actual.eq_ignore_ascii_case(expected.trim()) {
        Ok(())
    } else {
        Err(Error::IntegrityMismatch {
            expected: expected.trim().to_string(),
            actual,
        })
    }
}

/// A plan bound to the exact bytes it was parsed from.
///
/// The operations shown to the approver are decoded from `payload`, and the
/// digest shown alongside them is computed over the same bytes, so approval
/// and execution always refer to one payload.
#[derive(Debug, Clone)]
pub struct SealedPlan {
    payload: Vec<u8>,
    operations: Vec<Operation>,
    digest: String,
}

impl SealedPlan {
    /// Parse and digest a serialized operation list. Rejects malformed JSON
    /// and any path that could escape the target root.
    pub fn seal(payload: Vec<u8>) -> Result<Self, Error> {
        let operations: Vec<Operation> = serde_json::from_slice(&payload)?;
        for op in &operations {
            ensure_relative(op.from_path())?;
            if let Some(to) = op.to_path() {
                ensure_relative(to)?;
            }
        }

        let digest = digest(&payload);
        Ok(Self {
            payload,
            operations,
            digest,
        })
    }

    pub fn from_operations(operations: &[Operation]) -> Result<Self, Error> {
        Self::seal(serde_json::to_vec(operations)?)
    }

    /// Check a digest declared by the submitter. The server never trusts it
    /// in place of its own; a mismatch only means the payload was altered in
    /// transit.
    pub fn check_expected(&self, expected: Option<&str>) -> Result<(), Error> {
        match expected {
            Some(expected) => verify(&self.payload, expected),
            None => Ok(()),
        }
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

/// Only plain relative paths made of normal components are accepted.
fn ensure_relative(path: &str) -> Result<(), Error> {
    let candidate = Path::new(path);
    let safe = !path.is_empty()
        && !path.contains('\\')
        && candidate
            .components()
            .all(|component| matches!(component, Component::Normal(_)));

    if safe {
        Ok(())
    } else {
        Err(Error::UnsafePath(path.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_ops() -> Vec<Operation> {
        vec![
            Operation::Move {
                from: "photos/old/vacation.jpg".into(),
                to: "photos/2024/vacation.jpg".into(),
            },
            Operation::Delete {
                from: "photos/old/extra.jpg".into(),
            },
        ]
    }

    #[test]
    fn test_digest_is_sha256_hex() {
        assert_eq!(
            digest(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_single_byte_mutation_is_rejected() {
        let payload = serde_json::to_vec(&sample_ops()).unwrap();
        let expected = digest(&payload);
        assert!(verify(&payload, &expected).is_ok());

        let mut tampered = payload.clone();
        let idx = tampered.iter().position(|b| *b == b'o').unwrap();
        tampered[idx] = b'0';
        assert!(matches!(
            verify(&tampered, &expected),
            Err(Error::IntegrityMismatch { .. })
        ));
    }

    #[test]
    fn test_seal_binds_operations_to_payload() {
        let sealed = SealedPlan::from_operations(&sample_ops()).unwrap();
        assert_eq!(sealed.operations(), sample_ops().as_slice());
        assert_eq!(sealed.digest(), digest(sealed.payload()));
        assert!(sealed.check_expected(None).is_ok());
        assert!(sealed.check_expected(Some(&sealed.digest().to_uppercase())).is_ok());
        assert!(sealed.check_expected(Some("00")).is_err());
    }

    #[test]
    fn test_seal_rejects_escaping_paths() {
        for bad in ["../etc/passwd", "/etc/passwd", "a/../../b", "./a", "", "a\\..\\b"] {
            let ops = vec![Operation::Delete { from: bad.into() }];
            let result = SealedPlan::from_operations(&ops);
            assert!(
                matches!(result, Err(Error::UnsafePath(_))),
                "expected '{}' to be rejected",
                bad
            );
        }

        let ops = vec![Operation::Copy {
            from: "ok/file".into(),
            to: "../escape".into(),
        }];
        assert!(matches!(
            SealedPlan::from_operations(&ops),
            Err(Error::UnsafePath(_))
        ));
    }

    #[test]
    fn test_seal_rejects_unknown_operation_type() {
        let payload = br#"[{"type":"chmod","from":"a"}]"#.to_vec();
        assert!(matches!(SealedPlan::seal(payload), Err(Error::Json(_))));
    }
}
