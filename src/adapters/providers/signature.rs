//! Shared webhook signature primitives.
//!
//! # Security
//!
//! - HMAC-SHA256 with constant-time comparison
//! - Timestamp validation (5-minute replay window, 60-second clock skew)

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::domain::foundation::PaymentError;

type HmacSha256 = Hmac<Sha256>;

/// Maximum age for webhook events (5 minutes).
pub const MAX_TIMESTAMP_AGE_SECS: i64 = 300;

/// Clock skew tolerance for future timestamps (60 seconds).
pub const MAX_FUTURE_TOLERANCE_SECS: i64 = 60;

/// Parsed `t=<unix>,v1=<hex>` signature header.
#[derive(Debug)]
pub struct SignatureHeader {
    pub timestamp: i64,
    pub v1_signature: Vec<u8>,
}

impl SignatureHeader {
    /// Parses a timestamped signature header.
    pub fn parse(header: &str) -> Result<Self, PaymentError> {
        let mut timestamp = None;
        let mut v1_signature = None;

        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => {
                    timestamp = Some(value.parse::<i64>().map_err(|_| {
                        PaymentError::webhook("Invalid timestamp in signature header")
                    })?);
                }
                Some(("v1", value)) => {
                    v1_signature = Some(hex::decode(value).map_err(|_| {
                        PaymentError::webhook("Invalid hex signature in signature header")
                    })?);
                }
                _ => {} // Ignore unknown schemes (v0, future versions)
            }
        }

        match (timestamp, v1_signature) {
            (Some(timestamp), Some(v1_signature)) => Ok(Self {
                timestamp,
                v1_signature,
            }),
            _ => Err(PaymentError::webhook(
                "Signature header missing t= or v1= component",
            )),
        }
    }
}

/// Rejects timestamps outside the replay window.
pub fn validate_timestamp(timestamp: i64) -> Result<(), PaymentError> {
    let now = chrono::Utc::now().timestamp();
    let age = now - timestamp;

    if age > MAX_TIMESTAMP_AGE_SECS {
        tracing::warn!(
            event_timestamp = timestamp,
            current_time = now,
            age_secs = age,
            "Webhook event too old - possible replay attack"
        );
        return Err(PaymentError::webhook(format!(
            "Event too old ({age} seconds)"
        )));
    }

    if age < -MAX_FUTURE_TOLERANCE_SECS {
        tracing::warn!(
            event_timestamp = timestamp,
            current_time = now,
            "Webhook event from future - clock skew or manipulation"
        );
        return Err(PaymentError::webhook("Event timestamp in future"));
    }

    Ok(())
}

/// Computes HMAC-SHA256 over the message.
pub fn hmac_sha256(key: &[u8], message: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(message);
    mac.finalize().into_bytes().to_vec()
}

/// Constant-time byte comparison.
pub fn signatures_match(expected: &[u8], provided: &[u8]) -> bool {
    expected.ct_eq(provided).unwrap_u8() == 1
}

/// Constant-time comparison of two hex digests, case-insensitive.
pub fn hex_digests_match(expected: &str, provided: &str) -> bool {
    let expected = expected.to_ascii_lowercase();
    let provided = provided.to_ascii_lowercase();
    expected.as_bytes().ct_eq(provided.as_bytes()).unwrap_u8() == 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_valid_header() {
        let header = SignatureHeader::parse("t=1704067200,v1=deadbeef").unwrap();
        assert_eq!(header.timestamp, 1704067200);
        assert_eq!(header.v1_signature, vec![0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn parse_ignores_unknown_schemes() {
        let header = SignatureHeader::parse("t=1704067200,v0=ffff,v1=deadbeef").unwrap();
        assert_eq!(header.v1_signature, vec![0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn parse_missing_components() {
        assert!(SignatureHeader::parse("t=1704067200").is_err());
        assert!(SignatureHeader::parse("v1=deadbeef").is_err());
        assert!(SignatureHeader::parse("garbage").is_err());
    }

    #[test]
    fn parse_rejects_bad_hex() {
        assert!(SignatureHeader::parse("t=1704067200,v1=not_hex").is_err());
    }

    #[test]
    fn timestamp_within_window_is_valid() {
        assert!(validate_timestamp(chrono::Utc::now().timestamp()).is_ok());
        assert!(validate_timestamp(chrono::Utc::now().timestamp() - 200).is_ok());
        assert!(validate_timestamp(chrono::Utc::now().timestamp() + 30).is_ok());
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let err = validate_timestamp(chrono::Utc::now().timestamp() - 600).unwrap_err();
        assert!(err.to_string().contains("too old"));
    }

    #[test]
    fn future_timestamp_is_rejected() {
        let err = validate_timestamp(chrono::Utc::now().timestamp() + 120).unwrap_err();
        assert!(err.to_string().contains("future"));
    }

    #[test]
    fn hex_digest_comparison_is_case_insensitive() {
        assert!(hex_digests_match("DEADBEEF", "deadbeef"));
        assert!(!hex_digests_match("deadbeef", "deadbeee"));
    }

    #[test]
    fn hmac_is_deterministic() {
        let a = hmac_sha256(b"secret", b"payload");
        let b = hmac_sha256(b"secret", b"payload");
        let c = hmac_sha256(b"other", b"payload");
        assert!(signatures_match(&a, &b));
        assert!(!signatures_match(&a, &c));
    }
}
