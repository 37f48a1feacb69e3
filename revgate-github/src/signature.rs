//! Webhook signature verification
//!
//! GitHub signs every delivery with `HMAC-SHA256(secret, body)` and sends it
//! as `X-Hub-Signature-256: sha256=<hex>`. Verification fails closed: a
//! missing or malformed header is a mismatch, never an error.

use std::sync::Arc;

use hmac::{Hmac, Mac};
use revgate_core::{Environment, SecretSource};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{error, warn};

use crate::{Error, Result};

/// Header carrying the delivery signature
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

const SIGNATURE_PREFIX: &str = "sha256=";

type HmacSha256 = Hmac<Sha256>;

/// Compute the signature header value for a body
pub fn sign(secret: &str, body: &[u8]) -> String {
    // HMAC accepts keys of any length
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    format!("{}{}", SIGNATURE_PREFIX, hex::encode(mac.finalize().into_bytes()))
}

/// Verify a delivery signature
///
/// - With a secret: `true` only when `signature` equals the expected header
///   value exactly, compared in constant time.
/// - Without a secret in production: a configuration error. The caller must
///   not serve traffic in this state.
/// - Without a secret elsewhere: `true`, logged as a warning every time.
pub fn verify_signature(
    body: &[u8],
    signature: Option<&str>,
    secret: Option<&str>,
    is_production: bool,
) -> Result<bool> {
    let secret = match secret {
        Some(secret) => secret,
        None if is_production => {
            error!("Webhook secret is not configured in production");
            return Err(Error::Config(
                "GITHUB_WEBHOOK_SECRET must be set in production".to_string(),
            ));
        }
        None => {
            warn!("Webhook secret not set - signature verification disabled (development only)");
            return Ok(true);
        }
    };

    let Some(provided) = signature else {
        warn!("No signature provided in request");
        return Ok(false);
    };

    let expected = sign(secret, body);
    // slices of unequal length compare unequal
    let matches: bool = expected.as_bytes().ct_eq(provided.as_bytes()).into();

    if !matches {
        warn!("Invalid webhook signature");
    }

    Ok(matches)
}

/// Verifier bound to a secret source and an environment
///
/// The secret is fetched from the source on every call, so a rotated secret
/// takes effect without a restart.
#[derive(Clone)]
pub struct SignatureVerifier {
    source: Arc<dyn SecretSource>,
    environment: Environment,
}

impl SignatureVerifier {
    pub fn new(source: Arc<dyn SecretSource>, environment: Environment) -> Self {
        Self {
            source,
            environment,
        }
    }

    /// Verify a delivery against the current secret
    pub fn verify(&self, body: &[u8], signature: Option<&str>) -> Result<bool> {
        let secret = self.source.webhook_secret();
        verify_signature(
            body,
            signature,
            secret.as_deref(),
            self.environment.is_production(),
        )
    }

    /// Startup check: production must have a secret before serving
    pub fn ensure_ready(&self) -> Result<()> {
        if self.environment.is_production() && self.source.webhook_secret().is_none() {
            return Err(Error::Config(
                "GITHUB_WEBHOOK_SECRET must be set in production".to_string(),
            ));
        }
        if self.source.webhook_secret().is_none() {
            warn!(environment = %self.environment, "Starting without a webhook secret - deliveries are not verified");
        }
        Ok(())
    }
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("environment", &self.environment)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use revgate_core::StaticSecretSource;
    use std::sync::Mutex;

    const SECRET: &str = "It's a Secret to Everybody";
    const BODY: &[u8] = b"Hello, World!";

    #[test]
    fn test_known_vector() {
        // example from GitHub's webhook documentation
        assert_eq!(
            sign(SECRET, BODY),
            "sha256=757107ea0eb2509fc211221cce984b8a37570b6d7586c22c46f4379c8b043e17"
        );
    }

    #[test]
    fn test_valid_signature_accepted() {
        for (secret, body) in [
            (SECRET, BODY),
            ("k", &b""[..]),
            ("another secret", &br#"{"action":"opened"}"#[..]),
        ] {
            let header = sign(secret, body);
            assert!(verify_signature(body, Some(&header), Some(secret), true).unwrap());
            assert!(verify_signature(body, Some(&header), Some(secret), false).unwrap());
        }
    }

    #[test]
    fn test_every_single_byte_mutation_rejected() {
        let header = sign(SECRET, BODY);
        for i in 0..header.len() {
            let mut bytes = header.clone().into_bytes();
            bytes[i] = if bytes[i] == b'0' { b'1' } else { b'0' };
            let mutated = String::from_utf8(bytes).unwrap();
            assert!(
                !verify_signature(BODY, Some(&mutated), Some(SECRET), true).unwrap(),
                "mutation at {} accepted",
                i
            );
        }
    }

    #[test]
    fn test_malformed_headers_rejected() {
        let header = sign(SECRET, BODY);
        let bare_hex = header.trim_start_matches(SIGNATURE_PREFIX).to_string();
        let sha1 = format!("sha1={}", bare_hex);
        let truncated = header[..header.len() - 2].to_string();
        let uppercase = format!("sha256={}", bare_hex.to_uppercase());

        let bad_headers: [&str; 7] = [
            "",
            "sha256=",
            "garbage",
            &bare_hex,
            &sha1,
            &truncated,
            &uppercase,
        ];
        for bad in bad_headers {
            assert!(!verify_signature(BODY, Some(bad), Some(SECRET), true).unwrap());
        }
        assert!(!verify_signature(BODY, None, Some(SECRET), true).unwrap());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let header = sign("other secret", BODY);
        assert!(!verify_signature(BODY, Some(&header), Some(SECRET), false).unwrap());
    }

    #[test]
    fn test_missing_secret_in_production_is_fatal() {
        let result = verify_signature(BODY, Some("anything"), None, true);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_missing_secret_in_development_accepts() {
        assert!(verify_signature(BODY, Some("anything"), None, false).unwrap());
        assert!(verify_signature(BODY, None, None, false).unwrap());
    }

    struct RotatingSource(Mutex<Option<String>>);

    impl SecretSource for RotatingSource {
        fn webhook_secret(&self) -> Option<String> {
            self.0.lock().unwrap().clone()
        }
    }

    #[test]
    fn test_verifier_reads_secret_on_every_call() {
        let source = Arc::new(RotatingSource(Mutex::new(Some("old".to_string()))));
        let verifier = SignatureVerifier::new(source.clone(), Environment::Production);

        let old_sig = sign("old", BODY);
        let new_sig = sign("new", BODY);
        assert!(verifier.verify(BODY, Some(&old_sig)).unwrap());

        *source.0.lock().unwrap() = Some("new".to_string());
        assert!(!verifier.verify(BODY, Some(&old_sig)).unwrap());
        assert!(verifier.verify(BODY, Some(&new_sig)).unwrap());
    }

    #[test]
    fn test_ensure_ready() {
        let prod_without = SignatureVerifier::new(
            Arc::new(StaticSecretSource::none()),
            Environment::Production,
        );
        assert!(matches!(prod_without.ensure_ready(), Err(Error::Config(_))));

        let dev_without = SignatureVerifier::new(
            Arc::new(StaticSecretSource::none()),
            Environment::Development,
        );
        assert!(dev_without.ensure_ready().is_ok());

        let prod_with = SignatureVerifier::new(
            Arc::new(StaticSecretSource::new(Some(SECRET.to_string()))),
            Environment::Production,
        );
        assert!(prod_with.ensure_ready().is_ok());
    }
}
