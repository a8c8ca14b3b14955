//! Pre-signed URL derivation for the object store backing file and sticker
//! uploads. A pure function of the configured endpoint/bucket/keys and the
//! requested object key — no I/O, no state.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::config::Config;

type HmacSha256 = Hmac<Sha256>;

/// Builds a time-boxed download URL for `object_key` under the configured
/// object store. The signature covers the key and expiry so a URL cannot be
/// replayed past `presign_ttl_seconds` or mutated to point at another key.
pub fn presigned_get_url(config: &Config, object_key: &str) -> String {
    let expires_at = (chrono::Utc::now() + chrono::Duration::seconds(config.presign_ttl_seconds))
        .timestamp();

    let secret = secret_key(config);
    let signature = sign(secret, object_key, expires_at);

    format!(
        "{base}/{object_key}?expires={expires_at}&sig={signature}",
        base = config.object_store_public_url.trim_end_matches('/'),
    )
}

/// Verifies a previously issued presigned URL's signature and expiry.
/// Exposed mainly for tests and for a future direct-download handler that
/// wants to validate a signature server-side rather than trusting the store.
pub fn verify(config: &Config, object_key: &str, expires_at: i64, signature: &str) -> bool {
    if expires_at < chrono::Utc::now().timestamp() {
        return false;
    }
    sign(secret_key(config), object_key, expires_at) == signature
}

fn secret_key(config: &Config) -> &str {
    config.object_store_secret_key.as_deref().unwrap_or("")
}

fn sign(secret: &str, object_key: &str, expires_at: i64) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(object_key.as_bytes());
    mac.update(b":");
    mac.update(expires_at.to_string().as_bytes());
    URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            database_url: "postgres://localhost/test".into(),
            db_pool_size: 5,
            broker_url: None,
            object_store_endpoint: Some("https://objects.example.com".into()),
            object_store_bucket: "courier".into(),
            object_store_access_key: Some("key".into()),
            object_store_secret_key: Some("super-secret-signing-key".into()),
            object_store_public_url: "https://objects.example.com/courier".into(),
            presign_ttl_seconds: 900,
            upload_dir: "./uploads".into(),
            jwt_secret: "test-secret-min-16-chars".into(),
            jwt_access_ttl_minutes: 15,
            jwt_refresh_ttl_minutes: 10080,
            server_host: "127.0.0.1".into(),
            server_port: 8080,
            max_file_size_mb: 25,
            is_dev: true,
            allowed_origins: vec![],
        }
    }

    #[test]
    fn presigned_url_round_trips_through_verify() {
        let config = test_config();
        let url = presigned_get_url(&config, "avatars/42.png");

        let query: Vec<&str> = url.split('?').nth(1).unwrap().split('&').collect();
        let expires_at: i64 = query[0].trim_start_matches("expires=").parse().unwrap();
        let sig = query[1].trim_start_matches("sig=");

        assert!(verify(&config, "avatars/42.png", expires_at, sig));
    }

    #[test]
    fn verify_rejects_tampered_object_key() {
        let config = test_config();
        let url = presigned_get_url(&config, "avatars/42.png");
        let query: Vec<&str> = url.split('?').nth(1).unwrap().split('&').collect();
        let expires_at: i64 = query[0].trim_start_matches("expires=").parse().unwrap();
        let sig = query[1].trim_start_matches("sig=");

        assert!(!verify(&config, "avatars/999.png", expires_at, sig));
    }

    #[test]
    fn verify_rejects_expired_signature() {
        let config = test_config();
        let sig = sign(secret_key(&config), "avatars/42.png", 0);
        assert!(!verify(&config, "avatars/42.png", 0, &sig));
    }
}
