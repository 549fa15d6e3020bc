use argon2::Argon2;
use password_hash::rand_core::OsRng;
use password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use rand::Rng;
use sha2::{Digest, Sha256};

/// Generate an API key. Returns `(full_key, sha256_hash)`.
/// Key format: `compass_sk_` + 32 random bytes hex-encoded.
pub fn generate_api_key() -> (String, String) {
    let raw = random_hex(32);
    let full_key = format!("compass_sk_{raw}");
    let hash = hash_token(&full_key);
    (full_key, hash)
}

/// Generate an access token. Returns `(full_token, sha256_hash)`.
/// Format: `compass_at_` + 32 random bytes hex-encoded.
pub fn generate_access_token() -> (String, String) {
    let raw = random_hex(32);
    let full_token = format!("compass_at_{raw}");
    let hash = hash_token(&full_token);
    (full_token, hash)
}

/// Generate a refresh token. Returns `(full_token, sha256_hash)`.
/// Format: `compass_rt_` + 32 random bytes hex-encoded.
pub fn generate_refresh_token() -> (String, String) {
    let raw = random_hex(32);
    let full_token = format!("compass_rt_{raw}");
    let hash = hash_token(&full_token);
    (full_token, hash)
}

/// SHA-256 hex digest of a token string.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Extract the first 8 chars after `compass_sk_` for display/identification.
pub fn key_prefix(full_key: &str) -> String {
    full_key
        .strip_prefix("compass_sk_")
        .map(|rest| rest.chars().take(8).collect())
        .unwrap_or_default()
}

/// Hash a password with Argon2id and a random salt.
pub fn hash_password(password: &str) -> Result<String, String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| format!("Failed to hash password: {e}"))
}

/// Verify a password against an Argon2id hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, String> {
    let parsed = PasswordHash::new(hash).map_err(|e| format!("Invalid password hash: {e}"))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Generate `n` random bytes and return as hex string.
fn random_hex(n: usize) -> String {
    let bytes: Vec<u8> = (0..n).map(|_| rand::thread_rng().r#gen::<u8>()).collect();
    hex::encode(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_roundtrip() {
        let (key, hash) = generate_api_key();
        assert!(key.starts_with("compass_sk_"));
        assert_eq!(hash, hash_token(&key));
        assert_eq!(key_prefix(&key).len(), 8);
    }

    #[test]
    fn access_token_roundtrip() {
        let (token, hash) = generate_access_token();
        assert!(token.starts_with("compass_at_"));
        assert_eq!(hash, hash_token(&token));
    }

    #[test]
    fn refresh_token_roundtrip() {
        let (token, hash) = generate_refresh_token();
        assert!(token.starts_with("compass_rt_"));
        assert_eq!(hash, hash_token(&token));
    }

    #[test]
    fn password_roundtrip() {
        let password = "test_password_123";
        let hash = hash_password(password).unwrap();
        assert!(verify_password(password, &hash).unwrap());
        assert!(!verify_password("wrong_password", &hash).unwrap());
    }
}
