//! Password hashing and verification.

use argon2::Argon2;
use argon2::password_hash::{
    PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng,
};

/// Hash a password with Argon2id and a fresh random salt.
///
/// The returned PHC string embeds the salt and parameters, so hashing the
/// same password twice gives two different digests that both verify.
pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
        .to_string();
    Ok(hash)
}

/// Verify a password against a stored digest.
///
/// A digest that does not parse is treated as a mismatch.
pub fn verify_password(hash: &str, plain: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(plain.as_bytes(), &parsed_hash)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_then_verify() {
        let hash = hash_password("b4l0u").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password(&hash, "b4l0u"));
        assert!(!verify_password(&hash, "t4rt1fl3tt3"));
    }

    #[test]
    fn test_hash_is_salted() {
        let h1 = hash_password("same password").unwrap();
        let h2 = hash_password("same password").unwrap();
        assert_ne!(h1, h2);
        assert!(verify_password(&h1, "same password"));
        assert!(verify_password(&h2, "same password"));
    }

    #[test]
    fn test_malformed_digest_is_false() {
        assert!(!verify_password("", "anything"));
        assert!(!verify_password("not-a-phc-string", "anything"));
        assert!(!verify_password("$argon2id$v=19$garbage", "anything"));
    }
}
