use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

const HASH_SCHEME: &str = "sha256";
const SALT_BYTES: usize = 8;
const RESET_TOKEN_BYTES: usize = 32;

/// Encodes `sha256$<salt>$<hex digest>` for a freshly salted password.
pub fn hash_password(password: &str) -> String {
    let salt = random_hex(SALT_BYTES);
    let digest = salted_digest(&salt, password);
    format!("{HASH_SCHEME}${salt}${digest}")
}

pub fn verify_password(password: &str, encoded: &str) -> bool {
    let mut parts = encoded.splitn(3, '$');
    let (Some(scheme), Some(salt), Some(expected)) = (parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    if scheme != HASH_SCHEME {
        return false;
    }

    let actual = salted_digest(salt, password);
    bool::from(actual.as_bytes().ct_eq(expected.as_bytes()))
}

/// 256-bit token from the operating system RNG, hex encoded.
pub fn generate_reset_token() -> String {
    random_hex(RESET_TOKEN_BYTES)
}

fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn salted_digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}
