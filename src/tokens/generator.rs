use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;

/// Random bytes per secret (192 bits)
pub const SECRET_BYTES: usize = 24;

/// Encoded secret length: unpadded base64 of `SECRET_BYTES`
pub const SECRET_LEN: usize = SECRET_BYTES * 4 / 3;

/// Generate a capability secret: 24 CSPRNG bytes, URL-safe base64 without padding
pub fn generate_secret() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; SECRET_BYTES] = rng.gen();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Cheap shape check run before any store lookup
pub fn is_well_formed(secret: &str) -> bool {
    secret.len() == SECRET_LEN
        && secret
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}
