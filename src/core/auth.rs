//! Announce authorization via the shared secret token.
//!
//! A client proves it obtained the torrent from an authorized source by
//! sending `auth = hex(SHA1(info_hash || tid || secret))`. The secret is a
//! runtime control variable, so it can be rotated without a restart.
use helix_tracker_primitives::info_hash::InfoHash;
use sha1::{Digest, Sha1};

/// Computes the expected token for an announce.
#[must_use]
pub fn expected_token(info_hash: &InfoHash, tid: &[u8], secret: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(info_hash.bytes());
    hasher.update(tid);
    hasher.update(secret.as_bytes());
    let digest = hasher.finalize();

    let mut token = String::with_capacity(digest.len() * 2);
    for byte in digest {
        token.push_str(&format!("{byte:02x}"));
    }
    token
}

/// `true` when the client supplied the right token.
#[must_use]
pub fn verify_token(info_hash: &InfoHash, tid: &[u8], secret: &str, token: &str) -> bool {
    expected_token(info_hash, tid, secret) == token
}

#[cfg(test)]
mod tests {
    use helix_tracker_primitives::info_hash::InfoHash;

    use super::{expected_token, verify_token};

    #[test]
    fn the_token_is_the_lowercase_hex_sha1_of_hash_tid_and_secret() {
        let info_hash = InfoHash([0x61; 20]);

        let token = expected_token(&info_hash, &info_hash.bytes(), "sekret");

        assert_eq!(token.len(), 40);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert!(verify_token(&info_hash, &info_hash.bytes(), "sekret", &token));
    }

    #[test]
    fn a_wrong_secret_or_tid_fails_verification() {
        let info_hash = InfoHash([0x61; 20]);
        let token = expected_token(&info_hash, &info_hash.bytes(), "sekret");

        assert!(!verify_token(&info_hash, &info_hash.bytes(), "other", &token));
        assert!(!verify_token(&info_hash, b"different-tid-value!", "sekret", &token));
    }
}
