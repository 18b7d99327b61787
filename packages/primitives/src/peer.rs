//! Peer identifier used by the core tracker.
//!
//! A peer id is an opaque 20-byte value chosen by the client. The tracker
//! only ever compares it for equality, except for two well-known prefixes:
//! the DNA-only admission prefix (configurable) and the load-tester magic id.
use std::panic::Location;

use serde::Serialize;
use thiserror::Error;

pub const PEER_ID_BYTES_LEN: usize = 20;

/// The `peer_id` announced by the load tester. It bypasses the minimum
/// announce interval and is accepted by NAT check responders.
pub const LOAD_TEST_ID_PREFIX: &[u8; 8] = b"MAGICMAG";

/// A peer's self-assigned 20-byte identifier.
#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug, PartialOrd, Ord)]
pub struct Id(pub [u8; 20]);

impl Id {
    /// Returns the peer id internal byte array.
    #[must_use]
    pub fn bytes(&self) -> [u8; 20] {
        self.0
    }

    #[must_use]
    pub fn starts_with(&self, prefix: &[u8]) -> bool {
        prefix.len() <= self.0.len() && &self.0[..prefix.len()] == prefix
    }

    /// `true` for the peer id announced by the load tester.
    #[must_use]
    pub fn is_load_tester(&self) -> bool {
        self.starts_with(LOAD_TEST_ID_PREFIX)
    }

    /// Converts to a hex string, e.g. `-qB00000000000000000` becomes
    /// `0x2d71423030303030303030303030303030303030`.
    #[must_use]
    pub fn to_hex_string(&self) -> String {
        let mut tmp = [0u8; 40];
        binascii::bin2hex(&self.0, &mut tmp).expect("output buffer fits two chars per byte");
        format!("0x{}", std::str::from_utf8(&tmp).expect("hex digits are valid UTF-8"))
    }
}

impl std::fmt::Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex_string())
    }
}

impl From<[u8; 20]> for Id {
    fn from(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }
}

/// Error returned when trying to convert an invalid peer id from another type.
///
/// Usually because the source does not contain exactly 20 bytes.
#[derive(Error, Debug)]
pub enum IdConversionError {
    #[error("not enough bytes for peer id: {message} {location}")]
    NotEnoughBytes {
        location: &'static Location<'static>,
        message: String,
    },
    #[error("too many bytes for peer id: {message} {location}")]
    TooManyBytes {
        location: &'static Location<'static>,
        message: String,
    },
}

impl TryFrom<Vec<u8>> for Id {
    type Error = IdConversionError;

    fn try_from(bytes: Vec<u8>) -> Result<Self, Self::Error> {
        if bytes.len() < PEER_ID_BYTES_LEN {
            return Err(IdConversionError::NotEnoughBytes {
                location: Location::caller(),
                message: format! {"got {} bytes, expected {}", bytes.len(), PEER_ID_BYTES_LEN},
            });
        }
        if bytes.len() > PEER_ID_BYTES_LEN {
            return Err(IdConversionError::TooManyBytes {
                location: Location::caller(),
                message: format! {"got {} bytes, expected {}", bytes.len(), PEER_ID_BYTES_LEN},
            });
        }
        let mut data = [0u8; 20];
        data.copy_from_slice(&bytes);
        Ok(Self(data))
    }
}

impl Serialize for Id {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex_string())
    }
}

#[cfg(test)]
mod tests {
    use super::Id;

    #[test]
    fn it_should_fail_trying_to_convert_from_a_byte_vector_with_less_than_20_bytes() {
        assert!(Id::try_from([0; 19].to_vec()).is_err());
    }

    #[test]
    fn it_should_fail_trying_to_convert_from_a_byte_vector_with_more_than_20_bytes() {
        assert!(Id::try_from([0; 21].to_vec()).is_err());
    }

    #[test]
    fn it_should_be_converted_to_hex_string() {
        let id = Id(*b"-qB00000000000000000");
        assert_eq!(id.to_hex_string(), "0x2d71423030303030303030303030303030303030");
    }

    #[test]
    fn it_should_recognize_the_load_tester_id() {
        assert!(Id(*b"MAGICMAG000000000000").is_load_tester());
        assert!(!Id(*b"-qB00000000000000000").is_load_tester());
    }

    #[test]
    fn it_should_match_prefixes_no_longer_than_itself() {
        let id = Id(*b"DNA1000-000000000000");
        assert!(id.starts_with(b"DNA"));
        assert!(!id.starts_with(b"DNB"));
        assert!(!id.starts_with(&[0u8; 21]));
    }
}
