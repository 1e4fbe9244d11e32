//! Fixed-size content hashes and the identifiers derived from them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::WardenError;

macro_rules! hash32 {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name([u8; 32]);

        impl $name {
            pub const ZERO: Self = Self([0u8; 32]);

            pub fn new(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            pub fn is_zero(&self) -> bool {
                self.0 == [0u8; 32]
            }

            /// Parse a 64-character hex string.
            pub fn from_hex(s: &str) -> Result<Self, WardenError> {
                let mut bytes = [0u8; 32];
                hex::decode_to_slice(s.trim(), &mut bytes).map_err(|e| {
                    WardenError::InvalidFingerprint(format!("{s:?}: {e}"))
                })?;
                Ok(Self(bytes))
            }

            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::ZERO
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({}\u{2026})", stringify!($name), hex::encode(&self.0[..4]))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", hex::encode(self.0))
            }
        }

        impl FromStr for $name {
            type Err = WardenError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_hex(s)
            }
        }
    };
}

hash32!(
    /// A 32-byte content hash identifying a proof artifact or a compliance-data value.
    Fingerprint
);

hash32!(
    /// Identifies one consensus verification request.
    RequestId
);

hash32!(
    /// Identifies one top-level orchestration workflow.
    WorkflowId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trip() {
        let fp = Fingerprint::new([0xab; 32]);
        let parsed: Fingerprint = fp.to_hex().parse().unwrap();
        assert_eq!(parsed, fp);
    }

    #[test]
    fn from_hex_rejects_wrong_length() {
        assert!(Fingerprint::from_hex("abcd").is_err());
        assert!(RequestId::from_hex(&"0".repeat(66)).is_err());
    }

    #[test]
    fn from_hex_rejects_non_hex() {
        let raw = "zz".repeat(32);
        assert!(matches!(
            Fingerprint::from_hex(&raw),
            Err(WardenError::InvalidFingerprint(_))
        ));
    }

    #[test]
    fn debug_is_abbreviated() {
        let id = WorkflowId::new([0x01; 32]);
        assert_eq!(format!("{id:?}"), "WorkflowId(01010101\u{2026})");
    }

    #[test]
    fn zero_detection() {
        assert!(Fingerprint::ZERO.is_zero());
        assert!(!Fingerprint::new([1; 32]).is_zero());
    }
}
