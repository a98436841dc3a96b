use blake3::Hasher;
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name([u8; 32]);

        impl $name {
            /// Content-derived id (blake3 of `data`).
            pub fn new(data: &[u8]) -> Self {
                let mut hasher = Hasher::new();
                hasher.update(stringify!($name).as_bytes());
                hasher.update(data);
                Self(hasher.finalize().into())
            }

            pub fn from_bytes(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
                let bytes = hex::decode(s)?;
                if bytes.len() != 32 {
                    return Err(hex::FromHexError::InvalidStringLength);
                }
                let mut arr = [0u8; 32];
                arr.copy_from_slice(&bytes);
                Ok(Self(arr))
            }

            /// First eight hex characters, for log fields.
            pub fn short(&self) -> String {
                hex::encode(&self.0[..4])
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({}...)", stringify!($name), self.short())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.to_hex())
            }
        }

        // Hex strings so ids can key JSON maps in state snapshots.
        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                struct IdVisitor;

                impl<'de> Visitor<'de> for IdVisitor {
                    type Value = $name;

                    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                        write!(f, "a 64-character hex string")
                    }

                    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                        $name::from_hex(v).map_err(E::custom)
                    }
                }

                deserializer.deserialize_str(IdVisitor)
            }
        }
    };
}

define_id!(
    /// Identifies a posted problem.
    ProblemId
);
define_id!(
    /// Identifies a submitted solution.
    SolutionId
);
define_id!(
    /// Identifies a user profile (creator or submitter).
    ProfileId
);
define_id!(
    /// Identifies an audit transaction.
    TransactionId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_domain_separated() {
        let p = ProblemId::new(b"same");
        let s = SolutionId::new(b"same");
        assert_ne!(p.as_bytes(), s.as_bytes());
        assert_eq!(p, ProblemId::new(b"same"));
    }

    #[test]
    fn test_id_hex_and_serde() {
        let id = ProfileId::new(b"alice");
        let back = ProfileId::from_hex(&id.to_hex()).unwrap();
        assert_eq!(id, back);

        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.to_hex()));
        let decoded: ProfileId = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, id);

        assert!(ProfileId::from_hex("abcd").is_err());
    }
}
