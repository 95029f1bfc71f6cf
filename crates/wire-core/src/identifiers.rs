//! 128-bit call and conference identifiers
//!
//! Both identifiers travel over the wire verbatim and must survive an
//! encode/decode cycle byte-for-byte.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, WireError};

macro_rules! guid_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
        pub struct $name(pub [u8; 16]);

        impl $name {
            /// Generate a fresh random identifier
            pub fn generate() -> Self {
                Self(*Uuid::new_v4().as_bytes())
            }

            /// Identifier from exactly 16 octets
            pub fn from_slice(data: &[u8]) -> Result<Self> {
                let octets: [u8; 16] = data.try_into().map_err(|_| {
                    WireError::decode(format!(
                        "{} must be 16 octets, got {}",
                        stringify!($name),
                        data.len()
                    ))
                })?;
                Ok(Self(octets))
            }

            pub(crate) fn from_field(value: &Bytes) -> Result<Self> {
                Self::from_slice(value.as_ref())
            }

            pub fn as_bytes(&self) -> &[u8; 16] {
                &self.0
            }

            pub fn is_nil(&self) -> bool {
                self.0.iter().all(|b| *b == 0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                for b in &self.0 {
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
        }
    };
}

guid_type!(
    /// Globally unique identifier of one call
    CallIdentifier
);

guid_type!(
    /// Identifier of the conference a call belongs to
    ConferenceIdentifier
);
