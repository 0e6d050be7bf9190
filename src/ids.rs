//! Opaque 128-bit identifiers (spec §3: "all identifiers are opaque 128-bit
//! tokens"). Each kind is a distinct newtype so a `JobId` can never be
//! mistaken for a `BatchId` at a call site.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! opaque_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

opaque_id!(JobId);
opaque_id!(BatchId);
opaque_id!(ReportId);
opaque_id!(UserId);
opaque_id!(TenantId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_round_trip_through_strings() {
        let a = JobId::new();
        let b = JobId::new();
        assert_ne!(a, b);

        let text = a.to_string();
        let parsed: JobId = text.parse().expect("valid uuid");
        assert_eq!(a, parsed);
    }
}
