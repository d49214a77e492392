//! Address types.
//!
//! Field mapping to and from the platform's contact model lives in the
//! transport; the cart layer only needs addresses to be keyed and comparable.

use serde::{Deserialize, Serialize};

/// A postal address attached to a cart.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Address {
    /// Address key, required for item shipping addresses.
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    /// Country code (e.g., "US").
    pub country: String,
}

impl Address {
    /// Create an address with only a country set.
    pub fn new(country: impl Into<String>) -> Self {
        Self {
            country: country.into(),
            ..Self::default()
        }
    }

    /// Set the address key.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}
