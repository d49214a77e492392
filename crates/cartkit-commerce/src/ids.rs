//! Newtype IDs for platform-assigned identifiers.
//!
//! Every identifier is minted by the platform; this crate only carries them.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an identifier as the platform reported it.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id!(
    /// Platform cart identifier.
    CartId
);
define_id!(
    /// Line item identifier, unique within a cart.
    LineItemId
);
define_id!(ProductId);
define_id!(VariantId);
define_id!(
    /// Identifier of a platform discount rule.
    DiscountId
);
define_id!(
    /// Identifier of a discount code applied to a cart.
    DiscountCodeId
);
define_id!(
    /// Key of one shipping entry on a multi-shipping cart.
    ShippingEntryId
);
define_id!(CustomerId);
define_id!(StoreKey);
define_id!(BusinessUnitKey);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_from_string() {
        let id: ProductId = "prod-456".into();
        assert_eq!(id.as_str(), "prod-456");
        assert_eq!(format!("{}", id), "prod-456");
    }

    #[test]
    fn test_id_serializes_transparently() {
        let id = CartId::new("cart-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"cart-1\"");
        let back: CartId = serde_json::from_str("\"cart-1\"").unwrap();
        assert_eq!(back, id);
    }
}
