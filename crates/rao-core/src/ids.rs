//! Type-safe string identifiers for domain entities.
//!
//! The upstream remedial-action model identifies everything by string. These
//! newtypes keep the different identifier spaces apart at compile time, the
//! same way numeric element IDs do in graph-based network models.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Macro to implement the common identifier API for string newtypes
macro_rules! impl_string_id {
    ($type:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        pub struct $type(String);

        impl $type {
            pub fn new(id: impl Into<String>) -> Self {
                $type(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $type {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $type {
            fn from(id: &str) -> Self {
                $type::new(id)
            }
        }

        impl From<$type> for String {
            fn from(id: $type) -> Self {
                id.0
            }
        }
    };
}

impl_string_id!(RangeActionId, "Unique identifier for a range action");
impl_string_id!(CnecId, "Unique identifier for a flow CNEC");
impl_string_id!(StateId, "Unique identifier for an operating state");
impl_string_id!(
    GroupId,
    "Identifier shared by aligned range actions (one virtual coordinate per group)"
);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_id_display_and_access() {
        let id = RangeActionId::new("pst_be_1");
        assert_eq!(id.as_str(), "pst_be_1");
        assert_eq!(format!("{}", id), "pst_be_1");
    }

    #[test]
    fn test_ids_as_map_keys() {
        let mut map: HashMap<CnecId, f64> = HashMap::new();
        map.insert(CnecId::new("cnec1"), 42.0);
        assert_eq!(map.get(&CnecId::new("cnec1")), Some(&42.0));
        assert_eq!(map.get(&CnecId::new("cnec2")), None);
    }

    #[test]
    fn test_id_serde_round_trip() {
        let id = StateId::new("curative-co1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"curative-co1\"");
        let back: StateId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
