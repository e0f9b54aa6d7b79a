//! Code for handling IDs
use anyhow::{Result, ensure};
use indexmap::IndexMap;

macro_rules! define_id_type {
    ($name:ident) => {
        #[derive(
            Clone, std::hash::Hash, PartialEq, Eq, serde::Deserialize, Debug, serde::Serialize,
        )]
        /// An ID type (e.g. `AgentID`)
        pub struct $name(pub std::rc::Rc<str>);

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name(std::rc::Rc::from(s))
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                $name(std::rc::Rc::from(s))
            }
        }
    };
}

define_id_type! {AgentID}

/// Indicates that the struct has an ID field
pub trait HasID {
    /// Get the struct's ID
    fn get_id(&self) -> &AgentID;
}

impl<T: HasID + ?Sized> HasID for Box<T> {
    fn get_id(&self) -> &AgentID {
        (**self).get_id()
    }
}

/// Insert a value into an ID-keyed map, failing if the ID is already present.
///
/// The map keeps insertion order, so iteration over it is reproducible.
pub fn try_insert_unique<V: HasID>(map: &mut IndexMap<AgentID, V>, value: V) -> Result<()> {
    let id = value.get_id().clone();
    ensure!(!map.contains_key(&id), "Duplicate agent ID found: {id}");
    map.insert(id, value);

    Ok(())
}
