//! [`NamespaceMap`] tracks the namespace URI to namespace index mapping the client observes
//! from a server's namespace array, so node IDs read off the wire can be resolved consistently.

use hashbrown::HashMap;

use crate::{errors::OpcUaError, ExpandedNodeId, NodeId, Variant};

/// Utility for handling assignment of namespaces on server startup.
#[derive(Debug, Default, Clone)]
pub struct NamespaceMap {
    known_namespaces: HashMap<String, u16>,
}

impl NamespaceMap {
    /// Create a new namespace map containing only the base namespace.
    pub fn new() -> Self {
        let mut known_namespaces = HashMap::new();
        known_namespaces.insert("http://opcfoundation.org/UA/".to_owned(), 0u16);

        Self { known_namespaces }
    }

    /// Create a new namespace map from the given list of namespaces.
    pub fn new_full(map: HashMap<String, u16>) -> Self {
        Self {
            known_namespaces: map,
        }
    }

    /// Create a new namespace map from a vec of variant as we get when reading
    /// the namespace array from the server
    pub fn new_from_variant_array(array: &[Variant]) -> Result<Self, OpcUaError> {
        let known_namespaces: HashMap<String, u16> = array
            .iter()
            .enumerate()
            .map(|(idx, v)| {
                if let Variant::String(s) = v {
                    Ok((s.value().clone().unwrap_or(String::new()), idx as u16))
                } else {
                    Err(OpcUaError::UnexpectedVariantType {
                        variant_id: v.scalar_type_id(),
                        message: "Namespace array on server contains invalid data".to_string(),
                    })
                }
            })
            .collect::<Result<HashMap<_, _>, _>>()?;
        Ok(Self { known_namespaces })
    }

    /// Add a new namespace, returning its index in the namespace map.
    /// If the namespace is already added, its old index is returned.
    pub fn add_namespace(&mut self, namespace: &str) -> u16 {
        if let Some(ns) = self.known_namespaces.get(namespace) {
            return *ns;
        }
        let max = self
            .known_namespaces
            .iter()
            .map(|kv| *kv.1)
            .max()
            .unwrap_or_default();
        self.known_namespaces.insert(namespace.to_owned(), max + 1);

        max + 1
    }

    /// Return the inner namespace map.
    pub fn known_namespaces(&self) -> &HashMap<String, u16> {
        &self.known_namespaces
    }

    /// Get the index of the given namespace.
    pub fn get_index(&self, ns: &str) -> Option<u16> {
        self.known_namespaces.get(ns).copied()
    }

    /// Try to resolve an expanded node ID to a NodeId.
    pub fn resolve_node_id<'b>(
        &self,
        id: &'b ExpandedNodeId,
    ) -> Option<std::borrow::Cow<'b, NodeId>> {
        id.try_resolve(self)
    }
}

