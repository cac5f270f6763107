//! Graph merge engine - idempotent node and relationship upserts
//!
//! A merge is keyed by the node's natural key: the first merge creates the
//! node, every later merge with the same key unions new properties onto it
//! (new values win, nothing is removed). Relationships are unique per
//! (source, type, target) and never create their endpoints.

mod memory;
mod neo4j;

pub use memory::MemoryGraph;
pub use neo4j::Neo4jStore;

use crate::sanitize::Value;
use crate::schema::{Label, RelType};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Property name → value. Absent values are never stored.
pub type PropertyMap = BTreeMap<String, Value>;

/// A node addressed by its natural key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRef {
    pub label: Label,
    pub key: PropertyMap,
}

impl NodeRef {
    pub fn new(label: Label) -> Self {
        Self {
            label,
            key: PropertyMap::new(),
        }
    }

    /// Add a key attribute.
    pub fn key(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.key.insert(name.to_string(), value.into());
        self
    }

    /// Build a reference only when every key attribute is present.
    pub fn complete(label: Label, parts: &[(&str, Option<&Value>)]) -> Option<Self> {
        let mut node = Self::new(label);
        for (name, value) in parts {
            node.key.insert(name.to_string(), (*value)?.clone());
        }
        Some(node)
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} {})", self.label, describe(&self.key))
    }
}

/// Render a property map as `{cod: 5, nome: "Centro"}`.
pub fn describe(map: &PropertyMap) -> String {
    let parts: Vec<String> = map
        .iter()
        .map(|(k, v)| match v {
            Value::Text(s) => format!("{}: {:?}", k, s),
            other => format!("{}: {}", k, other),
        })
        .collect();
    format!("{{{}}}", parts.join(", "))
}

/// Create-if-absent, then union properties onto the node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeMerge {
    pub node: NodeRef,
    pub properties: PropertyMap,
}

impl NodeMerge {
    pub fn new(node: NodeRef) -> Self {
        Self {
            node,
            properties: PropertyMap::new(),
        }
    }

    /// Set a property; `None` leaves it out of the write.
    pub fn prop(mut self, name: &str, value: Option<Value>) -> Self {
        if let Some(v) = value {
            self.properties.insert(name.to_string(), v);
        }
        self
    }

    /// Everything written onto the node: properties plus the key itself,
    /// so the key is always introspectable on the node.
    pub fn written_properties(&self) -> PropertyMap {
        let mut all = self.properties.clone();
        all.extend(self.node.key.iter().map(|(k, v)| (k.clone(), v.clone())));
        all
    }

    pub fn validate(&self) -> Result<(), MergeError> {
        if self.node.key.is_empty() {
            return Err(MergeError::EmptyKey {
                label: self.node.label,
            });
        }
        Ok(())
    }
}

/// Create-if-absent, then union properties onto the edge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipMerge {
    pub source: NodeRef,
    pub rel_type: RelType,
    pub target: NodeRef,
    pub properties: PropertyMap,
}

impl RelationshipMerge {
    pub fn new(source: NodeRef, rel_type: RelType, target: NodeRef) -> Self {
        Self {
            source,
            rel_type,
            target,
            properties: PropertyMap::new(),
        }
    }

    pub fn prop(mut self, name: &str, value: Option<Value>) -> Self {
        if let Some(v) = value {
            self.properties.insert(name.to_string(), v);
        }
        self
    }

    pub fn validate(&self) -> Result<(), MergeError> {
        for node in [&self.source, &self.target] {
            if node.key.is_empty() {
                return Err(MergeError::EmptyKey { label: node.label });
            }
        }
        Ok(())
    }
}

/// One graph mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOp {
    Node(NodeMerge),
    Relationship(RelationshipMerge),
}

/// Which end of a relationship failed to resolve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Source,
    Target,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Source => f.write_str("source"),
            Endpoint::Target => f.write_str("target"),
        }
    }
}

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("empty natural key for label {label}")]
    EmptyKey { label: Label },

    #[error("{rel_type}: {endpoint} {node} not found")]
    EndpointNotFound {
        rel_type: RelType,
        endpoint: Endpoint,
        node: NodeRef,
    },

    #[error("{rel_type}: {endpoint} {node} matched {count} nodes")]
    AmbiguousEndpoint {
        rel_type: RelType,
        endpoint: Endpoint,
        node: NodeRef,
        count: usize,
    },

    #[error("graph store error: {0}")]
    Store(#[from] neo4rs::Error),

    #[error("unexpected store response: {0}")]
    Protocol(String),
}

impl MergeError {
    /// Failures a later re-run can converge past. The rest abort the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            MergeError::EndpointNotFound { .. } | MergeError::AmbiguousEndpoint { .. }
        )
    }

    /// Classify an endpoint match count.
    pub(crate) fn check_endpoint(
        rel_type: RelType,
        endpoint: Endpoint,
        node: &NodeRef,
        count: usize,
    ) -> Result<(), MergeError> {
        match count {
            1 => Ok(()),
            0 => Err(MergeError::EndpointNotFound {
                rel_type,
                endpoint,
                node: node.clone(),
            }),
            n => Err(MergeError::AmbiguousEndpoint {
                rel_type,
                endpoint,
                node: node.clone(),
                count: n,
            }),
        }
    }
}

/// The store seam. Every call is one independent write that completes
/// before the caller issues the next.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn merge_node(&self, merge: &NodeMerge) -> Result<(), MergeError>;

    async fn merge_relationship(&self, merge: &RelationshipMerge) -> Result<(), MergeError>;

    async fn apply(&self, op: &MergeOp) -> Result<(), MergeError> {
        match op {
            MergeOp::Node(m) => self.merge_node(m).await,
            MergeOp::Relationship(m) => self.merge_relationship(m).await,
        }
    }
}
