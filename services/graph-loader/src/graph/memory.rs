//! In-memory graph store, used by `--dry-run` and by tests

use super::{Endpoint, GraphStore, MergeError, NodeMerge, NodeRef, PropertyMap, RelationshipMerge};
use crate::schema::{Label, RelType};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

/// Nodes are unique per (label, key) and edges per (source, type, target)
/// by construction, so lookups always resolve to at most one entry.
#[derive(Debug, Default)]
pub struct MemoryGraph {
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    nodes: Vec<(Label, PropertyMap)>,
    index: BTreeMap<(Label, PropertyMap), usize>,
    edges: BTreeMap<(usize, RelType, usize), PropertyMap>,
}

impl State {
    fn lookup(&self, node: &NodeRef) -> Option<usize> {
        self.index.get(&(node.label, node.key.clone())).copied()
    }

    fn resolve(&self, rel_type: RelType, endpoint: Endpoint, node: &NodeRef) -> Result<usize, MergeError> {
        self.lookup(node).ok_or_else(|| MergeError::EndpointNotFound {
            rel_type,
            endpoint,
            node: node.clone(),
        })
    }
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn node_count(&self) -> usize {
        self.state().nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.state().edges.len()
    }

    /// Node counts per label.
    pub fn label_counts(&self) -> BTreeMap<Label, usize> {
        let mut counts = BTreeMap::new();
        for (label, _) in &self.state().nodes {
            *counts.entry(*label).or_insert(0) += 1;
        }
        counts
    }

    /// Edge counts per relationship type.
    pub fn rel_counts(&self) -> BTreeMap<RelType, usize> {
        let mut counts = BTreeMap::new();
        for (_, rel_type, _) in self.state().edges.keys() {
            *counts.entry(*rel_type).or_insert(0) += 1;
        }
        counts
    }

    /// Stored properties of the node with this key.
    #[cfg(test)]
    pub fn node(&self, node: &NodeRef) -> Option<PropertyMap> {
        let state = self.state();
        state.lookup(node).map(|id| state.nodes[id].1.clone())
    }

    /// Stored properties of the edge, if it exists.
    #[cfg(test)]
    pub fn edge(&self, source: &NodeRef, rel_type: RelType, target: &NodeRef) -> Option<PropertyMap> {
        let state = self.state();
        let from = state.lookup(source)?;
        let to = state.lookup(target)?;
        state.edges.get(&(from, rel_type, to)).cloned()
    }
}

#[async_trait]
impl GraphStore for MemoryGraph {
    async fn merge_node(&self, merge: &NodeMerge) -> Result<(), MergeError> {
        merge.validate()?;
        let mut state = self.state();

        let id = match state.lookup(&merge.node) {
            Some(id) => id,
            None => {
                let id = state.nodes.len();
                state.nodes.push((merge.node.label, PropertyMap::new()));
                state.index.insert((merge.node.label, merge.node.key.clone()), id);
                id
            }
        };

        state.nodes[id].1.extend(merge.written_properties());
        Ok(())
    }

    async fn merge_relationship(&self, merge: &RelationshipMerge) -> Result<(), MergeError> {
        merge.validate()?;
        let mut state = self.state();

        let from = state.resolve(merge.rel_type, Endpoint::Source, &merge.source)?;
        let to = state.resolve(merge.rel_type, Endpoint::Target, &merge.target)?;

        state
            .edges
            .entry((from, merge.rel_type, to))
            .or_default()
            .extend(merge.properties.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sanitize::Value;

    fn municipio(code: i64) -> NodeRef {
        NodeRef::new(Label::Municipio).key("cod", code)
    }

    fn bairro(code: i64, name: &str) -> NodeRef {
        NodeRef::new(Label::Bairro).key("municipio_cod", code).key("nome", name)
    }

    #[tokio::test]
    async fn test_merge_node_is_idempotent() {
        let graph = MemoryGraph::new();
        let merge = NodeMerge::new(municipio(5)).prop("nome", Some(Value::from("Springfield")));

        graph.merge_node(&merge).await.unwrap();
        graph.merge_node(&merge).await.unwrap();

        assert_eq!(graph.node_count(), 1);
        let props = graph.node(&municipio(5)).unwrap();
        assert_eq!(props.get("cod"), Some(&Value::Int(5)));
        assert_eq!(props.get("nome"), Some(&Value::from("Springfield")));
    }

    #[tokio::test]
    async fn test_remerge_unions_properties() {
        let graph = MemoryGraph::new();
        let node = NodeRef::new(Label::Tempo).key("ano", 2024i64).key("mes_num", 3i64);

        graph
            .merge_node(&NodeMerge::new(node.clone()).prop("mes_desc", Some(Value::from("MARÇO"))))
            .await
            .unwrap();
        graph
            .merge_node(&NodeMerge::new(node.clone()).prop("dia_semana", Some(Value::from("SEGUNDA"))))
            .await
            .unwrap();
        graph
            .merge_node(&NodeMerge::new(node.clone()).prop("dia_semana", Some(Value::from("TERÇA"))))
            .await
            .unwrap();

        let props = graph.node(&node).unwrap();
        assert_eq!(props.get("mes_desc"), Some(&Value::from("MARÇO")));
        assert_eq!(props.get("dia_semana"), Some(&Value::from("TERÇA")));
        assert_eq!(graph.node_count(), 1);
    }

    #[tokio::test]
    async fn test_same_key_different_label_is_distinct() {
        let graph = MemoryGraph::new();
        let setor = NodeRef::new(Label::Setor).key("nome", "A");
        let subsetor = NodeRef::new(Label::SubSetor).key("nome", "A");
        graph.merge_node(&NodeMerge::new(setor)).await.unwrap();
        graph.merge_node(&NodeMerge::new(subsetor)).await.unwrap();
        assert_eq!(graph.node_count(), 2);
    }

    #[tokio::test]
    async fn test_relationship_is_unique_per_triple() {
        let graph = MemoryGraph::new();
        graph.merge_node(&NodeMerge::new(municipio(5))).await.unwrap();
        graph.merge_node(&NodeMerge::new(bairro(5, "Centro"))).await.unwrap();

        let rel = RelationshipMerge::new(bairro(5, "Centro"), RelType::FicaEm, municipio(5));
        graph.merge_relationship(&rel).await.unwrap();
        graph
            .merge_relationship(&rel.clone().prop("peso", Some(Value::Int(2))))
            .await
            .unwrap();

        assert_eq!(graph.edge_count(), 1);
        let props = graph.edge(&bairro(5, "Centro"), RelType::FicaEm, &municipio(5)).unwrap();
        assert_eq!(props.get("peso"), Some(&Value::Int(2)));
    }

    #[tokio::test]
    async fn test_relationship_to_missing_target_is_reported() {
        let graph = MemoryGraph::new();
        graph.merge_node(&NodeMerge::new(bairro(5, "Centro"))).await.unwrap();

        let rel = RelationshipMerge::new(bairro(5, "Centro"), RelType::FicaEm, municipio(5));
        let err = graph.merge_relationship(&rel).await.unwrap_err();

        assert!(matches!(
            err,
            MergeError::EndpointNotFound {
                endpoint: Endpoint::Target,
                rel_type: RelType::FicaEm,
                ..
            }
        ));
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(graph.node_count(), 1, "no endpoint is created implicitly");
    }

    #[tokio::test]
    async fn test_empty_key_rejected_by_store() {
        let graph = MemoryGraph::new();
        let err = graph.merge_node(&NodeMerge::new(NodeRef::new(Label::Meio))).await.unwrap_err();
        assert!(matches!(err, MergeError::EmptyKey { .. }));
        assert_eq!(graph.node_count(), 0);
    }
}
