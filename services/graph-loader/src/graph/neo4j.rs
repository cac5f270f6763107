//! Neo4j store over Bolt
//!
//! Labels, relationship types and property names cannot be query
//! parameters, so they are spliced into the Cypher text. They only ever come
//! from the closed `Label`/`RelType` enums and the static property names in
//! `schema`; values always travel as parameters.

use super::{Endpoint, GraphStore, MergeError, NodeMerge, NodeRef, PropertyMap, RelationshipMerge};
use crate::config::StoreConfig;
use crate::sanitize::Value;
use crate::schema::Label;
use async_trait::async_trait;
use neo4rs::{query, BoltMap, BoltString, BoltType, ConfigBuilder, Graph};
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct Neo4jStore {
    graph: Graph,
}

impl Neo4jStore {
    /// Connect with the configured endpoint and credentials.
    pub async fn connect(config: &StoreConfig) -> Result<Self, neo4rs::Error> {
        let neo4j_config = ConfigBuilder::default()
            .uri(config.uri.as_str())
            .user(config.user.as_str())
            .password(config.password.as_str())
            .fetch_size(500)
            .max_connections(1)
            .build()?;
        let graph = Graph::connect(neo4j_config).await?;
        info!(uri = %config.uri, "connected to neo4j");
        Ok(Self { graph })
    }

    /// One uniqueness constraint per label over its natural key. Idempotent.
    pub async fn ensure_constraints(&self) -> Result<(), neo4rs::Error> {
        for label in Label::ALL {
            let cypher = constraint_cypher(label);
            match self.graph.run(query(&cypher)).await {
                Ok(()) => debug!(label = %label, "uniqueness constraint ensured"),
                Err(e) => {
                    // An equivalent constraint under another name is fine
                    let msg = e.to_string().to_lowercase();
                    if msg.contains("already exists") || msg.contains("equivalent") {
                        warn!(label = %label, "constraint already present (skipped)");
                    } else {
                        return Err(e);
                    }
                }
            }
        }
        info!(labels = Label::ALL.len(), "uniqueness constraints in place");
        Ok(())
    }
}

#[async_trait]
impl GraphStore for Neo4jStore {
    async fn merge_node(&self, merge: &NodeMerge) -> Result<(), MergeError> {
        merge.validate()?;

        let q = query(&node_merge_cypher(&merge.node))
            .param("key", to_bolt(&merge.node.key))
            .param("props", to_bolt(&merge.written_properties()));
        self.graph.run(q).await?;
        Ok(())
    }

    async fn merge_relationship(&self, merge: &RelationshipMerge) -> Result<(), MergeError> {
        merge.validate()?;

        // Step 1: both endpoints must resolve to exactly one node
        let q = query(&endpoint_count_cypher(&merge.source, &merge.target))
            .param("source", to_bolt(&merge.source.key))
            .param("target", to_bolt(&merge.target.key));
        let mut stream = self.graph.execute(q).await?;
        let row = stream
            .next()
            .await?
            .ok_or_else(|| MergeError::Protocol("endpoint count returned no row".to_string()))?;
        let sources = read_count(&row, "sources")?;
        let targets = read_count(&row, "targets")?;
        MergeError::check_endpoint(merge.rel_type, Endpoint::Source, &merge.source, sources)?;
        MergeError::check_endpoint(merge.rel_type, Endpoint::Target, &merge.target, targets)?;

        // Step 2: merge the edge between them
        let q = query(&relationship_merge_cypher(merge))
            .param("source", to_bolt(&merge.source.key))
            .param("target", to_bolt(&merge.target.key))
            .param("props", to_bolt(&merge.properties));
        self.graph.run(q).await?;
        Ok(())
    }
}

fn read_count(row: &neo4rs::Row, column: &str) -> Result<usize, MergeError> {
    let count = row
        .get::<i64>(column)
        .map_err(|e| MergeError::Protocol(format!("{}: {}", column, e)))?;
    usize::try_from(count).map_err(|_| MergeError::Protocol(format!("{}: negative count", column)))
}

fn to_bolt(map: &PropertyMap) -> BoltType {
    BoltType::Map(BoltMap::from_iter(map.iter().map(|(k, v)| {
        let value: BoltType = match v {
            Value::Int(i) => (*i).into(),
            Value::Float(f) => (*f).into(),
            Value::Text(s) => s.clone().into(),
        };
        (BoltString::from(k.as_str()), value)
    })))
}

// =============================================================================
// CYPHER
// =============================================================================

/// `cod: $key.cod, nome: $key.nome`
fn key_pattern(node: &NodeRef, param: &str) -> String {
    node.key
        .keys()
        .map(|k| format!("{}: ${}.{}", k, param, k))
        .collect::<Vec<_>>()
        .join(", ")
}

fn node_merge_cypher(node: &NodeRef) -> String {
    format!(
        "MERGE (n:{} {{{}}}) SET n += $props",
        node.label,
        key_pattern(node, "key")
    )
}

fn endpoint_count_cypher(source: &NodeRef, target: &NodeRef) -> String {
    format!(
        "OPTIONAL MATCH (a:{} {{{}}}) \
         WITH count(a) AS sources \
         OPTIONAL MATCH (b:{} {{{}}}) \
         RETURN sources, count(b) AS targets",
        source.label,
        key_pattern(source, "source"),
        target.label,
        key_pattern(target, "target"),
    )
}

fn relationship_merge_cypher(merge: &RelationshipMerge) -> String {
    format!(
        "MATCH (a:{} {{{}}}), (b:{} {{{}}}) \
         MERGE (a)-[r:{}]->(b) \
         SET r += $props",
        merge.source.label,
        key_pattern(&merge.source, "source"),
        merge.target.label,
        key_pattern(&merge.target, "target"),
        merge.rel_type,
    )
}

fn constraint_cypher(label: Label) -> String {
    let props: Vec<String> = label
        .key_properties()
        .iter()
        .map(|p| format!("n.{}", p))
        .collect();
    let target = if props.len() == 1 {
        props[0].clone()
    } else {
        format!("({})", props.join(", "))
    };
    format!(
        "CREATE CONSTRAINT {}_key IF NOT EXISTS FOR (n:{}) REQUIRE {} IS UNIQUE",
        label.as_str().to_lowercase(),
        label,
        target
    )
}
