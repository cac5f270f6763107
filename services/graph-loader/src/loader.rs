//! Batch loader - drives dimensions and fact rows through a `GraphStore`
//!
//! Order is fixed: every dimension (parents before children), then the fact
//! sheet in contiguous batches. Mapping a record or a row to merge
//! operations is pure; only `BatchLoader` talks to the store.

use crate::dimensions::{extract_dimension, Dimension, DimensionRecord, DimensionTable};
use crate::export::write_dimension_csv;
use crate::graph::{GraphStore, MergeError, MergeOp, NodeMerge, NodeRef, RelationshipMerge};
use crate::sanitize::{normalize_text, to_code, to_decimal, to_integer, Value};
use crate::schema::{col, prop, Label, RelType, DEFAULT_BATCH_SIZE};
use crate::table::{Row, Table};
use crate::workbook::{Workbook, WorkbookError};
use anyhow::{Context, Result};
use serde::Serialize;
use std::ops::Range;
use std::path::PathBuf;
use tracing::{info, warn};

/// Counters for one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub dimension_records: usize,
    pub nodes_merged: usize,
    pub relationships_merged: usize,
    pub rows_loaded: usize,
    pub rows_skipped: usize,
    pub failed_merges: usize,
}

impl LoadReport {
    pub fn log_summary(&self) {
        info!(
            dimension_records = self.dimension_records,
            nodes_merged = self.nodes_merged,
            relationships_merged = self.relationships_merged,
            rows_loaded = self.rows_loaded,
            rows_skipped = self.rows_skipped,
            failed_merges = self.failed_merges,
            "load finished"
        );
    }
}

// =============================================================================
// DIMENSION RECORDS
// =============================================================================

fn node(label: Label, key: &[(&str, Option<&Value>)]) -> Option<NodeRef> {
    NodeRef::complete(label, key)
}

fn owned(value: Option<&Value>) -> Option<Value> {
    value.cloned()
}

/// Merge operations for one dimension record: its node(s), then the
/// hierarchy edge to the parent when both ends are keyed.
pub fn dimension_record_ops(dimension: Dimension, record: &DimensionRecord) -> Vec<MergeOp> {
    let mut ops = Vec::new();
    let get = |c: &str| record.get(c);

    match dimension {
        Dimension::Municipio => {
            if let Some(n) = node(Label::Municipio, &[(prop::COD, get(col::CODIGO_MUNICIPIO))]) {
                ops.push(MergeOp::Node(NodeMerge::new(n).prop(prop::NOME, owned(get(col::MUNICIPIO)))));
            }
        }
        Dimension::Bairro => {
            let code = get(col::MUNICIPIO_COD);
            if let Some(bairro) = node(Label::Bairro, &[(prop::MUNICIPIO_COD, code), (prop::NOME, get(col::BAIRRO))]) {
                ops.push(MergeOp::Node(NodeMerge::new(bairro.clone())));
                if let Some(municipio) = node(Label::Municipio, &[(prop::COD, code)]) {
                    ops.push(MergeOp::Relationship(RelationshipMerge::new(bairro, RelType::FicaEm, municipio)));
                }
            }
        }
        Dimension::NaturezaPrincipal => {
            if let Some(n) = node(Label::NaturezaPrincipal, &[(prop::CODIGO, get(col::CODIGO_NATUREZA_PRINCIPAL))]) {
                ops.push(MergeOp::Node(
                    NodeMerge::new(n).prop(prop::DESCRICAO, owned(get(col::DESCR_NATUREZA_PRINCIPAL))),
                ));
            }
        }
        Dimension::NaturezaSecundaria => {
            if let Some(n) = node(Label::NaturezaSecundaria, &[(prop::CODIGO, get(col::CODIGO_NATUREZA_SECUNDARIA))]) {
                ops.push(MergeOp::Node(
                    NodeMerge::new(n).prop(prop::DESCRICAO, owned(get(col::DESCR_NATUREZA_SECUNDARIA))),
                ));
            }
        }
        Dimension::Unidade => {
            let n5 = node(Label::UnidadeN5, &[(prop::NOME, get(col::UNID_AREA_NIVEL_5))]);
            let n6 = node(Label::UnidadeN6, &[(prop::CODIGO, get(col::CODIGO_UNID_AREA_NIVEL_6))]);
            if let Some(n5) = &n5 {
                ops.push(MergeOp::Node(NodeMerge::new(n5.clone())));
            }
            if let Some(n6) = &n6 {
                ops.push(MergeOp::Node(
                    NodeMerge::new(n6.clone()).prop(prop::NOME, owned(get(col::UNID_AREA_NIVEL_6))),
                ));
            }
            if let (Some(n6), Some(n5)) = (n6, n5) {
                ops.push(MergeOp::Relationship(RelationshipMerge::new(n6, RelType::PertenceA, n5)));
            }
        }
        Dimension::Setor => {
            if let Some(n) = node(Label::Setor, &[(prop::NOME, get(col::SETOR))]) {
                ops.push(MergeOp::Node(NodeMerge::new(n)));
            }
        }
        Dimension::Subsetor => {
            if let Some(sub) = node(Label::SubSetor, &[(prop::NOME, get(col::SUB_SETOR))]) {
                ops.push(MergeOp::Node(NodeMerge::new(sub.clone())));
                if let Some(setor) = node(Label::Setor, &[(prop::NOME, get(col::SETOR))]) {
                    ops.push(MergeOp::Relationship(RelationshipMerge::new(sub, RelType::PertenceA, setor)));
                }
            }
        }
        Dimension::Causa => {
            if let Some(n) = node(Label::Causa, &[(prop::CODIGO, get(col::CODIGO_CAUSA_PRESUMIDA))]) {
                ops.push(MergeOp::Node(NodeMerge::new(n).prop(prop::DESCRICAO, owned(get(col::CAUSA_PRESUMIDA)))));
            }
        }
        Dimension::Tempo => {
            if let Some(n) = node(Label::Tempo, &[(prop::ANO, get(col::ANO)), (prop::MES_NUM, get(col::MES_NUMERICO))]) {
                ops.push(MergeOp::Node(
                    NodeMerge::new(n)
                        .prop(prop::MES_DESC, owned(get(col::MES_DESCRICAO)))
                        .prop(prop::DIA_SEMANA_NUM, owned(get(col::DIA_DA_SEMANA_NUMERICO)))
                        .prop(prop::DIA_SEMANA, owned(get(col::DIA_DA_SEMANA_FATO)))
                        .prop(prop::FAIXA_H1, owned(get(col::FAIXA_HORA_1)))
                        .prop(prop::FAIXA_H6, owned(get(col::FAIXA_HORA_6))),
                ));
            }
        }
        Dimension::Meio => {
            if let Some(n) = node(Label::Meio, &[(prop::DESCRICAO, get(col::DESCRICAO_MEIO_UTILIZADO))]) {
                ops.push(MergeOp::Node(NodeMerge::new(n)));
            }
        }
    }

    ops
}

// =============================================================================
// FACT ROWS
// =============================================================================

/// Fact-sheet column positions, resolved once per sheet
#[derive(Debug, Clone)]
pub struct FactColumns {
    numero_reds: usize,
    data: Option<usize>,
    hora: Option<usize>,
    lat: Option<usize>,
    lon: Option<usize>,
    prisao: Option<usize>,
    imv: Option<usize>,
    icvpe: Option<usize>,
    icvpa: Option<usize>,
    municipio_cod: Option<usize>,
    bairro: Option<usize>,
    unidade_n5: Option<usize>,
    unidade_n6: Option<usize>,
    setor: Option<usize>,
    subsetor: Option<usize>,
    natureza_principal: Option<usize>,
    tentcons_principal: Option<usize>,
    /// (code, attempted/completed) per secondary slot
    natureza_secundaria: [(Option<usize>, Option<usize>); 2],
    ano: Option<usize>,
    mes: Option<usize>,
    causa: Option<usize>,
    meio: Option<usize>,
}

impl FactColumns {
    /// Fails only when the identifier column is missing; every other
    /// column is optional and its edge or property is simply never written.
    pub fn resolve(facts: &Table) -> Result<Self, WorkbookError> {
        let numero_reds = facts
            .column_index(col::NUMERO_REDS)
            .ok_or_else(|| WorkbookError::MissingColumn {
                sheet: facts.name().to_string(),
                column: col::NUMERO_REDS.to_string(),
            })?;
        let find = |name: &str| facts.column_index(name);

        Ok(Self {
            numero_reds,
            data: find(col::DATA_FATO),
            hora: find(col::HORARIO_FATO),
            lat: find(col::LATITUDE),
            lon: find(col::LONGITUDE),
            prisao: find(col::QTDE_PRISAO),
            imv: find(col::IMV_TOTAL),
            icvpe: find(col::ICVPE_TOTAL),
            icvpa: find(col::ICVPA_TOTAL),
            municipio_cod: find(col::CODIGO_MUNICIPIO),
            bairro: find(col::BAIRRO),
            unidade_n5: find(col::UNID_AREA_NIVEL_5),
            unidade_n6: find(col::CODIGO_UNID_AREA_NIVEL_6),
            setor: find(col::SETOR),
            subsetor: find(col::SUB_SETOR),
            natureza_principal: find(col::CODIGO_NATUREZA_PRINCIPAL),
            tentcons_principal: find(col::TENTADO_CONSUMADO_PRINCIPAL),
            natureza_secundaria: [
                (find(col::CODIGO_NATUREZA_SECUNDARIA1), find(col::TENTADO_CONSUMADO_SECUNDARIA1)),
                (find(col::CODIGO_NATUREZA_SECUNDARIA2), find(col::TENTADO_CONSUMADO_SECUNDARIA2)),
            ],
            ano: find(col::ANO_FATO),
            mes: find(col::MES_NUMERICO),
            causa: find(col::CODIGO_CAUSA_PRESUMIDA),
            meio: find(col::DESCRICAO_MEIO_UTILIZADO),
        })
    }
}

/// Merge operations for one fact row: the `Ocorrencia` node first, then one
/// edge per dimension whose key is complete on the row. `None` when the row
/// has no identifier.
pub fn fact_row_ops(columns: &FactColumns, row: Row<'_>) -> Option<Vec<MergeOp>> {
    let text = |i: Option<usize>| normalize_text(row.cell(i)).map(Value::Text);
    let code = |i: Option<usize>| to_code(row.cell(i));
    let int = |i: Option<usize>| to_integer(row.cell(i)).map(Value::Int);
    let decimal = |i: Option<usize>| to_decimal(row.cell(i)).map(Value::Float);

    let id = normalize_text(row.cell(Some(columns.numero_reds)))?;
    let ocorrencia = NodeRef::new(Label::Ocorrencia).key(prop::ID, id);

    let mut ops = vec![MergeOp::Node(
        NodeMerge::new(ocorrencia.clone())
            .prop(prop::DATA, text(columns.data))
            .prop(prop::HORA, text(columns.hora))
            .prop(prop::LAT, decimal(columns.lat))
            .prop(prop::LON, decimal(columns.lon))
            .prop(prop::PRISAO, int(columns.prisao))
            .prop(prop::IMV, int(columns.imv))
            .prop(prop::ICVPE, int(columns.icvpe))
            .prop(prop::ICVPA, int(columns.icvpa)),
    )];

    let mut edge = |rel_type: RelType, target: Option<NodeRef>, tentcons: Option<Value>| {
        if let Some(target) = target {
            let merge = RelationshipMerge::new(ocorrencia.clone(), rel_type, target).prop(prop::TENTCONS, tentcons);
            ops.push(MergeOp::Relationship(merge));
        }
    };

    let municipio_cod = code(columns.municipio_cod);
    let bairro = text(columns.bairro);
    edge(
        RelType::OcorreEm,
        node(Label::Bairro, &[(prop::MUNICIPIO_COD, municipio_cod.as_ref()), (prop::NOME, bairro.as_ref())]),
        None,
    );

    let n5 = text(columns.unidade_n5);
    edge(RelType::AreaN5, node(Label::UnidadeN5, &[(prop::NOME, n5.as_ref())]), None);
    let n6 = code(columns.unidade_n6);
    edge(RelType::AreaN6, node(Label::UnidadeN6, &[(prop::CODIGO, n6.as_ref())]), None);

    let setor = text(columns.setor);
    edge(RelType::Setor, node(Label::Setor, &[(prop::NOME, setor.as_ref())]), None);
    let subsetor = text(columns.subsetor);
    edge(RelType::Subsetor, node(Label::SubSetor, &[(prop::NOME, subsetor.as_ref())]), None);

    let principal = code(columns.natureza_principal);
    edge(
        RelType::ClassificadaCom,
        node(Label::NaturezaPrincipal, &[(prop::CODIGO, principal.as_ref())]),
        text(columns.tentcons_principal),
    );
    for (code_col, tentcons_col) in columns.natureza_secundaria {
        let secundaria = code(code_col);
        edge(
            RelType::RelacionaSe,
            node(Label::NaturezaSecundaria, &[(prop::CODIGO, secundaria.as_ref())]),
            text(tentcons_col),
        );
    }

    let ano = int(columns.ano);
    let mes = int(columns.mes);
    edge(
        RelType::NoTempo,
        node(Label::Tempo, &[(prop::ANO, ano.as_ref()), (prop::MES_NUM, mes.as_ref())]),
        None,
    );

    let causa = code(columns.causa);
    edge(RelType::Causa, node(Label::Causa, &[(prop::CODIGO, causa.as_ref())]), None);
    let meio = text(columns.meio);
    edge(RelType::Meio, node(Label::Meio, &[(prop::DESCRICAO, meio.as_ref())]), None);

    Some(ops)
}

/// Contiguous row ranges of at most `size` rows covering `0..total`.
pub fn batches(total: usize, size: usize) -> Vec<Range<usize>> {
    let size = size.max(1);
    (0..total)
        .step_by(size)
        .map(|start| start..(start + size).min(total))
        .collect()
}

// =============================================================================
// LOADER
// =============================================================================

pub struct BatchLoader<'a, S: GraphStore + ?Sized> {
    store: &'a S,
    batch_size: usize,
    report: LoadReport,
}

impl<'a, S: GraphStore + ?Sized> BatchLoader<'a, S> {
    pub fn new(store: &'a S, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
            report: LoadReport::default(),
        }
    }

    pub fn finish(self) -> LoadReport {
        self.report
    }

    /// Apply one operation. Endpoint failures are counted and the run goes
    /// on; anything else is returned.
    pub async fn apply(&mut self, op: &MergeOp) -> Result<(), MergeError> {
        match self.store.apply(op).await {
            Ok(()) => {
                match op {
                    MergeOp::Node(_) => self.report.nodes_merged += 1,
                    MergeOp::Relationship(_) => self.report.relationships_merged += 1,
                }
                Ok(())
            }
            Err(e) if e.is_recoverable() => {
                warn!(error = %e, "merge skipped");
                self.report.failed_merges += 1;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn load_dimension(&mut self, table: &DimensionTable) -> Result<(), MergeError> {
        if table.is_empty() {
            warn!(dimension = table.dimension.name(), "dimension has no records");
        }
        for record in &table.records {
            for op in dimension_record_ops(table.dimension, record) {
                self.apply(&op).await?;
            }
        }
        self.report.dimension_records += table.len();
        info!(
            dimension = table.dimension.name(),
            source = ?table.source,
            records = table.len(),
            "dimension loaded"
        );
        Ok(())
    }

    pub async fn load_facts(&mut self, facts: &Table, columns: &FactColumns) -> Result<()> {
        let total = facts.len();

        for batch in batches(total, self.batch_size) {
            info!(start = batch.start + 1, end = batch.end, total, "loading occurrences");
            for row in facts.rows_in(batch) {
                let index = row.index();
                match fact_row_ops(columns, row) {
                    Some(ops) => {
                        for op in &ops {
                            self.apply(op)
                                .await
                                .with_context(|| format!("fact row {}", index + 1))?;
                        }
                        self.report.rows_loaded += 1;
                    }
                    None => self.report.rows_skipped += 1,
                }
            }
        }
        Ok(())
    }
}

// =============================================================================
// PIPELINE
// =============================================================================

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub batch_size: usize,
    pub export_dir: Option<PathBuf>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            export_dir: None,
        }
    }
}

/// Extract and load every dimension, then every fact row.
pub async fn run_pipeline<S: GraphStore + ?Sized>(
    workbook: &Workbook,
    store: &S,
    options: &PipelineOptions,
) -> Result<LoadReport> {
    let facts = workbook.facts()?;
    let columns = FactColumns::resolve(facts)?;
    info!(rows = facts.len(), path = %workbook.path().display(), "fact sheet ready");

    let mut loader = BatchLoader::new(store, options.batch_size);

    for dimension in Dimension::LOAD_ORDER {
        let table = extract_dimension(dimension, workbook)
            .with_context(|| format!("failed to extract dimension {}", dimension.name()))?;
        if let Some(dir) = &options.export_dir {
            write_dimension_csv(dir, &table)?;
        }
        loader
            .load_dimension(&table)
            .await
            .with_context(|| format!("failed to load dimension {}", dimension.name()))?;
    }

    loader.load_facts(facts, &columns).await?;

    Ok(loader.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::MemoryGraph;
    use crate::sanitize::Cell;

    const SCENARIO_COLUMNS: &[&str] = &[
        col::NUMERO_REDS,
        col::CODIGO_MUNICIPIO,
        col::MUNICIPIO,
        col::BAIRRO,
        col::CODIGO_NATUREZA_PRINCIPAL,
        col::DESCR_NATUREZA_PRINCIPAL,
    ];

    fn scenario_workbook() -> Workbook {
        let facts = Table::from_rows(
            "ocorrencias",
            SCENARIO_COLUMNS,
            vec![vec![
                Cell::from("E1"),
                Cell::Int(5),
                Cell::from("Springfield"),
                Cell::from("Downtown"),
                Cell::Int(100),
                Cell::from("Theft"),
            ]],
        );
        Workbook::from_tables("scenario.xlsx", vec![facts])
    }

    fn municipio(code: i64) -> NodeRef {
        NodeRef::new(Label::Municipio).key(prop::COD, code)
    }

    fn bairro(code: i64, name: &str) -> NodeRef {
        NodeRef::new(Label::Bairro).key(prop::MUNICIPIO_COD, code).key(prop::NOME, name)
    }

    fn ocorrencia(id: &str) -> NodeRef {
        NodeRef::new(Label::Ocorrencia).key(prop::ID, id)
    }

    fn relationships(ops: &[MergeOp]) -> Vec<RelType> {
        ops.iter()
            .filter_map(|op| match op {
                MergeOp::Relationship(r) => Some(r.rel_type),
                MergeOp::Node(_) => None,
            })
            .collect()
    }

    // -------------------------------------------------------------------------
    // END TO END
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_end_to_end_scenario() {
        let graph = MemoryGraph::new();
        let report = run_pipeline(&scenario_workbook(), &graph, &PipelineOptions::default())
            .await
            .unwrap();

        let labels = graph.label_counts();
        assert_eq!(labels.get(&Label::Municipio), Some(&1));
        assert_eq!(labels.get(&Label::Bairro), Some(&1));
        assert_eq!(labels.get(&Label::NaturezaPrincipal), Some(&1));
        assert_eq!(labels.get(&Label::Ocorrencia), Some(&1));
        assert_eq!(graph.node_count(), 4);

        let m = graph.node(&municipio(5)).unwrap();
        assert_eq!(m.get(prop::NOME), Some(&Value::from("Springfield")));

        let n = graph
            .node(&NodeRef::new(Label::NaturezaPrincipal).key(prop::CODIGO, 100i64))
            .unwrap();
        assert_eq!(n.get(prop::DESCRICAO), Some(&Value::from("Theft")));

        assert!(graph.edge(&bairro(5, "Downtown"), RelType::FicaEm, &municipio(5)).is_some());
        assert!(graph.edge(&ocorrencia("E1"), RelType::OcorreEm, &bairro(5, "Downtown")).is_some());
        assert!(graph
            .edge(
                &ocorrencia("E1"),
                RelType::ClassificadaCom,
                &NodeRef::new(Label::NaturezaPrincipal).key(prop::CODIGO, 100i64),
            )
            .is_some());
        assert_eq!(graph.edge_count(), 3);

        assert_eq!(report.rows_loaded, 1);
        assert_eq!(report.rows_skipped, 0);
        assert_eq!(report.failed_merges, 0);
        assert_eq!(report.dimension_records, 3);
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let graph = MemoryGraph::new();
        let wb = scenario_workbook();

        let first = run_pipeline(&wb, &graph, &PipelineOptions::default()).await.unwrap();
        let nodes = graph.node_count();
        let edges = graph.edge_count();
        let snapshot = graph.node(&ocorrencia("E1"));

        let second = run_pipeline(&wb, &graph, &PipelineOptions::default()).await.unwrap();
        assert_eq!(graph.node_count(), nodes);
        assert_eq!(graph.edge_count(), edges);
        assert_eq!(graph.node(&ocorrencia("E1")), snapshot);
        assert_eq!(first, second);
    }

    // -------------------------------------------------------------------------
    // FACT ROWS
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_rows_without_identifier_are_skipped() {
        let facts = Table::from_rows(
            "ocorrencias",
            &[col::NUMERO_REDS, col::SETOR],
            vec![
                vec![Cell::from("R1"), Cell::from("SETOR A")],
                vec![Cell::from("  "), Cell::from("SETOR A")],
                vec![Cell::from("nan"), Cell::Empty],
                vec![Cell::Int(20240001), Cell::Empty],
            ],
        );
        let wb = Workbook::from_tables("x.xlsx", vec![facts]);
        let graph = MemoryGraph::new();
        let report = run_pipeline(&wb, &graph, &PipelineOptions::default()).await.unwrap();

        assert_eq!(report.rows_loaded, 2);
        assert_eq!(report.rows_skipped, 2);
        assert_eq!(report.failed_merges, 0);
        assert!(graph.node(&ocorrencia("20240001")).is_some());
        assert_eq!(graph.label_counts().get(&Label::Ocorrencia), Some(&2));
    }

    #[test]
    fn test_edge_skipped_when_target_key_incomplete() {
        let facts = Table::from_rows(
            "ocorrencias",
            &[col::NUMERO_REDS, col::CODIGO_MUNICIPIO, col::BAIRRO, col::ANO_FATO, col::MES_NUMERICO],
            vec![vec![Cell::from("R1"), Cell::Int(5), Cell::Empty, Cell::Int(2024), Cell::from("x")]],
        );
        let columns = FactColumns::resolve(&facts).unwrap();
        let ops = fact_row_ops(&columns, facts.row(0).unwrap()).unwrap();

        assert!(matches!(&ops[0], MergeOp::Node(n) if n.node == ocorrencia("R1")));
        assert!(relationships(&ops).is_empty());
    }

    #[test]
    fn test_fact_row_properties_and_edges() {
        let facts = Table::from_rows(
            "ocorrencias",
            &[
                col::NUMERO_REDS,
                col::LATITUDE,
                col::QTDE_PRISAO,
                col::IMV_TOTAL,
                col::CODIGO_NATUREZA_PRINCIPAL,
                col::TENTADO_CONSUMADO_PRINCIPAL,
                col::CODIGO_NATUREZA_SECUNDARIA1,
                col::CODIGO_NATUREZA_SECUNDARIA2,
                col::TENTADO_CONSUMADO_SECUNDARIA2,
                col::ANO_FATO,
                col::MES_NUMERICO,
            ],
            vec![vec![
                Cell::Float(2024000123.0),
                Cell::from("-19,92"),
                Cell::from("abc"),
                Cell::from("1.0"),
                Cell::from("C01000"),
                Cell::from("CONSUMADO"),
                Cell::Empty,
                Cell::Int(7),
                Cell::from("TENTADO"),
                Cell::Float(2024.0),
                Cell::Int(3),
            ]],
        );
        let columns = FactColumns::resolve(&facts).unwrap();
        let ops = fact_row_ops(&columns, facts.row(0).unwrap()).unwrap();

        let MergeOp::Node(event) = &ops[0] else {
            panic!("first operation must be the event node");
        };
        assert_eq!(event.node, ocorrencia("2024000123"));
        assert_eq!(event.properties.get(prop::LAT), Some(&Value::Float(-19.92)));
        assert!(!event.properties.contains_key(prop::PRISAO));
        assert_eq!(event.properties.get(prop::IMV), Some(&Value::Int(1)));

        assert_eq!(
            relationships(&ops),
            vec![RelType::ClassificadaCom, RelType::RelacionaSe, RelType::NoTempo]
        );

        let MergeOp::Relationship(secondary) = &ops[2] else {
            panic!("expected the secondary classification edge");
        };
        assert_eq!(secondary.target, NodeRef::new(Label::NaturezaSecundaria).key(prop::CODIGO, 7i64));
        assert_eq!(secondary.properties.get(prop::TENTCONS), Some(&Value::from("TENTADO")));

        let MergeOp::Relationship(tempo) = &ops[3] else {
            panic!("expected the time edge");
        };
        assert_eq!(
            tempo.target,
            NodeRef::new(Label::Tempo).key(prop::ANO, 2024i64).key(prop::MES_NUM, 3i64)
        );
    }

    #[test]
    fn test_missing_identifier_column_is_fatal() {
        let facts = Table::from_rows("ocorrencias", &[col::SETOR], vec![vec![Cell::from("A")]]);
        let err = FactColumns::resolve(&facts).unwrap_err();
        assert!(matches!(err, WorkbookError::MissingColumn { ref column, .. } if column == "NUMERO_REDS"));
    }

    #[tokio::test]
    async fn test_missing_identifier_column_stops_before_any_write() {
        let facts = Table::from_rows("ocorrencias", &[col::SETOR], vec![vec![Cell::from("SETOR A")]]);
        let wb = Workbook::from_tables("x.xlsx", vec![facts]);
        let graph = MemoryGraph::new();

        let err = run_pipeline(&wb, &graph, &PipelineOptions::default()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<WorkbookError>(),
            Some(WorkbookError::MissingColumn { column, .. }) if column == "NUMERO_REDS"
        ));
        assert_eq!(graph.node_count(), 0);
        assert_eq!(graph.edge_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_dimension_is_counted_not_fatal() {
        // dim_meio replaces the derived dimension, so the row's Meio is unknown
        let facts = Table::from_rows(
            "ocorrencias",
            &[col::NUMERO_REDS, col::DESCRICAO_MEIO_UTILIZADO],
            vec![vec![Cell::from("R1"), Cell::from("ARMA DE FOGO")]],
        );
        let dim = Table::from_rows(
            "dim_meio",
            &[col::DESCRICAO_MEIO_UTILIZADO],
            vec![vec![Cell::from("FACA")]],
        );
        let wb = Workbook::from_tables("x.xlsx", vec![facts, dim]);
        let graph = MemoryGraph::new();
        let report = run_pipeline(&wb, &graph, &PipelineOptions::default()).await.unwrap();

        assert_eq!(report.failed_merges, 1);
        assert_eq!(report.rows_loaded, 1);
        assert_eq!(graph.rel_counts().get(&RelType::Meio), None);
    }

    // -------------------------------------------------------------------------
    // DIMENSIONS
    // -------------------------------------------------------------------------

    #[test]
    fn test_unidade_record_merges_n5_then_n6_then_edge() {
        let record = DimensionRecord::from_pairs(&[
            (col::UNID_AREA_NIVEL_5, Some(Value::from("1 RPM"))),
            (col::CODIGO_UNID_AREA_NIVEL_6, Some(Value::Int(61))),
            (col::UNID_AREA_NIVEL_6, Some(Value::from("1 CIA"))),
        ]);
        let ops = dimension_record_ops(Dimension::Unidade, &record);

        assert_eq!(ops.len(), 3);
        assert!(matches!(&ops[0], MergeOp::Node(n) if n.node.label == Label::UnidadeN5));
        assert!(matches!(&ops[1], MergeOp::Node(n) if n.node.label == Label::UnidadeN6));
        assert_eq!(relationships(&ops), vec![RelType::PertenceA]);
    }

    #[tokio::test]
    async fn test_unidade_sheet_with_aliases_builds_hierarchy() {
        let facts = Table::from_rows("ocorrencias", &[col::NUMERO_REDS], vec![vec![Cell::from("R1")]]);
        let dim = Table::from_rows(
            "dim_unidade",
            &[col::UNID_AREA_NIVEL_5, "codigo", "nome"],
            vec![vec![Cell::from("1 RPM"), Cell::Int(61), Cell::from("1 CIA")]],
        );
        let wb = Workbook::from_tables("x.xlsx", vec![facts, dim]);
        let graph = MemoryGraph::new();
        let report = run_pipeline(&wb, &graph, &PipelineOptions::default()).await.unwrap();

        let n5 = NodeRef::new(Label::UnidadeN5).key(prop::NOME, "1 RPM");
        let n6 = NodeRef::new(Label::UnidadeN6).key(prop::CODIGO, 61i64);
        assert!(graph.node(&n5).is_some());
        assert_eq!(
            graph.node(&n6).unwrap().get(prop::NOME),
            Some(&Value::from("1 CIA"))
        );
        assert!(graph.edge(&n6, RelType::PertenceA, &n5).is_some());
        assert_eq!(report.failed_merges, 0);
    }

    #[tokio::test]
    async fn test_bairro_sheet_keyed_by_municipio_cod_links_municipio() {
        let facts = Table::from_rows(
            "ocorrencias",
            &[col::NUMERO_REDS, col::CODIGO_MUNICIPIO, col::MUNICIPIO],
            vec![vec![Cell::from("R1"), Cell::Int(5), Cell::from("Springfield")]],
        );
        let dim = Table::from_rows(
            "dim_bairro",
            &[col::MUNICIPIO_COD, col::BAIRRO],
            vec![vec![Cell::from("5"), Cell::from("Centro")]],
        );
        let wb = Workbook::from_tables("x.xlsx", vec![facts, dim]);
        let graph = MemoryGraph::new();
        let report = run_pipeline(&wb, &graph, &PipelineOptions::default()).await.unwrap();

        assert!(graph.node(&bairro(5, "Centro")).is_some());
        assert!(graph.edge(&bairro(5, "Centro"), RelType::FicaEm, &municipio(5)).is_some());
        assert_eq!(graph.rel_counts().get(&RelType::FicaEm), Some(&1));
        assert_eq!(report.failed_merges, 0);
    }

    #[test]
    fn test_subsetor_without_setor_has_no_edge() {
        let record = DimensionRecord::from_pairs(&[(col::SUB_SETOR, Some(Value::from("SUB 1"))), (col::SETOR, None)]);
        let ops = dimension_record_ops(Dimension::Subsetor, &record);
        assert_eq!(ops.len(), 1);
        assert!(relationships(&ops).is_empty());
    }

    #[test]
    fn test_tempo_record_carries_properties() {
        let record = DimensionRecord::from_pairs(&[
            (col::ANO, Some(Value::Int(2024))),
            (col::MES_NUMERICO, Some(Value::Int(3))),
            (col::MES_DESCRICAO, Some(Value::from("MARÇO"))),
            (col::FAIXA_HORA_1, None),
        ]);
        let ops = dimension_record_ops(Dimension::Tempo, &record);
        let MergeOp::Node(tempo) = &ops[0] else {
            panic!("expected a node merge");
        };
        assert_eq!(tempo.properties.get(prop::MES_DESC), Some(&Value::from("MARÇO")));
        assert!(!tempo.properties.contains_key(prop::FAIXA_H1));
    }

    // -------------------------------------------------------------------------
    // BATCHING
    // -------------------------------------------------------------------------

    #[test]
    fn test_batches_partition_rows() {
        assert_eq!(batches(12, 5), vec![0..5, 5..10, 10..12]);
        assert_eq!(batches(10, 5), vec![0..5, 5..10]);
        assert_eq!(batches(3, 5000), vec![0..3]);
        assert!(batches(0, 5).is_empty());
    }

    #[tokio::test]
    async fn test_small_batches_load_every_row_in_order() {
        let rows = (1..=7).map(|i| vec![Cell::from(format!("R{}", i))]).collect();
        let facts = Table::from_rows("ocorrencias", &[col::NUMERO_REDS], rows);
        let wb = Workbook::from_tables("x.xlsx", vec![facts]);
        let graph = MemoryGraph::new();
        let options = PipelineOptions {
            batch_size: 3,
            export_dir: None,
        };

        let report = run_pipeline(&wb, &graph, &options).await.unwrap();
        assert_eq!(report.rows_loaded, 7);
        assert_eq!(graph.node_count(), 7);
    }
}
