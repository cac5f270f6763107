//! Dimension extractor - derives deduplicated dimension tables
//!
//! Each dimension is declared as data: which columns it projects, how their
//! cells are coerced, which records are dropped, and how the result is
//! ordered. Extraction is deterministic: the same sheet always yields the
//! same records in the same order.

use crate::sanitize::{Coercion, Value};
use crate::schema::col;
use crate::table::Table;
use crate::workbook::{Workbook, WorkbookError};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Logical dimensions, in load order (parents before children)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Dimension {
    Municipio,
    Bairro,
    NaturezaPrincipal,
    NaturezaSecundaria,
    Unidade,
    Setor,
    Subsetor,
    Causa,
    Tempo,
    Meio,
}

impl Dimension {
    pub const LOAD_ORDER: [Dimension; 10] = [
        Dimension::Municipio,
        Dimension::Bairro,
        Dimension::NaturezaPrincipal,
        Dimension::NaturezaSecundaria,
        Dimension::Unidade,
        Dimension::Setor,
        Dimension::Subsetor,
        Dimension::Causa,
        Dimension::Tempo,
        Dimension::Meio,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Dimension::Municipio => "municipio",
            Dimension::Bairro => "bairro",
            Dimension::NaturezaPrincipal => "natureza_principal",
            Dimension::NaturezaSecundaria => "natureza_secundaria",
            Dimension::Unidade => "unidade",
            Dimension::Setor => "setor",
            Dimension::Subsetor => "subsetor",
            Dimension::Causa => "causa",
            Dimension::Tempo => "tempo",
            Dimension::Meio => "meio",
        }
    }

    /// Optional sheet that pre-supplies this dimension, e.g. `dim_bairro`.
    pub fn sheet_name(self) -> String {
        format!("dim_{}", self.name())
    }

    pub fn spec(self) -> &'static DimensionSpec {
        match self {
            Dimension::Municipio => &MUNICIPIO,
            Dimension::Bairro => &BAIRRO,
            Dimension::NaturezaPrincipal => &NATUREZA_PRINCIPAL,
            Dimension::NaturezaSecundaria => &NATUREZA_SECUNDARIA,
            Dimension::Unidade => &UNIDADE,
            Dimension::Setor => &SETOR,
            Dimension::Subsetor => &SUBSETOR,
            Dimension::Causa => &CAUSA,
            Dimension::Tempo => &TEMPO,
            Dimension::Meio => &MEIO,
        }
    }
}

// =============================================================================
// DECLARATIONS
// =============================================================================

/// One column of a dimension table
#[derive(Debug)]
pub struct DimColumn {
    /// Canonical name, also the header of the `dim_*` sheet
    pub name: &'static str,
    /// Fact-sheet column per slot. Most dimensions have a single slot; the
    /// secondary classification reads two parallel column pairs.
    pub sources: &'static [&'static str],
    /// Extra headers accepted in a pre-supplied sheet
    pub aliases: &'static [&'static str],
    pub coercion: Coercion,
}

/// Which projected records are discarded before dedup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropPolicy {
    /// Drop only when every projected column is absent
    AllAbsent,
    /// Drop when any projected column is absent
    AnyAbsent,
    /// Drop when any of the named columns is absent
    Require(&'static [&'static str]),
}

#[derive(Debug)]
pub struct DimensionSpec {
    pub columns: &'static [DimColumn],
    pub drop: DropPolicy,
    pub sort_by: &'static [&'static str],
}

impl DimensionSpec {
    pub fn column_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().map(|c| c.name)
    }

    fn slots(&self) -> usize {
        self.columns.iter().map(|c| c.sources.len()).max().unwrap_or(0)
    }
}

const fn column(name: &'static str, sources: &'static [&'static str], coercion: Coercion) -> DimColumn {
    DimColumn {
        name,
        sources,
        aliases: &[],
        coercion,
    }
}

const fn aliased(
    name: &'static str,
    sources: &'static [&'static str],
    aliases: &'static [&'static str],
    coercion: Coercion,
) -> DimColumn {
    DimColumn {
        name,
        sources,
        aliases,
        coercion,
    }
}

// A code without a name is not a usable node, so both are required.
static MUNICIPIO: DimensionSpec = DimensionSpec {
    columns: &[
        column(col::CODIGO_MUNICIPIO, &[col::CODIGO_MUNICIPIO], Coercion::Code),
        column(col::MUNICIPIO, &[col::MUNICIPIO], Coercion::Text),
    ],
    drop: DropPolicy::AnyAbsent,
    sort_by: &[col::MUNICIPIO, col::CODIGO_MUNICIPIO],
};

static BAIRRO: DimensionSpec = DimensionSpec {
    columns: &[
        column(col::MUNICIPIO_COD, &[col::CODIGO_MUNICIPIO], Coercion::Code),
        column(col::BAIRRO, &[col::BAIRRO], Coercion::Text),
    ],
    drop: DropPolicy::AnyAbsent,
    sort_by: &[col::MUNICIPIO_COD, col::BAIRRO],
};

static NATUREZA_PRINCIPAL: DimensionSpec = DimensionSpec {
    columns: &[
        column(col::CODIGO_NATUREZA_PRINCIPAL, &[col::CODIGO_NATUREZA_PRINCIPAL], Coercion::Code),
        column(col::DESCR_NATUREZA_PRINCIPAL, &[col::DESCR_NATUREZA_PRINCIPAL], Coercion::Text),
    ],
    drop: DropPolicy::Require(&[col::CODIGO_NATUREZA_PRINCIPAL]),
    sort_by: &[col::DESCR_NATUREZA_PRINCIPAL, col::CODIGO_NATUREZA_PRINCIPAL],
};

static NATUREZA_SECUNDARIA: DimensionSpec = DimensionSpec {
    columns: &[
        aliased(
            col::CODIGO_NATUREZA_SECUNDARIA,
            &[col::CODIGO_NATUREZA_SECUNDARIA1, col::CODIGO_NATUREZA_SECUNDARIA2],
            &["codigo"],
            Coercion::Code,
        ),
        aliased(
            col::DESCR_NATUREZA_SECUNDARIA,
            &[col::DESCR_NATUREZA_SECUNDARIA1, col::DESCR_NATUREZA_SECUNDARIA2],
            &["descricao"],
            Coercion::Text,
        ),
    ],
    drop: DropPolicy::Require(&[col::CODIGO_NATUREZA_SECUNDARIA]),
    sort_by: &[col::DESCR_NATUREZA_SECUNDARIA, col::CODIGO_NATUREZA_SECUNDARIA],
};

// Level-5-only and level-6-only rows are both useful, so only fully empty
// records are dropped.
static UNIDADE: DimensionSpec = DimensionSpec {
    columns: &[
        column(col::UNID_AREA_NIVEL_5, &[col::UNID_AREA_NIVEL_5], Coercion::Text),
        aliased(
            col::CODIGO_UNID_AREA_NIVEL_6,
            &[col::CODIGO_UNID_AREA_NIVEL_6],
            &["codigo"],
            Coercion::Code,
        ),
        aliased(col::UNID_AREA_NIVEL_6, &[col::UNID_AREA_NIVEL_6], &["nome"], Coercion::Text),
    ],
    drop: DropPolicy::AllAbsent,
    sort_by: &[col::UNID_AREA_NIVEL_5, col::UNID_AREA_NIVEL_6, col::CODIGO_UNID_AREA_NIVEL_6],
};

static SETOR: DimensionSpec = DimensionSpec {
    columns: &[column(col::SETOR, &[col::SETOR], Coercion::Text)],
    drop: DropPolicy::AllAbsent,
    sort_by: &[col::SETOR],
};

static SUBSETOR: DimensionSpec = DimensionSpec {
    columns: &[
        column(col::SUB_SETOR, &[col::SUB_SETOR], Coercion::Text),
        column(col::SETOR, &[col::SETOR], Coercion::Text),
    ],
    drop: DropPolicy::Require(&[col::SUB_SETOR]),
    sort_by: &[col::SETOR, col::SUB_SETOR],
};

static CAUSA: DimensionSpec = DimensionSpec {
    columns: &[
        column(col::CODIGO_CAUSA_PRESUMIDA, &[col::CODIGO_CAUSA_PRESUMIDA], Coercion::Code),
        column(col::CAUSA_PRESUMIDA, &[col::CAUSA_PRESUMIDA], Coercion::Text),
    ],
    drop: DropPolicy::Require(&[col::CODIGO_CAUSA_PRESUMIDA]),
    sort_by: &[col::CAUSA_PRESUMIDA, col::CODIGO_CAUSA_PRESUMIDA],
};

// Year and month form the key; the remaining columns ride along as properties.
static TEMPO: DimensionSpec = DimensionSpec {
    columns: &[
        column(col::ANO, &[col::ANO_FATO], Coercion::Integer),
        column(col::MES_NUMERICO, &[col::MES_NUMERICO], Coercion::Integer),
        column(col::MES_DESCRICAO, &[col::MES_DESCRICAO], Coercion::Text),
        column(col::DIA_DA_SEMANA_NUMERICO, &[col::DIA_DA_SEMANA_NUMERICO], Coercion::Integer),
        column(col::DIA_DA_SEMANA_FATO, &[col::DIA_DA_SEMANA_FATO], Coercion::Text),
        column(col::FAIXA_HORA_1, &[col::FAIXA_HORA_1], Coercion::Text),
        column(col::FAIXA_HORA_6, &[col::FAIXA_HORA_6], Coercion::Text),
    ],
    drop: DropPolicy::Require(&[col::ANO, col::MES_NUMERICO]),
    sort_by: &[col::ANO, col::MES_NUMERICO],
};

static MEIO: DimensionSpec = DimensionSpec {
    columns: &[column(col::DESCRICAO_MEIO_UTILIZADO, &[col::DESCRICAO_MEIO_UTILIZADO], Coercion::Text)],
    drop: DropPolicy::AllAbsent,
    sort_by: &[col::DESCRICAO_MEIO_UTILIZADO],
};

// =============================================================================
// RECORDS
// =============================================================================

/// One dimension record. Absent columns are simply not in the map.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct DimensionRecord {
    values: BTreeMap<&'static str, Value>,
}

impl DimensionRecord {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    pub fn set(&mut self, column: &'static str, value: Option<Value>) {
        match value {
            Some(v) => {
                self.values.insert(column, v);
            }
            None => {
                self.values.remove(column);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[cfg(test)]
    pub fn from_pairs(pairs: &[(&'static str, Option<Value>)]) -> Self {
        let mut record = Self::default();
        for (column, value) in pairs {
            record.set(column, value.clone());
        }
        record
    }
}

/// Where a dimension's records came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimensionSource {
    /// Pre-supplied `dim_*` sheet
    Sheet,
    /// Derived from the fact sheet
    Derived,
}

#[derive(Debug, Clone)]
pub struct DimensionTable {
    pub dimension: Dimension,
    pub source: DimensionSource,
    pub records: Vec<DimensionRecord>,
}

impl DimensionTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// =============================================================================
// EXTRACTION
// =============================================================================

/// Extract one dimension, preferring a non-empty `dim_*` sheet over
/// derivation from the fact sheet.
pub fn extract_dimension(
    dimension: Dimension,
    workbook: &Workbook,
) -> Result<DimensionTable, WorkbookError> {
    let spec = dimension.spec();

    let (source, records) = match workbook.sheet(&dimension.sheet_name()) {
        Some(sheet) if !sheet.is_empty() => (DimensionSource::Sheet, project_sheet(spec, sheet)),
        _ => (DimensionSource::Derived, project_facts(spec, workbook.facts()?)),
    };

    let records = normalize(spec, records);
    debug!(
        dimension = dimension.name(),
        source = ?source,
        records = records.len(),
        "dimension extracted"
    );

    Ok(DimensionTable {
        dimension,
        source,
        records,
    })
}

/// Project the fact sheet. Slots are concatenated slot by slot, so every
/// slot-1 record precedes every slot-2 record.
pub fn project_facts(spec: &DimensionSpec, facts: &Table) -> Vec<DimensionRecord> {
    let mut records = Vec::with_capacity(facts.len() * spec.slots());

    for slot in 0..spec.slots() {
        let indices: Vec<Option<usize>> = spec
            .columns
            .iter()
            .map(|c| {
                let header = c.sources.get(slot).copied()?;
                let index = facts.column_index(header);
                if index.is_none() {
                    warn!(sheet = facts.name(), column = header, "source column missing");
                }
                index
            })
            .collect();

        records.extend(facts.rows().map(|row| {
            let mut record = DimensionRecord::default();
            for (c, index) in spec.columns.iter().zip(&indices) {
                record.set(c.name, c.coercion.apply(row.cell(*index)));
            }
            record
        }));
    }

    records
}

/// Project a pre-supplied `dim_*` sheet, accepting canonical names or aliases.
pub fn project_sheet(spec: &DimensionSpec, sheet: &Table) -> Vec<DimensionRecord> {
    let indices: Vec<Option<usize>> = spec
        .columns
        .iter()
        .map(|c| {
            let candidates: Vec<&str> = std::iter::once(c.name).chain(c.aliases.iter().copied()).collect();
            let index = sheet.resolve(&candidates);
            if index.is_none() {
                warn!(sheet = sheet.name(), column = c.name, "dimension column missing");
            }
            index
        })
        .collect();

    sheet
        .rows()
        .map(|row| {
            let mut record = DimensionRecord::default();
            for (c, index) in spec.columns.iter().zip(&indices) {
                record.set(c.name, c.coercion.apply(row.cell(*index)));
            }
            record
        })
        .collect()
}

/// Drop, dedup and sort projected records.
pub fn normalize(spec: &DimensionSpec, records: Vec<DimensionRecord>) -> Vec<DimensionRecord> {
    let kept = records
        .into_iter()
        .filter(|r| retains(spec, r))
        .collect();
    let mut unique = dedup(kept);
    sort_records(&mut unique, spec.sort_by);
    unique
}

/// Whether a record survives the spec's drop policy.
pub fn retains(spec: &DimensionSpec, record: &DimensionRecord) -> bool {
    if record.is_empty() {
        return false;
    }
    match spec.drop {
        DropPolicy::AllAbsent => true,
        DropPolicy::AnyAbsent => spec.column_names().all(|c| record.get(c).is_some()),
        DropPolicy::Require(required) => required.iter().all(|c| record.get(c).is_some()),
    }
}

/// Exact tuple dedup, keeping the first occurrence.
pub fn dedup(records: Vec<DimensionRecord>) -> Vec<DimensionRecord> {
    let mut seen = BTreeSet::new();
    records
        .into_iter()
        .filter(|r| seen.insert(r.clone()))
        .collect()
}

/// Stable ascending sort by `columns`, absent values last.
pub fn sort_records(records: &mut [DimensionRecord], columns: &[&str]) {
    records.sort_by(|a, b| {
        columns
            .iter()
            .map(|c| nulls_last(a.get(c), b.get(c)))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
}

fn nulls_last(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.cmp(y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
