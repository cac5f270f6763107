//! Graph contract - labels, relationship types and source column names
//!
//! Labels, relationship types and property names are queried by other
//! systems; renaming any of them is a breaking change.

use std::fmt;

/// Mandatory fact sheet
pub const FACT_SHEET: &str = "ocorrencias";

/// Default rows per fact batch
pub const DEFAULT_BATCH_SIZE: usize = 5000;

/// Node labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Label {
    Municipio,
    Bairro,
    NaturezaPrincipal,
    NaturezaSecundaria,
    UnidadeN5,
    UnidadeN6,
    Setor,
    SubSetor,
    Causa,
    Tempo,
    Meio,
    Ocorrencia,
}

impl Label {
    pub const ALL: [Label; 12] = [
        Label::Municipio,
        Label::Bairro,
        Label::NaturezaPrincipal,
        Label::NaturezaSecundaria,
        Label::UnidadeN5,
        Label::UnidadeN6,
        Label::Setor,
        Label::SubSetor,
        Label::Causa,
        Label::Tempo,
        Label::Meio,
        Label::Ocorrencia,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Label::Municipio => "Municipio",
            Label::Bairro => "Bairro",
            Label::NaturezaPrincipal => "NaturezaPrincipal",
            Label::NaturezaSecundaria => "NaturezaSecundaria",
            Label::UnidadeN5 => "UnidadeN5",
            Label::UnidadeN6 => "UnidadeN6",
            Label::Setor => "Setor",
            Label::SubSetor => "SubSetor",
            Label::Causa => "Causa",
            Label::Tempo => "Tempo",
            Label::Meio => "Meio",
            Label::Ocorrencia => "Ocorrencia",
        }
    }

    /// Properties forming the natural key, in constraint order.
    pub fn key_properties(self) -> &'static [&'static str] {
        match self {
            Label::Municipio => &[prop::COD],
            Label::Bairro => &[prop::MUNICIPIO_COD, prop::NOME],
            Label::NaturezaPrincipal | Label::NaturezaSecundaria => &[prop::CODIGO],
            Label::UnidadeN5 => &[prop::NOME],
            Label::UnidadeN6 => &[prop::CODIGO],
            Label::Setor | Label::SubSetor => &[prop::NOME],
            Label::Causa => &[prop::CODIGO],
            Label::Tempo => &[prop::ANO, prop::MES_NUM],
            Label::Meio => &[prop::DESCRICAO],
            Label::Ocorrencia => &[prop::ID],
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Relationship types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RelType {
    FicaEm,
    PertenceA,
    OcorreEm,
    AreaN5,
    AreaN6,
    Setor,
    Subsetor,
    ClassificadaCom,
    RelacionaSe,
    NoTempo,
    Causa,
    Meio,
}

impl RelType {
    pub fn as_str(self) -> &'static str {
        match self {
            RelType::FicaEm => "FICA_EM",
            RelType::PertenceA => "PERTENCE_A",
            RelType::OcorreEm => "OCORRE_EM",
            RelType::AreaN5 => "AREA_N5",
            RelType::AreaN6 => "AREA_N6",
            RelType::Setor => "SETOR",
            RelType::Subsetor => "SUBSETOR",
            RelType::ClassificadaCom => "CLASSIFICADA_COM",
            RelType::RelacionaSe => "RELACIONA_SE",
            RelType::NoTempo => "NO_TEMPO",
            RelType::Causa => "CAUSA",
            RelType::Meio => "MEIO",
        }
    }
}

impl fmt::Display for RelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Graph property names
pub mod prop {
    pub const COD: &str = "cod";
    pub const NOME: &str = "nome";
    pub const MUNICIPIO_COD: &str = "municipio_cod";
    pub const CODIGO: &str = "codigo";
    pub const DESCRICAO: &str = "descricao";
    pub const ANO: &str = "ano";
    pub const MES_NUM: &str = "mes_num";
    pub const MES_DESC: &str = "mes_desc";
    pub const DIA_SEMANA_NUM: &str = "dia_semana_num";
    pub const DIA_SEMANA: &str = "dia_semana";
    pub const FAIXA_H1: &str = "faixa_h1";
    pub const FAIXA_H6: &str = "faixa_h6";
    pub const ID: &str = "id";
    pub const DATA: &str = "data";
    pub const HORA: &str = "hora";
    pub const LAT: &str = "lat";
    pub const LON: &str = "lon";
    pub const PRISAO: &str = "prisao";
    pub const IMV: &str = "imv";
    pub const ICVPE: &str = "icvpe";
    pub const ICVPA: &str = "icvpa";
    pub const TENTCONS: &str = "tentcons";
}

/// Column headers of the fact sheet and of the `dim_*` sheets
pub mod col {
    pub const NUMERO_REDS: &str = "NUMERO_REDS";
    pub const DATA_FATO: &str = "DATA_FATO";
    pub const HORARIO_FATO: &str = "HORARIO_FATO";
    pub const LATITUDE: &str = "LATITUDE";
    pub const LONGITUDE: &str = "LONGITUDE";
    pub const QTDE_PRISAO: &str = "QTDE_PRISAO";
    pub const IMV_TOTAL: &str = "IMV_TOTAL";
    pub const ICVPE_TOTAL: &str = "ICVPE_TOTAL";
    pub const ICVPA_TOTAL: &str = "ICVPA_TOTAL";

    pub const CODIGO_MUNICIPIO: &str = "CODIGO_MUNICIPIO";
    pub const MUNICIPIO: &str = "MUNICIPIO";
    pub const MUNICIPIO_COD: &str = "MUNICIPIO_COD";
    pub const BAIRRO: &str = "BAIRRO";

    pub const CODIGO_NATUREZA_PRINCIPAL: &str = "CODIGO_NATUREZA_PRINCIPAL";
    pub const DESCR_NATUREZA_PRINCIPAL: &str = "DESCR_NATUREZA_PRINCIPAL";
    pub const TENTADO_CONSUMADO_PRINCIPAL: &str = "TENTADO_CONSUMADO_PRINCIPAL";

    pub const CODIGO_NATUREZA_SECUNDARIA: &str = "CODIGO_NATUREZA_SECUNDARIA";
    pub const DESCR_NATUREZA_SECUNDARIA: &str = "DESCR_NATUREZA_SECUNDARIA";
    pub const CODIGO_NATUREZA_SECUNDARIA1: &str = "CODIGO_NATUREZA_SECUNDARIA1";
    pub const DESCR_NATUREZA_SECUNDARIA1: &str = "DESCR_NATUREZA_SECUNDARIA1";
    pub const TENTADO_CONSUMADO_SECUNDARIA1: &str = "TENTADO_CONSUMADO_SECUNDARIA1";
    pub const CODIGO_NATUREZA_SECUNDARIA2: &str = "CODIGO_NATUREZA_SECUNDARIA2";
    pub const DESCR_NATUREZA_SECUNDARIA2: &str = "DESCR_NATUREZA_SECUNDARIA2";
    pub const TENTADO_CONSUMADO_SECUNDARIA2: &str = "TENTADO_CONSUMADO_SECUNDARIA2";

    pub const UNID_AREA_NIVEL_5: &str = "UNID_AREA_NIVEL_5";
    pub const CODIGO_UNID_AREA_NIVEL_6: &str = "CODIGO_UNID_AREA_NIVEL_6";
    pub const UNID_AREA_NIVEL_6: &str = "UNID_AREA_NIVEL_6";

    pub const SETOR: &str = "SETOR";
    pub const SUB_SETOR: &str = "SUB_SETOR";

    pub const CODIGO_CAUSA_PRESUMIDA: &str = "CODIGO_CAUSA_PRESUMIDA";
    pub const CAUSA_PRESUMIDA: &str = "CAUSA_PRESUMIDA";

    pub const ANO_FATO: &str = "ANO_FATO";
    pub const ANO: &str = "ANO";
    pub const MES_NUMERICO: &str = "MES_NUMERICO";
    pub const MES_DESCRICAO: &str = "MES_DESCRICAO";
    pub const DIA_DA_SEMANA_NUMERICO: &str = "DIA_DA_SEMANA_NUMERICO";
    pub const DIA_DA_SEMANA_FATO: &str = "DIA_DA_SEMANA_FATO";
    pub const FAIXA_HORA_1: &str = "FAIXA_HORA_1";
    pub const FAIXA_HORA_6: &str = "FAIXA_HORA_6";

    pub const DESCRICAO_MEIO_UTILIZADO: &str = "DESCRICAO_MEIO_UTILIZADO";
}
