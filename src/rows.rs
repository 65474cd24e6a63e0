// src/rows.rs
//
// One announcement → N flat rows, N = |instrumentos| × |tiposBeneficiarios| ×
// |sectores| × |regiones|, each dimension counted as 1 when absent or empty.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::specs::{Convocatoria, Item};

/// Column order of every persisted partition and every CSV export.
pub const COLUMNS: [&str; 27] = [
    "id",
    "codigoBDNS",
    "fechaRecepcion",
    "sedeElectronica",
    "tipoConvocatoria",
    "presupuestoTotal",
    "mrr",
    "descripcion",
    "descripcionLeng",
    "descripcionFinalidad",
    "descripcionBasesReguladoras",
    "urlBasesReguladoras",
    "sePublicaDiarioOficial",
    "abierto",
    "fechaInicioSolicitud",
    "fechaFinSolicitud",
    "textInicio",
    "textFin",
    "organo_nivel1",
    "organo_nivel2",
    "organo_nivel3",
    "year",
    "instrumento_descripcion",
    "tipoBeneficiario_descripcion",
    "sector_descripcion",
    "sector_codigo",
    "region_descripcion",
];

/// Identity column used for dedupe and resume.
pub const ID_COLUMN: &str = "codigoBDNS";

/// Denormalized announcement × (instrument, beneficiary, sector, region).
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FlatRow {
    pub id: Option<i64>,
    #[serde(rename = "codigoBDNS")]
    pub codigo_bdns: Option<String>,
    #[serde(rename = "fechaRecepcion")]
    pub fecha_recepcion: Option<String>,
    #[serde(rename = "sedeElectronica")]
    pub sede_electronica: Option<String>,
    #[serde(rename = "tipoConvocatoria")]
    pub tipo_convocatoria: Option<String>,
    #[serde(rename = "presupuestoTotal")]
    pub presupuesto_total: Option<f64>,
    pub mrr: Option<bool>,
    pub descripcion: Option<String>,
    #[serde(rename = "descripcionLeng")]
    pub descripcion_leng: Option<String>,
    #[serde(rename = "descripcionFinalidad")]
    pub descripcion_finalidad: Option<String>,
    #[serde(rename = "descripcionBasesReguladoras")]
    pub descripcion_bases_reguladoras: Option<String>,
    #[serde(rename = "urlBasesReguladoras")]
    pub url_bases_reguladoras: Option<String>,
    #[serde(rename = "sePublicaDiarioOficial")]
    pub se_publica_diario_oficial: Option<bool>,
    pub abierto: Option<bool>,
    #[serde(rename = "fechaInicioSolicitud")]
    pub fecha_inicio_solicitud: Option<String>,
    #[serde(rename = "fechaFinSolicitud")]
    pub fecha_fin_solicitud: Option<String>,
    #[serde(rename = "textInicio")]
    pub text_inicio: Option<String>,
    #[serde(rename = "textFin")]
    pub text_fin: Option<String>,
    pub organo_nivel1: Option<String>,
    pub organo_nivel2: Option<String>,
    pub organo_nivel3: Option<String>,
    /// Partition key. `None` rows are never persisted.
    pub year: Option<i32>,
    pub instrumento_descripcion: Option<String>,
    #[serde(rename = "tipoBeneficiario_descripcion")]
    pub tipo_beneficiario_descripcion: Option<String>,
    pub sector_descripcion: Option<String>,
    pub sector_codigo: Option<String>,
    pub region_descripcion: Option<String>,
}

impl FlatRow {
    /// Scalar part shared by every row of one announcement (dimension cells empty).
    pub fn base(rec: &Convocatoria) -> Self {
        let organo = rec.organo.clone().unwrap_or_default();
        Self {
            id: rec.id,
            codigo_bdns: rec.codigo_bdns.clone(),
            fecha_recepcion: rec.fecha_recepcion.clone(),
            sede_electronica: rec.sede_electronica.clone(),
            tipo_convocatoria: rec.tipo_convocatoria.clone(),
            presupuesto_total: rec.presupuesto_total,
            mrr: rec.mrr,
            descripcion: rec.descripcion.clone(),
            descripcion_leng: rec.descripcion_leng.clone(),
            descripcion_finalidad: rec.descripcion_finalidad.clone(),
            descripcion_bases_reguladoras: rec.descripcion_bases_reguladoras.clone(),
            url_bases_reguladoras: rec.url_bases_reguladoras.clone(),
            se_publica_diario_oficial: rec.se_publica_diario_oficial,
            abierto: rec.abierto,
            fecha_inicio_solicitud: rec.fecha_inicio_solicitud.clone(),
            fecha_fin_solicitud: rec.fecha_fin_solicitud.clone(),
            text_inicio: rec.text_inicio.clone(),
            text_fin: rec.text_fin.clone(),
            organo_nivel1: organo.nivel1,
            organo_nivel2: organo.nivel2,
            organo_nivel3: organo.nivel3,
            year: partition_year(rec.fecha_recepcion.as_deref()),
            ..Self::default()
        }
    }

    fn with_choice(&self, inst: &Item, benef: &Item, sector: &Item, region: &Item) -> Self {
        Self {
            instrumento_descripcion: inst.descripcion.clone(),
            tipo_beneficiario_descripcion: benef.descripcion.clone(),
            sector_descripcion: sector.descripcion.clone(),
            sector_codigo: sector.codigo.clone(),
            region_descripcion: region.descripcion.clone(),
            ..self.clone()
        }
    }
}

/// Year of a `YYYY-MM-DD` reception date. Anything else yields `None`.
pub fn partition_year(fecha: Option<&str>) -> Option<i32> {
    let fecha = fecha?;
    NaiveDate::parse_from_str(fecha.trim(), "%Y-%m-%d").ok().map(|d| d.year())
}

/// Lazily expand `rec` into its Cartesian product of rows. Never empty.
pub fn flatten(rec: &Convocatoria) -> Expansion {
    Expansion {
        base: FlatRow::base(rec),
        dims: [
            dimension(rec.instrumentos.as_deref()),
            dimension(rec.tipos_beneficiarios.as_deref()),
            dimension(rec.sectores.as_deref()),
            dimension(rec.regiones.as_deref()),
        ],
        next: 0,
    }
}

/// Absent and empty lists both become the single placeholder `[{}]`.
fn dimension(items: Option<&[Item]>) -> Vec<Item> {
    match items {
        Some(list) if !list.is_empty() => list.to_vec(),
        _ => vec![Item::default()],
    }
}

/// Iterator over the product, first dimension varying slowest.
#[derive(Clone, Debug)]
pub struct Expansion {
    base: FlatRow,
    dims: [Vec<Item>; 4],
    next: usize,
}

impl Expansion {
    fn total(&self) -> usize {
        self.dims.iter().map(Vec::len).product()
    }
}

impl Iterator for Expansion {
    type Item = FlatRow;

    fn next(&mut self) -> Option<FlatRow> {
        if self.next >= self.total() {
            return None;
        }
        // mixed-radix decode, last dimension is the least significant digit
        let mut rem = self.next;
        let mut pick = [0usize; 4];
        for d in (0..4).rev() {
            let len = self.dims[d].len();
            pick[d] = rem % len;
            rem /= len;
        }
        self.next += 1;

        let [i, b, s, r] = &self.dims;
        Some(self.base.with_choice(&i[pick[0]], &b[pick[1]], &s[pick[2]], &r[pick[3]]))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.total() - self.next;
        (left, Some(left))
    }
}

impl ExactSizeIterator for Expansion {}
