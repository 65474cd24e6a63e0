// src/specs/convocatoria.rs

use reqwest::blocking::Client;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::config::{consts::PORTAL_VPD, options::ScrapeOptions};
use crate::core::net;
use crate::error::FetchError;

/// One grant announcement as returned by `GET <api>?numConv=<id>&vpd=GE`.
/// Only `codigo_bdns` is meaningful as identity; everything may be absent.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Convocatoria {
    #[serde(default, deserialize_with = "lenient_i64")]
    pub id: Option<i64>,
    #[serde(default, rename = "codigoBDNS", deserialize_with = "lenient_string")]
    pub codigo_bdns: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub fecha_recepcion: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub sede_electronica: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub tipo_convocatoria: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub presupuesto_total: Option<f64>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub mrr: Option<bool>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub descripcion: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub descripcion_leng: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub descripcion_finalidad: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub descripcion_bases_reguladoras: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub url_bases_reguladoras: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub se_publica_diario_oficial: Option<bool>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub abierto: Option<bool>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub fecha_inicio_solicitud: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub fecha_fin_solicitud: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub text_inicio: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub text_fin: Option<String>,
    #[serde(default)]
    pub organo: Option<Organo>,
    #[serde(default, deserialize_with = "lenient_items")]
    pub instrumentos: Option<Vec<Item>>,
    #[serde(default, deserialize_with = "lenient_items")]
    pub tipos_beneficiarios: Option<Vec<Item>>,
    #[serde(default, deserialize_with = "lenient_items")]
    pub sectores: Option<Vec<Item>>,
    #[serde(default, deserialize_with = "lenient_items")]
    pub regiones: Option<Vec<Item>>,
}

/// Issuing body, three levels deep (ministry → directorate → unit).
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Organo {
    #[serde(default, deserialize_with = "lenient_string")]
    pub nivel1: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub nivel2: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub nivel3: Option<String>,
}

/// Element of the multi-valued dimensions. `codigo` is only filled for sectors.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Item {
    #[serde(default, deserialize_with = "lenient_string")]
    pub descripcion: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub codigo: Option<String>,
}

impl Item {
    pub fn new(descripcion: &str) -> Self {
        Self { descripcion: Some(s!(descripcion)), codigo: None }
    }

    pub fn with_code(descripcion: &str, codigo: &str) -> Self {
        Self { descripcion: Some(s!(descripcion)), codigo: Some(s!(codigo)) }
    }
}

/* ---------------- Lookup outcome ---------------- */

#[derive(Debug)]
pub enum FetchOutcome {
    Found(Box<Convocatoria>),
    NotFound,
    TransientError(String),
}

impl FetchOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, FetchOutcome::Found(_))
    }
}

/// One lookup per identifier, no internal retries.
pub trait Fetch {
    fn fetch(&mut self, id: u64) -> FetchOutcome;
}

/// Interpret a raw response. `Ok(None)` means the identifier does not exist.
pub fn classify(status: u16, body: &str) -> Result<Option<Convocatoria>, FetchError> {
    match status {
        200 => {
            let value: Value = serde_json::from_str(body)?;
            if !value.is_object() {
                return Err(FetchError::Decode(serde::de::Error::custom(format!(
                    "expected a JSON object, got {}",
                    kind_of(&value)
                ))));
            }
            Ok(Some(serde_json::from_value(value)?))
        }
        404 => Ok(None),
        other => Err(FetchError::Status(other)),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

pub struct HttpFetcher {
    client: Client,
    api_url: String,
}

impl HttpFetcher {
    pub fn new(opts: &ScrapeOptions) -> Result<Self, FetchError> {
        Ok(Self {
            client: net::client(opts.request_timeout)?,
            api_url: opts.api_url.clone(),
        })
    }

    pub fn lookup(&self, id: u64) -> Result<Option<Convocatoria>, FetchError> {
        let query = [("numConv", id.to_string()), ("vpd", s!(PORTAL_VPD))];
        let resp = net::http_get(&self.client, &self.api_url, &query)?;
        classify(resp.status, &resp.body)
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&mut self, id: u64) -> FetchOutcome {
        match self.lookup(id) {
            Ok(Some(record)) => FetchOutcome::Found(Box::new(record)),
            Ok(None) => FetchOutcome::NotFound,
            Err(e) => FetchOutcome::TransientError(e.to_string()),
        }
    }
}

/* ---------------- Lenient decoding ---------------- */

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        Some(other) => Some(other.to_string()),
    })
}

fn lenient_i64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_bool<'de, D: Deserializer<'de>>(d: D) -> Result<Option<bool>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::Bool(b)) => Some(b),
        Some(Value::Number(n)) => n.as_i64().map(|v| v != 0),
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "s" | "si" | "sí" | "1" => Some(true),
            "false" | "n" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    })
}

/// Lists of objects; non-object elements are skipped, a non-list is `None`.
fn lenient_items<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<Item>>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::Array(values)) => Some(
            values
                .into_iter()
                .filter(Value::is_object)
                .filter_map(|v| serde_json::from_value(v).ok())
                .collect(),
        ),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_maps_statuses() {
        assert!(matches!(classify(404, ""), Ok(None)));
        assert!(matches!(classify(500, "{}"), Err(FetchError::Status(500))));
        assert!(matches!(classify(302, ""), Err(FetchError::Status(302))));
        assert!(matches!(classify(200, "<html>"), Err(FetchError::Decode(_))));
        assert!(matches!(classify(200, "{}"), Ok(Some(_))));
        assert!(matches!(classify(200, "[]"), Err(FetchError::Decode(_))));
        assert!(matches!(classify(200, "null"), Err(FetchError::Decode(_))));
        assert!(matches!(classify(200, r#""865179""#), Err(FetchError::Decode(_))));
    }

    #[test]
    fn decodes_mixed_scalar_types() {
        let body = r#"{
            "id": "42",
            "codigoBDNS": 865179,
            "fechaRecepcion": "2024-03-15",
            "presupuestoTotal": "1500.5",
            "abierto": true,
            "mrr": "N",
            "organo": {"nivel1": "MADRID", "nivel2": null},
            "sectores": [{"descripcion": "Agricultura", "codigo": "A"}, "junk"],
            "regiones": null
        }"#;
        let rec = classify(200, body).unwrap().unwrap();
        assert_eq!(rec.id, Some(42));
        assert_eq!(rec.codigo_bdns.as_deref(), Some("865179"));
        assert_eq!(rec.presupuesto_total, Some(1500.5));
        assert_eq!(rec.abierto, Some(true));
        assert_eq!(rec.mrr, Some(false));
        let organo = rec.organo.unwrap();
        assert_eq!(organo.nivel1.as_deref(), Some("MADRID"));
        assert_eq!(organo.nivel2, None);
        assert_eq!(rec.sectores, Some(vec![Item::with_code("Agricultura", "A")]));
        assert_eq!(rec.regiones, None);
        assert_eq!(rec.instrumentos, None);
    }

    #[test]
    fn missing_fields_default_to_none() {
        let rec = classify(200, r#"{"codigoBDNS": "1"}"#).unwrap().unwrap();
        assert_eq!(rec.fecha_recepcion, None);
        assert_eq!(rec.organo, None);
        assert_eq!(rec.presupuesto_total, None);
    }
}
