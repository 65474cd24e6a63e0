// src/columnar.rs
//
// Parquet codec for `FlatRow`. Whole-file read, whole-file write (temp file +
// rename), and projected reads of selected columns.

use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;

use arrow_array::types::{Float64Type, Int32Type, Int64Type};
use arrow_array::{
    new_null_array, Array, ArrayRef, ArrowPrimitiveType, BooleanArray, Float64Array, Int32Array,
    Int64Array, PrimitiveArray, RecordBatch, StringArray,
};
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::{ArrowWriter, ProjectionMask};
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use crate::error::StoreError;
use crate::rows::{FlatRow, COLUMNS};

fn data_type(column: &str) -> DataType {
    match column {
        "id" => DataType::Int64,
        "presupuestoTotal" => DataType::Float64,
        "mrr" | "sePublicaDiarioOficial" | "abierto" => DataType::Boolean,
        "year" => DataType::Int32,
        _ => DataType::Utf8,
    }
}

/// Every column nullable, in `COLUMNS` order.
pub fn schema() -> SchemaRef {
    let fields: Vec<Field> = COLUMNS
        .iter()
        .map(|name| Field::new(*name, data_type(name), true))
        .collect();
    Arc::new(Schema::new(fields))
}

/* ---------------- Encoding ---------------- */

fn text_array<'a>(rows: &'a [FlatRow], get: impl Fn(&'a FlatRow) -> Option<&'a str>) -> ArrayRef {
    Arc::new(rows.iter().map(get).collect::<StringArray>())
}

fn flag_array(rows: &[FlatRow], get: impl Fn(&FlatRow) -> Option<bool>) -> ArrayRef {
    Arc::new(rows.iter().map(get).collect::<BooleanArray>())
}

pub fn to_batch(rows: &[FlatRow]) -> Result<RecordBatch, StoreError> {
    let columns: Vec<ArrayRef> = vec![
        Arc::new(rows.iter().map(|r| r.id).collect::<Int64Array>()),
        text_array(rows, |r| r.codigo_bdns.as_deref()),
        text_array(rows, |r| r.fecha_recepcion.as_deref()),
        text_array(rows, |r| r.sede_electronica.as_deref()),
        text_array(rows, |r| r.tipo_convocatoria.as_deref()),
        Arc::new(rows.iter().map(|r| r.presupuesto_total).collect::<Float64Array>()),
        flag_array(rows, |r| r.mrr),
        text_array(rows, |r| r.descripcion.as_deref()),
        text_array(rows, |r| r.descripcion_leng.as_deref()),
        text_array(rows, |r| r.descripcion_finalidad.as_deref()),
        text_array(rows, |r| r.descripcion_bases_reguladoras.as_deref()),
        text_array(rows, |r| r.url_bases_reguladoras.as_deref()),
        flag_array(rows, |r| r.se_publica_diario_oficial),
        flag_array(rows, |r| r.abierto),
        text_array(rows, |r| r.fecha_inicio_solicitud.as_deref()),
        text_array(rows, |r| r.fecha_fin_solicitud.as_deref()),
        text_array(rows, |r| r.text_inicio.as_deref()),
        text_array(rows, |r| r.text_fin.as_deref()),
        text_array(rows, |r| r.organo_nivel1.as_deref()),
        text_array(rows, |r| r.organo_nivel2.as_deref()),
        text_array(rows, |r| r.organo_nivel3.as_deref()),
        Arc::new(rows.iter().map(|r| r.year).collect::<Int32Array>()),
        text_array(rows, |r| r.instrumento_descripcion.as_deref()),
        text_array(rows, |r| r.tipo_beneficiario_descripcion.as_deref()),
        text_array(rows, |r| r.sector_descripcion.as_deref()),
        text_array(rows, |r| r.sector_codigo.as_deref()),
        text_array(rows, |r| r.region_descripcion.as_deref()),
    ];
    Ok(RecordBatch::try_new(schema(), columns)?)
}

/* ---------------- Decoding ---------------- */

/// Columns of one batch coerced to the canonical types. Missing columns read
/// as all-null, so files written by older or foreign writers still load.
struct Columns {
    arrays: Vec<ArrayRef>,
}

impl Columns {
    fn from_batch(batch: &RecordBatch) -> Result<Self, StoreError> {
        let mut arrays = Vec::with_capacity(COLUMNS.len());
        for name in COLUMNS {
            arrays.push(coerce(batch, name)?);
        }
        Ok(Self { arrays })
    }

    fn get<T: 'static>(&self, name: &str) -> Result<&T, StoreError> {
        let ix = COLUMNS
            .iter()
            .position(|c| *c == name)
            .ok_or_else(|| StoreError::Schema(format!("unknown column `{name}`")))?;
        downcast(&self.arrays[ix], name)
    }
}

fn coerce(batch: &RecordBatch, name: &str) -> Result<ArrayRef, StoreError> {
    let want = data_type(name);
    match batch.column_by_name(name) {
        Some(col) if col.data_type() == &want => Ok(Arc::clone(col)),
        Some(col) => Ok(arrow_cast::cast(col.as_ref(), &want)?),
        None => Ok(new_null_array(&want, batch.num_rows())),
    }
}

fn downcast<'a, T: 'static>(array: &'a ArrayRef, name: &str) -> Result<&'a T, StoreError> {
    array
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| StoreError::Schema(format!("column `{name}` has type {}", array.data_type())))
}

fn text(a: &StringArray, i: usize) -> Option<String> {
    a.is_valid(i).then(|| a.value(i).to_owned())
}

fn prim<T: ArrowPrimitiveType>(a: &PrimitiveArray<T>, i: usize) -> Option<T::Native> {
    a.is_valid(i).then(|| a.value(i))
}

fn flag(a: &BooleanArray, i: usize) -> Option<bool> {
    a.is_valid(i).then(|| a.value(i))
}

pub fn from_batch(batch: &RecordBatch) -> Result<Vec<FlatRow>, StoreError> {
    let cols = Columns::from_batch(batch)?;
    let t = |name| cols.get::<StringArray>(name);

    let id = cols.get::<PrimitiveArray<Int64Type>>("id")?;
    let budget = cols.get::<PrimitiveArray<Float64Type>>("presupuestoTotal")?;
    let year = cols.get::<PrimitiveArray<Int32Type>>("year")?;
    let mrr = cols.get::<BooleanArray>("mrr")?;
    let diario = cols.get::<BooleanArray>("sePublicaDiarioOficial")?;
    let abierto = cols.get::<BooleanArray>("abierto")?;

    let codigo = t("codigoBDNS")?;
    let recepcion = t("fechaRecepcion")?;
    let sede = t("sedeElectronica")?;
    let tipo = t("tipoConvocatoria")?;
    let desc = t("descripcion")?;
    let desc_leng = t("descripcionLeng")?;
    let finalidad = t("descripcionFinalidad")?;
    let bases = t("descripcionBasesReguladoras")?;
    let url_bases = t("urlBasesReguladoras")?;
    let inicio = t("fechaInicioSolicitud")?;
    let fin = t("fechaFinSolicitud")?;
    let text_inicio = t("textInicio")?;
    let text_fin = t("textFin")?;
    let nivel1 = t("organo_nivel1")?;
    let nivel2 = t("organo_nivel2")?;
    let nivel3 = t("organo_nivel3")?;
    let instrumento = t("instrumento_descripcion")?;
    let beneficiario = t("tipoBeneficiario_descripcion")?;
    let sector = t("sector_descripcion")?;
    let sector_codigo = t("sector_codigo")?;
    let region = t("region_descripcion")?;

    Ok((0..batch.num_rows())
        .map(|i| FlatRow {
            id: prim(id, i),
            codigo_bdns: text(codigo, i),
            fecha_recepcion: text(recepcion, i),
            sede_electronica: text(sede, i),
            tipo_convocatoria: text(tipo, i),
            presupuesto_total: prim(budget, i),
            mrr: flag(mrr, i),
            descripcion: text(desc, i),
            descripcion_leng: text(desc_leng, i),
            descripcion_finalidad: text(finalidad, i),
            descripcion_bases_reguladoras: text(bases, i),
            url_bases_reguladoras: text(url_bases, i),
            se_publica_diario_oficial: flag(diario, i),
            abierto: flag(abierto, i),
            fecha_inicio_solicitud: text(inicio, i),
            fecha_fin_solicitud: text(fin, i),
            text_inicio: text(text_inicio, i),
            text_fin: text(text_fin, i),
            organo_nivel1: text(nivel1, i),
            organo_nivel2: text(nivel2, i),
            organo_nivel3: text(nivel3, i),
            year: prim(year, i),
            instrumento_descripcion: text(instrumento, i),
            tipo_beneficiario_descripcion: text(beneficiario, i),
            sector_descripcion: text(sector, i),
            sector_codigo: text(sector_codigo, i),
            region_descripcion: text(region, i),
        })
        .collect())
}

/* ---------------- Files ---------------- */

/// Overwrite `path` with `rows`. Written beside the target first so a failed
/// write never leaves a truncated partition behind.
pub fn write_file(path: &Path, rows: &[FlatRow]) -> Result<(), StoreError> {
    let tmp = path.with_extension("parquet.tmp");
    let result = write_to(&tmp, rows).and_then(|()| Ok(fs::rename(&tmp, path)?));
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

fn write_to(path: &Path, rows: &[FlatRow]) -> Result<(), StoreError> {
    let batch = to_batch(rows)?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

pub fn read_file(path: &Path) -> Result<Vec<FlatRow>, StoreError> {
    let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(path)?)?.build()?;
    let mut rows = Vec::new();
    for batch in reader {
        rows.extend(from_batch(&batch?)?);
    }
    Ok(rows)
}

/// Read only `columns` (by name) from `path`.
pub fn read_columns(path: &Path, columns: &[&str]) -> Result<Vec<RecordBatch>, StoreError> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(path)?)?;
    let mut roots = Vec::with_capacity(columns.len());
    for name in columns {
        roots.push(builder.schema().index_of(name)?);
    }
    let mask = ProjectionMask::roots(builder.parquet_schema(), roots);
    let reader = builder.with_projection(mask).build()?;
    Ok(reader.collect::<Result<Vec<_>, _>>()?)
}

/// One text column of `path`, cast to UTF-8 whatever its stored type.
pub fn read_text_column(path: &Path, column: &str) -> Result<Vec<Option<String>>, StoreError> {
    let mut out = Vec::new();
    for batch in read_columns(path, &[column])? {
        let col = batch
            .column_by_name(column)
            .ok_or_else(|| StoreError::Schema(format!("column `{column}` missing from projection")))?;
        let utf8 = arrow_cast::cast(col.as_ref(), &DataType::Utf8)?;
        let strings = downcast::<StringArray>(&utf8, column)?;
        out.extend((0..strings.len()).map(|i| text(strings, i)));
    }
    Ok(out)
}
