//! Writing tables to disk and reading them back.
//!
//! Every table goes out twice: as a flat CSV with a YAML sidecar describing
//! column types, and as a Parquet file built from one Arrow record batch.

use std::{
    collections::HashMap,
    fs::{self, File},
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result, anyhow, bail};
use arrow::{
    array::{
        Array, ArrayRef, AsArray, BooleanBuilder, Float64Builder, Int64Builder, StringBuilder,
        StringDictionaryBuilder, TimestampMicrosecondBuilder,
    },
    datatypes::{
        DataType, Field, Float64Type, Int32Type, Int64Type, Schema, TimeUnit,
        TimestampMicrosecondType,
    },
    record_batch::RecordBatch,
};
use chrono::{DateTime, NaiveDateTime, Timelike};
use clap::ValueEnum;
use parquet::{
    arrow::{ArrowWriter, arrow_reader::ParquetRecordBatchReaderBuilder},
    basic::{Compression, ZstdLevel},
    file::properties::WriterProperties,
};
use serde::{Deserialize, Serialize};

use crate::{
    data::{DATETIME_DISPLAY_FORMAT, Value},
    dataset::{Column, Table},
    error::{EtlError, EtlResult},
    io_utils,
    schema::ColumnType,
};

/// Field metadata key holding the [`ColumnType`] token of a Parquet column.
pub const COLUMN_TYPE_METADATA_KEY: &str = "shopclean.column_type";

pub trait Persister {
    /// Writes `table` under `name`, returning every file created.
    fn persist(&self, name: &str, table: &Table) -> EtlResult<Vec<PathBuf>>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnLayout {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

/// Contents of the `<name>.schema.yml` sidecar next to a flat file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableLayout {
    pub table: String,
    pub columns: Vec<ColumnLayout>,
}

impl TableLayout {
    pub fn of(table: &Table) -> Self {
        Self {
            table: table.name.clone(),
            columns: table
                .columns
                .iter()
                .map(|c| ColumnLayout {
                    name: c.name.clone(),
                    column_type: c.column_type,
                })
                .collect(),
        }
    }
}

pub fn sidecar_path(csv_path: &Path) -> PathBuf {
    csv_path.with_extension("schema.yml")
}

#[derive(Debug, Clone)]
pub struct CsvPersister {
    pub dir: PathBuf,
    pub delimiter: u8,
}

impl CsvPersister {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            delimiter: io_utils::DEFAULT_CSV_DELIMITER,
        }
    }

    fn write(&self, name: &str, table: &Table) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Creating output directory {:?}", self.dir))?;
        let path = self.dir.join(format!("{name}.csv"));
        let mut writer = io_utils::open_csv_writer(&path, self.delimiter)?;
        writer
            .write_record(table.headers())
            .with_context(|| format!("Writing headers to {path:?}"))?;
        for row in table.display_rows(None) {
            writer
                .write_record(&row)
                .with_context(|| format!("Writing row to {path:?}"))?;
        }
        writer
            .flush()
            .with_context(|| format!("Flushing {path:?}"))?;

        let sidecar = sidecar_path(&path);
        let layout = serde_yaml::to_string(&TableLayout::of(table))
            .context("Serializing column layout")?;
        fs::write(&sidecar, layout).with_context(|| format!("Writing {sidecar:?}"))?;
        Ok(vec![path, sidecar])
    }
}

impl Persister for CsvPersister {
    fn persist(&self, name: &str, table: &Table) -> EtlResult<Vec<PathBuf>> {
        self.write(name, table)
            .map_err(|err| EtlError::persistence(name, "csv", err))
    }
}

/// Reads a flat file written by [`CsvPersister`], typed by its sidecar.
pub fn read_csv_table(path: &Path) -> Result<Table> {
    let sidecar = sidecar_path(path);
    let layout: TableLayout = serde_yaml::from_str(
        &fs::read_to_string(&sidecar).with_context(|| format!("Reading {sidecar:?}"))?,
    )
    .with_context(|| format!("Parsing {sidecar:?}"))?;

    let delimiter = io_utils::resolve_input_delimiter(path, None);
    let mut reader = io_utils::open_csv_reader_from_path(path, delimiter)?;
    let headers = io_utils::reader_headers(&mut reader, encoding_rs::UTF_8)?;
    let expected: Vec<&str> = layout.columns.iter().map(|c| c.name.as_str()).collect();
    if headers != expected {
        bail!("Headers of {path:?} do not match {sidecar:?}: {headers:?} vs {expected:?}");
    }

    let mut columns: Vec<Column> = layout
        .columns
        .iter()
        .map(|c| Column::new(c.name.clone(), c.column_type, Vec::new()))
        .collect();
    for (row_idx, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Reading row {}", row_idx + 2))?;
        for (column, field) in columns.iter_mut().zip(record.iter()) {
            let value = if field.is_empty() {
                None
            } else {
                Some(parse_flat_value(field, column.column_type).with_context(|| {
                    format!("Row {} column '{}'", row_idx + 2, column.name)
                })?)
            };
            column.values.push(value);
        }
    }
    Table::new(layout.table, columns)
}

fn parse_flat_value(field: &str, column_type: ColumnType) -> Result<Value> {
    Ok(match column_type {
        ColumnType::Text | ColumnType::String | ColumnType::Category => {
            Value::String(field.to_string())
        }
        ColumnType::Integer | ColumnType::NullableInt => Value::Integer(field.parse()?),
        ColumnType::Float => Value::Float(field.parse()?),
        ColumnType::Boolean | ColumnType::NullableBool => Value::Boolean(field.parse()?),
        ColumnType::DateTime => {
            Value::DateTime(NaiveDateTime::parse_from_str(field, DATETIME_DISPLAY_FORMAT)?)
        }
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParquetCompression {
    Uncompressed,
    #[default]
    Snappy,
    Zstd,
}

impl ParquetCompression {
    fn codec(self) -> Compression {
        match self {
            ParquetCompression::Uncompressed => Compression::UNCOMPRESSED,
            ParquetCompression::Snappy => Compression::SNAPPY,
            ParquetCompression::Zstd => Compression::ZSTD(ZstdLevel::default()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParquetPersister {
    pub dir: PathBuf,
    pub compression: ParquetCompression,
}

impl ParquetPersister {
    pub fn new(dir: impl Into<PathBuf>, compression: ParquetCompression) -> Self {
        Self {
            dir: dir.into(),
            compression,
        }
    }

    fn write(&self, name: &str, table: &Table) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Creating output directory {:?}", self.dir))?;
        let path = self.dir.join(format!("{name}.parquet"));
        let batch = table_to_batch(table)?;
        let props = WriterProperties::builder()
            .set_compression(self.compression.codec())
            .build();
        let file = File::create(&path).with_context(|| format!("Creating {path:?}"))?;
        let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))
            .with_context(|| format!("Opening parquet writer for {path:?}"))?;
        writer
            .write(&batch)
            .with_context(|| format!("Writing {path:?}"))?;
        writer
            .close()
            .with_context(|| format!("Finalizing {path:?}"))?;
        Ok(path)
    }
}

impl Persister for ParquetPersister {
    fn persist(&self, name: &str, table: &Table) -> EtlResult<Vec<PathBuf>> {
        self.write(name, table)
            .map(|path| vec![path])
            .map_err(|err| EtlError::persistence(name, "parquet", err))
    }
}

/// Writes every table in both formats. The first failure aborts.
#[derive(Debug, Clone)]
pub struct DualPersister {
    pub csv: CsvPersister,
    pub parquet: ParquetPersister,
}

impl DualPersister {
    pub fn new(dir: &Path, delimiter: u8, compression: ParquetCompression) -> Self {
        Self {
            csv: CsvPersister {
                dir: dir.to_path_buf(),
                delimiter,
            },
            parquet: ParquetPersister::new(dir, compression),
        }
    }
}

impl Persister for DualPersister {
    fn persist(&self, name: &str, table: &Table) -> EtlResult<Vec<PathBuf>> {
        let mut written = self.csv.persist(name, table)?;
        written.extend(self.parquet.persist(name, table)?);
        Ok(written)
    }
}

fn arrow_type(column_type: ColumnType) -> DataType {
    match column_type {
        ColumnType::Text | ColumnType::String => DataType::Utf8,
        ColumnType::Category => {
            DataType::Dictionary(Box::new(DataType::Int32), Box::new(DataType::Utf8))
        }
        ColumnType::Integer | ColumnType::NullableInt => DataType::Int64,
        ColumnType::Float => DataType::Float64,
        ColumnType::Boolean | ColumnType::NullableBool => DataType::Boolean,
        ColumnType::DateTime => DataType::Timestamp(TimeUnit::Microsecond, None),
    }
}

pub fn table_to_batch(table: &Table) -> Result<RecordBatch> {
    let mut fields = Vec::with_capacity(table.column_count());
    let mut arrays = Vec::with_capacity(table.column_count());
    for column in &table.columns {
        let metadata = HashMap::from([(
            COLUMN_TYPE_METADATA_KEY.to_string(),
            column.column_type.as_str().to_string(),
        )]);
        fields.push(
            Field::new(&column.name, arrow_type(column.column_type), true).with_metadata(metadata),
        );
        arrays.push(
            column_to_array(column)
                .with_context(|| format!("Converting column '{}'", column.name))?,
        );
    }
    let schema = Arc::new(Schema::new(fields));
    RecordBatch::try_new(schema, arrays)
        .with_context(|| format!("Building record batch for '{}'", table.name))
}

fn mismatch(column: &Column, value: &Value) -> anyhow::Error {
    anyhow!(
        "value '{value}' does not fit column type {}",
        column.column_type
    )
    .context(format!("Column '{}'", column.name))
}

fn column_to_array(column: &Column) -> Result<ArrayRef> {
    let values = &column.values;
    let array: ArrayRef = match column.column_type {
        ColumnType::Text | ColumnType::String => {
            let mut builder = StringBuilder::with_capacity(values.len(), values.len() * 8);
            for cell in values {
                builder.append_option(cell.as_ref().map(Value::as_display));
            }
            Arc::new(builder.finish())
        }
        ColumnType::Category => {
            let mut builder = StringDictionaryBuilder::<Int32Type>::new();
            for cell in values {
                match cell {
                    Some(value) => {
                        builder.append(value.as_display())?;
                    }
                    None => builder.append_null(),
                }
            }
            Arc::new(builder.finish())
        }
        ColumnType::Integer | ColumnType::NullableInt => {
            let mut builder = Int64Builder::with_capacity(values.len());
            for cell in values {
                match cell {
                    Some(Value::Integer(i)) => builder.append_value(*i),
                    Some(other) => return Err(mismatch(column, other)),
                    None => builder.append_null(),
                }
            }
            Arc::new(builder.finish())
        }
        ColumnType::Float => {
            let mut builder = Float64Builder::with_capacity(values.len());
            for cell in values {
                match cell {
                    Some(value) => match value.as_f64() {
                        Some(f) => builder.append_value(f),
                        None => return Err(mismatch(column, value)),
                    },
                    None => builder.append_null(),
                }
            }
            Arc::new(builder.finish())
        }
        ColumnType::Boolean | ColumnType::NullableBool => {
            let mut builder = BooleanBuilder::with_capacity(values.len());
            for cell in values {
                match cell {
                    Some(Value::Boolean(b)) => builder.append_value(*b),
                    Some(other) => return Err(mismatch(column, other)),
                    None => builder.append_null(),
                }
            }
            Arc::new(builder.finish())
        }
        ColumnType::DateTime => {
            let mut builder = TimestampMicrosecondBuilder::with_capacity(values.len());
            for cell in values {
                match cell {
                    Some(Value::DateTime(dt)) => {
                        if dt.nanosecond() % 1_000 != 0 {
                            return Err(anyhow!(
                                "value '{}' is finer than microsecond precision",
                                Value::DateTime(*dt)
                            )
                            .context(format!("Column '{}'", column.name)));
                        }
                        builder.append_value(dt.and_utc().timestamp_micros())
                    }
                    Some(other) => return Err(mismatch(column, other)),
                    None => builder.append_null(),
                }
            }
            Arc::new(builder.finish())
        }
    };
    Ok(array)
}

/// Reads a file written by [`ParquetPersister`] back into a table named
/// after the file stem.
pub fn read_parquet_table(path: &Path) -> Result<Table> {
    let file = File::open(path).with_context(|| format!("Opening {path:?}"))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .with_context(|| format!("Reading parquet metadata from {path:?}"))?;
    let schema = builder.schema().clone();
    let mut columns = schema
        .fields()
        .iter()
        .map(|field| Ok(Column::new(field.name().clone(), field_column_type(field)?, Vec::new())))
        .collect::<Result<Vec<_>>>()?;

    let reader = builder
        .build()
        .with_context(|| format!("Opening parquet reader for {path:?}"))?;
    for batch in reader {
        let batch = batch.with_context(|| format!("Reading record batch from {path:?}"))?;
        for (column, array) in columns.iter_mut().zip(batch.columns()) {
            append_array(column, array.as_ref())
                .with_context(|| format!("Decoding column '{}'", column.name))?;
        }
    }

    let name = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or_default()
        .to_string();
    Table::new(name, columns)
}

fn field_column_type(field: &Field) -> Result<ColumnType> {
    if let Some(token) = field.metadata().get(COLUMN_TYPE_METADATA_KEY) {
        return token.parse();
    }
    Ok(match field.data_type() {
        DataType::Utf8 | DataType::LargeUtf8 => ColumnType::Text,
        DataType::Dictionary(_, _) => ColumnType::Category,
        DataType::Int64 => ColumnType::NullableInt,
        DataType::Float64 => ColumnType::Float,
        DataType::Boolean => ColumnType::NullableBool,
        DataType::Timestamp(TimeUnit::Microsecond, _) => ColumnType::DateTime,
        other => bail!("Unsupported parquet column type {other}"),
    })
}

fn append_array(column: &mut Column, array: &dyn Array) -> Result<()> {
    let values = &mut column.values;
    match array.data_type() {
        DataType::Utf8 => {
            let strings = array.as_string::<i32>();
            values.extend(
                strings
                    .iter()
                    .map(|cell| cell.map(|s| Value::String(s.to_string()))),
            );
        }
        DataType::Dictionary(_, _) => {
            let dictionary = array.as_dictionary::<Int32Type>();
            let labels = dictionary.values().as_string::<i32>();
            values.extend(
                dictionary
                    .keys()
                    .iter()
                    .map(|key| key.map(|k| Value::String(labels.value(k as usize).to_string()))),
            );
        }
        DataType::Int64 => {
            let ints = array.as_primitive::<Int64Type>();
            values.extend(ints.iter().map(|cell| cell.map(Value::Integer)));
        }
        DataType::Float64 => {
            let floats = array.as_primitive::<Float64Type>();
            values.extend(floats.iter().map(|cell| cell.map(Value::Float)));
        }
        DataType::Boolean => {
            values.extend(array.as_boolean().iter().map(|cell| cell.map(Value::Boolean)));
        }
        DataType::Timestamp(TimeUnit::Microsecond, _) => {
            let stamps = array.as_primitive::<TimestampMicrosecondType>();
            for cell in stamps.iter() {
                let value = match cell {
                    Some(micros) => Some(Value::DateTime(
                        DateTime::from_timestamp_micros(micros)
                            .ok_or_else(|| anyhow!("Timestamp {micros} is out of range"))?
                            .naive_utc(),
                    )),
                    None => None,
                };
                values.push(value);
            }
        }
        other => bail!("Unsupported parquet column type {other}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn orders() -> Table {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29)
            .unwrap()
            .and_hms_micro_opt(13, 45, 0, 250)
            .unwrap();
        Table::new(
            "orders",
            vec![
                Column::new(
                    "order_id",
                    ColumnType::Integer,
                    vec![Some(Value::Integer(1)), Some(Value::Integer(2))],
                ),
                Column::new(
                    "promotion_id",
                    ColumnType::NullableInt,
                    vec![None, Some(Value::Integer(7))],
                ),
                Column::new(
                    "status",
                    ColumnType::Category,
                    vec![Some(Value::String("shipped".into())), None],
                ),
                Column::new(
                    "notes",
                    ColumnType::String,
                    vec![Some(Value::String("leave, \"at\" door".into())), None],
                ),
                Column::new(
                    "total_amount",
                    ColumnType::Float,
                    vec![Some(Value::Float(10.1)), Some(Value::Float(0.30000000000000004))],
                ),
                Column::new(
                    "is_gift",
                    ColumnType::NullableBool,
                    vec![Some(Value::Boolean(true)), None],
                ),
                Column::new("order_date", ColumnType::DateTime, vec![Some(Value::DateTime(date)), None]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn csv_round_trip_is_lossless() {
        let dir = tempfile::tempdir().unwrap();
        let table = orders();
        let written = CsvPersister::new(dir.path()).persist("orders_clean", &table).unwrap();
        assert_eq!(written.len(), 2);
        assert!(written[1].ends_with("orders_clean.schema.yml"));

        let mut reloaded = read_csv_table(&written[0]).unwrap();
        reloaded.name = table.name.clone();
        assert_eq!(reloaded, table);
    }

    #[test]
    fn csv_quotes_every_field_and_leaves_nulls_empty() {
        let dir = tempfile::tempdir().unwrap();
        let table = Table::new(
            "t",
            vec![Column::new(
                "notes",
                ColumnType::String,
                vec![Some(Value::String("a".into())), None],
            )],
        )
        .unwrap();
        let written = CsvPersister::new(dir.path()).persist("t", &table).unwrap();
        let text = fs::read_to_string(&written[0]).unwrap();
        assert_eq!(text, "\"notes\"\n\"a\"\n\"\"\n");
    }

    #[test]
    fn parquet_round_trip_is_lossless() {
        let dir = tempfile::tempdir().unwrap();
        let table = orders();
        for compression in [
            ParquetCompression::Snappy,
            ParquetCompression::Zstd,
            ParquetCompression::Uncompressed,
        ] {
            let written = ParquetPersister::new(dir.path(), compression)
                .persist("orders", &table)
                .unwrap();
            let reloaded = read_parquet_table(&written[0]).unwrap();
            assert_eq!(reloaded, table, "{compression:?}");
        }
    }

    #[test]
    fn nanosecond_input_reloads_identically_from_both_formats() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = Table::new(
            "orders",
            vec![
                Column::new("order_id", ColumnType::Integer, vec![Some(Value::Integer(1))]),
                Column::new(
                    "order_date",
                    ColumnType::Text,
                    vec![Some(Value::String("2024-01-05 10:00:00.123456789".into()))],
                ),
            ],
        )
        .unwrap();
        crate::coerce::cast_dates(&mut table, &["order_date".to_string()], "orders");

        let written = DualPersister::new(dir.path(), b',', ParquetCompression::Snappy)
            .persist("orders_clean", &table)
            .unwrap();
        let mut flat = read_csv_table(&dir.path().join("orders_clean.csv")).unwrap();
        let columnar = read_parquet_table(&dir.path().join("orders_clean.parquet")).unwrap();
        flat.name = columnar.name.clone();
        assert_eq!(written.len(), 3);
        assert_eq!(flat, columnar);

        let expected = NaiveDate::from_ymd_opt(2024, 1, 5)
            .unwrap()
            .and_hms_micro_opt(10, 0, 0, 123_456)
            .unwrap();
        assert_eq!(columnar.cell(0, 1), Some(&Value::DateTime(expected)));
    }

    #[test]
    fn sub_microsecond_datetimes_are_refused() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 5)
            .unwrap()
            .and_hms_nano_opt(10, 0, 0, 123_456_789)
            .unwrap();
        let table = Table::new(
            "orders",
            vec![Column::new(
                "order_date",
                ColumnType::DateTime,
                vec![Some(Value::DateTime(date))],
            )],
        )
        .unwrap();
        let err = table_to_batch(&table).unwrap_err();
        assert!(format!("{err:#}").contains("microsecond precision"), "{err:#}");
    }

    #[test]
    fn category_columns_are_dictionary_encoded() {
        let batch = table_to_batch(&orders()).unwrap();
        let schema = batch.schema();
        let status = schema.field_with_name("status").unwrap();
        assert!(matches!(status.data_type(), DataType::Dictionary(_, _)));
        assert_eq!(
            status.metadata().get(COLUMN_TYPE_METADATA_KEY).map(String::as_str),
            Some("category")
        );
        assert_eq!(
            schema.field_with_name("order_date").unwrap().data_type(),
            &DataType::Timestamp(TimeUnit::Microsecond, None)
        );
    }

    #[test]
    fn empty_tables_keep_their_columns() {
        let dir = tempfile::tempdir().unwrap();
        let table = Table::new(
            "reviews",
            vec![Column::new("review_id", ColumnType::Integer, Vec::new())],
        )
        .unwrap();
        let persister = DualPersister::new(dir.path(), b',', ParquetCompression::default());
        let written = persister.persist("reviews", &table).unwrap();
        assert_eq!(written.len(), 3);
        assert_eq!(read_parquet_table(&written[2]).unwrap(), table);
        assert_eq!(read_csv_table(&written[0]).unwrap(), table);
    }

    #[test]
    fn mistyped_values_fail_as_persistence_errors() {
        let dir = tempfile::tempdir().unwrap();
        let table = Table::new(
            "t",
            vec![Column::new(
                "id",
                ColumnType::Integer,
                vec![Some(Value::String("x".into()))],
            )],
        )
        .unwrap();
        let err = ParquetPersister::new(dir.path(), ParquetCompression::Snappy)
            .persist("t", &table)
            .unwrap_err();
        assert!(matches!(err, EtlError::Persistence { format: "parquet", .. }));
    }

    #[test]
    fn unwritable_directory_is_a_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").unwrap();
        let err = CsvPersister::new(blocker.join("out"))
            .persist("t", &orders())
            .unwrap_err();
        assert!(matches!(err, EtlError::Persistence { format: "csv", .. }));
    }
}
