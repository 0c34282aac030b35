use chrono::{DateTime, Utc};
use parquet::basic::{Compression, LogicalType, Repetition, TimeUnit, Type as PhysicalType};
use parquet::data_type::{ByteArray, ByteArrayType, DoubleType, Int32Type, Int64Type};
use parquet::errors::ParquetError;
use parquet::file::properties::WriterProperties;
use parquet::file::writer::{SerializedColumnWriter, SerializedFileWriter};
use parquet::format::MicroSeconds;
use parquet::schema::types::{Type, TypePtr};
use std::sync::Arc;

use super::rows::{Decimal2, EnrichedRow};

pub const CONTENT_TYPE_PARQUET: &str = "application/vnd.apache.parquet";

pub const COLUMNS: [&str; 8] = [
    "id",
    "name",
    "category",
    "price",
    "stock",
    "last_updated",
    "discounted_price",
    "etl_processed_at",
];

fn string_column(name: &str) -> Result<TypePtr, ParquetError> {
    Ok(Arc::new(
        Type::primitive_type_builder(name, PhysicalType::BYTE_ARRAY)
            .with_repetition(Repetition::REQUIRED)
            .with_logical_type(Some(LogicalType::String))
            .build()?,
    ))
}

pub fn build_schema() -> Result<TypePtr, ParquetError> {
    let fields = vec![
        string_column(COLUMNS[0])?,
        string_column(COLUMNS[1])?,
        string_column(COLUMNS[2])?,
        Arc::new(
            Type::primitive_type_builder(COLUMNS[3], PhysicalType::DOUBLE)
                .with_repetition(Repetition::REQUIRED)
                .build()?,
        ),
        Arc::new(
            Type::primitive_type_builder(COLUMNS[4], PhysicalType::INT32)
                .with_repetition(Repetition::REQUIRED)
                .build()?,
        ),
        string_column(COLUMNS[5])?,
        Arc::new(
            Type::primitive_type_builder(COLUMNS[6], PhysicalType::INT64)
                .with_repetition(Repetition::REQUIRED)
                .with_logical_type(Some(LogicalType::Decimal {
                    scale: Decimal2::SCALE,
                    precision: Decimal2::PRECISION,
                }))
                .with_precision(Decimal2::PRECISION)
                .with_scale(Decimal2::SCALE)
                .build()?,
        ),
        Arc::new(
            Type::primitive_type_builder(COLUMNS[7], PhysicalType::INT64)
                .with_repetition(Repetition::REQUIRED)
                .with_logical_type(Some(LogicalType::Timestamp {
                    is_adjusted_to_u_t_c: true,
                    unit: TimeUnit::MICROS(MicroSeconds {}),
                }))
                .build()?,
        ),
    ];

    Ok(Arc::new(
        Type::group_type_builder("schema")
            .with_fields(fields)
            .build()?,
    ))
}

fn write_strings<'a>(
    column: &mut SerializedColumnWriter<'_>,
    values: impl Iterator<Item = &'a str>,
) -> Result<(), ParquetError> {
    let values: Vec<ByteArray> = values.map(ByteArray::from).collect();
    column
        .typed::<ByteArrayType>()
        .write_batch(&values, None, None)?;
    Ok(())
}

/// Encodes every row into one in-memory Parquet file with a single row group.
pub fn encode(rows: &[EnrichedRow], processed_at: DateTime<Utc>) -> Result<Vec<u8>, ParquetError> {
    let schema = build_schema()?;
    let props = Arc::new(
        WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .set_created_by(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_owned())
            .build(),
    );

    let mut buffer = Vec::new();
    let mut writer = SerializedFileWriter::new(&mut buffer, schema, props)?;
    if !rows.is_empty() {
        let mut row_group = writer.next_row_group()?;
        let mut column_index = 0;
        while let Some(mut column) = row_group.next_column()? {
            match column_index {
                0 => write_strings(&mut column, rows.iter().map(|r| r.row.id.as_str()))?,
                1 => write_strings(&mut column, rows.iter().map(|r| r.row.name.as_str()))?,
                2 => write_strings(&mut column, rows.iter().map(|r| r.row.category.as_str()))?,
                3 => {
                    let prices: Vec<f64> = rows.iter().map(|r| r.row.price).collect();
                    column
                        .typed::<DoubleType>()
                        .write_batch(&prices, None, None)?;
                }
                4 => {
                    let stock: Vec<i32> = rows.iter().map(|r| r.row.stock).collect();
                    column
                        .typed::<Int32Type>()
                        .write_batch(&stock, None, None)?;
                }
                5 => write_strings(&mut column, rows.iter().map(|r| r.row.last_updated.as_str()))?,
                6 => {
                    let cents: Vec<i64> = rows.iter().map(|r| r.discounted_price.cents()).collect();
                    column
                        .typed::<Int64Type>()
                        .write_batch(&cents, None, None)?;
                }
                7 => {
                    let stamps = vec![processed_at.timestamp_micros(); rows.len()];
                    column
                        .typed::<Int64Type>()
                        .write_batch(&stamps, None, None)?;
                }
                other => {
                    return Err(ParquetError::General(format!(
                        "unexpected column {} - schema mismatch",
                        other
                    )))
                }
            }
            column.close()?;
            column_index += 1;
        }
        row_group.close()?;
    }
    writer.close()?;

    Ok(buffer)
}
