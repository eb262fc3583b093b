//! Cell values read from Tiberius rows.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tiberius::{Column, ColumnData, ColumnType, FromSql, Row};
use uuid::Uuid;

/// One result cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
    Decimal(Decimal),
    Uuid(Uuid),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    DateTimeUtc(DateTime<Utc>),
}

impl SqlValue {
    /// Text shown in a Markdown cell, before escaping.
    pub fn to_display_string(&self) -> String {
        match self {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Bool(v) => v.to_string(),
            SqlValue::I64(v) => v.to_string(),
            SqlValue::F64(v) => v.to_string(),
            SqlValue::String(v) => v.clone(),
            SqlValue::Bytes(v) => format!("(binary {} bytes)", v.len()),
            SqlValue::Decimal(v) => v.to_string(),
            SqlValue::Uuid(v) => v.to_string(),
            SqlValue::Date(v) => v.format("%Y-%m-%d").to_string(),
            SqlValue::Time(v) => v.format("%H:%M:%S%.f").to_string(),
            SqlValue::DateTime(v) => v.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
            SqlValue::DateTimeUtc(v) => v.to_rfc3339(),
        }
    }

    /// Integer view of a count-like cell.
    ///
    /// Row counts arrive as BIGINT, DECIMAL or text depending on the
    /// catalog view they come from.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::I64(v) => Some(*v),
            SqlValue::Bool(v) => Some(i64::from(*v)),
            SqlValue::Decimal(v) => v.trunc().to_string().parse().ok(),
            SqlValue::String(v) => v.trim().parse().ok(),
            _ => None,
        }
    }

    /// Floating-point view of a numeric cell.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::F64(v) => Some(*v),
            SqlValue::I64(v) => Some(*v as f64),
            SqlValue::Decimal(v) => v.to_string().parse().ok(),
            _ => None,
        }
    }
}

/// Converts driver rows and column metadata.
pub struct TypeMapper;

impl TypeMapper {
    /// All cells of `row`, in column order.
    pub fn extract_row(row: &Row) -> Vec<SqlValue> {
        row.cells()
            .enumerate()
            .map(|(idx, (_, data))| Self::cell(row, idx, data))
            .collect()
    }

    fn cell(row: &Row, idx: usize, data: &ColumnData<'_>) -> SqlValue {
        match data {
            ColumnData::Bit(Some(v)) => SqlValue::Bool(*v),
            ColumnData::U8(Some(v)) => SqlValue::I64(i64::from(*v)),
            ColumnData::I16(Some(v)) => SqlValue::I64(i64::from(*v)),
            ColumnData::I32(Some(v)) => SqlValue::I64(i64::from(*v)),
            ColumnData::I64(Some(v)) => SqlValue::I64(*v),
            ColumnData::F32(Some(v)) => SqlValue::F64(f64::from(*v)),
            ColumnData::F64(Some(v)) => SqlValue::F64(*v),
            ColumnData::String(Some(v)) => SqlValue::String(v.to_string()),
            ColumnData::Xml(Some(v)) => SqlValue::String(v.to_string()),
            ColumnData::Guid(Some(v)) => SqlValue::Uuid(*v),
            ColumnData::Binary(Some(v)) => SqlValue::Bytes(v.to_vec()),
            ColumnData::Numeric(Some(_)) => typed(row, idx, SqlValue::Decimal),
            ColumnData::DateTime(Some(_))
            | ColumnData::SmallDateTime(Some(_))
            | ColumnData::DateTime2(Some(_)) => typed(row, idx, SqlValue::DateTime),
            ColumnData::DateTimeOffset(Some(_)) => typed(row, idx, SqlValue::DateTimeUtc),
            ColumnData::Date(Some(_)) => typed(row, idx, SqlValue::Date),
            ColumnData::Time(Some(_)) => typed(row, idx, SqlValue::Time),
            _ => SqlValue::Null,
        }
    }

    /// SQL Server name of a result column's type.
    pub fn sql_type_name(column: &Column) -> &'static str {
        match column.column_type() {
            ColumnType::Null => "NULL",
            ColumnType::Bit | ColumnType::Bitn => "BIT",
            ColumnType::Int1 => "TINYINT",
            ColumnType::Int2 => "SMALLINT",
            ColumnType::Int4 | ColumnType::Intn => "INT",
            ColumnType::Int8 => "BIGINT",
            ColumnType::Float4 => "REAL",
            ColumnType::Float8 | ColumnType::Floatn => "FLOAT",
            ColumnType::Money => "MONEY",
            ColumnType::Money4 => "SMALLMONEY",
            ColumnType::Decimaln => "DECIMAL",
            ColumnType::Numericn => "NUMERIC",
            ColumnType::Datetime | ColumnType::Datetimen => "DATETIME",
            ColumnType::Datetime4 => "SMALLDATETIME",
            ColumnType::Datetime2 => "DATETIME2",
            ColumnType::DatetimeOffsetn => "DATETIMEOFFSET",
            ColumnType::Daten => "DATE",
            ColumnType::Timen => "TIME",
            ColumnType::Guid => "UNIQUEIDENTIFIER",
            ColumnType::BigChar => "CHAR",
            ColumnType::BigVarChar => "VARCHAR",
            ColumnType::NChar => "NCHAR",
            ColumnType::NVarchar => "NVARCHAR",
            ColumnType::Text => "TEXT",
            ColumnType::NText => "NTEXT",
            ColumnType::BigBinary => "BINARY",
            ColumnType::BigVarBin => "VARBINARY",
            ColumnType::Image => "IMAGE",
            ColumnType::Xml => "XML",
            ColumnType::SSVariant => "SQL_VARIANT",
            _ => "UNKNOWN",
        }
    }
}

/// Decode a cell whose raw form needs the driver's conversion.
fn typed<'a, T, F>(row: &'a Row, idx: usize, wrap: F) -> SqlValue
where
    T: FromSql<'a>,
    F: FnOnce(T) -> SqlValue,
{
    match row.try_get::<T, _>(idx) {
        Ok(Some(value)) => wrap(value),
        _ => SqlValue::Null,
    }
}
