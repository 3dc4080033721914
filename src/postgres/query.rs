use std::error::Error;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::Value;
use tokio_postgres::Statement;
use tokio_postgres::types::{FromSql, Type};

use super::error::native_error;
use crate::results::ColumnDesc;
use crate::session::{DriverError, QueryOutput};
use crate::types::RowValues;

/// Column descriptors from prepared statement metadata.
pub(crate) fn describe_columns(stmt: &Statement) -> Vec<ColumnDesc> {
    stmt.columns()
        .iter()
        .map(|col| ColumnDesc::new(col.name(), col.type_().name()).with_oid(col.type_().oid()))
        .collect()
}

/// Build the query output using statement metadata for the columns.
///
/// # Errors
/// Returns the driver error if a value cannot be decoded.
pub(crate) fn build_output(
    stmt: &Statement,
    rows: &[tokio_postgres::Row],
) -> Result<QueryOutput, DriverError> {
    let columns = describe_columns(stmt);
    let column_count = columns.len();
    let mut out_rows = Vec::with_capacity(rows.len());
    for row in rows {
        let mut row_values = Vec::with_capacity(column_count);
        for idx in 0..column_count {
            row_values.push(extract_value(row, idx)?);
        }
        out_rows.push(row_values);
    }
    Ok(QueryOutput {
        columns,
        rows: out_rows,
    })
}

/// Extracts a `RowValues` from a `tokio_postgres` Row at the given index.
///
/// `numeric`, `date`, `time` and `uuid` come back as their text form. Other
/// types are read as text when the driver can, and as raw bytes otherwise.
///
/// # Errors
/// Returns the driver error if the column cannot be decoded.
pub(crate) fn extract_value(
    row: &tokio_postgres::Row,
    idx: usize,
) -> Result<RowValues, DriverError> {
    let type_name = row.columns()[idx].type_().name();
    let value = match type_name {
        "int2" => {
            let val: Option<i16> = row.try_get(idx).map_err(native_error)?;
            val.map_or(RowValues::Null, |v| RowValues::Int(i64::from(v)))
        }
        "int4" => {
            let val: Option<i32> = row.try_get(idx).map_err(native_error)?;
            val.map_or(RowValues::Null, |v| RowValues::Int(i64::from(v)))
        }
        "int8" => {
            let val: Option<i64> = row.try_get(idx).map_err(native_error)?;
            val.map_or(RowValues::Null, RowValues::Int)
        }
        "float4" => {
            let val: Option<f32> = row.try_get(idx).map_err(native_error)?;
            val.map_or(RowValues::Null, |v| RowValues::Float(f64::from(v)))
        }
        "float8" => {
            let val: Option<f64> = row.try_get(idx).map_err(native_error)?;
            val.map_or(RowValues::Null, RowValues::Float)
        }
        "bool" => {
            let val: Option<bool> = row.try_get(idx).map_err(native_error)?;
            val.map_or(RowValues::Null, RowValues::Bool)
        }
        "timestamp" => {
            let val: Option<NaiveDateTime> = row.try_get(idx).map_err(native_error)?;
            val.map_or(RowValues::Null, RowValues::Timestamp)
        }
        "timestamptz" => {
            let val: Option<chrono::DateTime<chrono::Utc>> =
                row.try_get(idx).map_err(native_error)?;
            val.map_or(RowValues::Null, |v| RowValues::Timestamp(v.naive_utc()))
        }
        "json" | "jsonb" => {
            let val: Option<Value> = row.try_get(idx).map_err(native_error)?;
            val.map_or(RowValues::Null, RowValues::JSON)
        }
        "bytea" => {
            let val: Option<Vec<u8>> = row.try_get(idx).map_err(native_error)?;
            val.map_or(RowValues::Null, RowValues::Blob)
        }
        "numeric" => {
            let val: Option<NumericText> = row.try_get(idx).map_err(native_error)?;
            val.map_or(RowValues::Null, |v| RowValues::Text(v.0))
        }
        "date" => {
            let val: Option<NaiveDate> = row.try_get(idx).map_err(native_error)?;
            val.map_or(RowValues::Null, |v| RowValues::Text(v.format("%Y-%m-%d").to_string()))
        }
        "time" => {
            let val: Option<NaiveTime> = row.try_get(idx).map_err(native_error)?;
            val.map_or(RowValues::Null, |v| RowValues::Text(v.format("%H:%M:%S%.f").to_string()))
        }
        "uuid" => {
            let val: Option<UuidText> = row.try_get(idx).map_err(native_error)?;
            val.map_or(RowValues::Null, |v| RowValues::Text(v.0))
        }
        _ if <String as FromSql<'_>>::accepts(row.columns()[idx].type_()) => {
            let val: Option<String> = row.try_get(idx).map_err(native_error)?;
            val.map_or(RowValues::Null, RowValues::Text)
        }
        _ => {
            let val: Option<RawBytes> = row.try_get(idx).map_err(native_error)?;
            val.map_or(RowValues::Null, |v| RowValues::Blob(v.0))
        }
    };
    Ok(value)
}

type DecodeError = Box<dyn Error + Sync + Send>;

/// Exact decimal text of a binary `numeric`.
struct NumericText(String);

impl<'a> FromSql<'a> for NumericText {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, DecodeError> {
        numeric_to_string(raw).map(NumericText)
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

/// Hyphenated text of a binary `uuid`.
struct UuidText(String);

impl<'a> FromSql<'a> for UuidText {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, DecodeError> {
        if raw.len() != 16 {
            return Err(format!("uuid must be 16 bytes, got {}", raw.len()).into());
        }
        let mut text = String::with_capacity(36);
        for (idx, byte) in raw.iter().enumerate() {
            if matches!(idx, 4 | 6 | 8 | 10) {
                text.push('-');
            }
            text.push_str(&format!("{byte:02x}"));
        }
        Ok(UuidText(text))
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::UUID
    }
}

/// The wire bytes of any type without a dedicated decoder.
struct RawBytes(Vec<u8>);

impl<'a> FromSql<'a> for RawBytes {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, DecodeError> {
        Ok(RawBytes(raw.to_vec()))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

// Binary numeric: ndigits, weight, sign, dscale, then ndigits base-10000 digits.
// Digit i stands for digit * 10000^(weight - i).
fn numeric_to_string(raw: &[u8]) -> Result<String, DecodeError> {
    let word = |offset: usize| -> Result<[u8; 2], DecodeError> {
        raw.get(offset..offset + 2)
            .map(|b| [b[0], b[1]])
            .ok_or_else(|| "numeric value truncated".into())
    };
    let ndigits = usize::from(u16::from_be_bytes(word(0)?));
    let weight = i32::from(i16::from_be_bytes(word(2)?));
    let sign = u16::from_be_bytes(word(4)?);
    let dscale = usize::from(u16::from_be_bytes(word(6)?));
    match sign {
        NUMERIC_NAN => return Ok("NaN".to_string()),
        NUMERIC_PINF => return Ok("Infinity".to_string()),
        NUMERIC_NINF => return Ok("-Infinity".to_string()),
        _ => {}
    }
    let digits = (0..ndigits)
        .map(|i| word(8 + 2 * i).map(u16::from_be_bytes))
        .collect::<Result<Vec<u16>, _>>()?;
    let digit_at = |group: i32| -> u16 {
        usize::try_from(group)
            .ok()
            .and_then(|g| digits.get(g).copied())
            .unwrap_or(0)
    };

    let mut out = String::new();
    if sign == NUMERIC_NEG {
        out.push('-');
    }
    if weight < 0 {
        out.push('0');
    } else {
        out.push_str(&digit_at(0).to_string());
        for group in 1..=weight {
            out.push_str(&format!("{:04}", digit_at(group)));
        }
    }
    if dscale > 0 {
        let mut fraction = String::with_capacity(dscale + 4);
        let mut group = weight + 1;
        while fraction.len() < dscale {
            fraction.push_str(&format!("{:04}", digit_at(group)));
            group += 1;
        }
        fraction.truncate(dscale);
        out.push('.');
        out.push_str(&fraction);
    }
    Ok(out)
}
