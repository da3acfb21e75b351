//! Dynamic column values.
//!
//! [`Value`] is the currency between typed entity fields and SQL parameters:
//! entities flatten into `Value`s ([`crate::Record`]), filters carry `Value`s,
//! and result rows decode into `Value`s before being bound back onto fields.
//! [`ColumnValue`] is implemented for every supported Rust field type.

use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use std::error::Error;
use tokio_postgres::Row;
use tokio_postgres::types::{IsNull, ToSql, Type, to_sql_checked};
use uuid::Uuid;

use crate::error::{OrmError, OrmResult};

/// The SQL type family a column is declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Bool,
    SmallInt,
    Int,
    BigInt,
    Real,
    Double,
    Text,
    Bytes,
    Uuid,
    Timestamp,
    TimestampTz,
    Date,
    Json,
}

impl ColumnType {
    /// Postgres type name, as it would appear in DDL.
    pub fn sql_name(self) -> &'static str {
        match self {
            Self::Bool => "boolean",
            Self::SmallInt => "smallint",
            Self::Int => "integer",
            Self::BigInt => "bigint",
            Self::Real => "real",
            Self::Double => "double precision",
            Self::Text => "text",
            Self::Bytes => "bytea",
            Self::Uuid => "uuid",
            Self::Timestamp => "timestamp",
            Self::TimestampTz => "timestamptz",
            Self::Date => "date",
            Self::Json => "jsonb",
        }
    }
}

/// A single column value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Date(NaiveDate),
    Json(serde_json::Value),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Name of the variant, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::Uuid(_) => "uuid",
            Value::Timestamp(_) => "timestamp",
            Value::TimestampTz(_) => "timestamptz",
            Value::Date(_) => "date",
            Value::Json(_) => "json",
        }
    }

    /// Decode column `idx` of `row` according to its Postgres type.
    pub fn from_row(row: &Row, idx: usize) -> OrmResult<Self> {
        let column = &row.columns()[idx];
        let name = column.name();
        let ty = column.type_();

        fn get<'a, T>(row: &'a Row, idx: usize, name: &str) -> OrmResult<Option<T>>
        where
            T: tokio_postgres::types::FromSql<'a>,
        {
            row.try_get::<_, Option<T>>(idx)
                .map_err(|e| OrmError::decode(name, e.to_string()))
        }

        let value = match *ty {
            Type::BOOL => get::<bool>(row, idx, name)?.map(Value::Bool),
            Type::INT2 => get::<i16>(row, idx, name)?.map(|v| Value::Int(v.into())),
            Type::INT4 => get::<i32>(row, idx, name)?.map(|v| Value::Int(v.into())),
            Type::INT8 => get::<i64>(row, idx, name)?.map(Value::Int),
            Type::FLOAT4 => get::<f32>(row, idx, name)?.map(|v| Value::Float(v.into())),
            Type::FLOAT8 => get::<f64>(row, idx, name)?.map(Value::Float),
            Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
                get::<String>(row, idx, name)?.map(Value::Text)
            }
            Type::BYTEA => get::<Vec<u8>>(row, idx, name)?.map(Value::Bytes),
            Type::UUID => get::<Uuid>(row, idx, name)?.map(Value::Uuid),
            Type::TIMESTAMP => get::<NaiveDateTime>(row, idx, name)?.map(Value::Timestamp),
            Type::TIMESTAMPTZ => get::<DateTime<Utc>>(row, idx, name)?.map(Value::TimestampTz),
            Type::DATE => get::<NaiveDate>(row, idx, name)?.map(Value::Date),
            Type::JSON | Type::JSONB => get::<serde_json::Value>(row, idx, name)?.map(Value::Json),
            ref other => {
                return Err(OrmError::decode(
                    name,
                    format!("unsupported column type '{other}'"),
                ));
            }
        };
        Ok(value.unwrap_or(Value::Null))
    }
}

/// Encode `v` only if its own `ToSql` impl accepts `ty`.
fn bind_exact<T: ToSql>(
    v: &T,
    kind: &str,
    ty: &Type,
    out: &mut BytesMut,
) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
    if T::accepts(ty) {
        v.to_sql(ty, out)
    } else {
        Err(format!("cannot bind {kind} value to parameter of type {ty}").into())
    }
}

impl ToSql for Value {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        let kind = self.kind();
        match (self, ty) {
            (Value::Null, _) => Ok(IsNull::Yes),
            // Integers are stored wide and narrowed to whatever the column expects.
            (Value::Int(v), &Type::INT2) => i16::try_from(*v)?.to_sql(ty, out),
            (Value::Int(v), &Type::INT4) => i32::try_from(*v)?.to_sql(ty, out),
            (Value::Int(v), &Type::FLOAT4) => (*v as f32).to_sql(ty, out),
            (Value::Int(v), &Type::FLOAT8) => (*v as f64).to_sql(ty, out),
            (Value::Float(v), &Type::FLOAT4) => (*v as f32).to_sql(ty, out),
            (Value::Bool(v), _) => bind_exact(v, kind, ty, out),
            (Value::Int(v), _) => bind_exact(v, kind, ty, out),
            (Value::Float(v), _) => bind_exact(v, kind, ty, out),
            (Value::Text(v), _) => bind_exact(v, kind, ty, out),
            (Value::Bytes(v), _) => bind_exact(v, kind, ty, out),
            (Value::Uuid(v), _) => bind_exact(v, kind, ty, out),
            (Value::Timestamp(v), _) => bind_exact(v, kind, ty, out),
            (Value::TimestampTz(v), _) => bind_exact(v, kind, ty, out),
            (Value::Date(v), _) => bind_exact(v, kind, ty, out),
            (Value::Json(v), _) => bind_exact(v, kind, ty, out),
        }
    }

    fn accepts(ty: &Type) -> bool {
        <bool as ToSql>::accepts(ty)
            || <i16 as ToSql>::accepts(ty)
            || <i32 as ToSql>::accepts(ty)
            || <i64 as ToSql>::accepts(ty)
            || <f32 as ToSql>::accepts(ty)
            || <f64 as ToSql>::accepts(ty)
            || <String as ToSql>::accepts(ty)
            || <Vec<u8> as ToSql>::accepts(ty)
            || <Uuid as ToSql>::accepts(ty)
            || <NaiveDateTime as ToSql>::accepts(ty)
            || <DateTime<Utc> as ToSql>::accepts(ty)
            || <NaiveDate as ToSql>::accepts(ty)
            || <serde_json::Value as ToSql>::accepts(ty)
    }

    to_sql_checked!();
}

/// A Rust type that can be stored in an entity column.
///
/// `Option<T>` is the nullable form of `T`; a `None` field is "unset" for the
/// purposes of sparse updates and defaults.
pub trait ColumnValue: Sized {
    const COLUMN_TYPE: ColumnType;
    const NULLABLE: bool = false;

    fn to_value(&self) -> Value;

    fn from_value(value: Value) -> Result<Self, String>;
}

impl<T: ColumnValue> ColumnValue for Option<T> {
    const COLUMN_TYPE: ColumnType = T::COLUMN_TYPE;
    const NULLABLE: bool = true;

    fn to_value(&self) -> Value {
        match self {
            Some(v) => v.to_value(),
            None => Value::Null,
        }
    }

    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

fn mismatch(expected: &str, got: &Value) -> String {
    format!("expected {expected}, got {}", got.kind())
}

macro_rules! int_column_value {
    ($($ty:ty => $col:ident),* $(,)?) => {$(
        impl ColumnValue for $ty {
            const COLUMN_TYPE: ColumnType = ColumnType::$col;

            fn to_value(&self) -> Value {
                Value::Int(i64::from(*self))
            }

            fn from_value(value: Value) -> Result<Self, String> {
                match value {
                    Value::Int(v) => <$ty>::try_from(v).map_err(|e| e.to_string()),
                    other => Err(mismatch(stringify!($ty), &other)),
                }
            }
        }
    )*};
}

int_column_value!(i16 => SmallInt, i32 => Int, i64 => BigInt);

impl ColumnValue for f32 {
    const COLUMN_TYPE: ColumnType = ColumnType::Real;

    fn to_value(&self) -> Value {
        Value::Float(f64::from(*self))
    }

    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Float(v) => Ok(v as f32),
            Value::Int(v) => Ok(v as f32),
            other => Err(mismatch("f32", &other)),
        }
    }
}

impl ColumnValue for f64 {
    const COLUMN_TYPE: ColumnType = ColumnType::Double;

    fn to_value(&self) -> Value {
        Value::Float(*self)
    }

    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Float(v) => Ok(v),
            Value::Int(v) => Ok(v as f64),
            other => Err(mismatch("f64", &other)),
        }
    }
}

macro_rules! simple_column_value {
    ($($ty:ty => $col:ident / $variant:ident),* $(,)?) => {$(
        impl ColumnValue for $ty {
            const COLUMN_TYPE: ColumnType = ColumnType::$col;

            fn to_value(&self) -> Value {
                Value::$variant(self.clone())
            }

            fn from_value(value: Value) -> Result<Self, String> {
                match value {
                    Value::$variant(v) => Ok(v),
                    other => Err(mismatch(stringify!($ty), &other)),
                }
            }
        }
    )*};
}

simple_column_value!(
    bool => Bool / Bool,
    String => Text / Text,
    Vec<u8> => Bytes / Bytes,
    Uuid => Uuid / Uuid,
    NaiveDateTime => Timestamp / Timestamp,
    DateTime<Utc> => TimestampTz / TimestampTz,
    NaiveDate => Date / Date,
    serde_json::Value => Json / Json,
);

macro_rules! value_from {
    ($($ty:ty),* $(,)?) => {$(
        impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                v.to_value()
            }
        }
    )*};
}

value_from!(
    bool,
    i16,
    i32,
    i64,
    f32,
    f64,
    String,
    Vec<u8>,
    Uuid,
    NaiveDateTime,
    DateTime<Utc>,
    NaiveDate,
    serde_json::Value,
);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}
