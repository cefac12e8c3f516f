use arrow::datatypes::{DataType as ArrowDataType, TimeUnit};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Column type carried by a table reference.
///
/// Each variant maps onto an Arrow type and onto the textual type name used
/// when a CSV source is described column by column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Boolean,
    Date32,
    TimestampSecond,
    TimestampMillisecond,
    TimestampMicrosecond,
    TimestampNanosecond,
    DurationSecond,
    DurationMillisecond,
    DurationMicrosecond,
    DurationNanosecond,
    Utf8,
    Decimal64,
}

impl ColumnType {
    pub fn to_arrow(&self) -> ArrowDataType {
        match self {
            ColumnType::Int8 => ArrowDataType::Int8,
            ColumnType::Int16 => ArrowDataType::Int16,
            ColumnType::Int32 => ArrowDataType::Int32,
            ColumnType::Int64 => ArrowDataType::Int64,
            ColumnType::UInt8 => ArrowDataType::UInt8,
            ColumnType::UInt16 => ArrowDataType::UInt16,
            ColumnType::UInt32 => ArrowDataType::UInt32,
            ColumnType::UInt64 => ArrowDataType::UInt64,
            ColumnType::Float32 => ArrowDataType::Float32,
            ColumnType::Float64 => ArrowDataType::Float64,
            ColumnType::Boolean => ArrowDataType::Boolean,
            ColumnType::Date32 => ArrowDataType::Date32,
            ColumnType::TimestampSecond => ArrowDataType::Timestamp(TimeUnit::Second, None),
            ColumnType::TimestampMillisecond => {
                ArrowDataType::Timestamp(TimeUnit::Millisecond, None)
            }
            ColumnType::TimestampMicrosecond => {
                ArrowDataType::Timestamp(TimeUnit::Microsecond, None)
            }
            ColumnType::TimestampNanosecond => {
                ArrowDataType::Timestamp(TimeUnit::Nanosecond, None)
            }
            ColumnType::DurationSecond => ArrowDataType::Duration(TimeUnit::Second),
            ColumnType::DurationMillisecond => ArrowDataType::Duration(TimeUnit::Millisecond),
            ColumnType::DurationMicrosecond => ArrowDataType::Duration(TimeUnit::Microsecond),
            ColumnType::DurationNanosecond => ArrowDataType::Duration(TimeUnit::Nanosecond),
            ColumnType::Utf8 => ArrowDataType::Utf8,
            // decimal64 is stored at full 128-bit width with the widest precision it can hold
            ColumnType::Decimal64 => ArrowDataType::Decimal128(18, 0),
        }
    }

    pub fn from_arrow(dt: &ArrowDataType) -> Option<Self> {
        let ty = match dt {
            ArrowDataType::Int8 => ColumnType::Int8,
            ArrowDataType::Int16 => ColumnType::Int16,
            ArrowDataType::Int32 => ColumnType::Int32,
            ArrowDataType::Int64 => ColumnType::Int64,
            ArrowDataType::UInt8 => ColumnType::UInt8,
            ArrowDataType::UInt16 => ColumnType::UInt16,
            ArrowDataType::UInt32 => ColumnType::UInt32,
            ArrowDataType::UInt64 => ColumnType::UInt64,
            ArrowDataType::Float32 => ColumnType::Float32,
            ArrowDataType::Float64 => ColumnType::Float64,
            ArrowDataType::Boolean => ColumnType::Boolean,
            ArrowDataType::Date32 => ColumnType::Date32,
            ArrowDataType::Timestamp(TimeUnit::Second, _) => ColumnType::TimestampSecond,
            ArrowDataType::Timestamp(TimeUnit::Millisecond, _) => ColumnType::TimestampMillisecond,
            ArrowDataType::Timestamp(TimeUnit::Microsecond, _) => ColumnType::TimestampMicrosecond,
            ArrowDataType::Timestamp(TimeUnit::Nanosecond, _) => ColumnType::TimestampNanosecond,
            ArrowDataType::Duration(TimeUnit::Second) => ColumnType::DurationSecond,
            ArrowDataType::Duration(TimeUnit::Millisecond) => ColumnType::DurationMillisecond,
            ArrowDataType::Duration(TimeUnit::Microsecond) => ColumnType::DurationMicrosecond,
            ArrowDataType::Duration(TimeUnit::Nanosecond) => ColumnType::DurationNanosecond,
            ArrowDataType::Utf8 | ArrowDataType::LargeUtf8 => ColumnType::Utf8,
            ArrowDataType::Decimal128(_, _) => ColumnType::Decimal64,
            _ => return None,
        };
        Some(ty)
    }

    /// Type name used when describing CSV columns
    pub fn csv_name(&self) -> &'static str {
        match self {
            ColumnType::Int8 => "int8",
            ColumnType::Int16 => "int16",
            ColumnType::Int32 => "int32",
            ColumnType::Int64 => "int64",
            ColumnType::UInt8 => "uint8",
            ColumnType::UInt16 => "uint16",
            ColumnType::UInt32 => "uint32",
            ColumnType::UInt64 => "uint64",
            ColumnType::Float32 => "float32",
            ColumnType::Float64 => "float64",
            ColumnType::Boolean => "boolean",
            ColumnType::Date32 => "date32",
            ColumnType::TimestampSecond => "timestamp[s]",
            ColumnType::TimestampMillisecond => "timestamp[ms]",
            ColumnType::TimestampMicrosecond => "timestamp[us]",
            ColumnType::TimestampNanosecond => "timestamp[ns]",
            ColumnType::DurationSecond => "timedelta64[s]",
            ColumnType::DurationMillisecond => "timedelta64[ms]",
            ColumnType::DurationMicrosecond => "timedelta64[us]",
            ColumnType::DurationNanosecond => "timedelta64[ns]",
            ColumnType::Utf8 => "str",
            ColumnType::Decimal64 => "decimal64",
        }
    }

    pub fn from_csv_name(name: &str) -> Option<Self> {
        let ty = match name.trim().to_ascii_lowercase().as_str() {
            "int8" => ColumnType::Int8,
            "int16" => ColumnType::Int16,
            "int32" | "int" => ColumnType::Int32,
            "int64" => ColumnType::Int64,
            "uint8" => ColumnType::UInt8,
            "uint16" => ColumnType::UInt16,
            "uint32" => ColumnType::UInt32,
            "uint64" => ColumnType::UInt64,
            "float32" => ColumnType::Float32,
            "float64" | "float" | "double" => ColumnType::Float64,
            "boolean" | "bool" => ColumnType::Boolean,
            "date32" => ColumnType::Date32,
            "timestamp[s]" => ColumnType::TimestampSecond,
            "timestamp[ms]" => ColumnType::TimestampMillisecond,
            "timestamp[us]" => ColumnType::TimestampMicrosecond,
            "timestamp[ns]" => ColumnType::TimestampNanosecond,
            "timedelta64[s]" => ColumnType::DurationSecond,
            "timedelta64[ms]" => ColumnType::DurationMillisecond,
            "timedelta64[us]" => ColumnType::DurationMicrosecond,
            "timedelta64[ns]" => ColumnType::DurationNanosecond,
            "str" | "string" | "utf8" => ColumnType::Utf8,
            "decimal64" => ColumnType::Decimal64,
            _ => return None,
        };
        Some(ty)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.csv_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_names_resolve_back() {
        for ty in [
            ColumnType::Int32,
            ColumnType::UInt64,
            ColumnType::Float64,
            ColumnType::TimestampMillisecond,
            ColumnType::DurationNanosecond,
            ColumnType::Utf8,
        ] {
            assert_eq!(ColumnType::from_csv_name(ty.csv_name()), Some(ty));
        }
        assert_eq!(ColumnType::from_csv_name("complex128"), None);
    }

    #[test]
    fn test_arrow_conversion() {
        assert_eq!(ColumnType::Int64.to_arrow(), ArrowDataType::Int64);
        assert_eq!(
            ColumnType::from_arrow(&ArrowDataType::LargeUtf8),
            Some(ColumnType::Utf8)
        );
        assert_eq!(ColumnType::from_arrow(&ArrowDataType::Null), None);
    }
}
