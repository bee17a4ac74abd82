/// Value Module
///
/// Storage values as the engine sees them, and the `Scalar` conversions that
/// map them onto the member types an entity declares.
use crate::core::{OrmError, Result};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use uuid::Uuid;

/// A single engine value, tagged with its storage class.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Name of the storage class, used in mapping error messages.
    pub fn storage_class(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Text(_) => "text",
            Value::Blob(_) => "blob",
        }
    }
}

/// Storage affinity of a mapped column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Affinity {
    Integer,
    Real,
    Text,
    Blob,
    Null,
}

/// A member type that can be stored in a single column.
///
/// Implemented for the numeric types, `bool`, `String`, byte vectors,
/// `Uuid`, chrono date/time and duration types, and `Option<T>` of each.
pub trait Scalar: Sized + Send + Sync + 'static {
    /// Storage affinity of the column.
    const AFFINITY: Affinity;
    /// Declared column type emitted in `CREATE TABLE`.
    const DECL_TYPE: &'static str;
    /// Whether the member has a null representation.
    const NULLABLE: bool = false;

    fn to_value(&self) -> Value;

    /// Converts a stored value into the member type. A null value into a
    /// non-nullable type is a mapping error.
    fn from_value(value: Value) -> Result<Self>;
}

fn mismatch<T>(expected: &str, value: &Value) -> Result<T> {
    if value.is_null() {
        return Err(OrmError::Mapping(format!(
            "cannot bind null into non-nullable {}",
            expected
        )));
    }
    Err(OrmError::Mapping(format!(
        "cannot convert {} value into {}",
        value.storage_class(),
        expected
    )))
}

macro_rules! integer_scalar {
    ($($ty:ty),*) => {
        $(
            impl Scalar for $ty {
                const AFFINITY: Affinity = Affinity::Integer;
                const DECL_TYPE: &'static str = "integer";

                fn to_value(&self) -> Value {
                    Value::Integer(*self as i64)
                }

                fn from_value(value: Value) -> Result<Self> {
                    match value {
                        Value::Integer(i) => <$ty>::try_from(i).map_err(|_| {
                            OrmError::Mapping(format!(
                                "integer {} out of range for {}",
                                i,
                                stringify!($ty)
                            ))
                        }),
                        Value::Real(f) => Ok(f as $ty),
                        Value::Text(t) => t.trim().parse::<$ty>().map_err(|_| {
                            OrmError::Mapping(format!("cannot parse '{}' as {}", t, stringify!($ty)))
                        }),
                        other => mismatch(stringify!($ty), &other),
                    }
                }
            }
        )*
    };
}

integer_scalar!(i8, i16, i32, i64, u8, u16, u32);

impl Scalar for bool {
    const AFFINITY: Affinity = Affinity::Integer;
    const DECL_TYPE: &'static str = "integer";

    fn to_value(&self) -> Value {
        Value::Integer(if *self { 1 } else { 0 })
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Integer(i) => Ok(i != 0),
            Value::Real(f) => Ok(f != 0.0),
            other => mismatch("bool", &other),
        }
    }
}

impl Scalar for f64 {
    const AFFINITY: Affinity = Affinity::Real;
    const DECL_TYPE: &'static str = "float";

    fn to_value(&self) -> Value {
        Value::Real(*self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Real(f) => Ok(f),
            Value::Integer(i) => Ok(i as f64),
            other => mismatch("f64", &other),
        }
    }
}

impl Scalar for f32 {
    const AFFINITY: Affinity = Affinity::Real;
    const DECL_TYPE: &'static str = "float";

    fn to_value(&self) -> Value {
        Value::Real(*self as f64)
    }

    fn from_value(value: Value) -> Result<Self> {
        f64::from_value(value).map(|f| f as f32)
    }
}

impl Scalar for String {
    const AFFINITY: Affinity = Affinity::Text;
    const DECL_TYPE: &'static str = "varchar";

    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Text(t) => Ok(t),
            Value::Integer(i) => Ok(i.to_string()),
            Value::Real(f) => Ok(f.to_string()),
            Value::Blob(b) => String::from_utf8(b)
                .map_err(|_| OrmError::Mapping("blob is not valid UTF-8 text".to_string())),
            Value::Null => mismatch("String", &Value::Null),
        }
    }
}

impl Scalar for Vec<u8> {
    const AFFINITY: Affinity = Affinity::Blob;
    const DECL_TYPE: &'static str = "blob";

    fn to_value(&self) -> Value {
        Value::Blob(self.clone())
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Blob(b) => Ok(b),
            Value::Text(t) => Ok(t.into_bytes()),
            other => mismatch("Vec<u8>", &other),
        }
    }
}

impl Scalar for Uuid {
    const AFFINITY: Affinity = Affinity::Text;
    const DECL_TYPE: &'static str = "varchar(36)";

    fn to_value(&self) -> Value {
        Value::Text(self.hyphenated().to_string())
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Text(t) => Uuid::parse_str(&t)
                .map_err(|e| OrmError::Mapping(format!("invalid uuid '{}': {}", t, e))),
            Value::Blob(b) => Uuid::from_slice(&b)
                .map_err(|e| OrmError::Mapping(format!("invalid uuid bytes: {}", e))),
            other => mismatch("Uuid", &other),
        }
    }
}

impl Scalar for DateTime<Utc> {
    const AFFINITY: Affinity = Affinity::Integer;
    const DECL_TYPE: &'static str = "bigint";

    fn to_value(&self) -> Value {
        Value::Integer(self.timestamp_micros())
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Integer(micros) => DateTime::<Utc>::from_timestamp_micros(micros).ok_or_else(|| {
                OrmError::Mapping(format!("timestamp {} out of range", micros))
            }),
            other => mismatch("DateTime<Utc>", &other),
        }
    }
}

impl Scalar for DateTime<FixedOffset> {
    const AFFINITY: Affinity = Affinity::Integer;
    const DECL_TYPE: &'static str = "bigint";

    fn to_value(&self) -> Value {
        Value::Integer(self.timestamp_micros())
    }

    fn from_value(value: Value) -> Result<Self> {
        DateTime::<Utc>::from_value(value).map(|utc| utc.fixed_offset())
    }
}

impl Scalar for NaiveDate {
    const AFFINITY: Affinity = Affinity::Text;
    const DECL_TYPE: &'static str = "date";

    fn to_value(&self) -> Value {
        Value::Text(self.format("%Y-%m-%d").to_string())
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Text(t) => NaiveDate::parse_from_str(&t, "%Y-%m-%d")
                .map_err(|e| OrmError::Mapping(format!("invalid date '{}': {}", t, e))),
            other => mismatch("NaiveDate", &other),
        }
    }
}

impl Scalar for Duration {
    const AFFINITY: Affinity = Affinity::Integer;
    const DECL_TYPE: &'static str = "bigint";

    fn to_value(&self) -> Value {
        // Durations beyond i64 microseconds (~292k years) saturate.
        Value::Integer(self.num_microseconds().unwrap_or(i64::MAX))
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Integer(micros) => Ok(Duration::microseconds(micros)),
            other => mismatch("Duration", &other),
        }
    }
}

impl<T: Scalar> Scalar for Option<T> {
    const AFFINITY: Affinity = T::AFFINITY;
    const DECL_TYPE: &'static str = T::DECL_TYPE;
    const NULLABLE: bool = true;

    fn to_value(&self) -> Value {
        match self {
            Some(v) => v.to_value(),
            None => Value::Null,
        }
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            v => T::from_value(v).map(Some),
        }
    }
}

macro_rules! value_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    v.to_value()
                }
            }
        )*
    };
}

value_from!(
    bool, i8, i16, i32, i64, u8, u16, u32, f32, f64, String, Vec<u8>, Uuid,
    DateTime<Utc>, DateTime<FixedOffset>, NaiveDate, Duration
);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl<T: Scalar> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.to_value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_bool_stored_as_integer() {
        assert_eq!(true.to_value(), Value::Integer(1));
        assert_eq!(false.to_value(), Value::Integer(0));
        assert!(bool::from_value(Value::Integer(1)).unwrap());
        assert!(!bool::from_value(Value::Integer(0)).unwrap());
    }

    #[test]
    fn test_numeric_widening() {
        assert_eq!(f64::from_value(Value::Integer(3)).unwrap(), 3.0);
        assert_eq!(i64::from_value(Value::Integer(42)).unwrap(), 42);
        assert!(u8::from_value(Value::Integer(300)).is_err());
    }

    #[test]
    fn test_null_handling() {
        assert_eq!(Option::<i32>::from_value(Value::Null).unwrap(), None);
        assert_eq!(Option::<i32>::from_value(Value::Integer(7)).unwrap(), Some(7));

        match i32::from_value(Value::Null) {
            Err(OrmError::Mapping(msg)) => assert!(msg.contains("non-nullable")),
            other => panic!("Expected mapping error, got {:?}", other),
        }
    }

    #[test]
    fn test_uuid_text_round_trip() {
        let id = Uuid::new_v4();
        let stored = id.to_value();
        assert!(matches!(stored, Value::Text(ref t) if t.len() == 36));
        assert_eq!(Uuid::from_value(stored).unwrap(), id);
    }

    #[test]
    fn test_datetime_integer_offset() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let stored = at.to_value();
        assert_eq!(stored, Value::Integer(at.timestamp_micros()));
        assert_eq!(DateTime::<Utc>::from_value(stored.clone()).unwrap(), at);

        let offset = FixedOffset::east_opt(3600).unwrap();
        let local = at.with_timezone(&offset);
        assert_eq!(DateTime::<FixedOffset>::from_value(stored).unwrap(), local);
    }

    #[test]
    fn test_duration_and_date() {
        let d = Duration::milliseconds(1500);
        assert_eq!(Duration::from_value(d.to_value()).unwrap(), d);

        let day = NaiveDate::from_ymd_opt(2023, 12, 31).unwrap();
        assert_eq!(day.to_value(), Value::Text("2023-12-31".to_string()));
        assert_eq!(NaiveDate::from_value(day.to_value()).unwrap(), day);
    }

    #[test]
    fn test_blob_passthrough() {
        let bytes = vec![0u8, 1, 2, 255];
        assert_eq!(Vec::<u8>::from_value(Value::Blob(bytes.clone())).unwrap(), bytes);
    }
}
