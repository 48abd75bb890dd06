use crate::{Error, Result, Value, truncate_long};
use atoi::FromRadix10SignedChecked;
use rust_decimal::{
    Decimal,
    prelude::{FromPrimitive, ToPrimitive},
};
use std::any;
use time::{
    Date, OffsetDateTime, PrimitiveDateTime, Time, format_description::parse_borrowed,
    parsing::Parsed,
};
use uuid::Uuid;

/// Conversion between native Rust types and the dynamically typed [`Value`].
///
/// This is what record fields go through when rows are materialized and when values are
/// bound as parameters or rendered as literals.
///
/// # Conversion rules
/// - The canonical variant for the type is always accepted.
/// - Integral types accept any other integral variant, booleans and integral decimals,
///   after a range check. The error names both the offending value and the target type.
/// - Every type accepts `Value::Varchar` and parses it with [`AsValue::parse`], which must
///   consume the whole input.
///
/// # Examples
/// ```rust
/// use sluice_core::{AsValue, Value};
/// let v = 42i32.as_value();
/// assert!(matches!(v, Value::Int32(Some(42))));
/// let n: i64 = AsValue::try_from_value(v).unwrap();
/// assert_eq!(n, 42);
/// ```
pub trait AsValue {
    /// The typed NULL for this type, it doubles as the column type prototype.
    fn as_empty_value() -> Value;
    fn as_value(self) -> Value;
    fn try_from_value(value: Value) -> Result<Self>
    where
        Self: Sized;
    /// Parse the full input string into `Self`.
    fn parse(input: impl AsRef<str>) -> Result<Self>
    where
        Self: Sized,
    {
        Err(Error::msg(format!(
            "Cannot parse `{}` as {}",
            truncate_long!(input.as_ref()),
            any::type_name::<Self>()
        )))
    }
}

impl<T: AsValue> From<T> for Value {
    fn from(value: T) -> Self {
        value.as_value()
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Varchar(Some(value.into()))
    }
}

impl From<&String> for Value {
    fn from(value: &String) -> Self {
        Value::Varchar(Some(value.clone()))
    }
}

impl<T: AsValue + Clone> From<&[T]> for Value {
    fn from(value: &[T]) -> Self {
        value.to_vec().as_value()
    }
}

impl<T: AsValue + Clone> From<&Vec<T>> for Value {
    fn from(value: &Vec<T>) -> Self {
        value.clone().as_value()
    }
}

fn mismatch<T>(value: &Value) -> Error {
    Error::msg(format!(
        "Cannot convert {value:?} to {}",
        any::type_name::<T>()
    ))
}

macro_rules! impl_as_value_integer {
    ($($source:ty => $destination:path),+ $(,)?) => {$(
        impl AsValue for $source {
            fn as_empty_value() -> Value {
                $destination(None)
            }
            fn as_value(self) -> Value {
                $destination(Some(self))
            }
            fn try_from_value(value: Value) -> Result<Self> {
                match value {
                    $destination(Some(v)) => Ok(v),
                    Value::Varchar(Some(ref v)) => Self::parse(v),
                    ref v => match v.as_i128() {
                        Some(i) => <$source>::try_from(i).map_err(|_| {
                            Error::msg(format!(
                                "Value {i} is out of range for {}",
                                any::type_name::<Self>(),
                            ))
                        }),
                        None => Err(mismatch::<Self>(v)),
                    },
                }
            }
            fn parse(input: impl AsRef<str>) -> Result<Self> {
                let input = input.as_ref().trim();
                match <$source>::from_radix_10_signed_checked(input.as_bytes()) {
                    (Some(v), used)
                        if used == input.len() && input.bytes().any(|b| b.is_ascii_digit()) =>
                    {
                        Ok(v)
                    }
                    _ => Err(Error::msg(format!(
                        "Cannot parse `{}` as {}",
                        truncate_long!(input),
                        any::type_name::<Self>(),
                    ))),
                }
            }
        }
    )+};
}
impl_as_value_integer!(
    i8 => Value::Int8,
    i16 => Value::Int16,
    i32 => Value::Int32,
    i64 => Value::Int64,
    u8 => Value::UInt8,
    u16 => Value::UInt16,
    u32 => Value::UInt32,
    u64 => Value::UInt64,
);

macro_rules! impl_as_value_float {
    ($($source:ty => $destination:path),+ $(,)?) => {$(
        impl AsValue for $source {
            fn as_empty_value() -> Value {
                $destination(None)
            }
            fn as_value(self) -> Value {
                $destination(Some(self))
            }
            fn try_from_value(value: Value) -> Result<Self> {
                #[allow(unreachable_patterns)]
                match value {
                    $destination(Some(v)) => Ok(v),
                    Value::Float32(Some(v)) => Ok(v as _),
                    Value::Float64(Some(v)) => Ok(v as _),
                    Value::Decimal(Some(v)) => v.to_f64().map(|v| v as _).ok_or_else(|| {
                        Error::msg(format!(
                            "Decimal {v} is out of range for {}",
                            any::type_name::<Self>()
                        ))
                    }),
                    Value::Varchar(Some(ref v)) => Self::parse(v),
                    ref v => v
                        .as_i128()
                        .map(|i| i as _)
                        .ok_or_else(|| mismatch::<Self>(v)),
                }
            }
            fn parse(input: impl AsRef<str>) -> Result<Self> {
                fast_float::parse(input.as_ref().trim()).map_err(|_| {
                    Error::msg(format!(
                        "Cannot parse `{}` as {}",
                        truncate_long!(input.as_ref()),
                        any::type_name::<Self>(),
                    ))
                })
            }
        }
    )+};
}
impl_as_value_float!(f32 => Value::Float32, f64 => Value::Float64);

impl AsValue for bool {
    fn as_empty_value() -> Value {
        Value::Boolean(None)
    }
    fn as_value(self) -> Value {
        Value::Boolean(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Boolean(Some(v)) => Ok(v),
            Value::Varchar(Some(ref v)) => Self::parse(v),
            ref v => v
                .as_i128()
                .map(|i| i != 0)
                .ok_or_else(|| mismatch::<Self>(v)),
        }
    }
    fn parse(input: impl AsRef<str>) -> Result<Self> {
        match input.as_ref().trim() {
            x if x.eq_ignore_ascii_case("true") || x == "1" => Ok(true),
            x if x.eq_ignore_ascii_case("false") || x == "0" => Ok(false),
            x => Err(Error::msg(format!(
                "Cannot parse boolean from `{}`",
                truncate_long!(x)
            ))),
        }
    }
}

impl AsValue for Decimal {
    fn as_empty_value() -> Value {
        Value::Decimal(None)
    }
    fn as_value(self) -> Value {
        Value::Decimal(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Decimal(Some(v)) => Ok(v),
            Value::Float32(Some(v)) => Decimal::from_f32(v).ok_or_else(|| mismatch::<Self>(&value)),
            Value::Float64(Some(v)) => Decimal::from_f64(v).ok_or_else(|| mismatch::<Self>(&value)),
            Value::Varchar(Some(ref v)) => Self::parse(v),
            ref v => v
                .as_i128()
                .and_then(Decimal::from_i128)
                .ok_or_else(|| mismatch::<Self>(v)),
        }
    }
    fn parse(input: impl AsRef<str>) -> Result<Self> {
        let input = input.as_ref().trim();
        Decimal::from_str_exact(input)
            .or_else(|_| Decimal::from_scientific(input))
            .map_err(|e| {
                let message = format!("Cannot parse `{}` as Decimal", truncate_long!(input));
                Error::new(e).context(message)
            })
    }
}

impl AsValue for String {
    fn as_empty_value() -> Value {
        Value::Varchar(None)
    }
    fn as_value(self) -> Value {
        Value::Varchar(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        Ok(match value {
            Value::Varchar(Some(v)) => v,
            Value::Boolean(Some(v)) => v.to_string(),
            Value::Float32(Some(v)) => ryu::Buffer::new().format(v).to_owned(),
            Value::Float64(Some(v)) => ryu::Buffer::new().format(v).to_owned(),
            Value::Decimal(Some(v)) => v.to_string(),
            Value::Uuid(Some(v)) => v.to_string(),
            ref v => match v.as_i128() {
                Some(i) => itoa::Buffer::new().format(i).to_owned(),
                None => return Err(mismatch::<Self>(v)),
            },
        })
    }
    fn parse(input: impl AsRef<str>) -> Result<Self> {
        Ok(input.as_ref().to_owned())
    }
}

impl AsValue for Box<[u8]> {
    fn as_empty_value() -> Value {
        Value::Blob(None)
    }
    fn as_value(self) -> Value {
        Value::Blob(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Blob(Some(v)) => Ok(v),
            Value::Uuid(Some(v)) => Ok(v.as_bytes().as_slice().into()),
            Value::Varchar(Some(ref v)) => Self::parse(v),
            ref v => Err(mismatch::<Self>(v)),
        }
    }
    /// Accepts hex text with an optional `0x` prefix.
    fn parse(input: impl AsRef<str>) -> Result<Self> {
        let input = input.as_ref().trim();
        let digits = input
            .strip_prefix("0x")
            .or_else(|| input.strip_prefix("0X"))
            .unwrap_or(input);
        hex::decode(digits)
            .map(Into::into)
            .map_err(|e| {
                let message = format!("Cannot parse `{}` as a blob", truncate_long!(input));
                Error::new(e).context(message)
            })
    }
}

impl AsValue for Uuid {
    fn as_empty_value() -> Value {
        Value::Uuid(None)
    }
    fn as_value(self) -> Value {
        Value::Uuid(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Uuid(Some(v)) => Ok(v),
            Value::Varchar(Some(ref v)) => Self::parse(v),
            Value::Blob(Some(ref v)) => Uuid::from_slice(v).map_err(Error::new),
            ref v => Err(mismatch::<Self>(v)),
        }
    }
    fn parse(input: impl AsRef<str>) -> Result<Self> {
        let input = input.as_ref().trim();
        Uuid::parse_str(input).map_err(|e| {
            let message = format!("Cannot parse `{}` as a uuid", truncate_long!(input));
            Error::new(e).context(message)
        })
    }
}

fn parse_temporal<T>(input: &str, formats: &[&str]) -> Result<T>
where
    T: TryFrom<Parsed, Error = time::error::TryFromParsed>,
{
    let input = input.trim();
    for format in formats {
        let format = parse_borrowed::<2>(format)?;
        let mut parsed = Parsed::new();
        if let Ok(remaining) = parsed.parse_items(input.as_bytes(), &format)
            && remaining.is_empty()
        {
            return Ok(parsed.try_into()?);
        }
    }
    Err(Error::msg(format!(
        "Cannot parse `{}` as {}",
        truncate_long!(input),
        any::type_name::<T>()
    )))
}

const DATE_FORMATS: &[&str] = &["[year]-[month]-[day]"];
const TIME_FORMATS: &[&str] = &[
    "[hour]:[minute]:[second].[subsecond]",
    "[hour]:[minute]:[second]",
    "[hour]:[minute]",
];
const TIMESTAMP_FORMATS: &[&str] = &[
    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]",
    "[year]-[month]-[day]T[hour]:[minute]:[second]",
    "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]",
    "[year]-[month]-[day] [hour]:[minute]:[second]",
    "[year]-[month]-[day] [hour]:[minute]",
];
const TIMESTAMPTZ_FORMATS: &[&str] = &[
    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond][offset_hour sign:mandatory]:[offset_minute]",
    "[year]-[month]-[day]T[hour]:[minute]:[second][offset_hour sign:mandatory]:[offset_minute]",
    "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond][offset_hour sign:mandatory]:[offset_minute]",
    "[year]-[month]-[day] [hour]:[minute]:[second][offset_hour sign:mandatory]:[offset_minute]",
];

impl AsValue for Date {
    fn as_empty_value() -> Value {
        Value::Date(None)
    }
    fn as_value(self) -> Value {
        Value::Date(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Date(Some(v)) => Ok(v),
            Value::Timestamp(Some(v)) => Ok(v.date()),
            Value::TimestampWithTimezone(Some(v)) => Ok(v.date()),
            Value::Varchar(Some(ref v)) => <Self as AsValue>::parse(v),
            ref v => Err(mismatch::<Self>(v)),
        }
    }
    fn parse(input: impl AsRef<str>) -> Result<Self> {
        parse_temporal(input.as_ref(), DATE_FORMATS)
    }
}

impl AsValue for Time {
    fn as_empty_value() -> Value {
        Value::Time(None)
    }
    fn as_value(self) -> Value {
        Value::Time(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Time(Some(v)) => Ok(v),
            Value::Timestamp(Some(v)) => Ok(v.time()),
            Value::Varchar(Some(ref v)) => <Self as AsValue>::parse(v),
            ref v => Err(mismatch::<Self>(v)),
        }
    }
    fn parse(input: impl AsRef<str>) -> Result<Self> {
        parse_temporal(input.as_ref(), TIME_FORMATS)
    }
}

impl AsValue for PrimitiveDateTime {
    fn as_empty_value() -> Value {
        Value::Timestamp(None)
    }
    fn as_value(self) -> Value {
        Value::Timestamp(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Timestamp(Some(v)) => Ok(v),
            Value::Date(Some(v)) => Ok(v.midnight()),
            Value::TimestampWithTimezone(Some(v)) => {
                Ok(PrimitiveDateTime::new(v.date(), v.time()))
            }
            Value::Varchar(Some(ref v)) => <Self as AsValue>::parse(v),
            ref v => Err(mismatch::<Self>(v)),
        }
    }
    fn parse(input: impl AsRef<str>) -> Result<Self> {
        parse_temporal(input.as_ref(), TIMESTAMP_FORMATS)
    }
}

impl AsValue for OffsetDateTime {
    fn as_empty_value() -> Value {
        Value::TimestampWithTimezone(None)
    }
    fn as_value(self) -> Value {
        Value::TimestampWithTimezone(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::TimestampWithTimezone(Some(v)) => Ok(v),
            Value::Timestamp(Some(v)) => Ok(v.assume_utc()),
            Value::Varchar(Some(ref v)) => <Self as AsValue>::parse(v),
            ref v => Err(mismatch::<Self>(v)),
        }
    }
    fn parse(input: impl AsRef<str>) -> Result<Self> {
        parse_temporal(input.as_ref(), TIMESTAMPTZ_FORMATS).or_else(|_| {
            <PrimitiveDateTime as AsValue>::parse(input.as_ref()).map(PrimitiveDateTime::assume_utc)
        })
    }
}

impl<T: AsValue> AsValue for Option<T> {
    fn as_empty_value() -> Value {
        T::as_empty_value()
    }
    fn as_value(self) -> Value {
        match self {
            Some(v) => v.as_value(),
            None => T::as_empty_value(),
        }
    }
    fn try_from_value(value: Value) -> Result<Self> {
        Ok(if value.is_null() {
            None
        } else {
            Some(T::try_from_value(value)?)
        })
    }
    fn parse(input: impl AsRef<str>) -> Result<Self> {
        if input.as_ref().trim().eq_ignore_ascii_case("null") {
            return Ok(None);
        }
        T::parse(input).map(Some)
    }
}

impl<T: AsValue> AsValue for Vec<T> {
    fn as_empty_value() -> Value {
        Value::List(None, Box::new(T::as_empty_value()))
    }
    fn as_value(self) -> Value {
        Value::List(
            Some(self.into_iter().map(AsValue::as_value).collect()),
            Box::new(T::as_empty_value()),
        )
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::List(Some(items), ..) => items.into_iter().map(T::try_from_value).collect(),
            ref v => Err(mismatch::<Self>(v)),
        }
    }
}
