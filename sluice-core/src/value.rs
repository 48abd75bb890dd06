use crate::{AsValue, Error, Result};
use rust_decimal::{Decimal, prelude::ToPrimitive};
use std::mem;
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time};
use uuid::Uuid;

/// Dynamically typed column or parameter value.
///
/// Every variant but `Null` carries an `Option`: `None` is a typed NULL, which is what
/// record field prototypes and nullable columns use.
#[derive(Default, Debug, Clone)]
pub enum Value {
    #[default]
    Null,
    Boolean(Option<bool>),
    Int8(Option<i8>),
    Int16(Option<i16>),
    Int32(Option<i32>),
    Int64(Option<i64>),
    UInt8(Option<u8>),
    UInt16(Option<u16>),
    UInt32(Option<u32>),
    UInt64(Option<u64>),
    Float32(Option<f32>),
    Float64(Option<f64>),
    Decimal(Option<Decimal>),
    Varchar(Option<String>),
    Blob(Option<Box<[u8]>>),
    Date(Option<Date>),
    Time(Option<Time>),
    Timestamp(Option<PrimitiveDateTime>),
    TimestampWithTimezone(Option<OffsetDateTime>),
    Uuid(Option<Uuid>),
    /// Collection argument, expanded into one placeholder per element when bound.
    List(Option<Vec<Value>>, /* type: */ Box<Value>),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Boolean(l), Self::Boolean(r)) => l == r,
            (Self::Int8(l), Self::Int8(r)) => l == r,
            (Self::Int16(l), Self::Int16(r)) => l == r,
            (Self::Int32(l), Self::Int32(r)) => l == r,
            (Self::Int64(l), Self::Int64(r)) => l == r,
            (Self::UInt8(l), Self::UInt8(r)) => l == r,
            (Self::UInt16(l), Self::UInt16(r)) => l == r,
            (Self::UInt32(l), Self::UInt32(r)) => l == r,
            (Self::UInt64(l), Self::UInt64(r)) => l == r,
            (Self::Float32(l), Self::Float32(r)) => l == r,
            (Self::Float64(l), Self::Float64(r)) => l == r,
            (Self::Decimal(l), Self::Decimal(r)) => l == r,
            (Self::Varchar(l), Self::Varchar(r)) => l == r,
            (Self::Blob(l), Self::Blob(r)) => l == r,
            (Self::Date(l), Self::Date(r)) => l == r,
            (Self::Time(l), Self::Time(r)) => l == r,
            (Self::Timestamp(l), Self::Timestamp(r)) => l == r,
            (Self::TimestampWithTimezone(l), Self::TimestampWithTimezone(r)) => l == r,
            (Self::Uuid(l), Self::Uuid(r)) => l == r,
            (Self::List(l, ..), Self::List(r, ..)) => l == r && self.same_type(other),
            _ => mem::discriminant(self) == mem::discriminant(other),
        }
    }
}

impl Value {
    pub fn same_type(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::List(.., l), Self::List(.., r)) => l.same_type(r),
            _ => mem::discriminant(self) == mem::discriminant(other),
        }
    }

    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Boolean(v) => v.is_none(),
            Value::Int8(v) => v.is_none(),
            Value::Int16(v) => v.is_none(),
            Value::Int32(v) => v.is_none(),
            Value::Int64(v) => v.is_none(),
            Value::UInt8(v) => v.is_none(),
            Value::UInt16(v) => v.is_none(),
            Value::UInt32(v) => v.is_none(),
            Value::UInt64(v) => v.is_none(),
            Value::Float32(v) => v.is_none(),
            Value::Float64(v) => v.is_none(),
            Value::Decimal(v) => v.is_none(),
            Value::Varchar(v) => v.is_none(),
            Value::Blob(v) => v.is_none(),
            Value::Date(v) => v.is_none(),
            Value::Time(v) => v.is_none(),
            Value::Timestamp(v) => v.is_none(),
            Value::TimestampWithTimezone(v) => v.is_none(),
            Value::Uuid(v) => v.is_none(),
            Value::List(v, ..) => v.is_none(),
        }
    }

    /// The typed NULL of the same variant.
    pub fn as_null(&self) -> Value {
        match self {
            Value::Null => Value::Null,
            Value::Boolean(..) => Value::Boolean(None),
            Value::Int8(..) => Value::Int8(None),
            Value::Int16(..) => Value::Int16(None),
            Value::Int32(..) => Value::Int32(None),
            Value::Int64(..) => Value::Int64(None),
            Value::UInt8(..) => Value::UInt8(None),
            Value::UInt16(..) => Value::UInt16(None),
            Value::UInt32(..) => Value::UInt32(None),
            Value::UInt64(..) => Value::UInt64(None),
            Value::Float32(..) => Value::Float32(None),
            Value::Float64(..) => Value::Float64(None),
            Value::Decimal(..) => Value::Decimal(None),
            Value::Varchar(..) => Value::Varchar(None),
            Value::Blob(..) => Value::Blob(None),
            Value::Date(..) => Value::Date(None),
            Value::Time(..) => Value::Time(None),
            Value::Timestamp(..) => Value::Timestamp(None),
            Value::TimestampWithTimezone(..) => Value::TimestampWithTimezone(None),
            Value::Uuid(..) => Value::Uuid(None),
            Value::List(.., ty) => Value::List(None, ty.clone()),
        }
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, Value::List(..))
    }

    /// Widened integer view of any integral variant, used by the range-checked conversions.
    pub fn as_i128(&self) -> Option<i128> {
        Some(match *self {
            Value::Int8(Some(v)) => v as _,
            Value::Int16(Some(v)) => v as _,
            Value::Int32(Some(v)) => v as _,
            Value::Int64(Some(v)) => v as _,
            Value::UInt8(Some(v)) => v as _,
            Value::UInt16(Some(v)) => v as _,
            Value::UInt32(Some(v)) => v as _,
            Value::UInt64(Some(v)) => v as _,
            Value::Boolean(Some(v)) => v as _,
            Value::Decimal(Some(v)) if v.is_integer() => v.to_i128()?,
            _ => return None,
        })
    }

    /// Converts the value into the variant of `prototype`.
    ///
    /// NULL of any kind becomes the typed NULL of the prototype. Values of the same
    /// variant pass through untouched, everything else goes through the destination
    /// type's [`AsValue::try_from_value`].
    pub fn coerce_to(self, prototype: &Value) -> Result<Value> {
        if self.is_null() {
            return Ok(prototype.as_null());
        }
        if self.same_type(prototype) {
            return Ok(self);
        }
        Ok(match prototype {
            Value::Null => self,
            Value::Boolean(..) => bool::try_from_value(self)?.as_value(),
            Value::Int8(..) => i8::try_from_value(self)?.as_value(),
            Value::Int16(..) => i16::try_from_value(self)?.as_value(),
            Value::Int32(..) => i32::try_from_value(self)?.as_value(),
            Value::Int64(..) => i64::try_from_value(self)?.as_value(),
            Value::UInt8(..) => u8::try_from_value(self)?.as_value(),
            Value::UInt16(..) => u16::try_from_value(self)?.as_value(),
            Value::UInt32(..) => u32::try_from_value(self)?.as_value(),
            Value::UInt64(..) => u64::try_from_value(self)?.as_value(),
            Value::Float32(..) => f32::try_from_value(self)?.as_value(),
            Value::Float64(..) => f64::try_from_value(self)?.as_value(),
            Value::Decimal(..) => Decimal::try_from_value(self)?.as_value(),
            Value::Varchar(..) => String::try_from_value(self)?.as_value(),
            Value::Blob(..) => Box::<[u8]>::try_from_value(self)?.as_value(),
            Value::Date(..) => Date::try_from_value(self)?.as_value(),
            Value::Time(..) => Time::try_from_value(self)?.as_value(),
            Value::Timestamp(..) => PrimitiveDateTime::try_from_value(self)?.as_value(),
            Value::TimestampWithTimezone(..) => OffsetDateTime::try_from_value(self)?.as_value(),
            Value::Uuid(..) => Uuid::try_from_value(self)?.as_value(),
            Value::List(.., ty) => match self {
                Value::List(Some(items), ..) => Value::List(
                    Some(
                        items
                            .into_iter()
                            .map(|v| v.coerce_to(ty))
                            .collect::<Result<_>>()?,
                    ),
                    ty.clone(),
                ),
                other => {
                    return Err(Error::msg(format!(
                        "Cannot convert {other:?} into a list of {ty:?}"
                    )));
                }
            },
        })
    }
}
