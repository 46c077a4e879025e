//! Serde [Serializer] turning any `Serialize` type into a [Value] tree.
//!
//! The mapping follows Solidity's `abi.encode`:
//! - structs, tuples and Rust arrays become tuples (`T[N]` is encoded like a
//!   tuple of `N` elements),
//! - sequences (`Vec<T>`, `&[T]`, [as_dyn_array][super::as_dyn_array]) become
//!   dynamic arrays,
//! - [serialize_bytes][serde::Serializer::serialize_bytes] becomes fixed-size
//!   bytes (`bytes32`, ...),
//! - dynamic `bytes`, `address` and `uint256` are marked with newtype
//!   structs carrying one of the reserved names below.
//!
//! Floats, options, maps and enums are rejected, see
//! [Error::TypeNotRepresentable].

use serde::{
    ser::{self, Impossible},
    Serialize,
};

use super::{
    error::{Error, Result},
    types::{Address, U256},
    Value,
};

// The characters have no special meaning, they have just been chosen in a way
// that normal Rust types will never have these names.
pub(crate) const ADDRESS_NAME: &str = ":$&_ADDRESS";
pub(crate) const UINT_NAME: &str = ":$&_UINT256";
pub(crate) const BYTES_NAME: &str = ":$&_BYTES";

/// Wrapper allowing us to call `serialize_bytes` from places where only
/// `serialize_element`/`serialize_newtype_struct` is available.
pub(crate) struct RawBytes<'a>(pub &'a [u8]);

impl<'a> Serialize for RawBytes<'a> {
    fn serialize<S>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_bytes(self.0)
    }
}

/// Convert `value` into its ABI [Value] representation.
pub fn to_value<T>(value: &T) -> Result<Value>
where
    T: Serialize + ?Sized,
{
    value.serialize(Serializer)
}

pub struct Serializer;

impl ser::Serializer for Serializer {
    type Ok = Value;
    type Error = Error;

    type SerializeSeq = SeqBuilder;
    type SerializeTuple = SeqBuilder;
    type SerializeTupleStruct = SeqBuilder;
    type SerializeTupleVariant = Impossible<Value, Error>;
    type SerializeMap = Impossible<Value, Error>;
    type SerializeStruct = SeqBuilder;
    type SerializeStructVariant = Impossible<Value, Error>;

    fn serialize_bool(self, v: bool) -> Result<Value> {
        Ok(Value::Bool(v))
    }

    fn serialize_i8(self, v: i8) -> Result<Value> {
        self.serialize_i128(v.into())
    }

    fn serialize_i16(self, v: i16) -> Result<Value> {
        self.serialize_i128(v.into())
    }

    fn serialize_i32(self, v: i32) -> Result<Value> {
        self.serialize_i128(v.into())
    }

    fn serialize_i64(self, v: i64) -> Result<Value> {
        self.serialize_i128(v.into())
    }

    fn serialize_i128(self, v: i128) -> Result<Value> {
        Ok(Value::Int(v))
    }

    fn serialize_u8(self, v: u8) -> Result<Value> {
        self.serialize_u128(v.into())
    }

    fn serialize_u16(self, v: u16) -> Result<Value> {
        self.serialize_u128(v.into())
    }

    fn serialize_u32(self, v: u32) -> Result<Value> {
        self.serialize_u128(v.into())
    }

    fn serialize_u64(self, v: u64) -> Result<Value> {
        self.serialize_u128(v.into())
    }

    fn serialize_u128(self, v: u128) -> Result<Value> {
        Ok(Value::Uint(U256::from(v)))
    }

    fn serialize_f32(self, _: f32) -> Result<Value> {
        Err(Error::TypeNotRepresentable("f32"))
    }

    fn serialize_f64(self, _: f64) -> Result<Value> {
        Err(Error::TypeNotRepresentable("f64"))
    }

    fn serialize_char(self, _: char) -> Result<Value> {
        Err(Error::TypeNotYetSupported("char"))
    }

    fn serialize_str(self, v: &str) -> Result<Value> {
        Ok(Value::String(v.to_owned()))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<Value> {
        // The length is checked when encoding, `as_bytes` reuses this path for
        // arbitrary length data.
        Ok(Value::FixedBytes(v.to_vec()))
    }

    fn serialize_none(self) -> Result<Value> {
        Err(Error::TypeNotRepresentable("Option"))
    }

    fn serialize_some<T>(self, _: &T) -> Result<Value>
    where
        T: Serialize + ?Sized,
    {
        Err(Error::TypeNotRepresentable("Option"))
    }

    fn serialize_unit(self) -> Result<Value> {
        Err(Error::TypeNotRepresentable("()"))
    }

    fn serialize_unit_struct(self, _: &'static str) -> Result<Value> {
        Err(Error::TypeNotRepresentable("unit struct"))
    }

    fn serialize_unit_variant(self, _: &'static str, _: u32, _: &'static str) -> Result<Value> {
        Err(Error::TypeNotRepresentable("enum"))
    }

    fn serialize_newtype_struct<T>(self, name: &'static str, value: &T) -> Result<Value>
    where
        T: Serialize + ?Sized,
    {
        let inner = value.serialize(Serializer)?;
        match (name, inner) {
            (ADDRESS_NAME, Value::FixedBytes(b)) => Ok(Value::Address(Address::try_from(&b[..])?)),
            (UINT_NAME, Value::FixedBytes(b)) if b.len() == 32 => {
                Ok(Value::Uint(U256::from_big_endian(&b)))
            }
            (BYTES_NAME, Value::FixedBytes(b)) => Ok(Value::Bytes(b)),
            (ADDRESS_NAME | UINT_NAME | BYTES_NAME, _) => {
                Err(Error::InvalidData("malformed marker newtype"))
            }
            // Every other newtype is transparent.
            (_, inner) => Ok(inner),
        }
    }

    fn serialize_newtype_variant<T>(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: &T,
    ) -> Result<Value>
    where
        T: Serialize + ?Sized,
    {
        Err(Error::TypeNotRepresentable("enum"))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<SeqBuilder> {
        Ok(SeqBuilder::new(true, len.unwrap_or_default()))
    }

    fn serialize_tuple(self, len: usize) -> Result<SeqBuilder> {
        Ok(SeqBuilder::new(false, len))
    }

    fn serialize_tuple_struct(self, _: &'static str, len: usize) -> Result<SeqBuilder> {
        Ok(SeqBuilder::new(false, len))
    }

    fn serialize_tuple_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeTupleVariant> {
        Err(Error::TypeNotRepresentable("enum"))
    }

    fn serialize_map(self, _: Option<usize>) -> Result<Self::SerializeMap> {
        Err(Error::TypeNotRepresentable("map"))
    }

    fn serialize_struct(self, _: &'static str, len: usize) -> Result<SeqBuilder> {
        Ok(SeqBuilder::new(false, len))
    }

    fn serialize_struct_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeStructVariant> {
        Err(Error::TypeNotRepresentable("enum"))
    }
}

/// Collects the elements of sequences, tuples and structs.
pub struct SeqBuilder {
    dynamic: bool,
    items: Vec<Value>,
}

impl SeqBuilder {
    fn new(dynamic: bool, len: usize) -> Self {
        Self {
            dynamic,
            items: Vec::with_capacity(len),
        }
    }

    fn push<T>(&mut self, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.items.push(value.serialize(Serializer)?);
        Ok(())
    }

    fn finish(self) -> Value {
        if self.dynamic {
            Value::Array(self.items)
        } else {
            Value::Tuple(self.items)
        }
    }
}

impl ser::SerializeSeq for SeqBuilder {
    type Ok = Value;
    type Error = Error;

    fn serialize_element<T>(&mut self, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.push(value)
    }

    fn end(self) -> Result<Value> {
        Ok(self.finish())
    }
}

impl ser::SerializeTuple for SeqBuilder {
    type Ok = Value;
    type Error = Error;

    fn serialize_element<T>(&mut self, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.push(value)
    }

    fn end(self) -> Result<Value> {
        Ok(self.finish())
    }
}

impl ser::SerializeTupleStruct for SeqBuilder {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T>(&mut self, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.push(value)
    }

    fn end(self) -> Result<Value> {
        Ok(self.finish())
    }
}

impl ser::SerializeStruct for SeqBuilder {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T>(&mut self, _: &'static str, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.push(value)
    }

    fn end(self) -> Result<Value> {
        Ok(self.finish())
    }
}
