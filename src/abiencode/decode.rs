//! Decoding of ABI bytes into [Value] trees, guided by an [AbiType].
//!
//! The decoder is strict: padding must be zero, booleans must be 0 or 1 and
//! every offset and length must stay within the input.

use super::{
    encode::SLOT_SIZE,
    error::{Error, Result},
    schema::AbiType,
    types::{Address, U256},
    Value,
};

/// Inverse of [encode][super::encode].
pub fn decode(data: &[u8], ty: &AbiType) -> Result<Value> {
    if ty.is_dynamic() {
        let offset = read_usize(data, 0)?;
        decode_at(data, offset, ty)
    } else {
        decode_at(data, 0, ty)
    }
}

fn slot(data: &[u8], at: usize) -> Result<&[u8]> {
    let end = at.checked_add(SLOT_SIZE).ok_or(Error::UnexpectedEnd)?;
    data.get(at..end).ok_or(Error::UnexpectedEnd)
}

fn read_usize(data: &[u8], at: usize) -> Result<usize> {
    let word = slot(data, at)?;
    if word[..SLOT_SIZE - 8].iter().any(|b| *b != 0) {
        return Err(Error::InvalidData("offset or length out of range"));
    }
    let mut be = [0u8; 8];
    be.copy_from_slice(&word[SLOT_SIZE - 8..]);
    usize::try_from(u64::from_be_bytes(be)).map_err(|_| Error::InvalidData("offset or length out of range"))
}

fn read_padded(data: &[u8], at: usize, len: usize) -> Result<Vec<u8>> {
    let end = at.checked_add(len).ok_or(Error::UnexpectedEnd)?;
    let bytes = data.get(at..end).ok_or(Error::UnexpectedEnd)?;
    Ok(bytes.to_vec())
}

fn decode_at(data: &[u8], at: usize, ty: &AbiType) -> Result<Value> {
    match ty {
        AbiType::Address => {
            let word = slot(data, at)?;
            if word[..12].iter().any(|b| *b != 0) {
                return Err(Error::InvalidData("dirty address padding"));
            }
            Ok(Value::Address(Address::try_from(&word[12..])?))
        }
        AbiType::Uint(_) => {
            let value = Value::Uint(U256::from_big_endian(slot(data, at)?));
            ty.check(&value)?;
            Ok(value)
        }
        AbiType::Int(_) => {
            let word = slot(data, at)?;
            let mut low = [0u8; 16];
            low.copy_from_slice(&word[16..]);
            let v = i128::from_be_bytes(low);
            let fill = if v < 0 { 0xff } else { 0 };
            if word[..16].iter().any(|b| *b != fill) {
                return Err(Error::InvalidData("int out of range"));
            }
            let value = Value::Int(v);
            ty.check(&value)?;
            Ok(value)
        }
        AbiType::Bool => match read_usize(data, at) {
            Ok(0) => Ok(Value::Bool(false)),
            Ok(1) => Ok(Value::Bool(true)),
            Ok(_) | Err(Error::InvalidData(_)) => Err(Error::InvalidData("bool is neither 0 nor 1")),
            Err(e) => Err(e),
        },
        AbiType::FixedBytes(n) => {
            let word = slot(data, at)?;
            if word[*n..].iter().any(|b| *b != 0) {
                return Err(Error::InvalidData("dirty bytes padding"));
            }
            Ok(Value::FixedBytes(word[..*n].to_vec()))
        }
        AbiType::Bytes => {
            let len = read_usize(data, at)?;
            Ok(Value::Bytes(read_padded(data, at + SLOT_SIZE, len)?))
        }
        AbiType::String => {
            let len = read_usize(data, at)?;
            let bytes = read_padded(data, at + SLOT_SIZE, len)?;
            String::from_utf8(bytes)
                .map(Value::String)
                .map_err(|_| Error::InvalidData("string is not utf-8"))
        }
        AbiType::Array(inner) => {
            let len = read_usize(data, at)?;
            // Every element needs at least one slot, this bounds allocations
            // for hostile lengths.
            if len > data.len() / SLOT_SIZE {
                return Err(Error::UnexpectedEnd);
            }
            let types = core::iter::repeat(inner.as_ref()).take(len);
            decode_sequence(data, at + SLOT_SIZE, types).map(Value::Array)
        }
        AbiType::FixedArray(inner, n) => {
            let types = core::iter::repeat(inner.as_ref()).take(*n);
            decode_sequence(data, at, types).map(Value::Tuple)
        }
        AbiType::Tuple(fields) => {
            decode_sequence(data, at, fields.iter().map(|f| &f.ty)).map(Value::Tuple)
        }
    }
}

fn decode_sequence<'t>(
    data: &[u8],
    base: usize,
    types: impl Iterator<Item = &'t AbiType>,
) -> Result<Vec<Value>> {
    let mut pos = base;
    let mut values = Vec::new();
    for ty in types {
        if ty.is_dynamic() {
            let offset = read_usize(data, pos)?;
            let at = base.checked_add(offset).ok_or(Error::UnexpectedEnd)?;
            values.push(decode_at(data, at, ty)?);
        } else {
            values.push(decode_at(data, pos, ty)?);
        }
        pos += ty.head_size();
    }
    Ok(values)
}
