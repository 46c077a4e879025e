//! Standard (non-packed) Solidity ABI encoding of [Value] trees.
//!
//! Static values are written in place (the Head). Dynamic values write an
//! offset into the Head and their content into the Tail, which follows after
//! all Heads of the enclosing tuple.

use super::{
    error::{Error, Result},
    Value,
};

pub(crate) const SLOT_SIZE: usize = 32;

/// Equivalent of `abi.encode(value)`.
///
/// Dynamic values are preceded by the offset `0x20`, as Solidity does when
/// encoding a single dynamic struct.
pub fn encode(value: &Value) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    if value.is_dynamic() {
        encode_sequence(core::slice::from_ref(value), &mut out)?;
    } else {
        encode_into(value, &mut out)?;
    }
    Ok(out)
}

/// Encoding of a list of function arguments (without selector), i.e. like a
/// tuple but without the leading offset.
pub fn encode_params(values: &[Value]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    encode_sequence(values, &mut out)?;
    Ok(out)
}

fn head_size(value: &Value) -> usize {
    match value {
        Value::Tuple(items) if !value.is_dynamic() => items.iter().map(head_size).sum(),
        _ => SLOT_SIZE,
    }
}

fn write_usize(n: usize, out: &mut Vec<u8>) {
    let mut slot = [0u8; SLOT_SIZE];
    slot[SLOT_SIZE - 8..].copy_from_slice(&(n as u64).to_be_bytes());
    out.extend_from_slice(&slot);
}

fn write_padded(data: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(data);
    let rem = data.len() % SLOT_SIZE;
    if rem != 0 {
        out.resize(out.len() + SLOT_SIZE - rem, 0);
    }
}

fn encode_into(value: &Value, out: &mut Vec<u8>) -> Result<()> {
    match value {
        Value::Address(a) => {
            out.extend_from_slice(&[0; 12]);
            out.extend_from_slice(&a.0);
        }
        Value::Uint(v) => out.extend_from_slice(&v.to_be_bytes()),
        Value::Int(v) => {
            // Sign extension to 256 bits
            let fill = if *v < 0 { 0xff } else { 0 };
            out.extend_from_slice(&[fill; 16]);
            out.extend_from_slice(&v.to_be_bytes());
        }
        Value::Bool(b) => write_usize(*b as usize, out),
        Value::FixedBytes(b) => {
            if b.len() > SLOT_SIZE {
                return Err(Error::FixedBytesTooLong(b.len()));
            }
            let mut slot = [0u8; SLOT_SIZE];
            slot[..b.len()].copy_from_slice(b);
            out.extend_from_slice(&slot);
        }
        Value::Bytes(b) => {
            write_usize(b.len(), out);
            write_padded(b, out);
        }
        Value::String(s) => {
            write_usize(s.len(), out);
            write_padded(s.as_bytes(), out);
        }
        Value::Array(items) => {
            write_usize(items.len(), out);
            encode_sequence(items, out)?;
        }
        Value::Tuple(items) => encode_sequence(items, out)?,
    }
    Ok(())
}

fn encode_sequence(items: &[Value], out: &mut Vec<u8>) -> Result<()> {
    let heads: usize = items.iter().map(head_size).sum();
    let mut tail = Vec::new();
    for item in items {
        if item.is_dynamic() {
            write_usize(heads + tail.len(), out);
            encode_into(item, &mut tail)?;
        } else {
            encode_into(item, out)?;
        }
    }
    out.extend_from_slice(&tail);
    Ok(())
}
