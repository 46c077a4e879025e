//! Parsing of Solidity type strings like `tuple(address to, uint256 amount)[]`
//! and checking [Value] trees against them.

use core::{fmt, str::FromStr};

use super::{
    error::{Error, Result},
    types::U256,
    Value,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbiType {
    Address,
    /// `uintN` with `N` in bits.
    Uint(usize),
    /// `intN` with `N` in bits, at most 128.
    Int(usize),
    Bool,
    /// `bytesN` with `N` in bytes.
    FixedBytes(usize),
    Bytes,
    String,
    Array(Box<AbiType>),
    FixedArray(Box<AbiType>, usize),
    Tuple(Vec<TupleField>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TupleField {
    pub name: Option<String>,
    pub ty: AbiType,
}

impl AbiType {
    pub fn is_dynamic(&self) -> bool {
        match self {
            AbiType::Bytes | AbiType::String | AbiType::Array(_) => true,
            AbiType::FixedArray(inner, _) => inner.is_dynamic(),
            AbiType::Tuple(fields) => fields.iter().any(|f| f.ty.is_dynamic()),
            _ => false,
        }
    }

    /// Number of bytes the type occupies in the head of its enclosing tuple.
    pub fn head_size(&self) -> usize {
        if self.is_dynamic() {
            return 32;
        }
        match self {
            AbiType::FixedArray(inner, n) => inner.head_size() * n,
            AbiType::Tuple(fields) => fields.iter().map(|f| f.ty.head_size()).sum(),
            _ => 32,
        }
    }

    /// Index of the named field of a tuple type.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        match self {
            AbiType::Tuple(fields) => fields
                .iter()
                .position(|f| f.name.as_deref() == Some(name)),
            _ => None,
        }
    }

    /// Check that `value` has exactly the shape (and value ranges) of this
    /// type.
    pub fn check(&self, value: &Value) -> Result<()> {
        let ok = match (self, value) {
            (AbiType::Address, Value::Address(_)) => true,
            (AbiType::Bool, Value::Bool(_)) => true,
            (AbiType::Bytes, Value::Bytes(_)) => true,
            (AbiType::String, Value::String(_)) => true,
            (AbiType::Uint(bits), Value::Uint(v)) => v.bits() <= *bits,
            (AbiType::Int(bits), Value::Int(v)) => {
                *bits >= 128 || {
                    let max = (1i128 << (bits - 1)) - 1;
                    (-max - 1..=max).contains(v)
                }
            }
            (AbiType::FixedBytes(n), Value::FixedBytes(b)) => b.len() == *n,
            (AbiType::Array(inner), Value::Array(items)) => {
                return items.iter().try_for_each(|v| inner.check(v));
            }
            (AbiType::FixedArray(inner, n), Value::Tuple(items)) if items.len() == *n => {
                return items.iter().try_for_each(|v| inner.check(v));
            }
            (AbiType::Tuple(fields), Value::Tuple(items)) if items.len() == fields.len() => {
                return fields
                    .iter()
                    .zip(items)
                    .try_for_each(|(f, v)| f.ty.check(v));
            }
            _ => false,
        };
        if ok {
            Ok(())
        } else {
            Err(Error::SchemaMismatch(self.to_string()))
        }
    }

    /// The all-zero value of this type (what `abi.decode` of zero bytes
    /// yields).
    pub fn zero_value(&self) -> Value {
        match self {
            AbiType::Address => Value::Address(Default::default()),
            AbiType::Uint(_) => Value::Uint(U256::zero()),
            AbiType::Int(_) => Value::Int(0),
            AbiType::Bool => Value::Bool(false),
            AbiType::FixedBytes(n) => Value::FixedBytes(vec![0; *n]),
            AbiType::Bytes => Value::Bytes(Vec::new()),
            AbiType::String => Value::String(String::new()),
            AbiType::Array(_) => Value::Array(Vec::new()),
            AbiType::FixedArray(inner, n) => Value::Tuple(vec![inner.zero_value(); *n]),
            AbiType::Tuple(fields) => Value::Tuple(fields.iter().map(|f| f.ty.zero_value()).collect()),
        }
    }
}

impl fmt::Display for AbiType {
    /// Canonical form, without field names (as used for function selectors).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbiType::Address => f.write_str("address"),
            AbiType::Uint(bits) => write!(f, "uint{}", bits),
            AbiType::Int(bits) => write!(f, "int{}", bits),
            AbiType::Bool => f.write_str("bool"),
            AbiType::FixedBytes(n) => write!(f, "bytes{}", n),
            AbiType::Bytes => f.write_str("bytes"),
            AbiType::String => f.write_str("string"),
            AbiType::Array(inner) => write!(f, "{}[]", inner),
            AbiType::FixedArray(inner, n) => write!(f, "{}[{}]", inner, n),
            AbiType::Tuple(fields) => {
                f.write_str("(")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", field.ty)?;
                }
                f.write_str(")")
            }
        }
    }
}

impl FromStr for AbiType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parser = Parser { src: s, pos: 0 };
        let ty = parser.parse_type()?;
        parser.skip_ws();
        if parser.pos != s.len() {
            return Err(Error::InvalidSchema(s.to_owned()));
        }
        Ok(ty)
    }
}

/// Recursive descent parser over the type string.
///
/// ```text
/// type   := base ("[" digits? "]")*
/// base   := ("tuple")? "(" (param ("," param)*)? ")" | elementary
/// param  := type ident?
/// ```
struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn err(&self) -> Error {
        Error::InvalidSchema(self.src.to_owned())
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.src.len() - trimmed.len();
    }

    fn eat(&mut self, c: char) -> bool {
        self.skip_ws();
        if self.rest().starts_with(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn ident(&mut self) -> Option<&'a str> {
        self.skip_ws();
        let rest = self.rest();
        let len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '$'))
            .unwrap_or(rest.len());
        if len == 0 {
            return None;
        }
        self.pos += len;
        Some(&rest[..len])
    }

    fn parse_type(&mut self) -> Result<AbiType> {
        self.skip_ws();
        let mut ty = if self.rest().starts_with('(') || self.rest().starts_with("tuple(") {
            if self.rest().starts_with("tuple") {
                self.pos += "tuple".len();
            }
            self.parse_tuple()?
        } else {
            let name = self.ident().ok_or_else(|| self.err())?;
            elementary(name).ok_or_else(|| self.err())?
        };

        while self.eat('[') {
            self.skip_ws();
            let rest = self.rest();
            let len = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
            ty = if len == 0 {
                AbiType::Array(Box::new(ty))
            } else {
                let n = rest[..len].parse().map_err(|_| self.err())?;
                self.pos += len;
                AbiType::FixedArray(Box::new(ty), n)
            };
            if !self.eat(']') {
                return Err(self.err());
            }
        }
        Ok(ty)
    }

    fn parse_tuple(&mut self) -> Result<AbiType> {
        if !self.eat('(') {
            return Err(self.err());
        }
        let mut fields = Vec::new();
        if self.eat(')') {
            return Ok(AbiType::Tuple(fields));
        }
        loop {
            let ty = self.parse_type()?;
            self.skip_ws();
            let name = if self.rest().starts_with([',', ')']) {
                None
            } else {
                Some(self.ident().ok_or_else(|| self.err())?.to_owned())
            };
            fields.push(TupleField { name, ty });
            if self.eat(')') {
                return Ok(AbiType::Tuple(fields));
            }
            if !self.eat(',') {
                return Err(self.err());
            }
        }
    }
}

fn elementary(name: &str) -> Option<AbiType> {
    match name {
        "address" => return Some(AbiType::Address),
        "bool" => return Some(AbiType::Bool),
        "bytes" => return Some(AbiType::Bytes),
        "string" => return Some(AbiType::String),
        "uint" => return Some(AbiType::Uint(256)),
        // int256 does not fit the i128 backing `Value::Int`.
        "int" => return None,
        _ => {}
    }

    let sized = |prefix: &str| -> Option<usize> { name.strip_prefix(prefix)?.parse().ok() };
    if let Some(bits) = sized("uint") {
        return (bits % 8 == 0 && (8..=256).contains(&bits)).then_some(AbiType::Uint(bits));
    }
    if let Some(bits) = sized("int") {
        return (bits % 8 == 0 && (8..=128).contains(&bits)).then_some(AbiType::Int(bits));
    }
    if let Some(n) = sized("bytes") {
        return (1..=32).contains(&n).then_some(AbiType::FixedBytes(n));
    }
    None
}
