//! ABI-style encoding of opaque transfer payloads.
//!
//! Transfer state and resolver values travel through the protocol as
//! structured JSON accompanied by a Solidity type string such as
//! `tuple(bytes32 lockHash, uint256 expiry)`. This module parses those
//! strings into a schema, coerces the JSON against it, and produces the exact
//! byte encoding the on-chain predicate contracts consume.
//!
//! Field names inside tuples are significant: JSON objects are coerced by
//! name, JSON arrays positionally. The underlying value model is
//! [`alloy_dyn_abi`]'s [`DynSolValue`].

use alloy_dyn_abi::{DynSolType, DynSolValue};
use alloy_primitives::{Address, B256, Bytes, I256, U256, keccak256};
use serde_json::Value;

/// Errors produced while parsing encodings or coercing payloads.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("malformed encoding string {encoding:?}: {reason}")]
    MalformedEncoding { encoding: String, reason: String },
    #[error("payload does not match encoding at {path}: {reason}")]
    SchemaMismatch { path: String, reason: String },
}

impl CodecError {
    fn mismatch(path: &str, reason: impl Into<String>) -> Self {
        CodecError::SchemaMismatch {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

/// A parsed encoding string: the ABI type plus tuple field names.
#[derive(Debug, Clone, PartialEq)]
pub enum Schema {
    Tuple(Vec<(Option<String>, Schema)>),
    Array(Box<Schema>),
    FixedArray(Box<Schema>, usize),
    Primitive(DynSolType),
}

impl Schema {
    /// Parses a Solidity-style type string, keeping tuple field names.
    pub fn parse(encoding: &str) -> Result<Self, CodecError> {
        let mut parser = SchemaParser {
            input: encoding,
            pos: 0,
        };
        let schema = parser.parse_type().map_err(|reason| {
            CodecError::MalformedEncoding {
                encoding: encoding.to_string(),
                reason,
            }
        })?;
        parser.skip_ws();
        if parser.pos != parser.input.len() {
            return Err(CodecError::MalformedEncoding {
                encoding: encoding.to_string(),
                reason: format!("trailing input at byte {}", parser.pos),
            });
        }
        Ok(schema)
    }

    /// The [`DynSolType`] this schema describes, names erased.
    pub fn sol_type(&self) -> DynSolType {
        match self {
            Schema::Tuple(fields) => {
                DynSolType::Tuple(fields.iter().map(|(_, s)| s.sol_type()).collect())
            }
            Schema::Array(elem) => DynSolType::Array(Box::new(elem.sol_type())),
            Schema::FixedArray(elem, len) => {
                DynSolType::FixedArray(Box::new(elem.sol_type()), *len)
            }
            Schema::Primitive(ty) => ty.clone(),
        }
    }

    /// Coerces a JSON payload into a [`DynSolValue`] guided by this schema.
    pub fn coerce(&self, value: &Value) -> Result<DynSolValue, CodecError> {
        self.coerce_at(value, "$")
    }

    fn coerce_at(&self, value: &Value, path: &str) -> Result<DynSolValue, CodecError> {
        match self {
            Schema::Tuple(fields) => {
                let mut out = Vec::with_capacity(fields.len());
                match value {
                    Value::Object(map) => {
                        for (name, field) in fields {
                            let name = name.as_deref().ok_or_else(|| {
                                CodecError::mismatch(path, "tuple field has no name")
                            })?;
                            let child = map.get(name).ok_or_else(|| {
                                CodecError::mismatch(path, format!("missing field {name:?}"))
                            })?;
                            out.push(field.coerce_at(child, &format!("{path}.{name}"))?);
                        }
                    }
                    Value::Array(items) => {
                        if items.len() != fields.len() {
                            return Err(CodecError::mismatch(
                                path,
                                format!("expected {} tuple items, got {}", fields.len(), items.len()),
                            ));
                        }
                        for (i, ((_, field), item)) in fields.iter().zip(items).enumerate() {
                            out.push(field.coerce_at(item, &format!("{path}[{i}]"))?);
                        }
                    }
                    other => {
                        return Err(CodecError::mismatch(
                            path,
                            format!("expected object or array for tuple, got {other}"),
                        ));
                    }
                }
                Ok(DynSolValue::Tuple(out))
            }
            Schema::Array(elem) => {
                let items = value.as_array().ok_or_else(|| {
                    CodecError::mismatch(path, "expected array")
                })?;
                let coerced = items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| elem.coerce_at(item, &format!("{path}[{i}]")))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(DynSolValue::Array(coerced))
            }
            Schema::FixedArray(elem, len) => {
                let items = value.as_array().ok_or_else(|| {
                    CodecError::mismatch(path, "expected array")
                })?;
                if items.len() != *len {
                    return Err(CodecError::mismatch(
                        path,
                        format!("expected {len} items, got {}", items.len()),
                    ));
                }
                let coerced = items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| elem.coerce_at(item, &format!("{path}[{i}]")))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(DynSolValue::FixedArray(coerced))
            }
            Schema::Primitive(ty) => coerce_primitive(ty, value, path),
        }
    }
}

fn coerce_primitive(ty: &DynSolType, value: &Value, path: &str) -> Result<DynSolValue, CodecError> {
    match ty {
        DynSolType::Bool => value
            .as_bool()
            .map(DynSolValue::Bool)
            .ok_or_else(|| CodecError::mismatch(path, "expected bool")),
        DynSolType::Address => {
            let s = expect_str(value, path)?;
            let address: Address = s
                .parse()
                .map_err(|e| CodecError::mismatch(path, format!("bad address: {e}")))?;
            Ok(DynSolValue::Address(address))
        }
        DynSolType::Uint(bits) => {
            let parsed = match value {
                Value::String(s) => parse_u256(s, path)?,
                Value::Number(n) => n
                    .as_u64()
                    .map(U256::from)
                    .ok_or_else(|| CodecError::mismatch(path, "expected unsigned integer"))?,
                _ => return Err(CodecError::mismatch(path, "expected uint as string or number")),
            };
            Ok(DynSolValue::Uint(parsed, *bits))
        }
        DynSolType::Int(bits) => {
            let parsed = match value {
                Value::String(s) => I256::from_dec_str(s)
                    .map_err(|e| CodecError::mismatch(path, format!("bad int: {e}")))?,
                Value::Number(n) => n
                    .as_i64()
                    .map(I256::try_from)
                    .and_then(Result::ok)
                    .ok_or_else(|| CodecError::mismatch(path, "expected signed integer"))?,
                _ => return Err(CodecError::mismatch(path, "expected int as string or number")),
            };
            Ok(DynSolValue::Int(parsed, *bits))
        }
        DynSolType::FixedBytes(size) => {
            let bytes = expect_hex(value, path)?;
            if bytes.len() != *size {
                return Err(CodecError::mismatch(
                    path,
                    format!("expected {size} bytes, got {}", bytes.len()),
                ));
            }
            let mut word = [0u8; 32];
            word[..*size].copy_from_slice(&bytes);
            Ok(DynSolValue::FixedBytes(word.into(), *size))
        }
        DynSolType::Bytes => Ok(DynSolValue::Bytes(expect_hex(value, path)?)),
        DynSolType::String => Ok(DynSolValue::String(expect_str(value, path)?.to_string())),
        other => Err(CodecError::mismatch(
            path,
            format!("unsupported primitive {other}"),
        )),
    }
}

fn expect_str<'a>(value: &'a Value, path: &str) -> Result<&'a str, CodecError> {
    value
        .as_str()
        .ok_or_else(|| CodecError::mismatch(path, "expected string"))
}

fn expect_hex(value: &Value, path: &str) -> Result<Vec<u8>, CodecError> {
    let s = expect_str(value, path)?;
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(stripped).map_err(|e| CodecError::mismatch(path, format!("bad hex: {e}")))
}

fn parse_u256(s: &str, path: &str) -> Result<U256, CodecError> {
    if let Some(stripped) = s.strip_prefix("0x") {
        U256::from_str_radix(stripped, 16)
    } else {
        U256::from_str_radix(s, 10)
    }
    .map_err(|e| CodecError::mismatch(path, format!("bad uint: {e}")))
}

struct SchemaParser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> SchemaParser<'a> {
    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn skip_ws(&mut self) {
        while self.rest().starts_with(' ') {
            self.pos += 1;
        }
    }

    fn parse_type(&mut self) -> Result<Schema, String> {
        self.skip_ws();
        let base = if self.rest().starts_with("tuple(") || self.rest().starts_with('(') {
            self.parse_tuple()?
        } else {
            self.parse_primitive()?
        };
        self.parse_suffixes(base)
    }

    fn parse_tuple(&mut self) -> Result<Schema, String> {
        if self.rest().starts_with("tuple(") {
            self.pos += "tuple(".len();
        } else {
            self.pos += 1; // '('
        }
        let mut fields = Vec::new();
        loop {
            self.skip_ws();
            if self.rest().starts_with(')') {
                self.pos += 1;
                break;
            }
            let field = self.parse_type()?;
            let name = self.parse_field_name();
            fields.push((name, field));
            self.skip_ws();
            if self.rest().starts_with(',') {
                self.pos += 1;
            } else if !self.rest().starts_with(')') {
                return Err(format!("expected ',' or ')' at byte {}", self.pos));
            }
        }
        if fields.is_empty() {
            return Err("empty tuple".to_string());
        }
        Ok(Schema::Tuple(fields))
    }

    fn parse_field_name(&mut self) -> Option<String> {
        self.skip_ws();
        let rest = self.rest();
        let end = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        if end == 0 {
            return None;
        }
        let word = &rest[..end];
        // `indexed`, `calldata` etc. never show up in registry encodings;
        // a single trailing identifier is the field name.
        self.pos += end;
        Some(word.to_string())
    }

    fn parse_primitive(&mut self) -> Result<Schema, String> {
        let rest = self.rest();
        let end = rest
            .find(|c: char| !(c.is_ascii_alphanumeric()))
            .unwrap_or(rest.len());
        if end == 0 {
            return Err(format!("expected type at byte {}", self.pos));
        }
        let word = &rest[..end];
        let ty: DynSolType = word
            .parse()
            .map_err(|e| format!("unknown type {word:?}: {e}"))?;
        self.pos += end;
        Ok(Schema::Primitive(ty))
    }

    fn parse_suffixes(&mut self, mut schema: Schema) -> Result<Schema, String> {
        loop {
            if self.rest().starts_with("[]") {
                self.pos += 2;
                schema = Schema::Array(Box::new(schema));
            } else if self.rest().starts_with('[') {
                let close = self
                    .rest()
                    .find(']')
                    .ok_or_else(|| format!("unclosed '[' at byte {}", self.pos))?;
                let len: usize = self.rest()[1..close]
                    .parse()
                    .map_err(|_| format!("bad array length at byte {}", self.pos))?;
                self.pos += close + 1;
                schema = Schema::FixedArray(Box::new(schema), len);
            } else {
                return Ok(schema);
            }
        }
    }
}

/// ABI-encodes a JSON payload against an encoding string.
pub fn encode_payload(encoding: &str, value: &Value) -> Result<Bytes, CodecError> {
    let schema = Schema::parse(encoding)?;
    Ok(schema.coerce(value)?.abi_encode().into())
}

/// Validates a JSON payload against an encoding string without encoding it.
pub fn check_payload(encoding: &str, value: &Value) -> Result<(), CodecError> {
    Schema::parse(encoding)?.coerce(value).map(|_| ())
}

/// The initial-state hash of a transfer: keccak of the ABI-encoded state.
pub fn hash_transfer_state(state: &Value, state_encoding: &str) -> Result<B256, CodecError> {
    Ok(keccak256(encode_payload(state_encoding, state)?))
}
