// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Positional access to the arguments of a call. A request body is a JSON array; each element
//! is one argument, coerced to a concrete type only when the handler asks for it.

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    #[error("request body is not a JSON array: {0}")]
    MalformedBody(String),
    #[error("argument {index} out of range, request has {len} arguments")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("argument {index}: expected {expected}, found {found}")]
    TypeMismatch {
        index: usize,
        expected: &'static str,
        found: &'static str,
    },
    #[error("could not decode {}: {reason}", describe_index(.index))]
    Decode {
        index: Option<usize>,
        reason: String,
    },
}

fn describe_index(index: &Option<usize>) -> String {
    match index {
        Some(index) => format!("argument {index}"),
        None => "arguments".to_string(),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// The decoded argument list of a request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Form {
    args: Vec<Value>,
}

impl Form {
    pub fn new(args: Vec<Value>) -> Self {
        Self { args }
    }

    /// Decode a request body. Anything other than a JSON array is rejected.
    pub fn parse(body: &[u8]) -> Result<Self, FormError> {
        match serde_json::from_slice::<Value>(body) {
            Ok(Value::Array(args)) => Ok(Self { args }),
            Ok(other) => Err(FormError::MalformedBody(format!(
                "expected an array, found {}",
                kind(&other)
            ))),
            Err(e) => Err(FormError::MalformedBody(e.to_string())),
        }
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn arg(&self, index: usize) -> Result<Arg<'_>, FormError> {
        self.args
            .get(index)
            .map(|value| Arg { index, value })
            .ok_or(FormError::IndexOutOfRange {
                index,
                len: self.args.len(),
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = Arg<'_>> {
        self.args
            .iter()
            .enumerate()
            .map(|(index, value)| Arg { index, value })
    }

    pub(crate) fn values(&self) -> &[Value] {
        &self.args
    }
}

/// One positional argument.
#[derive(Debug, Clone, Copy)]
pub struct Arg<'a> {
    index: usize,
    value: &'a Value,
}

impl<'a> Arg<'a> {
    pub fn index(&self) -> usize {
        self.index
    }

    /// The argument as it arrived.
    pub fn value(&self) -> &'a Value {
        self.value
    }

    fn mismatch(&self, expected: &'static str) -> FormError {
        FormError::TypeMismatch {
            index: self.index,
            expected,
            found: kind(self.value),
        }
    }

    pub fn as_f64(&self) -> Result<f64, FormError> {
        self.value.as_f64().ok_or_else(|| self.mismatch("number"))
    }

    /// Integral numbers only; `1.5` is a mismatch rather than being truncated.
    pub fn as_i64(&self) -> Result<i64, FormError> {
        self.value.as_i64().ok_or_else(|| self.mismatch("integer"))
    }

    pub fn as_str(&self) -> Result<&'a str, FormError> {
        self.value.as_str().ok_or_else(|| self.mismatch("string"))
    }

    pub fn as_bool(&self) -> Result<bool, FormError> {
        self.value.as_bool().ok_or_else(|| self.mismatch("boolean"))
    }

    pub fn is_null(&self) -> bool {
        self.value.is_null()
    }

    /// Decode a structured argument.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, FormError> {
        T::deserialize(self.value).map_err(|e| FormError::Decode {
            index: Some(self.index),
            reason: e.to_string(),
        })
    }
}
