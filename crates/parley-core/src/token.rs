//! Callback token encoding.
//!
//! A callback token is `<prefix>` or `<prefix><delim><p1><delim><p2>...`.
//! Routing only looks at the prefix; each handler re-parses its own
//! positional parameters from the full token.

use crate::{ParleyError, ParleyResult};

/// Delimiter used between the prefix and the parameters of a token.
pub const DEFAULT_DELIMITER: char = '|';

/// Maximum encoded token size accepted by the transport, in bytes.
pub const MAX_TOKEN_BYTES: usize = 64;

/// A parsed (or to-be-encoded) callback token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackToken {
    prefix: String,
    params: Vec<String>,
}

impl CallbackToken {
    /// Start a token with the given prefix and no parameters.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            params: Vec::new(),
        }
    }

    /// Append a positional parameter.
    pub fn param(mut self, value: impl ToString) -> Self {
        self.params.push(value.to_string());
        self
    }

    /// Split a raw token on `delimiter`.
    ///
    /// Never fails: a token without a delimiter is a bare prefix, and empty
    /// parameters are kept so positions stay stable.
    pub fn parse(raw: &str, delimiter: char) -> Self {
        let mut parts = raw.split(delimiter);
        let prefix = parts.next().unwrap_or_default().to_string();
        Self {
            prefix,
            params: parts.map(str::to_string).collect(),
        }
    }

    /// The routing prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// All positional parameters.
    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// Parameter at `index`, if present.
    pub fn param_at(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }

    /// Encode the token for an outgoing keyboard button.
    ///
    /// Fails when a parameter contains the delimiter (it would shift every
    /// later position) or when the result exceeds [`MAX_TOKEN_BYTES`].
    pub fn encode(&self, delimiter: char) -> ParleyResult<String> {
        if self.prefix.contains(delimiter) {
            return Err(ParleyError::Routing(format!(
                "callback prefix '{}' contains the delimiter '{delimiter}'",
                self.prefix
            )));
        }
        let mut out = self.prefix.clone();
        for param in &self.params {
            if param.contains(delimiter) {
                return Err(ParleyError::Routing(format!(
                    "callback parameter '{param}' contains the delimiter '{delimiter}'"
                )));
            }
            out.push(delimiter);
            out.push_str(param);
        }
        if out.len() > MAX_TOKEN_BYTES {
            return Err(ParleyError::Routing(format!(
                "callback token is {} bytes, limit is {MAX_TOKEN_BYTES}",
                out.len()
            )));
        }
        Ok(out)
    }
}
