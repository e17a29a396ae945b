//! Equality filters for the engine's transaction index.
//!
//! The engine's query language is `key='value'`, case-sensitive. There is
//! no escaping inside the quotes, so a value containing `'` cannot be
//! expressed and is refused rather than mangled.

use std::fmt;

use super::GatewayError;
use crate::config::SEARCH_ID_KEY;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EqualityQuery {
    key: String,
    value: String,
}

impl EqualityQuery {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Result<Self, GatewayError> {
        let key = key.into();
        let value = value.into();

        let key_ok = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_');
        if !key_ok {
            return Err(GatewayError::InvalidQuery(format!("bad index key {key:?}")));
        }
        if value.contains('\'') {
            return Err(GatewayError::InvalidQuery(
                "value may not contain a single quote".into(),
            ));
        }
        Ok(Self { key, value })
    }

    /// `bftx.id='<id>'`
    pub fn by_id(id: &str) -> Result<Self, GatewayError> {
        Self::new(SEARCH_ID_KEY, id)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for EqualityQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}='{}'", self.key, self.value)
    }
}
