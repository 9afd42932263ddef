//! Signature - 呼び出し可能オブジェクトの引数宣言
//!
//! Tasks declare their parameters once, at registration. `start` arguments are
//! bound against that declaration on the host side, so the worker only ever
//! sees argument sets that fit.
//!
//! Binding rules:
//! - positional count must not exceed the parameter count
//! - every parameter beyond the positional ones is taken from the named
//!   arguments, else from its default, else binding fails
//! - a named argument must match a parameter and must not repeat one already
//!   filled positionally

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

use crate::domain::errors::{ArgumentError, ShuttleError};

/// One declared parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default: Option<Value>,
}

impl Param {
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
        }
    }

    pub fn optional(name: impl Into<String>, default: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            default: Some(default.into()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

/// Ordered parameter list of a task callable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    params: Vec<Param>,
}

impl Signature {
    /// A callable that takes no arguments.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Validate and build a signature.
    ///
    /// Rejected (RegistrationError):
    /// - blank or duplicated parameter names
    /// - a required parameter after one with a default
    pub fn new(params: impl IntoIterator<Item = Param>) -> Result<Self, ShuttleError> {
        let params: Vec<Param> = params.into_iter().collect();
        let mut seen = HashSet::new();
        let mut saw_default = false;
        for p in &params {
            if p.name.trim().is_empty() {
                return Err(ShuttleError::registration("parameter name must not be empty"));
            }
            if !seen.insert(p.name.as_str()) {
                return Err(ShuttleError::registration(format!(
                    "duplicate parameter '{}'",
                    p.name
                )));
            }
            if p.is_required() && saw_default {
                return Err(ShuttleError::registration(format!(
                    "required parameter '{}' follows a parameter with a default",
                    p.name
                )));
            }
            saw_default |= !p.is_required();
        }
        Ok(Self { params })
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn required_count(&self) -> usize {
        self.params.iter().filter(|p| p.is_required()).count()
    }

    /// Bind call arguments to this signature, filling defaults.
    pub fn bind(&self, args: &CallArgs) -> Result<BoundArgs, ArgumentError> {
        let given = args.positional.len();
        if given > self.params.len() {
            return Err(ArgumentError::TooManyPositional {
                max: self.params.len(),
                given,
            });
        }

        for key in args.named.keys() {
            match self.params.iter().position(|p| &p.name == key) {
                None => return Err(ArgumentError::UnexpectedKeyword(key.clone())),
                Some(idx) if idx < given => return Err(ArgumentError::Duplicate(key.clone())),
                Some(_) => {}
            }
        }

        let mut values = Vec::with_capacity(self.params.len());
        for (idx, p) in self.params.iter().enumerate() {
            let value = if idx < given {
                args.positional[idx].clone()
            } else if let Some(v) = args.named.get(&p.name) {
                v.clone()
            } else if let Some(v) = &p.default {
                v.clone()
            } else {
                return Err(ArgumentError::Missing(p.name.clone()));
            };
            values.push((p.name.clone(), value));
        }
        Ok(BoundArgs { values })
    }
}

/// Arguments supplied to `start`, before binding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallArgs {
    #[serde(default)]
    positional: Vec<Value>,
    #[serde(default)]
    named: Map<String, Value>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn positional<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            positional: values.into_iter().map(Into::into).collect(),
            named: Map::new(),
        }
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.named.insert(name.into(), value.into());
        self
    }

    pub fn args(&self) -> &[Value] {
        &self.positional
    }

    pub fn kwargs(&self) -> &Map<String, Value> {
        &self.named
    }
}

/// Arguments after binding: one value per declared parameter, in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundArgs {
    values: Vec<(String, Value)>,
}

impl BoundArgs {
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index).map(|(_, v)| v)
    }

    pub fn named(&self, name: &str) -> Option<&Value> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }
}
