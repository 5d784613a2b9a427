//! Owned Micheline tree and its JSON form
//!
//! Values decoded from chain bytes or parsed from RPC JSON both end up here.
//! The tree has no back-references, so it can be shared freely across threads.

use num_bigint::BigInt;
use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

/// Shape error for JSON that is not Micheline
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScriptShapeError {
    #[error("unknown script shape: {0}")]
    UnknownScriptShape(String),
}

/// A primitive application: instruction, type constructor or data constructor
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Prim {
    pub name: String,
    pub args: Vec<Micheline>,
    pub annots: Vec<String>,
}

impl Prim {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            annots: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<Micheline>) -> Self {
        self.args = args;
        self
    }

    pub fn with_annots<S: Into<String>>(mut self, annots: impl IntoIterator<Item = S>) -> Self {
        self.annots = annots.into_iter().map(Into::into).collect();
        self
    }

    /// First annotation starting with `%`, without the sigil
    pub fn field_annot(&self) -> Option<&str> {
        self.annots.iter().find_map(|a| a.strip_prefix('%'))
    }
}

/// Micheline node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Micheline {
    Int(BigInt),
    String(String),
    Bytes(Vec<u8>),
    Seq(Vec<Micheline>),
    Prim(Prim),
}

impl Micheline {
    /// Bare primitive without arguments or annotations
    pub fn prim(name: impl Into<String>) -> Self {
        Self::Prim(Prim::new(name))
    }

    pub fn prim_args(name: impl Into<String>, args: Vec<Micheline>) -> Self {
        Self::Prim(Prim::new(name).with_args(args))
    }

    pub fn int(value: impl Into<BigInt>) -> Self {
        Self::Int(value.into())
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::String(value.into())
    }

    pub fn as_prim(&self) -> Option<&Prim> {
        match self {
            Self::Prim(p) => Some(p),
            _ => None,
        }
    }

    /// True if this is a primitive named `name`
    pub fn is_prim(&self, name: &str) -> bool {
        self.as_prim().is_some_and(|p| p.name == name)
    }
}

fn shape_error(value: &Value) -> ScriptShapeError {
    let mut text = value.to_string();
    if text.len() > 64 {
        let mut cut = 64;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
        text.push_str("...");
    }
    ScriptShapeError::UnknownScriptShape(text)
}

impl TryFrom<&Value> for Micheline {
    type Error = ScriptShapeError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::Array(items) => items
                .iter()
                .map(Micheline::try_from)
                .collect::<Result<Vec<_>, _>>()
                .map(Micheline::Seq),
            Value::Object(map) => {
                if let Some(prim) = map.get("prim") {
                    let name = prim.as_str().ok_or_else(|| shape_error(value))?;
                    let args = match map.get("args") {
                        None => Vec::new(),
                        Some(Value::Array(args)) => args
                            .iter()
                            .map(Micheline::try_from)
                            .collect::<Result<Vec<_>, _>>()?,
                        Some(_) => return Err(shape_error(value)),
                    };
                    let annots = match map.get("annots") {
                        None => Vec::new(),
                        Some(Value::Array(annots)) => annots
                            .iter()
                            .map(|a| a.as_str().map(str::to_string))
                            .collect::<Option<Vec<_>>>()
                            .ok_or_else(|| shape_error(value))?,
                        Some(_) => return Err(shape_error(value)),
                    };
                    return Ok(Micheline::Prim(Prim {
                        name: name.to_string(),
                        args,
                        annots,
                    }));
                }

                if map.len() != 1 {
                    return Err(shape_error(value));
                }
                match map.iter().next() {
                    Some((key, Value::String(text))) => match key.as_str() {
                        "int" => text
                            .parse::<BigInt>()
                            .map(Micheline::Int)
                            .map_err(|_| shape_error(value)),
                        "string" => Ok(Micheline::String(text.clone())),
                        "bytes" => hex::decode(text)
                            .map(Micheline::Bytes)
                            .map_err(|_| shape_error(value)),
                        _ => Err(shape_error(value)),
                    },
                    _ => Err(shape_error(value)),
                }
            }
            _ => Err(shape_error(value)),
        }
    }
}

impl TryFrom<Value> for Micheline {
    type Error = ScriptShapeError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Micheline::try_from(&value)
    }
}

impl std::str::FromStr for Micheline {
    type Err = ScriptShapeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: Value = serde_json::from_str(s)
            .map_err(|e| ScriptShapeError::UnknownScriptShape(e.to_string()))?;
        Micheline::try_from(&value)
    }
}

impl std::fmt::Display for Micheline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| std::fmt::Error)?;
        f.write_str(&json)
    }
}

impl Serialize for Micheline {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Seq(items) => items.serialize(serializer),
            Self::Int(i) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("int", &i.to_string())?;
                map.end()
            }
            Self::String(s) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("string", s)?;
                map.end()
            }
            Self::Bytes(b) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("bytes", &hex::encode(b))?;
                map.end()
            }
            Self::Prim(p) => {
                let len = 1 + usize::from(!p.args.is_empty()) + usize::from(!p.annots.is_empty());
                let mut map = serializer.serialize_map(Some(len))?;
                map.serialize_entry("prim", &p.name)?;
                if !p.args.is_empty() {
                    map.serialize_entry("args", &p.args)?;
                }
                if !p.annots.is_empty() {
                    map.serialize_entry("annots", &p.annots)?;
                }
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Micheline {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Micheline::try_from(&value).map_err(D::Error::custom)
    }
}
