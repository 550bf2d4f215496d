//! Chart values as a JSON tree with deep-merge precedence.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::{Error, Result};

/// A chart values tree. The root is always a mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Values(JsonValue);

impl Default for Values {
    fn default() -> Self {
        Self::new()
    }
}

impl Values {
    pub fn new() -> Self {
        Self(JsonValue::Object(Map::new()))
    }

    /// Wrap an existing JSON value; `null` becomes an empty tree.
    pub fn from_json(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => Self::new(),
            other => Self(other),
        }
    }

    /// Load a YAML values file.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::ValuesRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let value: JsonValue = serde_yaml::from_str(&content).map_err(|e| Error::ValuesParse {
            path: path.to_path_buf(),
            source: e,
        })?;
        match value {
            JsonValue::Null => Ok(Self::new()),
            JsonValue::Object(_) => Ok(Self(value)),
            _ => Err(Error::ValuesNotMapping {
                path: path.to_path_buf(),
            }),
        }
    }

    /// Build a tree from `key.path=value` expressions, later ones winning.
    pub fn from_set_expressions<S: AsRef<str>>(exprs: &[S]) -> Result<Self> {
        let mut values = Self::new();
        for expr in exprs {
            let expr = expr.as_ref();
            let (path, raw) = expr
                .split_once('=')
                .ok_or_else(|| Error::InvalidSetExpression {
                    expr: expr.to_owned(),
                })?;
            values.set(path, parse_scalar(raw))?;
        }
        Ok(values)
    }

    /// Deep-merge `overlay` on top of `self`. Mappings merge key by key;
    /// everything else (scalars, sequences) is replaced.
    pub fn merge(&mut self, overlay: &Values) {
        merge_into(&mut self.0, &overlay.0);
    }

    /// Set `value` at a dotted path, creating intermediate mappings.
    pub fn set(&mut self, path: &str, value: impl Into<JsonValue>) -> Result<()> {
        let keys = split_path(path)?;
        let (last, parents) = keys
            .split_last()
            .ok_or_else(|| invalid_path(path, "empty path"))?;

        let mut node = &mut self.0;
        for key in parents {
            if !node.is_object() {
                *node = JsonValue::Object(Map::new());
            }
            let JsonValue::Object(map) = node else {
                return Err(invalid_path(path, "not a mapping"));
            };
            node = map
                .entry((*key).to_owned())
                .or_insert_with(|| JsonValue::Object(Map::new()));
        }
        if !node.is_object() {
            *node = JsonValue::Object(Map::new());
        }
        if let JsonValue::Object(map) = node {
            map.insert((*last).to_owned(), value.into());
        }
        Ok(())
    }

    pub fn get(&self, path: &str) -> Option<&JsonValue> {
        path.split('.')
            .try_fold(&self.0, |node, key| node.as_object()?.get(key))
    }

    /// Remove the value at a dotted path, returning it if present. Parent
    /// mappings left empty by the removal are removed too; the root stays.
    pub fn remove(&mut self, path: &str) -> Option<JsonValue> {
        let keys: Vec<&str> = path.split('.').collect();
        remove_pruning(self.0.as_object_mut()?, &keys)
    }

    /// A copy with every path in `paths` removed.
    pub fn without<S: AsRef<str>>(&self, paths: &[S]) -> Values {
        let mut copy = self.clone();
        for path in paths {
            copy.remove(path.as_ref());
        }
        copy
    }

    pub fn is_empty(&self) -> bool {
        match &self.0 {
            JsonValue::Object(map) => map.is_empty(),
            JsonValue::Null => true,
            _ => false,
        }
    }

    pub fn as_json(&self) -> &JsonValue {
        &self.0
    }

    pub fn into_json(self) -> JsonValue {
        self.0
    }
}

fn merge_into(base: &mut JsonValue, overlay: &JsonValue) {
    match (base, overlay) {
        (JsonValue::Object(base), JsonValue::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(key) {
                    Some(existing) => merge_into(existing, value),
                    None => {
                        base.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

fn remove_pruning(map: &mut Map<String, JsonValue>, keys: &[&str]) -> Option<JsonValue> {
    let (first, rest) = keys.split_first()?;
    if rest.is_empty() {
        return map.remove(*first);
    }
    let child = map.get_mut(*first)?.as_object_mut()?;
    let removed = remove_pruning(child, rest)?;
    if child.is_empty() {
        map.remove(*first);
    }
    Some(removed)
}

fn split_path(path: &str) -> Result<Vec<&str>> {
    let keys: Vec<&str> = path.split('.').collect();
    if keys.iter().any(|k| k.is_empty()) {
        return Err(invalid_path(path, "empty segment"));
    }
    Ok(keys)
}

fn invalid_path(path: &str, reason: &'static str) -> Error {
    Error::InvalidValuePath {
        path: path.to_owned(),
        reason,
    }
}

/// `true`/`false`/`null`, integers and inline JSON are typed; anything else
/// stays a string.
fn parse_scalar(raw: &str) -> JsonValue {
    match raw {
        "true" => return JsonValue::Bool(true),
        "false" => return JsonValue::Bool(false),
        "null" => return JsonValue::Null,
        _ => {}
    }
    if let Ok(n) = raw.parse::<i64>() {
        return JsonValue::from(n);
    }
    if raw.starts_with('[') || raw.starts_with('{') {
        if let Ok(v) = serde_json::from_str(raw) {
            return v;
        }
    }
    JsonValue::String(raw.to_owned())
}
