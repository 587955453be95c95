// Copyright 2024 OctoFHIR Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Document tree nodes
//!
//! Container coercion is explicit: the writer calls [`Node::coerce_to_object`]
//! or [`Node::coerce_to_array`] wherever a scalar placeholder must become a
//! container.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

use super::value::ScalarValue;
use crate::error::{MappingError, Result};

/// Ordered property map of an object node
pub type ObjectMap = IndexMap<String, Node>;

/// A node of a JSON document tree
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Node {
    /// Ordered map of property name to node
    Object(ObjectMap),
    /// Ordered list of nodes
    Array(Vec<Node>),
    /// Typed leaf value
    Scalar(ScalarValue),
}

impl Default for Node {
    fn default() -> Self {
        Node::placeholder()
    }
}

impl Node {
    /// Null scalar used for slots that have not been written yet
    pub fn placeholder() -> Self {
        Node::Scalar(ScalarValue::Null)
    }

    /// Empty object node
    pub fn empty_object() -> Self {
        Node::Object(ObjectMap::new())
    }

    /// Whether this node is a null scalar
    pub fn is_placeholder(&self) -> bool {
        matches!(self, Node::Scalar(ScalarValue::Null))
    }

    /// Name of the node kind, used in diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Object(_) => "object",
            Node::Array(_) => "array",
            Node::Scalar(value) => value.type_name(),
        }
    }

    /// Object properties, if this is an object
    pub fn as_object(&self) -> Option<&ObjectMap> {
        match self {
            Node::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Array items, if this is an array
    pub fn as_array(&self) -> Option<&Vec<Node>> {
        match self {
            Node::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Scalar value, if this is a leaf
    pub fn as_scalar(&self) -> Option<&ScalarValue> {
        match self {
            Node::Scalar(value) => Some(value),
            _ => None,
        }
    }

    /// Property of an object node
    pub fn get(&self, name: &str) -> Option<&Node> {
        self.as_object().and_then(|map| map.get(name))
    }

    /// Item of an array node
    pub fn item(&self, index: usize) -> Option<&Node> {
        self.as_array().and_then(|items| items.get(index))
    }

    /// Turn a scalar into an empty object in place and return its properties
    ///
    /// Returns `None` when the node is an array.
    pub fn coerce_to_object(&mut self) -> Option<&mut ObjectMap> {
        if let Node::Scalar(_) = self {
            *self = Node::empty_object();
        }
        match self {
            Node::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Turn a scalar into an empty array in place and return its items
    ///
    /// Returns `None` when the node is an object.
    pub fn coerce_to_array(&mut self) -> Option<&mut Vec<Node>> {
        if let Node::Scalar(_) = self {
            *self = Node::Array(Vec::new());
        }
        match self {
            Node::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Extract the scalar value for a leaf write
    pub fn into_scalar(self) -> Result<ScalarValue> {
        match self {
            Node::Scalar(value) => Ok(value),
            other => Err(MappingError::unsupported_value_type(other.kind())),
        }
    }

    /// Convert to a JSON value
    pub fn to_json(&self) -> JsonValue {
        match self {
            Node::Object(map) => JsonValue::Object(
                map.iter()
                    .map(|(name, node)| (name.clone(), node.to_json()))
                    .collect(),
            ),
            Node::Array(items) => JsonValue::Array(items.iter().map(Node::to_json).collect()),
            Node::Scalar(value) => value.to_json(),
        }
    }
}

impl From<JsonValue> for Node {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Object(map) => Node::Object(
                map.into_iter()
                    .map(|(name, value)| (name, Node::from(value)))
                    .collect(),
            ),
            JsonValue::Array(items) => Node::Array(items.into_iter().map(Node::from).collect()),
            scalar => Node::Scalar(ScalarValue::from_json(&scalar).unwrap_or_default()),
        }
    }
}

impl From<ScalarValue> for Node {
    fn from(value: ScalarValue) -> Self {
        Node::Scalar(value)
    }
}

impl From<&Node> for JsonValue {
    fn from(node: &Node) -> Self {
        node.to_json()
    }
}

impl From<Node> for JsonValue {
    fn from(node: Node) -> Self {
        node.to_json()
    }
}

impl<'de> Deserialize<'de> for Node {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        JsonValue::deserialize(deserializer).map(Node::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_json_round_trip_keeps_order() {
        let json = json!({ "b": 1, "a": [true, null, "x"], "c": { "d": 2.5 } });
        let node = Node::from(json.clone());
        assert_eq!(node.to_json(), json);
        let keys: Vec<_> = node.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_coercion() {
        let mut node = Node::placeholder();
        node.coerce_to_object()
            .unwrap()
            .insert("x".to_string(), Node::from(ScalarValue::Integer(1)));
        assert_eq!(node.to_json(), json!({ "x": 1 }));
        assert!(node.coerce_to_array().is_none());

        let mut node = Node::Scalar(ScalarValue::from("old"));
        assert!(node.coerce_to_array().unwrap().is_empty());
        assert!(node.coerce_to_object().is_none());
    }

    #[test]
    fn test_into_scalar_rejects_containers() {
        let err = Node::empty_object().into_scalar().unwrap_err();
        assert_eq!(err, MappingError::unsupported_value_type("object"));
    }
}
