use serde::{Deserialize, Serialize};

use crate::metadata::Metadata;

/// The configured feature type of a layer. Only point, line, and polygon
/// layers carry drawable geometry; the remaining types exist so a source can
/// report them symbolically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerType {
    Point,
    Line,
    Polygon,
    Annotation,
    Query,
    Chart,
}

impl LayerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LayerType::Point => "point",
            LayerType::Line => "line",
            LayerType::Polygon => "polygon",
            LayerType::Annotation => "annotation",
            LayerType::Query => "query",
            LayerType::Chart => "chart",
        }
    }
}

impl std::fmt::Display for LayerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A filter attached to a layer: either a plain string match or a parsed
/// filter expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expression {
    pub text: String,
    pub is_expression: bool,
}

impl Expression {
    pub fn string_match(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_expression: false,
        }
    }

    pub fn expression(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_expression: true,
        }
    }
}

/// The layer definition a data source adapter consumes: identification,
/// the data/connection specification, styling hooks, the metadata table,
/// and the item schema once a source has reported it.
#[derive(Debug, Clone)]
pub struct Layer {
    pub name: String,
    pub layer_type: LayerType,
    pub data: Option<String>,
    pub template: Option<String>,
    pub connection: Option<String>,
    pub plugin_library: Option<String>,
    pub filter_item: Option<String>,
    pub style_item: Option<String>,
    pub requires: Option<String>,
    pub label_requires: Option<String>,
    pub class_group: Option<String>,
    pub filter: Option<Expression>,
    /// Debug verbosity; higher values log more per-row detail.
    pub debug: i32,
    pub metadata: Metadata,
    /// The declared item (attribute field) names, in schema order.
    pub items: Vec<String>,
    /// Identity item-index array rebuilt whenever the schema changes.
    pub item_info: Vec<usize>,
}

impl Layer {
    pub fn new(name: impl Into<String>, layer_type: LayerType) -> Self {
        Self {
            name: name.into(),
            layer_type,
            data: None,
            template: None,
            connection: None,
            plugin_library: None,
            filter_item: None,
            style_item: None,
            requires: None,
            label_requires: None,
            class_group: None,
            filter: None,
            debug: 0,
            metadata: Metadata::new(),
            items: Vec::new(),
            item_info: Vec::new(),
        }
    }

    /// Install a new item schema, replacing any prior one, and rebuild the
    /// identity item-index array.
    pub fn set_items(&mut self, items: Vec<String>) {
        self.item_info = (0..items.len()).collect();
        self.items = items;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_items_rebuilds_item_info() {
        let mut layer = Layer::new("roads", LayerType::Line);
        layer.set_items(vec!["id".to_string(), "name".to_string()]);
        assert_eq!(layer.item_info, vec![0, 1]);
        layer.set_items(vec!["id".to_string()]);
        assert_eq!(layer.item_info, vec![0]);
    }

    #[test]
    fn layer_type_is_symbolic() {
        assert_eq!(LayerType::Polygon.as_str(), "polygon");
        assert_eq!(LayerType::Annotation.to_string(), "annotation");
    }
}
