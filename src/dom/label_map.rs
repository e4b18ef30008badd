use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Marker attribute carrying an element's label
pub const LABEL_ATTR: &str = "data-wand-label";
/// Marker attribute caching an element's aggregated visible text
pub const VISIBLE_TEXT_ATTR: &str = "data-wand-visible-text";
/// Marker attribute caching an element's computed aria label
pub const ARIA_LABEL_ATTR: &str = "data-wand-aria-label";

pub const MARKER_ATTRS: &[&str] = &[LABEL_ATTR, VISIBLE_TEXT_ATTR, ARIA_LABEL_ATTR];

/// What the model is told about a labeled element
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LabelRecord {
    pub label: String,
    pub name: String,
    pub tag_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Snapshot node the label was computed for; meaningless outside the cycle
    #[serde(skip)]
    pub node_id: usize,
}

impl LabelRecord {
    pub fn new(label: impl Into<String>, name: impl Into<String>, tag_name: impl Into<String>) -> Self {
        Self { label: label.into(), name: name.into(), tag_name: tag_name.into(), role: None, node_id: 0 }
    }

    /// Builder method: set role
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Builder method: set snapshot node
    pub fn with_node(mut self, node_id: usize) -> Self {
        self.node_id = node_id;
        self
    }

    /// Selector re-resolving this element on the live page
    pub fn marker_selector(&self) -> String {
        marker_selector(&self.label)
    }
}

/// Selector for the element carrying `label`
pub fn marker_selector(label: &str) -> String {
    attribute_selector(LABEL_ATTR, label)
}

/// `[name="value"]` with the value escaped for a CSS string
pub fn attribute_selector(name: &str, value: &str) -> String {
    format!("[{}=\"{}\"]", name, value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Labels of one perception cycle, in assignment order
#[derive(Debug, Clone)]
pub struct LabelMap {
    map: IndexMap<String, LabelRecord>,

    /// Next label to hand out; labels start at 1
    next_label: usize,
}

impl Default for LabelMap {
    fn default() -> Self {
        Self::new()
    }
}

impl LabelMap {
    pub fn new() -> Self {
        Self { map: IndexMap::new(), next_label: 1 }
    }

    /// Register a named element under the next label and return the label
    pub fn register(&mut self, name: impl Into<String>, tag_name: impl Into<String>, role: Option<&str>, node_id: usize) -> String {
        let label = self.next_label.to_string();
        self.next_label += 1;

        let mut record = LabelRecord::new(label.clone(), name, tag_name).with_node(node_id);
        record.role = role.map(str::to_string);
        self.map.insert(label.clone(), record);
        label
    }

    pub fn get(&self, label: &str) -> Option<&LabelRecord> {
        self.map.get(label)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.map.contains_key(label)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&mut self) {
        self.map.clear();
        self.next_label = 1;
    }

    pub fn records(&self) -> impl Iterator<Item = &LabelRecord> {
        self.map.values()
    }

    /// Owned records for the prompt
    pub fn to_records(&self) -> Vec<LabelRecord> {
        self.map.values().cloned().collect()
    }

    /// Export to JSON for debugging
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.map)
    }
}
