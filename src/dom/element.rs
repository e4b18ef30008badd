use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A node of the page snapshot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DomNode {
    Element(ElementNode),
    Text { text: String },
}

/// Represents a DOM element node
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ElementNode {
    /// Snapshot-local id, stamped on the live element as `data-wand-node`
    pub node_id: usize,

    /// Lower-case tag name
    pub tag_name: String,

    #[serde(default)]
    pub attributes: HashMap<String, String>,

    /// Live `value` property of form controls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    #[serde(default)]
    pub style: ComputedStyle,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,

    /// The element (or a descendant) is what a hit test at its center returns
    #[serde(default)]
    pub is_top_element: bool,

    #[serde(default)]
    pub disabled: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<DomNode>,
}

/// The computed style properties visibility depends on
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComputedStyle {
    pub display: String,
    pub visibility: String,
    pub opacity: f64,
}

impl Default for ComputedStyle {
    fn default() -> Self {
        Self { display: "block".to_string(), visibility: "visible".to_string(), opacity: 1.0 }
    }
}

/// Bounding box in viewport coordinates
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

impl ElementNode {
    /// Create a new ElementNode that is laid out, visible and on top
    pub fn new(node_id: usize, tag_name: impl Into<String>) -> Self {
        Self {
            node_id,
            tag_name: tag_name.into().to_ascii_lowercase(),
            attributes: HashMap::new(),
            value: None,
            style: ComputedStyle::default(),
            bounding_box: Some(BoundingBox { x: 0.0, y: 0.0, width: 100.0, height: 20.0 }),
            is_top_element: true,
            disabled: false,
            children: Vec::new(),
        }
    }

    /// Builder method: add an attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Builder method: append a text child
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(DomNode::Text { text: text.into() });
        self
    }

    /// Builder method: append an element child
    pub fn with_child(mut self, child: ElementNode) -> Self {
        self.children.push(DomNode::Element(child));
        self
    }

    /// Builder method: set the live value
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Builder method: set computed style
    pub fn with_style(mut self, display: &str, visibility: &str, opacity: f64) -> Self {
        self.style = ComputedStyle { display: display.to_string(), visibility: visibility.to_string(), opacity };
        self
    }

    /// Builder method: set bounding box
    pub fn with_bounding_box(mut self, x: f64, y: f64, width: f64, height: f64) -> Self {
        self.bounding_box = Some(BoundingBox { x, y, width, height });
        self
    }

    /// Builder method: mark as covered by another element
    pub fn covered(mut self) -> Self {
        self.is_top_element = false;
        self
    }

    /// Builder method: mark as disabled
    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    pub fn get_attribute(&self, key: &str) -> Option<&String> {
        self.attributes.get(key)
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(key.into(), value.into());
    }

    pub fn id(&self) -> Option<&String> {
        self.attributes.get("id")
    }

    pub fn role(&self) -> Option<&str> {
        self.attributes.get("role").map(String::as_str)
    }

    pub fn is_tag(&self, tag: &str) -> bool {
        self.tag_name.eq_ignore_ascii_case(tag)
    }

    pub fn is_aria_hidden(&self) -> bool {
        self.attributes.get("aria-hidden").is_some_and(|v| v == "true")
    }

    /// Child elements, skipping text
    pub fn child_elements(&self) -> impl Iterator<Item = &ElementNode> {
        self.children.iter().filter_map(|c| match c {
            DomNode::Element(e) => Some(e),
            DomNode::Text { .. } => None,
        })
    }

    pub fn child_elements_mut(&mut self) -> impl Iterator<Item = &mut ElementNode> {
        self.children.iter_mut().filter_map(|c| match c {
            DomNode::Element(e) => Some(e),
            DomNode::Text { .. } => None,
        })
    }

    /// Concatenated text of every descendant, visible or not
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for child in &self.children {
            match child {
                DomNode::Text { text } => out.push_str(text),
                DomNode::Element(e) => e.collect_text(out),
            }
        }
    }

    /// Find a descendant (or self) by snapshot id
    pub fn find(&self, node_id: usize) -> Option<&ElementNode> {
        if self.node_id == node_id {
            return Some(self);
        }
        self.child_elements().find_map(|c| c.find(node_id))
    }

    pub fn find_mut(&mut self, node_id: usize) -> Option<&mut ElementNode> {
        if self.node_id == node_id {
            return Some(self);
        }
        self.child_elements_mut().find_map(|c| c.find_mut(node_id))
    }

    /// Remove the given attributes from this element and every descendant
    pub fn remove_attributes_recursive(&mut self, names: &[&str]) {
        for name in names {
            self.attributes.remove(*name);
        }
        for child in self.child_elements_mut() {
            child.remove_attributes_recursive(names);
        }
    }

    /// Count elements in this subtree (including self)
    pub fn count_elements(&self) -> usize {
        1 + self.child_elements().map(ElementNode::count_elements).sum::<usize>()
    }
}
