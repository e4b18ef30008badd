use crate::{
    browser::TabHandle,
    dom::element::{DomNode, ElementNode},
    error::{AgentError, Result},
};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Viewport geometry at snapshot time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub scroll_y: f64,
    #[serde(default)]
    pub document_height: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height, scroll_y: 0.0, document_height: height }
    }

    /// How far down the document the bottom of the viewport is, 0-100
    pub fn progress_percentage(&self) -> f64 {
        if self.document_height <= 0.0 {
            return 100.0;
        }
        (((self.scroll_y + self.height) / self.document_height) * 100.0).clamp(0.0, 100.0).round()
    }
}

/// A snapshot of the page body taken by the in-page agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomSnapshot {
    #[serde(default)]
    pub url: String,

    pub viewport: Viewport,

    pub root: ElementNode,

    /// Node ids matched by each annotation rule selector, in rule order
    #[serde(default)]
    pub rule_matches: Vec<Vec<usize>>,
}

/// Tags whose content is never shown to the model
const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "template", "svg", "head", "meta", "link"];

/// Attributes kept in the simplified DOM
const KEPT_ATTRIBUTES: &[&str] = &[
    "id",
    "aria-label",
    "data-wand-label",
    "name",
    "type",
    "placeholder",
    "value",
    "role",
    "title",
    "alt",
    "href",
];

impl DomSnapshot {
    pub fn new(root: ElementNode, viewport: Viewport) -> Self {
        Self { url: String::new(), viewport, root, rule_matches: Vec::new() }
    }

    /// Take a snapshot of the attached tab, resolving `rule_selectors` in page
    pub async fn capture(tab: &dyn TabHandle, rule_selectors: &[String]) -> Result<Self> {
        let value = tab.call_rpc("snapshotDom", json!([rule_selectors])).await?;

        let snapshot: DomSnapshot = serde_json::from_value(value)
            .map_err(|e| AgentError::DomParseFailed(format!("Failed to parse DOM snapshot: {}", e)))?;

        log::debug!("DOM snapshot: {} elements", snapshot.root.count_elements());
        Ok(snapshot)
    }

    pub fn find(&self, node_id: usize) -> Option<&ElementNode> {
        self.root.find(node_id)
    }

    pub fn find_mut(&mut self, node_id: usize) -> Option<&mut ElementNode> {
        self.root.find_mut(node_id)
    }

    pub fn viewport_percentage(&self) -> f64 {
        self.viewport.progress_percentage()
    }

    /// Compact HTML for text-only perception.
    ///
    /// Invisible elements are dropped, wrapper elements without attributes are
    /// flattened, and labeled elements carry their label as `id`.
    pub fn to_simplified_html(&self) -> String {
        let mut out = String::new();
        simplify_into(&self.root, &mut out);
        out
    }

    /// Export to JSON for debugging
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn simplify_into(node: &ElementNode, out: &mut String) {
    if SKIPPED_TAGS.contains(&node.tag_name.as_str()) || node.style.display == "none" {
        return;
    }

    let mut attrs: Vec<(String, String)> = Vec::new();
    if let Some(label) = node.get_attribute("data-wand-label") {
        attrs.push(("id".to_string(), label.clone()));
    }
    for name in KEPT_ATTRIBUTES {
        if *name == "id" && node.get_attribute("data-wand-label").is_some() {
            continue;
        }
        if *name == "data-wand-label" {
            continue;
        }
        let value = match (*name, &node.value) {
            ("value", Some(live)) => Some(live),
            _ => node.get_attribute(name),
        };
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            attrs.push((name.to_string(), value.clone()));
        }
    }

    let mut inner = String::new();
    for child in &node.children {
        match child {
            DomNode::Text { text } => {
                let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
                if !collapsed.is_empty() {
                    if !inner.is_empty() {
                        inner.push(' ');
                    }
                    inner.push_str(&escape(&collapsed));
                }
            }
            DomNode::Element(e) => simplify_into(e, &mut inner),
        }
    }

    if attrs.is_empty() && !matches!(node.tag_name.as_str(), "a" | "button" | "input" | "select" | "textarea") {
        out.push_str(&inner);
        return;
    }

    out.push('<');
    out.push_str(&node.tag_name);
    for (name, value) in attrs {
        out.push_str(&format!(" {}=\"{}\"", name, escape(&value)));
    }
    if inner.is_empty() {
        out.push_str("/>");
    } else {
        out.push('>');
        out.push_str(&inner);
        out.push_str(&format!("</{}>", node.tag_name));
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;").replace('"', "&quot;")
}
