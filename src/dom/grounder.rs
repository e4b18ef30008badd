//! Element grounding: decides which elements get a label and what they are called.
//!
//! Works on a [`DomSnapshot`] taken by the in-page agent. Labels are integers
//! starting at 1, unique within one perception cycle. Every labeled element
//! carries `data-wand-label`; elements whose text was aggregated carry the
//! cached text and aria label as well, so the executor can find them again
//! by marker and nested matches are not labeled twice.

use crate::{
    browser::TabHandle,
    dom::{
        element::{DomNode, ElementNode},
        label_map::{ARIA_LABEL_ATTR, LABEL_ATTR, LabelMap, MARKER_ATTRS, VISIBLE_TEXT_ATTR},
        snapshot::{DomSnapshot, Viewport},
    },
    error::Result,
    knowledge::AnnotationRule,
};
use indexmap::IndexSet;
use regex::Regex;
use serde::Serialize;
use serde_json::json;
use std::{
    collections::{BTreeMap, HashMap},
    sync::LazyLock,
};

const INTERACTIVE_TAGS: &[&str] = &["a", "button", "details", "input", "label", "option", "select", "textarea"];

const MOUSE_HANDLER_ATTRS: &[&str] = &["onclick", "onmouseover", "onmousedown", "onmouseup"];

const CLICKABLE_ROLES: &[&str] = &[
    "button",
    "checkbox",
    "gridcell",
    "link",
    "menuitem",
    "menuitemcheckbox",
    "menuitemradio",
    "option",
    "radio",
    "switch",
    "tab",
    "textbox",
    "togglebutton",
    "treeitem",
];

/// Anything that is not a letter, number, punctuation or space separator
static NON_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{L}\p{N}\p{P}\p{Z}]").expect("non-text character class"));

/// Strip control characters and emoji, collapse whitespace
pub fn sanitize_name(raw: &str) -> String {
    let stripped = NON_TEXT.replace_all(raw, " ");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whether the generic pass considers `node` interactive
pub fn is_interactive(node: &ElementNode) -> bool {
    INTERACTIVE_TAGS.contains(&node.tag_name.as_str())
        || MOUSE_HANDLER_ATTRS.iter().any(|attr| node.attributes.contains_key(*attr))
        || node.role().is_some_and(|role| CLICKABLE_ROLES.contains(&role))
}

#[derive(Debug, Clone, Copy, Default)]
struct VisibilityOverrides {
    allow_invisible: bool,
    allow_covered: bool,
}

impl From<&AnnotationRule> for VisibilityOverrides {
    fn from(rule: &AnnotationRule) -> Self {
        Self { allow_invisible: rule.allow_invisible, allow_covered: rule.allow_covered }
    }
}

fn is_visible(node: &ElementNode, viewport: Option<&Viewport>, overrides: VisibilityOverrides) -> bool {
    if !overrides.allow_invisible {
        let style = &node.style;
        if style.display == "none" || style.visibility != "visible" || style.opacity < 0.1 {
            return false;
        }
        match &node.bounding_box {
            Some(rect) if !rect.is_empty() => {}
            _ => return false,
        }
    }

    if !overrides.allow_covered && !node.is_top_element {
        return false;
    }

    if let (Some(viewport), Some(rect), false) = (viewport, &node.bounding_box, overrides.allow_invisible) {
        if rect.y > viewport.height || rect.y + rect.height < 0.0 || rect.x > viewport.width || rect.x + rect.width < 0.0 {
            return false;
        }
    }

    true
}

/// Has this element been visited by text aggregation or labeling already
fn is_touched(node: &ElementNode) -> bool {
    MARKER_ATTRS.iter().any(|attr| node.attributes.contains_key(*attr))
}

#[derive(Debug, Clone, Default)]
struct DomAttrs {
    visible_text: String,
    aria_label: String,
}

/// Text of every element with an `id`, for `aria-labelledby` lookups
fn build_id_index(node: &ElementNode, index: &mut HashMap<String, String>) {
    if let Some(id) = node.id() {
        let text = if node.is_tag("input") { node.value.clone().unwrap_or_default() } else { node.text_content() };
        index.entry(id.clone()).or_insert(text);
    }
    for child in node.child_elements() {
        build_id_index(child, index);
    }
}

fn labelled_by(node: &ElementNode, ids: &HashMap<String, String>) -> String {
    let Some(refs) = node.get_attribute("aria-labelledby") else {
        return String::new();
    };
    let unique: IndexSet<&str> = refs.split_whitespace().collect();
    unique
        .iter()
        .filter_map(|id| ids.get(*id).map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

/// Aggregate visible text and the best aria label of a subtree, caching both as markers
fn aggregate(node: &mut ElementNode, ids: &HashMap<String, String>) -> DomAttrs {
    if !is_visible(node, None, VisibilityOverrides::default()) {
        return DomAttrs::default();
    }
    if is_touched(node) {
        return DomAttrs {
            visible_text: node.get_attribute(VISIBLE_TEXT_ATTR).cloned().unwrap_or_default(),
            aria_label: node.get_attribute(ARIA_LABEL_ATTR).cloned().unwrap_or_default(),
        };
    }

    let mut aria_label = labelled_by(node, ids);
    if aria_label.is_empty() {
        aria_label = node.get_attribute("aria-label").cloned().unwrap_or_default();
    }

    let mut visible_text = String::new();
    // svg internals follow their own visibility rules
    if !node.is_tag("svg") {
        for child in node.children.iter_mut() {
            let result = match child {
                DomNode::Text { text } => DomAttrs { visible_text: text.clone(), aria_label: String::new() },
                DomNode::Element(element) => aggregate(element, ids),
            };
            visible_text.push(' ');
            visible_text.push_str(&result.visible_text);
            if aria_label.is_empty() && !result.aria_label.is_empty() {
                aria_label = result.aria_label;
            }
        }
    }
    let visible_text = sanitize_name(&visible_text);

    node.set_attribute(VISIBLE_TEXT_ATTR, visible_text.clone());
    node.set_attribute(ARIA_LABEL_ATTR, aria_label.clone());
    DomAttrs { visible_text, aria_label }
}

struct LabelContext<'a> {
    labels: LabelMap,
    ids: &'a HashMap<String, String>,
    viewport: &'a Viewport,
    fallback_counts: HashMap<String, usize>,
}

impl LabelContext<'_> {
    fn fallback_name(&mut self, tag_name: &str) -> String {
        let count = self.fallback_counts.entry(tag_name.to_string()).or_insert(0);
        *count += 1;
        format!("{}#{}", tag_name, count)
    }

    fn assign(&mut self, node: &mut ElementNode, name: String) {
        let name = if name.is_empty() { self.fallback_name(&node.tag_name) } else { name };
        let label = self.labels.register(name, node.tag_name.clone(), node.role(), node.node_id);
        node.set_attribute(LABEL_ATTR, label);
    }
}

fn label_by_rule(node: &mut ElementNode, rule: &AnnotationRule, ctx: &mut LabelContext<'_>) {
    if node.get_attribute(LABEL_ATTR).is_some() {
        return;
    }
    if node.is_aria_hidden() && !rule.allow_aria_hidden {
        return;
    }
    if !is_visible(node, Some(ctx.viewport), rule.into()) {
        return;
    }

    let name = if let Some(name) = &rule.use_static_name {
        sanitize_name(name)
    } else if let Some(value) = rule.use_attribute_as_name.as_ref().and_then(|attr| node.get_attribute(attr)) {
        sanitize_name(value)
    } else {
        let attrs = aggregate(node, ctx.ids);
        if attrs.aria_label.is_empty() { attrs.visible_text } else { sanitize_name(&attrs.aria_label) }
    };

    ctx.assign(node, name);
}

fn label_interactive(node: &mut ElementNode, ctx: &mut LabelContext<'_>) {
    let qualifies = is_interactive(node)
        && !is_touched(node)
        && !node.is_aria_hidden()
        && !node.disabled
        && is_visible(node, Some(ctx.viewport), VisibilityOverrides::default());

    if qualifies {
        let name = if node.is_tag("input") {
            let shown = node.value.clone().filter(|v| !v.is_empty());
            sanitize_name(&shown.or_else(|| node.get_attribute("placeholder").cloned()).unwrap_or_default())
        } else {
            let attrs = aggregate(node, ctx.ids);
            if attrs.visible_text.is_empty() { sanitize_name(&attrs.aria_label) } else { attrs.visible_text }
        };
        ctx.assign(node, name);
    }

    for child in node.child_elements_mut() {
        label_interactive(child, ctx);
    }
}

/// Compute labels for `snapshot`, annotation rules first, then the generic pass.
///
/// `snapshot.rule_matches[i]` holds the nodes matched by `rules[i]`. Markers
/// from a previous cycle are cleared first.
pub fn compute_labels(snapshot: &mut DomSnapshot, rules: &[AnnotationRule]) -> LabelMap {
    snapshot.root.remove_attributes_recursive(MARKER_ATTRS);

    let mut ids = HashMap::new();
    build_id_index(&snapshot.root, &mut ids);

    let viewport = snapshot.viewport.clone();
    let mut ctx = LabelContext { labels: LabelMap::new(), ids: &ids, viewport: &viewport, fallback_counts: HashMap::new() };

    for (rule, matches) in rules.iter().zip(snapshot.rule_matches.iter()) {
        for node_id in matches {
            if let Some(node) = snapshot.root.find_mut(*node_id) {
                label_by_rule(node, rule, &mut ctx);
            }
        }
    }

    label_interactive(&mut snapshot.root, &mut ctx);

    ctx.labels
}

/// Marker attributes of one element, to be written back to the page
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MarkerPatch {
    pub node_id: usize,
    pub attributes: BTreeMap<String, String>,
}

/// Every element of the snapshot that carries markers
pub fn marker_patches(snapshot: &DomSnapshot) -> Vec<MarkerPatch> {
    fn collect(node: &ElementNode, out: &mut Vec<MarkerPatch>) {
        let attributes: BTreeMap<String, String> = MARKER_ATTRS
            .iter()
            .filter_map(|attr| node.get_attribute(attr).map(|v| (attr.to_string(), v.clone())))
            .collect();
        if !attributes.is_empty() {
            out.push(MarkerPatch { node_id: node.node_id, attributes });
        }
        for child in node.child_elements() {
            collect(child, out);
        }
    }

    let mut out = Vec::new();
    collect(&snapshot.root, &mut out);
    out
}

/// Snapshot the attached tab, compute labels and write the markers back
pub async fn ground(tab: &dyn TabHandle, rules: &[AnnotationRule]) -> Result<(DomSnapshot, LabelMap)> {
    let selectors: Vec<String> = rules.iter().map(|r| r.selector.clone()).collect();
    let mut snapshot = DomSnapshot::capture(tab, &selectors).await?;

    let labels = compute_labels(&mut snapshot, rules);
    let patches = marker_patches(&snapshot);
    tab.call_rpc("applyMarkers", json!([patches])).await?;

    log::debug!("grounded {} labels", labels.len());
    Ok((snapshot, labels))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(children: Vec<ElementNode>) -> DomSnapshot {
        let mut root = ElementNode::new(0, "body").with_bounding_box(0.0, 0.0, 800.0, 600.0);
        for child in children {
            root = root.with_child(child);
        }
        DomSnapshot::new(root, Viewport::new(800.0, 600.0))
    }

    fn names(labels: &LabelMap) -> Vec<(String, String)> {
        labels.records().map(|r| (r.label.clone(), r.name.clone())).collect()
    }

    #[test]
    fn test_sanitize_strips_emoji_and_controls() {
        assert_eq!(sanitize_name("  Buy 🛒 now\u{0007}!\n"), "Buy now !");
        assert_eq!(sanitize_name("Café: 42 ½"), "Café: 42 ½");
    }

    #[test]
    fn test_generic_pass_labels_in_document_order() {
        let mut snapshot = page(vec![
            ElementNode::new(1, "a").with_attribute("href", "/").with_text("Home"),
            ElementNode::new(2, "div").with_text("not interactive"),
            ElementNode::new(3, "button").with_text("Sign in"),
        ]);

        let labels = compute_labels(&mut snapshot, &[]);

        assert_eq!(names(&labels), vec![("1".into(), "Home".into()), ("2".into(), "Sign in".into())]);
        assert_eq!(snapshot.find(3).and_then(|e| e.get_attribute(LABEL_ATTR)).map(String::as_str), Some("2"));
        assert!(snapshot.find(2).and_then(|e| e.get_attribute(LABEL_ATTR)).is_none());
    }

    #[test]
    fn test_empty_page_yields_no_labels() {
        let mut snapshot = page(vec![ElementNode::new(1, "p").with_text("hello")]);
        assert!(compute_labels(&mut snapshot, &[]).is_empty());
    }

    #[test]
    fn test_invisible_covered_and_offscreen_elements_skipped() {
        let mut snapshot = page(vec![
            ElementNode::new(1, "button").with_style("none", "visible", 1.0).with_text("hidden"),
            ElementNode::new(2, "button").with_style("block", "hidden", 1.0).with_text("invisible"),
            ElementNode::new(3, "button").with_style("block", "visible", 0.05).with_text("faint"),
            ElementNode::new(4, "button").with_bounding_box(0.0, 0.0, 0.0, 10.0).with_text("flat"),
            ElementNode::new(5, "button").covered().with_text("covered"),
            ElementNode::new(6, "button").with_bounding_box(0.0, 900.0, 50.0, 20.0).with_text("below"),
            ElementNode::new(7, "button").with_attribute("aria-hidden", "true").with_text("aria"),
            ElementNode::new(8, "button").disabled().with_text("disabled"),
            ElementNode::new(9, "button").with_text("shown"),
        ]);

        let labels = compute_labels(&mut snapshot, &[]);
        assert_eq!(names(&labels), vec![("1".into(), "shown".into())]);
    }

    #[test]
    fn test_input_named_by_value_then_placeholder() {
        let mut snapshot = page(vec![
            ElementNode::new(1, "input").with_attribute("placeholder", "Search").with_value(""),
            ElementNode::new(2, "input").with_attribute("placeholder", "Email").with_value("me@x.io"),
        ]);

        let labels = compute_labels(&mut snapshot, &[]);
        assert_eq!(names(&labels), vec![("1".into(), "Search".into()), ("2".into(), "me@x.io".into())]);
    }

    #[test]
    fn test_aria_labelledby_then_aria_label_then_fallback() {
        let mut snapshot = page(vec![
            ElementNode::new(1, "span").with_attribute("id", "cap").with_text("Close dialog"),
            ElementNode::new(2, "button").with_attribute("aria-labelledby", "cap cap"),
            ElementNode::new(3, "button").with_attribute("aria-label", "Menu"),
            ElementNode::new(4, "a").with_attribute("href", "#"),
            ElementNode::new(5, "a").with_attribute("href", "#"),
        ]);

        let labels = compute_labels(&mut snapshot, &[]);
        assert_eq!(
            names(&labels),
            vec![
                ("1".into(), "Close dialog".into()),
                ("2".into(), "Menu".into()),
                ("3".into(), "a#1".into()),
                ("4".into(), "a#2".into()),
            ]
        );
    }

    #[test]
    fn test_nested_interactive_not_labeled_twice() {
        let mut snapshot = page(vec![
            ElementNode::new(1, "label")
                .with_text("Remember me")
                .with_child(ElementNode::new(2, "span").with_attribute("role", "checkbox").with_text("✓")),
        ]);

        let labels = compute_labels(&mut snapshot, &[]);
        assert_eq!(names(&labels), vec![("1".into(), "Remember me".into())]);
    }

    #[test]
    fn test_text_aggregation_skips_hidden_children_and_svg() {
        let mut snapshot = page(vec![
            ElementNode::new(1, "button")
                .with_child(ElementNode::new(2, "svg").with_child(ElementNode::new(3, "title").with_text("icon")))
                .with_child(ElementNode::new(4, "span").with_style("none", "visible", 1.0).with_text("tooltip"))
                .with_text("Save"),
        ]);

        let labels = compute_labels(&mut snapshot, &[]);
        assert_eq!(names(&labels), vec![("1".into(), "Save".into())]);
        let button = snapshot.find(1).unwrap();
        assert_eq!(button.get_attribute(VISIBLE_TEXT_ATTR).map(String::as_str), Some("Save"));
    }

    #[test]
    fn test_annotation_rules_run_first_with_overrides() {
        let mut snapshot = page(vec![
            ElementNode::new(1, "button").with_text("Generic"),
            ElementNode::new(2, "div").covered().with_attribute("data-action", "Compose"),
            ElementNode::new(3, "div").with_style("none", "visible", 1.0).with_text("Secret"),
        ]);
        snapshot.rule_matches = vec![vec![2], vec![3]];
        let rules = vec![
            AnnotationRule::new("[data-action]").with_attribute_as_name("data-action").allow_covered(),
            AnnotationRule::new(".secret").with_static_name("Hidden menu").allow_invisible(),
        ];

        let labels = compute_labels(&mut snapshot, &rules);

        assert_eq!(
            names(&labels),
            vec![("1".into(), "Compose".into()), ("2".into(), "Hidden menu".into()), ("3".into(), "Generic".into())]
        );
    }

    #[test]
    fn test_rule_without_override_respects_visibility() {
        let mut snapshot = page(vec![ElementNode::new(1, "div").covered().with_text("Covered")]);
        snapshot.rule_matches = vec![vec![1]];

        let labels = compute_labels(&mut snapshot, &[AnnotationRule::new("div")]);
        assert!(labels.is_empty());
    }

    #[test]
    fn test_previous_markers_cleared() {
        let mut snapshot = page(vec![
            ElementNode::new(1, "button").with_attribute(LABEL_ATTR, "17").with_attribute(VISIBLE_TEXT_ATTR, "stale").with_text("Fresh"),
        ]);

        let labels = compute_labels(&mut snapshot, &[]);
        assert_eq!(names(&labels), vec![("1".into(), "Fresh".into())]);
    }

    #[test]
    fn test_marker_patches_cover_labeled_elements() {
        let mut snapshot = page(vec![ElementNode::new(1, "button").with_text("Go")]);
        compute_labels(&mut snapshot, &[]);

        let patches = marker_patches(&snapshot);
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].node_id, 1);
        assert_eq!(patches[0].attributes.get(LABEL_ATTR).map(String::as_str), Some("1"));
    }

    #[test]
    fn test_labeling_is_idempotent() {
        let mut snapshot = page(vec![
            ElementNode::new(1, "a").with_attribute("href", "/").with_text("Home"),
            ElementNode::new(2, "input").with_attribute("placeholder", "Search"),
        ]);

        let first = names(&compute_labels(&mut snapshot, &[]));
        let first_patches = marker_patches(&snapshot);
        let second = names(&compute_labels(&mut snapshot, &[]));

        assert_eq!(first, second);
        assert_eq!(first_patches, marker_patches(&snapshot));
    }

    #[test]
    fn test_same_text_elements_get_distinct_labels() {
        let mut snapshot = page(vec![
            ElementNode::new(1, "button").with_text("Buy"),
            ElementNode::new(2, "button").with_text("Buy"),
            ElementNode::new(3, "button").with_text("Buy"),
        ]);

        let labels = compute_labels(&mut snapshot, &[]);
        assert_eq!(
            names(&labels),
            vec![("1".into(), "Buy".into()), ("2".into(), "Buy".into()), ("3".into(), "Buy".into())]
        );

        let patches = marker_patches(&snapshot);
        let nodes: Vec<_> = patches.iter().map(|p| p.node_id).collect();
        assert_eq!(nodes, [1, 2, 3]);
        let markers: Vec<_> = patches.iter().filter_map(|p| p.attributes.get(LABEL_ATTR).map(String::as_str)).collect();
        assert_eq!(markers, ["1", "2", "3"]);
    }
}
