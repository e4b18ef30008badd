//! Page model and element grounding
//!
//! - [`DomSnapshot`]: the page body as captured by the in-page agent
//! - [`grounder`]: visibility, naming and labeling of actionable elements
//! - [`LabelMap`]: the labels of one perception cycle

pub mod element;
pub mod grounder;
pub mod label_map;
pub mod snapshot;

pub use element::{BoundingBox, ComputedStyle, DomNode, ElementNode};
pub use grounder::{MarkerPatch, compute_labels, ground, marker_patches, sanitize_name};
pub use label_map::{LabelMap, LabelRecord, marker_selector};
pub use snapshot::{DomSnapshot, Viewport};
