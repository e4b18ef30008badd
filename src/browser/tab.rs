//! The page-control surface the agent drives.
//!
//! Everything the loop does to a page goes through [`TabHandle`]; the Chrome
//! implementation lives in [`super::session::ChromeTab`], tests use an
//! in-memory double.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Remote DOM node id, valid until the next document change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

/// Remote JavaScript object id of a resolved node
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectId(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Border quad of an element, four corners clockwise from top-left
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quad(pub [f64; 8]);

impl Quad {
    /// Build from a CDP box-model quad; `None` when the slice is short
    pub fn from_slice(points: &[f64]) -> Option<Self> {
        let corners: [f64; 8] = points.get(..8)?.try_into().ok()?;
        Some(Self(corners))
    }

    /// Midpoint of the diagonal between the first and third corner
    pub fn center(&self) -> Point {
        let [x1, y1, _, _, x3, y3, _, _] = self.0;
        Point { x: (x1 + x3) / 2.0, y: (y1 + y3) / 2.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MouseEventKind {
    Pressed,
    Released,
    Moved,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MouseEvent {
    pub kind: MouseEventKind,
    pub at: Point,
    pub click_count: u32,
}

impl MouseEvent {
    pub fn new(kind: MouseEventKind, at: Point) -> Self {
        Self { kind, at, click_count: 1 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyEventKind {
    KeyDown,
    KeyUp,
    RawKeyDown,
    Char,
}

/// Modifier bit mask as used by the DevTools input domain
pub mod modifiers {
    pub const NONE: u32 = 0;
    pub const ALT: u32 = 1;
    pub const CTRL: u32 = 2;
    pub const META: u32 = 4;
    pub const SHIFT: u32 = 8;

    /// The modifier that drives editing shortcuts on this platform
    pub fn platform_command() -> u32 {
        if cfg!(target_os = "macos") { META } else { CTRL }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyEvent {
    pub kind: KeyEventKind,
    pub modifiers: u32,
    pub text: Option<String>,
    pub key: Option<String>,
    pub code: Option<String>,
    pub windows_virtual_key_code: Option<u32>,
    /// Editing commands such as `selectAll`
    pub commands: Vec<String>,
}

impl KeyEvent {
    pub fn new(kind: KeyEventKind) -> Self {
        Self {
            kind,
            modifiers: modifiers::NONE,
            text: None,
            key: None,
            code: None,
            windows_virtual_key_code: None,
            commands: Vec::new(),
        }
    }

    /// Builder method: set the produced text
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Builder method: set modifier mask
    pub fn with_modifiers(mut self, modifiers: u32) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// Builder method: set key name and code
    pub fn with_key(mut self, key: impl Into<String>, code: impl Into<String>, virtual_key_code: u32) -> Self {
        self.key = Some(key.into());
        self.code = Some(code.into());
        self.windows_virtual_key_code = Some(virtual_key_code);
        self
    }

    /// Builder method: attach an editing command
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.commands.push(command.into());
        self
    }
}

/// A controllable browser tab
#[async_trait]
pub trait TabHandle: Send + Sync {
    /// Acquire the debugger control session for this tab
    async fn attach(&self) -> Result<()>;

    /// Release the control session; safe to call when not attached
    async fn detach(&self) -> Result<()>;

    async fn current_url(&self) -> Result<String>;

    /// First node matching `selector`, `None` when nothing matches
    async fn query_selector(&self, selector: &str) -> Result<Option<NodeId>>;

    async fn resolve_node(&self, node: NodeId) -> Result<Option<ObjectId>>;

    /// Border quad of a resolved node
    async fn box_model(&self, object: &ObjectId) -> Result<Quad>;

    async fn dispatch_mouse_event(&self, event: MouseEvent) -> Result<()>;

    async fn dispatch_key_event(&self, event: KeyEvent) -> Result<()>;

    /// Evaluate an expression in the page and return its JSON value
    async fn evaluate(&self, expression: &str) -> Result<Value>;

    async fn navigate(&self, url: &str) -> Result<()>;

    /// PNG bytes of the visible viewport
    async fn capture_visible_tab(&self) -> Result<Vec<u8>>;

    /// Call a method of the in-page agent script with a JSON array of arguments
    async fn call_rpc(&self, method: &str, args: Value) -> Result<Value>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quad_center() {
        let quad = Quad::from_slice(&[10.0, 20.0, 110.0, 20.0, 110.0, 60.0, 10.0, 60.0]).unwrap();
        assert_eq!(quad.center(), Point { x: 60.0, y: 40.0 });
    }

    #[test]
    fn test_quad_from_short_slice() {
        assert!(Quad::from_slice(&[1.0, 2.0, 3.0]).is_none());
    }

    #[test]
    fn test_key_event_builder() {
        let event = KeyEvent::new(KeyEventKind::KeyDown)
            .with_modifiers(modifiers::CTRL)
            .with_text("A")
            .with_command("selectAll");

        assert_eq!(event.modifiers, 2);
        assert_eq!(event.text.as_deref(), Some("A"));
        assert_eq!(event.commands, vec!["selectAll".to_string()]);
    }
}
