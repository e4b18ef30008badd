//! Browser control
//!
//! - [`BrowserSession`]: launch of or connection to a Chrome instance
//! - [`TabHandle`]: the page-control surface the agent drives
//! - [`ChromeTab`]: `TabHandle` over the active Chrome tab

pub mod config;
pub mod session;
pub mod tab;

pub use config::{ConnectionOptions, LaunchOptions};
pub use session::{BrowserSession, ChromeTab};
pub use tab::{KeyEvent, KeyEventKind, MouseEvent, MouseEventKind, NodeId, ObjectId, Point, Quad, TabHandle, modifiers};
