use crate::{
    action::ScrollDirection,
    browser::{KeyEvent, KeyEventKind, MouseEvent, MouseEventKind, Point, TabHandle, modifiers},
    config::AgentConfig,
    dom::label_map::{VISIBLE_TEXT_ATTR, attribute_selector, marker_selector},
    error::{AgentError, Result},
};
use serde_json::json;
use std::time::Duration;
use tokio::time::{Instant, sleep};

const ENTER_KEY_CODE: u32 = 13;

/// Low level input primitives against one tab
pub struct DomActions<'a> {
    tab: &'a dyn TabHandle,
    config: &'a AgentConfig,
}

impl<'a> DomActions<'a> {
    pub fn new(tab: &'a dyn TabHandle, config: &'a AgentConfig) -> Self {
        Self { tab, config }
    }

    /// Screen coordinate of the element carrying `label`.
    ///
    /// Tries `#label`, then the label marker, then the visible-text marker.
    /// Returns [`AgentError::Grounding`] when none of them resolves.
    pub async fn locate(&self, label: &str) -> Result<Point> {
        let selectors = [
            format!("#{}", label),
            marker_selector(label),
            attribute_selector(VISIBLE_TEXT_ATTR, label),
        ];

        for (i, selector) in selectors.iter().enumerate() {
            let node = match self.tab.query_selector(selector).await {
                Ok(node) => node,
                // Labels such as `12` are not valid CSS identifiers
                Err(e) if i == 0 => {
                    log::debug!("selector `{}` rejected: {}", selector, e);
                    None
                }
                Err(e) => return Err(e),
            };
            let Some(node) = node else { continue };

            let object = self
                .tab
                .resolve_node(node)
                .await?
                .ok_or_else(|| AgentError::Grounding(format!("node for `{}` has no remote object", selector)))?;
            let quad = self.tab.box_model(&object).await?;
            return Ok(quad.center());
        }

        Err(AgentError::Grounding(format!("no element labeled `{}`", label)))
    }

    /// Left click at `at`, with the ripple cue
    pub async fn click_at(&self, at: Point) -> Result<()> {
        if let Err(e) = self.tab.call_rpc("ripple", json!([at.x, at.y])).await {
            log::debug!("ripple failed: {}", e);
        }

        self.tab.dispatch_mouse_event(MouseEvent::new(MouseEventKind::Pressed, at)).await?;
        sleep(self.config.mouse_press_gap).await;
        self.tab.dispatch_mouse_event(MouseEvent::new(MouseEventKind::Released, at)).await?;
        sleep(self.config.click_settle).await;
        Ok(())
    }

    /// Select everything in the focused field
    pub async fn select_all(&self) -> Result<()> {
        let event = KeyEvent::new(KeyEventKind::KeyDown)
            .with_modifiers(modifiers::platform_command())
            .with_key("a", "KeyA", 65)
            .with_text("A")
            .with_command("selectAll");
        self.tab.dispatch_key_event(event).await?;
        sleep(self.config.select_all_settle).await;
        Ok(())
    }

    /// Type `text` one character at a time
    pub async fn type_text(&self, text: &str) -> Result<()> {
        let half_cycle = self.config.keystroke_delay / 2;

        for ch in text.chars() {
            if ch == '\n' {
                self.press_enter().await?;
                continue;
            }

            let text = ch.to_string();
            self.tab.dispatch_key_event(KeyEvent::new(KeyEventKind::KeyDown).with_text(text.clone())).await?;
            sleep(half_cycle).await;
            self.tab.dispatch_key_event(KeyEvent::new(KeyEventKind::KeyUp).with_text(text)).await?;
            sleep(half_cycle).await;
        }
        Ok(())
    }

    async fn press_enter(&self) -> Result<()> {
        let enter = |kind| KeyEvent::new(kind).with_key("Enter", "Enter", ENTER_KEY_CODE);

        self.tab.dispatch_key_event(enter(KeyEventKind::RawKeyDown)).await?;
        self.tab.dispatch_key_event(enter(KeyEventKind::Char).with_text("\r")).await?;
        self.tab.dispatch_key_event(enter(KeyEventKind::KeyUp)).await?;
        sleep(self.config.keystroke_delay).await;
        Ok(())
    }

    pub async fn scroll(&self, direction: ScrollDirection) -> Result<()> {
        self.tab.call_rpc("scrollPage", json!([direction.as_str()])).await?;
        sleep(self.config.scroll_settle).await;
        Ok(())
    }

    /// Wait until the document size stops changing.
    ///
    /// Gives up with a warning after `stability_timeout`; a page that never
    /// settles still gets acted upon.
    pub async fn wait_till_stable(&self) -> Result<()> {
        let deadline = Instant::now() + self.config.stability_timeout;
        let mut last_size = 0u64;
        let mut equal_run = 0;

        loop {
            let size = self.tab.call_rpc("domSize", json!([])).await?.as_u64().unwrap_or(0);

            equal_run = match size {
                0 => 0,
                _ if size == last_size => equal_run + 1,
                _ => 1,
            };
            last_size = size;

            if equal_run >= self.config.stability_checks {
                log::debug!("page stable at {} bytes", size);
                return Ok(());
            }
            if Instant::now() >= deadline {
                log::warn!("page did not settle within {:?}, continuing", self.config.stability_timeout);
                return Ok(());
            }
            sleep(self.config.stability_interval.max(Duration::from_millis(1))).await;
        }
    }
}
