use crate::{
    browser::{
        config::{ConnectionOptions, LaunchOptions},
        tab::{KeyEvent, KeyEventKind, MouseEvent, MouseEventKind, NodeId, ObjectId, Quad, TabHandle},
    },
    error::{AgentError, Result},
};
use async_trait::async_trait;
use headless_chrome::{
    Browser, Tab,
    protocol::cdp::{DOM, Input, Page},
};
use serde_json::Value;
use std::{
    ffi::OsStr,
    sync::{Arc, Mutex},
    time::Duration,
};

/// In-page agent script; installs `window.__webwand` once per document
const PAGE_AGENT_JS: &str = include_str!("page_agent.js");

/// Browser session that manages a Chrome/Chromium instance
pub struct BrowserSession {
    browser: Browser,
}

impl BrowserSession {
    /// Launch a new browser instance with the given options
    pub fn launch(options: LaunchOptions) -> Result<Self> {
        let mut launch_opts = headless_chrome::LaunchOptions::default();

        // Hide the automation banner and the webdriver flag
        launch_opts.ignore_default_args.push(OsStr::new("--enable-automation"));
        launch_opts.args.push(OsStr::new("--disable-blink-features=AutomationControlled"));

        // A task may sit in an approval wait for a long time
        launch_opts.idle_browser_timeout = Duration::from_secs(60 * 60);

        launch_opts.headless = options.headless;
        launch_opts.window_size = Some((options.window_width, options.window_height));
        launch_opts.path = options.chrome_path;
        launch_opts.user_data_dir = options.user_data_dir;
        launch_opts.sandbox = options.sandbox;

        let browser = Browser::new(launch_opts).map_err(|e| AgentError::LaunchFailed(e.to_string()))?;

        browser.new_tab().map_err(|e| AgentError::LaunchFailed(format!("Failed to create tab: {}", e)))?;

        Ok(Self { browser })
    }

    /// Connect to an existing browser instance via WebSocket
    pub fn connect(options: ConnectionOptions) -> Result<Self> {
        let browser = Browser::connect_with_timeout(options.ws_url, Duration::from_millis(options.timeout))
            .map_err(|e| AgentError::ConnectionFailed(e.to_string()))?;

        Ok(Self { browser })
    }

    /// Get all tabs
    pub fn get_tabs(&self) -> Result<Vec<Arc<Tab>>> {
        let tabs = self
            .browser
            .get_tabs()
            .lock()
            .map_err(|e| AgentError::TabOperationFailed(format!("Failed to get tabs: {}", e)))?
            .clone();

        Ok(tabs)
    }

    /// Get the currently active tab by checking the document visibility and focus state
    pub fn get_active_tab(&self) -> Result<Arc<Tab>> {
        let tabs = self.get_tabs()?;

        // Visible and focused first, then merely visible
        for probe in ["document.visibilityState === 'visible' && document.hasFocus()", "document.visibilityState === 'visible'"] {
            for tab in &tabs {
                match tab.evaluate(probe, false) {
                    Ok(remote_object) => {
                        if remote_object.value.and_then(|v| v.as_bool()).unwrap_or(false) {
                            return Ok(tab.clone());
                        }
                    }
                    Err(e) => log::debug!("Failed to check tab status: {}", e),
                }
            }
        }

        // Headless tabs report hidden; fall back to the first one
        tabs.first()
            .cloned()
            .ok_or_else(|| AgentError::TabOperationFailed("No active tab found".to_string()))
    }

    /// Create a new tab
    pub fn new_tab(&self) -> Result<Arc<Tab>> {
        self.browser
            .new_tab()
            .map_err(|e| AgentError::TabOperationFailed(format!("Failed to create tab: {}", e)))
    }

    /// Navigate the active tab and wait for the load to finish
    pub fn navigate(&self, url: &str) -> Result<()> {
        let tab = self.get_active_tab()?;
        tab.navigate_to(url)
            .map_err(|e| AgentError::NavigationFailed(format!("Failed to navigate to {}: {}", url, e)))?;
        tab.wait_until_navigated()
            .map_err(|e| AgentError::NavigationFailed(format!("Navigation timeout: {}", e)))?;
        Ok(())
    }

    /// A [`TabHandle`] bound to whichever tab is active when a task attaches
    pub fn active_tab_handle(self: &Arc<Self>) -> ChromeTab {
        ChromeTab::new(self.clone())
    }

    /// Get the underlying Browser instance
    pub fn browser(&self) -> &Browser {
        &self.browser
    }
}

/// [`TabHandle`] over a headless_chrome tab.
///
/// The tab is picked on `attach` and released on `detach`; every call in
/// between goes to that tab. headless_chrome is blocking, so calls run on the
/// blocking pool.
pub struct ChromeTab {
    session: Arc<BrowserSession>,
    attached: Mutex<Option<Arc<Tab>>>,
}

impl ChromeTab {
    pub fn new(session: Arc<BrowserSession>) -> Self {
        Self { session, attached: Mutex::new(None) }
    }

    fn tab(&self) -> Result<Arc<Tab>> {
        let guard = self
            .attached
            .lock()
            .map_err(|e| AgentError::ControlSession(format!("tab lock poisoned: {}", e)))?;
        match guard.as_ref() {
            Some(tab) => Ok(tab.clone()),
            None => Err(AgentError::ControlSession("no control session attached".to_string())),
        }
    }

    async fn with_tab<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Arc<Tab>) -> Result<T> + Send + 'static,
    {
        let tab = self.tab()?;
        tokio::task::spawn_blocking(move || f(tab))
            .await
            .map_err(|e| AgentError::ControlSession(format!("blocking task failed: {}", e)))?
    }
}

/// CDP answers a selector without a match with node id 0
fn matched_node(node_id: u32) -> Option<NodeId> {
    (node_id != 0).then_some(NodeId(node_id))
}

/// Whether a `DOM.querySelector` failure means "nothing there" rather than a broken session
fn is_no_match(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    ["could not find node", "no node", "error while querying", "not a valid selector"]
        .iter()
        .any(|needle| message.contains(needle))
}

fn remote(e: impl std::fmt::Display) -> AgentError {
    AgentError::ControlSession(e.to_string())
}

#[async_trait]
impl TabHandle for ChromeTab {
    async fn attach(&self) -> Result<()> {
        let session = self.session.clone();
        let tab = tokio::task::spawn_blocking(move || session.get_active_tab())
            .await
            .map_err(remote)?
            .map_err(|e| AgentError::ControlSession(format!("attach failed: {}", e)))?;

        let mut guard = self.attached.lock().map_err(remote)?;
        *guard = Some(tab);
        Ok(())
    }

    async fn detach(&self) -> Result<()> {
        let mut guard = self.attached.lock().map_err(remote)?;
        if guard.take().is_some() {
            log::debug!("control session detached");
        }
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.tab()?.get_url())
    }

    async fn query_selector(&self, selector: &str) -> Result<Option<NodeId>> {
        let selector = selector.to_string();
        self.with_tab(move |tab| {
            let root = tab.get_document().map_err(remote)?.node_id;
            let found = tab.call_method(DOM::QuerySelector { node_id: root, selector: selector.clone() });
            match found {
                Ok(found) => Ok(matched_node(found.node_id)),
                Err(e) if is_no_match(&e.to_string()) => {
                    log::debug!("querySelector `{}` matched nothing: {}", selector, e);
                    Ok(None)
                }
                Err(e) => Err(AgentError::TabOperationFailed(format!("querySelector `{}`: {}", selector, e))),
            }
        })
        .await
    }

    async fn resolve_node(&self, node: NodeId) -> Result<Option<ObjectId>> {
        self.with_tab(move |tab| {
            let resolved = tab
                .call_method(DOM::ResolveNode {
                    node_id: Some(node.0),
                    backend_node_id: None,
                    object_group: None,
                    execution_context_id: None,
                })
                .map_err(remote)?;
            Ok(resolved.object.object_id.map(ObjectId))
        })
        .await
    }

    async fn box_model(&self, object: &ObjectId) -> Result<Quad> {
        let object_id = object.0.clone();
        self.with_tab(move |tab| {
            let model = tab
                .call_method(DOM::GetBoxModel { node_id: None, backend_node_id: None, object_id: Some(object_id) })
                .map_err(remote)?
                .model;
            Quad::from_slice(&model.border).ok_or_else(|| AgentError::ControlSession("malformed box model".into()))
        })
        .await
    }

    async fn dispatch_mouse_event(&self, event: MouseEvent) -> Result<()> {
        self.with_tab(move |tab| {
            let event_type = match event.kind {
                MouseEventKind::Pressed => Input::DispatchMouseEventTypeOption::MousePressed,
                MouseEventKind::Released => Input::DispatchMouseEventTypeOption::MouseReleased,
                MouseEventKind::Moved => Input::DispatchMouseEventTypeOption::MouseMoved,
            };
            tab.call_method(Input::DispatchMouseEvent {
                Type: event_type,
                x: event.at.x,
                y: event.at.y,
                modifiers: None,
                timestamp: None,
                button: Some(Input::MouseButton::Left),
                buttons: None,
                click_count: Some(event.click_count),
                force: None,
                tangential_pressure: None,
                tilt_x: None,
                tilt_y: None,
                twist: None,
                delta_x: None,
                delta_y: None,
                pointer_Type: None,
            })
            .map_err(remote)?;
            Ok(())
        })
        .await
    }

    async fn dispatch_key_event(&self, event: KeyEvent) -> Result<()> {
        self.with_tab(move |tab| {
            let event_type = match event.kind {
                KeyEventKind::KeyDown => Input::DispatchKeyEventTypeOption::KeyDown,
                KeyEventKind::KeyUp => Input::DispatchKeyEventTypeOption::KeyUp,
                KeyEventKind::RawKeyDown => Input::DispatchKeyEventTypeOption::RawKeyDown,
                KeyEventKind::Char => Input::DispatchKeyEventTypeOption::Char,
            };
            let commands = (!event.commands.is_empty()).then_some(event.commands);
            tab.call_method(Input::DispatchKeyEvent {
                Type: event_type,
                modifiers: Some(event.modifiers),
                timestamp: None,
                text: event.text.clone(),
                unmodified_text: event.text,
                key_identifier: None,
                code: event.code,
                key: event.key,
                windows_virtual_key_code: event.windows_virtual_key_code,
                native_virtual_key_code: event.windows_virtual_key_code,
                auto_repeat: None,
                is_keypad: None,
                is_system_key: None,
                location: None,
                commands,
            })
            .map_err(remote)?;
            Ok(())
        })
        .await
    }

    async fn evaluate(&self, expression: &str) -> Result<Value> {
        let expression = expression.to_string();
        self.with_tab(move |tab| {
            let result = tab.evaluate(&expression, true).map_err(remote)?;
            Ok(result.value.unwrap_or(Value::Null))
        })
        .await
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        let url = url.to_string();
        self.with_tab(move |tab| {
            tab.navigate_to(&url)
                .map_err(|e| AgentError::NavigationFailed(format!("Failed to navigate to {}: {}", url, e)))?;
            tab.wait_until_navigated()
                .map_err(|e| AgentError::NavigationFailed(format!("Navigation timeout: {}", e)))?;
            Ok(())
        })
        .await
    }

    async fn capture_visible_tab(&self) -> Result<Vec<u8>> {
        self.with_tab(|tab| {
            tab.capture_screenshot(Page::CaptureScreenshotFormatOption::Png, None, None, true)
                .map_err(|e| AgentError::TabOperationFailed(format!("Screenshot failed: {}", e)))
        })
        .await
    }

    async fn call_rpc(&self, method: &str, args: Value) -> Result<Value> {
        let expression = rpc_expression(method, &args)?;
        let value = self.evaluate(&expression).await?;

        // The agent script answers with a JSON string
        let text = value
            .as_str()
            .ok_or_else(|| AgentError::DomParseFailed(format!("rpc `{}` returned no value", method)))?;
        serde_json::from_str(text).map_err(|e| AgentError::DomParseFailed(format!("rpc `{}`: {}", method, e)))
    }
}

/// Expression installing the agent script and calling `method` with `args`
pub(crate) fn rpc_expression(method: &str, args: &Value) -> Result<String> {
    let args = match args {
        Value::Array(_) => args.clone(),
        Value::Null => Value::Array(Vec::new()),
        other => Value::Array(vec![other.clone()]),
    };
    Ok(format!(
        "(async () => {{ {script}\n const result = await window.__webwand[{method}](...{args}); return JSON.stringify(result === undefined ? null : result); }})()",
        script = PAGE_AGENT_JS,
        method = serde_json::to_string(method)?,
        args = serde_json::to_string(&args)?,
    ))
}
