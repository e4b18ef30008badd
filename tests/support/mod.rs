//! In-memory page and model doubles for driving the task loop without Chrome.

#![allow(dead_code)]

use async_trait::async_trait;
use image::{DynamicImage, ImageOutputFormat, Rgba, RgbaImage};
use serde_json::{Value, json};
use std::{
    collections::{HashMap, VecDeque},
    io::Cursor,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};
use webwand::{
    AgentError, ModelClient, ModelRequest, ModelResponse, ProviderError, Result,
    browser::{KeyEvent, MouseEvent, NodeId, ObjectId, Quad, TabHandle},
    dom::{DomSnapshot, ElementNode, Viewport, label_map::attribute_selector},
};

/// A page with a button (label 1) and a search box (label 2)
pub fn shop_page() -> DomSnapshot {
    let root = ElementNode::new(0, "body")
        .with_bounding_box(0.0, 0.0, 800.0, 600.0)
        .with_child(ElementNode::new(1, "button").with_bounding_box(10.0, 20.0, 100.0, 40.0).with_text("Add to cart"))
        .with_child(
            ElementNode::new(2, "input")
                .with_attribute("type", "text")
                .with_attribute("placeholder", "Search")
                .with_bounding_box(10.0, 100.0, 200.0, 30.0),
        );
    DomSnapshot::new(root, Viewport::new(800.0, 600.0))
}

pub fn tiny_png() -> Vec<u8> {
    let img = RgbaImage::from_pixel(4, 3, Rgba([200, 200, 200, 255]));
    let mut out = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut out), ImageOutputFormat::Png)
        .unwrap();
    out
}

/// Tab double: serves one page snapshot and records what the agent does to it
pub struct FakeTab {
    page: Value,
    url: Mutex<String>,
    /// Marker selector to node, filled by `applyMarkers`
    markers: Mutex<HashMap<String, u32>>,
    pub mouse: Mutex<Vec<MouseEvent>>,
    pub keys: Mutex<Vec<KeyEvent>>,
    pub rpc: Mutex<Vec<String>>,
    pub navigations: Mutex<Vec<String>>,
    pub attaches: AtomicUsize,
    pub detaches: AtomicUsize,
    pub fail_attach: bool,
}

impl FakeTab {
    pub fn new(page: DomSnapshot) -> Self {
        Self {
            page: serde_json::to_value(page).unwrap(),
            url: Mutex::new("https://shop.test/".to_string()),
            markers: Mutex::new(HashMap::new()),
            mouse: Mutex::new(Vec::new()),
            keys: Mutex::new(Vec::new()),
            rpc: Mutex::new(Vec::new()),
            navigations: Mutex::new(Vec::new()),
            attaches: AtomicUsize::new(0),
            detaches: AtomicUsize::new(0),
            fail_attach: false,
        }
    }

    pub fn shop() -> Self {
        Self::new(shop_page())
    }

    pub fn failing_attach(mut self) -> Self {
        self.fail_attach = true;
        self
    }

    pub fn rpc_count(&self, method: &str) -> usize {
        self.rpc.lock().unwrap().iter().filter(|m| m.as_str() == method).count()
    }

    pub fn detach_count(&self) -> usize {
        self.detaches.load(Ordering::SeqCst)
    }

    fn apply_markers(&self, patches: &Value) {
        let mut markers = self.markers.lock().unwrap();
        markers.clear();
        for patch in patches.as_array().into_iter().flatten() {
            let node = patch["nodeId"].as_u64().unwrap_or_default() as u32;
            for (name, value) in patch["attributes"].as_object().into_iter().flatten() {
                markers.insert(attribute_selector(name, value.as_str().unwrap_or_default()), node);
            }
        }
    }
}

#[async_trait]
impl TabHandle for FakeTab {
    async fn attach(&self) -> Result<()> {
        self.attaches.fetch_add(1, Ordering::SeqCst);
        if self.fail_attach {
            return Err(AgentError::TabOperationFailed("Another debugger is already attached".into()));
        }
        Ok(())
    }

    async fn detach(&self) -> Result<()> {
        self.detaches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.url.lock().unwrap().clone())
    }

    async fn query_selector(&self, selector: &str) -> Result<Option<NodeId>> {
        if selector.starts_with('#') {
            return Err(AgentError::TabOperationFailed(format!("invalid selector {}", selector)));
        }
        Ok(self.markers.lock().unwrap().get(selector).map(|node| NodeId(*node)))
    }

    async fn resolve_node(&self, node: NodeId) -> Result<Option<ObjectId>> {
        Ok(Some(ObjectId(format!("node-{}", node.0))))
    }

    async fn box_model(&self, _object: &ObjectId) -> Result<Quad> {
        Ok(Quad([10.0, 20.0, 110.0, 20.0, 110.0, 60.0, 10.0, 60.0]))
    }

    async fn dispatch_mouse_event(&self, event: MouseEvent) -> Result<()> {
        self.mouse.lock().unwrap().push(event);
        Ok(())
    }

    async fn dispatch_key_event(&self, event: KeyEvent) -> Result<()> {
        self.keys.lock().unwrap().push(event);
        Ok(())
    }

    async fn evaluate(&self, _expression: &str) -> Result<Value> {
        Ok(Value::Null)
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        self.navigations.lock().unwrap().push(url.to_string());
        *self.url.lock().unwrap() = url.to_string();
        Ok(())
    }

    async fn capture_visible_tab(&self) -> Result<Vec<u8>> {
        Ok(tiny_png())
    }

    async fn call_rpc(&self, method: &str, args: Value) -> Result<Value> {
        self.rpc.lock().unwrap().push(method.to_string());
        match method {
            "snapshotDom" => Ok(self.page.clone()),
            "applyMarkers" => {
                self.apply_markers(&args[0]);
                Ok(Value::Null)
            }
            "domSize" => Ok(json!(2048)),
            _ => Ok(Value::Null),
        }
    }
}

enum Script {
    Queue(Mutex<VecDeque<std::result::Result<String, ProviderError>>>),
    Repeat(String),
    Hang,
}

/// Model double. Action requests (JSON mode) are answered from the script,
/// checkpoint questions from `verdicts`, defaulting to "false".
pub struct ScriptedModel {
    script: Script,
    verdicts: Mutex<VecDeque<String>>,
    pub action_calls: AtomicUsize,
    pub checkpoint_calls: AtomicUsize,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    fn with_script(script: Script) -> Self {
        Self {
            script,
            verdicts: Mutex::new(VecDeque::new()),
            action_calls: AtomicUsize::new(0),
            checkpoint_calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn replies<S: Into<String>>(replies: impl IntoIterator<Item = S>) -> Self {
        Self::with_script(Script::Queue(Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect())))
    }

    pub fn results(results: Vec<std::result::Result<String, ProviderError>>) -> Self {
        Self::with_script(Script::Queue(Mutex::new(results.into())))
    }

    pub fn repeating(reply: impl Into<String>) -> Self {
        Self::with_script(Script::Repeat(reply.into()))
    }

    /// Never answers
    pub fn hanging() -> Self {
        Self::with_script(Script::Hang)
    }

    pub fn with_verdicts(self, verdicts: &[&str]) -> Self {
        *self.verdicts.lock().unwrap() = verdicts.iter().map(|v| v.to_string()).collect();
        self
    }

    pub fn action_count(&self) -> usize {
        self.action_calls.load(Ordering::SeqCst)
    }

    pub fn checkpoint_count(&self) -> usize {
        self.checkpoint_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn send(&self, request: &ModelRequest) -> std::result::Result<ModelResponse, ProviderError> {
        if !request.json_mode {
            self.checkpoint_calls.fetch_add(1, Ordering::SeqCst);
            let verdict = self.verdicts.lock().unwrap().pop_front().unwrap_or_else(|| "false".to_string());
            return Ok(ModelResponse { text: verdict, usage: None });
        }

        self.action_calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(request.prompt.clone());
        let text = match &self.script {
            Script::Queue(queue) => {
                let next = queue.lock().unwrap().pop_front();
                next.unwrap_or_else(|| Err(ProviderError::InvalidRequest("script exhausted".into())))?
            }
            Script::Repeat(reply) => reply.clone(),
            Script::Hang => std::future::pending().await,
        };
        Ok(ModelResponse { text, usage: None })
    }
}

pub fn reply(thought: &str, action: Value) -> String {
    json!({ "thought": thought, "action": action }).to_string()
}
