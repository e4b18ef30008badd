use std::{sync::Arc, time::Duration};
use webwand::{
    AgentConfig, AgentMode, BrowserSession, ChromeTab, LaunchOptions, TabHandle,
    action::{Action, Operation},
    dom::ground,
    executor::{ActionExecutor, Execution},
    perception::PerceptionCapturer,
};

fn data_url(html: &str) -> String {
    format!("data:text/html,{}", urlencoding::encode(html))
}

fn open(html: &str) -> ChromeTab {
    let session = Arc::new(BrowserSession::launch(LaunchOptions::new().headless(true)).expect("Failed to launch browser"));
    session.navigate(&data_url(html)).expect("Failed to navigate");

    // Small delay to let page render
    std::thread::sleep(Duration::from_millis(500));
    session.active_tab_handle()
}

const FORM: &str = r#"<html><body>
    <button id="go" onclick="document.title = 'clicked'">Go</button>
    <input id="q" placeholder="Search">
    <div>plain text</div>
</body></html>"#;

#[tokio::test]
#[ignore] // Requires Chrome to be installed
async fn test_ground_labels_interactive_elements() {
    let tab = open(FORM);
    tab.attach().await.expect("Failed to attach");

    let (snapshot, labels) = ground(&tab, &[]).await.expect("Failed to ground");
    let names: Vec<_> = labels.records().map(|r| r.name.as_str()).collect();
    assert_eq!(names, ["Go", "Search"]);
    assert!(snapshot.to_simplified_html().contains("plain text"));

    let marked = tab.evaluate("document.querySelector('[data-wand-label=\"1\"]').id").await.unwrap();
    assert_eq!(marked, "go");
    tab.detach().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_click_by_label() {
    let tab = open(FORM);
    tab.attach().await.unwrap();
    ground(&tab, &[]).await.unwrap();

    let config = AgentConfig::default();
    let executor = ActionExecutor::new(&tab, &config);
    let outcome = executor.execute(&Action::new("go", Operation::Click { label: "1".into() })).await.unwrap();
    assert_eq!(outcome, Execution::Performed);

    let title = tab.evaluate("document.title").await.unwrap();
    assert_eq!(title, "clicked");
}

#[tokio::test]
#[ignore]
async fn test_set_value_by_label() {
    let tab = open(FORM);
    tab.attach().await.unwrap();
    ground(&tab, &[]).await.unwrap();

    let config = AgentConfig::default();
    let executor = ActionExecutor::new(&tab, &config);
    executor
        .execute(&Action::new("type", Operation::SetValue { label: "2".into(), value: "rust".into() }))
        .await
        .unwrap();

    let value = tab.evaluate("document.getElementById('q').value").await.unwrap();
    assert_eq!(value, "rust");
}

#[tokio::test]
#[ignore]
async fn test_vision_perception_leaves_no_overlay() {
    let tab = open(FORM);
    tab.attach().await.unwrap();

    let capturer = PerceptionCapturer::new(&AgentConfig::default()).unwrap();
    let perception = capturer.capture(&tab, AgentMode::Vision, &[]).await.expect("Failed to capture");

    assert!(perception.image_data().is_some_and(|url| url.starts_with("data:image/png;base64,")));
    assert_eq!(perception.labels.len(), 2);

    let overlay_gone = tab.evaluate("document.getElementById('__webwand-overlay') === null").await.unwrap();
    assert_eq!(overlay_gone, true);
}

#[tokio::test]
#[ignore]
async fn test_overlay_hides_body_and_covered_button() {
    let tab = open(
        r#"<html><body>
        <button id="under">Hidden</button>
        <div style="position:fixed;top:0;left:0;width:100vw;height:100vh;background:white"></div>
    </body></html>"#,
    );
    tab.attach().await.unwrap();

    let (snapshot, labels) = ground(&tab, &[]).await.unwrap();
    assert!(!snapshot.root.is_top_element);
    assert!(labels.is_empty());
}
