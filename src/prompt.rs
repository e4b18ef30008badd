//! Prompt construction for the next-action query.

use crate::{
    action::{ParseError, ResponseEnvelope, tool_descriptions},
    config::AgentMode,
    dom::LabelRecord,
    knowledge::Knowledge,
    llm::ModelRequest,
    perception::{Perception, PerceptionContent},
    task::HistoryEntry,
};
use chrono::Local;
use serde_json::Value;

const EXAMPLE_RESPONSE: &str = r#"{
  "thought": "I am clicking the add to cart button",
  "action": {
    "name": "click",
    "args": {
      "label": "123"
    }
  }
}"#;

/// System message for `mode`, listing the tools and the response schema
pub fn system_message(mode: AgentMode) -> String {
    let schema = serde_json::to_string_pretty(&schemars::schema_for!(ResponseEnvelope)).unwrap_or_default();

    let input = match mode {
        AgentMode::Vision => {
            "You will be given a task to perform, and an image. The image will contain two parts: on the left is a clean screenshot of the current page, and on the right is the same screenshot with interactive elements annotated with corresponding label."
        }
        AgentMode::Text => {
            "You will be given a task to perform and a simplified HTML of the current page. Interactive elements carry their label as the `id` attribute."
        }
    };

    format!(
        r#"You are a browser automation assistant.

You can use the following tools:

{tools}
{input}
You will also be given previous actions that you have taken. You may retry a failed action up to one time.
You will also be given additional information of annotations.

This is an example of expected response from you:

{example}

Your response must always be a single JSON object that follows this schema:

{schema}

It must include string "thought" and object "action", which contains the string "name" of tool of choice, and necessary arguments ("args") if required by the tool.
When finish, use the "finish" action and include a brief summary of the task in "thought"; if user is seeking an answer, also include the answer in "thought".
"#,
        tools = tool_descriptions(),
        input = input,
        example = EXAMPLE_RESPONSE,
        schema = schema,
    )
}

/// Everything the user prompt is built from
pub struct PromptContext<'a> {
    pub instructions: &'a str,
    pub history: &'a [HistoryEntry],
    pub knowledge: &'a Knowledge,
    pub perception: &'a Perception,
    /// Set when the previous response of this iteration could not be parsed
    pub parse_error: Option<&'a ParseError>,
}

/// User prompt for the next-action query
pub fn format_prompt(ctx: &PromptContext<'_>) -> String {
    let mut prompt = format!("The user requests the following task:\n\n{}\n\n", ctx.instructions);

    if !ctx.history.is_empty() {
        let previous = ctx.history.iter().map(HistoryEntry::describe).collect::<Vec<_>>().join("\n\n");
        prompt.push_str(&format!("You have already taken the following actions: \n{}\n\n", previous));
    }

    if let Some(error) = ctx.parse_error {
        prompt.push_str(&format!(
            "Your previous response could not be used: {}\nAnswer again with exactly one JSON object.\n\n",
            error
        ));
    }

    prompt.push_str(&format!("Current time: {}\n", Local::now().format("%Y-%m-%d %H:%M:%S")));
    prompt.push_str(&format!("Current page progress: {:.1}%", ctx.perception.viewport_percentage));

    if !ctx.knowledge.notes.is_empty() {
        prompt.push_str("\n\nNotes regarding the current website:\n");
        let notes: Vec<String> = ctx.knowledge.notes.iter().map(|note| format!("  - {}", note)).collect();
        prompt.push_str(&notes.join("\n"));
    }

    if let PerceptionContent::Html(html) = &ctx.perception.content {
        prompt.push_str(&format!("\n\nCurrent page:\n{}", html));
    }

    prompt.push_str(
        "\n\nUse the following data as a reference of the annotated elements (using `===` as a delimiter between each annotation):\n\n",
    );
    prompt.push_str(&format_labels(&ctx.perception.labels));
    prompt
}

/// `key = json` lines per record, records separated by `===`
pub fn format_labels(labels: &[LabelRecord]) -> String {
    labels.iter().map(label_lines).collect::<Vec<_>>().join("\n===\n")
}

fn label_lines(record: &LabelRecord) -> String {
    let mut fields = vec![("label", &record.label), ("name", &record.name), ("tagName", &record.tag_name)];
    if let Some(role) = &record.role {
        fields.push(("role", role));
    }
    fields.iter().map(|(key, value)| format!("{} = {}", key, Value::from(value.as_str()))).collect::<Vec<_>>().join("\n")
}

/// The request sent for one attempt
pub fn next_action_request(system: &str, prompt: String, perception: &Perception) -> ModelRequest {
    let request = ModelRequest::new(prompt).with_system(system).json();
    match perception.image_data() {
        Some(image) => request.with_image(image),
        None => request,
    }
}
