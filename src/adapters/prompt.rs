use crate::models::ChatMessage;

pub const PARALLEL_TASK_DIRECTIVE: &str = "When this request contains independent subtasks, \
run them in parallel using concurrent tool calls or sub-agents, then combine their results \
into a single answer.";

/// Renders each fragment as `ROLE:\n<content>\n`, joined by a blank line.
pub fn render_messages(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(|message| {
            let role = message.role.trim();
            let role = if role.is_empty() { "user" } else { role };
            format!("{}:\n{}\n", role.to_uppercase(), message.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn compose_text_prompt(prompt: &str, instruction: Option<&str>, parallel_tasks: bool) -> String {
    let body = with_directive(prompt.to_string(), parallel_tasks);
    match non_blank(instruction) {
        Some(instruction) => format!(
            "SYSTEM INSTRUCTION:\n{}\n\nUSER MESSAGE:\n{}\n",
            instruction, body
        ),
        None => body,
    }
}

pub fn compose_message_prompt(
    messages: &[ChatMessage],
    instruction: Option<&str>,
    parallel_tasks: bool,
) -> String {
    let body = with_directive(render_messages(messages), parallel_tasks);
    match non_blank(instruction) {
        Some(instruction) => {
            let header = render_messages(&[ChatMessage::system(instruction)]);
            if body.is_empty() {
                header
            } else {
                format!("{}\n{}", header, body)
            }
        }
        None => body,
    }
}

fn with_directive(body: String, parallel_tasks: bool) -> String {
    if parallel_tasks {
        format!("{}\n\n{}", PARALLEL_TASK_DIRECTIVE, body)
    } else {
        body
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.trim().is_empty())
}
