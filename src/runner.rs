use crate::adapters::claude::{parse_output, ERROR_PREFIX};
use crate::adapters::command::{build_argv, CommandOverrides, RESUME_FLAG};
use crate::adapters::prompt::{compose_message_prompt, compose_text_prompt};
use crate::adapters::ValidatedCommand;
use crate::errors::{AppError, AppResult};
use crate::models::{AdapterConfig, CallRequest, PromptInput, ResultRecord};
use crate::process::{CommandRunner, ProcessOutcome, TokioCommandRunner};
use crate::redaction::Redactor;
use crate::session::SessionState;
use std::time::Duration;

/// API-style front end over the Claude CLI.
///
/// Calls take `&mut self`: session resumption reads the id produced by the
/// previous call, so calls on one adapter must be sequential. Separate
/// adapters share nothing and can run concurrently.
pub struct ClaudeCliAdapter<R = TokioCommandRunner> {
    config: AdapterConfig,
    instruction: Option<String>,
    session: SessionState,
    runner: R,
    redactor: Redactor,
}

impl ClaudeCliAdapter<TokioCommandRunner> {
    pub fn new(config: AdapterConfig) -> AppResult<Self> {
        Self::with_runner(config, TokioCommandRunner)
    }
}

impl<R: CommandRunner> ClaudeCliAdapter<R> {
    pub fn with_runner(config: AdapterConfig, runner: R) -> AppResult<Self> {
        config.validate()?;
        tracing::info!(
            cli_path = %config.cli_path,
            project_path = ?config.project_path,
            model = ?config.model,
            timeout_secs = config.timeout.as_secs_f64(),
            output_format = config.output_format.as_str(),
            "initialized Claude CLI adapter"
        );
        Ok(Self {
            config,
            instruction: None,
            session: SessionState::new(),
            runner,
            redactor: Redactor::new(true),
        })
    }

    /// System instruction supplied by the host agent; prepended to every prompt.
    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        let instruction = instruction.into();
        self.instruction = (!instruction.trim().is_empty()).then_some(instruction);
        self
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    pub fn instruction(&self) -> Option<&str> {
        self.instruction.as_deref()
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// Forget the tracked conversation and disable history.
    pub fn clear_history(&mut self) {
        if let Some(session_id) = self.session.current_session_id() {
            tracing::info!(session_id = %session_id, "clearing CLI conversation history");
        }
        self.session.clear();
    }

    /// Metadata-shaped call: errors come back in [`ResultRecord::error`].
    pub async fn generate(&mut self, request: CallRequest) -> ResultRecord {
        self.execute(request).await
    }

    /// String-shaped call: a populated error becomes [`AppError::Generation`].
    pub async fn generate_str(&mut self, request: CallRequest) -> AppResult<String> {
        let result = self.execute(request).await;
        match result.error {
            Some(error) => Err(AppError::Generation(error)),
            None => Ok(result.content),
        }
    }

    fn prepare(&self, request: &CallRequest, resume_session_id: Option<String>) -> ValidatedCommand {
        let params = &request.params;
        let overrides = CommandOverrides {
            model: params.model.clone(),
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            max_turns: params.max_turns,
            resume_session_id,
        };
        let parallel_tasks = params.parallel_tasks.unwrap_or(false);
        let prompt = match &request.input {
            PromptInput::Text(text) => compose_text_prompt(text, self.instruction(), parallel_tasks),
            PromptInput::Messages(messages) => {
                compose_message_prompt(messages, self.instruction(), parallel_tasks)
            }
        };
        ValidatedCommand::from_argv(build_argv(&self.config, &overrides), Some(prompt))
    }

    async fn execute(&mut self, request: CallRequest) -> ResultRecord {
        let resume_session_id = self.session.begin_call(request.params.use_history);
        let command = self.prepare(&request, resume_session_id);

        tracing::info!(command = %self.redactor.redact_argv(&command.argv()), "running CLI command");
        tracing::debug!(
            prompt_chars = command.stdin.as_deref().map(str::len).unwrap_or(0),
            resume = command.flag_value(RESUME_FLAG).is_some(),
            "prompt prepared"
        );

        let outcome = self.runner.run(&command, self.config.timeout).await;
        // Only a decoded reply can move the session; transport failures leave it as is.
        let replied = outcome.success();
        let result = self.interpret(outcome);
        if replied {
            self.session.observe(&result);
        }

        match &result.error {
            Some(error) => tracing::warn!(error = %self.redactor.redact(error).content, "CLI call returned an error"),
            None => tracing::info!(
                chars = result.content.len(),
                session_id = ?result.session_id,
                "CLI execution successful"
            ),
        }
        result
    }

    fn interpret(&self, outcome: ProcessOutcome) -> ResultRecord {
        match outcome {
            ProcessOutcome::Exited {
                exit_code: 0,
                stdout,
                ..
            } => parse_output(&decode_output(&stdout), self.config.output_format),
            ProcessOutcome::Exited {
                exit_code, stderr, ..
            } => {
                let stderr_text = decode_output(&stderr);
                let stderr_text = stderr_text.trim();
                tracing::error!(
                    exit_code,
                    stderr = %self.redactor.redact(stderr_text).content,
                    "CLI execution failed"
                );
                ResultRecord::failure(format!("{} Exit code {}: {}", ERROR_PREFIX, exit_code, stderr_text))
            }
            ProcessOutcome::TimedOut { after } => {
                ResultRecord::failure(format!("{} Timeout after {}s", ERROR_PREFIX, format_secs(after)))
            }
            ProcessOutcome::NotFound { program } => {
                ResultRecord::failure(format!("{} Executable not found: {}", ERROR_PREFIX, program))
            }
            ProcessOutcome::Failed { message } => {
                ResultRecord::failure(format!("{} Execution error: {}", ERROR_PREFIX, message))
            }
        }
    }
}

/// Invalid UTF-8 sequences are dropped, not replaced.
fn decode_output(bytes: &[u8]) -> String {
    bytes.utf8_chunks().map(|chunk| chunk.valid()).collect()
}

fn format_secs(duration: Duration) -> String {
    if duration.subsec_nanos() == 0 {
        duration.as_secs().to_string()
    } else {
        format!("{:.1}", duration.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::{decode_output, ClaudeCliAdapter};
    use crate::adapters::prompt::PARALLEL_TASK_DIRECTIVE;
    use crate::adapters::ValidatedCommand;
    use crate::errors::AppError;
    use crate::models::{AdapterConfig, CallRequest, ChatMessage, OutputFormat, RequestParams};
    use crate::process::{CommandRunner, ProcessOutcome};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct ScriptedRunner {
        outcomes: Arc<Mutex<VecDeque<ProcessOutcome>>>,
        commands: Arc<Mutex<Vec<(ValidatedCommand, Duration)>>>,
    }

    impl ScriptedRunner {
        fn new(outcomes: Vec<ProcessOutcome>) -> Self {
            Self {
                outcomes: Arc::new(Mutex::new(outcomes.into())),
                commands: Arc::default(),
            }
        }

        fn commands(&self) -> Vec<ValidatedCommand> {
            self.commands
                .lock()
                .expect("commands lock")
                .iter()
                .map(|(command, _)| command.clone())
                .collect()
        }

        fn deadlines(&self) -> Vec<Duration> {
            self.commands
                .lock()
                .expect("commands lock")
                .iter()
                .map(|(_, deadline)| *deadline)
                .collect()
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(&self, command: &ValidatedCommand, deadline: Duration) -> ProcessOutcome {
            self.commands
                .lock()
                .expect("commands lock")
                .push((command.clone(), deadline));
            self.outcomes
                .lock()
                .expect("outcomes lock")
                .pop_front()
                .unwrap_or(ProcessOutcome::Failed {
                    message: "no scripted outcome".to_string(),
                })
        }
    }

    fn stdout(text: &str) -> ProcessOutcome {
        ProcessOutcome::Exited {
            exit_code: 0,
            stdout: text.as_bytes().to_vec(),
            stderr: Vec::new(),
        }
    }

    fn history() -> RequestParams {
        RequestParams {
            use_history: Some(true),
            ..RequestParams::default()
        }
    }

    fn adapter(outcomes: Vec<ProcessOutcome>) -> (ClaudeCliAdapter<ScriptedRunner>, ScriptedRunner) {
        let runner = ScriptedRunner::new(outcomes);
        let config = AdapterConfig {
            cli_path: "claude".to_string(),
            ..AdapterConfig::default()
        };
        let adapter = ClaudeCliAdapter::with_runner(config, runner.clone()).expect("adapter");
        (adapter, runner)
    }

    #[tokio::test]
    async fn second_history_call_resumes_first_session() {
        let (mut adapter, runner) = adapter(vec![
            stdout(r#"{"result":"first","session_id":"abc"}"#),
            stdout(r#"{"result":"second","session_id":"abc"}"#),
        ]);

        let first = adapter.generate(CallRequest::text("one").with_params(history())).await;
        assert_eq!(first.content, "first");
        let second = adapter.generate(CallRequest::text("two").with_params(history())).await;
        assert_eq!(second.content, "second");

        let commands = runner.commands();
        assert_eq!(commands[0].flag_value("--resume"), None);
        assert_eq!(commands[1].flag_value("--resume"), Some("abc"));
        assert_eq!(commands[1].args[..2], ["--resume", "abc"]);
    }

    #[tokio::test]
    async fn clearing_history_stops_resumption() {
        let (mut adapter, runner) = adapter(vec![
            stdout(r#"{"result":"first","session_id":"abc"}"#),
            stdout(r#"{"result":"second"}"#),
        ]);

        adapter.generate(CallRequest::text("one").with_params(history())).await;
        assert_eq!(adapter.session().current_session_id(), Some("abc"));
        adapter.clear_history();
        adapter.generate(CallRequest::text("two")).await;

        assert_eq!(runner.commands()[1].flag_value("--resume"), None);
        assert!(!adapter.session().history_enabled());
    }

    #[tokio::test]
    async fn calls_without_history_never_resume() {
        let (mut adapter, runner) = adapter(vec![
            stdout(r#"{"result":"first","session_id":"abc"}"#),
            stdout(r#"{"result":"second","session_id":"def"}"#),
        ]);

        adapter.generate(CallRequest::text("one")).await;
        adapter.generate(CallRequest::text("two")).await;

        assert!(runner.commands().iter().all(|command| command.flag_value("--resume").is_none()));
        assert_eq!(adapter.session().current_session_id(), None);
    }

    #[tokio::test]
    async fn history_stays_enabled_for_later_calls() {
        let (mut adapter, runner) = adapter(vec![
            stdout(r#"{"result":"a","session_id":"s1"}"#),
            stdout(r#"{"result":"b","session_id":"s2"}"#),
            stdout(r#"{"result":"c"}"#),
        ]);

        adapter.generate(CallRequest::text("one").with_params(history())).await;
        adapter.generate(CallRequest::text("two")).await;
        adapter.generate(CallRequest::text("three")).await;

        let commands = runner.commands();
        assert_eq!(commands[1].flag_value("--resume"), Some("s1"));
        assert_eq!(commands[2].flag_value("--resume"), Some("s2"));
    }

    #[tokio::test]
    async fn tool_error_without_session_starts_fresh_conversation() {
        let (mut adapter, runner) = adapter(vec![
            stdout(r#"{"result":"a","session_id":"s1"}"#),
            stdout(r#"{"is_error":true,"result":"overloaded"}"#),
            stdout(r#"{"result":"c","session_id":"s3"}"#),
        ]);

        adapter.generate(CallRequest::text("one").with_params(history())).await;
        let failed = adapter.generate(CallRequest::text("two")).await;
        assert_eq!(
            failed.error.as_deref(),
            Some("[claude-code-cli] CLI reported error: overloaded")
        );
        adapter.generate(CallRequest::text("three")).await;

        let commands = runner.commands();
        assert_eq!(commands[1].flag_value("--resume"), Some("s1"));
        assert_eq!(commands[2].flag_value("--resume"), None);
        assert_eq!(adapter.session().current_session_id(), Some("s3"));
    }

    #[tokio::test]
    async fn timeout_keeps_held_session() {
        let (mut adapter, runner) = adapter(vec![
            stdout(r#"{"result":"first","session_id":"abc"}"#),
            ProcessOutcome::TimedOut {
                after: Duration::from_secs(180),
            },
            stdout(r#"{"result":"third"}"#),
        ]);

        adapter.generate(CallRequest::text("one").with_params(history())).await;
        let timed_out = adapter.generate(CallRequest::text("two")).await;
        assert!(timed_out.is_error());
        assert_eq!(adapter.session().current_session_id(), Some("abc"));
        adapter.generate(CallRequest::text("three")).await;

        let commands = runner.commands();
        assert_eq!(commands[1].flag_value("--resume"), Some("abc"));
        assert_eq!(commands[2].flag_value("--resume"), Some("abc"));
    }

    #[tokio::test]
    async fn transport_failures_keep_held_session() {
        let (mut adapter, runner) = adapter(vec![
            stdout(r#"{"result":"first","session_id":"abc"}"#),
            ProcessOutcome::Exited {
                exit_code: 1,
                stdout: Vec::new(),
                stderr: b"Error: Authentication failed".to_vec(),
            },
            ProcessOutcome::NotFound {
                program: "claude".to_string(),
            },
            ProcessOutcome::Failed {
                message: "broken pipe".to_string(),
            },
            stdout(r#"{"result":"last"}"#),
        ]);

        adapter.generate(CallRequest::text("one").with_params(history())).await;
        for prompt in ["two", "three", "four"] {
            let failed = adapter.generate(CallRequest::text(prompt)).await;
            assert!(failed.is_error());
            assert_eq!(adapter.session().current_session_id(), Some("abc"));
        }
        adapter.generate(CallRequest::text("five")).await;

        assert!(runner.commands()[1..]
            .iter()
            .all(|command| command.flag_value("--resume") == Some("abc")));
    }

    #[tokio::test]
    async fn tool_error_with_session_keeps_conversation() {
        let (mut adapter, runner) = adapter(vec![
            stdout(r#"{"is_error":true,"result":"max turns","session_id":"s1"}"#),
            stdout(r#"{"result":"ok"}"#),
        ]);

        let failed = adapter.generate(CallRequest::text("one").with_params(history())).await;
        assert_eq!(failed.session_id.as_deref(), Some("s1"));
        adapter.generate(CallRequest::text("two")).await;
        assert_eq!(runner.commands()[1].flag_value("--resume"), Some("s1"));
    }

    #[tokio::test]
    async fn nonzero_exit_is_an_error_result_and_a_raised_string_error() {
        let failing = || ProcessOutcome::Exited {
            exit_code: 1,
            stdout: Vec::new(),
            stderr: b"Error: Authentication failed\n".to_vec(),
        };
        let (mut adapter, _) = adapter(vec![failing(), failing()]);

        let record = adapter.generate(CallRequest::text("hi")).await;
        let error = record.error.expect("error");
        assert!(error.contains("Exit code 1"));
        assert!(error.contains("Authentication failed"));
        assert_eq!(record.content, "");

        let raised = adapter.generate_str(CallRequest::text("hi")).await;
        match raised {
            Err(AppError::Generation(message)) => {
                assert_eq!(message, "[claude-code-cli] Exit code 1: Error: Authentication failed");
            }
            other => panic!("expected generation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn runner_failures_map_to_result_errors() {
        let (mut adapter, runner) = adapter(vec![
            ProcessOutcome::TimedOut {
                after: Duration::from_secs(180),
            },
            ProcessOutcome::NotFound {
                program: "claude".to_string(),
            },
            ProcessOutcome::Failed {
                message: "broken pipe".to_string(),
            },
        ]);

        let timeout = adapter.generate(CallRequest::text("a")).await;
        assert_eq!(timeout.error.as_deref(), Some("[claude-code-cli] Timeout after 180s"));
        let missing = adapter.generate(CallRequest::text("b")).await;
        assert_eq!(
            missing.error.as_deref(),
            Some("[claude-code-cli] Executable not found: claude")
        );
        let failed = adapter.generate(CallRequest::text("c")).await;
        assert_eq!(
            failed.error.as_deref(),
            Some("[claude-code-cli] Execution error: broken pipe")
        );
        assert!(runner
            .deadlines()
            .iter()
            .all(|deadline| *deadline == Duration::from_secs(180)));
    }

    #[tokio::test]
    async fn generate_str_returns_plain_text_content() {
        let (mut adapter, _) = adapter(vec![stdout("Test response content\n")]);
        let response = adapter.generate_str(CallRequest::text("Test prompt")).await.expect("response");
        assert_eq!(response, "Test response content");
    }

    #[tokio::test]
    async fn generate_str_updates_session_like_generate() {
        let (mut adapter, runner) = adapter(vec![
            stdout(r#"{"result":"first","session_id":"abc"}"#),
            stdout(r#"{"result":"second"}"#),
        ]);

        adapter
            .generate_str(CallRequest::text("one").with_params(history()))
            .await
            .expect("first");
        adapter.generate(CallRequest::text("two")).await;
        assert_eq!(runner.commands()[1].flag_value("--resume"), Some("abc"));
    }

    #[tokio::test]
    async fn request_overrides_and_config_defaults_reach_argv() {
        let runner = ScriptedRunner::new(vec![stdout("ok"), stdout("ok")]);
        let config = AdapterConfig {
            cli_path: "/usr/bin/claude".to_string(),
            model: Some("config-model".to_string()),
            output_format: OutputFormat::StreamJson,
            ..AdapterConfig::default()
        };
        let mut adapter = ClaudeCliAdapter::with_runner(config, runner.clone()).expect("adapter");

        adapter.generate(CallRequest::text("a")).await;
        adapter
            .generate(CallRequest::text("b").with_params(RequestParams {
                model: Some("claude-3-5-sonnet-20241022".to_string()),
                max_tokens: Some(256),
                temperature: Some(0.5),
                max_turns: Some(2),
                ..RequestParams::default()
            }))
            .await;

        let commands = runner.commands();
        assert_eq!(commands[0].program, "/usr/bin/claude");
        assert_eq!(commands[0].flag_value("--model"), Some("config-model"));
        assert_eq!(commands[0].flag_value("--output-format"), Some("stream-json"));
        assert_eq!(commands[1].flag_value("--model"), Some("claude-3-5-sonnet-20241022"));
        assert_eq!(commands[1].flag_value("--max-tokens"), Some("256"));
        assert_eq!(commands[1].flag_value("--temperature"), Some("0.5"));
        assert_eq!(commands[1].flag_value("--max-turns"), Some("2"));
    }

    #[tokio::test]
    async fn prompt_carries_instruction_and_directive() {
        let runner = ScriptedRunner::new(vec![stdout("ok"), stdout("ok")]);
        let mut adapter = ClaudeCliAdapter::with_runner(AdapterConfig::default(), runner.clone())
            .expect("adapter")
            .with_instruction("You are a market analyst.");

        adapter
            .generate(CallRequest::text("Summarize.").with_params(RequestParams {
                parallel_tasks: Some(true),
                ..RequestParams::default()
            }))
            .await;
        adapter
            .generate(CallRequest::messages(vec![ChatMessage::user("Hello")]))
            .await;

        let commands = runner.commands();
        assert_eq!(
            commands[0].stdin.as_deref(),
            Some(
                format!(
                    "SYSTEM INSTRUCTION:\nYou are a market analyst.\n\nUSER MESSAGE:\n{}\n\nSummarize.\n",
                    PARALLEL_TASK_DIRECTIVE
                )
                .as_str()
            )
        );
        assert_eq!(
            commands[1].stdin.as_deref(),
            Some("SYSTEM:\nYou are a market analyst.\n\nUSER:\nHello\n")
        );
    }

    #[tokio::test]
    async fn text_prompt_without_instruction_is_sent_verbatim() {
        let (mut adapter, runner) = adapter(vec![stdout("ok")]);
        adapter.generate(CallRequest::text("raw prompt")).await;
        assert_eq!(runner.commands()[0].stdin.as_deref(), Some("raw prompt"));
    }

    #[tokio::test]
    async fn invalid_utf8_in_output_is_dropped() {
        let mut bytes = br#"{"result":"caf"#.to_vec();
        bytes.extend_from_slice(&[0xff, 0xfe]);
        bytes.extend_from_slice(br#"e"}"#);
        let (mut adapter, _) = adapter(vec![ProcessOutcome::Exited {
            exit_code: 0,
            stdout: bytes,
            stderr: Vec::new(),
        }]);

        let record = adapter.generate(CallRequest::text("hi")).await;
        assert_eq!(record.content, "cafe");
        assert_eq!(decode_output(b"ok\xc3"), "ok");
        assert_eq!(decode_output("é\u{fffd}".as_bytes()), "é\u{fffd}");
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = AdapterConfig {
            timeout: Duration::ZERO,
            ..AdapterConfig::default()
        };
        assert!(ClaudeCliAdapter::new(config).is_err());
    }

    #[test]
    fn blank_instruction_is_ignored() {
        let adapter = ClaudeCliAdapter::new(AdapterConfig::default())
            .expect("adapter")
            .with_instruction("   ");
        assert_eq!(adapter.instruction(), None);
    }
}
