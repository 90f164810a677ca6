//! The test-generation agent.
//!
//! [`TestWeaverAgent`] ties retrieval, the chat model, the Git adapter and
//! the optional test runner together. It is cheap to clone and shared by
//! every request; the session id is passed per call and only selects the
//! conversation history.
//!
//! # Generation loop
//!
//! ```text
//! source = git.get_file(path)
//! context = rag.retrieve_context(instructions + class name)
//! for attempt in 1..=max_attempts:
//!     reply = llm.chat(messages)
//!     code = first fenced block of reply
//!     if no runner: done
//!     outcome = runner.run(code)
//!     if outcome.success: done
//!     messages += [reply, runner output]
//! ```

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use testweaver_core::rag::RagIndex;

use crate::config::Config;
use crate::git::{GitAdapterClient, SourceRepository};
use crate::history::ConversationHistory;
use crate::llm::{ChatMessage, ChatModel, OpenAiChatClient};
use crate::runner::{CommandRunner, TestRunner};
use crate::store::open_index;

/// RAG query used when neither instructions nor a class name are available.
pub const DEFAULT_GENERATION_QUERY: &str = "test generation for service";

const SYSTEM_PROMPT_FILE: &str = "system_agent.md";
const TEST_PROMPT_FILE: &str = "test_generation.md";

/// System and task prompts.
#[derive(Debug, Clone)]
pub struct Prompts {
    pub system: String,
    pub test_generation: String,
}

impl Default for Prompts {
    fn default() -> Self {
        Self {
            system: include_str!("../prompts/system_agent.md").to_string(),
            test_generation: include_str!("../prompts/test_generation.md").to_string(),
        }
    }
}

impl Prompts {
    /// Built-in prompts, with any file present in `dir` taking precedence.
    pub fn load(dir: Option<&Path>) -> Result<Self> {
        let mut prompts = Self::default();
        if let Some(dir) = dir {
            if let Some(system) = read_override(dir, SYSTEM_PROMPT_FILE)? {
                prompts.system = system;
            }
            if let Some(test) = read_override(dir, TEST_PROMPT_FILE)? {
                prompts.test_generation = test;
            }
        }
        Ok(prompts)
    }
}

fn read_override(dir: &Path, name: &str) -> Result<Option<String>> {
    let path = dir.join(name);
    if !path.exists() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read prompt {}", path.display()))?;
    Ok(Some(text))
}

/// Per-call knobs for [`TestWeaverAgent::generate_tests_for_file`].
#[derive(Debug, Clone, Copy)]
pub struct GenerateOptions {
    /// Run the configured [`TestRunner`] on each attempt.
    pub compile_after: bool,
    pub max_attempts: u32,
}

/// One pass of the generation loop.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AttemptRecord {
    pub attempt: u32,
    /// Whether a runner checked this attempt.
    pub compiled: bool,
    pub success: bool,
    /// Runner output, empty when not compiled.
    pub output: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationResult {
    pub service_path: String,
    pub test_code: String,
    pub success: bool,
    pub attempts: u32,
    pub attempt_log: Vec<AttemptRecord>,
}

/// Progress notifications, sent while generation runs.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum ProgressEvent {
    Start { message: String, max_attempts: u32 },
    Attempt(AttemptRecord),
    Done { result: GenerationResult },
    /// Generation aborted; sent by the caller driving the agent.
    Error { message: String },
}

impl ProgressEvent {
    /// SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Attempt(_) => "attempt",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }
}

#[derive(Clone)]
pub struct TestWeaverAgent {
    index: RagIndex,
    history: Arc<ConversationHistory>,
    llm: Arc<dyn ChatModel>,
    git: Arc<dyn SourceRepository>,
    runner: Option<Arc<dyn TestRunner>>,
    prompts: Arc<Prompts>,
    top_k: usize,
}

impl TestWeaverAgent {
    pub fn new(
        index: RagIndex,
        history: Arc<ConversationHistory>,
        llm: Arc<dyn ChatModel>,
        git: Arc<dyn SourceRepository>,
    ) -> Self {
        Self {
            index,
            history,
            llm,
            git,
            runner: None,
            prompts: Arc::new(Prompts::default()),
            top_k: 5,
        }
    }

    /// Wire the production clients from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let index = open_index(config)?;
        let history = Arc::new(ConversationHistory::new(config.agent.history_window));
        let llm = Arc::new(OpenAiChatClient::new(&config.llm)?);
        let git = Arc::new(GitAdapterClient::new(&config.git)?);
        let prompts = Prompts::load(config.agent.prompts_dir.as_deref())?;

        let mut agent = Self::new(index, history, llm, git)
            .with_prompts(prompts)
            .with_top_k(config.retrieval.top_k);
        if let Some(runner) = &config.agent.runner {
            agent = agent.with_runner(Arc::new(CommandRunner::new(runner)));
        }
        Ok(agent)
    }

    pub fn with_runner(mut self, runner: Arc<dyn TestRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    pub fn with_prompts(mut self, prompts: Prompts) -> Self {
        self.prompts = Arc::new(prompts);
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn index(&self) -> &RagIndex {
        &self.index
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    fn build_messages(
        &self,
        session_id: &str,
        user_message: &str,
        task_context: &str,
    ) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::system(self.prompts.system.clone())];
        messages.extend(self.history.get(session_id));
        if !task_context.is_empty() {
            messages.push(ChatMessage::user(format!(
                "<context>\n{}\n</context>",
                task_context
            )));
        }
        messages.push(ChatMessage::user(user_message));
        messages
    }

    /// Answer `message`, grounding on `query_for_rag` when given.
    pub async fn chat(
        &self,
        session_id: &str,
        message: &str,
        query_for_rag: Option<&str>,
    ) -> Result<String> {
        let context = match query_for_rag.filter(|q| !q.trim().is_empty()) {
            Some(query) => self.index.retrieve_context(query, self.top_k)?,
            None => String::new(),
        };

        let messages = self.build_messages(session_id, message, &context);
        let reply = self.llm.chat(&messages).await?;

        self.history.append(session_id, ChatMessage::user(message));
        self.history
            .append(session_id, ChatMessage::assistant(reply.clone()));
        Ok(reply)
    }

    /// Generate a test class for the file at `service_path`.
    ///
    /// Model and Git failures abort the call. A failing runner result does
    /// not: it is fed back to the model until `max_attempts` is reached,
    /// and the last attempt's code is returned with `success = false`.
    pub async fn generate_tests_for_file(
        &self,
        session_id: &str,
        service_path: &str,
        extra_instructions: &str,
        options: GenerateOptions,
        progress: Option<&UnboundedSender<ProgressEvent>>,
    ) -> Result<GenerationResult> {
        let max_attempts = options.max_attempts.max(1);
        emit(
            progress,
            ProgressEvent::Start {
                message: format!("Starting test generation for {}", service_path),
                max_attempts,
            },
        );

        let source = self
            .git
            .get_file(service_path)
            .await
            .with_context(|| format!("Failed to fetch {}", service_path))?;

        let rag_query = generation_query(service_path, extra_instructions);
        debug!(%rag_query, "generation RAG query");
        let rag_context = self.index.retrieve_context(&rag_query, self.top_k)?;

        let user_message = format!(
            "You must generate JUnit tests for the following Java file:\n\n\
             <source_path>{}</source_path>\n\n\
             <source_code>\n{}\n</source_code>\n\n\
             <context_from_docs>\n{}\n</context_from_docs>\n\n\
             Additional instructions from the user:\n{}\n\n\
             First, think if any business logic or requirements are unclear.\n\
             If unclear, ask clarifying questions instead of directly generating tests.\n\
             If clear, output ONLY a compilable Java test class.",
            service_path, source, rag_context, extra_instructions
        );

        let mut messages =
            self.build_messages(session_id, &user_message, &self.prompts.test_generation);
        let runner = self.runner.as_ref().filter(|_| options.compile_after);

        let mut attempt_log = Vec::new();
        let mut last_reply = String::new();
        let mut test_code = String::new();
        let mut success = false;

        for attempt in 1..=max_attempts {
            let reply = self.llm.chat(&messages).await?;
            test_code = extract_code(&reply);

            let record = match runner {
                None => AttemptRecord {
                    attempt,
                    compiled: false,
                    success: !test_code.is_empty(),
                    output: String::new(),
                },
                Some(runner) => {
                    let outcome = runner.run(&test_code).await?;
                    AttemptRecord {
                        attempt,
                        compiled: true,
                        success: outcome.success,
                        output: outcome.output,
                    }
                }
            };

            info!(service_path, attempt, success = record.success, "generation attempt");
            success = record.success;
            emit(progress, ProgressEvent::Attempt(record.clone()));

            let retry = runner.is_some() && !success && attempt < max_attempts;
            if retry {
                warn!(service_path, attempt, "generated tests failed, retrying");
                messages.push(ChatMessage::assistant(reply.clone()));
                messages.push(ChatMessage::user(format!(
                    "The test class failed to compile or run. Output:\n\n{}\n\n\
                     Fix these problems and output the full corrected test class.",
                    record.output
                )));
            }
            attempt_log.push(record);
            last_reply = reply;
            if !retry {
                break;
            }
        }

        self.history.append(session_id, ChatMessage::user(user_message));
        self.history
            .append(session_id, ChatMessage::assistant(last_reply));

        let result = GenerationResult {
            service_path: service_path.to_string(),
            test_code,
            success,
            attempts: attempt_log.len() as u32,
            attempt_log,
        };
        emit(
            progress,
            ProgressEvent::Done {
                result: result.clone(),
            },
        );
        Ok(result)
    }
}

fn emit(progress: Option<&UnboundedSender<ProgressEvent>>, event: ProgressEvent) {
    if let Some(tx) = progress {
        // A closed receiver only means nobody is listening any more.
        let _ = tx.send(event);
    }
}

/// `"<instructions> <ClassName>"`, or the default when both are empty.
pub fn generation_query(service_path: &str, extra_instructions: &str) -> String {
    let file_name = service_path.rsplit('/').next().unwrap_or(service_path);
    let class_name = file_name
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(file_name);

    let query = format!("{} {}", extra_instructions.trim(), class_name.trim());
    let query = query.trim();
    if query.is_empty() {
        DEFAULT_GENERATION_QUERY.to_string()
    } else {
        query.to_string()
    }
}

/// Body of the first fenced code block, or the whole reply trimmed.
pub fn extract_code(reply: &str) -> String {
    if let Some(start) = reply.find("```") {
        let after_fence = &reply[start + 3..];
        // Skip the language tag line.
        if let Some(newline) = after_fence.find('\n') {
            let body = &after_fence[newline + 1..];
            if let Some(end) = body.find("```") {
                return body[..end].trim_end().to_string();
            }
        }
    }
    reply.trim().to_string()
}

// ============ CLI commands ============

/// `testweaver chat <message>`.
pub async fn run_chat(
    config: &Config,
    message: &str,
    session_id: &str,
    rag_query: Option<&str>,
) -> Result<()> {
    let agent = TestWeaverAgent::from_config(config)?;
    let reply = agent.chat(session_id, message, rag_query).await?;
    println!("{}", reply);
    Ok(())
}

/// `testweaver generate <service_path>`.
pub async fn run_generate(
    config: &Config,
    service_path: &str,
    instructions: &str,
    no_compile: bool,
) -> Result<()> {
    let agent = TestWeaverAgent::from_config(config)?;
    let options = GenerateOptions {
        compile_after: !no_compile,
        max_attempts: config.agent.max_attempts,
    };
    let result = agent
        .generate_tests_for_file("cli", service_path, instructions, options, None)
        .await?;

    for record in &result.attempt_log {
        let status = match (record.compiled, record.success) {
            (false, _) => "not compiled",
            (true, true) => "passed",
            (true, false) => "failed",
        };
        eprintln!("attempt {}: {}", record.attempt, status);
    }
    println!("{}", result.test_code);

    if !result.success {
        anyhow::bail!(
            "generated tests for {} still failing after {} attempt(s)",
            service_path,
            result.attempts
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::GitError;
    use crate::runner::RunOutcome;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use testweaver_core::models::Meta;
    use testweaver_core::store::memory::InMemoryStore;

    /// Replies from a script and records every transcript it receives.
    struct ScriptedModel {
        replies: Mutex<Vec<String>>,
        seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedModel {
        fn new(replies: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.iter().rev().map(|s| s.to_string()).collect()),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
            self.seen.lock().unwrap().push(messages.to_vec());
            Ok(self
                .replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| "no more replies".into()))
        }
    }

    struct FakeRepo;

    #[async_trait]
    impl SourceRepository for FakeRepo {
        async fn get_file(&self, path: &str) -> Result<String, GitError> {
            Ok(format!("// {}\npublic class AccountService {{}}", path))
        }
        async fn list_java_files(&self, _base_path: &str) -> Result<Vec<String>, GitError> {
            Ok(vec![])
        }
        async fn get_pr_diff(&self, _pr_number: u64) -> Result<String, GitError> {
            Ok(String::new())
        }
    }

    /// Fails until the configured attempt.
    struct FlakyRunner {
        pass_on: usize,
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl TestRunner for FlakyRunner {
        async fn run(&self, _code: &str) -> Result<RunOutcome> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            Ok(RunOutcome {
                success: *calls >= self.pass_on,
                output: format!("run {}", *calls),
            })
        }
    }

    fn agent(model: Arc<ScriptedModel>) -> TestWeaverAgent {
        let index = RagIndex::new(Arc::new(InMemoryStore::new()));
        let mut meta = Meta::new();
        meta.insert("source".into(), "swagger".into());
        index
            .ingest("doc1", "AccountService debit rejects negative balance", meta)
            .unwrap();
        TestWeaverAgent::new(
            index,
            Arc::new(ConversationHistory::new(0)),
            model,
            Arc::new(FakeRepo),
        )
    }

    #[test]
    fn test_extract_code() {
        let reply = "Here you go:\n```java\nclass ATest {}\n```\nDone.";
        assert_eq!(extract_code(reply), "class ATest {}");
        assert_eq!(extract_code("  class ATest {}  "), "class ATest {}");
        // Unterminated fence falls back to the whole reply.
        assert_eq!(extract_code("```java\nclass A"), "```java\nclass A");
    }

    #[test]
    fn test_generation_query() {
        assert_eq!(
            generation_query("src/main/java/com/x/AccountService.java", "cover overdrafts"),
            "cover overdrafts AccountService"
        );
        assert_eq!(generation_query("AccountService.java", ""), "AccountService");
        assert_eq!(generation_query("", "  "), DEFAULT_GENERATION_QUERY);
    }

    #[tokio::test]
    async fn test_chat_uses_context_and_records_history() {
        let model = ScriptedModel::new(&["first", "second"]);
        let agent = agent(model.clone());

        let reply = agent.chat("s1", "what is debit?", Some("debit")).await.unwrap();
        assert_eq!(reply, "first");
        agent.chat("s1", "and credit?", None).await.unwrap();

        let seen = model.seen.lock().unwrap();
        let first = &seen[0];
        assert_eq!(first[0].role, "system");
        assert!(first[1].content.starts_with("<context>\n[SOURCE swagger | DOC doc1]"));
        assert_eq!(first[2].content, "what is debit?");

        // Second call replays the first turn and has no context message.
        let second = &seen[1];
        assert_eq!(second.len(), 4);
        assert_eq!(second[1], ChatMessage::user("what is debit?"));
        assert_eq!(second[2], ChatMessage::assistant("first"));
        assert_eq!(agent.history().get("s1").len(), 4);
    }

    #[tokio::test]
    async fn test_generate_without_runner_is_single_attempt() {
        let model = ScriptedModel::new(&["```java\nclass AccountServiceTest {}\n```"]);
        let agent = agent(model.clone());
        let result = agent
            .generate_tests_for_file(
                "s1",
                "src/main/java/AccountService.java",
                "",
                GenerateOptions {
                    compile_after: true,
                    max_attempts: 3,
                },
                None,
            )
            .await
            .unwrap();

        assert_eq!(result.test_code, "class AccountServiceTest {}");
        assert!(result.success);
        assert_eq!(result.attempts, 1);
        assert!(!result.attempt_log[0].compiled);

        let seen = model.seen.lock().unwrap();
        let user = &seen[0].last().unwrap().content;
        assert!(user.contains("public class AccountService {}"));
        assert!(user.contains("[SOURCE swagger | DOC doc1]"));
    }

    #[tokio::test]
    async fn test_generate_retries_with_runner_feedback() {
        let model = ScriptedModel::new(&["```\nv1\n```", "```\nv2\n```", "```\nv3\n```"]);
        let agent = agent(model.clone()).with_runner(Arc::new(FlakyRunner {
            pass_on: 2,
            calls: Mutex::new(0),
        }));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let result = agent
            .generate_tests_for_file(
                "s1",
                "AccountService.java",
                "",
                GenerateOptions {
                    compile_after: true,
                    max_attempts: 3,
                },
                Some(&tx),
            )
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.attempts, 2);
        assert_eq!(result.test_code, "v2");
        assert!(!result.attempt_log[0].success);
        assert!(result.attempt_log[1].success);

        let seen = model.seen.lock().unwrap();
        let retry = seen[1].last().unwrap();
        assert!(retry.content.contains("run 1"));

        drop(tx);
        let mut names = Vec::new();
        while let Some(event) = rx.recv().await {
            names.push(event.name());
        }
        assert_eq!(names, vec!["start", "attempt", "attempt", "done"]);
    }

    #[tokio::test]
    async fn test_generate_gives_up_after_max_attempts() {
        let model = ScriptedModel::new(&["a", "b"]);
        let agent = agent(model).with_runner(Arc::new(FlakyRunner {
            pass_on: 99,
            calls: Mutex::new(0),
        }));
        let result = agent
            .generate_tests_for_file(
                "s1",
                "AccountService.java",
                "",
                GenerateOptions {
                    compile_after: true,
                    max_attempts: 2,
                },
                None,
            )
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.attempts, 2);
        assert_eq!(result.test_code, "b");
    }

    #[tokio::test]
    async fn test_prompts_override_from_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join(SYSTEM_PROMPT_FILE), "custom system").unwrap();
        let prompts = Prompts::load(Some(dir.path())).unwrap();
        assert_eq!(prompts.system, "custom system");
        assert_eq!(prompts.test_generation, Prompts::default().test_generation);
    }
}
