//! The reasoning orchestrator.
//!
//! One task flows through a fixed state machine: deterministic rule check,
//! memory retrieval and injection, then the LLM/tool loop under a token
//! budget and iteration cap, and finally classification and storage.  Every
//! failure path funnels into a non-empty final text — errors either become
//! observations the model can correct, or they force finalization.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use reagent_config::AppConfig;
use reagent_core::ErrorKind;
use reagent_exec::{ConfirmationPolicy, ConfirmationSender, SafetyPolicy, ToolExecutor};
use reagent_llm::{
    ChatBackend, ChatMessage, ChatRequest, ChatResponse, LlmClient, ToolChoice,
};
use reagent_memory::{
    Classification, ErrorMemory, Experience, Fact, Housekeeper, MemoryFilter, MemoryStores,
    RetrievalLimits, Retriever, RuleEngine, TriggerKind,
};
use reagent_tools::ToolRegistry;

use crate::prompt;
use crate::window::MessageWindow;

pub struct Reasoner {
    config: AppConfig,
    rules: Arc<RuleEngine>,
    stores: Arc<MemoryStores>,
    filter: MemoryFilter,
    retriever: Retriever,
    registry: ToolRegistry,
    executor: ToolExecutor,
    llm: LlmClient,
    tasks_processed: u64,
}

impl Reasoner {
    /// Build a reasoner over already-opened state.  The context is passed in
    /// explicitly — there are no ambient singletons to reach for.
    pub fn with_stores(
        config: AppConfig,
        backend: Arc<dyn ChatBackend>,
        registry: ToolRegistry,
        rules: Arc<RuleEngine>,
        stores: Arc<MemoryStores>,
        error_memory: Arc<ErrorMemory>,
        confirm_tx: Option<ConfirmationSender>,
    ) -> Self {
        let workdir = std::path::PathBuf::from(&config.agent.working_directory);
        let mut executor = ToolExecutor::new(
            SafetyPolicy::new(config.safety.clone(), workdir),
            ConfirmationPolicy::new(config.safety.confirmation_mode),
            Duration::from_secs(config.safety.confirmation_timeout_seconds),
            Duration::from_secs(config.safety.tool_timeout_seconds),
            config.reasoner.tool_output_truncate_chars,
            stores.clone(),
            error_memory.clone(),
        );
        if let Some(tx) = confirm_tx {
            executor = executor.with_confirmation_channel(tx);
        }

        let llm = LlmClient::new(
            backend,
            config.llm.rate_limit_rpm,
            config.llm.api_max_retries,
            Duration::from_secs_f64(config.llm.api_retry_delay_seconds),
        );

        let filter = MemoryFilter::new(config.memory.min_task_chars);
        let retriever = Retriever::new(RetrievalLimits {
            facts: config.memory.top_facts,
            experiences: config.memory.top_experiences,
            lessons: config.memory.top_lessons,
            strategies: config.memory.top_strategies,
        });

        Self {
            config,
            rules,
            stores,
            filter,
            retriever,
            registry,
            executor,
            llm,
            tasks_processed: 0,
        }
    }

    /// Open persistent state under the configured directories and build the
    /// reasoner on top of it.
    pub fn open(
        config: AppConfig,
        backend: Arc<dyn ChatBackend>,
        registry: ToolRegistry,
        confirm_tx: Option<ConfirmationSender>,
    ) -> anyhow::Result<Self> {
        let stores = Arc::new(MemoryStores::open(&config.memory.data_dir)?);
        let rules = Arc::new(RuleEngine::open(&config.memory.data_dir));
        let error_memory = Arc::new(ErrorMemory::open(&config.memory.error_log_dir));
        Ok(Self::with_stores(
            config, backend, registry, rules, stores, error_memory, confirm_tx,
        ))
    }

    pub fn rules(&self) -> &RuleEngine {
        &self.rules
    }

    pub fn stores(&self) -> &MemoryStores {
        &self.stores
    }

    /// Run one task to completion.  Always returns a non-empty final text.
    /// One task at a time per reasoner — the `&mut` receiver enforces it.
    pub async fn run(&mut self, task: &str) -> String {
        let task = task.trim();

        // S1: deterministic rules win before any LLM reasoning, and a rule
        // hit is never stored as an experience.
        if let Some(hit) = self.rules.match_input(task) {
            info!(rule_id = %hit.rule_id, "rule matched — skipping LLM");
            return hit.response;
        }

        // S0/S2: window setup and context injection before the first call.
        let base = prompt::base_prompt(
            &self.config.agent.name,
            &self.config.agent.working_directory,
        );
        let mut window = MessageWindow::new(base.clone(), task);

        let bundle = self
            .retriever
            .for_task(task, self.rules.as_ref(), self.stores.as_ref());
        let block = self.retriever.render(&bundle);
        if !block.is_empty() {
            window.set_system(prompt::with_memory_context(&base, &block));
        }

        let start_tokens = self.llm.stats().total_tokens;
        let budget = self.config.reasoner.max_tokens_per_task;
        let deadline = match self.config.reasoner.task_deadline_seconds {
            0 => None,
            secs => Some(Instant::now() + Duration::from_secs(secs)),
        };

        let mut actions: Vec<String> = Vec::new();
        let mut last_observation: Option<String> = None;
        let mut iteration = 0u32;
        let mut empty_retry_used = false;
        let mut recovery_used = false;

        loop {
            // Suspension-point checks: deadline, then budget, then pruning.
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    let text = deadline_text(&last_observation);
                    return self.finalize(task, text, &actions, false, &mut window);
                }
            }
            let spent = self.llm.stats().total_tokens.saturating_sub(start_tokens);
            if spent >= budget {
                let text = budget_text(budget, spent, &last_observation);
                return self.finalize(task, text, &actions, false, &mut window);
            }
            window.prune_to(self.config.reasoner.max_context_messages, budget);

            // S3: one LLM turn with the tool catalog.
            let request = ChatRequest {
                messages: window.messages().to_vec(),
                tools: Some(self.registry.function_definitions()),
                temperature: self.config.llm.temperature,
                max_tokens: self.config.llm.tool_max_tokens,
                tool_choice: None,
            };

            let turn = self.llm.chat_with_tools(&request, deadline).await;
            let response = match turn {
                Ok(response) => response,
                Err(err) if err.kind == ErrorKind::ToolUseFailed && !recovery_used => {
                    // S6: one corrective turn with stricter settings.
                    recovery_used = true;
                    let retried = self
                        .recovery_turn(&mut window, err.detail("failed_generation"), deadline)
                        .await;
                    match retried {
                        Ok(response) => response,
                        Err(recovery_err) => {
                            let text = llm_failure_text(&recovery_err, &last_observation);
                            return self.finalize(task, text, &actions, false, &mut window);
                        }
                    }
                }
                Err(err) if err.kind == ErrorKind::Cancelled => {
                    let text = deadline_text(&last_observation);
                    return self.finalize(task, text, &actions, false, &mut window);
                }
                Err(err) => {
                    let text = llm_failure_text(&err, &last_observation);
                    return self.finalize(task, text, &actions, false, &mut window);
                }
            };

            // S4/S5: tool calls execute sequentially, in the order returned,
            // and every observation lands in the window before the next turn.
            if !response.tool_calls.is_empty() {
                window.push(ChatMessage::assistant_tool_calls(response.tool_calls.clone()));
                for call in &response.tool_calls {
                    let execution = self
                        .executor
                        .execute(&self.registry, &call.function.name, &call.function.arguments)
                        .await;
                    debug!(tool = %call.function.name, status = ?execution.outcome.status, "tool executed");
                    actions.push(call.function.name.clone());
                    last_observation = Some(execution.observation.clone());
                    window.push(ChatMessage::tool_result(&call.id, &execution.observation));
                }
                iteration += 1;
                if iteration >= self.config.reasoner.max_iterations {
                    warn!(iteration, "iteration cap reached — synthesizing final text");
                    let text = iteration_cap_text(&last_observation);
                    return self.finalize(task, text, &actions, false, &mut window);
                }
                continue;
            }

            let content = response.content.trim().to_string();
            if !content.is_empty() {
                return self.finalize(task, content, &actions, true, &mut window);
            }

            // Neither tool calls nor text: nudge once, then fall back to the
            // best available observation.
            if !empty_retry_used {
                empty_retry_used = true;
                window.push(ChatMessage::user(
                    "Your last reply was empty. Answer the task directly, or call a tool.",
                ));
                continue;
            }
            let text = last_observation
                .clone()
                .unwrap_or_else(|| "I could not produce a response for this task.".to_string());
            return self.finalize(task, text, &actions, false, &mut window);
        }
    }

    /// S6: append the corrective message and re-ask with temperature clamped
    /// low, half the response cap, and tool use required.
    async fn recovery_turn(
        &self,
        window: &mut MessageWindow,
        failed_generation: Option<&str>,
        deadline: Option<Instant>,
    ) -> Result<ChatResponse, reagent_core::AgentError> {
        window.push(ChatMessage::user(prompt::recovery_message(failed_generation)));
        let request = ChatRequest {
            messages: window.messages().to_vec(),
            tools: Some(self.registry.function_definitions()),
            temperature: self.config.llm.recovery_temperature,
            max_tokens: self.config.llm.tool_max_tokens / 2,
            tool_choice: Some(ToolChoice::Required),
        };
        self.llm.chat_with_tools(&request, deadline).await
    }

    /// S7: classify, store, count, and run hygiene on the interval.
    fn finalize(
        &mut self,
        task: &str,
        final_text: String,
        actions: &[String],
        success: bool,
        window: &mut MessageWindow,
    ) -> String {
        match self.filter.classify(task, &final_text, success, actions.len()) {
            Classification::Rule { trigger, response } => {
                match self.rules.add(&trigger, TriggerKind::Contains, &response, 0) {
                    Ok(rule_id) => info!(%rule_id, "stored rule from user utterance"),
                    Err(err) => warn!(error = %err, "failed to store extracted rule"),
                }
            }
            Classification::Fact { category, value, fact } => {
                let fact = Fact::new(fact, category, value);
                self.stores.facts.upsert(fact.to_record(task));
                info!("stored user fact");
            }
            Classification::Experience => {
                let outcome: String = final_text.chars().take(400).collect();
                let experience = Experience::new(task, actions.to_vec(), outcome, success);
                self.stores.experiences.upsert(experience.to_record());
                debug!(actions = actions.len(), success, "stored experience");
            }
            Classification::Useless => {}
        }

        self.tasks_processed += 1;
        if self.tasks_processed % self.config.memory.hygiene_interval_tasks == 0 {
            window.reset_turns();
            let report = Housekeeper::run(self.stores.as_ref(), &self.config.memory);
            info!(removed = report.total_removed(), "hygiene interval reached");
        }

        final_text
    }
}

// ── Finalization texts ───────────────────────────────────────────────────────

fn with_last_observation(lead: String, last: &Option<String>) -> String {
    match last {
        Some(observation) => format!("{lead}\nLast useful observation:\n{observation}"),
        None => lead,
    }
}

fn budget_text(budget: u64, spent: u64, last: &Option<String>) -> String {
    with_last_observation(
        format!("Token budget exceeded: used {spent} of the {budget}-token task budget."),
        last,
    )
}

fn deadline_text(last: &Option<String>) -> String {
    with_last_observation("Task deadline reached before completion.".to_string(), last)
}

fn iteration_cap_text(last: &Option<String>) -> String {
    with_last_observation(
        "I reached the iteration limit before finishing the task.".to_string(),
        last,
    )
}

fn llm_failure_text(err: &reagent_core::AgentError, last: &Option<String>) -> String {
    with_last_observation(format!("LLM unavailable: {}.", err.message), last)
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use reagent_config::ConfirmationMode;
    use reagent_core::AgentError;
    use reagent_llm::{ToolCall, ToolCallFunction, Usage};
    use reagent_memory::schema::MetaValue;
    use reagent_tools::ReadFileTool;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Backend that plays back scripted results and records every request.
    struct ScriptedBackend {
        script: Mutex<VecDeque<Result<ChatResponse, AgentError>>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedBackend {
        fn new(script: Vec<Result<ChatResponse, AgentError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        fn request(&self, index: usize) -> ChatRequest {
            self.requests.lock().unwrap()[index].clone()
        }

        fn push_script(&self, result: Result<ChatResponse, AgentError>) {
            self.script.lock().unwrap().push_back(result);
        }
    }

    #[async_trait]
    impl ChatBackend for ScriptedBackend {
        async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
            self.requests.lock().unwrap().push(request.clone());
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(ChatResponse::text("script exhausted")))
        }
    }

    fn text_response(content: &str, total_tokens: u64) -> Result<ChatResponse, AgentError> {
        let mut response = ChatResponse::text(content);
        response.usage = Usage {
            prompt_tokens: total_tokens / 2,
            completion_tokens: total_tokens - total_tokens / 2,
            total_tokens,
        };
        Ok(response)
    }

    fn tool_call_response(
        name: &str,
        arguments: serde_json::Value,
        total_tokens: u64,
    ) -> Result<ChatResponse, AgentError> {
        Ok(ChatResponse {
            content: String::new(),
            tool_calls: vec![ToolCall {
                id: "call_0".to_string(),
                r#type: "function".to_string(),
                function: ToolCallFunction {
                    name: name.to_string(),
                    arguments,
                },
            }],
            finish_reason: "tool_calls".to_string(),
            usage: Usage {
                prompt_tokens: total_tokens / 2,
                completion_tokens: total_tokens - total_tokens / 2,
                total_tokens,
            },
        })
    }

    struct Fixture {
        reasoner: Reasoner,
        backend: Arc<ScriptedBackend>,
        _workdir: tempfile::TempDir,
    }

    fn fixture(
        script: Vec<Result<ChatResponse, AgentError>>,
        tweak: impl FnOnce(&mut AppConfig),
    ) -> Fixture {
        let workdir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.agent.working_directory = workdir.path().display().to_string();
        config.safety.confirmation_mode = ConfirmationMode::Auto;
        config.llm.rate_limit_rpm = 0;
        config.llm.api_max_retries = 0;
        tweak(&mut config);

        let backend = ScriptedBackend::new(script);
        let mut registry = ToolRegistry::default();
        registry.register(Box::new(ReadFileTool {
            workspace_root: workdir.path().to_path_buf(),
        }));

        let reasoner = Reasoner::with_stores(
            config,
            backend.clone(),
            registry,
            Arc::new(RuleEngine::ephemeral()),
            Arc::new(MemoryStores::ephemeral()),
            Arc::new(ErrorMemory::ephemeral()),
            None,
        );
        Fixture {
            reasoner,
            backend,
            _workdir: workdir,
        }
    }

    // ── Scenario A: deterministic rule short-circuit ───────────────────────

    #[tokio::test]
    async fn rule_hit_skips_llm_and_storage() {
        let mut f = fixture(vec![], |_| {});
        f.reasoner
            .rules()
            .add("cekrek", TriggerKind::Contains, "memori terbaca", 0)
            .unwrap();

        let answer = f.reasoner.run("cekrek").await;
        assert_eq!(answer, "memori terbaca");
        assert_eq!(f.backend.calls(), 0, "no LLM call on a rule hit");
        assert_eq!(f.reasoner.stores().experiences.count(), 0);
    }

    // ── Scenario B: useless input leaves memory untouched ──────────────────

    #[tokio::test]
    async fn useless_input_produces_text_without_storage() {
        let mut f = fixture(vec![text_response("Halo! Ada yang bisa dibantu?", 20)], |_| {});

        let answer = f.reasoner.run("halo").await;
        assert!(!answer.is_empty());
        assert_eq!(f.reasoner.stores().experiences.count(), 0);
        assert_eq!(f.reasoner.stores().facts.count(), 0);
        assert_eq!(f.reasoner.rules().len(), 0);
    }

    // ── Scenario C: tool call under AUTO confirmation ──────────────────────

    #[tokio::test]
    async fn safe_tool_cycle_truncates_and_stores_experience() {
        let script = vec![
            tool_call_response("read_file", json!({"path": "README.md"}), 50),
            text_response("The README describes the project.", 30),
        ];
        let mut f = fixture(script, |c| c.reasoner.tool_output_truncate_chars = 100);
        std::fs::write(
            f._workdir.path().join("README.md"),
            "R".repeat(400),
        )
        .unwrap();

        let answer = f.reasoner.run("baca file README.md").await;
        assert_eq!(answer, "The README describes the project.");
        assert_eq!(f.backend.calls(), 2);

        // The observation fed back on the second turn is truncated.
        let second = f.backend.request(1);
        let tool_msg = second
            .messages
            .iter()
            .find(|m| m.role == reagent_llm::ChatRole::Tool)
            .expect("tool observation present");
        let observation = tool_msg.content.as_deref().unwrap();
        assert!(observation.starts_with("Success: "));
        assert!(observation.contains("…[truncated]"));

        // Exactly one experience, recording the tool action.
        assert_eq!(f.reasoner.stores().experiences.count(), 1);
        let record = &f.reasoner.stores().experiences.all()[0];
        assert_eq!(
            record.metadata.get("actions").and_then(MetaValue::as_str),
            Some("read_file")
        );
    }

    // ── Scenario D: tool-use-failed recovery ───────────────────────────────

    #[tokio::test]
    async fn recovery_turn_uses_strict_settings() {
        let script = vec![
            Err(AgentError::tool_use_failed(
                "malformed tool call",
                Some("<function=write_file{".to_string()),
            )),
            text_response("```python\nprint('xss probe')\n```", 40),
        ];
        let mut f = fixture(script, |_| {});

        let answer = f
            .reasoner
            .run("tulis kode python untuk testing web yang vuln xss")
            .await;
        assert!(answer.contains("python"));
        assert_eq!(f.backend.calls(), 2);

        let recovery = f.backend.request(1);
        assert!(recovery.temperature <= 0.1);
        assert_eq!(recovery.max_tokens, 768 / 2);
        assert_eq!(recovery.tool_choice, Some(ToolChoice::Required));
        // The corrective user message carries the rejected generation.
        let corrective = recovery.messages.last().unwrap();
        assert!(corrective.content.as_deref().unwrap().contains("<function=write_file{"));

        // The interaction is stored as an experience (code block signal).
        assert_eq!(f.reasoner.stores().experiences.count(), 1);
    }

    #[tokio::test]
    async fn second_tool_use_failure_finalizes_with_failure_text() {
        let script = vec![
            Err(AgentError::tool_use_failed("malformed", None)),
            Err(AgentError::tool_use_failed("malformed again", None)),
        ];
        let mut f = fixture(script, |_| {});

        let answer = f.reasoner.run("do something with tools").await;
        assert!(answer.contains("LLM unavailable"));
        assert_eq!(f.backend.calls(), 2);
    }

    // ── Scenario E: budget exceedance ──────────────────────────────────────

    #[tokio::test]
    async fn budget_exceedance_finalizes_without_more_calls() {
        let script = vec![
            tool_call_response("read_file", json!({"path": "a.txt"}), 600),
            tool_call_response("read_file", json!({"path": "a.txt"}), 600),
            // Never reached: the budget check fires first.
            text_response("should not happen", 10),
        ];
        let mut f = fixture(script, |c| c.reasoner.max_tokens_per_task = 1000);
        std::fs::write(f._workdir.path().join("a.txt"), "data").unwrap();

        let answer = f.reasoner.run("summarize a.txt repeatedly").await;
        assert!(answer.contains("1000"), "final text names the budget: {answer}");
        assert!(answer.contains("Token budget exceeded"));
        assert_eq!(f.backend.calls(), 2, "no LLM calls after the budget trips");
    }

    // ── Scenario F: fact storage and recall ────────────────────────────────

    #[tokio::test]
    async fn fact_is_stored_and_recalled_in_system_prompt() {
        let script = vec![
            text_response("Senang berkenalan, Budi!", 20),
            text_response("Nama kamu Budi.", 20),
        ];
        let mut f = fixture(script, |_| {});

        f.reasoner.run("Nama saya Budi").await;
        assert_eq!(f.reasoner.stores().facts.count(), 1);

        let answer = f.reasoner.run("Siapa nama saya?").await;
        assert_eq!(answer, "Nama kamu Budi.");

        let second = f.backend.request(1);
        let system = second.messages[0].content.as_deref().unwrap();
        assert!(
            system.contains("User's name is Budi"),
            "fact must be injected into the system prompt"
        );
    }

    // ── Rule extraction and determinism ────────────────────────────────────

    #[tokio::test]
    async fn rule_utterance_creates_exactly_one_rule() {
        let script = vec![text_response("Noted.", 10)];
        let mut f = fixture(script, |_| {});

        f.reasoner.run("if cekrek then say memori terbaca").await;
        assert_eq!(f.reasoner.rules().len(), 1);

        // Re-running the same utterance short-circuits on the stored rule
        // (its trigger is contained in the utterance), so no duplicate.
        let answer = f.reasoner.run("if cekrek then say memori terbaca").await;
        assert_eq!(answer, "memori terbaca");
        assert_eq!(f.reasoner.rules().len(), 1);
        assert_eq!(f.backend.calls(), 1);
    }

    // ── Window preservation under many tool cycles ─────────────────────────

    #[tokio::test]
    async fn system_and_task_survive_pruning() {
        let mut script = Vec::new();
        for _ in 0..8 {
            script.push(tool_call_response("read_file", json!({"path": "a.txt"}), 10));
        }
        script.push(text_response("done", 10));
        let mut f = fixture(script, |c| {
            c.reasoner.max_context_messages = 6;
            c.reasoner.max_iterations = 20;
        });
        std::fs::write(f._workdir.path().join("a.txt"), "data").unwrap();

        let task = "read the file over and over";
        f.reasoner.run(task).await;

        let last = f.backend.request(f.backend.calls() - 1);
        assert_eq!(last.messages[0].role, reagent_llm::ChatRole::System);
        assert_eq!(last.messages[1].content.as_deref(), Some(task));
        assert!(last.messages.len() <= 6 + 2);
    }

    // ── Iteration cap ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn iteration_cap_synthesizes_final_text() {
        let mut script = Vec::new();
        for _ in 0..5 {
            script.push(tool_call_response("read_file", json!({"path": "a.txt"}), 10));
        }
        let mut f = fixture(script, |c| c.reasoner.max_iterations = 3);
        std::fs::write(f._workdir.path().join("a.txt"), "data").unwrap();

        let answer = f.reasoner.run("loop forever please").await;
        assert!(answer.contains("iteration limit"));
        assert_eq!(f.backend.calls(), 3);
    }

    // ── Hygiene interval ───────────────────────────────────────────────────

    #[tokio::test]
    async fn housekeeper_runs_on_the_interval() {
        let mut f = fixture(vec![], |c| {
            c.memory.hygiene_interval_tasks = 1;
            c.memory.max_experiences = 1;
        });
        // Seed two experiences; the sweep after the next task caps to one.
        let old = Experience::new("old task", vec!["read_file".into()], "done", true);
        let newer = Experience::new("newer task", vec!["read_file".into()], "done", true);
        f.reasoner.stores().experiences.upsert(old.to_record());
        f.reasoner.stores().experiences.upsert(newer.to_record());
        assert_eq!(f.reasoner.stores().experiences.count(), 2);

        f.backend.push_script(text_response("hi there", 5));
        f.reasoner.run("halo").await;
        assert_eq!(f.reasoner.stores().experiences.count(), 1);
    }

    // ── Empty responses ────────────────────────────────────────────────────

    #[tokio::test]
    async fn empty_response_is_retried_once_then_finalized() {
        let script = vec![text_response("", 5), text_response("", 5)];
        let mut f = fixture(script, |_| {});

        let answer = f.reasoner.run("explain something").await;
        assert!(!answer.is_empty());
        assert_eq!(f.backend.calls(), 2);
    }

    // ── LLM failure surfaces as a user-visible exit ────────────────────────

    #[tokio::test]
    async fn transient_exhaustion_names_the_failure() {
        let script = vec![Err(AgentError::llm_transient("connection refused"))];
        let mut f = fixture(script, |c| c.llm.api_max_retries = 0);

        let answer = f.reasoner.run("do a thing").await;
        assert!(answer.contains("LLM unavailable"));
    }
}
