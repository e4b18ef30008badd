//! The decision and execution loop.
//!
//! [`TaskController`] runs one task at a time: perceive the page, ask the
//! model for the next action, hold it at a checkpoint when a rule says so,
//! execute it, and repeat until the model finishes, an error ends the task,
//! or the task is interrupted. Its state is published as a [`TaskSnapshot`]
//! through a watch channel.

mod history;
mod state;

pub use history::{HistoryEntry, Outcome, previous_thoughts};
pub use state::{ActionStatus, PendingApproval, TaskEvent, TaskSnapshot, TaskStatus, UserDecision};

use crate::{
    action::{Action, ParseError, parse_response},
    browser::TabHandle,
    checkpoint::{CheckpointGate, CheckpointRule},
    config::{AgentConfig, AgentMode, Settings},
    error::{AgentError, Result},
    executor::{ActionExecutor, Execution},
    knowledge::{Knowledge, KnowledgeResolver},
    llm::{self, ModelClient, TokenUsage},
    perception::{Perception, PerceptionCapturer},
    prompt::{PromptContext, format_prompt, next_action_request, system_message},
};
use serde_json::json;
use std::{
    future::Future,
    sync::{Arc, Mutex},
};
use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;

/// How a run left the loop without an error
enum Stop {
    Finished,
    Interrupted,
}

/// A parsed answer and what produced it
struct Decision {
    prompt: String,
    raw_response: String,
    action: Action,
    usage: Option<TokenUsage>,
}

/// Await `future` unless `token` fires first
async fn guarded<F: Future>(token: &CancellationToken, future: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = token.cancelled() => None,
        output = future => Some(output),
    }
}

/// Drives tasks against one tab
pub struct TaskController {
    tab: Arc<dyn TabHandle>,
    client: Arc<dyn ModelClient>,
    resolver: KnowledgeResolver,
    rules: Vec<CheckpointRule>,
    mode: AgentMode,
    system_message: String,
    capturer: PerceptionCapturer,
    config: AgentConfig,
    state: watch::Sender<TaskSnapshot>,
    cancel: Mutex<CancellationToken>,
    decision: Mutex<Option<oneshot::Sender<UserDecision>>>,
}

impl TaskController {
    pub fn new(
        tab: Arc<dyn TabHandle>,
        client: Arc<dyn ModelClient>,
        settings: &Settings,
        config: AgentConfig,
    ) -> Result<Self> {
        let resolver = KnowledgeResolver::new(settings.custom_knowledge_base.clone())?;
        let capturer = PerceptionCapturer::new(&config)?;
        let (state, _) = watch::channel(TaskSnapshot::default());

        Ok(Self {
            tab,
            client,
            resolver,
            rules: settings.hitl_rules.clone(),
            mode: settings.agent_mode,
            system_message: system_message(settings.agent_mode),
            capturer,
            config,
            state,
            cancel: Mutex::new(CancellationToken::new()),
            decision: Mutex::new(None),
        })
    }

    /// Controller using the model client selected in `settings`
    pub fn from_settings(tab: Arc<dyn TabHandle>, settings: &Settings, config: AgentConfig) -> Result<Self> {
        let client = llm::client_from_settings(settings, config.max_tokens)?;
        Self::new(tab, client, settings, config)
    }

    /// Current state
    pub fn snapshot(&self) -> TaskSnapshot {
        self.state.borrow().clone()
    }

    pub fn status(&self) -> TaskStatus {
        self.state.borrow().status
    }

    /// Receiver that sees every state change
    pub fn subscribe(&self) -> watch::Receiver<TaskSnapshot> {
        self.state.subscribe()
    }

    /// Stop the running task. Returns `false` when nothing was running.
    pub fn interrupt(&self) -> bool {
        let mut interrupted = false;
        self.state.send_if_modified(|s| {
            let next = s.status.apply(TaskEvent::Interrupt);
            interrupted = next != s.status;
            s.status = next;
            interrupted
        });

        if interrupted {
            log::info!("task interrupted");
            self.current_token().cancel();
        }
        interrupted
    }

    /// Answer the pending checkpoint. Returns `false` when no action is waiting.
    pub fn set_user_decision(&self, decision: UserDecision) -> bool {
        let sender = match self.decision.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        let Some(sender) = sender else {
            log::warn!("no action is waiting for approval");
            return false;
        };

        self.state.send_modify(|s| {
            if let Some(pending) = &mut s.pending_approval {
                pending.decision = Some(decision);
            }
        });
        sender.send(decision).is_ok()
    }

    fn current_token(&self) -> CancellationToken {
        match self.cancel.lock() {
            Ok(token) => token.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn fresh_token(&self) -> CancellationToken {
        let token = CancellationToken::new();
        match self.cancel.lock() {
            Ok(mut slot) => *slot = token.clone(),
            Err(poisoned) => *poisoned.into_inner() = token.clone(),
        }
        token
    }

    fn set_action_status(&self, action_status: ActionStatus) {
        self.state.send_modify(|s| s.action_status = action_status);
    }

    fn notice(&self, message: String) {
        log::warn!("{}", message);
        self.state.send_modify(|s| s.notices.push(message));
    }

    fn push_history(&self, entry: HistoryEntry) {
        self.state.send_modify(|s| s.history.push(entry));
    }

    /// Rewrite the newest entry so the next prompt knows its action missed
    fn mark_target_not_found(&self) {
        self.state.send_modify(|s| {
            if let Some(entry) = s.history.last_mut()
                && let Outcome::Action(action) = &entry.outcome
            {
                entry.outcome = Outcome::TargetNotFound(action.clone());
            }
        });
    }

    fn is_halted(&self, token: &CancellationToken) -> bool {
        token.is_cancelled() || self.status() != TaskStatus::Running
    }

    /// Run `instructions` to completion.
    ///
    /// Calling this while a task is running does nothing and returns
    /// [`TaskStatus::Running`]. Fatal errors end the task with
    /// [`TaskStatus::Error`] and are returned.
    pub async fn run_task(&self, instructions: &str) -> Result<TaskStatus> {
        let started = self.state.send_if_modified(|s| {
            if s.status == TaskStatus::Running {
                return false;
            }
            *s = TaskSnapshot::started(instructions);
            true
        });
        if !started {
            log::warn!("a task is already running, ignoring new instructions");
            return Ok(TaskStatus::Running);
        }

        let token = self.fresh_token();
        log::info!("starting task: {}", instructions);

        let outcome = self.run_loop(instructions, &token).await;
        self.cleanup().await;

        let event = match &outcome {
            Ok(Stop::Finished) => TaskEvent::Succeed,
            Ok(Stop::Interrupted) => TaskEvent::Interrupt,
            Err(_) => TaskEvent::Fail,
        };
        let error_text = outcome.as_ref().err().map(ToString::to_string);
        self.state.send_modify(|s| {
            s.status = s.status.apply(event);
            s.action_status = ActionStatus::Idle;
            s.pending_approval = None;
            if let Some(text) = error_text {
                s.last_error = Some(text);
            }
        });
        if let Ok(mut slot) = self.decision.lock() {
            slot.take();
        }

        let status = self.status();
        log::info!("task ended with status {}", status);
        match outcome {
            Err(e) if status == TaskStatus::Error => Err(e),
            _ => Ok(status),
        }
    }

    async fn cleanup(&self) {
        if let Err(e) = self.tab.call_rpc("removeLabels", json!([])).await {
            log::debug!("could not remove labels: {}", e);
        }
        if let Err(e) = self.tab.detach().await {
            log::warn!("could not detach control session: {}", e);
        }
    }

    async fn run_loop(&self, instructions: &str, token: &CancellationToken) -> Result<Stop> {
        for iteration in 1..=self.config.max_iterations {
            if self.is_halted(token) {
                return Ok(Stop::Interrupted);
            }
            self.state.send_modify(|s| s.iteration = iteration);
            log::debug!("iteration {}", iteration);

            self.set_action_status(ActionStatus::AttachingControlSession);
            let Some(attached) = guarded(token, self.tab.attach()).await else {
                return Ok(Stop::Interrupted);
            };
            attached.map_err(|e| AgentError::ControlSession(e.to_string()))?;

            self.set_action_status(ActionStatus::ResolvingKnowledge);
            let Some(url) = guarded(token, self.tab.current_url()).await else {
                return Ok(Stop::Interrupted);
            };
            let knowledge = self.resolver.resolve(&url?);

            if self.is_halted(token) {
                return Ok(Stop::Interrupted);
            }
            self.set_action_status(ActionStatus::CapturingPerception);
            let capture = self.capturer.capture(self.tab.as_ref(), self.mode, &knowledge.annotation_rules);
            let Some(perception) = guarded(token, capture).await else {
                return Ok(Stop::Interrupted);
            };
            let perception = perception?;

            self.set_action_status(ActionStatus::GeneratingAction);
            let Some(decision) = self.query_model(instructions, &knowledge, &perception, token).await? else {
                return Ok(Stop::Interrupted);
            };
            let action = decision.action.clone();

            if action.is_terminal() {
                self.push_history(self.entry(decision, Outcome::Action(action.clone())));
                log::info!("model chose {}: {}", action.operation.name(), action.thought);
                return Ok(Stop::Finished);
            }

            let approved = match self.checkpoint(&action, token).await? {
                Some(approved) => approved,
                None => return Ok(Stop::Interrupted),
            };
            if !approved {
                log::info!("{} rejected at checkpoint", action.operation.name());
                self.push_history(self.entry(decision, Outcome::Rejected(action)));
                continue;
            }
            self.push_history(self.entry(decision, Outcome::Action(action.clone())));

            if self.is_halted(token) {
                return Ok(Stop::Interrupted);
            }
            self.set_action_status(ActionStatus::PerformingAction);
            let executor = ActionExecutor::new(self.tab.as_ref(), &self.config);
            let Some(executed) = guarded(token, executor.execute(&action)).await else {
                return Ok(Stop::Interrupted);
            };
            if executed? == Execution::TargetNotFound {
                self.mark_target_not_found();
                self.notice(format!("{} skipped: no element carries that label", action.operation.name()));
            }

            self.set_action_status(ActionStatus::Waiting);
            if guarded(token, tokio::time::sleep(self.config.inter_iteration_delay)).await.is_none() {
                return Ok(Stop::Interrupted);
            }
        }

        self.notice(format!("stopped after reaching the limit of {} iterations", self.config.max_iterations));
        Ok(Stop::Finished)
    }

    fn entry(&self, decision: Decision, outcome: Outcome) -> HistoryEntry {
        HistoryEntry::new(decision.prompt, decision.raw_response, outcome).with_usage(decision.usage)
    }

    /// Ask for the next action, retrying transient and format failures.
    ///
    /// `Ok(None)` means the task was interrupted while waiting.
    async fn query_model(
        &self,
        instructions: &str,
        knowledge: &Knowledge,
        perception: &Perception,
        token: &CancellationToken,
    ) -> Result<Option<Decision>> {
        let attempts = self.config.max_attempts.max(1);
        let mut parse_failure: Option<(String, String, ParseError, Option<TokenUsage>)> = None;
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            if self.is_halted(token) {
                return Ok(None);
            }

            let history = self.state.borrow().history.clone();
            let prompt = format_prompt(&PromptContext {
                instructions,
                history: &history,
                knowledge,
                perception,
                parse_error: parse_failure.as_ref().map(|(_, _, e, _)| e),
            });
            let request = next_action_request(&self.system_message, prompt.clone(), perception);

            let Some(response) = guarded(token, self.client.send(&request)).await else {
                return Ok(None);
            };

            match response {
                Ok(response) => match parse_response(&response.text) {
                    Ok(action) => {
                        return Ok(Some(Decision {
                            prompt,
                            raw_response: response.text,
                            action,
                            usage: response.usage,
                        }));
                    }
                    Err(e) => {
                        self.notice(format!("attempt {}/{}: {}", attempt, attempts, e));
                        last_error = e.to_string();
                        parse_failure = Some((prompt, response.text, e, response.usage));
                    }
                },
                Err(e) if e.is_retryable() => {
                    self.notice(format!("attempt {}/{}: {}", attempt, attempts, e));
                    last_error = e.to_string();
                    parse_failure = None;
                }
                Err(e) => return Err(e.into()),
            }
        }

        if let Some((prompt, raw_response, error, usage)) = parse_failure {
            self.push_history(HistoryEntry::new(prompt, raw_response, Outcome::ParseError(error)).with_usage(usage));
        }
        Err(AgentError::QueryFailed { attempts, last_error })
    }

    /// `Some(true)` when the action may run, `None` when interrupted
    async fn checkpoint(&self, action: &Action, token: &CancellationToken) -> Result<Option<bool>> {
        if self.rules.is_empty() {
            return Ok(Some(true));
        }

        let thoughts = previous_thoughts(&self.state.borrow().history);
        let gate = CheckpointGate::new(self.client.as_ref());
        let Some(verdict) = guarded(token, gate.requires_approval(action, &thoughts, &self.rules)).await else {
            return Ok(None);
        };
        let needs_approval = match verdict {
            Ok(needs_approval) => needs_approval,
            // Without an answer from the oversight model the human decides
            Err(e) if e.is_retryable() => {
                self.notice(format!("checkpoint check failed, asking for approval: {}", e));
                true
            }
            Err(e) => return Err(e.into()),
        };
        if !needs_approval {
            return Ok(Some(true));
        }

        let (sender, receiver) = oneshot::channel();
        if let Ok(mut slot) = self.decision.lock() {
            *slot = Some(sender);
        }
        self.state.send_modify(|s| {
            s.action_status = ActionStatus::AwaitingApproval;
            s.pending_approval = Some(PendingApproval { proposed_action: action.clone(), decision: None });
        });
        log::info!("waiting for approval of {}", action.operation.name());

        let Some(answer) = guarded(token, receiver).await else {
            return Ok(None);
        };
        self.state.send_modify(|s| s.pending_approval = None);

        match answer {
            Ok(decision) => Ok(Some(decision == UserDecision::Approve)),
            Err(_) => {
                log::warn!("approval channel closed, treating as rejection");
                Ok(Some(false))
            }
        }
    }
}
