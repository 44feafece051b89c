use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use netops_core::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use netops_core::config::ConversationConfig;
use netops_core::flows::{ConversationFlow, FlowEvent, FlowState};
use netops_core::{
    ApplicationError, ConversationTurn, ExecutionContext, ExecutionIntent, ExecutionResult, Role,
    SessionId, Transcript,
};
use tokio::sync::Mutex as TurnLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::audit::TracingAuditSink;
use crate::dispatch::ExecutionDispatcher;
use crate::guardrails::{ExecutionGate, GuardrailDecision};
use crate::llm::{ChatMessage, LlmClient};
use crate::prompt::render_system_prompt;
use crate::reply::{parse_reply, CollaboratorReply, ParsedReply};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnReply {
    pub session_id: SessionId,
    pub assistant_message: String,
    pub script_executed: Option<String>,
    pub script_result: Option<ExecutionResult>,
    pub state: FlowState,
}

/// Transcript, last-success context and flow state of one operator session.
#[derive(Debug)]
pub struct ConversationSession {
    transcript: Transcript,
    context: Option<ExecutionContext>,
    state: FlowState,
}

impl ConversationSession {
    pub fn new(max_turns: usize) -> Self {
        Self { transcript: Transcript::new(max_turns), context: None, state: FlowState::Idle }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn context(&self) -> Option<&ExecutionContext> {
        self.context.as_ref()
    }

    pub fn state(&self) -> FlowState {
        self.state
    }
}

/// Sessions keyed by id. Each session carries its own async lock so a
/// session processes one turn at a time while other sessions proceed.
///
/// The store is bounded: sessions idle past `idle_ttl` are dropped, and once
/// `max_sessions` is reached the least recently used idle session makes room.
/// A session whose handle is still held by a running turn is never evicted.
pub struct SessionStore {
    sessions: Mutex<HashMap<SessionId, StoredSession>>,
    max_turns: usize,
    max_sessions: usize,
    idle_ttl: Duration,
    ticks: AtomicU64,
}

struct StoredSession {
    handle: Arc<TurnLock<ConversationSession>>,
    last_used: Instant,
    tick: u64,
}

impl StoredSession {
    fn in_use(&self) -> bool {
        Arc::strong_count(&self.handle) > 1
    }
}

impl SessionStore {
    pub fn new(max_turns: usize, max_sessions: usize, idle_ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            max_turns,
            max_sessions: max_sessions.max(1),
            idle_ttl,
            ticks: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &ConversationConfig) -> Self {
        Self::new(
            config.max_transcript_turns,
            config.max_sessions,
            Duration::from_secs(config.session_idle_secs),
        )
    }

    fn guard(&self) -> MutexGuard<'_, HashMap<SessionId, StoredSession>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn session(&self, id: &SessionId) -> Arc<TurnLock<ConversationSession>> {
        let now = Instant::now();
        let tick = self.ticks.fetch_add(1, Ordering::Relaxed);
        let mut sessions = self.guard();
        Self::drop_idle(&mut sessions, now, self.idle_ttl);

        if let Some(stored) = sessions.get_mut(id) {
            stored.last_used = now;
            stored.tick = tick;
            return Arc::clone(&stored.handle);
        }

        if sessions.len() >= self.max_sessions {
            let oldest = sessions
                .iter()
                .filter(|(_, stored)| !stored.in_use())
                .min_by_key(|(_, stored)| stored.tick)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                sessions.remove(&oldest);
                debug!(
                    event_name = "agent.session.evicted",
                    session_id = %oldest.as_str(),
                    reason = "capacity",
                    "session evicted"
                );
            }
        }

        let handle = Arc::new(TurnLock::new(ConversationSession::new(self.max_turns)));
        sessions.insert(id.clone(), StoredSession { handle: Arc::clone(&handle), last_used: now, tick });
        handle
    }

    pub fn get(&self, id: &SessionId) -> Option<Arc<TurnLock<ConversationSession>>> {
        self.guard().get(id).map(|stored| Arc::clone(&stored.handle))
    }

    /// Drops every session not touched since `now - idle_ttl`; returns how many went.
    pub fn evict_idle(&self, now: Instant) -> usize {
        Self::drop_idle(&mut self.guard(), now, self.idle_ttl)
    }

    fn drop_idle(sessions: &mut HashMap<SessionId, StoredSession>, now: Instant, ttl: Duration) -> usize {
        let before = sessions.len();
        sessions.retain(|id, stored| {
            let keep = stored.in_use() || now.saturating_duration_since(stored.last_used) <= ttl;
            if !keep {
                debug!(event_name = "agent.session.evicted", session_id = %id.as_str(), reason = "idle", "session evicted");
            }
            keep
        });
        before - sessions.len()
    }

    pub fn len(&self) -> usize {
        self.guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Drives operator turns through the collaborator, the execution gate and the dispatcher.
pub struct ConversationManager {
    llm: Arc<dyn LlmClient>,
    dispatcher: ExecutionDispatcher,
    gate: ExecutionGate,
    flow: ConversationFlow,
    audit: Arc<dyn AuditSink>,
    sessions: SessionStore,
    system_prompt: String,
    reuse_context: bool,
}

impl ConversationManager {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        dispatcher: ExecutionDispatcher,
        config: &ConversationConfig,
    ) -> Result<Self, ApplicationError> {
        let system_prompt = render_system_prompt(dispatcher.registry())
            .map_err(|error| ApplicationError::Configuration(error.to_string()))?;
        Ok(Self {
            llm,
            dispatcher,
            gate: ExecutionGate,
            flow: ConversationFlow,
            audit: Arc::new(TracingAuditSink),
            sessions: SessionStore::from_config(config),
            system_prompt,
            reuse_context: config.reuse_context,
        })
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub async fn handle_turn(&self, session_id: Option<SessionId>, message: &str) -> TurnReply {
        let session_id = session_id.unwrap_or_else(SessionId::generate);
        let correlation_id = Uuid::new_v4().to_string();
        let mut audit =
            AuditContext::new(Some(session_id.clone()), None, correlation_id.clone(), "conversation");
        self.audit.emit(audit.record(
            "conversation.turn_received",
            AuditCategory::Turn,
            AuditOutcome::Accepted,
        ));

        let handle = self.sessions.session(&session_id);
        let mut session = handle.lock().await;

        let messages = self.compose_messages(&session, message);
        let raw = match self.llm.complete(&messages).await {
            Ok(raw) => raw,
            Err(error) => {
                let interface = ApplicationError::Integration(format!("{error:#}"))
                    .into_interface(correlation_id.as_str());
                warn!(
                    event_name = "agent.conversation.collaborator_failed",
                    session_id = %session_id,
                    correlation_id = %correlation_id,
                    error = %interface,
                    "intent collaborator unavailable; no intent extracted"
                );
                self.audit.emit(
                    audit
                        .record("conversation.collaborator_failed", AuditCategory::Turn, AuditOutcome::Failed)
                        .detail("error", interface.to_string()),
                );
                return TurnReply {
                    session_id,
                    assistant_message: interface.user_message().to_string(),
                    script_executed: None,
                    script_result: None,
                    state: session.state,
                };
            }
        };

        let mut reply = TurnReply {
            session_id: session_id.clone(),
            assistant_message: String::new(),
            script_executed: None,
            script_result: None,
            state: FlowState::Idle,
        };

        match parse_reply(&raw) {
            CollaboratorReply::RawText(text) => {
                warn!(
                    event_name = "agent.conversation.reply_unparsed",
                    session_id = %session_id,
                    correlation_id = %correlation_id,
                    "collaborator reply was not a valid intent; passing it through"
                );
                reply.assistant_message = text;
                self.transition(&mut session, FlowEvent::IntentCleared, &[], &audit);
            }
            CollaboratorReply::Intent(parsed) => match parsed.capability_id.clone() {
                None => {
                    reply.assistant_message = parsed.answer;
                    self.transition(&mut session, FlowEvent::IntentCleared, &[], &audit);
                }
                Some(capability_id) => {
                    audit.capability_id = Some(capability_id.clone());
                    self.advance(&mut session, capability_id, parsed, &audit, &mut reply).await;
                }
            },
        }

        session.transcript.push(ConversationTurn::operator(message));
        session.transcript.push(ConversationTurn::collaborator(raw));
        reply.state = session.state;
        info!(
            event_name = "agent.conversation.turn_completed",
            session_id = %session_id,
            correlation_id = %correlation_id,
            state = ?reply.state,
            executed = reply.script_executed.is_some()
        );
        reply
    }

    fn compose_messages(&self, session: &ConversationSession, message: &str) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(session.transcript.len() + 3);
        messages.push(ChatMessage::system(self.system_prompt.as_str()));
        if let Some(context) = &session.context {
            messages.push(ChatMessage::system(context.describe()));
        }
        for turn in session.transcript.turns() {
            messages.push(match turn.role {
                Role::Operator => ChatMessage::user(turn.text.as_str()),
                Role::Collaborator => ChatMessage::assistant(turn.text.as_str()),
            });
        }
        messages.push(ChatMessage::user(message));
        messages
    }

    async fn advance(
        &self,
        session: &mut ConversationSession,
        capability_id: String,
        parsed: ParsedReply,
        audit: &AuditContext,
        reply: &mut TurnReply,
    ) {
        reply.assistant_message = parsed.answer;
        let registry = self.dispatcher.registry();
        let definition = registry.get(&capability_id).ok();

        let mut parameters = parsed.parameters;
        if let (true, Some(context), Some(definition)) =
            (self.reuse_context, session.context.as_ref(), definition)
        {
            let filled = context.fill_missing(definition, &mut parameters);
            if !filled.is_empty() {
                debug!(
                    event_name = "agent.conversation.context_reused",
                    capability_id = %capability_id,
                    filled = ?filled
                );
            }
        }
        let missing =
            definition.map(|definition| definition.missing_required(&parameters)).unwrap_or_default();
        let intent = ExecutionIntent::new(capability_id, parameters, parsed.confirmed);

        let decision = self.gate.evaluate(registry, &intent);
        let surface = match &decision {
            GuardrailDecision::Allow => false,
            GuardrailDecision::Deny { .. } => true,
            GuardrailDecision::Degrade { .. } => intent.confirmed,
        };
        if surface {
            if let Some(note) = decision.user_message() {
                append_paragraph(&mut reply.assistant_message, note);
            }
            self.audit.emit(
                audit.record("dispatch.execution_refused", AuditCategory::Dispatch, AuditOutcome::Refused)
                    .detail("reason_code", decision.reason_code()),
            );
        }

        let event = match (&decision, definition) {
            (_, None) => FlowEvent::IntentCleared,
            (GuardrailDecision::Allow, Some(_)) => FlowEvent::ConfirmationReceived,
            (_, Some(_)) if !missing.is_empty() => FlowEvent::ParametersIncomplete,
            _ => FlowEvent::ParametersComplete,
        };
        let dispatched = self.transition(session, event, &missing, audit);
        if dispatched != FlowState::Dispatched {
            return;
        }

        self.audit.emit(audit.record(
            "dispatch.execution_started",
            AuditCategory::Dispatch,
            AuditOutcome::Accepted,
        ));
        let result = match self.dispatcher.dispatch(&intent).await {
            Ok(result) => result,
            Err(error) => {
                warn!(
                    event_name = "agent.conversation.dispatch_failed",
                    capability_id = %intent.capability_id,
                    error = %error
                );
                ExecutionResult::failed(error.to_string())
            }
        };
        let outcome = if result.is_success() { AuditOutcome::Accepted } else { AuditOutcome::Failed };
        self.audit.emit(
            audit
                .record("dispatch.execution_finished", AuditCategory::Dispatch, outcome)
                .detail("result", summarize(&result)),
        );

        if result.is_success() {
            if let Some(context) =
                ExecutionContext::from_parameters(&intent.capability_id, &intent.parameters)
            {
                session.context = Some(context);
            }
        }
        append_paragraph(&mut reply.assistant_message, &result.render());
        reply.script_executed = Some(intent.capability_id);
        reply.script_result = Some(result);
        self.transition(session, FlowEvent::ExecutionFinished, &[], audit);
    }

    /// Applies `event` and returns the session's new state.
    fn transition(
        &self,
        session: &mut ConversationSession,
        event: FlowEvent,
        missing_fields: &[String],
        audit: &AuditContext,
    ) -> FlowState {
        if event == FlowEvent::IntentCleared && session.state.has_pending_intent() {
            debug!(event_name = "agent.conversation.pending_intent_dropped", from = %session.state);
            self.audit.emit(
                audit
                    .record("conversation.pending_intent_dropped", AuditCategory::Flow, AuditOutcome::Accepted)
                    .detail("from", session.state.to_string()),
            );
        }
        match self.flow.step_audited(session.state, event, missing_fields, self.audit.as_ref(), audit) {
            Ok(transition) => session.state = transition.to,
            Err(error) => {
                warn!(
                    event_name = "agent.conversation.transition_rejected",
                    error = %error,
                    "flow transition rejected; session reset to idle"
                );
                session.state = FlowState::Idle;
            }
        }
        session.state
    }
}

fn append_paragraph(message: &mut String, paragraph: &str) {
    if !message.trim().is_empty() {
        message.push_str("\n\n");
    }
    message.push_str(paragraph);
}

fn summarize(result: &ExecutionResult) -> String {
    match result {
        ExecutionResult::Completed { exit_code, .. } => format!("exit_code={exit_code}"),
        ExecutionResult::Failed { error } => format!("error={error}"),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use netops_core::audit::InMemoryAuditSink;
    use netops_core::config::ConversationConfig;
    use netops_core::flows::FlowState;
    use netops_core::registry::{builtin_catalog, SHOW_COMMANDS_ID};
    use netops_core::{
        Capability, CapabilityDefinition, CapabilityRegistry, CapabilitySet, DomainError,
        ExecutionResult, Parameters, SessionId,
    };
    use secrecy::ExposeSecret;

    use super::{ConversationManager, SessionStore};
    use crate::dispatch::ExecutionDispatcher;
    use crate::llm::{ChatMessage, LlmClient};

    #[derive(Default)]
    struct ScriptedLlm {
        replies: Mutex<VecDeque<Result<String, String>>>,
        seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedLlm {
        fn with(replies: &[&str]) -> Arc<Self> {
            let llm = Self::default();
            if let Ok(mut queue) = llm.replies.lock() {
                queue.extend(replies.iter().map(|reply| Ok((*reply).to_string())));
            }
            Arc::new(llm)
        }

        fn calls(&self) -> Vec<Vec<ChatMessage>> {
            self.seen.lock().map(|seen| seen.clone()).unwrap_or_default()
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(messages.to_vec());
            }
            let next = self.replies.lock().ok().and_then(|mut queue| queue.pop_front());
            match next {
                Some(Ok(reply)) => Ok(reply),
                Some(Err(error)) => Err(anyhow!(error)),
                None => Err(anyhow!("http 503 Service Unavailable: no scripted reply")),
            }
        }
    }

    struct RecordingCapability {
        definition: CapabilityDefinition,
        exit_code: i32,
        runs: Mutex<Vec<Parameters>>,
    }

    #[async_trait]
    impl Capability for RecordingCapability {
        fn definition(&self) -> &CapabilityDefinition {
            &self.definition
        }

        async fn run(&self, parameters: &Parameters) -> Result<ExecutionResult, DomainError> {
            self.definition.build_arguments(parameters)?;
            if let Ok(mut runs) = self.runs.lock() {
                runs.push(parameters.clone());
            }
            Ok(ExecutionResult::Completed {
                exit_code: self.exit_code,
                stdout: format!("10.1.1.1#{}\nCisco IOS XE Software", parameters["command"]),
                stderr: String::new(),
            })
        }
    }

    impl RecordingCapability {
        fn runs(&self) -> Vec<Parameters> {
            self.runs.lock().map(|runs| runs.clone()).unwrap_or_default()
        }
    }

    fn config() -> ConversationConfig {
        ConversationConfig {
            max_transcript_turns: 40,
            reuse_context: true,
            max_sessions: 1_000,
            session_idle_secs: 1_800,
        }
    }

    fn manager(llm: Arc<ScriptedLlm>, exit_code: i32) -> (ConversationManager, Arc<RecordingCapability>) {
        manager_with(llm, exit_code, &config())
    }

    fn manager_with(
        llm: Arc<ScriptedLlm>,
        exit_code: i32,
        config: &ConversationConfig,
    ) -> (ConversationManager, Arc<RecordingCapability>) {
        let registry = Arc::new(CapabilityRegistry::new(builtin_catalog("netops")).expect("catalog"));
        let capability = Arc::new(RecordingCapability {
            definition: registry.get(SHOW_COMMANDS_ID).expect("show commands").clone(),
            exit_code,
            runs: Mutex::new(Vec::new()),
        });
        let mut set = CapabilitySet::default();
        set.register(capability.clone());
        let manager = ConversationManager::new(
            llm,
            ExecutionDispatcher::new(registry, set),
            config,
        )
        .expect("manager");
        (manager, capability)
    }

    const COLLECTED: &str = r#"{"answer": "Ready to run `show version` on 10.1.1.1. Shall I go ahead?",
        "capabilityId": "runShowCommands-main",
        "parameters": {"devices": "10.1.1.1", "username": "netadmin", "password": "s3cret", "command": "show version"},
        "confirmed": false}"#;
    const CONFIRMED: &str = r#"{"answer": "Running it now.",
        "capabilityId": "runShowCommands-main",
        "parameters": {"devices": "10.1.1.1", "username": "netadmin", "password": "s3cret", "command": "show version"},
        "confirmed": true}"#;

    #[tokio::test]
    async fn collects_then_executes_once_after_confirmation() {
        let llm = ScriptedLlm::with(&[COLLECTED, CONFIRMED]);
        let (manager, capability) = manager(llm, 0);
        let session = Some(SessionId("desk-1".to_string()));

        let first = manager.handle_turn(session.clone(), "run show version on 10.1.1.1").await;
        assert_eq!(first.state, FlowState::AwaitingConfirmation);
        assert!(first.script_executed.is_none());
        assert!(capability.runs().is_empty());

        let second = manager.handle_turn(session, "yes, run it").await;
        assert_eq!(second.script_executed.as_deref(), Some(SHOW_COMMANDS_ID));
        assert_eq!(second.state, FlowState::Idle);
        assert!(second.assistant_message.starts_with("Running it now.\n\nExecution finished with return code 0."));
        assert!(second.assistant_message.contains("10.1.1.1#show version"));

        let runs = capability.runs();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].len(), 4);
        assert_eq!(runs[0]["command"], "show version");
    }

    #[tokio::test]
    async fn executions_never_outnumber_confirmations() {
        let missing_password = r#"{"answer": "Go!", "capabilityId": "runShowCommands-main",
            "parameters": {"devices": "10.1.1.1", "username": "netadmin", "password": "", "command": "show clock"},
            "confirmed": true}"#;
        let unknown = r#"{"answer": "Go!", "capabilityId": "eraseStartup-main", "parameters": {}, "confirmed": true}"#;
        let string_flag = r#"{"answer": "Go!", "capabilityId": "runShowCommands-main",
            "parameters": {"devices": "10.1.1.1", "username": "u", "password": "p", "command": "show clock"},
            "confirmed": "yes"}"#;
        let replies = [COLLECTED, missing_password, unknown, string_flag, CONFIRMED, COLLECTED];
        let confirmations = 3;
        let llm = ScriptedLlm::with(&replies);
        let audit = InMemoryAuditSink::default();
        let (manager, capability) = manager(llm, 0);
        let manager = manager.with_audit_sink(Arc::new(audit.clone()));
        let session = Some(SessionId("desk-2".to_string()));

        let mut messages = Vec::new();
        for _ in replies {
            messages.push(manager.handle_turn(session.clone(), "go").await.assistant_message);
        }

        assert!(capability.runs().len() <= confirmations);
        assert_eq!(capability.runs().len(), 1);
        assert!(messages[1].contains("still needs password"));
        assert!(messages[2].contains("`eraseStartup-main` is not an available capability"));
        assert!(messages[3].contains("\"confirmed\": \"yes\""));
        assert_eq!(audit.count_of("dispatch.execution_refused"), 2);
    }

    #[tokio::test]
    async fn changing_the_subject_drops_the_unconfirmed_intent() {
        let small_talk = r#"{"answer": "Sure, forget that.", "capabilityId": null, "parameters": {}, "confirmed": false}"#;
        let llm = ScriptedLlm::with(&[COLLECTED, small_talk, small_talk]);
        let audit = InMemoryAuditSink::default();
        let (manager, capability) = manager(llm, 0);
        let manager = manager.with_audit_sink(Arc::new(audit.clone()));
        let session = Some(SessionId("desk-6".to_string()));

        manager.handle_turn(session.clone(), "run show version on 10.1.1.1").await;
        let second = manager.handle_turn(session.clone(), "never mind").await;
        manager.handle_turn(session, "thanks").await;

        assert_eq!(second.state, FlowState::Idle);
        assert!(capability.runs().is_empty());
        let dropped = audit.snapshot();
        let dropped: Vec<_> =
            dropped.iter().filter(|event| event.action == "conversation.pending_intent_dropped").collect();
        assert_eq!(dropped.len(), 1);
        assert_eq!(dropped[0].detail_value("from"), Some("awaiting_confirmation"));
    }

    #[tokio::test]
    async fn malformed_reply_is_passed_through_without_execution() {
        let llm = ScriptedLlm::with(&["Sure thing, running show version everywhere now!"]);
        let (manager, capability) = manager(llm, 0);
        let session = SessionId("desk-3".to_string());

        let reply = manager.handle_turn(Some(session.clone()), "do it").await;
        assert_eq!(reply.assistant_message, "Sure thing, running show version everywhere now!");
        assert!(reply.script_result.is_none());
        assert!(capability.runs().is_empty());

        let handle = manager.sessions().get(&session).expect("session");
        assert_eq!(handle.lock().await.transcript().len(), 2);
    }

    #[tokio::test]
    async fn successful_run_becomes_context_without_leaking_the_password() {
        let follow_up = r#"{"answer": "Running `show clock` on the same device.",
            "capabilityId": "runShowCommands-main",
            "parameters": {"command": "show clock"},
            "confirmed": true}"#;
        let llm = ScriptedLlm::with(&[CONFIRMED, follow_up]);
        let (manager, capability) = manager(llm.clone(), 0);
        let session = SessionId("desk-4".to_string());

        manager.handle_turn(Some(session.clone()), "run show version on 10.1.1.1").await;
        let second = manager.handle_turn(Some(session.clone()), "same device, show clock").await;

        assert_eq!(second.script_executed.as_deref(), Some(SHOW_COMMANDS_ID));
        let runs = capability.runs();
        assert_eq!(runs[1]["devices"], "10.1.1.1");
        assert_eq!(runs[1]["password"], "s3cret");

        let calls = llm.calls();
        let context_message = &calls[1][1];
        assert_eq!(context_message.role, "system");
        assert!(context_message.content.contains("10.1.1.1"));
        assert!(calls[1].iter().all(|message| message.role != "system" || !message.content.contains("s3cret")));

        let handle = manager.sessions().get(&session).expect("session");
        let guard = handle.lock().await;
        let context = guard.context().expect("context");
        assert_eq!(context.password.expose_secret(), "s3cret");
    }

    #[tokio::test]
    async fn failed_run_leaves_context_untouched() {
        let llm = ScriptedLlm::with(&[CONFIRMED]);
        let (manager, _) = manager(llm, 1);
        let session = SessionId("desk-5".to_string());

        let reply = manager.handle_turn(Some(session.clone()), "yes").await;
        assert!(reply.assistant_message.contains("return code 1"));
        let handle = manager.sessions().get(&session).expect("session");
        assert!(handle.lock().await.context().is_none());
    }

    #[tokio::test]
    async fn collaborator_outage_degrades_to_a_message() {
        let llm = ScriptedLlm::with(&[]);
        let (manager, capability) = manager(llm, 0);

        let reply = manager.handle_turn(None, "hello").await;
        assert_eq!(reply.assistant_message, "The assistant is unavailable right now and no command was run. Please retry shortly.");
        assert!(capability.runs().is_empty());
        assert!(!reply.session_id.as_str().is_empty());
    }

    #[tokio::test]
    async fn sessions_keep_separate_transcripts() {
        let greeting = r#"{"answer": "Hi!", "capabilityId": null, "parameters": {}, "confirmed": false}"#;
        let llm = ScriptedLlm::with(&[greeting, greeting, greeting]);
        let (manager, _) = manager(llm.clone(), 0);
        let alpha = SessionId("alpha".to_string());
        let beta = SessionId("beta".to_string());

        manager.handle_turn(Some(alpha.clone()), "hi").await;
        manager.handle_turn(Some(alpha.clone()), "hi again").await;
        manager.handle_turn(Some(beta.clone()), "hello").await;

        assert_eq!(manager.sessions().len(), 2);
        let calls = llm.calls();
        assert_eq!(calls[1].len(), 4);
        assert_eq!(calls[2].len(), 2);
    }

    #[test]
    fn full_store_evicts_the_least_recently_used_session() {
        let store = SessionStore::new(10, 2, Duration::from_secs(600));
        let alpha = SessionId("alpha".to_string());
        let beta = SessionId("beta".to_string());
        let gamma = SessionId("gamma".to_string());

        drop(store.session(&alpha));
        drop(store.session(&beta));
        drop(store.session(&alpha));
        drop(store.session(&gamma));

        assert_eq!(store.len(), 2);
        assert!(store.get(&alpha).is_some());
        assert!(store.get(&beta).is_none());
        assert!(store.get(&gamma).is_some());
    }

    #[test]
    fn idle_sessions_expire_unless_a_turn_holds_them() {
        let ttl = Duration::from_secs(60);
        let store = SessionStore::new(10, 100, ttl);
        let busy = store.session(&SessionId("busy".to_string()));
        drop(store.session(&SessionId("quiet".to_string())));

        assert_eq!(store.evict_idle(Instant::now()), 0);
        assert_eq!(store.evict_idle(Instant::now() + ttl + Duration::from_secs(1)), 1);
        assert!(store.get(&SessionId("busy".to_string())).is_some());

        drop(busy);
        assert_eq!(store.evict_idle(Instant::now() + ttl + Duration::from_secs(1)), 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn anonymous_turns_do_not_grow_the_store_past_its_cap() {
        let llm = ScriptedLlm::with(&[]);
        let (manager, _) = manager_with(llm, 0, &ConversationConfig { max_sessions: 3, ..config() });

        for _ in 0..25 {
            manager.handle_turn(None, "hello").await;
        }

        assert_eq!(manager.sessions().len(), 3);
    }
}
