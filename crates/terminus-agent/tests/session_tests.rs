//! End-to-end session tests against an in-memory room and scripted providers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::TimeZone;
use serde_json::json;
use tokio::sync::{broadcast, Notify};

use terminus_action::{
    ExecutionError, FnTool, InvocableTool, StaticActionProvider, ToolAction, ToolCatalog, ToolSet,
};
use terminus_agent::{
    ConversationalAgent, JobContext, MemoryRoom, PersonaKind, RoomDriver, RoomOutput, SessionError,
    SessionOrchestrator, SessionState, TurnHooks, APOLOGY,
};
use terminus_core::config::SessionConfig;
use terminus_core::{AudioFrame, PersonaContext, SessionEvent};
use terminus_providers::{
    CapabilityProviders, EnergyVad, GenerationResponse, MockSpeechToText, MockSynthesizer,
    ProviderError, ScriptedLanguageModel, SpeechToText, ToolCallRequest, ToolSpec,
};

const WAIT: Duration = Duration::from_secs(5);

// =============================================================================
// Fixtures
// =============================================================================

fn persona_context() -> PersonaContext {
    let instant = chrono::Utc.with_ymd_and_hms(2026, 10, 19, 4, 0, 0).unwrap();
    PersonaContext::at(instant, chrono_tz::Asia::Kolkata)
}

fn providers(llm: Arc<ScriptedLanguageModel>) -> CapabilityProviders {
    CapabilityProviders::new(
        Arc::new(MockSpeechToText::new("")),
        llm,
        Arc::new(MockSynthesizer::default()),
        Arc::new(EnergyVad::default()),
    )
}

fn agent_with(tools: ToolSet) -> ConversationalAgent {
    ConversationalAgent::assemble(
        PersonaKind::CalendarAssistant,
        "Lucy",
        &persona_context(),
        &ToolCatalog::calendar_assistant(),
        tools,
        TurnHooks::passthrough(),
    )
    .unwrap()
}

fn tool_call(id: &str, action: ToolAction) -> ToolCallRequest {
    ToolCallRequest {
        id: id.to_string(),
        name: action.name().to_string(),
        arguments: json!({"query": "standup"}),
    }
}

fn no_backchannel() -> SessionConfig {
    SessionConfig {
        backchannel_probability: 0.0,
        ..SessionConfig::default()
    }
}

struct Harness {
    room: Arc<MemoryRoom>,
    driver: RoomDriver,
    ctx: JobContext,
}

fn harness() -> Harness {
    let (room, driver) = MemoryRoom::new("console");
    let room = Arc::new(room);
    let ctx = JobContext::new(room.clone());
    Harness { room, driver, ctx }
}

/// Receive events until one matches, returning everything seen.
async fn collect_until(
    rx: &mut broadcast::Receiver<SessionEvent>,
    done: impl Fn(&SessionEvent) -> bool,
) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    loop {
        let event = tokio::time::timeout(WAIT, rx.recv())
            .await
            .expect("timed out waiting for session event")
            .expect("event channel closed");
        let stop = done(&event);
        seen.push(event);
        if stop {
            return seen;
        }
    }
}

// =============================================================================
// Start-up
// =============================================================================

#[tokio::test]
async fn test_empty_tool_set_still_greets() {
    let h = harness();
    let llm = Arc::new(ScriptedLanguageModel::new());
    llm.push_text("Hey there, Lucy here. Ready when you are!");

    let orchestrator = SessionOrchestrator::new(no_backchannel());
    let mut events = orchestrator.subscribe();
    let handle = orchestrator
        .start(h.ctx.clone(), agent_with(ToolSet::new()), providers(llm.clone()))
        .await
        .unwrap();

    let seen = collect_until(&mut events, |e| {
        matches!(e, SessionEvent::GreetingEmitted { .. })
    })
    .await;
    assert!(matches!(
        seen[0],
        SessionEvent::SessionStarted { tool_count: 0, .. }
    ));
    assert_eq!(
        h.room.transcripts(),
        vec!["Hey there, Lucy here. Ready when you are!".to_string()]
    );

    let greeting_request = &llm.requests()[0];
    assert!(greeting_request.tools.is_empty());
    assert!(greeting_request.messages[1]
        .content
        .starts_with("Your name is Lucy."));
    assert_eq!(h.ctx.state(), SessionState::Running);
    assert_eq!(
        h.room.input_options().map(|o| o.noise_cancellation),
        Some(true)
    );

    h.driver.disconnect();
    let summary = tokio::time::timeout(WAIT, handle.wait()).await.unwrap().unwrap();
    assert_eq!(summary.turns, 0);
    assert_eq!(h.ctx.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_partial_resolution_still_starts() {
    let h = harness();
    let llm = Arc::new(ScriptedLanguageModel::new());
    llm.push_text("Hi!");

    let provider = StaticActionProvider::echo_all().failing_on([ToolAction::SendEmail]);
    let agent = ConversationalAgent::resolve(
        PersonaKind::CalendarAssistant,
        "Lucy",
        &persona_context(),
        &ToolCatalog::new([ToolAction::SendEmail, ToolAction::FindEvent]),
        &provider,
        TurnHooks::passthrough(),
    )
    .await
    .unwrap();
    assert_eq!(agent.tools.actions(), vec![ToolAction::FindEvent]);

    let orchestrator = SessionOrchestrator::new(no_backchannel());
    let mut events = orchestrator.subscribe();
    let handle = orchestrator
        .start(h.ctx.clone(), agent, providers(llm))
        .await
        .unwrap();

    let seen = collect_until(&mut events, |e| {
        matches!(e, SessionEvent::GreetingEmitted { .. })
    })
    .await;
    assert!(matches!(
        seen[0],
        SessionEvent::SessionStarted { tool_count: 1, .. }
    ));

    handle.stop();
    tokio::time::timeout(WAIT, handle.wait()).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_connect_failure_is_fatal_and_silent() {
    let (room, _driver) = MemoryRoom::new("console");
    let room = Arc::new(room.refusing("signalling server unreachable"));
    let ctx = JobContext::new(room.clone());

    let llm = Arc::new(ScriptedLanguageModel::new());
    llm.push_text("Hello!");
    let calls = Arc::new(AtomicBool::new(false));
    let seen_call = calls.clone();
    let mut tools = ToolSet::new();
    tools.insert(Arc::new(FnTool::new(ToolAction::FindEvent, move |_| {
        seen_call.store(true, Ordering::SeqCst);
        Ok(json!({}))
    })));

    let orchestrator = SessionOrchestrator::new(no_backchannel());
    let mut events = orchestrator.subscribe();
    let err = orchestrator
        .start(ctx.clone(), agent_with(tools), providers(llm.clone()))
        .await
        .err()
        .unwrap();

    assert!(matches!(err, SessionError::Connection { .. }));
    assert!(err.is_fatal());
    assert!(llm.requests().is_empty());
    assert!(room.published().is_empty());
    assert!(!calls.load(Ordering::SeqCst));
    assert!(events.try_recv().is_err());
    assert_eq!(ctx.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_second_start_is_rejected() {
    let h = harness();
    let llm = Arc::new(ScriptedLanguageModel::new());
    llm.push_text("Hi!");

    let orchestrator = SessionOrchestrator::new(no_backchannel());
    let handle = orchestrator
        .start(h.ctx.clone(), agent_with(ToolSet::new()), providers(llm.clone()))
        .await
        .unwrap();

    let err = orchestrator
        .start(h.ctx.clone(), agent_with(ToolSet::new()), providers(llm))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, SessionError::AlreadyStarted(id) if id == h.ctx.job_id));

    handle.stop();
    tokio::time::timeout(WAIT, handle.wait()).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_greeting_failure_is_not_fatal() {
    let h = harness();
    let llm = Arc::new(ScriptedLanguageModel::new());
    llm.push_error("model overloaded").push_text("Your day is clear.");

    let orchestrator = SessionOrchestrator::new(no_backchannel());
    let mut events = orchestrator.subscribe();
    let handle = orchestrator
        .start(h.ctx.clone(), agent_with(ToolSet::new()), providers(llm))
        .await
        .unwrap();

    h.driver.say("what's on today").await;
    let seen = collect_until(&mut events, |e| {
        matches!(e, SessionEvent::ReplyEmitted { .. })
    })
    .await;
    assert!(seen
        .iter()
        .any(|e| matches!(e, SessionEvent::GreetingFailed { .. })));
    assert_eq!(h.room.transcripts(), vec!["Your day is clear.".to_string()]);

    h.driver.disconnect();
    tokio::time::timeout(WAIT, handle.wait()).await.unwrap().unwrap();
}

// =============================================================================
// Turns
// =============================================================================

#[tokio::test]
async fn test_typed_turn_is_normalized_and_answered() {
    let h = harness();
    let llm = Arc::new(ScriptedLanguageModel::new());
    llm.push_text("Hello!").push_text("Done, it's booked.");

    let mut agent = agent_with(ToolSet::new());
    agent.hooks = TurnHooks::conversational(
        terminus_agent::SpeechNormalizer::new(),
        Arc::new(terminus_agent::BackchannelSelector::seeded(0.0, 1)),
    );

    let orchestrator = SessionOrchestrator::new(no_backchannel());
    let mut events = orchestrator.subscribe();
    let handle = orchestrator
        .start(h.ctx.clone(), agent, providers(llm.clone()))
        .await
        .unwrap();

    h.driver
        .say("I   um   need to uh schedule a meeting")
        .await;
    let seen = collect_until(&mut events, |e| {
        matches!(e, SessionEvent::ReplyEmitted { .. })
    })
    .await;

    assert!(seen.contains(&SessionEvent::TurnFinalized {
        turn: 1,
        normalized_text: "I need to schedule a meeting".to_string(),
    }));
    let request = &llm.requests()[1];
    let last = request.messages.last().unwrap();
    assert_eq!(last.content, "I need to schedule a meeting");
    assert_eq!(
        request.messages[0].content,
        llm.requests()[0].messages[0].content
    );

    h.driver.disconnect();
    let summary = tokio::time::timeout(WAIT, handle.wait()).await.unwrap().unwrap();
    assert_eq!(summary.turns, 1);
}

#[tokio::test]
async fn test_voice_turn_goes_through_vad_and_stt() {
    let h = harness();
    let llm = Arc::new(ScriptedLanguageModel::new());
    llm.push_text("Hi!").push_text("You have two meetings.");
    let providers = CapabilityProviders::new(
        Arc::new(MockSpeechToText::with_transcripts(["what's on my calendar"])),
        llm,
        Arc::new(MockSynthesizer::default()),
        Arc::new(EnergyVad::default()),
    );

    let orchestrator = SessionOrchestrator::new(no_backchannel());
    let mut events = orchestrator.subscribe();
    let handle = orchestrator
        .start(h.ctx.clone(), agent_with(ToolSet::new()), providers)
        .await
        .unwrap();

    for _ in 0..3 {
        h.driver.send_audio(AudioFrame::new(vec![0.3; 160], 16000)).await;
    }
    h.driver.send_audio(AudioFrame::new(vec![0.0; 160], 16000)).await;

    let seen = collect_until(&mut events, |e| {
        matches!(e, SessionEvent::ReplyEmitted { .. })
    })
    .await;
    assert!(seen.contains(&SessionEvent::TurnFinalized {
        turn: 1,
        normalized_text: "what's on my calendar".to_string(),
    }));

    h.driver.disconnect();
    tokio::time::timeout(WAIT, handle.wait()).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_waiting_phrase_precedes_tool_result() {
    let h = harness();
    let llm = Arc::new(ScriptedLanguageModel::new());
    llm.push_text("Hi!")
        .push(GenerationResponse {
            text: Some("Just a moment while I check your calendar.".to_string()),
            tool_calls: vec![tool_call("call_1", ToolAction::FindEvent)],
        })
        .push_text("You have standup at ten.");

    let mut tools = ToolSet::new();
    tools.insert(Arc::new(FnTool::new(ToolAction::FindEvent, |_| {
        Ok(json!({"events": [{"summary": "standup", "start": "10:00"}]}))
    })));

    let orchestrator = SessionOrchestrator::new(no_backchannel());
    let mut events = orchestrator.subscribe();
    let handle = orchestrator
        .start(h.ctx.clone(), agent_with(tools), providers(llm.clone()))
        .await
        .unwrap();

    h.driver.say("do I have anything this morning").await;
    let seen = collect_until(&mut events, |e| {
        matches!(e, SessionEvent::ReplyEmitted { .. })
    })
    .await;

    let turn_events: Vec<&SessionEvent> = seen.iter().filter(|e| e.turn() == Some(1)).collect();
    assert!(matches!(turn_events[0], SessionEvent::TurnFinalized { .. }));
    assert!(matches!(
        turn_events[1],
        SessionEvent::WaitingPhraseEmitted { .. }
    ));
    assert!(matches!(
        turn_events[2],
        SessionEvent::ToolCallCompleted { success: true, .. }
    ));
    assert!(matches!(turn_events[3], SessionEvent::ReplyEmitted { .. }));

    assert_eq!(
        h.room.transcripts(),
        vec![
            "Hi!".to_string(),
            "Just a moment while I check your calendar.".to_string(),
            "You have standup at ten.".to_string(),
        ]
    );

    // The follow-up request carries the tool result for the call.
    let follow_up = &llm.requests()[2];
    let tool_msg = follow_up
        .messages
        .iter()
        .find(|m| m.tool_call_id.as_deref() == Some("call_1"))
        .unwrap();
    assert!(tool_msg.content.contains("standup"));

    h.driver.disconnect();
    tokio::time::timeout(WAIT, handle.wait()).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_tool_failure_reported_to_model() {
    let h = harness();
    let llm = Arc::new(ScriptedLanguageModel::new());
    llm.push_text("Hi!")
        .push(GenerationResponse {
            text: None,
            tool_calls: vec![tool_call("call_9", ToolAction::SendEmail)],
        })
        .push_text("I couldn't send that email, want me to try again later?");

    let mut tools = ToolSet::new();
    tools.insert(Arc::new(FnTool::new(ToolAction::SendEmail, |_| {
        Err(ExecutionError::Failed("mailbox not connected".to_string()))
    })));

    let orchestrator = SessionOrchestrator::new(no_backchannel());
    let mut events = orchestrator.subscribe();
    let handle = orchestrator
        .start(h.ctx.clone(), agent_with(tools), providers(llm.clone()))
        .await
        .unwrap();

    h.driver.say("email Sam the notes").await;
    let seen = collect_until(&mut events, |e| {
        matches!(e, SessionEvent::ReplyEmitted { .. })
    })
    .await;

    assert!(seen.contains(&SessionEvent::WaitingPhraseEmitted {
        turn: 1,
        text: ToolAction::SendEmail.waiting_phrase().to_string(),
    }));
    assert!(seen
        .iter()
        .any(|e| matches!(e, SessionEvent::ToolCallCompleted { success: false, .. })));

    let tool_msg = llm.requests()[2]
        .messages
        .iter()
        .find(|m| m.tool_call_id.as_deref() == Some("call_9"))
        .cloned()
        .unwrap();
    assert_eq!(
        tool_msg.content,
        r#"{"error":"Tool failed: mailbox not connected"}"#
    );

    h.driver.disconnect();
    tokio::time::timeout(WAIT, handle.wait()).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_generation_failure_drops_turn_with_apology() {
    let h = harness();
    let llm = Arc::new(ScriptedLanguageModel::new());
    llm.push_text("Hi!")
        .push_error("rate limited")
        .push_text("Sure, it's three o'clock.");

    let orchestrator = SessionOrchestrator::new(no_backchannel());
    let mut events = orchestrator.subscribe();
    let handle = orchestrator
        .start(h.ctx.clone(), agent_with(ToolSet::new()), providers(llm))
        .await
        .unwrap();

    h.driver.say("what time is it").await;
    collect_until(&mut events, |e| {
        matches!(e, SessionEvent::TurnDropped { turn: 1, .. })
    })
    .await;

    h.driver.say("what time is it").await;
    collect_until(&mut events, |e| {
        matches!(e, SessionEvent::ReplyEmitted { turn: 2, .. })
    })
    .await;

    assert_eq!(
        h.room.transcripts(),
        vec![
            "Hi!".to_string(),
            APOLOGY.to_string(),
            "Sure, it's three o'clock.".to_string(),
        ]
    );

    h.driver.disconnect();
    let summary = tokio::time::timeout(WAIT, handle.wait()).await.unwrap().unwrap();
    assert_eq!(summary.turns, 2);
}

#[tokio::test]
async fn test_backchannel_applies_to_replies_not_greeting() {
    let h = harness();
    let llm = Arc::new(ScriptedLanguageModel::new());
    llm.push_text("Hello!").push_text("Your meeting is at three.");

    let mut agent = agent_with(ToolSet::new());
    agent.hooks = TurnHooks::conversational(
        terminus_agent::SpeechNormalizer::new(),
        Arc::new(terminus_agent::BackchannelSelector::seeded(1.0, 11)),
    );

    let orchestrator = SessionOrchestrator::new(SessionConfig::default());
    let mut events = orchestrator.subscribe();
    let handle = orchestrator
        .start(h.ctx.clone(), agent, providers(llm))
        .await
        .unwrap();

    h.driver.say("when is my meeting").await;
    collect_until(&mut events, |e| {
        matches!(e, SessionEvent::ReplyEmitted { .. })
    })
    .await;

    let transcripts = h.room.transcripts();
    assert_eq!(transcripts[0], "Hello!");
    assert!(transcripts[1].ends_with(". Your meeting is at three."));
    assert_ne!(transcripts[1], "Your meeting is at three.");

    h.driver.disconnect();
    tokio::time::timeout(WAIT, handle.wait()).await.unwrap().unwrap();
}

// =============================================================================
// Cancellation
// =============================================================================

/// Tool that signals when invoked and then waits to be released.
struct GatedTool {
    action: ToolAction,
    spec: ToolSpec,
    started: Arc<Notify>,
    release: Arc<Notify>,
    dropped: Arc<AtomicBool>,
}

impl GatedTool {
    fn new(action: ToolAction) -> Self {
        Self {
            action,
            spec: ToolSpec {
                name: action.name().to_string(),
                description: String::new(),
                parameters: json!({"type": "object"}),
            },
            started: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
            dropped: Arc::new(AtomicBool::new(false)),
        }
    }
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl InvocableTool for GatedTool {
    fn action(&self) -> ToolAction {
        self.action
    }

    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn invoke(&self, _input: serde_json::Value) -> Result<serde_json::Value, ExecutionError> {
        let _flag = DropFlag(self.dropped.clone());
        self.started.notify_one();
        self.release.notified().await;
        Ok(json!({"events": []}))
    }
}

fn audio_frames(room: &MemoryRoom) -> usize {
    room.published()
        .iter()
        .filter(|o| matches!(o, RoomOutput::Audio(_)))
        .count()
}

/// Poll until `done` holds, failing after `WAIT`.
async fn wait_for(done: impl Fn() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !done() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("timed out waiting for condition");
}

#[tokio::test]
async fn test_disconnect_cancels_in_flight_tool_call() {
    let h = harness();
    let llm = Arc::new(ScriptedLanguageModel::new());
    llm.push_text("Hi!").push(GenerationResponse {
        text: Some("Give me a second while I update your calendar.".to_string()),
        tool_calls: vec![tool_call("call_2", ToolAction::CreateEvent)],
    });

    let tool = GatedTool::new(ToolAction::CreateEvent);
    let started = tool.started.clone();
    let dropped = tool.dropped.clone();
    let mut tools = ToolSet::new();
    tools.insert(Arc::new(tool));

    let config = SessionConfig {
        tool_timeout_secs: 3600,
        ..no_backchannel()
    };
    let orchestrator = SessionOrchestrator::new(config);
    let mut events = orchestrator.subscribe();
    let handle = orchestrator
        .start(h.ctx.clone(), agent_with(tools), providers(llm))
        .await
        .unwrap();

    h.driver.say("book lunch with Priya tomorrow").await;
    collect_until(&mut events, |e| {
        matches!(e, SessionEvent::WaitingPhraseEmitted { .. })
    })
    .await;
    tokio::time::timeout(WAIT, started.notified()).await.unwrap();

    h.driver.disconnect();
    let summary = tokio::time::timeout(WAIT, handle.wait()).await.unwrap().unwrap();
    assert_eq!(summary.turns, 1);

    let rest = collect_until(&mut events, |e| {
        matches!(e, SessionEvent::SessionEnded { .. })
    })
    .await;
    assert!(!rest.iter().any(|e| matches!(
        e,
        SessionEvent::ToolCallCompleted { .. } | SessionEvent::ReplyEmitted { .. }
    )));
    assert!(dropped.load(Ordering::SeqCst));
    assert_eq!(h.ctx.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_disconnect_during_greeting_ends_start() {
    let h = harness();
    let llm = Arc::new(ScriptedLanguageModel::new().with_delay(Duration::from_secs(3600)));
    llm.push_text("Hi!");

    let orchestrator = SessionOrchestrator::new(no_backchannel());
    let mut events = orchestrator.subscribe();
    let ctx = h.ctx.clone();
    let model = llm.clone();
    let start = tokio::spawn(async move {
        orchestrator
            .start(ctx, agent_with(ToolSet::new()), providers(model))
            .await
    });

    // The greeting request is in flight and will not answer on its own.
    wait_for(|| llm.requests().len() == 1).await;
    h.driver.disconnect();

    let handle = tokio::time::timeout(WAIT, start)
        .await
        .expect("start did not return after disconnect")
        .unwrap()
        .unwrap();
    let summary = tokio::time::timeout(WAIT, handle.wait()).await.unwrap().unwrap();
    assert_eq!(summary.turns, 0);
    assert_eq!(h.ctx.state(), SessionState::Closed);
    assert!(h.room.published().is_empty());

    let seen = collect_until(&mut events, |e| {
        matches!(e, SessionEvent::SessionEnded { .. })
    })
    .await;
    assert!(!seen.iter().any(|e| matches!(
        e,
        SessionEvent::GreetingEmitted { .. } | SessionEvent::GreetingFailed { .. }
    )));
}

// =============================================================================
// Concurrency
// =============================================================================

/// Speech-to-text that signals each call and optionally waits for a release.
struct GatedSpeechToText {
    text: String,
    started: Arc<Notify>,
    gate: Option<Arc<Notify>>,
}

#[async_trait]
impl SpeechToText for GatedSpeechToText {
    async fn transcribe(&self, _utterance: &AudioFrame) -> Result<String, ProviderError> {
        self.started.notify_one();
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        Ok(self.text.clone())
    }
}

async fn send_utterance(driver: &RoomDriver) {
    for _ in 0..3 {
        driver.send_audio(AudioFrame::new(vec![0.3; 160], 16000)).await;
    }
    driver.send_audio(AudioFrame::new(vec![0.0; 160], 16000)).await;
}

#[tokio::test]
async fn test_waiting_phrase_audio_plays_while_tool_runs() {
    let h = harness();
    let llm = Arc::new(ScriptedLanguageModel::new());
    llm.push_text("Hi!")
        .push(GenerationResponse {
            text: Some("Just a moment.".to_string()),
            tool_calls: vec![tool_call("call_1", ToolAction::FindEvent)],
        })
        .push_text("Your morning is free.");

    let tool = GatedTool::new(ToolAction::FindEvent);
    let started = tool.started.clone();
    let release = tool.release.clone();
    let mut tools = ToolSet::new();
    tools.insert(Arc::new(tool));

    let orchestrator = SessionOrchestrator::new(no_backchannel());
    let mut events = orchestrator.subscribe();
    let handle = orchestrator
        .start(h.ctx.clone(), agent_with(tools), providers(llm))
        .await
        .unwrap();

    h.driver.say("anything this morning").await;
    tokio::time::timeout(WAIT, started.notified()).await.unwrap();

    // Greeting audio plus waiting phrase audio, with the tool still pending.
    wait_for(|| audio_frames(&h.room) == 2).await;
    assert_eq!(
        h.room.transcripts(),
        vec!["Hi!".to_string(), "Just a moment.".to_string()]
    );

    release.notify_one();
    collect_until(&mut events, |e| {
        matches!(e, SessionEvent::ReplyEmitted { .. })
    })
    .await;
    assert_eq!(audio_frames(&h.room), 3);

    h.driver.disconnect();
    tokio::time::timeout(WAIT, handle.wait()).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_next_utterance_transcribed_while_tool_runs() {
    let h = harness();
    let llm = Arc::new(ScriptedLanguageModel::new());
    llm.push_text("Hi!")
        .push(GenerationResponse {
            text: Some("Checking.".to_string()),
            tool_calls: vec![tool_call("call_1", ToolAction::FindEvent)],
        })
        .push_text("Nothing today.")
        .push_text("Lunch is booked.");

    let tool = GatedTool::new(ToolAction::FindEvent);
    let tool_started = tool.started.clone();
    let release = tool.release.clone();
    let dropped = tool.dropped.clone();
    let mut tools = ToolSet::new();
    tools.insert(Arc::new(tool));

    let heard = Arc::new(Notify::new());
    let providers = CapabilityProviders::new(
        Arc::new(GatedSpeechToText {
            text: "book lunch".to_string(),
            started: heard.clone(),
            gate: None,
        }),
        llm,
        Arc::new(MockSynthesizer::default()),
        Arc::new(EnergyVad::default()),
    );

    let orchestrator = SessionOrchestrator::new(no_backchannel());
    let mut events = orchestrator.subscribe();
    let handle = orchestrator
        .start(h.ctx.clone(), agent_with(tools), providers)
        .await
        .unwrap();

    h.driver.say("anything today").await;
    tokio::time::timeout(WAIT, tool_started.notified()).await.unwrap();

    send_utterance(&h.driver).await;
    tokio::time::timeout(WAIT, heard.notified())
        .await
        .expect("utterance not transcribed while the tool ran");
    assert!(!dropped.load(Ordering::SeqCst));

    release.notify_one();
    let seen = collect_until(&mut events, |e| {
        matches!(e, SessionEvent::ReplyEmitted { turn: 2, .. })
    })
    .await;
    assert!(seen.contains(&SessionEvent::TurnFinalized {
        turn: 2,
        normalized_text: "book lunch".to_string(),
    }));

    h.driver.disconnect();
    tokio::time::timeout(WAIT, handle.wait()).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_slow_transcription_keeps_room_input_flowing() {
    let h = harness();
    let llm = Arc::new(ScriptedLanguageModel::new());
    llm.push_text("Hi!")
        .push_text("You have two meetings.")
        .push_text("Lunch is booked.");

    let heard = Arc::new(Notify::new());
    let gate = Arc::new(Notify::new());
    let providers = CapabilityProviders::new(
        Arc::new(GatedSpeechToText {
            text: "what's on my calendar".to_string(),
            started: heard.clone(),
            gate: Some(gate.clone()),
        }),
        llm,
        Arc::new(MockSynthesizer::default()),
        Arc::new(EnergyVad::default()),
    );

    let orchestrator = SessionOrchestrator::new(no_backchannel());
    let mut events = orchestrator.subscribe();
    let handle = orchestrator
        .start(h.ctx.clone(), agent_with(ToolSet::new()), providers)
        .await
        .unwrap();

    send_utterance(&h.driver).await;
    tokio::time::timeout(WAIT, heard.notified()).await.unwrap();

    // More frames than the room buffers; these only go through if intake keeps reading.
    tokio::time::timeout(WAIT, async {
        for _ in 0..200 {
            h.driver.send_audio(AudioFrame::new(vec![0.0; 160], 16000)).await;
        }
    })
    .await
    .expect("room input stalled behind transcription");
    h.driver.say("book lunch").await;

    gate.notify_one();
    let seen = collect_until(&mut events, |e| {
        matches!(e, SessionEvent::ReplyEmitted { turn: 2, .. })
    })
    .await;
    let finalized: Vec<&str> = seen
        .iter()
        .filter_map(|e| match e {
            SessionEvent::TurnFinalized {
                normalized_text, ..
            } => Some(normalized_text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(finalized, vec!["what's on my calendar", "book lunch"]);

    h.driver.disconnect();
    tokio::time::timeout(WAIT, handle.wait()).await.unwrap().unwrap();
}

// =============================================================================
// Tool round limit
// =============================================================================

#[tokio::test]
async fn test_tool_round_limit_forces_spoken_reply() {
    let h = harness();
    let llm = Arc::new(ScriptedLanguageModel::new());
    llm.push_text("Hi!")
        .push(GenerationResponse {
            text: Some("One moment.".to_string()),
            tool_calls: vec![tool_call("call_1", ToolAction::FindEvent)],
        })
        .push(GenerationResponse {
            text: Some("Still looking.".to_string()),
            tool_calls: vec![tool_call("call_2", ToolAction::FindEvent)],
        })
        .push_text("You have standup at ten.");

    let mut tools = ToolSet::new();
    tools.insert(Arc::new(FnTool::new(ToolAction::FindEvent, |_| {
        Ok(json!({"events": [{"summary": "standup", "start": "10:00"}]}))
    })));

    let config = SessionConfig {
        max_tool_rounds: 1,
        ..no_backchannel()
    };
    let orchestrator = SessionOrchestrator::new(config);
    let mut events = orchestrator.subscribe();
    let handle = orchestrator
        .start(h.ctx.clone(), agent_with(tools), providers(llm.clone()))
        .await
        .unwrap();

    h.driver.say("what's on this morning").await;
    let seen = collect_until(&mut events, |e| {
        matches!(
            e,
            SessionEvent::ReplyEmitted { .. } | SessionEvent::TurnDropped { .. }
        )
    })
    .await;

    assert_eq!(
        seen.last(),
        Some(&SessionEvent::ReplyEmitted {
            turn: 1,
            text: "You have standup at ten.".to_string(),
        })
    );
    let completed = seen
        .iter()
        .filter(|e| matches!(e, SessionEvent::ToolCallCompleted { .. }))
        .count();
    assert_eq!(completed, 1);
    assert_eq!(
        h.room.transcripts(),
        vec![
            "Hi!".to_string(),
            "One moment.".to_string(),
            "You have standup at ten.".to_string(),
        ]
    );

    // The last request offers no tools, so the model has to answer.
    let requests = llm.requests();
    assert_eq!(requests.len(), 4);
    assert!(!requests[2].tools.is_empty());
    assert!(requests[3].tools.is_empty());

    h.driver.disconnect();
    tokio::time::timeout(WAIT, handle.wait()).await.unwrap().unwrap();
}
