//! Session orchestration.
//!
//! `SessionOrchestrator::start` joins the job's room, starts the session,
//! speaks the opening greeting and hands the session to three tasks:
//!
//! - intake: reads room input and runs voice activity detection
//! - transcription: runs speech-to-text on finished utterances, in order, and
//!   queues final transcripts
//! - turns: processes queued transcripts one at a time (normalize, generate,
//!   run tools, enhance, synthesize, publish)
//!
//! Intake and transcription keep running while a turn waits on the model or
//! on tool calls, and while the greeting is generated.
//! Room disconnect cancels the session token, which drops any in-flight
//! greeting, transcription, generation and tool calls.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use terminus_action::{execute_calls, ToolAction};
use terminus_core::config::SessionConfig;
use terminus_core::{AudioFrame, ConversationTurn, SessionEvent};
use terminus_providers::{
    CapabilityProviders, ChatMessage, GenerationRequest, GenerationResponse, ProviderError,
    VadResult,
};

use crate::agent::ConversationalAgent;
use crate::error::SessionError;
use crate::persona::APOLOGY;
use crate::room::{JobContext, Room, RoomInput, RoomInputOptions, RoomOutput};
use crate::state::SessionState;

const EVENT_CAPACITY: usize = 256;
const FALLBACK_WAITING_PHRASE: &str = "One moment while I take care of that.";

// =============================================================================
// SessionOrchestrator
// =============================================================================

/// Starts sessions and publishes their events.
pub struct SessionOrchestrator {
    config: SessionConfig,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionOrchestrator {
    pub fn new(config: SessionConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self { config, events }
    }

    /// Observe events of sessions started after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Bind a session to `ctx`'s room and start it.
    ///
    /// Returns once the session is running and the greeting has been
    /// attempted or cut short by a disconnect. Connection failure is returned as-is and never retried;
    /// greeting failure is logged and the session continues.
    pub async fn start(
        &self,
        ctx: JobContext,
        agent: ConversationalAgent,
        providers: CapabilityProviders,
    ) -> Result<SessionHandle, SessionError> {
        let job_id = ctx.job_id;
        ctx.state_machine()
            .transition(SessionState::Connecting)
            .map_err(|_| SessionError::AlreadyStarted(job_id))?;

        let room = ctx.room().clone();
        let inputs = match connect(room.as_ref(), self.config.noise_cancellation).await {
            Ok(inputs) => inputs,
            Err(e) => {
                let _ = ctx.state_machine().transition(SessionState::Closed);
                return Err(e);
            }
        };
        ctx.state_machine().transition(SessionState::Running)?;

        tracing::info!(
            job_id = %job_id,
            room = room.name(),
            agent = %agent.name,
            tools = agent.tools.len(),
            "Session started"
        );
        let _ = self.events.send(SessionEvent::SessionStarted {
            job_id,
            room: room.name().to_string(),
            tool_count: agent.tools.len(),
        });

        let session = Arc::new(Session {
            room,
            agent,
            providers,
            config: self.config.clone(),
            events: self.events.clone(),
        });

        let cancel = CancellationToken::new();
        let (captured_tx, captured_rx) = mpsc::unbounded_channel();
        let (turn_tx, turn_rx) = mpsc::unbounded_channel();
        let intake = tokio::spawn(session.clone().intake(inputs, captured_tx, cancel.clone()));
        let transcriber =
            tokio::spawn(session.clone().transcribe_all(captured_rx, turn_tx, cancel.clone()));

        // Intake is already watching the room, so a disconnect ends the greeting.
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(job_id = %job_id, "Room disconnected during greeting");
            }
            _ = session.greet() => {}
        }
        let turns = tokio::spawn(session.clone().run_turns(turn_rx, cancel.clone()));

        let token = cancel.clone();
        let task = tokio::spawn(async move {
            let turns = turns.await.unwrap_or_else(|e| {
                tracing::error!(job_id = %job_id, error = %e, "Turn task failed");
                0
            });
            cancel.cancel();
            let _ = intake.await;
            let _ = transcriber.await;
            let _ = ctx.state_machine().transition(SessionState::Closed);

            tracing::info!(job_id = %job_id, turns, "Session ended");
            let _ = session.events.send(SessionEvent::SessionEnded { job_id, turns });
            SessionSummary { job_id, turns }
        });

        Ok(SessionHandle {
            job_id,
            cancel: token,
            task,
        })
    }
}

async fn connect(
    room: &dyn Room,
    noise_cancellation: bool,
) -> Result<mpsc::Receiver<RoomInput>, SessionError> {
    let inputs = room.connect().await?;
    room.configure_input(RoomInputOptions { noise_cancellation })
        .await?;
    Ok(inputs)
}

// =============================================================================
// SessionHandle
// =============================================================================

/// Outcome of a finished session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub job_id: Uuid,
    /// Turns that reached the model.
    pub turns: u64,
}

/// Handle to a running session.
#[derive(Debug)]
pub struct SessionHandle {
    job_id: Uuid,
    cancel: CancellationToken,
    task: JoinHandle<SessionSummary>,
}

impl SessionHandle {
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    /// End the session as if the room had disconnected.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Wait until the session has fully ended.
    pub async fn wait(self) -> Result<SessionSummary, SessionError> {
        self.task
            .await
            .map_err(|e| SessionError::Room(format!("session task failed: {}", e)))
    }
}

// =============================================================================
// Session
// =============================================================================

struct Session {
    room: Arc<dyn Room>,
    agent: ConversationalAgent,
    providers: CapabilityProviders,
    config: SessionConfig,
    events: broadcast::Sender<SessionEvent>,
}

/// Why a turn was abandoned.
enum TurnFailure {
    Generation(ProviderError),
    Synthesis(ProviderError),
    Room(SessionError),
}

impl std::fmt::Display for TurnFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TurnFailure::Generation(e) | TurnFailure::Synthesis(e) => write!(f, "{}", e),
            TurnFailure::Room(e) => write!(f, "{}", e),
        }
    }
}

impl Session {
    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    async fn speak(&self, text: &str) -> Result<(), TurnFailure> {
        let audio = self
            .providers
            .tts
            .synthesize(text)
            .await
            .map_err(TurnFailure::Synthesis)?;
        self.room
            .publish(RoomOutput::Transcript(text.to_string()))
            .await
            .map_err(TurnFailure::Room)?;
        self.room
            .publish(RoomOutput::Audio(audio))
            .await
            .map_err(TurnFailure::Room)
    }

    /// The system-generated opening turn.
    async fn greet(&self) {
        let request = GenerationRequest {
            messages: vec![
                ChatMessage::system(self.agent.instructions.clone()),
                ChatMessage::system(self.agent.greeting_instruction.clone()),
            ],
            tools: Vec::new(),
        };

        let result = match self.providers.llm.generate(&request).await {
            Ok(response) => match response.trimmed_text() {
                Some(text) => {
                    let greeting = self.agent.enhance(text, true);
                    self.speak(&greeting).await.map(|_| greeting)
                }
                None => Err(TurnFailure::Generation(ProviderError::InvalidResponse(
                    "empty greeting".to_string(),
                ))),
            },
            Err(e) => Err(TurnFailure::Generation(e)),
        };

        match result {
            Ok(text) => self.emit(SessionEvent::GreetingEmitted { text }),
            Err(e) => {
                tracing::warn!(error = %e, "Opening greeting failed, continuing without it");
                self.emit(SessionEvent::GreetingFailed {
                    reason: e.to_string(),
                });
            }
        }
    }

    /// Read room input until disconnect, passing typed lines and finished
    /// utterances on in arrival order. Never waits on a provider.
    async fn intake(
        self: Arc<Self>,
        mut inputs: mpsc::Receiver<RoomInput>,
        captured: mpsc::UnboundedSender<Captured>,
        cancel: CancellationToken,
    ) {
        let mut utterance = Utterance::default();
        loop {
            let input = tokio::select! {
                _ = cancel.cancelled() => break,
                input = inputs.recv() => input,
            };
            let Some(input) = input else {
                tracing::info!(room = self.room.name(), "Room disconnected");
                cancel.cancel();
                break;
            };

            let item = match input {
                RoomInput::Text(text) => Some(Captured::Text(text)),
                RoomInput::Audio(frame) => {
                    let vad = self.providers.vad.detect(&frame);
                    utterance.push(frame, vad).map(Captured::Speech)
                }
            };

            if let Some(item) = item {
                if captured.send(item).is_err() {
                    break;
                }
            }
        }
    }

    /// Turn captured input into final transcripts, one at a time and in order.
    async fn transcribe_all(
        self: Arc<Self>,
        mut captured: mpsc::UnboundedReceiver<Captured>,
        turns: mpsc::UnboundedSender<String>,
        cancel: CancellationToken,
    ) {
        loop {
            let item = tokio::select! {
                _ = cancel.cancelled() => break,
                item = captured.recv() => match item {
                    Some(item) => item,
                    None => break,
                },
            };

            let text = match item {
                Captured::Text(text) => Some(text),
                Captured::Speech(utterance) => tokio::select! {
                    _ = cancel.cancelled() => break,
                    text = self.transcribe(&utterance) => text,
                },
            };

            if let Some(text) = text {
                if turns.send(text).is_err() {
                    break;
                }
            }
        }
    }

    async fn transcribe(&self, utterance: &AudioFrame) -> Option<String> {
        match self.providers.stt.transcribe(utterance).await {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::warn!(error = %e, "Transcription failed, utterance dropped");
                None
            }
        }
    }

    /// Process queued transcripts in order until cancelled.
    async fn run_turns(
        self: Arc<Self>,
        mut queue: mpsc::UnboundedReceiver<String>,
        cancel: CancellationToken,
    ) -> u64 {
        let mut history = History::new(self.config.history_turns);
        let mut turns = 0;
        loop {
            let raw = tokio::select! {
                _ = cancel.cancelled() => break,
                raw = queue.recv() => match raw {
                    Some(raw) => raw,
                    None => break,
                },
            };

            let normalized = self.agent.normalize(&raw);
            if normalized.is_empty() {
                tracing::debug!(raw = %raw, "Nothing left after normalization, skipping");
                continue;
            }
            turns += 1;
            let turn = ConversationTurn::new(raw, normalized);

            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(turn = turns, "Turn cancelled by disconnect");
                    break;
                }
                _ = self.process_turn(turns, turn, &mut history) => {}
            }
        }
        turns
    }

    async fn process_turn(&self, number: u64, mut turn: ConversationTurn, history: &mut History) {
        self.emit(SessionEvent::TurnFinalized {
            turn: number,
            normalized_text: turn.normalized_text.clone(),
        });

        let mut exchange = vec![ChatMessage::user(turn.normalized_text.clone())];
        match self
            .generate_reply(number, &mut turn, history, &mut exchange)
            .await
        {
            Ok(reply) => {
                exchange.push(ChatMessage::assistant(reply));
                history.push(exchange);
                tracing::debug!(
                    turn = number,
                    tool_calls = turn.tool_calls.len(),
                    "Turn complete"
                );
                self.emit(SessionEvent::ReplyEmitted {
                    turn: number,
                    text: turn.reply_text.unwrap_or_default(),
                });
            }
            Err(e) => {
                tracing::warn!(turn = number, error = %e, "Turn dropped");
                self.emit(SessionEvent::TurnDropped {
                    turn: number,
                    reason: e.to_string(),
                });
                if self.config.apologize_on_failure {
                    if let Err(e) = self.speak(APOLOGY).await {
                        tracing::warn!(error = %e, "Apology could not be spoken");
                    }
                }
            }
        }
    }

    /// Instructions, then earlier turns, then this turn so far.
    fn context(&self, history: &History, exchange: &[ChatMessage]) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::system(self.agent.instructions.clone())];
        messages.extend(history.messages().cloned());
        messages.extend(exchange.iter().cloned());
        messages
    }

    /// Run model and tool rounds for one turn, then speak the final reply.
    ///
    /// Returns the reply as stored in history (before enhancement).
    async fn generate_reply(
        &self,
        number: u64,
        turn: &mut ConversationTurn,
        history: &History,
        exchange: &mut Vec<ChatMessage>,
    ) -> Result<String, TurnFailure> {
        let timeout = Duration::from_secs(self.config.tool_timeout_secs);
        let mut rounds = 0;

        let reply = loop {
            let request = GenerationRequest {
                messages: self.context(history, exchange),
                tools: self.agent.tools.specs(),
            };
            let response = self
                .providers
                .llm
                .generate(&request)
                .await
                .map_err(TurnFailure::Generation)?;

            if !response.wants_tools() {
                break final_text(response)?;
            }
            if rounds >= self.config.max_tool_rounds {
                tracing::warn!(
                    turn = number,
                    rounds,
                    "Tool round limit reached, asking for a reply without tools"
                );
                break self.reply_without_tools(history, exchange).await?;
            }
            rounds += 1;

            let waiting = waiting_phrase(&response);
            exchange.push(ChatMessage::assistant_tool_calls(
                waiting.clone(),
                response.tool_calls.clone(),
            ));

            // The phrase goes out before any tool result is awaited.
            self.room
                .publish(RoomOutput::Transcript(waiting.clone()))
                .await
                .map_err(TurnFailure::Room)?;
            self.emit(SessionEvent::WaitingPhraseEmitted {
                turn: number,
                text: waiting.clone(),
            });

            let speak_waiting = async {
                match self.providers.tts.synthesize(&waiting).await {
                    Ok(audio) => self
                        .room
                        .publish(RoomOutput::Audio(audio))
                        .await
                        .map_err(TurnFailure::Room),
                    Err(e) => {
                        tracing::warn!(error = %e, "Waiting phrase synthesis failed");
                        Ok(())
                    }
                }
            };
            let (spoken, records) = tokio::join!(
                speak_waiting,
                execute_calls(&self.agent.tools, &response.tool_calls, timeout),
            );
            spoken?;

            for record in records {
                self.emit(SessionEvent::ToolCallCompleted {
                    turn: number,
                    action: record.action_name.clone(),
                    success: record.succeeded(),
                    duration: record.duration,
                });
                exchange.push(ChatMessage::tool_result(
                    record.call_id.clone(),
                    record.to_model_content(),
                ));
                turn.tool_calls.push(record);
            }
        };

        let spoken = self.agent.enhance(&reply, false);
        self.speak(&spoken).await?;
        turn.reply_text = Some(spoken);
        Ok(reply)
    }

    /// Final model call with no tools advertised.
    async fn reply_without_tools(
        &self,
        history: &History,
        exchange: &[ChatMessage],
    ) -> Result<String, TurnFailure> {
        let request = GenerationRequest {
            messages: self.context(history, exchange),
            tools: Vec::new(),
        };
        let response = self
            .providers
            .llm
            .generate(&request)
            .await
            .map_err(TurnFailure::Generation)?;
        final_text(response)
    }
}

/// Input accepted by intake, waiting for transcription.
enum Captured {
    Text(String),
    Speech(AudioFrame),
}

fn final_text(response: GenerationResponse) -> Result<String, TurnFailure> {
    response
        .trimmed_text()
        .map(str::to_string)
        .ok_or_else(|| {
            TurnFailure::Generation(ProviderError::InvalidResponse(
                "model returned no reply text".to_string(),
            ))
        })
}

/// Text spoken while tool calls run: the model's own words if it gave any,
/// otherwise a default for the first recognized action.
fn waiting_phrase(response: &GenerationResponse) -> String {
    if let Some(text) = response.trimmed_text() {
        return text.to_string();
    }
    response
        .tool_calls
        .iter()
        .find_map(|call| call.name.parse::<ToolAction>().ok())
        .map(|action| action.waiting_phrase())
        .unwrap_or(FALLBACK_WAITING_PHRASE)
        .to_string()
}

// =============================================================================
// History
// =============================================================================

/// Completed exchanges, oldest first, bounded by turn count.
///
/// Each exchange is kept whole so tool results never lose the assistant
/// message that requested them.
struct History {
    exchanges: VecDeque<Vec<ChatMessage>>,
    max_turns: usize,
}

impl History {
    fn new(max_turns: usize) -> Self {
        Self {
            exchanges: VecDeque::new(),
            max_turns,
        }
    }

    fn push(&mut self, exchange: Vec<ChatMessage>) {
        self.exchanges.push_back(exchange);
        while self.exchanges.len() > self.max_turns {
            self.exchanges.pop_front();
        }
    }

    fn messages(&self) -> impl Iterator<Item = &ChatMessage> {
        self.exchanges.iter().flatten()
    }
}

// =============================================================================
// Utterance buffering
// =============================================================================

/// Collects speech frames until the first silence after speech.
#[derive(Default)]
struct Utterance {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl Utterance {
    /// Add a frame; returns the finished utterance on the closing silence.
    fn push(&mut self, frame: AudioFrame, vad: VadResult) -> Option<AudioFrame> {
        match vad {
            VadResult::Speech => {
                self.sample_rate = frame.sample_rate;
                self.samples.extend_from_slice(&frame.samples);
                None
            }
            VadResult::Silence if !self.samples.is_empty() => Some(AudioFrame::new(
                std::mem::take(&mut self.samples),
                self.sample_rate,
            )),
            VadResult::Silence | VadResult::Unknown => None,
        }
    }
}
