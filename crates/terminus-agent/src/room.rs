//! Communication room contract and the job context that owns one room.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use terminus_core::AudioFrame;

use crate::error::SessionError;
use crate::state::{SessionState, SessionStateMachine};

/// Something arriving from the room's remote participant.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomInput {
    /// A block of microphone audio.
    Audio(AudioFrame),
    /// Typed text, already final.
    Text(String),
}

/// Something the agent publishes into the room.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomOutput {
    /// Text of an utterance the agent is speaking.
    Transcript(String),
    /// Synthesized speech.
    Audio(AudioFrame),
}

/// Input-side conditioning requested at session start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoomInputOptions {
    pub noise_cancellation: bool,
}

/// A real-time channel one session is bound to.
///
/// Delivery is assumed reliable and ordered. The input stream ending means
/// the room disconnected.
#[async_trait]
pub trait Room: Send + Sync {
    fn name(&self) -> &str;

    /// Join the room and return its input stream.
    async fn connect(&self) -> Result<mpsc::Receiver<RoomInput>, SessionError>;

    /// Apply input conditioning. Rooms without such support ignore it.
    async fn configure_input(&self, options: RoomInputOptions) -> Result<(), SessionError> {
        let _ = options;
        Ok(())
    }

    async fn publish(&self, output: RoomOutput) -> Result<(), SessionError>;
}

/// One worker-assigned unit of work, owning exactly one room.
///
/// Clones share the lifecycle state, so a clone cannot start a second session.
#[derive(Clone)]
pub struct JobContext {
    pub job_id: Uuid,
    room: Arc<dyn Room>,
    state: SessionStateMachine,
}

impl JobContext {
    pub fn new(room: Arc<dyn Room>) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            room,
            state: SessionStateMachine::new(),
        }
    }

    pub fn room(&self) -> &Arc<dyn Room> {
        &self.room
    }

    pub fn state(&self) -> SessionState {
        self.state.current()
    }

    pub(crate) fn state_machine(&self) -> &SessionStateMachine {
        &self.state
    }
}

impl std::fmt::Debug for JobContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobContext")
            .field("job_id", &self.job_id)
            .field("room", &self.room.name())
            .field("state", &self.state.current())
            .finish()
    }
}

// =============================================================================
// In-memory room
// =============================================================================

const MEMORY_ROOM_CAPACITY: usize = 64;

/// Room backed by channels, for tests and local runtimes.
pub struct MemoryRoom {
    name: String,
    refuse_connect: Option<String>,
    inputs: Mutex<Option<mpsc::Receiver<RoomInput>>>,
    published: Mutex<Vec<RoomOutput>>,
    options: Mutex<Option<RoomInputOptions>>,
    outputs_tx: Option<mpsc::UnboundedSender<RoomOutput>>,
}

/// Remote-participant side of a [`MemoryRoom`].
#[derive(Debug, Clone)]
pub struct RoomDriver {
    tx: mpsc::Sender<RoomInput>,
}

impl RoomDriver {
    pub async fn say(&self, text: &str) -> bool {
        self.tx.send(RoomInput::Text(text.to_string())).await.is_ok()
    }

    pub async fn send_audio(&self, frame: AudioFrame) -> bool {
        self.tx.send(RoomInput::Audio(frame)).await.is_ok()
    }

    /// Leave the room, ending its input stream.
    pub fn disconnect(self) {
        drop(self.tx);
    }
}

impl MemoryRoom {
    pub fn new(name: impl Into<String>) -> (Self, RoomDriver) {
        let (tx, rx) = mpsc::channel(MEMORY_ROOM_CAPACITY);
        let room = Self {
            name: name.into(),
            refuse_connect: None,
            inputs: Mutex::new(Some(rx)),
            published: Mutex::new(Vec::new()),
            options: Mutex::new(None),
            outputs_tx: None,
        };
        (room, RoomDriver { tx })
    }

    /// Make `connect` fail with `reason`.
    pub fn refusing(mut self, reason: impl Into<String>) -> Self {
        self.refuse_connect = Some(reason.into());
        self
    }

    /// Also forward every published output to a channel.
    pub fn with_output_channel(mut self) -> (Self, mpsc::UnboundedReceiver<RoomOutput>) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.outputs_tx = Some(tx);
        (self, rx)
    }

    /// Everything published so far, in order.
    pub fn published(&self) -> Vec<RoomOutput> {
        self.published.lock().map(|p| p.clone()).unwrap_or_default()
    }

    /// Transcripts published so far, in order.
    pub fn transcripts(&self) -> Vec<String> {
        self.published()
            .into_iter()
            .filter_map(|o| match o {
                RoomOutput::Transcript(text) => Some(text),
                RoomOutput::Audio(_) => None,
            })
            .collect()
    }

    pub fn input_options(&self) -> Option<RoomInputOptions> {
        self.options.lock().ok().and_then(|o| *o)
    }
}

#[async_trait]
impl Room for MemoryRoom {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> Result<mpsc::Receiver<RoomInput>, SessionError> {
        if let Some(reason) = &self.refuse_connect {
            return Err(SessionError::Connection {
                room: self.name.clone(),
                reason: reason.clone(),
            });
        }
        self.inputs
            .lock()
            .map_err(|e| SessionError::Room(e.to_string()))?
            .take()
            .ok_or_else(|| SessionError::Connection {
                room: self.name.clone(),
                reason: "already joined".to_string(),
            })
    }

    async fn configure_input(&self, options: RoomInputOptions) -> Result<(), SessionError> {
        if let Ok(mut slot) = self.options.lock() {
            *slot = Some(options);
        }
        Ok(())
    }

    async fn publish(&self, output: RoomOutput) -> Result<(), SessionError> {
        if let Some(tx) = &self.outputs_tx {
            let _ = tx.send(output.clone());
        }
        self.published
            .lock()
            .map_err(|e| SessionError::Room(e.to_string()))?
            .push(output);
        Ok(())
    }
}
