//! Local console runtime.
//!
//! Runs a single job bound to a room over the terminal: each stdin line is a
//! final user utterance, agent transcripts are printed to stdout. In voice
//! mode the default microphone feeds the room as well and synthesized replies
//! play on the default speaker; without audio devices the console falls back
//! to typed input.
//!
//! The room disconnects once every input source has closed: end of stdin in
//! text mode, Ctrl-C while the microphone is open.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use terminus_agent::{JobContext, Room, RoomInput, RoomInputOptions, RoomOutput, SessionError};
use terminus_core::AudioFrame;

use crate::audio::{self, Capture};
use crate::dispatch::{DEFAULT_SUBCOMMAND, TEXT_FLAG};
use crate::worker::{Entrypoint, WorkerError, WorkerRuntime};

const INPUT_CAPACITY: usize = 16;

type Reader = Box<dyn AsyncBufRead + Unpin + Send>;
type Writer = Box<dyn AsyncWrite + Unpin + Send>;

/// Options of the `console` subcommand.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsoleOptions {
    /// Typed conversation only; synthesized audio is discarded.
    pub text_only: bool,
}

impl ConsoleOptions {
    pub fn parse(args: &[String]) -> Result<Self, WorkerError> {
        let (subcommand, rest) = args.split_first().ok_or(WorkerError::MissingSubcommand)?;
        if subcommand != DEFAULT_SUBCOMMAND {
            return Err(WorkerError::UnknownSubcommand(subcommand.clone()));
        }

        let mut options = Self::default();
        for arg in rest {
            if arg == TEXT_FLAG {
                options.text_only = true;
            } else {
                return Err(WorkerError::UnknownArgument {
                    subcommand: subcommand.clone(),
                    argument: arg.clone(),
                });
            }
        }
        Ok(options)
    }
}

// =============================================================================
// Room
// =============================================================================

/// Room whose remote participant is the person at the terminal.
pub struct ConsoleRoom {
    name: String,
    speaker: String,
    text_only: bool,
    reader: Mutex<Option<Reader>>,
    writer: tokio::sync::Mutex<Writer>,
    playback: Option<mpsc::UnboundedSender<AudioFrame>>,
    microphone: bool,
    capture: Mutex<Option<Capture>>,
}

impl ConsoleRoom {
    pub fn new(
        speaker: impl Into<String>,
        text_only: bool,
        reader: Reader,
        writer: Writer,
    ) -> Self {
        Self {
            name: DEFAULT_SUBCOMMAND.to_string(),
            speaker: speaker.into(),
            text_only,
            reader: Mutex::new(Some(reader)),
            writer: tokio::sync::Mutex::new(writer),
            playback: None,
            microphone: false,
            capture: Mutex::new(None),
        }
    }

    /// Play published audio by sending it to `frames`.
    pub fn with_playback(mut self, frames: mpsc::UnboundedSender<AudioFrame>) -> Self {
        self.playback = Some(frames);
        self
    }

    /// Open the default microphone on connect.
    pub fn with_microphone(mut self) -> Self {
        self.microphone = true;
        self
    }

    /// Room over the process's stdin and stdout.
    pub fn stdio(speaker: impl Into<String>, text_only: bool) -> Self {
        Self::new(
            speaker,
            text_only,
            Box::new(BufReader::new(tokio::io::stdin())),
            Box::new(tokio::io::stdout()),
        )
    }

    async fn write_line(&self, line: &str) -> Result<(), SessionError> {
        let mut writer = self.writer.lock().await;
        writer
            .write_all(format!("{}\n", line).as_bytes())
            .await
            .map_err(|e| SessionError::Room(e.to_string()))?;
        writer
            .flush()
            .await
            .map_err(|e| SessionError::Room(e.to_string()))
    }
}

#[async_trait]
impl Room for ConsoleRoom {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> Result<mpsc::Receiver<RoomInput>, SessionError> {
        let mut reader = self
            .reader
            .lock()
            .map_err(|e| SessionError::Room(e.to_string()))?
            .take()
            .ok_or_else(|| SessionError::Connection {
                room: self.name.clone(),
                reason: "console input already in use".to_string(),
            })?;

        let (tx, rx) = mpsc::channel(INPUT_CAPACITY);
        let lines = tx.clone();
        tokio::spawn(async move {
            let mut line = String::new();
            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => break,
                    Ok(_) => {
                        let text = line.trim();
                        if text.is_empty() {
                            continue;
                        }
                        if lines.send(RoomInput::Text(text.to_string())).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Console input failed");
                        break;
                    }
                }
            }
            tracing::debug!("Console input closed");
        });

        if self.microphone && !self.text_only {
            match audio::start_capture(tx).await {
                Ok(capture) => {
                    tracing::info!(sample_rate = capture.sample_rate, "Listening on microphone");
                    if let Ok(mut slot) = self.capture.lock() {
                        *slot = Some(capture);
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Microphone unavailable, falling back to typed input");
                }
            }
        }
        Ok(rx)
    }

    async fn configure_input(&self, options: RoomInputOptions) -> Result<(), SessionError> {
        if options.noise_cancellation && self.microphone && !self.text_only {
            tracing::debug!("Noise cancellation is not available on the local microphone");
        }
        Ok(())
    }

    async fn publish(&self, output: RoomOutput) -> Result<(), SessionError> {
        match output {
            RoomOutput::Transcript(text) => {
                self.write_line(&format!("{}: {}", self.speaker, text)).await
            }
            RoomOutput::Audio(frame) => {
                match &self.playback {
                    Some(speaker) if !self.text_only => {
                        if speaker.send(frame).is_err() {
                            tracing::warn!("Speaker closed, synthesized audio dropped");
                        }
                    }
                    _ => {
                        tracing::debug!(secs = frame.duration_secs(), "Discarding synthesized audio");
                    }
                }
                Ok(())
            }
        }
    }
}

// =============================================================================
// Runtime
// =============================================================================

/// Runtime implementing the `console` subcommand with exactly one job.
pub struct ConsoleRuntime {
    speaker: String,
    io: Mutex<Option<(Reader, Writer)>>,
}

impl ConsoleRuntime {
    pub fn new(speaker: impl Into<String>) -> Self {
        Self {
            speaker: speaker.into(),
            io: Mutex::new(None),
        }
    }

    /// Use the given streams instead of stdin and stdout.
    #[cfg(test)]
    pub fn with_io(self, reader: Reader, writer: Writer) -> Self {
        Self {
            speaker: self.speaker,
            io: Mutex::new(Some((reader, writer))),
        }
    }

    async fn room(&self, text_only: bool) -> ConsoleRoom {
        let io = self.io.lock().ok().and_then(|mut io| io.take());
        if let Some((reader, writer)) = io {
            return ConsoleRoom::new(&self.speaker, text_only, reader, writer);
        }

        let room = ConsoleRoom::stdio(&self.speaker, text_only);
        if text_only {
            return room;
        }
        let room = match audio::start_playback().await {
            Ok(frames) => room.with_playback(frames),
            Err(e) => {
                tracing::warn!(error = %e, "Speaker unavailable, replies are printed only");
                room
            }
        };
        room.with_microphone()
    }
}

#[async_trait]
impl WorkerRuntime for ConsoleRuntime {
    fn name(&self) -> &str {
        DEFAULT_SUBCOMMAND
    }

    async fn run(&self, entrypoint: Entrypoint, args: &[String]) -> Result<(), WorkerError> {
        let options = ConsoleOptions::parse(args)?;
        let ctx = JobContext::new(Arc::new(self.room(options.text_only).await));
        let job_id = ctx.job_id;
        tracing::info!(job_id = %job_id, text_only = options.text_only, "Console job assigned");

        let result = tokio::select! {
            result = entrypoint(ctx) => result,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!(job_id = %job_id, "Interrupted, ending console job");
                Ok(())
            }
        };

        match result {
            Ok(()) => {
                tracing::info!(job_id = %job_id, "Console job finished");
                Ok(())
            }
            Err(e) => {
                if e.is_fatal() {
                    tracing::error!(job_id = %job_id, error = %e, "Console job failed");
                } else {
                    tracing::warn!(job_id = %job_id, error = %e, "Console job ended with an error");
                }
                Err(e.into())
            }
        }
    }
}
