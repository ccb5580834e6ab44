//! Voice input controller: an explicit state machine around the platform's
//! single-utterance speech recognition. The webview hosts the actual
//! recognition session and reports open/result/error/end transitions here;
//! this module owns the phase, the dictation buffer, and the error notices.
//!
//! Exactly one recognition session may be open at a time. Starting while one
//! exists directs the platform to abort it first; a start while another start
//! is still in flight is dropped (the rapid double-tap race).

use serde::Serialize;
use tracing::{debug, warn};

/// Seconds before an error notice clears itself.
pub const NOTICE_CLEAR_SECS: u64 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VoicePhase {
    Idle,
    Starting,
    Listening,
}

/// What the platform layer should do in response to a start request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StartDirective {
    /// A start is already in flight; do nothing.
    Ignored,
    /// Open a new session, aborting the existing one first when told to.
    #[serde(rename_all = "camelCase")]
    Begin { abort_existing: bool },
}

/// Platform recognition errors, classified from the engine's error code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceError {
    PermissionDenied { secure_context: bool },
    NoSpeech,
    Aborted,
    Other(String),
}

impl VoiceError {
    pub fn from_code(code: &str, secure_context: bool) -> Self {
        match code {
            "not-allowed" => Self::PermissionDenied { secure_context },
            "no-speech" => Self::NoSpeech,
            "aborted" => Self::Aborted,
            other => Self::Other(other.to_string()),
        }
    }

    /// The user-facing notice, or `None` for errors that stay silent
    /// (no speech detected, deliberate aborts).
    pub fn notice(&self) -> Option<String> {
        match self {
            Self::PermissionDenied { secure_context } => Some(if *secure_context {
                "Microphone blocked. Please allow mic access in browser settings.".to_string()
            } else {
                "Voice requires a secure (HTTPS) connection.".to_string()
            }),
            Self::NoSpeech | Self::Aborted => None,
            Self::Other(code) => Some(format!("Could not hear you (Error: {code})")),
        }
    }
}

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct VoiceSnapshot {
    pub phase: VoicePhase,
    pub buffer: String,
    pub notice: Option<String>,
}

pub struct VoiceController {
    phase: VoicePhase,
    buffer: String,
    notice: Option<String>,
    notice_seq: u64,
}

impl Default for VoiceController {
    fn default() -> Self {
        Self::new()
    }
}

impl VoiceController {
    pub fn new() -> Self {
        Self {
            phase: VoicePhase::Idle,
            buffer: String::new(),
            notice: None,
            notice_seq: 0,
        }
    }

    pub fn phase(&self) -> VoicePhase {
        self.phase
    }

    pub fn snapshot(&self) -> VoiceSnapshot {
        VoiceSnapshot {
            phase: self.phase,
            buffer: self.buffer.clone(),
            notice: self.notice.clone(),
        }
    }

    /// Requests a new recognition session.
    pub fn start(&mut self) -> StartDirective {
        match self.phase {
            VoicePhase::Starting => {
                debug!("Voice start dropped; a start is already in flight");
                StartDirective::Ignored
            }
            VoicePhase::Listening => {
                self.phase = VoicePhase::Starting;
                StartDirective::Begin {
                    abort_existing: true,
                }
            }
            VoicePhase::Idle => {
                self.phase = VoicePhase::Starting;
                StartDirective::Begin {
                    abort_existing: false,
                }
            }
        }
    }

    /// The platform session opened successfully.
    pub fn session_opened(&mut self) {
        self.phase = VoicePhase::Listening;
        self.notice = None;
    }

    /// The platform rejected the start call itself. When the engine reports
    /// it is already running, the UI state is synced to it instead of
    /// surfacing an error.
    pub fn start_failed(&mut self, already_running: bool) -> Option<u64> {
        if already_running {
            self.phase = VoicePhase::Listening;
            return None;
        }
        self.phase = VoicePhase::Idle;
        self.set_notice("Microphone failed to start. Please refresh the page.".to_string())
    }

    /// Appends recognized text to the dictation buffer, space-joined.
    pub fn push_transcript(&mut self, text: &str) {
        if self.buffer.is_empty() {
            self.buffer = text.to_string();
        } else {
            self.buffer = format!("{} {}", self.buffer, text);
        }
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Hands the dictated text to the send path, emptying the buffer.
    pub fn take_buffer(&mut self) -> String {
        std::mem::take(&mut self.buffer)
    }

    /// The single-shot session ended on its own.
    pub fn session_ended(&mut self) {
        self.phase = VoicePhase::Idle;
    }

    /// A recognition error always lands back in `Idle`. Returns the notice
    /// sequence number when a notice was displayed, for the auto-clear timer.
    pub fn fail(&mut self, error: &VoiceError) -> Option<u64> {
        warn!(?error, "Speech recognition error");
        self.phase = VoicePhase::Idle;
        error.notice().and_then(|notice| self.set_notice(notice))
    }

    /// Stops listening. Returns whether the platform should abort a session;
    /// the phase is `Idle` afterwards regardless of whether that abort
    /// succeeds, so the UI can never get stuck in a listening state.
    pub fn stop(&mut self) -> bool {
        let abort = self.phase != VoicePhase::Idle;
        self.phase = VoicePhase::Idle;
        abort
    }

    pub fn dismiss_notice(&mut self) {
        self.notice = None;
    }

    /// Clears the notice only if `seq` still identifies it, so a stale timer
    /// never clobbers a newer notice.
    pub fn clear_notice_if(&mut self, seq: u64) -> bool {
        if self.notice_seq == seq && self.notice.is_some() {
            self.notice = None;
            true
        } else {
            false
        }
    }

    fn set_notice(&mut self, notice: String) -> Option<u64> {
        self.notice = Some(notice);
        self.notice_seq += 1;
        Some(self.notice_seq)
    }
}
