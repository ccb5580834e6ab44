#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod breathing;
mod chat;
mod config;
mod content;
mod error;
mod gemini;
mod mood;
mod outbox;
mod store;
mod voice;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::StreamExt;
use serde::Serialize;
use tauri::{AppHandle, ClipboardManager, Manager, State, Window};
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::breathing::{BreathState, BreathingController};
use crate::chat::{ChatMessage, ChatSession, ChatSnapshot};
use crate::config::AppConfig;
use crate::content::{CrisisResource, ExerciseInfo};
use crate::error::AppError;
use crate::gemini::{classify_failure, ChatTransport, GeminiClient, LocationCoordinates};
use crate::mood::{today_label, MoodLog, MoodSnapshot};
use crate::outbox::PromptOutbox;
use crate::store::{JsonFileStore, ProfileStore};
use crate::voice::{
    StartDirective, VoiceController, VoiceError, VoiceSnapshot, NOTICE_CLEAR_SECS,
};

// --- Window events consumed by the webview ---

const CHAT_DELTA_EVENT: &str = "chat_delta";
const CHAT_MESSAGE_EVENT: &str = "chat_message";
const CHAT_AUTH_EVENT: &str = "chat_auth_required";
const CHAT_IDLE_EVENT: &str = "chat_idle";
const CLINICS_DELTA_EVENT: &str = "clinics_delta";
const VOICE_STATE_EVENT: &str = "voice_state";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatDelta {
    id: String,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClinicsDelta {
    content: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceStopOutcome {
    abort_session: bool,
    snapshot: VoiceSnapshot,
}

// --- Application State ---

struct AppState {
    config: Mutex<AppConfig>,
    chat: Mutex<ChatSession>,
    mood: Mutex<MoodLog>,
    voice: Mutex<VoiceController>,
    breathing: BreathingController,
    outbox: Mutex<PromptOutbox>,
    store: Arc<dyn ProfileStore>,
}

impl AppState {
    fn user_name(&self) -> String {
        stored_user_name(self.store.as_ref())
            .unwrap_or_else(|| content::DEFAULT_USER_NAME.to_string())
    }

    // Persistence failures degrade to an unsaved conversation, never an error.
    fn persist_transcript(&self, messages: &[ChatMessage]) {
        if let Err(e) = store::save_transcript(self.store.as_ref(), messages) {
            warn!(error = %e, "Failed to persist transcript");
        }
    }
}

fn stored_user_name(store: &dyn ProfileStore) -> Option<String> {
    store
        .get(store::USER_NAME_KEY)
        .filter(|name| !name.trim().is_empty())
}

// --- Profile & key-selection commands ---

#[tauri::command]
fn get_user_name(state: State<'_, AppState>) -> Option<String> {
    stored_user_name(state.store.as_ref())
}

/// Stores the display name from the landing screen and reports whether an
/// API key is already selected, so the frontend can route to key selection.
#[tauri::command]
fn begin_session(name: String, state: State<'_, AppState>) -> Result<bool, String> {
    let trimmed = name.trim();
    let name = if trimmed.is_empty() {
        content::DEFAULT_USER_NAME
    } else {
        trimmed
    };
    state
        .store
        .set(store::USER_NAME_KEY, name)
        .map_err(|e| e.to_string())?;
    state.chat.lock().unwrap().refresh_greeting(name);
    info!("Session started");
    Ok(state.config.lock().unwrap().has_api_key())
}

#[tauri::command]
fn has_api_key(state: State<'_, AppState>) -> bool {
    state.config.lock().unwrap().has_api_key()
}

/// Opens the settings file so the user can paste a key. Also acknowledges a
/// pending auth-required state.
#[tauri::command]
fn open_key_settings(state: State<'_, AppState>) -> Result<(), String> {
    state.chat.lock().unwrap().acknowledge_auth();
    let path = config::app_config_path();
    opener::open(&path).map_err(|e| format!("Failed to open settings file: {}", e))
}

/// Re-reads the settings file after the user has edited it.
#[tauri::command]
fn reload_config(state: State<'_, AppState>) -> Result<bool, String> {
    let config = config::load_or_initialize(&config::app_config_path());
    let has_key = config.has_api_key();
    *state.config.lock().unwrap() = config;
    Ok(has_key)
}

// --- Chat commands ---

#[tauri::command]
fn chat_snapshot(state: State<'_, AppState>) -> ChatSnapshot {
    state.chat.lock().unwrap().snapshot()
}

/// Streams one assistant response. Blank text or a send already in flight is
/// dropped silently; the transcript is persisted when the stream completes
/// (or fails). Deltas arrive as `chat_delta` window events.
#[tauri::command]
async fn send_message(
    text: String,
    location: Option<LocationCoordinates>,
    window: Window,
    state: State<'_, AppState>,
) -> Result<(), String> {
    let outbound = {
        let mut chat = state.chat.lock().unwrap();
        match chat.begin_send(&text) {
            Some(outbound) => {
                state.persist_transcript(chat.messages());
                outbound
            }
            None => return Ok(()),
        }
    };

    let client = {
        let config = state.config.lock().unwrap();
        GeminiClient::from_config(&config.gemini)
    };
    let opened = match client {
        Ok(client) => {
            client
                .send_message_stream(&outbound.text, outbound.history, location)
                .await
        }
        Err(e) => Err(e),
    };

    let mut stream = match opened {
        Ok(stream) => stream,
        Err(e) => {
            finish_failed_send(&state, &window, &e);
            return Ok(());
        }
    };

    while let Some(item) = stream.next().await {
        match item {
            Ok(increment) => {
                let content = state.chat.lock().unwrap().apply_increment(&increment);
                window
                    .emit(
                        CHAT_DELTA_EVENT,
                        ChatDelta {
                            id: outbound.placeholder_id.clone(),
                            content,
                        },
                    )
                    .ok();
            }
            Err(e) => {
                finish_failed_send(&state, &window, &e);
                return Ok(());
            }
        }
    }

    {
        let mut chat = state.chat.lock().unwrap();
        chat.finish_send();
        state.persist_transcript(chat.messages());
    }
    window.emit(CHAT_IDLE_EVENT, ()).ok();
    Ok(())
}

/// Auth failures surface the key-selection affordance; everything else lands
/// in the transcript as the apology turn. Either way the input is re-enabled.
fn finish_failed_send(state: &AppState, window: &Window, error: &AppError) {
    let kind = classify_failure(error);
    error!(error = %error, ?kind, "Chat send failed");

    let appended = {
        let mut chat = state.chat.lock().unwrap();
        let appended = chat.fail_send(kind);
        state.persist_transcript(chat.messages());
        appended
    };
    match appended {
        Some(message) => {
            window.emit(CHAT_MESSAGE_EVENT, message).ok();
        }
        None => {
            window.emit(CHAT_AUTH_EVENT, ()).ok();
        }
    }
    window.emit(CHAT_IDLE_EVENT, ()).ok();
}

/// Resets the conversation to a single greeting and discards the persisted
/// transcript.
#[tauri::command]
fn clear_chat(state: State<'_, AppState>) -> Result<ChatSnapshot, String> {
    let user_name = state.user_name();
    let mut chat = state.chat.lock().unwrap();
    chat.clear(&user_name);
    store::clear_transcript(state.store.as_ref()).map_err(|e| e.to_string())?;
    info!("Chat history cleared");
    Ok(chat.snapshot())
}

// --- Pending-prompt outbox commands ---

#[tauri::command]
fn queue_prompt(prompt: String, state: State<'_, AppState>) {
    state.outbox.lock().unwrap().set(prompt);
}

#[tauri::command]
fn take_pending_prompt(state: State<'_, AppState>) -> Option<String> {
    state.outbox.lock().unwrap().take()
}

// --- Mood commands ---

#[tauri::command]
fn mood_snapshot(state: State<'_, AppState>) -> MoodSnapshot {
    state.mood.lock().unwrap().snapshot()
}

#[tauri::command]
fn log_mood(
    score: u8,
    note: Option<String>,
    state: State<'_, AppState>,
) -> Result<MoodSnapshot, String> {
    if !(1..=5).contains(&score) {
        return Err(format!("mood score must be between 1 and 5, got {score}"));
    }
    let mut mood = state.mood.lock().unwrap();
    mood.log(
        score,
        note.filter(|n| !n.trim().is_empty()),
        &today_label(),
    );
    store::save_mood_series(state.store.as_ref(), mood.entries()).map_err(|e| e.to_string())?;
    Ok(mood.snapshot())
}

/// Queues the mood-summary sentence for the chat view.
#[tauri::command]
fn discuss_mood(
    score: u8,
    note: Option<String>,
    state: State<'_, AppState>,
) -> Result<(), String> {
    if !(1..=5).contains(&score) {
        return Err(format!("mood score must be between 1 and 5, got {score}"));
    }
    let sentence = mood::summary_sentence(score, note.as_deref());
    state.outbox.lock().unwrap().set(sentence);
    Ok(())
}

// --- Exercise commands ---

#[tauri::command]
fn list_exercises() -> Vec<ExerciseInfo> {
    content::EXERCISES.to_vec()
}

#[tauri::command]
async fn start_breathing(
    window: Window,
    state: State<'_, AppState>,
) -> Result<BreathState, String> {
    state.breathing.start(window);
    Ok(state.breathing.snapshot())
}

#[tauri::command]
async fn stop_breathing(
    window: Window,
    state: State<'_, AppState>,
) -> Result<BreathState, String> {
    state.breathing.stop(&window);
    Ok(state.breathing.snapshot())
}

#[tauri::command]
fn set_breathing_muted(muted: bool, state: State<'_, AppState>) -> BreathState {
    state.breathing.set_muted(muted);
    state.breathing.snapshot()
}

#[tauri::command]
fn breathing_state(state: State<'_, AppState>) -> BreathState {
    state.breathing.snapshot()
}

// --- Voice commands ---
//
// The webview hosts the actual recognition session (single-shot, in the
// configured locale) and reports its lifecycle here; the controller decides
// what the platform layer should do next.

#[tauri::command]
fn voice_start(state: State<'_, AppState>) -> StartDirective {
    state.voice.lock().unwrap().start()
}

#[tauri::command]
fn voice_locale(state: State<'_, AppState>) -> String {
    state.config.lock().unwrap().voice_locale.clone()
}

#[tauri::command]
fn voice_opened(state: State<'_, AppState>) -> VoiceSnapshot {
    let mut voice = state.voice.lock().unwrap();
    voice.session_opened();
    voice.snapshot()
}

#[tauri::command]
fn voice_start_failed(
    already_running: bool,
    app: AppHandle,
    window: Window,
    state: State<'_, AppState>,
) -> VoiceSnapshot {
    let mut voice = state.voice.lock().unwrap();
    if let Some(seq) = voice.start_failed(already_running) {
        schedule_notice_clear(app, window, seq);
    }
    voice.snapshot()
}

#[tauri::command]
fn voice_result(transcript: String, state: State<'_, AppState>) -> VoiceSnapshot {
    let mut voice = state.voice.lock().unwrap();
    voice.push_transcript(&transcript);
    voice.snapshot()
}

#[tauri::command]
fn voice_ended(state: State<'_, AppState>) -> VoiceSnapshot {
    let mut voice = state.voice.lock().unwrap();
    voice.session_ended();
    voice.snapshot()
}

#[tauri::command]
fn voice_error(
    code: String,
    secure_context: bool,
    app: AppHandle,
    window: Window,
    state: State<'_, AppState>,
) -> VoiceSnapshot {
    let error = VoiceError::from_code(&code, secure_context);
    let mut voice = state.voice.lock().unwrap();
    if let Some(seq) = voice.fail(&error) {
        schedule_notice_clear(app, window, seq);
    }
    voice.snapshot()
}

/// Stops listening. The controller is idle afterwards no matter what the
/// platform abort does with the returned directive.
#[tauri::command]
fn voice_stop(state: State<'_, AppState>) -> VoiceStopOutcome {
    let mut voice = state.voice.lock().unwrap();
    VoiceStopOutcome {
        abort_session: voice.stop(),
        snapshot: voice.snapshot(),
    }
}

#[tauri::command]
fn voice_take_buffer(state: State<'_, AppState>) -> String {
    state.voice.lock().unwrap().take_buffer()
}

#[tauri::command]
fn voice_state(state: State<'_, AppState>) -> VoiceSnapshot {
    state.voice.lock().unwrap().snapshot()
}

#[tauri::command]
fn dismiss_voice_notice(state: State<'_, AppState>) -> VoiceSnapshot {
    let mut voice = state.voice.lock().unwrap();
    voice.dismiss_notice();
    voice.snapshot()
}

/// Error notices dismiss themselves after a fixed delay unless a newer
/// notice has replaced them in the meantime.
fn schedule_notice_clear(app: AppHandle, window: Window, seq: u64) {
    tauri::async_runtime::spawn(async move {
        tokio::time::sleep(Duration::from_secs(NOTICE_CLEAR_SECS)).await;
        let state: State<'_, AppState> = app.state();
        let snapshot = {
            let mut voice = state.voice.lock().unwrap();
            voice.clear_notice_if(seq).then(|| voice.snapshot())
        };
        if let Some(snapshot) = snapshot {
            window.emit(VOICE_STATE_EVENT, snapshot).ok();
        }
    });
}

// --- Clinic finder & resources ---

/// One-shot "find nearby providers" search, streamed into a read-only panel
/// via `clinics_delta` events. Requires coordinates; geolocation denial is a
/// blocking state the frontend owns.
#[tauri::command]
async fn find_nearby_clinics(
    location: LocationCoordinates,
    window: Window,
    state: State<'_, AppState>,
) -> Result<String, String> {
    let client = {
        let config = state.config.lock().unwrap();
        GeminiClient::from_config(&config.gemini)
    };
    let opened = match client {
        Ok(client) => {
            client
                .send_message_stream(content::CLINIC_SEARCH_PROMPT, Vec::new(), Some(location))
                .await
        }
        Err(e) => Err(e),
    };

    let mut stream = opened.map_err(|e| clinics_error(&e))?;
    let mut full_text = String::new();
    while let Some(item) = stream.next().await {
        let increment = item.map_err(|e| clinics_error(&e))?;
        full_text.push_str(&increment);
        window
            .emit(
                CLINICS_DELTA_EVENT,
                ClinicsDelta {
                    content: full_text.clone(),
                },
            )
            .ok();
    }
    Ok(full_text)
}

fn clinics_error(error: &AppError) -> String {
    error!(error = %error, "Clinic search failed");
    "I couldn't find local results right now. Please check your internet or location settings."
        .to_string()
}

#[tauri::command]
fn crisis_resources() -> Vec<CrisisResource> {
    content::CRISIS_RESOURCES.to_vec()
}

#[tauri::command]
fn open_resource(url: String) -> Result<(), String> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(format!("refusing to open non-http link: {url}"));
    }
    opener::open(&url).map_err(|e| format!("Failed to open link: {}", e))
}

/// Desktop stand-in for the share sheet: copy the blurb to the clipboard.
/// Best-effort; failures report "not shared" rather than an error.
#[tauri::command]
fn share_app(app: AppHandle) -> bool {
    let text = format!("{}\n{}", content::SHARE_TEXT, content::SHARE_URL);
    app.clipboard_manager().write_text(text).is_ok()
}

// --- Bootstrap ---

fn init_logging() -> tracing_appender::non_blocking::WorkerGuard {
    let file_appender = tracing_appender::rolling::daily(
        config::app_data_dir().join("logs"),
        "minda.log",
    );
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .compact(),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(file_writer),
        )
        .try_init()
        .ok();

    guard
}

fn main() {
    let _log_guard = init_logging();

    let config = config::load_or_initialize(&config::app_config_path());
    let store: Arc<dyn ProfileStore> = Arc::new(JsonFileStore::new(config::app_data_dir()));

    let user_name = stored_user_name(store.as_ref())
        .unwrap_or_else(|| content::DEFAULT_USER_NAME.to_string());
    let chat = ChatSession::restore(store::load_transcript(store.as_ref()), &user_name);
    let mood = MoodLog::restore(store::load_mood_series(store.as_ref()));
    info!(model = %config.gemini.model, "Starting MINDA");

    tauri::Builder::default()
        .manage(AppState {
            config: Mutex::new(config),
            chat: Mutex::new(chat),
            mood: Mutex::new(mood),
            voice: Mutex::new(VoiceController::new()),
            breathing: BreathingController::new(),
            outbox: Mutex::new(PromptOutbox::new()),
            store,
        })
        .invoke_handler(tauri::generate_handler![
            // Profile & key selection
            get_user_name,
            begin_session,
            has_api_key,
            open_key_settings,
            reload_config,
            // Chat
            chat_snapshot,
            send_message,
            clear_chat,
            queue_prompt,
            take_pending_prompt,
            // Mood
            mood_snapshot,
            log_mood,
            discuss_mood,
            // Exercises
            list_exercises,
            start_breathing,
            stop_breathing,
            set_breathing_muted,
            breathing_state,
            // Voice
            voice_start,
            voice_locale,
            voice_opened,
            voice_start_failed,
            voice_result,
            voice_ended,
            voice_error,
            voice_stop,
            voice_take_buffer,
            voice_state,
            dismiss_voice_notice,
            // Clinics & resources
            find_nearby_clinics,
            crisis_resources,
            open_resource,
            share_app
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
