//! Guided box breathing: a four-phase cycle on a one-second tick, with an
//! optional spoken cue at each phase transition.
//!
//! [`BreathingGuide`] is the pure state machine; [`BreathingController`]
//! owns the ticker task that drives it and emits events to the webview. The
//! ticker is aborted on stop so no interval outlives the exercise.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tauri::async_runtime::JoinHandle;
use tauri::Window;
use tracing::info;

pub const PHASE_SECONDS: u8 = 4;

const TICK_EVENT: &str = "breathing_tick";
const SPEAK_EVENT: &str = "speak_cue";

/// Rate passed to the platform utterance, slightly brisker than default.
const CUE_SPEECH_RATE: f32 = 1.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BreathPhase {
    Inhale,
    Hold,
    Exhale,
    Pause,
}

impl BreathPhase {
    pub const fn next(self) -> Self {
        match self {
            Self::Inhale => Self::Hold,
            Self::Hold => Self::Exhale,
            Self::Exhale => Self::Pause,
            Self::Pause => Self::Inhale,
        }
    }

    /// Spoken prompt for entering this phase.
    pub const fn cue(self) -> &'static str {
        match self {
            Self::Inhale => "Breathe In...",
            Self::Hold | Self::Pause => "Hold...",
            Self::Exhale => "Breathe Out...",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreathState {
    pub phase: BreathPhase,
    pub seconds_left: u8,
    pub active: bool,
    pub muted: bool,
}

#[derive(Debug)]
pub struct BreathingGuide {
    phase: BreathPhase,
    seconds_left: u8,
    active: bool,
    muted: bool,
}

impl Default for BreathingGuide {
    fn default() -> Self {
        Self::new()
    }
}

impl BreathingGuide {
    pub fn new() -> Self {
        Self {
            phase: BreathPhase::Inhale,
            seconds_left: PHASE_SECONDS,
            active: false,
            muted: false,
        }
    }

    /// Starts the cycle, returning the cue for the current phase.
    pub fn activate(&mut self) -> &'static str {
        self.active = true;
        self.phase.cue()
    }

    /// Stops the cycle and resets to the top of the next one.
    pub fn deactivate(&mut self) {
        self.active = false;
        self.phase = BreathPhase::Inhale;
        self.seconds_left = PHASE_SECONDS;
    }

    /// Advances one second. Returns the phase just entered on a transition.
    pub fn tick(&mut self) -> Option<BreathPhase> {
        if !self.active {
            return None;
        }
        if self.seconds_left <= 1 {
            self.phase = self.phase.next();
            self.seconds_left = PHASE_SECONDS;
            Some(self.phase)
        } else {
            self.seconds_left -= 1;
            None
        }
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn snapshot(&self) -> BreathState {
        BreathState {
            phase: self.phase,
            seconds_left: self.seconds_left,
            active: self.active,
            muted: self.muted,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct SpeakCue {
    text: &'static str,
    rate: f32,
}

pub struct BreathingController {
    guide: Arc<Mutex<BreathingGuide>>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl Default for BreathingController {
    fn default() -> Self {
        Self::new()
    }
}

impl BreathingController {
    pub fn new() -> Self {
        Self {
            guide: Arc::new(Mutex::new(BreathingGuide::new())),
            ticker: Mutex::new(None),
        }
    }

    pub fn snapshot(&self) -> BreathState {
        self.guide.lock().unwrap().snapshot()
    }

    /// Activates the guide and spawns the one-second ticker. A prior ticker
    /// is aborted first so restarts never double-drive the cycle.
    pub fn start(&self, window: Window) {
        let (state, cue, muted) = {
            let mut guide = self.guide.lock().unwrap();
            let cue = guide.activate();
            (guide.snapshot(), cue, guide.is_muted())
        };
        info!("Breathing exercise started");
        emit_tick(&window, &state);
        if !muted {
            emit_cue(&window, cue);
        }

        let mut ticker = self.ticker.lock().unwrap();
        if let Some(handle) = ticker.take() {
            handle.abort();
        }

        let guide = Arc::clone(&self.guide);
        *ticker = Some(tauri::async_runtime::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            // The first interval tick completes immediately; skip it so the
            // opening phase holds its full four seconds.
            interval.tick().await;
            loop {
                interval.tick().await;
                let (state, transition) = {
                    let mut guide = guide.lock().unwrap();
                    if !guide.is_active() {
                        break;
                    }
                    let transition = guide.tick();
                    (guide.snapshot(), transition)
                };
                emit_tick(&window, &state);
                if let Some(phase) = transition {
                    if !state.muted {
                        emit_cue(&window, phase.cue());
                    }
                }
            }
        }));
    }

    /// Deactivates the guide and tears the ticker down.
    pub fn stop(&self, window: &Window) {
        {
            let mut guide = self.guide.lock().unwrap();
            guide.deactivate();
        }
        if let Some(handle) = self.ticker.lock().unwrap().take() {
            handle.abort();
        }
        info!("Breathing exercise stopped");
        emit_tick(window, &self.snapshot());
    }

    pub fn set_muted(&self, muted: bool) {
        self.guide.lock().unwrap().set_muted(muted);
    }
}

fn emit_tick(window: &Window, state: &BreathState) {
    window.emit(TICK_EVENT, state.clone()).ok();
}

fn emit_cue(window: &Window, text: &'static str) {
    window
        .emit(
            SPEAK_EVENT,
            SpeakCue {
                text,
                rate: CUE_SPEECH_RATE,
            },
        )
        .ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_cycle_in_box_order() {
        let mut phase = BreathPhase::Inhale;
        let seen: Vec<BreathPhase> = (0..4)
            .map(|_| {
                phase = phase.next();
                phase
            })
            .collect();
        assert_eq!(
            seen,
            vec![
                BreathPhase::Hold,
                BreathPhase::Exhale,
                BreathPhase::Pause,
                BreathPhase::Inhale
            ]
        );
    }

    #[test]
    fn each_phase_holds_four_seconds() {
        let mut guide = BreathingGuide::new();
        guide.activate();

        assert_eq!(guide.tick(), None); // 4 -> 3
        assert_eq!(guide.tick(), None); // 3 -> 2
        assert_eq!(guide.tick(), None); // 2 -> 1
        assert_eq!(guide.tick(), Some(BreathPhase::Hold));
        assert_eq!(guide.snapshot().seconds_left, PHASE_SECONDS);
    }

    #[test]
    fn cycle_loops_indefinitely_while_active() {
        let mut guide = BreathingGuide::new();
        guide.activate();

        let transitions: Vec<BreathPhase> =
            (0..16).filter_map(|_| guide.tick()).collect();
        assert_eq!(
            transitions,
            vec![
                BreathPhase::Hold,
                BreathPhase::Exhale,
                BreathPhase::Pause,
                BreathPhase::Inhale
            ]
        );
    }

    #[test]
    fn inactive_guide_does_not_advance() {
        let mut guide = BreathingGuide::new();
        assert_eq!(guide.tick(), None);
        assert_eq!(guide.snapshot().seconds_left, PHASE_SECONDS);
    }

    #[test]
    fn deactivate_resets_to_the_top_of_the_cycle() {
        let mut guide = BreathingGuide::new();
        guide.activate();
        for _ in 0..5 {
            guide.tick();
        }

        guide.deactivate();
        let state = guide.snapshot();
        assert!(!state.active);
        assert_eq!(state.phase, BreathPhase::Inhale);
        assert_eq!(state.seconds_left, PHASE_SECONDS);
    }

    #[test]
    fn hold_phases_share_the_spoken_cue() {
        assert_eq!(BreathPhase::Hold.cue(), "Hold...");
        assert_eq!(BreathPhase::Pause.cue(), "Hold...");
        assert_eq!(BreathPhase::Inhale.cue(), "Breathe In...");
        assert_eq!(BreathPhase::Exhale.cue(), "Breathe Out...");
    }

    #[test]
    fn mute_is_mutable_mid_cycle() {
        let mut guide = BreathingGuide::new();
        guide.activate();
        guide.set_muted(true);
        assert!(guide.snapshot().muted);
        guide.set_muted(false);
        assert!(!guide.snapshot().muted);
    }
}
