// src/session/proctor.rs

use std::{
    collections::BTreeMap,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError, Weak,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Event categories a surface can deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SignalKind {
    Blur,
    Focus,
    FullscreenChange,
    Copy,
    Paste,
    ContextMenu,
    KeyDown,
}

impl SignalKind {
    pub const ALL: [SignalKind; 7] = [
        SignalKind::Blur,
        SignalKind::Focus,
        SignalKind::FullscreenChange,
        SignalKind::Copy,
        SignalKind::Paste,
        SignalKind::ContextMenu,
        SignalKind::KeyDown,
    ];
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyStroke {
    pub key: String,
    pub ctrl: bool,
    pub meta: bool,
    pub alt: bool,
    pub shift: bool,
}

impl KeyStroke {
    pub fn plain(key: &str) -> Self {
        Self {
            key: key.to_string(),
            ..Default::default()
        }
    }

    pub fn with_ctrl(key: &str) -> Self {
        Self {
            key: key.to_string(),
            ctrl: true,
            ..Default::default()
        }
    }

    pub fn with_alt(key: &str) -> Self {
        Self {
            key: key.to_string(),
            alt: true,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent {
    Blur,
    Focus,
    FullscreenChange,
    Copy,
    Paste,
    ContextMenu,
    KeyDown(KeyStroke),
}

impl SurfaceEvent {
    pub fn kind(&self) -> SignalKind {
        match self {
            SurfaceEvent::Blur => SignalKind::Blur,
            SurfaceEvent::Focus => SignalKind::Focus,
            SurfaceEvent::FullscreenChange => SignalKind::FullscreenChange,
            SurfaceEvent::Copy => SignalKind::Copy,
            SurfaceEvent::Paste => SignalKind::Paste,
            SurfaceEvent::ContextMenu => SignalKind::ContextMenu,
            SurfaceEvent::KeyDown(_) => SignalKind::KeyDown,
        }
    }
}

/// What the surface should do with the event's default action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Allow,
    PreventDefault,
}

/// Fullscreen element presence as reported by each vendor API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FullscreenState {
    pub standard: bool,
    pub webkit: bool,
    pub moz: bool,
    pub ms: bool,
}

impl FullscreenState {
    pub fn is_fullscreen(&self) -> bool {
        self.standard || self.webkit || self.moz || self.ms
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(pub u64);

pub type Listener = Arc<dyn Fn(&SurfaceEvent) -> Disposition + Send + Sync>;

#[derive(Debug, Clone, Error)]
#[error("fullscreen request failed: {0}")]
pub struct SurfaceError(pub String);

/// The window/document a session runs in.
pub trait ProctorSurface: Send + Sync {
    fn add_listener(&self, kind: SignalKind, listener: Listener) -> ListenerId;
    fn remove_listener(&self, id: ListenerId);
    fn request_fullscreen(&self) -> Result<(), SurfaceError>;
    fn fullscreen_state(&self) -> FullscreenState;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    FocusLost,
    FullscreenExit,
    Copy,
    Paste,
    ContextMenu,
    CopyShortcut,
    ScreenshotShortcut,
    AltTab,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    #[serde(rename = "type")]
    pub kind: ViolationKind,
    pub at: DateTime<Utc>,
    pub detail: String,
}

impl Violation {
    pub fn now(kind: ViolationKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            at: Utc::now(),
            detail: detail.into(),
        }
    }
}

pub type ViolationSink = Arc<dyn Fn(Violation) + Send + Sync>;

/// Classifies a key press as a suspicious shortcut.
pub fn classify_keystroke(stroke: &KeyStroke) -> Option<ViolationKind> {
    let key = stroke.key.as_str();
    if (stroke.ctrl || stroke.meta) && key.eq_ignore_ascii_case("c") {
        return Some(ViolationKind::CopyShortcut);
    }
    if key == "PrintScreen" || (stroke.meta && stroke.shift && matches!(key, "3" | "4" | "5")) {
        return Some(ViolationKind::ScreenshotShortcut);
    }
    if stroke.alt && key == "Tab" {
        return Some(ViolationKind::AltTab);
    }
    None
}

/// Observes a surface for the lifetime of an active session.
pub struct ProctoringMonitor;

impl ProctoringMonitor {
    /// Registers one listener per signal kind and requests fullscreen.
    ///
    /// Violations are reported to `sink`; nothing here blocks answering.
    /// The returned guard removes every listener when dropped.
    pub fn attach(
        surface: Arc<dyn ProctorSurface>,
        prevent_copy_paste: bool,
        sink: ViolationSink,
    ) -> MonitorGuard {
        let weak_surface = Arc::downgrade(&surface);
        let ids = SignalKind::ALL
            .iter()
            .map(|&kind| {
                let listener = make_listener(kind, prevent_copy_paste, Arc::clone(&sink), weak_surface.clone());
                surface.add_listener(kind, listener)
            })
            .collect();

        if let Err(e) = surface.request_fullscreen() {
            tracing::debug!("Continuing without fullscreen: {}", e);
        }

        MonitorGuard { surface, ids }
    }
}

fn make_listener(
    kind: SignalKind,
    prevent_copy_paste: bool,
    sink: ViolationSink,
    surface: Weak<dyn ProctorSurface>,
) -> Listener {
    match kind {
        SignalKind::Blur => Arc::new(move |_: &SurfaceEvent| {
            sink(Violation::now(ViolationKind::FocusLost, "window lost focus"));
            Disposition::Allow
        }),
        SignalKind::Focus => Arc::new(|_: &SurfaceEvent| {
            tracing::debug!("Window regained focus");
            Disposition::Allow
        }),
        SignalKind::FullscreenChange => Arc::new(move |_: &SurfaceEvent| {
            let exited = surface
                .upgrade()
                .is_some_and(|s| !s.fullscreen_state().is_fullscreen());
            if exited {
                sink(Violation::now(ViolationKind::FullscreenExit, "left fullscreen mode"));
            }
            Disposition::Allow
        }),
        SignalKind::Copy => blocking_listener(ViolationKind::Copy, "copy attempted", prevent_copy_paste, sink),
        SignalKind::Paste => blocking_listener(ViolationKind::Paste, "paste attempted", prevent_copy_paste, sink),
        SignalKind::ContextMenu => {
            blocking_listener(ViolationKind::ContextMenu, "context menu opened", prevent_copy_paste, sink)
        }
        SignalKind::KeyDown => Arc::new(move |event: &SurfaceEvent| {
            let SurfaceEvent::KeyDown(stroke) = event else {
                return Disposition::Allow;
            };
            let Some(violation) = classify_keystroke(stroke) else {
                return Disposition::Allow;
            };
            sink(Violation::now(violation, format!("key combination {}", describe(stroke))));
            if violation == ViolationKind::CopyShortcut && prevent_copy_paste {
                Disposition::PreventDefault
            } else {
                Disposition::Allow
            }
        }),
    }
}

/// Copy, paste and context menu: always reported, blocked on request.
fn blocking_listener(
    violation: ViolationKind,
    detail: &'static str,
    prevent_copy_paste: bool,
    sink: ViolationSink,
) -> Listener {
    Arc::new(move |_: &SurfaceEvent| {
        sink(Violation::now(violation, detail));
        if prevent_copy_paste {
            Disposition::PreventDefault
        } else {
            Disposition::Allow
        }
    })
}

fn describe(stroke: &KeyStroke) -> String {
    let mut parts = Vec::new();
    if stroke.ctrl {
        parts.push("Ctrl");
    }
    if stroke.meta {
        parts.push("Meta");
    }
    if stroke.alt {
        parts.push("Alt");
    }
    if stroke.shift {
        parts.push("Shift");
    }
    parts.push(stroke.key.as_str());
    parts.join("+")
}

/// Holds the monitor's listeners; dropping it detaches them.
pub struct MonitorGuard {
    surface: Arc<dyn ProctorSurface>,
    ids: Vec<ListenerId>,
}

impl MonitorGuard {
    pub fn listener_count(&self) -> usize {
        self.ids.len()
    }
}

impl Drop for MonitorGuard {
    fn drop(&mut self) {
        for id in self.ids.drain(..) {
            self.surface.remove_listener(id);
        }
        tracing::debug!("Proctoring listeners detached");
    }
}

/// In-process surface that delivers events synchronously.
///
/// Used for headless sessions and tests.
#[derive(Default)]
pub struct SimulatedSurface {
    listeners: Mutex<BTreeMap<ListenerId, (SignalKind, Listener)>>,
    next_id: AtomicU64,
    fullscreen: Mutex<FullscreenState>,
    refuse_fullscreen: AtomicBool,
}

impl SimulatedSurface {
    pub fn new() -> Self {
        Self::default()
    }

    fn listeners(&self) -> MutexGuard<'_, BTreeMap<ListenerId, (SignalKind, Listener)>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Delivers an event to every matching listener.
    pub fn dispatch(&self, event: SurfaceEvent) -> Disposition {
        let kind = event.kind();
        let matching: Vec<Listener> = self
            .listeners()
            .values()
            .filter(|(k, _)| *k == kind)
            .map(|(_, l)| Arc::clone(l))
            .collect();

        let mut disposition = Disposition::Allow;
        for listener in matching {
            if listener(&event) == Disposition::PreventDefault {
                disposition = Disposition::PreventDefault;
            }
        }
        disposition
    }

    pub fn listener_count(&self) -> usize {
        self.listeners().len()
    }

    pub fn set_fullscreen(&self, state: FullscreenState) {
        *self.fullscreen.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    pub fn refuse_fullscreen(&self, refuse: bool) {
        self.refuse_fullscreen.store(refuse, Ordering::Release);
    }

    /// Leaves fullscreen and fires the change event.
    pub fn exit_fullscreen(&self) -> Disposition {
        self.set_fullscreen(FullscreenState::default());
        self.dispatch(SurfaceEvent::FullscreenChange)
    }
}

impl ProctorSurface for SimulatedSurface {
    fn add_listener(&self, kind: SignalKind, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::AcqRel));
        self.listeners().insert(id, (kind, listener));
        id
    }

    fn remove_listener(&self, id: ListenerId) {
        self.listeners().remove(&id);
    }

    fn request_fullscreen(&self) -> Result<(), SurfaceError> {
        if self.refuse_fullscreen.load(Ordering::Acquire) {
            return Err(SurfaceError("permission denied".to_string()));
        }
        self.set_fullscreen(FullscreenState {
            standard: true,
            ..Default::default()
        });
        Ok(())
    }

    fn fullscreen_state(&self) -> FullscreenState {
        *self.fullscreen.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording_sink() -> (ViolationSink, Arc<Mutex<Vec<Violation>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink_log = Arc::clone(&log);
        let sink: ViolationSink = Arc::new(move |v: Violation| sink_log.lock().unwrap().push(v));
        (sink, log)
    }

    fn kinds(log: &Arc<Mutex<Vec<Violation>>>) -> Vec<ViolationKind> {
        log.lock().unwrap().iter().map(|v| v.kind).collect()
    }

    #[test]
    fn test_attach_registers_each_signal_once_and_guard_detaches() {
        let surface = Arc::new(SimulatedSurface::new());
        let (sink, log) = recording_sink();
        let guard = ProctoringMonitor::attach(surface.clone(), false, sink);
        assert_eq!(guard.listener_count(), SignalKind::ALL.len());
        assert_eq!(surface.listener_count(), SignalKind::ALL.len());

        surface.dispatch(SurfaceEvent::Blur);
        assert_eq!(kinds(&log), vec![ViolationKind::FocusLost]);

        drop(guard);
        assert_eq!(surface.listener_count(), 0);
        surface.dispatch(SurfaceEvent::Blur);
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_copy_paste_prevented_only_when_configured() {
        let surface = Arc::new(SimulatedSurface::new());
        let (sink, log) = recording_sink();
        let _guard = ProctoringMonitor::attach(surface.clone(), true, sink);
        assert_eq!(surface.dispatch(SurfaceEvent::Copy), Disposition::PreventDefault);
        assert_eq!(surface.dispatch(SurfaceEvent::Paste), Disposition::PreventDefault);
        assert_eq!(surface.dispatch(SurfaceEvent::ContextMenu), Disposition::PreventDefault);

        let open = Arc::new(SimulatedSurface::new());
        let (sink, open_log) = recording_sink();
        let _open_guard = ProctoringMonitor::attach(open.clone(), false, sink);
        assert_eq!(open.dispatch(SurfaceEvent::Copy), Disposition::Allow);
        assert_eq!(kinds(&open_log), vec![ViolationKind::Copy]);

        assert_eq!(
            kinds(&log),
            vec![ViolationKind::Copy, ViolationKind::Paste, ViolationKind::ContextMenu]
        );
    }

    #[test]
    fn test_fullscreen_exit_checks_every_vendor_api() {
        let surface = Arc::new(SimulatedSurface::new());
        let (sink, log) = recording_sink();
        let _guard = ProctoringMonitor::attach(surface.clone(), false, sink);
        assert!(surface.fullscreen_state().is_fullscreen());

        // A prefixed API still reports fullscreen.
        surface.set_fullscreen(FullscreenState {
            webkit: true,
            ..Default::default()
        });
        surface.dispatch(SurfaceEvent::FullscreenChange);
        assert!(log.lock().unwrap().is_empty());

        surface.exit_fullscreen();
        assert_eq!(kinds(&log), vec![ViolationKind::FullscreenExit]);
    }

    #[test]
    fn test_refused_fullscreen_is_not_fatal() {
        let surface = Arc::new(SimulatedSurface::new());
        surface.refuse_fullscreen(true);
        let (sink, _) = recording_sink();
        let guard = ProctoringMonitor::attach(surface.clone(), false, sink);
        assert_eq!(guard.listener_count(), SignalKind::ALL.len());
        assert!(!surface.fullscreen_state().is_fullscreen());
    }

    #[test]
    fn test_suspicious_key_combinations() {
        assert_eq!(classify_keystroke(&KeyStroke::with_ctrl("c")), Some(ViolationKind::CopyShortcut));
        assert_eq!(classify_keystroke(&KeyStroke::plain("PrintScreen")), Some(ViolationKind::ScreenshotShortcut));
        assert_eq!(classify_keystroke(&KeyStroke::with_alt("Tab")), Some(ViolationKind::AltTab));
        let mac_shot = KeyStroke {
            key: "4".into(),
            meta: true,
            shift: true,
            ..Default::default()
        };
        assert_eq!(classify_keystroke(&mac_shot), Some(ViolationKind::ScreenshotShortcut));
        assert_eq!(classify_keystroke(&KeyStroke::plain("a")), None);
        assert_eq!(classify_keystroke(&KeyStroke::with_ctrl("v")), None);
    }

    #[test]
    fn test_focus_regain_is_not_a_violation() {
        let surface = Arc::new(SimulatedSurface::new());
        let (sink, log) = recording_sink();
        let _guard = ProctoringMonitor::attach(surface.clone(), false, sink);
        surface.dispatch(SurfaceEvent::Focus);
        surface.dispatch(SurfaceEvent::KeyDown(KeyStroke::plain("x")));
        assert!(log.lock().unwrap().is_empty());
    }
}
