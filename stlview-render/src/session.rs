//! Render session lifecycle
//!
//! A [`RenderSession`] owns the mutable state of one logical viewing or
//! preview generation: its lifecycle state, a generation id used to discard
//! late results, and an arena of disposable resources released in reverse
//! acquisition order. Sessions are never shared; a new session for the same
//! slot must not begin before the previous one is disposed.

use std::sync::atomic::{AtomicU64, Ordering};
use stlview_core::{Error, Result};

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Lifecycle states of a render session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initialized,
    Loading,
    Populated,
    Rendering,
    Animating,
    Disposed,
}

impl SessionState {
    fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            // Disposal is legal from any state, including before init.
            (_, Disposed) => true,
            (Uninitialized, Initialized) => true,
            (Initialized, Loading) => true,
            (Loading, Populated) => true,
            (Populated, Rendering) | (Populated, Animating) => true,
            // A continuous loop alternates between these two.
            (Rendering, Animating) | (Animating, Rendering) => true,
            // Re-render of already-populated state.
            (Rendering, Populated) | (Animating, Populated) => true,
            _ => false,
        }
    }
}

/// One owned resource with its release action
struct OwnedResource {
    label: &'static str,
    release: Box<dyn FnOnce() + Send>,
}

/// Mutable state bundle for one render lifetime
pub struct RenderSession {
    generation: u64,
    state: SessionState,
    resources: Vec<OwnedResource>,
}

impl RenderSession {
    pub fn new() -> Self {
        Self {
            generation: NEXT_GENERATION.fetch_add(1, Ordering::Relaxed),
            state: SessionState::Uninitialized,
            resources: Vec::new(),
        }
    }

    /// The session's generation id. Late async results carry the
    /// generation they were started under and are discarded when it no
    /// longer matches.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether a result produced under `generation` may still be applied
    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation && self.state != SessionState::Disposed
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Advance the lifecycle. Illegal transitions are GPU-state bugs and
    /// fail rather than silently corrupting the session.
    pub fn transition(&mut self, next: SessionState) -> Result<()> {
        if next == SessionState::Disposed {
            self.dispose();
            return Ok(());
        }
        if !self.state.can_transition_to(next) {
            return Err(Error::Gpu(format!(
                "illegal session transition {:?} -> {next:?}",
                self.state
            )));
        }
        log::debug!("session {}: {:?} -> {next:?}", self.generation, self.state);
        self.state = next;
        Ok(())
    }

    /// Register a resource to be released on disposal. Resources are
    /// released in reverse acquisition order.
    pub fn own(&mut self, label: &'static str, release: impl FnOnce() + Send + 'static) {
        self.resources.push(OwnedResource {
            label,
            release: Box::new(release),
        });
    }

    /// Release everything. Idempotent and safe from any state.
    pub fn dispose(&mut self) {
        if self.state == SessionState::Disposed {
            return;
        }
        while let Some(resource) = self.resources.pop() {
            log::debug!("session {}: releasing {}", self.generation, resource.label);
            (resource.release)();
        }
        self.state = SessionState::Disposed;
    }

    pub fn is_disposed(&self) -> bool {
        self.state == SessionState::Disposed
    }
}

impl Default for RenderSession {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RenderSession {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// A per-source holder that enforces one live session at a time.
///
/// Starting a new session disposes the previous one first, so a source
/// change or unmount can never leak a render loop or GPU buffers.
#[derive(Default)]
pub struct SessionSlot {
    current: Option<RenderSession>,
}

impl SessionSlot {
    pub fn new() -> Self {
        Self { current: None }
    }

    /// Dispose any live session, then begin a fresh one
    pub fn begin(&mut self) -> &mut RenderSession {
        if let Some(previous) = &mut self.current {
            previous.dispose();
        }
        self.current = Some(RenderSession::new());
        self.current.as_mut().unwrap()
    }

    pub fn current(&mut self) -> Option<&mut RenderSession> {
        self.current.as_mut()
    }

    /// Dispose without starting a new session (unmount path)
    pub fn end(&mut self) {
        if let Some(session) = &mut self.current {
            session.dispose();
        }
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn lifecycle_walks_forward() {
        let mut session = RenderSession::new();
        assert_eq!(session.state(), SessionState::Uninitialized);
        session.transition(SessionState::Initialized).unwrap();
        session.transition(SessionState::Loading).unwrap();
        session.transition(SessionState::Populated).unwrap();
        session.transition(SessionState::Rendering).unwrap();
        session.transition(SessionState::Disposed).unwrap();
        assert!(session.is_disposed());
    }

    #[test]
    fn skipping_states_is_rejected() {
        let mut session = RenderSession::new();
        let err = session.transition(SessionState::Rendering).unwrap_err();
        assert!(matches!(err, Error::Gpu(_)));
        // The failed transition leaves the state unchanged.
        assert_eq!(session.state(), SessionState::Uninitialized);
    }

    #[test]
    fn dispose_is_idempotent_and_ordered() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut session = RenderSession::new();
        for label in ["surface", "material", "geometry", "frame-callback"] {
            let order = Arc::clone(&order);
            session.own(label, move || order.lock().unwrap().push(label));
        }
        session.dispose();
        session.dispose();
        // Reverse acquisition order.
        assert_eq!(
            *order.lock().unwrap(),
            vec!["frame-callback", "geometry", "material", "surface"]
        );
    }

    #[test]
    fn dispose_before_init_is_safe() {
        let mut session = RenderSession::new();
        session.dispose();
        assert!(session.is_disposed());
    }

    #[test]
    fn generations_are_unique_and_guard_late_results() {
        let session_a = RenderSession::new();
        let session_b = RenderSession::new();
        assert_ne!(session_a.generation(), session_b.generation());

        let mut session = RenderSession::new();
        let generation = session.generation();
        assert!(session.is_current(generation));
        session.dispose();
        // A late result from the same generation is still stale once the
        // session is gone.
        assert!(!session.is_current(generation));
    }

    #[test]
    fn slot_disposes_previous_session_before_new_one() {
        let released = Arc::new(AtomicUsize::new(0));
        let mut slot = SessionSlot::new();

        let session = slot.begin();
        let counter = Arc::clone(&released);
        session.own("geometry", move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let first_generation = session.generation();

        let session = slot.begin();
        assert_ne!(session.generation(), first_generation);
        assert_eq!(released.load(Ordering::SeqCst), 1);

        slot.end();
        assert!(slot.current().is_none());
    }

    #[test]
    fn drop_runs_disposal() {
        let released = Arc::new(AtomicUsize::new(0));
        {
            let mut session = RenderSession::new();
            let counter = Arc::clone(&released);
            session.own("buffer", move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}
