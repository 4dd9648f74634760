//! Shared signal-processing graph.
//!
//! A [`SignalGraphRegistry`] owns the single [`AudioContext`] of the process
//! and remembers the tap created for every media element, because an element
//! can be turned into a graph source only once. Streams are not cached: each
//! request gets a fresh tap owned by the caller.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use crate::{Result, SignalSource, SourceId, VisualizerError};

pub mod context;

pub use context::{AudioContext, AutoplayPolicy, ContextState, NodeId, Platform, UserActivation};

/// Who is responsible for releasing a tap node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapOwnership {
    /// Cached by the registry and shared by every consumer of the element.
    Registry,
    /// Created for a single session, which must release it.
    Session,
}

/// A tap handed out by [`SignalGraphRegistry::get_or_create_tap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tap {
    pub node: NodeId,
    pub ownership: TapOwnership,
}

/// Result of a best-effort resume request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeOutcome {
    /// Nothing to do, audio was already flowing.
    AlreadyRunning,
    Resumed,
    /// The request was refused; the caller should try again later.
    StillSuspended,
    /// There is no live context to resume.
    Unavailable,
}

struct RegistryState {
    platform: Platform,
    context: Option<AudioContext>,
    generation: u32,
    media_taps: HashMap<SourceId, NodeId>,
}

impl RegistryState {
    fn context(&mut self) -> Result<&mut AudioContext> {
        let stale = self
            .context
            .as_ref()
            .map(|ctx| ctx.state() == ContextState::Closed)
            .unwrap_or(true);

        if stale {
            let generation = self.generation;
            let context = AudioContext::new(&self.platform, generation)?;
            tracing::debug!(generation, state = ?context.state(), "created audio context");
            self.generation += 1;
            self.media_taps.clear();
            self.context = Some(context);
        }

        self.context
            .as_mut()
            .ok_or_else(|| VisualizerError::msg("audio context missing after creation"))
    }

    fn live_context(&mut self) -> Option<&mut AudioContext> {
        self.context
            .as_mut()
            .filter(|ctx| ctx.state() != ContextState::Closed)
    }
}

/// Process-wide owner of the audio context and the media tap cache.
///
/// Cloning yields another handle to the same registry, which is how it is
/// injected into sessions.
#[derive(Clone)]
pub struct SignalGraphRegistry {
    shared: Arc<Mutex<RegistryState>>,
}

impl SignalGraphRegistry {
    pub fn new(platform: Platform) -> Self {
        Self {
            shared: Arc::new(Mutex::new(RegistryState {
                platform,
                context: None,
                generation: 0,
                media_taps: HashMap::new(),
            })),
        }
    }

    /// Makes sure a usable context exists, constructing one on first use or
    /// after the previous one was closed, and returns its state.
    pub fn ensure_context(&self) -> Result<ContextState> {
        let mut state = self.lock()?;
        Ok(state.context()?.state())
    }

    /// Runs `f` against the live context, creating it if necessary.
    pub fn with_context<R>(&self, f: impl FnOnce(&mut AudioContext) -> R) -> Result<R> {
        let mut state = self.lock()?;
        Ok(f(state.context()?))
    }

    /// Runs `f` against the current context without ever creating one.
    pub fn with_live_context<R>(&self, f: impl FnOnce(&mut AudioContext) -> R) -> Option<R> {
        let mut state = self.lock().ok()?;
        state.live_context().map(f)
    }

    /// State of the current context, if one was created.
    pub fn context_state(&self) -> Option<ContextState> {
        let state = self.lock().ok()?;
        state.context.as_ref().map(AudioContext::state)
    }

    /// Returns a tap for `source`. Media elements get the same node on every
    /// call; streams get a fresh, session-owned node.
    pub fn get_or_create_tap(&self, source: &SignalSource) -> Result<Tap> {
        let mut state = self.lock()?;
        state.context()?;

        match source {
            SignalSource::Stream(stream) => {
                let context = state.context()?;
                let node = context.create_stream_source(stream)?;
                tracing::debug!(source = %stream.id(), %node, "created stream tap");
                Ok(Tap {
                    node,
                    ownership: TapOwnership::Session,
                })
            }
            SignalSource::Media(element) => {
                if let Some(node) = state.media_taps.get(&element.id()).copied() {
                    tracing::trace!(source = %element.id(), %node, "reusing media tap");
                    return Ok(Tap {
                        node,
                        ownership: TapOwnership::Registry,
                    });
                }

                let context = state.context()?;
                let node = context.create_media_element_source(element)?;
                let destination = context.destination();
                context.connect(node, destination)?;
                state.media_taps.insert(element.id(), node);
                tracing::debug!(source = %element.id(), %node, "created media tap");

                Ok(Tap {
                    node,
                    ownership: TapOwnership::Registry,
                })
            }
        }
    }

    /// The cached tap of a media element, if it was ever created in the
    /// current context.
    pub fn cached_tap(&self, source: SourceId) -> Option<NodeId> {
        let state = self.lock().ok()?;
        state.media_taps.get(&source).copied()
    }

    /// Best-effort resume. Failures are expected until the user interacts
    /// and are only traced.
    pub fn resume(&self) -> ResumeOutcome {
        let Ok(mut state) = self.lock() else {
            return ResumeOutcome::Unavailable;
        };
        let Some(context) = state.live_context() else {
            return ResumeOutcome::Unavailable;
        };

        if context.state() == ContextState::Running {
            return ResumeOutcome::AlreadyRunning;
        }

        match context.resume() {
            Ok(()) => {
                tracing::debug!(generation = context.generation(), "audio context resumed");
                ResumeOutcome::Resumed
            }
            Err(err) => {
                tracing::trace!(%err, "resume refused");
                ResumeOutcome::StillSuspended
            }
        }
    }

    /// Closes the context. The next access builds a replacement.
    pub fn close(&self) {
        if let Ok(mut state) = self.lock() {
            if let Some(context) = state.live_context() {
                context.close();
                tracing::debug!(generation = context.generation(), "audio context closed");
            }
            state.media_taps.clear();
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, RegistryState>> {
        self.shared
            .lock()
            .map_err(|_| VisualizerError::msg("signal graph registry has been poisoned"))
    }
}

impl std::fmt::Debug for SignalGraphRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalGraphRegistry")
            .field("context", &self.context_state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CaptureStream, MediaElement};

    #[test]
    fn media_element_tap_is_memoized() {
        let registry = SignalGraphRegistry::new(Platform::default());
        let source = SignalSource::from(MediaElement::audio(64));

        let first = registry.get_or_create_tap(&source).unwrap();
        let second = registry.get_or_create_tap(&source.clone()).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.ownership, TapOwnership::Registry);
    }

    #[test]
    fn media_tap_stays_audible() {
        let registry = SignalGraphRegistry::new(Platform::default());
        let tap = registry
            .get_or_create_tap(&MediaElement::video(64).into())
            .unwrap();

        let audible = registry
            .with_context(|ctx| ctx.is_connected(tap.node, ctx.destination()))
            .unwrap();
        assert!(audible);
    }

    #[test]
    fn stream_taps_are_fresh_and_silent_to_output() {
        let registry = SignalGraphRegistry::new(Platform::default());
        let source = SignalSource::from(CaptureStream::new(64));

        let first = registry.get_or_create_tap(&source).unwrap();
        let second = registry.get_or_create_tap(&source).unwrap();

        assert_ne!(first.node, second.node);
        assert_eq!(first.ownership, TapOwnership::Session);
        let audible = registry
            .with_context(|ctx| ctx.is_connected(first.node, ctx.destination()))
            .unwrap();
        assert!(!audible);
    }

    #[test]
    fn unsupported_platform_propagates_graph_init() {
        let registry = SignalGraphRegistry::new(Platform::unsupported());
        assert!(matches!(
            registry.ensure_context(),
            Err(VisualizerError::GraphInit)
        ));
        assert!(matches!(
            registry.get_or_create_tap(&CaptureStream::new(8).into()),
            Err(VisualizerError::GraphInit)
        ));
    }

    #[test]
    fn closed_context_is_replaced_on_next_access() {
        let registry = SignalGraphRegistry::new(Platform::default());
        let before = registry.with_context(|ctx| ctx.generation()).unwrap();

        registry.close();
        assert_eq!(registry.context_state(), Some(ContextState::Closed));

        let after = registry.with_context(|ctx| ctx.generation()).unwrap();
        assert_ne!(before, after);
        assert_eq!(registry.context_state(), Some(ContextState::Running));
    }

    #[test]
    fn element_tapped_by_another_registry_fails_to_connect() {
        let element = MediaElement::audio(64);
        let first = SignalGraphRegistry::new(Platform::default());
        let second = SignalGraphRegistry::new(Platform::default());

        first.get_or_create_tap(&element.clone().into()).unwrap();
        let err = second.get_or_create_tap(&element.into()).unwrap_err();
        assert!(matches!(err, VisualizerError::Connection(_)));
    }

    #[test]
    fn resume_without_gesture_stays_suspended() {
        let activation = UserActivation::new();
        let registry =
            SignalGraphRegistry::new(Platform::gesture_gated(48_000, activation.clone()));
        assert_eq!(registry.resume(), ResumeOutcome::Unavailable);

        registry.ensure_context().unwrap();
        assert_eq!(registry.resume(), ResumeOutcome::StillSuspended);

        activation.activate();
        assert_eq!(registry.resume(), ResumeOutcome::Resumed);
        assert_eq!(registry.resume(), ResumeOutcome::AlreadyRunning);
    }
}
