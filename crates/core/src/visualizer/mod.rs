//! Consumers that bind a signal source, an analysis session and a render
//! loop together.
//!
//! [`Visualizer`] is the configurable main view; [`ActivityMonitor`] is the
//! small oscilloscope shown next to it. Both hang off the same
//! [`SignalGraphRegistry`], so a media element is tapped once no matter how
//! many consumers watch it.

use crate::{
    analysis::{AnalyserOptions, AnalysisSession, MAIN_FFT_SIZE},
    graph::SignalGraphRegistry,
    render::{LoopState, LoopStyle, RenderLoop, Surface, TickOutcome},
    timeline::{FrameRequest, FrameScheduler},
    Palette, RenderConfig, Result, SignalSource, VisualMode, VisualizerError,
};

pub mod monitor;

pub use monitor::ActivityMonitor;

/// Session plus loop for one source. Rebuilt from scratch on every source
/// change; a stopped loop is never restarted.
#[derive(Debug)]
struct Binding {
    session: AnalysisSession,
    render: RenderLoop,
}

/// Shared plumbing of the two consumers.
#[derive(Debug)]
struct Consumer {
    registry: SignalGraphRegistry,
    fft_size: usize,
    style: LoopStyle,
    binding: Option<Binding>,
}

impl Consumer {
    fn new(registry: SignalGraphRegistry, fft_size: usize, style: LoopStyle) -> Self {
        Self {
            registry,
            fft_size,
            style,
            binding: None,
        }
    }

    fn attach(
        &mut self,
        source: SignalSource,
        surface: &dyn Surface,
        scheduler: &mut dyn FrameScheduler,
    ) -> Result<()> {
        self.detach(scheduler);

        let options = AnalyserOptions::with_fft_size(self.fft_size);
        let session = AnalysisSession::connect(&self.registry, source, options);
        let mut render = RenderLoop::new(self.style);
        let started = render.start(&session, surface, scheduler);
        self.binding = Some(Binding { session, render });
        started
    }

    fn retry(
        &mut self,
        surface: &dyn Surface,
        scheduler: &mut dyn FrameScheduler,
    ) -> Result<()> {
        let binding = self
            .binding
            .as_mut()
            .ok_or_else(|| VisualizerError::connection("no source attached"))?;
        if binding.render.state() == LoopState::Running {
            return Ok(());
        }

        binding.session.retry()?;
        binding.render.start(&binding.session, surface, scheduler)
    }

    fn detach(&mut self, scheduler: &mut dyn FrameScheduler) {
        if let Some(mut binding) = self.binding.take() {
            binding.render.stop(scheduler);
            binding.session.dispose();
        }
    }

    fn on_frame(
        &mut self,
        request: FrameRequest,
        surface: &mut dyn Surface,
        config: &RenderConfig,
        scheduler: &mut dyn FrameScheduler,
    ) -> TickOutcome {
        match self.binding.as_mut() {
            Some(binding) => {
                binding
                    .render
                    .tick(request, &mut binding.session, surface, config, scheduler)
            }
            None => TickOutcome::Ignored,
        }
    }

    fn session(&self) -> Option<&AnalysisSession> {
        self.binding.as_ref().map(|binding| &binding.session)
    }

    fn loop_state(&self) -> Option<LoopState> {
        self.binding.as_ref().map(|binding| binding.render.state())
    }

    fn fault(&self) -> Option<&VisualizerError> {
        let binding = self.binding.as_ref()?;
        binding.session.fault().or_else(|| binding.render.fault())
    }
}

/// The main visualisation: one of the four visual modes over an optional
/// video background.
#[derive(Debug)]
pub struct Visualizer {
    consumer: Consumer,
    config: RenderConfig,
}

impl Visualizer {
    pub fn new(registry: &SignalGraphRegistry, config: RenderConfig) -> Self {
        Self {
            consumer: Consumer::new(registry.clone(), MAIN_FFT_SIZE, LoopStyle::Full),
            config,
        }
    }

    /// Binds `source`, tearing down whatever was bound before, and starts
    /// drawing onto `surface`.
    ///
    /// A wiring failure leaves the visualiser attached but faulted: the error
    /// is returned and stays readable through [`fault`](Self::fault) until a
    /// successful [`retry`](Self::retry).
    pub fn attach(
        &mut self,
        source: SignalSource,
        surface: &dyn Surface,
        scheduler: &mut dyn FrameScheduler,
    ) -> Result<()> {
        self.consumer.attach(source, surface, scheduler)
    }

    /// Reconnects a faulted visualiser and starts its loop.
    pub fn retry(
        &mut self,
        surface: &dyn Surface,
        scheduler: &mut dyn FrameScheduler,
    ) -> Result<()> {
        self.consumer.retry(surface, scheduler)
    }

    /// Stops drawing and releases the analyser.
    pub fn detach(&mut self, scheduler: &mut dyn FrameScheduler) {
        self.consumer.detach(scheduler);
    }

    /// Handles one display refresh.
    pub fn on_frame(
        &mut self,
        request: FrameRequest,
        surface: &mut dyn Surface,
        scheduler: &mut dyn FrameScheduler,
    ) -> TickOutcome {
        self.consumer.on_frame(request, surface, &self.config, scheduler)
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Replaces the render settings. Takes effect on the next frame. Invalid
    /// settings are rejected and the current ones kept; a valid sensitivity
    /// is still clamped into the user range.
    pub fn set_config(&mut self, config: RenderConfig) -> Result<()> {
        config.validate()?;
        self.config = config.with_sensitivity(config.sensitivity);
        Ok(())
    }

    pub fn set_mode(&mut self, mode: VisualMode) {
        self.config = self.config.with_mode(mode);
    }

    pub fn set_palette(&mut self, palette: Palette) {
        self.config = self.config.with_palette(palette);
    }

    pub fn set_sensitivity(&mut self, sensitivity: f32) {
        self.config = self.config.with_sensitivity(sensitivity);
    }

    pub fn session(&self) -> Option<&AnalysisSession> {
        self.consumer.session()
    }

    pub fn loop_state(&self) -> Option<LoopState> {
        self.consumer.loop_state()
    }

    /// Why the current source could not be wired, or why its render loop
    /// gave up.
    pub fn fault(&self) -> Option<&VisualizerError> {
        self.consumer.fault()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        graph::{Platform, UserActivation},
        render::{
            raster::ImageSurface,
            recording::{DrawOp, RecordingSurface},
        },
        timeline::FrameQueue,
        CaptureStream, MediaElement, VideoFrame,
    };

    fn due(queue: &mut FrameQueue) -> Vec<FrameRequest> {
        let mut out = Vec::new();
        queue.drain_due(&mut out);
        out
    }

    #[test]
    fn attach_starts_a_running_loop_with_main_buffers() {
        let registry = SignalGraphRegistry::new(Platform::default());
        let mut surface = RecordingSurface::new(200.0, 100.0, 1.0);
        let mut queue = FrameQueue::new();
        let mut visualizer = Visualizer::new(&registry, RenderConfig::default());

        let element = MediaElement::audio(2048);
        visualizer
            .attach(element.into(), &surface, &mut queue)
            .unwrap();

        assert_eq!(visualizer.loop_state(), Some(LoopState::Running));
        assert_eq!(visualizer.session().unwrap().bin_count(), 256);

        let request = due(&mut queue)[0];
        let outcome = visualizer.on_frame(request, &mut surface, &mut queue);
        assert_eq!(outcome, TickOutcome::Drawn);
    }

    #[test]
    fn changing_source_rebuilds_the_session() {
        let registry = SignalGraphRegistry::new(Platform::default());
        let surface = RecordingSurface::new(200.0, 100.0, 1.0);
        let mut queue = FrameQueue::new();
        let mut visualizer = Visualizer::new(&registry, RenderConfig::default());

        let first = CaptureStream::new(1024);
        visualizer
            .attach(first.clone().into(), &surface, &mut queue)
            .unwrap();
        let old_analyser = visualizer.session().unwrap().analyser_node().unwrap();

        let second = CaptureStream::new(1024);
        visualizer
            .attach(second.clone().into(), &surface, &mut queue)
            .unwrap();

        let session = visualizer.session().unwrap();
        assert_eq!(session.source().id(), second.id());
        assert_ne!(session.analyser_node(), Some(old_analyser));
        let still_there = registry
            .with_live_context(|ctx| ctx.contains(old_analyser))
            .unwrap();
        assert!(!still_there);
        // The first loop's tick was cancelled; only the new loop is waiting.
        assert_eq!(queue.pending(), 1);
    }

    #[test]
    fn stale_tick_from_a_previous_source_is_ignored() {
        let registry = SignalGraphRegistry::new(Platform::default());
        let mut surface = RecordingSurface::new(200.0, 100.0, 1.0);
        let mut queue = FrameQueue::new();
        let mut visualizer = Visualizer::new(&registry, RenderConfig::default());

        visualizer
            .attach(CaptureStream::new(256).into(), &surface, &mut queue)
            .unwrap();
        let stale = due(&mut queue)[0];
        visualizer
            .attach(CaptureStream::new(256).into(), &surface, &mut queue)
            .unwrap();

        let outcome = visualizer.on_frame(stale, &mut surface, &mut queue);
        assert_eq!(outcome, TickOutcome::Ignored);
        assert!(surface.ops().is_empty());
    }

    #[test]
    fn palette_swap_applies_on_the_next_frame() {
        let registry = SignalGraphRegistry::new(Platform::default());
        let mut surface = RecordingSurface::new(64.0, 32.0, 1.0);
        let mut queue = FrameQueue::new();
        let mut visualizer = Visualizer::new(&registry, RenderConfig::default());
        visualizer
            .attach(CaptureStream::new(512).into(), &surface, &mut queue)
            .unwrap();
        let analyser = visualizer.session().unwrap().analyser_node();

        let request = due(&mut queue)[0];
        visualizer.on_frame(request, &mut surface, &mut queue);
        surface.clear();

        visualizer.set_palette(Palette::Sunset);
        visualizer.set_mode(VisualMode::Bars);
        let request = due(&mut queue)[0];
        visualizer.on_frame(request, &mut surface, &mut queue);

        match &surface.ops()[0] {
            DrawOp::FillRect { color, .. } => {
                assert_eq!(*color, Palette::Sunset.colors().background)
            }
            other => panic!("expected background wash, got {other:?}"),
        }
        // Hot swaps never touch the graph.
        assert_eq!(visualizer.session().unwrap().analyser_node(), analyser);
    }

    #[test]
    fn sensitivity_is_clamped_to_the_user_range() {
        let registry = SignalGraphRegistry::new(Platform::default());
        let mut visualizer = Visualizer::new(&registry, RenderConfig::default());
        visualizer.set_sensitivity(50.0);
        assert_eq!(visualizer.config().sensitivity, 5.0);
        visualizer.set_sensitivity(0.0);
        assert_eq!(visualizer.config().sensitivity, 0.1);
    }

    #[test]
    fn whole_config_swaps_are_clamped_or_rejected() {
        let registry = SignalGraphRegistry::new(Platform::default());
        let mut visualizer = Visualizer::new(&registry, RenderConfig::default());

        let loud = RenderConfig {
            sensitivity: 1e6,
            ..RenderConfig::default()
        };
        visualizer.set_config(loud).unwrap();
        assert_eq!(visualizer.config().sensitivity, 5.0);

        let broken = RenderConfig {
            sensitivity: f32::NAN,
            mode: VisualMode::Bars,
            ..RenderConfig::default()
        };
        assert!(matches!(
            visualizer.set_config(broken),
            Err(VisualizerError::InvalidInput(_))
        ));
        let empty = RenderConfig {
            particle_count: 0,
            ..RenderConfig::default()
        };
        assert!(visualizer.set_config(empty).is_err());
        assert_eq!(visualizer.config().sensitivity, 5.0);
        assert_eq!(visualizer.config().mode, RenderConfig::default().mode);
    }

    #[test]
    fn repeated_tick_failures_surface_as_a_fault() {
        let registry = SignalGraphRegistry::new(Platform::default());
        let mut surface = RecordingSurface::new(64.0, 64.0, 1.0);
        let mut queue = FrameQueue::new();
        let mut visualizer = Visualizer::new(&registry, RenderConfig::default());
        visualizer
            .attach(CaptureStream::new(1024).into(), &surface, &mut queue)
            .unwrap();
        registry.close();

        let request = due(&mut queue)[0];
        let outcome = visualizer.on_frame(request, &mut surface, &mut queue);
        assert_eq!(outcome, TickOutcome::Failed);
        assert!(visualizer.fault().is_none());

        let request = due(&mut queue)[0];
        let outcome = visualizer.on_frame(request, &mut surface, &mut queue);
        assert_eq!(outcome, TickOutcome::Failed);
        assert_eq!(visualizer.loop_state(), Some(LoopState::Stopped));
        assert!(matches!(visualizer.fault(), Some(VisualizerError::Connection(_))));
        assert!(queue.is_idle());
    }

    #[test]
    fn video_element_draws_its_frame_behind_the_mode() {
        let registry = SignalGraphRegistry::new(Platform::default());
        let mut surface = RecordingSurface::new(160.0, 90.0, 1.0);
        let mut queue = FrameQueue::new();
        let mut visualizer = Visualizer::new(&registry, RenderConfig::default());

        let element = MediaElement::video(1024);
        element
            .present_frame(VideoFrame::solid(320, 180, [10, 20, 30, 255]).unwrap())
            .unwrap();
        visualizer
            .attach(element.into(), &surface, &mut queue)
            .unwrap();

        let request = due(&mut queue)[0];
        visualizer.on_frame(request, &mut surface, &mut queue);
        assert!(matches!(surface.ops()[1], DrawOp::Frame { .. }));
    }

    #[test]
    fn video_frames_rasterize_inside_a_tick() {
        let registry = SignalGraphRegistry::new(Platform::default());
        let mut surface = ImageSurface::new(31.0, 60.0, 1.0);
        let mut queue = FrameQueue::new();
        let mut visualizer = Visualizer::new(&registry, RenderConfig::default());

        let element = MediaElement::video(1024);
        element
            .present_frame(VideoFrame::solid(5, 3, [200, 200, 200, 255]).unwrap())
            .unwrap();
        visualizer
            .attach(element.into(), &surface, &mut queue)
            .unwrap();

        let request = due(&mut queue)[0];
        let outcome = visualizer.on_frame(request, &mut surface, &mut queue);
        assert_eq!(outcome, TickOutcome::Drawn);
        // Frame darkened by the overlay; the flat trace is far from the corner.
        assert_eq!(surface.pixel(0, 0), Some([100, 100, 100, 255]));
    }

    #[test]
    fn element_tapped_by_another_registry_faults_and_can_not_start() {
        let other = SignalGraphRegistry::new(Platform::default());
        let element = MediaElement::audio(512);
        other.get_or_create_tap(&element.clone().into()).unwrap();

        let registry = SignalGraphRegistry::new(Platform::default());
        let surface = RecordingSurface::new(64.0, 32.0, 1.0);
        let mut queue = FrameQueue::new();
        let mut visualizer = Visualizer::new(&registry, RenderConfig::default());

        let err = visualizer
            .attach(element.into(), &surface, &mut queue)
            .unwrap_err();
        assert!(matches!(err, VisualizerError::Connection(_)));
        assert!(matches!(visualizer.fault(), Some(VisualizerError::Connection(_))));
        assert_eq!(visualizer.loop_state(), Some(LoopState::Idle));
        assert!(queue.is_idle());
    }

    #[test]
    fn retry_after_a_surface_becomes_available() {
        let registry = SignalGraphRegistry::new(Platform::default());
        let mut queue = FrameQueue::new();
        let mut visualizer = Visualizer::new(&registry, RenderConfig::default());

        let detached = RecordingSurface::detached();
        assert!(visualizer
            .attach(CaptureStream::new(256).into(), &detached, &mut queue)
            .is_err());
        assert_eq!(visualizer.loop_state(), Some(LoopState::Idle));
        assert!(visualizer.fault().is_none());

        let surface = RecordingSurface::new(64.0, 32.0, 1.0);
        visualizer.retry(&surface, &mut queue).unwrap();
        assert_eq!(visualizer.loop_state(), Some(LoopState::Running));
        assert_eq!(queue.pending(), 1);
    }

    #[test]
    fn unsupported_platform_is_a_fatal_fault() {
        let registry = SignalGraphRegistry::new(Platform::unsupported());
        let surface = RecordingSurface::new(64.0, 32.0, 1.0);
        let mut queue = FrameQueue::new();
        let mut visualizer = Visualizer::new(&registry, RenderConfig::default());

        assert!(visualizer
            .attach(CaptureStream::new(256).into(), &surface, &mut queue)
            .is_err());
        assert!(matches!(visualizer.fault(), Some(VisualizerError::GraphInit)));
        assert!(visualizer.retry(&surface, &mut queue).is_err());
    }

    #[test]
    fn detach_cancels_the_pending_frame_and_releases_the_analyser() {
        let activation = UserActivation::new();
        let registry = SignalGraphRegistry::new(Platform::gesture_gated(44_100, activation));
        let surface = RecordingSurface::new(64.0, 32.0, 1.0);
        let mut queue = FrameQueue::new();
        let mut visualizer = Visualizer::new(&registry, RenderConfig::default());

        visualizer
            .attach(MediaElement::audio(512).into(), &surface, &mut queue)
            .unwrap();
        let analyser = visualizer.session().unwrap().analyser_node().unwrap();

        visualizer.detach(&mut queue);
        assert!(queue.is_idle());
        assert!(visualizer.session().is_none());
        let alive = registry
            .with_live_context(|ctx| ctx.contains(analyser))
            .unwrap();
        assert!(!alive);
    }
}
