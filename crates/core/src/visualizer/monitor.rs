use super::Consumer;
use crate::{
    analysis::{AnalysisSession, MONITOR_FFT_SIZE},
    graph::SignalGraphRegistry,
    render::{LoopState, LoopStyle, Surface, TickOutcome},
    timeline::{FrameRequest, FrameScheduler},
    Palette, RenderConfig, Result, SignalSource, VisualizerError,
};

/// Small oscilloscope of the current signal, drawn with a plain stroke.
#[derive(Debug)]
pub struct ActivityMonitor {
    consumer: Consumer,
    config: RenderConfig,
}

impl ActivityMonitor {
    pub fn new(registry: &SignalGraphRegistry, palette: Palette) -> Self {
        Self {
            consumer: Consumer::new(registry.clone(), MONITOR_FFT_SIZE, LoopStyle::Scope),
            config: RenderConfig::default().with_palette(palette),
        }
    }

    pub fn attach(
        &mut self,
        source: SignalSource,
        surface: &dyn Surface,
        scheduler: &mut dyn FrameScheduler,
    ) -> Result<()> {
        self.consumer.attach(source, surface, scheduler)
    }

    pub fn retry(
        &mut self,
        surface: &dyn Surface,
        scheduler: &mut dyn FrameScheduler,
    ) -> Result<()> {
        self.consumer.retry(surface, scheduler)
    }

    pub fn detach(&mut self, scheduler: &mut dyn FrameScheduler) {
        self.consumer.detach(scheduler);
    }

    pub fn on_frame(
        &mut self,
        request: FrameRequest,
        surface: &mut dyn Surface,
        scheduler: &mut dyn FrameScheduler,
    ) -> TickOutcome {
        self.consumer.on_frame(request, surface, &self.config, scheduler)
    }

    pub fn set_palette(&mut self, palette: Palette) {
        self.config = self.config.with_palette(palette);
    }

    pub fn session(&self) -> Option<&AnalysisSession> {
        self.consumer.session()
    }

    pub fn loop_state(&self) -> Option<LoopState> {
        self.consumer.loop_state()
    }

    pub fn fault(&self) -> Option<&VisualizerError> {
        self.consumer.fault()
    }
}
