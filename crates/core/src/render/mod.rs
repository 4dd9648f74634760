//! Per-frame drawing.
//!
//! A [`RenderLoop`] owns no audio resources: each tick it borrows the
//! [`AnalysisSession`] that fills the sample buffers and the [`Surface`] it
//! paints, and it hands a fresh [`FrameRequest`] back to the scheduler so the
//! next refresh calls it again.

use crate::{
    analysis::AnalysisSession,
    timeline::{FrameRequest, FrameScheduler},
    RenderConfig, Result, VideoFrame, VisualMode, VisualizerError,
};

pub mod modes;
pub mod palette;
pub mod raster;
pub mod video;

#[cfg(test)]
pub(crate) mod recording;

pub use palette::{Palette, PaletteColors, Rgba};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientStop {
    pub offset: f32,
    pub color: Rgba,
}

/// How a stroke is colored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Paint {
    Solid(Rgba),
    /// Three-stop gradient along the x axis between `from_x` and `to_x`.
    HorizontalGradient {
        from_x: f32,
        to_x: f32,
        stops: [GradientStop; 3],
    },
}

impl Paint {
    /// Color of the paint at horizontal position `x`.
    pub fn color_at(&self, x: f32) -> Rgba {
        match *self {
            Paint::Solid(color) => color,
            Paint::HorizontalGradient {
                from_x,
                to_x,
                stops,
            } => {
                let span = to_x - from_x;
                let t = if span.abs() <= f32::EPSILON {
                    0.0
                } else {
                    ((x - from_x) / span).clamp(0.0, 1.0)
                };

                let upper = stops
                    .iter()
                    .position(|stop| stop.offset >= t)
                    .unwrap_or(stops.len() - 1);
                if upper == 0 {
                    return stops[0].color;
                }
                let (a, b) = (stops[upper - 1], stops[upper]);
                let local = if b.offset > a.offset {
                    (t - a.offset) / (b.offset - a.offset)
                } else {
                    1.0
                };
                mix(a.color, b.color, local)
            }
        }
    }
}

fn mix(a: Rgba, b: Rgba, t: f32) -> Rgba {
    let lerp = |x: u8, y: u8| (f32::from(x) + (f32::from(y) - f32::from(x)) * t).round() as u8;
    Rgba::new(lerp(a.r, b.r), lerp(a.g, b.g), lerp(a.b, b.b), a.a + (b.a - a.a) * t)
}

/// Soft halo drawn around a stroke.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Glow {
    pub color: Rgba,
    pub blur: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrokeStyle {
    pub paint: Paint,
    pub width: f32,
    pub glow: Option<Glow>,
}

/// Drawing primitives the visual modes are written against. Coordinates are
/// device pixels with the origin at the top left.
pub trait Canvas {
    /// Current size in device pixels.
    fn size(&self) -> (u32, u32);
    fn fill_rect(&mut self, rect: Rect, color: Rgba);
    fn stroke_path(&mut self, points: &[Point], closed: bool, style: &StrokeStyle);
    fn fill_circle(&mut self, center: Point, radius: f32, color: Rgba);
    /// Draws the `source` region of `frame` scaled into `target`.
    fn draw_frame(&mut self, frame: &VideoFrame, source: Rect, target: Rect);
}

/// A canvas placed in a host layout.
pub trait Surface: Canvas {
    /// Size of the layout box, in layout units.
    fn display_box(&self) -> (f32, f32);
    /// Device pixels per layout unit.
    fn pixel_ratio(&self) -> f32;
    /// Sets the backing store size in device pixels.
    fn resize(&mut self, width: u32, height: u32);
    /// Whether the surface can be drawn to at all.
    fn is_attached(&self) -> bool {
        true
    }
}

/// Lifecycle of a [`RenderLoop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    Stopped,
}

/// What the loop draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStyle {
    /// Configurable visual mode with video background.
    Full,
    /// Plain oscilloscope trace for the activity monitor.
    Scope,
}

/// What happened during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The request was stale or the loop is not running. Nothing was done.
    Ignored,
    /// The surface has no area yet; nothing was drawn.
    Skipped,
    Drawn,
    /// The tick failed and was logged.
    Failed,
}

const VIDEO_OVERLAY: Rgba = Rgba::new(0, 0, 0, 0.5);

/// Consecutive failed ticks after which the loop stops for good.
const MAX_TICK_FAILURES: u32 = 2;

/// Display-refresh driven pipeline from analyser snapshots to pixels.
#[derive(Debug)]
pub struct RenderLoop {
    style: LoopStyle,
    state: LoopState,
    pending: Option<FrameRequest>,
    points: Vec<Point>,
    frames_drawn: u64,
    failures: u32,
    fault: Option<VisualizerError>,
}

impl RenderLoop {
    pub fn new(style: LoopStyle) -> Self {
        Self {
            style,
            state: LoopState::Idle,
            pending: None,
            points: Vec::new(),
            frames_drawn: 0,
            failures: 0,
            fault: None,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn style(&self) -> LoopStyle {
        self.style
    }

    pub fn pending(&self) -> Option<FrameRequest> {
        self.pending
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    /// The error that stopped the loop, if repeated tick failures did.
    pub fn fault(&self) -> Option<&VisualizerError> {
        self.fault.as_ref()
    }

    /// Moves from idle to running and schedules the first tick. Needs a
    /// connected session and an attached surface.
    pub fn start(
        &mut self,
        session: &AnalysisSession,
        surface: &dyn Surface,
        scheduler: &mut dyn FrameScheduler,
    ) -> Result<()> {
        match self.state {
            LoopState::Running => return Ok(()),
            LoopState::Stopped => {
                return Err(VisualizerError::connection("render loop was already stopped"))
            }
            LoopState::Idle => {}
        }

        if !session.is_connected() {
            return Err(VisualizerError::connection(
                session
                    .fault()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "analysis session is not connected".to_string()),
            ));
        }
        if !surface.is_attached() {
            return Err(VisualizerError::connection("no drawable surface available"));
        }

        self.points.reserve(session.bin_count());
        self.state = LoopState::Running;
        self.pending = Some(scheduler.request_frame());
        Ok(())
    }

    /// Cancels the pending tick. After this no tick does any work.
    pub fn stop(&mut self, scheduler: &mut dyn FrameScheduler) {
        if let Some(request) = self.pending.take() {
            scheduler.cancel_frame(request);
        }
        if self.state != LoopState::Stopped {
            tracing::debug!(frames = self.frames_drawn, "render loop stopped");
        }
        self.state = LoopState::Stopped;
    }

    /// Handles one display refresh. Requests that are not this loop's
    /// pending request are ignored, so a tick racing with [`stop`] is
    /// harmless.
    ///
    /// A failed tick is logged and retried on the next refresh. A second
    /// failure in a row stops the loop and keeps the error as its fault.
    /// Refused resumes never count, they are retried every tick.
    ///
    /// [`stop`]: RenderLoop::stop
    pub fn tick(
        &mut self,
        request: FrameRequest,
        session: &mut AnalysisSession,
        surface: &mut dyn Surface,
        config: &RenderConfig,
        scheduler: &mut dyn FrameScheduler,
    ) -> TickOutcome {
        if self.state != LoopState::Running || self.pending != Some(request) {
            return TickOutcome::Ignored;
        }
        self.pending = None;

        match self.render(session, surface, config) {
            Ok(outcome) => {
                self.failures = 0;
                self.pending = Some(scheduler.request_frame());
                outcome
            }
            Err(err) => {
                self.failures += 1;
                if self.failures >= MAX_TICK_FAILURES {
                    tracing::warn!(%err, failures = self.failures, "render loop stopped");
                    self.state = LoopState::Stopped;
                    self.fault = Some(err);
                } else {
                    tracing::warn!(%err, "render tick failed");
                    self.pending = Some(scheduler.request_frame());
                }
                TickOutcome::Failed
            }
        }
    }

    fn render(
        &mut self,
        session: &mut AnalysisSession,
        surface: &mut dyn Surface,
        config: &RenderConfig,
    ) -> Result<TickOutcome> {
        session.registry().resume();
        session.pull()?;

        let (width, height) = fit_to_display(surface);
        surface.resize(width, height);
        if width == 0 || height == 0 {
            return Ok(TickOutcome::Skipped);
        }

        let colors = config.palette.colors();
        let (w, h) = (width as f32, height as f32);
        surface.fill_rect(Rect::new(0.0, 0.0, w, h), colors.background);

        match self.style {
            LoopStyle::Full => {
                if let Some(frame) = session.source().video_frame() {
                    video::composite(surface, &frame, VIDEO_OVERLAY);
                }
                self.draw_mode(surface, session, config);
            }
            LoopStyle::Scope => {
                let trace = session.time_domain();
                modes::draw_scope(surface, trace, colors.primary, &mut self.points);
            }
        }

        self.frames_drawn += 1;
        Ok(TickOutcome::Drawn)
    }

    fn draw_mode(
        &mut self,
        surface: &mut dyn Surface,
        session: &AnalysisSession,
        config: &RenderConfig,
    ) {
        let colors = config.palette.colors();
        let sensitivity = config.sensitivity;
        let (time, frequency) = (session.time_domain(), session.frequency());

        match config.mode {
            VisualMode::Waveform => {
                modes::draw_waveform(surface, time, sensitivity, &colors, &mut self.points)
            }
            VisualMode::Bars => modes::draw_bars(surface, frequency, sensitivity, &colors),
            VisualMode::Radial => {
                modes::draw_radial(surface, frequency, sensitivity, &colors, &mut self.points)
            }
            VisualMode::Particles => modes::draw_particles(
                surface,
                time,
                frequency,
                sensitivity,
                &colors,
                config.particle_count,
            ),
        }
    }
}

/// Device pixel size matching the surface's layout box.
pub fn fit_to_display(surface: &dyn Surface) -> (u32, u32) {
    let (width, height) = surface.display_box();
    let ratio = surface.pixel_ratio();
    let scale = |value: f32| {
        let scaled = (value * ratio).round();
        if scaled.is_finite() && scaled > 0.0 {
            scaled as u32
        } else {
            0
        }
    };
    (scale(width), scale(height))
}
