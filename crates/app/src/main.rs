use std::path::{Path, PathBuf};

use audioscope_core::{
    format_time, render::Canvas, ActivityMonitor, AppConfig, FrameQueue, FrameRequest,
    ImageSurface, MediaElement, Palette, PlaybackClock, Platform, SignalGraphRegistry,
    SignalSource, TickOutcome, UserActivation, VisualMode, Visualizer,
};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod signal;

/// The monitor is drawn at a quarter of the main surface's size.
const MONITOR_SCALE: f32 = 0.25;

fn main() -> audioscope_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Render {
            output,
            frames,
            synth_video,
        } => run_render(&output, frames, synth_video),
        Commands::Live { output, frames } => run_live(&output, frames),
    }
}

fn run_render(
    output: &RenderOutput,
    frames: u64,
    synth_video: bool,
) -> audioscope_core::Result<()> {
    let config = output.resolve()?;
    tracing::info!(
        frames,
        fps = output.fps,
        mode = config.render.mode.name(),
        palette = config.render.palette.name(),
        "rendering synthetic source"
    );

    let element = if synth_video {
        MediaElement::video(config.audio.feed_capacity)
    } else {
        MediaElement::audio(config.audio.feed_capacity)
    };
    let mut sweep = signal::ToneSweep::new(config.audio.sample_rate, 110.0, 1760.0, 6.0);
    let samples_per_frame = (config.audio.sample_rate / output.fps.max(1)) as usize;
    let mut block = Vec::with_capacity(samples_per_frame);

    let mut pipeline = Pipeline::new(&config, output)?;
    pipeline.attach(element.clone().into())?;

    for frame in 0..frames {
        sweep.fill(samples_per_frame, &mut block);
        element.push_samples(&block)?;
        if synth_video {
            element.present_frame(signal::test_card(320, 180, frame)?)?;
        }

        pipeline.frame(frame)?;
    }

    pipeline.finish();
    Ok(())
}

#[cfg(feature = "capture")]
fn run_live(output: &RenderOutput, frames: u64) -> audioscope_core::Result<()> {
    use audioscope_core::{audio::capture::MicrophoneCapture, RefreshPacer};

    let config = output.resolve()?;
    let capture = MicrophoneCapture::open_default(config.audio.feed_capacity)?;
    tracing::info!(
        frames,
        sample_rate = capture.sample_rate(),
        "rendering microphone input"
    );

    let mut pipeline = Pipeline::new(&config, output)?;
    pipeline.attach(capture.stream().clone().into())?;

    let mut pacer = RefreshPacer::new(output.fps);
    for frame in 0..frames {
        pacer.wait();
        pipeline.frame(frame)?;
    }

    pipeline.finish();
    Ok(())
}

#[cfg(not(feature = "capture"))]
fn run_live(_output: &RenderOutput, _frames: u64) -> audioscope_core::Result<()> {
    Err(audioscope_core::VisualizerError::msg(
        "live capture is not available, rebuild with `--features capture`",
    ))
}

/// Main visualiser and activity monitor driven from one frame queue, each
/// writing PNG frames into the output directory.
struct Pipeline {
    registry: SignalGraphRegistry,
    activation: UserActivation,
    gesture_at: Option<u64>,
    visualizer: Visualizer,
    monitor: ActivityMonitor,
    surface: ImageSurface,
    monitor_surface: ImageSurface,
    queue: FrameQueue,
    due: Vec<FrameRequest>,
    out_dir: PathBuf,
    fps: u32,
    clock: PlaybackClock,
}

impl Pipeline {
    fn new(config: &AppConfig, output: &RenderOutput) -> audioscope_core::Result<Self> {
        std::fs::create_dir_all(&output.out_dir)?;

        // A gesture frame means the host starts out blocking audio until the
        // user interacts with the page.
        let activation = UserActivation::new();
        let platform = match output.gesture_at {
            Some(_) => Platform::gesture_gated(config.audio.sample_rate, activation.clone()),
            None => Platform::desktop(config.audio.sample_rate),
        };
        let registry = SignalGraphRegistry::new(platform);
        registry.ensure_context()?;

        let surface_config = config.surface;
        let surface = ImageSurface::new(
            surface_config.width,
            surface_config.height,
            surface_config.pixel_ratio,
        );
        let monitor_surface = ImageSurface::new(
            surface_config.width * MONITOR_SCALE,
            surface_config.height * MONITOR_SCALE,
            surface_config.pixel_ratio,
        );

        Ok(Self {
            visualizer: Visualizer::new(&registry, config.render),
            monitor: ActivityMonitor::new(&registry, config.render.palette),
            registry,
            activation,
            gesture_at: output.gesture_at,
            surface,
            monitor_surface,
            queue: FrameQueue::new(),
            due: Vec::new(),
            out_dir: output.out_dir.clone(),
            fps: output.fps.max(1),
            clock: PlaybackClock::start(),
        })
    }

    fn attach(&mut self, source: SignalSource) -> audioscope_core::Result<()> {
        self.visualizer
            .attach(source.clone(), &self.surface, &mut self.queue)?;
        self.monitor
            .attach(source, &self.monitor_surface, &mut self.queue)?;
        self.clock.reset();
        Ok(())
    }

    fn frame(&mut self, frame: u64) -> audioscope_core::Result<()> {
        if self.gesture_at == Some(frame) {
            tracing::info!(frame, "simulating user gesture");
            self.activation.activate();
        }

        self.queue.drain_due(&mut self.due);
        for &request in &self.due {
            let main = self
                .visualizer
                .on_frame(request, &mut self.surface, &mut self.queue);
            let monitor = self
                .monitor
                .on_frame(request, &mut self.monitor_surface, &mut self.queue);
            if main == TickOutcome::Failed || monitor == TickOutcome::Failed {
                tracing::debug!(frame, ?main, ?monitor, "tick failed");
            }
        }

        save(&self.surface, &self.out_dir.join(format!("frame-{frame:05}.png")))?;
        save(
            &self.monitor_surface,
            &self.out_dir.join(format!("monitor-{frame:05}.png")),
        )?;

        let position = frame as f64 / f64::from(self.fps);
        tracing::debug!(
            frame,
            position = %format_time(position),
            elapsed = %self.clock.display(),
            context = ?self.registry.context_state(),
            "frame written"
        );
        Ok(())
    }

    fn finish(mut self) {
        self.visualizer.detach(&mut self.queue);
        self.monitor.detach(&mut self.queue);
        tracing::info!(
            out_dir = %self.out_dir.display(),
            elapsed = %self.clock.display(),
            "render finished"
        );
    }
}

/// Writes the surface unless it has no pixels yet.
fn save(surface: &ImageSurface, path: &Path) -> audioscope_core::Result<()> {
    let (width, height) = surface.size();
    if width == 0 || height == 0 {
        tracing::warn!(path = %path.display(), "surface is empty, frame not written");
        return Ok(());
    }
    surface.save_png(path)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Real-time audio visualiser", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Render frames of a synthetic tone sweep to PNG files.
    Render {
        #[command(flatten)]
        output: RenderOutput,
        /// Number of frames to render.
        #[arg(short = 'n', long, default_value_t = 120)]
        frames: u64,
        /// Also feed a synthetic video picture behind the visualisation.
        #[arg(long)]
        synth_video: bool,
    },
    /// Render frames from the default microphone to PNG files.
    Live {
        #[command(flatten)]
        output: RenderOutput,
        /// Number of frames to capture.
        #[arg(short = 'n', long, default_value_t = 300)]
        frames: u64,
    },
}

/// Options shared by every rendering command. Flags override values loaded
/// from `--config`.
#[derive(Args, Debug)]
struct RenderOutput {
    /// Directory the PNG frames are written to.
    #[arg(short, long, default_value = "frames")]
    out_dir: PathBuf,
    /// JSON configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Display refreshes per second.
    #[arg(long, default_value_t = 30)]
    fps: u32,
    /// Visual mode: waveform, bars, radial or particles.
    #[arg(short, long)]
    mode: Option<VisualMode>,
    /// Color palette: neon, sunset, ocean, forest or mono.
    #[arg(short, long)]
    palette: Option<Palette>,
    /// Amplitude gain, clamped to 0.1..=5.0.
    #[arg(short, long)]
    sensitivity: Option<f32>,
    /// Use the compact particle count.
    #[arg(long)]
    compact: bool,
    /// Surface width in layout units.
    #[arg(long)]
    width: Option<f32>,
    /// Surface height in layout units.
    #[arg(long)]
    height: Option<f32>,
    /// Device pixels per layout unit.
    #[arg(long)]
    pixel_ratio: Option<f32>,
    /// Block audio until this frame, as a browser does before the first
    /// user gesture.
    #[arg(long)]
    gesture_at: Option<u64>,
}

impl RenderOutput {
    fn resolve(&self) -> audioscope_core::Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::load(path)?,
            None => AppConfig::default(),
        };

        if let Some(mode) = self.mode {
            config.render = config.render.with_mode(mode);
        }
        if let Some(palette) = self.palette {
            config.render = config.render.with_palette(palette);
        }
        if let Some(sensitivity) = self.sensitivity {
            config.render = config.render.with_sensitivity(sensitivity);
        }
        if self.compact {
            config.render = config.render.compact();
        }
        if let Some(width) = self.width {
            config.surface.width = width;
        }
        if let Some(height) = self.height {
            config.surface.height = height;
        }
        if let Some(pixel_ratio) = self.pixel_ratio {
            config.surface.pixel_ratio = pixel_ratio;
        }

        config.validate()?;
        Ok(config)
    }
}
