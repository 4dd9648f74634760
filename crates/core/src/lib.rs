//! Core library for the audioscope visualiser.
//!
//! Audio enters through signal sources (capture streams and media elements)
//! and is tapped into a small in-process signal graph owned by a
//! [`SignalGraphRegistry`]. Each consumer opens an [`AnalysisSession`] on that
//! graph and a [`RenderLoop`] turns the session's byte snapshots into pixels,
//! one display refresh at a time, in one of several visual modes.

pub mod analysis;
pub mod audio;
pub mod config;
pub mod error;
pub mod graph;
pub mod render;
pub mod timeline;
pub mod visualizer;

pub use analysis::{AnalyserOptions, AnalysisSession};
pub use audio::{
    CaptureStream, MediaElement, MediaKind, SampleFeed, SignalSource, SourceId, VideoFrame,
};
pub use config::{AppConfig, AudioConfig, RenderConfig, SurfaceConfig, VisualMode};
pub use error::{Result, VisualizerError};
pub use graph::{ContextState, Platform, SignalGraphRegistry, UserActivation};
pub use render::{raster::ImageSurface, Palette, RenderLoop, Rgba, Surface, TickOutcome};
pub use timeline::{
    format_time, FrameQueue, FrameRequest, FrameScheduler, PlaybackClock, RefreshPacer,
};
pub use visualizer::{ActivityMonitor, Visualizer};
