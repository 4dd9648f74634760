use std::{
    collections::VecDeque,
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

use crate::{Result, VisualizerError};

#[cfg(feature = "capture")]
pub mod capture;

/// Default number of samples retained by a [`SampleFeed`].
pub const DEFAULT_FEED_CAPACITY: usize = 4096;

static NEXT_SOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a signal source. Issued once per source when it is created and
/// shared by every clone of its handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(u64);

impl SourceId {
    fn next() -> Self {
        Self(NEXT_SOURCE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "source#{}", self.0)
    }
}

/// Shared ring of the most recent mono samples of a source.
///
/// Producers (capture callbacks, decoders) push from any thread; the analyser
/// reads the tail on the frame tick.
#[derive(Clone)]
pub struct SampleFeed {
    shared: Arc<Mutex<VecDeque<f32>>>,
    capacity: usize,
}

impl SampleFeed {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            shared: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends samples, dropping the oldest ones once the ring is full.
    pub fn push_samples(&self, samples: &[f32]) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }

        let mut ring = self.lock()?;
        let tail = &samples[samples.len().saturating_sub(self.capacity)..];
        let overflow = (ring.len() + tail.len()).saturating_sub(self.capacity);
        ring.drain(..overflow);
        ring.extend(tail.iter().copied());
        Ok(())
    }

    /// Number of samples currently held.
    pub fn len(&self) -> usize {
        self.lock().map(|ring| ring.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies the most recent `out.len()` samples into `out`, oldest first.
    /// Positions with no sample history are zero-filled at the front.
    pub fn copy_latest(&self, out: &mut [f32]) -> Result<()> {
        let ring = self.lock()?;
        let available = ring.len().min(out.len());
        let missing = out.len() - available;
        out[..missing].fill(0.0);

        let start = ring.len() - available;
        for (slot, sample) in out[missing..].iter_mut().zip(ring.range(start..)) {
            *slot = *sample;
        }
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, VecDeque<f32>>> {
        self.shared
            .lock()
            .map_err(|_| VisualizerError::msg("sample feed has been poisoned"))
    }
}

impl fmt::Debug for SampleFeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleFeed")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}

/// A live capture stream (microphone, loopback). May be tapped any number of
/// times.
#[derive(Debug, Clone)]
pub struct CaptureStream {
    id: SourceId,
    feed: SampleFeed,
}

impl CaptureStream {
    pub fn new(capacity: usize) -> Self {
        Self {
            id: SourceId::next(),
            feed: SampleFeed::new(capacity),
        }
    }

    pub fn id(&self) -> SourceId {
        self.id
    }

    pub fn feed(&self) -> &SampleFeed {
        &self.feed
    }

    pub fn push_samples(&self, samples: &[f32]) -> Result<()> {
        self.feed.push_samples(samples)
    }
}

/// Whether a media element carries a picture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
}

/// A decoded RGBA video frame. Only built through [`VideoFrame::new`], so the
/// pixel data always matches the non-zero dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    width: u32,
    height: u32,
    /// Row-major RGBA8 pixels, `width * height * 4` bytes.
    pixels: Vec<u8>,
}

impl VideoFrame {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(VisualizerError::InvalidInput(
                "video frames need non-zero dimensions",
            ));
        }
        if pixels.len() != width as usize * height as usize * 4 {
            return Err(VisualizerError::InvalidInput(
                "video frame pixel data does not match its dimensions",
            ));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// A frame filled with one color.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Result<Self> {
        let pixels = rgba
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        Self::new(width, height, pixels)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Color at `(x, y)`. Coordinates outside the frame are clamped to its
    /// edge.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let x = x.min(self.width - 1);
        let y = y.min(self.height - 1);
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        [
            self.pixels[offset],
            self.pixels[offset + 1],
            self.pixels[offset + 2],
            self.pixels[offset + 3],
        ]
    }
}

struct MediaShared {
    kind: MediaKind,
    feed: SampleFeed,
    tapped: AtomicBool,
    frame: Mutex<Option<Arc<VideoFrame>>>,
}

/// A playable media element. The platform allows turning it into a graph
/// source exactly once over its whole lifetime.
#[derive(Clone)]
pub struct MediaElement {
    id: SourceId,
    shared: Arc<MediaShared>,
}

impl MediaElement {
    pub fn new(kind: MediaKind, capacity: usize) -> Self {
        Self {
            id: SourceId::next(),
            shared: Arc::new(MediaShared {
                kind,
                feed: SampleFeed::new(capacity),
                tapped: AtomicBool::new(false),
                frame: Mutex::new(None),
            }),
        }
    }

    pub fn audio(capacity: usize) -> Self {
        Self::new(MediaKind::Audio, capacity)
    }

    pub fn video(capacity: usize) -> Self {
        Self::new(MediaKind::Video, capacity)
    }

    pub fn id(&self) -> SourceId {
        self.id
    }

    pub fn kind(&self) -> MediaKind {
        self.shared.kind
    }

    pub fn feed(&self) -> &SampleFeed {
        &self.shared.feed
    }

    /// Feeds decoded audio into the element.
    pub fn push_samples(&self, samples: &[f32]) -> Result<()> {
        self.shared.feed.push_samples(samples)
    }

    /// Publishes the latest decoded video frame.
    pub fn present_frame(&self, frame: VideoFrame) -> Result<()> {
        if self.shared.kind != MediaKind::Video {
            return Err(VisualizerError::InvalidInput(
                "audio elements cannot present video frames",
            ));
        }
        let mut slot = self.lock_frame()?;
        *slot = Some(Arc::new(frame));
        Ok(())
    }

    /// The current frame, if the element is a video with at least one frame
    /// decoded.
    pub fn current_frame(&self) -> Option<Arc<VideoFrame>> {
        if self.shared.kind != MediaKind::Video {
            return None;
        }
        self.lock_frame().ok().and_then(|slot| slot.clone())
    }

    pub fn has_frame(&self) -> bool {
        self.current_frame().is_some()
    }

    /// Whether the element has ever been turned into a graph source.
    pub fn is_tapped(&self) -> bool {
        self.shared.tapped.load(Ordering::Acquire)
    }

    /// Claims the element's single tap. Fails if it was claimed before, by
    /// any context.
    pub(crate) fn claim_tap(&self) -> Result<()> {
        if self
            .shared
            .tapped
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(VisualizerError::connection(format!(
                "media element {} is already connected to an audio graph",
                self.id
            )));
        }
        Ok(())
    }

    fn lock_frame(&self) -> Result<MutexGuard<'_, Option<Arc<VideoFrame>>>> {
        self.shared
            .frame
            .lock()
            .map_err(|_| VisualizerError::msg("video frame slot has been poisoned"))
    }
}

impl fmt::Debug for MediaElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaElement")
            .field("id", &self.id)
            .field("kind", &self.shared.kind)
            .field("tapped", &self.is_tapped())
            .finish()
    }
}

/// Anything a visualisation can be attached to.
#[derive(Debug, Clone)]
pub enum SignalSource {
    Stream(CaptureStream),
    Media(MediaElement),
}

impl SignalSource {
    pub fn id(&self) -> SourceId {
        match self {
            Self::Stream(stream) => stream.id(),
            Self::Media(element) => element.id(),
        }
    }

    pub fn feed(&self) -> &SampleFeed {
        match self {
            Self::Stream(stream) => stream.feed(),
            Self::Media(element) => element.feed(),
        }
    }

    /// The frame to composite behind the visualisation, if any.
    pub fn video_frame(&self) -> Option<Arc<VideoFrame>> {
        match self {
            Self::Stream(_) => None,
            Self::Media(element) => element.current_frame(),
        }
    }
}

impl From<CaptureStream> for SignalSource {
    fn from(value: CaptureStream) -> Self {
        Self::Stream(value)
    }
}

impl From<MediaElement> for SignalSource {
    fn from(value: MediaElement) -> Self {
        Self::Media(value)
    }
}
