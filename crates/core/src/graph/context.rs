use std::{
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use crate::{
    analysis::{Analyser, AnalyserOptions},
    CaptureStream, MediaElement, Result, SampleFeed, SourceId, VisualizerError,
};

/// Whether the host lets audio start without a user gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoplayPolicy {
    Allowed,
    RequiresGesture,
}

/// Flag the host raises once the user has interacted with the page/window.
#[derive(Debug, Clone, Default)]
pub struct UserActivation(Arc<AtomicBool>);

impl UserActivation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn activate(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_active(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Capabilities of the environment the graph runs in.
#[derive(Debug, Clone)]
pub struct Platform {
    pub audio_supported: bool,
    pub sample_rate: u32,
    pub autoplay: AutoplayPolicy,
    pub activation: UserActivation,
}

impl Platform {
    /// A desktop host: audio available, no gesture needed.
    pub fn desktop(sample_rate: u32) -> Self {
        Self {
            audio_supported: true,
            sample_rate,
            autoplay: AutoplayPolicy::Allowed,
            activation: UserActivation::new(),
        }
    }

    /// A host that keeps new contexts suspended until `activation` is raised.
    pub fn gesture_gated(sample_rate: u32, activation: UserActivation) -> Self {
        Self {
            audio_supported: true,
            sample_rate,
            autoplay: AutoplayPolicy::RequiresGesture,
            activation,
        }
    }

    /// A host without any audio processing support.
    pub fn unsupported() -> Self {
        Self {
            audio_supported: false,
            sample_rate: 0,
            autoplay: AutoplayPolicy::Allowed,
            activation: UserActivation::new(),
        }
    }

    fn may_run(&self) -> bool {
        self.autoplay == AutoplayPolicy::Allowed || self.activation.is_active()
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::desktop(48_000)
    }
}

/// Lifecycle of an [`AudioContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Suspended,
    Running,
    Closed,
}

/// Handle of a node inside one context generation. Handles from a replaced
/// context never resolve in its successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    generation: u32,
    index: u32,
}

impl NodeId {
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}.{}", self.generation, self.index)
    }
}

enum Node {
    Destination,
    Tap { source: SourceId, feed: SampleFeed },
    Analyser(Box<Analyser>),
}

impl Node {
    fn label(&self) -> &'static str {
        match self {
            Node::Destination => "destination",
            Node::Tap { .. } => "tap",
            Node::Analyser(_) => "analyser",
        }
    }
}

/// In-process audio processing graph: source taps, analysers and the audible
/// destination, plus the directed connections between them.
pub struct AudioContext {
    generation: u32,
    sample_rate: u32,
    state: ContextState,
    platform: Platform,
    nodes: HashMap<NodeId, Node>,
    edges: Vec<(NodeId, NodeId)>,
    next_index: u32,
    destination: NodeId,
    resume_attempts: u64,
}

impl AudioContext {
    /// Creates a context. Fails with [`VisualizerError::GraphInit`] when the
    /// platform has no audio support.
    pub fn new(platform: &Platform, generation: u32) -> Result<Self> {
        if !platform.audio_supported {
            return Err(VisualizerError::GraphInit);
        }

        let destination = NodeId {
            generation,
            index: 0,
        };
        let mut nodes = HashMap::new();
        nodes.insert(destination, Node::Destination);

        let state = if platform.may_run() {
            ContextState::Running
        } else {
            ContextState::Suspended
        };

        Ok(Self {
            generation,
            sample_rate: platform.sample_rate,
            state,
            platform: platform.clone(),
            nodes,
            edges: Vec::new(),
            next_index: 1,
            destination,
            resume_attempts: 0,
        })
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    pub fn destination(&self) -> NodeId {
        self.destination
    }

    /// Number of resume requests issued while the context was suspended.
    pub fn resume_attempts(&self) -> u64 {
        self.resume_attempts
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains_key(&node)
    }

    pub fn is_connected(&self, from: NodeId, to: NodeId) -> bool {
        self.edges.contains(&(from, to))
    }

    /// Requests the transition to [`ContextState::Running`].
    pub fn resume(&mut self) -> Result<()> {
        match self.state {
            ContextState::Running => Ok(()),
            ContextState::Closed => Err(VisualizerError::Resume("context is closed".into())),
            ContextState::Suspended => {
                self.resume_attempts += 1;
                if self.platform.may_run() {
                    self.state = ContextState::Running;
                    Ok(())
                } else {
                    Err(VisualizerError::Resume(
                        "playback requires a user gesture".into(),
                    ))
                }
            }
        }
    }

    pub fn suspend(&mut self) {
        if self.state == ContextState::Running {
            self.state = ContextState::Suspended;
        }
    }

    /// Closes the context for good. Every node is released.
    pub fn close(&mut self) {
        self.state = ContextState::Closed;
        self.edges.clear();
        self.nodes.clear();
    }

    /// Wraps a capture stream in a new tap node.
    pub fn create_stream_source(&mut self, stream: &CaptureStream) -> Result<NodeId> {
        self.ensure_open()?;
        Ok(self.insert(Node::Tap {
            source: stream.id(),
            feed: stream.feed().clone(),
        }))
    }

    /// Wraps a media element in a tap node. The platform allows this once per
    /// element, across all contexts.
    pub fn create_media_element_source(&mut self, element: &MediaElement) -> Result<NodeId> {
        self.ensure_open()?;
        element.claim_tap()?;
        Ok(self.insert(Node::Tap {
            source: element.id(),
            feed: element.feed().clone(),
        }))
    }

    pub fn create_analyser(&mut self, options: AnalyserOptions) -> Result<NodeId> {
        self.ensure_open()?;
        let analyser = Analyser::new(options)?;
        Ok(self.insert(Node::Analyser(Box::new(analyser))))
    }

    /// The source a tap node was created from.
    pub fn tap_source(&self, node: NodeId) -> Option<SourceId> {
        match self.nodes.get(&node) {
            Some(Node::Tap { source, .. }) => Some(*source),
            _ => None,
        }
    }

    pub fn connect(&mut self, from: NodeId, to: NodeId) -> Result<()> {
        self.ensure_open()?;
        let source = self
            .nodes
            .get(&from)
            .ok_or_else(|| VisualizerError::connection(format!("unknown node {from}")))?;
        let target = self
            .nodes
            .get(&to)
            .ok_or_else(|| VisualizerError::connection(format!("unknown node {to}")))?;

        if matches!(source, Node::Destination) || matches!(target, Node::Tap { .. }) {
            return Err(VisualizerError::connection(format!(
                "cannot connect {} {from} to {} {to}",
                source.label(),
                target.label()
            )));
        }

        if !self.is_connected(from, to) {
            self.edges.push((from, to));
        }
        Ok(())
    }

    /// Removes exactly the `from → to` connection.
    pub fn disconnect(&mut self, from: NodeId, to: NodeId) -> Result<()> {
        let before = self.edges.len();
        self.edges.retain(|edge| *edge != (from, to));
        if self.edges.len() == before {
            return Err(VisualizerError::Disposal(format!(
                "{from} is not connected to {to}"
            )));
        }
        Ok(())
    }

    /// Releases a node together with every connection touching it.
    pub fn remove_node(&mut self, node: NodeId) -> Result<()> {
        if node == self.destination {
            return Err(VisualizerError::Disposal(
                "the destination cannot be removed".into(),
            ));
        }
        if self.nodes.remove(&node).is_none() {
            return Err(VisualizerError::Disposal(format!("{node} was already released")));
        }
        self.edges.retain(|(from, to)| *from != node && *to != node);
        Ok(())
    }

    /// Fills the snapshot buffers of an analyser from whatever feeds it.
    /// Outside the running state, or without an upstream tap, the snapshot is
    /// silence.
    pub fn read_analyser(
        &mut self,
        analyser: NodeId,
        time: &mut [u8],
        frequency: &mut [u8],
    ) -> Result<()> {
        let feed = self
            .edges
            .iter()
            .filter(|(_, to)| *to == analyser)
            .find_map(|(from, _)| match self.nodes.get(from) {
                Some(Node::Tap { feed, .. }) => Some(feed.clone()),
                _ => None,
            });

        let running = self.state == ContextState::Running;
        match self.nodes.get_mut(&analyser) {
            Some(Node::Analyser(node)) => match feed {
                Some(feed) if running => node.snapshot(&feed, time, frequency),
                _ => {
                    Analyser::silence(time, frequency);
                    Ok(())
                }
            },
            Some(other) => Err(VisualizerError::connection(format!(
                "{analyser} is a {} node, not an analyser",
                other.label()
            ))),
            None => Err(VisualizerError::connection(format!(
                "{analyser} is no longer part of the graph"
            ))),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state == ContextState::Closed {
            return Err(VisualizerError::connection("audio context is closed"));
        }
        Ok(())
    }

    fn insert(&mut self, node: Node) -> NodeId {
        let id = NodeId {
            generation: self.generation,
            index: self.next_index,
        };
        self.next_index += 1;
        self.nodes.insert(id, node);
        id
    }
}

impl fmt::Debug for AudioContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioContext")
            .field("generation", &self.generation)
            .field("state", &self.state)
            .field("nodes", &self.nodes.len())
            .field("edges", &self.edges.len())
            .finish()
    }
}
