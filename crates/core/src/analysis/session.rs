use crate::{
    analysis::AnalyserOptions,
    graph::{NodeId, SignalGraphRegistry, Tap, TapOwnership},
    Result, SignalSource, VisualizerError,
};

/// Consecutive wiring failures after which a session gives up.
const MAX_CONNECT_FAILURES: u32 = 2;

#[derive(Debug, Clone, Copy)]
struct SessionLink {
    tap: Tap,
    analyser: NodeId,
}

/// One consumer's view of a signal source: a dedicated analyser hanging off
/// the source's tap, plus the two snapshot buffers it fills.
///
/// Wiring failures do not fail construction; they put the session in a fault
/// state the host can inspect with [`fault`](Self::fault). The session can be
/// disposed in every state, and dropping it disposes it.
#[derive(Debug)]
pub struct AnalysisSession {
    registry: SignalGraphRegistry,
    source: SignalSource,
    options: AnalyserOptions,
    link: Option<SessionLink>,
    time_domain: Vec<u8>,
    frequency: Vec<u8>,
    fault: Option<VisualizerError>,
    failures: u32,
    disposed: bool,
}

impl AnalysisSession {
    /// Wires a new analyser for `source` into the registry's graph.
    pub fn connect(
        registry: &SignalGraphRegistry,
        source: SignalSource,
        options: AnalyserOptions,
    ) -> Self {
        let bins = options.bin_count();
        let mut session = Self {
            registry: registry.clone(),
            source,
            options,
            link: None,
            time_domain: vec![128; bins],
            frequency: vec![0; bins],
            fault: None,
            failures: 0,
            disposed: false,
        };
        session.attempt();
        session
    }

    pub fn source(&self) -> &SignalSource {
        &self.source
    }

    pub fn registry(&self) -> &SignalGraphRegistry {
        &self.registry
    }

    pub fn options(&self) -> &AnalyserOptions {
        &self.options
    }

    pub fn bin_count(&self) -> usize {
        self.time_domain.len()
    }

    pub fn time_domain(&self) -> &[u8] {
        &self.time_domain
    }

    pub fn frequency(&self) -> &[u8] {
        &self.frequency
    }

    pub fn tap(&self) -> Option<Tap> {
        self.link.map(|link| link.tap)
    }

    pub fn analyser_node(&self) -> Option<NodeId> {
        self.link.map(|link| link.analyser)
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// The error that prevented wiring, if any.
    pub fn fault(&self) -> Option<&VisualizerError> {
        self.fault.as_ref()
    }

    /// Whether the session can never connect: the platform has no audio
    /// support, wiring failed repeatedly, or the session was disposed.
    pub fn is_terminal(&self) -> bool {
        self.disposed
            || self.fault.as_ref().is_some_and(VisualizerError::is_fatal)
            || self.failures >= MAX_CONNECT_FAILURES
    }

    /// Tries once more to wire a faulted session.
    pub fn retry(&mut self) -> Result<()> {
        if self.link.is_some() {
            return Ok(());
        }
        if self.is_terminal() {
            return Err(VisualizerError::connection(
                "session cannot be reconnected, start a new one",
            ));
        }

        self.attempt();
        match &self.fault {
            Some(fault) if self.link.is_none() => {
                Err(VisualizerError::connection(fault.to_string()))
            }
            _ => Ok(()),
        }
    }

    /// Overwrites both snapshot buffers with the analyser's current output.
    pub fn pull(&mut self) -> Result<()> {
        let link = self
            .link
            .ok_or_else(|| VisualizerError::connection("session is not connected"))?;

        self.registry
            .with_live_context(|ctx| {
                ctx.read_analyser(link.analyser, &mut self.time_domain, &mut self.frequency)
            })
            .unwrap_or_else(|| Err(VisualizerError::connection("audio context is closed")))
    }

    /// Disconnects the analyser from its tap and releases it. Taps shared
    /// through the registry stay connected to the output. Calling this again
    /// does nothing.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;

        let Some(link) = self.link.take() else {
            return;
        };

        let released = self.registry.with_live_context(|ctx| {
            ignore_disposal(ctx.disconnect(link.tap.node, link.analyser));
            ignore_disposal(ctx.remove_node(link.analyser));
            if link.tap.ownership == TapOwnership::Session {
                ignore_disposal(ctx.remove_node(link.tap.node));
            }
        });

        tracing::debug!(
            source = %self.source.id(),
            analyser = %link.analyser,
            released = released.is_some(),
            "analysis session disposed"
        );
    }

    fn attempt(&mut self) {
        match wire(&self.registry, &self.source, self.options) {
            Ok(link) => {
                tracing::debug!(
                    source = %self.source.id(),
                    tap = %link.tap.node,
                    analyser = %link.analyser,
                    "analysis session connected"
                );
                self.link = Some(link);
                self.fault = None;
            }
            Err(err) => {
                self.failures += 1;
                tracing::warn!(
                    source = %self.source.id(),
                    %err,
                    failures = self.failures,
                    "analysis session failed to connect"
                );
                self.fault = Some(err);
            }
        }
    }
}

impl Drop for AnalysisSession {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn wire(
    registry: &SignalGraphRegistry,
    source: &SignalSource,
    options: AnalyserOptions,
) -> Result<SessionLink> {
    let tap = registry.get_or_create_tap(source)?;

    let analyser = registry
        .with_context(|ctx| {
            let analyser = ctx.create_analyser(options)?;
            if let Err(err) = ctx.connect(tap.node, analyser) {
                ignore_disposal(ctx.remove_node(analyser));
                return Err(err);
            }
            Ok(analyser)
        })
        .and_then(|wired| wired);

    match analyser {
        Ok(analyser) => Ok(SessionLink { tap, analyser }),
        Err(err) => {
            if tap.ownership == TapOwnership::Session {
                registry.with_live_context(|ctx| ignore_disposal(ctx.remove_node(tap.node)));
            }
            Err(err)
        }
    }
}

fn ignore_disposal(result: Result<()>) {
    if let Err(err) = result {
        tracing::trace!(%err, "ignoring disposal error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::{MAIN_FFT_SIZE, MONITOR_FFT_SIZE},
        graph::Platform,
        CaptureStream, MediaElement,
    };

    fn tone(len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| 0.6 * (i as f32 * 0.37).sin())
            .collect()
    }

    #[test]
    fn buffers_are_half_the_transform_size() {
        let registry = SignalGraphRegistry::new(Platform::default());
        let element = MediaElement::audio(1024);

        let main = AnalysisSession::connect(
            &registry,
            element.clone().into(),
            AnalyserOptions::with_fft_size(MAIN_FFT_SIZE),
        );
        let monitor = AnalysisSession::connect(
            &registry,
            element.into(),
            AnalyserOptions::with_fft_size(MONITOR_FFT_SIZE),
        );

        assert_eq!(main.time_domain().len(), 256);
        assert_eq!(main.frequency().len(), 256);
        assert_eq!(monitor.time_domain().len(), 128);
        assert_eq!(monitor.frequency().len(), 128);
        assert_eq!(main.tap(), monitor.tap());
    }

    #[test]
    fn pulls_reuse_the_same_storage() {
        let registry = SignalGraphRegistry::new(Platform::default());
        let stream = CaptureStream::new(1024);
        let mut session =
            AnalysisSession::connect(&registry, stream.clone().into(), AnalyserOptions::default());

        let time_ptr = session.time_domain().as_ptr();
        let freq_ptr = session.frequency().as_ptr();

        for _ in 0..3 {
            stream.push_samples(&tone(256)).unwrap();
            session.pull().unwrap();
            assert_eq!(session.time_domain().as_ptr(), time_ptr);
            assert_eq!(session.frequency().as_ptr(), freq_ptr);
        }
        assert!(session.time_domain().iter().any(|&v| v != 128));
    }

    #[test]
    fn disposal_keeps_the_shared_tap_alive() {
        let registry = SignalGraphRegistry::new(Platform::default());
        let element = MediaElement::audio(1024);

        let mut first =
            AnalysisSession::connect(&registry, element.clone().into(), AnalyserOptions::default());
        let tap = first.tap().unwrap();
        first.dispose();

        let audible = registry
            .with_context(|ctx| ctx.is_connected(tap.node, ctx.destination()))
            .unwrap();
        assert!(audible);

        let mut second =
            AnalysisSession::connect(&registry, element.clone().into(), AnalyserOptions::default());
        assert_eq!(second.tap(), Some(tap));

        element.push_samples(&tone(512)).unwrap();
        second.pull().unwrap();
        assert!(second.time_domain().iter().any(|&v| v != 128));
    }

    #[test]
    fn disposal_is_idempotent_and_releases_stream_taps() {
        let registry = SignalGraphRegistry::new(Platform::default());
        let baseline = registry.with_context(|ctx| ctx.node_count()).unwrap();

        let mut session = AnalysisSession::connect(
            &registry,
            CaptureStream::new(64).into(),
            AnalyserOptions::default(),
        );
        assert_eq!(
            registry.with_context(|ctx| ctx.node_count()).unwrap(),
            baseline + 2
        );

        session.dispose();
        session.dispose();
        assert!(session.is_disposed());
        assert_eq!(
            registry.with_context(|ctx| ctx.node_count()).unwrap(),
            baseline
        );
        assert!(session.pull().is_err());
    }

    #[test]
    fn dropping_a_session_disposes_it() {
        let registry = SignalGraphRegistry::new(Platform::default());
        let baseline = registry.with_context(|ctx| ctx.node_count()).unwrap();
        {
            let _session = AnalysisSession::connect(
                &registry,
                MediaElement::audio(64).into(),
                AnalyserOptions::default(),
            );
        }
        // the media tap stays cached, only the analyser is gone
        assert_eq!(
            registry.with_context(|ctx| ctx.node_count()).unwrap(),
            baseline + 1
        );
    }

    #[test]
    fn failed_tap_leaves_a_disposable_fault() {
        let element = MediaElement::audio(64);
        let elsewhere = SignalGraphRegistry::new(Platform::default());
        elsewhere.get_or_create_tap(&element.clone().into()).unwrap();

        let registry = SignalGraphRegistry::new(Platform::default());
        let mut session =
            AnalysisSession::connect(&registry, element.into(), AnalyserOptions::default());

        assert!(!session.is_connected());
        assert!(matches!(session.fault(), Some(VisualizerError::Connection(_))));
        assert_eq!(session.bin_count(), 256);

        session.dispose();
        assert_eq!(registry.with_context(|ctx| ctx.node_count()).unwrap(), 1);
    }

    #[test]
    fn second_failure_is_terminal() {
        let element = MediaElement::audio(64);
        let elsewhere = SignalGraphRegistry::new(Platform::default());
        elsewhere.get_or_create_tap(&element.clone().into()).unwrap();

        let registry = SignalGraphRegistry::new(Platform::default());
        let mut session =
            AnalysisSession::connect(&registry, element.into(), AnalyserOptions::default());
        assert!(!session.is_terminal());

        assert!(session.retry().is_err());
        assert!(session.is_terminal());
        assert!(session.retry().is_err());
    }

    #[test]
    fn missing_platform_support_is_fatal() {
        let registry = SignalGraphRegistry::new(Platform::unsupported());
        let session = AnalysisSession::connect(
            &registry,
            CaptureStream::new(64).into(),
            AnalyserOptions::default(),
        );

        assert!(matches!(session.fault(), Some(VisualizerError::GraphInit)));
        assert!(session.is_terminal());
    }
}
