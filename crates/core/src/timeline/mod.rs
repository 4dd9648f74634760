use std::time::{Duration, Instant};

/// Wall-clock reference for a playing source.
#[derive(Debug, Clone)]
pub struct PlaybackClock {
    started: Instant,
}

impl PlaybackClock {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    pub fn reset(&mut self) {
        self.started = Instant::now();
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Elapsed time formatted for display, see [`format_time`].
    pub fn display(&self) -> String {
        format_time(self.elapsed().as_secs_f64())
    }
}

/// Formats a position in seconds as `MM:SS`, or `HH:MM:SS` from one hour on.
/// Non-finite or negative input renders as `00:00`.
pub fn format_time(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return "00:00".to_string();
    }

    let total = seconds.floor() as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;

    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes:02}:{secs:02}")
    }
}

/// Ticket for one scheduled display-refresh callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameRequest(u64);

/// Source of display-refresh ticks.
///
/// A consumer asks for the next tick with [`request_frame`] and keeps the
/// returned ticket; the driver later hands that ticket back to the consumer.
/// A cancelled ticket must never be delivered.
///
/// [`request_frame`]: FrameScheduler::request_frame
pub trait FrameScheduler {
    fn request_frame(&mut self) -> FrameRequest;
    fn cancel_frame(&mut self, request: FrameRequest);
}

/// In-process [`FrameScheduler`]: requests queue up until the driver drains
/// them at the next refresh.
#[derive(Debug, Default)]
pub struct FrameQueue {
    next_id: u64,
    pending: Vec<FrameRequest>,
}

impl FrameQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves every request due at this refresh into `out`, oldest first.
    /// Requests made while handling them wait for the following refresh.
    pub fn drain_due(&mut self, out: &mut Vec<FrameRequest>) {
        out.clear();
        out.append(&mut self.pending);
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }
}

impl FrameScheduler for FrameQueue {
    fn request_frame(&mut self) -> FrameRequest {
        let request = FrameRequest(self.next_id);
        self.next_id += 1;
        self.pending.push(request);
        request
    }

    fn cancel_frame(&mut self, request: FrameRequest) {
        self.pending.retain(|pending| *pending != request);
    }
}

/// Paces a loop to a fixed refresh rate.
#[derive(Debug, Clone)]
pub struct RefreshPacer {
    interval: Duration,
    next: Instant,
}

impl RefreshPacer {
    pub fn new(fps: u32) -> Self {
        let interval = Duration::from_secs_f64(1.0 / f64::from(fps.max(1)));
        Self {
            interval,
            next: Instant::now() + interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Sleeps until the next refresh is due. A late caller does not try to
    /// catch up on missed refreshes.
    pub fn wait(&mut self) {
        let now = Instant::now();
        if self.next > now {
            std::thread::sleep(self.next - now);
            self.next += self.interval;
        } else {
            self.next = now + self.interval;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_minutes_and_hours() {
        assert_eq!(format_time(0.0), "00:00");
        assert_eq!(format_time(65.0), "01:05");
        assert_eq!(format_time(65.9), "01:05");
        assert_eq!(format_time(3661.0), "01:01:01");
    }

    #[test]
    fn formats_non_finite_as_zero() {
        assert_eq!(format_time(f64::NAN), "00:00");
        assert_eq!(format_time(f64::INFINITY), "00:00");
        assert_eq!(format_time(f64::NEG_INFINITY), "00:00");
        assert_eq!(format_time(-3.0), "00:00");
    }

    #[test]
    fn queue_delivers_requests_once() {
        let mut queue = FrameQueue::new();
        let first = queue.request_frame();
        let second = queue.request_frame();
        assert_ne!(first, second);

        let mut due = Vec::new();
        queue.drain_due(&mut due);
        assert_eq!(due, vec![first, second]);
        assert!(queue.is_idle());

        queue.drain_due(&mut due);
        assert!(due.is_empty());
    }

    #[test]
    fn cancelled_requests_are_never_due() {
        let mut queue = FrameQueue::new();
        let request = queue.request_frame();
        queue.cancel_frame(request);

        let mut due = Vec::new();
        queue.drain_due(&mut due);
        assert!(due.is_empty());
    }

    #[test]
    fn clock_display_starts_at_zero() {
        let clock = PlaybackClock::start();
        assert_eq!(clock.display(), "00:00");
    }
}
