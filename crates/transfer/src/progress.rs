use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// ProgressChannel
// ---------------------------------------------------------------------------

/// One-directional event pipe from a worker to an observer.
///
/// Bounded. [`progress`](Self::progress) never waits: when the observer
/// lags, the event is dropped and counted. [`deliver`](Self::deliver)
/// waits for room and is meant for events that must not be lost.
/// Events that are delivered arrive in send order.
pub struct ProgressChannel<E> {
    tx: mpsc::Sender<E>,
    dropped: Arc<AtomicU64>,
}

impl<E> Clone for ProgressChannel<E> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            dropped: Arc::clone(&self.dropped),
        }
    }
}

impl<E> ProgressChannel<E> {
    /// Creates a channel holding at most `capacity` undelivered events.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<E>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let channel = Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        };
        (channel, rx)
    }

    /// Sends without waiting. Returns false if the event was not queued.
    pub fn progress(&self, event: E) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Sends, waiting for room. A closed observer is ignored.
    pub async fn deliver(&self, event: E) {
        let _ = self.tx.send(event).await;
    }

    /// Number of progress events dropped because the observer lagged.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Percentage of `sent` over `total`; an empty total counts as done.
pub fn percent(sent: u64, total: u64) -> f64 {
    if total == 0 {
        return 100.0;
    }
    (sent as f64 / total as f64 * 100.0).min(100.0)
}

// ---------------------------------------------------------------------------
// SpeedCalculator
// ---------------------------------------------------------------------------

struct SpeedSample {
    bytes: u64,
    timestamp: Instant,
}

/// Calculates transfer speed using a sliding window of samples.
pub struct SpeedCalculator {
    samples: VecDeque<SpeedSample>,
    max_samples: usize,
    window_size: Duration,
}

impl Default for SpeedCalculator {
    fn default() -> Self {
        Self::new(None, None)
    }
}

impl SpeedCalculator {
    /// Creates a new calculator.
    ///
    /// - `window_size`: time window for speed calculation (default 5 s).
    /// - `max_samples`: maximum retained samples (default 100).
    pub fn new(window_size: Option<Duration>, max_samples: Option<usize>) -> Self {
        Self {
            samples: VecDeque::new(),
            max_samples: max_samples.unwrap_or(100).max(2),
            window_size: window_size.unwrap_or(Duration::from_secs(5)),
        }
    }

    /// Records `bytes` transferred at the current instant.
    pub fn add_sample(&mut self, bytes: u64) {
        self.add_sample_at(bytes, Instant::now());
    }

    fn add_sample_at(&mut self, bytes: u64, now: Instant) {
        self.samples.push_back(SpeedSample {
            bytes,
            timestamp: now,
        });

        if let Some(cutoff) = now.checked_sub(self.window_size) {
            while self.samples.front().is_some_and(|s| s.timestamp < cutoff) {
                self.samples.pop_front();
            }
        }
        while self.samples.len() > self.max_samples {
            self.samples.pop_front();
        }
    }

    /// Average speed in bytes/second within the window.
    ///
    /// Returns 0.0 with fewer than 2 samples. The first sample only
    /// marks the start of the window; its bytes are not counted.
    pub fn bytes_per_second(&self) -> f64 {
        let (Some(first), Some(last)) = (self.samples.front(), self.samples.back()) else {
            return 0.0;
        };
        if self.samples.len() < 2 {
            return 0.0;
        }
        let elapsed = last.timestamp.duration_since(first.timestamp);
        if elapsed.is_zero() {
            return 0.0;
        }
        let bytes: u64 = self.samples.iter().skip(1).map(|s| s.bytes).sum();
        bytes as f64 / elapsed.as_secs_f64()
    }

    /// Estimated time to transfer `remaining_bytes`; `None` if speed is zero.
    pub fn eta(&self, remaining_bytes: u64) -> Option<Duration> {
        let speed = self.bytes_per_second();
        if speed <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(remaining_bytes as f64 / speed))
    }

    pub fn reset(&mut self) {
        self.samples.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn progress_drops_when_full_but_deliver_waits() {
        let (channel, mut rx) = ProgressChannel::<u32>::new(2);
        assert!(channel.progress(1));
        assert!(channel.progress(2));
        assert!(!channel.progress(3));
        assert_eq!(channel.dropped(), 1);

        let sender = channel.clone();
        let pending = tokio::spawn(async move { sender.deliver(4).await });
        assert_eq!(rx.recv().await, Some(1));
        pending.await.unwrap();

        assert_eq!(rx.recv().await, Some(2));
        assert_eq!(rx.recv().await, Some(4));
    }

    #[tokio::test]
    async fn closed_observer_is_ignored() {
        let (channel, rx) = ProgressChannel::<u32>::new(4);
        drop(rx);
        assert!(channel.is_closed());
        assert!(!channel.progress(1));
        channel.deliver(2).await;
        assert_eq!(channel.dropped(), 0);
    }

    #[test]
    fn percent_bounds() {
        assert_eq!(percent(0, 0), 100.0);
        assert_eq!(percent(50, 200), 25.0);
        assert_eq!(percent(300, 200), 100.0);
    }

    #[test]
    fn speed_calculator_no_samples() {
        let calc = SpeedCalculator::default();
        assert_eq!(calc.bytes_per_second(), 0.0);
        assert!(calc.eta(1000).is_none());
    }

    #[test]
    fn speed_calculator_single_sample() {
        let mut calc = SpeedCalculator::default();
        calc.add_sample(100);
        assert_eq!(calc.bytes_per_second(), 0.0);
    }

    #[test]
    fn speed_from_samples() {
        let mut calc = SpeedCalculator::new(Some(Duration::from_secs(10)), None);
        let start = Instant::now();
        calc.add_sample_at(0, start);
        calc.add_sample_at(1000, start + Duration::from_millis(500));
        calc.add_sample_at(1000, start + Duration::from_secs(1));

        assert_eq!(calc.bytes_per_second(), 2000.0);
        assert_eq!(calc.eta(4000), Some(Duration::from_secs(2)));
    }

    #[test]
    fn old_samples_leave_the_window() {
        let mut calc = SpeedCalculator::new(Some(Duration::from_secs(5)), None);
        let start = Instant::now();
        calc.add_sample_at(1_000_000, start);
        calc.add_sample_at(0, start + Duration::from_secs(10));
        calc.add_sample_at(100, start + Duration::from_secs(11));

        assert_eq!(calc.bytes_per_second(), 100.0);
    }

    #[test]
    fn max_samples_and_reset() {
        let mut calc = SpeedCalculator::new(Some(Duration::from_secs(60)), Some(5));
        for i in 0..20 {
            calc.add_sample(i * 10);
        }
        assert!(calc.samples.len() <= 5);
        calc.reset();
        assert_eq!(calc.bytes_per_second(), 0.0);
    }
}
