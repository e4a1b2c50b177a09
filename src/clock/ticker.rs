// TickerDriver - periodic wakeup source for the clock
// A background thread when the platform allows it, otherwise a
// time-arithmetic fallback that computes due wakeups on poll

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, TryRecvError, channel};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use log::warn;

/// Source of periodic wakeups at a fixed interval
///
/// [`TickerDriver::spawn`] prefers a dedicated sleeper thread; if the
/// thread cannot be created it logs a warning and degrades to
/// [`DeferredTicker`], which derives missed wakeups from elapsed time.
/// Driver construction never fails.
pub enum TickerDriver {
    Thread(ThreadTicker),
    Deferred(DeferredTicker),
}

impl TickerDriver {
    /// Start a driver waking every `interval` seconds, with `now` as
    /// the first reference time
    pub fn spawn(interval: f64, now: f64) -> Self {
        match ThreadTicker::spawn(interval) {
            Ok(ticker) => Self::Thread(ticker),
            Err(err) => {
                warn!("ticker thread unavailable ({err}), using deferred wakeups");
                Self::Deferred(DeferredTicker::new(interval, now))
            }
        }
    }

    /// Number of wakeups that became due since the last poll
    pub fn due_wakeups(&mut self, now: f64) -> usize {
        match self {
            Self::Thread(ticker) => ticker.drain(),
            Self::Deferred(ticker) => ticker.due_wakeups(now),
        }
    }
}

/// Sleeper thread posting a unit message every interval
pub struct ThreadTicker {
    receiver: Receiver<()>,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ThreadTicker {
    fn spawn(interval: f64) -> std::io::Result<Self> {
        let (sender, receiver) = channel();
        let shutdown = Arc::new(AtomicBool::new(false));
        let thread_shutdown = Arc::clone(&shutdown);
        let sleep_for = Duration::from_secs_f64(interval.max(0.001));

        let handle = std::thread::Builder::new()
            .name("tickline-ticker".into())
            .spawn(move || {
                loop {
                    if thread_shutdown.load(Ordering::Relaxed) {
                        break;
                    }
                    if sender.send(()).is_err() {
                        break;
                    }
                    std::thread::sleep(sleep_for);
                }
            })?;

        Ok(Self {
            receiver,
            shutdown,
            handle: Some(handle),
        })
    }

    /// Drain pending wakeup messages without blocking
    fn drain(&mut self) -> usize {
        let mut count = 0;
        loop {
            match self.receiver.try_recv() {
                Ok(()) => count += 1,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        count
    }
}

impl Drop for ThreadTicker {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Fallback driver computing due wakeups from elapsed caller time
pub struct DeferredTicker {
    interval: f64,
    next_due: f64,
}

impl DeferredTicker {
    pub fn new(interval: f64, now: f64) -> Self {
        Self {
            interval: interval.max(0.001),
            next_due: now,
        }
    }

    fn due_wakeups(&mut self, now: f64) -> usize {
        let mut count = 0;
        while self.next_due <= now {
            count += 1;
            self.next_due += self.interval;
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deferred_counts_elapsed_intervals() {
        let mut ticker = DeferredTicker::new(0.05, 0.0);

        // First poll covers the reference time itself
        assert_eq!(ticker.due_wakeups(0.0), 1);
        assert_eq!(ticker.due_wakeups(0.04), 0);
        assert_eq!(ticker.due_wakeups(0.26), 5);
        assert_eq!(ticker.due_wakeups(0.26), 0);
    }

    #[test]
    fn test_thread_ticker_delivers_and_shuts_down() {
        let mut ticker = ThreadTicker::spawn(0.005).unwrap();
        std::thread::sleep(Duration::from_millis(40));
        assert!(ticker.drain() > 0);
        // Drop joins the sleeper thread without hanging
        drop(ticker);
    }
}
