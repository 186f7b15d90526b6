use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSignal {
    Scroll,
    /// Page content changed; `added_nodes` counts newly inserted elements.
    Mutation { added_nodes: usize },
}

impl PageSignal {
    pub fn qualifies(&self) -> bool {
        match self {
            PageSignal::Scroll => true,
            PageSignal::Mutation { added_nodes } => *added_nodes > 0,
        }
    }
}

pub struct ChangeTrigger;

impl ChangeTrigger {
    /// A signal source and the debouncer that coalesces its signals.
    pub fn new(window: Duration) -> (TriggerHandle, Debouncer) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            TriggerHandle { sender },
            Debouncer {
                receiver,
                window,
                fires: 0,
                closed: false,
            },
        )
    }
}

#[derive(Debug, Clone)]
pub struct TriggerHandle {
    sender: mpsc::UnboundedSender<PageSignal>,
}

impl TriggerHandle {
    /// Returns false when the signal was ignored or the debouncer is gone.
    pub fn signal(&self, signal: PageSignal) -> bool {
        if !signal.qualifies() {
            return false;
        }
        self.sender.send(signal).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Emits one fire per burst of signals, `window` after the last signal of
/// the burst. Ends once every `TriggerHandle` has been dropped.
#[derive(Debug)]
pub struct Debouncer {
    receiver: mpsc::UnboundedReceiver<PageSignal>,
    window: Duration,
    fires: u64,
    closed: bool,
}

impl Debouncer {
    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn fires(&self) -> u64 {
        self.fires
    }

    /// Waits for the next quiescent point. `None` once the trigger is closed
    /// and no burst is pending.
    pub async fn next_fire(&mut self) -> Option<()> {
        if self.closed {
            return None;
        }
        let first = self.receiver.recv().await;
        if first.is_none() {
            self.closed = true;
            return None;
        }

        let mut deadline = Instant::now() + self.window;
        let mut coalesced = 1;
        loop {
            tokio::select! {
                biased;
                signal = self.receiver.recv(), if !self.closed => match signal {
                    Some(_) => {
                        coalesced += 1;
                        deadline = Instant::now() + self.window;
                    }
                    None => self.closed = true,
                },
                _ = sleep_until(deadline) => break,
            }
        }

        self.fires += 1;
        debug!("Trigger fired after {} signals", coalesced);
        Some(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(300);

    #[test]
    fn test_signal_qualification() {
        assert!(PageSignal::Scroll.qualifies());
        assert!(PageSignal::Mutation { added_nodes: 2 }.qualifies());
        assert!(!PageSignal::Mutation { added_nodes: 0 }.qualifies());
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_fires_once_after_last_signal() {
        let (handle, mut debouncer) = ChangeTrigger::new(WINDOW);
        let start = Instant::now();

        let signals = async {
            for _ in 0..3 {
                assert!(handle.signal(PageSignal::Scroll));
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        };
        let (_, fired) = tokio::join!(signals, debouncer.next_fire());

        assert_eq!(fired, Some(()));
        // Last signal at 200ms
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(500) && elapsed < Duration::from_millis(600));
        assert_eq!(debouncer.fires(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_bursts_fire_separately() {
        let (handle, mut debouncer) = ChangeTrigger::new(WINDOW);

        handle.signal(PageSignal::Scroll);
        assert_eq!(debouncer.next_fire().await, Some(()));

        handle.signal(PageSignal::Mutation { added_nodes: 1 });
        assert_eq!(debouncer.next_fire().await, Some(()));
        assert_eq!(debouncer.fires(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_mutations_are_ignored() {
        let (handle, mut debouncer) = ChangeTrigger::new(WINDOW);
        assert!(!handle.signal(PageSignal::Mutation { added_nodes: 0 }));
        drop(handle);

        assert_eq!(debouncer.next_fire().await, None);
        assert_eq!(debouncer.fires(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_burst_fires_after_close() {
        let (handle, mut debouncer) = ChangeTrigger::new(WINDOW);
        handle.signal(PageSignal::Scroll);
        drop(handle);

        assert_eq!(debouncer.next_fire().await, Some(()));
        assert_eq!(debouncer.next_fire().await, None);
    }
}
