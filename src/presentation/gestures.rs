use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const DEFAULT_HOLD_THRESHOLD: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldOutcome {
    Tap,
    LongPress,
}

struct Press {
    fired: Arc<AtomicBool>,
    timer: JoinHandle<()>,
}

/// 長押し判定。閾値に達した時点で `LongPress` を通知する。
pub struct HoldTimer {
    threshold: Duration,
    press: Option<Press>,
    events: mpsc::UnboundedSender<HoldOutcome>,
}

impl HoldTimer {
    pub fn new(threshold: Duration) -> (Self, mpsc::UnboundedReceiver<HoldOutcome>) {
        let (events, rx) = mpsc::unbounded_channel();
        (
            Self {
                threshold,
                press: None,
                events,
            },
            rx,
        )
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    pub fn is_pressed(&self) -> bool {
        self.press.is_some()
    }

    /// Starts a hold. A press while already pressed restarts the timer.
    pub fn press(&mut self) {
        self.cancel();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let events = self.events.clone();
        let threshold = self.threshold;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(threshold).await;
            flag.store(true, Ordering::SeqCst);
            let _ = events.send(HoldOutcome::LongPress);
        });
        self.press = Some(Press { fired, timer });
    }

    /// Ends the hold. `None` when nothing was pressed.
    pub fn release(&mut self) -> Option<HoldOutcome> {
        let press = self.press.take()?;
        press.timer.abort();
        if press.fired.load(Ordering::SeqCst) {
            Some(HoldOutcome::LongPress)
        } else {
            let _ = self.events.send(HoldOutcome::Tap);
            Some(HoldOutcome::Tap)
        }
    }

    /// Abandons the hold without an outcome.
    pub fn cancel(&mut self) {
        if let Some(press) = self.press.take() {
            press.timer.abort();
        }
    }
}

impl Drop for HoldTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn quick_release_is_a_tap() {
        let (mut timer, mut events) = HoldTimer::new(DEFAULT_HOLD_THRESHOLD);
        timer.press();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(timer.release(), Some(HoldOutcome::Tap));
        assert_eq!(events.recv().await, Some(HoldOutcome::Tap));
        assert!(!timer.is_pressed());
    }

    #[tokio::test(start_paused = true)]
    async fn holding_past_threshold_fires_long_press() {
        let (mut timer, mut events) = HoldTimer::new(DEFAULT_HOLD_THRESHOLD);
        timer.press();

        assert_eq!(events.recv().await, Some(HoldOutcome::LongPress));
        assert_eq!(timer.release(), Some(HoldOutcome::LongPress));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_suppresses_every_outcome() {
        let (mut timer, mut events) = HoldTimer::new(DEFAULT_HOLD_THRESHOLD);
        timer.press();
        timer.cancel();
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert!(events.try_recv().is_err());
        assert_eq!(timer.release(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn repress_restarts_the_timer() {
        let (mut timer, mut events) = HoldTimer::new(Duration::from_millis(300));
        timer.press();
        tokio::time::sleep(Duration::from_millis(200)).await;
        timer.press();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(events.try_recv().is_err());
        assert_eq!(timer.release(), Some(HoldOutcome::Tap));
    }
}
