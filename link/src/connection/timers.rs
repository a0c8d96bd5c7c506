use std::future::pending;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior, Sleep};

/// The two timers a connection owns: the heartbeat interval while connected
/// and the backoff sleep while waiting to retry.
///
/// Both are plain owned values. [`stop`](Self::stop) drops them, after which
/// neither wait future ever completes.
#[derive(Debug, Default)]
pub struct ConnectionTimers {
    heartbeat: Option<Interval>,
    backoff: Option<Pin<Box<Sleep>>>,
}

impl ConnectionTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// First tick fires one full `period` from now.
    pub fn start_heartbeat(&mut self, period: Duration) {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.heartbeat = Some(interval);
    }

    pub fn stop_heartbeat(&mut self) {
        self.heartbeat = None;
    }

    pub fn schedule_backoff(&mut self, delay: Duration) {
        self.backoff = Some(Box::pin(tokio::time::sleep(delay)));
    }

    pub fn cancel_backoff(&mut self) {
        self.backoff = None;
    }

    /// Cancel everything.
    pub fn stop(&mut self) {
        self.stop_heartbeat();
        self.cancel_backoff();
    }

    #[cfg(test)]
    fn heartbeat_running(&self) -> bool {
        self.heartbeat.is_some()
    }

    #[cfg(test)]
    fn backoff_pending(&self) -> bool {
        self.backoff.is_some()
    }

    /// Wait for whichever armed timer fires first. Cancel-safe.
    pub async fn fired(&mut self) -> TimerEvent {
        tokio::select! {
            biased;
            _ = elapse(&mut self.backoff) => TimerEvent::BackoffElapsed,
            _ = tick(&mut self.heartbeat) => TimerEvent::Heartbeat,
        }
    }

    /// Resolves on the next heartbeat tick; never resolves when stopped.
    #[cfg(test)]
    async fn heartbeat_tick(&mut self) {
        tick(&mut self.heartbeat).await
    }

    /// Resolves once when the scheduled backoff elapses, then disarms.
    #[cfg(test)]
    async fn backoff_elapsed(&mut self) {
        elapse(&mut self.backoff).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    Heartbeat,
    BackoffElapsed,
}

async fn tick(heartbeat: &mut Option<Interval>) {
    match heartbeat.as_mut() {
        Some(interval) => {
            interval.tick().await;
        },
        None => pending::<()>().await,
    }
}

async fn elapse(backoff: &mut Option<Pin<Box<Sleep>>>) {
    match backoff.as_mut() {
        Some(sleep) => sleep.as_mut().await,
        None => pending::<()>().await,
    }
    *backoff = None;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    #[tokio::test(start_paused = true)]
    async fn test_backoff_fires_once() {
        let mut timers = ConnectionTimers::new();
        timers.schedule_backoff(Duration::from_secs(2));
        assert!(timers.backoff_pending());

        assert!(timeout(Duration::from_secs(1), timers.backoff_elapsed()).await.is_err());
        assert!(timers.backoff_pending());
        assert!(timeout(Duration::from_secs(2), timers.backoff_elapsed()).await.is_ok());
        assert!(!timers.backoff_pending());
        assert!(timeout(Duration::from_secs(60), timers.backoff_elapsed()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_ticks_each_period() {
        let mut timers = ConnectionTimers::new();
        timers.start_heartbeat(Duration::from_secs(30));

        assert!(timeout(Duration::from_secs(29), timers.heartbeat_tick()).await.is_err());
        assert!(timeout(Duration::from_secs(2), timers.heartbeat_tick()).await.is_ok());
        assert!(timeout(Duration::from_secs(31), timers.heartbeat_tick()).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fired_reports_which_timer() {
        let mut timers = ConnectionTimers::new();
        timers.start_heartbeat(Duration::from_secs(30));
        timers.schedule_backoff(Duration::from_secs(5));

        assert_eq!(timers.fired().await, TimerEvent::BackoffElapsed);
        assert_eq!(timers.fired().await, TimerEvent::Heartbeat);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_both() {
        let mut timers = ConnectionTimers::new();
        timers.start_heartbeat(Duration::from_secs(1));
        timers.schedule_backoff(Duration::from_secs(1));
        timers.stop();

        assert!(!timers.heartbeat_running());
        assert!(!timers.backoff_pending());
        assert!(timeout(Duration::from_secs(10), timers.heartbeat_tick()).await.is_err());
        assert!(timeout(Duration::from_secs(10), timers.backoff_elapsed()).await.is_err());
    }
}
