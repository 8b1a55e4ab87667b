// src/scheduler/mod.rs - What drives the control loop forward
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

/// Source of tick events for [`ControlLoop::run`](crate::controller::ControlLoop::run).
#[async_trait]
pub trait Ticker: Send {
    /// Resolve when the next tick is due. `false` stops the loop.
    ///
    /// Must be cancel-safe: the loop drops this future whenever an operator
    /// command arrives first, then calls it again.
    async fn wait(&mut self) -> bool;
}

/// Fires `interval` after the previous tick completed. Ticks never overlap and
/// drift is not compensated.
#[derive(Debug)]
pub struct FixedDelayTicker {
    interval: Duration,
    next: Option<Instant>,
}

impl FixedDelayTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval, next: None }
    }
}

#[async_trait]
impl Ticker for FixedDelayTicker {
    async fn wait(&mut self) -> bool {
        // Armed on the first poll after a tick, kept across cancellation
        let interval = self.interval;
        let deadline = *self.next.get_or_insert_with(|| Instant::now() + interval);
        tokio::time::sleep_until(deadline).await;
        self.next = None;
        true
    }
}

/// Ticks on demand. Each [`TickHandle::tick`] resolves once the loop has
/// finished that tick and come back for the next one.
#[derive(Debug)]
pub struct ManualTicker {
    requests: mpsc::UnboundedReceiver<oneshot::Sender<()>>,
    in_flight: Option<oneshot::Sender<()>>,
}

#[derive(Debug, Clone)]
pub struct TickHandle {
    requests: mpsc::UnboundedSender<oneshot::Sender<()>>,
}

impl ManualTicker {
    pub fn channel() -> (Self, TickHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                requests: rx,
                in_flight: None,
            },
            TickHandle { requests: tx },
        )
    }
}

#[async_trait]
impl Ticker for ManualTicker {
    async fn wait(&mut self) -> bool {
        if let Some(done) = self.in_flight.take() {
            let _ = done.send(());
        }
        match self.requests.recv().await {
            Some(done) => {
                self.in_flight = Some(done);
                true
            }
            None => false,
        }
    }
}

impl TickHandle {
    /// Request one tick and wait until it has run. Returns `false` if the
    /// loop stopped first.
    pub async fn tick(&self) -> bool {
        let (done_tx, done_rx) = oneshot::channel();
        if self.requests.send(done_tx).is_err() {
            return false;
        }
        done_rx.await.is_ok()
    }

    pub async fn ticks(&self, count: usize) -> bool {
        for _ in 0..count {
            if !self.tick().await {
                return false;
            }
        }
        true
    }
}
