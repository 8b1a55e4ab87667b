// src/controller.rs - The control loop: link lifecycle, tick pipeline, operator commands
use std::sync::Arc;

use thermo_shared::{Frame, PortOpener, classify_with_band, protocol};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::communication::OperatorCommand;
use crate::config::Config;
use crate::hardware::temperature::{
    ControlState, Reconciliation, SetpointDelta, SetpointError, SetpointReconciler,
};
use crate::hardware::{LinkError, LinkKind, LinkManager, LinkStats};
use crate::history::{Sample, TimeSeriesBuffer};
use crate::scheduler::Ticker;
use crate::simulator::{JitterSource, SimulationModel};
use crate::sink::{Snapshot, SnapshotSink};

/// Everything a tick or an operator command may mutate, owned in one place.
#[derive(Debug)]
pub struct ControlContext {
    pub state: ControlState,
    pub links: LinkManager,
    pub history: TimeSeriesBuffer,
    /// Completed ticks since the link was opened; time is derived from it.
    pub tick_count: u64,
    /// Consecutive physical reads that produced no frame.
    pub misses: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// No link. Ticks do nothing and the last snapshot stays as it was.
    Idle,
    Active,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Idle,
    Sampled(Sample),
    /// The link failed during the tick and has been closed.
    LinkLost(LinkError),
}

/// Result of racing a tick's read against the operator channel.
enum ReadRace {
    Finished(Result<Option<Frame>, LinkError>),
    Command(Option<OperatorCommand>),
}

pub struct ControlLoop {
    ctx: ControlContext,
    simulation: SimulationModel,
    reconciler: SetpointReconciler,
    stable_band: f64,
    tick_seconds: f64,
    initial_measured: f64,
    max_consecutive_misses: Option<u32>,
    sink: Arc<dyn SnapshotSink>,
}

impl ControlLoop {
    pub fn new(
        config: &Config,
        opener: Box<dyn PortOpener>,
        jitter: Box<dyn JitterSource>,
        sink: Arc<dyn SnapshotSink>,
    ) -> Self {
        let ctx = ControlContext {
            state: ControlState::new(config.control.initial_target, config.simulation.initial_measured),
            links: LinkManager::new(opener, config.link.clone()),
            history: TimeSeriesBuffer::new(config.control.max_points, config.control.axis_padding),
            tick_count: 0,
            misses: 0,
        };
        Self {
            ctx,
            simulation: SimulationModel::new(&config.simulation, jitter),
            reconciler: SetpointReconciler::new(config.control.reconcile_tolerance),
            stable_band: config.control.stable_band,
            tick_seconds: config.control.tick_seconds(),
            initial_measured: config.simulation.initial_measured,
            max_consecutive_misses: config.link.max_consecutive_misses,
            sink,
        }
    }

    pub fn context(&self) -> &ControlContext {
        &self.ctx
    }

    pub fn state(&self) -> &ControlState {
        &self.ctx.state
    }

    pub fn history(&self) -> &TimeSeriesBuffer {
        &self.ctx.history
    }

    pub fn link_kind(&self) -> LinkKind {
        self.ctx.links.kind()
    }

    pub fn link_stats(&self) -> &LinkStats {
        self.ctx.links.stats()
    }

    pub fn loop_state(&self) -> LoopState {
        if self.ctx.links.is_open() {
            LoopState::Active
        } else {
            LoopState::Idle
        }
    }

    pub fn available_ports(&self) -> Vec<String> {
        self.ctx.links.available_ports()
    }

    /// Open a link and start a fresh session. A link that is already open is
    /// closed first. On failure the loop stays idle and the sink is told.
    pub async fn request_connect(&mut self, port: &str) -> Result<LinkKind, LinkError> {
        self.request_disconnect();

        match self.ctx.links.open(port).await {
            Ok(kind) => {
                self.start_session();
                self.publish();
                Ok(kind)
            }
            Err(e) => {
                tracing::error!("{}", e);
                self.sink.on_link_error(&e);
                Err(e)
            }
        }
    }

    /// Close the link. Returns `false`, and touches nothing, if it was
    /// already closed.
    pub fn request_disconnect(&mut self) -> bool {
        if !self.ctx.links.close() {
            return false;
        }
        self.ctx.history.clear();
        self.ctx.tick_count = 0;
        self.ctx.misses = 0;
        self.ctx.state.status = None;
        self.publish();
        true
    }

    /// Nudge the target and send it. Sending is skipped while not connected
    /// to a device.
    pub async fn request_setpoint_delta(&mut self, delta: SetpointDelta) -> f64 {
        let target = self.reconciler.apply_delta(&mut self.ctx.state, delta);
        tracing::info!("Setpoint {:+.1} -> {:.2}°C", delta.value(), target);
        self.send_target().await;
        target
    }

    pub async fn request_setpoint_absolute(&mut self, value: f64) -> Result<f64, SetpointError> {
        let target = self.reconciler.apply_absolute(&mut self.ctx.state, value)?;
        tracing::info!("Setpoint -> {:.2}°C", target);
        self.send_target().await;
        Ok(target)
    }

    /// Apply one operator command. Returns `false` once shutdown is requested.
    pub async fn handle_command(&mut self, command: OperatorCommand) -> bool {
        tracing::debug!("Operator command: {:?}", command);
        match command {
            OperatorCommand::Connect(port) => {
                // Failure already reached the sink
                let _ = self.request_connect(&port).await;
            }
            OperatorCommand::Disconnect => {
                self.request_disconnect();
            }
            OperatorCommand::SetpointDelta(delta) => {
                self.request_setpoint_delta(delta).await;
            }
            OperatorCommand::SetpointAbsolute(value) => {
                if let Err(e) = self.request_setpoint_absolute(value).await {
                    tracing::warn!("{}", e);
                }
            }
            OperatorCommand::ListPorts => {
                let ports = self.available_ports();
                self.sink.on_ports(&ports);
            }
            OperatorCommand::Shutdown => return false,
        }
        true
    }

    /// Run one tick to completion.
    pub async fn tick(&mut self) -> TickOutcome {
        if !self.ctx.links.is_open() {
            return TickOutcome::Idle;
        }
        let deadline = self.ctx.links.read_deadline();
        let acquired = self.acquire(deadline).await;
        self.settle(acquired)
    }

    /// Drive the loop until shutdown, the command channel closes or the ticker
    /// stops. Commands take priority over ticks. Link commands arriving while
    /// a tick is reading abort that read; setpoint commands wait for the tick.
    pub async fn run<T: Ticker>(&mut self, mut ticker: T, mut commands: mpsc::Receiver<OperatorCommand>) {
        tracing::info!("Control loop started ({})", self.link_kind().label());

        loop {
            let due = tokio::select! {
                biased;
                command = commands.recv() => Err(command),
                go = ticker.wait() => Ok(go),
            };
            let keep_running = match due {
                Err(Some(command)) => self.handle_command(command).await,
                Err(None) => false,
                Ok(false) => false,
                Ok(true) => self.tick_interruptible(&mut commands).await,
            };
            if !keep_running {
                break;
            }
        }

        self.request_disconnect();
        tracing::info!("Control loop stopped");
    }

    /// Current view for the sink.
    pub fn snapshot(&self) -> Snapshot {
        let history = &self.ctx.history;
        let latest = history.latest();
        Snapshot {
            times: history.times(),
            measured: history.measured(),
            setpoint: history.setpoints(),
            status: self.ctx.state.status,
            connection_label: self.ctx.links.kind().label(),
            target: self.ctx.state.target,
            last_measured: latest.map(|s| s.measured),
            control_error: latest.map(|s| s.setpoint - s.measured),
            bounds: history.bounds(),
        }
    }

    async fn tick_interruptible(&mut self, commands: &mut mpsc::Receiver<OperatorCommand>) -> bool {
        if !self.ctx.links.is_open() {
            return true;
        }

        let deadline = self.ctx.links.read_deadline();
        let mut deferred = Vec::new();
        let mut channel_open = true;

        loop {
            let race = if channel_open {
                tokio::select! {
                    biased;
                    command = commands.recv() => ReadRace::Command(command),
                    acquired = self.acquire(deadline) => ReadRace::Finished(acquired),
                }
            } else {
                ReadRace::Finished(self.acquire(deadline).await)
            };

            match race {
                ReadRace::Finished(acquired) => {
                    self.settle(acquired);
                    break;
                }
                ReadRace::Command(None) => channel_open = false,
                ReadRace::Command(Some(command)) => {
                    let aborts = matches!(
                        command,
                        OperatorCommand::Connect(_) | OperatorCommand::Disconnect | OperatorCommand::Shutdown
                    );
                    deferred.push(command);
                    if aborts {
                        tracing::debug!("Tick aborted by operator, read dropped");
                        break;
                    }
                }
            }
        }

        for command in deferred {
            if !self.handle_command(command).await {
                return false;
            }
        }
        channel_open
    }

    /// Step 1 and 2 of a tick: get this tick's frame, if any. No state that
    /// outlives the tick is touched besides the link's own bookkeeping, so
    /// dropping this future mid-read loses nothing.
    async fn acquire(&mut self, deadline: Instant) -> Result<Option<Frame>, LinkError> {
        if self.ctx.links.is_simulated() {
            let measured = self.simulation.step(self.ctx.state.last_measured, self.ctx.state.target);
            return Ok(Some(Frame::Legacy { measured }));
        }

        let batch = self.ctx.links.read_batch_until(deadline).await?;
        if batch.is_empty() {
            return Ok(None);
        }
        tracing::debug!("RX: {}", String::from_utf8_lossy(&batch).trim_end());

        match protocol::try_decode(&batch) {
            Ok(frame) => {
                self.ctx.links.record_decode(true);
                Ok(Some(frame))
            }
            Err(e) => {
                self.ctx.links.record_decode(false);
                tracing::warn!("Ignoring telemetry: {}", e);
                Ok(None)
            }
        }
    }

    /// Steps 2 to 6: carry forward or take the new reading, reconcile,
    /// classify, append, publish.
    fn settle(&mut self, acquired: Result<Option<Frame>, LinkError>) -> TickOutcome {
        let frame = match acquired {
            Ok(frame) => frame,
            Err(e) => return self.lose_link(e),
        };

        match frame {
            Some(frame) => {
                self.ctx.misses = 0;
                self.ctx.state.last_measured = frame.measured();
                if let Some(device) = frame.device_setpoint() {
                    if let Reconciliation::Adopted { previous, device } =
                        self.reconciler.reconcile(&mut self.ctx.state, device)
                    {
                        tracing::info!("Device setpoint {:.2}°C adopted (was {:.2}°C)", device, previous);
                    }
                }
            }
            None if !self.ctx.links.is_simulated() => {
                self.ctx.misses = self.ctx.misses.saturating_add(1);
                if let Some(limit) = self.max_consecutive_misses {
                    if self.ctx.misses >= limit {
                        return self.lose_link(LinkError::Stalled(self.ctx.misses));
                    }
                }
            }
            None => {}
        }

        let state = &mut self.ctx.state;
        let status = classify_with_band(state.last_measured, state.target, self.stable_band);
        state.status = Some(status);

        self.ctx.tick_count += 1;
        let sample = Sample {
            time: self.ctx.tick_count as f64 * self.tick_seconds,
            measured: state.last_measured,
            setpoint: state.target,
        };
        self.ctx.history.append(sample);
        tracing::trace!(
            "Tick {} t={:.1}s T={:.2} target={:.2} {}",
            self.ctx.tick_count,
            sample.time,
            sample.measured,
            sample.setpoint,
            status
        );

        self.publish();
        TickOutcome::Sampled(sample)
    }

    fn lose_link(&mut self, error: LinkError) -> TickOutcome {
        tracing::error!("Link lost: {}", error);
        self.sink.on_link_error(&error);
        self.request_disconnect();
        TickOutcome::LinkLost(error)
    }

    fn start_session(&mut self) {
        self.ctx.history.clear();
        self.ctx.tick_count = 0;
        self.ctx.misses = 0;
        self.ctx.state.last_measured = self.initial_measured;
        self.ctx.state.status = None;
    }

    async fn send_target(&mut self) {
        let command = protocol::encode_setpoint(self.ctx.state.target);
        if let Err(e) = self.ctx.links.send(&command).await {
            tracing::warn!("Setpoint not delivered: {}", e);
        }
    }

    fn publish(&self) {
        self.sink.on_snapshot(Arc::new(self.snapshot()));
    }
}

impl std::fmt::Debug for ControlLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlLoop")
            .field("ctx", &self.ctx)
            .field("simulation", &self.simulation)
            .field("stable_band", &self.stable_band)
            .field("tick_seconds", &self.tick_seconds)
            .finish()
    }
}
