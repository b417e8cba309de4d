//! [`Engine`] – task wiring around the [`DecisionCore`].
//!
//! ```text
//!  UDP telemetry ──► poller (10 ms) ─ watch (latest) ─┐
//!                                                     ├─► decision task ──► CommandSink (HEAL / FAULT)
//!  operator (inject / reset) ───────────── mpsc ──────┘         │
//!                                                               ├─► watch<StatusBoard>
//!                                                               └─► EventBus (Telemetry / Commands / Alerts)
//!
//!  operator setpoint ─► watch ─► control loop (30 ms) ──► CommandSink (DRIVE)
//!  TCP video ─► VideoReceiver ─► watch<Option<VideoFrame>>
//! ```
//!
//! The decision task is the single owner of all decision state.  Everything
//! else talks to it through messages, so no lock guards the detectors.
//! Telemetry is handed over as a latest-value slot: a slow tick skips stale
//! samples instead of queueing them.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use neurodrive_kernel::{LinkTransition, LinkWatchdog};
use neurodrive_middleware::{
    CommandChannel, CommandSink, EventBus, TelemetryChannel, Topic, TopicReceiver, VideoFrame,
    VideoReceiver,
};
use neurodrive_types::{CalibrationSet, Command, Event, EventPayload, FaultState, NeuroError, TelemetrySample};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::calibration::CalibrationCollector;
use crate::config::EngineConfig;
use crate::decision::DecisionCore;
use crate::status::StatusBoard;

/// `source` field of every event the engine publishes.
pub const ENGINE_SOURCE: &str = "neurodrive-runtime::engine";

const OPERATOR_CAPACITY: usize = 16;

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("failed to bind {what} on {addr}: {source}")]
    Bind {
        what: &'static str,
        addr: String,
        source: NeuroError,
    },
    #[error(transparent)]
    Neuro(#[from] NeuroError),
    /// The decision task is no longer running.
    #[error("engine is not running")]
    Stopped,
}

// ─────────────────────────────────────────────────────────────────────────────
// Messages
// ─────────────────────────────────────────────────────────────────────────────

/// Operator requests handled by the decision task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorAction {
    /// Ask the vehicle to simulate a wheel-speed sensor failure.
    InjectFault,
    /// Clear every fault and the virtual sensor.
    Reset,
}

/// Manual drive setpoint resent by the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DriveSetpoint {
    pub throttle: f32,
    pub steer: f32,
}

impl DriveSetpoint {
    /// Setpoint with both axes clamped to `[-1, 1]`.
    pub fn new(throttle: f32, steer: f32) -> Self {
        let cmd = Command::drive(throttle, steer);
        Self {
            throttle: cmd.value1,
            steer: cmd.value2,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Engine
// ─────────────────────────────────────────────────────────────────────────────

/// A configured engine that has not started its tasks yet.
pub struct Engine {
    config: EngineConfig,
    core: DecisionCore,
    telemetry: TelemetryChannel,
    sink: Arc<dyn CommandSink>,
    video: Option<VideoReceiver>,
    bus: EventBus,
}

impl Engine {
    /// Validate `config` and bind every socket it names.
    ///
    /// # Errors
    ///
    /// [`EngineError::Neuro`] for an invalid config, [`EngineError::Bind`]
    /// when a socket cannot be bound.
    pub async fn bind(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;

        let telemetry_addr = config.telemetry_addr();
        let telemetry = TelemetryChannel::bind(telemetry_addr.as_str()).map_err(|source| {
            EngineError::Bind {
                what: "telemetry",
                addr: telemetry_addr.clone(),
                source,
            }
        })?;

        let command_addr = config.command_addr();
        let commands = CommandChannel::connect(command_addr.as_str())
            .await
            .map_err(|source| EngineError::Bind {
                what: "commands",
                addr: command_addr.clone(),
                source,
            })?;

        let video_addr = config.video_addr();
        let video = VideoReceiver::bind(video_addr.as_str())
            .await
            .map_err(|source| EngineError::Bind {
                what: "video",
                addr: video_addr.clone(),
                source,
            })?;

        info!(
            telemetry = %telemetry_addr,
            commands = %command_addr,
            video = %video_addr,
            "engine sockets bound"
        );
        Ok(Self::from_parts(config, telemetry, Arc::new(commands)).with_video(video))
    }

    /// Assemble an engine from already-bound parts.  Used by tests to run
    /// against an in-memory sink.
    pub fn from_parts(
        config: EngineConfig,
        telemetry: TelemetryChannel,
        sink: Arc<dyn CommandSink>,
    ) -> Self {
        Self {
            core: DecisionCore::from_config(&config),
            config,
            telemetry,
            sink,
            video: None,
            bus: EventBus::default(),
        }
    }

    pub fn with_video(mut self, video: VideoReceiver) -> Self {
        self.video = Some(video);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn core(&self) -> &DecisionCore {
        &self.core
    }

    pub fn telemetry_addr(&self) -> Result<SocketAddr, NeuroError> {
        self.telemetry.local_addr()
    }

    /// Gather calibration samples for the configured window and train the
    /// anomaly detector.  A training failure is logged and the engine runs
    /// on the rule engine alone.
    pub async fn calibrate<F>(&mut self, progress: F) -> CalibrationSet
    where
        F: FnMut(u64),
    {
        info!(secs = self.config.calibration_secs, "calibrating on normal driving");
        let set = CalibrationCollector::new(self.config.calibration_window())
            .with_poll_interval(self.config.poll_interval())
            .collect_with_progress(&mut self.telemetry, progress)
            .await;
        if let Err(e) = self.core.train(&set) {
            warn!(error = %e, "anomaly detector disabled; continuing with safety rules only");
        }
        set
    }

    /// Start every task and return the operator handle.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(self) -> EngineHandle {
        let Engine {
            config,
            core,
            telemetry,
            sink,
            video,
            bus,
        } = self;

        let (sample_tx, sample_rx) = watch::channel(None);
        let (operator_tx, operator_rx) = mpsc::channel(OPERATOR_CAPACITY);
        let mut board = StatusBoard::new();
        board.model_trained = core.is_trained();
        let (status_tx, status_rx) = watch::channel(board);
        let (drive_tx, drive_rx) = watch::channel(DriveSetpoint::default());
        let (video_tx, video_rx) = watch::channel(None);

        let mut tasks = vec![
            tokio::spawn(poll_telemetry(telemetry, sample_tx, config.poll_interval())),
            tokio::spawn(
                DecisionTask {
                    core,
                    sink: Arc::clone(&sink),
                    bus: bus.clone(),
                    status: status_tx,
                    watchdog: LinkWatchdog::new(config.link_timeout()),
                }
                .run(sample_rx, operator_rx),
            ),
            tokio::spawn(control_loop(
                Arc::clone(&sink),
                drive_rx,
                config.control_interval(),
            )),
        ];
        if let Some(video) = video {
            tasks.push(tokio::spawn(video.run(video_tx)));
        }

        info!(tasks = tasks.len(), "engine running");
        EngineHandle {
            operators: operator_tx,
            drive: drive_tx,
            status: status_rx,
            video: video_rx,
            bus,
            sink,
            tasks,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handle
// ─────────────────────────────────────────────────────────────────────────────

/// Operator-side handle to a running engine.
pub struct EngineHandle {
    operators: mpsc::Sender<OperatorAction>,
    drive: watch::Sender<DriveSetpoint>,
    status: watch::Receiver<StatusBoard>,
    video: watch::Receiver<Option<VideoFrame>>,
    bus: EventBus,
    sink: Arc<dyn CommandSink>,
    tasks: Vec<JoinHandle<()>>,
}

impl EngineHandle {
    /// Set the manual drive setpoint (clamped).  Returns what was applied.
    pub fn drive(&self, throttle: f32, steer: f32) -> DriveSetpoint {
        let setpoint = DriveSetpoint::new(throttle, steer);
        self.drive.send_replace(setpoint);
        setpoint
    }

    pub fn stop(&self) {
        self.drive(0.0, 0.0);
    }

    pub fn setpoint(&self) -> DriveSetpoint {
        *self.drive.borrow()
    }

    pub async fn inject_fault(&self) -> Result<(), EngineError> {
        self.operator(OperatorAction::InjectFault).await
    }

    pub async fn reset(&self) -> Result<(), EngineError> {
        self.operator(OperatorAction::Reset).await
    }

    async fn operator(&self, action: OperatorAction) -> Result<(), EngineError> {
        self.operators
            .send(action)
            .await
            .map_err(|_| EngineError::Stopped)
    }

    /// Snapshot of the current status board.
    pub fn status(&self) -> StatusBoard {
        self.status.borrow().clone()
    }

    /// A receiver that is notified on every status change.
    pub fn watch_status(&self) -> watch::Receiver<StatusBoard> {
        self.status.clone()
    }

    /// Latest complete video frame, if any arrived.
    pub fn latest_frame(&self) -> Option<VideoFrame> {
        self.video.borrow().clone()
    }

    pub fn subscribe(&self, topic: Topic) -> TopicReceiver {
        self.bus.subscribe_to(topic)
    }

    /// Stop every task and send a final `DRIVE(0, 0)`.
    pub async fn shutdown(self) {
        for task in &self.tasks {
            task.abort();
        }
        if let Err(e) = self.sink.send(Command::drive(0.0, 0.0)).await {
            warn!(error = %e, "final stop command failed");
        }
        info!("engine stopped");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tasks
// ─────────────────────────────────────────────────────────────────────────────

/// Publish each polled sample into `latest`, overwriting any the decision
/// task has not read yet.
async fn poll_telemetry(
    mut channel: TelemetryChannel,
    latest: watch::Sender<Option<TelemetrySample>>,
    period: Duration,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        if latest.is_closed() {
            debug!("decision task gone; telemetry poller stopping");
            return;
        }
        if let Some(sample) = channel.poll() {
            latest.send_replace(Some(sample));
        }
    }
}

async fn control_loop(
    sink: Arc<dyn CommandSink>,
    setpoint: watch::Receiver<DriveSetpoint>,
    period: Duration,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        if setpoint.has_changed().is_err() {
            debug!("drive setpoint owner gone; control loop stopping");
            return;
        }
        let DriveSetpoint { throttle, steer } = *setpoint.borrow();
        if let Err(e) = sink.send(Command::drive(throttle, steer)).await {
            debug!(error = %e, "drive command not sent");
        }
    }
}

struct DecisionTask {
    core: DecisionCore,
    sink: Arc<dyn CommandSink>,
    bus: EventBus,
    status: watch::Sender<StatusBoard>,
    watchdog: LinkWatchdog,
}

impl DecisionTask {
    async fn run(
        mut self,
        mut samples: watch::Receiver<Option<TelemetrySample>>,
        mut operators: mpsc::Receiver<OperatorAction>,
    ) {
        let period = (self.watchdog.timeout() / 4).max(Duration::from_millis(5));
        let mut check = tokio::time::interval(period);
        check.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                changed = samples.changed() => {
                    if changed.is_err() {
                        info!("telemetry poller gone; decision task stopping");
                        return;
                    }
                    let latest = *samples.borrow_and_update();
                    if let Some(sample) = latest {
                        self.on_sample(sample).await;
                    }
                }
                action = operators.recv() => match action {
                    Some(action) => self.on_operator(action).await,
                    None => {
                        info!("operator handle dropped; decision task stopping");
                        return;
                    }
                },
                _ = check.tick() => self.on_watchdog_tick(),
            }
        }
    }

    async fn on_sample(&mut self, sample: TelemetrySample) {
        if self.watchdog.feed() == LinkTransition::Restored {
            info!("telemetry link restored");
            self.publish(Topic::Alerts, EventPayload::LinkRestored);
        }

        let report = self.core.tick(&sample);
        let step = report.step;
        self.status.send_modify(|board| {
            board.record_sample(&sample, Utc::now());
            board.set_counters(report.verdicts.rule_counter, report.verdicts.anomaly_counter);
            board.set_fault(step.to, step.reason);
        });
        self.publish(Topic::Telemetry, EventPayload::Telemetry(sample));

        if step.changed() {
            info!(from = %step.from, to = %step.to, "fault state changed");
            self.publish(
                Topic::Alerts,
                EventPayload::FaultStateChanged {
                    from: step.from,
                    to: step.to,
                    reason: step.reason,
                },
            );
        }
        if let Some(command) = step.command
            && !self.dispatch(command).await
            && let Some(rolled_back) = self.core.command_failed(command)
        {
            let reason = self.core.reason();
            self.status
                .send_modify(|board| board.set_fault(rolled_back, reason));
            self.publish(
                Topic::Alerts,
                EventPayload::FaultStateChanged {
                    from: step.to,
                    to: rolled_back,
                    reason,
                },
            );
        }
    }

    async fn on_operator(&mut self, action: OperatorAction) {
        let (previous, command) = match action {
            OperatorAction::InjectFault => self.core.inject_fault(),
            OperatorAction::Reset => self.core.reset(),
        };
        info!(?action, %previous, "operator action");

        self.status
            .send_modify(|board| board.set_fault(FaultState::Normal, None));
        if previous != FaultState::Normal {
            self.publish(
                Topic::Alerts,
                EventPayload::FaultStateChanged {
                    from: previous,
                    to: FaultState::Normal,
                    reason: None,
                },
            );
        }
        self.dispatch(command).await;
    }

    fn on_watchdog_tick(&mut self) {
        if self.watchdog.check() == LinkTransition::Lost {
            warn!(
                timeout_ms = self.watchdog.timeout().as_millis() as u64,
                "telemetry link lost"
            );
            self.status.send_modify(StatusBoard::mark_offline);
            self.publish(Topic::Alerts, EventPayload::LinkLost);
        }
    }

    /// Send `command` to the vehicle.  Returns `false` if it was not
    /// delivered.
    async fn dispatch(&self, command: Command) -> bool {
        match self.sink.send(command).await {
            Ok(()) => {
                info!(kind = ?command.kind, value1 = command.value1, "command dispatched");
                self.status.send_modify(|board| board.commands_sent += 1);
                self.publish(Topic::Commands, EventPayload::CommandIssued(command));
                true
            }
            Err(e) => {
                warn!(error = %e, kind = ?command.kind, "command dispatch failed");
                false
            }
        }
    }

    fn publish(&self, topic: Topic, payload: EventPayload) {
        if let Err(e) = self.bus.publish_to(topic, Event::new(ENGINE_SOURCE, payload)) {
            debug!(error = %e, "event not published");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neurodrive_middleware::MemorySink;
    use neurodrive_types::CommandKind;
    use std::net::UdpSocket;

    struct Harness {
        handle: EngineHandle,
        sink: Arc<MemorySink>,
        vehicle: UdpSocket,
        target: SocketAddr,
    }

    impl Harness {
        fn start(config: EngineConfig) -> Self {
            let telemetry = TelemetryChannel::bind("127.0.0.1:0").unwrap();
            let target = telemetry.local_addr().unwrap();
            let sink = Arc::new(MemorySink::new());
            let engine = Engine::from_parts(config, telemetry, sink.clone() as Arc<dyn CommandSink>);
            Self {
                handle: engine.spawn(),
                sink,
                vehicle: UdpSocket::bind("127.0.0.1:0").unwrap(),
                target,
            }
        }

        async fn send(&self, json: &str, times: usize) {
            for _ in 0..times {
                self.vehicle.send_to(json.as_bytes(), self.target).unwrap();
                tokio::time::sleep(Duration::from_millis(25)).await;
            }
        }

        fn decisions(&self) -> Vec<Command> {
            self.sink
                .commands()
                .into_iter()
                .filter(|c| c.kind != CommandKind::Drive)
                .collect()
        }

        async fn wait_for<F>(&self, pred: F) -> StatusBoard
        where
            F: FnMut(&StatusBoard) -> bool,
        {
            let mut rx = self.handle.watch_status();
            let result = tokio::time::timeout(Duration::from_secs(3), rx.wait_for(pred)).await;
            let board = result.expect("status condition not reached in time").unwrap();
            board.clone()
        }
    }

    #[tokio::test]
    async fn heals_and_recovers_over_udp() {
        let h = Harness::start(EngineConfig::default());

        h.send(r#"{"speed": 25.0, "vibration": 0.02, "status": "OK"}"#, 3).await;
        h.send(r#"{"speed": 0.2, "vibration": 0.06, "status": "OK"}"#, 8).await;
        h.wait_for(|b| b.commands_sent >= 1).await;
        assert_eq!(h.decisions(), vec![Command::heal()]);

        h.send(
            r#"{"speed": 12.0, "vibration": 0.02, "status": "HEALED (VIRTUAL_SENSOR)"}"#,
            5,
        )
        .await;
        h.wait_for(|b| b.state == FaultState::Recovering).await;
        assert_eq!(h.decisions(), vec![Command::heal()]);

        h.send(r#"{"speed": 12.0, "vibration": 0.02, "status": "OK"}"#, 5).await;
        let board = h.wait_for(|b| b.commands_sent >= 2).await;

        assert_eq!(h.decisions(), vec![Command::heal(), Command::clear_faults()]);
        assert_eq!(board.state, FaultState::Normal);
        assert_eq!(board.alert, crate::status::ALERT_NORMAL);
        h.handle.shutdown().await;
    }

    #[tokio::test]
    async fn publishes_fault_transitions_on_alerts() {
        let h = Harness::start(EngineConfig::default());
        let mut alerts = h.handle.subscribe(Topic::Alerts);

        h.send(r#"{"speed": 0.5, "vibration": 0.09}"#, 6).await;

        let mut saw_confirmed = false;
        while let Ok(Ok(event)) =
            tokio::time::timeout(Duration::from_millis(500), alerts.recv()).await
        {
            if let EventPayload::FaultStateChanged {
                to: FaultState::Confirmed,
                reason,
                ..
            } = event.payload
            {
                assert!(reason.is_some());
                saw_confirmed = true;
                break;
            }
        }
        assert!(saw_confirmed);
    }

    #[tokio::test]
    async fn silent_link_goes_offline_once() {
        let config = EngineConfig {
            link_timeout_ms: 80,
            ..EngineConfig::default()
        };
        let h = Harness::start(config);
        let mut alerts = h.handle.subscribe(Topic::Alerts);

        h.send(r#"{"speed": 10.0, "vibration": 0.01}"#, 1).await;
        h.wait_for(|b| b.link_up).await;
        let board = h.wait_for(|b| !b.link_up).await;
        assert_eq!(board.alert, crate::status::ALERT_OFFLINE);

        let mut lost = 0;
        while let Ok(Ok(event)) =
            tokio::time::timeout(Duration::from_millis(300), alerts.recv()).await
        {
            if matches!(event.payload, EventPayload::LinkLost) {
                lost += 1;
            }
        }
        assert_eq!(lost, 1);

        h.send(r#"{"speed": 10.0, "vibration": 0.01}"#, 1).await;
        let board = h.wait_for(|b| b.link_up).await;
        assert_eq!(board.alert, crate::status::ALERT_NORMAL);
    }

    #[tokio::test]
    async fn operator_actions_send_fault_commands() {
        let h = Harness::start(EngineConfig::default());
        h.handle.inject_fault().await.unwrap();
        h.handle.reset().await.unwrap();
        h.wait_for(|b| b.commands_sent >= 2).await;
        assert_eq!(
            h.decisions(),
            vec![Command::inject_fault(), Command::clear_faults()]
        );
    }

    #[tokio::test]
    async fn control_loop_resends_clamped_setpoint() {
        let h = Harness::start(EngineConfig::default());
        let applied = h.handle.drive(2.0, -0.5);
        assert_eq!(applied, DriveSetpoint { throttle: 1.0, steer: -0.5 });

        tokio::time::sleep(Duration::from_millis(200)).await;
        let drives: Vec<_> = h
            .sink
            .commands()
            .into_iter()
            .filter(|c| c.kind == CommandKind::Drive)
            .collect();
        assert!(drives.len() >= 3, "only {} drive commands", drives.len());
        assert_eq!(drives.last(), Some(&Command::drive(1.0, -0.5)));

        h.handle.stop();
        assert_eq!(h.handle.setpoint(), DriveSetpoint::default());
    }

    #[tokio::test]
    async fn failing_sink_does_not_stall_decisions() {
        let telemetry = TelemetryChannel::bind("127.0.0.1:0").unwrap();
        let target = telemetry.local_addr().unwrap();
        let engine = Engine::from_parts(
            EngineConfig::default(),
            telemetry,
            Arc::new(MemorySink::failing()),
        );
        let handle = engine.spawn();
        let vehicle = UdpSocket::bind("127.0.0.1:0").unwrap();

        for _ in 0..6 {
            vehicle
                .send_to(br#"{"speed": 0.2, "vibration": 0.09}"#, target)
                .unwrap();
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        let mut rx = handle.watch_status();
        let board = tokio::time::timeout(
            Duration::from_secs(3),
            rx.wait_for(|b| b.rule_counter >= 5 && b.state == FaultState::Suspected),
        )
        .await
        .unwrap()
        .unwrap()
        .clone();
        // Every HEAL was lost, so the episode is never latched.
        assert_eq!(board.commands_sent, 0);
        assert_eq!(board.state, FaultState::Suspected);
        assert!(!board.is_critical());
    }

    #[tokio::test]
    async fn undelivered_heal_is_sent_again() {
        let config = EngineConfig {
            control_interval_ms: 60_000,
            ..EngineConfig::default()
        };
        let telemetry = TelemetryChannel::bind("127.0.0.1:0").unwrap();
        let target = telemetry.local_addr().unwrap();
        // At most the first DRIVE and the first HEAL are lost.
        let sink = Arc::new(MemorySink::failing_first(2));
        let engine = Engine::from_parts(config, telemetry, sink.clone() as Arc<dyn CommandSink>);
        let handle = engine.spawn();
        let mut alerts = handle.subscribe(Topic::Alerts);
        let vehicle = UdpSocket::bind("127.0.0.1:0").unwrap();

        for _ in 0..12 {
            vehicle
                .send_to(br#"{"speed": 0.2, "vibration": 0.09}"#, target)
                .unwrap();
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        let mut rx = handle.watch_status();
        tokio::time::timeout(Duration::from_secs(3), rx.wait_for(|b| b.commands_sent >= 1))
            .await
            .unwrap()
            .unwrap();

        let heals: Vec<_> = sink
            .commands()
            .into_iter()
            .filter(|c| c.kind != CommandKind::Drive)
            .collect();
        assert_eq!(heals, vec![Command::heal()]);

        let mut rolled_back = false;
        while let Ok(Ok(event)) =
            tokio::time::timeout(Duration::from_millis(200), alerts.recv()).await
        {
            if let EventPayload::FaultStateChanged {
                from: FaultState::Confirmed,
                to: FaultState::Suspected,
                ..
            } = event.payload
            {
                rolled_back = true;
            }
        }
        assert!(rolled_back);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn poller_keeps_only_the_newest_sample() {
        let channel = TelemetryChannel::bind("127.0.0.1:0").unwrap();
        let target = channel.local_addr().unwrap();
        let (tx, mut rx) = watch::channel(None);
        let poller = tokio::spawn(poll_telemetry(channel, tx, Duration::from_millis(5)));
        let vehicle = UdpSocket::bind("127.0.0.1:0").unwrap();

        for speed in 1..=5 {
            let packet = format!(r#"{{"speed": {speed}.0, "vibration": 0.02}}"#);
            vehicle.send_to(packet.as_bytes(), target).unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        tokio::time::timeout(Duration::from_secs(1), rx.changed())
            .await
            .unwrap()
            .unwrap();
        let latest = (*rx.borrow_and_update()).expect("a sample");
        assert_eq!(latest.speed, 5.0);
        assert!(!rx.has_changed().unwrap());

        drop(rx);
        tokio::time::timeout(Duration::from_secs(1), poller)
            .await
            .expect("poller stops once the reader is gone")
            .unwrap();
    }

    #[tokio::test]
    async fn calibration_trains_detector() {
        let config = EngineConfig {
            calibration_secs: 1,
            ..EngineConfig::default()
        };
        let telemetry = TelemetryChannel::bind("127.0.0.1:0").unwrap();
        let target = telemetry.local_addr().unwrap();
        let mut engine =
            Engine::from_parts(config, telemetry, Arc::new(MemorySink::new()));

        let feeder = tokio::spawn(async move {
            let vehicle = UdpSocket::bind("127.0.0.1:0").unwrap();
            for i in 0..40 {
                let packet = format!(r#"{{"speed": {}, "vibration": 0.02}}"#, 20.0 + i as f32 * 0.1);
                vehicle.send_to(packet.as_bytes(), target).unwrap();
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        });

        let set = engine.calibrate(|_| {}).await;
        feeder.await.unwrap();
        assert!(set.real_samples() >= 5);
        assert!(engine.core().is_trained());
        assert!(engine.spawn().status().model_trained);
    }

    #[test]
    fn setpoint_is_clamped() {
        assert_eq!(
            DriveSetpoint::new(-3.0, 0.25),
            DriveSetpoint { throttle: -1.0, steer: 0.25 }
        );
    }
}
