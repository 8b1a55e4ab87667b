// Physical-link path against the virtual controller

use std::sync::Arc;

use thermo_device::{DeviceHandle, FirmwareConfig, LineFault, VirtualBench, VirtualController};
use thermo_rs::config::Config;
use thermo_rs::hardware::temperature::SetpointDelta;
use thermo_rs::hardware::{LinkError, LinkKind};
use thermo_rs::simulator::NoJitter;
use thermo_rs::sink::{ChannelSink, SinkEvent};
use thermo_rs::{ControlLoop, LoopState, ProcessStatus, TickOutcome};
use tokio::sync::mpsc;
use tokio_test::assert_ok;

const PORT: &str = "/dev/ttyVIRT0";

fn bench_loop(config: Config) -> (ControlLoop, DeviceHandle, mpsc::UnboundedReceiver<SinkEvent>) {
    let mut bench = VirtualBench::new();
    let device = bench.plug(PORT, VirtualController::new(FirmwareConfig::default()));
    let (sink, events) = ChannelSink::channel();
    let control = ControlLoop::new(&config, Box::new(bench), Box::new(NoJitter), Arc::new(sink));
    (control, device, events)
}

/// Connected, with the first read (which may start mid-line) already spent.
async fn connected() -> (ControlLoop, DeviceHandle, mpsc::UnboundedReceiver<SinkEvent>) {
    let (mut control, device, events) = bench_loop(Config::default());
    assert_eq!(
        assert_ok!(control.request_connect(PORT).await),
        LinkKind::Connected(PORT.to_string())
    );
    let first = sample(&mut control).await;
    assert_eq!(first.measured, 20.0);
    assert_eq!(control.link_stats().frames_decoded, 0);
    (control, device, events)
}

async fn sample(control: &mut ControlLoop) -> thermo_rs::history::Sample {
    match control.tick().await {
        TickOutcome::Sampled(sample) => sample,
        other => panic!("expected a sample, got {:?}", other),
    }
}

#[tokio::test]
async fn test_device_telemetry_fills_history() {
    let (mut control, _device, _events) = connected().await;
    for _ in 0..3 {
        sample(&mut control).await;
    }

    let snapshot = control.snapshot();
    assert_eq!(snapshot.connection_label, "Connected: /dev/ttyVIRT0");
    assert_eq!(snapshot.measured.len(), 4);
    assert_eq!(snapshot.measured[1], 20.04);
    assert!(snapshot.measured[3] > snapshot.measured[1]);
    assert_eq!(snapshot.status, Some(ProcessStatus::Heating));
    assert_eq!(control.link_stats().frames_decoded, 3);
}

#[tokio::test]
async fn test_operator_setpoint_reaches_device() {
    let (mut control, device, _events) = connected().await;
    assert_eq!(control.request_setpoint_delta(SetpointDelta::PlusHalf).await, 25.5);
    assert_eq!(device.received_setpoints(), vec![25.5]);
    assert_eq!(device.setpoint(), 25.5);

    // Device echoes the same setpoint; nothing changes and nothing is re-sent
    let s = sample(&mut control).await;
    assert_eq!(s.setpoint, 25.5);
    assert_eq!(control.link_stats().commands_sent, 1);
}

#[tokio::test]
async fn test_absolute_setpoint_travels_with_one_decimal() {
    let (mut control, device, _events) = connected().await;
    assert_ok!(control.request_setpoint_absolute(22.74).await);
    assert_eq!(device.received_setpoints(), vec![22.7]);

    // The device now reports 22.70, which is more than 0.01 away
    let s = sample(&mut control).await;
    assert_eq!(s.setpoint, 22.7);
    assert_eq!(control.state().target, 22.7);
}

#[tokio::test]
async fn test_local_change_on_device_is_adopted_without_echo() {
    let (mut control, device, _events) = connected().await;
    device.press_setpoint(1.0);

    let s = sample(&mut control).await;
    assert_eq!(s.setpoint, 26.0);
    assert_eq!(control.state().target, 26.0);
    assert!(device.received_setpoints().is_empty());
    assert_eq!(control.link_stats().commands_sent, 0);
}

#[tokio::test]
async fn test_legacy_frames_skip_reconciliation() {
    let (mut control, device, _events) = connected().await;
    device.set_legacy_output(true);
    device.press_setpoint(-2.0);

    let s = sample(&mut control).await;
    assert_eq!(s.measured, 20.04);
    assert_eq!(s.setpoint, 25.0);
    assert_eq!(control.state().target, 25.0);
}

#[tokio::test]
async fn test_only_last_complete_line_counts() {
    let (mut control, device, _events) = connected().await;
    device.inject(b"21.00;25.00\n22.00;25.00\n23.0");
    assert_eq!(sample(&mut control).await.measured, 22.0);

    // The held-back fragment completes with the next read
    device.inject(b"0;25.00\n");
    assert_eq!(sample(&mut control).await.measured, 23.0);
}

#[tokio::test]
async fn test_first_read_drops_line_cut_by_open() {
    let (mut control, device, _events) = bench_loop(Config::default());
    control.request_connect(PORT).await.unwrap();
    // Tail of "25.00;25.00" followed by a whole line
    device.inject(b"5.00;25.00\n21.30;25.00\n");
    assert_eq!(sample(&mut control).await.measured, 21.3);

    control.request_connect(PORT).await.unwrap();
    device.inject(b"5.00;30.00\n");
    let s = sample(&mut control).await;
    assert_eq!(s.measured, 20.0);
    assert_eq!(s.setpoint, 25.0);
}

#[tokio::test]
async fn test_garbage_carries_previous_value_forward() {
    let (mut control, device, _events) = connected().await;
    device.inject(b"21.50;25.00\n");
    sample(&mut control).await;

    device.inject(b"garbage\n");
    let s = sample(&mut control).await;
    assert_eq!(s.measured, 21.5);
    assert_eq!(control.link_stats().decode_failures, 1);
    assert_eq!(control.loop_state(), LoopState::Active);
}

#[tokio::test(start_paused = true)]
async fn test_read_timeout_carries_forward() {
    let (mut control, device, _events) = connected().await;
    device.inject(b"24.00;25.00\n");
    sample(&mut control).await;

    device.set_fault(LineFault::Silent);
    for _ in 0..5 {
        assert_eq!(sample(&mut control).await.measured, 24.0);
    }
    assert_eq!(control.link_stats().timeouts, 5);
    assert_eq!(control.loop_state(), LoopState::Active);
}

#[tokio::test(start_paused = true)]
async fn test_sustained_silence_escalates_when_configured() {
    let mut config = Config::default();
    config.link.max_consecutive_misses = Some(3);
    let (mut control, device, mut events) = bench_loop(config);
    control.request_connect(PORT).await.unwrap();
    device.set_fault(LineFault::Silent);

    sample(&mut control).await;
    sample(&mut control).await;
    assert_eq!(control.tick().await, TickOutcome::LinkLost(LinkError::Stalled(3)));
    assert_eq!(control.loop_state(), LoopState::Idle);

    let mut saw_error = false;
    while let Ok(event) = events.try_recv() {
        if let SinkEvent::LinkError(LinkError::Stalled(3)) = event {
            saw_error = true;
        }
    }
    assert!(saw_error);
}

#[tokio::test]
async fn test_broken_link_drops_to_idle() {
    let (mut control, device, mut events) = connected().await;
    sample(&mut control).await;
    while events.try_recv().is_ok() {}

    device.set_fault(LineFault::Broken);
    assert!(matches!(control.tick().await, TickOutcome::LinkLost(LinkError::Read(_))));
    assert_eq!(control.loop_state(), LoopState::Idle);
    assert!(control.history().is_empty());

    assert!(matches!(events.try_recv(), Ok(SinkEvent::LinkError(LinkError::Read(_)))));
    let Ok(SinkEvent::Snapshot(after)) = events.try_recv() else {
        panic!("disconnect must publish");
    };
    assert_eq!(after.connection_label, "Disconnected");
    assert!(after.times.is_empty());

    // Idle from here on
    assert_eq!(control.tick().await, TickOutcome::Idle);
}

#[tokio::test]
async fn test_write_failure_is_not_fatal() {
    let (mut control, device, _events) = connected().await;
    device.set_fault(LineFault::Broken);
    assert_eq!(control.request_setpoint_delta(SetpointDelta::PlusTenth).await, 25.1);
    assert_eq!(control.link_stats().write_errors, 1);
    assert_eq!(control.loop_state(), LoopState::Active);
}

#[tokio::test]
async fn test_refused_open_changes_nothing() {
    let (mut control, device, mut events) = bench_loop(Config::default());
    device.refuse_open(true);

    let err = control.request_connect(PORT).await.unwrap_err();
    assert!(matches!(err, LinkError::OpenFailed { .. }));
    assert_eq!(control.loop_state(), LoopState::Idle);
    assert_eq!(control.state().target, 25.0);
    assert!(control.history().is_empty());
    assert!(matches!(events.try_recv(), Ok(SinkEvent::LinkError(LinkError::OpenFailed { .. }))));
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_ports_list_ends_with_simulation() {
    let (control, _device, _events) = bench_loop(Config::default());
    assert_eq!(control.available_ports(), vec![PORT.to_string(), "Simulation".to_string()]);
}
