//! Stream reader behaviour against the scripted SDK and the simulator.

use daq_readers::mock::{ScriptedSdk, ScriptedSdkHandle};
use daq_readers::stream::{
    ChannelBurst, ConnectionParams, SdkReply, SimulatedSdk, SimulationConfig, StreamChannelReader,
    TrialConfig, Units,
};
use daq_readers::{DaqDevice, DaqError, SessionState};
use std::time::Duration;
use tracing_test::traced_test;

fn scripted(
    channels: &[u32],
    samples_per_read: usize,
    units: Units,
) -> (StreamChannelReader<ScriptedSdk>, ScriptedSdkHandle) {
    let sdk = ScriptedSdk::new();
    let handle = sdk.handle();
    let reader = StreamChannelReader::new(sdk, channels.iter().copied(), samples_per_read, units)
        .unwrap()
        .with_poll_interval(Duration::ZERO)
        .with_read_timeout(Duration::from_secs(2));
    (reader, handle)
}

fn poll(bursts: Vec<ChannelBurst>) -> SdkReply<Vec<ChannelBurst>> {
    SdkReply::ok(bursts)
}

#[test]
fn test_accumulates_polls_without_gaps() {
    let (mut reader, handle) = scripted(&[2, 5], 7, Units::Raw);
    handle.push_poll(poll(vec![
        ChannelBurst::new(2, vec![1, 2, 3]),
        ChannelBurst::new(5, vec![10, 20, 30]),
    ]));
    handle.push_poll(poll(vec![
        ChannelBurst::new(5, vec![40, 50, 60, 70]),
        ChannelBurst::new(2, vec![4, 5, 6, 7]),
    ]));
    reader.start().unwrap();

    let data = reader.read().unwrap();

    assert_eq!(data.shape(), (2, 7));
    assert_eq!(data.row(0), Some(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0][..]));
    assert_eq!(
        data.row(1),
        Some(&[10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0][..])
    );
    assert_eq!(handle.poll_calls(), 2);
}

#[test]
fn test_rows_follow_channel_id_order() {
    let (mut reader, handle) = scripted(&[9, 3, 3], 1, Units::Raw);
    assert_eq!(reader.channels(), &[3, 9]);
    handle.push_poll(poll(vec![
        ChannelBurst::new(9, vec![90]),
        ChannelBurst::new(1, vec![10]),
        ChannelBurst::new(3, vec![30]),
    ]));
    reader.start().unwrap();

    let data = reader.read().unwrap();
    assert_eq!(data.shape(), (2, 1));
    assert_eq!(data.get(0, 0), Some(30.0));
    assert_eq!(data.get(1, 0), Some(90.0));
}

#[test]
fn test_excess_samples_start_the_next_read() {
    let (mut reader, handle) = scripted(&[1], 3, Units::Raw);
    handle.push_poll(poll(vec![ChannelBurst::new(1, vec![1, 2, 3, 4, 5])]));
    handle.push_poll(poll(vec![ChannelBurst::new(1, vec![6])]));
    reader.start().unwrap();

    assert_eq!(reader.read().unwrap().row(0), Some(&[1.0, 2.0, 3.0][..]));
    assert_eq!(reader.read().unwrap().row(0), Some(&[4.0, 5.0, 6.0][..]));
}

#[test]
fn test_failed_poll_is_retried() {
    let (mut reader, handle) = scripted(&[1], 2, Units::Raw);
    let rejected = vec![ChannelBurst::new(1, vec![99, 99])];
    handle.push_poll(SdkReply::failed(-3, rejected));
    handle.push_poll(poll(vec![ChannelBurst::new(1, vec![1, 2])]));
    reader.start().unwrap();

    assert_eq!(reader.read().unwrap().row(0), Some(&[1.0, 2.0][..]));
    assert_eq!(handle.poll_calls(), 2);
}

#[test]
#[traced_test]
fn test_missing_channel_is_zero_filled() {
    let (mut reader, handle) = scripted(&[1, 2], 2, Units::Raw);
    handle.push_poll(poll(vec![ChannelBurst::new(1, vec![5, 6])]));
    reader.start().unwrap();

    let data = reader.read().unwrap();
    assert_eq!(data.row(0), Some(&[5.0, 6.0][..]));
    assert_eq!(data.row(1), Some(&[0.0, 0.0][..]));
    assert!(logs_contain("Channel missing from poll"));
}

#[test]
fn test_read_times_out_when_no_data_arrives() {
    let sdk = ScriptedSdk::new();
    let mut reader = StreamChannelReader::new(sdk, [1], 4, Units::Raw)
        .unwrap()
        .with_poll_interval(Duration::from_millis(1))
        .with_read_timeout(Duration::from_millis(20));
    reader.start().unwrap();

    let err = reader.read().unwrap_err();
    assert!(matches!(err, DaqError::DeviceTimeout { .. }));
    assert_eq!(reader.state(), SessionState::Open);
}

#[test]
fn test_cancel_interrupts_read_once() {
    let (mut reader, handle) = scripted(&[1], 1, Units::Raw);
    reader.start().unwrap();
    let cancel = reader.cancel_handle().unwrap();

    cancel.cancel();
    assert!(matches!(reader.read(), Err(DaqError::Cancelled)));

    handle.push_poll(poll(vec![ChannelBurst::new(1, vec![3])]));
    assert_eq!(reader.read().unwrap().get(0, 0), Some(3.0));
}

#[test]
fn test_start_records_connection_and_trial_config() {
    let sdk = ScriptedSdk::new();
    let handle = sdk.handle();
    let params = ConnectionParams {
        connection: "central".to_string(),
        instance: 1,
    };
    let mut reader = StreamChannelReader::new(sdk, [1], 1, Units::Raw)
        .unwrap()
        .with_connection_params(params.clone());

    assert_eq!(reader.state(), SessionState::Closed);
    assert_eq!(handle.open_calls(), 0);

    reader.start().unwrap();
    assert_eq!(reader.state(), SessionState::Open);
    assert_eq!(handle.last_connection_params(), Some(params));
    assert_eq!(handle.last_trial_config(), Some(TrialConfig::continuous()));
    assert_eq!(
        reader.connection_info().map(|i| i.connection.as_str()),
        Some("central")
    );

    reader.start().unwrap();
    assert_eq!(handle.open_calls(), 1);
    assert_eq!(handle.config_calls(), 1);
}

#[test]
fn test_open_failure_faults_until_reset() {
    let (mut reader, handle) = scripted(&[1], 1, Units::Raw);
    handle.push_open_status(-1);

    assert!(matches!(reader.start(), Err(DaqError::Connection(_))));
    assert_eq!(reader.state(), SessionState::Faulted);

    assert!(matches!(reader.start(), Err(DaqError::Connection(_))));
    assert_eq!(handle.open_calls(), 1);

    assert!(matches!(reader.read(), Err(DaqError::SessionClosed(_))));

    reader.stop().unwrap();
    assert_eq!(handle.close_calls(), 0);

    reader.reset().unwrap();
    assert_eq!(reader.state(), SessionState::Open);
    assert_eq!(handle.open_calls(), 2);
}

#[test]
fn test_trial_config_failure_keeps_connection() {
    let (mut reader, handle) = scripted(&[1], 1, Units::Raw);
    handle.push_config_status(-5);

    assert!(matches!(reader.start(), Err(DaqError::Configuration(_))));
    assert_eq!(reader.state(), SessionState::Closed);

    reader.start().unwrap();
    assert_eq!(handle.open_calls(), 1);
    assert_eq!(handle.config_calls(), 2);
}

#[test]
fn test_close_failure_is_reported() {
    let (mut reader, handle) = scripted(&[1], 1, Units::Raw);
    reader.start().unwrap();
    handle.push_close_status(-7);

    assert!(matches!(reader.stop(), Err(DaqError::Connection(_))));
    assert_eq!(reader.state(), SessionState::Closed);

    reader.stop().unwrap();
    assert_eq!(handle.close_calls(), 1);
}

#[test]
fn test_stop_discards_carry() {
    let (mut reader, handle) = scripted(&[1], 2, Units::Raw);
    handle.push_poll(poll(vec![ChannelBurst::new(1, vec![1, 2, 3, 4])]));
    reader.start().unwrap();
    reader.read().unwrap();

    reader.stop().unwrap();
    reader.start().unwrap();
    handle.push_poll(poll(vec![ChannelBurst::new(1, vec![7, 8])]));
    assert_eq!(reader.read().unwrap().row(0), Some(&[7.0, 8.0][..]));
}

#[test]
fn test_drop_closes_connection() {
    let (mut reader, handle) = scripted(&[1], 1, Units::Raw);
    reader.start().unwrap();
    drop(reader);
    assert_eq!(handle.close_calls(), 1);
}

#[test]
fn test_simulated_server_delivers_full_reads() {
    let sdk = SimulatedSdk::new(SimulationConfig {
        channel_count: 8,
        seed: Some(11),
        burst_min: 0,
        burst_max: 16,
        ..Default::default()
    });
    let mut reader = StreamChannelReader::new(sdk, [8, 2, 4], 50, Units::Microvolts)
        .unwrap()
        .with_poll_interval(Duration::ZERO);
    reader.start().unwrap();

    for _ in 0..3 {
        let data = reader.read().unwrap();
        assert_eq!(data.shape(), (3, 50));
        assert!(data.as_slice().iter().all(|v| v.is_finite()));
    }
    reader.stop().unwrap();
}
