//! Integration tests for probe, configuration and removal.

mod common;

use common::{Bench, PARENT, settle};
use fpsense_core::{DeviceId, Error, OpenMode};
use fpsense_fpc1020::constants::{
    CMD_WAIT_FOR_FINGER, REG_ADC_SHIFT_GAIN, REG_FINGER_DETECT_THRESHOLD, REG_HWID,
};
use fpsense_fpc1020::{ChipConfig, ChipPhase};

#[tokio::test(start_paused = true)]
async fn test_probe_registers_armed_device() {
    let (driver, rig) = common::probed().await;

    assert_eq!(driver.phase(), ChipPhase::Armed);
    assert_eq!(driver.chip_type().unwrap().to_string(), "FPC120A");
    assert_eq!(driver.last_command(), CMD_WAIT_FOR_FINGER);
    assert_eq!(rig.chip.commands(), vec![CMD_WAIT_FOR_FINGER]);
    assert_eq!(rig.power.enabled_supplies(), vec!["vcc", "vdda", "vddio"]);

    let device = driver.device();
    assert_eq!(device.id(), DeviceId::new(0));
    assert_eq!(device.node_name(), "fp0");
    assert_eq!(device.attribute("name").as_deref(), Some("fpc1020\n"));
    assert_eq!(device.attribute("width").as_deref(), Some("192\n"));
    assert_eq!(device.attribute("height").as_deref(), Some("56\n"));
    assert_eq!(device.parent(), Some(PARENT));
    assert_eq!(device.frame_size(), 10752);
    assert_eq!(rig.registry.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_ready_timeout_fails_probe() {
    let bench = Bench::new();
    bench.chip.set_respond_to_reset(false);

    let (result, rig) = bench.probe(ChipConfig::default()).await;

    assert!(matches!(result, Err(Error::Timeout { duration_ms: 1300 })));
    assert!(rig.registry.is_empty());
    assert!(!rig.power.supplies_enabled());
    assert_eq!(rig.power.disable_count(), 1);
    assert!(rig.chip.commands().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_configuration_applied_in_order() {
    let bench = Bench::new();
    bench.chip.set_register(REG_ADC_SHIFT_GAIN, &0xabcd_u16.to_be_bytes());
    let config = ChipConfig {
        adc_shift: Some(0x10),
        adc_gain: Some(0x5),
        det_threshold: Some(0x40),
    };

    let (result, rig) = bench.probe(config).await;
    let _driver = result.unwrap();

    assert_eq!(
        rig.chip.register_writes(),
        vec![
            (REG_ADC_SHIFT_GAIN, vec![0x10, 0xcd]),
            (REG_ADC_SHIFT_GAIN, vec![0x10, 0x85]),
            (REG_FINGER_DETECT_THRESHOLD, vec![0x40]),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_out_of_range_configuration_never_powers_on() {
    let config = ChipConfig {
        adc_gain: Some(16),
        ..ChipConfig::default()
    };

    let (result, rig) = Bench::new().probe(config).await;

    assert!(matches!(result, Err(Error::InvalidConfiguration(_))));
    assert_eq!(rig.power.enable_count(), 0);
    assert!(rig.registry.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_configuration_transport_failure_aborts_probe() {
    let bench = Bench::new();
    bench.chip.fail_register(REG_ADC_SHIFT_GAIN);
    let config = ChipConfig {
        adc_shift: Some(3),
        ..ChipConfig::default()
    };

    let (result, rig) = bench.probe(config).await;

    match result {
        Err(Error::TransportFailure { context, .. }) => assert_eq!(context, "register 0xa0"),
        other => panic!("expected transport failure, got {:?}", other.map(|_| ())),
    }
    assert!(rig.registry.is_empty());
    assert!(!rig.power.supplies_enabled());
}

#[tokio::test(start_paused = true)]
async fn test_hardware_id_failure_aborts_probe() {
    let bench = Bench::new();
    bench.chip.fail_register(REG_HWID);

    let (result, rig) = bench.probe(ChipConfig::default()).await;

    assert!(matches!(result, Err(Error::TransportFailure { .. })));
    assert!(rig.registry.is_empty());
    assert_eq!(rig.power.disable_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_arming_failure_unregisters_device() {
    let bench = Bench::new();
    bench.chip.fail_command(CMD_WAIT_FOR_FINGER);

    let (result, rig) = bench.probe(ChipConfig::default()).await;

    assert!(matches!(result, Err(Error::TransportFailure { .. })));
    assert!(rig.registry.is_empty());
    assert!(matches!(
        rig.registry.open(DeviceId::new(0), OpenMode::Blocking),
        Err(Error::NotFound(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_supply_failure_aborts_probe() {
    let bench = Bench::new();
    bench.power.fail_enable(true);

    let (result, rig) = bench.probe(ChipConfig::default()).await;

    assert!(matches!(result, Err(Error::TransportFailure { .. })));
    assert_eq!(rig.power.disable_count(), 0);
    assert!(rig.registry.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_remove_unregisters_and_powers_down() {
    let (driver, rig) = common::probed().await;
    let id = driver.device().id();
    let device = driver.device().clone();

    driver.remove().await;

    assert!(!device.is_registered());
    assert!(rig.registry.is_empty());
    assert!(!rig.power.supplies_enabled());
    assert!(matches!(
        rig.registry.open(id, OpenMode::Blocking),
        Err(Error::NotFound(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_drop_releases_identity() {
    let (driver, rig) = common::probed().await;
    drop(driver);
    assert!(rig.registry.is_empty());

    let (second, _rig) = Bench::with_registry(rig.registry.clone())
        .probe(ChipConfig::default())
        .await;
    assert_eq!(second.unwrap().device().id(), DeviceId::new(0));
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_probe_releases_device() {
    let bench = Bench::new();
    bench.chip.stall_command(CMD_WAIT_FOR_FINGER);
    let registry = bench.registry.clone();
    let power = bench.power.clone();

    let probe = tokio::spawn(async move {
        let (result, _rig) = bench.probe(ChipConfig::default()).await;
        result.map(|_| ())
    });

    settle().await;
    assert_eq!(registry.len(), 1);
    assert!(power.supplies_enabled());

    probe.abort();
    assert!(probe.await.unwrap_err().is_cancelled());

    assert!(registry.is_empty());
    assert!(matches!(
        registry.open(DeviceId::new(0), OpenMode::Blocking),
        Err(Error::NotFound(_))
    ));
    assert_eq!(registry.allocate_identity().unwrap(), DeviceId::new(0));
}
