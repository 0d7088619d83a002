//! Tests for the metric registry as seen through a parse
//!
//! Tests cover:
//! - Instance configuration changes the key set, not the extractor
//! - Adding a metric is a data change
//! - Selection never requires a re-parse

use crate::common::*;
use klippylog::parsers::{
    Klippy, MetricDefinition, MetricShape, Output, Parseable, Registry, RegistryConfig,
    RegistryError, Transform,
};
use klippylog::units::Unit;

#[test]
fn test_configured_instances_define_keys() {
    let config = RegistryConfig {
        controllers: vec!["EBBCan".to_string()],
        heaters: vec!["extruder".to_string()],
        ..RegistryConfig::default()
    };
    let registry = Registry::new(&config).unwrap();
    assert!(registry.output("EBBCan_load").is_some());
    assert!(registry.output("toolhead0_load").is_none());
    assert!(registry.output("heater_bed_temp").is_none());

    let line = "Stats 3.0: EBBCan: mcu_awake=0.020 mcu_task_avg=0.000040 mcu_task_stddev=0.000010 bytes_write=512 bytes_read=1536 bytes_retransmit=0 bytes_invalid=0 send_seq=10 receive_seq=10 retransmit_seq=0 srtt=0.001 rttvar=0.000 rto=0.025 freq=64000000";
    let table = Klippy::new(registry).parse(line).unwrap();
    assert_close(table.series("EBBCan_load").unwrap()[0], 4.0, "EBBCan load");
    assert_close(table.series("EBBCan_bandwidth").unwrap()[0], 2.0, "EBBCan bandwidth");
    assert_close(table.series("EBBCan_freq").unwrap()[0], 64.0, "EBBCan freq");
    assert!(table.is_rectangular());
}

#[test]
fn test_main_controller_name_cannot_be_reused() {
    let config = RegistryConfig {
        controllers: vec!["mcu".to_string()],
        ..RegistryConfig::default()
    };
    assert!(matches!(
        Registry::new(&config),
        Err(RegistryError::DuplicateKey(_))
    ));
}

#[test]
fn test_added_metric_is_extracted() {
    let mut registry = Registry::new(&RegistryConfig::default()).unwrap();
    registry
        .push(
            MetricDefinition::new(
                "gcodein",
                MetricShape::Scalar,
                r"\bgcodein=(?P<value>\d+)",
                vec![Output {
                    key: "gcodein".to_string(),
                    label: "G-Code Input".to_string(),
                    unit: Unit::Count,
                    transform: Transform::Divide("value", 1024.0),
                }],
                0.0,
            )
            .unwrap(),
        )
        .unwrap();
    assert_eq!(registry.keys().last().map(String::as_str), Some("gcodein"));

    let table = Klippy::new(registry)
        .parse("Stats 1.0: gcodein=2048\nStats 2.0: sysload=0.1\n")
        .unwrap();
    assert_eq!(table.series("gcodein").unwrap(), &[2.0, 0.0]);
}

#[test]
fn test_invalid_pattern_is_reported() {
    let result = MetricDefinition::new("broken", MetricShape::Scalar, r"(?P<value", vec![], 0.0);
    assert!(matches!(result, Err(RegistryError::Pattern { .. })));
}

#[test]
fn test_select_subset_without_reparse() {
    let file = write_log(&[MCU_LINE, HOST_LINE]);
    let table = Klippy::default().parse_file(file.path()).unwrap();

    let chart = table.select(&["mcu_load", "bandwidth", "host_buffer", "awake_time"]);
    assert_eq!(chart.len(), table.len());
    assert_eq!(chart.keys().len(), 4);
    assert_eq!(chart.series("mcu_load"), table.series("mcu_load"));
    assert!(chart.is_rectangular());
    assert_eq!(table.relative_minutes(), vec![0.0, 0.5 / 60.0]);
}
