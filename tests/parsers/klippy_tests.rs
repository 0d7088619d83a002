//! Tests for the Klipper log reader
//!
//! Tests cover:
//! - Record counting and the rectangularity of every series
//! - Controller and host literal scenarios
//! - Sentinel fill and instance isolation
//! - Decode robustness, determinism and sharded parsing
//! - Fatal error reporting

use crate::common::*;
use klippylog::parsers::{
    default_registry, Klippy, MetricDefinition, MetricShape, Output, ParseError, Parseable,
    Registry, Transform,
};
use klippylog::units::Unit;

fn parse_lines(lines: &[&str]) -> klippylog::parsers::TimeSeriesTable {
    let file = write_log(lines);
    Klippy::default()
        .parse_file(file.path())
        .unwrap_or_else(|e| panic!("Should parse: {}", e))
}

// ============================================
// Record Counting Tests
// ============================================

#[test]
fn test_every_series_matches_record_count() {
    let table = parse_lines(&[
        "Starting Klippy...",
        MCU_LINE,
        "Sending MCU 'mcu' printer configuration...",
        HOST_LINE,
        "",
        "   ",
        "Stats oops: sysload=1.0",
        FULL_LINE,
        "Stats 1600.0: buffer_time=0.5",
    ]);

    assert_eq!(table.len(), 4);
    assert_eq!(table.timestamps(), &[10.5, 11.0, 1520.3, 1600.0]);
    assert!(table.is_rectangular());
    for (key, series) in table.iter() {
        assert_eq!(series.values().len(), 4, "series {} length", key);
        assert_eq!(series.present().len(), 4, "presence {} length", key);
    }
    assert_eq!(table.keys(), default_registry().keys());
}

#[test]
fn test_timestamps_kept_in_file_order() {
    let table = parse_lines(&["Stats 5.0: x=1", "Stats 2.0: x=1", "Stats 9.5: x=1"]);
    assert_eq!(table.timestamps(), &[5.0, 2.0, 9.5]);
}

#[test]
fn test_empty_input_is_not_an_error() {
    let table = parse_lines(&["Starting Klippy...", "Config error", ""]);
    assert!(table.is_empty());
    assert_eq!(table.keys().len(), default_registry().keys().len());
    assert!(table.iter().all(|(_, s)| s.is_empty()));

    let table = Klippy::default()
        .parse_file(write_log_bytes(b"").path())
        .unwrap();
    assert!(table.is_empty());
}

// ============================================
// Literal Scenario Tests
// ============================================

#[test]
fn test_main_controller_scenario() {
    let table = parse_lines(&[MCU_LINE]);
    let at = |key: &str| table.series(key).unwrap()[0];

    assert_eq!(table.timestamps(), &[10.5]);
    assert_close(at("mcu_load"), 20.0, "load");
    assert_close(at("bandwidth"), 150.0 / 1024.0, "bandwidth");
    assert!((at("bandwidth") - 0.1465).abs() < 1e-4);
    assert_close(at("awake_time"), 5.0, "awake time");
    assert_close(at("srtt"), 10.0, "srtt");
    assert_close(at("rttvar"), 2.0, "rttvar");
    assert_close(at("rto"), 50.0, "rto");
    assert_eq!(at("bytes_write"), 100.0);
    assert_eq!(at("bytes_read"), 50.0);
    assert_eq!(at("bytes_retransmit"), 0.0);
    assert_eq!(at("send_seq"), 1.0);
    assert_eq!(at("receive_seq"), 1.0);

    // Reported zero is distinguishable from an absent value
    assert_eq!(table.presence("bytes_retransmit").unwrap(), &[true]);
    assert_eq!(table.presence("sysload").unwrap(), &[false]);
}

#[test]
fn test_host_only_scenario() {
    let registry = default_registry();
    let table = parse_lines(&[HOST_LINE]);

    assert_eq!(table.series("sysload").unwrap(), &[0.40]);
    assert_eq!(table.series("memavail").unwrap(), &[2.0]);

    let controller_keys = registry
        .family_keys("mcu")
        .into_iter()
        .chain(registry.family_keys("mcu_freq"))
        .chain(registry.family_keys("toolhead0"))
        .chain(registry.family_keys("toolhead1"));
    for key in controller_keys {
        assert_eq!(table.series(key).unwrap(), &[0.0], "{} should be sentinel", key);
        assert_eq!(table.presence(key).unwrap(), &[false]);
    }
}

#[test]
fn test_full_multi_board_line() {
    let table = parse_lines(&[FULL_LINE]);
    let at = |key: &str| table.series(key).unwrap()[0];

    assert_close(at("mcu_load"), 1.7, "mcu load");
    assert_close(at("bandwidth"), (38211.0 + 97045.0) / 1024.0, "bandwidth");
    assert_close(at("mcu_freq"), 180.000012, "mcu freq");
    assert_eq!(at("bytes_retransmit"), 9.0);
    assert_eq!(at("send_seq"), 4001.0);
    assert_close(at("rto"), 25.0, "rto");

    assert_close(at("toolhead0_load"), 3.1, "toolhead0 load");
    assert_close(at("toolhead0_awake_time"), 1.8, "toolhead0 awake");
    assert_close(at("toolhead0_freq"), 64.0, "toolhead0 freq");
    assert_close(at("toolhead1_load"), 9.0, "toolhead1 load");
    assert_eq!(at("toolhead1_receive_seq"), 898.0);
    assert_close(at("toolhead1_bandwidth"), 12.0, "toolhead1 bandwidth");

    assert_eq!(at("heater_bed_target"), 60.0);
    assert_eq!(at("heater_bed_temp"), 59.8);
    assert_close(at("heater_bed_pwm"), 41.2, "bed pwm");
    assert_eq!(at("extruder_target"), 215.0);
    assert_close(at("extruder_pwm"), 53.3, "extruder pwm");
    assert_eq!(table.presence("extruder1_temp").unwrap(), &[false]);

    assert_eq!(at("sysload"), 0.62);
    assert_eq!(at("cputime"), 312.551);
    assert_close(at("memavail"), 1603456.0 / 1024.0, "memavail");
    assert_eq!(at("print_time"), 1733.402);
    assert_eq!(at("host_buffer"), 1.954);
    assert_eq!(at("print_stall"), 0.0);
    assert_eq!(table.presence("print_stall").unwrap(), &[true]);
}

// ============================================
// Sentinel and Isolation Tests
// ============================================

#[test]
fn test_sentinel_per_family() {
    let table = parse_lines(&[
        MCU_LINE,
        "Stats 12.0: buffer_time=0.75 sysload=0.2",
        MCU_LINE,
    ]);

    assert_eq!(table.series("mcu_load").unwrap()[1], 0.0);
    assert_eq!(table.presence("mcu_load").unwrap(), &[true, false, true]);
    assert_eq!(table.series("host_buffer").unwrap(), &[0.0, 0.75, 0.0]);
    assert_eq!(table.series("sysload").unwrap(), &[0.0, 0.2, 0.0]);
}

#[test]
fn test_instances_do_not_cross_contaminate() {
    let line = "Stats 5.0: toolhead1: mcu_awake=0.5 mcu_task_avg=0.001 mcu_task_stddev=0.0001 bytes_write=2048 bytes_read=0 bytes_retransmit=7 send_seq=3 receive_seq=3 srtt=0.1 rttvar=0.01 rto=0.2 toolhead0: mcu_awake=0.25 mcu_task_avg=0.002 mcu_task_stddev=0.0001 bytes_write=1024 bytes_read=1024 bytes_retransmit=1 send_seq=9 receive_seq=8 srtt=0.3 rttvar=0.02 rto=0.4";
    let table = parse_lines(&[line]);
    let at = |key: &str| table.series(key).unwrap()[0];

    assert_close(at("toolhead0_awake_time"), 25.0, "toolhead0 awake");
    assert_close(at("toolhead1_awake_time"), 50.0, "toolhead1 awake");
    assert_close(at("toolhead0_load"), 200.0, "toolhead0 load");
    assert_close(at("toolhead1_load"), 100.0, "toolhead1 load");
    assert_close(at("toolhead0_bandwidth"), 2.0, "toolhead0 bandwidth");
    assert_close(at("toolhead1_bandwidth"), 2.0, "toolhead1 bandwidth");
    assert_eq!(at("toolhead0_bytes_retransmit"), 1.0);
    assert_eq!(at("toolhead1_bytes_retransmit"), 7.0);
    assert_close(at("toolhead0_rto"), 400.0, "toolhead0 rto");
    assert_close(at("toolhead1_rto"), 200.0, "toolhead1 rto");

    // The main controller is absent even though `mcu_awake=` appears twice
    assert_eq!(table.presence("mcu_load").unwrap(), &[false]);
}

// ============================================
// Robustness Tests
// ============================================

#[test]
fn test_invalid_utf8_is_tolerated() {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"\xff\xfe\x00binary junk\n");
    bytes.extend_from_slice(b"Stats 1.0: sysload=0.5 \xe2\x28\xa1\n");
    bytes.extend_from_slice(b"Stats 2.0: sysload=0.6\r\n");
    let file = write_log_bytes(&bytes);

    let table = Klippy::default().parse_file(file.path()).unwrap();
    assert_eq!(table.timestamps(), &[1.0, 2.0]);
    assert_eq!(table.series("sysload").unwrap(), &[0.5, 0.6]);
}

#[test]
fn test_last_line_without_newline() {
    let file = write_log_bytes(b"Stats 1.0: sysload=0.5\nStats 2.0: sysload=0.6");
    let table = Klippy::default().parse_file(file.path()).unwrap();
    assert_eq!(table.series("sysload").unwrap(), &[0.5, 0.6]);
}

#[test]
fn test_parsing_is_deterministic() {
    let file = write_log(&[MCU_LINE, HOST_LINE, FULL_LINE]);
    let parser = Klippy::default();
    let first = parser.parse_file(file.path()).unwrap();
    let second = parser.parse_file(file.path()).unwrap();

    assert_eq!(first.timestamps(), second.timestamps());
    for ((ka, a), (kb, b)) in first.iter().zip(second.iter()) {
        assert_eq!(ka, kb);
        let bits_a: Vec<u64> = a.values().iter().map(|v| v.to_bits()).collect();
        let bits_b: Vec<u64> = b.values().iter().map(|v| v.to_bits()).collect();
        assert_eq!(bits_a, bits_b, "series {}", ka);
    }
}

#[test]
fn test_parallel_file_parse_matches_sequential() {
    let mut lines = Vec::new();
    for i in 0..200 {
        lines.push(match i % 4 {
            0 => MCU_LINE,
            1 => HOST_LINE,
            2 => FULL_LINE,
            _ => "Sending MCU 'toolhead0' printer configuration...",
        });
    }
    let file = write_log(&lines);
    let parser = Klippy::default();

    let sequential = parser.parse_file(file.path()).unwrap();
    assert_eq!(sequential.len(), 150);
    for shards in [1, 2, 3, 7, 16] {
        let parallel = parser.parse_file_parallel(file.path(), shards).unwrap();
        assert_eq!(parallel, sequential, "shards = {}", shards);
        assert!(parallel.is_rectangular());
    }
}

// ============================================
// Error Handling Tests
// ============================================

#[test]
fn test_missing_file_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("klippy.log");

    let err = Klippy::default().parse_file(&path).unwrap_err();
    assert!(matches!(err, ParseError::Open { .. }));
    assert!(err.to_string().contains("klippy.log"));

    let err = Klippy::default().parse_file_parallel(&path, 4).unwrap_err();
    assert!(matches!(err, ParseError::Open { .. }));
}

#[test]
fn test_bad_capture_aborts_whole_parse() {
    let mut registry = Registry::empty();
    registry
        .push(
            MetricDefinition::new(
                "loose",
                MetricShape::Scalar,
                r"\bloose=(?P<value>\S+)",
                vec![Output {
                    key: "loose".to_string(),
                    label: "Loose".to_string(),
                    unit: Unit::None,
                    transform: Transform::Identity("value"),
                }],
                0.0,
            )
            .unwrap(),
        )
        .unwrap();

    let log = "Stats 1.0: loose=1.5\nnoise\nStats 2.0: loose=n/a\nStats 3.0: loose=2\n";
    let err = Klippy::new(registry).parse(log).unwrap_err();
    match err {
        ParseError::InvalidNumber { line, key, value } => {
            assert_eq!(line, 3);
            assert_eq!(key, "loose");
            assert_eq!(value, "n/a");
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_non_ascii_digits_fall_back_to_sentinel() {
    let log = "Stats 1.0: sysload=0.5\nStats 2.0: sysload=\u{661}\u{662} memavail=2048\nStats 3.0: sysload=0.7\n";
    let table = Klippy::default()
        .parse(log)
        .unwrap_or_else(|e| panic!("Should parse: {}", e));

    assert_eq!(table.len(), 3);
    assert!(table.is_rectangular());
    assert_eq!(table.series("sysload").unwrap(), &[0.5, 0.0, 0.7]);
    assert_eq!(table.presence("sysload").unwrap(), &[true, false, true]);
    assert_eq!(table.series("memavail").unwrap(), &[0.0, 2.0, 0.0]);
}

#[test]
fn test_only_decimal_timestamps_start_records() {
    let table = parse_lines(&[
        "Stats 42: sysload=1.0",
        "Stats -3.5: sysload=1.0",
        "Stats 1e3: sysload=1.0",
        "Stats .5: sysload=1.0",
        "Stats 10.5: sysload=2.0",
    ]);

    assert_eq!(table.timestamps(), &[10.5]);
    assert_eq!(table.series("sysload").unwrap(), &[2.0]);
}

#[test]
fn test_custom_sentinel() {
    let config = klippylog::parsers::RegistryConfig {
        sentinel: f64::NAN,
        ..Default::default()
    };
    let parser = Klippy::new(Registry::new(&config).unwrap());
    let table = parser.parse(HOST_LINE).unwrap();

    assert!(table.series("mcu_load").unwrap()[0].is_nan());
    assert_eq!(table.series("sysload").unwrap(), &[0.40]);
}
