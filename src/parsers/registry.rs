//! Declarative catalog of the metrics extracted from `Stats` record lines.
//!
//! Each [`MetricDefinition`] is one pattern searched anywhere in a record
//! line plus the outputs fed from its named capture groups. Families that
//! repeat per controller or per heater are generated from a template, once
//! per configured instance name, so adding a metric or an instance is a data
//! change and never a new branch in the extractor.

use regex::{Captures, Regex};
use serde::Serialize;
use strum::AsRefStr;
use thiserror::Error;

use crate::state::{DEFAULT_CONTROLLERS, DEFAULT_HEATERS, DEFAULT_SENTINEL, MAIN_CONTROLLER};
use crate::units::Unit;

/// Number as firmware prints it: optional sign, digits, optional fraction.
/// ASCII digits only, so every match parses as `f64`.
const NUM: &str = r"-?[0-9]+(?:\.[0-9]+)?";

/// Unsigned integer counter
const INT: &str = r"[0-9]+";

/// Any run of `key=value` tokens. Never crosses a `name:` group label.
const SKIP: &str = r"(?:\w+=\S+ )*?";

/// Errors building a registry
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Duplicate metric key: {0}")]
    DuplicateKey(String),

    #[error("Invalid instance name: {0:?}")]
    InvalidInstance(String),

    #[error("Invalid pattern for family '{family}': {source}")]
    Pattern {
        family: String,
        #[source]
        source: regex::Error,
    },
}

/// How a definition relates to the rest of the line
#[derive(AsRefStr, Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MetricShape {
    /// One pattern feeding several keys from a shared match
    Simple,
    /// Generated once per configured instance name
    Instance,
    /// Single pattern, single key
    Scalar,
    /// Single key that co-occurs with any other group on the line
    CrossCutting,
}

/// Capture-values to output-value conversion
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Transform {
    Identity(&'static str),
    Multiply(&'static str, f64),
    Divide(&'static str, f64),
    /// Sum of several captures, then divided
    SumDivide(&'static [&'static str], f64),
}

impl Transform {
    /// Apply to a match. `Ok(None)` when a referenced group did not
    /// participate in the match; `Err` carries text that failed to parse.
    pub fn apply(&self, caps: &Captures) -> Result<Option<f64>, String> {
        match *self {
            Transform::Identity(group) => capture_number(caps, group),
            Transform::Multiply(group, factor) => {
                Ok(capture_number(caps, group)?.map(|v| v * factor))
            }
            Transform::Divide(group, divisor) => {
                Ok(capture_number(caps, group)?.map(|v| v / divisor))
            }
            Transform::SumDivide(groups, divisor) => {
                let mut sum = 0.0;
                for group in groups {
                    match capture_number(caps, group)? {
                        Some(v) => sum += v,
                        None => return Ok(None),
                    }
                }
                Ok(Some(sum / divisor))
            }
        }
    }
}

fn capture_number(caps: &Captures, group: &str) -> Result<Option<f64>, String> {
    match caps.name(group) {
        Some(m) => m
            .as_str()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| m.as_str().to_string()),
        None => Ok(None),
    }
}

/// One output series fed by a definition
#[derive(Clone, Debug)]
pub struct Output {
    pub key: String,
    pub label: String,
    pub unit: Unit,
    pub transform: Transform,
}

/// A pattern and the outputs it feeds
#[derive(Clone, Debug)]
pub struct MetricDefinition {
    pub family: String,
    pub shape: MetricShape,
    pub pattern: Regex,
    pub outputs: Vec<Output>,
    /// Appended to every output when the pattern does not match
    pub sentinel: f64,
}

impl MetricDefinition {
    pub fn new(
        family: impl Into<String>,
        shape: MetricShape,
        pattern: &str,
        outputs: Vec<Output>,
        sentinel: f64,
    ) -> Result<Self, RegistryError> {
        let family = family.into();
        let pattern = Regex::new(pattern).map_err(|source| RegistryError::Pattern {
            family: family.clone(),
            source,
        })?;
        Ok(Self {
            family,
            shape,
            pattern,
            outputs,
            sentinel,
        })
    }
}

/// Instance names the templated families expand over
#[derive(Clone, Debug, PartialEq)]
pub struct RegistryConfig {
    /// Auxiliary controller boards (toolheads, CAN boards)
    pub controllers: Vec<String>,
    /// Heaters reporting target/temp/pwm
    pub heaters: Vec<String>,
    pub sentinel: f64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            controllers: DEFAULT_CONTROLLERS.iter().map(|s| s.to_string()).collect(),
            heaters: DEFAULT_HEATERS.iter().map(|s| s.to_string()).collect(),
            sentinel: DEFAULT_SENTINEL,
        }
    }
}

struct FieldSpec {
    suffix: &'static str,
    label: &'static str,
    unit: Unit,
    transform: Transform,
}

const CONTROLLER_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        suffix: "load",
        label: "Load",
        unit: Unit::Score,
        transform: Transform::Multiply("task_avg", 100_000.0),
    },
    FieldSpec {
        suffix: "bandwidth",
        label: "Bandwidth",
        unit: Unit::Kilobytes,
        transform: Transform::SumDivide(&["bytes_write", "bytes_read"], 1024.0),
    },
    FieldSpec {
        suffix: "awake_time",
        label: "Awake Time",
        unit: Unit::Percent,
        transform: Transform::Multiply("awake", 100.0),
    },
    FieldSpec {
        suffix: "bytes_write",
        label: "Bytes Written",
        unit: Unit::Count,
        transform: Transform::Identity("bytes_write"),
    },
    FieldSpec {
        suffix: "bytes_read",
        label: "Bytes Read",
        unit: Unit::Count,
        transform: Transform::Identity("bytes_read"),
    },
    FieldSpec {
        suffix: "bytes_retransmit",
        label: "Bytes Retransmitted",
        unit: Unit::Count,
        transform: Transform::Identity("bytes_retransmit"),
    },
    FieldSpec {
        suffix: "send_seq",
        label: "Send Sequence",
        unit: Unit::Count,
        transform: Transform::Identity("send_seq"),
    },
    FieldSpec {
        suffix: "receive_seq",
        label: "Receive Sequence",
        unit: Unit::Count,
        transform: Transform::Identity("receive_seq"),
    },
    FieldSpec {
        suffix: "srtt",
        label: "Smoothed RTT",
        unit: Unit::Milliseconds,
        transform: Transform::Multiply("srtt", 1000.0),
    },
    FieldSpec {
        suffix: "rttvar",
        label: "RTT Variance",
        unit: Unit::Milliseconds,
        transform: Transform::Multiply("rttvar", 1000.0),
    },
    FieldSpec {
        suffix: "rto",
        label: "Retransmit Timeout",
        unit: Unit::Milliseconds,
        transform: Transform::Multiply("rto", 1000.0),
    },
];

const HEATER_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        suffix: "target",
        label: "Target",
        unit: Unit::Celsius,
        transform: Transform::Identity("target"),
    },
    FieldSpec {
        suffix: "temp",
        label: "Temperature",
        unit: Unit::Celsius,
        transform: Transform::Identity("temp"),
    },
    FieldSpec {
        suffix: "pwm",
        label: "PWM",
        unit: Unit::Percent,
        transform: Transform::Multiply("pwm", 100.0),
    },
];

/// (family/key, label, pattern key token, unit, transform)
const SCALARS: &[(&str, &str, &str, Unit, Transform)] = &[
    ("sysload", "System Load", "sysload", Unit::None, Transform::Identity("value")),
    ("cputime", "CPU Time", "cputime", Unit::Seconds, Transform::Identity("value")),
    ("memavail", "Available Memory", "memavail", Unit::Megabytes, Transform::Divide("value", 1024.0)),
    ("print_time", "Print Time", "print_time", Unit::Seconds, Transform::Identity("value")),
    ("print_stall", "Print Stalls", "print_stall", Unit::Count, Transform::Identity("value")),
];

/// Key naming for controller outputs. The main controller keeps the
/// historical bare names (`bandwidth`, `srtt`) except for its load.
fn controller_key(instance: &str, suffix: &str) -> String {
    if instance == MAIN_CONTROLLER {
        match suffix {
            "load" => format!("{}_load", MAIN_CONTROLLER),
            _ => suffix.to_string(),
        }
    } else {
        format!("{}_{}", instance, suffix)
    }
}

fn controller_pattern(instance: &str) -> String {
    format!(
        r"\b{name}: mcu_awake=(?P<awake>{NUM}) mcu_task_avg=(?P<task_avg>{NUM}) mcu_task_stddev=(?P<task_stddev>{NUM}) bytes_write=(?P<bytes_write>{INT}) bytes_read=(?P<bytes_read>{INT}) bytes_retransmit=(?P<bytes_retransmit>{INT}) {SKIP}send_seq=(?P<send_seq>{INT}) receive_seq=(?P<receive_seq>{INT}) {SKIP}srtt=(?P<srtt>{NUM}) rttvar=(?P<rttvar>{NUM}) rto=(?P<rto>{NUM})",
        name = regex::escape(instance),
    )
}

fn frequency_pattern(instance: &str) -> String {
    format!(r"\b{name}: {SKIP}freq=(?P<freq>{INT})", name = regex::escape(instance))
}

fn heater_pattern(heater: &str) -> String {
    format!(
        r"\b{name}: target=(?P<target>{NUM}) temp=(?P<temp>{NUM}) pwm=(?P<pwm>{NUM})",
        name = regex::escape(heater),
    )
}

fn outputs(fields: &[FieldSpec], key: impl Fn(&str) -> String, prefix: &str) -> Vec<Output> {
    fields
        .iter()
        .map(|f| Output {
            key: key(f.suffix),
            label: format!("{} {}", prefix, f.label),
            unit: f.unit,
            transform: f.transform,
        })
        .collect()
}

fn validate_instance(name: &str) -> Result<(), RegistryError> {
    let valid = !name.is_empty()
        && name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(RegistryError::InvalidInstance(name.to_string()))
    }
}

/// Ordered set of metric definitions with unique output keys
#[derive(Clone, Debug, Default)]
pub struct Registry {
    definitions: Vec<MetricDefinition>,
    keys: Vec<String>,
}

impl Registry {
    /// Registry with no definitions; populate with [`Registry::push`]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build the full catalog for the given instance names
    pub fn new(config: &RegistryConfig) -> Result<Self, RegistryError> {
        let mut registry = Self::empty();
        let sentinel = config.sentinel;

        let main = MAIN_CONTROLLER;
        registry.push(MetricDefinition::new(
            main,
            MetricShape::Simple,
            &controller_pattern(main),
            outputs(CONTROLLER_FIELDS, |s| controller_key(main, s), "MCU"),
            sentinel,
        )?)?;
        registry.push(MetricDefinition::new(
            format!("{}_freq", main),
            MetricShape::Simple,
            &frequency_pattern(main),
            vec![frequency_output(main)],
            sentinel,
        )?)?;

        for instance in &config.controllers {
            validate_instance(instance)?;
            registry.push(MetricDefinition::new(
                instance.as_str(),
                MetricShape::Instance,
                &controller_pattern(instance),
                outputs(CONTROLLER_FIELDS, |s| controller_key(instance, s), instance),
                sentinel,
            )?)?;
            registry.push(MetricDefinition::new(
                format!("{}_freq", instance),
                MetricShape::Instance,
                &frequency_pattern(instance),
                vec![frequency_output(instance)],
                sentinel,
            )?)?;
        }

        for heater in &config.heaters {
            validate_instance(heater)?;
            registry.push(MetricDefinition::new(
                heater.as_str(),
                MetricShape::Instance,
                &heater_pattern(heater),
                outputs(HEATER_FIELDS, |s| format!("{}_{}", heater, s), heater),
                sentinel,
            )?)?;
        }

        for (key, label, token, unit, transform) in SCALARS {
            registry.push(MetricDefinition::new(
                *key,
                MetricShape::Scalar,
                &format!(r"\b{}=(?P<value>{NUM})", token),
                vec![Output {
                    key: key.to_string(),
                    label: label.to_string(),
                    unit: *unit,
                    transform: *transform,
                }],
                sentinel,
            )?)?;
        }

        registry.push(MetricDefinition::new(
            "buffer_time",
            MetricShape::CrossCutting,
            &format!(r"\bbuffer_time=(?P<value>{NUM})"),
            vec![Output {
                key: "host_buffer".to_string(),
                label: "Host Buffer".to_string(),
                unit: Unit::Seconds,
                transform: Transform::Identity("value"),
            }],
            sentinel,
        )?)?;

        tracing::debug!(
            "Built metric registry: {} definitions, {} keys",
            registry.definitions.len(),
            registry.keys.len()
        );

        Ok(registry)
    }

    /// Append a definition; its keys go after every existing key
    pub fn push(&mut self, definition: MetricDefinition) -> Result<(), RegistryError> {
        for (i, output) in definition.outputs.iter().enumerate() {
            let seen_earlier = definition.outputs[..i].iter().any(|o| o.key == output.key);
            if seen_earlier || self.keys.contains(&output.key) {
                return Err(RegistryError::DuplicateKey(output.key.clone()));
            }
        }
        self.keys
            .extend(definition.outputs.iter().map(|o| o.key.clone()));
        self.definitions.push(definition);
        Ok(())
    }

    pub fn definitions(&self) -> &[MetricDefinition] {
        &self.definitions
    }

    /// Every output key, in declaration order
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn output(&self, key: &str) -> Option<&Output> {
        self.definition(key)
            .and_then(|d| d.outputs.iter().find(|o| o.key == key))
    }

    /// The definition feeding `key`
    pub fn definition(&self, key: &str) -> Option<&MetricDefinition> {
        self.definitions
            .iter()
            .find(|d| d.outputs.iter().any(|o| o.key == key))
    }

    /// Keys of one family, e.g. every `toolhead0_*` key
    pub fn family_keys(&self, family: &str) -> Vec<&str> {
        self.definitions
            .iter()
            .filter(|d| d.family == family)
            .flat_map(|d| d.outputs.iter().map(|o| o.key.as_str()))
            .collect()
    }
}

fn frequency_output(instance: &str) -> Output {
    Output {
        key: format!("{}_freq", instance),
        label: format!("{} Frequency", instance),
        unit: Unit::Megahertz,
        transform: Transform::Divide("freq", 1_000_000.0),
    }
}

/// The default catalog. Patterns are fixed, so building cannot fail.
pub fn default_registry() -> Registry {
    Registry::new(&RegistryConfig::default()).expect("Failed to build default metric registry")
}
