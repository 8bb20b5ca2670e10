// src/comm/telemetry.rs - Temperature report parsing (M105 style lines)
use serde::Serialize;
use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Actual and target temperature of one heater.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Reading {
    pub actual: Option<f64>,
    pub target: Option<f64>,
}

impl Reading {
    pub fn new(actual: f64, target: Option<f64>) -> Self {
        Self {
            actual: Some(actual),
            target,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TelemetrySample {
    pub tools: Vec<Reading>,
    pub bed: Option<Reading>,
}

const FLOAT: &str = r"[-+]?[0-9]*\.?[0-9]+";
const JUNK: &str = r"(?:\s+.*?\s*)?";

static TEMPERATURE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    let group = |name: &str, target: &str, label: &str| {
        format!(r"(?:{JUNK}\s*{label}:\s*(?P<{name}>{FLOAT})(?:\s*/(?P<{target}>{FLOAT}))?)?")
    };
    let pattern = format!(
        r"^(?:ok)?\s*T:\s*(?P<T>{FLOAT})(?:\s*/(?P<TT>{FLOAT}))?{bed}{tool0}{tool1}{JUNK}$",
        bed = group("B", "TB", "B"),
        tool0 = group("T0", "TT0", "T0"),
        tool1 = group("T1", "TT1", "T1"),
    );
    Regex::new(&pattern).expect("temperature line pattern is valid")
});

/// Parses a temperature report such as `ok T:210.0 /210.0 B:60.1 /60.0`.
///
/// Returns `None` for anything that is not a temperature report, including reports with a
/// malformed number. `T0` overrides the plain `T` reading for tool 0; tool 1 and the bed are
/// only included when they report a nonzero temperature.
pub fn parse_temperature_line(line: &str) -> Option<TelemetrySample> {
    let caps = TEMPERATURE_LINE.captures(line.trim())?;

    let tool0_actual = number(&caps, &["T0", "T"])?;
    let tool0_target = number(&caps, &["TT0", "TT"])?;
    let mut tools = vec![Reading {
        actual: tool0_actual,
        target: tool0_target,
    }];

    let tool1_actual = number(&caps, &["T1"])?;
    let tool1_target = number(&caps, &["TT1"])?;
    if is_reported(tool1_actual) {
        tools.push(Reading {
            actual: tool1_actual,
            target: tool1_target,
        });
    }

    let bed_actual = number(&caps, &["B"])?;
    let bed_target = number(&caps, &["TB"])?;
    let bed = is_reported(bed_actual).then_some(Reading {
        actual: bed_actual,
        target: bed_target,
    });

    Some(TelemetrySample { tools, bed })
}

/// First present group among `names`, parsed. The outer `None` means the text did not parse.
fn number(caps: &Captures<'_>, names: &[&str]) -> Option<Option<f64>> {
    match names.iter().find_map(|name| caps.name(name)) {
        Some(m) => m.as_str().parse::<f64>().ok().map(Some),
        None => Some(None),
    }
}

fn is_reported(value: Option<f64>) -> bool {
    value.is_some_and(|v| v != 0.0)
}
