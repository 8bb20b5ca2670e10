// src/comm/control.rs - G-code for manual printer control (jog, home, heaters, rates)
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::config::ProfileConfig;

#[derive(Debug, Error, PartialEq)]
pub enum ControlError {
    #[error("Invalid axis '{0}', expected one of x, y, z, e")]
    InvalidAxis(String),
    #[error("No axes given")]
    NoAxes,
    #[error("Amount must be a finite number, got {0}")]
    InvalidAmount(f64),
    #[error("Invalid tool '{0}', expected tool<n>")]
    InvalidTool(String),
    #[error("Invalid heater '{0}', expected tool<n> or bed")]
    InvalidHeater(String),
    #[error("Temperature must be a number >= 0, got {0}")]
    InvalidTemperature(f64),
    #[error("{name} must be between {min}% and {max}%, got {percent}%")]
    RateOutOfRange {
        name: &'static str,
        percent: u32,
        min: u32,
        max: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
    E,
}

impl Axis {
    pub fn letter(self) -> char {
        match self {
            Axis::X => 'X',
            Axis::Y => 'Y',
            Axis::Z => 'Z',
            Axis::E => 'E',
        }
    }

    /// Feed rate for moves along this axis, in mm/min.
    pub fn speed(self, profile: &ProfileConfig) -> u32 {
        match self {
            Axis::X => profile.x_speed,
            Axis::Y => profile.y_speed,
            Axis::Z => profile.z_speed,
            Axis::E => profile.e_speed,
        }
    }
}

impl FromStr for Axis {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "x" => Ok(Axis::X),
            "y" => Ok(Axis::Y),
            "z" => Ok(Axis::Z),
            "e" => Ok(Axis::E),
            _ => Err(ControlError::InvalidAxis(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Heater {
    Tool(u32),
    Bed,
}

static TOOL_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^tool(\d+)$").expect("tool pattern compiles"));

fn tool_index(name: &str) -> Option<u32> {
    TOOL_NAME
        .captures(name)
        .and_then(|caps| caps.get(1))
        .and_then(|index| index.as_str().parse().ok())
}

impl FromStr for Heater {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "bed" {
            return Ok(Heater::Bed);
        }
        tool_index(s)
            .map(Heater::Tool)
            .ok_or_else(|| ControlError::InvalidHeater(s.to_string()))
    }
}

const FEED_RATE_RANGE: (u32, u32) = (50, 200);
const FLOW_RATE_RANGE: (u32, u32) = (75, 125);

fn finite(amount: f64) -> Result<f64, ControlError> {
    if amount.is_finite() {
        Ok(amount)
    } else {
        Err(ControlError::InvalidAmount(amount))
    }
}

/// Wraps moves in relative positioning, restoring absolute afterwards.
fn relative(line: String) -> Vec<String> {
    vec!["G91".to_string(), line, "G90".to_string()]
}

pub fn jog(profile: &ProfileConfig, axis: &str, amount: f64) -> Result<Vec<String>, ControlError> {
    let axis: Axis = axis.parse()?;
    let amount = finite(amount)?;
    Ok(relative(format!(
        "G1 {}{:.4} F{}",
        axis.letter(),
        amount,
        axis.speed(profile)
    )))
}

pub fn home(axes: &[&str]) -> Result<Vec<String>, ControlError> {
    if axes.is_empty() {
        return Err(ControlError::NoAxes);
    }
    let axes = axes
        .iter()
        .map(|a| a.parse::<Axis>().map(|axis| format!("{}0", axis.letter())))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(relative(format!("G28 {}", axes.join(" "))))
}

pub fn extrude(profile: &ProfileConfig, amount: f64) -> Result<Vec<String>, ControlError> {
    let amount = finite(amount)?;
    Ok(relative(format!("G1 E{} F{}", amount, profile.e_speed)))
}

pub fn change_tool(tool: &str) -> Result<String, ControlError> {
    tool_index(tool)
        .map(|index| format!("T{index}"))
        .ok_or_else(|| ControlError::InvalidTool(tool.to_string()))
}

/// `M104` for a tool, `M140` for the bed. The tool index is only sent on multi-extruder printers.
pub fn set_temperature(
    profile: &ProfileConfig,
    heater: &str,
    value: f64,
) -> Result<String, ControlError> {
    let heater: Heater = heater.parse()?;
    if !value.is_finite() || value < 0.0 {
        return Err(ControlError::InvalidTemperature(value));
    }
    Ok(match heater {
        Heater::Tool(index) if profile.extruder_count > 1 => format!("M104 T{index} S{value}"),
        Heater::Tool(_) => format!("M104 S{value}"),
        Heater::Bed => format!("M140 S{value}"),
    })
}

fn rate(
    name: &'static str,
    command: &str,
    percent: u32,
    (min, max): (u32, u32),
) -> Result<String, ControlError> {
    if !(min..=max).contains(&percent) {
        return Err(ControlError::RateOutOfRange {
            name,
            percent,
            min,
            max,
        });
    }
    Ok(format!("{command} S{percent}"))
}

/// Speed override in percent (`M220`).
pub fn feed_rate(percent: u32) -> Result<String, ControlError> {
    rate("Feed rate", "M220", percent, FEED_RATE_RANGE)
}

/// Extrusion multiplier in percent (`M221`).
pub fn flow_rate(percent: u32) -> Result<String, ControlError> {
    rate("Flow rate", "M221", percent, FLOW_RATE_RANGE)
}

/// Converts a factor such as `0.9` to a whole percentage.
pub fn factor_to_percent(factor: f64) -> Option<u32> {
    let percent = (factor * 100.0).trunc();
    (0.0..=u32::MAX as f64)
        .contains(&percent)
        .then_some(percent as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jog_uses_relative_moves_and_axis_speed() {
        let profile = ProfileConfig::default();
        assert_eq!(
            jog(&profile, "x", 10.0).unwrap(),
            vec!["G91", "G1 X10.0000 F6000", "G90"]
        );
        assert_eq!(
            jog(&profile, "Z", -0.25).unwrap(),
            vec!["G91", "G1 Z-0.2500 F200", "G90"]
        );
    }

    #[test]
    fn jog_rejects_unknown_axis_and_bad_amount() {
        let profile = ProfileConfig::default();
        assert_eq!(
            jog(&profile, "w", 1.0),
            Err(ControlError::InvalidAxis("w".into()))
        );
        assert_eq!(jog(&profile, "xy", 1.0), Err(ControlError::InvalidAxis("xy".into())));
        assert!(matches!(
            jog(&profile, "x", f64::NAN),
            Err(ControlError::InvalidAmount(_))
        ));
    }

    #[test]
    fn home_lists_every_axis() {
        assert_eq!(home(&["x", "y"]).unwrap(), vec!["G91", "G28 X0 Y0", "G90"]);
        assert_eq!(home(&["z"]).unwrap()[1], "G28 Z0");
        assert_eq!(home(&["x", "q"]), Err(ControlError::InvalidAxis("q".into())));
        assert_eq!(home(&[]), Err(ControlError::NoAxes));
    }

    #[test]
    fn extrude_uses_extruder_speed() {
        let profile = ProfileConfig::default();
        assert_eq!(extrude(&profile, 5.0).unwrap(), vec!["G91", "G1 E5 F300", "G90"]);
        assert_eq!(extrude(&profile, -1.5).unwrap()[1], "G1 E-1.5 F300");
        assert!(extrude(&profile, f64::INFINITY).is_err());
    }

    #[test]
    fn change_tool_selects_by_index() {
        assert_eq!(change_tool("tool0").unwrap(), "T0");
        assert_eq!(change_tool("tool12").unwrap(), "T12");
        for bad in ["tool", "toolx", "bed", "tool-1", "Tool1", "tool1 "] {
            assert_eq!(change_tool(bad), Err(ControlError::InvalidTool(bad.into())), "{bad}");
        }
    }

    #[test]
    fn tool_index_only_sent_to_multi_extruder_printers() {
        let single = ProfileConfig::default();
        let dual = ProfileConfig {
            extruder_count: 2,
            ..ProfileConfig::default()
        };
        assert_eq!(set_temperature(&single, "tool0", 200.0).unwrap(), "M104 S200");
        assert_eq!(set_temperature(&dual, "tool1", 210.5).unwrap(), "M104 T1 S210.5");
        assert_eq!(set_temperature(&dual, "bed", 60.0).unwrap(), "M140 S60");
        assert_eq!(set_temperature(&single, "bed", 0.0).unwrap(), "M140 S0");
    }

    #[test]
    fn set_temperature_validates_heater_and_value() {
        let profile = ProfileConfig::default();
        assert_eq!(
            set_temperature(&profile, "chamber", 40.0),
            Err(ControlError::InvalidHeater("chamber".into()))
        );
        assert_eq!(
            set_temperature(&profile, "bed", -1.0),
            Err(ControlError::InvalidTemperature(-1.0))
        );
        assert!(set_temperature(&profile, "tool0", f64::NAN).is_err());
    }

    #[test]
    fn rates_are_bounded() {
        assert_eq!(feed_rate(50).unwrap(), "M220 S50");
        assert_eq!(feed_rate(200).unwrap(), "M220 S200");
        assert!(feed_rate(49).is_err());
        assert!(feed_rate(201).is_err());

        assert_eq!(flow_rate(75).unwrap(), "M221 S75");
        assert_eq!(flow_rate(125).unwrap(), "M221 S125");
        assert_eq!(
            flow_rate(130),
            Err(ControlError::RateOutOfRange {
                name: "Flow rate",
                percent: 130,
                min: 75,
                max: 125,
            })
        );
    }

    #[test]
    fn factors_become_whole_percentages() {
        assert_eq!(factor_to_percent(0.9), Some(90));
        assert_eq!(factor_to_percent(1.5), Some(150));
        assert_eq!(factor_to_percent(-0.5), None);
        assert_eq!(factor_to_percent(f64::NAN), None);
    }
}
