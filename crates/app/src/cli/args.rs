//! Parsing of parameter assignments and interactive control lines

use std::fmt;
use std::str::FromStr;

use bellcut_core::domain::config::Command;
use bellcut_core::domain::params::{ChainSettings, ParameterError, ParameterId, Slope};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ArgError {
    #[error("expected NAME=VALUE, got {0:?}")]
    MissingValue(String),

    #[error("invalid value {value:?} for {id}")]
    BadNumber { id: ParameterId, value: String },

    #[error("{0} needs a preset name")]
    MissingName(&'static str),

    #[error("unknown command {0:?} (try: NAME=VALUE, show, reset, save NAME, load NAME, quit)")]
    UnknownCommand(String),

    #[error(transparent)]
    Parameter(#[from] ParameterError),
}

/// `NAME=VALUE` with NAME a parameter name such as `Peak Gain`
///
/// Slope values are written in dB/oct (12, 24, 36 or 48) and stored as the
/// matching choice index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Assignment {
    pub id: ParameterId,
    pub value: f32,
}

impl FromStr for Assignment {
    type Err = ArgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, raw) = s
            .split_once('=')
            .ok_or_else(|| ArgError::MissingValue(s.to_string()))?;
        let id: ParameterId = name.parse()?;
        let raw = raw.trim();
        let bad = || ArgError::BadNumber {
            id,
            value: raw.to_string(),
        };

        let value = if id.is_choice() {
            let db_per_octave: u32 =
                raw.trim_end_matches("dB/oct").trim().parse().map_err(|_| bad())?;
            Slope::try_from(db_per_octave)?.index() as f32
        } else {
            raw.parse::<f32>().map_err(|_| bad())?
        };
        Ok(Self { id, value })
    }
}

impl fmt::Display for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.id.is_choice() {
            write!(f, "{}={}", self.id, Slope::from_index(self.value as usize).db_per_octave())
        } else {
            write!(f, "{}={}", self.id, self.value)
        }
    }
}

/// Apply assignments in order; later ones win
pub fn apply_assignments(settings: &mut ChainSettings, assignments: &[Assignment]) {
    for assignment in assignments {
        settings.set_value(assignment.id, assignment.value);
    }
}

/// Human-readable dump of every parameter
pub fn format_settings(settings: &ChainSettings) -> String {
    ParameterId::ALL
        .into_iter()
        .map(|id| {
            let value = settings.value(id);
            if id.is_choice() {
                format!("{:<14} {}", id.name(), Slope::from_index(value as usize))
            } else {
                format!("{:<14} {}", id.name(), value)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// One line typed at the `play` prompt
#[derive(Debug, Clone, PartialEq)]
pub enum ControlLine {
    Set(Assignment),
    Show,
    Reset,
    Save(String),
    Load(String),
    Quit,
}

impl ControlLine {
    /// The command-bus equivalent, if this line changes state
    pub fn to_command(&self) -> Option<Command> {
        match self {
            ControlLine::Set(a) => Some(Command::SetParameter {
                id: a.id,
                value: a.value,
            }),
            ControlLine::Reset => Some(Command::ResetParameters),
            ControlLine::Save(name) => Some(Command::SavePreset { name: name.clone() }),
            ControlLine::Load(name) => Some(Command::LoadPreset { name: name.clone() }),
            ControlLine::Show | ControlLine::Quit => None,
        }
    }
}

impl FromStr for ControlLine {
    type Err = ArgError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        if line.contains('=') {
            return Ok(ControlLine::Set(line.parse()?));
        }

        let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let name = rest.trim();
        match word.to_ascii_lowercase().as_str() {
            "show" => Ok(ControlLine::Show),
            "reset" => Ok(ControlLine::Reset),
            "quit" | "exit" | "q" => Ok(ControlLine::Quit),
            "save" if !name.is_empty() => Ok(ControlLine::Save(name.to_string())),
            "load" if !name.is_empty() => Ok(ControlLine::Load(name.to_string())),
            "save" => Err(ArgError::MissingName("save")),
            "load" => Err(ArgError::MissingName("load")),
            _ => Err(ArgError::UnknownCommand(line.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_continuous_assignment() {
        let a: Assignment = "Peak Gain=-4.5".parse().unwrap();
        assert_eq!(a.id, ParameterId::PeakGain);
        assert_eq!(a.value, -4.5);

        let a: Assignment = "highcut freq = 8000".parse().unwrap();
        assert_eq!(a.id, ParameterId::HighCutFreq);
        assert_eq!(a.value, 8000.0);
    }

    #[test]
    fn test_parse_slope_in_db_per_octave() {
        let a: Assignment = "LowCut Slope=36".parse().unwrap();
        assert_eq!(a.value, 2.0);
        assert_eq!(a.to_string(), "LowCut Slope=36");

        assert_eq!(
            "LowCut Slope=30".parse::<Assignment>(),
            Err(ArgError::Parameter(ParameterError::InvalidSlope(30)))
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!("Peak Gain".parse::<Assignment>(), Err(ArgError::MissingValue(_))));
        assert!(matches!("Peak Gain=loud".parse::<Assignment>(), Err(ArgError::BadNumber { .. })));
        assert!(matches!(
            "Volume=3".parse::<Assignment>(),
            Err(ArgError::Parameter(ParameterError::UnknownParameter(_)))
        ));
    }

    #[test]
    fn test_apply_assignments_clamps() {
        let mut settings = ChainSettings::default();
        let assignments = [
            "Peak Freq=250".parse().unwrap(),
            "Peak Gain=99".parse().unwrap(),
            "HighCut Slope=48".parse().unwrap(),
        ];
        apply_assignments(&mut settings, &assignments);
        assert_eq!(settings.peak_freq, 250.0);
        assert_eq!(settings.peak_gain_db, 24.0);
        assert_eq!(settings.high_cut_slope, Slope::Db48);
    }

    #[test]
    fn test_control_lines() {
        assert_eq!("show".parse(), Ok(ControlLine::Show));
        assert_eq!(" QUIT ".parse(), Ok(ControlLine::Quit));
        assert_eq!("save my vocal".parse(), Ok(ControlLine::Save("my vocal".to_string())));
        assert_eq!("load".parse::<ControlLine>(), Err(ArgError::MissingName("load")));
        assert!(matches!("dance".parse::<ControlLine>(), Err(ArgError::UnknownCommand(_))));

        let line: ControlLine = "Peak Quality=2".parse().unwrap();
        assert!(matches!(
            line.to_command(),
            Some(Command::SetParameter {
                id: ParameterId::PeakQuality,
                ..
            })
        ));
        assert!(ControlLine::Show.to_command().is_none());
    }

    #[test]
    fn test_format_settings_lists_every_parameter() {
        let text = format_settings(&ChainSettings::default());
        assert_eq!(text.lines().count(), ParameterId::ALL.len());
        assert!(text.contains("LowCut Slope   12 dB/oct"));
    }
}
