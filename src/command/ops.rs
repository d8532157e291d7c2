//! Media operations and their typed parameter validation.

use crate::error::CommandError;

/// Continuous playback-rate range a single resampling pass supports.
const SPEED_RANGE: (f64, f64) = (0.5, 2.0);
/// Rates outside the continuous range that are still accepted (handled by
/// the worker with chained resampling passes).
const SPEED_STEPS: [f64; 2] = [0.25, 4.0];

/// One validated media transformation. Variants carry only the parameters
/// relevant to them; construction goes through [`Operation::build`], which
/// owns all range checking.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    AdjustSpeed {
        factor: f64,
    },
    AdjustVolume {
        decibels: f64,
    },
    /// Crop margins as percentages of the frame.
    Crop {
        left: f64,
        right: f64,
        top: f64,
        bottom: f64,
    },
    /// Freeze the last frame for the given duration.
    Extend {
        seconds: f64,
    },
    ExtractAudio,
    Flip {
        horizontal: bool,
        vertical: bool,
    },
    NormalizeVolume,
    RemoveAudio,
    Resize {
        width: Option<u32>,
        height: Option<u32>,
        scale: Option<f64>,
    },
    Reverse,
    Rotate {
        degrees: u16,
    },
    Screenshot {
        at_seconds: f64,
    },
    Stabilize,
    Trim {
        start: f64,
        end: f64,
    },
}

impl Operation {
    /// The command-text tag for this variant, also used for duplicate
    /// detection across a request.
    pub fn tag(&self) -> &'static str {
        match self {
            Operation::AdjustSpeed { .. } => "SPEED",
            Operation::AdjustVolume { .. } => "VOLUME",
            Operation::Crop { .. } => "CROP",
            Operation::Extend { .. } => "EXTEND",
            Operation::ExtractAudio => "EXTRACTAUDIO",
            Operation::Flip { .. } => "FLIP",
            Operation::NormalizeVolume => "NORMALIZE",
            Operation::RemoveAudio => "REMOVEAUDIO",
            Operation::Resize { .. } => "RESIZE",
            Operation::Reverse => "REVERSE",
            Operation::Rotate { .. } => "ROTATE",
            Operation::Screenshot { .. } => "SCREENSHOT",
            Operation::Stabilize => "STABILIZE",
            Operation::Trim { .. } => "TRIM",
        }
    }

    /// Build an operation from its command-text name and raw parameter
    /// tokens (`(key, optional value)` pairs, in order of appearance).
    pub fn build(
        name: &str,
        params: &[(String, Option<String>)],
    ) -> Result<Operation, CommandError> {
        let tag = name.to_ascii_uppercase();
        let mut reader = ParamReader::new(&tag, params);

        let operation = match tag.as_str() {
            "SPEED" => {
                let factor = reader.require_f64("factor")?;
                let continuous = (SPEED_RANGE.0..=SPEED_RANGE.1).contains(&factor);
                let stepped = SPEED_STEPS.iter().any(|s| (s - factor).abs() < f64::EPSILON);
                if !continuous && !stepped {
                    return Err(invalid(
                        &tag,
                        "factor",
                        format!(
                            "must be between {} and {}, or one of {:?}",
                            SPEED_RANGE.0, SPEED_RANGE.1, SPEED_STEPS
                        ),
                    ));
                }
                Operation::AdjustSpeed { factor }
            }
            "VOLUME" => {
                let decibels = reader.require_f64("db")?;
                if !(-30.0..=30.0).contains(&decibels) {
                    return Err(invalid(&tag, "db", "must be between -30 and 30".into()));
                }
                Operation::AdjustVolume { decibels }
            }
            "CROP" => {
                let left = reader.take_f64("left")?.unwrap_or(0.0);
                let right = reader.take_f64("right")?.unwrap_or(0.0);
                let top = reader.take_f64("top")?.unwrap_or(0.0);
                let bottom = reader.take_f64("bottom")?.unwrap_or(0.0);
                for (name, value) in [
                    ("left", left),
                    ("right", right),
                    ("top", top),
                    ("bottom", bottom),
                ] {
                    if !(0.0..100.0).contains(&value) {
                        return Err(invalid(&tag, name, "must be a percentage below 100".into()));
                    }
                }
                if left + right >= 100.0 || top + bottom >= 100.0 {
                    return Err(invalid(
                        &tag,
                        "left",
                        "opposing margins must leave part of the frame".into(),
                    ));
                }
                Operation::Crop {
                    left,
                    right,
                    top,
                    bottom,
                }
            }
            "EXTEND" => {
                let seconds = reader.require_f64("seconds")?;
                if !(seconds > 0.0 && seconds <= 60.0) {
                    return Err(invalid(
                        &tag,
                        "seconds",
                        "must be above 0 and at most 60".into(),
                    ));
                }
                Operation::Extend { seconds }
            }
            "EXTRACTAUDIO" => Operation::ExtractAudio,
            "FLIP" => {
                let horizontal = reader.take_flag("horizontal");
                let vertical = reader.take_flag("vertical");
                if !horizontal && !vertical {
                    return Err(CommandError::MissingParameter {
                        operation: tag.clone(),
                        name: "horizontal|vertical".into(),
                    });
                }
                Operation::Flip {
                    horizontal,
                    vertical,
                }
            }
            "NORMALIZE" => Operation::NormalizeVolume,
            "REMOVEAUDIO" => Operation::RemoveAudio,
            "RESIZE" => {
                let width = reader.take_u32("width")?;
                let height = reader.take_u32("height")?;
                let scale = reader.take_f64("scale")?;
                if width.is_none() && height.is_none() && scale.is_none() {
                    return Err(CommandError::MissingParameter {
                        operation: tag.clone(),
                        name: "width|height|scale".into(),
                    });
                }
                if scale.is_some() && (width.is_some() || height.is_some()) {
                    return Err(invalid(
                        &tag,
                        "scale",
                        "cannot combine scale with width/height".into(),
                    ));
                }
                for (name, value) in [("width", width), ("height", height)] {
                    if let Some(v) = value {
                        if v == 0 || v > 4096 {
                            return Err(invalid(&tag, name, "must be between 1 and 4096".into()));
                        }
                    }
                }
                if let Some(s) = scale {
                    if !(s > 0.0 && s <= 4.0) {
                        return Err(invalid(&tag, "scale", "must be above 0 and at most 4".into()));
                    }
                }
                Operation::Resize {
                    width,
                    height,
                    scale,
                }
            }
            "REVERSE" => Operation::Reverse,
            "ROTATE" => {
                let degrees = reader.require_u32("degrees")?;
                if ![90, 180, 270].contains(&degrees) {
                    return Err(invalid(&tag, "degrees", "must be 90, 180 or 270".into()));
                }
                Operation::Rotate {
                    degrees: degrees as u16,
                }
            }
            "SCREENSHOT" => {
                let at_seconds = reader.take_f64("at")?.unwrap_or(0.0);
                if at_seconds < 0.0 {
                    return Err(invalid(&tag, "at", "must not be negative".into()));
                }
                Operation::Screenshot { at_seconds }
            }
            "STABILIZE" => Operation::Stabilize,
            "TRIM" => {
                let start = reader.require_f64("start")?;
                let end = reader.require_f64("end")?;
                if start < 0.0 {
                    return Err(invalid(&tag, "start", "must not be negative".into()));
                }
                if end <= start {
                    return Err(invalid(&tag, "end", "must be after start".into()));
                }
                Operation::Trim { start, end }
            }
            _ => return Err(CommandError::UnknownOperation(tag)),
        };

        reader.finish()?;
        Ok(operation)
    }

    /// Argument vector handed to the transform worker for this operation.
    pub fn worker_args(&self) -> Vec<String> {
        fn num(value: f64) -> String {
            format!("{value}")
        }
        match self {
            Operation::AdjustSpeed { factor } => vec!["speed".into(), num(*factor)],
            Operation::AdjustVolume { decibels } => vec!["volume".into(), num(*decibels)],
            Operation::Crop {
                left,
                right,
                top,
                bottom,
            } => vec![
                "crop".into(),
                num(*left),
                num(*right),
                num(*top),
                num(*bottom),
            ],
            Operation::Extend { seconds } => vec!["extend".into(), num(*seconds)],
            Operation::ExtractAudio => vec!["extract-audio".into()],
            Operation::Flip {
                horizontal,
                vertical,
            } => {
                let mut args = vec!["flip".into()];
                if *horizontal {
                    args.push("h".into());
                }
                if *vertical {
                    args.push("v".into());
                }
                args
            }
            Operation::NormalizeVolume => vec!["normalize".into()],
            Operation::RemoveAudio => vec!["remove-audio".into()],
            Operation::Resize {
                width,
                height,
                scale,
            } => {
                let mut args = vec!["resize".into()];
                if let Some(w) = width {
                    args.push(format!("width={w}"));
                }
                if let Some(h) = height {
                    args.push(format!("height={h}"));
                }
                if let Some(s) = scale {
                    args.push(format!("scale={s}"));
                }
                args
            }
            Operation::Reverse => vec!["reverse".into()],
            Operation::Rotate { degrees } => vec!["rotate".into(), degrees.to_string()],
            Operation::Screenshot { at_seconds } => vec!["screenshot".into(), num(*at_seconds)],
            Operation::Stabilize => vec!["stabilize".into()],
            Operation::Trim { start, end } => vec!["trim".into(), num(*start), num(*end)],
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "-{}", self.tag())
    }
}

fn invalid(operation: &str, name: &str, reason: String) -> CommandError {
    CommandError::InvalidParameter {
        operation: operation.to_string(),
        name: name.to_string(),
        reason,
    }
}

/// Tracks which raw parameters a constructor consumed so leftovers can be
/// rejected as unknown.
struct ParamReader<'a> {
    operation: &'a str,
    entries: Vec<(&'a str, Option<&'a str>)>,
    consumed: Vec<bool>,
}

impl<'a> ParamReader<'a> {
    fn new(operation: &'a str, params: &'a [(String, Option<String>)]) -> Self {
        Self {
            operation,
            entries: params
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_deref()))
                .collect(),
            consumed: vec![false; params.len()],
        }
    }

    fn take_raw(&mut self, name: &str) -> Option<Option<&'a str>> {
        for (index, (key, value)) in self.entries.iter().enumerate() {
            if !self.consumed[index] && key.eq_ignore_ascii_case(name) {
                self.consumed[index] = true;
                return Some(*value);
            }
        }
        None
    }

    fn take_f64(&mut self, name: &str) -> Result<Option<f64>, CommandError> {
        match self.take_raw(name) {
            None => Ok(None),
            Some(None) => Err(invalid(self.operation, name, "expected a value".into())),
            Some(Some(raw)) => raw
                .parse::<f64>()
                .map(Some)
                .map_err(|_| invalid(self.operation, name, format!("`{raw}` is not a number"))),
        }
    }

    fn require_f64(&mut self, name: &str) -> Result<f64, CommandError> {
        self.take_f64(name)?
            .ok_or_else(|| CommandError::MissingParameter {
                operation: self.operation.to_string(),
                name: name.to_string(),
            })
    }

    fn require_u32(&mut self, name: &str) -> Result<u32, CommandError> {
        self.take_u32(name)?
            .ok_or_else(|| CommandError::MissingParameter {
                operation: self.operation.to_string(),
                name: name.to_string(),
            })
    }

    fn take_u32(&mut self, name: &str) -> Result<Option<u32>, CommandError> {
        match self.take_raw(name) {
            None => Ok(None),
            Some(None) => Err(invalid(self.operation, name, "expected a value".into())),
            Some(Some(raw)) => raw.parse::<u32>().map(Some).map_err(|_| {
                invalid(
                    self.operation,
                    name,
                    format!("`{raw}` is not a whole number"),
                )
            }),
        }
    }

    /// Bare flag parameter: present (with no value) means true.
    fn take_flag(&mut self, name: &str) -> bool {
        matches!(self.take_raw(name), Some(None))
    }

    fn finish(self) -> Result<(), CommandError> {
        for (index, (key, _)) in self.entries.iter().enumerate() {
            if !self.consumed[index] {
                return Err(CommandError::UnknownParameter {
                    operation: self.operation.to_string(),
                    name: key.to_string(),
                });
            }
        }
        Ok(())
    }
}
