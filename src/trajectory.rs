//! Trajectory recording parser.
//!
//! A `.traj` recording is a text file: an optional frequency header followed
//! by one comma-separated joint vector per sampling step.
//!
//! ```text
//! # frequency=250.0
//! 0.0,-0.35,-2.44,0.0,0.0,0.0,0.0,
//! 0.01,-0.35,-2.44,0.0,0.0,0.0,0.0,
//! ```
//!
//! Blank lines and a single trailing comma per line are tolerated. Lines
//! that fail numeric parsing are skipped with a warning instead of aborting
//! the load, so a recording with a few corrupt samples still plays.

use anyhow::{Context, Result};
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::Duration;

use crate::arm::JOINT_COUNT;

/// Sample rate assumed when the header is absent or malformed.
pub const DEFAULT_SAMPLE_RATE_HZ: f64 = 250.0;

const FREQUENCY_HEADER: &str = "# frequency=";

/// One recorded time-step: a fixed-length joint-angle vector.
pub type Waypoint = [f64; JOINT_COUNT];

/// A data line that could not be turned into a [`Waypoint`].
#[derive(Clone, Debug)]
pub struct ParseWarning {
    /// 1-based line number in the source file.
    pub line_no: usize,
    /// What went wrong with the line.
    pub reason: String,
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line_no, self.reason)
    }
}

/// A parsed recording: sample rate plus waypoints in playback order.
#[derive(Clone, Debug)]
pub struct Trajectory {
    /// Sampling frequency of the recording.
    pub sample_rate_hz: f64,
    /// Joint vectors in the order they were recorded.
    pub waypoints: Vec<Waypoint>,
}

impl Trajectory {
    /// Parse a `.traj` file from disk.
    ///
    /// A missing or unreadable file is an error. Individual bad lines are
    /// not: they are skipped and reported in the returned warning list,
    /// and the surviving waypoints keep their original order. An empty
    /// recording is a valid result.
    pub fn parse(path: impl AsRef<Path>) -> Result<(Self, Vec<ParseWarning>)> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("failed to open trajectory file {}", path.display()))?;
        Self::parse_reader(BufReader::new(file))
    }

    /// Parse a recording from any buffered reader.
    pub fn parse_reader(reader: impl BufRead) -> Result<(Self, Vec<ParseWarning>)> {
        let mut sample_rate_hz = DEFAULT_SAMPLE_RATE_HZ;
        let mut waypoints = Vec::new();
        let mut warnings = Vec::new();

        for (index, line) in reader.lines().enumerate() {
            let line = line.context("failed to read trajectory line")?;
            let line_no = index + 1;
            let trimmed = line.trim();

            if line_no == 1 && trimmed.starts_with(FREQUENCY_HEADER) {
                match trimmed[FREQUENCY_HEADER.len()..].trim().parse::<f64>() {
                    Ok(hz) if hz > 0.0 => sample_rate_hz = hz,
                    Ok(hz) => {
                        warn_line(
                            &mut warnings,
                            line_no,
                            format!("non-positive frequency {hz}, using default"),
                        );
                    }
                    Err(e) => {
                        warn_line(
                            &mut warnings,
                            line_no,
                            format!("bad frequency header: {e}, using default"),
                        );
                    }
                }
                continue;
            }

            // One trailing comma per line is part of the recording format.
            let data = trimmed.strip_suffix(',').unwrap_or(trimmed);
            if data.is_empty() {
                continue;
            }

            match parse_waypoint(data) {
                Ok(waypoint) => waypoints.push(waypoint),
                Err(reason) => warn_line(&mut warnings, line_no, reason),
            }
        }

        Ok((
            Self {
                sample_rate_hz,
                waypoints,
            },
            warnings,
        ))
    }

    /// Number of waypoints.
    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    /// Whether the recording has no waypoints.
    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    /// Interval between consecutive waypoints.
    pub fn time_step(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.sample_rate_hz)
    }

    /// Wall-clock length of the recording at its sample rate.
    pub fn duration(&self) -> Duration {
        self.time_step() * self.waypoints.len() as u32
    }
}

fn warn_line(warnings: &mut Vec<ParseWarning>, line_no: usize, reason: String) {
    tracing::warn!(line_no, %reason, "skipping invalid trajectory line");
    warnings.push(ParseWarning { line_no, reason });
}

/// Parse one data line into a waypoint.
///
/// Every field must parse as a real number; the first [`JOINT_COUNT`] values
/// become the waypoint and any extra columns (velocities, efforts) are
/// ignored.
fn parse_waypoint(line: &str) -> std::result::Result<Waypoint, String> {
    let mut joints = [0.0; JOINT_COUNT];
    let mut count = 0usize;
    for field in line.split(',') {
        let value: f64 = field
            .trim()
            .parse()
            .map_err(|e| format!("bad value {:?}: {e}", field.trim()))?;
        if count < JOINT_COUNT {
            joints[count] = value;
        }
        count += 1;
    }
    if count < JOINT_COUNT {
        return Err(format!(
            "expected at least {JOINT_COUNT} joint values, got {count}"
        ));
    }
    Ok(joints)
}
