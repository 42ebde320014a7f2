//! Line-oriented robot log files.
//!
//! Each log line starts with a message tag followed by whitespace-
//! delimited fields. This crate decodes and re-encodes the tags the
//! navigation core consumes (`ODOM`, `FLASER`, `ROBOTLASER1`, `TRUEPOS`,
//! `PARAM`, `SYNC`), builds a per-message byte-offset index in a single
//! forward scan, and reads gzip-compressed files transparently.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::SplitWhitespace;

use flate2::read::GzDecoder;
use thiserror::Error;
use types::{LaserConfig, Odometry, Pose, RobotLaser, TruePos};

#[derive(Error, Debug)]
pub enum LogFormatError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Missing field `{field}` in {tag} line")]
    MissingField { tag: &'static str, field: &'static str },
    #[error("Bad numeric field `{field}` in {tag} line: {value}")]
    BadNumber {
        tag: &'static str,
        field: &'static str,
        value: String,
    },
    #[error("Message index {0} out of range")]
    BadIndex(usize),
}

/// One decoded log line.
#[derive(Debug, Clone)]
pub enum LogMessage {
    Odometry(Odometry),
    /// Legacy front-laser line with interpolated poses and a guessed
    /// sensor configuration
    FrontLaser(RobotLaser),
    /// Modern laser line with an explicit configuration header
    RobotLaser { id: i32, laser: RobotLaser },
    TruePos(TruePos),
    Param {
        name: String,
        value: String,
        timestamp: f64,
        host: String,
    },
    Sync {
        tag: String,
        timestamp: f64,
        host: String,
    },
}

/// Sequential field reader over one log line.
struct Fields<'a> {
    tag: &'static str,
    iter: SplitWhitespace<'a>,
}

impl<'a> Fields<'a> {
    fn new(tag: &'static str, rest: &'a str) -> Self {
        Self {
            tag,
            iter: rest.split_whitespace(),
        }
    }

    fn next_str(&mut self, field: &'static str) -> Result<&'a str, LogFormatError> {
        self.iter.next().ok_or(LogFormatError::MissingField {
            tag: self.tag,
            field,
        })
    }

    fn next_f64(&mut self, field: &'static str) -> Result<f64, LogFormatError> {
        let raw = self.next_str(field)?;
        raw.parse().map_err(|_| LogFormatError::BadNumber {
            tag: self.tag,
            field,
            value: raw.to_string(),
        })
    }

    fn next_usize(&mut self, field: &'static str) -> Result<usize, LogFormatError> {
        let raw = self.next_str(field)?;
        raw.parse().map_err(|_| LogFormatError::BadNumber {
            tag: self.tag,
            field,
            value: raw.to_string(),
        })
    }

    fn next_i32(&mut self, field: &'static str) -> Result<i32, LogFormatError> {
        let raw = self.next_str(field)?;
        raw.parse().map_err(|_| LogFormatError::BadNumber {
            tag: self.tag,
            field,
            value: raw.to_string(),
        })
    }

    fn next_vec(&mut self, count: usize, field: &'static str) -> Result<Vec<f64>, LogFormatError> {
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(self.next_f64(field)?);
        }
        Ok(values)
    }
}

/// Field-of-view of a legacy scanner guessed from its beam count. The
/// even counts are the odd sweeps with the last beam dropped.
pub fn guess_fov(num_beams: usize) -> f64 {
    let pi = std::f64::consts::PI;
    match num_beams {
        181 => pi,                  // 180 degrees
        180 => pi / 180.0 * 179.0,  // last beam dropped
        361 => pi,                  // 180 degrees
        360 => pi / 180.0 * 179.5,  // last beam dropped
        401 => pi / 180.0 * 100.0,  // 100 degrees
        400 => pi / 180.0 * 99.75,  // last beam dropped
        _ => pi,                    // assume 180 degrees
    }
}

/// Angular resolution of a legacy scanner guessed from its beam count.
pub fn guess_angular_resolution(num_beams: usize) -> f64 {
    let pi = std::f64::consts::PI;
    match num_beams {
        180 | 181 => pi / 180.0, // 1 degree
        360 | 361 => pi / 360.0, // 0.5 degrees
        400 | 401 => pi / 720.0, // 0.25 degrees
        n if n > 1 => guess_fov(n) / (n - 1) as f64,
        _ => pi / 180.0,
    }
}

/// Decode one log line. Comments and unknown tags decode to `None`.
pub fn decode_line(line: &str) -> Result<Option<LogMessage>, LogFormatError> {
    let trimmed = line.trim_start();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    let (tag, rest) = match trimmed.split_once(char::is_whitespace) {
        Some(pair) => pair,
        None => (trimmed, ""),
    };

    match tag {
        "ODOM" => decode_odometry(rest).map(Some),
        "FLASER" => decode_front_laser(rest).map(Some),
        t if t.starts_with("ROBOTLASER") => {
            let id: i32 = t["ROBOTLASER".len()..].parse().unwrap_or(-1);
            decode_robot_laser(rest).map(|laser| Some(LogMessage::RobotLaser { id, laser }))
        }
        "TRUEPOS" => decode_truepos(rest).map(Some),
        "PARAM" => decode_param(rest).map(Some),
        "SYNC" => decode_sync(rest).map(Some),
        _ => Ok(None),
    }
}

fn decode_odometry(rest: &str) -> Result<LogMessage, LogFormatError> {
    let mut f = Fields::new("ODOM", rest);
    Ok(LogMessage::Odometry(Odometry {
        x: f.next_f64("x")?,
        y: f.next_f64("y")?,
        theta: f.next_f64("theta")?,
        tv: f.next_f64("tv")?,
        rv: f.next_f64("rv")?,
        acceleration: f.next_f64("acceleration")?,
        timestamp: f.next_f64("timestamp")?,
        host: f.next_str("host")?.to_string(),
    }))
}

fn decode_front_laser(rest: &str) -> Result<LogMessage, LogFormatError> {
    let mut f = Fields::new("FLASER", rest);
    let num_readings = f.next_usize("num_readings")?;
    let ranges = f.next_vec(num_readings, "range")?;
    let laser_pose = Pose {
        x: f.next_f64("laser_pose.x")?,
        y: f.next_f64("laser_pose.y")?,
        theta: f.next_f64("laser_pose.theta")?,
    };
    let robot_pose = Pose {
        x: f.next_f64("robot_pose.x")?,
        y: f.next_f64("robot_pose.y")?,
        theta: f.next_f64("robot_pose.theta")?,
    };
    let timestamp = f.next_f64("timestamp")?;
    let host = f.next_str("host")?.to_string();

    Ok(LogMessage::FrontLaser(RobotLaser {
        config: LaserConfig {
            laser_type: 0,
            start_angle: -std::f64::consts::FRAC_PI_2,
            fov: guess_fov(num_readings),
            angular_resolution: guess_angular_resolution(num_readings),
            maximum_range: 80.0,
            accuracy: 0.01,
            remission_mode: 0,
        },
        ranges,
        remissions: Vec::new(),
        laser_pose,
        robot_pose,
        tv: 0.0,
        rv: 0.0,
        forward_safety_dist: 0.0,
        side_safety_dist: 0.0,
        turn_axis: 0.0,
        timestamp,
        host,
    }))
}

fn decode_robot_laser(rest: &str) -> Result<RobotLaser, LogFormatError> {
    let mut f = Fields::new("ROBOTLASER1", rest);
    let config = LaserConfig {
        laser_type: f.next_i32("laser_type")?,
        start_angle: f.next_f64("start_angle")?,
        fov: f.next_f64("fov")?,
        angular_resolution: f.next_f64("angular_resolution")?,
        maximum_range: f.next_f64("maximum_range")?,
        accuracy: f.next_f64("accuracy")?,
        remission_mode: f.next_i32("remission_mode")?,
    };
    let num_readings = f.next_usize("num_readings")?;
    let ranges = f.next_vec(num_readings, "range")?;
    let num_remissions = f.next_usize("num_remissions")?;
    let remissions = f.next_vec(num_remissions, "remission")?;

    Ok(RobotLaser {
        config,
        ranges,
        remissions,
        laser_pose: Pose {
            x: f.next_f64("laser_pose.x")?,
            y: f.next_f64("laser_pose.y")?,
            theta: f.next_f64("laser_pose.theta")?,
        },
        robot_pose: Pose {
            x: f.next_f64("robot_pose.x")?,
            y: f.next_f64("robot_pose.y")?,
            theta: f.next_f64("robot_pose.theta")?,
        },
        tv: f.next_f64("tv")?,
        rv: f.next_f64("rv")?,
        forward_safety_dist: f.next_f64("forward_safety_dist")?,
        side_safety_dist: f.next_f64("side_safety_dist")?,
        turn_axis: f.next_f64("turn_axis")?,
        timestamp: f.next_f64("timestamp")?,
        host: f.next_str("host")?.to_string(),
    })
}

fn decode_truepos(rest: &str) -> Result<LogMessage, LogFormatError> {
    let mut f = Fields::new("TRUEPOS", rest);
    Ok(LogMessage::TruePos(TruePos {
        true_pose: Pose {
            x: f.next_f64("true_pose.x")?,
            y: f.next_f64("true_pose.y")?,
            theta: f.next_f64("true_pose.theta")?,
        },
        odometry_pose: Pose {
            x: f.next_f64("odometry_pose.x")?,
            y: f.next_f64("odometry_pose.y")?,
            theta: f.next_f64("odometry_pose.theta")?,
        },
        timestamp: f.next_f64("timestamp")?,
        host: f.next_str("host")?.to_string(),
    }))
}

fn decode_param(rest: &str) -> Result<LogMessage, LogFormatError> {
    let mut f = Fields::new("PARAM", rest);
    Ok(LogMessage::Param {
        name: f.next_str("name")?.to_string(),
        value: f.next_str("value")?.to_string(),
        timestamp: f.next_f64("timestamp")?,
        host: f.next_str("host")?.to_string(),
    })
}

fn decode_sync(rest: &str) -> Result<LogMessage, LogFormatError> {
    let mut f = Fields::new("SYNC", rest);
    Ok(LogMessage::Sync {
        tag: f.next_str("tag")?.to_string(),
        timestamp: f.next_f64("timestamp")?,
        host: f.next_str("host")?.to_string(),
    })
}

/// Encode a message to its log line (no trailing newline).
///
/// Floats print with Rust's shortest round-trip representation, so a
/// decode/encode cycle preserves every value bit-for-bit.
pub fn encode_line(message: &LogMessage) -> String {
    match message {
        LogMessage::Odometry(o) => format!(
            "ODOM {} {} {} {} {} {} {} {}",
            o.x, o.y, o.theta, o.tv, o.rv, o.acceleration, o.timestamp, o.host
        ),
        LogMessage::FrontLaser(l) => {
            let mut line = format!("FLASER {}", l.ranges.len());
            for r in &l.ranges {
                line.push_str(&format!(" {r}"));
            }
            line.push_str(&format!(
                " {} {} {} {} {} {} {} {}",
                l.laser_pose.x,
                l.laser_pose.y,
                l.laser_pose.theta,
                l.robot_pose.x,
                l.robot_pose.y,
                l.robot_pose.theta,
                l.timestamp,
                l.host
            ));
            line
        }
        LogMessage::RobotLaser { id, laser: l } => {
            let mut line = format!(
                "ROBOTLASER{} {} {} {} {} {} {} {} {}",
                id,
                l.config.laser_type,
                l.config.start_angle,
                l.config.fov,
                l.config.angular_resolution,
                l.config.maximum_range,
                l.config.accuracy,
                l.config.remission_mode,
                l.ranges.len()
            );
            for r in &l.ranges {
                line.push_str(&format!(" {r}"));
            }
            line.push_str(&format!(" {}", l.remissions.len()));
            for r in &l.remissions {
                line.push_str(&format!(" {r}"));
            }
            line.push_str(&format!(
                " {} {} {} {} {} {} {} {} {} {} {} {} {}",
                l.laser_pose.x,
                l.laser_pose.y,
                l.laser_pose.theta,
                l.robot_pose.x,
                l.robot_pose.y,
                l.robot_pose.theta,
                l.tv,
                l.rv,
                l.forward_safety_dist,
                l.side_safety_dist,
                l.turn_axis,
                l.timestamp,
                l.host
            ));
            line
        }
        LogMessage::TruePos(t) => format!(
            "TRUEPOS {} {} {} {} {} {} {} {}",
            t.true_pose.x,
            t.true_pose.y,
            t.true_pose.theta,
            t.odometry_pose.x,
            t.odometry_pose.y,
            t.odometry_pose.theta,
            t.timestamp,
            t.host
        ),
        LogMessage::Param {
            name,
            value,
            timestamp,
            host,
        } => format!("PARAM {name} {value} {timestamp} {host}"),
        LogMessage::Sync {
            tag,
            timestamp,
            host,
        } => format!("SYNC {tag} {timestamp} {host}"),
    }
}

/// A fully loaded log file with a per-message byte-offset index.
pub struct LogFile {
    data: Vec<u8>,
    /// (offset, length) of each line, built by a single forward scan
    index: Vec<(usize, usize)>,
}

impl LogFile {
    /// Open a log file, transparently inflating gzip input (detected by
    /// the magic bytes, not the file name).
    pub fn open(path: &Path) -> Result<Self, LogFormatError> {
        let mut raw = Vec::new();
        File::open(path)?.read_to_end(&mut raw)?;
        let data = if raw.len() >= 2 && raw[0] == 0x1f && raw[1] == 0x8b {
            let mut inflated = Vec::new();
            GzDecoder::new(raw.as_slice()).read_to_end(&mut inflated)?;
            inflated
        } else {
            raw
        };
        Ok(Self::from_bytes(data))
    }

    /// Index an in-memory log buffer.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        let mut index = Vec::new();
        let mut start = 0usize;
        for (i, &b) in data.iter().enumerate() {
            if b == b'\n' {
                if i > start {
                    index.push((start, i - start));
                }
                start = i + 1;
            }
        }
        if start < data.len() {
            index.push((start, data.len() - start));
        }
        Self { data, index }
    }

    pub fn num_messages(&self) -> usize {
        self.index.len()
    }

    /// Raw text of line `i`.
    pub fn line(&self, i: usize) -> Result<&str, LogFormatError> {
        let &(offset, len) = self.index.get(i).ok_or(LogFormatError::BadIndex(i))?;
        Ok(std::str::from_utf8(&self.data[offset..offset + len])
            .unwrap_or("")
            .trim_end_matches('\r'))
    }

    /// Decode line `i`; `None` for comments and unknown tags.
    pub fn message(&self, i: usize) -> Result<Option<LogMessage>, LogFormatError> {
        decode_line(self.line(i)?)
    }

    /// Iterate over all decodable messages in file order.
    pub fn messages(&self) -> impl Iterator<Item = Result<Option<LogMessage>, LogFormatError>> + '_ {
        (0..self.num_messages()).map(move |i| self.message(i))
    }
}
