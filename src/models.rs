use std::fmt;
use std::time::Duration;

use clap::ValueEnum;
use time::OffsetDateTime;

/// The device classes this logger knows how to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum SensorKind {
    /// Ultrasonic wind sensor on a CP210x USB bridge
    Wind,
    /// AggieAir VOC board on a CDC-ACM port
    Voc,
    /// PurpleAir particulate sensor on a CH341 USB bridge
    Particulate,
}

/// How raw bytes from a device are turned into text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodePolicy {
    /// Invalid sequences become U+FFFD
    Lossy,
    /// Invalid sequences discard the whole line
    Strict,
}

impl SensorKind {
    /// Driver directory under which bound devices show up in sysfs.
    pub fn driver_root(self) -> &'static str {
        match self {
            SensorKind::Wind => "/sys/bus/usb/drivers/cp210x/",
            SensorKind::Voc => "/sys/bus/usb/drivers/cdc_acm/",
            SensorKind::Particulate => "/sys/bus/usb/drivers/ch341/",
        }
    }

    /// Glob, relative to `driver_root`, matching the tty entries.
    pub fn device_pattern(self) -> &'static str {
        match self {
            // e.g. cdc_acm/1-1.2:1.1/tty/ttyACM0
            SensorKind::Voc => "1-*/tty/tty*",
            // e.g. cp210x/1-1.4:1.0/ttyUSB0
            SensorKind::Wind | SensorKind::Particulate => "1-*/tty*",
        }
    }

    /// Prefix of the daily log file name.
    pub fn log_prefix(self) -> &'static str {
        match self {
            SensorKind::Wind => "wind",
            SensorKind::Voc => "voc",
            SensorKind::Particulate => "purpleair",
        }
    }

    pub fn default_read_timeout(self) -> Option<Duration> {
        match self {
            SensorKind::Voc => Some(Duration::from_secs(10)),
            SensorKind::Wind | SensorKind::Particulate => None,
        }
    }

    pub fn decode_policy(self) -> DecodePolicy {
        match self {
            SensorKind::Particulate => DecodePolicy::Strict,
            SensorKind::Wind | SensorKind::Voc => DecodePolicy::Lossy,
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SensorKind::Wind => "wind",
            SensorKind::Voc => "voc",
            SensorKind::Particulate => "particulate",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WindReading {
    pub device_id: String,
    pub u: f64,
    pub wind_direction: f64,
    pub v: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VocReading {
    pub device_id: String,
    /// Device line without its line terminator
    pub line: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParticulateReading {
    pub mac_address: String,
    pub fields: Vec<String>,
    /// The kept fragment exactly as received
    pub line: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reading {
    Wind(WindReading),
    Voc(VocReading),
    Particulate(ParticulateReading),
}

#[derive(Debug, Clone, PartialEq)]
pub struct WindAverage {
    pub u: f64,
    pub wind_direction: f64,
    pub v: f64,
    pub time: OffsetDateTime,
    pub samples: usize,
}
