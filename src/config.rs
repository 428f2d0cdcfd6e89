use clap::Parser;
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::SensorError;
use crate::models::SensorKind;

const CONTROLLER_SECTION: &str = "Controller";
const ELEVATION_KEY: &str = "elevation";

/// Log readings from serial environmental sensors
#[derive(Debug, Parser)]
#[command(name = "serial-sensor-logger", version, long_about = None)]
pub struct Args {
    /// Sensor types to read; repeat or comma separate to run several
    #[arg(
        short,
        long = "sensor",
        value_enum,
        value_delimiter = ',',
        required = true,
        env = "SENSOR_TYPES"
    )]
    pub sensors: Vec<SensorKind>,

    /// Device to read (e.g. ttyUSB0); defaults to the first device found
    #[arg(short, long, env = "SENSOR_DEVICE")]
    pub device: Option<String>,

    /// Directory for the daily log files
    #[arg(short, long, default_value = "./logs", env = "SENSOR_LOG_PATH")]
    pub path: PathBuf,

    /// List the available devices and exit
    #[arg(short, long = "list-only", alias = "listonly")]
    pub list_only: bool,

    /// Site latitude
    #[arg(short = 'x', long, default_value_t = 38.54, allow_negative_numbers = true)]
    pub latitude: f64,

    /// Site longitude
    #[arg(short = 'y', long, default_value_t = -121.75, allow_negative_numbers = true)]
    pub longitude: f64,

    /// Site elevation
    #[arg(short, long, default_value_t = 1.01, allow_negative_numbers = true)]
    pub elevation: f64,

    /// INI file whose [Controller] section may override the elevation
    #[arg(short, long = "config", alias = "configpath", env = "SENSOR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Seconds to wait for a complete line, 0 to wait forever
    #[arg(long, env = "SENSOR_READ_TIMEOUT")]
    pub read_timeout: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: f64,
}

#[derive(Debug, Clone)]
pub struct SensorConfig {
    pub sensors: Vec<SensorKind>,
    pub device: Option<String>,
    pub output_dir: PathBuf,
    pub list_only: bool,
    pub location: Location,
    read_timeout: Option<u64>,
}

impl SensorConfig {
    /// Load `.env`, parse the command line and resolve the configuration
    pub fn load() -> Result<Self, SensorError> {
        // Environment first so clap can fall back to it
        dotenv::dotenv().ok();
        Self::from_args(Args::parse())
    }

    pub fn from_args(args: Args) -> Result<Self, SensorError> {
        let mut sensors = Vec::new();
        for kind in args.sensors {
            if !sensors.contains(&kind) {
                sensors.push(kind);
            }
        }

        if args.device.is_some() && sensors.len() > 1 && !args.list_only {
            return Err(SensorError::Config(
                "a device override can only be used with a single sensor type".into(),
            ));
        }

        let mut location = Location {
            latitude: args.latitude,
            longitude: args.longitude,
            elevation: args.elevation,
        };
        if let Some(path) = &args.config {
            if let Some(elevation) = load_elevation_override(path)? {
                info!("Elevation overridden by {}: {}", path.display(), elevation);
                location.elevation = elevation;
            }
        }

        Ok(SensorConfig {
            sensors,
            device: args.device,
            output_dir: args.path,
            list_only: args.list_only,
            location,
            read_timeout: args.read_timeout,
        })
    }

    /// Explicit timeout if one was configured, otherwise the sensor's default
    pub fn read_timeout_for(&self, kind: SensorKind) -> Option<Duration> {
        match self.read_timeout {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => kind.default_read_timeout(),
        }
    }
}

/// Read `Elevation` from the `[Controller]` section of an INI file
///
/// A missing file, section or key leaves the elevation alone; a value that
/// is present but not a number is an error.
pub fn load_elevation_override(path: &Path) -> Result<Option<f64>, SensorError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!("Could not read config file {}: {}", path.display(), e);
            return Ok(None);
        }
    };

    let Some(value) = ini_value(&content, CONTROLLER_SECTION, ELEVATION_KEY) else {
        return Ok(None);
    };
    value.parse::<f64>().map(Some).map_err(|_| {
        SensorError::Config(format!(
            "{}: Elevation must be a number, got {:?}",
            path.display(),
            value
        ))
    })
}

/// Look up `key` (case-insensitive) in `section` of INI-style text
fn ini_value<'a>(content: &'a str, section: &str, key: &str) -> Option<&'a str> {
    let mut in_section = false;

    for line in content.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            in_section = name.trim() == section;
            continue;
        }
        if !in_section {
            continue;
        }
        if let Some((k, v)) = line.split_once(['=', ':']) {
            if k.trim().eq_ignore_ascii_case(key) {
                return Some(v.trim());
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["serial-sensor-logger"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults() {
        let config = SensorConfig::from_args(args(&["-s", "wind"])).unwrap();
        assert_eq!(config.sensors, vec![SensorKind::Wind]);
        assert_eq!(config.output_dir, PathBuf::from("./logs"));
        assert!(!config.list_only);
        assert_eq!(
            config.location,
            Location {
                latitude: 38.54,
                longitude: -121.75,
                elevation: 1.01
            }
        );
    }

    #[test]
    fn several_sensors_are_deduplicated() {
        let config =
            SensorConfig::from_args(args(&["-s", "wind,voc", "--sensor", "wind", "-s", "particulate"]))
                .unwrap();
        assert_eq!(
            config.sensors,
            vec![SensorKind::Wind, SensorKind::Voc, SensorKind::Particulate]
        );
    }

    #[test]
    fn device_override_needs_single_sensor() {
        let result = SensorConfig::from_args(args(&["-s", "wind,voc", "-d", "ttyUSB0"]));
        assert!(matches!(result, Err(SensorError::Config(_))));

        let config = SensorConfig::from_args(args(&["-s", "wind", "-d", "ttyUSB0"])).unwrap();
        assert_eq!(config.device.as_deref(), Some("ttyUSB0"));
    }

    #[test]
    fn negative_coordinates_parse() {
        let config =
            SensorConfig::from_args(args(&["-s", "voc", "-x", "-33.9", "-y", "-70.6"])).unwrap();
        assert_eq!(config.location.latitude, -33.9);
        assert_eq!(config.location.longitude, -70.6);
    }

    #[test]
    fn read_timeout_resolution() {
        let config = SensorConfig::from_args(args(&["-s", "voc"])).unwrap();
        assert_eq!(
            config.read_timeout_for(SensorKind::Voc),
            Some(Duration::from_secs(10))
        );
        assert_eq!(config.read_timeout_for(SensorKind::Wind), None);

        let config = SensorConfig::from_args(args(&["-s", "wind", "--read-timeout", "5"])).unwrap();
        assert_eq!(
            config.read_timeout_for(SensorKind::Wind),
            Some(Duration::from_secs(5))
        );

        let config = SensorConfig::from_args(args(&["-s", "voc", "--read-timeout", "0"])).unwrap();
        assert_eq!(config.read_timeout_for(SensorKind::Voc), None);
    }

    #[test]
    fn config_file_overrides_elevation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("site.ini");
        std::fs::write(
            &path,
            "[ModuleDefaults]\nElevation = 5\n\n[Controller]\n; site survey\nName = davis\nElevation = 16.5\n",
        )
        .unwrap();

        let config = SensorConfig::from_args(args(&[
            "-s",
            "particulate",
            "-c",
            path.to_str().unwrap(),
        ]))
        .unwrap();
        assert_eq!(config.location.elevation, 16.5);
    }

    #[test]
    fn missing_config_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            load_elevation_override(&dir.path().join("absent.ini")).unwrap(),
            None
        );

        let path = dir.path().join("other.ini");
        std::fs::write(&path, "[Controller]\nName: davis\n").unwrap();
        assert_eq!(load_elevation_override(&path).unwrap(), None);
    }

    #[test]
    fn unparsable_elevation_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.ini");
        std::fs::write(&path, "[Controller]\nelevation: high\n").unwrap();
        assert!(matches!(
            load_elevation_override(&path),
            Err(SensorError::Config(_))
        ));
    }
}
