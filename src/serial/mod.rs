pub mod discovery;
pub mod line_source;

pub use discovery::{find_sensor_devices, select_device};
pub use line_source::{LineSource, SerialLineSource};
