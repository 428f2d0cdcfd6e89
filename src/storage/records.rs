/// Formatting of log file records
use time::OffsetDateTime;

use crate::models::{ParticulateReading, VocReading, WindAverage};
use crate::utils::format_datetime;

/// `localTimestamp,windDirectionMean,uMean,vMean`, means to 2 decimal places
pub fn wind_record(average: &WindAverage) -> String {
    format!(
        "{},{:.2},{:.2},{:.2}",
        format_datetime(&average.time),
        average.wind_direction,
        average.u,
        average.v
    )
}

/// `localTimestamp,<device line>`; the device line carries its own ids and clock
pub fn voc_record(reading: &VocReading, received: &OffsetDateTime) -> String {
    format!("{},{}", format_datetime(received), reading.line)
}

/// `unixEpochSeconds,<kept fragment>`
pub fn particulate_record(reading: &ParticulateReading, received: &OffsetDateTime) -> String {
    format!("{},{}", received.unix_timestamp(), reading.line)
}
