pub mod daily_log;
pub mod records;

pub use daily_log::{DailyLogSink, RecordSink};
pub use records::{particulate_record, voc_record, wind_record};
