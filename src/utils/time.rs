use chrono::{DateTime, Utc};

#[allow(unused)]
pub fn time_millis() -> i64 {
    let time: DateTime<chrono::Utc> = Utc::now();
    time.timestamp_millis()
}

#[allow(unused)]
pub fn time_micros() -> i64 {
    let time: DateTime<chrono::Utc> = Utc::now();
    time.timestamp_micros()
}

/// Seconds since the unix epoch as a float, used for run-time measurement
/// and async-task expiry bookkeeping.
#[allow(unused)]
pub fn time_secs() -> f64 {
    let time: DateTime<chrono::Utc> = Utc::now();
    time.timestamp_micros() as f64 / 1_000_000.0
}
