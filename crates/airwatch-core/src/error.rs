//! Error taxonomy shared by every airwatch component

use thiserror_no_std::Error;

use crate::power::PowerDomain;

/// Failure to obtain a reading from a sensor.
///
/// Acquisition failures are recorded in the cache as missing values and are
/// never fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SensorError {
    #[error("{sensor}: initialization failed ({details})")]
    InitializationFailed {
        sensor: &'static str,
        details: &'static str,
    },
    #[error("{sensor}: {operation} failed ({details})")]
    ReadFailed {
        sensor: &'static str,
        operation: &'static str,
        details: &'static str,
    },
    #[error("{sensor}: {operation} timed out")]
    Timeout {
        sensor: &'static str,
        operation: &'static str,
    },
    #[error("{sensor}: invalid data ({details})")]
    InvalidData {
        sensor: &'static str,
        details: &'static str,
    },
    #[error("{sensor}: not present")]
    NotPresent { sensor: &'static str },
}

/// A hardware enable/disable call for a power domain failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{domain:?} power transition failed: {details}")]
pub struct PowerError {
    pub domain: PowerDomain,
    pub details: &'static str,
}

/// Errors raised by a [`crate::config::KeyValueStore`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("key not found")]
    NotFound,
    #[error("storage I/O error: {0}")]
    Io(heapless::String<64>),
    #[error("value too large for buffer")]
    Overflow,
    #[error("failed to encode value")]
    Encode,
    #[error("failed to decode value")]
    Decode,
}

/// Errors raised by the network link, time sync and publisher.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("connect failed: {0}")]
    Connect(heapless::String<64>),
    #[error("{operation} timed out")]
    Timeout { operation: &'static str },
    #[error("time sync failed: {0}")]
    TimeSync(heapless::String<64>),
    #[error("publish failed: {0}")]
    Publish(heapless::String<64>),
    #[error("network not ready")]
    NotReady,
}

/// Top-level error returned by a unit of task work.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    #[error("Acquisition failure: {0}")]
    AcquisitionFailure(#[from] SensorError),
    #[error("Power transition failure: {0}")]
    PowerTransitionFailure(#[from] PowerError),
    #[error("Config persist failure: {0}")]
    ConfigPersistFailure(#[from] StoreError),
    #[error("Network failure: {0}")]
    NetworkFailure(#[from] NetworkError),
    #[error("Display error: {0}")]
    Display(heapless::String<64>),
    #[error("Unknown error")]
    Unknown,
}

/// Build a bounded message, truncating on a character boundary when `text`
/// does not fit.
pub fn message<const N: usize>(text: &str) -> heapless::String<N> {
    let mut out = heapless::String::new();
    for c in text.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_truncates() {
        let msg: heapless::String<4> = message("timeout");
        assert_eq!(msg.as_str(), "time");
    }

    #[test]
    fn test_app_error_from_sensor_error() {
        let err: AppError = SensorError::Timeout {
            sensor: "APC1",
            operation: "read",
        }
        .into();
        assert!(matches!(err, AppError::AcquisitionFailure(_)));
    }
}
