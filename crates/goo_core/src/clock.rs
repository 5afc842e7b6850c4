//! UTC clock used for "created at" style field defaults.

use crate::model::value::Value;
use chrono::{DateTime, SubsecRound, Utc};

/// Returns the current UTC time truncated to microseconds, the precision
/// timestamps are stored with.
pub fn utcnow() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// `utcnow` wrapped as a field default.
pub fn utcnow_value() -> Value {
    Value::Timestamp(utcnow())
}

#[cfg(test)]
mod tests {
    use super::{utcnow, utcnow_value};
    use crate::model::value::Value;
    use chrono::Timelike;

    #[test]
    fn utcnow_has_microsecond_precision() {
        assert_eq!(utcnow().nanosecond() % 1_000, 0);
    }

    #[test]
    fn utcnow_value_is_timestamp() {
        assert!(matches!(utcnow_value(), Value::Timestamp(_)));
    }
}
