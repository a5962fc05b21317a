//! Request body decoding shared by the processors.
//!
//! Bodies may carry the bare value (`"on"`, `true`, `42`) or an object with
//! the property name as key (`{"power": "on"}`).

use serde_json::Value;

use crate::error::{DriverError, DriverResult};

fn unwrap_field<'a>(body: Option<&'a Value>, field: &str) -> DriverResult<&'a Value> {
    let body = body.ok_or_else(|| DriverError::InvalidBody(format!("missing '{}' value", field)))?;
    match body {
        Value::Object(map) => map
            .get(field)
            .ok_or_else(|| DriverError::InvalidBody(format!("expected field '{}'", field))),
        other => Ok(other),
    }
}

/// On/off switch: booleans, `0`/`1`, or `on`/`off`/`true`/`false`.
pub fn parse_switch(body: Option<&Value>, field: &str) -> DriverResult<bool> {
    match unwrap_field(body, field)? {
        Value::Bool(on) => Ok(*on),
        Value::Number(n) => match n.as_u64() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(DriverError::InvalidBody(format!(
                "'{}' must be 0 or 1, got {}",
                field, n
            ))),
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "on" | "true" | "1" => Ok(true),
            "off" | "false" | "0" => Ok(false),
            other => Err(DriverError::InvalidBody(format!(
                "'{}' must be on or off, got '{}'",
                field, other
            ))),
        },
        other => Err(DriverError::InvalidBody(format!(
            "'{}' must be on or off, got {}",
            field, other
        ))),
    }
}

/// Unsigned integer level, as a number or numeric string.
pub fn parse_level(body: Option<&Value>, field: &str) -> DriverResult<u64> {
    let value = unwrap_field(body, field)?;
    let level = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    level.ok_or_else(|| {
        DriverError::InvalidBody(format!(
            "'{}' must be a non-negative integer, got {}",
            field, value
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_switch_forms() {
        assert!(parse_switch(Some(&json!("on")), "power").unwrap());
        assert!(!parse_switch(Some(&json!("OFF")), "power").unwrap());
        assert!(parse_switch(Some(&json!(true)), "power").unwrap());
        assert!(!parse_switch(Some(&json!(0)), "power").unwrap());
        assert!(parse_switch(Some(&json!({ "power": 1 })), "power").unwrap());

        assert!(parse_switch(None, "power").is_err());
        assert!(parse_switch(Some(&json!(2)), "power").is_err());
        assert!(parse_switch(Some(&json!("dim")), "power").is_err());
        assert!(parse_switch(Some(&json!({ "state": "on" })), "power").is_err());
    }

    #[test]
    fn test_parse_level_forms() {
        assert_eq!(parse_level(Some(&json!(40)), "volume").unwrap(), 40);
        assert_eq!(parse_level(Some(&json!("75")), "volume").unwrap(), 75);
        assert_eq!(parse_level(Some(&json!({ "volume": 5 })), "volume").unwrap(), 5);
        assert!(parse_level(Some(&json!(-3)), "volume").is_err());
        assert!(parse_level(Some(&json!(null)), "volume").is_err());
    }
}
