//! Decoding of raw API responses into typed values

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ApiError;
use crate::types::ResultList;

/// Parse a raw list response into a [`ResultList`]
///
/// The envelope is validated in order (`count`, `next`, `previous`,
/// `results`) and the first violation is reported as
/// [`ApiError::InvalidResponse`] carrying the raw payload. Each element of
/// `results` then goes through `parser`; an error from `parser` is
/// returned as-is.
///
/// # Examples
///
/// ```
/// use libcourier::parse::{parse_instance, parse_result_list};
/// use libcourier::types::Record;
/// use serde_json::json;
///
/// let raw = json!({"count": 1, "next": null, "previous": null, "results": [{"id": "1"}]});
/// let list = parse_result_list(parse_instance::<Record>, &raw).unwrap();
/// assert_eq!(list.results[0].id, "1");
/// ```
pub fn parse_result_list<T, F>(parser: F, data: &Value) -> Result<ResultList<T>, ApiError>
where
    F: Fn(&Value) -> Result<T, ApiError>,
{
    let count = data
        .get("count")
        .and_then(whole_number)
        .ok_or_else(|| ApiError::invalid_response(data, "Invalid value for `count`."))?;

    let next = optional_string(data, "next")
        .ok_or_else(|| ApiError::invalid_response(data, "`next` must be a string or null."))?;

    let previous = optional_string(data, "previous")
        .ok_or_else(|| ApiError::invalid_response(data, "`previous` must be a string or null"))?;

    let results = data
        .get("results")
        .and_then(Value::as_array)
        .ok_or_else(|| ApiError::invalid_response(data, "`results` is not an array."))?
        .iter()
        .map(parser)
        .collect::<Result<Vec<T>, ApiError>>()?;

    Ok(ResultList {
        count,
        next,
        previous,
        results,
    })
}

/// Non-negative integral number, including floats such as `2.0`
fn whole_number(value: &Value) -> Option<u64> {
    if let Some(n) = value.as_u64() {
        return Some(n);
    }
    let f = value.as_f64()?;
    if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 {
        Some(f as u64)
    } else {
        None
    }
}

/// `Some(None)` for an explicit null, `Some(Some(_))` for a string and
/// `None` for a missing key or any other type.
fn optional_string(data: &Value, key: &str) -> Option<Option<String>> {
    match data.get(key)? {
        Value::Null => Some(None),
        Value::String(s) => Some(Some(s.clone())),
        _ => None,
    }
}

/// Deserialize a single entity, reporting mismatches as `InvalidResponse`
pub fn parse_instance<T: DeserializeOwned>(data: &Value) -> Result<T, ApiError> {
    serde_json::from_value(data.clone()).map_err(|e| ApiError::invalid_response(data, e.to_string()))
}
