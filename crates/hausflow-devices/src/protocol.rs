/*!
 * Textual value lists used by networked air conditioners.
 *
 * Discovery replies and control responses are comma-separated `key=value`
 * lists such as `ret=OK,pow=1,mode=3,stemp=22.0,f_rate=A`.
 */
use std::collections::HashMap;

/// Parse a comma-separated `key=value` list.
///
/// A token without `=` maps to an empty string. A value of exactly `-` marks
/// the field as absent and is left out.
pub fn parse_values(raw: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();

    for pair in raw.trim().split(',') {
        match pair.split_once('=') {
            None => {
                out.insert(pair.to_string(), String::new());
            }
            Some((_, "-")) => {}
            Some((key, value)) => {
                out.insert(key.to_string(), value.to_string());
            }
        }
    }

    out
}

/// Numeric field that counts as set: present, parseable and non-zero
pub fn numeric_field(values: &HashMap<String, String>, key: &str) -> Option<f64> {
    values
        .get(key)
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v != 0.0)
}
