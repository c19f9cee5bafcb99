use crate::error::NodeboxError;

/// Parse a human-readable size string into bytes.
///
/// Accepts `"9G"`, `"512M"`, `"100K"` or a bare byte count. Binary units.
pub fn parse_size(s: &str) -> Result<u64, NodeboxError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(NodeboxError::Validation {
            message: "size cannot be empty".into(),
        });
    }

    let (num_str, suffix) = match s.find(|c: char| c.is_ascii_alphabetic()) {
        Some(i) => (s[..i].trim(), s[i..].to_ascii_uppercase()),
        None => (s, String::new()),
    };

    let num: u64 = num_str.parse().map_err(|_| NodeboxError::Validation {
        message: format!("invalid size number: '{num_str}'"),
    })?;

    let shift = match suffix.as_str() {
        "" | "B" => 0,
        "K" | "KB" | "KIB" => 10,
        "M" | "MB" | "MIB" => 20,
        "G" | "GB" | "GIB" => 30,
        _ => {
            return Err(NodeboxError::Validation {
                message: format!("unknown size suffix: '{suffix}' (use G, M or K)"),
            });
        }
    };

    num.checked_mul(1u64 << shift)
        .ok_or_else(|| NodeboxError::Validation {
            message: format!("size overflows: '{s}'"),
        })
}
