//! GPU device request parsing
//!
//! Translates the project configuration's `gpus` value into an engine
//! device request.

/// A parsed GPU device request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GpuRequest {
    /// Request every available GPU device (engine count `-1`).
    All,
    /// Request a specific number of GPU devices.
    Count(i64),
    /// Request specific device IDs.
    Devices(Vec<String>),
}

/// Parse a `gpus` value: `"all"` → all devices; a positive integer string →
/// that many devices; anything else → comma-separated device IDs.
pub fn parse_gpu_spec(spec: &str) -> GpuRequest {
    let trimmed = spec.trim();
    if trimmed.eq_ignore_ascii_case("all") {
        return GpuRequest::All;
    }
    if let Ok(count) = trimmed.parse::<i64>() {
        if count > 0 {
            return GpuRequest::Count(count);
        }
    }
    GpuRequest::Devices(
        trimmed
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_keyword() {
        assert_eq!(parse_gpu_spec("all"), GpuRequest::All);
        assert_eq!(parse_gpu_spec("ALL"), GpuRequest::All);
    }

    #[test]
    fn test_positive_count() {
        assert_eq!(parse_gpu_spec("2"), GpuRequest::Count(2));
    }

    #[test]
    fn test_device_ids() {
        assert_eq!(
            parse_gpu_spec("0,1"),
            GpuRequest::Devices(vec!["0".to_string(), "1".to_string()])
        );
    }
}
