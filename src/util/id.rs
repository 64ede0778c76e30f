use std::time::SystemTime;

/// Filesystem-safe UTC timestamp with millisecond precision, e.g. `2025-10-19T08-15-42-317Z`.
pub fn file_timestamp(at: SystemTime) -> String {
    humantime::format_rfc3339_millis(at)
        .to_string()
        .replace([':', '.'], "-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn test_file_timestamp_is_path_safe() {
        let at = UNIX_EPOCH + Duration::from_millis(1_760_861_742_317);
        let s = file_timestamp(at);
        assert_eq!(s, "2025-10-19T08-15-42-317Z");
        assert!(!s.contains(':') && !s.contains('.'));
    }
}
