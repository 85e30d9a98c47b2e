/// Human readable size with 1024 steps, e.g. `1.5 KB`
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["Bytes", "KB", "MB", "GB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut size = bytes as f64;
    let mut unit_index = 0;
    while size >= THRESHOLD && unit_index < UNITS.len() - 1 {
        size /= THRESHOLD;
        unit_index += 1;
    }

    let formatted = format!("{:.2}", size);
    let formatted = formatted.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", formatted, UNITS[unit_index])
}

/// Rounded percentage saved; negative when the result grew
pub fn savings_percent(original: u64, result: u64) -> i64 {
    if original == 0 {
        return 0;
    }
    let saved = original as f64 - result as f64;
    (saved / original as f64 * 100.0).round() as i64
}

/// Rough wait estimate shown while an upload is in flight
pub fn estimate_processing_time(file_size: u64) -> &'static str {
    const MB: u64 = 1024 * 1024;

    match file_size {
        size if size < MB => "~10-20 seconds",
        size if size < 5 * MB => "~30-60 seconds",
        size if size < 10 * MB => "~1-2 minutes",
        _ => "~2-5 minutes",
    }
}
