// Display helpers shared by the stage snapshots and the FFI layer

/// Format whole seconds as `MM:SS`; minutes keep counting past 99
pub fn format_clock(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// Percentage of `done` out of `total`, clamped to [0, 100]
///
/// A non-positive total is reported as fully done.
pub fn progress_percent(done: u32, total: u32) -> f32 {
    if total == 0 {
        return 100.0;
    }
    ((done as f32 / total as f32) * 100.0).clamp(0.0, 100.0)
}
