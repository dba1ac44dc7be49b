use shared_models::MonitorStatus;

/// Maps a completed HTTP exchange to a health verdict. Status codes outside
/// `[200, 400)` are DOWN; a successful but slow response is DEGRADED.
/// Transport failures never reach this function — the prober records them
/// as DOWN directly.
pub fn classify_status(
    http_status: u16,
    response_time_ms: u64,
    degraded_threshold_ms: u64,
) -> MonitorStatus {
    if !(200..400).contains(&http_status) {
        return MonitorStatus::Down;
    }
    if response_time_ms > degraded_threshold_ms {
        return MonitorStatus::Degraded;
    }
    MonitorStatus::Up
}
