/// Produces the process/OS header pairs written at the top of every trace
/// file, ahead of any caller-supplied pairs.
pub struct TraceHeaders;

impl TraceHeaders {
    /// `{pid, arch, os, trace_backdating_window}` plus whatever `extra`
    /// pairs the caller wants recorded (e.g. app version, device id).
    pub fn collect(backdating_window_us: u64, extra: &[(String, String)]) -> Vec<(String, String)> {
        let os = format!(
            "{}{}",
            sysinfo::System::name().unwrap_or_else(|| std::env::consts::OS.to_string()),
            sysinfo::System::os_version().unwrap_or_default(),
        );

        let mut headers = vec![
            ("pid".to_string(), std::process::id().to_string()),
            ("arch".to_string(), std::env::consts::ARCH.to_string()),
            ("os".to_string(), os),
            ("trace_backdating_window".to_string(), backdating_window_us.to_string()),
        ];
        headers.extend_from_slice(extra);
        headers
    }
}
