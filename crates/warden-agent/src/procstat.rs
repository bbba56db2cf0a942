use warden_process::ResourceSnapshot;

/// Read memory and thread figures for a live process.
///
/// On Linux this comes straight out of `/proc/<pid>/status`; the raw
/// `Key:\tvalue` lines are human-readable as-is, so they are reported
/// verbatim rather than reparsed.
#[cfg(target_os = "linux")]
pub async fn resource_snapshot(pid: u32) -> std::io::Result<ResourceSnapshot> {
    let status = tokio::fs::read_to_string(format!("/proc/{pid}/status")).await?;
    Ok(parse_status(&status))
}

#[cfg(not(target_os = "linux"))]
pub async fn resource_snapshot(_pid: u32) -> std::io::Result<ResourceSnapshot> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "process statistics are only available on Linux",
    ))
}

#[cfg(any(target_os = "linux", test))]
fn parse_status(status: &str) -> ResourceSnapshot {
    let mut snap = ResourceSnapshot::default();
    for line in status.lines() {
        if line.starts_with("VmSize:") {
            snap.vm_size = Some(line.to_string());
        } else if line.starts_with("VmSwap:") {
            snap.vm_swap = Some(line.to_string());
        } else if line.starts_with("Threads:") {
            snap.threads = Some(line.to_string());
        }
    }
    snap
}
