use crate::probes::command::{parse_f64_loose, parse_u64_loose, CommandRunner, ProbeError};
use crate::snapshot::{round2, InterfaceInfo, SensorReadings, VirtualMemory};
use std::collections::BTreeMap;

const DEFAULT_PAGE_SIZE: u64 = 4096;

pub async fn cpu_percent(runner: &CommandRunner) -> Result<Option<f64>, ProbeError> {
    let output = runner.run("top", &["-l", "1", "-n", "0"]).await?;
    Ok(parse_top_cpu_usage(&output))
}

/// Extracts usage from the `CPU usage: 8.33% user, 16.66% sys, 75.0% idle`
/// summary line. Prefers `100 - idle`; falls back to user + sys.
pub fn parse_top_cpu_usage(output: &str) -> Option<f64> {
    let line = output.lines().find(|l| l.contains("CPU usage"))?;
    let fields = line.split_once(':')?.1;

    let mut by_tag: BTreeMap<String, f64> = BTreeMap::new();
    for field in fields.split(',') {
        let mut parts = field.split_whitespace();
        let (Some(value_part), Some(tag)) = (parts.next(), parts.next()) else {
            continue;
        };
        let Some(value) = parse_f64_loose(value_part) else {
            continue;
        };
        by_tag.entry(tag.to_ascii_lowercase()).or_insert(value);
    }

    if let Some(idle) = by_tag.get("idle") {
        return Some(round2((100.0 - idle).clamp(0.0, 100.0)));
    }
    let user = by_tag.get("user")?;
    let sys = by_tag.get("sys").copied().unwrap_or(0.0);
    Some(round2((user + sys).clamp(0.0, 100.0)))
}

pub async fn memory(runner: &CommandRunner) -> Result<VirtualMemory, ProbeError> {
    let memsize = runner.run("sysctl", &["-n", "hw.memsize"]).await?;
    let total = parse_u64_loose(&memsize).ok_or(ProbeError::Parse {
        command: "sysctl -n hw.memsize".to_string(),
        what: "total memory",
    })?;

    let vm_stat = runner.run("vm_stat", &[]).await?;
    let (page_size, free_pages) = parse_vm_stat(&vm_stat).ok_or(ProbeError::Parse {
        command: "vm_stat".to_string(),
        what: "free page count",
    })?;

    let available = free_pages.saturating_mul(page_size);
    Ok(VirtualMemory::from_totals(Some(total), Some(available)))
}

/// Reads the page size from the `vm_stat` banner and the free-page count from
/// the statistics table. Counts carry a trailing period.
pub fn parse_vm_stat(output: &str) -> Option<(u64, u64)> {
    let page_size = output
        .lines()
        .next()
        .and_then(|banner| banner.split("page size of").nth(1))
        .and_then(parse_u64_loose)
        .unwrap_or(DEFAULT_PAGE_SIZE);

    let free_pages = output
        .lines()
        .find(|l| l.trim_start().starts_with("Pages free"))
        .and_then(|l| l.split(':').nth(1))
        .map(|v| v.trim().trim_end_matches('.'))
        .and_then(|v| v.parse::<u64>().ok())?;

    Some((page_size, free_pages))
}

pub async fn network(runner: &CommandRunner) -> Result<BTreeMap<String, InterfaceInfo>, ProbeError> {
    let output = runner.run("ifconfig", &[]).await?;
    Ok(parse_ifconfig(&output))
}

/// Parses `ifconfig` output: interface headers start at column zero
/// (`en0: flags=...`), addresses live on indented `inet` lines.
pub fn parse_ifconfig(output: &str) -> BTreeMap<String, InterfaceInfo> {
    let mut interfaces = BTreeMap::new();
    let mut current: Option<String> = None;

    for line in output.lines() {
        if !line.starts_with(char::is_whitespace) {
            current = line
                .split(':')
                .next()
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string);
            continue;
        }

        let trimmed = line.trim_start();
        let Some(rest) = trimmed.strip_prefix("inet ") else {
            continue;
        };
        let Some(name) = current.as_ref() else {
            continue;
        };
        let Some(ip) = rest.split_whitespace().next() else {
            continue;
        };
        interfaces
            .entry(name.clone())
            .or_insert(InterfaceInfo { ip: ip.to_string() });
    }

    interfaces
}

pub async fn sensors(runner: &CommandRunner) -> Result<SensorReadings, ProbeError> {
    let output = runner.run("system_profiler", &["SPHardwareDataType"]).await?;
    Ok(SensorReadings {
        temperature: parse_profiler_temperature(&output),
        battery: None,
        note: None,
    })
}

/// The hardware profile rarely carries a temperature field; when it does it
/// reads `Temperature: 54.5°C` and is reported under a single `system` key.
pub fn parse_profiler_temperature(output: &str) -> BTreeMap<String, f64> {
    let mut temps = BTreeMap::new();
    for line in output.lines() {
        if !line.contains("Temperature") {
            continue;
        }
        let Some(value) = line.split(':').nth(1).and_then(parse_f64_loose) else {
            continue;
        };
        temps.insert("system".to_string(), value);
        break;
    }
    temps
}
