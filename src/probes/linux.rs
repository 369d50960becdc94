use crate::probes::command::{parse_f64_loose, CommandRunner, ProbeError};
use crate::snapshot::{round2, InterfaceInfo, SensorReadings, VirtualMemory};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::debug;

const THERMAL_ROOT: &str = "/sys/class/thermal";

pub async fn cpu_percent(runner: &CommandRunner) -> Result<Option<f64>, ProbeError> {
    let output = runner.run("top", &["-b", "-n", "1"]).await?;
    Ok(parse_top_cpu(&output))
}

/// Extracts the aggregate CPU usage from `top -bn1` output.
///
/// The summary line varies across procps versions and locales:
/// `%Cpu(s):  5.6 us,  2.0 sy, ... 91.2 id, ...` on current systems,
/// `Cpu(s): 5.6%us, 2.0%sy, ..., 91.2%id, ...` on older ones, with the
/// decimal separator following the locale. Usage is derived from the idle
/// field when present; a parse miss yields None rather than an error.
pub fn parse_top_cpu(output: &str) -> Option<f64> {
    let line = output.lines().find(|l| l.contains("Cpu(s)"))?;
    let by_tag = tagged_values(line.split_once(':')?.1);

    if let Some(idle) = by_tag.get("id") {
        return Some(round2((100.0 - idle).clamp(0.0, 100.0)));
    }
    let user = by_tag.get("us")?;
    let system = by_tag.get("sy").copied().unwrap_or(0.0);
    Some(round2((user + system).clamp(0.0, 100.0)))
}

/// Pairs numbers with their field tags, accepting both the joined legacy form
/// (`91.2%id`) and the split modern form (`91.2 id` / `91,2 id,`).
fn tagged_values(fields: &str) -> BTreeMap<String, f64> {
    let tokens: Vec<&str> = fields.split_whitespace().collect();
    let mut by_tag = BTreeMap::new();

    let mut i = 0;
    while i < tokens.len() {
        let token = tokens[i].trim_end_matches(',');

        if let Some((value_part, tag)) = token.split_once('%') {
            if is_field_tag(tag) {
                if let Some(value) = parse_f64_loose(value_part) {
                    by_tag.entry(tag.to_ascii_lowercase()).or_insert(value);
                }
            }
            i += 1;
            continue;
        }

        if let Some(value) = parse_f64_loose(token) {
            if let Some(next) = tokens.get(i + 1) {
                let tag = next.trim_end_matches(',');
                if is_field_tag(tag) {
                    by_tag.entry(tag.to_ascii_lowercase()).or_insert(value);
                    i += 2;
                    continue;
                }
            }
        }
        i += 1;
    }

    by_tag
}

fn is_field_tag(tag: &str) -> bool {
    !tag.is_empty() && tag.chars().all(|c| c.is_ascii_alphabetic())
}

pub async fn memory(runner: &CommandRunner) -> Result<VirtualMemory, ProbeError> {
    let output = runner.run("free", &["-b"]).await?;
    parse_free(&output).ok_or(ProbeError::Parse {
        command: "free -b".to_string(),
        what: "memory table",
    })
}

/// Parses the `Mem:` row of `free -b`, mapping values through the header so
/// column reordering across procps versions does not matter.
pub fn parse_free(output: &str) -> Option<VirtualMemory> {
    let mut lines = output.lines();
    let header: Vec<&str> = lines
        .find(|l| l.contains("total"))?
        .split_whitespace()
        .collect();
    let row: Vec<&str> = lines
        .find(|l| l.trim_start().starts_with("Mem"))?
        .split_whitespace()
        .skip(1)
        .collect();

    let column = |name: &str| -> Option<u64> {
        let idx = header.iter().position(|h| *h == name)?;
        row.get(idx)?.parse::<u64>().ok()
    };

    let total = column("total")?;
    let available = column("available").or_else(|| column("free"))?;
    Some(VirtualMemory::from_totals(Some(total), Some(available)))
}

pub async fn network(runner: &CommandRunner) -> Result<BTreeMap<String, InterfaceInfo>, ProbeError> {
    let output = runner.run("ip", &["addr"]).await?;
    Ok(parse_ip_addr(&output))
}

/// Parses `ip addr` output into interface → first IPv4 address. Interfaces
/// without an `inet` line are omitted.
pub fn parse_ip_addr(output: &str) -> BTreeMap<String, InterfaceInfo> {
    let mut interfaces = BTreeMap::new();
    let mut current: Option<String> = None;

    for line in output.lines() {
        if line.starts_with(|c: char| c.is_ascii_digit()) {
            current = line
                .splitn(3, ':')
                .nth(1)
                .map(|name| name.trim().split('@').next().unwrap_or("").to_string())
                .filter(|name| !name.is_empty());
            continue;
        }

        let trimmed = line.trim_start();
        let Some(rest) = trimmed.strip_prefix("inet ") else {
            continue;
        };
        let Some(name) = current.as_ref() else {
            continue;
        };
        let Some(address) = rest.split_whitespace().next() else {
            continue;
        };
        let ip = address.split('/').next().unwrap_or("").to_string();
        if ip.is_empty() {
            continue;
        }
        interfaces
            .entry(name.clone())
            .or_insert(InterfaceInfo { ip });
    }

    interfaces
}

pub fn sensors() -> Result<SensorReadings, ProbeError> {
    Ok(SensorReadings {
        temperature: read_thermal_zones(Path::new(THERMAL_ROOT)),
        battery: None,
        note: None,
    })
}

/// Walks the thermal pseudo-file tree and reads one temperature per zone.
/// Unreadable zones are skipped; a missing tree (containers, stripped-down
/// kernels) yields an empty map.
pub fn read_thermal_zones(root: &Path) -> BTreeMap<String, f64> {
    let mut temps = BTreeMap::new();
    let Ok(entries) = fs::read_dir(root) else {
        debug!(root = %root.display(), "thermal zone tree unavailable");
        return temps;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let Some(zone) = path.file_name().and_then(|v| v.to_str()) else {
            continue;
        };
        if !zone.starts_with("thermal_zone") {
            continue;
        }
        let Ok(raw) = fs::read_to_string(path.join("temp")) else {
            continue;
        };
        let Some(celsius) = zone_temperature(&raw) else {
            continue;
        };
        temps.insert(zone.to_string(), celsius);
    }

    temps
}

/// Zone files report either millidegrees or plain degrees.
pub fn zone_temperature(raw: &str) -> Option<f64> {
    let value = raw.trim().parse::<f64>().ok()?;
    let celsius = if value > 1000.0 { value / 1000.0 } else { value };
    (celsius > 0.0).then_some(celsius)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_modern_top_layout() {
        let output = "top - 10:14:01 up 1 day\n\
                      Tasks: 312 total\n\
                      %Cpu(s):  5.6 us,  2.3 sy,  0.0 ni, 91.2 id,  0.6 wa,  0.0 hi,  0.3 si,  0.0 st\n";
        assert_eq!(parse_top_cpu(output), Some(8.8));
    }

    #[test]
    fn parses_legacy_top_layout_and_comma_decimals() {
        let output = "Cpu(s): 5,6%us, 2,3%sy, 0,0%ni, 91,2%id, 0,6%wa\n";
        assert_eq!(parse_top_cpu(output), Some(8.8));
    }

    #[test]
    fn top_without_idle_falls_back_to_user_plus_system() {
        let output = "%Cpu(s):  4.0 us,  1.0 sy\n";
        assert_eq!(parse_top_cpu(output), Some(5.0));
    }

    #[test]
    fn unparseable_top_output_yields_none() {
        assert_eq!(parse_top_cpu("no summary line here\n"), None);
        assert_eq!(parse_top_cpu("%Cpu(s): garbage\n"), None);
    }

    #[test]
    fn parses_free_by_header_position() {
        let output = "              total        used        free      shared  buff/cache   available\n\
                      Mem:    16000000000  8000000000  1000000000   200000000  7000000000  4000000000\n\
                      Swap:    2147479552           0  2147479552\n";
        let memory = parse_free(output).expect("parse");
        assert_eq!(memory.total, Some(16_000_000_000));
        assert_eq!(memory.available, Some(4_000_000_000));
        assert_eq!(memory.percent, Some(75.0));
    }

    #[test]
    fn parses_free_with_reordered_columns() {
        let output = "           available       total\n\
                      Mem:      4000000000  16000000000\n";
        let memory = parse_free(output).expect("parse");
        assert_eq!(memory.total, Some(16_000_000_000));
        assert_eq!(memory.available, Some(4_000_000_000));
    }

    #[test]
    fn free_without_mem_row_fails_soft() {
        assert_eq!(parse_free("nothing useful\n"), None);
    }

    #[test]
    fn parses_ip_addr_and_omits_addressless_interfaces() {
        let output = "\
1: lo: <LOOPBACK,UP,LOWER_UP> mtu 65536 qdisc noqueue state UNKNOWN\n\
    inet 127.0.0.1/8 scope host lo\n\
2: enp3s0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 qdisc fq state UP\n\
    link/ether 00:11:22:33:44:55 brd ff:ff:ff:ff:ff:ff\n\
    inet 192.168.1.10/24 brd 192.168.1.255 scope global dynamic enp3s0\n\
    inet 192.168.1.11/24 scope global secondary enp3s0\n\
3: docker0: <NO-CARRIER,BROADCAST,MULTICAST,UP> mtu 1500 state DOWN\n\
4: veth1@if5: <BROADCAST,MULTICAST,UP> mtu 1500 state UP\n\
    inet 172.17.0.2/16 scope global veth1\n";
        let interfaces = parse_ip_addr(output);
        assert_eq!(interfaces.len(), 3);
        assert_eq!(interfaces["lo"].ip, "127.0.0.1");
        assert_eq!(interfaces["enp3s0"].ip, "192.168.1.10");
        assert_eq!(interfaces["veth1"].ip, "172.17.0.2");
        assert!(!interfaces.contains_key("docker0"));
    }

    #[test]
    fn zone_temperature_scales_millidegrees() {
        assert_eq!(zone_temperature("45000\n"), Some(45.0));
        assert_eq!(zone_temperature("62"), Some(62.0));
        assert_eq!(zone_temperature("0"), None);
        assert_eq!(zone_temperature("not-a-number"), None);
    }
}
