use crate::probes::command::{parse_f64_loose, CommandRunner, ProbeError};
use crate::snapshot::{round2, InterfaceInfo, SensorReadings, VirtualMemory};
use std::collections::BTreeMap;

pub const SENSOR_NOTE: &str = "Detailed sensor data requires additional tools";

pub async fn cpu_percent(runner: &CommandRunner) -> Result<Option<f64>, ProbeError> {
    let output = runner
        .run("wmic", &["cpu", "get", "loadpercentage", "/value"])
        .await?;
    Ok(parse_wmic_load(&output))
}

/// Parses the field-value form `LoadPercentage=12`, one line per package;
/// multi-socket machines are averaged.
pub fn parse_wmic_load(output: &str) -> Option<f64> {
    let loads: Vec<f64> = output
        .lines()
        .filter_map(|line| {
            let (key, value) = line.trim().split_once('=')?;
            if !key.eq_ignore_ascii_case("LoadPercentage") {
                return None;
            }
            parse_f64_loose(value)
        })
        .collect();

    if loads.is_empty() {
        return None;
    }
    Some(round2(loads.iter().sum::<f64>() / loads.len() as f64))
}

pub async fn memory(runner: &CommandRunner) -> Result<VirtualMemory, ProbeError> {
    let output = runner.run("systeminfo", &[]).await?;
    let (total, available) = parse_systeminfo_memory(&output).ok_or(ProbeError::Parse {
        command: "systeminfo".to_string(),
        what: "physical memory lines",
    })?;
    Ok(VirtualMemory::from_totals(Some(total), Some(available)))
}

/// Pulls `Total Physical Memory:` / `Available Physical Memory:` out of the
/// `systeminfo` report. Values carry thousands separators and a unit
/// (`16,234 MB`); both are normalized to bytes.
pub fn parse_systeminfo_memory(output: &str) -> Option<(u64, u64)> {
    let mut total = None;
    let mut available = None;

    for line in output.lines() {
        if line.contains("Total Physical Memory") {
            total = memory_line_bytes(line);
        } else if line.contains("Available Physical Memory") {
            available = memory_line_bytes(line);
        }
    }

    Some((total?, available?))
}

fn memory_line_bytes(line: &str) -> Option<u64> {
    let value = line.split(':').nth(1)?.trim();
    let mut parts = value.split_whitespace();
    let number = parts.next()?.replace([',', '.'], "");
    let amount = number.parse::<u64>().ok()?;
    let unit = parts.next().unwrap_or("MB");

    let factor = match unit.to_ascii_uppercase().as_str() {
        "KB" => 1024,
        "GB" => 1024 * 1024 * 1024,
        _ => 1024 * 1024,
    };
    amount.checked_mul(factor)
}

pub async fn network(runner: &CommandRunner) -> Result<BTreeMap<String, InterfaceInfo>, ProbeError> {
    let output = runner.run("ipconfig", &[]).await?;
    Ok(parse_ipconfig(&output))
}

/// Parses `ipconfig` adapter blocks. Headers read
/// `Ethernet adapter Ethernet:` at column zero; the dotted `IPv4 Address`
/// lines are indented. Adapters without an IPv4 address are omitted.
pub fn parse_ipconfig(output: &str) -> BTreeMap<String, InterfaceInfo> {
    let mut interfaces = BTreeMap::new();
    let mut current: Option<String> = None;

    for line in output.lines() {
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            continue;
        }

        if !trimmed.starts_with(char::is_whitespace) && trimmed.ends_with(':') {
            current = trimmed
                .trim_end_matches(':')
                .split_once(" adapter ")
                .map(|(_, name)| name.trim().to_string())
                .filter(|name| !name.is_empty());
            continue;
        }

        if !line.contains("IPv4 Address") {
            continue;
        }
        let Some(name) = current.as_ref() else {
            continue;
        };
        let Some(value) = trimmed.rsplit(':').next() else {
            continue;
        };
        let ip = value.trim().trim_end_matches("(Preferred)").trim();
        if ip.is_empty() {
            continue;
        }
        interfaces.entry(name.clone()).or_insert(InterfaceInfo {
            ip: ip.to_string(),
        });
    }

    interfaces
}

/// Temperature readings need vendor tooling or WMI namespaces that plain
/// command probes cannot reach; report that instead of failing.
pub fn sensors() -> Result<SensorReadings, ProbeError> {
    Ok(SensorReadings {
        temperature: BTreeMap::new(),
        battery: None,
        note: Some(SENSOR_NOTE.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wmic_field_value_output() {
        let output = "\r\nLoadPercentage=12\r\n\r\n";
        assert_eq!(parse_wmic_load(output), Some(12.0));
    }

    #[test]
    fn averages_multi_socket_load() {
        let output = "LoadPercentage=10\nLoadPercentage=21\n";
        assert_eq!(parse_wmic_load(output), Some(15.5));
    }

    #[test]
    fn wmic_without_load_lines_is_none() {
        assert_eq!(parse_wmic_load("Caption=Intel\n"), None);
    }

    #[test]
    fn parses_systeminfo_memory_with_separators() {
        let output = "Host Name:                 DESKTOP-1\n\
                      Total Physical Memory:     16,234 MB\n\
                      Available Physical Memory: 8,117 MB\n";
        let (total, available) = parse_systeminfo_memory(output).expect("parse");
        assert_eq!(total, 16_234 * 1024 * 1024);
        assert_eq!(available, 8_117 * 1024 * 1024);
    }

    #[test]
    fn systeminfo_without_memory_lines_fails_soft() {
        assert_eq!(parse_systeminfo_memory("OS Name: Windows\n"), None);
    }

    #[test]
    fn parses_ipconfig_adapters() {
        let output = "\
Windows IP Configuration\r\n\
\r\n\
Ethernet adapter Ethernet:\r\n\
\r\n\
   Connection-specific DNS Suffix  . : home\r\n\
   IPv4 Address. . . . . . . . . . . : 192.168.1.7(Preferred)\r\n\
   Subnet Mask . . . . . . . . . . . : 255.255.255.0\r\n\
\r\n\
Wireless LAN adapter Wi-Fi:\r\n\
\r\n\
   Media State . . . . . . . . . . . : Media disconnected\r\n";
        let interfaces = parse_ipconfig(output);
        assert_eq!(interfaces.len(), 1);
        assert_eq!(interfaces["Ethernet"].ip, "192.168.1.7");
        assert!(!interfaces.contains_key("Wi-Fi"));
    }

    #[test]
    fn sensors_report_note_instead_of_failing() {
        let readings = sensors().expect("sensors");
        assert!(readings.temperature.is_empty());
        assert_eq!(readings.note.as_deref(), Some(SENSOR_NOTE));
    }
}
