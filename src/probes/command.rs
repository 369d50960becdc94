use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::time;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to launch `{command}`: {source}")]
    Launch {
        command: String,
        source: std::io::Error,
    },
    #[error("`{command}` exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
    #[error("`{command}` timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },
    #[error("could not parse {what} from `{command}` output")]
    Parse {
        command: String,
        what: &'static str,
    },
    #[error("failed to wait for `{command}`: {source}")]
    Wait {
        command: String,
        source: std::io::Error,
    },
    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),
}

/// Runs external probe commands with a hard per-invocation timeout. A probe
/// that outlives the timeout is killed rather than left to block the
/// collection lock.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    timeout: Duration,
}

impl CommandRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub async fn run(&self, program: &str, args: &[&str]) -> Result<String, ProbeError> {
        let command = display_command(program, args);

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProbeError::Launch {
                command: command.clone(),
                source,
            })?;

        let output = match time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return Err(ProbeError::Wait { command, source });
            }
            Err(_elapsed) => {
                return Err(ProbeError::Timeout {
                    command,
                    timeout: self.timeout,
                });
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProbeError::Failed {
                command,
                status: output.status,
                stderr: stderr.chars().take(200).collect::<String>().trim().to_string(),
            });
        }

        Ok(decode_stdout(&output.stdout))
    }
}

/// Some Windows tools (wmic among them) emit UTF-16LE when piped; everything
/// else is treated as UTF-8 with a lossy fallback.
fn decode_stdout(bytes: &[u8]) -> String {
    if let Ok(utf8) = std::str::from_utf8(bytes) {
        return utf8.to_string();
    }

    if bytes.len() >= 2 && bytes.len() % 2 == 0 {
        let code_units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        if let Ok(text) = String::from_utf16(&code_units) {
            return text.trim_start_matches('\u{feff}').to_string();
        }
    }

    String::from_utf8_lossy(bytes).into_owned()
}

fn display_command(program: &str, args: &[&str]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}

/// Parses a float out of loosely formatted command output: tolerates
/// surrounding units, comma decimal separators and stray characters.
pub fn parse_f64_loose(input: &str) -> Option<f64> {
    let trimmed = input.trim();
    if let Ok(v) = trimmed.parse::<f64>() {
        return Some(v);
    }

    if let Ok(v) = trimmed.replace(',', ".").parse::<f64>() {
        return Some(v);
    }

    let filtered: String = trimmed
        .chars()
        .filter(|c| {
            c.is_ascii_digit()
                || *c == '.'
                || *c == ','
                || *c == 'e'
                || *c == 'E'
                || *c == '-'
                || *c == '+'
        })
        .collect();
    if filtered.is_empty() {
        return None;
    }

    filtered.replace(',', ".").parse::<f64>().ok()
}

pub fn parse_u64_loose(input: &str) -> Option<u64> {
    parse_f64_loose(input).map(|v| if v < 0.0 { 0 } else { v as u64 })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loose_float_parsing_tolerates_units_and_locales() {
        assert_eq!(parse_f64_loose("42"), Some(42.0));
        assert_eq!(parse_f64_loose(" 91.5 "), Some(91.5));
        assert_eq!(parse_f64_loose("91,5"), Some(91.5));
        assert_eq!(parse_f64_loose("61.0°C"), Some(61.0));
        assert_eq!(parse_f64_loose("16,234 MB"), Some(16.234));
        assert_eq!(parse_f64_loose("n/a"), None);
        assert_eq!(parse_f64_loose(""), None);
    }

    #[test]
    fn decodes_utf16le_tool_output() {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "LoadPercentage=9\r\n".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        assert_eq!(decode_stdout(&bytes), "LoadPercentage=9\r\n");
        assert_eq!(decode_stdout(b"plain utf-8"), "plain utf-8");
    }

    #[test]
    fn loose_u64_clamps_negatives() {
        assert_eq!(parse_u64_loose("-5"), Some(0));
        assert_eq!(parse_u64_loose("17179869184"), Some(17_179_869_184));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn runner_captures_stdout() {
        let runner = CommandRunner::new(Duration::from_secs(5));
        let out = runner.run("echo", &["hello"]).await.expect("echo runs");
        assert_eq!(out.trim(), "hello");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn runner_enforces_timeout() {
        let runner = CommandRunner::new(Duration::from_millis(100));
        let err = runner
            .run("sleep", &["5"])
            .await
            .expect_err("sleep must time out");
        assert!(matches!(err, ProbeError::Timeout { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn runner_reports_launch_failure() {
        let runner = CommandRunner::new(Duration::from_secs(1));
        let err = runner
            .run("definitely-not-a-real-binary", &[])
            .await
            .expect_err("missing binary");
        assert!(matches!(err, ProbeError::Launch { .. }));
    }
}
