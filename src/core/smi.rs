//! Device enumeration through `nvidia-smi -q -x`.
//!
//! The XML report is decoded into a small explicit schema and validated
//! eagerly: anything the selectors rely on (memory usage, process ids) must be
//! present and well-formed, everything else is ignored.

use super::device::{Device, MIB};
use super::error::{FreeGpusError, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Deserialize;
use std::io::ErrorKind;
use std::process::Command;

const ROOT_ELEMENT: &[u8] = b"nvidia_smi_log";
const MIB_SUFFIX: &str = " MiB";

pub const DEFAULT_COMMAND: &str = "nvidia-smi";
pub const DEFAULT_ARGS: &[&str] = &["-q", "-x"];

/// Anything that can enumerate the GPUs of this machine in a stable order.
pub trait DeviceSource {
    fn devices(&self) -> Result<Vec<Device>>;
}

/// Runs the NVIDIA diagnostics tool once per call to [`DeviceSource::devices`].
#[derive(Debug, Clone)]
pub struct NvidiaSmi {
    command: String,
    args: Vec<String>,
}

impl NvidiaSmi {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }

    /// Run the tool and capture its standard output.
    pub fn query(&self) -> Result<String> {
        tracing::debug!(command = %self.command, args = ?self.args, "Running diagnostics tool");

        let output = Command::new(&self.command)
            .args(&self.args)
            .output()
            .map_err(|e| {
                let reason = match e.kind() {
                    ErrorKind::NotFound => "command not found".to_string(),
                    _ => e.to_string(),
                };
                self.tool_error(reason)
            })?;

        if !output.status.success() {
            // nvidia-smi reports driver problems on stdout, not stderr
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let message = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            let reason = if message.is_empty() {
                format!("exited with {}", output.status)
            } else {
                format!("exited with {}: {}", output.status, message)
            };
            return Err(self.tool_error(reason));
        }

        String::from_utf8(output.stdout)
            .map_err(|e| FreeGpusError::Parse(format!("output is not valid UTF-8: {e}")))
    }

    fn tool_error(&self, reason: String) -> FreeGpusError {
        FreeGpusError::ExternalTool {
            command: self.command.clone(),
            reason,
        }
    }
}

impl Default for NvidiaSmi {
    fn default() -> Self {
        Self::new(
            DEFAULT_COMMAND,
            DEFAULT_ARGS.iter().map(|a| a.to_string()).collect(),
        )
    }
}

impl DeviceSource for NvidiaSmi {
    fn devices(&self) -> Result<Vec<Device>> {
        let xml = self.query()?;
        let devices = parse_devices(&xml)?;
        tracing::info!(count = devices.len(), "Enumerated GPUs");
        Ok(devices)
    }
}

#[derive(Debug, Deserialize)]
struct SmiLog {
    #[serde(rename = "gpu", default)]
    gpus: Vec<GpuEntry>,
}

#[derive(Debug, Deserialize)]
struct GpuEntry {
    fb_memory_usage: FbMemoryUsage,
    #[serde(default)]
    processes: Option<Processes>,
}

#[derive(Debug, Deserialize)]
struct FbMemoryUsage {
    total: String,
    free: String,
}

#[derive(Debug, Deserialize)]
struct Processes {
    #[serde(rename = "process_info", default)]
    process_info: Vec<ProcessInfo>,
}

#[derive(Debug, Deserialize)]
struct ProcessInfo {
    pid: String,
}

impl GpuEntry {
    fn into_device(self, index: u32) -> Result<Device> {
        let free_memory = parse_mib("free", &self.fb_memory_usage.free)
            .map_err(|e| at_gpu(index, e))?;
        let total_memory = parse_mib("total", &self.fb_memory_usage.total)
            .map_err(|e| at_gpu(index, e))?;

        let pids = self
            .processes
            .map(|p| p.process_info)
            .unwrap_or_default()
            .into_iter()
            .map(|info| {
                info.pid.trim().parse::<u32>().map_err(|_| {
                    at_gpu(
                        index,
                        FreeGpusError::Parse(format!("invalid pid `{}`", info.pid)),
                    )
                })
            })
            .collect::<Result<_>>()?;

        Ok(Device {
            index,
            free_memory,
            total_memory,
            pids,
        })
    }
}

fn at_gpu(index: u32, err: FreeGpusError) -> FreeGpusError {
    match err {
        FreeGpusError::Parse(msg) => FreeGpusError::Parse(format!("gpu {index}: {msg}")),
        other => other,
    }
}

/// Parse an XML report from `nvidia-smi -q -x` into devices in report order.
pub fn parse_devices(xml: &str) -> Result<Vec<Device>> {
    check_root(xml)?;

    let log: SmiLog =
        quick_xml::de::from_str(xml).map_err(|e| FreeGpusError::Parse(e.to_string()))?;

    log.gpus
        .into_iter()
        .enumerate()
        .map(|(index, gpu)| gpu.into_device(index as u32))
        .collect()
}

fn check_root(xml: &str) -> Result<()> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let name = e.name();
                if name.as_ref() == ROOT_ELEMENT {
                    return Ok(());
                }
                return Err(FreeGpusError::Parse(format!(
                    "unexpected root element <{}>",
                    String::from_utf8_lossy(name.as_ref())
                )));
            }
            Ok(Event::Eof) => {
                return Err(FreeGpusError::Parse("document has no root element".into()))
            }
            Ok(_) => continue,
            Err(e) => return Err(FreeGpusError::Parse(e.to_string())),
        }
    }
}

/// Parse a memory field such as `"24576 MiB"` into bytes.
///
/// Only whole MiB values are accepted; any other unit is rejected rather than
/// guessed at.
pub fn parse_mib(field: &str, value: &str) -> Result<u64> {
    let value = value.trim();
    let count = value.strip_suffix(MIB_SUFFIX).ok_or_else(|| {
        FreeGpusError::Parse(format!("{field} memory `{value}` is not in MiB"))
    })?;
    let mib = count.trim().parse::<u64>().map_err(|_| {
        FreeGpusError::Parse(format!("{field} memory `{value}` is not a whole number"))
    })?;
    mib.checked_mul(MIB)
        .ok_or_else(|| FreeGpusError::Parse(format!("{field} memory `{value}` is too large")))
}
