use crate::error::{CaptureError, Result};
use log::debug;
use std::path::PathBuf;
use std::process::{Command, Output};

const GPHOTO2: &str = "gphoto2";

/// What the driver answered to one command.
///
/// `current` is only filled in by configuration reads; `success` is the
/// driver's own verdict for the command, decided here so callers never look
/// at `raw_output` to make decisions.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DriverReply {
    pub raw_output: String,
    pub current: Option<String>,
    pub success: bool,
}

/// One timed bulb exposure: open the shutter, hold it for `exposure_ms`, close
/// it, then wait up to `download_wait_ms` for the image to land at `filename`.
#[derive(Clone, Debug, PartialEq)]
pub struct BulbRequest {
    pub filename: PathBuf,
    pub exposure_ms: u64,
    pub download_wait_ms: u64,
}

/// Narrow command surface of the tethered camera and its host.
pub trait CameraDriver {
    /// Rows reported by device auto-detection, one attached device per row.
    fn auto_detect(&mut self) -> Result<Vec<String>>;
    fn get_config(&mut self, name: &str) -> Result<DriverReply>;
    fn set_config_value(&mut self, name: &str, value: &str) -> Result<DriverReply>;
    fn bulb_capture(&mut self, request: &BulbRequest) -> Result<DriverReply>;
    /// PIDs of processes whose command line matches `pattern`.
    fn find_processes(&mut self, pattern: &str) -> Result<Vec<u32>>;
    fn terminate_process(&mut self, pid: u32) -> Result<()>;
}

/// Drives the camera through the `gphoto2` command line tool.
#[derive(Clone, Debug, Default)]
pub struct Gphoto2;

impl Gphoto2 {
    pub fn new() -> Self {
        Gphoto2
    }

    fn run(program: &str, args: &[String]) -> Result<Output> {
        Command::new(program).args(args).output().map_err(|e| {
            CaptureError::Driver(format!("could not run {} {}: {}", program, args.join(" "), e))
        })
    }

    fn run_gphoto2(args: &[String]) -> Result<String> {
        let output = Self::run(GPHOTO2, args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl CameraDriver for Gphoto2 {
    fn auto_detect(&mut self) -> Result<Vec<String>> {
        let output = Self::run_gphoto2(&["--auto-detect".to_string()])?;
        Ok(output
            .lines()
            .map(str::trim)
            .filter(|row| !row.is_empty())
            .map(String::from)
            .collect())
    }

    fn get_config(&mut self, name: &str) -> Result<DriverReply> {
        let raw_output = Self::run_gphoto2(&["--get-config".to_string(), name.to_string()])?;
        let current = current_value(&raw_output);
        Ok(DriverReply {
            success: current.is_some(),
            current,
            raw_output,
        })
    }

    fn set_config_value(&mut self, name: &str, value: &str) -> Result<DriverReply> {
        let raw_output = Self::run_gphoto2(&[
            "--set-config-value".to_string(),
            format!("{}={}", name, value),
        ])?;
        // gphoto2 is silent when a write goes through
        Ok(DriverReply {
            success: raw_output.trim().is_empty(),
            current: None,
            raw_output,
        })
    }

    fn bulb_capture(&mut self, request: &BulbRequest) -> Result<DriverReply> {
        let args = vec![
            "--filename".to_string(),
            request.filename.to_string_lossy().to_string(),
            "--set-config-index".to_string(),
            "eosremoterelease=5".to_string(), // press full
            format!("--wait-event={}ms", request.exposure_ms),
            "--set-config-index".to_string(),
            "eosremoterelease=4".to_string(), // release full
            format!("--wait-event-and-download={}ms", request.download_wait_ms),
        ];
        let output = Self::run(GPHOTO2, &args)?;
        Ok(DriverReply {
            raw_output: String::from_utf8_lossy(&output.stdout).to_string(),
            current: None,
            success: output.status.success(),
        })
    }

    fn find_processes(&mut self, pattern: &str) -> Result<Vec<u32>> {
        // pgrep exits with 1 when nothing matches, which is not an error here
        let output = Self::run("pgrep", &["-f".to_string(), pattern.to_string()])?;
        let own_pid = std::process::id();
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter_map(|row| row.trim().parse::<u32>().ok())
            .filter(|pid| *pid != own_pid)
            .collect())
    }

    fn terminate_process(&mut self, pid: u32) -> Result<()> {
        let output = Self::run("kill", &[pid.to_string()])?;
        if !output.status.success() {
            // children of the monitor come and go quickly, a vanished PID is fine
            debug!(
                "kill {} did not succeed: {}",
                pid,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

/// Pulls the value out of the `Current: <value>` row of a `--get-config` dump.
pub fn current_value(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .find(|row| row.starts_with("Current:"))
        .map(|row| row["Current:".len()..].trim().to_string())
}
