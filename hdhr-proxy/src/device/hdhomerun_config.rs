//! [`DeviceLink`] backed by the `hdhomerun_config` command-line tool.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, trace};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use hdhr_protocol::{check_reply, parse_discover_output, DiscoveredDevice};

use super::{DeviceError, DeviceLink, DeviceStream};

/// Runs one `hdhomerun_config` process per control-plane request.
#[derive(Debug, Clone)]
pub struct HdhrConfigLink {
    program: PathBuf,
    address: String,
    command_timeout: Duration,
}

impl HdhrConfigLink {
    /// Create a link to the device at `address`.
    pub fn new(program: impl Into<PathBuf>, address: impl Into<String>, command_timeout: Duration) -> Self {
        Self {
            program: program.into(),
            address: address.into(),
            command_timeout,
        }
    }

    /// Broadcast a discovery request and list the devices that answered.
    pub async fn discover(
        program: &Path,
        command_timeout: Duration,
    ) -> Result<Vec<DiscoveredDevice>, DeviceError> {
        let mut cmd = Command::new(program);
        cmd.arg("discover");
        let stdout = run_to_completion(cmd, "discover", "", command_timeout).await?;
        Ok(parse_discover_output(&stdout))
    }

    async fn run(&self, verb: &'static str, path: &str, value: Option<&str>) -> Result<String, DeviceError> {
        let mut cmd = Command::new(&self.program);
        cmd.arg(&self.address).arg(verb).arg(path);
        if let Some(value) = value {
            cmd.arg(value);
        }
        trace!("{} {} {} {}", self.address, verb, path, value.unwrap_or(""));

        let stdout = run_to_completion(cmd, verb, path, self.command_timeout).await?;
        Ok(check_reply(&stdout)?)
    }
}

async fn run_to_completion(
    mut cmd: Command,
    verb: &'static str,
    path: &str,
    command_timeout: Duration,
) -> Result<String, DeviceError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = tokio::time::timeout(command_timeout, cmd.output())
        .await
        .map_err(|_| DeviceError::Timeout {
            verb,
            path: path.to_string(),
            secs: command_timeout.as_secs(),
        })?
        .map_err(DeviceError::Spawn)?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = if stderr.trim().is_empty() {
            stdout.trim().to_string()
        } else {
            stderr.trim().to_string()
        };
        return Err(DeviceError::CommandFailed {
            verb,
            path: path.to_string(),
            status: output.status.to_string(),
            detail,
        });
    }

    Ok(stdout)
}

#[async_trait]
impl DeviceLink for HdhrConfigLink {
    fn address(&self) -> &str {
        &self.address
    }

    async fn get(&self, path: &str) -> Result<String, DeviceError> {
        self.run("get", path, None).await
    }

    async fn set(&self, path: &str, value: &str) -> Result<(), DeviceError> {
        self.run("set", path, Some(value)).await.map(|_| ())
    }

    async fn save(&self, path: &str) -> Result<DeviceStream, DeviceError> {
        let mut cmd = Command::new(&self.program);
        cmd.arg(&self.address)
            .arg("save")
            .arg(path)
            .arg("-")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(DeviceError::Spawn)?;

        // The tool reports progress on stderr; keep the pipe drained.
        if let Some(stderr) = child.stderr.take() {
            let label = path.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let line = line.trim();
                    if !line.is_empty() {
                        debug!("[{}] save: {}", label, line);
                    }
                }
            });
        }

        DeviceStream::from_process(path, child).map_err(DeviceError::Spawn)
    }
}
