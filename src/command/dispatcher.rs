//! Command dispatcher
//!
//! Reads command lines, executes them against the frame hub and the device
//! control seam, and writes exactly one JSON reply line per non-blank input
//! line. Validation and execution failures become error replies; only the
//! end of input or a failed read or reply write stops the loop.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use super::device::{ControlDescriptor, DeviceControl, DeviceInfo, DeviceSummary};
use super::parse::{parse, Command};
use crate::hub::FrameHub;
use crate::stats::StatsSnapshot;

/// Longest accepted command line, newline excluded
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Reply status field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

/// One JSON reply line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reply {
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub devices: Option<Vec<DeviceSummary>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<DeviceInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controls: Option<Vec<ControlDescriptor>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<StatsSnapshot>,
    /// Average transcoded frames per second, alongside `stats`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcode_rate: Option<f64>,
}

impl Reply {
    fn new(status: Status, command: &str) -> Self {
        Self {
            status,
            command: Some(command.to_string()),
            error: None,
            id: None,
            value: None,
            path: None,
            bytes: None,
            devices: None,
            info: None,
            controls: None,
            stats: None,
            transcode_rate: None,
        }
    }

    pub fn success(command: &str) -> Self {
        Self::new(Status::Success, command)
    }

    pub fn error(command: &str, message: impl Into<String>) -> Self {
        let mut reply = Self::new(Status::Error, command);
        reply.error = Some(message.into());
        reply
    }

    /// Error reply for input that never got as far as a command keyword
    pub fn rejected(message: impl Into<String>) -> Self {
        let mut reply = Self::error("", message);
        reply.command = None;
        reply
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    fn control(mut self, id: u32, value: i32) -> Self {
        self.id = Some(id);
        self.value = Some(value);
        self
    }

    fn saved(mut self, path: PathBuf, bytes: usize) -> Self {
        self.path = Some(path);
        self.bytes = Some(bytes);
        self
    }

    /// Serialize as a single newline-terminated line
    pub fn to_line(&self) -> String {
        let mut line = serde_json::to_string(self)
            .unwrap_or_else(|e| format!(r#"{{"status":"error","error":"{}"}}"#, e));
        line.push('\n');
        line
    }
}

/// Executes control-channel commands
pub struct CommandDispatcher {
    hub: Arc<FrameHub>,
    device: Arc<dyn DeviceControl>,
    snapshot_path: PathBuf,
}

impl CommandDispatcher {
    pub fn new(hub: Arc<FrameHub>, device: Arc<dyn DeviceControl>, snapshot_path: PathBuf) -> Self {
        Self {
            hub,
            device,
            snapshot_path,
        }
    }

    /// Parse and execute one line; `None` for blank lines
    pub async fn handle_line(&self, line: &str) -> Option<Reply> {
        match parse(line) {
            Ok(None) => None,
            Ok(Some(command)) => Some(self.execute(command).await),
            Err(e) => {
                tracing::warn!(line = line.trim(), error = %e, "Rejected command");
                Some(Reply::error(e.command(), e.to_string()))
            }
        }
    }

    /// Execute a parsed command
    pub async fn execute(&self, command: Command) -> Reply {
        let name = command.name();
        tracing::info!(command = name, "Command received");

        match command {
            Command::Capture => self.capture().await,
            Command::List => match self.device.list_devices() {
                Ok(devices) => {
                    let mut reply = Reply::success(name);
                    reply.devices = Some(devices);
                    reply
                }
                Err(e) => Reply::error(name, format!("failed to enumerate devices: {}", e)),
            },
            Command::Info => match self.device.device_info() {
                Ok(info) => {
                    let mut reply = Reply::success(name);
                    reply.info = Some(info);
                    reply
                }
                Err(e) => Reply::error(name, e.to_string()),
            },
            Command::Controls => match self.device.controls() {
                Ok(controls) => {
                    let mut reply = Reply::success(name);
                    reply.controls = Some(controls);
                    reply
                }
                Err(e) => Reply::error(name, e.to_string()),
            },
            Command::SetControl { id, value } => match self.device.set_control(id, value) {
                Ok(()) => {
                    tracing::info!(id, value, "Control set");
                    Reply::success(name).control(id, value)
                }
                Err(e) => {
                    tracing::warn!(id, value, error = %e, "Failed to set control");
                    Reply::error(name, format!("failed to set control: {}", e)).control(id, value)
                }
            },
            Command::Stats => {
                let stats = self.hub.snapshot();
                let mut reply = Reply::success(name);
                reply.transcode_rate = Some(stats.transcode_rate());
                reply.stats = Some(stats);
                reply
            }
        }
    }

    async fn capture(&self) -> Reply {
        let name = Command::Capture.name();

        let Some(frame) = self.hub.store().read_full() else {
            tracing::warn!("No frame available to save");
            return Reply::error(name, "no frame available");
        };

        let path = self.snapshot_path.clone();
        match tokio::fs::write(&path, frame.data()).await {
            Ok(()) => {
                tracing::info!(path = %path.display(), bytes = frame.len(), "Full resolution frame saved");
                Reply::success(name).saved(path, frame.len())
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to save frame");
                Reply::error(name, format!("failed to save frame: {}", e)).saved(path, frame.len())
            }
        }
    }

    /// Read commands until end of input or cancellation
    ///
    /// Bytes that are not valid UTF-8 are replaced before parsing, so they
    /// end up in an error reply like any other malformed command. Lines
    /// longer than [`MAX_LINE_LEN`] get one error reply and are skipped up
    /// to the next newline. Returns an error only when the input cannot be
    /// read or a reply cannot be written.
    pub async fn run<R, W>(&self, mut input: R, mut output: W, cancel: CancellationToken) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut buf = Vec::with_capacity(256);
        // Inside an overlong line that was already answered
        let mut discarding = false;

        loop {
            buf.clear();
            let limit = MAX_LINE_LEN as u64 + 1;
            let mut limited = (&mut input).take(limit);
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                read = limited.read_until(b'\n', &mut buf) => read?,
            };

            if read == 0 {
                tracing::info!("Command input closed");
                return Ok(());
            }

            let terminated = buf.last() == Some(&b'\n');
            let reply = if !terminated && buf.len() as u64 == limit {
                if discarding {
                    continue;
                }
                discarding = true;
                tracing::warn!(limit = MAX_LINE_LEN, "Rejected overlong command line");
                Some(Reply::rejected(format!(
                    "command line exceeds {} bytes",
                    MAX_LINE_LEN
                )))
            } else if discarding {
                // Tail of the overlong line
                discarding = !terminated;
                continue;
            } else {
                self.handle_line(&String::from_utf8_lossy(&buf)).await
            };

            if let Some(reply) = reply {
                output.write_all(reply.to_line().as_bytes()).await?;
                output.flush().await?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::time::timeout;

    use super::*;
    use crate::capture::synthetic::SyntheticDevice;
    use crate::command::NoDevice;
    use crate::hub::{Frame, Resolution};

    const BRIGHTNESS: u32 = 0x0098_0900;

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("mjpeg-streamer-{}-{}", std::process::id(), name))
    }

    fn dispatcher(device: Arc<dyn DeviceControl>) -> (CommandDispatcher, Arc<FrameHub>) {
        let hub = Arc::new(FrameHub::new());
        let dispatcher =
            CommandDispatcher::new(Arc::clone(&hub), device, scratch_path("frame.jpeg"));
        (dispatcher, hub)
    }

    fn synthetic() -> Arc<SyntheticDevice> {
        Arc::new(SyntheticDevice::new("stub://test", Resolution::new(640, 480)))
    }

    fn json(reply: &Reply) -> serde_json::Value {
        serde_json::from_str(reply.to_line().trim_end()).unwrap()
    }

    #[tokio::test]
    async fn test_blank_line_no_reply() {
        let (dispatcher, _) = dispatcher(Arc::new(NoDevice));
        assert!(dispatcher.handle_line("   ").await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_command_is_error() {
        let (dispatcher, _) = dispatcher(Arc::new(NoDevice));

        let reply = dispatcher.handle_line("REBOOT").await.unwrap();
        let value = json(&reply);

        assert_eq!(value["status"], "error");
        assert_eq!(value["error"], "unknown command: REBOOT");
    }

    #[tokio::test]
    async fn test_capture_without_frame() {
        let (dispatcher, _) = dispatcher(Arc::new(NoDevice));

        let reply = dispatcher.handle_line("CAPTURE").await.unwrap();

        assert!(!reply.is_success());
        assert_eq!(reply.error.as_deref(), Some("no frame available"));
    }

    #[tokio::test]
    async fn test_capture_writes_full_frame() {
        let hub = Arc::new(FrameHub::new());
        let path = scratch_path("capture.jpeg");
        let dispatcher = CommandDispatcher::new(Arc::clone(&hub), Arc::new(NoDevice), path.clone());

        hub.store()
            .store_pair(Frame::new(vec![0xFF; 256]), Frame::new(vec![0x01; 16]));

        let reply = dispatcher.handle_line("CAPTURE").await.unwrap();
        assert!(reply.is_success());
        assert_eq!(reply.bytes, Some(256));

        let saved = tokio::fs::read(&path).await.unwrap();
        assert_eq!(saved, vec![0xFF; 256]);
        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn test_capture_write_failure_is_error() {
        let hub = Arc::new(FrameHub::new());
        let path = scratch_path("missing-dir").join("frame.jpeg");
        let dispatcher = CommandDispatcher::new(Arc::clone(&hub), Arc::new(NoDevice), path);
        hub.store().store_full(Frame::new(vec![1, 2, 3]));

        let reply = dispatcher.handle_line("CAPTURE").await.unwrap();

        assert!(!reply.is_success());
        assert!(reply.error.unwrap().starts_with("failed to save frame"));
    }

    #[tokio::test]
    async fn test_set_control_on_synthetic_device() {
        let device = synthetic();
        let (dispatcher, _) = dispatcher(device.clone());

        let reply = dispatcher
            .handle_line(&format!("SET_CONTROL {} 200", BRIGHTNESS))
            .await
            .unwrap();

        let value = json(&reply);
        assert_eq!(value["status"], "success");
        assert_eq!(value["id"], BRIGHTNESS);
        assert_eq!(value["value"], 200);
        assert_eq!(device.control_value(BRIGHTNESS), Some(200));
    }

    #[tokio::test]
    async fn test_set_control_device_failure() {
        let (dispatcher, _) = dispatcher(Arc::new(NoDevice));

        let value = json(&dispatcher.handle_line("SET_CONTROL 1 2").await.unwrap());

        assert_eq!(value["status"], "error");
        assert_eq!(value["error"], "failed to set control: no device is currently open");
        assert_eq!(value["id"], 1);
        assert_eq!(value["value"], 2);
    }

    #[tokio::test]
    async fn test_controls_and_info() {
        let (dispatcher, _) = dispatcher(synthetic());

        let controls = json(&dispatcher.handle_line("CONTROLS").await.unwrap());
        assert_eq!(controls["controls"].as_array().unwrap().len(), 3);
        assert_eq!(controls["controls"][0]["name"], "Brightness");

        let info = json(&dispatcher.handle_line("INFO").await.unwrap());
        assert_eq!(info["status"], "success");
        assert_eq!(info["info"]["path"], "stub://test");
    }

    #[tokio::test]
    async fn test_stats_reports_viewers() {
        let (dispatcher, hub) = dispatcher(Arc::new(NoDevice));
        let _viewer = hub.attach_viewer(0).unwrap();

        let value = json(&dispatcher.handle_line("STATS").await.unwrap());

        assert_eq!(value["stats"]["active_viewers"], 1);
        assert_eq!(value["stats"]["viewers_total"], 1);
        assert_eq!(value["transcode_rate"], 0.0);
    }

    #[tokio::test]
    async fn test_run_recovers_after_validation_error() {
        let (dispatcher, _) = dispatcher(synthetic());
        let input = format!("SET_CONTROL abc 5\n\nSET_CONTROL {} 10\n", BRIGHTNESS);
        let mut output = Vec::new();

        dispatcher
            .run(input.as_bytes(), &mut output, CancellationToken::new())
            .await
            .unwrap();

        let lines: Vec<serde_json::Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["status"], "error");
        assert_eq!(lines[0]["error"], "invalid control ID: abc");
        assert_eq!(lines[1]["status"], "success");
        assert_eq!(lines[1]["value"], 10);
    }

    fn reply_lines(output: Vec<u8>) -> Vec<serde_json::Value> {
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_run_invalid_utf8_is_error_reply() {
        let (dispatcher, _) = dispatcher(Arc::new(NoDevice));
        let mut output = Vec::new();

        dispatcher
            .run(&b"\xff\xfe\nSTATS\n"[..], &mut output, CancellationToken::new())
            .await
            .unwrap();

        let lines = reply_lines(output);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["status"], "error");
        assert!(lines[0]["error"]
            .as_str()
            .unwrap()
            .starts_with("unknown command: "));
        assert_eq!(lines[1]["status"], "success");
        assert_eq!(lines[1]["command"], "STATS");
    }

    #[tokio::test]
    async fn test_run_overlong_line_rejected_once() {
        let (dispatcher, _) = dispatcher(Arc::new(NoDevice));
        let mut input = vec![b'A'; MAX_LINE_LEN * 2 + 10];
        input.extend_from_slice(b"\nSTATS\n");
        let mut output = Vec::new();

        dispatcher
            .run(input.as_slice(), &mut output, CancellationToken::new())
            .await
            .unwrap();

        let lines = reply_lines(output);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["status"], "error");
        assert_eq!(lines[0]["error"], "command line exceeds 65536 bytes");
        assert!(lines[0].get("command").is_none());
        assert_eq!(lines[1]["command"], "STATS");
    }

    #[tokio::test]
    async fn test_run_accepts_line_at_limit() {
        let (dispatcher, _) = dispatcher(Arc::new(NoDevice));
        let mut input = b"STATS".to_vec();
        input.resize(MAX_LINE_LEN, b' ');
        input.push(b'\n');
        let mut output = Vec::new();

        dispatcher
            .run(input.as_slice(), &mut output, CancellationToken::new())
            .await
            .unwrap();

        let lines = reply_lines(output);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["status"], "success");
    }

    #[tokio::test]
    async fn test_run_write_failure_is_error() {
        let (dispatcher, _) = dispatcher(Arc::new(NoDevice));
        let output = tokio_test::io::Builder::new()
            .write_error(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
            .build();

        let result = dispatcher
            .run(&b"STATS\n"[..], output, CancellationToken::new())
            .await;

        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn test_run_cancelled_while_waiting() {
        let (dispatcher, _) = dispatcher(Arc::new(NoDevice));
        let (mut client, server) = tokio::io::duplex(1024);
        let (server_read, server_write) = tokio::io::split(server);
        let cancel = CancellationToken::new();

        let handle = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                dispatcher
                    .run(BufReader::new(server_read), server_write, cancel)
                    .await
            })
        };

        client.write_all(b"STATS\n").await.unwrap();
        let mut replies = BufReader::new(&mut client);
        let mut line = String::new();
        timeout(Duration::from_secs(1), replies.read_line(&mut line))
            .await
            .unwrap()
            .unwrap();
        assert!(line.contains("\"status\":\"success\""));

        cancel.cancel();
        let result = timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        assert!(result.is_ok());
    }
}
