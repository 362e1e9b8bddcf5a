//! In-memory device used by unit tests.
//!
//! Models the channel state of each tuner, records every control-plane
//! request, and serves scripted `save` streams.

use std::collections::{HashSet, VecDeque};
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, ReadBuf};

use hdhr_protocol::{CHANNEL_NONE, SYS_VERSION_PATH};

use super::{DeviceError, DeviceLink, DeviceStream};

/// What a `save` stream does after its chunks are consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamEnd {
    /// Report end of stream.
    Eof,
    /// Never produce more data.
    Stall,
    /// Fail the next read.
    Fault,
}

#[derive(Debug, Clone)]
struct StreamScript {
    chunks: Vec<Bytes>,
    end: StreamEnd,
}

pub(crate) struct FakeDevice {
    tuners: Mutex<Vec<Option<String>>>,
    commands: Mutex<Vec<String>>,
    script: Mutex<StreamScript>,
    failing_sets: Mutex<HashSet<String>>,
    lost_replies: Mutex<HashSet<String>>,
    failing_status: Mutex<HashSet<usize>>,
    fail_version: AtomicBool,
    fail_save: AtomicBool,
    open_streams: Arc<AtomicUsize>,
}

impl FakeDevice {
    pub(crate) fn new(tuner_count: usize) -> Arc<Self> {
        Arc::new(Self {
            tuners: Mutex::new(vec![None; tuner_count]),
            commands: Mutex::new(Vec::new()),
            script: Mutex::new(StreamScript {
                chunks: Vec::new(),
                end: StreamEnd::Stall,
            }),
            failing_sets: Mutex::new(HashSet::new()),
            lost_replies: Mutex::new(HashSet::new()),
            failing_status: Mutex::new(HashSet::new()),
            fail_version: AtomicBool::new(false),
            fail_save: AtomicBool::new(false),
            open_streams: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Tune a tuner out-of-band, as another client would.
    pub(crate) fn occupy(&self, index: usize, channel: &str) {
        self.tuners.lock().unwrap()[index] = Some(channel.to_string());
    }

    pub(crate) fn tuner_channel(&self, index: usize) -> Option<String> {
        self.tuners.lock().unwrap()[index].clone()
    }

    pub(crate) fn is_idle(&self, index: usize) -> bool {
        self.tuner_channel(index).is_none()
    }

    pub(crate) fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    /// Only the `set` commands, in order.
    pub(crate) fn set_commands(&self) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter(|c| c.starts_with("set "))
            .collect()
    }

    pub(crate) fn fail_set(&self, path: &str) {
        self.failing_sets.lock().unwrap().insert(path.to_string());
    }

    /// Apply the next `set` on `path` but time out instead of replying.
    pub(crate) fn lose_set_reply(&self, path: &str) {
        self.lost_replies.lock().unwrap().insert(path.to_string());
    }

    pub(crate) fn fail_status(&self, index: usize) {
        self.failing_status.lock().unwrap().insert(index);
    }

    pub(crate) fn fail_version(&self, fail: bool) {
        self.fail_version.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_save(&self, fail: bool) {
        self.fail_save.store(fail, Ordering::SeqCst);
    }

    /// Script the next `save` streams.
    pub(crate) fn script_stream(&self, chunks: Vec<Bytes>, end: StreamEnd) {
        *self.script.lock().unwrap() = StreamScript { chunks, end };
    }

    /// Number of `save` streams not yet closed.
    pub(crate) fn open_streams(&self) -> usize {
        self.open_streams.load(Ordering::SeqCst)
    }

    fn record(&self, command: String) {
        self.commands.lock().unwrap().push(command);
    }

    fn status_line(&self, index: usize) -> Result<String, DeviceError> {
        if self.failing_status.lock().unwrap().contains(&index) {
            return Err(DeviceError::Timeout {
                verb: "get",
                path: format!("/tuner{}/status", index),
                secs: 15,
            });
        }
        let tuners = self.tuners.lock().unwrap();
        let Some(state) = tuners.get(index) else {
            return Err(unknown_variable("get", &format!("/tuner{}/status", index)));
        };
        Ok(match state {
            None => "ch=none lock=none ss=0 snq=0 seq=0 bps=0 pps=0".to_string(),
            Some(ch) => format!("ch={} lock=8vsb ss=87 snq=100 seq=100 bps=19394080 pps=0", ch),
        })
    }
}

fn tuner_index(path: &str, leaf: &str) -> Option<usize> {
    path.strip_prefix("/tuner")?
        .strip_suffix(leaf)?
        .parse()
        .ok()
}

fn unknown_variable(verb: &'static str, path: &str) -> DeviceError {
    DeviceError::CommandFailed {
        verb,
        path: path.to_string(),
        status: "exit status: 255".to_string(),
        detail: "ERROR: unknown getset variable".to_string(),
    }
}

#[async_trait]
impl DeviceLink for FakeDevice {
    fn address(&self) -> &str {
        "fake"
    }

    async fn get(&self, path: &str) -> Result<String, DeviceError> {
        self.record(format!("get {}", path));
        if path == SYS_VERSION_PATH {
            if self.fail_version.load(Ordering::SeqCst) {
                return Err(DeviceError::Timeout {
                    verb: "get",
                    path: path.to_string(),
                    secs: 15,
                });
            }
            return Ok("20200907".to_string());
        }
        match tuner_index(path, "/status") {
            Some(index) => self.status_line(index),
            None => Err(unknown_variable("get", path)),
        }
    }

    async fn set(&self, path: &str, value: &str) -> Result<(), DeviceError> {
        self.record(format!("set {} {}", path, value));
        if self.failing_sets.lock().unwrap().contains(path) {
            return Err(DeviceError::CommandFailed {
                verb: "set",
                path: path.to_string(),
                status: "exit status: 255".to_string(),
                detail: "ERROR: invalid value".to_string(),
            });
        }
        if let Some(index) = tuner_index(path, "/channel") {
            let mut tuners = self.tuners.lock().unwrap();
            let Some(slot) = tuners.get_mut(index) else {
                return Err(unknown_variable("set", path));
            };
            *slot = if value == CHANNEL_NONE {
                None
            } else {
                Some(value.to_string())
            };
        }
        if self.lost_replies.lock().unwrap().remove(path) {
            return Err(DeviceError::Timeout {
                verb: "set",
                path: path.to_string(),
                secs: 15,
            });
        }
        Ok(())
    }

    async fn save(&self, path: &str) -> Result<DeviceStream, DeviceError> {
        self.record(format!("save {}", path));
        if self.fail_save.load(Ordering::SeqCst) {
            return Err(DeviceError::Spawn(io::Error::new(
                io::ErrorKind::NotFound,
                "simulated spawn failure",
            )));
        }
        let script = self.script.lock().unwrap().clone();
        self.open_streams.fetch_add(1, Ordering::SeqCst);
        let reader = ScriptedReader {
            chunks: script.chunks.into(),
            end: script.end,
            open_streams: Arc::clone(&self.open_streams),
        };
        Ok(DeviceStream::from_reader(path, reader))
    }
}

struct ScriptedReader {
    chunks: VecDeque<Bytes>,
    end: StreamEnd,
    open_streams: Arc<AtomicUsize>,
}

impl AsyncRead for ScriptedReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if let Some(mut chunk) = self.chunks.pop_front() {
            let n = chunk.len().min(buf.remaining());
            buf.put_slice(&chunk[..n]);
            if n < chunk.len() {
                let rest = chunk.split_off(n);
                self.chunks.push_front(rest);
            }
            return Poll::Ready(Ok(()));
        }
        match self.end {
            StreamEnd::Eof => Poll::Ready(Ok(())),
            StreamEnd::Stall => Poll::Pending,
            StreamEnd::Fault => Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "simulated device fault",
            ))),
        }
    }
}

impl Drop for ScriptedReader {
    fn drop(&mut self) {
        self.open_streams.fetch_sub(1, Ordering::SeqCst);
    }
}
