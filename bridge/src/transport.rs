use async_trait::async_trait;
use purewolf_protocol::DecodeError;
use purewolf_protocol::Inbound;
use purewolf_protocol::frame_len;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWrite;
use tokio::process::Child;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::warn;

pub type HostReader = Box<dyn AsyncRead + Send + Unpin>;
pub type HostWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// One physical duplex link to the host process.
pub struct HostIo {
    pub reader: HostReader,
    pub writer: HostWriter,
    pub child: Option<Child>,
}

/// Seam producing the duplex byte stream to the host. Production spawns the
/// registered host binary; tests substitute an in-process pipe.
#[async_trait]
pub trait HostLauncher: Send + Sync {
    async fn launch(&self) -> io::Result<HostIo>;
}

/// Spawns the native host binary and speaks the wire format over its stdio.
#[derive(Clone, Debug)]
pub struct NativeHostLauncher {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl NativeHostLauncher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }
}

#[async_trait]
impl HostLauncher for NativeHostLauncher {
    async fn launch(&self) -> io::Result<HostIo> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            // stdout carries frames; the host logs on stderr.
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::other("host stdin was not piped"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("host stdout was not piped"))?;
        Ok(HostIo {
            reader: Box::new(stdout),
            writer: Box::new(stdin),
            child: Some(child),
        })
    }
}

/// Messages from a reader task to the bridge task. `generation` identifies
/// the channel instance so traffic from a superseded channel is discarded.
#[derive(Debug)]
pub(crate) enum ChannelNotice {
    Inbound { generation: u64, inbound: Inbound },
    Closed { generation: u64, reason: String },
}

/// Pumps frames off the channel until it dies, then reports the loss exactly
/// once for this generation.
pub(crate) fn spawn_reader(
    mut reader: HostReader,
    generation: u64,
    notices: mpsc::UnboundedSender<ChannelNotice>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let reason = loop {
            match read_raw_frame(&mut reader).await {
                Ok(Some(body)) => match Inbound::from_slice(&body) {
                    Ok(inbound) => {
                        let notice = ChannelNotice::Inbound {
                            generation,
                            inbound,
                        };
                        if notices.send(notice).is_err() {
                            // Bridge task is gone; nobody left to notify.
                            return;
                        }
                    }
                    Err(DecodeError::Unroutable) => {
                        debug!(generation, "dropping unroutable frame");
                    }
                    Err(err) => {
                        warn!(generation, error = %err, "dropping undecodable frame");
                    }
                },
                Ok(None) => break "host closed the channel".to_string(),
                Err(err) => break err.to_string(),
            }
        };
        let _ = notices.send(ChannelNotice::Closed { generation, reason });
    })
}

/// Reads one length-prefixed frame body. `None` means clean EOF at a frame
/// boundary; EOF mid-frame and oversize prefixes are errors.
async fn read_raw_frame(reader: &mut HostReader) -> io::Result<Option<Vec<u8>>> {
    let mut header = [0u8; 4];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err),
    }
    let len = frame_len(header).map_err(io::Error::other)?;
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(body))
}
