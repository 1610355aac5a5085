use anyhow::Result;
use anyhow::anyhow;
use anyhow::bail;
use async_trait::async_trait;
use purewolf_bridge::BridgeConfig;
use purewolf_bridge::HostIo;
use purewolf_bridge::HostLauncher;
use purewolf_bridge::LinkState;
use purewolf_bridge::NativeBridge;
use purewolf_protocol::OutboundFrame;
use purewolf_protocol::encode_frame;
use serde_json::Value;
use serde_json::json;
use std::io;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::DuplexStream;
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(2);

/// Launcher handing the bridge one end of an in-process pipe; the host end
/// is pushed to the test so it can script replies.
pub struct PipeLauncher {
    sides: mpsc::UnboundedSender<HostSide>,
}

pub fn pipe_launcher() -> (PipeLauncher, mpsc::UnboundedReceiver<HostSide>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (PipeLauncher { sides: tx }, rx)
}

#[async_trait]
impl HostLauncher for PipeLauncher {
    async fn launch(&self) -> io::Result<HostIo> {
        let (bridge_side, host_side) = tokio::io::duplex(64 * 1024);
        let (reader, writer) = tokio::io::split(bridge_side);
        self.sides
            .send(HostSide { io: host_side })
            .map_err(|_| io::Error::other("test dropped the host receiver"))?;
        Ok(HostIo {
            reader: Box::new(reader),
            writer: Box::new(writer),
            child: None,
        })
    }
}

/// Launcher that never manages to open a channel.
pub struct RefusingLauncher;

#[async_trait]
impl HostLauncher for RefusingLauncher {
    async fn launch(&self) -> io::Result<HostIo> {
        Err(io::Error::other("host binary missing"))
    }
}

/// The host's end of the pipe, with frame-level helpers.
pub struct HostSide {
    io: DuplexStream,
}

impl HostSide {
    /// Reads one frame the bridge sent to the host.
    pub async fn read_frame(&mut self) -> Result<OutboundFrame> {
        let mut header = [0u8; 4];
        timeout(WAIT, self.io.read_exact(&mut header)).await??;
        let len = u32::from_le_bytes(header) as usize;
        let mut body = vec![0u8; len];
        timeout(WAIT, self.io.read_exact(&mut body)).await??;
        Ok(serde_json::from_slice(&body)?)
    }

    pub async fn send_raw(&mut self, value: &Value) -> Result<()> {
        let bytes = encode_frame(value)?;
        self.io.write_all(&bytes).await?;
        Ok(())
    }

    pub async fn send_reply(&mut self, id: u64, result: Value) -> Result<()> {
        self.send_raw(&json!({"ok": true, "id": id, "result": result}))
            .await
    }

    pub async fn send_event(&mut self, name: &str, payload: Value) -> Result<()> {
        let Value::Object(mut fields) = payload else {
            bail!("event payload must be an object");
        };
        fields.insert("event".to_string(), Value::String(name.to_string()));
        self.send_raw(&Value::Object(fields)).await
    }
}

pub fn fast_config() -> BridgeConfig {
    BridgeConfig {
        retry_delay: Duration::from_millis(50),
        shutdown_grace: Duration::from_millis(25),
        event_capacity: 16,
    }
}

pub async fn recv_side(sides: &mut mpsc::UnboundedReceiver<HostSide>) -> Result<HostSide> {
    timeout(WAIT, sides.recv())
        .await?
        .ok_or_else(|| anyhow!("launcher dropped before producing a host side"))
}

pub async fn wait_for_state(bridge: &NativeBridge, want: LinkState) -> Result<()> {
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        if bridge.link_state() == want {
            return Ok(());
        }
        if tokio::time::Instant::now() > deadline {
            bail!(
                "timed out waiting for {want:?}, state is {:?}",
                bridge.link_state()
            );
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub fn request_id(frame: &OutboundFrame) -> Result<u64> {
    frame
        .id
        .map(|id| id.0)
        .ok_or_else(|| anyhow!("frame {frame:?} carries no request id"))
}
