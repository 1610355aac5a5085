use crate::config::BridgeConfig;
use crate::errors::BridgeError;
use crate::pending::PendingTable;
use crate::pending::ReplySender;
use crate::reconnect::Directive;
use crate::reconnect::LinkState;
use crate::reconnect::ReconnectController;
use crate::transport::ChannelNotice;
use crate::transport::HostLauncher;
use crate::transport::HostWriter;
use crate::transport::spawn_reader;
use purewolf_protocol::EventFrame;
use purewolf_protocol::HostReply;
use purewolf_protocol::Inbound;
use purewolf_protocol::OutboundFrame;
use purewolf_protocol::RequestId;
use purewolf_protocol::encode_frame;
use purewolf_protocol::host::CMD_SHUTDOWN;
use serde_json::Value;
use std::io;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Child;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::info;
use tracing::warn;

/// Public handle to the bridge. Cheap to clone; every surface of the
/// extension shell talks to the same owner task through it.
#[derive(Clone)]
pub struct NativeBridge {
    ops: mpsc::UnboundedSender<Op>,
    state: watch::Receiver<LinkState>,
    events: broadcast::Sender<EventFrame>,
}

impl NativeBridge {
    /// Starts the bridge and immediately attempts the initial connect. A
    /// failed initial attempt is not an error here; the retry schedule
    /// takes over.
    ///
    /// Dropping the last handle tears the channel down and stops the task.
    pub fn spawn(launcher: impl HostLauncher + 'static, config: BridgeConfig) -> Self {
        let (ops_tx, ops_rx) = mpsc::unbounded_channel();
        let (ticks_tx, ticks_rx) = mpsc::unbounded_channel();
        let (notices_tx, notices_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(LinkState::Idle);
        let (events_tx, _) = broadcast::channel(config.event_capacity.max(1));
        let task = BridgeTask {
            launcher: Arc::new(launcher),
            config,
            channel: None,
            pending: PendingTable::default(),
            controller: ReconnectController::new(),
            draining: None,
            next_request_id: 0,
            next_generation: 0,
            ticks_tx,
            notices_tx,
            state_tx,
            events: events_tx.clone(),
        };
        tokio::spawn(task.run(ops_rx, ticks_rx, notices_rx));
        Self {
            ops: ops_tx,
            state: state_rx,
            events: events_tx,
        }
    }

    /// Issues one correlated command. Fails immediately with `NotConnected`
    /// when no channel is open; no pending entry is registered in that case.
    pub async fn call(
        &self,
        cmd: impl Into<String>,
        params: Value,
    ) -> Result<HostReply, BridgeError> {
        let (tx, rx) = oneshot::channel();
        let op = Op::Call {
            cmd: cmd.into(),
            params,
            reply: tx,
        };
        self.ops.send(op).map_err(|_| BridgeError::NotConnected)?;
        rx.await
            .map_err(|_| BridgeError::channel_lost("bridge task terminated"))?
    }

    /// User-initiated disconnect: best-effort `shutdown` frame, hard close
    /// after a short grace delay, and no automatic reconnect afterwards.
    pub async fn disconnect(&self) {
        let (tx, rx) = oneshot::channel();
        if self.ops.send(Op::Disconnect { done: tx }).is_ok() {
            let _ = rx.await;
        }
    }

    /// Clears the user-intent flag and attempts to open a channel now. The
    /// connect error is surfaced because the caller asked explicitly; on
    /// failure the retry schedule is armed as usual.
    pub async fn reconnect(&self) -> Result<(), BridgeError> {
        let (tx, rx) = oneshot::channel();
        self.ops
            .send(Op::Reconnect { done: tx })
            .map_err(|_| BridgeError::NotConnected)?;
        rx.await
            .map_err(|_| BridgeError::channel_lost("bridge task terminated"))?
    }

    /// Liveness probe: answers from current channel state without a host
    /// round-trip.
    pub fn is_alive(&self) -> bool {
        *self.state.borrow() == LinkState::Connected
    }

    pub fn link_state(&self) -> LinkState {
        *self.state.borrow()
    }

    /// Subscribes to unsolicited host events. Fan-out is best-effort and in
    /// arrival order; a subscriber that falls behind sees a lag error, never
    /// reordered frames.
    pub fn subscribe(&self) -> broadcast::Receiver<EventFrame> {
        self.events.subscribe()
    }
}

enum Op {
    Call {
        cmd: String,
        params: Value,
        reply: ReplySender,
    },
    Disconnect {
        done: oneshot::Sender<()>,
    },
    Reconnect {
        done: oneshot::Sender<Result<(), BridgeError>>,
    },
}

struct RetryTick {
    epoch: u64,
}

/// One open channel. Dropping it closes the writer and kills a spawned host
/// process, which makes the reader task observe EOF and report the loss.
struct Channel {
    generation: u64,
    writer: HostWriter,
    /// Held only so `kill_on_drop` fires when the channel is destroyed.
    #[allow(dead_code)]
    child: Option<Child>,
    /// Detached on drop, never aborted: the reader must stay alive until
    /// EOF so the loss notice is still delivered.
    #[allow(dead_code)]
    reader_task: JoinHandle<()>,
}

/// Exclusive owner of the channel, the pending table and the reconnect
/// state. All mutation happens on this task, which is what serializes the
/// user-intent writes ahead of any disconnect-detection read.
struct BridgeTask {
    launcher: Arc<dyn HostLauncher>,
    config: BridgeConfig,
    channel: Option<Channel>,
    pending: PendingTable,
    controller: ReconnectController,
    /// Generation and pending ids captured at explicit disconnect, released
    /// with `ChannelLost` once the grace close lands.
    draining: Option<(u64, Vec<RequestId>)>,
    next_request_id: u64,
    next_generation: u64,
    ticks_tx: mpsc::UnboundedSender<RetryTick>,
    notices_tx: mpsc::UnboundedSender<ChannelNotice>,
    state_tx: watch::Sender<LinkState>,
    events: broadcast::Sender<EventFrame>,
}

impl BridgeTask {
    async fn run(
        mut self,
        mut ops: mpsc::UnboundedReceiver<Op>,
        mut ticks: mpsc::UnboundedReceiver<RetryTick>,
        mut notices: mpsc::UnboundedReceiver<ChannelNotice>,
    ) {
        self.controller.begin_connect();
        if self.open_channel().await.is_err() {
            let directive = self.controller.connect_failed();
            self.apply(directive);
        }
        self.publish_state();

        loop {
            tokio::select! {
                op = ops.recv() => match op {
                    Some(op) => self.handle_op(op).await,
                    None => break,
                },
                Some(tick) = ticks.recv() => self.handle_tick(tick).await,
                Some(notice) = notices.recv() => self.handle_notice(notice),
            }
            self.publish_state();
        }

        // Last handle dropped: tear the channel down (kills a spawned host).
        self.channel = None;
        self.pending.cancel_all("bridge shut down");
    }

    async fn handle_op(&mut self, op: Op) {
        match op {
            Op::Call { cmd, params, reply } => self.handle_call(cmd, params, reply).await,
            Op::Disconnect { done } => {
                self.handle_disconnect().await;
                // State must be visible before the caller is released.
                self.publish_state();
                let _ = done.send(());
            }
            Op::Reconnect { done } => {
                self.controller.begin_connect();
                let result = self.open_channel().await;
                if result.is_err() {
                    let directive = self.controller.connect_failed();
                    self.apply(directive);
                }
                self.publish_state();
                let _ = done.send(result);
            }
        }
    }

    async fn handle_call(&mut self, cmd: String, params: Value, reply: ReplySender) {
        let Some(channel) = self.channel.as_mut() else {
            let _ = reply.send(Err(BridgeError::NotConnected));
            return;
        };

        self.next_request_id += 1;
        let id = RequestId(self.next_request_id);
        let frame = OutboundFrame::request(id, cmd, params);
        let bytes = match encode_frame(&frame) {
            Ok(bytes) => bytes,
            Err(err) => {
                let _ = reply.send(Err(BridgeError::Send {
                    error: io::Error::other(err),
                }));
                return;
            }
        };

        match write_frame(&mut channel.writer, &bytes).await {
            Ok(()) => self.pending.register(id, reply),
            Err(error) => {
                // The registration never becomes visible; the caller gets
                // the send failure, everyone else the loss cancellation.
                let _ = reply.send(Err(BridgeError::Send { error }));
                self.lose_channel("write to host failed");
            }
        }
    }

    async fn handle_disconnect(&mut self) {
        self.controller.user_disconnect();
        if let Some(mut channel) = self.channel.take() {
            let shutdown = OutboundFrame::control(CMD_SHUTDOWN);
            if let Ok(bytes) = encode_frame(&shutdown) {
                // Best-effort; the hard close below proceeds regardless.
                let _ = write_frame(&mut channel.writer, &bytes).await;
            }
            self.draining = Some((channel.generation, self.pending.ids()));
            let grace = self.config.shutdown_grace;
            info!(
                generation = channel.generation,
                "disconnect requested; hard close in {grace:?}"
            );
            let notices = self.notices_tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(grace).await;
                let generation = channel.generation;
                drop(channel);
                // The reader reports the loss too once the link actually
                // dies, but a host that ignores `shutdown` must not keep
                // disconnected callers waiting; whichever notice arrives
                // second is dropped by the generation check.
                let _ = notices.send(ChannelNotice::Closed {
                    generation,
                    reason: "closed by disconnect".to_string(),
                });
            });
        }
    }

    async fn handle_tick(&mut self, tick: RetryTick) {
        if !self.controller.retry_due(tick.epoch) {
            return;
        }
        if self.open_channel().await.is_err() {
            let directive = self.controller.connect_failed();
            self.apply(directive);
        }
    }

    fn handle_notice(&mut self, notice: ChannelNotice) {
        match notice {
            ChannelNotice::Inbound {
                generation,
                inbound,
            } => {
                if self.open_generation() != Some(generation) {
                    debug!(generation, "dropping frame from superseded channel");
                    return;
                }
                match inbound {
                    Inbound::Reply { id, reply } => {
                        if !self.pending.resolve(id, reply) {
                            debug!(%id, "dropping reply with no pending call");
                        }
                    }
                    Inbound::Event(frame) => {
                        // No listener attached is fine; the host does not
                        // expect an acknowledgement.
                        let _ = self.events.send(frame);
                    }
                }
            }
            ChannelNotice::Closed { generation, reason } => {
                self.handle_closed(generation, &reason);
            }
        }
    }

    fn handle_closed(&mut self, generation: u64, reason: &str) {
        if self.open_generation() == Some(generation) {
            info!(generation, reason, "native messaging channel lost");
            self.lose_channel(reason);
            return;
        }
        if let Some((drain_generation, ids)) = self.draining.take() {
            if drain_generation == generation {
                // The controller already sits in UserDisconnected; this only
                // releases the calls that were outstanding at disconnect.
                let cancelled = self.pending.cancel_ids(&ids, reason);
                debug!(generation, cancelled, "drained disconnected channel");
                return;
            }
            self.draining = Some((drain_generation, ids));
        }
        debug!(generation, "ignoring loss notice from superseded channel");
    }

    async fn open_channel(&mut self) -> Result<(), BridgeError> {
        if self.channel.is_some() {
            // Open is idempotent: one physical link at a time.
            self.controller.connect_succeeded();
            return Ok(());
        }
        match self.launcher.launch().await {
            Ok(io) => {
                self.next_generation += 1;
                let generation = self.next_generation;
                let reader_task = spawn_reader(io.reader, generation, self.notices_tx.clone());
                self.channel = Some(Channel {
                    generation,
                    writer: io.writer,
                    child: io.child,
                    reader_task,
                });
                self.controller.connect_succeeded();
                info!(generation, "native messaging channel open");
                Ok(())
            }
            Err(error) => {
                warn!(error = %error, "failed to open native messaging channel");
                Err(BridgeError::Connect { error })
            }
        }
    }

    /// Spontaneous channel loss: destroy the channel, release every waiting
    /// caller, and let the controller decide about recovery.
    fn lose_channel(&mut self, reason: &str) {
        self.channel = None;
        let cancelled = self.pending.cancel_all(reason);
        if cancelled > 0 {
            warn!(cancelled, reason, "cancelled outstanding calls");
        }
        let directive = self.controller.channel_lost();
        self.apply(directive);
    }

    fn apply(&self, directive: Directive) {
        if let Directive::ScheduleRetry { epoch } = directive {
            let ticks = self.ticks_tx.clone();
            let delay = self.config.retry_delay;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = ticks.send(RetryTick { epoch });
            });
        }
    }

    fn open_generation(&self) -> Option<u64> {
        self.channel.as_ref().map(|channel| channel.generation)
    }

    fn publish_state(&self) {
        let state = self.controller.state();
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }
}

async fn write_frame(writer: &mut HostWriter, bytes: &[u8]) -> io::Result<()> {
    writer.write_all(bytes).await?;
    writer.flush().await
}
