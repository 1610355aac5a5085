use super::common::RefusingLauncher;
use super::common::fast_config;
use super::common::pipe_launcher;
use super::common::recv_side;
use super::common::request_id;
use super::common::wait_for_state;
use anyhow::Result;
use pretty_assertions::assert_eq;
use purewolf_bridge::LinkState;
use purewolf_bridge::NativeBridge;
use purewolf_bridge::router::UiBroadcast;
use purewolf_bridge::router::UiMessage;
use purewolf_bridge::router::UiRequest;
use purewolf_bridge::router::UiResponse;
use purewolf_bridge::router::spawn_router;
use serde_json::Value;
use serde_json::json;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::time::timeout;

async fn send(bus: &mpsc::UnboundedSender<UiRequest>, message: UiMessage) -> Result<UiResponse> {
    let (tx, rx) = oneshot::channel();
    bus.send(UiRequest {
        message,
        respond: tx,
    })?;
    Ok(timeout(Duration::from_secs(2), rx).await??)
}

fn command(cmd: &str, params: Value) -> UiMessage {
    UiMessage::Command {
        cmd: cmd.to_string(),
        params,
    }
}

#[test]
fn bus_envelopes_deserialize_into_the_right_variant() -> Result<()> {
    let closed: UiMessage = serde_json::from_value(json!({"type": "ui_closed"}))?;
    assert_eq!(
        closed,
        UiMessage::Lifecycle {
            kind: "ui_closed".to_string()
        }
    );

    let call: UiMessage =
        serde_json::from_value(json!({"cmd": "set_node", "params": {"node": "X"}}))?;
    assert_eq!(
        call,
        UiMessage::Command {
            cmd: "set_node".to_string(),
            params: json!({"node": "X"}),
        }
    );
    Ok(())
}

#[tokio::test]
async fn ui_closed_is_acked_without_reaching_the_bridge() -> Result<()> {
    let bridge = NativeBridge::spawn(RefusingLauncher, fast_config());
    let (bus, requests) = mpsc::unbounded_channel();
    spawn_router(bridge, requests);

    let response = send(
        &bus,
        UiMessage::Lifecycle {
            kind: "ui_closed".to_string(),
        },
    )
    .await?;
    assert!(response.ok);
    assert_eq!(response.error, None);
    Ok(())
}

#[tokio::test]
async fn native_ping_answers_from_channel_state() -> Result<()> {
    let (launcher, mut sides) = pipe_launcher();
    let bridge = NativeBridge::spawn(launcher, fast_config());
    let _host = recv_side(&mut sides).await?;
    wait_for_state(&bridge, LinkState::Connected).await?;

    let (bus, requests) = mpsc::unbounded_channel();
    spawn_router(bridge.clone(), requests);

    let response = send(&bus, command("native_ping", json!({}))).await?;
    assert_eq!(response.alive, Some(true));

    let response = send(&bus, command("native_disconnect", json!({}))).await?;
    assert!(response.ok);

    let response = send(&bus, command("native_ping", json!({}))).await?;
    assert_eq!(response.alive, Some(false));
    Ok(())
}

#[tokio::test]
async fn bridge_failures_become_error_responses() -> Result<()> {
    let bridge = NativeBridge::spawn(RefusingLauncher, fast_config());
    wait_for_state(&bridge, LinkState::RetryScheduled).await?;
    let (bus, requests) = mpsc::unbounded_channel();
    spawn_router(bridge, requests);

    let response = send(&bus, command("list_scids", json!({}))).await?;
    assert!(!response.ok);
    assert_eq!(
        response.error.as_deref(),
        Some("native host is not connected")
    );
    Ok(())
}

#[tokio::test]
async fn commands_are_forwarded_verbatim_and_answered() -> Result<()> {
    let (launcher, mut sides) = pipe_launcher();
    let bridge = NativeBridge::spawn(launcher, fast_config());
    let mut host = recv_side(&mut sides).await?;
    wait_for_state(&bridge, LinkState::Connected).await?;

    let (bus, requests) = mpsc::unbounded_channel();
    spawn_router(bridge, requests);

    let pending = tokio::spawn({
        let bus = bus.clone();
        async move { send(&bus, command("load_scid", json!({"scid": "abc"}))).await }
    });
    let frame = host.read_frame().await?;
    assert_eq!(frame.cmd, "load_scid");
    assert_eq!(frame.params, json!({"scid": "abc"}));
    host.send_reply(request_id(&frame)?, json!({"url": "http://127.0.0.1:4040/tela/abc/"}))
        .await?;

    let response = pending.await??;
    assert!(response.ok);
    assert_eq!(
        response.result,
        Some(json!({"url": "http://127.0.0.1:4040/tela/abc/"}))
    );
    Ok(())
}

#[tokio::test]
async fn host_events_are_rebroadcast_to_surfaces() -> Result<()> {
    let (launcher, mut sides) = pipe_launcher();
    let bridge = NativeBridge::spawn(launcher, fast_config());
    let mut host = recv_side(&mut sides).await?;
    wait_for_state(&bridge, LinkState::Connected).await?;

    let (_bus, requests) = mpsc::unbounded_channel();
    let (broadcasts, _router) = spawn_router(bridge, requests);
    let mut surface = broadcasts.subscribe();

    host.send_event("sync_progress", json!({"indexed": 7, "chain": 9}))
        .await?;

    let broadcast = timeout(Duration::from_secs(2), surface.recv()).await??;
    let UiBroadcast::HostEvent(frame) = &broadcast else {
        panic!("expected a host event broadcast, got {broadcast:?}");
    };
    assert_eq!(frame.name, "sync_progress");
    assert_eq!(
        broadcast.to_value(),
        json!({"event": "sync_progress", "indexed": 7, "chain": 9})
    );
    Ok(())
}

#[tokio::test]
async fn disconnect_command_notifies_every_surface() -> Result<()> {
    let (launcher, mut sides) = pipe_launcher();
    let bridge = NativeBridge::spawn(launcher, fast_config());
    let _host = recv_side(&mut sides).await?;
    wait_for_state(&bridge, LinkState::Connected).await?;

    let (bus, requests) = mpsc::unbounded_channel();
    let (broadcasts, _router) = spawn_router(bridge, requests);
    let mut surface: broadcast::Receiver<UiBroadcast> = broadcasts.subscribe();

    let response = send(&bus, command("native_disconnect", json!({}))).await?;
    assert!(response.ok);

    let notice = timeout(Duration::from_secs(2), surface.recv()).await??;
    assert_eq!(notice, UiBroadcast::NativeDisconnect);
    assert_eq!(notice.to_value(), json!({"cmd": "native_disconnect"}));
    Ok(())
}
