mod room;
mod session;
mod settlement;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use dashmap::DashMap;
use futures_util::{SinkExt, stream::StreamExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};
use uuid::Uuid;

use ddz_arena_core::{ClientMessage, PlayerId, RoomId, ServerMessage};

use room::{RoomCommand, RoomHandle, TimeoutConfig, spawn_room};
use session::SessionStore;
use settlement::SettlementRecord;

/// 服务器全局状态：全局房间表 + 重连会话 + 结算写入端。
/// 房间表只用于路由命令，对局合法性全部由各房间自己的状态机裁决。
struct AppState {
    rooms: Arc<DashMap<RoomId, RoomHandle>>,
    sessions: Arc<SessionStore>,
    settle_tx: mpsc::UnboundedSender<SettlementRecord>,
    cfg: TimeoutConfig,
    base_score: u32,
}

type SharedState = Arc<AppState>;

/// 读取形如 `DDZ_ARENA_BID_TIMEOUT_SECS=30` 的环境变量，解析失败用默认值。
fn env_secs(name: &str, default_secs: u64) -> Duration {
    let secs = std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default_secs);
    Duration::from_secs(secs)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = TimeoutConfig {
        bid: env_secs("DDZ_ARENA_BID_TIMEOUT_SECS", 15),
        play: env_secs("DDZ_ARENA_PLAY_TIMEOUT_SECS", 30),
    };
    let state = SharedState::new(AppState {
        rooms: Arc::new(DashMap::new()),
        sessions: Arc::new(SessionStore::new()),
        settle_tx: settlement::spawn_sink(),
        cfg,
        base_score: 10,
    });

    let app = Router::new()
        .route("/ws", get(websocket_handler))
        .with_state(state);

    let addr: SocketAddr = std::env::var("DDZ_ARENA_ADDR")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 25918)));
    info!("服务器正在监听 {}", addr);
    axum::serve(tokio::net::TcpListener::bind(addr).await.unwrap(), app)
        .await
        .unwrap();
}

/// 处理 WebSocket 连接请求
async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// 处理单个 WebSocket 连接的生命周期
async fn handle_socket(socket: WebSocket, state: SharedState) {
    let (mut sender, mut receiver) = socket.split();

    // 无界通道承接房间 actor 发来的消息，由独立任务泵到 WebSocket。
    // 无界是有意的：房间 actor 绝不能因为某个连接写不动而被阻塞
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let payload = serde_json::to_string(&msg).unwrap();
            if sender.send(Message::Text(payload.into())).await.is_err() {
                // 发送失败，说明客户端已断开，退出任务
                break;
            }
        }
    });

    // 当前连接绑定的房间与玩家，入房/重连成功后填充
    let mut player_context: Option<(RoomId, PlayerId)> = None;

    while let Some(Ok(msg)) = receiver.next().await {
        if let Message::Text(text) = msg {
            match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => {
                    handle_client_message(client_msg, state.clone(), &tx, &mut player_context)
                        .await;
                }
                Err(e) => {
                    warn!("解析消息失败: {}", e);
                }
            }
        }
    }

    // 连接断开：通知房间把该玩家标记为离线（会话保留，可重连）
    if let Some((room_id, player_id)) = player_context {
        // 先把句柄克隆出来再 await，房间 actor 关闭时会从同一张表里自删
        let handle = state.rooms.get(&room_id).map(|h| h.clone());
        if let Some(handle) = handle {
            let _ = handle.tx.send(RoomCommand::Disconnect { player_id }).await;
        }
    }
    info!("客户端连接关闭");
}

/// 连接层的消息路由：房间管理消息在这里处理，
/// 对局内消息原样转发给对应房间的 actor 串行执行。
async fn handle_client_message(
    msg: ClientMessage,
    state: SharedState,
    tx: &mpsc::UnboundedSender<ServerMessage>,
    context: &mut Option<(RoomId, PlayerId)>,
) {
    match msg {
        ClientMessage::CreateRoom { nickname } => {
            if context.is_some() {
                let _ = tx.send(ServerMessage::Error { message: "你已经在一个房间里了".to_string() });
                return;
            }
            let room_id = Uuid::new_v4();
            let handle = spawn_room(
                room_id,
                state.base_score,
                state.cfg,
                state.rooms.clone(),
                state.sessions.clone(),
                state.settle_tx.clone(),
            );
            try_join(&handle, nickname, tx, context).await;
        }
        ClientMessage::JoinRoom { room_id, nickname } => {
            if context.is_some() {
                let _ = tx.send(ServerMessage::Error { message: "你已经在一个房间里了".to_string() });
                return;
            }
            let Some(handle) = state.rooms.get(&room_id).map(|h| h.clone()) else {
                let _ = tx.send(ServerMessage::Error { message: "房间不存在".to_string() });
                return;
            };
            try_join(&handle, nickname, tx, context).await;
        }
        ClientMessage::Reconnect { secret } => {
            let Some(session) = state.sessions.lookup(&secret) else {
                let _ = tx.send(ServerMessage::Error { message: "重连凭证无效或已过期".to_string() });
                return;
            };
            let Some(handle) = state.rooms.get(&session.room_id).map(|h| h.clone()) else {
                let _ = tx.send(ServerMessage::Error { message: "原房间已关闭".to_string() });
                return;
            };
            *context = Some((session.room_id, session.player_id));
            let _ = handle
                .tx
                .send(RoomCommand::Reconnect { player_id: session.player_id, conn: tx.clone() })
                .await;
        }
        // 对局内消息：必须已经入房
        other => {
            let Some((room_id, player_id)) = context else {
                let _ = tx.send(ServerMessage::Error { message: "请先加入或创建房间".to_string() });
                return;
            };
            let Some(handle) = state.rooms.get(room_id).map(|h| h.clone()) else {
                let _ = tx.send(ServerMessage::Error { message: "房间不存在".to_string() });
                return;
            };
            let _ = handle
                .tx
                .send(RoomCommand::Intent { player_id: *player_id, message: other })
                .await;
        }
    }
}

/// 请求入房并等待房间裁决：被拒（满员/对局中）时不绑定连接上下文，
/// 连接仍然可以去加入别的房间。
async fn try_join(
    handle: &RoomHandle,
    nickname: String,
    tx: &mpsc::UnboundedSender<ServerMessage>,
    context: &mut Option<(RoomId, PlayerId)>,
) {
    let player_id = Uuid::new_v4();
    let secret = Uuid::new_v4();
    let (reply_tx, reply_rx) = oneshot::channel();
    let sent = handle
        .tx
        .send(RoomCommand::Join {
            player_id,
            nickname,
            secret,
            conn: tx.clone(),
            reply: reply_tx,
        })
        .await;
    if sent.is_err() {
        let _ = tx.send(ServerMessage::Error { message: "房间已关闭".to_string() });
        return;
    }
    if reply_rx.await == Ok(true) {
        *context = Some((handle.id, player_id));
    }
}
