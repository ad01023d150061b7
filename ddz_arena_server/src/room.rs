use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use ddz_arena_core::{
    BidEntry, BidOutcome, ClientMessage, MatchState, PassOutcome, Phase, PlayOutcome, PlayerId,
    PlayerSecret, RoomId, ServerMessage, TimeoutOutcome,
};

use crate::session::SessionStore;
use crate::settlement::SettlementRecord;

/// 每个房间固定三个座位。
pub const ROOM_CAPACITY: usize = 3;

/// 回合计时配置，从环境变量读入（见 main）。
#[derive(Debug, Clone, Copy)]
pub struct TimeoutConfig {
    pub bid: Duration,
    pub play: Duration,
}

/// 发往房间 actor 的命令。玩家动作和计时器到期走同一条通道，
/// 天然串行，房间状态完全不需要锁。
#[derive(Debug)]
pub enum RoomCommand {
    Join {
        player_id: PlayerId,
        nickname: String,
        secret: PlayerSecret,
        conn: mpsc::UnboundedSender<ServerMessage>,
        /// 入房裁决：连接层只有收到 true 才把连接绑定到这个房间。
        reply: oneshot::Sender<bool>,
    },
    Reconnect {
        player_id: PlayerId,
        conn: mpsc::UnboundedSender<ServerMessage>,
    },
    Disconnect {
        player_id: PlayerId,
    },
    Intent {
        player_id: PlayerId,
        message: ClientMessage,
    },
    /// 回合计时器到期。`generation` 是布防时的回合代号，
    /// 与当前代号不符说明真实动作已经先到，直接丢弃。
    TurnTimeout {
        generation: u64,
    },
}

/// 房间的对外句柄，注册在全局房间表里。
#[derive(Clone)]
pub struct RoomHandle {
    pub id: RoomId,
    pub tx: mpsc::Sender<RoomCommand>,
}

struct RoomPlayer {
    id: PlayerId,
    nickname: String,
    ready: bool,
    conn: Option<mpsc::UnboundedSender<ServerMessage>>,
}

/// 房间 actor：唯一允许调度回合计时器、唯一允许修改 MatchState 的组件。
///
/// 一个房间一个 tokio 任务，所有意图按到达顺序逐个处理。
/// 真实动作提交时回合代号自增，晚到的计时器命令必然失配、必然无效，
/// 不存在"动作和兜底同时生效"的窗口。
pub struct RoomActor {
    room_id: RoomId,
    base_score: u32,
    cfg: TimeoutConfig,
    players: Vec<RoomPlayer>,
    host_id: PlayerId,
    state: Option<MatchState>,
    turn_gen: u64,
    turn_deadline: Option<Instant>,
    timer: Option<JoinHandle<()>>,
    cmd_tx: mpsc::Sender<RoomCommand>,
    rooms: Arc<DashMap<RoomId, RoomHandle>>,
    sessions: Arc<SessionStore>,
    settle_tx: mpsc::UnboundedSender<SettlementRecord>,
}

/// 创建房间并启动它的 actor 任务，把句柄登记进全局房间表。
pub fn spawn_room(
    room_id: RoomId,
    base_score: u32,
    cfg: TimeoutConfig,
    rooms: Arc<DashMap<RoomId, RoomHandle>>,
    sessions: Arc<SessionStore>,
    settle_tx: mpsc::UnboundedSender<SettlementRecord>,
) -> RoomHandle {
    let (tx, rx) = mpsc::channel(64);
    let handle = RoomHandle { id: room_id, tx: tx.clone() };
    rooms.insert(room_id, handle.clone());

    let actor = RoomActor {
        room_id,
        base_score,
        cfg,
        players: Vec::new(),
        host_id: Uuid::nil(),
        state: None,
        turn_gen: 0,
        turn_deadline: None,
        timer: None,
        cmd_tx: tx,
        rooms,
        sessions,
        settle_tx,
    };
    tokio::spawn(actor.run(rx));
    handle
}

impl RoomActor {
    async fn run(mut self, mut rx: mpsc::Receiver<RoomCommand>) {
        info!("房间 {} 已创建", self.room_id);
        while let Some(cmd) = rx.recv().await {
            self.handle(cmd).await;
            if self.should_close() {
                break;
            }
        }
        if let Some(t) = self.timer.take() {
            t.abort();
        }
        self.rooms.remove(&self.room_id);
        self.sessions.remove_room(self.room_id);
        info!("房间 {} 已销毁", self.room_id);
    }

    /// 所有人都断开且没有进行中的对局时关闭房间。
    fn should_close(&self) -> bool {
        let all_offline = self.players.iter().all(|p| p.conn.is_none());
        let in_match = self
            .state
            .as_ref()
            .is_some_and(|s| s.phase != Phase::Finished);
        (self.players.is_empty() || all_offline) && !in_match
    }

    async fn handle(&mut self, cmd: RoomCommand) {
        match cmd {
            RoomCommand::Join { player_id, nickname, secret, conn, reply } => {
                self.on_join(player_id, nickname, secret, conn, reply).await
            }
            RoomCommand::Reconnect { player_id, conn } => {
                self.on_reconnect(player_id, conn).await
            }
            RoomCommand::Disconnect { player_id } => self.on_disconnect(player_id).await,
            RoomCommand::Intent { player_id, message } => {
                self.on_intent(player_id, message).await
            }
            RoomCommand::TurnTimeout { generation } => self.on_turn_timeout(generation).await,
        }
    }

    // --- 入房 / 断线 / 重连 ---

    async fn on_join(
        &mut self,
        player_id: PlayerId,
        nickname: String,
        secret: PlayerSecret,
        conn: mpsc::UnboundedSender<ServerMessage>,
        reply: oneshot::Sender<bool>,
    ) {
        if self.players.len() >= ROOM_CAPACITY {
            let _ = conn.send(ServerMessage::Error { message: "房间已满".to_string() });
            let _ = reply.send(false);
            return;
        }
        if self.state.as_ref().is_some_and(|s| s.phase != Phase::Finished) {
            let _ = conn.send(ServerMessage::Error { message: "对局进行中，不能加入".to_string() });
            let _ = reply.send(false);
            return;
        }

        let seat = self.players.len() as u8;
        if self.players.is_empty() {
            self.host_id = player_id;
        }
        self.sessions.insert(secret, self.room_id, player_id);
        self.broadcast(&ServerMessage::PlayerJoined {
            player_id,
            nickname: nickname.clone(),
            seat,
        })
        .await;
        let _ = conn.send(ServerMessage::RoomJoined {
            your_id: player_id,
            your_secret: secret,
            your_seat: seat,
            room_id: self.room_id,
        });
        self.players.push(RoomPlayer { id: player_id, nickname, ready: false, conn: Some(conn) });
        let _ = reply.send(true);
        info!("玩家 {} 加入房间 {} 座位 {}", player_id, self.room_id, seat);
    }

    async fn on_disconnect(&mut self, player_id: PlayerId) {
        let Some(player) = self.players.iter_mut().find(|p| p.id == player_id) else {
            return;
        };
        player.conn = None;
        player.ready = false;
        if let Some(state) = self.state.as_mut() {
            if let Some(p) = state.players.iter_mut().find(|p| p.id == player_id) {
                p.online = false;
            }
        }
        self.broadcast(&ServerMessage::PlayerOnline { player_id, online: false }).await;

        // 房主断开时移交房主
        if player_id == self.host_id {
            if let Some(next) = self.players.iter().find(|p| p.conn.is_some()) {
                self.host_id = next.id;
                let message = format!("房主已断开，新房主是 {}", next.nickname);
                self.broadcast(&ServerMessage::Info { message }).await;
            }
        }

        // 未开局时直接让出座位；对局中保留座位和手牌等待重连
        if self.state.as_ref().is_none_or(|s| s.phase == Phase::Finished) {
            self.players.retain(|p| p.id != player_id);
            self.broadcast(&ServerMessage::PlayerLeft { player_id }).await;
        }
        info!("玩家 {} 从房间 {} 断开", player_id, self.room_id);
    }

    /// 重连：换绑连接、补发个人快照和剩余时限。
    /// 计时器归 arm_turn 独占管理，这里绝不补一个新的。
    async fn on_reconnect(&mut self, player_id: PlayerId, conn: mpsc::UnboundedSender<ServerMessage>) {
        let Some(player) = self.players.iter_mut().find(|p| p.id == player_id) else {
            let _ = conn.send(ServerMessage::Error { message: "会话已失效".to_string() });
            return;
        };
        player.conn = Some(conn.clone());
        if let Some(state) = self.state.as_mut() {
            if let Some(p) = state.players.iter_mut().find(|p| p.id == player_id) {
                p.online = true;
            }
        }
        self.broadcast(&ServerMessage::PlayerOnline { player_id, online: true }).await;

        if let Some(state) = &self.state {
            let _ = conn.send(ServerMessage::Snapshot(state.for_client(Some(player_id))));
            if state.phase != Phase::Finished {
                if let Some(deadline) = self.turn_deadline {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    let _ = conn.send(ServerMessage::TurnToAct {
                        seat: state.current_seat,
                        deadline_ms: remaining.as_millis() as u64,
                    });
                }
            }
        }
        info!("玩家 {} 重连回房间 {}", player_id, self.room_id);
    }

    // --- 意图分发 ---

    async fn on_intent(&mut self, player_id: PlayerId, message: ClientMessage) {
        if !self.players.iter().any(|p| p.id == player_id) {
            return;
        }
        match message {
            ClientMessage::Ready => self.on_ready(player_id).await,
            ClientMessage::Bid { score } => self.on_bid(player_id, score).await,
            ClientMessage::PlayCards { card_ids } => self.on_play(player_id, &card_ids).await,
            ClientMessage::Pass => self.on_pass(player_id).await,
            ClientMessage::RequestHint => self.on_hint(player_id).await,
            ClientMessage::GetState => self.on_get_state(player_id).await,
            other => {
                warn!("房间 {} 收到不该路由进来的消息: {:?}", self.room_id, other);
            }
        }
    }

    async fn on_ready(&mut self, player_id: PlayerId) {
        if let Some(p) = self.players.iter_mut().find(|p| p.id == player_id) {
            p.ready = true;
        }
        let all_ready =
            self.players.len() == ROOM_CAPACITY && self.players.iter().all(|p| p.ready);
        let in_match = self
            .state
            .as_ref()
            .is_some_and(|s| s.phase != Phase::Finished);
        if !all_ready || in_match {
            return;
        }

        // 三人就绪，开局
        let roster: [(PlayerId, String); 3] = std::array::from_fn(|i| {
            (self.players[i].id, self.players[i].nickname.clone())
        });
        let mut state = MatchState::new(self.room_id, roster, self.base_score);
        state.deal();
        let first_seat = state.current_seat;
        self.state = Some(state);

        self.broadcast(&ServerMessage::MatchStarted { first_seat }).await;
        self.send_snapshots().await;
        self.arm_turn().await;
        info!("房间 {} 开局，座位 {} 先叫分", self.room_id, first_seat);
    }

    async fn on_bid(&mut self, player_id: PlayerId, score: u8) {
        let Some(state) = self.state.as_mut() else {
            self.reject_protocol(player_id, "对局尚未开始").await;
            return;
        };
        let seat = state.current_seat;
        match state.bid(player_id, score) {
            Ok(out) => self.after_bid(seat, score, out).await,
            Err(reason) => self.send_to(player_id, ServerMessage::Rejected { reason }).await,
        }
    }

    async fn after_bid(&mut self, seat: u8, score: u8, out: BidOutcome) {
        if out.redeal {
            // 重发只发生在三家连续不叫之后，此时引擎已清空叫分历史，
            // 按座位顺序补出这三声 0 分，先播第三声再播重发
            let history: Vec<BidEntry> = (1..=3)
                .map(|i| BidEntry { seat: (seat + i) % 3, score: 0 })
                .collect();
            self.broadcast(&ServerMessage::BidMade { seat, score: 0, history }).await;
            let first_seat = self.state.as_ref().unwrap().current_seat;
            self.broadcast(&ServerMessage::Redealt { first_seat }).await;
            self.send_snapshots().await;
            self.arm_turn().await;
            return;
        }

        let state = self.state.as_ref().unwrap();
        self.broadcast(&ServerMessage::BidMade {
            seat,
            score,
            history: state.bid_history.clone(),
        })
        .await;

        if let Some(landlord_seat) = out.decided {
            let state = self.state.as_ref().unwrap();
            self.broadcast(&ServerMessage::LandlordDecided {
                landlord_seat,
                bottom: state.bottom.clone(),
                multiplier: state.multiplier,
            })
            .await;
            self.send_snapshots().await;
        }
        self.arm_turn().await;
    }

    async fn on_play(&mut self, player_id: PlayerId, card_ids: &[u8]) {
        let Some(state) = self.state.as_mut() else {
            self.reject_protocol(player_id, "对局尚未开始").await;
            return;
        };
        let seat = state.current_seat;
        match state.play_cards(player_id, card_ids) {
            Ok(out) => self.after_play(seat, out).await,
            Err(reason) => self.send_to(player_id, ServerMessage::Rejected { reason }).await,
        }
    }

    async fn after_play(&mut self, seat: u8, out: PlayOutcome) {
        let state = self.state.as_ref().unwrap();
        let cards_left = state.players[seat as usize].hand.len();
        self.broadcast(&ServerMessage::Played {
            seat,
            pattern: out.pattern.clone(),
            cards_left,
            multiplier: state.multiplier,
        })
        .await;

        if let Some(settlement) = out.settlement {
            self.broadcast(&ServerMessage::MatchSettled { settlement: settlement.clone() }).await;
            // fire-and-forget，绝不等待持久化
            let _ = self
                .settle_tx
                .send(SettlementRecord { room_id: self.room_id, settlement });
            for p in self.players.iter_mut() {
                p.ready = false;
            }
        }
        self.arm_turn().await;
    }

    async fn on_pass(&mut self, player_id: PlayerId) {
        let Some(state) = self.state.as_mut() else {
            self.reject_protocol(player_id, "对局尚未开始").await;
            return;
        };
        let seat = state.current_seat;
        match state.pass(player_id) {
            Ok(out) => self.after_pass(seat, out).await,
            Err(reason) => self.send_to(player_id, ServerMessage::Rejected { reason }).await,
        }
    }

    async fn after_pass(&mut self, seat: u8, out: PassOutcome) {
        self.broadcast(&ServerMessage::Passed { seat }).await;
        if out.new_round {
            self.broadcast(&ServerMessage::NewRound { leader_seat: out.next_seat }).await;
        }
        self.arm_turn().await;
    }

    async fn on_hint(&mut self, player_id: PlayerId) {
        let cards = self.state.as_ref().and_then(|s| s.hint(player_id));
        self.send_to(player_id, ServerMessage::HintResult { cards }).await;
    }

    async fn on_get_state(&mut self, player_id: PlayerId) {
        match &self.state {
            Some(state) => {
                let snap = state.for_client(Some(player_id));
                self.send_to(player_id, ServerMessage::Snapshot(snap)).await;
            }
            None => self.reject_protocol(player_id, "对局尚未开始").await,
        }
    }

    // --- 回合计时 ---

    /// 布防当前回合的计时器。
    ///
    /// 先自增回合代号再布防：任何旧计时器即使已经在途，
    /// 到达时也因代号失配而作废。对局结束时只撤防不再布防。
    async fn arm_turn(&mut self) {
        self.turn_gen += 1;
        if let Some(t) = self.timer.take() {
            t.abort();
        }
        self.turn_deadline = None;

        let Some(state) = &self.state else { return };
        let dur = match state.phase {
            Phase::Bidding => self.cfg.bid,
            Phase::Playing => self.cfg.play,
            Phase::Dealing | Phase::Finished => return,
        };
        let seat = state.current_seat;
        let generation = self.turn_gen;
        let tx = self.cmd_tx.clone();
        self.turn_deadline = Some(Instant::now() + dur);
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(dur).await;
            let _ = tx.send(RoomCommand::TurnTimeout { generation }).await;
        }));

        self.broadcast(&ServerMessage::TurnToAct {
            seat,
            deadline_ms: dur.as_millis() as u64,
        })
        .await;
    }

    async fn on_turn_timeout(&mut self, generation: u64) {
        if generation != self.turn_gen {
            // 真实动作已经抢先提交，这个计时器作废
            return;
        }
        let Some(state) = self.state.as_mut() else { return };
        if state.phase == Phase::Finished {
            return;
        }
        let seat = state.current_seat;
        info!("房间 {} 座位 {} 行动超时，执行兜底动作", self.room_id, seat);
        match state.timeout_action() {
            TimeoutOutcome::Bid(out) => self.after_bid(seat, 0, out).await,
            TimeoutOutcome::Passed(out) => self.after_pass(seat, out).await,
            TimeoutOutcome::Played(out) => self.after_play(seat, out).await,
        }
    }

    // --- 消息投递 ---

    /// 所有投递都是非阻塞的：连接通道无界，慢客户端只会积压自己的
    /// 队列，永远拖不住房间 actor 和它的计时兜底。
    async fn broadcast(&self, message: &ServerMessage) {
        for p in &self.players {
            if let Some(conn) = &p.conn {
                if conn.send(message.clone()).is_err() {
                    warn!("向玩家 {} 发送消息失败（可能已断开）", p.id);
                }
            }
        }
    }

    /// 每人一份净化快照，自己的手牌只发给自己。
    async fn send_snapshots(&self) {
        let Some(state) = &self.state else { return };
        for p in &self.players {
            if let Some(conn) = &p.conn {
                let snap = state.for_client(Some(p.id));
                let _ = conn.send(ServerMessage::Snapshot(snap));
            }
        }
    }

    async fn send_to(&self, player_id: PlayerId, message: ServerMessage) {
        if let Some(p) = self.players.iter().find(|p| p.id == player_id) {
            if let Some(conn) = &p.conn {
                let _ = conn.send(message);
            }
        }
    }

    async fn reject_protocol(&self, player_id: PlayerId, message: &str) {
        self.send_to(player_id, ServerMessage::Error { message: message.to_string() }).await;
    }
}

// --- 单元测试 ---

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    struct TestRoom {
        handle: RoomHandle,
        ids: Vec<PlayerId>,
        rxs: Vec<mpsc::UnboundedReceiver<ServerMessage>>,
        _settle_rx: mpsc::UnboundedReceiver<SettlementRecord>,
    }

    /// 请求入房并等待房间裁决，返回（接收端，是否被接纳）。
    async fn join_room(
        handle: &RoomHandle,
        player_id: PlayerId,
        nickname: String,
    ) -> (mpsc::UnboundedReceiver<ServerMessage>, bool) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        handle
            .tx
            .send(RoomCommand::Join {
                player_id,
                nickname,
                secret: Uuid::new_v4(),
                conn: tx,
                reply: reply_tx,
            })
            .await
            .unwrap();
        let accepted = reply_rx.await.unwrap();
        (rx, accepted)
    }

    /// 建房 + 三人入座，返回各自的接收端。
    async fn setup_room(cfg: TimeoutConfig) -> TestRoom {
        let rooms = Arc::new(DashMap::new());
        let sessions = Arc::new(SessionStore::new());
        let (settle_tx, settle_rx) = mpsc::unbounded_channel();
        let handle = spawn_room(Uuid::new_v4(), 10, cfg, rooms, sessions, settle_tx);

        let mut ids = Vec::new();
        let mut rxs = Vec::new();
        for i in 0..3 {
            let player_id = Uuid::new_v4();
            let (rx, accepted) = join_room(&handle, player_id, format!("玩家{}", i)).await;
            assert!(accepted);
            ids.push(player_id);
            rxs.push(rx);
        }
        TestRoom { handle, ids, rxs, _settle_rx: settle_rx }
    }

    /// 在 2 秒内等到第一条满足条件的消息，途中其他消息直接跳过。
    async fn expect_msg<F>(
        rx: &mut mpsc::UnboundedReceiver<ServerMessage>,
        pred: F,
    ) -> ServerMessage
    where
        F: Fn(&ServerMessage) -> bool,
    {
        timeout(Duration::from_secs(2), async {
            loop {
                let msg = rx.recv().await.expect("房间通道被意外关闭");
                if pred(&msg) {
                    return msg;
                }
            }
        })
        .await
        .expect("等待消息超时")
    }

    async fn all_ready(room: &mut TestRoom) -> u8 {
        for &id in &room.ids {
            room.handle
                .tx
                .send(RoomCommand::Intent { player_id: id, message: ClientMessage::Ready })
                .await
                .unwrap();
        }
        let msg = expect_msg(&mut room.rxs[0], |m| {
            matches!(m, ServerMessage::MatchStarted { .. })
        })
        .await;
        match msg {
            ServerMessage::MatchStarted { first_seat } => first_seat,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_bid_timeout_falls_back_to_zero() {
        let cfg = TimeoutConfig {
            bid: Duration::from_millis(50),
            play: Duration::from_secs(10),
        };
        let mut room = setup_room(cfg).await;
        all_ready(&mut room).await;

        // 没有任何人行动，计时器到期后应当替当前座位叫 0 分
        let msg = expect_msg(&mut room.rxs[0], |m| matches!(m, ServerMessage::BidMade { .. })).await;
        match msg {
            ServerMessage::BidMade { score, .. } => assert_eq!(score, 0),
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_player_action_invalidates_pending_timer() {
        let cfg = TimeoutConfig {
            bid: Duration::from_millis(500),
            play: Duration::from_secs(10),
        };
        let mut room = setup_room(cfg).await;
        let first_seat = all_ready(&mut room).await;

        // 当前座位立刻叫 3 分，抢在计时器之前提交
        let actor_id = room.ids[first_seat as usize];
        room.handle
            .tx
            .send(RoomCommand::Intent {
                player_id: actor_id,
                message: ClientMessage::Bid { score: 3 },
            })
            .await
            .unwrap();
        expect_msg(&mut room.rxs[0], |m| {
            matches!(m, ServerMessage::LandlordDecided { .. })
        })
        .await;

        // 旧计时器的代号已失配，等它原本的到期时间过去，不应再有叫 0 分
        tokio::time::sleep(Duration::from_millis(700)).await;
        while let Ok(msg) = room.rxs[0].try_recv() {
            if let ServerMessage::BidMade { score, .. } = msg {
                assert_ne!(score, 0, "迟到的计时器不应产生兜底叫分");
            }
        }
    }

    #[tokio::test]
    async fn test_reconnect_replays_snapshot_without_new_timer() {
        let cfg = TimeoutConfig {
            bid: Duration::from_secs(10),
            play: Duration::from_secs(10),
        };
        let mut room = setup_room(cfg).await;
        all_ready(&mut room).await;

        // 玩家 0 断线再重连
        room.handle
            .tx
            .send(RoomCommand::Disconnect { player_id: room.ids[0] })
            .await
            .unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        room.handle
            .tx
            .send(RoomCommand::Reconnect { player_id: room.ids[0], conn: tx })
            .await
            .unwrap();

        // 重连后补发个人快照：自己的手牌可见，别家只有张数
        let msg = expect_msg(&mut rx, |m| matches!(m, ServerMessage::Snapshot(_))).await;
        match msg {
            ServerMessage::Snapshot(state) => {
                let me = state.players.iter().find(|p| p.id == room.ids[0]).unwrap();
                assert_eq!(me.hand.len(), 17);
                let other = state.players.iter().find(|p| p.id != room.ids[0]).unwrap();
                assert!(other.hand.is_empty());
                assert_eq!(other.card_count, 17);
            }
            _ => unreachable!(),
        }

        // 补发的 TurnToAct 携带剩余时限，而不是重新布防的完整时限
        let msg = expect_msg(&mut rx, |m| matches!(m, ServerMessage::TurnToAct { .. })).await;
        match msg {
            ServerMessage::TurnToAct { deadline_ms, .. } => {
                assert!(deadline_ms <= 10_000, "剩余时限不应超过布防时限");
            }
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_illegal_action_rejected_privately() {
        let cfg = TimeoutConfig {
            bid: Duration::from_secs(10),
            play: Duration::from_secs(10),
        };
        let mut room = setup_room(cfg).await;
        let first_seat = all_ready(&mut room).await;

        // 不是当前座位的玩家叫分，应当收到结构化拒绝
        let wrong_seat = (first_seat as usize + 1) % 3;
        room.handle
            .tx
            .send(RoomCommand::Intent {
                player_id: room.ids[wrong_seat],
                message: ClientMessage::Bid { score: 1 },
            })
            .await
            .unwrap();
        let msg = expect_msg(&mut room.rxs[wrong_seat], |m| {
            matches!(m, ServerMessage::Rejected { .. })
        })
        .await;
        match msg {
            ServerMessage::Rejected { reason } => {
                assert_eq!(reason, ddz_arena_core::ActionError::NotYourTurn)
            }
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_full_room_refuses_fourth_join() {
        let cfg = TimeoutConfig {
            bid: Duration::from_secs(10),
            play: Duration::from_secs(10),
        };
        let room = setup_room(cfg).await;

        // 第四人入房应该被裁决为拒绝，连接层因此不会绑定上下文
        let (mut rx, accepted) = join_room(&room.handle, Uuid::new_v4(), "第四人".to_string()).await;
        assert!(!accepted);
        let msg = expect_msg(&mut rx, |m| matches!(m, ServerMessage::Error { .. })).await;
        match msg {
            ServerMessage::Error { message } => assert_eq!(message, "房间已满"),
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_unresponsive_connection_does_not_stall_room() {
        let cfg = TimeoutConfig {
            bid: Duration::from_millis(50),
            play: Duration::from_secs(10),
        };
        let mut room = setup_room(cfg).await;

        // 模拟一个彻底卡死的客户端：它的接收端整个被丢弃
        drop(room.rxs.remove(2));
        all_ready(&mut room).await;

        // 房间照常推进，计时兜底照常到达其他人
        let msg = expect_msg(&mut room.rxs[0], |m| matches!(m, ServerMessage::BidMade { .. })).await;
        match msg {
            ServerMessage::BidMade { score, .. } => assert_eq!(score, 0),
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_redeal_announces_final_bid_first() {
        let cfg = TimeoutConfig {
            bid: Duration::from_millis(50),
            play: Duration::from_secs(10),
        };
        let mut room = setup_room(cfg).await;
        all_ready(&mut room).await;

        // 三家全部超时不叫：重发通知之前必须先看到三声 0 分
        let mut bids_seen = 0;
        timeout(Duration::from_secs(2), async {
            loop {
                match room.rxs[0].recv().await.expect("房间通道被意外关闭") {
                    ServerMessage::BidMade { score, .. } => {
                        assert_eq!(score, 0);
                        bids_seen += 1;
                    }
                    ServerMessage::Redealt { .. } => break,
                    _ => {}
                }
            }
        })
        .await
        .expect("等待重发通知超时");
        assert_eq!(bids_seen, 3, "重发前应该广播满三声叫分");
    }
}
