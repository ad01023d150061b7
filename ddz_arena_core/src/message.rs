use crate::card::Card;
use crate::engine::{ActionError, BidEntry, MatchState, PlayerId, RoomId, Settlement};
use crate::pattern::Pattern;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 断线重连凭证：入房时发给客户端，重连时凭它找回座位和手牌。
pub type PlayerSecret = Uuid;

// --- 客户端 -> 服务器 的消息 ---
// 客户端可以发送给服务器的指令或动作。
// 引擎层的合法性校验与传输无关，这里只负责搬运意图。

#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum ClientMessage {
    // --- 房间管理消息 ---
    /// 创建一个新房间
    CreateRoom { nickname: String },
    /// 加入一个已存在的房间
    JoinRoom { room_id: RoomId, nickname: String },
    /// 凭入房时的凭证断线重连
    Reconnect { secret: PlayerSecret },

    // --- 对局内消息 ---
    /// 准备就绪，三人都就绪后自动开局
    Ready,
    /// 叫分 (0~3)
    Bid { score: u8 },
    /// 出牌，按牌 id 引用
    PlayCards { card_ids: Vec<u8> },
    /// 过牌
    Pass,
    /// 请求出牌提示
    RequestHint,
    /// 请求完整状态快照（重连后或怀疑失步时）
    GetState,
}

// --- 服务器 -> 客户端 的消息 ---
// 状态变更后服务器广播的事件通知。涉及手牌的内容
// 一律经过 MatchState::for_client 净化后按人发送。

#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum ServerMessage {
    /// 成功创建/加入房间后私发给该玩家
    RoomJoined {
        your_id: PlayerId,
        /// 断线重连凭证，客户端应妥善保存
        your_secret: PlayerSecret,
        your_seat: u8,
        room_id: RoomId,
    },

    /// 新玩家入座
    PlayerJoined { player_id: PlayerId, nickname: String, seat: u8 },
    /// 玩家离开（尚未开局时）
    PlayerLeft { player_id: PlayerId },
    /// 玩家上线/离线状态变化
    PlayerOnline { player_id: PlayerId, online: bool },

    /// 开局：发牌完成进入叫分，快照按人净化后随本消息单发
    MatchStarted { first_seat: u8 },

    /// 有人叫分
    BidMade { seat: u8, score: u8, history: Vec<BidEntry> },
    /// 地主确定，底牌亮出
    LandlordDecided { landlord_seat: u8, bottom: Vec<Card>, multiplier: u32 },
    /// 三家都不叫，重新发牌
    Redealt { first_seat: u8 },

    /// 有人出牌
    Played { seat: u8, pattern: Pattern, cards_left: usize, multiplier: u32 },
    /// 有人过牌
    Passed { seat: u8 },
    /// 连续两家过牌，场上清空，新自由回合
    NewRound { leader_seat: u8 },

    /// 轮到某个座位行动，附带本回合的截止时限
    TurnToAct { seat: u8, deadline_ms: u64 },

    /// 提示结果（私发），无牌可压时为 None
    HintResult { cards: Option<Vec<Card>> },

    /// 对局结束与结算
    MatchSettled { settlement: Settlement },

    /// 完整状态快照（净化后按人发送）
    Snapshot(MatchState),

    /// 提示性信息（私发）
    Info { message: String },
    /// 动作被拒绝（私发），携带结构化原因
    Rejected { reason: ActionError },
    /// 协议层错误（私发）
    Error { message: String },
}
