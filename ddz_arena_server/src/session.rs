use dashmap::DashMap;
use ddz_arena_core::{PlayerId, PlayerSecret, RoomId};

/// 一条重连会话：凭证 → 玩家在哪个房间、是谁。
///
/// 座位、手牌、回合位置都在权威的 MatchState 里，断线时原样保留，
/// 会话里只存找回身份所需的最小信息。
#[derive(Debug, Clone, Copy)]
pub struct Session {
    pub room_id: RoomId,
    pub player_id: PlayerId,
}

/// 重连会话存储。
///
/// 对局系统把它当作一个外部键值协作方使用；这里是进程内的 DashMap
/// 实现。它永远不是对局合法性的依据——那是 MatchState 的职责。
pub struct SessionStore {
    inner: DashMap<PlayerSecret, Session>,
}

impl SessionStore {
    pub fn new() -> Self {
        SessionStore { inner: DashMap::new() }
    }

    pub fn insert(&self, secret: PlayerSecret, room_id: RoomId, player_id: PlayerId) {
        self.inner.insert(secret, Session { room_id, player_id });
    }

    pub fn lookup(&self, secret: &PlayerSecret) -> Option<Session> {
        self.inner.get(secret).map(|s| *s)
    }

    /// 房间销毁时清掉它的所有会话。
    pub fn remove_room(&self, room_id: RoomId) {
        self.inner.retain(|_, s| s.room_id != room_id);
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
