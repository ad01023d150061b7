use crate::card::*;
use crate::hint;
use crate::pattern::{self, Pattern, PatternCmp, PatternKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use uuid::Uuid;

pub type RoomId = Uuid;
pub type PlayerId = Uuid;

// --- 错误分类 ---

/// 动作被拒绝的原因。
///
/// 所有拒绝都是同步返回值：校验失败时状态机不发生任何变化
/// （先校验后提交），调用方按值分支处理，绝不跨房间边界抛异常。
#[derive(Debug, PartialEq, Eq, Clone, Copy, Error, Serialize, Deserialize)]
pub enum ActionError {
    #[error("当前阶段不允许该操作")]
    WrongPhase,
    #[error("还没轮到你行动")]
    NotYourTurn,
    #[error("所出的牌不在你的手牌中")]
    CardNotOwned,
    #[error("所选的牌不构成合法牌型")]
    NotAPattern,
    #[error("这手牌压不过上家")]
    CannotBeat,
    #[error("本回合必须出牌，不能过")]
    MustPlay,
    #[error("叫分无效")]
    InvalidBid,
}

// --- 对局状态 ---

/// 对局阶段。除了三家都不叫分触发的重新发牌（Bidding → Dealing），
/// 阶段转移是单向的：Dealing → Bidding → Playing → Finished。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Dealing,
    Bidding,
    Playing,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Landlord, // 地主
    Farmer,   // 农民
}

/// 一个座位上的玩家。座位号在建局时分配，整局不变。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatPlayer {
    pub id: PlayerId,
    pub nickname: String,
    pub seat: u8,
    pub role: Option<Role>,
    pub hand: Vec<Card>,
    /// 视图字段：发给客户端的快照里记录各家手牌张数，
    /// 服务端内部状态不维护它（见 `for_client`）。
    pub card_count: usize,
    pub online: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidEntry {
    pub seat: u8,
    pub score: u8,
}

/// 结算结果，一局结束时生成一次并交给持久化收集端。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub winner_seat: u8,
    pub landlord_won: bool,
    pub spring: bool,
    pub base_score: u32,
    pub multiplier: u32,
    /// 按座位号索引的筹码变动，地主 ±2×底分×倍数，农民 ±1×。
    pub deltas: [i64; 3],
}

/// 单局斗地主的权威状态机。
///
/// 每个活跃房间恰好持有一个实例，所有修改都经由回合调度器串行进入，
/// 引擎本身不做任何并发控制，也不做任何 I/O。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchState {
    pub room_id: RoomId,
    /// 恰好三个玩家，下标即座位号。
    pub players: Vec<SeatPlayer>,
    pub phase: Phase,
    pub current_seat: u8,
    pub landlord_seat: Option<u8>,
    /// 三张底牌，确定地主前对所有人保密。
    pub bottom: Vec<Card>,
    pub bid_score: u8,
    pub bid_history: Vec<BidEntry>,
    pub last_play: Option<Pattern>,
    pub last_play_seat: Option<u8>,
    pub pass_count: u8,
    pub base_score: u32,
    /// 局内单调不减：只在炸弹/王炸出牌时和结算的春天加倍时变化。
    pub multiplier: u32,
    pub bomb_count: u32,
    pub spring: bool,
    /// 各座位的出牌次数，用于春天判定。
    pub plays_by_seat: [u32; 3],
}

// --- 动作结果 ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidOutcome {
    /// Some(seat) 表示地主已确定。
    pub decided: Option<u8>,
    /// 三家都不叫，已经重新发牌并回到叫分阶段。
    pub redeal: bool,
    pub next_seat: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayOutcome {
    pub pattern: Pattern,
    pub next_seat: Option<u8>,
    pub settlement: Option<Settlement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassOutcome {
    pub next_seat: u8,
    /// 连续两家过牌，上一手出牌者重新自由出牌。
    pub new_round: bool,
}

/// 超时兜底动作的执行结果，形状与真实玩家动作一致。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeoutOutcome {
    Bid(BidOutcome),
    Passed(PassOutcome),
    Played(PlayOutcome),
}

// --- 状态机实现 ---

impl MatchState {
    /// 建局：分配座位，进入 Dealing 阶段。调用 `deal` 后才真正开始。
    pub fn new(room_id: RoomId, players: [(PlayerId, String); 3], base_score: u32) -> MatchState {
        let players = players
            .into_iter()
            .enumerate()
            .map(|(seat, (id, nickname))| SeatPlayer {
                id,
                nickname,
                seat: seat as u8,
                role: None,
                hand: Vec::new(),
                card_count: 0,
                online: true,
            })
            .collect();
        MatchState {
            room_id,
            players,
            phase: Phase::Dealing,
            current_seat: 0,
            landlord_seat: None,
            bottom: Vec::new(),
            bid_score: 0,
            bid_history: Vec::new(),
            last_play: None,
            last_play_seat: None,
            pass_count: 0,
            base_score,
            multiplier: 1,
            bomb_count: 0,
            spring: false,
            plays_by_seat: [0; 3],
        }
    }

    /// 洗牌发牌：17/17/17 + 3 张底牌，随机选第一个叫分座位，进入叫分阶段。
    pub fn deal(&mut self) {
        let mut rng = rand::rng();
        self.deal_with_rng(&mut rng);
    }

    pub fn deal_with_rng<R: rand::Rng + ?Sized>(&mut self, rng: &mut R) {
        let deck = shuffled_deck(rng);
        for (i, p) in self.players.iter_mut().enumerate() {
            p.hand = deck[i * 17..(i + 1) * 17].to_vec();
            sort_hand(&mut p.hand);
            p.role = None;
        }
        self.bottom = deck[51..].to_vec();
        self.landlord_seat = None;
        self.bid_score = 0;
        self.bid_history.clear();
        self.last_play = None;
        self.last_play_seat = None;
        self.pass_count = 0;
        self.multiplier = 1;
        self.bomb_count = 0;
        self.spring = false;
        self.plays_by_seat = [0; 3];
        self.current_seat = rng.random_range(0..3);
        self.phase = Phase::Bidding;
    }

    fn seat_of(&self, player_id: PlayerId) -> Option<u8> {
        self.players.iter().find(|p| p.id == player_id).map(|p| p.seat)
    }

    /// 阶段 + 座位双重校验，返回调用者的座位号。
    fn check_turn(&self, player_id: PlayerId, phase: Phase) -> Result<u8, ActionError> {
        if self.phase != phase {
            return Err(ActionError::WrongPhase);
        }
        let seat = self.seat_of(player_id).ok_or(ActionError::NotYourTurn)?;
        if seat != self.current_seat {
            return Err(ActionError::NotYourTurn);
        }
        Ok(seat)
    }

    fn advance_seat(&mut self) {
        self.current_seat = (self.current_seat + 1) % 3;
    }

    /// 叫分。score ∈ [0,3]，非零叫分必须严格高于当前最高分。
    ///
    /// 叫 3 分立即定地主；三家都叫过后由最后一个非零叫分者当地主；
    /// 三家都不叫则重新发牌，叫分从头开始。
    pub fn bid(&mut self, player_id: PlayerId, score: u8) -> Result<BidOutcome, ActionError> {
        let seat = self.check_turn(player_id, Phase::Bidding)?;
        if score > 3 || (score > 0 && score <= self.bid_score) {
            return Err(ActionError::InvalidBid);
        }

        self.bid_history.push(BidEntry { seat, score });
        if score > 0 {
            self.bid_score = score;
        }

        if score == 3 {
            self.decide_landlord(seat);
            return Ok(BidOutcome { decided: Some(seat), redeal: false, next_seat: None });
        }

        if self.bid_history.len() == 3 {
            if self.bid_score == 0 {
                // 无人叫地主，重新发牌
                self.phase = Phase::Dealing;
                self.deal();
                return Ok(BidOutcome {
                    decided: None,
                    redeal: true,
                    next_seat: Some(self.current_seat),
                });
            }
            let landlord = self
                .bid_history
                .iter()
                .rev()
                .find(|b| b.score > 0)
                .map(|b| b.seat)
                .unwrap();
            self.decide_landlord(landlord);
            return Ok(BidOutcome { decided: Some(landlord), redeal: false, next_seat: None });
        }

        self.advance_seat();
        Ok(BidOutcome { decided: None, redeal: false, next_seat: Some(self.current_seat) })
    }

    /// 地主确定：收底牌重排，分配身份，倍数取叫分，地主先出牌。
    fn decide_landlord(&mut self, seat: u8) {
        self.landlord_seat = Some(seat);
        for p in self.players.iter_mut() {
            p.role = Some(if p.seat == seat { Role::Landlord } else { Role::Farmer });
        }
        let bottom = self.bottom.clone();
        let landlord = &mut self.players[seat as usize];
        landlord.hand.extend(bottom);
        sort_hand(&mut landlord.hand);

        self.multiplier = self.bid_score as u32;
        self.phase = Phase::Playing;
        self.current_seat = seat;
        self.last_play = None;
        self.last_play_seat = None;
        self.pass_count = 0;
    }

    /// 出牌。校验回合、持牌、牌型与压牌关系，全部通过后一次性提交。
    pub fn play_cards(&mut self, player_id: PlayerId, card_ids: &[u8]) -> Result<PlayOutcome, ActionError> {
        let seat = self.check_turn(player_id, Phase::Playing)?;

        let unique: HashSet<u8> = card_ids.iter().copied().collect();
        if unique.len() != card_ids.len() || card_ids.is_empty() {
            return Err(ActionError::CardNotOwned);
        }
        let hand = &self.players[seat as usize].hand;
        let mut cards = Vec::with_capacity(card_ids.len());
        for &id in card_ids {
            match hand.iter().find(|c| c.id == id) {
                Some(c) => cards.push(*c),
                None => return Err(ActionError::CardNotOwned),
            }
        }

        let pattern = pattern::classify(&cards).ok_or(ActionError::NotAPattern)?;

        // 非自由回合必须压过上家
        if let Some(last) = &self.last_play {
            if self.last_play_seat != Some(seat)
                && pattern::compare(&pattern, last) != PatternCmp::Greater
            {
                return Err(ActionError::CannotBeat);
            }
        }

        // 校验完毕，提交
        let hand = &mut self.players[seat as usize].hand;
        hand.retain(|c| !unique.contains(&c.id));
        let emptied = hand.is_empty();

        self.plays_by_seat[seat as usize] += 1;
        if matches!(pattern.kind, PatternKind::Bomb | PatternKind::Rocket) {
            self.multiplier *= 2;
            self.bomb_count += 1;
        }
        self.last_play = Some(pattern.clone());
        self.last_play_seat = Some(seat);
        self.pass_count = 0;

        if emptied {
            let settlement = self.settle(seat);
            return Ok(PlayOutcome { pattern, next_seat: None, settlement: Some(settlement) });
        }

        self.advance_seat();
        Ok(PlayOutcome { pattern, next_seat: Some(self.current_seat), settlement: None })
    }

    /// 过牌。自由回合和上一手是自己出的都不允许过。
    /// 连续两家过牌后清空场上牌，由上一手出牌者重新自由出牌。
    pub fn pass(&mut self, player_id: PlayerId) -> Result<PassOutcome, ActionError> {
        let seat = self.check_turn(player_id, Phase::Playing)?;
        if self.last_play.is_none() || self.last_play_seat == Some(seat) {
            return Err(ActionError::MustPlay);
        }

        self.pass_count += 1;
        if self.pass_count >= 2 {
            let leader = self.last_play_seat.unwrap();
            self.last_play = None;
            self.pass_count = 0;
            self.current_seat = leader;
            return Ok(PassOutcome { next_seat: leader, new_round: true });
        }

        self.advance_seat();
        Ok(PassOutcome { next_seat: self.current_seat, new_round: false })
    }

    /// 超时兜底：叫分阶段叫 0 分；出牌阶段能过则过，必出时打出最小单张。
    ///
    /// 走与真实玩家完全相同的校验入口，不存在绕过不变量的特权路径。
    /// 兜底动作按构造必然合法，被拒绝说明引擎状态已损坏，直接 panic。
    pub fn timeout_action(&mut self) -> TimeoutOutcome {
        let seat = self.current_seat as usize;
        let player_id = self.players[seat].id;
        match self.phase {
            Phase::Bidding => TimeoutOutcome::Bid(
                self.bid(player_id, 0).expect("超时兜底叫分必然合法"),
            ),
            Phase::Playing => {
                let free_round =
                    self.last_play.is_none() || self.last_play_seat == Some(seat as u8);
                if free_round {
                    let single = hint::smallest_single(&self.players[seat].hand)
                        .expect("轮到出牌的玩家手牌不可能为空");
                    let ids: Vec<u8> = single.cards.iter().map(|c| c.id).collect();
                    TimeoutOutcome::Played(
                        self.play_cards(player_id, &ids).expect("超时兜底出牌必然合法"),
                    )
                } else {
                    TimeoutOutcome::Passed(self.pass(player_id).expect("超时兜底过牌必然合法"))
                }
            }
            Phase::Dealing | Phase::Finished => {
                unreachable!("发牌和结束阶段不存在回合计时")
            }
        }
    }

    /// 提示：返回一手能压过场上的牌，无牌可出（或不在出牌阶段）返回 None。
    pub fn hint(&self, player_id: PlayerId) -> Option<Vec<Card>> {
        if self.phase != Phase::Playing {
            return None;
        }
        let seat = self.seat_of(player_id)?;
        let hand = &self.players[seat as usize].hand;
        let last = if self.last_play_seat == Some(seat) {
            None
        } else {
            self.last_play.as_ref()
        };
        hint::hint(hand, last)
    }

    /// 春天判定 + 结算。倍数在此最后一次加倍，之后生成筹码变动。
    fn settle(&mut self, winner_seat: u8) -> Settlement {
        let landlord = self.landlord_seat.expect("出牌阶段必有地主");
        let landlord_won = winner_seat == landlord;

        let farmer_plays: u32 = (0u8..3)
            .filter(|&s| s != landlord)
            .map(|s| self.plays_by_seat[s as usize])
            .sum();
        // 地主春天：两个农民整局没出过牌；
        // 农民春天（反春）：地主只出过开局那一手。
        let spring = if landlord_won {
            farmer_plays == 0
        } else {
            self.plays_by_seat[landlord as usize] <= 1
        };
        if spring {
            self.multiplier *= 2;
            self.spring = true;
        }

        let stake = (self.base_score * self.multiplier) as i64;
        let mut deltas = [0i64; 3];
        for seat in 0u8..3 {
            let is_landlord = seat == landlord;
            let amount = if is_landlord { 2 * stake } else { stake };
            let won = if is_landlord { landlord_won } else { !landlord_won };
            deltas[seat as usize] = if won { amount } else { -amount };
        }

        self.phase = Phase::Finished;
        Settlement {
            winner_seat,
            landlord_won,
            spring,
            base_score: self.base_score,
            multiplier: self.multiplier,
            deltas,
        }
    }

    /// 生成发给某个客户端的净化快照。
    ///
    /// 只有 `viewer` 自己的手牌保留，其他人的手牌只留张数；
    /// 确定地主之前底牌也不可见。服务端权威状态永远不直接出网。
    pub fn for_client(&self, viewer: Option<PlayerId>) -> MatchState {
        let mut snap = self.clone();
        for p in snap.players.iter_mut() {
            p.card_count = p.hand.len();
            if Some(p.id) != viewer {
                p.hand.clear();
            }
        }
        if snap.landlord_seat.is_none() {
            snap.bottom.clear();
        }
        snap
    }
}

// --- 单元测试 ---

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashSet;

    fn new_match() -> MatchState {
        let players = [
            (Uuid::new_v4(), "甲".to_string()),
            (Uuid::new_v4(), "乙".to_string()),
            (Uuid::new_v4(), "丙".to_string()),
        ];
        MatchState::new(Uuid::new_v4(), players, 10)
    }

    fn dealt_match(seed: u64) -> MatchState {
        let mut m = new_match();
        let mut rng = StdRng::seed_from_u64(seed);
        m.deal_with_rng(&mut rng);
        m
    }

    fn pid(m: &MatchState, seat: u8) -> PlayerId {
        m.players[seat as usize].id
    }

    /// 让 `seat` 成为地主（从当前叫分座位开始依次叫 0，landlord 叫 3）
    fn make_landlord(m: &mut MatchState, seat: u8) {
        while m.phase == Phase::Bidding {
            let cur = m.current_seat;
            let score = if cur == seat { 3 } else { 0 };
            m.bid(pid(m, cur), score).unwrap();
        }
        assert_eq!(m.landlord_seat, Some(seat));
    }

    #[test]
    fn test_deal_partitions_full_deck() {
        let m = dealt_match(7);
        assert_eq!(m.phase, Phase::Bidding);
        let mut ids = HashSet::new();
        for p in &m.players {
            assert_eq!(p.hand.len(), 17);
            ids.extend(p.hand.iter().map(|c| c.id));
        }
        assert_eq!(m.bottom.len(), 3);
        ids.extend(m.bottom.iter().map(|c| c.id));
        // 54 张牌无重复无遗漏
        assert_eq!(ids.len(), 54);
    }

    #[test]
    fn test_bid_three_decides_immediately() {
        let mut m = dealt_match(1);
        let first = m.current_seat;
        let out = m.bid(pid(&m, first), 3).unwrap();
        assert_eq!(out.decided, Some(first));
        assert_eq!(m.phase, Phase::Playing);
        assert_eq!(m.multiplier, 3);
        assert_eq!(m.current_seat, first);
        // 地主收了三张底牌
        assert_eq!(m.players[first as usize].hand.len(), 20);
    }

    #[test]
    fn test_bid_last_nonzero_wins() {
        let mut m = dealt_match(2);
        let s0 = m.current_seat;
        let s1 = (s0 + 1) % 3;
        let s2 = (s0 + 2) % 3;
        m.bid(pid(&m, s0), 1).unwrap();
        m.bid(pid(&m, s1), 2).unwrap();
        let out = m.bid(pid(&m, s2), 0).unwrap();
        assert_eq!(out.decided, Some(s1));
        assert_eq!(m.multiplier, 2);
        assert_eq!(m.players[s1 as usize].role, Some(Role::Landlord));
        assert_eq!(m.players[s2 as usize].role, Some(Role::Farmer));
    }

    #[test]
    fn test_bid_rejections() {
        let mut m = dealt_match(3);
        let cur = m.current_seat;
        let other = (cur + 1) % 3;
        assert_eq!(m.bid(pid(&m, other), 1), Err(ActionError::NotYourTurn));
        assert_eq!(m.bid(pid(&m, cur), 4), Err(ActionError::InvalidBid));
        m.bid(pid(&m, cur), 2).unwrap();
        // 不得低于或等于当前叫分
        let cur = m.current_seat;
        assert_eq!(m.bid(pid(&m, cur), 2), Err(ActionError::InvalidBid));
        assert_eq!(m.bid(pid(&m, cur), 1), Err(ActionError::InvalidBid));
        // 出牌阶段之外不能出牌
        assert_eq!(
            m.play_cards(pid(&m, cur), &[0]),
            Err(ActionError::WrongPhase)
        );
    }

    #[test]
    fn test_all_pass_triggers_redeal() {
        let mut m = dealt_match(4);
        let before: Vec<Vec<u8>> = m.players.iter().map(|p| p.hand.iter().map(|c| c.id).collect()).collect();
        let mut out = None;
        for _ in 0..3 {
            let cur = m.current_seat;
            out = Some(m.bid(pid(&m, cur), 0).unwrap());
        }
        let out = out.unwrap();
        assert!(out.redeal);
        assert_eq!(m.phase, Phase::Bidding);
        assert!(m.bid_history.is_empty());
        // 重新发牌后至少有一家的手牌变了（同一副牌洗出相同三手的概率可忽略）
        let after: Vec<Vec<u8>> = m.players.iter().map(|p| p.hand.iter().map(|c| c.id).collect()).collect();
        assert_ne!(before, after);
    }

    #[test]
    fn test_play_validates_ownership_and_pattern() {
        let mut m = dealt_match(5);
        let lord = m.current_seat;
        make_landlord(&mut m, lord);
        let lp = pid(&m, lord);

        // 不存在的牌 id
        assert_eq!(m.play_cards(lp, &[200]), Err(ActionError::CardNotOwned));
        // 重复的牌 id
        let c0 = m.players[lord as usize].hand[0].id;
        assert_eq!(m.play_cards(lp, &[c0, c0]), Err(ActionError::CardNotOwned));
        // 空出牌
        assert_eq!(m.play_cards(lp, &[]), Err(ActionError::CardNotOwned));

        // 手牌里随便抓两张不同值的牌不构成牌型
        let hand = &m.players[lord as usize].hand;
        let a = hand[0];
        let b = hand.iter().find(|c| c.value != a.value && (c.value as i16 - a.value as i16).abs() > 1).unwrap();
        assert_eq!(m.play_cards(lp, &[a.id, b.id]), Err(ActionError::NotAPattern));
    }

    #[test]
    fn test_play_must_beat_table() {
        let mut m = dealt_match(11);
        let lord = m.current_seat;
        make_landlord(&mut m, lord);

        // 地主先出手里最大的单张
        let big = *m.players[lord as usize]
            .hand
            .iter()
            .max_by_key(|c| c.value)
            .unwrap();
        m.play_cards(pid(&m, lord), &[big.id]).unwrap();

        // 下家用最小的单张去压，压不住必须返回 CannotBeat，状态原样保留
        let f1 = (lord + 1) % 3;
        let small = *m.players[f1 as usize]
            .hand
            .iter()
            .min_by_key(|c| c.value)
            .unwrap();
        assert!(small.value <= big.value);
        assert_eq!(
            m.play_cards(pid(&m, f1), &[small.id]),
            Err(ActionError::CannotBeat)
        );
        assert_eq!(m.players[f1 as usize].hand.len(), 17);
        assert_eq!(m.current_seat, f1);
        // 压不住可以选择过牌
        m.pass(pid(&m, f1)).unwrap();
        assert_eq!(m.current_seat, (lord + 2) % 3);
    }

    #[test]
    fn test_play_pass_free_round_cycle() {
        let mut m = dealt_match(6);
        let lord = m.current_seat;
        make_landlord(&mut m, lord);

        // 地主自由回合不能过
        assert_eq!(m.pass(pid(&m, lord)), Err(ActionError::MustPlay));

        // 地主出最小单张
        let single = hint::smallest_single(&m.players[lord as usize].hand).unwrap();
        let out = m.play_cards(pid(&m, lord), &[single.cards[0].id]).unwrap();
        assert_eq!(out.next_seat, Some((lord + 1) % 3));
        assert_eq!(m.plays_by_seat[lord as usize], 1);

        // 两家连续过牌后回到地主的自由回合
        let f1 = (lord + 1) % 3;
        let f2 = (lord + 2) % 3;
        let out = m.pass(pid(&m, f1)).unwrap();
        assert!(!out.new_round);
        assert_eq!(m.pass_count, 1);
        let out = m.pass(pid(&m, f2)).unwrap();
        assert!(out.new_round);
        assert_eq!(out.next_seat, lord);
        assert_eq!(m.current_seat, lord);
        assert!(m.last_play.is_none());
        assert_eq!(m.pass_count, 0);
    }

    #[test]
    fn test_seat_never_skips_except_free_round() {
        let mut m = dealt_match(8);
        let lord = m.current_seat;
        make_landlord(&mut m, lord);
        let single = hint::smallest_single(&m.players[lord as usize].hand).unwrap();
        m.play_cards(pid(&m, lord), &[single.cards[0].id]).unwrap();
        assert_eq!(m.current_seat, (lord + 1) % 3);
        m.pass(pid(&m, (lord + 1) % 3)).unwrap();
        assert_eq!(m.current_seat, (lord + 2) % 3);
    }

    /// 手动构造终局：地主只剩一张牌，农民各持 17 张（从未出过牌）。
    fn force_endgame(m: &mut MatchState) -> (u8, Settlement) {
        let lord = m.current_seat;
        make_landlord(m, lord);
        let keep = m.players[lord as usize].hand[0];
        m.players[lord as usize].hand = vec![keep];
        m.current_seat = lord;
        m.last_play = None;
        m.pass_count = 0;
        let out = m.play_cards(pid(m, lord), &[keep.id]).unwrap();
        (lord, out.settlement.unwrap())
    }

    #[test]
    fn test_settlement_spring_and_deltas() {
        let mut m = dealt_match(9);
        // 让倍数确定：叫 3 分
        let lord = m.current_seat;
        let (lord2, s) = force_endgame(&mut m);
        assert_eq!(lord, lord2);
        assert_eq!(m.phase, Phase::Finished);
        assert!(s.landlord_won);
        // 农民一张未出 → 春天，倍数在结算时翻倍一次
        assert!(s.spring);
        assert_eq!(s.multiplier, 6); // 叫3 × 春天2
        let stake = (10 * s.multiplier) as i64;
        assert_eq!(s.deltas[lord as usize], 2 * stake);
        for seat in 0u8..3 {
            if seat != lord {
                assert_eq!(s.deltas[seat as usize], -stake);
            }
        }
        // 零和
        assert_eq!(s.deltas.iter().sum::<i64>(), 0);
    }

    #[test]
    fn test_multiplier_doubles_on_bomb() {
        let mut m = dealt_match(10);
        let lord = m.current_seat;
        make_landlord(&mut m, lord);
        // 手动塞一个炸弹进地主手牌（用底牌之外不冲突的 id 不重要，直接替换手牌）
        let bomb: Vec<Card> = (0..4)
            .map(|i| Card::new(100 + i, Suit::Spade, 9))
            .collect();
        m.players[lord as usize].hand = bomb.clone();
        m.players[lord as usize].hand.push(Card::new(104, Suit::Heart, 3));
        let before = m.multiplier;
        let ids: Vec<u8> = bomb.iter().map(|c| c.id).collect();
        m.play_cards(pid(&m, lord), &ids).unwrap();
        assert_eq!(m.multiplier, before * 2);
        assert_eq!(m.bomb_count, 1);
    }

    #[test]
    fn test_timeout_fallbacks() {
        // 叫分阶段超时 → 叫 0 分
        let mut m = dealt_match(11);
        let first = m.current_seat;
        match m.timeout_action() {
            TimeoutOutcome::Bid(out) => assert_eq!(out.next_seat, Some((first + 1) % 3)),
            other => panic!("叫分阶段的超时应当是叫分: {:?}", other),
        }
        assert_eq!(m.bid_history.len(), 1);
        assert_eq!(m.bid_history[0].score, 0);

        // 自由回合超时 → 出最小单张
        let mut m = dealt_match(12);
        let lord = m.current_seat;
        make_landlord(&mut m, lord);
        let smallest = hint::smallest_single(&m.players[lord as usize].hand).unwrap();
        match m.timeout_action() {
            TimeoutOutcome::Played(out) => {
                assert_eq!(out.pattern.kind, PatternKind::Single);
                assert_eq!(out.pattern.main, smallest.main);
            }
            other => panic!("自由回合超时应当是出牌: {:?}", other),
        }

        // 可过牌的回合超时 → 过牌
        match m.timeout_action() {
            TimeoutOutcome::Passed(out) => assert!(!out.new_round),
            other => panic!("压牌回合超时应当是过牌: {:?}", other),
        }
    }

    #[test]
    fn test_snapshot_redaction() {
        let mut m = dealt_match(13);
        let viewer = pid(&m, 0);
        let snap = m.for_client(Some(viewer));
        assert_eq!(snap.players[0].hand.len(), 17);
        assert_eq!(snap.players[1].hand.len(), 0);
        assert_eq!(snap.players[1].card_count, 17);
        // 叫分阶段底牌保密
        assert!(snap.bottom.is_empty());

        let lord = m.current_seat;
        make_landlord(&mut m, lord);
        let snap = m.for_client(None);
        assert_eq!(snap.bottom.len(), 3);
        assert!(snap.players.iter().all(|p| p.hand.is_empty()));
    }

    #[test]
    fn test_multiplier_never_decreases() {
        let mut m = dealt_match(14);
        let lord = m.current_seat;
        let mut last = m.multiplier;
        make_landlord(&mut m, lord);
        assert!(m.multiplier >= last);
        last = m.multiplier;
        let single = hint::smallest_single(&m.players[lord as usize].hand).unwrap();
        m.play_cards(pid(&m, lord), &[single.cards[0].id]).unwrap();
        assert!(m.multiplier >= last);
    }
}
