use serde::{Deserialize, Serialize};
use std::fmt;
// --- 核心数据结构定义 ---

/// 花色 (Suit)
/// Joker 是大小王的"花色"，只有两张牌使用它。
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Serialize, Deserialize)]
pub enum Suit {
    Spade,   // 黑桃 ♠️
    Heart,   // 红心 ♥️
    Club,    // 梅花 ♣️
    Diamond, // 方块 ♦️
    Joker,   // 王 🃏
}

/// 斗地主中的牌值边界。
/// 牌值完全决定大小：3<4<...<K(13)<A(14)<2(15)<小王(16)<大王(17)。
pub const VALUE_THREE: u8 = 3;
pub const VALUE_ACE: u8 = 14;
pub const VALUE_TWO: u8 = 15;
pub const VALUE_SMALL_JOKER: u8 = 16;
pub const VALUE_BIG_JOKER: u8 = 17;

/// 顺子类牌型（顺子/连对/飞机）不允许包含 2 和王，
/// 所以它们的牌值上限是 A。
pub const MAX_RUN_VALUE: u8 = VALUE_ACE;

/// 单张扑克牌 (Card)
///
/// `id` 在一副牌 (0..54) 内唯一且稳定，客户端出牌时引用 id 而不是牌面，
/// 这样服务端可以精确校验"这张牌确实在你手里"。
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize)]
pub struct Card {
    pub id: u8,
    pub suit: Suit,
    pub value: u8,
}

impl Card {
    pub fn new(id: u8, suit: Suit, value: u8) -> Card {
        Card { id, suit, value }
    }

    pub fn is_joker(&self) -> bool {
        self.value >= VALUE_SMALL_JOKER
    }
}

// --- 实现辅助功能 ---

impl fmt::Display for Suit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", match self {
            Suit::Spade => "♠️",
            Suit::Heart => "♥️",
            Suit::Club => "♣️",
            Suit::Diamond => "♦️",
            Suit::Joker => "🃏",
        })
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let face = match self.value {
            VALUE_SMALL_JOKER => "小王".to_string(),
            VALUE_BIG_JOKER => "大王".to_string(),
            VALUE_TWO => "2".to_string(),
            VALUE_ACE => "A".to_string(),
            13 => "K".to_string(),
            12 => "Q".to_string(),
            11 => "J".to_string(),
            v => v.to_string(),
        };
        write!(f, "{}{}", self.suit, face)
    }
}

// --- 牌组生成 ---

/// 创建一副完整的 54 张牌（含大小王），id 按固定顺序 0..54 分配。
pub fn new_deck() -> Vec<Card> {
    let suits = [Suit::Spade, Suit::Heart, Suit::Club, Suit::Diamond];
    let mut deck = Vec::with_capacity(54);
    let mut id = 0u8;
    for value in VALUE_THREE..=VALUE_TWO {
        for &suit in &suits {
            deck.push(Card::new(id, suit, value));
            id += 1;
        }
    }
    deck.push(Card::new(id, Suit::Joker, VALUE_SMALL_JOKER));
    deck.push(Card::new(id + 1, Suit::Joker, VALUE_BIG_JOKER));
    deck
}

/// 生成一副洗好的牌。`SliceRandom::shuffle` 内部就是 Fisher–Yates。
pub fn shuffled_deck<R: rand::Rng + ?Sized>(rng: &mut R) -> Vec<Card> {
    use rand::seq::SliceRandom;
    let mut deck = new_deck();
    deck.shuffle(rng);
    deck
}

/// 手牌排序：按牌值从大到小，同值时按花色稳定排序。
pub fn sort_hand(hand: &mut [Card]) {
    hand.sort_by(|a, b| b.value.cmp(&a.value).then(a.suit.cmp(&b.suit)));
}

// --- 单元测试 ---
