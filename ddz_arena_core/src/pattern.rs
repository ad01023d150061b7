use crate::card::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// --- 牌型定义 ---

/// 牌型种类 (PatternKind)
///
/// 覆盖斗地主的全部合法牌型。不在此列的任何牌组合都是非法出牌，
/// 分类返回 None 而不是错误——"不成牌型"是高频的正常结果。
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize)]
pub enum PatternKind {
    Single,       // 单张
    Pair,         // 对子
    Triple,       // 三张
    TripleOne,    // 三带一
    TripleTwo,    // 三带二（带对子）
    Straight,     // 顺子（≥5 张连牌）
    StraightPair, // 连对（≥3 连对）
    Plane,        // 飞机不带翅膀（≥2 连三张）
    PlaneWings,   // 飞机带翅膀（翅膀统一为单张或对子）
    FourTwo,      // 四带二（两单）或四带两对
    Bomb,         // 炸弹
    Rocket,       // 王炸
}

impl PatternKind {
    /// 顺子族牌型，比较时要求长度一致。
    pub fn is_run(&self) -> bool {
        matches!(
            self,
            PatternKind::Straight
                | PatternKind::StraightPair
                | PatternKind::Plane
                | PatternKind::PlaneWings
        )
    }
}

/// 一次合法出牌的完整描述。
///
/// - `main` 是比较用的主牌值：顺子族取连牌的最大值，三带/四带取主体牌值。
/// - `length` 仅对顺子族有意义（连牌的节数），其余牌型为 0。
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Pattern {
    pub kind: PatternKind,
    pub cards: Vec<Card>,
    pub main: u8,
    pub length: u8,
}

impl Pattern {
    fn new(kind: PatternKind, mut cards: Vec<Card>, main: u8, length: u8) -> Pattern {
        sort_hand(&mut cards);
        Pattern { kind, cards, main, length }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self.kind {
            PatternKind::Single => "单张",
            PatternKind::Pair => "对子",
            PatternKind::Triple => "三张",
            PatternKind::TripleOne => "三带一",
            PatternKind::TripleTwo => "三带二",
            PatternKind::Straight => "顺子",
            PatternKind::StraightPair => "连对",
            PatternKind::Plane => "飞机",
            PatternKind::PlaneWings => "飞机带翅膀",
            PatternKind::FourTwo => "四带二",
            PatternKind::Bomb => "炸弹",
            PatternKind::Rocket => "王炸",
        };
        write!(f, "{}", name)?;
        for c in &self.cards {
            write!(f, " {}", c)?;
        }
        Ok(())
    }
}

// --- 牌型分类 ---

/// 按牌值分组计数，BTreeMap 保证按牌值升序遍历。
fn value_counts(cards: &[Card]) -> BTreeMap<u8, u8> {
    let mut counts = BTreeMap::new();
    for c in cards {
        *counts.entry(c.value).or_insert(0u8) += 1;
    }
    counts
}

/// 一组牌值是否严格连续且全部在顺子允许范围内（排除 2 和王）。
fn is_consecutive_run(values: &[u8]) -> bool {
    if values.is_empty() || *values.last().unwrap() > MAX_RUN_VALUE {
        return false;
    }
    values.windows(2).all(|w| w[1] == w[0] + 1)
}

/// 分类入口：把任意一组牌判定为某个牌型，或者判定为"不成牌型" (None)。
///
/// 分类与输入顺序无关：内部先按牌值分组再判型。
/// 判型按固定优先级进行，保证歧义组合（如 333444555666）的结果确定。
pub fn classify(cards: &[Card]) -> Option<Pattern> {
    let n = cards.len();
    if n == 0 || n > 20 {
        return None;
    }
    let counts = value_counts(cards);

    // 王炸：恰好大小王两张
    if n == 2
        && counts.contains_key(&VALUE_SMALL_JOKER)
        && counts.contains_key(&VALUE_BIG_JOKER)
    {
        return Some(Pattern::new(PatternKind::Rocket, cards.to_vec(), VALUE_BIG_JOKER, 0));
    }

    // 全部同值：单张/对子/三张/炸弹
    if counts.len() == 1 {
        let v = *counts.keys().next().unwrap();
        let kind = match n {
            1 => Some(PatternKind::Single),
            // 对子不可能由王组成（大小王各只有一张，且牌值不同）
            2 => (v < VALUE_SMALL_JOKER).then_some(PatternKind::Pair),
            3 => Some(PatternKind::Triple),
            4 => Some(PatternKind::Bomb),
            _ => None,
        }?;
        return Some(Pattern::new(kind, cards.to_vec(), v, 0));
    }

    // 三带一：恰好一个三张加一个不同值的单张
    if n == 4 {
        if let Some(main) = single_group_of(&counts, 3) {
            return Some(Pattern::new(PatternKind::TripleOne, cards.to_vec(), main, 0));
        }
        return None;
    }

    if n == 5 {
        // 三带二：带的必须是真对子（王不能成对）
        if let (Some(main), Some(pair)) = (single_group_of(&counts, 3), single_group_of(&counts, 2)) {
            if pair < VALUE_SMALL_JOKER {
                return Some(Pattern::new(PatternKind::TripleTwo, cards.to_vec(), main, 0));
            }
            return None;
        }
    }

    let values: Vec<u8> = counts.keys().copied().collect();

    // 顺子：≥5 张互不相同且连续，不含 2 和王
    if n >= 5 && counts.values().all(|&c| c == 1) && is_consecutive_run(&values) {
        return Some(Pattern::new(
            PatternKind::Straight,
            cards.to_vec(),
            *values.last().unwrap(),
            values.len() as u8,
        ));
    }

    // 连对：偶数张 ≥6，每个牌值恰好两张且连续
    if n >= 6 && n % 2 == 0 && counts.values().all(|&c| c == 2) && is_consecutive_run(&values) {
        return Some(Pattern::new(
            PatternKind::StraightPair,
            cards.to_vec(),
            *values.last().unwrap(),
            values.len() as u8,
        ));
    }

    // 飞机不带翅膀：3 的倍数 ≥6，每个牌值恰好三张且连续
    if n >= 6 && n % 3 == 0 && counts.values().all(|&c| c == 3) && is_consecutive_run(&values) {
        return Some(Pattern::new(
            PatternKind::Plane,
            cards.to_vec(),
            *values.last().unwrap(),
            values.len() as u8,
        ));
    }

    // 四带二：6 张 = 炸弹 + 两张单牌；8 张 = 炸弹 + 两个对子
    if n == 6 {
        if let Some(main) = single_group_of(&counts, 4) {
            return Some(Pattern::new(PatternKind::FourTwo, cards.to_vec(), main, 0));
        }
    }
    if n == 8 {
        if let Some(main) = single_group_of(&counts, 4) {
            let kickers: Vec<(u8, u8)> = counts
                .iter()
                .filter(|&(&v, _)| v != main)
                .map(|(&v, &c)| (v, c))
                .collect();
            // 必须是两个不同值的真对子
            if kickers.len() == 2
                && kickers.iter().all(|&(v, c)| c == 2 && v < VALUE_SMALL_JOKER)
            {
                return Some(Pattern::new(PatternKind::FourTwo, cards.to_vec(), main, 0));
            }
        }
    }

    // 飞机带翅膀
    if let Some(p) = classify_plane_wings(cards, &counts) {
        return Some(p);
    }

    None
}

/// 若分组中恰好存在一个出现 `want` 次的牌值，返回该牌值。
fn single_group_of(counts: &BTreeMap<u8, u8>, want: u8) -> Option<u8> {
    let mut found = None;
    for (&v, &c) in counts {
        if c == want {
            if found.is_some() {
                return None;
            }
            found = Some(v);
        }
    }
    found
}

/// 飞机带翅膀的判定。
///
/// 翅膀必须统一：k 节飞机带 k 张单牌（共 4k 张）或 k 个对子（共 5k 张）。
/// 混搭、或拆剩下任何四张同值（等于暗拆炸弹）都不算飞机带翅膀。
/// 连三张的节数 k 由总张数唯一确定，再在候选起点上滑窗搜索。
fn classify_plane_wings(cards: &[Card], counts: &BTreeMap<u8, u8>) -> Option<Pattern> {
    let n = cards.len();
    let mut candidates = Vec::new();
    if n % 4 == 0 && n / 4 >= 2 {
        candidates.push((n / 4, false)); // 翅膀为单张
    }
    if n % 5 == 0 && n / 5 >= 2 {
        candidates.push((n / 5, true)); // 翅膀为对子
    }

    for (k, pair_wings) in candidates {
        // 所有数量 ≥3 且在顺子范围内的牌值，是连三张的候选
        let triple_values: Vec<u8> = counts
            .iter()
            .filter(|&(&v, &c)| c >= 3 && v <= MAX_RUN_VALUE)
            .map(|(&v, _)| v)
            .collect();

        for window in triple_values.windows(k) {
            if !window.windows(2).all(|w| w[1] == w[0] + 1) {
                continue;
            }
            if wings_are_uniform(counts, window, pair_wings) {
                return Some(Pattern::new(
                    PatternKind::PlaneWings,
                    cards.to_vec(),
                    *window.last().unwrap(),
                    k as u8,
                ));
            }
        }
    }
    None
}

/// 去掉飞机主体后检查翅膀是否统一。
fn wings_are_uniform(counts: &BTreeMap<u8, u8>, run: &[u8], pair_wings: bool) -> bool {
    let mut rest: BTreeMap<u8, u8> = counts.clone();
    for v in run {
        let c = rest.get_mut(v).unwrap();
        *c -= 3;
        if *c == 0 {
            rest.remove(v);
        }
    }
    // 剩余任何四张同值都视为拆炸弹，整体拒绝
    if rest.values().any(|&c| c >= 4) {
        return false;
    }
    if pair_wings {
        // 每个翅膀都是真对子
        rest.len() == run.len() && rest.iter().all(|(&v, &c)| c == 2 && v < VALUE_SMALL_JOKER)
    } else {
        // 单张翅膀：总张数等于节数即可（允许两张同值的"单张"）
        rest.values().map(|&c| c as usize).sum::<usize>() == run.len()
            && rest.values().all(|&c| c <= 2)
    }
}

// --- 牌型比较 ---

/// 两个牌型的比较结果。
///
/// `Incomparable` 表示规则上压不了也谈不上输赢（类型不同、长度不匹配
/// 或主牌值相等）。在"必须压牌"的回合里它意味着该出牌非法，而不是平局。
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum PatternCmp {
    Greater,
    Less,
    Incomparable,
}

/// 按斗地主规则比较两个牌型。
///
/// 王炸压一切；炸弹之间比主牌值，炸弹压其他一切非王炸牌型；
/// 同型牌要求张数和长度完全一致后比主牌值；其余情况不可比。
pub fn compare(a: &Pattern, b: &Pattern) -> PatternCmp {
    use PatternKind::*;
    match (a.kind, b.kind) {
        (Rocket, Rocket) => PatternCmp::Incomparable, // 只有一副王炸，实战不可能出现
        (Rocket, _) => PatternCmp::Greater,
        (_, Rocket) => PatternCmp::Less,
        (Bomb, Bomb) => cmp_main(a.main, b.main),
        (Bomb, _) => PatternCmp::Greater,
        (_, Bomb) => PatternCmp::Less,
        (x, y) if x == y => {
            if a.length != b.length || a.cards.len() != b.cards.len() {
                return PatternCmp::Incomparable;
            }
            cmp_main(a.main, b.main)
        }
        _ => PatternCmp::Incomparable,
    }
}

fn cmp_main(a: u8, b: u8) -> PatternCmp {
    match a.cmp(&b) {
        std::cmp::Ordering::Greater => PatternCmp::Greater,
        std::cmp::Ordering::Less => PatternCmp::Less,
        std::cmp::Ordering::Equal => PatternCmp::Incomparable,
    }
}

// --- 单元测试 ---
