use crate::card::*;
use crate::pattern::*;
use std::collections::BTreeMap;

// --- 压牌枚举 ---
//
// 给定手牌和场上最后一手牌，枚举所有能压过它的合法出牌。
// 服务端用它响应提示请求，也用它在超时兜底时保证"必出"回合一定有牌可出。
// 枚举按"代价从小到大"排列：同型先小后大，炸弹和王炸永远排在最后。

/// 按牌值分组，BTreeMap 保证升序扫描。
fn group_by_value(hand: &[Card]) -> BTreeMap<u8, Vec<Card>> {
    let mut groups: BTreeMap<u8, Vec<Card>> = BTreeMap::new();
    for &c in hand {
        groups.entry(c.value).or_default().push(c);
    }
    groups
}

type Groups = BTreeMap<u8, Vec<Card>>;

/// 枚举手牌中所有能压过 `last` 的牌型。
///
/// - `last` 为 None 表示自由回合（新一轮先手），返回手牌能组成的全部牌型。
/// - `last` 是王炸时返回空集。
/// - `last` 是炸弹时只返回更大的炸弹和王炸。
/// - 其余情况返回同型更大的牌，再追加所有炸弹和王炸。
///
/// 飞机带翅膀和四带二的翅膀按"最小可用"canonical 选取，
/// 每个主体组合只产出一种带牌方案。
pub fn beating_plays(hand: &[Card], last: Option<&Pattern>) -> Vec<Pattern> {
    let groups = group_by_value(hand);
    let mut out = Vec::new();

    match last {
        None => open_plays(&groups, &mut out),
        Some(p) if p.kind == PatternKind::Rocket => {}
        Some(p) if p.kind == PatternKind::Bomb => {
            bombs(&groups, Some(p.main), &mut out);
            rocket(&groups, &mut out);
        }
        Some(p) => {
            same_kind_above(&groups, p, &mut out);
            bombs(&groups, None, &mut out);
            rocket(&groups, &mut out);
        }
    }
    out
}

/// 手牌中全局最小的单张，兜底出牌用。手牌非空时必定返回 Some。
pub fn smallest_single(hand: &[Card]) -> Option<Pattern> {
    let card = hand.iter().min_by_key(|c| c.value)?;
    classify(&[*card])
}

/// 提示接口：返回一手推荐出牌的具体牌，无牌可压时返回 None。
pub fn hint(hand: &[Card], last: Option<&Pattern>) -> Option<Vec<Card>> {
    beating_plays(hand, last)
        .into_iter()
        .next()
        .map(|p| p.cards)
}

// --- 各牌型的枚举 ---

fn same_kind_above(groups: &Groups, last: &Pattern, out: &mut Vec<Pattern>) {
    use PatternKind::*;
    match last.kind {
        Single => simple_kind(groups, 1, Some(last.main), out),
        Pair => simple_kind(groups, 2, Some(last.main), out),
        Triple => simple_kind(groups, 3, Some(last.main), out),
        TripleOne => triples_with_kicker(groups, Some(last.main), false, out),
        TripleTwo => triples_with_kicker(groups, Some(last.main), true, out),
        Straight => runs(groups, 1, last.length, Some(last.main), out),
        StraightPair => runs(groups, 2, last.length, Some(last.main), out),
        Plane => runs(groups, 3, last.length, Some(last.main), out),
        PlaneWings => {
            let pair_wings = last.cards.len() == last.length as usize * 5;
            plane_wings(groups, last.length, pair_wings, Some(last.main), out)
        }
        FourTwo => four_two(groups, Some(last.main), last.cards.len() == 8, out),
        Bomb | Rocket => unreachable!("炸弹和王炸在上层单独处理"),
    }
}

/// 自由回合：枚举手牌能组成的全部牌型。
fn open_plays(groups: &Groups, out: &mut Vec<Pattern>) {
    let total: usize = groups.values().map(|g| g.len()).sum();
    simple_kind(groups, 1, None, out);
    simple_kind(groups, 2, None, out);
    simple_kind(groups, 3, None, out);
    triples_with_kicker(groups, None, false, out);
    triples_with_kicker(groups, None, true, out);
    for len in 5..=12u8 {
        runs(groups, 1, len, None, out);
    }
    for len in 3..=10u8 {
        runs(groups, 2, len, None, out);
    }
    for len in 2..=6u8 {
        runs(groups, 3, len, None, out);
    }
    for k in 2..=5u8 {
        if (k as usize) * 4 <= total {
            plane_wings(groups, k, false, None, out);
        }
        if (k as usize) * 5 <= total {
            plane_wings(groups, k, true, None, out);
        }
    }
    four_two(groups, None, false, out);
    four_two(groups, None, true, out);
    bombs(groups, None, out);
    rocket(groups, out);
}

/// 单张/对子/三张：数量足够且主牌值大于 `min` 的每个牌值产出一手。
fn simple_kind(groups: &Groups, depth: usize, min: Option<u8>, out: &mut Vec<Pattern>) {
    for (&v, g) in groups {
        if g.len() < depth || min.is_some_and(|m| v <= m) {
            continue;
        }
        // 对子不能用王（王也凑不成对，防御性过滤）
        if depth == 2 && v >= VALUE_SMALL_JOKER {
            continue;
        }
        if let Some(p) = classify(&g[..depth]) {
            out.push(p);
        }
    }
}

/// 三带一/三带二。每个三张主体与每个可行的带牌值组合各产出一手。
fn triples_with_kicker(groups: &Groups, min: Option<u8>, pair_kicker: bool, out: &mut Vec<Pattern>) {
    for (&v, g) in groups {
        if g.len() < 3 || min.is_some_and(|m| v <= m) {
            continue;
        }
        for (&kv, kg) in groups {
            if kv == v {
                continue;
            }
            if pair_kicker && (kg.len() < 2 || kv >= VALUE_SMALL_JOKER) {
                continue;
            }
            let mut cards: Vec<Card> = g[..3].to_vec();
            cards.extend_from_slice(&kg[..if pair_kicker { 2 } else { 1 }]);
            if let Some(p) = classify(&cards) {
                out.push(p);
            }
        }
    }
}

/// 顺子族的滑动窗口枚举。
///
/// `depth` 是每个牌值需要的张数（顺子 1、连对 2、飞机 3），`len` 是节数。
/// 候选起点下界是 `last_main - len + 2`（恰好比上家大一档），
/// 上界受不含 2/王的范围限制。窗口内每个牌值张数都要够。
fn runs(groups: &Groups, depth: usize, len: u8, min_main: Option<u8>, out: &mut Vec<Pattern>) {
    if len as u16 + VALUE_THREE as u16 - 1 > MAX_RUN_VALUE as u16 {
        return;
    }
    let lo = match min_main {
        Some(m) => (m + 2).saturating_sub(len),
        None => VALUE_THREE,
    };
    let hi = MAX_RUN_VALUE - len + 1;
    for start in lo.max(VALUE_THREE)..=hi {
        let window = start..start + len;
        if window
            .clone()
            .all(|v| groups.get(&v).is_some_and(|g| g.len() >= depth))
        {
            let mut cards = Vec::with_capacity(depth * len as usize);
            for v in window {
                cards.extend_from_slice(&groups[&v][..depth]);
            }
            if let Some(p) = classify(&cards) {
                out.push(p);
            }
        }
    }
}

/// 飞机带翅膀：主体滑窗同 `runs`，翅膀取主体之外最小的单张或对子。
fn plane_wings(groups: &Groups, k: u8, pair_wings: bool, min_main: Option<u8>, out: &mut Vec<Pattern>) {
    let lo = match min_main {
        Some(m) => (m + 2).saturating_sub(k),
        None => VALUE_THREE,
    };
    if k < 2 || k > MAX_RUN_VALUE - VALUE_THREE + 1 {
        return;
    }
    let hi = MAX_RUN_VALUE - k + 1;
    for start in lo.max(VALUE_THREE)..=hi {
        let window = start..start + k;
        if !window
            .clone()
            .all(|v| groups.get(&v).is_some_and(|g| g.len() >= 3))
        {
            continue;
        }
        let mut cards = Vec::with_capacity(k as usize * if pair_wings { 5 } else { 4 });
        for v in window.clone() {
            cards.extend_from_slice(&groups[&v][..3]);
        }
        if !push_wings(groups, window.collect::<Vec<_>>(), k as usize, pair_wings, &mut cards) {
            continue;
        }
        if let Some(p) = classify(&cards) {
            // 翅膀的 canonical 选取可能意外延长主体，分类结果不符时丢弃
            if p.kind == PatternKind::PlaneWings && p.length == k {
                out.push(p);
            }
        }
    }
}

/// 从主体之外的分组里取 `k` 个最小的翅膀，取不够返回 false。
fn push_wings(groups: &Groups, exclude: Vec<u8>, k: usize, pair_wings: bool, cards: &mut Vec<Card>) -> bool {
    let mut taken = 0usize;
    for (&v, g) in groups {
        if taken == k {
            break;
        }
        if exclude.contains(&v) {
            continue;
        }
        if pair_wings {
            if g.len() >= 2 && v < VALUE_SMALL_JOKER {
                cards.extend_from_slice(&g[..2]);
                taken += 1;
            }
        } else {
            // 单张翅膀不拆炸弹
            if g.len() < 4 {
                let take = g.len().min(k - taken);
                cards.extend_from_slice(&g[..take]);
                taken += take;
            }
        }
    }
    taken == k
}

/// 四带二（两单或两对）。翅膀同样取最小可用。
fn four_two(groups: &Groups, min: Option<u8>, pair_kickers: bool, out: &mut Vec<Pattern>) {
    for (&v, g) in groups {
        if g.len() < 4 || min.is_some_and(|m| v <= m) {
            continue;
        }
        let mut cards = g[..4].to_vec();
        // 两张单牌或两个对子，计数单位不同但都是 2
        let need = 2usize;
        let mut taken = 0usize;
        for (&kv, kg) in groups {
            if taken == need || kv == v {
                continue;
            }
            if pair_kickers {
                if kg.len() >= 2 && kv < VALUE_SMALL_JOKER {
                    cards.extend_from_slice(&kg[..2]);
                    taken += 1;
                }
            } else if kg.len() < 4 {
                let take = kg.len().min(need - taken);
                cards.extend_from_slice(&kg[..take]);
                taken += take;
            }
        }
        if taken == need {
            if let Some(p) = classify(&cards) {
                if p.kind == PatternKind::FourTwo {
                    out.push(p);
                }
            }
        }
    }
}

/// 所有比 `min` 大的炸弹（`min` 为 None 时是全部炸弹）。
fn bombs(groups: &Groups, min: Option<u8>, out: &mut Vec<Pattern>) {
    for (&v, g) in groups {
        if g.len() == 4 && min.is_none_or(|m| v > m) {
            if let Some(p) = classify(g) {
                out.push(p);
            }
        }
    }
}

/// 手里同时有大小王就能出王炸。
fn rocket(groups: &Groups, out: &mut Vec<Pattern>) {
    if let (Some(s), Some(b)) = (groups.get(&VALUE_SMALL_JOKER), groups.get(&VALUE_BIG_JOKER)) {
        if let Some(p) = classify(&[s[0], b[0]]) {
            out.push(p);
        }
    }
}

// --- 单元测试 ---
