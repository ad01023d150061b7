//! # 斗地主核心逻辑库
//!
//! 这个 `core` crate 包含斗地主对局的全部权威规则：
//! 牌型分类与比较、压牌枚举（提示/兜底）、单局状态机
//! （发牌 → 叫分 → 出牌 → 结算），以及客户端-服务器通信消息的定义。
//! 它不做任何 I/O、不依赖异步运行时，服务端和客户端共用同一份规则，
//! 以服务端持有的状态为唯一权威。

mod card;
mod engine;
mod hint;
mod message;
mod pattern;

pub use card::*;

pub use engine::*;

pub use hint::{beating_plays, hint, smallest_single};

pub use message::*;

pub use pattern::*;
