use ddz_arena_core::{RoomId, Settlement};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// 一条结算流水，每局结束恰好产生一条。
#[derive(Debug, Clone, Serialize)]
pub struct SettlementRecord {
    pub room_id: RoomId,
    pub settlement: Settlement,
}

/// 启动结算收集任务，返回写入端。
///
/// 房间 actor 在结算时把记录丢进无界通道即返回（fire-and-forget），
/// 落盘/上报由这里的独立任务完成，永远不会拖慢任何房间的动作处理。
/// 真正的持久化方是外部协作者，这里以结构化日志的形式交付。
pub fn spawn_sink() -> mpsc::UnboundedSender<SettlementRecord> {
    let (tx, mut rx) = mpsc::unbounded_channel::<SettlementRecord>();
    tokio::spawn(async move {
        while let Some(record) = rx.recv().await {
            match serde_json::to_string(&record) {
                Ok(line) => info!(target: "settlement", "{}", line),
                Err(e) => warn!("序列化结算记录失败: {}", e),
            }
        }
    });
    tx
}
