use futures_util::{SinkExt, StreamExt};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use url::Url;
use uuid::Uuid;

use ddz_arena_core::{ClientMessage, ServerMessage};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let addr = std::env::var("DDZ_ARENA_URL")
        .unwrap_or_else(|_| "ws://127.0.0.1:25918/ws".to_string());
    let url = Url::parse(&addr)?;

    println!("正在连接到: {}", url);
    let (ws_stream, _) = connect_async(url.as_str()).await.expect("无法连接");
    println!("连接成功!");

    let (mut write, mut read) = ws_stream.split();

    // 接收任务：把服务器消息打印到控制台
    tokio::spawn(async move {
        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                    Ok(server_msg) => {
                        println!("\n<-- [服务器消息]:\n{:#?}\n", server_msg);
                        print!("> ");
                        std::io::stdout().flush().unwrap();
                    }
                    Err(e) => eprintln!("解析服务器消息失败: {}", e),
                },
                Ok(_) => {}
                Err(e) => {
                    eprintln!("接收消息时出错: {}", e);
                    break;
                }
            }
        }
    });

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    println!("--- 斗地主客户端 ---");
    println!("可用命令:");
    println!("  create <昵称>              - 创建一个新房间");
    println!("  join <房间ID> <昵称>       - 加入一个房间");
    println!("  reconnect <凭证>           - 断线重连");
    println!("  ready                      - 准备就绪");
    println!("  bid <0-3>                  - 叫分");
    println!("  play <牌id> [牌id...]      - 出牌");
    println!("  pass                       - 过牌");
    println!("  hint                       - 请求提示");
    println!("  state                      - 请求状态快照");
    print!("> ");
    std::io::stdout().flush()?;

    while let Some(line) = stdin.next_line().await? {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let msg = match parts.as_slice() {
            ["create", nickname] => Some(ClientMessage::CreateRoom {
                nickname: nickname.to_string(),
            }),
            ["join", room_id, nickname] => match Uuid::parse_str(room_id) {
                Ok(room_id) => Some(ClientMessage::JoinRoom {
                    room_id,
                    nickname: nickname.to_string(),
                }),
                Err(_) => {
                    eprintln!("房间ID格式不正确");
                    None
                }
            },
            ["reconnect", secret] => match Uuid::parse_str(secret) {
                Ok(secret) => Some(ClientMessage::Reconnect { secret }),
                Err(_) => {
                    eprintln!("凭证格式不正确");
                    None
                }
            },
            ["ready"] => Some(ClientMessage::Ready),
            ["bid", score] => match score.parse::<u8>() {
                Ok(score) => Some(ClientMessage::Bid { score }),
                Err(_) => {
                    eprintln!("叫分必须是 0~3 的数字");
                    None
                }
            },
            ["play", ids @ ..] if !ids.is_empty() => {
                match ids.iter().map(|s| s.parse::<u8>()).collect::<Result<Vec<_>, _>>() {
                    Ok(card_ids) => Some(ClientMessage::PlayCards { card_ids }),
                    Err(_) => {
                        eprintln!("牌id必须是数字");
                        None
                    }
                }
            }
            ["pass"] => Some(ClientMessage::Pass),
            ["hint"] => Some(ClientMessage::RequestHint),
            ["state"] => Some(ClientMessage::GetState),
            [] => None,
            _ => {
                eprintln!("未知命令");
                None
            }
        };

        if let Some(msg) = msg {
            let payload = serde_json::to_string(&msg)?;
            write.send(Message::Text(payload.into())).await?;
        }
        print!("> ");
        std::io::stdout().flush()?;
    }

    Ok(())
}
