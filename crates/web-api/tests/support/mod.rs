#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc, time::Duration};

use application::{HistoryService, Hub, HubDependencies, SystemClock};
use config::AppConfig;
use futures_util::{SinkExt, StreamExt};
use infrastructure::Infrastructure;
use serde_json::Value;
use tokio::{net::TcpListener, net::TcpStream, sync::oneshot};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as TungsteniteMessage, MaybeTlsStream, WebSocketStream,
};
use web_api::{router, AppState};

pub type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// 进程内启动的完整服务（内存存储）
pub struct TestServer {
    pub addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    pub async fn start() -> Self {
        let config = AppConfig::default();
        let infra = Infrastructure::in_memory();
        let (hub, _task) = Hub::spawn(
            &config.hub,
            HubDependencies {
                store: infra.store.clone(),
                directory: infra.directory.clone(),
                clock: Arc::new(SystemClock),
            },
        );
        let state = AppState::new(hub, HistoryService::new(infra.store));
        let app = router(state, &config.server.cors_origins);

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        Self {
            addr,
            shutdown: Some(shutdown_tx),
        }
    }

    pub fn http(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self, query: &str) -> String {
        format!("ws://{}/ws{}", self.addr, query)
    }

    pub async fn connect(&self, user_id: &str, name: &str) -> Ws {
        let url = self.ws_url(&format!("?userId={user_id}&name={name}&role=customer"));
        let (ws, _) = connect_async(url).await.expect("ws connect");
        ws
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// 读取下一条 JSON 事件，跳过控制帧
pub async fn next_event(ws: &mut Ws) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(3), ws.next())
            .await
            .expect("timed out waiting for event")
            .expect("stream ended")
            .expect("ws error");
        match frame {
            TungsteniteMessage::Text(payload) => {
                return serde_json::from_str(payload.as_str()).expect("event json");
            }
            TungsteniteMessage::Ping(_) | TungsteniteMessage::Pong(_) => continue,
            other => panic!("unexpected frame {other:?}"),
        }
    }
}

/// 读取下一条指定类型的事件，跳过其他事件
pub async fn expect_event(ws: &mut Ws, kind: &str) -> Value {
    loop {
        let event = next_event(ws).await;
        if event["type"] == kind {
            return event["data"].clone();
        }
    }
}

pub async fn send_json(ws: &mut Ws, value: Value) {
    ws.send(TungsteniteMessage::Text(value.to_string().into()))
        .await
        .expect("ws send");
}
