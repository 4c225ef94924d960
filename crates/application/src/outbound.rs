//! 每个连接的有界出站队列
//!
//! 中枢只做非阻塞的 `push`，由连接自己的写任务 `recv` 后写入 socket。
//! 慢消费者永远不会阻塞对其他连接的扇出：队列满时按策略丢弃最旧事件或断开连接。

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use config::OverflowPolicy;
use domain::ServerEvent;
use tokio::sync::Notify;

/// 入队结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// 队列已满，丢弃了最旧的一条待发送事件
    DroppedOldest,
    /// 队列已满且策略为断开，队列已关闭
    Overflowed,
    /// 队列已关闭（连接已断开）
    Closed,
}

impl PushOutcome {
    pub fn is_delivered(self) -> bool {
        matches!(self, PushOutcome::Queued | PushOutcome::DroppedOldest)
    }
}

struct QueueState {
    events: VecDeque<ServerEvent>,
    closed: bool,
    dropped: u64,
}

struct Shared {
    state: Mutex<QueueState>,
    notify: Notify,
    capacity: usize,
    policy: OverflowPolicy,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// 创建一对出站队列端点
pub fn outbound_queue(capacity: usize, policy: OverflowPolicy) -> (OutboundSender, OutboundReceiver) {
    let shared = Arc::new(Shared {
        state: Mutex::new(QueueState {
            events: VecDeque::with_capacity(capacity.min(64)),
            closed: false,
            dropped: 0,
        }),
        notify: Notify::new(),
        capacity: capacity.max(1),
        policy,
    });
    (
        OutboundSender {
            shared: shared.clone(),
        },
        OutboundReceiver { shared },
    )
}

/// 生产端，由中枢持有
#[derive(Clone)]
pub struct OutboundSender {
    shared: Arc<Shared>,
}

impl OutboundSender {
    pub fn push(&self, event: ServerEvent) -> PushOutcome {
        let outcome = {
            let mut state = self.shared.lock();
            if state.closed {
                return PushOutcome::Closed;
            }
            if state.events.len() < self.shared.capacity {
                state.events.push_back(event);
                PushOutcome::Queued
            } else {
                match self.shared.policy {
                    OverflowPolicy::DropOldest => {
                        state.events.pop_front();
                        state.events.push_back(event);
                        state.dropped += 1;
                        PushOutcome::DroppedOldest
                    }
                    OverflowPolicy::Disconnect => {
                        state.closed = true;
                        state.events.clear();
                        PushOutcome::Overflowed
                    }
                }
            }
        };
        self.shared.notify.notify_one();
        outcome
    }

    /// 关闭队列；已排队的事件仍可被读完
    pub fn close(&self) {
        self.shared.lock().closed = true;
        self.shared.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    /// 因溢出被丢弃的事件数
    pub fn dropped(&self) -> u64 {
        self.shared.lock().dropped
    }
}

/// 消费端，由连接的写任务持有
pub struct OutboundReceiver {
    shared: Arc<Shared>,
}

impl OutboundReceiver {
    /// 等待下一条事件；队列关闭且读空后返回 `None`
    pub async fn recv(&mut self) -> Option<ServerEvent> {
        loop {
            {
                let mut state = self.shared.lock();
                if let Some(event) = state.events.pop_front() {
                    return Some(event);
                }
                if state.closed {
                    return None;
                }
            }
            self.shared.notify.notified().await;
        }
    }

    pub fn try_recv(&mut self) -> Option<ServerEvent> {
        self.shared.lock().events.pop_front()
    }
}

impl Drop for OutboundReceiver {
    fn drop(&mut self) {
        self.shared.lock().closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn note(text: &str) -> ServerEvent {
        ServerEvent::notification(text)
    }

    fn sender_name(event: ServerEvent) -> String {
        match event {
            ServerEvent::Notification(payload) => payload.sender_name,
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn drop_oldest_keeps_newest_events() {
        let (tx, mut rx) = outbound_queue(2, OverflowPolicy::DropOldest);

        assert_eq!(tx.push(note("a")), PushOutcome::Queued);
        assert_eq!(tx.push(note("b")), PushOutcome::Queued);
        assert_eq!(tx.push(note("c")), PushOutcome::DroppedOldest);
        assert_eq!(tx.dropped(), 1);

        assert_eq!(sender_name(rx.recv().await.unwrap()), "b");
        assert_eq!(sender_name(rx.recv().await.unwrap()), "c");
        assert!(rx.try_recv().is_none());
    }

    #[tokio::test]
    async fn disconnect_policy_closes_queue_on_overflow() {
        let (tx, mut rx) = outbound_queue(1, OverflowPolicy::Disconnect);

        assert_eq!(tx.push(note("a")), PushOutcome::Queued);
        assert_eq!(tx.push(note("b")), PushOutcome::Overflowed);
        assert!(tx.is_closed());
        assert_eq!(tx.push(note("c")), PushOutcome::Closed);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn receiver_wakes_up_on_push() {
        let (tx, mut rx) = outbound_queue(4, OverflowPolicy::DropOldest);

        let reader = tokio::spawn(async move { rx.recv().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.push(note("late"));

        let event = tokio::time::timeout(Duration::from_secs(1), reader)
            .await
            .expect("reader woke up")
            .expect("join");
        assert_eq!(sender_name(event.unwrap()), "late");
    }

    #[tokio::test]
    async fn close_drains_pending_then_ends() {
        let (tx, mut rx) = outbound_queue(4, OverflowPolicy::DropOldest);
        tx.push(note("last"));
        tx.close();

        assert_eq!(sender_name(rx.recv().await.unwrap()), "last");
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn dropping_receiver_closes_sender() {
        let (tx, rx) = outbound_queue(4, OverflowPolicy::DropOldest);
        drop(rx);
        assert_eq!(tx.push(note("nobody")), PushOutcome::Closed);
    }
}
