use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use flow_api::{Message, OpFuture, OutputStream, StreamDecl};
use tokio::sync::{RwLock, mpsc};

use crate::config::OverflowPolicy;
use crate::error::StreamError;

#[derive(Clone)]
struct Subscriber {
    owner: String,
    tx: mpsc::Sender<Message>,
    overflow: OverflowPolicy,
}

// ═══════════════════════════════════════════════════════════════
//  Stream
// ═══════════════════════════════════════════════════════════════

/// Named, typed stream. Fans every published message out to its subscribers.
pub struct Stream {
    decl: StreamDecl,
    subscribers: RwLock<Vec<Subscriber>>,
    closed: AtomicBool,
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("decl", &self.decl)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Stream {
    pub fn new(decl: StreamDecl) -> Self {
        Self {
            decl,
            subscribers: RwLock::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn decl(&self) -> &StreamDecl {
        &self.decl
    }

    pub fn name(&self) -> &str {
        &self.decl.name
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Attach an inbox owned by `owner`. Several streams may share one sender;
    /// the receiver then sees their messages interleaved as they arrive.
    pub async fn attach(
        &self,
        owner: impl Into<String>,
        tx: mpsc::Sender<Message>,
        overflow: OverflowPolicy,
    ) {
        let owner = owner.into();
        tracing::debug!(stream = %self.decl.name, %owner, "subscriber attached");
        self.subscribers.write().await.push(Subscriber {
            owner,
            tx,
            overflow,
        });
    }

    /// Standalone subscription with its own bounded buffer.
    pub async fn subscribe(&self, buffer: usize, overflow: OverflowPolicy) -> Subscription {
        let (tx, rx) = mpsc::channel(buffer);
        self.attach("subscription", tx, overflow).await;
        Subscription { rx }
    }

    /// Type-check `msg`, stamp the stream name and deliver it to every
    /// subscriber. Subscribers whose receiver is gone are pruned.
    pub async fn publish(&self, mut msg: Message) -> Result<(), StreamError> {
        if self.is_closed() {
            return Err(StreamError::Closed(self.decl.name.clone()));
        }
        if !self.decl.data_type.accepts(&msg.payload) {
            return Err(StreamError::TypeMismatch {
                stream: self.decl.name.clone(),
                expected: self.decl.data_type.clone(),
                actual: msg.payload.data_type(),
            });
        }
        msg.stream.clone_from(&self.decl.name);

        // Snapshot so the lock is not held across a back-pressured send.
        let subscribers = self.subscribers.read().await.clone();
        let mut dead: Vec<mpsc::Sender<Message>> = Vec::new();

        for sub in &subscribers {
            match sub.overflow {
                OverflowPolicy::Drop => match sub.tx.try_send(msg.clone()) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::warn!(
                            stream = %self.decl.name,
                            subscriber = %sub.owner,
                            "inbox full, message dropped"
                        );
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => dead.push(sub.tx.clone()),
                },
                OverflowPolicy::BackPressure => {
                    if sub.tx.send(msg.clone()).await.is_err() {
                        dead.push(sub.tx.clone());
                    }
                }
            }
        }

        if !dead.is_empty() {
            let mut guard = self.subscribers.write().await;
            guard.retain(|s| !dead.iter().any(|d| d.same_channel(&s.tx)));
            tracing::debug!(stream = %self.decl.name, pruned = dead.len(), "closed subscribers pruned");
        }
        Ok(())
    }

    /// Mark the stream finished and drop every sender, so subscribers see the
    /// end of their inbox once no other stream feeds it.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.subscribers.write().await.clear();
        tracing::debug!(stream = %self.decl.name, "stream closed");
    }
}

impl OutputStream for Stream {
    fn decl(&self) -> &StreamDecl {
        &self.decl
    }

    fn send(&self, msg: Message) -> OpFuture<'_> {
        Box::pin(async move {
            self.publish(msg)
                .await
                .map_err(StreamError::into_operator_error)
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  Subscription
// ═══════════════════════════════════════════════════════════════

/// Receiving end of [`Stream::subscribe`].
pub struct Subscription {
    rx: mpsc::Receiver<Message>,
}

impl Subscription {
    /// Next message, or `None` once the stream is closed and drained.
    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Message> {
        self.rx.try_recv().ok()
    }

    /// Drain until the stream closes.
    pub async fn collect(mut self) -> Vec<Message> {
        let mut out = Vec::new();
        while let Some(msg) = self.rx.recv().await {
            out.push(msg);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_api::{DataType, ErrorKind, Value};

    #[tokio::test]
    async fn publish_stamps_name_and_fans_out() {
        let stream = Stream::new(StreamDecl::new("numbers", DataType::Int));
        let a = stream.subscribe(8, OverflowPolicy::BackPressure).await;
        let b = stream.subscribe(8, OverflowPolicy::Drop).await;

        stream.publish(Message::new(1i64, 1u64)).await.unwrap();
        stream.publish(Message::new(2i64, 2u64)).await.unwrap();
        stream.close().await;

        for sub in [a, b] {
            let got = sub.collect().await;
            assert_eq!(got.len(), 2);
            assert!(got.iter().all(|m| m.stream == "numbers"));
            assert_eq!(got[1].payload, Value::Int(2));
        }
    }

    #[test]
    fn debug_shows_decl_and_state() {
        let stream = Stream::new(StreamDecl::new("s", DataType::Int));
        let text = format!("{stream:?}");
        assert!(text.starts_with("Stream { decl: StreamDecl { name: \"s\""));
        assert!(text.contains("closed: false"));
    }

    #[tokio::test]
    async fn mistyped_payload_is_rejected() {
        let stream = Stream::new(StreamDecl::new("numbers", DataType::Int));
        let err = stream.publish(Message::new("nope", 1u64)).await.unwrap_err();
        assert!(matches!(err, StreamError::TypeMismatch { .. }));
        assert_eq!(err.into_operator_error().kind(), ErrorKind::Format);
    }

    #[tokio::test]
    async fn drop_policy_discards_when_full() {
        let stream = Stream::new(StreamDecl::new("s", DataType::Any));
        let mut sub = stream.subscribe(1, OverflowPolicy::Drop).await;

        stream.publish(Message::new(1i64, 1u64)).await.unwrap();
        stream.publish(Message::new(2i64, 2u64)).await.unwrap();

        assert_eq!(sub.try_recv().map(|m| m.payload), Some(Value::Int(1)));
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn dropped_subscription_is_pruned() {
        let stream = Stream::new(StreamDecl::new("s", DataType::Any));
        drop(stream.subscribe(1, OverflowPolicy::BackPressure).await);

        stream.publish(Message::new(1i64, 1u64)).await.unwrap();
        assert!(stream.subscribers.read().await.is_empty());
    }

    #[tokio::test]
    async fn publish_after_close_fails() {
        let stream = Stream::new(StreamDecl::new("s", DataType::Any));
        stream.close().await;
        let err = stream.publish(Message::new(1i64, 1u64)).await.unwrap_err();
        assert!(matches!(err, StreamError::Closed(name) if name == "s"));
    }
}
