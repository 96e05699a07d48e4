//! The single outbound writer (spec §5): a bounded, per-session FIFO queue
//! feeding one task that owns the actual transport write. Every producer
//! (fast-layer pipeline, main-layer pipeline, orchestrator control frames)
//! holds a cloned handle; ordering across producers is whatever order they
//! call `send` in, which the turn pipeline's synchronization barrier is
//! responsible for getting right (P2).

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use voice_gateway_core::wire::WireFrame;

const SLOW_CLIENT_WAIT: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum OutboundError {
    #[error("outbound queue stalled past the slow-client threshold")]
    SlowClient,
    #[error("outbound queue closed")]
    Closed,
}

/// A cloneable producer handle onto a session's bounded outbound queue.
#[derive(Clone)]
pub struct OutboundQueue {
    sender: mpsc::Sender<WireFrame>,
    slow_client_wait: Duration,
}

impl OutboundQueue {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<WireFrame>) {
        Self::with_slow_client_wait(capacity, SLOW_CLIENT_WAIT)
    }

    pub fn with_slow_client_wait(capacity: usize, slow_client_wait: Duration) -> (Self, mpsc::Receiver<WireFrame>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender, slow_client_wait }, receiver)
    }

    pub async fn send(&self, frame: WireFrame) -> Result<(), OutboundError> {
        match tokio::time::timeout(self.slow_client_wait, self.sender.send(frame)).await {
            Ok(Ok(())) => {
                let depth = self.sender.max_capacity() - self.sender.capacity();
                metrics::gauge!("voice_gateway_outbound_queue_depth").set(depth as f64);
                Ok(())
            }
            Ok(Err(_)) => Err(OutboundError::Closed),
            Err(_) => Err(OutboundError::SlowClient),
        }
    }
}

/// The transport-facing half of the outbound writer. The server crate
/// implements this over an `axum` WebSocket sink; tests implement it over
/// an in-memory `Vec`.
#[async_trait]
pub trait OutboundSink: Send {
    async fn send_frame(&mut self, frame: WireFrame) -> Result<(), OutboundError>;
}

/// Drains the queue in FIFO order and hands each frame to the sink. Runs as
/// its own task for the lifetime of the session; its loop ending (sink
/// error, or every producer handle dropped) is the signal to tear the
/// session down.
pub async fn run_outbound_writer(
    mut receiver: mpsc::Receiver<WireFrame>,
    mut sink: impl OutboundSink,
) {
    while let Some(frame) = receiver.recv().await {
        if let Err(err) = sink.send_frame(frame).await {
            tracing::warn!(error = %err, "outbound sink failed, stopping writer");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voice_gateway_core::wire::{FrameFlags, MessageType};

    struct VecSink(Vec<WireFrame>);

    #[async_trait]
    impl OutboundSink for &mut VecSink {
        async fn send_frame(&mut self, frame: WireFrame) -> Result<(), OutboundError> {
            self.0.push(frame);
            Ok(())
        }
    }

    #[tokio::test]
    async fn frames_are_delivered_in_fifo_order() {
        let (queue, receiver) = OutboundQueue::new(8);
        for i in 0..5u8 {
            queue
                .send(WireFrame::new(MessageType::LlmChunk, FrameFlags::NONE, vec![i]))
                .await
                .unwrap();
        }
        drop(queue);

        let mut sink = VecSink(Vec::new());
        run_outbound_writer(receiver, &mut sink).await;

        let order: Vec<u8> = sink.0.iter().map(|f| f.payload[0]).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn send_reports_slow_client_when_queue_never_drains() {
        let (queue, _receiver) = OutboundQueue::with_slow_client_wait(1, Duration::from_millis(20));
        queue
            .send(WireFrame::control(MessageType::Ready))
            .await
            .unwrap();
        let result = queue.send(WireFrame::control(MessageType::Ready)).await;
        assert!(matches!(result, Err(OutboundError::SlowClient)));
    }
}
