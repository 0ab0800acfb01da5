//! Axum WebSocket halves as dispatcher transport.

use std::borrow::Cow;

use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};

use crate::ports::{Frame, FrameReceiver, FrameSender, TransportError};

/// Inbound half of an upgraded socket.
pub struct AxumFrameReceiver {
    stream: SplitStream<WebSocket>,
}

/// Outbound half of an upgraded socket.
pub struct AxumFrameSender {
    sink: SplitSink<WebSocket, Message>,
}

/// Splits an upgraded socket into dispatcher halves.
pub fn split_socket(socket: WebSocket) -> (AxumFrameReceiver, AxumFrameSender) {
    let (sink, stream) = socket.split();
    (AxumFrameReceiver { stream }, AxumFrameSender { sink })
}

#[async_trait]
impl FrameReceiver for AxumFrameReceiver {
    async fn receive(&mut self) -> Option<Result<Frame, TransportError>> {
        while let Some(result) = self.stream.next().await {
            match result {
                Ok(Message::Text(text)) => return Some(Ok(Frame::Text(text))),
                Ok(Message::Binary(bytes)) => return Some(Ok(Frame::Binary(bytes))),
                // Protocol pings are answered by axum
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
                Ok(Message::Close(frame)) => {
                    tracing::debug!(code = ?frame.as_ref().map(|f| f.code), "Client sent close frame");
                    return None;
                }
                Err(e) => return Some(Err(TransportError::Io(e.to_string()))),
            }
        }
        None
    }
}

#[async_trait]
impl FrameSender for AxumFrameSender {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        let message = match frame {
            Frame::Text(text) => Message::Text(text),
            Frame::Binary(bytes) => Message::Binary(bytes),
        };
        self.sink
            .send(message)
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<(), TransportError> {
        let frame = CloseFrame {
            code,
            reason: Cow::Owned(reason.to_string()),
        };
        self.sink
            .send(Message::Close(Some(frame)))
            .await
            .map_err(|e| TransportError::Io(e.to_string()))?;
        if let Err(e) = self.sink.close().await {
            tracing::debug!(error = %e, "Socket already closed");
        }
        Ok(())
    }
}
