//! Alpaca market-data websocket feed.
//!
//! Connecting performs the auth and subscribe handshake; after that every
//! text frame is a JSON array whose bar entries for our symbol are queued
//! and handed out one at a time by `next_bar`.

use std::collections::VecDeque;
use std::net::TcpStream;

use tracing::{debug, info, warn};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

use super::AlpacaCredentials;
use super::types::{ControlMessage, StreamMessage};
use crate::domain::bar::Bar;
use crate::domain::error::RevtraderError;
use crate::ports::bar_source::LiveBarFeed;

/// Frames read while waiting for a handshake reply before giving up.
const HANDSHAKE_FRAMES: usize = 8;

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

pub struct AlpacaBarStream {
    url: String,
    credentials: AlpacaCredentials,
    symbol: String,
    socket: Option<Socket>,
    pending: VecDeque<Bar>,
}

impl AlpacaBarStream {
    pub fn new(url: impl Into<String>, credentials: AlpacaCredentials, symbol: impl Into<String>) -> Self {
        AlpacaBarStream {
            url: url.into(),
            credentials,
            symbol: symbol.into(),
            socket: None,
            pending: VecDeque::new(),
        }
    }

    fn send(socket: &mut Socket, message: &ControlMessage) -> Result<(), RevtraderError> {
        let text = serde_json::to_string(message)
            .map_err(|e| RevtraderError::Transport { reason: e.to_string() })?;
        socket.send(Message::Text(text)).map_err(transport)
    }

    /// Reads frames until `accept` recognises a reply. Server errors fail
    /// the handshake.
    fn expect<F>(socket: &mut Socket, stage: &str, accept: F) -> Result<(), RevtraderError>
    where
        F: Fn(&StreamMessage) -> bool,
    {
        for _ in 0..HANDSHAKE_FRAMES {
            let text = match socket.read().map_err(transport)? {
                Message::Text(text) => text,
                Message::Close(_) => {
                    return Err(RevtraderError::Transport {
                        reason: format!("stream closed during {stage}"),
                    });
                }
                _ => continue,
            };
            for msg in parse_messages(&text)? {
                if let StreamMessage::Error { code, msg } = &msg {
                    return Err(RevtraderError::Transport {
                        reason: format!("{stage} failed: {msg} ({code})"),
                    });
                }
                if accept(&msg) {
                    return Ok(());
                }
            }
        }
        Err(RevtraderError::Transport {
            reason: format!("no reply to {stage}"),
        })
    }

    fn handle_frame(&mut self, text: &str) -> Result<(), RevtraderError> {
        let bars = bars_for_symbol(text, &self.symbol)?;
        self.pending.extend(bars);
        Ok(())
    }
}

impl LiveBarFeed for AlpacaBarStream {
    fn connect(&mut self) -> Result<(), RevtraderError> {
        self.socket = None;
        let (mut socket, _) = tungstenite::connect(self.url.as_str()).map_err(transport)?;

        Self::expect(&mut socket, "connect", |m| {
            matches!(m, StreamMessage::Success { msg } if msg == "connected")
        })?;

        Self::send(
            &mut socket,
            &ControlMessage::Auth {
                key: self.credentials.key_id.clone(),
                secret: self.credentials.secret_key.clone(),
            },
        )?;
        Self::expect(&mut socket, "auth", |m| {
            matches!(m, StreamMessage::Success { msg } if msg == "authenticated")
        })?;

        Self::send(
            &mut socket,
            &ControlMessage::Subscribe {
                bars: vec![self.symbol.clone()],
            },
        )?;
        let symbol = self.symbol.clone();
        Self::expect(&mut socket, "subscribe", |m| {
            matches!(m, StreamMessage::Subscription { bars } if bars.contains(&symbol))
        })?;

        info!(url = %self.url, symbol = %self.symbol, "bar stream subscribed");
        self.socket = Some(socket);
        Ok(())
    }

    fn next_bar(&mut self) -> Result<Option<Bar>, RevtraderError> {
        loop {
            if let Some(bar) = self.pending.pop_front() {
                return Ok(Some(bar));
            }

            let socket = self.socket.as_mut().ok_or_else(|| RevtraderError::Transport {
                reason: "bar stream is not connected".to_string(),
            })?;

            let message = match socket.read() {
                Ok(message) => message,
                Err(e) => {
                    self.socket = None;
                    return Err(transport(e));
                }
            };

            match message {
                Message::Text(text) => {
                    if let Err(e) = self.handle_frame(&text) {
                        warn!(error = %e, "ignoring unreadable frame");
                    }
                }
                Message::Close(frame) => {
                    debug!(?frame, "server closed bar stream");
                    self.socket = None;
                    return Err(RevtraderError::Transport {
                        reason: "bar stream closed by server".to_string(),
                    });
                }
                _ => {}
            }
        }
    }
}

fn transport(e: tungstenite::Error) -> RevtraderError {
    RevtraderError::Transport {
        reason: e.to_string(),
    }
}

fn parse_messages(text: &str) -> Result<Vec<StreamMessage>, RevtraderError> {
    serde_json::from_str(text).map_err(|e| RevtraderError::malformed(format!("stream frame: {e}")))
}

/// Bars in a frame for `symbol`, in frame order. Other symbols and message
/// kinds are dropped; a server error message is returned as `Transport`.
pub fn bars_for_symbol(text: &str, symbol: &str) -> Result<Vec<Bar>, RevtraderError> {
    let mut bars = Vec::new();
    for msg in parse_messages(text)? {
        match msg {
            StreamMessage::Bar(b) if b.symbol == symbol => bars.push(Bar::with_open(b.t, b.o, b.c)),
            StreamMessage::Error { code, msg } => {
                return Err(RevtraderError::Transport {
                    reason: format!("stream error {code}: {msg}"),
                });
            }
            _ => {}
        }
    }
    Ok(bars)
}
