//! Async Gateway client: drives a `tokio-tungstenite` connection through
//! the handshake, heartbeat, and dispatch flow using the pure decisions
//! from [`super::session`], reconnecting on retryable failures and
//! giving up on fatal ones.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::base::{Ingestor, IngestorCore};
use crate::types::IngestorState;

use super::frame::{GatewayFrame, close_code, opcode};
use super::session::{
    GatewaySession, ReconnectDecision, classify_close, heartbeat_ack_frame, heartbeat_frame,
    heartbeat_jitter, invalid_session_backoff, should_push,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone)]
pub struct DiscordConfig {
    pub token: String,
    pub intents: u32,
    pub event_filter: Option<std::collections::HashSet<String>>,
    pub gateway_url: String,
    pub max_reconnect_attempts: u32,
}

enum ConnectionOutcome {
    Stopped,
    Fatal(String),
    Reconnect { preserve_session: bool },
}

enum FrameOutcome {
    Continue,
    Reconnect { preserve_session: bool },
}

/// The reference protocol ingestor: a Discord Gateway v10 WebSocket
/// client built on [`IngestorCore`].
pub struct DiscordGatewayIngestor {
    core: IngestorCore,
    config: DiscordConfig,
    session: Mutex<GatewaySession>,
    cancel: CancellationToken,
}

impl DiscordGatewayIngestor {
    pub fn new(core: IngestorCore, config: DiscordConfig) -> Self {
        Self {
            core,
            config,
            session: Mutex::new(GatewaySession::new()),
            cancel: CancellationToken::new(),
        }
    }

    async fn send_frame(&self, ws: &mut WsStream, frame: &serde_json::Value) -> std::io::Result<()> {
        let text = frame.to_string();
        ws.send(Message::Text(text))
            .await
            .map_err(std::io::Error::other)
    }

    async fn recv_gateway_frame(
        &self,
        ws: &mut WsStream,
    ) -> Result<Option<GatewayFrame>, ConnectionOutcome> {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => match serde_json::from_str::<GatewayFrame>(&text) {
                Ok(frame) => Ok(Some(frame)),
                Err(err) => {
                    debug!(alias = %self.core.alias(), error = %err, "dropping malformed gateway frame");
                    Ok(None)
                }
            },
            Some(Ok(Message::Close(frame))) => Err(self.close_outcome(frame)),
            Some(Ok(_)) => Ok(None),
            Some(Err(err)) => {
                warn!(alias = %self.core.alias(), error = %err, "websocket read error");
                Err(ConnectionOutcome::Reconnect {
                    preserve_session: true,
                })
            }
            None => Err(ConnectionOutcome::Reconnect {
                preserve_session: true,
            }),
        }
    }

    fn close_outcome(&self, frame: Option<CloseFrame>) -> ConnectionOutcome {
        let code: u16 = frame.map(|f| f.code.into()).unwrap_or(close_code::NORMAL);
        if code == close_code::NORMAL {
            return ConnectionOutcome::Stopped;
        }
        match classify_close(code) {
            ReconnectDecision::Fatal(msg) => ConnectionOutcome::Fatal(msg),
            ReconnectDecision::Retry { preserve_session } => {
                ConnectionOutcome::Reconnect { preserve_session }
            }
        }
    }

    /// Handshake, heartbeat, and dispatch loop for a single established
    /// connection. Returns once the connection needs to be replaced.
    async fn run_connection(&self, mut ws: WsStream) -> ConnectionOutcome {
        let hello = match self.recv_gateway_frame(&mut ws).await {
            Ok(Some(frame)) if frame.op == opcode::HELLO => frame,
            Ok(Some(_)) => {
                return ConnectionOutcome::Reconnect {
                    preserve_session: true,
                };
            }
            Ok(None) => {
                return ConnectionOutcome::Reconnect {
                    preserve_session: true,
                };
            }
            Err(outcome) => return outcome,
        };

        let interval_ms = hello
            .d
            .get("heartbeat_interval")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(41_250);
        let interval = Duration::from_millis(interval_ms);

        {
            let mut session = self.session.lock().unwrap();
            session.heartbeat_acked = true;
        }

        let handshake = {
            let session = self.session.lock().unwrap();
            session.handshake_frame(&self.config.token, self.config.intents)
        };
        if self.send_frame(&mut ws, &handshake).await.is_err() {
            return ConnectionOutcome::Reconnect {
                preserve_session: true,
            };
        }

        let mut next_heartbeat = Instant::now() + heartbeat_jitter(interval);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    let _ = ws.close(Some(CloseFrame {
                        code: CloseCode::from(close_code::NORMAL),
                        reason: "stopping".into(),
                    })).await;
                    return ConnectionOutcome::Stopped;
                }
                _ = tokio::time::sleep_until(next_heartbeat) => {
                    let acked = self.session.lock().unwrap().heartbeat_acked;
                    if !acked {
                        warn!(alias = %self.core.alias(), "zombie connection, no heartbeat ack received");
                        let _ = ws.close(Some(CloseFrame {
                            code: CloseCode::from(close_code::ZOMBIE),
                            reason: "zombie".into(),
                        })).await;
                        return ConnectionOutcome::Reconnect { preserve_session: true };
                    }
                    self.session.lock().unwrap().heartbeat_acked = false;
                    let seq = self.session.lock().unwrap().sequence_number;
                    if self.send_frame(&mut ws, &heartbeat_frame(seq)).await.is_err() {
                        return ConnectionOutcome::Reconnect { preserve_session: true };
                    }
                    next_heartbeat = Instant::now() + interval;
                }
                frame = self.recv_gateway_frame(&mut ws) => {
                    match frame {
                        Ok(Some(frame)) => {
                            match self.handle_frame(&mut ws, frame).await {
                                FrameOutcome::Continue => {}
                                FrameOutcome::Reconnect { preserve_session } => {
                                    return ConnectionOutcome::Reconnect { preserve_session };
                                }
                            }
                        }
                        Ok(None) => {}
                        Err(outcome) => return outcome,
                    }
                }
            }
        }
    }

    async fn handle_frame(&self, ws: &mut WsStream, frame: GatewayFrame) -> FrameOutcome {
        match frame.op {
            opcode::DISPATCH => {
                self.session.lock().unwrap().record_dispatch(&frame);
                if let Some(event_type) = frame.t.clone()
                    && should_push(&self.config.event_filter, &event_type)
                {
                    let idempotency_key = frame
                        .d
                        .get("id")
                        .and_then(serde_json::Value::as_str)
                        .map(String::from);
                    self.core.push_event(event_type, frame.d, idempotency_key);
                }
                FrameOutcome::Continue
            }
            opcode::HEARTBEAT => {
                let _ = self.send_frame(ws, &heartbeat_ack_frame()).await;
                FrameOutcome::Continue
            }
            opcode::HEARTBEAT_ACK => {
                self.session.lock().unwrap().heartbeat_acked = true;
                FrameOutcome::Continue
            }
            opcode::RECONNECT => {
                info!(alias = %self.core.alias(), "gateway requested reconnect");
                let _ = ws
                    .close(Some(CloseFrame {
                        code: CloseCode::from(close_code::REPLAY),
                        reason: "server requested reconnect".into(),
                    }))
                    .await;
                FrameOutcome::Reconnect {
                    preserve_session: true,
                }
            }
            opcode::INVALID_SESSION => {
                let resumable = frame.d.as_bool().unwrap_or(false);
                if !resumable {
                    self.session.lock().unwrap().clear_session();
                }
                tokio::time::sleep(invalid_session_backoff()).await;
                FrameOutcome::Reconnect {
                    preserve_session: resumable,
                }
            }
            _ => FrameOutcome::Continue,
        }
    }

    /// Sleep for the backoff interval of the next attempt, bumping the
    /// attempt counter first. Returns `false` if attempts are exhausted
    /// (the ingestor is left in `failed`) or `stop()` was called meanwhile.
    async fn schedule_reconnect(&self) -> bool {
        let attempt = {
            let mut session = self.session.lock().unwrap();
            session.reconnect_attempts += 1;
            session.reconnect_attempts
        };

        if attempt > self.config.max_reconnect_attempts {
            self.core.set_error(format!(
                "exceeded max reconnect attempts ({})",
                self.config.max_reconnect_attempts
            ));
            self.core.set_state(IngestorState::Failed);
            error!(alias = %self.core.alias(), attempts = attempt, "exceeded max reconnect attempts, giving up");
            return false;
        }

        self.core.set_state(IngestorState::Reconnecting);
        self.core.record_reconnect();
        let backoff = super::session::compute_backoff(attempt - 1);
        info!(alias = %self.core.alias(), attempt, backoff_ms = backoff.as_millis() as u64, "scheduling reconnect");

        tokio::select! {
            _ = tokio::time::sleep(backoff) => true,
            _ = self.cancel.cancelled() => {
                self.core.set_state(IngestorState::Stopped);
                false
            }
        }
    }
}

impl Ingestor for DiscordGatewayIngestor {
    fn core(&self) -> &IngestorCore {
        &self.core
    }

    fn start(self: std::sync::Arc<Self>) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(async move {
            self.core.set_state(IngestorState::Starting);

            loop {
                if self.cancel.is_cancelled() {
                    self.core.set_state(IngestorState::Stopped);
                    return;
                }

                let url = {
                    let session = self.session.lock().unwrap();
                    session.connect_url(&self.config.gateway_url).to_string()
                };

                info!(alias = %self.core.alias(), url = %url, "connecting to gateway");

                match connect_async(&url).await {
                    Ok((ws, _response)) => {
                        self.core.clear_error();
                        self.core.set_state(IngestorState::Running);

                        match self.run_connection(ws).await {
                            ConnectionOutcome::Stopped => {
                                self.core.set_state(IngestorState::Stopped);
                                return;
                            }
                            ConnectionOutcome::Fatal(message) => {
                                error!(alias = %self.core.alias(), error = %message, "fatal gateway error");
                                self.core.set_error(message);
                                self.core.set_state(IngestorState::Failed);
                                return;
                            }
                            ConnectionOutcome::Reconnect { preserve_session } => {
                                if !preserve_session {
                                    self.session.lock().unwrap().clear_session();
                                }
                                if !self.schedule_reconnect().await {
                                    return;
                                }
                            }
                        }
                    }
                    Err(err) => {
                        warn!(alias = %self.core.alias(), error = %err, "gateway connection attempt failed");
                        self.core.set_error(err.to_string());
                        if !self.schedule_reconnect().await {
                            return;
                        }
                    }
                }
            }
        })
    }

    fn stop(&self) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        self.cancel.cancel();
        Box::pin(async {})
    }
}
