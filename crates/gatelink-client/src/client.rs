//! The gateway client.
//!
//! [`GatewayClient`] is a thin handle. All connection state lives in a single
//! actor task that owns the transport, the pending table, the sequence cursor
//! and the backoff schedule. The handle talks to it over a command channel;
//! the actor reports to the consumer over an event channel.
//!
//! Every message the actor receives from a transport or a helper task carries
//! the connection epoch it belongs to. The epoch changes whenever a transport
//! is opened or torn down, so late traffic from an old socket is ignored.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gatelink_core::{IdGenerator, UuidGenerator};
use gatelink_identity::DeviceIdentityProvider;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::backoff::Backoff;
use crate::error::ClientError;
use crate::frame::{EventFrame, Frame, RequestFrame};
use crate::handshake::{HandshakeAttempt, Negotiator, PreparedHandshake};
use crate::options::ClientOptions;
use crate::pending::{Completion, PendingRequest, PendingTable};
use crate::protocol::{
    HelloOk, ABNORMAL_CLOSE_CODE, CHALLENGE_EVENT, CONNECT_FAILED_CLOSE_CODE,
    CONNECT_FAILED_REASON, CONNECT_METHOD, SERVICE_RESTART_CLOSE_CODE,
};
use crate::sequencer::{EventSequencer, SequenceGap};
use crate::transport::{Connector, Outbound, TransportEvent, TransportLink};

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not started.
    Idle,
    /// Opening a transport, or waiting to retry.
    Connecting,
    /// Transport open; requests may be sent.
    Open,
    /// Stopping.
    Closing,
    /// Stopped for good.
    Closed,
}

/// How a connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
}

impl CloseInfo {
    /// Whether the server announced a planned restart.
    pub fn is_service_restart(&self) -> bool {
        self.code == SERVICE_RESTART_CLOSE_CODE
    }

    /// Error text to show a user, or `None` for a planned restart.
    pub fn visible_error(&self) -> Option<String> {
        if self.is_service_restart() {
            return None;
        }
        let reason = if self.reason.is_empty() {
            "no reason"
        } else {
            self.reason.as_str()
        };
        Some(format!("disconnected ({}): {}", self.code, reason))
    }
}

/// Notifications delivered to the consumer, in order.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Handshake succeeded.
    Hello(HelloOk),
    /// A server event.
    Event(EventFrame),
    /// Sequence numbers were skipped; delivered before the event that revealed it.
    Gap(SequenceGap),
    /// The connection closed. Not sent after [`GatewayClient::stop`].
    Closed(CloseInfo),
    /// A reconnect is scheduled.
    Reconnecting { delay: Duration },
}

enum Command {
    Request {
        id: String,
        method: String,
        params: Option<Value>,
        completion: Completion,
    },
    Stop {
        ack: oneshot::Sender<()>,
    },
}

enum Internal {
    Opened {
        epoch: u64,
        result: Result<TransportLink, ClientError>,
    },
    Transport {
        epoch: u64,
        event: TransportEvent,
    },
    HandshakeReady {
        epoch: u64,
        prepared: Box<PreparedHandshake>,
    },
    HandshakeFailed {
        epoch: u64,
        error: ClientError,
    },
}

/// Handle to a gateway connection.
pub struct GatewayClient {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    ids: Arc<dyn IdGenerator>,
    seed: Mutex<Option<ClientActor>>,
    stopped: AtomicBool,
}

impl GatewayClient {
    /// Create a client. Nothing happens until [`GatewayClient::start`].
    ///
    /// The returned receiver carries [`ClientEvent`]s. Dropping it is fine;
    /// events are then discarded.
    pub fn new(
        options: ClientOptions,
        connector: Arc<dyn Connector>,
    ) -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);
        let ids: Arc<dyn IdGenerator> = Arc::new(UuidGenerator);

        let actor = ClientActor {
            commands: commands_rx,
            internal_rx,
            conn: Connection {
                url: options.url.clone(),
                challenge_wait: options.challenge_wait(),
                backoff: Backoff::from_config(&options.reconnect),
                negotiator: Arc::new(Negotiator::new(options, None)),
                connector,
                ids: ids.clone(),
                internal_tx,
                events: events_tx,
                state: state_tx,
                epoch: 0,
                link: None,
                pending: PendingTable::new(),
                sequencer: EventSequencer::new(),
                challenge: ChallengeState::default(),
                handshake: None,
                token_write: None,
                reconnect_at: None,
            },
        };

        let client = Self {
            commands: commands_tx,
            state: state_rx,
            ids,
            seed: Mutex::new(Some(actor)),
            stopped: AtomicBool::new(false),
        };
        (client, events_rx)
    }

    /// Sign handshakes with this device identity.
    ///
    /// Only takes effect before [`GatewayClient::start`]; afterwards the
    /// running connection keeps its negotiator and the call is logged and
    /// ignored.
    pub fn with_identity(self, identity: Arc<dyn DeviceIdentityProvider>) -> Self {
        match self.seed.lock().as_mut() {
            Some(actor) => {
                let options = actor.conn.negotiator.options().clone();
                actor.conn.negotiator = Arc::new(Negotiator::new(options, Some(identity)));
            }
            None => warn!("with_identity called after start; ignored"),
        }
        self
    }

    /// Use `ids` for request correlation ids.
    ///
    /// Like [`GatewayClient::with_identity`], this is ignored once started.
    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        match self.seed.lock().as_mut() {
            Some(actor) => {
                actor.conn.ids = ids.clone();
                self.ids = ids;
            }
            None => warn!("with_id_generator called after start; ignored"),
        }
        self
    }

    /// Start connecting. Calling it again while running does nothing.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<(), ClientError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(ClientError::Stopped);
        }
        if let Some(actor) = self.seed.lock().take() {
            tokio::spawn(actor.run());
        }
        Ok(())
    }

    /// Stop for good: cancel any reconnect, close the transport and fail
    /// every pending request with [`ClientError::Stopped`].
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        // Never started: there is nothing to tear down.
        let seed = self.seed.lock().take();
        if let Some(actor) = seed {
            actor.conn.set_state(ConnectionState::Closed);
            return;
        }
        let (ack, done) = oneshot::channel();
        if self.commands.send(Command::Stop { ack }).is_ok() {
            let _ = done.await;
        }
    }

    /// Send a request. Fails immediately if no transport is open.
    pub fn request(&self, method: &str, params: Option<Value>) -> Result<PendingRequest, ClientError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(ClientError::Stopped);
        }
        if *self.state.borrow() != ConnectionState::Open {
            return Err(ClientError::NotConnected);
        }
        let id = self.ids.next_id();
        let (completion, rx) = oneshot::channel();
        self.commands
            .send(Command::Request {
                id: id.clone(),
                method: method.to_string(),
                params,
                completion,
            })
            .map_err(|_| ClientError::Stopped)?;
        Ok(PendingRequest::new(id, method.to_string(), rx))
    }

    /// Send a request and wait for its payload.
    pub async fn call(&self, method: &str, params: Option<Value>) -> Result<Value, ClientError> {
        self.request(method, params)?.wait().await
    }

    /// Send a request and decode its payload.
    pub async fn call_as<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<T, ClientError> {
        self.request(method, params)?.wait_as().await
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Whether a transport is open.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Watch connection state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }
}

#[derive(Debug, Default)]
struct ChallengeState {
    nonce: Option<String>,
    sent: bool,
    deadline: Option<Instant>,
}

/// The `connect` request of the current connection, awaiting its response.
struct InFlightHandshake {
    id: String,
    attempt: HandshakeAttempt,
    outcome: oneshot::Receiver<Result<Value, ClientError>>,
}

struct ClientActor {
    commands: mpsc::UnboundedReceiver<Command>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
    conn: Connection,
}

impl ClientActor {
    async fn run(self) {
        let ClientActor {
            mut commands,
            mut internal_rx,
            mut conn,
        } = self;

        conn.connect();

        loop {
            let reconnect_at = conn.reconnect_at;
            let challenge_deadline = conn.challenge.deadline;

            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Request { id, method, params, completion }) => {
                        conn.send_request(id, method, params, completion);
                    }
                    Some(Command::Stop { ack }) => {
                        conn.shutdown();
                        let _ = ack.send(());
                        return;
                    }
                    None => {
                        conn.shutdown();
                        return;
                    }
                },
                Some(internal) = internal_rx.recv() => conn.handle_internal(internal),
                _ = sleep_until_opt(reconnect_at), if reconnect_at.is_some() => {
                    conn.reconnect_at = None;
                    conn.connect();
                }
                _ = sleep_until_opt(challenge_deadline), if challenge_deadline.is_some() => {
                    conn.challenge.deadline = None;
                    debug!(epoch = conn.epoch, "no challenge received; handshaking without nonce");
                    conn.send_connect();
                }
            }
        }
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

struct Connection {
    url: String,
    challenge_wait: Duration,
    backoff: Backoff,
    negotiator: Arc<Negotiator>,
    connector: Arc<dyn Connector>,
    ids: Arc<dyn IdGenerator>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    events: mpsc::UnboundedSender<ClientEvent>,
    state: watch::Sender<ConnectionState>,
    epoch: u64,
    link: Option<mpsc::UnboundedSender<Outbound>>,
    pending: PendingTable,
    sequencer: EventSequencer,
    challenge: ChallengeState,
    handshake: Option<InFlightHandshake>,
    /// Persistence of a token issued by the last hello. The next handshake
    /// waits for it.
    token_write: Option<JoinHandle<()>>,
    reconnect_at: Option<Instant>,
}

impl Connection {
    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    fn emit(&self, event: ClientEvent) {
        // The consumer may have dropped its receiver.
        let _ = self.events.send(event);
    }

    fn connect(&mut self) {
        self.epoch += 1;
        let epoch = self.epoch;
        self.set_state(ConnectionState::Connecting);
        info!(epoch, url = %self.url, "connecting to gateway");

        let connector = self.connector.clone();
        let url = self.url.clone();
        let internal = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = connector.connect(&url).await;
            let _ = internal.send(Internal::Opened { epoch, result });
        });
    }

    fn handle_internal(&mut self, internal: Internal) {
        match internal {
            Internal::Opened { epoch, result } if epoch == self.epoch => match result {
                Ok(link) => self.on_open(link),
                Err(e) => {
                    warn!(epoch, error = %e, "gateway connection failed");
                    self.on_close(ABNORMAL_CLOSE_CODE, e.to_string());
                }
            },
            Internal::Transport { epoch, event } if epoch == self.epoch => match event {
                TransportEvent::Message(text) => self.on_message(&text),
                TransportEvent::Error(message) => {
                    debug!(epoch, error = %message, "transport error");
                }
                TransportEvent::Closed { code, reason } => self.on_close(code, reason),
            },
            Internal::HandshakeReady { epoch, prepared } if epoch == self.epoch => {
                self.send_handshake(*prepared);
            }
            Internal::HandshakeFailed { epoch, error } if epoch == self.epoch => {
                warn!(epoch, error = %error, "gateway handshake failed");
                if let Some(link) = &self.link {
                    let _ = link.send(Outbound::Close {
                        code: CONNECT_FAILED_CLOSE_CODE,
                        reason: CONNECT_FAILED_REASON.to_string(),
                    });
                }
                self.on_close(CONNECT_FAILED_CLOSE_CODE, CONNECT_FAILED_REASON.to_string());
            }
            _ => debug!("dropping message from a previous connection"),
        }
    }

    fn on_open(&mut self, link: TransportLink) {
        let TransportLink {
            outbound,
            mut inbound,
        } = link;
        self.link = Some(outbound);
        self.sequencer.reset();
        self.challenge = ChallengeState {
            nonce: None,
            sent: false,
            deadline: Some(Instant::now() + self.challenge_wait),
        };
        self.set_state(ConnectionState::Open);
        debug!(epoch = self.epoch, "transport open; waiting for challenge");

        let epoch = self.epoch;
        let internal = self.internal_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = inbound.recv().await {
                let last = matches!(event, TransportEvent::Closed { .. });
                if internal.send(Internal::Transport { epoch, event }).is_err() || last {
                    return;
                }
            }
            // The transport vanished without reporting a close.
            let _ = internal.send(Internal::Transport {
                epoch,
                event: TransportEvent::Closed {
                    code: ABNORMAL_CLOSE_CODE,
                    reason: String::new(),
                },
            });
        });
    }

    fn on_message(&mut self, text: &str) {
        let frame = match Frame::decode(text) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(error = %e, "dropping undecodable frame");
                return;
            }
        };
        match frame {
            Frame::Event(event) if event.event == CHALLENGE_EVENT => {
                let nonce = event
                    .payload
                    .as_ref()
                    .and_then(|p| p.get("nonce"))
                    .and_then(Value::as_str)
                    .filter(|n| !n.is_empty());
                if let Some(nonce) = nonce {
                    debug!(epoch = self.epoch, "received handshake challenge");
                    self.challenge.nonce = Some(nonce.to_string());
                    self.send_connect();
                }
            }
            Frame::Event(event) => {
                if let Some(gap) = self.sequencer.observe(event.seq) {
                    warn!(expected = gap.expected, received = gap.received, "event gap detected");
                    self.emit(ClientEvent::Gap(gap));
                }
                self.emit(ClientEvent::Event(event));
            }
            Frame::Response(response) => {
                let id = response.id.clone();
                if !self.pending.settle(&id, response.into_result()) {
                    debug!(id = %id, "dropping response with no pending request");
                } else if self.handshake.as_ref().is_some_and(|h| h.id == id) {
                    self.finish_handshake();
                }
            }
            Frame::Request(request) => {
                debug!(method = %request.method, "ignoring server request");
            }
        }
    }

    /// Start the handshake for this connection, at most once.
    fn send_connect(&mut self) {
        if self.challenge.sent || self.link.is_none() {
            return;
        }
        self.challenge.sent = true;
        self.challenge.deadline = None;

        let epoch = self.epoch;
        let negotiator = self.negotiator.clone();
        let nonce = self.challenge.nonce.clone();
        let internal = self.internal_tx.clone();
        let token_write = self.token_write.take();
        tokio::spawn(async move {
            // A token issued on the previous connection must be on disk first.
            if let Some(write) = token_write {
                let _ = write.await;
            }
            let prepared = negotiator.prepare(nonce.as_deref()).await;
            let _ = internal.send(Internal::HandshakeReady {
                epoch,
                prepared: Box::new(prepared),
            });
        });
    }

    fn send_handshake(&mut self, prepared: PreparedHandshake) {
        let PreparedHandshake { params, attempt } = prepared;
        let id = self.ids.next_id();
        let (completion, outcome) = oneshot::channel();
        match serde_json::to_value(&params) {
            Ok(params) => {
                self.send_request(id.clone(), CONNECT_METHOD.to_string(), Some(params), completion);
            }
            Err(e) => {
                let _ = completion.send(Err(e.into()));
            }
        }
        self.handshake = Some(InFlightHandshake { id, attempt, outcome });
        // Sending may already have failed.
        self.finish_handshake();
    }

    /// Act on a settled `connect` response before the next frame is read, so
    /// `Hello` precedes every event that follows it on the wire.
    fn finish_handshake(&mut self) {
        let Some(inflight) = self.handshake.as_mut() else {
            return;
        };
        let result = match inflight.outcome.try_recv() {
            Ok(result) => result,
            Err(oneshot::error::TryRecvError::Empty) => return,
            Err(oneshot::error::TryRecvError::Closed) => Err(ClientError::Stopped),
        };
        let Some(InFlightHandshake { attempt, .. }) = self.handshake.take() else {
            return;
        };
        let result = result.and_then(|payload| {
            serde_json::from_value::<HelloOk>(payload)
                .map_err(|e| ClientError::Handshake(format!("invalid hello: {e}")))
        });

        let epoch = self.epoch;
        let negotiator = self.negotiator.clone();
        match result {
            Ok(hello) => {
                info!(epoch, protocol = hello.protocol, "gateway handshake complete");
                self.backoff.reset();
                if hello.device_token().is_some() {
                    let issued = hello.clone();
                    self.token_write = Some(tokio::spawn(async move {
                        negotiator.on_hello(&attempt, &issued).await;
                    }));
                }
                self.emit(ClientEvent::Hello(hello));
            }
            Err(error) => {
                // Clear a refused token before the close schedules a retry.
                let internal = self.internal_tx.clone();
                tokio::spawn(async move {
                    negotiator.on_rejected(&attempt, &error).await;
                    let _ = internal.send(Internal::HandshakeFailed { epoch, error });
                });
            }
        }
    }

    fn send_request(&mut self, id: String, method: String, params: Option<Value>, completion: Completion) {
        let Some(link) = self.link.clone() else {
            let _ = completion.send(Err(ClientError::NotConnected));
            return;
        };
        let frame = Frame::Request(RequestFrame {
            id: id.clone(),
            method: method.clone(),
            params,
        });
        let text = match frame.encode() {
            Ok(text) => text,
            Err(e) => {
                let _ = completion.send(Err(e));
                return;
            }
        };
        if let Err(completion) = self.pending.insert(id.clone(), method.clone(), completion) {
            let _ = completion.send(Err(ClientError::Protocol(format!(
                "duplicate request id {id}"
            ))));
            return;
        }
        debug!(id = %id, method = %method, "sending request");
        if link.send(Outbound::Text(text)).is_err() {
            // The transport task is gone; its close is on the way.
            self.pending.settle(
                &id,
                Err(ClientError::Transport("transport closed".to_string())),
            );
        }
    }

    fn on_close(&mut self, code: u16, reason: String) {
        self.link = None;
        self.epoch += 1;
        self.challenge = ChallengeState::default();
        self.handshake = None;
        self.sequencer.reset();

        let flushed = self.pending.flush(|| ClientError::ConnectionLost {
            code,
            reason: reason.clone(),
        });
        let info = CloseInfo { code, reason };
        if info.is_service_restart() {
            info!(code, flushed, "gateway restarting");
        } else {
            warn!(code, reason = %info.reason, flushed, "gateway connection closed");
        }
        self.emit(ClientEvent::Closed(info));

        let delay = self.backoff.next_delay();
        self.reconnect_at = Some(Instant::now() + delay);
        self.set_state(ConnectionState::Connecting);
        debug!(delay_ms = delay.as_millis() as u64, "reconnect scheduled");
        self.emit(ClientEvent::Reconnecting { delay });
    }

    fn shutdown(&mut self) {
        self.set_state(ConnectionState::Closing);
        self.epoch += 1;
        self.reconnect_at = None;
        self.challenge = ChallengeState::default();
        self.handshake = None;
        if let Some(link) = self.link.take() {
            let _ = link.send(Outbound::Close {
                code: 1000,
                reason: String::new(),
            });
        }
        let flushed = self.pending.flush(|| ClientError::Stopped);
        info!(flushed, "gateway client stopped");
        self.set_state(ConnectionState::Closed);
    }
}
