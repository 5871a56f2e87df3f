//! Main Tether client implementation
//!
//! One [`Client`] owns at most one physical connection. Each connection gets
//! a reader task that feeds [`TransportEvent`]s into the state machine one
//! at a time, and a writer task that drains the outbound queue. A generation
//! counter tags every connection so that events from a connection the client
//! has already let go of are dropped.

use parking_lot::{Mutex, RwLock};
use std::ops::ControlFlow;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tether_core::{
    decode_compressed, decode_text_frame, time, Control, DecoderRegistry, Frame, Inflate,
    Message, Payload, ZlibInflater, CLOSE_ABNORMAL, CLOSE_NORMAL,
};
use tether_transport::{
    Transport, TransportEvent, TransportReceiver, TransportSender, WebSocketTransport,
};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::builder::ClientBuilder;
use crate::config::{BinaryMode, ClientConfig};
use crate::error::{ClientError, Result};
use crate::events::{ClientEvent, EventBus};
use crate::router::{self, HandlerId, Router, SubscriptionId};
use crate::schedule::{validate_interval, validate_message, ScheduledTask, TaskId, TaskTable};
use crate::state::ConnectionState;
use crate::timers::{TimerKey, Timers};

enum Outgoing {
    Frame(Frame),
    Close { code: u16, reason: String },
}

/// The live physical connection
struct Link<S> {
    sender: Arc<S>,
    outbound: mpsc::UnboundedSender<Outgoing>,
    reader: JoinHandle<()>,
}

impl<S> Drop for Link<S> {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

struct Conn<S> {
    state: ConnectionState,
    generation: u64,
    link: Option<Link<S>>,
    auto_reconnect: bool,
    attempts: u32,
    last_message_at: Instant,
    last_server_ping_at: Option<Instant>,
}

struct Inner<T: Transport> {
    config: ClientConfig,
    transport: T,
    decoders: RwLock<Arc<DecoderRegistry>>,
    inflater: Arc<dyn Inflate>,
    conn: Mutex<Conn<T::Sender>>,
    router: Mutex<Router>,
    tasks: Mutex<TaskTable>,
    timers: Timers,
    events: EventBus,
}

/// A resilient WebSocket client
///
/// Cheap to clone; clones share the same connection.
pub struct Client<T: Transport = WebSocketTransport> {
    inner: Arc<Inner<T>>,
}

impl<T: Transport> Clone for Client<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl Client<WebSocketTransport> {
    /// Create a client over the default WebSocket transport
    pub fn new(config: ClientConfig) -> Self {
        Self::with_transport(config, WebSocketTransport::new())
    }

    /// Create a builder
    pub fn builder(url: &str) -> ClientBuilder {
        ClientBuilder::new(url)
    }

    /// Connect with default settings (convenience method)
    pub async fn connect_to(url: &str) -> Result<Self> {
        ClientBuilder::new(url).connect().await
    }
}

impl<T: Transport> Client<T> {
    pub fn with_transport(config: ClientConfig, transport: T) -> Self {
        Self::from_parts(
            config,
            transport,
            DecoderRegistry::new(),
            Arc::new(ZlibInflater::new()),
        )
    }

    pub(crate) fn from_parts(
        config: ClientConfig,
        transport: T,
        decoders: DecoderRegistry,
        inflater: Arc<dyn Inflate>,
    ) -> Self {
        if !decoders.contains(config.decoder.name()) {
            warn!(
                "Decoder '{}' is not registered; binary frames will be dropped",
                config.decoder
            );
        }

        let conn = Conn {
            state: ConnectionState::Idle,
            generation: 0,
            link: None,
            auto_reconnect: config.auto_reconnect,
            attempts: 0,
            last_message_at: Instant::now(),
            last_server_ping_at: None,
        };

        Self {
            inner: Arc::new(Inner {
                events: EventBus::new(config.event_capacity),
                config,
                transport,
                decoders: RwLock::new(Arc::new(decoders)),
                inflater,
                conn: Mutex::new(conn),
                router: Mutex::new(Router::new()),
                tasks: Mutex::new(TaskTable::default()),
                timers: Timers::new(),
            }),
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Open the connection and wait until it is usable
    ///
    /// Returns immediately when already connecting or open. Re-arms
    /// auto-reconnect and resets the attempt counter, so this is also how a
    /// client leaves [`ConnectionState::GaveUp`].
    pub async fn connect(&self) -> Result<()> {
        {
            let mut conn = self.inner.conn.lock();
            if conn.state.is_active() {
                debug!("connect() while {}; nothing to do", conn.state);
                return Ok(());
            }
            conn.auto_reconnect = self.inner.config.auto_reconnect;
            conn.attempts = 0;
            self.inner.timers.cancel(TimerKey::Reconnect);
        }
        self.inner.open().await
    }

    /// Close the connection and stay closed
    ///
    /// Disables auto-reconnect and stops every timer. Safe to call in any
    /// state, any number of times.
    pub fn disconnect(&self) {
        self.inner.shutdown();
    }

    /// Disconnect and forget all tasks, topics and handlers
    pub fn reset(&self) {
        self.inner.shutdown();
        let mut conn = self.inner.conn.lock();
        self.inner.tasks.lock().clear();
        self.inner.router.lock().clear();
        conn.attempts = 0;
        info!("Client reset");
    }

    // ------------------------------------------------------------------
    // Sending
    // ------------------------------------------------------------------

    /// Queue a payload for sending
    ///
    /// Returns false, without touching the transport, unless the connection
    /// is open.
    pub fn send(&self, payload: impl Into<Payload>) -> bool {
        let payload: Payload = payload.into();
        let frame = Frame::from(payload);
        let conn = self.inner.conn.lock();
        if !conn.state.is_open() {
            warn!("Cannot send while {}", conn.state);
            self.inner
                .events
                .error(format!("Cannot send: connection is {}", conn.state));
            return false;
        }
        let queued = self.inner.enqueue(&conn, frame.clone());
        if queued {
            self.inner.events.emit(ClientEvent::Sent(frame));
        }
        queued
    }

    // ------------------------------------------------------------------
    // Topics and handlers
    // ------------------------------------------------------------------

    /// Call `callback` for every message whose topic is `topic`
    ///
    /// The server is told about a topic the first time someone subscribes
    /// while open; topics registered while disconnected are sent on the next
    /// open, as is every registered topic after a reconnect.
    pub fn subscribe<F>(&self, topic: &str, callback: F) -> SubscriptionId
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        let conn = self.inner.conn.lock();
        let (id, first) = self.inner.router.lock().subscribe(topic, Arc::new(callback));

        if first && conn.state.is_open() {
            self.inner.enqueue(&conn, Control::subscribe(topic).to_frame());
        } else if first {
            debug!("Topic '{}' will be subscribed on open", topic);
        }
        self.inner.events.info(format!("Subscribed to {}", topic));
        id
    }

    /// Drop one subscription, or the whole topic with `None`
    ///
    /// Returns true when the topic is gone, in which case the server is told
    /// to stop sending it.
    pub fn unsubscribe(&self, topic: &str, id: Option<SubscriptionId>) -> bool {
        let conn = self.inner.conn.lock();
        let removed = self.inner.router.lock().unsubscribe(topic, id);

        if removed {
            if conn.state.is_open() {
                self.inner
                    .enqueue(&conn, Control::unsubscribe(topic).to_frame());
            }
            self.inner.events.info(format!("Unsubscribed from {}", topic));
        }
        removed
    }

    /// Call `callback` for every decoded inbound message
    pub fn add_handler<F>(&self, callback: F) -> HandlerId
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.inner.router.lock().add_handler(Arc::new(callback))
    }

    pub fn remove_handler(&self, id: HandlerId) -> bool {
        self.inner.router.lock().remove_handler(id)
    }

    pub fn clear_handlers(&self) {
        self.inner.router.lock().clear_handlers();
    }

    /// Topics currently registered
    pub fn topics(&self) -> Vec<String> {
        self.inner.router.lock().topics()
    }

    // ------------------------------------------------------------------
    // Scheduled tasks
    // ------------------------------------------------------------------

    /// Send `message` every `interval` while connected
    ///
    /// The interval must be at least one second and the message non-empty.
    pub fn add_task(&self, message: impl Into<Payload>, interval: Duration) -> Result<TaskId> {
        let conn = self.inner.conn.lock();
        let mut tasks = self.inner.tasks.lock();

        let id = tasks.insert(message.into(), interval).map_err(|e| {
            warn!("Rejected task: {}", e);
            e
        })?;
        if let Some(task) = tasks.get(id) {
            self.inner.start_task_timer(&conn, task);
        }

        info!("Added {} every {:?}", id, interval);
        Ok(id)
    }

    /// Change a task's message and/or interval
    ///
    /// Invalid values are ignored with a warning; the rest still applies.
    pub fn update_task(
        &self,
        id: TaskId,
        message: Option<Payload>,
        interval: Option<Duration>,
    ) -> Result<()> {
        let conn = self.inner.conn.lock();
        let mut tasks = self.inner.tasks.lock();
        let task = tasks.get_mut(id)?;

        if let Some(message) = message {
            match validate_message(&message) {
                Ok(()) => task.message = message,
                Err(e) => warn!("{}: {}; keeping the old message", id, e),
            }
        }
        if let Some(interval) = interval {
            match validate_interval(interval) {
                Ok(()) => task.interval = interval,
                Err(e) => warn!("{}: {}; keeping {:?}", id, e, task.interval),
            }
        }

        if task.enabled && conn.state.is_open() {
            let task = task.clone();
            self.inner.start_task_timer(&conn, &task);
        }
        Ok(())
    }

    pub fn enable_task(&self, id: TaskId, enabled: bool) -> Result<()> {
        let conn = self.inner.conn.lock();
        let mut tasks = self.inner.tasks.lock();
        let task = tasks.get_mut(id)?;
        task.enabled = enabled;

        if enabled {
            let task = task.clone();
            self.inner.start_task_timer(&conn, &task);
        } else {
            self.inner.timers.cancel(TimerKey::Task(id));
        }
        Ok(())
    }

    pub fn remove_task(&self, id: TaskId) -> bool {
        let _conn = self.inner.conn.lock();
        self.inner.timers.cancel(TimerKey::Task(id));
        self.inner.tasks.lock().remove(id).is_some()
    }

    /// Start the task's timer; false unless it is enabled and the client open
    pub fn start_task(&self, id: TaskId) -> bool {
        let conn = self.inner.conn.lock();
        let tasks = self.inner.tasks.lock();
        match tasks.get(id) {
            Some(task) => self.inner.start_task_timer(&conn, task),
            None => false,
        }
    }

    /// Stop the task's timer, leaving the task registered
    pub fn stop_task(&self, id: TaskId) -> bool {
        self.inner.timers.cancel(TimerKey::Task(id))
    }

    pub fn stop_all_tasks(&self) {
        self.inner.stop_task_timers();
    }

    pub fn tasks(&self) -> Vec<ScheduledTask> {
        self.inner.tasks.lock().snapshot()
    }

    // ------------------------------------------------------------------
    // Decoding
    // ------------------------------------------------------------------

    /// Register a named decoder for raw binary frames
    pub fn register_decoder<F>(&self, name: &str, decoder: F)
    where
        F: Fn(&bytes::Bytes) -> Option<Message> + Send + Sync + 'static,
    {
        let mut decoders = self.inner.decoders.write();
        Arc::make_mut(&mut *decoders).register(name, decoder);
    }

    /// Register a message type for the `typed` decoder
    pub fn register_message_type<F>(&self, type_id: u32, name: &str, decoder: F)
    where
        F: Fn(&bytes::Bytes) -> Option<Message> + Send + Sync + 'static,
    {
        let mut decoders = self.inner.decoders.write();
        Arc::make_mut(&mut *decoders).register_message_type(type_id, name, decoder);
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn state(&self) -> ConnectionState {
        self.inner.conn.lock().state.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.conn.lock().state.is_open()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.conn.lock().attempts
    }

    pub fn url(&self) -> &str {
        &self.inner.config.url
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Subscribe to the client's event stream
    pub fn events(&self) -> broadcast::Receiver<ClientEvent> {
        self.inner.events.subscribe()
    }

    /// Timers currently running
    pub fn active_timers(&self) -> Vec<TimerKey> {
        self.inner.timers.active_keys()
    }
}

impl<T: Transport> Inner<T> {
    fn set_state(&self, conn: &mut Conn<T::Sender>, state: ConnectionState) {
        if conn.state != state {
            debug!("State {} -> {}", conn.state, state);
            conn.state = state.clone();
            self.events.emit(ClientEvent::StateChanged(state));
        }
    }

    /// Hand a frame to the writer task
    fn enqueue(&self, conn: &Conn<T::Sender>, frame: Frame) -> bool {
        match &conn.link {
            Some(link) => link.outbound.send(Outgoing::Frame(frame)).is_ok(),
            None => false,
        }
    }

    fn send_control(&self, conn: &Conn<T::Sender>, control: Control) {
        if !self.enqueue(conn, control.to_frame()) {
            debug!("Dropped control message {:?}", control);
        }
    }

    fn stop_task_timers(&self) {
        self.timers
            .cancel_where(|key| matches!(key, TimerKey::Task(_)));
    }

    /// Establish a new physical connection and wait for it to open
    async fn open(self: &Arc<Self>) -> Result<()> {
        let generation = {
            let mut conn = self.conn.lock();
            conn.generation += 1;
            conn.link = None;
            self.set_state(&mut conn, ConnectionState::Connecting);
            conn.generation
        };

        let url = self.config.url.as_str();
        info!("Connecting to {}", url);
        self.events.info(format!("Connecting to {}", url));

        let (sender, receiver) = match self.transport.connect(url).await {
            Ok(pair) => pair,
            Err(e) => {
                error!("Failed to connect to {}: {}", url, e);
                self.events.error(format!("Failed to connect: {}", e));
                self.on_closed(generation, CLOSE_ABNORMAL, &e.to_string());
                return Err(e.into());
            }
        };

        let sender = Arc::new(sender);
        let (opened_tx, opened_rx) = oneshot::channel();
        let attached = {
            let mut conn = self.conn.lock();
            if conn.generation == generation {
                let (outbound, outbound_rx) = mpsc::unbounded_channel();
                tokio::spawn(write_loop(sender.clone(), outbound_rx));
                let reader = tokio::spawn(read_loop(
                    Arc::downgrade(self),
                    generation,
                    receiver,
                    opened_tx,
                ));
                conn.link = Some(Link {
                    sender: sender.clone(),
                    outbound,
                    reader,
                });
                true
            } else {
                false
            }
        };

        if !attached {
            debug!("Connection to {} superseded before it opened", url);
            let _ = sender.close(CLOSE_NORMAL, "superseded").await;
            return Err(ClientError::Cancelled);
        }

        opened_rx.await.unwrap_or(Err(ClientError::Cancelled))
    }

    /// Shared body of `disconnect()` and `reset()`
    fn shutdown(&self) {
        let mut conn = self.conn.lock();
        conn.auto_reconnect = false;
        conn.generation += 1;
        self.timers.cancel_all();

        if let Some(link) = conn.link.take() {
            self.set_state(&mut conn, ConnectionState::Closing);
            let _ = link.outbound.send(Outgoing::Close {
                code: CLOSE_NORMAL,
                reason: "normal closure".to_string(),
            });
        }

        if conn.state != ConnectionState::Idle {
            self.set_state(&mut conn, ConnectionState::Idle);
            info!("Disconnected from {}", self.config.url);
            self.events.info("Disconnected");
        }
    }

    fn on_opened(self: &Arc<Self>, generation: u64) -> bool {
        let mut conn = self.conn.lock();
        if conn.generation != generation {
            return false;
        }

        conn.attempts = 0;
        conn.last_message_at = Instant::now();
        conn.last_server_ping_at = None;
        self.set_state(&mut conn, ConnectionState::Open);
        info!("Connected to {}", self.config.url);
        self.events
            .success(format!("Connected to {}", self.config.url));

        self.start_heartbeat();
        self.start_liveness();

        {
            let tasks = self.tasks.lock();
            for task in tasks.enabled() {
                self.start_task_timer(&conn, task);
            }
        }

        let topics = self.router.lock().topics();
        for topic in topics {
            debug!("Subscribing to '{}'", topic);
            self.send_control(&conn, Control::subscribe(topic));
        }
        true
    }

    fn on_frame(&self, generation: u64, frame: Frame) {
        {
            let mut conn = self.conn.lock();
            if conn.generation != generation || !conn.state.is_open() {
                debug!("Ignoring frame while {}", conn.state);
                return;
            }
            conn.last_message_at = Instant::now();
        }

        let Some(message) = self.decode(frame) else {
            warn!("Dropped undecodable frame (decoder '{}')", self.config.decoder);
            self.events.error(format!(
                "Could not decode frame with '{}'",
                self.config.decoder
            ));
            return;
        };

        if let Some(ping) = message.ping() {
            let mut conn = self.conn.lock();
            conn.last_server_ping_at = Some(Instant::now());
            debug!("Answering server ping {}", ping);
            self.send_control(&conn, Control::pong(ping.clone()));
            return;
        }

        self.events.emit(ClientEvent::Received(message.clone()));

        let callbacks = self.router.lock().route(&message);
        for reason in router::invoke(&callbacks, &message) {
            error!("Message callback panicked: {}", reason);
            self.events
                .error(format!("Message callback panicked: {}", reason));
        }
    }

    fn decode(&self, frame: Frame) -> Option<Message> {
        match frame {
            Frame::Text(text) => Some(decode_text_frame(&text)),
            Frame::Binary(data) => match self.config.binary_mode {
                BinaryMode::Compressed => Some(decode_compressed(&data, self.inflater.as_ref())),
                BinaryMode::Raw => {
                    let decoders = self.decoders.read().clone();
                    decoders.decode_with(&data, &self.config.decoder)
                }
            },
        }
    }

    fn on_error(&self, generation: u64, message: &str) {
        if self.conn.lock().generation != generation {
            return;
        }
        error!("Transport error: {}", message);
        self.events.error(format!("Connection error: {}", message));
    }

    fn on_closed(self: &Arc<Self>, generation: u64, code: u16, reason: &str) {
        let mut conn = self.conn.lock();
        if conn.generation != generation {
            debug!("Ignoring close ({}) from a stale connection", code);
            return;
        }

        conn.link = None;
        self.timers
            .cancel_where(|key| !matches!(key, TimerKey::Reconnect));
        self.set_state(
            &mut conn,
            ConnectionState::Closed {
                code,
                reason: reason.to_string(),
            },
        );

        if code == CLOSE_NORMAL {
            info!("Connection closed normally");
            self.events.info("Connection closed");
            return;
        }

        warn!("Connection closed abnormally: {} {}", code, reason);
        self.events
            .error(format!("Connection closed ({}): {}", code, reason));

        if conn.auto_reconnect {
            self.schedule_reconnect(&mut conn);
        }
    }

    fn schedule_reconnect(self: &Arc<Self>, conn: &mut Conn<T::Sender>) {
        let policy = self.config.reconnect_policy();
        if policy.exhausted(conn.attempts) {
            warn!("Giving up after {} reconnect attempts", conn.attempts);
            self.set_state(conn, ConnectionState::GaveUp);
            self.events.emit(ClientEvent::GaveUp {
                attempts: conn.attempts,
            });
            self.events
                .error("Max reconnect attempts reached; call connect() to try again");
            return;
        }

        conn.attempts += 1;
        let attempt = conn.attempts;
        let delay = policy.delay_for_attempt(attempt);
        let generation = conn.generation;

        self.set_state(conn, ConnectionState::Reconnecting { attempt });
        self.events.emit(ClientEvent::Reconnecting {
            attempt,
            max: policy.max_attempts,
        });
        info!(
            "Reconnecting in {:?} (attempt {}/{})",
            delay, attempt, policy.max_attempts
        );

        let weak = Arc::downgrade(self);
        self.timers.once(TimerKey::Reconnect, delay, move || async move {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            {
                let conn = inner.conn.lock();
                if conn.generation != generation || !conn.auto_reconnect {
                    debug!("Reconnect attempt {} no longer wanted", attempt);
                    return;
                }
            }
            if let Err(e) = inner.open().await {
                debug!("Reconnect attempt {} failed: {}", attempt, e);
            }
        });
    }

    fn start_heartbeat(self: &Arc<Self>) {
        let Some(period) = self.config.heartbeat_interval() else {
            return;
        };
        let weak = Arc::downgrade(self);
        self.timers.every(TimerKey::Heartbeat, period, move || {
            let Some(inner) = weak.upgrade() else {
                return ControlFlow::Break(());
            };
            let conn = inner.conn.lock();
            if !conn.state.is_open() {
                return ControlFlow::Break(());
            }
            inner.send_control(&conn, Control::heartbeat());
            ControlFlow::Continue(())
        });
    }

    fn start_liveness(self: &Arc<Self>) {
        let period = self.config.liveness_interval();
        let weak = Arc::downgrade(self);
        self.timers.every(TimerKey::Liveness, period, move || {
            match weak.upgrade() {
                Some(inner) => inner.check_liveness(period),
                None => ControlFlow::Break(()),
            }
        });
    }

    fn check_liveness(self: &Arc<Self>, period: Duration) -> ControlFlow<()> {
        let conn = self.conn.lock();
        if !conn.state.is_open() {
            return ControlFlow::Break(());
        }

        let socket_open = conn
            .link
            .as_ref()
            .is_some_and(|link| link.sender.is_connected());
        if !socket_open {
            warn!("Liveness check failed: socket is no longer open");
            let generation = conn.generation;
            drop(conn);
            self.on_closed(generation, CLOSE_ABNORMAL, "liveness check failed");
            return ControlFlow::Break(());
        }

        let now = Instant::now();
        let quiet = now.duration_since(conn.last_message_at) > time::scale(period, 1.5);
        let no_recent_ping = conn
            .last_server_ping_at
            .map_or(true, |at| now.duration_since(at) > period * 2);
        if quiet && no_recent_ping {
            debug!("No traffic for {:?}; sending heartbeat", now.duration_since(conn.last_message_at));
            self.send_control(&conn, Control::heartbeat());
        }
        ControlFlow::Continue(())
    }

    /// Start a task's timer if it is enabled and the connection is open
    fn start_task_timer(self: &Arc<Self>, conn: &Conn<T::Sender>, task: &ScheduledTask) -> bool {
        if !task.enabled || !conn.state.is_open() {
            return false;
        }

        let id = task.id;
        let weak = Arc::downgrade(self);
        self.timers.every(TimerKey::Task(id), task.interval, move || {
            match weak.upgrade() {
                Some(inner) => inner.run_task(id),
                None => ControlFlow::Break(()),
            }
        });
        debug!("Started {} every {:?}", id, task.interval);
        true
    }

    fn run_task(&self, id: TaskId) -> ControlFlow<()> {
        let conn = self.conn.lock();
        if !conn.state.is_open() {
            debug!("Stopping {}: connection lost", id);
            return ControlFlow::Break(());
        }

        let frame = match self.tasks.lock().get(id) {
            Some(task) if task.enabled => task.message.to_frame(),
            _ => return ControlFlow::Break(()),
        };
        if self.enqueue(&conn, frame.clone()) {
            self.events.emit(ClientEvent::Sent(frame));
        }
        ControlFlow::Continue(())
    }
}

async fn write_loop<S: TransportSender>(sender: Arc<S>, mut rx: mpsc::UnboundedReceiver<Outgoing>) {
    while let Some(outgoing) = rx.recv().await {
        match outgoing {
            Outgoing::Frame(frame) => {
                if let Err(e) = sender.send(frame).await {
                    warn!("Send failed: {}", e);
                }
            }
            Outgoing::Close { code, reason } => {
                if let Err(e) = sender.close(code, &reason).await {
                    debug!("Close failed: {}", e);
                }
                break;
            }
        }
    }
}

async fn read_loop<T: Transport>(
    weak: Weak<Inner<T>>,
    generation: u64,
    mut receiver: T::Receiver,
    opened: oneshot::Sender<Result<()>>,
) {
    let mut opened = Some(opened);

    while let Some(event) = receiver.recv().await {
        let Some(inner) = weak.upgrade() else {
            return;
        };

        match event {
            TransportEvent::Opened => {
                let current = inner.on_opened(generation);
                if let Some(tx) = opened.take() {
                    let _ = tx.send(if current {
                        Ok(())
                    } else {
                        Err(ClientError::Cancelled)
                    });
                }
            }
            TransportEvent::Frame(frame) => inner.on_frame(generation, frame),
            TransportEvent::Error(message) => {
                inner.on_error(generation, &message);
                // Before open an error ends the attempt
                if let Some(tx) = opened.take() {
                    let _ = tx.send(Err(ClientError::ConnectionFailed(message.clone())));
                    inner.on_closed(generation, CLOSE_ABNORMAL, &message);
                    return;
                }
            }
            TransportEvent::Closed { code, reason } => {
                if let Some(tx) = opened.take() {
                    let _ = tx.send(Err(ClientError::ConnectionFailed(format!(
                        "closed before open ({}): {}",
                        code, reason
                    ))));
                }
                inner.on_closed(generation, code, &reason);
                return;
            }
        }
    }

    if let Some(inner) = weak.upgrade() {
        inner.on_closed(generation, CLOSE_ABNORMAL, "event stream ended");
    }
}
