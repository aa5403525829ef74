//! The bridge controller.
//!
//! [`Controller`] wires the transport, the opcode table, the query slot and
//! the element registry together. Frames from the panel are routed to the
//! handlers registered in [`Controller::with_stream`]; commands from the bus
//! arrive on an mpsc channel and are applied to the matching element.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;

use crate::bus::{BusAdapter, BusCommand};
use crate::commands::{CommandHandler, DEFAULT_TIMEOUT, Reply};
use crate::discovery::Discovery;
use crate::dispatcher::OpcodeDispatcher;
use crate::error::Result;
use crate::event::{Event, EventDispatcher, Subscription};
use crate::protocol::{
    ReturnCode, is_startup_preamble, parse_current_page, parse_numeric_data, parse_string_data,
    parse_touch_coordinate, parse_touch_event,
};
use crate::transport::{DEFAULT_SEND_QUEUE, SerialConfig, Transport, open_port};
use crate::types::{Element, Registry};

/// Default capacity of the event broadcast channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Capacity of the channel between the read loop and the router.
const FRAME_QUEUE: usize = 64;

/// Configuration for a [`Controller`].
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Serial link settings.
    pub serial: SerialConfig,
    /// How long a query waits for its reply. `None` waits indefinitely.
    pub query_timeout: Option<Duration>,
    /// Capacity of the outgoing frame queue.
    pub send_queue_capacity: usize,
    /// Send `sendme` once the link is up.
    pub request_page_on_start: bool,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
}

impl BridgeConfig {
    /// Creates a configuration with default settings.
    #[must_use]
    pub const fn new(serial: SerialConfig) -> Self {
        Self {
            serial,
            query_timeout: Some(DEFAULT_TIMEOUT),
            send_queue_capacity: DEFAULT_SEND_QUEUE,
            request_page_on_start: true,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Sets the query timeout.
    #[must_use]
    pub const fn query_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Sets the outgoing queue capacity.
    #[must_use]
    pub const fn send_queue_capacity(mut self, capacity: usize) -> Self {
        self.send_queue_capacity = capacity;
        self
    }

    /// Enables or disables the `sendme` request on start.
    #[must_use]
    pub const fn request_page_on_start(mut self, enabled: bool) -> Self {
        self.request_page_on_start = enabled;
        self
    }

    /// Sets the event channel capacity. Zero is raised to one.
    #[must_use]
    pub const fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::new(SerialConfig::default())
    }
}

/// State shared by the frame handlers and the bus command task.
struct Shared {
    commands: Arc<CommandHandler>,
    registry: Arc<RwLock<Registry>>,
    current_page: AtomicU8,
    bus: Arc<dyn BusAdapter>,
    events: EventDispatcher,
    discovery: Discovery,
}

impl Shared {
    /// `0x00`: either the startup preamble or an invalid instruction.
    async fn on_invalid_instruction(self: Arc<Self>, payload: Bytes) {
        if is_startup_preamble(&payload) {
            tracing::info!("panel started");
            self.events.dispatch(Event::Startup);
        } else {
            self.on_failure(ReturnCode::InvalidInstruction).await;
        }
    }

    async fn on_failure(&self, code: ReturnCode) {
        tracing::warn!("panel reported failure: {}", code.description());
        self.commands.fail(code).await;
        self.events.dispatch(Event::Failure(code));
    }

    async fn on_touch(self: Arc<Self>, payload: Bytes) {
        let touch = match parse_touch_event(&payload) {
            Ok(touch) => touch,
            Err(e) => {
                tracing::warn!("bad touch event: {}", e);
                return;
            }
        };
        tracing::debug!(
            "touch page {} component {} press {}",
            touch.page,
            touch.component,
            touch.press
        );
        self.events.dispatch(Event::Touch(touch));

        let mut registry = self.registry.write().await;
        let Some(page) = registry.page_mut(touch.page) else {
            tracing::warn!("touch on unknown page {}", touch.page);
            return;
        };
        let Some(short) = page.short_for_id(u32::from(touch.component)).map(str::to_owned) else {
            tracing::warn!(
                "touch on unknown component {} of page {}",
                touch.component,
                touch.page
            );
            return;
        };
        let Some(element) = page.element_mut(&short) else {
            tracing::warn!("no element {} on page {}", short, touch.page);
            return;
        };

        if element.touch(touch.press, self.bus.as_ref()) && element.kind().is_boolean() {
            self.events.dispatch(Event::StateChanged {
                page: touch.page,
                short,
                state: element.state().to_owned(),
            });
        }
    }

    async fn on_current_page(self: Arc<Self>, payload: Bytes) {
        let page = match parse_current_page(&payload) {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!("bad page report: {}", e);
                return;
            }
        };
        self.current_page.store(page, Ordering::SeqCst);
        tracing::info!("panel shows page {}", page);
        self.events.dispatch(Event::PageChanged { page });

        let known = self
            .registry
            .read()
            .await
            .page(page)
            .is_some_and(|p| p.is_discovered() || p.is_discovering());
        if known {
            self.resync(page).await;
        } else {
            self.discovery.discover_page(page).await;
        }
    }

    /// Re-sends the cached state of every seeded element on `page`.
    async fn resync(&self, page: u8) {
        let writes: Vec<_> = match self.registry.read().await.page(page) {
            Some(p) => p
                .elements()
                .filter(|e| !e.state().is_empty())
                .map(Element::panel_command)
                .collect(),
            None => return,
        };

        tracing::debug!("resyncing {} elements on page {}", writes.len(), page);
        for write in &writes {
            if let Err(e) = self.commands.send(write).await {
                tracing::warn!("resync of page {} stopped: {}", page, e);
                return;
            }
        }
    }

    async fn on_string_data(self: Arc<Self>, payload: Bytes) {
        self.commands
            .resolve(Reply::Text(parse_string_data(&payload)))
            .await;
    }

    async fn on_numeric_data(self: Arc<Self>, payload: Bytes) {
        match parse_numeric_data(&payload) {
            Ok(value) => {
                self.commands.resolve(Reply::Number(value)).await;
            }
            Err(e) => tracing::warn!("bad numeric data: {}", e),
        }
    }

    fn on_touch_coordinate(&self, code: ReturnCode, payload: &[u8]) {
        match parse_touch_coordinate(code, payload) {
            Ok(coord) => self.events.dispatch(Event::TouchCoordinate(coord)),
            Err(e) => tracing::warn!("bad touch coordinate: {}", e),
        }
    }

    /// Applies one bus command and writes it to the panel if its page is shown.
    async fn apply_bus_command(&self, command: BusCommand) -> Result<()> {
        let (page, write) = {
            let mut registry = self.registry.write().await;
            let Some(element) = registry.element_for_entity(&command.entity_id) else {
                tracing::warn!("command for unknown entity {}", command.entity_id);
                return Ok(());
            };
            (element.page(), element.set_state_from_bus(&command.payload))
        };

        let Some(write) = write else {
            return Ok(());
        };
        if page != self.current_page.load(Ordering::SeqCst) {
            tracing::debug!("page {} not shown, deferring {}", page, write);
            return Ok(());
        }
        self.commands.send(&write).await
    }
}

/// Registers `handler` for `code` with a handle to the shared state.
fn route<F, Fut>(
    dispatcher: &mut OpcodeDispatcher,
    shared: &Arc<Shared>,
    code: ReturnCode,
    handler: F,
) -> Result<()>
where
    F: Fn(Arc<Shared>, Bytes) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let shared = Arc::clone(shared);
    dispatcher.register(code, move |payload| handler(Arc::clone(&shared), payload))
}

/// Builds the opcode table.
fn build_dispatcher(shared: &Arc<Shared>) -> Result<OpcodeDispatcher> {
    let mut dispatcher = OpcodeDispatcher::new();

    route(
        &mut dispatcher,
        shared,
        ReturnCode::InvalidInstruction,
        Shared::on_invalid_instruction,
    )?;
    for code in ReturnCode::ALL
        .into_iter()
        .filter(|c| c.is_failure() && *c != ReturnCode::InvalidInstruction)
    {
        route(&mut dispatcher, shared, code, move |s, _| async move {
            s.on_failure(code).await;
        })?;
    }

    route(&mut dispatcher, shared, ReturnCode::InstructionSuccessful, |s, _| async move {
        tracing::debug!("instruction successful");
        s.events.dispatch(Event::InstructionOk);
    })?;
    route(&mut dispatcher, shared, ReturnCode::SerialBufferOverflow, |s, _| async move {
        tracing::warn!("panel serial buffer overflow");
        s.events.dispatch(Event::BufferOverflow);
    })?;

    route(&mut dispatcher, shared, ReturnCode::TouchEvent, Shared::on_touch)?;
    route(&mut dispatcher, shared, ReturnCode::CurrentPage, Shared::on_current_page)?;
    for code in [ReturnCode::TouchCoordinateAwake, ReturnCode::TouchCoordinateSleep] {
        route(&mut dispatcher, shared, code, move |s, payload| async move {
            s.on_touch_coordinate(code, &payload);
        })?;
    }
    route(&mut dispatcher, shared, ReturnCode::StringData, Shared::on_string_data)?;
    route(&mut dispatcher, shared, ReturnCode::NumericData, Shared::on_numeric_data)?;

    let notifications = [
        (ReturnCode::AutoSleep, Event::AutoSleep),
        (ReturnCode::AutoWake, Event::AutoWake),
        (ReturnCode::Ready, Event::Ready),
        (ReturnCode::StartSdUpgrade, Event::SdUpgradeStarted),
        (ReturnCode::TransparentDataFinished, Event::TransparentDataFinished),
        (ReturnCode::TransparentDataReady, Event::TransparentDataReady),
    ];
    for (code, event) in notifications {
        route(&mut dispatcher, shared, code, move |s, _| {
            let event = event.clone();
            async move {
                tracing::info!("panel: {}", code.description());
                s.events.dispatch(event);
            }
        })?;
    }

    Ok(dispatcher)
}

/// A running bridge between one panel and the bus.
pub struct Controller {
    shared: Arc<Shared>,
    transport: Transport,
    route_task: Option<JoinHandle<()>>,
    bus_task: Option<JoinHandle<()>>,
}

impl Controller {
    /// Opens the serial port and starts the bridge.
    ///
    /// # Errors
    ///
    /// Returns an error if the port cannot be opened or the start request
    /// cannot be queued.
    pub async fn open(
        config: &BridgeConfig,
        bus: Arc<dyn BusAdapter>,
        bus_commands: mpsc::Receiver<BusCommand>,
    ) -> Result<Self> {
        let stream = open_port(&config.serial)?;
        Self::with_stream(stream, config, bus, bus_commands).await
    }

    /// Starts the bridge over an already open link.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn with_stream<S>(
        stream: S,
        config: &BridgeConfig,
        bus: Arc<dyn BusAdapter>,
        bus_commands: mpsc::Receiver<BusCommand>,
    ) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (frame_tx, mut frame_rx) = mpsc::channel::<Bytes>(FRAME_QUEUE);
        let transport = Transport::spawn(stream, frame_tx, config.send_queue_capacity);

        let mut commands = CommandHandler::new(transport.sender());
        commands.set_timeout(config.query_timeout);
        let commands = Arc::new(commands);

        let registry = Arc::new(RwLock::new(Registry::new()));
        let events = EventDispatcher::new(config.event_capacity);
        let discovery = Discovery::new(
            Arc::clone(&commands),
            Arc::clone(&registry),
            Arc::clone(&bus),
            events.clone(),
        );
        let shared = Arc::new(Shared {
            commands,
            registry,
            current_page: AtomicU8::new(0),
            bus,
            events,
            discovery,
        });

        let dispatcher = build_dispatcher(&shared)?;
        let route_task = tokio::spawn(async move {
            while let Some(frame) = frame_rx.recv().await {
                dispatcher.dispatch(frame);
            }
            tracing::debug!("frame router stopped");
        });

        let bus_task = tokio::spawn({
            let shared = Arc::clone(&shared);
            let mut bus_commands = bus_commands;
            async move {
                while let Some(command) = bus_commands.recv().await {
                    tracing::debug!("bus command {:?} for {}", command.payload, command.entity_id);
                    if let Err(e) = shared.apply_bus_command(command).await {
                        tracing::warn!("failed to apply bus command: {}", e);
                    }
                }
                tracing::debug!("bus command channel closed");
            }
        });

        let controller = Self {
            shared,
            transport,
            route_task: Some(route_task),
            bus_task: Some(bus_task),
        };

        if config.request_page_on_start {
            controller.shared.commands.send_me().await?;
        }
        tracing::info!("bridge started");

        Ok(controller)
    }

    /// Subscribes to panel and discovery events.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        self.shared.events.subscribe()
    }

    /// Returns the event dispatcher.
    #[must_use]
    pub fn events(&self) -> &EventDispatcher {
        &self.shared.events
    }

    /// Returns the command handler for direct panel access.
    #[must_use]
    pub fn commands(&self) -> &CommandHandler {
        &self.shared.commands
    }

    /// Returns the element registry.
    #[must_use]
    pub fn registry(&self) -> Arc<RwLock<Registry>> {
        Arc::clone(&self.shared.registry)
    }

    /// Page the panel last reported.
    #[must_use]
    pub fn current_page(&self) -> u8 {
        self.shared.current_page.load(Ordering::SeqCst)
    }

    /// Runs discovery for `page` again, probing only unknown elements.
    pub async fn discover_page(&self, page: u8) -> usize {
        self.shared.discovery.discover_page(page).await
    }

    /// Waits until the panel link fails or is closed.
    ///
    /// # Errors
    ///
    /// Returns the link error that stopped the transport.
    pub async fn closed(&mut self) -> Result<()> {
        let result = self.transport.closed().await;
        self.shutdown();
        result
    }

    /// Stops all background tasks and closes the link.
    pub fn shutdown(&mut self) {
        if let Some(task) = self.route_task.take() {
            task.abort();
        }
        if let Some(task) = self.bus_task.take() {
            task.abort();
        }
        self.transport.close();
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.shutdown();
    }
}
