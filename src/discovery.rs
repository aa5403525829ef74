//! Element discovery.
//!
//! The panel cannot list its components, so the bridge probes them. For each
//! family (`b`, `bt`, `s`, `t`) it asks for `<prefix>0.txt`, `<prefix>1.txt`,
//! and so on until the panel answers a probe with a failure code. Every hit
//! becomes an [`Element`] with its bus entity, ID and seeded state.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::bus::BusAdapter;
use crate::commands::CommandHandler;
use crate::error::Result;
use crate::event::{Event, EventDispatcher};
use crate::types::{Element, ElementKind, Registry};

/// Highest index probed in one family.
pub const MAX_FAMILY_INDEX: u32 = 255;

/// Probes pages for elements and records them.
#[derive(Clone)]
pub struct Discovery {
    commands: Arc<CommandHandler>,
    registry: Arc<RwLock<Registry>>,
    bus: Arc<dyn BusAdapter>,
    events: EventDispatcher,
}

impl Discovery {
    /// Creates a discovery driver over shared bridge state.
    #[must_use]
    pub fn new(
        commands: Arc<CommandHandler>,
        registry: Arc<RwLock<Registry>>,
        bus: Arc<dyn BusAdapter>,
        events: EventDispatcher,
    ) -> Self {
        Self {
            commands,
            registry,
            bus,
            events,
        }
    }

    /// Discovers all four families of `page` concurrently.
    ///
    /// The page is marked discovered only if every family ran to its end.
    /// A family cut short by a link error or timeout leaves it undiscovered,
    /// so the next page report probes again. Returns the element count.
    pub async fn discover_page(&self, page: u8) -> usize {
        {
            let mut registry = self.registry.write().await;
            registry.create_page(page);
            if let Some(p) = registry.page_mut(page) {
                if p.is_discovering() {
                    tracing::debug!("discovery of page {} already running", page);
                    return p.len();
                }
                p.set_discovering(true);
            }
        }
        tracing::info!("discovering page {}", page);

        let (buttons, dual_state, switches, texts) = tokio::join!(
            self.run_family(page, ElementKind::Button),
            self.run_family(page, ElementKind::DualStateButton),
            self.run_family(page, ElementKind::Switch),
            self.run_family(page, ElementKind::Text),
        );
        let found = buttons.0 + dual_state.0 + switches.0 + texts.0;
        let complete = buttons.1 && dual_state.1 && switches.1 && texts.1;

        let elements = {
            let mut registry = self.registry.write().await;
            match registry.page_mut(page) {
                Some(p) => {
                    p.set_discovering(false);
                    if complete {
                        p.mark_discovered();
                    }
                    p.len()
                }
                None => 0,
            }
        };

        if !complete {
            tracing::warn!(
                "page {} discovery interrupted with {} elements, will retry on next page report",
                page,
                elements
            );
            return elements;
        }

        tracing::info!(
            "page {} discovered: {} new, {} total elements",
            page,
            found,
            elements
        );
        self.events
            .dispatch(Event::PageDiscovered { page, elements });
        elements
    }

    /// Probes one family until the panel fails a probe.
    ///
    /// Returns the number of elements added.
    pub async fn discover_family(&self, page: u8, kind: ElementKind) -> usize {
        self.run_family(page, kind).await.0
    }

    /// Returns the number of elements added and whether the family ended
    /// on a panel answer rather than an error.
    async fn run_family(&self, page: u8, kind: ElementKind) -> (usize, bool) {
        let mut found = 0;

        for index in 0..=MAX_FAMILY_INDEX {
            let short = format!("{}{index}", kind.prefix());

            let known = self
                .registry
                .read()
                .await
                .page(page)
                .is_some_and(|p| p.contains(&short));
            if known {
                tracing::debug!("{} on page {} already registered", short, page);
                continue;
            }

            match self.probe(page, kind, &short).await {
                Ok(true) => found += 1,
                Ok(false) => {
                    tracing::debug!("{:?} family on page {} ends at {}", kind, page, short);
                    return (found, true);
                }
                Err(e) => {
                    tracing::warn!("discovery of {} on page {} stopped: {}", short, page, e);
                    return (found, false);
                }
            }
        }

        (found, true)
    }

    /// Probes a single element. Returns false if the panel does not know it.
    async fn probe(&self, page: u8, kind: ElementKind, short: &str) -> Result<bool> {
        let Some(label) = self.commands.get_text(short).await? else {
            return Ok(false);
        };

        let element = Element::new(kind, page, short, &label);
        {
            let mut registry = self.registry.write().await;
            let entity = element.entity().clone();
            if !registry.insert(element) {
                return Ok(true);
            }
            self.bus.register(&entity);
        }
        tracing::info!("found {:?} {} ({:?}) on page {}", kind, short, label, page);

        match self.commands.get_id(short).await? {
            Some(id) => {
                self.registry.write().await.index_id(page, short, id);
            }
            None => tracing::warn!("panel did not report the id of {}", short),
        }

        if kind.is_boolean() {
            match self.commands.get_value(short).await? {
                Some(value) => {
                    if let Some(element) = self.registry.write().await.element_mut(page, short) {
                        element.set_value_from_panel(value, self.bus.as_ref());
                    }
                }
                None => tracing::warn!("panel did not report the value of {}", short),
            }
        } else if let Some(element) = self.registry.write().await.element_mut(page, short) {
            element.set_state_from_panel(label, self.bus.as_ref());
        }

        self.events.dispatch(Event::ElementDiscovered {
            page,
            short: short.to_owned(),
            kind,
        });
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use bytes::Bytes;
    use tokio::sync::mpsc;

    use super::*;
    use crate::bus::MemoryBus;
    use crate::commands::Reply;
    use crate::protocol::ReturnCode;
    use crate::transport::FrameSender;

    /// Answers queries from a table; anything else fails like the panel does.
    /// Commands listed in `silent` get no answer at all.
    fn fake_panel(
        commands: Arc<CommandHandler>,
        mut sent: mpsc::Receiver<Bytes>,
        answers: HashMap<String, Reply>,
        silent: Vec<String>,
    ) -> mpsc::UnboundedReceiver<String> {
        let (log_tx, log_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(payload) = sent.recv().await {
                let command = String::from_utf8_lossy(&payload).into_owned();
                let _ = log_tx.send(command.clone());
                if silent.contains(&command) {
                    continue;
                }
                match answers.get(&command) {
                    Some(reply) => commands.resolve(reply.clone()).await,
                    None => commands.fail(ReturnCode::InvalidVariableName).await,
                };
            }
        });
        log_rx
    }

    fn setup(
        answers: HashMap<String, Reply>,
    ) -> (Discovery, Arc<MemoryBus>, mpsc::UnboundedReceiver<String>) {
        setup_with_silence(answers, &[])
    }

    fn setup_with_silence(
        answers: HashMap<String, Reply>,
        silent: &[&str],
    ) -> (Discovery, Arc<MemoryBus>, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::channel(10);
        let mut commands = CommandHandler::new(FrameSender::from_channel(tx));
        commands.set_timeout(Some(Duration::from_secs(1)));
        let commands = Arc::new(commands);
        let silent = silent.iter().map(|&c| c.to_owned()).collect();
        let log = fake_panel(Arc::clone(&commands), rx, answers, silent);
        let bus = Arc::new(MemoryBus::new());
        let discovery = Discovery::new(
            commands,
            Arc::new(RwLock::new(Registry::new())),
            Arc::clone(&bus) as Arc<dyn BusAdapter>,
            EventDispatcher::new(64),
        );
        (discovery, bus, log)
    }

    fn buttons(count: u32) -> HashMap<String, Reply> {
        let mut answers = HashMap::new();
        for n in 0..count {
            answers.insert(format!("get b{n}.txt"), Reply::Text(format!("Light {n}")));
            answers.insert(format!("get b{n}.id"), Reply::Number(n + 1));
            answers.insert(format!("get b{n}.val"), Reply::Number(0));
        }
        answers
    }

    #[tokio::test]
    async fn test_family_stops_at_first_failure() {
        let (discovery, bus, mut log) = setup(buttons(5));

        let elements = discovery.discover_page(0).await;
        assert_eq!(elements, 5);
        assert_eq!(bus.entities().len(), 5);

        let registry = discovery.registry.read().await;
        let page = registry.page(0).unwrap();
        assert!(page.is_discovered());
        assert_eq!(page.short_for_id(5), Some("b4"));
        assert!(!page.contains("b5"));
        assert_eq!(page.element("b2").unwrap().state(), "OFF");
        drop(registry);

        let mut probes = Vec::new();
        while let Ok(command) = log.try_recv() {
            probes.push(command);
        }
        assert!(probes.contains(&"get b5.txt".to_owned()));
        assert!(!probes.contains(&"get b6.txt".to_owned()));
    }

    #[tokio::test]
    async fn test_text_seeded_from_label() {
        let mut answers = HashMap::new();
        answers.insert("get t0.txt".to_owned(), Reply::Text("21.5".into()));
        answers.insert("get t0.id".to_owned(), Reply::Number(7));
        let (discovery, bus, _log) = setup(answers);

        discovery.discover_page(2).await;

        assert_eq!(bus.state("p2t0").as_deref(), Some("21.5"));
        let entities = bus.entities();
        assert_eq!(entities[0].name, "Text t0");
    }

    #[tokio::test]
    async fn test_registered_elements_skipped() {
        let (discovery, bus, mut log) = setup(buttons(3));
        discovery
            .registry
            .write()
            .await
            .insert(Element::new(ElementKind::Button, 0, "b1", "Known"));

        let found = discovery.discover_family(0, ElementKind::Button).await;
        assert_eq!(found, 2);
        assert_eq!(bus.entities().len(), 2);

        let mut probes = Vec::new();
        while let Ok(command) = log.try_recv() {
            probes.push(command);
        }
        assert!(!probes.contains(&"get b1.txt".to_owned()));
        assert!(probes.contains(&"get b2.txt".to_owned()));
    }

    #[tokio::test]
    async fn test_page_discovered_event() {
        let (discovery, _bus, _log) = setup(buttons(1));
        let mut events = discovery.events.subscribe();

        discovery.discover_page(4).await;

        let mut discovered = None;
        while let Some(event) = events.recv().await {
            if let Event::PageDiscovered { page, elements } = event {
                discovered = Some((page, elements));
                break;
            }
        }
        assert_eq!(discovered, Some((4, 1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_family_leaves_page_undiscovered() {
        let (discovery, bus, mut log) = setup_with_silence(buttons(3), &["get b1.txt"]);
        let mut events = discovery.events.subscribe();

        assert_eq!(discovery.discover_page(0).await, 1);
        {
            let registry = discovery.registry.read().await;
            let page = registry.page(0).unwrap();
            assert!(!page.is_discovered());
            assert!(!page.is_discovering());
            assert!(page.contains("b0"));
        }
        assert_eq!(bus.entities().len(), 1);

        // A second run probes from where the first one stopped.
        discovery.discover_page(0).await;

        let mut probes = Vec::new();
        while let Ok(command) = log.try_recv() {
            probes.push(command);
        }
        let count = |c: &str| probes.iter().filter(|p| *p == c).count();
        assert_eq!(count("get b0.txt"), 1);
        assert_eq!(count("get b1.txt"), 2);

        let discovered = tokio::time::timeout(Duration::from_millis(10), async {
            while let Some(event) = events.recv().await {
                if matches!(event, Event::PageDiscovered { .. }) {
                    return true;
                }
            }
            false
        })
        .await;
        assert!(!matches!(discovered, Ok(true)));
    }

    #[tokio::test]
    async fn test_concurrent_discovery_of_same_page_runs_once() {
        let (discovery, _bus, mut log) = setup(buttons(2));

        let (first, second) = tokio::join!(discovery.discover_page(1), discovery.discover_page(1));
        assert_eq!(first.max(second), 2);
        assert!(discovery.registry.read().await.page(1).unwrap().is_discovered());

        let mut probes = Vec::new();
        while let Ok(command) = log.try_recv() {
            probes.push(command);
        }
        assert_eq!(probes.iter().filter(|p| *p == "get b0.txt").count(), 1);
    }
}
