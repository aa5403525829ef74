//! Pages and the registry of discovered elements.

use std::collections::{BTreeMap, HashMap};

use crate::types::element::Element;

/// One screen of the panel and the elements discovered on it.
#[derive(Debug, Clone)]
pub struct Page {
    id: u8,
    elements: HashMap<String, Element>,
    index: HashMap<u32, String>,
    discovered: bool,
    discovering: bool,
}

impl Page {
    /// Creates an empty page.
    #[must_use]
    pub fn new(id: u8) -> Self {
        Self {
            id,
            elements: HashMap::new(),
            index: HashMap::new(),
            discovered: false,
            discovering: false,
        }
    }

    /// Page number.
    #[must_use]
    pub const fn id(&self) -> u8 {
        self.id
    }

    /// Returns the element with the given short-name.
    #[must_use]
    pub fn element(&self, short: &str) -> Option<&Element> {
        self.elements.get(short)
    }

    /// Returns the element with the given short-name mutably.
    pub fn element_mut(&mut self, short: &str) -> Option<&mut Element> {
        self.elements.get_mut(short)
    }

    /// Returns true if an element with this short-name exists.
    #[must_use]
    pub fn contains(&self, short: &str) -> bool {
        self.elements.contains_key(short)
    }

    /// Looks up the short-name for a panel-assigned component ID.
    #[must_use]
    pub fn short_for_id(&self, id: u32) -> Option<&str> {
        self.index.get(&id).map(String::as_str)
    }

    /// Iterates over all elements.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.elements.values()
    }

    /// Number of elements on the page.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Returns true if no elements have been discovered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Returns true once discovery of every family has finished.
    #[must_use]
    pub const fn is_discovered(&self) -> bool {
        self.discovered
    }

    pub(crate) fn mark_discovered(&mut self) {
        self.discovered = true;
    }

    /// Returns true while a discovery run is probing this page.
    #[must_use]
    pub const fn is_discovering(&self) -> bool {
        self.discovering
    }

    pub(crate) fn set_discovering(&mut self, discovering: bool) {
        self.discovering = discovering;
    }

    fn insert(&mut self, element: Element) {
        self.elements.insert(element.short().to_owned(), element);
    }

    fn index_id(&mut self, short: &str, id: u32) -> bool {
        let Some(element) = self.elements.get_mut(short) else {
            return false;
        };
        element.set_id(id);
        self.index.insert(id, short.to_owned());
        true
    }
}

/// The panel's discovered topology.
#[derive(Debug, Default)]
pub struct Registry {
    pages: BTreeMap<u8, Page>,
    entities: HashMap<String, (u8, String)>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a page.
    #[must_use]
    pub fn page(&self, id: u8) -> Option<&Page> {
        self.pages.get(&id)
    }

    /// Returns a page mutably.
    pub fn page_mut(&mut self, id: u8) -> Option<&mut Page> {
        self.pages.get_mut(&id)
    }

    /// Creates a page unless it exists. Returns true if it was created.
    pub fn create_page(&mut self, id: u8) -> bool {
        if self.pages.contains_key(&id) {
            return false;
        }
        self.pages.insert(id, Page::new(id));
        true
    }

    /// Iterates over all pages in page order.
    pub fn pages(&self) -> impl Iterator<Item = &Page> {
        self.pages.values()
    }

    /// Inserts an element, creating its page if needed.
    ///
    /// Returns false, leaving the registry unchanged, if the short-name is
    /// already registered on that page.
    pub fn insert(&mut self, element: Element) -> bool {
        let page = self
            .pages
            .entry(element.page())
            .or_insert_with(|| Page::new(element.page()));
        if page.contains(element.short()) {
            return false;
        }
        self.entities.insert(
            element.entity().unique_id.clone(),
            (element.page(), element.short().to_owned()),
        );
        page.insert(element);
        true
    }

    /// Records the panel-assigned ID of an element.
    ///
    /// Returns false if the element is unknown.
    pub fn index_id(&mut self, page: u8, short: &str, id: u32) -> bool {
        self.pages
            .get_mut(&page)
            .is_some_and(|p| p.index_id(short, id))
    }

    /// Returns an element mutably.
    pub fn element_mut(&mut self, page: u8, short: &str) -> Option<&mut Element> {
        self.pages.get_mut(&page)?.element_mut(short)
    }

    /// Resolves a bus entity ID to its element mutably.
    pub fn element_for_entity(&mut self, entity_id: &str) -> Option<&mut Element> {
        let (page, short) = self.entities.get(entity_id)?;
        self.pages.get_mut(page)?.element_mut(short)
    }

    /// Total number of elements across all pages.
    #[must_use]
    pub fn element_count(&self) -> usize {
        self.pages.values().map(Page::len).sum()
    }
}
