//! Named, connectionless routing.
//!
//! The [`NameRegistry`] holds every relation between units that is expressed
//! by name rather than by a connection:
//!
//! - stream links, where emitters write into a shared block-sized bus and
//!   collectors read it. The compiler orders every emitter of a link before
//!   its collectors.
//! - stores, named sample arrays declared by owners and reached by
//!   accessors. Delay line accessors are ordered after the line's owners.
//! - message receivers, which get every message sent to their name.
//! - external receivers, names whose messages are handed to the host.
//!
//! The registry refers to units by id only. Units stay owned by the graph.
//! A link or store lives while any unit is registered under its name and is
//! dropped with its last member; its index may then be handed to a new name.

use std::collections::{HashMap, HashSet};

use crate::message::{Symbol, symbol};
use crate::unit::{LinkFamily, Registration, StoreKind, UnitId};

/// Index of a stream link's bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LinkId(u32);

/// Index of a named store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StoreId(u32);

/// What a unit's registration resolved to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Handle {
    /// A stream link bus.
    Link(LinkId),
    /// A named store.
    Store(StoreId),
}

struct Link {
    emitters: Vec<UnitId>,
    collectors: Vec<UnitId>,
    bus: Box<[f32]>,
}

/// A named sample array shared by its owners and accessors.
///
/// Delay lines use `head` as the write position; tables leave it at zero.
#[derive(Debug, Default)]
pub struct Store {
    samples: Vec<f32>,
    head: usize,
    owners: Vec<UnitId>,
    accessors: Vec<UnitId>,
}

impl Store {
    /// Length in samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns true if no owner declared a length yet.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// The stored samples.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// The stored samples for writing.
    pub fn samples_mut(&mut self) -> &mut [f32] {
        &mut self.samples
    }

    /// Write position of a delay line.
    pub fn head(&self) -> usize {
        self.head
    }

    /// Moves the write position, wrapping at the store length.
    pub fn set_head(&mut self, head: usize) {
        self.head = if self.samples.is_empty() {
            0
        } else {
            head % self.samples.len()
        };
    }

    fn is_unused(&self) -> bool {
        self.owners.is_empty() && self.accessors.is_empty()
    }
}

/// Registry of named links, stores, message receivers, and external receivers.
pub struct NameRegistry {
    block_size: usize,
    links: Vec<Option<Link>>,
    free_links: Vec<u32>,
    link_index: HashMap<(LinkFamily, Symbol), LinkId>,
    stores: Vec<Option<Store>>,
    free_stores: Vec<u32>,
    store_index: HashMap<(StoreKind, Symbol), StoreId>,
    receivers: HashMap<Symbol, Vec<UnitId>>,
    external: HashSet<Symbol>,
}

impl NameRegistry {
    /// Creates an empty registry whose buses hold `block_size` samples.
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size,
            links: Vec::new(),
            free_links: Vec::new(),
            link_index: HashMap::new(),
            stores: Vec::new(),
            free_stores: Vec::new(),
            store_index: HashMap::new(),
            receivers: HashMap::new(),
            external: HashSet::new(),
        }
    }

    /// Records `unit` under `registration`. Returns the bus or store for
    /// stream roles.
    pub fn register(&mut self, unit: UnitId, registration: Registration) -> Option<Handle> {
        match registration {
            Registration::Emitter { family, name } => {
                let (id, link) = self.link_or_insert(family, name);
                link.emitters.push(unit);
                Some(Handle::Link(id))
            }
            Registration::Collector { family, name } => {
                let (id, link) = self.link_or_insert(family, name);
                link.collectors.push(unit);
                Some(Handle::Link(id))
            }
            Registration::Receiver { name } => {
                self.receivers.entry(name).or_default().push(unit);
                None
            }
            Registration::StoreOwner { kind, name, len } => {
                let (id, store) = self.store_or_insert(kind, name);
                store.owners.push(unit);
                if store.samples.len() < len {
                    store.samples.resize(len, 0.0);
                }
                Some(Handle::Store(id))
            }
            Registration::StoreAccess { kind, name } => {
                let (id, store) = self.store_or_insert(kind, name);
                store.accessors.push(unit);
                Some(Handle::Store(id))
            }
        }
    }

    /// Removes `unit` from the role it was registered under.
    pub fn unregister(&mut self, unit: UnitId, registration: Registration) {
        match registration {
            Registration::Emitter { family, name } => {
                self.leave_link(family, name, |link| link.emitters.retain(|&u| u != unit));
            }
            Registration::Collector { family, name } => {
                self.leave_link(family, name, |link| link.collectors.retain(|&u| u != unit));
            }
            Registration::Receiver { name } => {
                if let Some(list) = self.receivers.get_mut(name.as_str()) {
                    list.retain(|&u| u != unit);
                    if list.is_empty() {
                        self.receivers.remove(name.as_str());
                    }
                }
            }
            Registration::StoreOwner { kind, name, .. } => {
                self.leave_store(kind, name, |store| store.owners.retain(|&u| u != unit));
            }
            Registration::StoreAccess { kind, name } => {
                self.leave_store(kind, name, |store| store.accessors.retain(|&u| u != unit));
            }
        }
    }

    /// The link for `family` and `name`, if any unit is registered under it.
    pub fn link(&self, family: LinkFamily, name: &str) -> Option<LinkId> {
        self.link_index.get(&(family, symbol(name))).copied()
    }

    /// Emitters of a link in registration order.
    pub fn emitters(&self, link: LinkId) -> &[UnitId] {
        self.link_entry(link).map(|l| &*l.emitters).unwrap_or_default()
    }

    /// Collectors of a link in registration order.
    pub fn collectors(&self, link: LinkId) -> &[UnitId] {
        self.link_entry(link).map(|l| &*l.collectors).unwrap_or_default()
    }

    /// Number of live links.
    pub fn link_count(&self) -> usize {
        self.link_index.len()
    }

    /// Samples of a link's bus. Empty for a dropped link.
    pub fn bus(&self, link: LinkId) -> &[f32] {
        self.link_entry(link).map(|l| &*l.bus).unwrap_or_default()
    }

    /// Zeroes the bus of every live link. Called at the start of each block.
    pub fn clear_buses(&mut self) {
        for link in self.links.iter_mut().flatten() {
            link.bus.fill(0.0);
        }
    }

    /// The store for `kind` and `name`, if any unit is registered under it.
    pub fn store_id(&self, kind: StoreKind, name: &str) -> Option<StoreId> {
        self.store_index.get(&(kind, symbol(name))).copied()
    }

    /// A live store.
    pub fn store(&self, store: StoreId) -> Option<&Store> {
        self.stores.get(store.0 as usize).and_then(Option::as_ref)
    }

    /// Owners of a store in registration order.
    pub fn store_owners(&self, store: StoreId) -> &[UnitId] {
        self.store(store).map(|s| &*s.owners).unwrap_or_default()
    }

    /// Number of live stores.
    pub fn store_count(&self) -> usize {
        self.store_index.len()
    }

    /// Mutable access to whatever `handle` names, for one unit's processing.
    pub fn named_mut(
        &mut self,
        handle: Option<Handle>,
    ) -> (Option<&mut [f32]>, Option<&mut Store>) {
        match handle {
            Some(Handle::Link(id)) => (
                self.links
                    .get_mut(id.0 as usize)
                    .and_then(Option::as_mut)
                    .map(|l| &mut *l.bus),
                None,
            ),
            Some(Handle::Store(id)) => (
                None,
                self.stores.get_mut(id.0 as usize).and_then(Option::as_mut),
            ),
            None => (None, None),
        }
    }

    /// Units receiving messages sent to `name`.
    pub fn receivers(&self, name: &str) -> &[UnitId] {
        self.receivers.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    /// Marks `name` as delivered to the host. Returns false if it already was.
    pub fn register_external(&mut self, name: &str) -> bool {
        self.external.insert(symbol(name))
    }

    /// Stops delivering `name` to the host. Returns false if it was not registered.
    pub fn unregister_external(&mut self, name: &str) -> bool {
        self.external.remove(name)
    }

    /// Returns true if messages sent to `name` go to the host.
    pub fn is_external(&self, name: &str) -> bool {
        self.external.contains(name)
    }

    fn link_entry(&self, link: LinkId) -> Option<&Link> {
        self.links.get(link.0 as usize).and_then(Option::as_ref)
    }

    fn link_or_insert(&mut self, family: LinkFamily, name: Symbol) -> (LinkId, &mut Link) {
        let id = match self.link_index.get(&(family, name)) {
            Some(&id) => id,
            None => {
                let link = Link {
                    emitters: Vec::new(),
                    collectors: Vec::new(),
                    bus: vec![0.0; self.block_size].into_boxed_slice(),
                };
                let id = match self.free_links.pop() {
                    Some(index) => {
                        self.links[index as usize] = Some(link);
                        LinkId(index)
                    }
                    None => {
                        self.links.push(Some(link));
                        LinkId(self.links.len() as u32 - 1)
                    }
                };
                self.link_index.insert((family, name), id);
                id
            }
        };
        let block_size = self.block_size;
        let link = self.links[id.0 as usize].get_or_insert_with(|| Link {
            emitters: Vec::new(),
            collectors: Vec::new(),
            bus: vec![0.0; block_size].into_boxed_slice(),
        });
        (id, link)
    }

    fn leave_link(&mut self, family: LinkFamily, name: Symbol, leave: impl FnOnce(&mut Link)) {
        let Some(&id) = self.link_index.get(&(family, name)) else {
            return;
        };
        let slot = &mut self.links[id.0 as usize];
        if let Some(link) = slot {
            leave(link);
            if link.emitters.is_empty() && link.collectors.is_empty() {
                *slot = None;
                self.link_index.remove(&(family, name));
                self.free_links.push(id.0);
            }
        }
    }

    fn store_or_insert(&mut self, kind: StoreKind, name: Symbol) -> (StoreId, &mut Store) {
        let id = match self.store_index.get(&(kind, name)) {
            Some(&id) => id,
            None => {
                let id = match self.free_stores.pop() {
                    Some(index) => {
                        self.stores[index as usize] = Some(Store::default());
                        StoreId(index)
                    }
                    None => {
                        self.stores.push(Some(Store::default()));
                        StoreId(self.stores.len() as u32 - 1)
                    }
                };
                self.store_index.insert((kind, name), id);
                id
            }
        };
        let store = self.stores[id.0 as usize].get_or_insert_with(Store::default);
        (id, store)
    }

    fn leave_store(&mut self, kind: StoreKind, name: Symbol, leave: impl FnOnce(&mut Store)) {
        let Some(&id) = self.store_index.get(&(kind, name)) else {
            return;
        };
        let slot = &mut self.stores[id.0 as usize];
        if let Some(store) = slot {
            leave(store);
            if store.is_unused() {
                *slot = None;
                self.store_index.remove(&(kind, name));
                self.free_stores.push(id.0);
            }
        }
    }
}
