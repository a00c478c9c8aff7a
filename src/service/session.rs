//! Request-scoped change tracker over a [`Store`]: identity map, navigation loads that
//! happen at most once, foreign-key linking and one atomic commit.

use crate::error::StoreError;
use crate::schema::{Instance, Navigation, SchemaModel, SchemaType};
use crate::store::{key_string, Change, Store};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryState {
    Added,
    Unchanged,
    Modified,
    Deleted,
    /// Added then removed before commit.
    Detached,
}

#[derive(Debug)]
struct Entry {
    type_name: String,
    key: Value,
    instance: Instance,
    state: EntryState,
    modified: BTreeSet<String>,
    loaded: HashSet<String>,
    references: HashMap<String, Option<EntryId>>,
    collections: HashMap<String, Vec<EntryId>>,
    /// Added entries that must be inserted first.
    depends_on: Vec<EntryId>,
}

pub struct Session {
    store: Arc<dyn Store>,
    schema: Arc<SchemaModel>,
    entries: Vec<Entry>,
    identity: HashMap<(String, String), EntryId>,
    loads: Vec<(String, String)>,
}

impl Session {
    pub fn new(store: Arc<dyn Store>) -> Self {
        let schema = store.schema().clone();
        Session {
            store,
            schema,
            entries: Vec::new(),
            identity: HashMap::new(),
            loads: Vec::new(),
        }
    }

    pub fn schema(&self) -> &Arc<SchemaModel> {
        &self.schema
    }

    fn schema_type(&self, type_name: &str) -> Result<&SchemaType, StoreError> {
        self.schema
            .find_entity_type(type_name)
            .ok_or_else(|| StoreError::UnknownType(type_name.to_string()))
    }

    fn key_name(&self, type_name: &str) -> Result<String, StoreError> {
        self.schema
            .find_primary_key(type_name)
            .map(|p| p.name.clone())
            .map_err(|e| StoreError::Unsupported(e.to_string()))
    }

    fn navigation(&self, id: EntryId, name: &str) -> Result<Navigation, StoreError> {
        let entry = &self.entries[id.0];
        self.schema_type(&entry.type_name)?
            .navigation(name)
            .cloned()
            .ok_or_else(|| StoreError::Unsupported(format!("{} has no navigation '{}'", entry.type_name, name)))
    }

    fn push(&mut self, type_name: &str, key: Value, instance: Instance, state: EntryState) -> EntryId {
        let id = EntryId(self.entries.len());
        self.identity
            .insert((type_name.to_string(), key_string(&key)), id);
        self.entries.push(Entry {
            type_name: type_name.to_string(),
            key,
            instance,
            state,
            modified: BTreeSet::new(),
            loaded: HashSet::new(),
            references: HashMap::new(),
            collections: HashMap::new(),
            depends_on: Vec::new(),
        });
        id
    }

    /// Track a row read from the store; a row already tracked keeps its tracked state.
    pub(crate) fn track(&mut self, type_name: &str, row: Instance) -> Result<EntryId, StoreError> {
        let key_name = self.key_name(type_name)?;
        let key = row.get(&key_name).cloned().unwrap_or(Value::Null);
        if let Some(&id) = self.identity.get(&(type_name.to_string(), key_string(&key))) {
            return Ok(id);
        }
        Ok(self.push(type_name, key, row, EntryState::Unchanged))
    }

    pub async fn find(&mut self, type_name: &str, key: &Value) -> Result<Option<EntryId>, StoreError> {
        if let Some(&id) = self.identity.get(&(type_name.to_string(), key_string(key))) {
            let gone = matches!(self.entries[id.0].state, EntryState::Deleted | EntryState::Detached);
            return Ok((!gone).then_some(id));
        }
        match self.store.find(type_name, key).await? {
            Some(row) => self.track(type_name, row).map(Some),
            None => Ok(None),
        }
    }

    /// Track a new instance. A missing key is generated by the store; absent members get defaults.
    pub async fn add(&mut self, type_name: &str, instance: Instance) -> Result<EntryId, StoreError> {
        let ty = self.schema_type(type_name)?.clone();
        let key_name = self.key_name(type_name)?;
        let mut row = ty.row_values(&instance);
        let key = match row.get(&key_name).filter(|k| !k.is_null()) {
            Some(k) => k.clone(),
            None => {
                let k = self.store.next_key(type_name).await?;
                row.insert(key_name, k.clone());
                k
            }
        };
        if self.identity.contains_key(&(type_name.to_string(), key_string(&key))) {
            return Err(StoreError::Conflict(format!(
                "{} with key {} is already tracked",
                type_name,
                key_string(&key)
            )));
        }
        ty.fill_defaults(&mut row);
        Ok(self.push(type_name, key, row, EntryState::Added))
    }

    pub fn remove(&mut self, id: EntryId) {
        let entry = &mut self.entries[id.0];
        entry.state = match entry.state {
            EntryState::Added | EntryState::Detached => EntryState::Detached,
            _ => EntryState::Deleted,
        };
    }

    pub fn instance(&self, id: EntryId) -> &Instance {
        &self.entries[id.0].instance
    }

    pub fn key(&self, id: EntryId) -> &Value {
        &self.entries[id.0].key
    }

    pub fn state(&self, id: EntryId) -> EntryState {
        self.entries[id.0].state
    }

    pub fn type_name(&self, id: EntryId) -> &str {
        &self.entries[id.0].type_name
    }

    /// Assign a stored member. Tracked rows record the member as modified even if the value is equal.
    pub fn set_value(&mut self, id: EntryId, name: &str, value: Value) {
        let entry = &mut self.entries[id.0];
        entry.instance.insert(name.to_string(), value);
        if matches!(entry.state, EntryState::Unchanged | EntryState::Modified) {
            entry.state = EntryState::Modified;
            entry.modified.insert(name.to_string());
        }
    }

    pub fn is_loaded(&self, id: EntryId, navigation: &str) -> bool {
        self.entries[id.0].loaded.contains(navigation)
    }

    /// Load a navigation of a tracked entity from the store, once. Later calls are no-ops.
    pub async fn load(&mut self, id: EntryId, navigation: &str) -> Result<(), StoreError> {
        if self.is_loaded(id, navigation) {
            return Ok(());
        }
        let nav = self.navigation(id, navigation)?;
        let (type_name, key, added) = {
            let e = &self.entries[id.0];
            (e.type_name.clone(), e.key.clone(), e.state == EntryState::Added)
        };
        tracing::debug!(entity = %type_name, key = %key_string(&key), navigation = %nav.name, "load navigation");
        if nav.is_collection() {
            let mut children = Vec::new();
            if !added {
                for row in self.store.find_by(&nav.target_type, &nav.foreign_key, &key).await? {
                    children.push(self.track(&nav.target_type, row)?);
                }
            }
            let entry = &mut self.entries[id.0];
            let tracked = entry.collections.entry(nav.name.clone()).or_default();
            for c in children {
                if !tracked.contains(&c) {
                    tracked.push(c);
                }
            }
        } else {
            let fk = self.entries[id.0]
                .instance
                .get(&nav.foreign_key)
                .cloned()
                .unwrap_or(Value::Null);
            let target = if fk.is_null() {
                None
            } else {
                self.find(&nav.target_type, &fk).await?
            };
            self.entries[id.0]
                .references
                .entry(nav.name.clone())
                .or_insert(target);
        }
        self.entries[id.0].loaded.insert(nav.name.clone());
        self.loads.push((type_name, nav.name));
        Ok(())
    }

    /// Every navigation load performed, as (entity type, navigation).
    pub fn loads(&self) -> &[(String, String)] {
        &self.loads
    }

    pub fn reference(&self, id: EntryId, navigation: &str) -> Option<EntryId> {
        self.entries[id.0].references.get(navigation).copied().flatten()
    }

    pub fn collection(&self, id: EntryId, navigation: &str) -> &[EntryId] {
        self.entries[id.0]
            .collections
            .get(navigation)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Point a reference at `target` (or unlink it) by setting the owner's foreign key.
    pub fn set_reference(&mut self, owner: EntryId, navigation: &str, target: Option<EntryId>) -> Result<(), StoreError> {
        let nav = self.navigation(owner, navigation)?;
        let fk = target.map_or(Value::Null, |t| self.entries[t.0].key.clone());
        self.set_value(owner, &nav.foreign_key, fk);
        if let Some(t) = target {
            if self.entries[t.0].state == EntryState::Added && !self.entries[owner.0].depends_on.contains(&t) {
                self.entries[owner.0].depends_on.push(t);
            }
        }
        self.entries[owner.0].references.insert(nav.name, target);
        Ok(())
    }

    /// Add `child` to a collection by setting the child's foreign key to the owner's key.
    pub fn add_to_collection(&mut self, owner: EntryId, navigation: &str, child: EntryId) -> Result<(), StoreError> {
        let nav = self.navigation(owner, navigation)?;
        let owner_key = self.entries[owner.0].key.clone();
        self.set_value(child, &nav.foreign_key, owner_key);
        if self.entries[owner.0].state == EntryState::Added && !self.entries[child.0].depends_on.contains(&owner) {
            self.entries[child.0].depends_on.push(owner);
        }
        let tracked = self.entries[owner.0].collections.entry(nav.name).or_default();
        if !tracked.contains(&child) {
            tracked.push(child);
        }
        Ok(())
    }

    /// Inserts in dependency order, then updates, then deletes.
    fn pending_changes(&self) -> Vec<Change> {
        let added: Vec<usize> = (0..self.entries.len())
            .filter(|&i| self.entries[i].state == EntryState::Added)
            .collect();
        let mut emitted: HashSet<usize> = HashSet::new();
        let mut order = Vec::with_capacity(added.len());
        while order.len() < added.len() {
            let before = order.len();
            for &i in &added {
                if emitted.contains(&i) {
                    continue;
                }
                let ready = self.entries[i].depends_on.iter().all(|d| {
                    emitted.contains(&d.0) || self.entries[d.0].state != EntryState::Added
                });
                if ready {
                    emitted.insert(i);
                    order.push(i);
                }
            }
            if order.len() == before {
                // cycle: emit the rest in tracking order
                order.extend(added.iter().filter(|i| !emitted.contains(i)).copied());
                break;
            }
        }

        let mut changes = Vec::new();
        for i in order {
            let e = &self.entries[i];
            changes.push(Change::Insert {
                entity_type: e.type_name.clone(),
                row: e.instance.clone(),
            });
        }
        for e in self.entries.iter().filter(|e| e.state == EntryState::Modified) {
            let values: Instance = e
                .modified
                .iter()
                .filter_map(|m| e.instance.get(m).map(|v| (m.clone(), v.clone())))
                .collect();
            changes.push(Change::Update {
                entity_type: e.type_name.clone(),
                key: e.key.clone(),
                values,
            });
        }
        for e in self.entries.iter().filter(|e| e.state == EntryState::Deleted) {
            changes.push(Change::Delete {
                entity_type: e.type_name.clone(),
                key: e.key.clone(),
            });
        }
        changes
    }

    /// Apply every tracked change in one store transaction; returns rows affected.
    pub async fn commit(&mut self) -> Result<u64, StoreError> {
        let changes = self.pending_changes();
        if changes.is_empty() {
            return Ok(0);
        }
        let affected = match self.store.apply(changes).await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(error = %e, "commit failed");
                return Err(e);
            }
        };
        for e in &mut self.entries {
            e.state = match e.state {
                EntryState::Added | EntryState::Modified => EntryState::Unchanged,
                other => other,
            };
            e.modified.clear();
            e.depends_on.clear();
        }
        Ok(affected)
    }
}
