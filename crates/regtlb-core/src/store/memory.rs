//! In-process transactional key store.
//!
//! `MemoryStore` mirrors the behavior of the Windows registry closely enough
//! that the key, transaction and registration layers can run unchanged on top
//! of it:
//!
//! - key names are case-insensitive and case-preserving
//! - subkeys enumerate in name order, values in insertion order
//! - transactions see a snapshot of the committed tree taken when they begin,
//!   plus their own changes; commit replays those changes onto the current
//!   committed tree, rollback or releasing the last handle discards them
//! - a tree deletion that reaches a protected key fails with access denied
//!   after removing everything it could, like `RegDeleteTreeW`
//! - keys opened under a transaction operate on that transaction's view
//! - failures carry the same Win32 codes the registry reports
//!
//! Paths can be marked as protected to emulate keys whose ACL denies access.

use super::{Access, KeyInfo, KeyStore, RawHandle, RawKey, ValueFilter, ValueInfo, ValueType};
use crate::error::{RegTlbError, Result};
use crate::platform::codes;
use crate::store::WellKnownKey;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

#[derive(Debug, Clone, Default)]
struct Node {
    name: String,
    values: Vec<StoredValue>,
    /// Keyed by lower-cased name.
    children: BTreeMap<String, Node>,
}

#[derive(Debug, Clone)]
struct StoredValue {
    name: String,
    kind: ValueType,
    data: Vec<u8>,
}

type Forest = HashMap<WellKnownKey, Node>;

/// One change made under a transaction, replayed onto the committed tree on commit.
#[derive(Debug, Clone)]
enum Change {
    Create {
        root: WellKnownKey,
        path: Vec<String>,
    },
    SetValue {
        root: WellKnownKey,
        path: Vec<String>,
        value: StoredValue,
    },
    ClearTree {
        root: WellKnownKey,
        path: Vec<String>,
    },
    Remove {
        root: WellKnownKey,
        path: Vec<String>,
    },
    /// Result of a tree deletion stopped by a protected key.
    Replace {
        root: WellKnownKey,
        path: Vec<String>,
        node: Node,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxStatus {
    Active,
    Committed,
    RolledBack,
}

#[derive(Debug)]
struct TxState {
    forest: Forest,
    changes: Vec<Change>,
    status: TxStatus,
    handles: usize,
}

#[derive(Debug, Clone)]
struct OpenKey {
    root: WellKnownKey,
    path: Vec<String>,
    transaction: Option<u64>,
    access: Access,
}

#[derive(Debug)]
struct State {
    committed: Forest,
    transactions: HashMap<u64, TxState>,
    /// Transaction handle value -> transaction id.
    handles: HashMap<isize, u64>,
    keys: HashMap<isize, OpenKey>,
    protected: Vec<(WellKnownKey, Vec<String>)>,
    next_handle: isize,
    next_transaction: u64,
}

/// In-memory implementation of [`KeyStore`].
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store with every well-known root present.
    pub fn new() -> Self {
        let committed = WellKnownKey::ALL
            .into_iter()
            .map(|root| {
                (
                    root,
                    Node {
                        name: root.short_name().to_string(),
                        ..Node::default()
                    },
                )
            })
            .collect();

        Self {
            state: Mutex::new(State {
                committed,
                transactions: HashMap::new(),
                handles: HashMap::new(),
                keys: HashMap::new(),
                protected: Vec::new(),
                next_handle: 0x1000,
                next_transaction: 1,
            }),
        }
    }

    /// Deny every open or create at `path` (and below) under `root`.
    pub fn protect(&self, root: WellKnownKey, path: &str) -> Result<()> {
        let mut state = self.lock()?;
        state.protected.push((root, lowered(&split(path))));
        Ok(())
    }

    /// Number of key and transaction handles currently open.
    pub fn open_handle_count(&self) -> Result<usize> {
        let state = self.lock()?;
        Ok(state.keys.len() + state.handles.len())
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| RegTlbError::application("Failed to acquire memory store lock"))
    }
}

fn split(name: &str) -> Vec<String> {
    name.split('\\')
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

fn lowered(path: &[String]) -> Vec<String> {
    path.iter().map(|part| part.to_lowercase()).collect()
}

fn to_utf16(text: &str) -> Vec<u16> {
    text.encode_utf16().collect()
}

fn node<'f>(forest: &'f Forest, root: WellKnownKey, path: &[String]) -> Option<&'f Node> {
    let mut current = forest.get(&root)?;
    for part in path {
        current = current.children.get(&part.to_lowercase())?;
    }
    Some(current)
}

fn node_mut<'f>(
    forest: &'f mut Forest,
    root: WellKnownKey,
    path: &[String],
) -> Option<&'f mut Node> {
    let mut current = forest.get_mut(&root)?;
    for part in path {
        current = current.children.get_mut(&part.to_lowercase())?;
    }
    Some(current)
}

fn is_string_kind(kind: ValueType) -> bool {
    matches!(
        kind,
        ValueType::String | ValueType::ExpandString | ValueType::MultiString
    )
}

/// The node at `path`, creating missing keys on the way.
fn ensure_path<'f>(
    forest: &'f mut Forest,
    root: WellKnownKey,
    path: &[String],
) -> Option<&'f mut Node> {
    let mut current = forest.get_mut(&root)?;
    for part in path {
        current = current
            .children
            .entry(part.to_lowercase())
            .or_insert_with(|| Node {
                name: part.clone(),
                ..Node::default()
            });
    }
    Some(current)
}

fn upsert_value(node: &mut Node, value: StoredValue) {
    let lower = value.name.to_lowercase();
    match node
        .values
        .iter_mut()
        .find(|existing| existing.name.to_lowercase() == lower)
    {
        Some(existing) => {
            existing.kind = value.kind;
            existing.data = value.data;
        }
        None => node.values.push(value),
    }
}

/// Apply a transaction's change to the committed tree.
///
/// Changes to keys removed in the meantime recreate them; removals of keys
/// that are already gone do nothing.
fn replay(forest: &mut Forest, change: Change) {
    match change {
        Change::Create { root, path } => {
            ensure_path(forest, root, &path);
        }
        Change::SetValue { root, path, value } => {
            if let Some(node) = ensure_path(forest, root, &path) {
                upsert_value(node, value);
            }
        }
        Change::ClearTree { root, path } => {
            if let Some(node) = node_mut(forest, root, &path) {
                node.values.clear();
                node.children.clear();
            }
        }
        Change::Remove { root, path } => {
            if let Some((last, parent)) = path.split_last() {
                if let Some(parent) = node_mut(forest, root, parent) {
                    parent.children.remove(&last.to_lowercase());
                }
            }
        }
        Change::Replace { root, path, node } => {
            if let Some(target) = ensure_path(forest, root, &path) {
                *target = node;
            }
        }
    }
}

/// Remove the values and subkeys of `node` that are not on the way to a
/// protected key. `path` and `blocked` are lower-cased.
fn strip_unprotected(node: &mut Node, path: &[String], blocked: &[Vec<String>]) {
    if blocked.iter().any(|protected| protected.as_slice() == path) {
        return;
    }
    node.values.clear();
    node.children.retain(|lower, child| {
        let mut child_path = path.to_vec();
        child_path.push(lower.clone());
        if blocked.iter().any(|protected| protected.starts_with(&child_path)) {
            strip_unprotected(child, &child_path, blocked);
            true
        } else {
            false
        }
    });
}

impl State {
    /// Remember `change` for replay if `transaction` is active.
    fn record(&mut self, transaction: Option<u64>, change: Change) {
        if let Some(tx) = transaction.and_then(|id| self.transactions.get_mut(&id)) {
            if tx.status == TxStatus::Active {
                tx.changes.push(change);
            }
        }
    }

    fn allocate_handle(&mut self) -> isize {
        let value = self.next_handle;
        self.next_handle += 4;
        value
    }

    /// Root, path, transaction and access of an open key or predefined root.
    fn resolve(&self, key: RawKey, operation: &str) -> Result<OpenKey> {
        if let Some(root) = WellKnownKey::from_raw(key) {
            return Ok(OpenKey {
                root,
                path: Vec::new(),
                transaction: None,
                access: Access::READ | Access::WRITE,
            });
        }
        self.keys
            .get(&key.0)
            .cloned()
            .ok_or_else(|| RegTlbError::system(codes::ERROR_INVALID_HANDLE, operation))
    }

    fn transaction_id(&self, handle: RawHandle, operation: &str) -> Result<u64> {
        self.handles
            .get(&handle.0)
            .copied()
            .ok_or_else(|| RegTlbError::system(codes::ERROR_INVALID_HANDLE, operation))
    }

    /// Explicit transaction handle if given, otherwise the one the parent was opened under.
    fn effective_transaction(
        &self,
        transaction: Option<RawHandle>,
        inherited: Option<u64>,
        operation: &str,
    ) -> Result<Option<u64>> {
        match transaction {
            Some(handle) => self.transaction_id(handle, operation).map(Some),
            None => Ok(inherited),
        }
    }

    fn forest(&self, transaction: Option<u64>, operation: &str) -> Result<&Forest> {
        match transaction {
            None => Ok(&self.committed),
            Some(id) => match self.transactions.get(&id) {
                Some(tx) if tx.status == TxStatus::Active => Ok(&tx.forest),
                _ => Err(RegTlbError::system(
                    codes::ERROR_TRANSACTION_NOT_ACTIVE,
                    operation,
                )),
            },
        }
    }

    fn forest_mut(&mut self, transaction: Option<u64>, operation: &str) -> Result<&mut Forest> {
        match transaction {
            None => Ok(&mut self.committed),
            Some(id) => match self.transactions.get_mut(&id) {
                Some(tx) if tx.status == TxStatus::Active => Ok(&mut tx.forest),
                _ => Err(RegTlbError::system(
                    codes::ERROR_TRANSACTION_NOT_ACTIVE,
                    operation,
                )),
            },
        }
    }

    fn is_protected(&self, root: WellKnownKey, path: &[String]) -> bool {
        let path = lowered(path);
        self.protected.iter().any(|(protected_root, protected_path)| {
            *protected_root == root && path.starts_with(protected_path)
        })
    }

    /// The node an open key refers to, or `ERROR_KEY_DELETED` if it is gone.
    fn key_node(&self, key: &OpenKey, operation: &str) -> Result<&Node> {
        let forest = self.forest(key.transaction, operation)?;
        node(forest, key.root, &key.path)
            .ok_or_else(|| RegTlbError::system(codes::ERROR_KEY_DELETED, operation))
    }

    fn key_node_mut(&mut self, key: &OpenKey, operation: &str) -> Result<&mut Node> {
        let forest = self.forest_mut(key.transaction, operation)?;
        node_mut(forest, key.root, &key.path)
            .ok_or_else(|| RegTlbError::system(codes::ERROR_KEY_DELETED, operation))
    }

    fn register_key(&mut self, key: OpenKey) -> RawKey {
        let value = self.allocate_handle();
        self.keys.insert(value, key);
        RawKey(value)
    }
}

impl KeyStore for MemoryStore {
    fn close_handle(&self, handle: RawHandle) -> Result<()> {
        let mut state = self.lock()?;
        let id = state
            .handles
            .remove(&handle.0)
            .ok_or_else(|| RegTlbError::system(codes::ERROR_INVALID_HANDLE, "CloseHandle"))?;

        let release = match state.transactions.get_mut(&id) {
            Some(tx) => {
                tx.handles -= 1;
                tx.handles == 0
            }
            None => false,
        };
        if release {
            if let Some(tx) = state.transactions.remove(&id) {
                if tx.status == TxStatus::Active {
                    debug!("Transaction {} released without commit, discarding", id);
                }
            }
        }
        Ok(())
    }

    fn duplicate_handle(&self, handle: RawHandle) -> Result<RawHandle> {
        let mut state = self.lock()?;
        let id = state.transaction_id(handle, "DuplicateHandle")?;
        if let Some(tx) = state.transactions.get_mut(&id) {
            tx.handles += 1;
        }
        let value = state.allocate_handle();
        state.handles.insert(value, id);
        Ok(RawHandle(value))
    }

    fn create_transaction(&self, description: Option<&str>) -> Result<RawHandle> {
        let mut state = self.lock()?;
        let id = state.next_transaction;
        state.next_transaction += 1;

        let forest = state.committed.clone();
        state.transactions.insert(
            id,
            TxState {
                forest,
                changes: Vec::new(),
                status: TxStatus::Active,
                handles: 1,
            },
        );
        let value = state.allocate_handle();
        state.handles.insert(value, id);
        debug!(
            "Created transaction {} ({})",
            id,
            description.unwrap_or("no description")
        );
        Ok(RawHandle(value))
    }

    fn commit_transaction(&self, transaction: RawHandle) -> Result<()> {
        let mut state = self.lock()?;
        let id = state.transaction_id(transaction, "CommitTransaction")?;
        let changes = match state.transactions.get_mut(&id) {
            Some(tx) if tx.status == TxStatus::Active => {
                tx.status = TxStatus::Committed;
                tx.forest.clear();
                std::mem::take(&mut tx.changes)
            }
            _ => {
                return Err(RegTlbError::system(
                    codes::ERROR_TRANSACTION_NOT_ACTIVE,
                    "CommitTransaction",
                ))
            }
        };
        debug!("Committing {} changes of transaction {}", changes.len(), id);
        for change in changes {
            replay(&mut state.committed, change);
        }
        Ok(())
    }

    fn rollback_transaction(&self, transaction: RawHandle) -> Result<()> {
        let mut state = self.lock()?;
        let id = state.transaction_id(transaction, "RollbackTransaction")?;
        match state.transactions.get_mut(&id) {
            Some(tx) if tx.status == TxStatus::Active => {
                tx.status = TxStatus::RolledBack;
                tx.forest.clear();
                tx.changes.clear();
                Ok(())
            }
            _ => Err(RegTlbError::system(
                codes::ERROR_TRANSACTION_NOT_ACTIVE,
                "RollbackTransaction",
            )),
        }
    }

    fn open_key(
        &self,
        parent: RawKey,
        name: &str,
        access: Access,
        transaction: Option<RawHandle>,
    ) -> Result<RawKey> {
        const OP: &str = "RegOpenKeyExW";
        let mut state = self.lock()?;
        let parent = state.resolve(parent, OP)?;
        let tx = state.effective_transaction(transaction, parent.transaction, OP)?;

        let mut path = parent.path.clone();
        path.extend(split(name));

        let forest = state.forest(tx, OP)?;
        if node(forest, parent.root, &path).is_none() {
            return Err(RegTlbError::system(codes::ERROR_FILE_NOT_FOUND, OP));
        }
        if state.is_protected(parent.root, &path) {
            return Err(RegTlbError::system(codes::ERROR_ACCESS_DENIED, OP));
        }

        Ok(state.register_key(OpenKey {
            root: parent.root,
            path,
            transaction: tx,
            access,
        }))
    }

    fn create_key(
        &self,
        parent: RawKey,
        name: &str,
        access: Access,
        transaction: Option<RawHandle>,
    ) -> Result<RawKey> {
        const OP: &str = "RegCreateKeyExW";
        let mut state = self.lock()?;
        let parent = state.resolve(parent, OP)?;
        let tx = state.effective_transaction(transaction, parent.transaction, OP)?;

        let parts = split(name);
        if !parts.is_empty() && !parent.access.allows_write() {
            return Err(RegTlbError::system(codes::ERROR_ACCESS_DENIED, OP));
        }
        let mut path = parent.path.clone();
        path.extend(parts.iter().cloned());
        if state.is_protected(parent.root, &path) {
            return Err(RegTlbError::system(codes::ERROR_ACCESS_DENIED, OP));
        }

        let forest = state.forest_mut(tx, OP)?;
        if node(forest, parent.root, &parent.path).is_none() {
            return Err(RegTlbError::system(codes::ERROR_KEY_DELETED, OP));
        }
        ensure_path(forest, parent.root, &path);
        state.record(
            tx,
            Change::Create {
                root: parent.root,
                path: path.clone(),
            },
        );

        Ok(state.register_key(OpenKey {
            root: parent.root,
            path,
            transaction: tx,
            access,
        }))
    }

    fn close_key(&self, key: RawKey) -> Result<()> {
        if WellKnownKey::from_raw(key).is_some() {
            return Ok(());
        }
        let mut state = self.lock()?;
        state
            .keys
            .remove(&key.0)
            .map(|_| ())
            .ok_or_else(|| RegTlbError::system(codes::ERROR_INVALID_HANDLE, "RegCloseKey"))
    }

    fn delete_tree(&self, key: RawKey, sub_key: Option<&str>) -> Result<()> {
        const OP: &str = "RegDeleteTreeW";
        let mut state = self.lock()?;
        let open = state.resolve(key, OP)?;
        if !open.access.allows_write() {
            return Err(RegTlbError::system(codes::ERROR_ACCESS_DENIED, OP));
        }

        let parts = sub_key.map(split).unwrap_or_default();
        let mut target = open.path.clone();
        target.extend(parts.iter().cloned());
        if state.is_protected(open.root, &target) {
            return Err(RegTlbError::system(codes::ERROR_ACCESS_DENIED, OP));
        }

        let target_lower = lowered(&target);
        let blocked: Vec<Vec<String>> = {
            let forest = state.forest(open.transaction, OP)?;
            state
                .protected
                .iter()
                .filter(|(root, path)| {
                    *root == open.root
                        && path.starts_with(&target_lower)
                        && node(forest, open.root, path).is_some()
                })
                .map(|(_, path)| path.clone())
                .collect()
        };

        let forest = state.forest_mut(open.transaction, OP)?;
        if !blocked.is_empty() {
            let node = node_mut(forest, open.root, &target)
                .ok_or_else(|| RegTlbError::system(codes::ERROR_FILE_NOT_FOUND, OP))?;
            strip_unprotected(node, &target_lower, &blocked);
            let remaining = node.clone();
            state.record(
                open.transaction,
                Change::Replace {
                    root: open.root,
                    path: target,
                    node: remaining,
                },
            );
            return Err(RegTlbError::system(codes::ERROR_ACCESS_DENIED, OP));
        }

        match parts.split_last() {
            None => {
                let node = node_mut(forest, open.root, &open.path)
                    .ok_or_else(|| RegTlbError::system(codes::ERROR_KEY_DELETED, OP))?;
                node.values.clear();
                node.children.clear();
                state.record(
                    open.transaction,
                    Change::ClearTree {
                        root: open.root,
                        path: target,
                    },
                );
            }
            Some((last, _)) => {
                let parent_path = &target[..target.len() - 1];
                let parent = node_mut(forest, open.root, parent_path)
                    .ok_or_else(|| RegTlbError::system(codes::ERROR_FILE_NOT_FOUND, OP))?;
                parent
                    .children
                    .remove(&last.to_lowercase())
                    .ok_or_else(|| RegTlbError::system(codes::ERROR_FILE_NOT_FOUND, OP))?;
                state.record(
                    open.transaction,
                    Change::Remove {
                        root: open.root,
                        path: target,
                    },
                );
            }
        }
        Ok(())
    }

    fn delete_key(
        &self,
        parent: RawKey,
        name: &str,
        transaction: Option<RawHandle>,
    ) -> Result<()> {
        const OP: &str = "RegDeleteKeyTransactedW";
        let mut state = self.lock()?;
        let open = state.resolve(parent, OP)?;
        let tx = state.effective_transaction(transaction, open.transaction, OP)?;

        let mut target = open.path.clone();
        target.extend(split(name));
        let Some((last, parent_path)) = target.split_last() else {
            return Err(RegTlbError::system(codes::ERROR_INVALID_PARAMETER, OP));
        };
        if state.is_protected(open.root, &target) {
            return Err(RegTlbError::system(codes::ERROR_ACCESS_DENIED, OP));
        }

        let forest = state.forest_mut(tx, OP)?;
        let parent_node = node_mut(forest, open.root, parent_path)
            .ok_or_else(|| RegTlbError::system(codes::ERROR_FILE_NOT_FOUND, OP))?;
        let lower = last.to_lowercase();
        match parent_node.children.get(&lower) {
            None => Err(RegTlbError::system(codes::ERROR_FILE_NOT_FOUND, OP)),
            Some(child) if !child.children.is_empty() => {
                Err(RegTlbError::system(codes::ERROR_ACCESS_DENIED, OP))
            }
            Some(_) => {
                parent_node.children.remove(&lower);
                state.record(
                    tx,
                    Change::Remove {
                        root: open.root,
                        path: target,
                    },
                );
                Ok(())
            }
        }
    }

    fn set_value(&self, key: RawKey, name: &str, kind: ValueType, data: &[u8]) -> Result<()> {
        const OP: &str = "RegSetValueExW";
        let mut state = self.lock()?;
        let open = state.resolve(key, OP)?;
        if !open.access.allows_write() {
            return Err(RegTlbError::system(codes::ERROR_ACCESS_DENIED, OP));
        }
        let value = StoredValue {
            name: name.to_string(),
            kind,
            data: data.to_vec(),
        };
        upsert_value(state.key_node_mut(&open, OP)?, value.clone());
        state.record(
            open.transaction,
            Change::SetValue {
                root: open.root,
                path: open.path,
                value,
            },
        );
        Ok(())
    }

    fn get_value(
        &self,
        key: RawKey,
        name: &str,
        filter: ValueFilter,
        buffer: Option<&mut [u8]>,
    ) -> Result<ValueInfo> {
        const OP: &str = "RegGetValueW";
        let state = self.lock()?;
        let open = state.resolve(key, OP)?;
        let node = state.key_node(&open, OP)?;

        let lower = name.to_lowercase();
        let value = node
            .values
            .iter()
            .find(|value| value.name.to_lowercase() == lower)
            .ok_or_else(|| RegTlbError::system(codes::ERROR_FILE_NOT_FOUND, OP))?;
        if !filter.accepts(value.kind) {
            return Err(RegTlbError::system(codes::ERROR_UNSUPPORTED_TYPE, OP));
        }

        let needs_terminator = is_string_kind(value.kind) && !value.data.ends_with(&[0, 0]);
        let size = value.data.len() + if needs_terminator { 2 } else { 0 };

        if let Some(buffer) = buffer {
            if buffer.len() < size {
                return Err(RegTlbError::system(codes::ERROR_MORE_DATA, OP));
            }
            buffer[..value.data.len()].copy_from_slice(&value.data);
            if needs_terminator {
                buffer[value.data.len()..size].fill(0);
            }
        }

        Ok(ValueInfo {
            kind: value.kind,
            size,
        })
    }

    fn query_info(&self, key: RawKey) -> Result<KeyInfo> {
        const OP: &str = "RegQueryInfoKeyW";
        let state = self.lock()?;
        let open = state.resolve(key, OP)?;
        let node = state.key_node(&open, OP)?;

        Ok(KeyInfo {
            sub_keys: node.children.len() as u32,
            max_sub_key_len: max_name_len(node.children.values().map(|c| c.name.as_str())),
            values: node.values.len() as u32,
            max_value_name_len: max_name_len(node.values.iter().map(|v| v.name.as_str())),
        })
    }

    fn enum_key(&self, key: RawKey, index: u32, name: &mut [u16]) -> Result<usize> {
        const OP: &str = "RegEnumKeyExW";
        let state = self.lock()?;
        let open = state.resolve(key, OP)?;
        let node = state.key_node(&open, OP)?;

        let child = node
            .children
            .values()
            .nth(index as usize)
            .ok_or_else(|| RegTlbError::system(codes::ERROR_NO_MORE_ITEMS, OP))?;
        copy_name(&child.name, name, OP)
    }

    fn enum_value(&self, key: RawKey, index: u32, name: &mut [u16]) -> Result<usize> {
        const OP: &str = "RegEnumValueW";
        let state = self.lock()?;
        let open = state.resolve(key, OP)?;
        let node = state.key_node(&open, OP)?;

        let value = node
            .values
            .get(index as usize)
            .ok_or_else(|| RegTlbError::system(codes::ERROR_NO_MORE_ITEMS, OP))?;
        copy_name(&value.name, name, OP)
    }
}

fn max_name_len<'a>(names: impl Iterator<Item = &'a str>) -> u32 {
    names
        .map(|name| name.encode_utf16().count() as u32)
        .max()
        .unwrap_or(0)
}

/// Copy `source` plus a terminator into `target`, as the enumeration calls do.
fn copy_name(source: &str, target: &mut [u16], operation: &str) -> Result<usize> {
    let wide = to_utf16(source);
    if wide.len() + 1 > target.len() {
        return Err(RegTlbError::system(codes::ERROR_MORE_DATA, operation));
    }
    target[..wide.len()].copy_from_slice(&wide);
    target[wide.len()] = 0;
    Ok(wide.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HKCU: RawKey = WellKnownKey::CurrentUser.raw();
    const RW: Access = Access(Access::READ.0 | Access::WRITE.0);

    fn name_at(store: &MemoryStore, key: RawKey, index: u32) -> String {
        let mut buffer = [0u16; 64];
        let len = store.enum_key(key, index, &mut buffer).unwrap();
        String::from_utf16(&buffer[..len]).unwrap()
    }

    #[test]
    fn test_create_then_open_is_case_insensitive() {
        let store = MemoryStore::new();
        let key = store.create_key(HKCU, "Software\\Acme", RW, None).unwrap();
        store.close_key(key).unwrap();

        let key = store.open_key(HKCU, "SOFTWARE\\acme", Access::READ, None).unwrap();
        store.close_key(key).unwrap();
        assert_eq!(name_at(&store, HKCU, 0), "Software");
    }

    #[test]
    fn test_open_missing_key_is_not_found() {
        let store = MemoryStore::new();
        let err = store.open_key(HKCU, "Nope", Access::READ, None).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_transaction_isolation_and_commit() {
        let store = MemoryStore::new();
        let tx = store.create_transaction(Some("test")).unwrap();
        let key = store.create_key(HKCU, "Pending", RW, Some(tx)).unwrap();
        store.close_key(key).unwrap();

        // Invisible outside the transaction until commit.
        assert!(store.open_key(HKCU, "Pending", Access::READ, None).is_err());
        store.commit_transaction(tx).unwrap();
        let key = store.open_key(HKCU, "Pending", Access::READ, None).unwrap();
        store.close_key(key).unwrap();
        store.close_handle(tx).unwrap();
    }

    #[test]
    fn test_commit_keeps_writes_made_outside_the_transaction() {
        let store = MemoryStore::new();
        let key = store.create_key(HKCU, "Victim", RW, None).unwrap();
        store.close_key(key).unwrap();

        let tx = store.create_transaction(None).unwrap();
        let other = store.create_key(HKCU, "Other", RW, None).unwrap();
        store.set_value(other, "kept", ValueType::DWord, &[7, 0, 0, 0]).unwrap();
        store.close_key(other).unwrap();

        let tree = store.open_key(HKCU, "", RW, Some(tx)).unwrap();
        store.delete_tree(tree, Some("Victim")).unwrap();
        store.close_key(tree).unwrap();
        store.commit_transaction(tx).unwrap();
        store.close_handle(tx).unwrap();

        assert!(store.open_key(HKCU, "Victim", Access::READ, None).unwrap_err().is_not_found());
        let other = store.open_key(HKCU, "Other", Access::READ, None).unwrap();
        let info = store.get_value(other, "kept", ValueFilter::DWord, None).unwrap();
        assert_eq!(info.kind, ValueType::DWord);
        store.close_key(other).unwrap();
    }

    #[test]
    fn test_commit_replays_transacted_writes() {
        let store = MemoryStore::new();
        let tx = store.create_transaction(None).unwrap();
        let key = store.create_key(HKCU, "App\\Settings", RW, Some(tx)).unwrap();
        store.set_value(key, "mode", ValueType::DWord, &[2, 0, 0, 0]).unwrap();
        store.close_key(key).unwrap();
        store.delete_key(HKCU, "App\\Settings", Some(tx)).unwrap();
        let key = store.create_key(HKCU, "App\\Final", RW, Some(tx)).unwrap();
        store.close_key(key).unwrap();

        let outside = store.create_key(HKCU, "App\\Outside", RW, None).unwrap();
        store.close_key(outside).unwrap();
        store.commit_transaction(tx).unwrap();
        store.close_handle(tx).unwrap();

        let app = store.open_key(HKCU, "App", Access::READ, None).unwrap();
        assert_eq!(name_at(&store, app, 0), "Final");
        assert_eq!(name_at(&store, app, 1), "Outside");
        assert_eq!(store.query_info(app).unwrap().sub_keys, 2);
        store.close_key(app).unwrap();
    }

    #[test]
    fn test_rollback_discards_work() {
        let store = MemoryStore::new();
        let tx = store.create_transaction(None).unwrap();
        let key = store.create_key(HKCU, "Discarded", RW, Some(tx)).unwrap();
        store.rollback_transaction(tx).unwrap();

        // Keys opened under a finished transaction can no longer be used.
        let err = store.set_value(key, "", ValueType::String, &[0, 0]).unwrap_err();
        assert_eq!(err.code(), Some(codes::ERROR_TRANSACTION_NOT_ACTIVE));
        store.close_key(key).unwrap();
        store.close_handle(tx).unwrap();

        assert!(store.open_key(HKCU, "Discarded", Access::READ, None).is_err());
    }

    #[test]
    fn test_commit_twice_fails() {
        let store = MemoryStore::new();
        let tx = store.create_transaction(None).unwrap();
        store.commit_transaction(tx).unwrap();
        let err = store.commit_transaction(tx).unwrap_err();
        assert_eq!(err.code(), Some(codes::ERROR_TRANSACTION_NOT_ACTIVE));
        store.close_handle(tx).unwrap();
    }

    #[test]
    fn test_duplicate_keeps_transaction_alive() {
        let store = MemoryStore::new();
        let tx = store.create_transaction(None).unwrap();
        let copy = store.duplicate_handle(tx).unwrap();
        store.close_handle(tx).unwrap();
        store.commit_transaction(copy).unwrap();
        store.close_handle(copy).unwrap();
        assert_eq!(store.open_handle_count().unwrap(), 0);
    }

    #[test]
    fn test_close_unknown_handle_is_invalid() {
        let store = MemoryStore::new();
        let err = store.close_handle(RawHandle(12345)).unwrap_err();
        assert_eq!(err.code(), Some(codes::ERROR_INVALID_HANDLE));
    }

    #[test]
    fn test_read_only_key_rejects_writes() {
        let store = MemoryStore::new();
        let key = store.create_key(HKCU, "Ro", RW, None).unwrap();
        store.close_key(key).unwrap();

        let key = store.open_key(HKCU, "Ro", Access::READ, None).unwrap();
        let err = store.set_value(key, "x", ValueType::DWord, &[1, 0, 0, 0]).unwrap_err();
        assert_eq!(err.code(), Some(codes::ERROR_ACCESS_DENIED));
        let err = store.create_key(key, "Child", RW, None).unwrap_err();
        assert_eq!(err.code(), Some(codes::ERROR_ACCESS_DENIED));
        store.close_key(key).unwrap();
    }

    #[test]
    fn test_protected_path_denies_open() {
        let store = MemoryStore::new();
        let key = store.create_key(HKCU, "Locked\\Inner", RW, None).unwrap();
        store.close_key(key).unwrap();
        store.protect(WellKnownKey::CurrentUser, "locked").unwrap();

        let err = store.open_key(HKCU, "Locked\\Inner", Access::READ, None).unwrap_err();
        assert_eq!(err.code(), Some(codes::ERROR_ACCESS_DENIED));
    }

    #[test]
    fn test_delete_key_with_children_is_denied() {
        let store = MemoryStore::new();
        let key = store.create_key(HKCU, "Parent\\Child", RW, None).unwrap();
        store.close_key(key).unwrap();

        let err = store.delete_key(HKCU, "Parent", None).unwrap_err();
        assert_eq!(err.code(), Some(codes::ERROR_ACCESS_DENIED));
        store.delete_key(HKCU, "Parent\\Child", None).unwrap();
        store.delete_key(HKCU, "Parent", None).unwrap();
        assert!(store.delete_key(HKCU, "Parent", None).unwrap_err().is_not_found());
    }

    #[test]
    fn test_delete_tree_clears_contents_only() {
        let store = MemoryStore::new();
        let key = store.create_key(HKCU, "Tree\\A\\B", RW, None).unwrap();
        store.close_key(key).unwrap();
        let tree = store.open_key(HKCU, "Tree", RW, None).unwrap();
        store.set_value(tree, "v", ValueType::DWord, &[1, 0, 0, 0]).unwrap();

        store.delete_tree(tree, None).unwrap();
        let info = store.query_info(tree).unwrap();
        assert_eq!(info, KeyInfo::default());
        store.close_key(tree).unwrap();
    }

    #[test]
    fn test_delete_tree_stops_at_protected_descendant() {
        let store = MemoryStore::new();
        for path in ["Tree\\Open\\Leaf", "Tree\\Guarded\\Inner", "Tree\\Guarded\\Sibling"] {
            let key = store.create_key(HKCU, path, RW, None).unwrap();
            store.close_key(key).unwrap();
        }
        store.protect(WellKnownKey::CurrentUser, "Tree\\Guarded\\Inner").unwrap();

        let tree = store.open_key(HKCU, "Tree", RW, None).unwrap();
        store.set_value(tree, "v", ValueType::DWord, &[1, 0, 0, 0]).unwrap();
        let err = store.delete_tree(tree, None).unwrap_err();
        assert_eq!(err.code(), Some(codes::ERROR_ACCESS_DENIED));

        // Everything off the way to the protected key is gone.
        let info = store.query_info(tree).unwrap();
        assert_eq!(info.values, 0);
        assert_eq!(info.sub_keys, 1);
        assert_eq!(name_at(&store, tree, 0), "Guarded");
        let guarded = store.open_key(tree, "Guarded", Access::READ, None).unwrap();
        assert_eq!(store.query_info(guarded).unwrap().sub_keys, 1);
        assert_eq!(name_at(&store, guarded, 0), "Inner");
        store.close_key(guarded).unwrap();
        store.close_key(tree).unwrap();
    }

    #[test]
    fn test_protected_tree_deletion_rolls_back_under_transaction() {
        let store = MemoryStore::new();
        let key = store.create_key(HKCU, "Tree\\Guarded", RW, None).unwrap();
        store.close_key(key).unwrap();
        let key = store.create_key(HKCU, "Tree\\Plain", RW, None).unwrap();
        store.close_key(key).unwrap();
        store.protect(WellKnownKey::CurrentUser, "Tree\\Guarded").unwrap();

        let tx = store.create_transaction(None).unwrap();
        let tree = store.open_key(HKCU, "Tree", RW, Some(tx)).unwrap();
        assert!(store.delete_tree(tree, None).is_err());
        store.close_key(tree).unwrap();
        store.rollback_transaction(tx).unwrap();
        store.close_handle(tx).unwrap();

        let tree = store.open_key(HKCU, "Tree", Access::READ, None).unwrap();
        assert_eq!(store.query_info(tree).unwrap().sub_keys, 2);
        store.close_key(tree).unwrap();
    }

    #[test]
    fn test_get_value_adds_missing_terminator() {
        let store = MemoryStore::new();
        let key = store.create_key(HKCU, "Vals", RW, None).unwrap();
        // "ab" without a terminator.
        store
            .set_value(key, "raw", ValueType::String, &[b'a', 0, b'b', 0])
            .unwrap();

        let info = store.get_value(key, "raw", ValueFilter::String, None).unwrap();
        assert_eq!(info.size, 6);
        let mut small = [0u8; 4];
        let err = store
            .get_value(key, "raw", ValueFilter::String, Some(&mut small))
            .unwrap_err();
        assert_eq!(err.code(), Some(codes::ERROR_MORE_DATA));

        let err = store.get_value(key, "raw", ValueFilter::DWord, None).unwrap_err();
        assert_eq!(err.code(), Some(codes::ERROR_UNSUPPORTED_TYPE));
        store.close_key(key).unwrap();
    }

    #[test]
    fn test_enum_reports_more_data_and_end() {
        let store = MemoryStore::new();
        let key = store.create_key(HKCU, "LongName", RW, None).unwrap();
        store.close_key(key).unwrap();

        let mut tiny = [0u16; 3];
        let err = store.enum_key(HKCU, 0, &mut tiny).unwrap_err();
        assert_eq!(err.code(), Some(codes::ERROR_MORE_DATA));
        let mut buffer = [0u16; 16];
        let err = store.enum_key(HKCU, 1, &mut buffer).unwrap_err();
        assert_eq!(err.code(), Some(codes::ERROR_NO_MORE_ITEMS));
    }

    #[test]
    fn test_stale_key_after_delete_reports_key_deleted() {
        let store = MemoryStore::new();
        let key = store.create_key(HKCU, "Gone", RW, None).unwrap();
        store.delete_key(HKCU, "Gone", None).unwrap();
        let err = store.query_info(key).unwrap_err();
        assert_eq!(err.code(), Some(codes::ERROR_KEY_DELETED));
        store.close_key(key).unwrap();
    }
}
