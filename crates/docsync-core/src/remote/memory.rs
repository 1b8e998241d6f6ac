//! In-process document store and notifier for tests and offline runs

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use super::wire::{decode_block, encode_block};
use super::{nest_list_items, BlockTree, DocumentHandle, DocumentMetadata, DocumentStore, Notifier};
use crate::error::{Error, Result};
use crate::markdown::markdown_to_blocks;
use crate::models::{Block, BlockKind};

const URL_BASE: &str = "https://docs.example.test/docx";

#[derive(Debug)]
struct MemoryDocument {
    title: String,
    revision_id: i64,
    /// Every block by id; the root block's id equals the document id
    blocks: HashMap<String, Block>,
}

impl MemoryDocument {
    fn ordered_blocks(&self, root_id: &str) -> Vec<Block> {
        let mut ordered = Vec::with_capacity(self.blocks.len());
        let mut stack = vec![root_id.to_string()];
        while let Some(id) = stack.pop() {
            if let Some(block) = self.blocks.get(&id) {
                stack.extend(block.children.iter().rev().cloned());
                ordered.push(block.clone());
            }
        }
        ordered
    }

    fn remove_subtree(&mut self, block_id: &str) {
        if let Some(block) = self.blocks.remove(block_id) {
            for child in block.children {
                self.remove_subtree(&child);
            }
        }
    }
}

#[derive(Debug, Default)]
struct StoreState {
    documents: HashMap<String, MemoryDocument>,
    read_failure: Option<String>,
    write_failure: Option<String>,
    read_delay: Duration,
    append_batches: Vec<usize>,
}

/// Document store kept entirely in memory.
///
/// Every mutation bumps the document revision. Failures and latency can be
/// injected to exercise error and overlap handling.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    state: Mutex<StoreState>,
    next_id: AtomicU64,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn next_id(&self, prefix: &str) -> String {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{prefix}{id}")
    }

    fn check_read(&self) -> Result<Duration> {
        let state = self.state();
        match &state.read_failure {
            Some(message) => Err(Error::Remote(message.clone())),
            None => Ok(state.read_delay),
        }
    }

    /// Number of documents created so far
    pub fn document_count(&self) -> usize {
        self.state().documents.len()
    }

    /// Sizes of every append request, in call order
    pub fn append_batches(&self) -> Vec<usize> {
        self.state().append_batches.clone()
    }

    /// Make every read fail with `message` until [`Self::clear_failures`]
    pub fn fail_reads(&self, message: impl Into<String>) {
        self.state().read_failure = Some(message.into());
    }

    /// Make document creation and appends fail with `message`
    pub fn fail_writes(&self, message: impl Into<String>) {
        self.state().write_failure = Some(message.into());
    }

    pub fn clear_failures(&self) {
        let mut state = self.state();
        state.read_failure = None;
        state.write_failure = None;
    }

    /// Delay applied to every read, before it touches the document
    pub fn set_read_delay(&self, delay: Duration) {
        self.state().read_delay = delay;
    }

    /// Simulate a remote edit: replace the document body with `markdown`
    pub fn replace_content(&self, document_id: &str, markdown: &str) -> Result<()> {
        let tree = nest_list_items(markdown_to_blocks(markdown));

        let mut state = self.state();
        let document = state
            .documents
            .get_mut(document_id)
            .ok_or_else(|| Error::NotFound(document_id.to_string()))?;

        let old_children = document
            .blocks
            .get(document_id)
            .map(|root| root.children.clone())
            .unwrap_or_default();
        for child in old_children {
            document.remove_subtree(&child);
        }
        let ids = self.insert_tree(document, document_id, &tree);
        if let Some(root) = document.blocks.get_mut(document_id) {
            root.children = ids;
        }
        document.revision_id += 1;
        Ok(())
    }

    fn insert_tree(&self, document: &mut MemoryDocument, parent_id: &str, nodes: &[BlockTree]) -> Vec<String> {
        let mut ids = Vec::with_capacity(nodes.len());
        for node in nodes {
            let id = self.next_id("blk");
            let mut block = node.block.clone();
            block.block_id.clone_from(&id);
            block.parent_id = parent_id.to_string();
            block.children = self.insert_tree(document, &id, &node.children);
            document.blocks.insert(id.clone(), block);
            ids.push(id);
        }
        ids
    }

    /// Insert `block` as the last child of `parent_id`, returning its id
    pub fn insert_child(&self, document_id: &str, parent_id: &str, mut block: Block) -> Result<String> {
        let id = self.next_id("blk");
        let mut state = self.state();
        let document = state
            .documents
            .get_mut(document_id)
            .ok_or_else(|| Error::NotFound(document_id.to_string()))?;
        let parent = document
            .blocks
            .get_mut(parent_id)
            .ok_or_else(|| Error::NotFound(parent_id.to_string()))?;

        parent.children.push(id.clone());
        block.block_id.clone_from(&id);
        block.parent_id = parent_id.to_string();
        document.blocks.insert(id.clone(), block);
        document.revision_id += 1;
        Ok(id)
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn create_document(&self, title: &str) -> Result<DocumentHandle> {
        let document_id = self.next_id("doc");
        let mut state = self.state();
        if let Some(message) = &state.write_failure {
            return Err(Error::Remote(message.clone()));
        }

        let mut root = Block::new(BlockKind::Page);
        root.block_id.clone_from(&document_id);
        let document = MemoryDocument {
            title: title.to_string(),
            revision_id: 1,
            blocks: HashMap::from([(document_id.clone(), root)]),
        };
        state.documents.insert(document_id.clone(), document);

        Ok(DocumentHandle {
            url: format!("{URL_BASE}/{document_id}"),
            document_id,
        })
    }

    async fn append_blocks(
        &self,
        document_id: &str,
        parent_id: &str,
        blocks: &[Block],
        insert_index: Option<usize>,
    ) -> Result<Vec<String>> {
        let ids: Vec<String> = blocks.iter().map(|_| self.next_id("blk")).collect();
        let mut state = self.state();
        if let Some(message) = &state.write_failure {
            return Err(Error::Remote(message.clone()));
        }
        state.append_batches.push(blocks.len());

        let document = state
            .documents
            .get_mut(document_id)
            .ok_or_else(|| Error::NotFound(document_id.to_string()))?;
        if !document.blocks.contains_key(parent_id) {
            return Err(Error::NotFound(parent_id.to_string()));
        }
        for (block, id) in blocks.iter().zip(&ids) {
            // Keep only what the wire request carries.
            let mut block = decode_block(&encode_block(block));
            block.block_id.clone_from(id);
            block.parent_id = parent_id.to_string();
            document.blocks.insert(id.clone(), block);
        }

        let parent = document
            .blocks
            .get_mut(parent_id)
            .ok_or_else(|| Error::NotFound(parent_id.to_string()))?;
        let index = insert_index.map_or(parent.children.len(), |index| {
            index.min(parent.children.len())
        });
        parent.children.splice(index..index, ids.iter().cloned());
        document.revision_id += 1;
        Ok(ids)
    }

    async fn list_top_blocks(&self, document_id: &str) -> Result<Vec<Block>> {
        let delay = self.check_read()?;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let state = self.state();
        let document = state
            .documents
            .get(document_id)
            .ok_or_else(|| Error::NotFound(document_id.to_string()))?;
        Ok(document.ordered_blocks(document_id))
    }

    async fn list_block_children(&self, document_id: &str, block_id: &str) -> Result<Vec<Block>> {
        self.check_read()?;
        let state = self.state();
        let document = state
            .documents
            .get(document_id)
            .ok_or_else(|| Error::NotFound(document_id.to_string()))?;
        let parent = document
            .blocks
            .get(block_id)
            .ok_or_else(|| Error::NotFound(block_id.to_string()))?;
        Ok(parent
            .children
            .iter()
            .filter_map(|id| document.blocks.get(id).cloned())
            .collect())
    }

    async fn get_metadata(&self, document_id: &str) -> Result<DocumentMetadata> {
        self.check_read()?;
        let state = self.state();
        let document = state
            .documents
            .get(document_id)
            .ok_or_else(|| Error::NotFound(document_id.to_string()))?;
        Ok(DocumentMetadata {
            revision_id: Some(document.revision_id),
            update_time: None,
            title: document.title.clone(),
        })
    }
}

/// Notifier that records every message it is given
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    messages: Mutex<Vec<(String, String)>>,
    failure: Mutex<Option<String>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded `(chat_id, text)` pairs, oldest first
    pub fn messages(&self) -> Vec<(String, String)> {
        self.messages
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Fail every notification with `message`; nothing is recorded meanwhile
    pub fn fail_with(&self, message: impl Into<String>) {
        *self
            .failure
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(message.into());
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn notify(&self, chat_id: &str, text: &str) -> Result<()> {
        if let Some(message) = self
            .failure
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
        {
            return Err(Error::Remote(message));
        }
        self.messages
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push((chat_id.to_string(), text.to_string()));
        Ok(())
    }
}
