//! Remote rich-document surface: the store and notifier seams plus helpers built on them

mod http;
mod memory;
mod reader;
mod wire;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::EditorConfig;
use crate::error::{Error, Result};
use crate::markdown::{blocks_to_markdown, markdown_to_blocks};
use crate::models::Block;

pub use http::{ApiClient, HttpDocumentStore, HttpNotifier};
pub use memory::{MemoryDocumentStore, MemoryNotifier};
pub use reader::{collect_children, fetch_content_blocks, fetch_remote_markdown, RemoteSnapshot};
pub use wire::{code_language_id, code_language_name, decode_block, encode_block};

/// A newly created remote document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentHandle {
    pub document_id: String,
    pub url: String,
}

/// Version information of a remote document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentMetadata {
    pub revision_id: Option<i64>,
    /// Last update (Unix seconds), when the surface reports one
    pub update_time: Option<i64>,
    pub title: String,
}

/// Remote document store consumed by the sync engine.
///
/// Listing operations return every page of results; callers never see
/// pagination tokens.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create an empty document with the given title
    async fn create_document(&self, title: &str) -> Result<DocumentHandle>;

    /// Append blocks as children of `parent_id`, which is the document id
    /// for the root block.
    ///
    /// `insert_index` of `None` appends at the end. Returns the ids of the
    /// created blocks in request order. Only the kind and content of each
    /// block are sent; indent and children are not.
    async fn append_blocks(
        &self,
        document_id: &str,
        parent_id: &str,
        blocks: &[Block],
        insert_index: Option<usize>,
    ) -> Result<Vec<String>>;

    /// Every block of the document, root first
    async fn list_top_blocks(&self, document_id: &str) -> Result<Vec<Block>>;

    /// Direct children of one block, in document order
    async fn list_block_children(&self, document_id: &str, block_id: &str) -> Result<Vec<Block>>;

    async fn get_metadata(&self, document_id: &str) -> Result<DocumentMetadata>;
}

/// Chat notification sink. Callers log failures and carry on.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, chat_id: &str, text: &str) -> Result<()>;
}

/// Notifier that only writes to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, chat_id: &str, text: &str) -> Result<()> {
        tracing::info!(chat_id, "{text}");
        Ok(())
    }
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A block to upload together with the blocks nested under it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockTree {
    pub block: Block,
    pub children: Vec<BlockTree>,
}

impl BlockTree {
    const fn leaf(block: Block) -> Self {
        Self {
            block,
            children: Vec::new(),
        }
    }
}

/// Nest indented list items under the list item above them.
///
/// The remote surface expresses list depth only through parent blocks, so
/// every returned block has its indent cleared. Non-list blocks always end
/// up at the top level.
pub fn nest_list_items(blocks: Vec<Block>) -> Vec<BlockTree> {
    let mut roots = Vec::new();
    let mut open: Vec<(u8, BlockTree)> = Vec::new();

    for mut block in blocks {
        if !block.kind.is_list_item() {
            close_list_items(&mut open, &mut roots, 0);
            roots.push(BlockTree::leaf(block));
            continue;
        }
        let depth = block.indent;
        close_list_items(&mut open, &mut roots, depth);
        block.indent = 0;
        open.push((depth, BlockTree::leaf(block)));
    }
    close_list_items(&mut open, &mut roots, 0);
    roots
}

/// Pop open list items at `min_depth` or deeper into their parents
fn close_list_items(open: &mut Vec<(u8, BlockTree)>, roots: &mut Vec<BlockTree>, min_depth: u8) {
    while open.last().is_some_and(|(depth, _)| *depth >= min_depth) {
        let Some((_, node)) = open.pop() else {
            break;
        };
        match open.last_mut() {
            Some((_, parent)) => parent.children.push(node),
            None => roots.push(node),
        }
    }
}

/// Render `markdown` the way it reads back from the remote surface after
/// [`upload_markdown`].
///
/// Two files that normalize to the same text produce the same document.
pub fn normalize_markdown(markdown: &str) -> String {
    let mut blocks = Vec::new();
    flatten_tree(&nest_list_items(markdown_to_blocks(markdown)), 0, &mut blocks);
    blocks_to_markdown(&blocks)
}

fn flatten_tree(nodes: &[BlockTree], depth: u8, flattened: &mut Vec<Block>) {
    for node in nodes {
        let mut block = decode_block(&encode_block(&node.block));
        if block.kind.is_list_item() {
            block.indent = depth;
        }
        flattened.push(block);
        flatten_tree(&node.children, depth.saturating_add(1), flattened);
    }
}

/// Convert `markdown` to blocks and append them to `document_id` in batches.
///
/// Nested list items are appended under the block created for their parent
/// item, one level at a time. Returns the number of blocks appended.
pub async fn upload_markdown(
    store: &dyn DocumentStore,
    document_id: &str,
    markdown: &str,
    config: &EditorConfig,
) -> Result<usize> {
    let tree = nest_list_items(markdown_to_blocks(markdown));
    append_tree(store, document_id, document_id, &tree, config).await
}

fn append_tree<'a>(
    store: &'a dyn DocumentStore,
    document_id: &'a str,
    parent_id: &'a str,
    nodes: &'a [BlockTree],
    config: &'a EditorConfig,
) -> BoxFuture<'a, Result<usize>> {
    Box::pin(async move {
        let blocks: Vec<Block> = nodes.iter().map(|node| node.block.clone()).collect();
        let ids = append_in_batches(
            store,
            document_id,
            parent_id,
            &blocks,
            config.append_batch_size,
            config.append_batch_delay,
        )
        .await?;

        let mut appended = nodes.len();
        for (index, node) in nodes.iter().enumerate() {
            if node.children.is_empty() {
                continue;
            }
            let Some(block_id) = ids.get(index) else {
                return Err(Error::Remote(format!(
                    "No block id returned for nested list under {parent_id}"
                )));
            };
            appended += append_tree(store, document_id, block_id, &node.children, config).await?;
        }
        Ok(appended)
    })
}

async fn append_in_batches(
    store: &dyn DocumentStore,
    document_id: &str,
    parent_id: &str,
    blocks: &[Block],
    batch_size: usize,
    delay: Duration,
) -> Result<Vec<String>> {
    let batch_size = batch_size.max(1);
    let batch_count = blocks.len().div_ceil(batch_size);
    let mut ids = Vec::with_capacity(blocks.len());

    for (index, batch) in blocks.chunks(batch_size).enumerate() {
        tracing::debug!(
            document_id,
            parent_id,
            batch = index + 1,
            batch_count,
            blocks = batch.len(),
            "Appending block batch"
        );
        ids.extend(store.append_blocks(document_id, parent_id, batch, None).await?);

        if index + 1 < batch_count && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
    Ok(ids)
}
