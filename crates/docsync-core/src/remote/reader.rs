//! Reads a remote document back into Markdown

use super::{BoxFuture, DocumentStore};
use crate::error::Result;
use crate::markdown::blocks_to_markdown;
use crate::models::{Block, BlockKind, TableCell, TableGrid, TextRun};

/// Markdown rendering of a remote document plus its version information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSnapshot {
    pub content: String,
    pub revision_id: Option<i64>,
    pub update_time: Option<i64>,
    pub title: String,
}

/// Fetch metadata and content of `document_id` and render it as Markdown.
///
/// Any listing failure aborts the read; a partial document is never returned.
pub async fn fetch_remote_markdown(
    store: &dyn DocumentStore,
    document_id: &str,
    max_depth: usize,
) -> Result<RemoteSnapshot> {
    let metadata = store.get_metadata(document_id).await?;
    let blocks = fetch_content_blocks(store, document_id, max_depth).await?;
    tracing::debug!(document_id, blocks = blocks.len(), "Read remote document");

    Ok(RemoteSnapshot {
        content: blocks_to_markdown(&blocks),
        revision_id: metadata.revision_id,
        update_time: metadata.update_time,
        title: metadata.title,
    })
}

/// Flattened content blocks of a document in reading order
pub async fn fetch_content_blocks(
    store: &dyn DocumentStore,
    document_id: &str,
    max_depth: usize,
) -> Result<Vec<Block>> {
    let top_blocks = store.list_top_blocks(document_id).await?;
    let Some(page) = top_blocks
        .iter()
        .find(|block| matches!(block.kind, BlockKind::Page))
    else {
        tracing::warn!(document_id, "No page block found, using top-level blocks");
        return Ok(top_blocks);
    };

    collect_children(store, document_id, &page.block_id, 0, max_depth).await
}

/// Depth-first walk of the children of `block_id`.
///
/// `depth` is the nesting level of the children being listed. Levels past
/// `max_depth` are dropped with a warning. List items without an explicit
/// indent take their nesting level as indent; table cells are folded into
/// their table instead of being emitted.
pub fn collect_children<'a>(
    store: &'a dyn DocumentStore,
    document_id: &'a str,
    block_id: &'a str,
    depth: usize,
    max_depth: usize,
) -> BoxFuture<'a, Result<Vec<Block>>> {
    Box::pin(async move {
        if depth > max_depth {
            tracing::warn!(document_id, block_id, depth, "Max block depth reached");
            return Ok(Vec::new());
        }

        let children = store.list_block_children(document_id, block_id).await?;
        let mut flattened = Vec::with_capacity(children.len());

        for mut child in children {
            if child.indent == 0 && child.kind.is_list_item() {
                child.indent = u8::try_from(depth).unwrap_or(u8::MAX);
            }

            if child.has_children() {
                if let BlockKind::Table(grid) = &mut child.kind {
                    fold_table_cells(store, document_id, &child.block_id, grid).await?;
                    flattened.push(child);
                    continue;
                }
            }

            let nested = if child.has_children() {
                collect_children(store, document_id, &child.block_id, depth + 1, max_depth)
                    .await?
            } else {
                Vec::new()
            };
            flattened.push(child);
            flattened.extend(nested);
        }

        Ok(flattened)
    })
}

/// Fill `grid` from the cell blocks under a table, row-major
async fn fold_table_cells(
    store: &dyn DocumentStore,
    document_id: &str,
    table_id: &str,
    grid: &mut TableGrid,
) -> Result<()> {
    if grid.columns == 0 || !grid.cells.is_empty() {
        return Ok(());
    }

    let cells = store.list_block_children(document_id, table_id).await?;
    for (index, cell) in cells
        .iter()
        .filter(|cell| matches!(cell.kind, BlockKind::TableCell))
        .enumerate()
    {
        let mut runs: Vec<TextRun> = Vec::new();
        if cell.has_children() {
            let contents = store
                .list_block_children(document_id, &cell.block_id)
                .await?;
            for (position, block) in contents.iter().enumerate() {
                if position > 0 {
                    runs.push(TextRun::plain(" "));
                }
                runs.extend(block.kind.runs().unwrap_or_default().iter().cloned());
            }
        }
        grid.cells.push(TableCell {
            row: index / grid.columns,
            column: index % grid.columns,
            runs,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{DocumentStore, MemoryDocumentStore};
    use pretty_assertions::assert_eq;

    fn text(content: &str) -> Block {
        Block::new(BlockKind::Text {
            runs: vec![TextRun::plain(content)],
        })
    }

    fn bullet(content: &str) -> Block {
        Block::new(BlockKind::Bullet {
            runs: vec![TextRun::plain(content)],
        })
    }

    #[tokio::test]
    async fn reads_nested_lists_with_depth_as_indent() {
        let store = MemoryDocumentStore::new();
        let doc = store.create_document("T").await.unwrap().document_id;
        let top = store.insert_child(&doc, &doc, bullet("top")).unwrap();
        let nested = store.insert_child(&doc, &top, bullet("nested")).unwrap();
        store.insert_child(&doc, &nested, bullet("deeper")).unwrap();
        store.insert_child(&doc, &doc, text("after")).unwrap();

        let snapshot = fetch_remote_markdown(&store, &doc, 5).await.unwrap();

        assert_eq!(snapshot.content, "- top\n  - nested\n    - deeper\n\nafter");
        assert_eq!(snapshot.title, "T");
    }

    #[tokio::test]
    async fn depth_cap_drops_deeper_levels() {
        let store = MemoryDocumentStore::new();
        let doc = store.create_document("T").await.unwrap().document_id;
        let mut parent = doc.clone();
        for level in 0..8 {
            parent = store
                .insert_child(&doc, &parent, text(&format!("level {level}")))
                .unwrap();
        }

        let blocks = collect_children(&store, &doc, &doc, 0, 2).await.unwrap();
        assert_eq!(blocks.len(), 3);

        let blocks = collect_children(&store, &doc, &doc, 0, 5).await.unwrap();
        assert_eq!(blocks.len(), 6);
    }

    #[tokio::test]
    async fn folds_table_cells_row_major() {
        let store = MemoryDocumentStore::new();
        let doc = store.create_document("T").await.unwrap().document_id;
        let table = store
            .insert_child(
                &doc,
                &doc,
                Block::new(BlockKind::Table(TableGrid {
                    rows: 2,
                    columns: 2,
                    cells: Vec::new(),
                })),
            )
            .unwrap();
        for value in ["a", "b", "c", "d"] {
            let cell = store
                .insert_child(&doc, &table, Block::new(BlockKind::TableCell))
                .unwrap();
            store.insert_child(&doc, &cell, text(value)).unwrap();
        }

        let snapshot = fetch_remote_markdown(&store, &doc, 5).await.unwrap();

        assert_eq!(snapshot.content, "| a | b |\n| --- | --- |\n| c | d |");
    }

    #[tokio::test]
    async fn listing_failures_propagate() {
        let store = MemoryDocumentStore::new();
        let doc = store.create_document("T").await.unwrap().document_id;
        store.insert_child(&doc, &doc, text("x")).unwrap();
        store.fail_reads("network down");

        let error = fetch_remote_markdown(&store, &doc, 5).await.unwrap_err();
        assert!(error.to_string().contains("network down"));
    }

    #[tokio::test]
    async fn reports_revision_of_document() {
        let store = MemoryDocumentStore::new();
        let doc = store.create_document("T").await.unwrap().document_id;
        let before = store.get_metadata(&doc).await.unwrap().revision_id;

        store.replace_content(&doc, "# changed").unwrap();
        let snapshot = fetch_remote_markdown(&store, &doc, 5).await.unwrap();

        assert_eq!(snapshot.content, "# changed");
        assert!(snapshot.revision_id > before);
    }
}
