//! Reading note files off the canvas.
//!
//! Same split as a chat send: the session checks the node and hands out a
//! [`NoteJob`], the job does the storage I/O on its own, and the session
//! applies the [`NoteReply`] only if the node is still a note.

use log::debug;
use std::sync::Arc;

use crate::error::StorageError;
use crate::node::{NodeId, NodeUpdate, NoteFile, note_preview};
use crate::storage::Storage;

/// What a finished read does to the note.
#[derive(Debug, Clone, PartialEq)]
pub enum NoteRead {
    /// File read: new reference and preview.
    Loaded { file: NoteFile, preview: String },
    /// File no longer exists: the reference goes.
    Gone,
}

impl NoteRead {
    pub fn into_update(self) -> NodeUpdate {
        match self {
            NoteRead::Loaded { file, preview } => {
                NodeUpdate::content(preview).with_file(Some(file))
            }
            NoteRead::Gone => NodeUpdate {
                file: Some(None),
                ..NodeUpdate::default()
            },
        }
    }
}

#[derive(Debug)]
pub struct NoteReply {
    pub node_id: NodeId,
    pub read: Result<NoteRead, StorageError>,
}

pub struct NoteJob {
    node_id: NodeId,
    path: String,
    storage: Arc<dyn Storage>,
    /// Refreshes turn a vanished file into [`NoteRead::Gone`]; attaching
    /// a missing file is an error.
    detach_if_gone: bool,
}

impl NoteJob {
    pub fn attach(node_id: NodeId, path: impl Into<String>, storage: Arc<dyn Storage>) -> Self {
        Self {
            node_id,
            path: path.into(),
            storage,
            detach_if_gone: false,
        }
    }

    pub fn refresh(node_id: NodeId, path: impl Into<String>, storage: Arc<dyn Storage>) -> Self {
        Self {
            detach_if_gone: true,
            ..Self::attach(node_id, path, storage)
        }
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub async fn run(self) -> NoteReply {
        let read = self.read().await;
        NoteReply {
            node_id: self.node_id,
            read,
        }
    }

    async fn read(&self) -> Result<NoteRead, StorageError> {
        if self.detach_if_gone && !self.storage.exists(&self.path).await {
            debug!("note {}: {} is gone; clearing reference", self.node_id, self.path);
            return Ok(NoteRead::Gone);
        }
        let content = self.storage.read_to_string(&self.path).await?;
        let modified = self.storage.modified_time(&self.path).await?;
        Ok(NoteRead::Loaded {
            file: NoteFile::from_path(&self.path, modified),
            preview: note_preview(&content),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn storage_with(path: &str, content: &str) -> Arc<MemoryStorage> {
        let storage = Arc::new(MemoryStorage::new());
        storage.insert(path, content);
        storage
    }

    #[tokio::test]
    async fn test_attach_reads_preview() {
        let storage = storage_with("n/a.md", "hello");
        let reply = NoteJob::attach("note-1".into(), "n/a.md", storage).run().await;
        assert_eq!(reply.node_id, NodeId::from("note-1"));
        match reply.read.unwrap() {
            NoteRead::Loaded { file, preview } => {
                assert_eq!(file.basename, "a");
                assert_eq!(preview, "hello");
            }
            NoteRead::Gone => panic!("expected a loaded note"),
        }
    }

    #[tokio::test]
    async fn test_missing_file_errors_on_attach_but_detaches_on_refresh() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let attach = NoteJob::attach("n".into(), "gone.md", storage.clone()).run().await;
        assert!(matches!(attach.read, Err(StorageError::NotFound(_))));

        let refresh = NoteJob::refresh("n".into(), "gone.md", storage).run().await;
        assert_eq!(refresh.read.unwrap(), NoteRead::Gone);
    }

    #[test]
    fn test_gone_detaches_file() {
        let update = NoteRead::Gone.into_update();
        assert_eq!(update.file, Some(None));
        assert!(update.content.is_none());
    }
}
