use super::{
    ChildQuery, CreatedFile, DriveBackend, EntryKind, NewFile, RemoteEntry, StorageError,
    FOLDER_MIME,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

pub const ROOT: &str = "root";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ListChildren {
        parent_id: String,
        name: Option<String>,
        folders_only: bool,
    },
    GetParents(String),
    UpdateParents {
        id: String,
        add: String,
        remove: Vec<String>,
    },
    Rename {
        id: String,
        new_name: String,
    },
    Delete(String),
    CreateFile {
        name: String,
        parent_id: String,
        mime_type: String,
        size: usize,
    },
    ExportText(String),
    DownloadText(String),
}

#[derive(Default)]
struct State {
    // Insertion order doubles as backend list order.
    entries: Vec<RemoteEntry>,
    contents: HashMap<String, String>,
    calls: Vec<Call>,
    next_id: usize,
}

#[derive(Default)]
pub struct MemoryDrive {
    state: Mutex<State>,
    fail_with: Mutex<HashMap<&'static str, String>>,
}

impl MemoryDrive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_folder(&self, id: &str, name: &str, parent: &str) -> &Self {
        self.insert(RemoteEntry {
            id: id.to_string(),
            name: name.to_string(),
            kind: EntryKind::Folder,
            mime_type: Some(FOLDER_MIME.to_string()),
            size: None,
            parents: vec![parent.to_string()],
        });
        self
    }

    pub fn add_file(&self, id: &str, name: &str, parent: &str, mime_type: &str) -> &Self {
        self.insert(RemoteEntry {
            id: id.to_string(),
            name: name.to_string(),
            kind: EntryKind::File,
            mime_type: Some(mime_type.to_string()),
            size: Some(2048),
            parents: vec![parent.to_string()],
        });
        self
    }

    pub fn set_content(&self, id: &str, text: &str) -> &Self {
        self.state
            .lock()
            .unwrap()
            .contents
            .insert(id.to_string(), text.to_string());
        self
    }

    /// Makes every later call of `operation` fail with `message`.
    pub fn fail(&self, operation: &'static str, message: &str) -> &Self {
        self.fail_with
            .lock()
            .unwrap()
            .insert(operation, message.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn entry(&self, id: &str) -> Option<RemoteEntry> {
        self.state
            .lock()
            .unwrap()
            .entries
            .iter()
            .find(|e| e.id == id)
            .cloned()
    }

    fn insert(&self, entry: RemoteEntry) {
        self.state.lock().unwrap().entries.push(entry);
    }

    fn record(&self, operation: &'static str, call: Call) -> Result<(), StorageError> {
        self.state.lock().unwrap().calls.push(call);
        match self.fail_with.lock().unwrap().get(operation) {
            Some(message) => Err(StorageError::Api {
                status: 500,
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }

    fn with_entry<T>(
        &self,
        id: &str,
        f: impl FnOnce(&mut RemoteEntry) -> T,
    ) -> Result<T, StorageError> {
        let mut state = self.state.lock().unwrap();
        state
            .entries
            .iter_mut()
            .find(|e| e.id == id)
            .map(f)
            .ok_or_else(|| StorageError::NotFound(format!("File not found: {}", id)))
    }
}

#[async_trait]
impl DriveBackend for MemoryDrive {
    fn name(&self) -> String {
        "memory".to_string()
    }

    fn root_id(&self) -> String {
        ROOT.to_string()
    }

    async fn list_children(&self, query: &ChildQuery) -> Result<Vec<RemoteEntry>, StorageError> {
        self.record(
            "list_children",
            Call::ListChildren {
                parent_id: query.parent_id.clone(),
                name: query.name.clone(),
                folders_only: query.folders_only,
            },
        )?;
        let state = self.state.lock().unwrap();
        Ok(state
            .entries
            .iter()
            .filter(|e| e.parents.contains(&query.parent_id) && query.matches(e))
            .cloned()
            .collect())
    }

    async fn get_parents(&self, id: &str) -> Result<Vec<String>, StorageError> {
        self.record("get_parents", Call::GetParents(id.to_string()))?;
        self.with_entry(id, |e| e.parents.clone())
    }

    async fn update_parents(
        &self,
        id: &str,
        add_parent: &str,
        remove_parents: &[String],
    ) -> Result<(), StorageError> {
        self.record(
            "update_parents",
            Call::UpdateParents {
                id: id.to_string(),
                add: add_parent.to_string(),
                remove: remove_parents.to_vec(),
            },
        )?;
        self.with_entry(id, |e| {
            e.parents.retain(|p| !remove_parents.contains(p));
            e.parents.push(add_parent.to_string());
        })
    }

    async fn rename(&self, id: &str, new_name: &str) -> Result<(), StorageError> {
        self.record(
            "rename",
            Call::Rename {
                id: id.to_string(),
                new_name: new_name.to_string(),
            },
        )?;
        self.with_entry(id, |e| e.name = new_name.to_string())
    }

    async fn delete(&self, id: &str) -> Result<(), StorageError> {
        self.record("delete", Call::Delete(id.to_string()))?;
        let mut state = self.state.lock().unwrap();
        state.entries.retain(|e| e.id != id);
        Ok(())
    }

    async fn create_file(&self, file: NewFile) -> Result<CreatedFile, StorageError> {
        self.record(
            "create_file",
            Call::CreateFile {
                name: file.name.clone(),
                parent_id: file.parent_id.clone(),
                mime_type: file.mime_type.clone(),
                size: file.contents.len(),
            },
        )?;
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("new-{}", state.next_id);
        state.entries.push(RemoteEntry {
            id: id.clone(),
            name: file.name.clone(),
            kind: EntryKind::File,
            mime_type: Some(file.mime_type),
            size: Some(file.contents.len() as u64),
            parents: vec![file.parent_id],
        });
        Ok(CreatedFile {
            web_view_link: Some(format!("https://drive.example/{}", id)),
            id,
            name: file.name,
        })
    }

    async fn export_text(&self, id: &str) -> Result<String, StorageError> {
        self.record("export_text", Call::ExportText(id.to_string()))?;
        self.state
            .lock()
            .unwrap()
            .contents
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("File not found: {}", id)))
    }

    async fn download_text(&self, id: &str) -> Result<String, StorageError> {
        self.record("download_text", Call::DownloadText(id.to_string()))?;
        self.state
            .lock()
            .unwrap()
            .contents
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("File not found: {}", id)))
    }
}
