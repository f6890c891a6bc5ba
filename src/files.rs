//! File tool server operations, sandboxed to one root directory.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::Deserialize;
use serde_json::json;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, warn};

use crate::error::{Error, Result, ToolErrorKind};
use crate::protocol::{ToolCallResult, ToolDefinition};
use crate::tools::{parse_args, Tool, ToolRegistry};

pub const READ_FILE: &str = "read_file";
pub const WRITE_FILE: &str = "write_file";
pub const LIST_FILES: &str = "list_files";

type LockTable = Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>;

/// Files under a single root, with one exclusive lock per target path.
pub struct FileStore {
    root: PathBuf,
    locks: LockTable,
}

impl FileStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        let root = std::fs::canonicalize(&root)?;
        Ok(Self {
            root,
            locks: Mutex::new(HashMap::new()),
        })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a caller-supplied relative path into the root.
    ///
    /// The deepest existing ancestor of the target is resolved through any
    /// symlinks and must still lie under the root.
    async fn resolve(&self, tool: &str, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path.trim());
        if relative.as_os_str().is_empty() {
            return Err(Error::tool(tool, ToolErrorKind::InvalidArguments, "invalid arguments: empty path"));
        }
        let outside = || {
            Error::tool(
                tool,
                ToolErrorKind::PermissionDenied,
                format!("permission denied: {} is outside the allowed directory", path),
            )
        };
        for component in relative.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => return Err(outside()),
            }
        }

        let target = self.root.join(relative);
        for ancestor in target.ancestors() {
            match tokio::fs::canonicalize(ancestor).await {
                Ok(real) if real.starts_with(&self.root) => break,
                Ok(real) => {
                    warn!(path = %path, resolved = %real.display(), "Rejected path leaving the root");
                    return Err(outside());
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    // A dangling symlink would be followed on write
                    if tokio::fs::symlink_metadata(ancestor).await.is_ok() {
                        return Err(outside());
                    }
                }
                Err(e) => return Err(io_error(tool, path, e)),
            }
        }
        Ok(target)
    }

    async fn lock(&self, tool: &str, target: &Path) -> Result<PathLock<'_>> {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .map_err(|_| Error::tool(tool, ToolErrorKind::Internal, "lock table poisoned"))?;
            locks.entry(target.to_path_buf()).or_default().clone()
        };
        Ok(PathLock {
            table: &self.locks,
            target: target.to_path_buf(),
            guard: Some(lock.lock_owned().await),
        })
    }

    /// Replace the content of `path`, returning the number of bytes written.
    pub async fn write(&self, path: &str, content: &str) -> Result<usize> {
        let target = self.resolve(WRITE_FILE, path).await?;
        let _lock = self.lock(WRITE_FILE, &target).await?;

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(WRITE_FILE, path, e))?;
        }
        tokio::fs::write(&target, content.as_bytes())
            .await
            .map_err(|e| io_error(WRITE_FILE, path, e))?;

        debug!(path = %target.display(), bytes = content.len(), "file written");
        Ok(content.len())
    }

    /// Read the content of `path`.
    pub async fn read(&self, path: &str) -> Result<String> {
        let target = self.resolve(READ_FILE, path).await?;
        let _lock = self.lock(READ_FILE, &target).await?;

        tokio::fs::read_to_string(&target)
            .await
            .map_err(|e| io_error(READ_FILE, path, e))
    }

    /// Every file under the root, as sorted relative paths.
    pub async fn list(&self) -> Result<Vec<String>> {
        let mut found = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                } else if let Ok(rel) = path.strip_prefix(&self.root) {
                    found.push(rel.to_string_lossy().replace('\\', "/"));
                }
            }
        }

        found.sort();
        Ok(found)
    }
}

/// Exclusive hold on one path. The table entry goes away with the last holder.
struct PathLock<'a> {
    table: &'a LockTable,
    target: PathBuf,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for PathLock<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        if let Ok(mut locks) = self.table.lock() {
            let unused = locks
                .get(&self.target)
                .is_some_and(|lock| Arc::strong_count(lock) == 1);
            if unused {
                locks.remove(&self.target);
            }
        }
    }
}

fn io_error(tool: &str, path: &str, err: std::io::Error) -> Error {
    let kind = match err.kind() {
        std::io::ErrorKind::NotFound => ToolErrorKind::FileNotFound,
        std::io::ErrorKind::PermissionDenied => ToolErrorKind::PermissionDenied,
        _ => ToolErrorKind::Internal,
    };
    let message = match kind {
        ToolErrorKind::FileNotFound => format!("file not found: {}", path),
        ToolErrorKind::PermissionDenied => format!("permission denied: {}", path),
        _ => format!("{}: {}", path, err),
    };
    Error::tool(tool, kind, message)
}

/// Registry for the file server.
pub fn registry(store: FileStore) -> ToolRegistry {
    let store = Arc::new(store);
    ToolRegistry::new()
        .with(Arc::new(ReadFileTool {
            store: store.clone(),
        }))
        .with(Arc::new(WriteFileTool {
            store: store.clone(),
        }))
        .with(Arc::new(ListFilesTool { store }))
}

pub struct ReadFileTool {
    store: Arc<FileStore>,
}

#[derive(Debug, Deserialize)]
struct ReadFileArgs {
    path: String,
}

#[async_trait::async_trait]
impl Tool for ReadFileTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: READ_FILE.into(),
            description: "Read a text file from the output directory.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Path relative to the output directory"
                    }
                },
                "required": ["path"]
            }),
        }
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolCallResult> {
        let args: ReadFileArgs = parse_args(READ_FILE, arguments)?;
        let content = self.store.read(&args.path).await?;
        Ok(ToolCallResult::structured(
            content.clone(),
            json!({ "path": args.path, "content": content }),
        ))
    }
}

pub struct WriteFileTool {
    store: Arc<FileStore>,
}

#[derive(Debug, Deserialize)]
struct WriteFileArgs {
    path: String,
    content: String,
}

#[async_trait::async_trait]
impl Tool for WriteFileTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: WRITE_FILE.into(),
            description: "Write text to a file in the output directory, replacing any previous content.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Path relative to the output directory"
                    },
                    "content": {
                        "type": "string",
                        "description": "Text to write"
                    }
                },
                "required": ["path", "content"]
            }),
        }
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolCallResult> {
        let args: WriteFileArgs = parse_args(WRITE_FILE, arguments)?;
        let bytes = self.store.write(&args.path, &args.content).await?;
        Ok(ToolCallResult::structured(
            format!("Wrote {} bytes to {}", bytes, args.path),
            json!({ "path": args.path, "bytes": bytes }),
        ))
    }
}

pub struct ListFilesTool {
    store: Arc<FileStore>,
}

#[async_trait::async_trait]
impl Tool for ListFilesTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: LIST_FILES.into(),
            description: "List files in the output directory.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
        }
    }

    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolCallResult> {
        let files = self.store.list().await?;
        Ok(ToolCallResult::structured(
            files.join("\n"),
            json!({ "files": files }),
        ))
    }
}
