//! File tools (`readFile`, `listDirectory`, `searchFiles`, `getFileInfo`):
//! spec.md §4.2's path-confined filesystem surface. Path safety is enforced
//! inside each tool via `sage_tools::confine`, not by the caller (spec.md
//! §5's shared-resource note: this is the one security-critical invariant
//! the tool itself must hold).

use async_trait::async_trait;
use serde_json::json;
use tokio::io::AsyncReadExt;

use sage_tools::{confine, truncate_with_marker};

use super::{ToolContext, ToolDescriptor};

fn path_arg(args: &serde_json::Value, key: &str) -> anyhow::Result<String> {
    args.get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow::anyhow!("'{key}' argument required"))
}

pub struct ReadFileTool {
    max_chars: usize,
}

impl ReadFileTool {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }
}

#[async_trait]
impl ToolDescriptor for ReadFileTool {
    fn name(&self) -> &str {
        "readFile"
    }

    fn description(&self) -> &str {
        "Read the UTF-8 contents of a file within the allowed directory, truncated to a \
         maximum length."
    }

    fn parameter_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {"path": {"type": "string", "description": "Path relative to the allowed directory"}},
            "required": ["path"]
        })
    }

    async fn invoke(&self, args: serde_json::Value, ctx: &ToolContext) -> anyhow::Result<String> {
        let path = path_arg(&args, "path")?;
        let resolved = confine(&ctx.allowed_directory, &path)?;

        let mut file = tokio::fs::File::open(&resolved).await?;
        let mut content = String::new();
        file.read_to_string(&mut content).await?;

        Ok(truncate_with_marker(&content, self.max_chars))
    }
}

pub struct ListDirectoryTool;

#[async_trait]
impl ToolDescriptor for ListDirectoryTool {
    fn name(&self) -> &str {
        "listDirectory"
    }

    fn description(&self) -> &str {
        "List the entries of a directory within the allowed directory, one line per entry \
         with a kind marker and, for files, a size."
    }

    fn parameter_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {"path": {"type": "string", "description": "Path relative to the allowed directory"}},
            "required": ["path"]
        })
    }

    async fn invoke(&self, args: serde_json::Value, ctx: &ToolContext) -> anyhow::Result<String> {
        let path = path_arg(&args, "path")?;
        let resolved = confine(&ctx.allowed_directory, &path)?;

        let mut entries = tokio::fs::read_dir(&resolved).await?;
        let mut lines = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if metadata.is_dir() {
                lines.push(format!("[dir]  {name}"));
            } else {
                lines.push(format!("[file] {name} ({} bytes)", metadata.len()));
            }
        }
        lines.sort();

        if lines.is_empty() {
            Ok("(empty directory)".to_string())
        } else {
            Ok(lines.join("\n"))
        }
    }
}

pub struct SearchFilesTool {
    content_search_max_bytes: u64,
}

impl SearchFilesTool {
    pub fn new(content_search_max_bytes: u64) -> Self {
        Self {
            content_search_max_bytes,
        }
    }
}

#[async_trait]
impl ToolDescriptor for SearchFilesTool {
    fn name(&self) -> &str {
        "searchFiles"
    }

    fn description(&self) -> &str {
        "Recursively search the allowed directory for files whose name or (for small files) \
         content contains a keyword, case-insensitively."
    }

    fn parameter_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "keyword": {"type": "string"},
                "path": {"type": "string", "description": "Directory to search, relative to the allowed directory"}
            },
            "required": ["keyword", "path"]
        })
    }

    async fn invoke(&self, args: serde_json::Value, ctx: &ToolContext) -> anyhow::Result<String> {
        let keyword = path_arg(&args, "keyword")?.to_lowercase();
        let path = path_arg(&args, "path")?;
        let root = confine(&ctx.allowed_directory, &path)?;

        let mut matches = Vec::new();
        let mut stack = vec![root];
        while let Some(dir) = stack.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(e) => e,
                Err(_) => continue,
            };
            while let Ok(Some(entry)) = entries.next_entry().await {
                let entry_path = entry.path();
                let metadata = match entry.metadata().await {
                    Ok(m) => m,
                    Err(_) => continue,
                };

                if metadata.is_dir() {
                    stack.push(entry_path);
                    continue;
                }

                let name = entry.file_name().to_string_lossy().to_lowercase();
                let name_matches = name.contains(&keyword);
                let content_matches = if !name_matches && metadata.len() <= self.content_search_max_bytes {
                    tokio::fs::read_to_string(&entry_path)
                        .await
                        .map(|content| content.to_lowercase().contains(&keyword))
                        .unwrap_or(false)
                } else {
                    false
                };

                if name_matches || content_matches {
                    matches.push(entry_path.display().to_string());
                }
            }
        }
        matches.sort();

        if matches.is_empty() {
            Ok(format!("No files matched keyword '{keyword}'."))
        } else {
            Ok(matches.join("\n"))
        }
    }
}

pub struct GetFileInfoTool;

#[async_trait]
impl ToolDescriptor for GetFileInfoTool {
    fn name(&self) -> &str {
        "getFileInfo"
    }

    fn description(&self) -> &str {
        "Return the name, absolute path, size, kind, and extension of a file or directory \
         within the allowed directory."
    }

    fn parameter_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {"path": {"type": "string", "description": "Path relative to the allowed directory"}},
            "required": ["path"]
        })
    }

    async fn invoke(&self, args: serde_json::Value, ctx: &ToolContext) -> anyhow::Result<String> {
        let path = path_arg(&args, "path")?;
        let resolved = confine(&ctx.allowed_directory, &path)?;
        let metadata = tokio::fs::metadata(&resolved).await?;

        let name = resolved
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = resolved
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_else(|| "(none)".to_string());
        let kind = if metadata.is_dir() { "directory" } else { "file" };

        Ok(format!(
            "name: {name}\npath: {}\nsize: {} bytes\nkind: {kind}\nextension: {extension}",
            resolved.display(),
            metadata.len()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[tokio::test]
    async fn read_file_rejects_path_escape() {
        let allowed = Path::new("/tmp/nonexistent-allowed-dir-for-tests");
        let result = confine(allowed, "../../etc/passwd");
        assert!(result.is_err());
    }

    #[test]
    fn parameter_schemas_require_path() {
        assert_eq!(ReadFileTool::new(100).parameter_schema()["required"][0], "path");
        assert_eq!(ListDirectoryTool.parameter_schema()["required"][0], "path");
        assert_eq!(GetFileInfoTool.parameter_schema()["required"][0], "path");
    }
}
