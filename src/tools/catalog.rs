//! Tool catalog
//!
//! The fixed, backend-neutral set of tools offered to the model. Each
//! adapter reshapes these definitions into its backend's declaration
//! format; the executor dispatches on the names.

use serde_json::json;

use crate::core::ToolDefinition;

/// Name of the completion-signal tool; its payload short-circuits the loop
pub const FINISH_TOOL: &str = "finish_work";

/// Build the full tool catalog
pub fn catalog() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition::new(
            "read_file",
            "Read the contents of a file in the workspace",
            json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Path relative to the workspace root"
                    }
                },
                "required": ["path"]
            }),
        ),
        ToolDefinition::new(
            "write_file",
            "Write content to a file, creating it and any parent directories as needed",
            json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Path relative to the workspace root"
                    },
                    "content": {
                        "type": "string",
                        "description": "Full content to write"
                    }
                },
                "required": ["path", "content"]
            }),
        ),
        ToolDefinition::new(
            "edit_file",
            "Replace an exact string in a file. The target must occur exactly once; \
             include enough surrounding context to make it unique. An empty \
             replacement deletes the target.",
            json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Path relative to the workspace root"
                    },
                    "target": {
                        "type": "string",
                        "description": "Exact text to replace"
                    },
                    "replacement": {
                        "type": "string",
                        "description": "Text to replace it with (empty string deletes)"
                    }
                },
                "required": ["path", "target", "replacement"]
            }),
        ),
        ToolDefinition::new(
            "delete_file",
            "Delete a file from the workspace",
            json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Path relative to the workspace root"
                    }
                },
                "required": ["path"]
            }),
        ),
        ToolDefinition::new(
            "list_directory",
            "List the entries of a directory, alphabetically",
            json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Directory relative to the workspace root (default: the root)"
                    }
                }
            }),
        ),
        ToolDefinition::new(
            "get_file_info",
            "Get existence, type, size, and line count of a path without reading it fully",
            json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Path relative to the workspace root"
                    }
                },
                "required": ["path"]
            }),
        ),
        ToolDefinition::new(
            "execute_command",
            "Run a shell command in the workspace and capture stdout, stderr, and the exit code. \
             Do not use this for version-control operations; commits are handled for you.",
            json!({
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "Shell command to run"
                    }
                },
                "required": ["command"]
            }),
        ),
        ToolDefinition::new(
            "search_files",
            "Search file contents for a pattern",
            json!({
                "type": "object",
                "properties": {
                    "pattern": {
                        "type": "string",
                        "description": "Pattern to search for"
                    },
                    "file_filter": {
                        "type": "string",
                        "description": "Optional filename glob to restrict the search (e.g. *.rs)"
                    }
                },
                "required": ["pattern"]
            }),
        ),
        ToolDefinition::new(
            "find_files",
            "Find files by name or glob pattern",
            json!({
                "type": "object",
                "properties": {
                    "pattern": {
                        "type": "string",
                        "description": "Filename or glob pattern (e.g. *.toml, config*)"
                    }
                },
                "required": ["pattern"]
            }),
        ),
        ToolDefinition::new(
            "view_diff",
            "Show uncommitted changes in the workspace against the last commit",
            json!({
                "type": "object",
                "properties": {}
            }),
        ),
        ToolDefinition::new(
            FINISH_TOOL,
            "Signal that the requested work is complete. Call this exactly once, when done.",
            json!({
                "type": "object",
                "properties": {
                    "title": {
                        "type": "string",
                        "description": "Short one-line title for the change"
                    },
                    "summary": {
                        "type": "string",
                        "description": "Longer summary of what was done and why"
                    }
                },
                "required": ["title", "summary"]
            }),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_has_eleven_tools_with_schemas() {
        let tools = catalog();
        assert_eq!(tools.len(), 11);
        for tool in &tools {
            assert_eq!(tool.input_schema["type"], "object");
            assert!(!tool.description.is_empty());
        }
        assert!(tools.iter().any(|t| t.name == FINISH_TOOL));
    }
}
