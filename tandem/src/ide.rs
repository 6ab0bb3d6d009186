//! IDE tool mapping: translate IDE-flavored tool calls into the canonical
//! vocabulary the executor was probed against, and compute out-of-band tool
//! extensions.
//!
//! The IDE is named by a trailing suffix on the request's model string
//! (`qwen2.5-7b:cursor`). Mapping documents can be loaded from
//! `ide-mappings/<ide>.json`; built-in defaults cover the known IDEs.
//! Applying the mapper to a canonical call is a no-op.

use std::collections::HashMap;
use std::path::Path;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::message::{ToolCall, ToolSpec};
use crate::persist::{self, StoreError};

/// IDE suffixes recognized on model strings.
pub const KNOWN_IDES: &[&str] = &["continue", "cursor", "copilot", "windsurf", "zed", "vscode"];

/// The canonical tool vocabulary models are probed against.
pub static CANONICAL_TOOLS: Lazy<Vec<ToolSpec>> = Lazy::new(|| {
    vec![
        ToolSpec::new(
            "read_file",
            "Reads a file from the workspace.",
            json!({"type":"object","properties":{"path":{"type":"string"}},"required":["path"]}),
        ),
        ToolSpec::new(
            "write_file",
            "Writes content to a file in the workspace.",
            json!({"type":"object","properties":{"path":{"type":"string"},"content":{"type":"string"}},"required":["path","content"]}),
        ),
        ToolSpec::new(
            "edit_file",
            "Applies a list of text edits to a file.",
            json!({"type":"object","properties":{
                "path":{"type":"string"},
                "edits":{"type":"array","items":{"type":"object","properties":{
                    "oldText":{"type":"string"},"newText":{"type":"string"}},
                    "required":["oldText","newText"]}}},
                "required":["path","edits"]}),
        ),
        ToolSpec::new(
            "list_directory",
            "Lists the entries of a directory.",
            json!({"type":"object","properties":{"path":{"type":"string"}},"required":["path"]}),
        ),
        ToolSpec::new(
            "search_code",
            "Searches the indexed codebase semantically.",
            json!({"type":"object","properties":{"query":{"type":"string"},"limit":{"type":"number"}},"required":["query"]}),
        ),
        ToolSpec::new(
            "run_command",
            "Runs a shell command in the workspace.",
            json!({"type":"object","properties":{"command":{"type":"string"}},"required":["command"]}),
        ),
        ToolSpec::new(
            "rag_query",
            "Queries the semantic index for relevant code snippets.",
            json!({"type":"object","properties":{"query":{"type":"string"},"limit":{"type":"number"}},"required":["query"]}),
        ),
    ]
});

pub fn canonical_tool(name: &str) -> Option<&'static ToolSpec> {
    CANONICAL_TOOLS.iter().find(|t| t.name == name)
}

/// Splits a trailing IDE suffix off a model string. Accepts `model:ide` and
/// `model-ide`; anything else passes through untouched.
pub fn parse_ide_suffix(model: &str) -> (&str, Option<&'static str>) {
    if let Some((base, suffix)) = model.rsplit_once(':') {
        if let Some(ide) = KNOWN_IDES.iter().find(|i| suffix.eq_ignore_ascii_case(i)) {
            return (base, Some(ide));
        }
    }
    if let Some((base, suffix)) = model.rsplit_once('-') {
        if let Some(ide) = KNOWN_IDES.iter().find(|i| suffix.eq_ignore_ascii_case(i)) {
            return (base, Some(ide));
        }
    }
    (model, None)
}

/// One IDE tool's translation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolMappingEntry {
    pub canonical: String,
    /// IDE parameter name → canonical parameter name.
    #[serde(default)]
    pub param_renames: HashMap<String, String>,
    /// Named transform applied after renames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<String>,
}

/// What to do with a tool the IDE owns outright.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdeOnlyBehavior {
    Passthrough,
    Ignore,
}

/// A full mapping document for one IDE.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct IdeMapping {
    #[serde(default)]
    pub ide: String,
    #[serde(default)]
    pub tools: HashMap<String, ToolMappingEntry>,
    #[serde(default)]
    pub ide_only: HashMap<String, IdeOnlyBehavior>,
    #[serde(default)]
    pub browser_tools: HashMap<String, ToolMappingEntry>,
}

/// The verdict for one emitted tool call.
#[derive(Clone, Debug, PartialEq)]
pub enum MappedCall {
    /// Canonical already, or a plain rename; execute as-is.
    Execute(ToolCall),
    /// Parameters were rewritten by renames or a named transform.
    Transformed(ToolCall),
    /// The IDE owns this tool; hand the call back untouched.
    Passthrough(ToolCall),
    Unknown(ToolCall),
}

impl MappedCall {
    pub fn call(&self) -> &ToolCall {
        match self {
            MappedCall::Execute(c)
            | MappedCall::Transformed(c)
            | MappedCall::Passthrough(c)
            | MappedCall::Unknown(c) => c,
        }
    }
}

fn entry(canonical: &str, renames: &[(&str, &str)], transform: Option<&str>) -> ToolMappingEntry {
    ToolMappingEntry {
        canonical: canonical.to_string(),
        param_renames: renames
            .iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect(),
        transform: transform.map(String::from),
    }
}

/// Built-in mapping tables. External `ide-mappings/<ide>.json` documents
/// override these when present.
fn builtin_mapping(ide: Option<&str>) -> IdeMapping {
    let mut tools = HashMap::new();
    let mut ide_only = HashMap::new();

    match ide {
        Some("continue") => {
            tools.insert(
                "builtin_read_file".to_string(),
                entry("read_file", &[("filepath", "path")], None),
            );
            tools.insert(
                "builtin_create_new_file".to_string(),
                entry("write_file", &[("filepath", "path"), ("contents", "content")], None),
            );
            tools.insert(
                "builtin_exact_search".to_string(),
                entry("search_code", &[("pattern", "query")], None),
            );
            ide_only.insert("builtin_view_diff".to_string(), IdeOnlyBehavior::Passthrough);
        }
        Some("cursor") => {
            tools.insert(
                "codebase_search".to_string(),
                entry("search_code", &[], None),
            );
            tools.insert(
                "search_replace".to_string(),
                entry("edit_file", &[], Some("find_replace_to_edits")),
            );
            ide_only.insert("open_diff".to_string(), IdeOnlyBehavior::Passthrough);
        }
        Some("copilot") => {
            tools.insert(
                "get_file".to_string(),
                entry("read_file", &[("file", "path")], None),
            );
            tools.insert(
                "str_replace".to_string(),
                entry("edit_file", &[], Some("find_replace_to_edits")),
            );
        }
        Some("windsurf") => {
            tools.insert(
                "view_file".to_string(),
                entry("read_file", &[("AbsolutePath", "path")], None),
            );
            tools.insert(
                "grep_search".to_string(),
                entry("search_code", &[("Query", "query")], None),
            );
        }
        Some("zed") | Some("vscode") => {
            tools.insert(
                "find_replace".to_string(),
                entry("edit_file", &[], Some("find_replace_to_edits")),
            );
        }
        _ => {}
    }

    IdeMapping {
        ide: ide.unwrap_or("default").to_string(),
        tools,
        ide_only,
        browser_tools: HashMap::new(),
    }
}

/// Named parameter transforms.
///
/// `find_replace_to_edits`: `{find, replace}` (or `{old_string, new_string}`)
/// → `{path?, edits: [{oldText, newText}]}`.
fn apply_transform(name: &str, args: &Value) -> Option<Value> {
    match name {
        "find_replace_to_edits" => {
            let old = args
                .get("find")
                .or_else(|| args.get("old_string"))
                .or_else(|| args.get("oldText"))?
                .clone();
            let new = args
                .get("replace")
                .or_else(|| args.get("new_string"))
                .or_else(|| args.get("newText"))?
                .clone();
            let mut out = json!({ "edits": [{ "oldText": old, "newText": new }] });
            if let Some(path) = args.get("path").or_else(|| args.get("file")) {
                out["path"] = path.clone();
            }
            Some(out)
        }
        _ => None,
    }
}

/// Per-turn mapper for one IDE.
pub struct IdeMapper {
    mapping: IdeMapping,
}

impl IdeMapper {
    /// Mapper with the built-in table for `ide` (or the default table).
    pub fn builtin(ide: Option<&str>) -> Self {
        Self {
            mapping: builtin_mapping(ide),
        }
    }

    /// Mapper over an already-loaded mapping document (e.g. from a cache).
    pub fn from_mapping(mapping: IdeMapping) -> Self {
        Self { mapping }
    }

    /// Loads `ide-mappings/<ide>.json` under `data_root`, falling back to
    /// the built-in table.
    pub async fn load(data_root: &Path, ide: Option<&str>) -> Result<Self, StoreError> {
        if let Some(ide) = ide {
            let path = data_root.join("ide-mappings").join(format!("{ide}.json"));
            if let Some(mapping) = persist::read_json::<IdeMapping>(&path).await? {
                return Ok(Self { mapping });
            }
        }
        Ok(Self::builtin(ide))
    }

    pub fn mapping(&self) -> &IdeMapping {
        &self.mapping
    }

    /// Decides what to do with one emitted tool call.
    pub fn map_tool_call(&self, call: &ToolCall) -> MappedCall {
        // Canonical already: a no-op.
        if canonical_tool(&call.name).is_some() {
            return MappedCall::Execute(call.clone());
        }
        if let Some(entry) = self
            .mapping
            .tools
            .get(&call.name)
            .or_else(|| self.mapping.browser_tools.get(&call.name))
        {
            return self.translate(call, entry);
        }
        if self.mapping.ide_only.contains_key(&call.name) {
            return MappedCall::Passthrough(call.clone());
        }
        MappedCall::Unknown(call.clone())
    }

    fn translate(&self, call: &ToolCall, entry: &ToolMappingEntry) -> MappedCall {
        let args = call.parsed_arguments().unwrap_or_else(|| json!({}));
        let renamed = match &args {
            Value::Object(map) => {
                let mut out = serde_json::Map::new();
                for (key, value) in map {
                    let name = entry.param_renames.get(key).cloned().unwrap_or_else(|| key.clone());
                    out.insert(name, value.clone());
                }
                Value::Object(out)
            }
            other => other.clone(),
        };
        let changed_by_rename = renamed != args;

        let (final_args, transformed) = match &entry.transform {
            Some(name) => match apply_transform(name, &renamed) {
                Some(v) => (v, true),
                None => (renamed, changed_by_rename),
            },
            None => (renamed, changed_by_rename),
        };

        let mapped = ToolCall::new(&call.id, &entry.canonical, final_args.to_string());
        if transformed {
            MappedCall::Transformed(mapped)
        } else {
            MappedCall::Execute(mapped)
        }
    }

    /// Canonical tools the executor has enabled but the IDE's vocabulary does
    /// not cover: these are appended to the exposed set, with a system-prompt
    /// addendum describing them.
    pub fn extensions(
        &self,
        enabled_tools: &[String],
        request_tools: &[ToolSpec],
    ) -> (Vec<ToolSpec>, Option<String>) {
        let covered: Vec<&str> = self
            .mapping
            .tools
            .values()
            .map(|e| e.canonical.as_str())
            .chain(request_tools.iter().map(|t| t.name.as_str()))
            .collect();
        let extensions: Vec<ToolSpec> = enabled_tools
            .iter()
            .filter(|name| !covered.contains(&name.as_str()))
            .filter_map(|name| canonical_tool(name).cloned())
            .collect();
        if extensions.is_empty() {
            return (Vec::new(), None);
        }
        let lines: Vec<String> = extensions
            .iter()
            .map(|t| format!("- {}: {}", t.name, t.description))
            .collect();
        let addendum = format!(
            "Tools available beyond the client's own set:\n{}",
            lines.join("\n")
        );
        (extensions, Some(addendum))
    }
}
