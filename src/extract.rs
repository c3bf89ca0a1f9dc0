//! Model-module extraction.
//!
//! A model module is a file whose default export is an object literal shaped like
//!
//! ```text
//! export default {
//!   namespace: 'user',
//!   state: { list: [] },
//!   effects: { *fetch() {} },
//!   reducers: { save(state) {} },
//! };
//! ```
//!
//! Extraction never fails on the *content* of a file: syntax errors and foreign
//! shapes produce `ok == false`. Only a failed read is an error.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::ExtractError;
use crate::syntax::{self, Expr, Property, SourceLocation, Span, SyntaxTree};

/// A declared name and the span of its property key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedLocation {
    pub name: String,
    pub from: SourceLocation,
    pub to: SourceLocation,
}

impl NamedLocation {
    pub fn span(&self) -> Span {
        Span {
            from: self.from,
            to: self.to,
        }
    }
}

/// Everything extracted from one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleResult {
    pub ok: bool,
    pub file: PathBuf,
    pub namespace: String,
    pub states: Vec<NamedLocation>,
    pub effects: Vec<NamedLocation>,
    pub reducers: Vec<NamedLocation>,
    /// Why `ok` is false. Informational only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl ModuleResult {
    fn not_ok(file: &Path) -> Self {
        Self {
            ok: false,
            file: file.to_path_buf(),
            namespace: String::new(),
            states: vec![],
            effects: vec![],
            reducers: vec![],
            failure: None,
        }
    }

    fn fail(mut self, reason: impl Into<String>) -> Self {
        self.failure = Some(reason.into());
        self
    }
}

/// Extract from `file_path`, preferring `source_text` over the file on disk.
///
/// Passing the text of an unsaved editor buffer indexes that buffer without
/// touching storage.
pub async fn extract(file_path: &Path, source_text: Option<&str>) -> Result<ModuleResult, ExtractError> {
    match source_text {
        Some(text) => Ok(extract_source(file_path, text)),
        None => {
            let text = tokio::fs::read_to_string(file_path)
                .await
                .map_err(|source| ExtractError::Read {
                    path: file_path.to_path_buf(),
                    source,
                })?;
            Ok(extract_source(file_path, &text))
        }
    }
}

/// Pure extraction over in-memory text.
pub fn extract_source(file_path: &Path, source_text: &str) -> ModuleResult {
    let result = ModuleResult::not_ok(file_path);

    let tree = match syntax::parse(source_text, file_path) {
        Ok(tree) => tree,
        Err(e) => {
            debug!(file = %file_path.display(), error = %e, "model file does not parse");
            return result.fail(format!("parse error: {e}"));
        }
    };

    let mut last_miss = "no `export default { ... }` object literal";
    let mut stack = vec![tree.root()];
    while let Some(node) = stack.pop() {
        if let Some(value) = tree.default_export_value(node) {
            match from_default_export(&tree, tree.expr(value), file_path) {
                Ok(found) => return found,
                Err(reason) => last_miss = reason,
            }
            continue;
        }
        let mut cursor = node.walk();
        let children: Vec<_> = node.named_children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }

    result.fail(last_miss)
}

fn from_default_export<'t>(
    tree: &'t SyntaxTree,
    value: Expr<'t>,
    file_path: &Path,
) -> Result<ModuleResult, &'static str> {
    let Expr::Object(model) = value else {
        return Err("default export is not an object literal");
    };

    let mut members: HashMap<String, Property<'t>> = HashMap::new();
    for prop in tree.properties(model) {
        let Some(name) = prop.key().and_then(|k| k.name.clone()) else {
            continue;
        };
        members.insert(name, prop);
    }

    let namespace = match members.get("namespace") {
        Some(Property::Pair {
            value: Expr::Str(ns),
            ..
        }) if !ns.is_empty() => ns.clone(),
        Some(_) => return Err("`namespace` is not a non-empty string literal"),
        None => return Err("no `namespace` property"),
    };

    let mut result = ModuleResult::not_ok(file_path);
    result.namespace = namespace;
    result.states = section(tree, members.get("state"));
    result.effects = section(tree, members.get("effects"));
    result.reducers = section(tree, members.get("reducers"));
    result.ok = true;
    Ok(result)
}

/// Named members of `state` / `effects` / `reducers`. Anything but an object
/// literal value yields an empty list.
fn section<'t>(tree: &'t SyntaxTree, prop: Option<&Property<'t>>) -> Vec<NamedLocation> {
    let Some(Property::Pair {
        value: Expr::Object(obj),
        ..
    }) = prop
    else {
        return vec![];
    };

    tree.properties(*obj)
        .iter()
        .filter_map(|p| {
            let key = p.key()?;
            let name = key.name.clone()?;
            let span = tree.location_of(key.node)?;
            Some(NamedLocation {
                name,
                from: span.from,
                to: span.to,
            })
        })
        .collect()
}
