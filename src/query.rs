//! Read-only queries over a [`ProjectIndex`]: definition lookup, completion
//! candidates and summary counts.
//!
//! Everything returned from here is editor-facing, so lines are 0-based.

use serde::Serialize;
use std::path::PathBuf;

use crate::extract::{ModuleResult, NamedLocation};
use crate::index::ProjectIndex;
use crate::syntax::Span;

/// 0-based line and UTF-16 column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    /// Zero-width range at the start of a file.
    pub const FILE_START: Range = Range {
        start: Position { line: 0, character: 0 },
        end: Position { line: 0, character: 0 },
    };

    /// Convert a 1-based extraction span into an editor range.
    pub fn from_span(span: Span) -> Self {
        Range {
            start: Position {
                line: span.from.line.saturating_sub(1),
                character: span.from.character,
            },
            end: Position {
                line: span.to.line.saturating_sub(1),
                character: span.to.character,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Location {
    pub file: PathBuf,
    pub range: Range,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CompletionKind {
    Module,
    Property,
    Method,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionItem {
    pub name: String,
    pub kind: CompletionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl CompletionItem {
    pub fn new(name: impl Into<String>, kind: CompletionKind, detail: Option<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            detail,
        }
    }
}

/// Which sections `resolve_location` may search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LookupOptions {
    pub ignore_effects: bool,
    pub ignore_reducers: bool,
    pub ignore_states: bool,
    /// Return `None` instead of the file start when no member matches.
    pub no_default: bool,
}

/// Which sections `completions_for_members` offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberFilter {
    pub include_effects: bool,
    pub include_reducers: bool,
}

impl Default for MemberFilter {
    fn default() -> Self {
        Self {
            include_effects: true,
            include_reducers: true,
        }
    }
}

impl MemberFilter {
    pub fn reducers_only() -> Self {
        Self {
            include_effects: false,
            include_reducers: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportInfo {
    pub model_names: Vec<String>,
    pub model_count: usize,
    pub effect_count: usize,
    pub reducer_count: usize,
}

/// Case-insensitive `starts_with`; `prefix_lower` must already be lowercase.
fn matches_prefix(name: &str, prefix_lower: &str) -> bool {
    prefix_lower.is_empty() || name.to_lowercase().starts_with(prefix_lower)
}

fn filtered<'a>(
    entries: &'a [NamedLocation],
    prefix_lower: &'a str,
) -> impl Iterator<Item = &'a NamedLocation> + 'a {
    entries.iter().filter(move |e| matches_prefix(&e.name, prefix_lower))
}

impl ProjectIndex {
    /// Namespaces starting with `prefix` (case-insensitive).
    pub fn completions_for_model_names(&self, prefix: &str) -> Vec<CompletionItem> {
        let prefix = prefix.to_lowercase();
        self.models()
            .filter(|m| matches_prefix(&m.namespace, &prefix))
            .map(|m| {
                let file = m.file.strip_prefix(self.root()).unwrap_or(&m.file);
                CompletionItem::new(
                    m.namespace.clone(),
                    CompletionKind::Module,
                    Some(format!("model in {}", file.display())),
                )
            })
            .collect()
    }

    /// State fields of `module` starting with `prefix`.
    pub fn completions_for_states(&self, module: &ModuleResult, prefix: &str) -> Vec<CompletionItem> {
        let prefix = prefix.to_lowercase();
        let detail = format!("state in \"{}\"", module.namespace);
        filtered(&module.states, &prefix)
            .map(|s| CompletionItem::new(s.name.clone(), CompletionKind::Property, Some(detail.clone())))
            .collect()
    }

    /// Effects and/or reducers of `namespace`; `None` for an unknown namespace.
    pub fn completions_for_members(
        &self,
        namespace: &str,
        prefix: &str,
        filter: MemberFilter,
    ) -> Option<Vec<CompletionItem>> {
        let model = self.find_by_name(namespace)?;
        let prefix = prefix.to_lowercase();
        let mut out = Vec::new();
        if filter.include_effects {
            let detail = format!("effect in \"{namespace}\"");
            out.extend(
                filtered(&model.effects, &prefix)
                    .map(|e| CompletionItem::new(e.name.clone(), CompletionKind::Method, Some(detail.clone()))),
            );
        }
        if filter.include_reducers {
            let detail = format!("reducer in \"{namespace}\"");
            out.extend(
                filtered(&model.reducers, &prefix)
                    .map(|r| CompletionItem::new(r.name.clone(), CompletionKind::Method, Some(detail.clone()))),
            );
        }
        Some(out)
    }

    /// Where `namespace` (or one of its members) is defined.
    ///
    /// Members are searched in effects, reducers, then states. Without a match
    /// the start of the model file is returned, unless `no_default` is set.
    pub fn resolve_location(&self, namespace: &str, member: Option<&str>, options: LookupOptions) -> Option<Location> {
        let model = self.find_by_name(namespace)?;
        let at = |range: Range| Location {
            file: model.file.clone(),
            range,
        };

        if let Some(member) = member.filter(|m| !m.is_empty()) {
            let sections = [
                (options.ignore_effects, &model.effects),
                (options.ignore_reducers, &model.reducers),
                (options.ignore_states, &model.states),
            ];
            for (ignored, entries) in sections {
                if ignored {
                    continue;
                }
                if let Some(found) = entries.iter().find(|e| e.name == member) {
                    return Some(at(Range::from_span(found.span())));
                }
            }
        }

        if options.no_default {
            return None;
        }
        Some(at(Range::FILE_START))
    }

    pub fn report(&self) -> ReportInfo {
        let model_names = self.list_namespaces();
        ReportInfo {
            model_count: model_names.len(),
            effect_count: self.models().map(|m| m.effects.len()).sum(),
            reducer_count: self.models().map(|m| m.reducers.len()).sum(),
            model_names,
        }
    }
}
