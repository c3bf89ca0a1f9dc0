//! Definition and completion requests driven by the text around the cursor.
//!
//! Editors hand us one line of text and a UTF-16 column. The patterns below
//! decide which index queries answer the request; they match how dva code
//! refers to models (`dispatch({ type: 'user/fetch' })`, `connect(({ user }) => ...)`,
//! `loading.effects['user/fetch']`, `yield select(state => state.user)`).

use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

use crate::index::ProjectIndex;
use crate::query::{CompletionItem, CompletionKind, Location, LookupOptions, MemberFilter};

struct Patterns {
    word_before: Regex,
    word_after: Regex,
    trailing_word: Regex,
    select_or_state: Regex,
    select: Regex,
    model_keywords: Regex,
    connect_call: Regex,
    destructure_start: Regex,
    destructure_from_props: Regex,
    member_access: Regex,
    state_access: Regex,
    loading_access: Regex,
}

fn patterns() -> &'static Patterns {
    static RE: OnceLock<Patterns> = OnceLock::new();
    RE.get_or_init(|| Patterns {
        word_before: Regex::new(r"[A-Za-z0-9_/]*$").unwrap(),
        word_after: Regex::new(r"^[A-Za-z0-9_/]*").unwrap(),
        trailing_word: Regex::new(r"([A-Za-z0-9_]+)$").unwrap(),
        select_or_state: Regex::new(r"\b(?:select|state)\b").unwrap(),
        select: Regex::new(r"\bselect\b").unwrap(),
        model_keywords: Regex::new(r"\b(?:models|props|dispatch|connect|easydispatch|effects|loading)\b").unwrap(),
        connect_call: Regex::new(r"\bconnect[A-Za-z0-9_]+\b").unwrap(),
        destructure_start: Regex::new(r"\b(?:const|let|var)\s+\{").unwrap(),
        destructure_from_props: Regex::new(r"\}.+=.+\bprops\b").unwrap(),
        member_access: Regex::new(r#"([A-Za-z0-9_]+)[.\[/'"`]([A-Za-z0-9_]*)$"#).unwrap(),
        state_access: Regex::new(r"([A-Za-z0-9_]+)\.([A-Za-z0-9_]*)$").unwrap(),
        loading_access: Regex::new(r"\bloading\.([A-Za-z0-9_]*)$").unwrap(),
    })
}

/// Byte index of UTF-16 column `character` in `line`, clamped to the line end.
fn byte_index(line: &str, character: u32) -> usize {
    let mut units = 0u32;
    for (idx, ch) in line.char_indices() {
        if units >= character {
            return idx;
        }
        units += ch.len_utf16() as u32;
    }
    line.len()
}

/// Split `line` at the cursor.
fn split_at_cursor(line: &str, character: u32) -> (&str, &str) {
    line.split_at(byte_index(line, character))
}

/// The `model/member` word under the cursor, split into its parts.
///
/// `dispatch({ type: 'user/fet|chCurrent' })` yields `["user", "fetchCurrent"]`.
pub fn definition_target(line: &str, character: u32) -> Vec<String> {
    let p = patterns();
    let (before, after) = split_at_cursor(line, character);
    let head = p.word_before.find(before).map(|m| m.as_str()).unwrap_or("");
    let tail = p.word_after.find(after).map(|m| m.as_str()).unwrap_or("");
    format!("{head}{tail}")
        .split(['/', '.'])
        .map(str::to_string)
        .collect()
}

impl ProjectIndex {
    /// Go-to-definition for the word at `character` on `line` of `file`.
    ///
    /// `model/member` references resolve project-wide. Inside a model file a
    /// bare word is also tried as one of that model's reducers, since effects
    /// `put({ type: 'save' })` to their own reducers without a namespace.
    pub fn definition(&self, file: &Path, line: &str, character: u32) -> Option<Location> {
        let parts = definition_target(line, character);
        let first = parts.first().map(String::as_str).unwrap_or("");
        let second = parts.get(1).map(String::as_str);
        if let Some(found) = self.resolve_location(first, second, LookupOptions::default()) {
            return Some(found);
        }

        let model = self.find_by_file(file)?;
        let own_reducers = LookupOptions {
            ignore_effects: true,
            ignore_states: true,
            no_default: true,
            ..Default::default()
        };
        parts
            .iter()
            .find_map(|part| self.resolve_location(&model.namespace, Some(part), own_reducers))
    }

    /// Completion candidates for the cursor at `character` on `line` of `file`.
    pub fn completions(&self, file: &Path, line: &str, character: u32) -> Vec<CompletionItem> {
        let p = patterns();
        let (before, after) = split_at_cursor(line, character);
        let before_lower = before.to_lowercase();
        let after_lower = after.to_lowercase();
        let word = p
            .trailing_word
            .captures(before)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
            .unwrap_or("");

        let mut out = Vec::new();

        if let Some(model) = self.find_by_file(file) {
            if p.select_or_state.is_match(&before_lower) {
                out.extend(self.completions_for_states(model, word));
            }
            if p.select.is_match(before) {
                out.extend(self.completions_for_model_names(word));
            }
            out.extend(
                self.completions_for_members(&model.namespace, word, MemberFilter::reducers_only())
                    .unwrap_or_default(),
            );
            return out;
        }

        let wants_models = p.model_keywords.is_match(&before_lower)
            || p.connect_call.is_match(&before_lower)
            || (p.destructure_start.is_match(&before_lower) && p.destructure_from_props.is_match(&after_lower));
        if wants_models {
            out.extend(self.completions_for_model_names(word));
        }

        if let Some(c) = p.member_access.captures(before) {
            out.extend(
                self.completions_for_members(&c[1], &c[2], MemberFilter::default())
                    .unwrap_or_default(),
            );
        }

        if let Some(c) = p.state_access.captures(before) {
            if let Some(model) = self.find_by_name(&c[1]) {
                out.extend(self.completions_for_states(model, &c[2]));
            }
        }

        if let Some(c) = p.loading_access.captures(before) {
            let typed = c[1].to_lowercase();
            out.extend(
                ["effects", "models"]
                    .into_iter()
                    .filter(|w| w.starts_with(&typed))
                    .map(|w| CompletionItem::new(w, CompletionKind::Property, None)),
            );
        }

        out
    }
}
