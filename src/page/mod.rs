//! In-memory model of the host page's live element tree.
//!
//! The conference page is observed, never parsed: subtrees arrive already
//! structured (deserialized from capture scripts, or handed over by an
//! embedding adapter). The rest of the crate reads the tree through a shared
//! [`PageHandle`] and mutates it only in two narrow cases — force-removing an
//! overflowing caption node and recording affordance clicks.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

pub mod selectors;

/// One element of the host page tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageNode {
    pub tag: String,
    pub attrs: BTreeMap<String, String>,
    pub text: Option<String>,
    pub children: Vec<PageNode>,
}

impl PageNode {
    pub fn elem(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            ..Default::default()
        }
    }

    pub fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_class(self, class: &str) -> Self {
        self.with_attr("class", class)
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    pub fn with_children(mut self, children: Vec<PageNode>) -> Self {
        self.children = children;
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .map(|list| list.split_whitespace().any(|c| c == class))
            .unwrap_or(false)
    }

    /// Concatenated text of this node and all descendants, depth-first.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        if let Some(text) = &self.text {
            out.push_str(text);
        }
        for child in &self.children {
            child.collect_text(out);
        }
    }

    /// Path (child indexes from this node) of the first descendant matching
    /// the predicate, depth-first. The node itself is considered first.
    pub fn find_path(&self, pred: &dyn Fn(&PageNode) -> bool) -> Option<Vec<usize>> {
        if pred(self) {
            return Some(Vec::new());
        }
        for (i, child) in self.children.iter().enumerate() {
            if let Some(mut path) = child.find_path(pred) {
                path.insert(0, i);
                return Some(path);
            }
        }
        None
    }

    pub fn node_at(&self, path: &[usize]) -> Option<&PageNode> {
        let mut node = self;
        for &i in path {
            node = node.children.get(i)?;
        }
        Some(node)
    }

    pub fn node_at_mut(&mut self, path: &[usize]) -> Option<&mut PageNode> {
        let mut node = self;
        for &i in path {
            node = node.children.get_mut(i)?;
        }
        Some(node)
    }

    /// Remove the node at `path` from its parent. Returns false if the path
    /// does not resolve.
    pub fn remove_at(&mut self, path: &[usize]) -> bool {
        let Some((&last, parent_path)) = path.split_last() else {
            return false;
        };
        match self.node_at_mut(parent_path) {
            Some(parent) if last < parent.children.len() => {
                parent.children.remove(last);
                true
            }
            _ => false,
        }
    }
}

/// Requested change-notification categories for a watched subtree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObserveConfig {
    pub child_list: bool,
    pub attributes: bool,
    pub subtree: bool,
    pub character_data: bool,
}

impl ObserveConfig {
    /// Everything the capture core asks for: child list, attributes, subtree
    /// and character data changes.
    pub fn all() -> Self {
        Self {
            child_list: true,
            attributes: true,
            subtree: true,
            character_data: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    ChildList,
    Attributes,
    CharacterData,
}

/// One change notification for a watched subtree.
#[derive(Debug, Clone)]
pub struct MutationRecord {
    pub kind: MutationKind,
    /// Path of the mutated node, relative to the page root.
    pub path: Vec<usize>,
}

/// Batches are delivered sequentially per watched region.
pub type MutationBatch = Vec<MutationRecord>;

#[derive(Default)]
struct PageState {
    root: PageNode,
    clicks: Vec<Vec<usize>>,
}

/// Shared mutable page root plus a click log.
///
/// Clicks on the in-memory page are only recorded — the real host page is
/// the one that reacts. The embedding layer replays the log against it.
#[derive(Clone, Default)]
pub struct PageHandle {
    inner: Arc<Mutex<PageState>>,
}

impl PageHandle {
    pub fn new(root: PageNode) -> Self {
        Self {
            inner: Arc::new(Mutex::new(PageState {
                root,
                clicks: Vec::new(),
            })),
        }
    }

    /// Read the current tree under the lock.
    pub fn read<R>(&self, f: impl FnOnce(&PageNode) -> R) -> R {
        let state = self.inner.lock().unwrap();
        f(&state.root)
    }

    pub fn replace_root(&self, root: PageNode) {
        self.inner.lock().unwrap().root = root;
    }

    /// Replace the subtree at `path`. Returns false if the path is stale.
    pub fn replace_at(&self, path: &[usize], node: PageNode) -> bool {
        let mut state = self.inner.lock().unwrap();
        match state.root.node_at_mut(path) {
            Some(target) => {
                *target = node;
                true
            }
            None => false,
        }
    }

    pub fn set_text_at(&self, path: &[usize], text: &str) -> bool {
        let mut state = self.inner.lock().unwrap();
        match state.root.node_at_mut(path) {
            Some(target) => {
                target.text = Some(text.to_string());
                true
            }
            None => false,
        }
    }

    pub fn append_child_at(&self, path: &[usize], node: PageNode) -> bool {
        let mut state = self.inner.lock().unwrap();
        match state.root.node_at_mut(path) {
            Some(target) => {
                target.children.push(node);
                true
            }
            None => false,
        }
    }

    pub fn remove_at(&self, path: &[usize]) -> bool {
        self.inner.lock().unwrap().root.remove_at(path)
    }

    pub fn click(&self, path: &[usize]) {
        self.inner.lock().unwrap().clicks.push(path.to_vec());
    }

    pub fn clicks(&self) -> Vec<Vec<usize>> {
        self.inner.lock().unwrap().clicks.clone()
    }
}

/// Path of the first element with the given class whose text content matches
/// the pattern. Mirrors the host-page affordance lookup: glyph icons carry
/// their name as text content.
pub fn find_control(root: &PageNode, class: &str, glyph: &Regex) -> Option<Vec<usize>> {
    root.find_path(&|node| node.has_class(class) && glyph.is_match(&node.text_content()))
}

pub fn find_by_class(root: &PageNode, class: &str) -> Option<Vec<usize>> {
    root.find_path(&|node| node.has_class(class))
}
