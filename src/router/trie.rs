//! Segment trie used for route resolution.
//!
//! Each node represents one pattern segment. Siblings are kept sorted by
//! [`Segment::precedence`], and resolution walks the tree depth first: at
//! every level the accepting children are tried in that order and the first
//! branch that ends on a handler wins. Registration order never matters.
//!
//! ```text
//! (root)
//!  └─ doc
//!      ├─ index          literal
//!      ├─ {id:[0-9]+}    constrained variable
//!      ├─ {slug}         free variable
//!      └─ *              default
//! ```

use std::sync::Arc;

use super::core::ParamVec;
use super::pattern::Segment;

/// Why an insert was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InsertError {
    /// The terminal node already carries a handler, or a sibling path that
    /// differs only in variable names does and would always win.
    Occupied,
}

/// Outcome of a trie walk.
#[derive(Debug)]
pub(crate) struct Walk<H> {
    pub handler: Option<Arc<H>>,
    pub captures: ParamVec,
    pub remainder: Option<String>,
}

impl<H> Walk<H> {
    fn miss() -> Self {
        Self {
            handler: None,
            captures: ParamVec::new(),
            remainder: None,
        }
    }
}

#[derive(Debug)]
struct TrieNode<H> {
    /// `None` only for the root.
    segment: Option<Segment>,
    handler: Option<Arc<H>>,
    children: Vec<TrieNode<H>>,
}

impl<H> TrieNode<H> {
    fn new(segment: Option<Segment>) -> Self {
        Self {
            segment,
            handler: None,
            children: Vec::new(),
        }
    }

    fn is_default(&self) -> bool {
        matches!(self.segment, Some(Segment::Wildcard))
    }

    fn accepts(&self, segment: &str) -> bool {
        self.segment.as_ref().is_some_and(|s| s.matches(segment))
    }

    /// Find the child for `segment`, creating it at its sorted position.
    fn child_mut(&mut self, segment: &Segment) -> &mut TrieNode<H> {
        let search = self.children.binary_search_by(|child| {
            child
                .segment
                .as_ref()
                .map_or(std::cmp::Ordering::Less, |s| s.precedence(segment))
        });
        let idx = match search {
            // Equal precedence only breaks ties on tokens/sources/names, so an
            // equal key is the identical segment and the node is reused.
            Ok(idx) => idx,
            Err(idx) => {
                self.children
                    .insert(idx, TrieNode::new(Some(segment.clone())));
                idx
            }
        };
        &mut self.children[idx]
    }

    /// Whether a handler is bound at the end of a path whose segments have
    /// the same shape as `segments`.
    fn has_equivalent(&self, segments: &[Segment]) -> bool {
        match segments.split_first() {
            None => self.handler.is_some(),
            Some((first, rest)) => self.children.iter().any(|child| {
                child.segment.as_ref().is_some_and(|s| s.same_shape(first)) && child.has_equivalent(rest)
            }),
        }
    }

    fn default_child(&self) -> Option<&TrieNode<H>> {
        self.children.iter().find(|c| c.is_default())
    }
}

/// A segment trie for one HTTP method.
#[derive(Debug)]
pub(crate) struct Trie<H> {
    root: TrieNode<H>,
    len: usize,
}

impl<H> Default for Trie<H> {
    fn default() -> Self {
        Self {
            root: TrieNode::new(None),
            len: 0,
        }
    }
}

impl<H> Trie<H> {
    /// Number of bound handlers.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Extend the trie by one level per segment and bind `handler` to the
    /// terminal node.
    pub fn insert(&mut self, segments: &[Segment], handler: Arc<H>) -> Result<(), InsertError> {
        if self.root.has_equivalent(segments) {
            return Err(InsertError::Occupied);
        }
        let mut node = &mut self.root;
        for segment in segments {
            node = node.child_mut(segment);
        }
        if node.handler.is_some() {
            return Err(InsertError::Occupied);
        }
        node.handler = Some(handler);
        self.len += 1;
        Ok(())
    }

    /// Walk the trie for the given request segments.
    ///
    /// Children are tried in sibling order; when a branch dead-ends the walk
    /// returns to the next accepting sibling, so a trailing `*` still catches
    /// paths that a variable sibling accepted but could not finish.
    pub fn search(&self, segments: &[&str]) -> Walk<H> {
        let mut captures = ParamVec::new();
        match descend(&self.root, segments, 0, &mut captures) {
            Some((handler, remainder)) => Walk {
                handler: Some(handler),
                captures,
                remainder,
            },
            None => Walk::miss(),
        }
    }

    /// Visit every bound node as `(pattern, handler)` in precedence order.
    pub fn for_each(&self, mut visit: impl FnMut(String, &Arc<H>)) {
        fn walk<H>(node: &TrieNode<H>, prefix: &str, visit: &mut dyn FnMut(String, &Arc<H>)) {
            let path = match &node.segment {
                Some(segment) => format!("{prefix}/{segment}"),
                None => String::new(),
            };
            if let Some(handler) = &node.handler {
                let shown = if path.is_empty() { "/".to_string() } else { path.clone() };
                visit(shown, handler);
            }
            for child in &node.children {
                walk(child, &path, visit);
            }
        }
        walk(&self.root, "", &mut visit);
    }
}

/// Depth-first step of [`Trie::search`]. Captures pushed by a branch are
/// popped again when the branch fails.
fn descend<H>(
    node: &TrieNode<H>,
    segments: &[&str],
    idx: usize,
    captures: &mut ParamVec,
) -> Option<(Arc<H>, Option<String>)> {
    let Some(segment) = segments.get(idx) else {
        if let Some(handler) = &node.handler {
            return Some((Arc::clone(handler), None));
        }
        // An exhausted path may still land on a default with an empty remainder.
        return node
            .default_child()
            .and_then(|default| default.handler.clone())
            .map(|handler| (handler, Some(String::new())));
    };

    for child in node.children.iter().filter(|c| c.accepts(segment)) {
        match &child.segment {
            Some(Segment::Wildcard) => {
                if let Some(handler) = &child.handler {
                    return Some((Arc::clone(handler), Some(segments[idx..].join("/"))));
                }
            }
            Some(Segment::Variable { name, .. }) => {
                captures.push((Arc::from(name.as_str()), (*segment).to_string()));
                if let Some(found) = descend(child, segments, idx + 1, captures) {
                    return Some(found);
                }
                captures.pop();
            }
            _ => {
                if let Some(found) = descend(child, segments, idx + 1, captures) {
                    return Some(found);
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::pattern::parse_pattern;

    fn trie(patterns: &[&'static str]) -> Trie<&'static str> {
        let mut trie = Trie::default();
        for p in patterns {
            let segments = parse_pattern(p).unwrap();
            trie.insert(&segments, Arc::new(*p)).unwrap();
        }
        trie
    }

    fn hit(trie: &Trie<&'static str>, path: &str) -> Option<&'static str> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        trie.search(&segments).handler.map(|h| *h)
    }

    #[test]
    fn test_siblings_sorted_by_precedence() {
        let t = trie(&["/x/*", "/x/{v}", "/x/{n:[0-9]+}", "/x/b", "/x/a"]);
        let order: Vec<String> = t.root.children[0]
            .children
            .iter()
            .map(|c| c.segment.as_ref().unwrap().to_string())
            .collect();
        assert_eq!(order, vec!["a", "b", "{n:[0-9]+}", "{v}", "*"]);
    }

    #[test]
    fn test_identical_segments_reuse_nodes() {
        let t = trie(&["/a/b/c", "/a/b/d"]);
        assert_eq!(t.root.children.len(), 1);
        assert_eq!(t.root.children[0].children.len(), 1);
        assert_eq!(t.root.children[0].children[0].children.len(), 2);
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn test_occupied_terminal_rejected() {
        let mut t = trie(&["/a/{id}"]);
        let segments = parse_pattern("/a/{id}").unwrap();
        assert_eq!(t.insert(&segments, Arc::new("again")), Err(InsertError::Occupied));
    }

    #[test]
    fn test_dead_end_falls_back_to_next_sibling() {
        let t = trie(&["/a/x", "/a/{v}/y"]);
        assert_eq!(hit(&t, "/a/x"), Some("/a/x"));
        assert_eq!(hit(&t, "/a/z/y"), Some("/a/{v}/y"));
        // The literal `x` has no `y` child, so `{v}` gets its turn.
        assert_eq!(hit(&t, "/a/x/y"), Some("/a/{v}/y"));
    }

    #[test]
    fn test_wildcard_catches_what_a_variable_cannot_finish() {
        let t = trie(&["/a/b", "/a/{x}", "/a/*"]);
        let walk = t.search(&["a", "c", "d"]);
        assert_eq!(walk.handler.as_deref().copied(), Some("/a/*"));
        assert!(walk.captures.is_empty());
        assert_eq!(walk.remainder.as_deref(), Some("c/d"));
        assert_eq!(hit(&t, "/a/c"), Some("/a/{x}"));
        assert_eq!(hit(&t, "/a/b"), Some("/a/b"));
    }

    #[test]
    fn test_wildcard_children_are_not_explored() {
        let t = trie(&["/files/*"]);
        let walk = t.search(&["files", "a", "b.txt"]);
        assert_eq!(walk.handler.as_deref().copied(), Some("/files/*"));
        assert_eq!(walk.remainder.as_deref(), Some("a/b.txt"));
    }

    #[test]
    fn test_renamed_variable_path_is_occupied() {
        let mut t: Trie<&'static str> = Trie::default();
        t.insert(&parse_pattern("/u/{id}/posts").unwrap(), Arc::new("a")).unwrap();
        let err = t.insert(&parse_pattern("/u/{name}/posts").unwrap(), Arc::new("b"));
        assert_eq!(err, Err(InsertError::Occupied));
        // A different constraint or a longer path stays reachable.
        t.insert(&parse_pattern("/u/{id:[0-9]+}/posts").unwrap(), Arc::new("c")).unwrap();
        t.insert(&parse_pattern("/u/{name}").unwrap(), Arc::new("d")).unwrap();
        assert_eq!(t.len(), 3);
    }

    #[test]
    fn test_for_each_lists_patterns() {
        let t = trie(&["/", "/a/{id}", "/a/*"]);
        let mut seen = Vec::new();
        t.for_each(|p, _| seen.push(p));
        assert_eq!(seen, vec!["/", "/a/{id}", "/a/*"]);
    }
}
