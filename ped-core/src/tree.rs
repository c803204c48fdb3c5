//! In-memory XML tree using the text/tail model
//!
//! Every node owns an optional `text` (content before its first child) and an
//! optional `tail` (content after its end tag, before the next sibling). Nodes
//! live in an arena and are addressed by [`NodeId`]; ids stay valid for the
//! lifetime of the document, and inserted nodes are appended to the arena.

/// Handle to a node inside a [`Document`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// An element with its qualified name and attributes in document order
    Element {
        name: String,
        attributes: Vec<(String, String)>,
    },
    /// A comment; its content is stored as the node's text
    Comment,
    /// A processing instruction; its content is stored as the node's text
    ProcessingInstruction,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub text: Option<String>,
    pub tail: Option<String>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) parent: Option<NodeId>,
}

impl Node {
    pub(crate) fn new(kind: NodeKind) -> Self {
        Node {
            kind,
            text: None,
            tail: None,
            children: Vec::new(),
            parent: None,
        }
    }

    pub fn is_element(&self) -> bool {
        matches!(self.kind, NodeKind::Element { .. })
    }
}

/// Which text slot of a node a fragment refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    /// Own text, before the first child
    Text,
    /// Tail text, after the node and before its next sibling
    Tail,
}

/// A contiguous run of text owned by, or trailing, a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fragment {
    pub node: NodeId,
    pub slot: Slot,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub(crate) nodes: Vec<Node>,
    pub(crate) root: NodeId,
    /// Everything before the root element, kept verbatim
    pub(crate) prolog: String,
}

impl Document {
    /// Create a document with a single empty root element
    pub fn new(root_name: &str) -> Self {
        let root = Node::new(NodeKind::Element {
            name: root_name.to_string(),
            attributes: Vec::new(),
        });
        Document {
            nodes: vec![root],
            root: NodeId(0),
            prolog: String::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn prolog(&self) -> &str {
        &self.prolog
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    /// Qualified element name, `None` for comments and processing instructions
    pub fn name(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id.0].kind {
            NodeKind::Element { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Element name without its namespace prefix
    pub fn local_name(&self, id: NodeId) -> Option<&str> {
        self.name(id).map(local_part)
    }

    pub fn attributes(&self, id: NodeId) -> &[(String, String)] {
        match &self.nodes[id.0].kind {
            NodeKind::Element { attributes, .. } => attributes,
            _ => &[],
        }
    }

    /// Attribute value by qualified name
    pub fn attribute(&self, id: NodeId, key: &str) -> Option<&str> {
        self.attributes(id)
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Attribute value by local name, ignoring any namespace prefix
    pub fn attribute_local(&self, id: NodeId, local: &str) -> Option<&str> {
        self.attributes(id)
            .iter()
            .find(|(k, _)| local_part(k) == local)
            .map(|(_, v)| v.as_str())
    }

    pub fn first_attribute(&self, id: NodeId) -> Option<(&str, &str)> {
        self.attributes(id)
            .first()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// All nodes below `id` in document order, `id` itself excluded
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.children(current).iter().rev().copied());
        }
        out
    }

    /// First child element with the given local name
    pub fn find_child(&self, id: NodeId, local: &str) -> Option<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .find(|&child| self.local_name(child) == Some(local))
    }

    /// All descendant elements with the given local name, in document order
    pub fn find_descendants(&self, id: NodeId, local: &str) -> Vec<NodeId> {
        self.descendants(id)
            .into_iter()
            .filter(|&node| self.local_name(node) == Some(local))
            .collect()
    }

    /// Text fragments below `id` in document order
    ///
    /// Materialized in one pass so callers can mutate fragments while walking
    /// the list. The tail of `id` itself is not part of its content and is
    /// excluded; comment and processing-instruction content is not text, but
    /// their tails are.
    pub fn fragments(&self, id: NodeId) -> Vec<Fragment> {
        let mut out = Vec::new();
        self.collect_fragments(id, false, &mut out);
        out
    }

    fn collect_fragments(&self, id: NodeId, with_tail: bool, out: &mut Vec<Fragment>) {
        let node = self.node(id);
        if node.is_element() && node.text.is_some() {
            out.push(Fragment {
                node: id,
                slot: Slot::Text,
            });
        }
        for &child in &node.children {
            self.collect_fragments(child, true, out);
        }
        if with_tail && node.tail.is_some() {
            out.push(Fragment {
                node: id,
                slot: Slot::Tail,
            });
        }
    }

    pub fn fragment_text(&self, fragment: Fragment) -> &str {
        let node = self.node(fragment.node);
        let text = match fragment.slot {
            Slot::Text => &node.text,
            Slot::Tail => &node.tail,
        };
        text.as_deref().unwrap_or("")
    }

    pub fn set_fragment_text(&mut self, fragment: Fragment, value: String) {
        let node = self.node_mut(fragment.node);
        match fragment.slot {
            Slot::Text => node.text = Some(value),
            Slot::Tail => node.tail = Some(value),
        }
    }

    /// Concatenated text content below `id` (like `itertext`)
    pub fn text_content(&self, id: NodeId) -> String {
        self.fragments(id)
            .into_iter()
            .map(|fragment| self.fragment_text(fragment))
            .collect()
    }

    /// Add a detached element to the arena
    pub fn create_element(&mut self, name: &str, attributes: Vec<(String, String)>) -> NodeId {
        self.push_node(Node::new(NodeKind::Element {
            name: name.to_string(),
            attributes,
        }))
    }

    pub(crate) fn push_node(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    /// Attach a detached node as the `index`-th child of `parent`
    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) {
        let children = &mut self.nodes[parent.0].children;
        let index = index.min(children.len());
        children.insert(index, child);
        self.nodes[child.0].parent = Some(parent);
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        let index = self.children(parent).len();
        self.insert_child(parent, index, child);
    }

    /// Position of `child` among its parent's children
    pub fn child_index(&self, child: NodeId) -> Option<usize> {
        let parent = self.parent(child)?;
        self.children(parent).iter().position(|&c| c == child)
    }

    /// Deep-copy `node` from `other` into this arena as a detached subtree
    ///
    /// The copied root's tail is dropped; tails of its descendants are kept.
    pub fn graft(&mut self, other: &Document, node: NodeId) -> NodeId {
        let source = other.node(node);
        let mut copy = Node::new(source.kind.clone());
        copy.text = source.text.clone();
        let id = self.push_node(copy);
        for &child in other.children(node) {
            let child_copy = self.graft(other, child);
            self.nodes[child_copy.0].tail = other.node(child).tail.clone();
            self.append_child(id, child_copy);
        }
        id
    }

    /// Whether two elements are interchangeable as inline tags: same name and
    /// same first attribute
    pub fn is_equivalent(&self, id: NodeId, other: &Document, other_id: NodeId) -> bool {
        self.name(id).is_some()
            && self.name(id) == other.name(other_id)
            && self.first_attribute(id) == other.first_attribute(other_id)
    }

    /// Splice a copy of `template`'s root into the fragment at `anchor`
    ///
    /// The anchor must sit on word boundaries in the fragment text. The text
    /// before the match stays in the fragment's slot, the new node follows it
    /// (as first child for own text, as next sibling for tail text), and the
    /// text after the matched token becomes the new node's tail. The matched
    /// token itself is replaced by the node, whose text carries it. Returns
    /// whether an insertion happened.
    pub fn insert_structural_node(
        &mut self,
        fragment: Fragment,
        template: &Document,
        anchor: &str,
    ) -> bool {
        if anchor.is_empty() {
            return false;
        }
        let text = self.fragment_text(fragment);
        let Some(start) = find_word_bounded(text, anchor) else {
            return false;
        };
        let before = text[..start].to_string();
        let after = text[start + anchor.len()..].to_string();

        let (parent, index) = match fragment.slot {
            Slot::Text => (fragment.node, 0),
            Slot::Tail => {
                let Some(parent) = self.parent(fragment.node) else {
                    return false;
                };
                let Some(position) = self.child_index(fragment.node) else {
                    return false;
                };
                (parent, position + 1)
            }
        };

        let new_node = self.graft(template, template.root());
        if self.node(new_node).text.is_none() && self.children(new_node).is_empty() {
            self.node_mut(new_node).text = Some(anchor.to_string());
        }
        self.node_mut(new_node).tail = (!after.is_empty()).then_some(after);
        self.set_fragment_text(fragment, before);
        self.insert_child(parent, index, new_node);
        true
    }
}

fn local_part(name: &str) -> &str {
    name.rsplit_once(':').map_or(name, |(_, local)| local)
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Byte offset of the first occurrence of `needle` preceded by a non-word
/// character (or the start) and followed by a non-word character (or the end)
///
/// Occurrences may overlap a rejected one, so the search resumes one
/// character after each rejected start.
pub fn find_word_bounded(haystack: &str, needle: &str) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    let mut from = 0;
    while let Some(offset) = haystack[from..].find(needle) {
        let i = from + offset;
        let before_ok = haystack[..i]
            .chars()
            .next_back()
            .is_none_or(|c| !is_word_char(c));
        let after_ok = haystack[i + needle.len()..]
            .chars()
            .next()
            .is_none_or(|c| !is_word_char(c));
        if before_ok && after_ok {
            return Some(i);
        }
        from = i + haystack[i..].chars().next().map_or(1, char::len_utf8);
    }
    None
}
