//! Arena-backed DOM tree used by the HTML tree builder and the script surface.
//!
//! Nodes are never freed: removing a node only detaches it, so a `NodeId`
//! handed to script stays valid for the lifetime of the `Document`.

use crate::{Error, Result};

/// Index of a node inside its `Document`.
pub type NodeId = usize;

/// DOM `nodeType` values for the node kinds the bridge creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Element = 1,
    Text = 3,
    Document = 9,
}

/// Per-element mapping of property names to literal values.
///
/// Insertion order is kept so `css_text` reads back the way declarations were
/// applied. Setting an existing name overwrites its value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StyleDeclaration {
    properties: Vec<(String, String)>,
}

impl StyleDeclaration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_property(&mut self, name: &str, value: &str) {
        match self.properties.iter_mut().find(|(n, _)| n == name) {
            Some((_, v)) => *v = value.to_string(),
            None => self.properties.push((name.to_string(), value.to_string())),
        }
    }

    pub fn get_property_value(&self, name: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn remove_property(&mut self, name: &str) -> Option<String> {
        let idx = self.properties.iter().position(|(n, _)| n == name)?;
        Some(self.properties.remove(idx).1)
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.properties.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Serialize as `name:value;name:value`, the same syntax inline style
    /// attributes use.
    pub fn css_text(&self) -> String {
        self.properties
            .iter()
            .map(|(n, v)| format!("{}:{}", n, v))
            .collect::<Vec<_>>()
            .join(";")
    }
}

#[derive(Debug, Clone)]
pub struct ElementData {
    tag_name: String,
    style: StyleDeclaration,
}

impl ElementData {
    pub fn tag_name(&self) -> &str {
        &self.tag_name
    }

    pub fn style(&self) -> &StyleDeclaration {
        &self.style
    }
}

#[derive(Debug, Clone)]
pub enum NodeData {
    Document,
    Element(ElementData),
    Text(String),
}

#[derive(Debug, Clone)]
pub struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    data: NodeData,
}

impl Node {
    fn new(data: NodeData) -> Self {
        Self {
            parent: None,
            children: Vec::new(),
            data,
        }
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn data(&self) -> &NodeData {
        &self.data
    }

    pub fn node_type(&self) -> NodeType {
        match self.data {
            NodeData::Document => NodeType::Document,
            NodeData::Element(_) => NodeType::Element,
            NodeData::Text(_) => NodeType::Text,
        }
    }
}

/// A live document tree.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    const ROOT: NodeId = 0;

    /// Document with the usual `HTML > HEAD, BODY` skeleton.
    pub fn new() -> Self {
        let mut doc = Self::without_body();
        if let Some(html) = doc.document_element() {
            let body = doc.create_element("body");
            doc.attach(html, body);
        }
        doc
    }

    /// Document whose document element has a `HEAD` but no `BODY`.
    pub fn without_body() -> Self {
        let mut doc = Self {
            nodes: vec![Node::new(NodeData::Document)],
        };
        let html = doc.create_element("html");
        doc.attach(Self::ROOT, html);
        let head = doc.create_element("head");
        doc.attach(html, head);
        doc
    }

    pub fn root(&self) -> NodeId {
        Self::ROOT
    }

    pub fn document_element(&self) -> Option<NodeId> {
        self.nodes[Self::ROOT]
            .children
            .iter()
            .copied()
            .find(|&id| self.tag_name(id).is_some())
    }

    /// First `BODY` child of the document element.
    pub fn body(&self) -> Option<NodeId> {
        let html = self.document_element()?;
        self.nodes[html]
            .children
            .iter()
            .copied()
            .find(|&id| self.tag_name(id) == Some("BODY"))
    }

    /// Create a detached element; the tag name is stored upper-cased.
    pub fn create_element(&mut self, local_name: &str) -> NodeId {
        self.push(NodeData::Element(ElementData {
            tag_name: local_name.to_ascii_uppercase(),
            style: StyleDeclaration::new(),
        }))
    }

    pub fn create_text_node(&mut self, text: &str) -> NodeId {
        self.push(NodeData::Text(text.to_string()))
    }

    fn push(&mut self, data: NodeData) -> NodeId {
        self.nodes.push(Node::new(data));
        self.nodes.len() - 1
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    fn checked(&self, id: NodeId) -> Result<&Node> {
        self.nodes
            .get(id)
            .ok_or_else(|| Error::DomError(format!("no node with id {}", id)))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        // The document node itself is always present.
        false
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes.get(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id).and_then(|n| n.parent)
    }

    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        match &self.nodes.get(id)?.data {
            NodeData::Element(el) => Some(el.tag_name()),
            _ => None,
        }
    }

    pub fn style(&self, id: NodeId) -> Option<&StyleDeclaration> {
        match &self.nodes.get(id)?.data {
            NodeData::Element(el) => Some(&el.style),
            _ => None,
        }
    }

    pub fn style_mut(&mut self, id: NodeId) -> Option<&mut StyleDeclaration> {
        match &mut self.nodes.get_mut(id)?.data {
            NodeData::Element(el) => Some(&mut el.style),
            _ => None,
        }
    }

    /// Literal data of a text node, or the concatenated text of a subtree.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        match &node.data {
            NodeData::Text(text) => out.push_str(text),
            _ => {
                for &child in &node.children {
                    self.collect_text(child, out);
                }
            }
        }
    }

    pub fn set_text(&mut self, id: NodeId, text: &str) -> Result<()> {
        self.checked(id)?;
        match &mut self.nodes[id].data {
            NodeData::Text(data) => {
                *data = text.to_string();
                Ok(())
            }
            _ => Err(Error::DomError(format!("node {} is not a text node", id))),
        }
    }

    /// Append `child` as the last child of `parent`, detaching it from its
    /// previous parent first.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        let parent_node = self.checked(parent)?;
        if matches!(parent_node.data, NodeData::Text(_)) {
            return Err(Error::DomError(format!(
                "text node {} cannot have children",
                parent
            )));
        }
        let child_node = self.checked(child)?;
        if matches!(child_node.data, NodeData::Document) {
            return Err(Error::DomError("the document node cannot be appended".into()));
        }
        if self.is_inclusive_ancestor(child, parent) {
            return Err(Error::DomError(format!(
                "node {} is an ancestor of {}",
                child, parent
            )));
        }
        self.detach(child);
        self.attach(parent, child);
        Ok(())
    }

    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.checked(parent)?;
        if self.checked(child)?.parent != Some(parent) {
            return Err(Error::DomError(format!(
                "node {} is not a child of {}",
                child, parent
            )));
        }
        self.detach(child);
        Ok(())
    }

    fn attach(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[parent].children.push(child);
        self.nodes[child].parent = Some(parent);
    }

    fn detach(&mut self, child: NodeId) {
        if let Some(old) = self.nodes[child].parent.take() {
            self.nodes[old].children.retain(|&c| c != child);
        }
    }

    fn is_inclusive_ancestor(&self, ancestor: NodeId, mut node: NodeId) -> bool {
        loop {
            if node == ancestor {
                return true;
            }
            match self.nodes[node].parent {
                Some(p) => node = p,
                None => return false,
            }
        }
    }

    /// Markup-like rendering of a subtree, mainly for the CLI and tests.
    ///
    /// Text is written verbatim and styles are written back as a `style`
    /// attribute; this is not an HTML serializer.
    pub fn markup(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_markup(id, &mut out);
        out
    }

    fn write_markup(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        match &node.data {
            NodeData::Text(text) => out.push_str(text),
            NodeData::Document => {
                for &child in &node.children {
                    self.write_markup(child, out);
                }
            }
            NodeData::Element(el) => {
                let tag = el.tag_name.to_ascii_lowercase();
                out.push('<');
                out.push_str(&tag);
                if !el.style.is_empty() {
                    out.push_str(&format!(" style=\"{}\"", el.style.css_text()));
                }
                out.push('>');
                for &child in &node.children {
                    self.write_markup(child, out);
                }
                out.push_str(&format!("</{}>", tag));
            }
        }
    }
}
