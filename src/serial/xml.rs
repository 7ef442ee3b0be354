//! XML text output.

use crate::tree::{Doctype, Document, NodeId, NodeKind};

/// Options controlling XML output.
///
/// # Examples
///
/// ```
/// use xmlgrove::Document;
/// use xmlgrove::serial::{serialize_with_options, SerializeOptions};
///
/// let doc = Document::parse("<root><child>Hello</child></root>", false).unwrap();
/// let opts = SerializeOptions::default().indent(true).declaration(false);
/// let xml = serialize_with_options(&doc, doc.root(), &opts);
/// assert_eq!(xml, "<root>\n  <child>Hello</child>\n</root>\n");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializeOptions {
    /// Put element-only content on indented lines. Defaults to `false`.
    pub indent: bool,
    /// One level of indentation. Defaults to two spaces.
    pub indent_str: String,
    /// Start whole-document output with `<?xml ...?>`. Defaults to `true`.
    pub declaration: bool,
}

impl Default for SerializeOptions {
    fn default() -> Self {
        Self {
            indent: false,
            indent_str: "  ".to_string(),
            declaration: true,
        }
    }
}

impl SerializeOptions {
    /// Enables or disables indented output.
    ///
    /// Elements holding text next to other elements are written as they
    /// are, since added whitespace would change their content.
    #[must_use]
    pub fn indent(mut self, indent: bool) -> Self {
        self.indent = indent;
        self
    }

    /// Sets the string written once per nesting level.
    #[must_use]
    pub fn indent_str(mut self, s: &str) -> Self {
        self.indent_str = s.to_string();
        self
    }

    /// Enables or disables the XML declaration.
    #[must_use]
    pub fn declaration(mut self, yes: bool) -> Self {
        self.declaration = yes;
        self
    }
}

/// Serializes a whole document with default options.
#[must_use]
pub fn serialize(doc: &Document) -> String {
    serialize_with_options(doc, doc.root(), &SerializeOptions::default())
}

/// Serializes `node` and its subtree.
///
/// For the document node the output is a complete document: declaration,
/// `<!DOCTYPE>` and root element, ending in a newline. Any other node is
/// written as a fragment with no declaration.
#[must_use]
pub fn serialize_with_options(doc: &Document, node: NodeId, options: &SerializeOptions) -> String {
    let mut writer = Writer {
        doc,
        options,
        out: String::with_capacity(256),
    };
    if node == doc.root() {
        writer.prolog();
        for child in doc.children(node) {
            writer.node(child, 0, true);
        }
        if !writer.out.ends_with('\n') {
            writer.out.push('\n');
        }
    } else {
        writer.node(node, 0, false);
    }
    writer.out
}

struct Writer<'a> {
    doc: &'a Document,
    options: &'a SerializeOptions,
    out: String,
}

impl Writer<'_> {
    fn prolog(&mut self) {
        let doc = self.doc;
        if self.options.declaration {
            self.out.push_str("<?xml version=\"");
            self.out.push_str(doc.version.as_deref().unwrap_or("1.0"));
            self.out.push('"');
            // The text produced here is UTF-8 whatever the source used.
            if doc.encoding.is_some() {
                self.out.push_str(" encoding=\"UTF-8\"");
            }
            if let Some(standalone) = doc.standalone {
                self.out.push_str(" standalone=\"");
                self.out.push_str(if standalone { "yes" } else { "no" });
                self.out.push('"');
            }
            self.out.push_str("?>\n");
        }
        if let Some(doctype) = &doc.doctype {
            self.doctype(doctype);
        }
    }

    fn doctype(&mut self, doctype: &Doctype) {
        self.out.push_str("<!DOCTYPE ");
        self.out.push_str(&doctype.name);
        match (&doctype.public_id, &doctype.system_id) {
            (Some(public), Some(system)) => {
                self.out.push_str(&format!(" PUBLIC \"{public}\" \"{system}\""));
            }
            (None, Some(system)) => self.out.push_str(&format!(" SYSTEM \"{system}\"")),
            _ => {}
        }
        if let Some(subset) = &doctype.internal_subset {
            self.out.push_str(" [\n");
            self.out.push_str(subset.trim_matches('\n'));
            self.out.push_str("\n]");
        }
        self.out.push_str(">\n");
    }

    fn pad(&mut self, depth: usize) {
        for _ in 0..depth {
            self.out.push_str(&self.options.indent_str);
        }
    }

    /// Writes a node and its subtree. `lined` is set when the node sits on
    /// its own line.
    fn node(&mut self, id: NodeId, depth: usize, lined: bool) {
        let mut pending = vec![Step::Open { id, depth, lined }];
        while let Some(step) = pending.pop() {
            match step {
                Step::Open { id, depth, lined } => self.open(id, depth, lined, &mut pending),
                Step::Close {
                    id,
                    depth,
                    lined,
                    block,
                } => self.close(id, depth, lined, block),
            }
        }
    }

    /// Writes a start tag, or a whole empty element, and queues the
    /// children followed by the end tag.
    fn open(&mut self, id: NodeId, depth: usize, lined: bool, pending: &mut Vec<Step>) {
        let doc = self.doc;
        let indent = self.options.indent && lined;
        let NodeKind::Element {
            name,
            attributes,
            namespaces,
            ..
        } = &doc.node(id).kind
        else {
            if let Some(content) = doc.node_text(id) {
                escape_text(&mut self.out, content);
            }
            return;
        };
        if indent {
            self.pad(depth);
        }
        self.out.push('<');
        self.out.push_str(name);
        for decl in namespaces {
            self.out.push(' ');
            self.out.push_str(&decl.attribute_name());
            self.out.push_str("=\"");
            escape_attribute(&mut self.out, &decl.uri);
            self.out.push('"');
        }
        for attr in attributes {
            self.out.push(' ');
            self.out.push_str(&attr.name);
            self.out.push_str("=\"");
            escape_attribute(&mut self.out, &attr.value);
            self.out.push('"');
        }
        if doc.first_child(id).is_none() {
            self.out.push_str("/>");
            if indent {
                self.out.push('\n');
            }
            return;
        }
        self.out.push('>');
        let block = self.options.indent && is_element_only(doc, id);
        if block {
            self.out.push('\n');
        }
        pending.push(Step::Close {
            id,
            depth,
            lined,
            block,
        });
        let first = pending.len();
        for child in doc.children(id) {
            if block && doc.is_text(child) {
                continue;
            }
            pending.push(Step::Open {
                id: child,
                depth: depth + 1,
                lined: block,
            });
        }
        pending[first..].reverse();
    }

    fn close(&mut self, id: NodeId, depth: usize, lined: bool, block: bool) {
        if block {
            self.pad(depth);
        }
        self.out.push_str("</");
        self.out.push_str(self.doc.node_name(id).unwrap_or_default());
        self.out.push('>');
        if self.options.indent && lined {
            self.out.push('\n');
        }
    }
}

/// Pending work for [`Writer::node`].
enum Step {
    Open {
        id: NodeId,
        depth: usize,
        lined: bool,
    },
    Close {
        id: NodeId,
        depth: usize,
        lined: bool,
        block: bool,
    },
}

/// Returns `true` if an element's children are elements and blank text only.
fn is_element_only(doc: &Document, id: NodeId) -> bool {
    let mut has_element = false;
    for child in doc.children(id) {
        match doc.node_text(child) {
            Some(text) if !text.trim().is_empty() => return false,
            Some(_) => {}
            None => has_element = true,
        }
    }
    has_element
}

/// Escapes character data. `>` is escaped too so `]]>` never appears.
pub(crate) fn escape_text(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#13;"),
            _ => out.push(ch),
        }
    }
}

/// Escapes a double-quoted attribute value; whitespace other than spaces is
/// written as character references so it survives normalisation.
pub(crate) fn escape_attribute(out: &mut String, value: &str) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\n' => out.push_str("&#10;"),
            '\r' => out.push_str("&#13;"),
            '\t' => out.push_str("&#9;"),
            _ => out.push(ch),
        }
    }
}
