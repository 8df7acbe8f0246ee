//! HTML text to live DOM: walks the parsed fragment in document order, running
//! inline scripts and applying inline styles as it goes.

use std::cell::RefCell;
use std::rc::Rc;

use boa_engine::{Context, Source};
use scraper::{ElementRef, Html};

use crate::dom::{Document, NodeId};
use crate::engine::{run_jobs, ExceptionReporter};
use crate::{Error, Result};

/// Split an inline `style` attribute into `(name, value)` pairs.
///
/// Segments are separated by `;` and split on their first `:`; segments with
/// no `:` (including an empty trailing one) are skipped. Nothing is trimmed or
/// validated.
pub fn style_declarations(style: &str) -> impl Iterator<Item = (&str, &str)> {
    style.split(';').filter_map(|decl| decl.split_once(':'))
}

pub struct HtmlParser {
    document: Rc<RefCell<Document>>,
    reporter: ExceptionReporter,
    enable_javascript: bool,
}

impl HtmlParser {
    pub(crate) fn new(
        document: Rc<RefCell<Document>>,
        reporter: ExceptionReporter,
        enable_javascript: bool,
    ) -> Self {
        Self {
            document,
            reporter,
            enable_javascript,
        }
    }

    /// Parse `html` and append its content under the document body.
    ///
    /// Returns `false`, creating nothing, when the document has no body.
    /// Exceptions thrown by inline scripts are reported and do not stop the
    /// walk.
    pub fn parse_html(&self, context: &mut Context, html: &str) -> bool {
        let body = match self.document_body() {
            Ok(body) => body,
            Err(e) => {
                log::error!("{}", e);
                return false;
            }
        };

        // Parsed in body context: a leading <script> stays ahead of its
        // siblings instead of moving into <head>.
        let parsed = Html::parse_fragment(html);
        self.traverse(context, parsed.root_element(), body);
        true
    }

    fn document_body(&self) -> Result<NodeId> {
        self.document
            .borrow()
            .body()
            .ok_or_else(|| Error::StructuralParse("BODY is null.".into()))
    }

    fn traverse(&self, context: &mut Context, node: ElementRef<'_>, parent: NodeId) {
        for child in node.children() {
            if let Some(element) = ElementRef::wrap(child) {
                let name = element.value().name();
                let Some(created) = self.append(parent, |doc| doc.create_element(name)) else {
                    continue;
                };

                if name == "script" {
                    let code = element.children().next().and_then(|n| n.value().as_text());
                    if let Some(code) = code {
                        self.evaluate_inline(context, code);
                    }
                }

                if let Some(style) = element.value().attr("style") {
                    self.apply_inline_style(created, style);
                }

                self.traverse(context, element, created);
            } else if let Some(text) = child.value().as_text() {
                self.append(parent, |doc| doc.create_text_node(text));
            }
        }
    }

    /// Create a node and append it to `parent`. The borrow ends before
    /// returning so the caller may run script.
    fn append(&self, parent: NodeId, create: impl FnOnce(&mut Document) -> NodeId) -> Option<NodeId> {
        let mut doc = self.document.borrow_mut();
        let id = create(&mut doc);
        match doc.append_child(parent, id) {
            Ok(()) => Some(id),
            Err(e) => {
                log::warn!("dropping parsed node: {}", e);
                None
            }
        }
    }

    fn evaluate_inline(&self, context: &mut Context, code: &str) {
        if !self.enable_javascript {
            log::debug!("JavaScript disabled; skipping inline script");
            return;
        }
        if let Err(e) = context.eval(Source::from_bytes(code.as_bytes())) {
            self.reporter.report(&e);
        }
        run_jobs(context);
    }

    fn apply_inline_style(&self, element: NodeId, style: &str) {
        let mut doc = self.document.borrow_mut();
        let Some(declaration) = doc.style_mut(element) else {
            return;
        };
        for (name, value) in style_declarations(style) {
            declaration.set_property(name, value);
        }
    }
}
