//! Script surface of the DOM.
//!
//! A handful of `__rfox_dom_*` natives operate on node ids; `dom_prelude.js`
//! wraps them into `document`, element and text node objects. Natives convert
//! their arguments before borrowing the document, so a conversion that calls
//! back into script can never observe a held borrow.

use std::cell::RefCell;

use boa_engine::object::builtins::JsArray;
use boa_engine::{Context, JsArgs, JsResult, JsString, JsValue, NativeFunction, Source};

use crate::dom::{Document, NodeId, NodeType};
use crate::state::{self, StateKey};
use crate::Error;

type DomFn = fn(&RefCell<Document>, &[JsValue], &mut Context) -> JsResult<JsValue>;

const NATIVES: &[(&str, usize, DomFn)] = &[
    ("__rfox_dom_document_element", 0, document_element),
    ("__rfox_dom_body", 0, body),
    ("__rfox_dom_create_element", 1, create_element),
    ("__rfox_dom_create_text_node", 1, create_text_node),
    ("__rfox_dom_append_child", 2, append_child),
    ("__rfox_dom_remove_child", 2, remove_child),
    ("__rfox_dom_child_nodes", 1, child_nodes),
    ("__rfox_dom_parent", 1, parent),
    ("__rfox_dom_node_type", 1, node_type),
    ("__rfox_dom_tag_name", 1, tag_name),
    ("__rfox_dom_text", 1, text),
    ("__rfox_dom_set_text", 2, set_text),
    ("__rfox_dom_style_get", 2, style_get),
    ("__rfox_dom_style_set", 3, style_set),
    ("__rfox_dom_style_remove", 2, style_remove),
    ("__rfox_dom_style_text", 1, style_text),
];

/// Install the DOM natives, `__rfox_parse_html__`, and the `document` prelude.
pub(crate) fn register(context: &mut Context, key: StateKey) -> JsResult<()> {
    for &(name, length, f) in NATIVES {
        let function = NativeFunction::from_copy_closure(move |_this, args, context| {
            let state = state::get(key)?;
            f(&state.document, args, context)
        });
        context.register_global_builtin_callable(JsString::from(name), length, function)?;
    }

    let parse_html = NativeFunction::from_copy_closure(move |_this, args, context| {
        let html = args.get_or_undefined(0).to_string(context)?.to_std_string_escaped();
        let state = state::get(key)?;
        Ok(JsValue::from(state.parser.parse_html(context, &html)))
    });
    context.register_global_builtin_callable(JsString::from("__rfox_parse_html__"), 1, parse_html)?;

    context.eval(Source::from_bytes(include_str!("dom_prelude.js").as_bytes()))?;
    Ok(())
}

fn id_value(id: NodeId) -> JsResult<JsValue> {
    let id = u32::try_from(id)
        .map_err(|_| Error::DomError(format!("node id {} does not fit a script number", id)))?;
    Ok(JsValue::from(id))
}

fn optional_id(id: Option<NodeId>) -> JsResult<JsValue> {
    id.map_or_else(|| Ok(JsValue::null()), id_value)
}

fn node_arg(args: &[JsValue], index: usize, context: &mut Context) -> JsResult<NodeId> {
    Ok(args.get_or_undefined(index).to_u32(context)? as NodeId)
}

fn string_arg(args: &[JsValue], index: usize, context: &mut Context) -> JsResult<String> {
    Ok(args.get_or_undefined(index).to_string(context)?.to_std_string_escaped())
}

fn no_node(id: NodeId) -> Error {
    Error::DomError(format!("no node with id {}", id))
}

fn document_element(doc: &RefCell<Document>, _args: &[JsValue], _context: &mut Context) -> JsResult<JsValue> {
    optional_id(doc.borrow().document_element())
}

fn body(doc: &RefCell<Document>, _args: &[JsValue], _context: &mut Context) -> JsResult<JsValue> {
    optional_id(doc.borrow().body())
}

fn create_element(doc: &RefCell<Document>, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let tag = string_arg(args, 0, context)?;
    let id = doc.borrow_mut().create_element(&tag);
    id_value(id)
}

fn create_text_node(doc: &RefCell<Document>, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let data = string_arg(args, 0, context)?;
    let id = doc.borrow_mut().create_text_node(&data);
    id_value(id)
}

fn append_child(doc: &RefCell<Document>, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let parent = node_arg(args, 0, context)?;
    let child = node_arg(args, 1, context)?;
    doc.borrow_mut().append_child(parent, child)?;
    id_value(child)
}

fn remove_child(doc: &RefCell<Document>, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let parent = node_arg(args, 0, context)?;
    let child = node_arg(args, 1, context)?;
    doc.borrow_mut().remove_child(parent, child)?;
    id_value(child)
}

fn child_nodes(doc: &RefCell<Document>, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let id = node_arg(args, 0, context)?;
    let ids = doc
        .borrow()
        .children(id)
        .iter()
        .map(|&c| id_value(c))
        .collect::<JsResult<Vec<_>>>()?;
    Ok(JsArray::from_iter(ids, context).into())
}

fn parent(doc: &RefCell<Document>, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let id = node_arg(args, 0, context)?;
    let parent = doc.borrow().parent(id);
    optional_id(parent)
}

fn node_type(doc: &RefCell<Document>, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let id = node_arg(args, 0, context)?;
    let kind = doc.borrow().node(id).map(|n| n.node_type()).ok_or_else(|| no_node(id))?;
    let code = match kind {
        NodeType::Element => 1,
        NodeType::Text => 3,
        NodeType::Document => 9,
    };
    Ok(JsValue::from(code))
}

fn tag_name(doc: &RefCell<Document>, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let id = node_arg(args, 0, context)?;
    Ok(doc
        .borrow()
        .tag_name(id)
        .map(|t| JsValue::from(JsString::from(t)))
        .unwrap_or_else(JsValue::null))
}

fn text(doc: &RefCell<Document>, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let id = node_arg(args, 0, context)?;
    let content = doc.borrow().text_content(id);
    Ok(JsValue::from(JsString::from(content.as_str())))
}

fn set_text(doc: &RefCell<Document>, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let id = node_arg(args, 0, context)?;
    let data = string_arg(args, 1, context)?;
    doc.borrow_mut().set_text(id, &data)?;
    Ok(JsValue::undefined())
}

fn style_get(doc: &RefCell<Document>, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let id = node_arg(args, 0, context)?;
    let name = string_arg(args, 1, context)?;
    let doc = doc.borrow();
    let style = doc.style(id).ok_or_else(|| no_node(id))?;
    Ok(JsValue::from(JsString::from(
        style.get_property_value(&name).unwrap_or_default(),
    )))
}

fn style_set(doc: &RefCell<Document>, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let id = node_arg(args, 0, context)?;
    let name = string_arg(args, 1, context)?;
    let value = string_arg(args, 2, context)?;
    doc.borrow_mut()
        .style_mut(id)
        .ok_or_else(|| no_node(id))?
        .set_property(&name, &value);
    Ok(JsValue::undefined())
}

fn style_remove(doc: &RefCell<Document>, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let id = node_arg(args, 0, context)?;
    let name = string_arg(args, 1, context)?;
    let old = doc
        .borrow_mut()
        .style_mut(id)
        .ok_or_else(|| no_node(id))?
        .remove_property(&name)
        .unwrap_or_default();
    Ok(JsValue::from(JsString::from(old.as_str())))
}

fn style_text(doc: &RefCell<Document>, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let id = node_arg(args, 0, context)?;
    let doc = doc.borrow();
    let style = doc.style(id).ok_or_else(|| no_node(id))?;
    Ok(JsValue::from(JsString::from(style.css_text().as_str())))
}
