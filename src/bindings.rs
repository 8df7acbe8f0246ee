//! Script-callable globals backed by host capabilities.
//!
//! Each entry in [`BINDINGS`] declares its parameters and the capability it
//! needs; arguments and capability are checked before the handler runs, so a
//! rejected call has no side effect.

use std::cell::RefCell;
use std::rc::Rc;

use boa_engine::{
    js_string, Context, JsError, JsNativeError, JsObject, JsResult, JsString, JsValue, NativeFunction,
};

use crate::bridge::{BridgeCallback, CallbackContext};
use crate::host::{Capability, HostMethods, MethodCall, MousePointer, SnapshotRequest};
use crate::state::{self, StateKey};
use crate::Error;

/// Script-level type a parameter must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Function,
    String,
    Number,
    Array,
    Any,
}

impl ArgKind {
    pub fn accepts(self, value: &JsValue) -> bool {
        match self {
            ArgKind::Function => value.is_callable(),
            ArgKind::String => value.is_string(),
            ArgKind::Number => value.is_number(),
            ArgKind::Array => value.as_object().map(|o| o.is_array()).unwrap_or(false),
            ArgKind::Any => true,
        }
    }

    fn expectation(self) -> &'static str {
        match self {
            ArgKind::Function => "is not a function",
            ArgKind::String => "must be a string",
            ArgKind::Number => "must be a number",
            ArgKind::Array => "must be an array",
            ArgKind::Any => "is invalid",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Param {
    pub name: &'static str,
    pub kind: ArgKind,
}

const fn param(name: &'static str, kind: ArgKind) -> Param {
    Param { name, kind }
}

type Handler = fn(&Binding, &BindingScope, &[JsValue], &mut Context) -> JsResult<JsValue>;

/// One script-callable global.
pub struct Binding {
    pub name: &'static str,
    pub params: &'static [Param],
    pub capability: Option<Capability>,
    handler: Handler,
}

impl Binding {
    /// Type-check `args` against the declared parameters.
    pub fn check_args(&self, args: &[JsValue]) -> crate::Result<()> {
        let undefined = JsValue::undefined();
        for (i, p) in self.params.iter().enumerate() {
            let value = args.get(i).unwrap_or(&undefined);
            if !p.kind.accepts(value) {
                return Err(Error::ArgumentType {
                    operation: self.name,
                    index: i + 1,
                    name: p.name,
                    expectation: p.kind.expectation(),
                });
            }
        }
        Ok(())
    }

    fn invoke(&self, scope: &BindingScope, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
        self.check_args(args)?;
        if let Some(capability) = self.capability {
            if !scope.host.borrow().has(capability) {
                return Err(Error::CapabilityUnavailable {
                    operation: self.name,
                    capability: capability.name(),
                }
                .into());
            }
        }
        (self.handler)(self, scope, args, context)
    }
}

pub static BINDINGS: &[Binding] = &[
    Binding {
        name: "__rfox_execute_test__",
        params: &[param("callback", ArgKind::Function)],
        capability: None,
        handler: execute_test,
    },
    Binding {
        name: "__rfox_match_image_snapshot__",
        params: &[
            param("bytes", ArgKind::Array),
            param("name", ArgKind::String),
            param("callback", ArgKind::Function),
        ],
        capability: Some(Capability::MatchImageSnapshot),
        handler: match_image_snapshot,
    },
    Binding {
        name: "__rfox_environment__",
        params: &[],
        capability: Some(Capability::Environment),
        handler: environment,
    },
    Binding {
        name: "__rfox_simulate_pointer__",
        params: &[
            param("pointers", ArgKind::Array),
            param("pointer", ArgKind::Number),
        ],
        capability: Some(Capability::SimulatePointer),
        handler: simulate_pointer,
    },
    Binding {
        name: "__rfox_simulate_inputtext__",
        params: &[param("text", ArgKind::String)],
        capability: Some(Capability::SimulateInputText),
        handler: simulate_input_text,
    },
    Binding {
        name: "__rfox_invoke_method__",
        params: &[
            param("method", ArgKind::String),
            param("args", ArgKind::Any),
            param("callback", ArgKind::Function),
        ],
        capability: Some(Capability::InvokeMethod),
        handler: invoke_method,
    },
];

pub fn lookup(name: &str) -> Option<&'static Binding> {
    BINDINGS.iter().find(|b| b.name == name)
}

/// State shared by every binding of one script context.
pub(crate) struct BindingScope {
    context_id: i32,
    host: RefCell<HostMethods>,
    bridge: Rc<BridgeCallback>,
    execute_test: RefCell<Option<JsObject>>,
}

impl BindingScope {
    pub(crate) fn new(context_id: i32, host: HostMethods, bridge: Rc<BridgeCallback>) -> Self {
        Self {
            context_id,
            host: RefCell::new(host),
            bridge,
            execute_test: RefCell::new(None),
        }
    }

    pub(crate) fn take_execute_test(&self) -> Option<JsObject> {
        self.execute_test.borrow_mut().take()
    }

    /// Drop every host capability. Bindings called afterwards throw.
    pub(crate) fn release_host(&self) {
        *self.host.borrow_mut() = HostMethods::new();
    }

    /// Clone the capability `binding` needs out of the host table.
    fn resolve<T>(&self, binding: &Binding, pick: impl FnOnce(&HostMethods) -> Option<T>) -> JsResult<T> {
        pick(&self.host.borrow()).ok_or_else(|| {
            JsError::from(Error::CapabilityUnavailable {
                operation: binding.name,
                capability: binding.capability.map(Capability::name).unwrap_or("none"),
            })
        })
    }
}

/// Install every entry of [`BINDINGS`] as a global function of the context
/// whose state is stored under `key`.
pub(crate) fn register(context: &mut Context, key: StateKey) -> JsResult<()> {
    for binding in BINDINGS {
        let function = NativeFunction::from_copy_closure(move |_this, args, context| {
            let state = state::get(key)?;
            binding.invoke(&state.scope, args, context)
        });
        context.register_global_builtin_callable(JsString::from(binding.name), binding.params.len(), function)?;
    }
    Ok(())
}

fn callback_arg(args: &[JsValue], index: usize) -> JsResult<JsObject> {
    args.get(index)
        .and_then(|v| v.as_callable())
        .cloned()
        .ok_or_else(|| JsNativeError::typ().with_message("callback is not a function").into())
}

fn object_arg(args: &[JsValue], index: usize) -> JsResult<JsObject> {
    args.get(index)
        .and_then(|v| v.as_object())
        .cloned()
        .ok_or_else(|| JsNativeError::typ().with_message("argument is not an object").into())
}

fn string_arg(args: &[JsValue], index: usize, context: &mut Context) -> JsResult<String> {
    let value = args.get(index).cloned().unwrap_or_else(JsValue::undefined);
    Ok(value.to_string(context)?.to_std_string_escaped())
}

fn array_length(array: &JsObject, context: &mut Context) -> JsResult<u32> {
    array.get(js_string!("length"), context)?.to_u32(context)
}

fn execute_test(_binding: &Binding, scope: &BindingScope, args: &[JsValue], _context: &mut Context) -> JsResult<JsValue> {
    let callback = callback_arg(args, 0)?;
    // Replacing a previous callback releases it.
    scope.execute_test.borrow_mut().replace(callback);
    Ok(JsValue::null())
}

fn match_image_snapshot(
    binding: &Binding,
    scope: &BindingScope,
    args: &[JsValue],
    context: &mut Context,
) -> JsResult<JsValue> {
    let array = object_arg(args, 0)?;
    let len = array_length(&array, context)?;
    let mut bytes = Vec::with_capacity(len as usize);
    for i in 0..len {
        bytes.push(array.get(i, context)?.to_uint8(context)?);
    }
    let name = string_arg(args, 1, context)?;
    let callback = callback_arg(args, 2)?;

    let capability = scope.resolve(binding, |host| host.match_image_snapshot.clone())?;
    let pending = CallbackContext::new(scope.context_id, callback, "__rfox_match_image_snapshot__");
    scope.bridge.register_callback(pending, move |handle, context_id| {
        capability(SnapshotRequest { context_id, name, bytes }, handle);
    });
    Ok(JsValue::null())
}

fn environment(binding: &Binding, scope: &BindingScope, _args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let capability = scope.resolve(binding, |host| host.environment.clone())?;
    let env = capability();
    let json: serde_json::Value = serde_json::from_str(&env).map_err(|e| {
        JsNativeError::syntax().with_message(format!(
            "Failed to execute '__rfox_environment__': host returned invalid JSON: {}",
            e
        ))
    })?;
    JsValue::from_json(&json, context)
}

fn simulate_pointer(binding: &Binding, scope: &BindingScope, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let list = object_arg(args, 0)?;
    let len = array_length(&list, context)?;
    let mut pointers = Vec::with_capacity(len as usize);
    for i in 0..len {
        let entry = list.get(i, context)?;
        let Some(entry) = entry.as_object() else {
            return Err(JsNativeError::typ()
                .with_message(format!(
                    "Failed to execute '__rfox_simulate_pointer__': pointer {} is not an array",
                    i
                ))
                .into());
        };
        pointers.push(MousePointer {
            context_id: scope.context_id,
            x: entry.get(0, context)?.to_number(context)?,
            y: entry.get(1, context)?.to_number(context)?,
            change: entry.get(2, context)?.to_number(context)?,
        });
    }
    let pointer = args.get(1).cloned().unwrap_or_else(JsValue::undefined).to_u32(context)?;

    let capability = scope.resolve(binding, |host| host.simulate_pointer.clone())?;
    capability(&pointers, pointer);
    Ok(JsValue::null())
}

fn simulate_input_text(binding: &Binding, scope: &BindingScope, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let text = string_arg(args, 0, context)?;
    let capability = scope.resolve(binding, |host| host.simulate_input_text.clone())?;
    capability(&text);
    Ok(JsValue::null())
}

fn invoke_method(binding: &Binding, scope: &BindingScope, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let method = string_arg(args, 0, context)?;
    let arguments = match args.get(1) {
        Some(v) if !v.is_undefined() => v.to_json(context)?,
        _ => serde_json::Value::Null,
    };
    let callback = callback_arg(args, 2)?;

    let capability = scope.resolve(binding, |host| host.invoke_method.clone())?;
    let pending = CallbackContext::new(scope.context_id, callback, "__rfox_invoke_method__");
    scope.bridge.register_callback(pending, move |handle, context_id| {
        capability(
            MethodCall {
                context_id,
                method,
                arguments,
            },
            handle,
        );
    });
    Ok(JsValue::null())
}
