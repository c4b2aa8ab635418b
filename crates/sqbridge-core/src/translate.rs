//! Stack and variable translation
//!
//! Converts remote stack entries and variable listings into the shapes the
//! IDE consumes. Remote lines are 1-based, bridge lines are 0-based.
//! Nested values are expanded lazily: every aggregate gets a handle naming
//! its path, and expanding it re-queries the debuggee with that path.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::{BridgeError, Result};
use crate::protocol::{RemoteVariable, Status, VariableList};

/// Separator between scope, frame and member path in the handle encoding
const SCOPE_SEPARATOR: char = ':';
/// Separator between member path segments
const MEMBER_SEPARATOR: &str = ",";

/// Variable types the debuggee reports for values with children
const AGGREGATE_TYPES: &[&str] = &["object", "table", "array", "instance", "class"];

/// A client-facing stack frame (0-based line)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StackFrame {
    pub index: usize,
    pub function_name: String,
    pub file: String,
    pub line: u32,
}

/// Frames of the current status; empty unless the debuggee is stopped
pub fn translate_stack(status: &Status) -> Vec<StackFrame> {
    if !status.runstate.is_stopped() {
        return Vec::new();
    }

    status
        .stack
        .iter()
        .enumerate()
        .map(|(index, entry)| StackFrame {
            index,
            function_name: entry.function.clone(),
            file: entry.file.clone(),
            line: entry.line.saturating_sub(1),
        })
        .collect()
}

/// Window of `frames` starting at `start`, at most `levels` long, plus the
/// total frame count
pub fn page_frames(frames: Vec<StackFrame>, start: usize, levels: usize) -> (Vec<StackFrame>, usize) {
    let total = frames.len();
    let window = frames.into_iter().skip(start).take(levels).collect();
    (window, total)
}

/// Path into the debuggee's variable space
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VariableHandle {
    Local { frame: u32, path: Vec<String> },
    Global { path: Vec<String> },
}

impl VariableHandle {
    pub fn local(frame: u32) -> Self {
        VariableHandle::Local {
            frame,
            path: Vec::new(),
        }
    }

    pub fn global() -> Self {
        VariableHandle::Global { path: Vec::new() }
    }

    pub fn path(&self) -> &[String] {
        match self {
            VariableHandle::Local { path, .. } | VariableHandle::Global { path } => path,
        }
    }

    /// Handle for member `name` of the value this handle points at
    pub fn child(&self, name: &str) -> Self {
        let mut child = self.clone();
        match &mut child {
            VariableHandle::Local { path, .. } | VariableHandle::Global { path } => {
                path.push(name.to_string())
            }
        }
        child
    }

    /// Member path as sent in the `path` query parameter
    pub fn member_path(&self) -> String {
        self.path().join(MEMBER_SEPARATOR)
    }

    /// Query name on the command channel, with the path url-encoded.
    /// The debuggee only serves frame locals; globals have no query.
    pub fn query_name(&self) -> Result<String> {
        match self {
            VariableHandle::Local { frame, .. } => {
                let encoded: String =
                    url::form_urlencoded::byte_serialize(self.member_path().as_bytes()).collect();
                Ok(format!("StackLocals/{frame}?path={encoded}"))
            }
            VariableHandle::Global { .. } => {
                Err(BridgeError::UnknownVariableScope(self.to_string()))
            }
        }
    }
}

/// `local:{frame}:{a,b,c}` or `global:{a,b,c}`
impl fmt::Display for VariableHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariableHandle::Local { frame, .. } => write!(
                f,
                "local{SCOPE_SEPARATOR}{frame}{SCOPE_SEPARATOR}{}",
                self.member_path()
            ),
            VariableHandle::Global { .. } => {
                write!(f, "global{SCOPE_SEPARATOR}{}", self.member_path())
            }
        }
    }
}

/// Integer references handed to the IDE, each naming one handle.
/// References start at 1 and are never reused.
#[derive(Debug)]
pub struct VariableHandles {
    next: i64,
    handles: HashMap<i64, VariableHandle>,
}

impl Default for VariableHandles {
    fn default() -> Self {
        Self {
            next: 1,
            handles: HashMap::new(),
        }
    }
}

impl VariableHandles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, handle: VariableHandle) -> i64 {
        let reference = self.next;
        self.next += 1;
        self.handles.insert(reference, handle);
        reference
    }

    pub fn get(&self, reference: i64) -> Option<&VariableHandle> {
        self.handles.get(&reference)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

/// A client-facing variable. `variables_reference` is 0 for scalars.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    pub type_name: String,
    pub value: String,
    pub variables_reference: i64,
}

/// A variable scope of one frame
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Scope {
    pub name: String,
    pub variables_reference: i64,
    pub expensive: bool,
}

/// Local and global scopes for `frame`
pub fn scopes_for_frame(frame: u32, handles: &mut VariableHandles) -> Vec<Scope> {
    vec![
        Scope {
            name: "Local".to_string(),
            variables_reference: handles.create(VariableHandle::local(frame)),
            expensive: false,
        },
        Scope {
            name: "Global".to_string(),
            variables_reference: handles.create(VariableHandle::global()),
            expensive: true,
        },
    ]
}

pub fn is_aggregate(type_name: &str) -> bool {
    AGGREGATE_TYPES.contains(&type_name)
}

/// Convert a listing under `parent`, registering a child handle for every
/// aggregate
pub fn expand_variables(
    parent: &VariableHandle,
    list: VariableList,
    handles: &mut VariableHandles,
) -> Vec<Variable> {
    list.variables
        .into_iter()
        .map(|RemoteVariable { name, type_name, value }| {
            let variables_reference = if is_aggregate(&type_name) {
                handles.create(parent.child(&name))
            } else {
                0
            };
            Variable {
                name,
                type_name,
                value,
                variables_reference,
            }
        })
        .collect()
}
