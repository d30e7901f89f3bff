use std::fmt;
use std::str::FromStr;

use serde_json::{json, Value};
use tempo_core::TaskKind;

use crate::error::{ChainError, Result};

/// Routines a worker provides for `BUILTIN` tasks. The task's `command` names
/// the routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    NoOp,
    Sleep,
    Log,
    SendMail,
    Download,
    CopyFromFile,
    CopyToFile,
    Shutdown,
}

impl Builtin {
    pub const ALL: [Builtin; 8] = [
        Builtin::NoOp,
        Builtin::Sleep,
        Builtin::Log,
        Builtin::SendMail,
        Builtin::Download,
        Builtin::CopyFromFile,
        Builtin::CopyToFile,
        Builtin::Shutdown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Builtin::NoOp => "NoOp",
            Builtin::Sleep => "Sleep",
            Builtin::Log => "Log",
            Builtin::SendMail => "SendMail",
            Builtin::Download => "Download",
            Builtin::CopyFromFile => "CopyFromFile",
            Builtin::CopyToFile => "CopyToFile",
            Builtin::Shutdown => "Shutdown",
        }
    }

    /// JSON Schema every non-null parameter of this routine must satisfy.
    pub fn schema(self) -> Value {
        match self {
            Builtin::NoOp | Builtin::Log => json!(true),
            Builtin::Sleep => json!({ "type": "integer", "minimum": 0 }),
            Builtin::SendMail => json!({
                "type": "object",
                "required": ["serverhost", "serverport", "senderaddr", "toaddr"],
                "properties": {
                    "username":    { "type": "string" },
                    "password":    { "type": "string" },
                    "serverhost":  { "type": "string", "minLength": 1 },
                    "serverport":  { "type": "integer", "minimum": 1, "maximum": 65535 },
                    "senderaddr":  { "type": "string", "pattern": "@" },
                    "toaddr":      { "$ref": "#/definitions/addresses" },
                    "ccaddr":      { "$ref": "#/definitions/addresses" },
                    "bccaddr":     { "$ref": "#/definitions/addresses" },
                    "subject":     { "type": "string" },
                    "msgbody":     { "type": "string" },
                    "attachment":  { "type": "array", "items": { "type": "string" } },
                    "contenttype": { "type": "string" }
                },
                "additionalProperties": false,
                "definitions": {
                    "addresses": {
                        "type": "array",
                        "items": { "type": "string", "pattern": "@" }
                    }
                }
            }),
            Builtin::Download => json!({
                "type": "object",
                "required": ["fileurls", "destpath"],
                "properties": {
                    "workersnum": { "type": "integer", "minimum": 0 },
                    "fileurls": {
                        "type": "array",
                        "minItems": 1,
                        "items": { "type": "string", "pattern": "^[a-z][a-z0-9+.-]*://" }
                    },
                    "destpath": { "type": "string" }
                },
                "additionalProperties": false
            }),
            Builtin::CopyFromFile | Builtin::CopyToFile => json!({
                "type": "object",
                "required": ["sql", "filename"],
                "properties": {
                    "sql":      { "type": "string", "minLength": 1 },
                    "filename": { "type": "string", "minLength": 1 }
                },
                "additionalProperties": false
            }),
            // Takes no arguments.
            Builtin::Shutdown => json!(false),
        }
    }
}

impl fmt::Display for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Builtin {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim();
        Builtin::ALL
            .into_iter()
            .find(|b| b.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| ChainError::UnknownBuiltin(name.to_string()))
    }
}

/// Schema for one parameter value of a task of `kind` running `command`.
///
/// SQL parameters are positional argument arrays; PROGRAM parameters are
/// command-line argument lists (arrays of strings).
pub fn parameter_schema(kind: TaskKind, command: &str) -> Result<Value> {
    Ok(match kind {
        TaskKind::Sql => json!({ "type": "array" }),
        TaskKind::Program => json!({ "type": "array", "items": { "type": "string" } }),
        TaskKind::Builtin => command.parse::<Builtin>()?.schema(),
    })
}
