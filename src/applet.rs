use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::AppletError;

/// A pluggable unit of per-conversation state
///
/// Instances are short-lived: the interpreter builds one whenever it needs to
/// initialise or advance a record, and only the resulting state is persisted.
pub trait Applet: Send {
    /// Identifier shared with the persisted record
    fn id(&self) -> &str;

    /// State for a freshly created instance
    fn init_state(&self) -> Value {
        Value::Object(Map::new())
    }

    /// Pure transition from the current persisted state to the next one
    ///
    /// Implementations must not perform I/O. Errors are reported back to the
    /// user and never abort the turn.
    fn process(&self, input: &str, state: &Value) -> Result<Value, AppletError>;

    /// HTML fragment for the applet's panel
    fn render(&self) -> String;
}

/// Constructor stored in the registry for one applet variant
pub type AppletFactory = fn(id: String) -> Box<dyn Applet>;

/// Class-level description of an applet variant
#[derive(Clone, Debug)]
pub struct AppletKind {
    /// Unique registry key, also stored on every record of this variant
    pub name: &'static str,
    pub description: &'static str,
    pub aliases: &'static [&'static str],
    pub factory: AppletFactory,
}

impl AppletKind {
    /// Create a new instance with a freshly generated id
    pub fn spawn(&self) -> Box<dyn Applet> {
        (self.factory)(Uuid::new_v4().to_string())
    }

    /// Rebuild an instance bound to an existing record id
    pub fn resume(&self, id: &str) -> Box<dyn Applet> {
        (self.factory)(id.to_string())
    }
}

/// Keeps a running log of the messages sent to it
#[derive(Debug, Clone)]
pub struct ChatHistoryApplet {
    id: String,
}

impl ChatHistoryApplet {
    pub const KIND: AppletKind = AppletKind {
        name: "chat_history",
        description: "Displays the chat history.",
        aliases: &["history", "chats"],
        factory: ChatHistoryApplet::boxed,
    };

    pub fn new(id: impl Into<String>) -> Self {
        ChatHistoryApplet { id: id.into() }
    }

    fn boxed(id: String) -> Box<dyn Applet> {
        Box::new(ChatHistoryApplet::new(id))
    }
}

impl Applet for ChatHistoryApplet {
    fn id(&self) -> &str {
        &self.id
    }

    fn process(&self, input: &str, state: &Value) -> Result<Value, AppletError> {
        let mut state = match state {
            Value::Null => Map::new(),
            Value::Object(map) => map.clone(),
            other => {
                return Err(AppletError::InvalidState(format!(
                    "expected an object, found {}",
                    json_type_name(other)
                )));
            }
        };

        let mut history = match state.remove("history") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items,
            Some(other) => {
                return Err(AppletError::InvalidState(format!(
                    "history must be a list, found {}",
                    json_type_name(&other)
                )));
            }
        };
        history.push(Value::String(input.to_string()));
        state.insert("history".to_string(), Value::Array(history));

        Ok(Value::Object(state))
    }

    fn render(&self) -> String {
        format!(
            "<div><p>Chat History Applet</p><p id=\"{}\"></p></div>",
            self.id
        )
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
