//! Chat message handling and the slash-command state machine.
//!
//! Each submitted message is one turn: the interpreter appends the user's
//! entry to the conversation, then either echoes plain text or runs one
//! command against the applet registry and store. Every failure becomes a
//! `system` entry, so a turn always leaves `current_applet` and the history
//! consistent for the next one.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::history::{ChatEntry, ConversationHistory};
use crate::registry::AppletRegistry;
use crate::store::AppletStore;
use crate::users::CurrentUser;

pub const HELP_TEXT: &str = "Available commands: /help, /avail, /new <applet_name>, /list, /state, /switch <applet_id>, /send <message>";

/// Interaction mode of the main panel
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Chat,
    Timer,
}

/// Per-session application state
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppState {
    #[serde(default)]
    pub mode: Mode,

    /// Record most recently created or switched to
    #[serde(default)]
    pub current_applet: Option<String>,

    #[serde(default)]
    pub history: ConversationHistory,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A parsed slash command
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Help,
    Avail,
    New(Option<String>),
    List,
    State,
    Switch(Option<String>),
    /// Text forwarded to the current applet, internal whitespace intact
    Send(String),
    Unknown(String),
}

impl Command {
    /// Parse a line starting with `/`
    ///
    /// Returns `None` for plain chat text. Tokens are split on single spaces
    /// with no quoting, so `/new  x` has an empty first argument.
    pub fn parse(message: &str) -> Option<Command> {
        let body = message.strip_prefix('/')?.trim();
        let mut tokens = body.split(' ').map(str::trim);
        let name = tokens.next().unwrap_or("");
        let argument = tokens.next().map(str::to_string);

        let command = match name {
            "help" => Command::Help,
            "avail" => Command::Avail,
            "new" => Command::New(argument),
            "list" => Command::List,
            "state" => Command::State,
            "switch" => Command::Switch(argument),
            "send" => Command::Send(body[name.len()..].trim().to_string()),
            other => Command::Unknown(other.to_string()),
        };
        Some(command)
    }
}

/// Whether a turn changed the application state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Turn {
    /// No user, or nothing to say; state untouched
    Ignored,
    Handled,
}

/// Runs chat turns against a registry and a store
#[derive(Clone, Copy)]
pub struct Interpreter<'a> {
    registry: &'a AppletRegistry,
    store: &'a dyn AppletStore,
}

impl<'a> Interpreter<'a> {
    /// Create an interpreter over a registry and a store
    ///
    /// # Arguments
    /// * `registry` - Applet variants that `/new` and `/send` can resolve
    /// * `store` - Where applet records are created, read and updated
    pub fn new(registry: &'a AppletRegistry, store: &'a dyn AppletStore) -> Self {
        Interpreter { registry, store }
    }

    /// Process one submitted message
    ///
    /// Anonymous users and blank messages are ignored without touching
    /// `state`. Otherwise the history grows by at least one entry.
    ///
    /// # Arguments
    /// * `user` - Who sent the message, if anyone
    /// * `state` - Session state, updated in place
    /// * `message` - Raw text as submitted
    ///
    /// # Returns
    /// * `Turn::Handled` if `state` changed, `Turn::Ignored` otherwise
    pub fn handle(&self, user: Option<&CurrentUser>, state: &mut AppState, message: &str) -> Turn {
        let Some(user) = user.filter(|u| u.is_authenticated) else {
            return Turn::Ignored;
        };
        let message = message.trim();
        if message.is_empty() {
            return Turn::Ignored;
        }

        let mut turn = TurnContext {
            user,
            current_applet: state.current_applet.clone(),
            history: std::mem::take(&mut state.history),
        };
        turn.history.push(ChatEntry::user(&user.username, message));

        match Command::parse(message) {
            None => turn
                .history
                .push(ChatEntry::assistant(format!("You said: {}", message))),
            Some(command) => {
                debug!("user {} ran {:?}", user.id, command);
                self.dispatch(&mut turn, command);
            }
        }

        state.current_applet = turn.current_applet;
        state.history = turn.history;
        Turn::Handled
    }

    fn dispatch(&self, turn: &mut TurnContext<'_>, command: Command) {
        match command {
            Command::Help => turn.reply(HELP_TEXT),
            Command::Avail => {
                let names: Vec<&str> = self.registry.keys().collect();
                turn.reply(format!("Available applets: {}", names.join(", ")));
            }
            Command::New(None) => turn.reply("Usage: /new <applet_name>"),
            Command::New(Some(name)) => self.new_applet(turn, &name),
            Command::List => self.list_applets(turn),
            Command::State => self.show_state(turn),
            Command::Switch(None) => turn.reply("Usage: /switch <applet_id>"),
            Command::Switch(Some(id)) => self.switch_applet(turn, &id),
            Command::Send(text) => self.send_to_applet(turn, &text),
            Command::Unknown(token) => turn.fail(format!(
                "Unknown command: /{}. Type /help for available commands.",
                token
            )),
        }
    }

    fn new_applet(&self, turn: &mut TurnContext<'_>, name: &str) {
        let Some(kind) = self.registry.resolve(name) else {
            return turn.fail("Error creating applet: Applet not found.");
        };

        let applet = kind.spawn();
        match self
            .store
            .create(applet.id(), turn.user.id, kind.name, applet.init_state())
        {
            Ok(record) => {
                turn.reply(format!(
                    "Created and switched to applet: {} of type {} ({}).",
                    name, kind.name, record.id
                ));
                turn.current_applet = Some(record.id);
            }
            Err(e) => turn.fail(format!("Error creating applet: {}", e)),
        }
    }

    fn list_applets(&self, turn: &mut TurnContext<'_>) {
        match self.store.list(turn.user.id) {
            Ok(records) if records.is_empty() => turn.reply("No applets available."),
            Ok(records) => {
                let listing: Vec<String> = records
                    .iter()
                    .map(|record| format!("{}({})", record.applet_name, record.id))
                    .collect();
                turn.reply(format!("Current applets: {}", listing.join(", ")));
            }
            Err(e) => turn.fail(format!("Error listing applets: {}", e)),
        }
    }

    fn show_state(&self, turn: &mut TurnContext<'_>) {
        let Some(id) = turn.current_applet.clone() else {
            return turn.reply("No current applet to show state.");
        };

        match self.store.get(turn.user.id, &id) {
            Ok(record) => turn.reply(format!(
                "Applet state for {} ({}): {}",
                record.applet_name, id, record.state_data
            )),
            Err(e) => turn.fail(format!("Error retrieving applet state: {}", e)),
        }
    }

    fn switch_applet(&self, turn: &mut TurnContext<'_>, id: &str) {
        match self.store.get(turn.user.id, id) {
            Ok(record) => {
                turn.reply(format!(
                    "Switched to applet: {} ({})",
                    record.applet_name, record.id
                ));
                turn.current_applet = Some(record.id);
            }
            Err(e) => turn.fail(format!("Error switching to applet: {}", e)),
        }
    }

    fn send_to_applet(&self, turn: &mut TurnContext<'_>, text: &str) {
        let Some(id) = turn.current_applet.clone() else {
            return turn.reply("No current applet to send message to.");
        };

        let record = match self.store.get(turn.user.id, &id) {
            Ok(record) => record,
            Err(e) => return turn.fail(format!("Error retrieving applet: {}", e)),
        };

        let Some(kind) = self.registry.resolve(&record.applet_name) else {
            return turn.fail(format!("Applet {} not found.", record.applet_name));
        };

        let applet = kind.resume(&id);
        let next_state = match applet.process(text, &record.state_data) {
            Ok(next_state) => next_state,
            Err(e) => return turn.fail(e.to_string()),
        };

        match self.store.update(turn.user.id, &id, next_state) {
            Ok(_) => turn.reply(format!(
                "Message sent to applet {}: {}",
                record.applet_name, text
            )),
            Err(e) => turn.fail(format!("Error updating applet state: {}", e)),
        }
    }
}

/// Working copy of the session state for the duration of one turn
struct TurnContext<'u> {
    user: &'u CurrentUser,
    current_applet: Option<String>,
    history: ConversationHistory,
}

impl TurnContext<'_> {
    fn reply(&mut self, content: impl Into<String>) {
        let content = content.into();
        debug!("system: {}", content);
        self.history.push(ChatEntry::system(content));
    }

    fn fail(&mut self, content: impl Into<String>) {
        let content = content.into();
        warn!("user {}: {}", self.user.id, content);
        self.history.push(ChatEntry::system(content));
    }
}
