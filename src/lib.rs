/*!
# Zendo

A web chat application core where each user can spin up small "applets",
named units of JSON state driven by slash commands typed into the chat.

## Overview

Every submitted chat message is a *turn*. Plain text is echoed back by the
assistant; text starting with `/` is a command that creates, lists, inspects
or feeds applets. Applet state is stored per user and never leaks across
users: a record owned by someone else simply does not exist for you.

## Architecture

### Core (always built)
- **Conversation History** - append-only log of `user` / `assistant` /
  `system` entries for one chat session
- **Applets** - pluggable variants with a pure `process(input, state)`
  transition and an HTML `render`
- **Applet Registry** - name and alias lookup for applet variants, built
  explicitly and passed around by reference
- **Applet Store** - owner-scoped create/list/get/update of JSON records,
  mirrored to `database/applet_state.json`
- **Command Interpreter** - parses one message, dispatches it, and appends
  the outcome to the history
- **User Directory** - numeric ids and profiles for the users an upstream
  authenticator vouches for

### Web layer (`web` feature)
- axum router exposing the interpreter as a JSON endpoint
- the client holds the session state and sends it with every message

## Commands

- `/help` - list the commands
- `/avail` - list the registered applet names
- `/new <applet_name>` - create an applet and make it current
- `/list` - list your applets
- `/state` - show the current applet's state
- `/switch <applet_id>` - make another of your applets current
- `/send <message>` - forward text to the current applet

## Modules

- **history**: conversation entries and the append-only log
- **applet**: the `Applet` trait and the built-in `chat_history` applet
- **registry**: applet variant lookup
- **store**: persisted applet records
- **interpreter**: chat turns and slash commands
- **users**: user profiles and the identity handed to the interpreter
- **config**: environment-driven settings
- **error**: error types
- **app**: HTTP routing (`web` feature only)
*/

pub mod applet;
pub mod config;
pub mod error;
pub mod history;
pub mod interpreter;
pub mod registry;
pub mod store;
pub mod users;

#[cfg(feature = "web")]
pub mod app;

/// Re-export the types most callers need
pub use applet::{Applet, AppletFactory, AppletKind, ChatHistoryApplet};
pub use config::Config;
pub use error::{AppletError, ConfigError, DirectoryError, StoreError};
pub use history::{ChatEntry, ConversationHistory, Role};
pub use interpreter::{AppState, Command, Interpreter, Mode, Turn};
pub use registry::AppletRegistry;
pub use store::{AppletRecord, AppletStore, FileAppletStore};
pub use users::{CurrentUser, NewUser, ProfileUpdate, User, UserDirectory};
