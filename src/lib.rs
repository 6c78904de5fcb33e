// Public API
pub mod cli;
pub mod commands;

// Core domain types
pub mod alias;
pub mod bundle;
pub mod config;
pub mod credentials;
pub mod environment;
pub mod manifest;
pub mod navigate;
pub mod script;
pub mod session;
pub mod ui;
pub mod util;

// Re-export main types
pub use alias::{Alias, AliasTable};
pub use bundle::{Bundle, BundlePath};
pub use config::Config;
pub use credentials::{CredentialBinding, CredentialKey, CredentialProvider, ProviderRegistry};
pub use environment::{Environment, Shell};
pub use manifest::{Directive, DirectiveKind, Manifest};
pub use navigate::{BrowserCommand, NavigateError, Navigation, Navigator};
pub use script::Script;
pub use session::Session;
