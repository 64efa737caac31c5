//! Tool registry and dispatch.
//!
//! The remote endpoint is declared a small set of invokable tools at
//! setup; when it emits an invocation batch the bridge dispatches each to
//! the registered callback and acknowledges every one, including names
//! with no registered handler, since the remote only needs to know its
//! instruction was received.

use std::fmt;
use std::str::FromStr;

use serde_json::{Value, json};

use voicenav_realtime::{ToolDefinition, ToolInvocation, ToolResult};

/// Wire name of the navigation tool.
pub const NAVIGATE: &str = "navigate";
/// Wire name of the open-panel tool.
pub const OPEN_PANEL: &str = "open_panel";
/// Wire name of the theme-toggle tool.
pub const TOGGLE_THEME: &str = "toggle_theme";

/// Site sections the remote may navigate to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Home,
    Work,
    Services,
    Process,
    Testimonials,
    About,
    Archive,
}

impl Section {
    /// All sections, in page order.
    pub const ALL: [Section; 7] = [
        Section::Home,
        Section::Work,
        Section::Services,
        Section::Process,
        Section::Testimonials,
        Section::About,
        Section::Archive,
    ];

    /// The wire identifier for this section.
    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Home => "home",
            Section::Work => "work",
            Section::Services => "services",
            Section::Process => "process",
            Section::Testimonials => "testimonials",
            Section::About => "about",
            Section::Archive => "archive",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Section {
    type Err = UnknownSection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Section::ALL
            .into_iter()
            .find(|section| section.as_str() == s)
            .ok_or_else(|| UnknownSection(s.to_string()))
    }
}

/// Error for a section identifier outside the declared enum.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown section: {0}")]
pub struct UnknownSection(pub String);

type NavigateFn = Box<dyn Fn(Section) + Send + Sync>;
type ActionFn = Box<dyn Fn() + Send + Sync>;

/// Registered local actions the remote endpoint may invoke.
#[derive(Default)]
pub struct ToolRegistry {
    navigate: Option<NavigateFn>,
    open_panel: Option<ActionFn>,
    toggle_theme: Option<ActionFn>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the navigation callback.
    pub fn on_navigate(mut self, callback: impl Fn(Section) + Send + Sync + 'static) -> Self {
        self.navigate = Some(Box::new(callback));
        self
    }

    /// Register the open-panel callback.
    pub fn on_open_panel(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.open_panel = Some(Box::new(callback));
        self
    }

    /// Register the theme-toggle callback.
    pub fn on_toggle_theme(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.toggle_theme = Some(Box::new(callback));
        self
    }

    /// The capability declaration for session setup.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let sections: Vec<&str> = Section::ALL.iter().map(Section::as_str).collect();
        vec![
            ToolDefinition::new(NAVIGATE)
                .with_description("Navigate to a specific section of the website.")
                .with_parameters(json!({
                    "type": "object",
                    "properties": {
                        "section": {
                            "type": "string",
                            "enum": sections,
                            "description": "The section ID to navigate to.",
                        },
                    },
                    "required": ["section"],
                })),
            ToolDefinition::new(OPEN_PANEL)
                .with_description("Open the assistant panel for a longer conversation."),
            ToolDefinition::new(TOGGLE_THEME)
                .with_description("Toggle the site between light and dark themes."),
        ]
    }

    /// Dispatch one invocation and produce its acknowledgment.
    ///
    /// Always returns a result referencing the invocation id, whether or
    /// not a handler is registered or the arguments parse.
    pub fn dispatch(&self, invocation: &ToolInvocation) -> ToolResult {
        match invocation.name.as_str() {
            NAVIGATE => self.dispatch_navigate(invocation),
            OPEN_PANEL => {
                if let Some(callback) = &self.open_panel {
                    callback();
                    ToolResult::ok(&invocation.id, &invocation.name)
                } else {
                    Self::unhandled(invocation)
                }
            }
            TOGGLE_THEME => {
                if let Some(callback) = &self.toggle_theme {
                    callback();
                    ToolResult::ok(&invocation.id, &invocation.name)
                } else {
                    Self::unhandled(invocation)
                }
            }
            other => {
                tracing::warn!(tool = other, id = %invocation.id, "unknown tool invocation");
                Self::unhandled(invocation)
            }
        }
    }

    fn dispatch_navigate(&self, invocation: &ToolInvocation) -> ToolResult {
        let Some(callback) = &self.navigate else {
            return Self::unhandled(invocation);
        };
        let section = invocation
            .args
            .get("section")
            .and_then(Value::as_str)
            .map(Section::from_str);
        match section {
            Some(Ok(section)) => {
                callback(section);
                ToolResult::ok(&invocation.id, &invocation.name)
            }
            Some(Err(e)) => {
                tracing::warn!(id = %invocation.id, error = %e, "navigate: bad section");
                Self::unhandled(invocation)
            }
            None => {
                tracing::warn!(id = %invocation.id, "navigate: missing section argument");
                Self::unhandled(invocation)
            }
        }
    }

    // Still an acknowledgment; the remote only needs receipt.
    fn unhandled(invocation: &ToolInvocation) -> ToolResult {
        ToolResult::with_result(
            &invocation.id,
            &invocation.name,
            json!({ "result": "unhandled" }),
        )
    }
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("navigate", &self.navigate.is_some())
            .field("open_panel", &self.open_panel.is_some())
            .field("toggle_theme", &self.toggle_theme.is_some())
            .finish()
    }
}
