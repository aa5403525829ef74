//! Commands sent to the panel.
//!
//! Commands are ASCII instructions; the transport appends the terminator.

use std::fmt;

use bytes::Bytes;

/// Component attribute addressed by a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    /// Text content (`.txt`).
    Text,
    /// Numeric value (`.val`).
    Value,
    /// Panel-assigned component ID (`.id`).
    Id,
}

impl Attribute {
    /// Attribute suffix as written in commands.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "txt",
            Self::Value => "val",
            Self::Id => "id",
        }
    }
}

/// Instruction for the panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelCommand {
    /// `get <component>.<attribute>`, answered with string or numeric data.
    Get {
        component: String,
        attribute: Attribute,
    },
    /// `<component>.txt=<text>`.
    SetText { component: String, text: String },
    /// `<component>.val=<value>`.
    SetValue { component: String, value: u32 },
    /// `sendme`, answered with the current page number.
    SendMe,
}

impl PanelCommand {
    /// Creates a `get` command.
    #[must_use]
    pub fn get(component: impl Into<String>, attribute: Attribute) -> Self {
        Self::Get {
            component: component.into(),
            attribute,
        }
    }

    /// Encodes the command as a frame payload (without terminator).
    #[must_use]
    pub fn encode(&self) -> Bytes {
        Bytes::from(self.to_string())
    }
}

impl fmt::Display for PanelCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get {
                component,
                attribute,
            } => write!(f, "get {component}.{}", attribute.as_str()),
            Self::SetText { component, text } => write!(f, "{component}.txt={text}"),
            Self::SetValue { component, value } => write!(f, "{component}.val={value}"),
            Self::SendMe => f.write_str("sendme"),
        }
    }
}
