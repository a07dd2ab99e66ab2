//! Backend mode shared by the controllers.

use std::fmt;

/// Where note operations are served from.
///
/// `Uninitialized` until the session has looked for backend credentials.
/// `Offline` is terminal: once a session falls back to the local store it
/// stays there.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BackendMode {
    #[default]
    Uninitialized,
    Hosted,
    Offline,
}

impl BackendMode {
    pub const fn is_hosted(self) -> bool {
        matches!(self, Self::Hosted)
    }

    pub const fn is_offline(self) -> bool {
        matches!(self, Self::Offline)
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Hosted => "hosted",
            Self::Offline => "offline",
        }
    }
}

impl fmt::Display for BackendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
