//! Login session lifecycle states.

use serde::{Deserialize, Serialize};

/// State of the single authenticated browser context of a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    #[default]
    Unauthenticated,
    Authenticating,
    Authenticated,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Authenticated | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unauthenticated => "Unauthenticated",
            Self::Authenticating => "Authenticating",
            Self::Authenticated => "Authenticated",
            Self::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which signal settled the authentication race.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginSignal {
    AvatarVisible,
    PaginationVisible,
    CredentialFormGone,
}
