//! Client descriptor types sent during the handshake.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Well-known client identifiers understood by the gateway.
pub mod client_ids {
    pub const WEBCHAT_UI: &str = "webchat-ui";
    pub const CONTROL_UI: &str = "openclaw-control-ui";
    pub const WEBCHAT: &str = "webchat";
    pub const CLI: &str = "cli";
    pub const GATEWAY_CLIENT: &str = "gateway-client";
    pub const NODE_HOST: &str = "node-host";
    pub const TEST: &str = "test";
    pub const PROBE: &str = "openclaw-probe";
}

/// How the client intends to use the connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientMode {
    Webchat,
    #[default]
    Cli,
    Ui,
    Backend,
    Node,
    Probe,
    Test,
}

impl ClientMode {
    /// Wire name of the mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Webchat => "webchat",
            Self::Cli => "cli",
            Self::Ui => "ui",
            Self::Backend => "backend",
            Self::Node => "node",
            Self::Probe => "probe",
            Self::Test => "test",
        }
    }
}

impl fmt::Display for ClientMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClientMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "webchat" => Ok(Self::Webchat),
            "cli" => Ok(Self::Cli),
            "ui" => Ok(Self::Ui),
            "backend" => Ok(Self::Backend),
            "node" => Ok(Self::Node),
            "probe" => Ok(Self::Probe),
            "test" => Ok(Self::Test),
            other => Err(format!("unknown client mode: {other}")),
        }
    }
}
