// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! User-facing configuration of the source and its property sheet.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Settings key holding the producer's socket path.
pub const SOCKPATH_KEY: &str = "sockpath";

/// Settings as stored by the host. Unknown keys are ignored; a missing
/// `sockpath` reads as empty and simply fails to connect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DmabufSourceSettings {
    pub sockpath: String,
}

impl DmabufSourceSettings {
    pub fn new(sockpath: impl Into<String>) -> Self {
        Self {
            sockpath: sockpath.into(),
        }
    }

    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        Ok(Self::deserialize(value)?)
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({ SOCKPATH_KEY: self.sockpath })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PathKind {
    /// An existing file (a socket counts).
    File,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Property {
    Path {
        key: &'static str,
        label: &'static str,
        kind: PathKind,
        filter: &'static str,
        default_path: Option<String>,
    },
}

impl Property {
    pub fn key(&self) -> &'static str {
        match self {
            Property::Path { key, .. } => key,
        }
    }
}

/// Property sheet the host renders for the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PropertySheet {
    pub properties: Vec<Property>,
}

impl PropertySheet {
    pub fn get(&self, key: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.key() == key)
    }
}

/// One file-path field pointing at the producer socket.
pub fn properties() -> PropertySheet {
    PropertySheet {
        properties: vec![Property::Path {
            key: SOCKPATH_KEY,
            label: "drmsend unix socket",
            kind: PathKind::File,
            filter: "*.*",
            default_path: None,
        }],
    }
}
