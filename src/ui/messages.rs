//! Messages exchanged between a front end and the session

use crate::context::{FileMeta, MetaTotals};
use crate::llm::Chat;
use serde::{Deserialize, Serialize};

/// Requests a front end sends to the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum Inbound {
    SetInclude { text: String },
    SetExclude { text: String },
    Ask { question: String },
    SetApiKey { key: String },
    ClearApiKey,
    Refresh,
}

/// Updates the session pushes to a front end
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum Outbound {
    Files { files: Vec<String> },
    Metas { metas: Vec<FileMeta>, totals: MetaTotals },
    Answer { chat: Chat },
    Error { message: String },
    Info { message: String },
}

impl Outbound {
    pub fn metas(metas: &[FileMeta]) -> Self {
        Self::Metas {
            metas: metas.to_vec(),
            totals: MetaTotals::of(metas),
        }
    }
}
