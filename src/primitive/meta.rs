//! Attribution and bookkeeping fields common to all three entity kinds,
//! plus the dataset-level upload/download policies.

use chrono::{DateTime, Utc};

use super::tags::Tags;

/// Who last touched an entity, as the server reports it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum UserInfo {
    /// No attribution in the payload (or a GDPR-stripped extract).
    #[default]
    Anonymous,
    /// A name with no server account id; only occurs in local files.
    Local(String),
    /// A server account.
    Server { uid: i64, name: Option<String> },
}

impl UserInfo {
    /// Builds attribution from the optional `uid`/`user` attribute pair,
    /// mirroring how the XML dialect carries it.
    pub fn from_attributes(uid: Option<i64>, name: Option<String>) -> UserInfo {
        match (uid, name) {
            (Some(uid), name) => UserInfo::Server { uid, name },
            (None, Some(name)) => UserInfo::Local(name),
            (None, None) => UserInfo::Anonymous,
        }
    }
}

/// The fields every primitive carries regardless of kind.
#[derive(Debug, Clone, PartialEq)]
pub struct Meta {
    pub id: i64,
    pub version: u32,
    pub visible: bool,
    /// Whether this entity was manufactured to satisfy a reference and
    /// carries identity only. Flips to `false` when later data fills the
    /// entity in.
    pub incomplete: bool,
    pub changeset: i64,
    pub user: UserInfo,
    pub timestamp: Option<DateTime<Utc>>,
    pub tags: Tags,
}

impl Meta {
    /// A complete entity with defaults for everything but the id.
    pub fn new(id: i64) -> Meta {
        Meta {
            id,
            version: 0,
            visible: true,
            incomplete: false,
            changeset: 0,
            user: UserInfo::Anonymous,
            timestamp: None,
            tags: Tags::new(),
        }
    }

    /// A placeholder carrying identity only.
    pub fn incomplete(id: i64) -> Meta {
        Meta {
            incomplete: true,
            ..Meta::new(id)
        }
    }

    /// Whether the id is client-assigned (not yet uploaded).
    pub fn is_local(&self) -> bool {
        self.id <= 0
    }
}

/// Whether a dataset may be uploaded back to the server.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, strum::Display, strum::EnumString,
)]
pub enum UploadPolicy {
    #[default]
    #[strum(serialize = "true")]
    Normal,
    #[strum(serialize = "false")]
    Discouraged,
    #[strum(serialize = "never")]
    Blocked,
}

/// Whether a dataset may be refreshed from the server.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, strum::Display, strum::EnumString,
)]
pub enum DownloadPolicy {
    #[default]
    #[strum(serialize = "true")]
    Normal,
    #[strum(serialize = "never")]
    Blocked,
}
