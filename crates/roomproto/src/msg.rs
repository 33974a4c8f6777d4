use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Connection-scoped participant id.
    pub id: String,
    /// Stable user id; this is what permissions are keyed by.
    #[serde(rename = "_id")]
    pub user_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub user_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub color: String,
}

/// The room's single ownership slot.
///
/// `time` is the server-clock unix ms of the last change (for a vacant crown: when it was
/// dropped).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Crown {
    #[serde(default)]
    pub participant_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    pub time: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub crown: Option<Crown>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "m", rename_all = "lowercase")]
pub enum ServerMsg {
    /// Connection accepted.
    Hi {
        u: User,
        #[serde(default)]
        t: Option<u64>,
    },
    /// Room state (sent on join and whenever settings or the crown change).
    Ch {
        ch: ChannelInfo,
        #[serde(default)]
        ppl: Vec<Participant>,
        /// Our own participant id in this room.
        #[serde(default)]
        p: Option<String>,
    },
    /// Chat message.
    A {
        a: String,
        p: Participant,
        #[serde(default)]
        id: Option<String>,
    },
    /// Ping echo: `e` is the timestamp we sent.
    T {
        t: u64,
        #[serde(default)]
        e: Option<u64>,
    },
    /// Participant joined or changed.
    P(Participant),
    /// Participant left.
    Bye { p: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSet {
    pub name: String,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "m", rename_all = "lowercase")]
pub enum ClientMsg {
    Hi {
        #[serde(skip_serializing_if = "Option::is_none")]
        token: Option<String>,
    },
    /// Join a room.
    Ch {
        #[serde(rename = "_id")]
        id: String,
    },
    A {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        reply_to: Option<String>,
    },
    /// Give the crown to `id`, or drop it when `id` is absent.
    Chown {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
    /// Cursor position in percent of the room canvas.
    M { x: f64, y: f64 },
    Userset { set: UserSet },
    T { e: u64 },
}
