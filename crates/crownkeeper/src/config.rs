/// Behaviour knobs for the keeper. Connection details (URL, tokens, rooms) live with the
/// binary that opens the sockets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeeperConfig {
    /// Command prefix, e.g. `=`.
    pub prefix: String,
    pub name: String,
    pub color: String,
    /// Say "Connected!" in the room after each handshake.
    pub announce: bool,
    /// Log every chat line at info.
    pub log_chat: bool,
    /// Participant `_id` granted `owner` in rooms that have no permissions yet.
    pub seed_owner: Option<String>,
}

impl Default for KeeperConfig {
    fn default() -> Self {
        Self {
            prefix: "=".to_string(),
            name: "Crownkeeper".to_string(),
            color: "#777777".to_string(),
            announce: true,
            log_chat: true,
            seed_owner: None,
        }
    }
}

impl KeeperConfig {
    /// Name shown in the room, with a hint on how to get help.
    pub fn display_name(&self) -> String {
        format!("{} [ {}help ]", self.name, self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::KeeperConfig;

    #[test]
    fn display_name_carries_help_hint() {
        let cfg = KeeperConfig {
            prefix: "!".to_string(),
            ..KeeperConfig::default()
        };
        assert_eq!(cfg.display_name(), "Crownkeeper [ !help ]");
    }
}
