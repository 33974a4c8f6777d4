//! Turns one chat line into at most one command invocation.

use roomproto::Participant;

use crate::auth::{authorize, Access, Standing};
use crate::command::{Body, Registry};
use crate::config::KeeperConfig;
use crate::conn::Conn;
use crate::reply::{denial, FAILURE};
use crate::store::PermissionStore;

/// Everything a handler may touch while running one command.
pub struct Session<'a> {
    pub cfg: &'a KeeperConfig,
    pub registry: &'a Registry,
    pub store: &'a mut PermissionStore,
    pub conn: &'a mut Conn,
    pub author: &'a Participant,
    /// Id of the triggering chat message; replies thread under it.
    pub msg_id: Option<&'a str>,
    pub now_ms: u64,
}

impl Session<'_> {
    pub fn reply<I, S>(&self, lines: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.conn.chat(self.msg_id, lines)
    }

    pub fn room(&self) -> &str {
        &self.conn.room
    }

    /// The author's rank and admin status in this room. Keyed by `_id`.
    pub fn standing(&self) -> Standing {
        Standing::lookup(&*self.store, &self.conn.room, &self.author.user_id)
    }

    fn allowed(&self, access: &Access) -> bool {
        authorize(access, self.standing()).is_ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Our own message.
    Ignored,
    /// Not addressed to us.
    Chat,
    Unknown,
    Denied,
    /// A command with subcommands was missing one, or named one that doesn't exist.
    Prompted,
    Ran,
}

/// Resolves and runs the command in `text`, if any. Soft failures are answered in chat and
/// reported through [`Outcome`]; `Err` is only for handler failures.
pub fn dispatch(s: &mut Session<'_>, text: &str) -> anyhow::Result<Outcome> {
    if s.conn.is_self(s.author) {
        return Ok(Outcome::Ignored);
    }

    let args = text.split_whitespace().collect::<Vec<_>>();
    let registry = s.registry;
    let prefix = registry.prefix();
    let Some(name) = args.first().and_then(|t| t.strip_prefix(prefix)) else {
        return Ok(Outcome::Chat);
    };
    if name.is_empty() {
        return Ok(Outcome::Chat);
    }

    let Some(cmd) = registry.find(name) else {
        s.reply([format!(
            "{FAILURE}There is no command named {name}. Type `{prefix}help` for a list of commands."
        )]);
        return Ok(Outcome::Unknown);
    };

    if !s.allowed(&cmd.access) {
        s.reply([denial()]);
        return Ok(Outcome::Denied);
    }

    if let Body::Run(handler) = cmd.body {
        handler(s, &args)?;
        return Ok(Outcome::Ran);
    }

    let Some(sub_name) = args.get(1) else {
        s.reply([
            format!("{FAILURE}What do you want to do?"),
            format!("Type `{prefix}help {}` for more information.", cmd.name),
        ]);
        return Ok(Outcome::Prompted);
    };
    let Some(sub) = cmd.find_sub(sub_name) else {
        s.reply([format!(
            "{FAILURE}`{prefix}{}` has no subcommand named {sub_name}.",
            cmd.name
        )]);
        return Ok(Outcome::Prompted);
    };

    if !s.allowed(&sub.access) {
        s.reply([denial()]);
        return Ok(Outcome::Denied);
    }

    (sub.handler)(s, &args[1..])?;
    Ok(Outcome::Ran)
}

#[cfg(test)]
mod tests {
    use roomproto::{ChannelInfo, ServerMsg};

    use super::*;
    use crate::conn::testing::Recorder;
    use crate::conn::LinkState;
    use crate::rank::Rank;
    use crate::store::scratch_path;

    fn person(id: &str) -> Participant {
        Participant {
            id: format!("p-{id}"),
            user_id: format!("u-{id}"),
            name: id.to_string(),
            color: "#123456".to_string(),
        }
    }

    struct Fixture {
        cfg: KeeperConfig,
        registry: Registry,
        store: PermissionStore,
        conn: Conn,
        rec: Recorder,
    }

    impl Fixture {
        fn new(tag: &str) -> Self {
            let mut store = PermissionStore::open(scratch_path(tag)).expect("open store");
            store.ensure_defaults().expect("defaults");
            let rec = Recorder::default();
            let mut conn = Conn::new(0, "lobby".to_string());
            conn.attach(Box::new(rec.clone()));
            conn.apply(
                &ServerMsg::Ch {
                    ch: ChannelInfo {
                        id: "lobby".to_string(),
                        crown: None,
                    },
                    ppl: vec![person("bot"), person("alice")],
                    p: Some("p-bot".to_string()),
                },
                0,
            );
            conn.state = LinkState::Connected;
            Self {
                cfg: KeeperConfig::default(),
                registry: Registry::builtin("="),
                store,
                conn,
                rec,
            }
        }

        fn run(&mut self, who: &Participant, text: &str) -> Outcome {
            let mut s = Session {
                cfg: &self.cfg,
                registry: &self.registry,
                store: &mut self.store,
                conn: &mut self.conn,
                author: who,
                msg_id: Some("m1"),
                now_ms: 0,
            };
            dispatch(&mut s, text).expect("dispatch")
        }
    }

    #[test]
    fn plain_chat_and_bare_prefix_are_not_commands() {
        let mut f = Fixture::new("router-chat");
        let alice = person("alice");
        assert_eq!(f.run(&alice, "hello there"), Outcome::Chat);
        assert_eq!(f.run(&alice, "="), Outcome::Chat);
        assert_eq!(f.run(&alice, "   "), Outcome::Chat);
        assert!(f.rec.chats().is_empty());
    }

    #[test]
    fn own_messages_never_dispatch() {
        let mut f = Fixture::new("router-self");
        assert_eq!(f.run(&person("bot"), "=help"), Outcome::Ignored);
        assert!(f.rec.take().is_empty());
    }

    #[test]
    fn unknown_command_keeps_user_case() {
        let mut f = Fixture::new("router-unknown");
        assert_eq!(f.run(&person("alice"), "  =XyZ  extra"), Outcome::Unknown);
        let chats = f.rec.chats();
        assert_eq!(chats.len(), 1);
        assert!(chats[0].contains("no command named XyZ"), "{}", chats[0]);
    }

    #[test]
    fn subcommands_need_a_known_name() {
        let mut f = Fixture::new("router-sub");
        let alice = person("alice");
        f.store
            .set_rank("lobby", &alice.user_id, Rank::ADMIN)
            .expect("set rank");

        assert_eq!(f.run(&alice, "=crown"), Outcome::Prompted);
        let chats = f.rec.chats();
        assert!(chats[0].ends_with("What do you want to do?"));
        assert_eq!(chats[1], "Type `=help crown` for more information.");

        assert_eq!(f.run(&alice, "=crown juggle"), Outcome::Prompted);
        assert!(f.rec.chats()[0].contains("no subcommand named juggle"));

        assert_eq!(f.run(&alice, "=crown DROP"), Outcome::Ran);
    }

    #[test]
    fn command_gate_denies_with_a_known_phrase() {
        let mut f = Fixture::new("router-deny");
        assert_eq!(f.run(&person("alice"), "=crown drop"), Outcome::Denied);
        let chats = f.rec.chats();
        let body = chats[0].strip_prefix(FAILURE).expect("failure tag");
        assert!(crate::reply::DENIAL_PHRASES.contains(&body));
    }

    #[test]
    fn subcommand_gate_is_checked_separately() {
        let mut f = Fixture::new("router-subdeny");
        assert_eq!(f.run(&person("alice"), "=rank get"), Outcome::Ran);
        f.rec.take();
        assert_eq!(
            f.run(&person("alice"), "=rank set @u-bob moderator"),
            Outcome::Denied
        );
        assert_eq!(f.store.rank("lobby", "u-bob"), Rank::USER);
    }
}
