//! Built-in commands.

use crate::auth::{can_assign, Access};
use crate::command::{Body, Command, Subcommand};
use crate::eval::eval_to_line;
use crate::rank::Rank;
use crate::reply::{possessive, FAILURE, INFO, SUCCESS};
use crate::router::Session;

pub static BUILTIN: &[Command] = &[
    Command {
        name: "help",
        desc: Some("Shows all commands."),
        syntax: "help [command] [subcommand]",
        aliases: &["h", "?"],
        access: Access::OPEN,
        body: Body::Run(help),
    },
    Command {
        name: "about",
        desc: Some("Shows information about this bot."),
        syntax: "about",
        aliases: &["a"],
        access: Access::OPEN,
        body: Body::Run(about),
    },
    Command {
        name: "ping",
        desc: Some("Measures the round trip to the room server."),
        syntax: "ping",
        aliases: &["e"],
        access: Access::OPEN,
        body: Body::Run(ping),
    },
    Command {
        name: "crown",
        desc: Some("Modify the bot's room ownership."),
        syntax: "crown <give | drop> [@_id]",
        aliases: &["chown", "c", "o"],
        access: Access::rank(Rank::ADMIN),
        body: Body::Sub(&[
            Subcommand {
                name: "give",
                desc: Some("Give the crown to somebody (yourself by default)."),
                syntax: "crown give [@_id]",
                access: Access::OPEN,
                handler: crown_give,
            },
            Subcommand {
                name: "drop",
                desc: Some("Drop the crown and leave it alone until someone else takes it."),
                syntax: "crown drop",
                access: Access::OPEN,
                handler: crown_drop,
            },
        ]),
    },
    Command {
        name: "rank",
        desc: Some("View or change room ranks."),
        syntax: "rank <get | set | ranks> [@_id] [rank]",
        aliases: &["r", "perms"],
        access: Access::OPEN,
        body: Body::Sub(&[
            Subcommand {
                name: "get",
                desc: Some("Shows somebody's rank in this room (yours by default)."),
                syntax: "rank get [@_id]",
                access: Access::OPEN,
                handler: rank_get,
            },
            Subcommand {
                name: "set",
                desc: Some("Sets somebody's rank in this room, up to your own."),
                syntax: "rank set <@_id> <user | moderator | admin | owner | 0-3>",
                access: Access::rank(Rank::MODERATOR),
                handler: rank_set,
            },
            Subcommand {
                name: "ranks",
                desc: Some("Lists everyone with a rank in this room."),
                syntax: "rank ranks",
                access: Access::OPEN,
                handler: rank_list,
            },
        ]),
    },
    Command {
        name: "eval",
        desc: Some("Evaluates a sandboxed expression."),
        syntax: "eval <expression>",
        aliases: &["calc", "js", "j"],
        access: Access::admin(),
        body: Body::Run(eval),
    },
];

const NOT_HOLDING: &str = "The bot doesn't currently have the crown.";

fn strip_at(id: &str) -> &str {
    id.trim_start_matches('@')
}

fn requirement(access: &Access) -> Option<String> {
    match (access.rank, access.admin) {
        (None, false) => None,
        (Some(r), false) => Some(format!("rank {r} or higher")),
        (None, true) => Some("global admin".to_string()),
        (Some(r), true) => Some(format!("rank {r} or higher and global admin")),
    }
}

fn help(s: &mut Session<'_>, args: &[&str]) -> anyhow::Result<()> {
    let reg = s.registry;
    let prefix = reg.prefix();

    let Some(&wanted) = args.get(1) else {
        let names = reg
            .commands()
            .iter()
            .map(|c| format!("`{prefix}{}`", c.name))
            .collect::<Vec<_>>();
        s.reply([format!("{SUCCESS}Commands: {}", names.join(", "))]);
        return Ok(());
    };

    let wanted = wanted.strip_prefix(prefix).unwrap_or(wanted);
    let Some(cmd) = reg.find(wanted) else {
        s.reply([format!("{FAILURE}There is no command named {wanted}.")]);
        return Ok(());
    };

    let Some(sub_name) = args.get(2) else {
        let mut lines = vec![
            format!(
                "{SUCCESS}`{prefix}{}` - *{}*",
                cmd.name,
                cmd.desc.unwrap_or("This command doesn't have a description.")
            ),
            format!("Syntax: `{}`", reg.usage(cmd.syntax)),
        ];
        if !cmd.aliases.is_empty() {
            let aliases = cmd
                .aliases
                .iter()
                .map(|a| format!("`{prefix}{a}`"))
                .collect::<Vec<_>>();
            lines.push(format!("Aliases: {}", aliases.join(", ")));
        }
        let subs = cmd.subcommands();
        if !subs.is_empty() {
            let names = subs.iter().map(|c| format!("`{}`", c.name)).collect::<Vec<_>>();
            lines.push(format!("Subcommands: {}", names.join(", ")));
        }
        if let Some(req) = requirement(&cmd.access) {
            lines.push(format!("Requires: {req}"));
        }
        s.reply(lines);
        return Ok(());
    };

    let Some(sub) = cmd.find_sub(sub_name) else {
        s.reply([format!(
            "{FAILURE}`{prefix}{}` has no subcommand named {sub_name}.",
            cmd.name
        )]);
        return Ok(());
    };
    let mut lines = vec![
        format!(
            "{SUCCESS}`{prefix}{} {}` - *{}*",
            cmd.name,
            sub.name,
            sub.desc
                .unwrap_or("This subcommand doesn't have a description.")
        ),
        format!("Syntax: `{}`", reg.usage(sub.syntax)),
    ];
    if let Some(req) = requirement(&sub.access) {
        lines.push(format!("Requires: {req}"));
    }
    s.reply(lines);
    Ok(())
}

fn about(s: &mut Session<'_>, _args: &[&str]) -> anyhow::Result<()> {
    s.reply([
        format!("{INFO}{} `v{}`", s.cfg.name, env!("CARGO_PKG_VERSION")),
        format!(
            " - keeps {} crowned. Type `{}help` for commands.",
            s.room(),
            s.registry.prefix()
        ),
    ]);
    Ok(())
}

fn ping(s: &mut Session<'_>, _args: &[&str]) -> anyhow::Result<()> {
    let reply_to = s.msg_id.map(str::to_string);
    if !s.conn.ping(s.now_ms, reply_to) {
        anyhow::bail!("ping could not be sent");
    }
    Ok(())
}

fn crown_give(s: &mut Session<'_>, args: &[&str]) -> anyhow::Result<()> {
    if !s.conn.is_owner() {
        s.reply([format!("{FAILURE}{NOT_HOLDING}")]);
        return Ok(());
    }

    let target = args.get(1).map(|a| strip_at(a)).filter(|a| !a.is_empty());
    let Some(target) = target else {
        s.conn.chown(Some(s.author.id.as_str()));
        s.conn.crown_state.mark_given();
        s.reply([format!("{SUCCESS}You have been granted room ownership!")]);
        return Ok(());
    };

    let Some(p) = s.conn.participant(target).cloned() else {
        s.reply([format!(
            "{FAILURE}There is no user in this room with an `_id` of `{target}`."
        )]);
        return Ok(());
    };
    s.conn.chown(Some(p.id.as_str()));
    s.conn.crown_state.mark_given();
    s.reply([format!(
        "{SUCCESS}Room ownership has been given to `{}`!",
        p.name
    )]);
    Ok(())
}

fn crown_drop(s: &mut Session<'_>, _args: &[&str]) -> anyhow::Result<()> {
    if !s.conn.is_owner() {
        s.reply([format!("{FAILURE}{NOT_HOLDING}")]);
        return Ok(());
    }
    let held_since = s.conn.crown().map(|c| c.time);
    s.conn.chown(None);
    s.conn.crown_state.mark_dropped(held_since);
    s.reply([format!("{SUCCESS}The crown has been dropped!")]);
    Ok(())
}

/// `(permission key, display name)` for an `@_id` argument. People not in the room are
/// addressed by the raw id. `None` for a bare `@`.
fn resolve(s: &Session<'_>, raw: &str) -> Option<(String, String)> {
    let id = strip_at(raw);
    if id.is_empty() {
        return None;
    }
    Some(match s.conn.participant(id) {
        Some(p) => (p.user_id.clone(), p.name.clone()),
        None => (id.to_string(), id.to_string()),
    })
}

fn usage(s: &mut Session<'_>, syntax: &str) {
    let line = format!("{FAILURE}Usage: `{}`", s.registry.usage(syntax));
    s.reply([line]);
}

fn rank_get(s: &mut Session<'_>, args: &[&str]) -> anyhow::Result<()> {
    let target = match args.get(1) {
        Some(raw) => resolve(s, raw),
        None => Some((s.author.user_id.clone(), s.author.name.clone())),
    };
    let Some((key, name)) = target else {
        usage(s, "rank get [@_id]");
        return Ok(());
    };
    let rank = s.store.rank(s.room(), &key);
    s.reply([format!(
        "{INFO}{} rank in {} is {rank}.",
        possessive(&name),
        s.room()
    )]);
    Ok(())
}

fn rank_set(s: &mut Session<'_>, args: &[&str]) -> anyhow::Result<()> {
    const SYNTAX: &str = "rank set <@_id> <user | moderator | admin | owner | 0-3>";
    let (Some(raw), Some(wanted)) = (args.get(1), args.get(2)) else {
        usage(s, SYNTAX);
        return Ok(());
    };
    let Some((key, name)) = resolve(s, raw) else {
        usage(s, SYNTAX);
        return Ok(());
    };
    let Some(rank) = Rank::parse(wanted) else {
        let all = Rank::ALL.iter().map(Rank::to_string).collect::<Vec<_>>();
        s.reply([format!(
            "{FAILURE}`{wanted}` isn't a rank. Ranks: {}.",
            all.join(", ")
        )]);
        return Ok(());
    };

    let actor = s.standing().rank;
    if !can_assign(actor, rank) {
        s.reply([format!(
            "{FAILURE}You can't give out a rank higher than your own ({actor})."
        )]);
        return Ok(());
    }

    let room = s.room().to_string();
    if s.store.rank(&room, &key) > actor {
        s.reply([format!(
            "{FAILURE}You can't change the rank of someone ranked above you."
        )]);
        return Ok(());
    }

    s.store.set_rank(&room, &key, rank)?;
    s.reply([format!("{SUCCESS}{name} is now {rank} in {room}.")]);
    Ok(())
}

fn rank_list(s: &mut Session<'_>, _args: &[&str]) -> anyhow::Result<()> {
    let room = s.room().to_string();
    let ranks = s.store.ranks(&room);
    if ranks.is_empty() {
        s.reply([format!("{INFO}Nobody has a rank in {room} yet.")]);
        return Ok(());
    }
    let entries = ranks
        .iter()
        .map(|(id, r)| {
            let name = s
                .conn
                .participant(id)
                .map(|p| p.name.as_str())
                .unwrap_or(id.as_str());
            format!("`{name}` {r}")
        })
        .collect::<Vec<_>>();
    s.reply([format!("{INFO}Ranks in {room}: {}", entries.join(", "))]);
    Ok(())
}

fn eval(s: &mut Session<'_>, args: &[&str]) -> anyhow::Result<()> {
    let src = args.get(1..).unwrap_or_default().join(" ");
    match eval_to_line(&src) {
        Ok(out) => s.reply([format!("{SUCCESS}```{out}```")]),
        Err(e) => s.reply([format!("{FAILURE}```{e}```")]),
    };
    Ok(())
}
