//! `!command` parsing and the static command table.
//!
//! Every command is one [`CommandEntry`] row: a name, the access level needed
//! to run it, a usage line and a plain `fn` handler. [`dispatch`] looks the
//! name up in [`COMMANDS`], checks access and turns handler failures into an
//! `error: ...` reply. Hosts act as the house account for campaign commands.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::campaign::Spend;
use crate::cents::Cents;
use crate::engine::Adbot;
use crate::error::AdbotError;
use crate::ledger::HOUSE;
use crate::report;

/// Who is talking.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub nick: String,
    pub account: String,
    /// Room host; may run admin commands and acts as house.
    #[serde(default)]
    pub host: bool,
    /// Registered user with an advertiser account.
    #[serde(default)]
    pub registered: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    Admin,
    Account,
    General,
}

impl Access {
    fn permits(self, caller: &Caller) -> bool {
        match self {
            Access::Admin => caller.host,
            Access::Account => caller.host || caller.registered,
            Access::General => true,
        }
    }
}

/// A parsed command line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    pub name: String,
    pub args: Vec<String>,
    line: String,
    offsets: Vec<usize>,
}

impl Command {
    /// Parse `!name arg arg...`. Returns `None` for lines that are not
    /// commands.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let body = line.strip_prefix('!')?;
        if body.is_empty() || body.starts_with(char::is_whitespace) {
            return None;
        }

        let mut tokens = Vec::new();
        let mut start = None;
        for (idx, ch) in line.char_indices() {
            match (ch.is_whitespace(), start) {
                (false, None) => start = Some(idx),
                (true, Some(s)) => {
                    tokens.push((s, &line[s..idx]));
                    start = None;
                }
                _ => {}
            }
        }
        if let Some(s) = start {
            tokens.push((s, &line[s..]));
        }

        let (_, head) = tokens.first()?;
        let name = head.trim_start_matches('!').to_lowercase();
        let rest = &tokens[1..];
        Some(Self {
            name,
            args: rest.iter().map(|(_, t)| t.to_string()).collect(),
            offsets: rest.iter().map(|(o, _)| *o).collect(),
            line: line.to_string(),
        })
    }

    /// The raw line from argument `idx` to the end, spacing preserved.
    pub fn rest(&self, idx: usize) -> &str {
        match self.offsets.get(idx) {
            Some(&offset) => &self.line[offset..],
            None => "",
        }
    }
}

pub type Handler = fn(&Adbot, &Caller, &Command) -> Result<String, AdbotError>;

pub struct CommandEntry {
    pub name: &'static str,
    pub access: Access,
    pub usage: &'static str,
    pub handler: Handler,
}

pub static COMMANDS: &[CommandEntry] = &[
    CommandEntry {
        name: "help",
        access: Access::General,
        usage: "!help",
        handler: cmd_help,
    },
    CommandEntry {
        name: "balance",
        access: Access::General,
        usage: "!balance",
        handler: cmd_balance,
    },
    CommandEntry {
        name: "ledger",
        access: Access::General,
        usage: "!ledger",
        handler: cmd_ledger,
    },
    CommandEntry {
        name: "stats",
        access: Access::General,
        usage: "!stats [USERID]",
        handler: cmd_stats,
    },
    CommandEntry {
        name: "creative",
        access: Access::Account,
        usage: "!creative NAME COPY...",
        handler: cmd_creative,
    },
    CommandEntry {
        name: "delete",
        access: Access::Account,
        usage: "!delete CREATIVE",
        handler: cmd_delete,
    },
    CommandEntry {
        name: "spend",
        access: Access::Account,
        usage: "!spend up to MAXBID on CREATIVE KEYWORDS...",
        handler: cmd_spend,
    },
    CommandEntry {
        name: "cancel",
        access: Access::Account,
        usage: "!cancel CREATIVE",
        handler: cmd_cancel,
    },
    CommandEntry {
        name: "scoreboard",
        access: Access::Account,
        usage: "!scoreboard",
        handler: cmd_scoreboard,
    },
    CommandEntry {
        name: "campaign",
        access: Access::Admin,
        usage: "!campaign [USERID]",
        handler: cmd_campaign,
    },
    CommandEntry {
        name: "credit",
        access: Access::Admin,
        usage: "!credit USERID AMOUNT [MEMO]",
        handler: cmd_credit,
    },
    CommandEntry {
        name: "enable",
        access: Access::Admin,
        usage: "!enable USERID [CREATIVE]",
        handler: cmd_set_enabled,
    },
    CommandEntry {
        name: "disable",
        access: Access::Admin,
        usage: "!disable USERID [CREATIVE]",
        handler: cmd_set_enabled,
    },
    CommandEntry {
        name: "join",
        access: Access::Admin,
        usage: "!join ROOM",
        handler: cmd_join,
    },
    CommandEntry {
        name: "part",
        access: Access::Admin,
        usage: "!part ROOM",
        handler: cmd_part,
    },
    CommandEntry {
        name: "rooms",
        access: Access::Admin,
        usage: "!rooms",
        handler: cmd_rooms,
    },
    CommandEntry {
        name: "reset",
        access: Access::Admin,
        usage: "!reset balances|campaigns",
        handler: cmd_reset,
    },
    CommandEntry {
        name: "scale",
        access: Access::Admin,
        usage: "!scale FACTOR",
        handler: cmd_scale,
    },
    CommandEntry {
        name: "stimulate",
        access: Access::Admin,
        usage: "!stimulate AMOUNT",
        handler: cmd_stimulate,
    },
];

pub fn lookup(name: &str) -> Option<&'static CommandEntry> {
    COMMANDS.iter().find(|entry| entry.name == name)
}

/// Run one chat line. Returns `None` when the line is not a command.
pub fn dispatch(bot: &Adbot, caller: &Caller, line: &str) -> Option<String> {
    let cmd = Command::parse(line)?;
    let Some(entry) = lookup(&cmd.name).filter(|entry| entry.access.permits(caller)) else {
        debug!(name = %cmd.name, caller = %caller.account, "unknown or forbidden command");
        return Some(format!(
            "I don't know the !{} command, try !help for help",
            cmd.name
        ));
    };

    info!(name = entry.name, caller = %caller.account, host = caller.host, "command");
    Some(match (entry.handler)(bot, caller, &cmd) {
        Ok(reply) => reply,
        Err(AdbotError::Usage(usage)) => format!("usage: {usage}"),
        Err(err) => format!("error: {err}"),
    })
}

fn usage(name: &str) -> AdbotError {
    let text = lookup(name).map(|entry| entry.usage).unwrap_or("!help");
    AdbotError::Usage(text.to_string())
}

/// Account that campaign commands act on.
fn acting_account(caller: &Caller) -> &str {
    if caller.host { HOUSE } else { &caller.account }
}

fn cmd_help(_: &Adbot, caller: &Caller, _: &Command) -> Result<String, AdbotError> {
    let lines: Vec<&str> = COMMANDS
        .iter()
        .filter(|entry| entry.access.permits(caller))
        .map(|entry| entry.usage)
        .collect();
    Ok(format!("commands:\n{}", lines.join("\n")))
}

fn cmd_balance(bot: &Adbot, caller: &Caller, cmd: &Command) -> Result<String, AdbotError> {
    let (label, account) = match (caller.host, cmd.args.first()) {
        (true, Some(account)) => (account.as_str(), account.as_str()),
        (true, None) => (HOUSE, HOUSE),
        (false, _) => ("your", caller.account.as_str()),
    };
    let advertiser = bot.advertiser(account)?;
    Ok(format!("{label} balance is {}", advertiser.balance))
}

fn cmd_ledger(bot: &Adbot, caller: &Caller, cmd: &Command) -> Result<String, AdbotError> {
    let account = match (caller.host, cmd.args.first()) {
        (true, Some(account)) => account.as_str(),
        (true, None) => HOUSE,
        (false, _) => caller.account.as_str(),
    };
    let entries = bot.ledger(account)?;
    if entries.is_empty() {
        return Ok("no transactions".to_string());
    }
    Ok(report::ledger_report(account, &entries))
}

fn cmd_stats(bot: &Adbot, caller: &Caller, cmd: &Command) -> Result<String, AdbotError> {
    let account = match cmd.args.first() {
        Some(account) => account.as_str(),
        None => acting_account(caller),
    };
    let metrics = bot.metrics(account)?;
    Ok(report::stats_report(account, &metrics))
}

fn cmd_creative(bot: &Adbot, caller: &Caller, cmd: &Command) -> Result<String, AdbotError> {
    if cmd.args.len() < 2 {
        return Err(usage("creative"));
    }
    let name = &cmd.args[0];
    let replaced = bot.upsert_creative(acting_account(caller), name, cmd.rest(1))?;
    let verb = if replaced { "replaced" } else { "added" };
    Ok(format!("{verb} creative {name}, remove with !delete {name}"))
}

fn cmd_delete(bot: &Adbot, caller: &Caller, cmd: &Command) -> Result<String, AdbotError> {
    let Some(name) = cmd.args.first() else {
        return Err(usage("delete"));
    };
    if bot.delete_creative(acting_account(caller), name)? {
        Ok(format!("deleted creative {name}"))
    } else {
        Ok(format!("creative {name} does not exist"))
    }
}

fn cmd_spend(bot: &Adbot, caller: &Caller, cmd: &Command) -> Result<String, AdbotError> {
    let args = &cmd.args;
    if args.len() < 6 || args[0] != "up" || args[1] != "to" || args[3] != "on" {
        return Err(usage("spend"));
    }
    let max_bid: Cents = args[2].parse()?;
    let creative = &args[4];
    let replaced = bot.upsert_spend(acting_account(caller), creative, cmd.rest(5), max_bid)?;
    let verb = if replaced { "replaced" } else { "added" };
    Ok(format!("{verb} spend on creative {creative}, remove with !cancel {creative}"))
}

fn cmd_cancel(bot: &Adbot, caller: &Caller, cmd: &Command) -> Result<String, AdbotError> {
    let Some(name) = cmd.args.first() else {
        return Err(usage("cancel"));
    };
    if bot.delete_spend(acting_account(caller), name)? {
        Ok(format!("cancelled spend {name}"))
    } else {
        Ok(format!("spend on {name} does not exist"))
    }
}

fn cmd_scoreboard(bot: &Adbot, _: &Caller, _: &Command) -> Result<String, AdbotError> {
    Ok(report::scoreboard_report(&bot.scoreboard()?))
}

fn cmd_campaign(bot: &Adbot, _: &Caller, cmd: &Command) -> Result<String, AdbotError> {
    match cmd.args.as_slice() {
        [] => {
            let mut spends: Vec<Spend> = Vec::new();
            crate::campaign::for_each_spend(bot.store(), |spend| {
                spends.push(spend);
                Ok::<_, AdbotError>(())
            })?;
            Ok(report::all_campaigns_report(&spends))
        }
        [owner] => Ok(report::campaigns_report(owner, &bot.spends(owner)?)),
        _ => Err(usage("campaign")),
    }
}

fn cmd_credit(bot: &Adbot, _: &Caller, cmd: &Command) -> Result<String, AdbotError> {
    if cmd.args.len() < 2 {
        return Err(usage("credit"));
    }
    let account = &cmd.args[0];
    let amount: Cents = cmd.args[1].parse()?;
    let memo = match cmd.rest(2) {
        "" => "credit",
        memo => memo,
    };
    let balance = bot.credit(account, amount, memo)?;
    Ok(format!("credited {account} for {amount}, balance now {balance}"))
}

fn cmd_set_enabled(bot: &Adbot, _: &Caller, cmd: &Command) -> Result<String, AdbotError> {
    let enabled = cmd.name == "enable";
    match cmd.args.as_slice() {
        [account] => {
            bot.set_account_enabled(account, enabled)?;
            Ok(format!("{}d all spends by {account}", cmd.name))
        }
        [account, creative] => {
            bot.set_spend_enabled(account, creative, enabled)?;
            Ok(format!("{}d spend {creative} by {account}", cmd.name))
        }
        _ => Err(usage(&cmd.name)),
    }
}

fn cmd_join(bot: &Adbot, _: &Caller, cmd: &Command) -> Result<String, AdbotError> {
    let [room] = cmd.args.as_slice() else {
        return Err(usage("join"));
    };
    if bot.join_room(room)? {
        Ok(format!("now tracking &{room}"))
    } else {
        Ok(format!("already tracking &{room}"))
    }
}

fn cmd_part(bot: &Adbot, _: &Caller, cmd: &Command) -> Result<String, AdbotError> {
    let [room] = cmd.args.as_slice() else {
        return Err(usage("part"));
    };
    if bot.part_room(room)? {
        Ok(format!("no longer tracking &{room}"))
    } else {
        Ok(format!("not tracking &{room}"))
    }
}

fn cmd_rooms(bot: &Adbot, _: &Caller, _: &Command) -> Result<String, AdbotError> {
    let rooms = bot.rooms()?;
    if rooms.is_empty() {
        return Ok("no rooms configured".to_string());
    }
    Ok(format!("&{}", rooms.join(", &")))
}

fn cmd_reset(bot: &Adbot, caller: &Caller, cmd: &Command) -> Result<String, AdbotError> {
    let reply = match cmd.args.as_slice() {
        [what] if what == "balances" => {
            bot.reset_balances()?;
            "reset all balances"
        }
        [what] if what == "campaigns" => {
            bot.reset_campaigns()?;
            "reset all campaigns"
        }
        _ => return Err(usage("reset")),
    };
    info!(by = %caller.account, what = %cmd.args[0], "administrative reset");
    Ok(reply.to_string())
}

fn cmd_scale(bot: &Adbot, _: &Caller, cmd: &Command) -> Result<String, AdbotError> {
    let [factor] = cmd.args.as_slice() else {
        return Err(usage("scale"));
    };
    let factor: f64 = factor
        .parse()
        .map_err(|_| AdbotError::Usage(format!("!scale FACTOR (got `{factor}`)")))?;
    let scaled = bot.scale_spends(HOUSE, factor)?;
    Ok(format!("scaled {scaled} house spends by a factor of {factor}"))
}

fn cmd_stimulate(bot: &Adbot, _: &Caller, cmd: &Command) -> Result<String, AdbotError> {
    let [amount] = cmd.args.as_slice() else {
        return Err(usage("stimulate"));
    };
    let amount: Cents = amount.parse()?;
    let credited = bot.add_stimulus(amount)?;
    Ok(format!("stimulus package of {amount} rolled out to {credited} accounts"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    fn bot() -> Adbot {
        Adbot::new(Store::in_memory().unwrap(), |_: u64, _: u64| Cents(10))
    }

    fn host() -> Caller {
        Caller {
            nick: "op".into(),
            account: "agent:op".into(),
            host: true,
            registered: true,
        }
    }

    fn user(account: &str) -> Caller {
        Caller {
            nick: account.into(),
            account: account.into(),
            host: false,
            registered: true,
        }
    }

    fn guest() -> Caller {
        Caller {
            nick: "guest".into(),
            account: "agent:guest".into(),
            host: false,
            registered: false,
        }
    }

    #[test]
    fn parse_splits_args_and_keeps_rest() {
        let cmd = Command::parse("  !Creative  shoes   Buy  great shoes ").unwrap();
        assert_eq!(cmd.name, "creative");
        assert_eq!(cmd.args, vec!["shoes", "Buy", "great", "shoes"]);
        assert_eq!(cmd.rest(1), "Buy  great shoes");
        assert_eq!(cmd.rest(9), "");
    }

    #[test]
    fn parse_ignores_non_commands() {
        assert!(Command::parse("hello there").is_none());
        assert!(Command::parse("!").is_none());
        assert!(Command::parse("! spaced").is_none());
    }

    #[test]
    fn table_names_are_unique() {
        for (i, entry) in COMMANDS.iter().enumerate() {
            assert!(
                COMMANDS[i + 1..].iter().all(|other| other.name != entry.name),
                "duplicate command {}",
                entry.name
            );
        }
    }

    #[test]
    fn access_levels_are_enforced() {
        let bot = bot();
        let reply = dispatch(&bot, &user("alice"), "!credit alice 5").unwrap();
        assert!(reply.starts_with("I don't know the !credit command"));
        let reply = dispatch(&bot, &guest(), "!creative a b").unwrap();
        assert!(reply.starts_with("I don't know the !creative command"));
        assert!(dispatch(&bot, &guest(), "!balance").unwrap().contains("balance is"));
        assert!(dispatch(&bot, &user("alice"), "not a command").is_none());
    }

    #[test]
    fn credit_then_balance_and_ledger() {
        let bot = bot();
        let reply = dispatch(&bot, &host(), "!credit alice 12.50 welcome bonus").unwrap();
        assert_eq!(reply, "credited alice for $12.50, balance now $12.50");

        let reply = dispatch(&bot, &user("alice"), "!balance").unwrap();
        assert_eq!(reply, "your balance is $12.50");
        let reply = dispatch(&bot, &host(), "!balance alice").unwrap();
        assert_eq!(reply, "alice balance is $12.50");
        let reply = dispatch(&bot, &host(), "!balance").unwrap();
        assert_eq!(reply, "house balance is -$12.50");

        let reply = dispatch(&bot, &user("alice"), "!ledger").unwrap();
        assert!(reply.starts_with("ledger for alice:"));
        assert!(reply.contains("welcome bonus"));
        assert_eq!(
            dispatch(&bot, &user("bob"), "!ledger").unwrap(),
            "no transactions"
        );
    }

    #[test]
    fn campaign_commands_round_trip() {
        let bot = bot();
        let alice = user("alice");
        assert_eq!(
            dispatch(&bot, &alice, "!creative shoes Buy shoes now").unwrap(),
            "added creative shoes, remove with !delete shoes"
        );
        assert_eq!(
            dispatch(&bot, &alice, "!spend up to 2.5 on shoes running shoes").unwrap(),
            "added spend on creative shoes, remove with !cancel shoes"
        );
        let spends = bot.spends("alice").unwrap();
        assert_eq!(spends[0].max_bid, Cents(250));

        let listing = dispatch(&bot, &host(), "!campaign alice").unwrap();
        assert!(listing.contains("run,shoe"));
        let all = dispatch(&bot, &host(), "!campaign").unwrap();
        assert!(all.contains("alice"));

        assert_eq!(
            dispatch(&bot, &alice, "!cancel shoes").unwrap(),
            "cancelled spend shoes"
        );
        assert_eq!(
            dispatch(&bot, &alice, "!cancel shoes").unwrap(),
            "spend on shoes does not exist"
        );
        assert_eq!(
            dispatch(&bot, &alice, "!delete shoes").unwrap(),
            "deleted creative shoes"
        );
    }

    #[test]
    fn hosts_act_as_house() {
        let bot = bot();
        dispatch(&bot, &host(), "!creative promo Visit our site").unwrap();
        assert!(bot.creative(HOUSE, "promo").unwrap().is_some());
        dispatch(&bot, &host(), "!spend up to 1 on promo site").unwrap();
        assert_eq!(
            dispatch(&bot, &host(), "!scale 2").unwrap(),
            "scaled 1 house spends by a factor of 2"
        );
        assert_eq!(bot.spends(HOUSE).unwrap()[0].max_bid, Cents(200));
    }

    #[test]
    fn usage_and_errors_are_replies() {
        let bot = bot();
        assert_eq!(
            dispatch(&bot, &user("alice"), "!spend 5 on shoes").unwrap(),
            "usage: !spend up to MAXBID on CREATIVE KEYWORDS..."
        );
        assert_eq!(
            dispatch(&bot, &host(), "!reset everything").unwrap(),
            "usage: !reset balances|campaigns"
        );
        let reply = dispatch(&bot, &host(), "!credit alice lots").unwrap();
        assert!(reply.starts_with("error: invalid amount"));
        let reply = dispatch(&bot, &host(), "!scale -1").unwrap();
        assert!(reply.starts_with("error: invalid scale factor"));
    }

    #[test]
    fn enable_disable_and_rooms() {
        let bot = bot();
        assert_eq!(
            dispatch(&bot, &host(), "!disable alice").unwrap(),
            "disabled all spends by alice"
        );
        assert_eq!(
            dispatch(&bot, &host(), "!enable alice shoes").unwrap(),
            "enabled spend shoes by alice"
        );
        assert_eq!(bot.account_overrides().unwrap()["alice"], false);
        assert_eq!(bot.spend_overrides().unwrap()["alice"]["shoes"], true);

        assert_eq!(
            dispatch(&bot, &host(), "!rooms").unwrap(),
            "no rooms configured"
        );
        assert_eq!(
            dispatch(&bot, &host(), "!join Lobby").unwrap(),
            "now tracking &Lobby"
        );
        assert_eq!(dispatch(&bot, &host(), "!rooms").unwrap(), "&lobby");
        assert_eq!(
            dispatch(&bot, &host(), "!part lobby").unwrap(),
            "no longer tracking &lobby"
        );
    }

    #[test]
    fn stimulate_and_reset() {
        let bot = bot();
        dispatch(&bot, &host(), "!credit alice 1").unwrap();
        assert_eq!(
            dispatch(&bot, &host(), "!stimulate 5").unwrap(),
            "stimulus package of $5 rolled out to 1 accounts"
        );
        assert_eq!(bot.balance("alice").unwrap(), Cents(600));
        assert_eq!(bot.balance("newcomer").unwrap(), Cents(500));

        assert_eq!(
            dispatch(&bot, &host(), "!reset balances").unwrap(),
            "reset all balances"
        );
        assert_eq!(bot.balance("alice").unwrap(), Cents(500));
    }

    #[test]
    fn help_lists_only_permitted_commands() {
        let bot = bot();
        let guest_help = dispatch(&bot, &guest(), "!help").unwrap();
        assert!(guest_help.contains("!balance"));
        assert!(!guest_help.contains("!credit"));
        let host_help = dispatch(&bot, &host(), "!help").unwrap();
        assert!(host_help.contains("!credit"));
    }
}
