use std::net::IpAddr;
use std::sync::Arc;
use std::sync::LazyLock;
use std::time::Duration;

use chrono::Local;
use regex::Regex;
use warden_process::SupervisorError;

use crate::dispatch::HandlerTable;
use crate::mapgen;
use crate::procstat;
use crate::session::SessionContext;

pub const DEFAULT_STOP_DELAY: Duration = Duration::from_secs(5);

/// Verb usage synopses, also the source of truth for `help`'s verb list.
static USAGES: &[(&str, &str)] = &[
    (
        "?",
        "? [command]: If [command] is present, get usage information on that command, \
         otherwise display a list of available commands",
    ),
    (
        "backup",
        "backup [name]: Force the creation of a persistent backup. If [name] is present, \
         the file will be named '<name>.backup', otherwise '<timestamp>.backup'.",
    ),
    (
        "ban",
        "ban <name or ip> [duration]: Ban a player by ip or name. If [duration] is \
         present, the ban will be lifted after that much time.",
    ),
    (
        "pardon",
        "pardon <name or ip>: Remove a player from the banned list by name or IP.",
    ),
    (
        "give",
        "give <player> <item id or name> [num]: Spawn <item> at <player>'s location. If \
         [num] is present, spawn that many of <item>. Some items may not be spawnable by name.",
    ),
    (
        "help",
        "help [command]: If [command] is present, get usage information on that command, \
         otherwise display a list of available commands",
    ),
    (
        "kick",
        "kick <player> [duration]: Kick <player> off the server. Player will be able to \
         rejoin immediately unless [duration] is present, in which case they will be \
         banned for that long.",
    ),
    ("list", "list: List all players currently connected to the server."),
    (
        "mapgen",
        "mapgen [stop]: Force a run of the map generator. If a mapgen is currently \
         running, get an estimate of its progress.",
    ),
    (
        "restart",
        "restart [delay] [message]: Restart the server after issuing [message] and \
         waiting [delay]. If [delay] is not present, wait 5 seconds.",
    ),
    ("source", "source: Get information on this bot's source code."),
    ("start", "start: Start the server if it's stopped."),
    ("state", "state: Get information on the current server process."),
    ("status", "status: Get information on the current server process."),
    (
        "stop",
        "stop [delay] [message]: Stop the server after issuing [message] and waiting \
         [delay]. If [delay] is not present, wait 5 seconds.",
    ),
    (
        "tp",
        "tp <player> <destination player>: Teleport <player> to <destination player>'s location.",
    ),
    (
        "version",
        "version: Get the version number of the currently running server.",
    ),
    (
        "whitelist",
        "whitelist <add <name>|remove <name>|list>: Manipulate or examine the server's whitelist.",
    ),
];

fn usage_for(verb: &str) -> Option<&'static str> {
    USAGES.iter().find(|(v, _)| *v == verb).map(|(_, u)| *u)
}

fn usage(verb: &str) -> Vec<String> {
    vec![format!("Usage: {}", usage_for(verb).unwrap_or(verb))]
}

fn not_running() -> Vec<String> {
    vec![SupervisorError::NotRunning.to_string()]
}

// Recognized server output patterns, per the server's line protocol.
static KICK_SUCCESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[INFO\] Kicked ([a-zA-Z0-9_\-]+) from the game").expect("static regex")
});
static KICK_FAILURE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[INFO\] That player cannot be found").expect("static regex"));
static LIST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[INFO\] (There are \d+/\d+ players online:)").expect("static regex")
});
static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[INFO\] Starting (minecraft server version .*)").expect("static regex")
});
static TP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[INFO\] (Teleported .*|That player cannot be found.*)").expect("static regex")
});
static WHITELIST_CHANGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\[INFO\] (Added [a-zA-Z0-9_\-]+ to the whitelist|Removed [a-zA-Z0-9_\-]+ from the whitelist)",
    )
    .expect("static regex")
});
static WHITELIST_LIST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[INFO\] (There are \d+ \(out of \d+ seen\) whitelisted players:)")
        .expect("static regex")
});

/// Parse a time span of the form `<number><s|m|h>`, e.g. `30s`, `10m`, `2h`.
pub(crate) fn parse_duration(spec: &str) -> Option<Duration> {
    let (value, unit) = spec.split_at(spec.len().checked_sub(1)?);
    let n: u64 = value.parse().ok()?;
    if n == 0 {
        return None;
    }
    match unit {
        "s" => Some(Duration::from_secs(n)),
        "m" => Some(Duration::from_secs(n * 60)),
        "h" => Some(Duration::from_secs(n * 3600)),
        _ => None,
    }
}

fn bad_duration(spec: &str) -> Vec<String> {
    vec![format!(
        "Could not parse {spec} as a valid duration. Missing units?"
    )]
}

/// One-shot delayed reversal: sleep, then push a single line of server
/// input. Detached and non-cancellable on purpose — if the ban is lifted
/// manually before the timer fires, the pardon fires anyway and is
/// harmlessly redundant.
pub(crate) fn schedule_delayed_input(ctx: Arc<SessionContext>, delay: Duration, line: String) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        tracing::info!(%line, "delayed action firing");
        ctx.server_input(line);
    });
}

/// Strip everything through the `[INFO] ` marker so only the payload text
/// remains.
fn strip_info(line: String) -> String {
    match line.split_once("[INFO] ") {
        Some((_, rest)) => rest.to_string(),
        None => line,
    }
}

pub fn table() -> HandlerTable {
    let mut t = HandlerTable::new();
    t.register("?", help_cmd);
    t.register("help", help_cmd);
    t.register("backup", backup_cmd);
    t.register("ban", ban_cmd);
    t.register("pardon", pardon_cmd);
    t.register("give", give_cmd);
    t.register("kick", kick_cmd);
    t.register("list", list_cmd);
    t.register("mapgen", mapgen::mapgen_cmd);
    t.register("restart", restart_cmd);
    t.register("source", source_cmd);
    t.register("start", start_cmd);
    t.register("state", state_cmd);
    t.register("status", state_cmd);
    t.register("stop", stop_cmd);
    t.register("tp", tp_cmd);
    t.register("version", version_cmd);
    t.register("whitelist", whitelist_cmd);
    t
}

async fn help_cmd(_ctx: Arc<SessionContext>, args: Vec<String>) -> Vec<String> {
    match args.len() {
        0 => {
            let mut verbs: Vec<&str> = USAGES.iter().map(|(v, _)| *v).collect();
            verbs.sort_unstable();
            vec![format!("Available commands: {}", verbs.join(", "))]
        }
        1 => match usage_for(&args[0]) {
            Some(u) => vec![u.to_string()],
            None => vec![format!("Unknown command: {}", args[0])],
        },
        _ => usage("help"),
    }
}

async fn backup_cmd(ctx: Arc<SessionContext>, args: Vec<String>) -> Vec<String> {
    if args.len() > 1 {
        return usage("backup");
    }

    let filename = match args.first() {
        Some(name) => format!("{name}.backup"),
        None => format!("{}.backup", Local::now().format("%Y-%m-%dT%H_%M_%S")),
    };

    match ctx.supervisor.backup(&filename, &ctx.config.backup).await {
        Ok(()) => vec![format!("Backup finished: {filename}")],
        Err(e) => vec![e.to_string()],
    }
}

async fn ban_cmd(ctx: Arc<SessionContext>, args: Vec<String>) -> Vec<String> {
    if args.is_empty() || args.len() > 2 {
        return usage("ban");
    }
    if !ctx.supervisor.is_running().await {
        return not_running();
    }

    let target = args[0].clone();
    // Banning an IP takes a different server verb than banning a name.
    let ext = if target.parse::<IpAddr>().is_ok() {
        "-ip"
    } else {
        ""
    };

    let mut suffix = ".".to_string();
    if let Some(spec) = args.get(1) {
        let Some(dur) = parse_duration(spec) else {
            return bad_duration(spec);
        };
        suffix = format!(" for {spec}.");
        schedule_delayed_input(ctx.clone(), dur, format!("pardon{ext} {target}"));
    }

    ctx.server_input(format!("ban{ext} {target}"));
    vec![format!("{target} has been banned{suffix}")]
}

async fn pardon_cmd(ctx: Arc<SessionContext>, args: Vec<String>) -> Vec<String> {
    if args.len() != 1 {
        return usage("pardon");
    }
    if !ctx.supervisor.is_running().await {
        return not_running();
    }

    let target = &args[0];
    if target.parse::<IpAddr>().is_ok() {
        ctx.server_input(format!("pardon-ip {target}"));
    } else {
        ctx.server_input(format!("pardon {target}"));
    }
    vec![format!("{target} has been pardoned.")]
}

async fn give_cmd(ctx: Arc<SessionContext>, args: Vec<String>) -> Vec<String> {
    if args.len() < 2 || args.len() > 3 {
        return usage("give");
    }
    if !ctx.supervisor.is_running().await {
        return not_running();
    }

    let num = args.get(2).map(String::as_str).unwrap_or("1");
    ctx.server_input(format!("give {} {} {}", args[0], args[1], num));
    // The server announces the result in-game; nothing to report here.
    vec![]
}

async fn kick_cmd(ctx: Arc<SessionContext>, args: Vec<String>) -> Vec<String> {
    if args.is_empty() || args.len() > 2 {
        return usage("kick");
    }
    if !ctx.supervisor.is_running().await {
        return not_running();
    }

    let name = args[0].clone();
    let timed = match args.get(1) {
        Some(spec) => match parse_duration(spec) {
            Some(d) => Some((d, spec.clone())),
            None => return bad_duration(spec),
        },
        None => None,
    };

    ctx.server_input(format!("kick {name}"));

    loop {
        // `None` means our consume window expired: the dispatcher already
        // reported a timeout and the reply will be discarded.
        let Some(line) = ctx.responses.next_line().await else {
            return Vec::new();
        };
        if let Some(caps) = KICK_SUCCESS_RE.captures(&line) {
            if &caps[1] == name {
                break;
            }
        } else if KICK_FAILURE_RE.is_match(&line) {
            return vec![format!("Kick failed, couldn't find {name}.")];
        }
    }

    match timed {
        Some((dur, spec)) => {
            schedule_delayed_input(ctx.clone(), dur, format!("pardon {name}"));
            vec![format!(
                "{name} was kickbanned and will be pardoned in {spec}."
            )]
        }
        None => vec![format!("{name} was kicked.")],
    }
}

async fn list_cmd(ctx: Arc<SessionContext>, _args: Vec<String>) -> Vec<String> {
    if !ctx.supervisor.is_running().await {
        return not_running();
    }

    ctx.server_input("list");

    loop {
        let Some(line) = ctx.responses.next_line().await else {
            return Vec::new();
        };
        if let Some(caps) = LIST_RE.captures(&line) {
            let header = caps[1].to_string();
            // The protocol guarantees the player list follows immediately.
            let Some(payload) = ctx.responses.next_line().await else {
                return Vec::new();
            };
            return vec![header, strip_info(payload)];
        }
    }
}

async fn restart_cmd(ctx: Arc<SessionContext>, args: Vec<String>) -> Vec<String> {
    let mut reply = stop_cmd(ctx.clone(), args).await;
    reply.extend(start_cmd(ctx, Vec::new()).await);
    reply
}

async fn source_cmd(_ctx: Arc<SessionContext>, _args: Vec<String>) -> Vec<String> {
    vec![
        "warden supervises a single game server and takes commands from its console and \
         the chat network. Source and license: https://github.com/warden-dev/warden"
            .to_string(),
    ]
}

async fn start_cmd(ctx: Arc<SessionContext>, args: Vec<String>) -> Vec<String> {
    if !args.is_empty() {
        return usage("start");
    }

    if let Err(e) = ctx.supervisor.start().await {
        return vec![e.to_string()];
    }

    // Wait for the version banner so `version` has something to report.
    // If it never shows, the dispatcher's global timeout reels us in.
    loop {
        let Some(line) = ctx.responses.next_line().await else {
            return Vec::new();
        };
        if let Some(caps) = VERSION_RE.captures(&line) {
            ctx.set_server_version(&caps[1]);
            break;
        }
    }

    vec!["Server started.".to_string()]
}

async fn state_cmd(ctx: Arc<SessionContext>, args: Vec<String>) -> Vec<String> {
    if !args.is_empty() {
        return usage("state");
    }

    let pid = match ctx.supervisor.pid().await {
        Ok(pid) => pid,
        Err(e) => return vec![e.to_string()],
    };

    let mut reply = Vec::new();
    match procstat::resource_snapshot(pid).await {
        Ok(snap) => {
            for line in [snap.vm_size, snap.vm_swap, snap.threads]
                .into_iter()
                .flatten()
            {
                reply.push(line);
            }
        }
        Err(e) => reply.push(format!("Error while assessing status: {e}")),
    }

    reply.push(format!("Errors: {}", ctx.server_errors()));
    reply.push(format!("Severe Errors: {}", ctx.severe_errors()));
    let version = ctx.server_version();
    if !version.is_empty() {
        reply.push(version);
    }

    if ctx
        .mapgen
        .running
        .load(std::sync::atomic::Ordering::SeqCst)
    {
        reply.push(format!(
            "MapGen currently running: {}",
            ctx.mapgen.last_output()
        ));
    } else if let Some(at) = ctx.mapgen.last_run() {
        reply.push(format!("MapGen last run {}", at.format("%a %b %e %H:%M")));
    } else {
        reply.push("No MapGen run since last bot restart.".to_string());
    }

    reply
}

async fn stop_cmd(ctx: Arc<SessionContext>, mut args: Vec<String>) -> Vec<String> {
    if !ctx.supervisor.is_running().await {
        return not_running();
    }

    let mut delay = DEFAULT_STOP_DELAY;
    // A leading token that parses as a duration is the delay; otherwise
    // everything is the broadcast message.
    if let Some(first) = args.first()
        && let Some(d) = parse_duration(first)
    {
        delay = d;
        args.remove(0);
    }

    let msg = if args.is_empty() {
        format!(
            "Stop command issued, going down in {} seconds.",
            delay.as_secs()
        )
    } else {
        args.join(" ")
    };

    ctx.reset_counters();

    match ctx.supervisor.stop(delay, &msg).await {
        Ok(()) => vec!["Server stopped.".to_string()],
        Err(e) => vec![e.to_string()],
    }
}

async fn tp_cmd(ctx: Arc<SessionContext>, args: Vec<String>) -> Vec<String> {
    if args.len() != 2 {
        return usage("tp");
    }
    if !ctx.supervisor.is_running().await {
        return not_running();
    }

    ctx.server_input(format!("tp {} {}", args[0], args[1]));

    loop {
        let Some(line) = ctx.responses.next_line().await else {
            return Vec::new();
        };
        if let Some(caps) = TP_RE.captures(&line) {
            return vec![caps[1].to_string()];
        }
    }
}

async fn version_cmd(ctx: Arc<SessionContext>, _args: Vec<String>) -> Vec<String> {
    let version = ctx.server_version();
    if version.is_empty() {
        vec!["Server not running or version unknown.".to_string()]
    } else {
        vec![version]
    }
}

async fn whitelist_cmd(ctx: Arc<SessionContext>, args: Vec<String>) -> Vec<String> {
    if args.is_empty() {
        return usage("whitelist");
    }
    if !ctx.supervisor.is_running().await {
        return not_running();
    }

    match args[0].as_str() {
        "add" | "remove" => {
            if args.len() < 2 {
                return vec![format!("{} requires at least one argument", args[0])];
            }

            let mut reply = Vec::new();
            for name in &args[1..] {
                ctx.server_input(format!("whitelist {} {}", args[0], name));
                loop {
                    let Some(line) = ctx.responses.next_line().await else {
                        return Vec::new();
                    };
                    if let Some(caps) = WHITELIST_CHANGE_RE.captures(&line) {
                        reply.push(caps[1].to_string());
                        break;
                    }
                }
            }
            reply
        }
        "list" => {
            ctx.server_input("whitelist list");
            loop {
                let Some(line) = ctx.responses.next_line().await else {
                    return Vec::new();
                };
                if let Some(caps) = WHITELIST_LIST_RE.captures(&line) {
                    let header = caps[1].to_string();
                    let Some(payload) = ctx.responses.next_line().await else {
                        return Vec::new();
                    };
                    return vec![header, strip_info(payload)];
                }
            }
        }
        _ => usage("whitelist"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::harness;

    #[test]
    fn durations_parse_with_units() {
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("10m"), Some(Duration::from_secs(600)));
        assert_eq!(parse_duration("2h"), Some(Duration::from_secs(7200)));
        assert_eq!(parse_duration("10"), None);
        assert_eq!(parse_duration("0s"), None);
        assert_eq!(parse_duration("tenm"), None);
        assert_eq!(parse_duration(""), None);
    }

    #[tokio::test]
    async fn help_lists_every_verb() {
        let h = harness();
        let reply = help_cmd(h.ctx.clone(), vec![]).await;
        assert_eq!(reply.len(), 1);
        assert!(reply[0].starts_with("Available commands: "));
        for verb in ["ban", "mapgen", "whitelist", "?"] {
            assert!(reply[0].contains(verb), "missing {verb}");
        }

        let reply = help_cmd(h.ctx.clone(), vec!["ban".to_string()]).await;
        assert!(reply[0].starts_with("ban <name or ip>"));

        let reply = help_cmd(h.ctx, vec!["nonsense".to_string()]).await;
        assert_eq!(reply[0], "Unknown command: nonsense");
    }

    #[tokio::test]
    async fn ban_requires_arguments_and_a_running_server() {
        let h = harness();
        let reply = ban_cmd(h.ctx.clone(), vec![]).await;
        assert!(reply[0].starts_with("Usage: ban"));

        let reply = ban_cmd(h.ctx, vec!["griefer".to_string()]).await;
        assert_eq!(reply[0], "Server not currently running.");
    }

    #[tokio::test]
    async fn ban_of_ip_uses_ip_verbs() {
        let mut h = harness();
        h.ctx.supervisor.start().await.unwrap();

        let reply = ban_cmd(
            h.ctx.clone(),
            vec!["10.0.0.1".to_string(), "1s".to_string()],
        )
        .await;
        assert_eq!(reply[0], "10.0.0.1 has been banned for 1s.");

        // The ban goes out immediately (cat echoes our stdin back).
        let line = tokio::time::timeout(Duration::from_secs(5), h.output_rx.recv())
            .await
            .expect("ban line")
            .expect("channel open");
        assert_eq!(line, "ban-ip 10.0.0.1");

        // The reciprocal pardon is scheduled, not immediate.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(h.output_rx.try_recv().is_err());

        let line = tokio::time::timeout(Duration::from_secs(5), h.output_rx.recv())
            .await
            .expect("pardon line")
            .expect("channel open");
        assert_eq!(line, "pardon-ip 10.0.0.1");
        h.ctx.supervisor.destroy().await;
    }

    #[tokio::test]
    async fn ban_without_duration_schedules_no_pardon() {
        let mut h = harness();
        h.ctx.supervisor.start().await.unwrap();

        let reply = ban_cmd(h.ctx.clone(), vec!["griefer".to_string()]).await;
        assert_eq!(reply[0], "griefer has been banned.");

        let line = tokio::time::timeout(Duration::from_secs(5), h.output_rx.recv())
            .await
            .expect("ban line")
            .expect("channel open");
        assert_eq!(line, "ban griefer");
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(h.output_rx.try_recv().is_err());
        h.ctx.supervisor.destroy().await;
    }

    #[tokio::test]
    async fn ban_rejects_bad_duration() {
        let h = harness();
        h.ctx.supervisor.start().await.unwrap();
        let reply = ban_cmd(
            h.ctx.clone(),
            vec!["griefer".to_string(), "ten".to_string()],
        )
        .await;
        assert_eq!(
            reply[0],
            "Could not parse ten as a valid duration. Missing units?"
        );
        h.ctx.supervisor.destroy().await;
    }

    #[tokio::test]
    async fn delayed_input_fires_once_after_the_delay() {
        let mut h = harness();
        h.ctx.supervisor.start().await.unwrap();

        schedule_delayed_input(
            h.ctx.clone(),
            Duration::from_millis(30),
            "pardon griefer".to_string(),
        );
        let line = tokio::time::timeout(Duration::from_secs(5), h.output_rx.recv())
            .await
            .expect("pardon line")
            .expect("channel open");
        assert_eq!(line, "pardon griefer");
        h.ctx.supervisor.destroy().await;
    }

    #[tokio::test]
    async fn list_returns_header_and_payload() {
        let h = harness();
        h.ctx.supervisor.start().await.unwrap();

        h.ctx
            .responses
            .publish("2024-01-01 [INFO] There are 2/20 players online:")
            .await;
        h.ctx.responses.publish("2024-01-01 [INFO] alice, bob").await;

        let reply = list_cmd(h.ctx.clone(), vec![]).await;
        assert_eq!(
            reply,
            vec![
                "There are 2/20 players online:".to_string(),
                "alice, bob".to_string()
            ]
        );
        h.ctx.supervisor.destroy().await;
    }

    #[tokio::test]
    async fn kick_matches_only_the_named_player() {
        let h = harness();
        h.ctx.supervisor.start().await.unwrap();

        h.ctx
            .responses
            .publish("[INFO] Kicked somebody_else from the game")
            .await;
        h.ctx
            .responses
            .publish("[INFO] Kicked griefer from the game")
            .await;

        let reply = kick_cmd(h.ctx.clone(), vec!["griefer".to_string()]).await;
        assert_eq!(reply, vec!["griefer was kicked.".to_string()]);
        h.ctx.supervisor.destroy().await;
    }

    #[tokio::test]
    async fn kick_reports_unknown_player() {
        let h = harness();
        h.ctx.supervisor.start().await.unwrap();

        h.ctx
            .responses
            .publish("[INFO] That player cannot be found")
            .await;
        let reply = kick_cmd(h.ctx.clone(), vec!["ghost".to_string()]).await;
        assert_eq!(reply, vec!["Kick failed, couldn't find ghost.".to_string()]);
        h.ctx.supervisor.destroy().await;
    }

    #[tokio::test]
    async fn tp_returns_whichever_outcome_matched() {
        let h = harness();
        h.ctx.supervisor.start().await.unwrap();

        h.ctx
            .responses
            .publish("[INFO] Teleported alice to bob")
            .await;
        let reply = tp_cmd(
            h.ctx.clone(),
            vec!["alice".to_string(), "bob".to_string()],
        )
        .await;
        assert_eq!(reply, vec!["Teleported alice to bob".to_string()]);
        h.ctx.supervisor.destroy().await;
    }

    #[tokio::test]
    async fn whitelist_add_waits_for_each_confirmation() {
        let h = harness();
        h.ctx.supervisor.start().await.unwrap();

        h.ctx
            .responses
            .publish("[INFO] Added alice to the whitelist")
            .await;
        h.ctx
            .responses
            .publish("[INFO] Added bob to the whitelist")
            .await;

        let reply = whitelist_cmd(
            h.ctx.clone(),
            vec!["add".to_string(), "alice".to_string(), "bob".to_string()],
        )
        .await;
        assert_eq!(
            reply,
            vec![
                "Added alice to the whitelist".to_string(),
                "Added bob to the whitelist".to_string()
            ]
        );
        h.ctx.supervisor.destroy().await;
    }

    #[tokio::test]
    async fn version_falls_back_when_unknown() {
        let h = harness();
        let reply = version_cmd(h.ctx.clone(), vec![]).await;
        assert_eq!(reply[0], "Server not running or version unknown.");

        h.ctx.set_server_version("minecraft server version 1.2.5");
        let reply = version_cmd(h.ctx, vec![]).await;
        assert_eq!(reply[0], "minecraft server version 1.2.5");
    }

    #[tokio::test]
    async fn state_requires_a_running_server() {
        let h = harness();
        let reply = state_cmd(h.ctx, vec![]).await;
        assert_eq!(reply[0], "Server not currently running.");
    }

    #[tokio::test]
    async fn stop_resets_counters_and_version() {
        let h = harness();
        h.ctx.supervisor.start().await.unwrap();
        h.ctx.record_server_error();
        h.ctx.set_server_version("minecraft server version 1.2.5");

        let reply = stop_cmd(h.ctx.clone(), vec!["1s".to_string()]).await;
        assert_eq!(reply, vec!["Server stopped.".to_string()]);
        assert_eq!(h.ctx.server_errors(), 0);
        assert_eq!(h.ctx.server_version(), "");
    }

    #[tokio::test]
    async fn stop_broadcasts_the_given_message() {
        let mut h = harness();
        h.ctx.supervisor.start().await.unwrap();
        let reply = stop_cmd(
            h.ctx.clone(),
            vec!["1s".to_string(), "goodbye".to_string(), "all".to_string()],
        )
        .await;
        assert_eq!(reply, vec!["Server stopped.".to_string()]);

        // cat echoed the whole stop sequence back before it was killed.
        let mut seen = Vec::new();
        while let Ok(line) = h.output_rx.try_recv() {
            seen.push(line);
        }
        assert!(seen.contains(&"save-all".to_string()));
        assert!(seen.contains(&"say goodbye all".to_string()));
        assert!(seen.contains(&"stop".to_string()));
    }
}
