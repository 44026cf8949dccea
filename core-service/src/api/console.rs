//! Operator Console - Line-oriented control surface
//!
//! Reads one command per line and prints a plain-text reply. Identity names
//! may contain spaces ("Baidu Netdisk").

use std::io::{self, BufRead, Write};

use super::commands;
use crate::logic::aggregate::{ControlState, TrafficLevel};
use crate::logic::monitor::Monitor;
use crate::logic::telemetry::Pid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Status,
    Apps,
    Processes,
    Known,
    Block(Pid),
    Unblock(Pid),
    BlockApp(String),
    UnblockApp(String),
    LimitApp(String, u32),
    UnlimitApp(String),
    Sweep,
    Start,
    Stop,
    Help,
    Quit,
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        let command = match verb.to_lowercase().as_str() {
            "status" => ConsoleCommand::Status,
            "apps" => ConsoleCommand::Apps,
            "ps" | "processes" => ConsoleCommand::Processes,
            "known" => ConsoleCommand::Known,
            "block" => ConsoleCommand::Block(parse_pid(rest)?),
            "unblock" => ConsoleCommand::Unblock(parse_pid(rest)?),
            "block-app" => ConsoleCommand::BlockApp(require_name(rest)?),
            "unblock-app" => ConsoleCommand::UnblockApp(require_name(rest)?),
            "limit-app" => {
                let (name, kbps) = rest
                    .rsplit_once(char::is_whitespace)
                    .ok_or("usage: limit-app <name> <kbps>")?;
                let kbps = kbps
                    .parse::<u32>()
                    .map_err(|_| format!("invalid limit '{}'", kbps))?;
                ConsoleCommand::LimitApp(require_name(name)?, kbps)
            }
            "unlimit-app" => ConsoleCommand::UnlimitApp(require_name(rest)?),
            "sweep" => ConsoleCommand::Sweep,
            "start" => ConsoleCommand::Start,
            "stop" => ConsoleCommand::Stop,
            "help" | "?" => ConsoleCommand::Help,
            "quit" | "exit" => ConsoleCommand::Quit,
            "" => return Err("empty command".to_string()),
            other => return Err(format!("unknown command '{}', try 'help'", other)),
        };
        Ok(command)
    }
}

fn parse_pid(arg: &str) -> Result<Pid, String> {
    arg.parse::<Pid>().map_err(|_| format!("invalid pid '{}'", arg))
}

fn require_name(arg: &str) -> Result<String, String> {
    let name = arg.trim();
    if name.is_empty() {
        Err("missing software name".to_string())
    } else {
        Ok(name.to_string())
    }
}

const HELP: &str = "\
status                     monitor state
apps                       per-software upload totals
ps                         tracked processes
known                      software names in the catalog
block <pid>                block outbound traffic of a process
unblock <pid>              remove that block
block-app <name>           block every running process of a software
unblock-app <name>         unblock every running process of a software
limit-app <name> <kbps>    record an upload limit (not enforced)
unlimit-app <name>         forget the limit
sweep                      remove all rules created by this tool
start | stop               control the scan loop
quit";

// ============================================================================
// EXECUTION
// ============================================================================

/// Run one command; `Ok` carries the reply text
pub fn execute(monitor: &Monitor, command: &ConsoleCommand) -> Result<String, String> {
    match command {
        ConsoleCommand::Status => {
            let status = commands::get_status(monitor);
            let mut out = format!(
                "running: {}  firewall: {}  cycle: {}  processes: {}  blocked: {:?}",
                status.is_running,
                status.enforcer,
                status.cycle,
                status.tracked_processes,
                status.blocked_pids
            );
            if let Some(error) = status.last_error {
                out.push_str(&format!("\nlast scan failed: {}", error));
            }
            Ok(out)
        }
        ConsoleCommand::Apps => {
            let apps = commands::get_apps(monitor);
            if apps.is_empty() {
                return Ok("no known software running".to_string());
            }
            let mut out = format!("{:<22} {:>5} {:>12} {:>12} {:>6}  {}", "SOFTWARE", "PROCS", "UPLOAD", "TOTAL", "CONNS", "STATE");
            for app in apps {
                out.push_str(&format!(
                    "\n{:<22} {:>5} {:>12} {:>12} {:>6}  {}",
                    app.identity,
                    app.process_count,
                    format_rate(app.upload_rate),
                    format_bytes(app.cumulative_upload),
                    app.connections,
                    describe(app.control, app.level)
                ));
            }
            Ok(out)
        }
        ConsoleCommand::Processes => {
            let rows = commands::get_processes(monitor);
            if rows.is_empty() {
                return Ok("no known software running".to_string());
            }
            let mut out = format!("{:>7} {:<22} {:<20} {:>12} {:>12} {:>6}", "PID", "SOFTWARE", "EXECUTABLE", "UPLOAD", "TOTAL", "CONNS");
            for row in rows {
                out.push_str(&format!(
                    "\n{:>7} {:<22} {:<20} {:>12} {:>12} {:>6}{}",
                    row.pid,
                    row.identity,
                    row.executable_name,
                    format_rate(row.upload_rate),
                    format_bytes(row.cumulative_upload),
                    row.connections,
                    if row.blocked { "  [blocked]" } else { "" }
                ));
            }
            Ok(out)
        }
        ConsoleCommand::Known => Ok(commands::get_known_apps(monitor).join("\n")),
        ConsoleCommand::Block(pid) => {
            commands::block_process(monitor, *pid).map(|_| format!("pid {} blocked", pid))
        }
        ConsoleCommand::Unblock(pid) => {
            commands::unblock_process(monitor, *pid).map(|_| format!("pid {} unblocked", pid))
        }
        ConsoleCommand::BlockApp(name) => commands::block_app(monitor, name).map(|r| app_reply("blocked", r)),
        ConsoleCommand::UnblockApp(name) => commands::unblock_app(monitor, name).map(|r| app_reply("unblocked", r)),
        ConsoleCommand::LimitApp(name, kbps) => commands::limit_app(monitor, name, *kbps)
            .map(|_| format!("{}: upload limit {} KB/s recorded (not enforced)", name, kbps)),
        ConsoleCommand::UnlimitApp(name) => commands::unlimit_app(monitor, name).map(|had| {
            if had {
                format!("{}: limit cleared", name)
            } else {
                format!("{}: no limit recorded", name)
            }
        }),
        ConsoleCommand::Sweep => {
            let report = commands::sweep_rules(monitor);
            let mut out = format!(
                "removed {} rule(s), cleared {} blocked pid(s)",
                report.removed.len(),
                report.cleared
            );
            for (pid, error) in &report.failed {
                out.push_str(&format!("\n  pid {}: {}", pid, error));
            }
            if let Some(error) = report.list_error {
                out.push_str(&format!("\n  rule listing failed: {}", error));
            }
            Ok(out)
        }
        ConsoleCommand::Start => commands::start_monitor(monitor).map(|started| {
            let reply = if started { "monitor started" } else { "monitor already running" };
            reply.to_string()
        }),
        ConsoleCommand::Stop => commands::stop_monitor(monitor).map(|_| "monitor stopped".to_string()),
        ConsoleCommand::Help => Ok(HELP.to_string()),
        ConsoleCommand::Quit => Ok(String::new()),
    }
}

fn app_reply(verb: &str, result: commands::AppActionResult) -> String {
    let mut out = format!(
        "{}: {} {} pid(s) {:?}",
        result.identity,
        verb,
        result.succeeded.len(),
        result.succeeded
    );
    for failure in &result.failed {
        out.push_str(&format!("\n  pid {} failed: {}", failure.pid, failure.error));
    }
    out
}

/// Read commands until `quit` or end of input
pub fn run<R: BufRead, W: Write>(monitor: &Monitor, input: R, mut output: W) -> io::Result<()> {
    writeln!(output, "Type 'help' for commands.")?;
    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match ConsoleCommand::parse(&line) {
            Ok(ConsoleCommand::Quit) => break,
            Ok(command) => match execute(monitor, &command) {
                Ok(reply) => writeln!(output, "{}", reply)?,
                Err(e) => writeln!(output, "error: {}", e)?,
            },
            Err(e) => writeln!(output, "error: {}", e)?,
        }
        output.flush()?;
    }
    Ok(())
}

// ============================================================================
// FORMATTING
// ============================================================================

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

pub fn format_rate(bytes_per_sec: f64) -> String {
    format!("{}/s", format_bytes(bytes_per_sec.max(0.0) as u64))
}

fn describe(control: ControlState, level: TrafficLevel) -> String {
    let level = match level {
        TrafficLevel::High => "high",
        TrafficLevel::Medium => "medium",
        TrafficLevel::Low => "low",
    };
    match control {
        ControlState::Allowed => level.to_string(),
        ControlState::Blocked => format!("{}, blocked", level),
        ControlState::PartiallyBlocked => format!("{}, partly blocked", level),
        ControlState::Limited { kbps } => format!("{}, limit {} KB/s", level, kbps),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(ConsoleCommand::parse("status"), Ok(ConsoleCommand::Status));
        assert_eq!(ConsoleCommand::parse("  APPS "), Ok(ConsoleCommand::Apps));
        assert_eq!(ConsoleCommand::parse("sweep"), Ok(ConsoleCommand::Sweep));
        assert_eq!(ConsoleCommand::parse("exit"), Ok(ConsoleCommand::Quit));
    }

    #[test]
    fn test_parse_pid_commands() {
        assert_eq!(ConsoleCommand::parse("block 4321"), Ok(ConsoleCommand::Block(4321)));
        assert_eq!(ConsoleCommand::parse("unblock  7"), Ok(ConsoleCommand::Unblock(7)));
        assert!(ConsoleCommand::parse("block").is_err());
        assert!(ConsoleCommand::parse("block -3").is_err());
    }

    #[test]
    fn test_parse_names_with_spaces() {
        assert_eq!(
            ConsoleCommand::parse("block-app Baidu Netdisk"),
            Ok(ConsoleCommand::BlockApp("Baidu Netdisk".to_string()))
        );
        assert_eq!(
            ConsoleCommand::parse("limit-app Tencent Video 256"),
            Ok(ConsoleCommand::LimitApp("Tencent Video".to_string(), 256))
        );
        assert!(ConsoleCommand::parse("limit-app WeChat").is_err());
        assert!(ConsoleCommand::parse("limit-app WeChat fast").is_err());
        assert!(ConsoleCommand::parse("unblock-app").is_err());
    }

    #[test]
    fn test_parse_unknown() {
        let err = ConsoleCommand::parse("reboot now").unwrap_err();
        assert!(err.contains("reboot"));
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(300_000), "293.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_rate(-4.0), "0 B/s");
    }

    #[test]
    fn test_describe_state() {
        assert_eq!(describe(ControlState::Allowed, TrafficLevel::Low), "low");
        assert_eq!(
            describe(ControlState::Limited { kbps: 64 }, TrafficLevel::High),
            "high, limit 64 KB/s"
        );
    }
}
