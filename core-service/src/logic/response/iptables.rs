//! Linux netfilter adapter (iptables owner match)
//!
//! Each rule drops OUTPUT traffic of one pid and carries the rule name as its
//! comment, which is how `list_rules` finds it again. `iptables -A` happily
//! appends duplicates, so install checks with `-C` first and remove deletes
//! until no copy is left.

use std::path::Path;
use once_cell::sync::Lazy;
use regex::Regex;

use super::command::{CommandOutput, CommandRunner};
use super::firewall::RuleEnforcer;
use super::types::{EnforcementError, RuleId, RuleNaming};

const IPTABLES: &str = "iptables";

/// iptables -C / -D on a rule that is not there
const NO_MATCHING_RULE: &str = "does a matching rule exist";

/// Upper bound on `-D` repeats for one rule
const MAX_DUPLICATES: usize = 64;

static COMMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"--comment\s+"?([^"\s]+)"?"#).expect("valid comment regex"));

pub struct IptablesEnforcer {
    runner: CommandRunner,
    naming: RuleNaming,
    program: String,
    /// Arguments placed before every iptables argument list
    leading_args: Vec<String>,
}

impl IptablesEnforcer {
    pub fn new(runner: CommandRunner, naming: RuleNaming) -> Self {
        Self {
            runner,
            naming,
            program: IPTABLES.to_string(),
            leading_args: Vec::new(),
        }
    }

    /// Drive a stand-in for the iptables binary
    #[cfg(test)]
    pub fn with_command(runner: CommandRunner, naming: RuleNaming, program: &str, leading_args: &[&str]) -> Self {
        Self {
            runner,
            naming,
            program: program.to_string(),
            leading_args: leading_args.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn run(&self, args: Vec<String>) -> Result<CommandOutput, EnforcementError> {
        let mut full = self.leading_args.clone();
        full.extend(args);
        self.runner.run(&self.program, &full)
    }

    fn failure(&self, output: &CommandOutput) -> EnforcementError {
        EnforcementError::Failed {
            command: IPTABLES.to_string(),
            exit_code: output.exit_code,
            detail: output.detail(),
        }
    }

    /// Whether an identical rule is already in the chain
    fn is_installed(&self, rule: &RuleId) -> Result<bool, EnforcementError> {
        let output = self.run(rule_spec("-C", rule))?;
        if output.success {
            Ok(true)
        } else if output.stderr.contains(NO_MATCHING_RULE) {
            Ok(false)
        } else {
            Err(self.failure(&output))
        }
    }
}

fn rule_spec(action: &str, rule: &RuleId) -> Vec<String> {
    vec![
        action.to_string(),
        "OUTPUT".to_string(),
        "-m".to_string(),
        "owner".to_string(),
        "--pid-owner".to_string(),
        rule.pid.to_string(),
        "-m".to_string(),
        "comment".to_string(),
        "--comment".to_string(),
        rule.name.clone(),
        "-j".to_string(),
        "DROP".to_string(),
    ]
}

/// Rules of ours in `iptables -S OUTPUT` output
fn parse_rule_listing(naming: &RuleNaming, listing: &str) -> Vec<RuleId> {
    let mut rules: Vec<RuleId> = listing
        .lines()
        .filter(|line| line.starts_with("-A OUTPUT"))
        .filter_map(|line| COMMENT_RE.captures(line))
        .filter_map(|caps| naming.parse(&caps[1]))
        .collect();
    rules.sort();
    rules.dedup();
    rules
}

impl RuleEnforcer for IptablesEnforcer {
    fn name(&self) -> &'static str {
        "iptables"
    }

    fn install(&mut self, rule: &RuleId, executable: &Path) -> Result<(), EnforcementError> {
        if self.is_installed(rule)? {
            log::info!("iptables rule {} already installed", rule.name);
            return Ok(());
        }
        let output = self.run(rule_spec("-A", rule))?;
        if !output.success {
            return Err(self.failure(&output));
        }
        log::info!("Installed iptables rule {} ({})", rule.name, executable.display());
        Ok(())
    }

    fn remove(&mut self, rule: &RuleId) -> Result<(), EnforcementError> {
        let mut removed = 0;
        while removed < MAX_DUPLICATES {
            let output = self.run(rule_spec("-D", rule))?;
            if output.success {
                removed += 1;
                continue;
            }
            if output.stderr.contains(NO_MATCHING_RULE) {
                if removed == 0 {
                    log::info!("iptables rule {} already absent", rule.name);
                } else {
                    log::info!("Removed iptables rule {} (x{})", rule.name, removed);
                }
                return Ok(());
            }
            return Err(self.failure(&output));
        }
        Err(EnforcementError::Failed {
            command: IPTABLES.to_string(),
            exit_code: 0,
            detail: format!("{} still present after {} deletions", rule.name, MAX_DUPLICATES),
        })
    }

    fn list_rules(&mut self) -> Result<Vec<RuleId>, EnforcementError> {
        let output = self.run(vec!["-S".to_string(), "OUTPUT".to_string()])?;
        if !output.success {
            return Err(self.failure(&output));
        }
        Ok(parse_rule_listing(&self.naming, &output.stdout))
    }
}

/// Shell stand-in for iptables that keeps OUTPUT rules, duplicates included,
/// one per line in a state file
#[cfg(all(test, unix))]
pub(crate) mod fake {
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    use super::IptablesEnforcer;
    use crate::logic::response::command::CommandRunner;
    use crate::logic::response::types::RuleNaming;

    const SCRIPT: &str = r##"state='@STATE@'
touch "$state"
op="$1"
shift
rule="-A $*"
missing() {
    echo "iptables: Bad rule (does a matching rule exist in that chain?)." >&2
    exit 1
}
has_rule() {
    while IFS= read -r line; do
        [ "$line" = "$rule" ] && return 0
    done < "$state"
    return 1
}
case "$op" in
    -A) printf '%s\n' "$rule" >> "$state" ;;
    -C) has_rule || missing ;;
    -D)
        has_rule || missing
        found=0
        : > "$state.tmp"
        while IFS= read -r line; do
            if [ "$found" = 0 ] && [ "$line" = "$rule" ]; then
                found=1
                continue
            fi
            printf '%s\n' "$line" >> "$state.tmp"
        done < "$state"
        mv "$state.tmp" "$state"
        ;;
    -S)
        echo "-P OUTPUT ACCEPT"
        cat "$state"
        ;;
    *)
        echo "unsupported: $op" >&2
        exit 2
        ;;
esac
"##;

    pub struct FakeIptables {
        pub script: PathBuf,
        pub state: PathBuf,
    }

    impl FakeIptables {
        pub fn new(dir: &Path) -> Self {
            let script = dir.join("iptables.sh");
            let state = dir.join("iptables.rules");
            fs::write(&script, SCRIPT.replace("@STATE@", &state.to_string_lossy())).unwrap();
            Self { script, state }
        }

        pub fn enforcer(&self, naming: RuleNaming) -> IptablesEnforcer {
            let runner = CommandRunner::new(Duration::from_secs(5)).unwrap();
            let script = self.script.to_string_lossy().to_string();
            IptablesEnforcer::with_command(runner, naming, "sh", &[script.as_str()])
        }

        /// Installed rule lines, in chain order
        pub fn rules(&self) -> Vec<String> {
            fs::read_to_string(&self.state)
                .unwrap_or_default()
                .lines()
                .map(str::to_string)
                .collect()
        }

        pub fn append_raw(&self, line: &str) {
            let mut content = fs::read_to_string(&self.state).unwrap_or_default();
            content.push_str(line);
            content.push('\n');
            fs::write(&self.state, content).unwrap();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_spec() {
        let rule = RuleNaming::new("AntiPCDN_Block_PID_").for_pid(812);
        let spec = rule_spec("-A", &rule);
        assert_eq!(
            spec.join(" "),
            "-A OUTPUT -m owner --pid-owner 812 -m comment --comment AntiPCDN_Block_PID_812 -j DROP"
        );
    }

    #[test]
    fn test_parse_rule_listing() {
        let naming = RuleNaming::new("AntiPCDN_Block_PID_");
        let listing = "-P OUTPUT ACCEPT
-A OUTPUT -m owner --pid-owner 812 -m comment --comment AntiPCDN_Block_PID_812 -j DROP
-A OUTPUT -d 10.0.0.0/8 -j ACCEPT
-A OUTPUT -m owner --pid-owner 90 -m comment --comment \"AntiPCDN_Block_PID_90\" -j DROP
-A OUTPUT -m comment --comment \"someone else\" -j DROP
";
        let rules = parse_rule_listing(&naming, listing);
        assert_eq!(rules, vec![naming.for_pid(90), naming.for_pid(812)]);
    }
}

#[cfg(all(test, unix))]
mod fake_binary_tests {
    use std::path::Path;
    use tempfile::tempdir;

    use super::fake::FakeIptables;
    use super::*;

    fn naming() -> RuleNaming {
        RuleNaming::new("AntiPCDN_Block_PID_")
    }

    #[test]
    fn test_install_is_idempotent() {
        let dir = tempdir().unwrap();
        let fake = FakeIptables::new(dir.path());
        let mut enforcer = fake.enforcer(naming());
        let rule = naming().for_pid(100);

        enforcer.install(&rule, Path::new("/usr/bin/app")).unwrap();
        enforcer.install(&rule, Path::new("/usr/bin/app")).unwrap();

        assert_eq!(fake.rules(), vec![rule_spec("-A", &rule).join(" ")]);

        enforcer.remove(&rule).unwrap();
        assert!(fake.rules().is_empty());
    }

    #[test]
    fn test_remove_clears_every_copy() {
        let dir = tempdir().unwrap();
        let fake = FakeIptables::new(dir.path());
        let rule = naming().for_pid(100);
        let line = rule_spec("-A", &rule).join(" ");
        fake.append_raw(&line);
        fake.append_raw("-A OUTPUT -d 10.0.0.0/8 -j ACCEPT");
        fake.append_raw(&line);
        fake.append_raw(&line);
        let mut enforcer = fake.enforcer(naming());

        assert_eq!(enforcer.list_rules().unwrap(), vec![rule.clone()]);
        enforcer.remove(&rule).unwrap();

        assert_eq!(fake.rules(), vec!["-A OUTPUT -d 10.0.0.0/8 -j ACCEPT".to_string()]);
        assert!(enforcer.list_rules().unwrap().is_empty());
    }

    #[test]
    fn test_remove_absent_rule_is_ok() {
        let dir = tempdir().unwrap();
        let fake = FakeIptables::new(dir.path());
        let mut enforcer = fake.enforcer(naming());

        enforcer.remove(&naming().for_pid(5)).unwrap();
        assert!(fake.rules().is_empty());
    }
}
