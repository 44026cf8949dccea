//! Windows Firewall adapter (netsh advfirewall)

use std::path::Path;

use super::command::CommandRunner;
use super::firewall::RuleEnforcer;
use super::types::{EnforcementError, RuleId, RuleNaming};

const NETSH: &str = "netsh";

/// netsh prints this (exit code 1) when deleting a rule that does not exist
const NO_MATCHING_RULES: &str = "No rules match";

pub struct NetshEnforcer {
    runner: CommandRunner,
    naming: RuleNaming,
}

impl NetshEnforcer {
    pub fn new(runner: CommandRunner, naming: RuleNaming) -> Self {
        Self { runner, naming }
    }
}

fn add_rule_args(rule: &RuleId, executable: &Path) -> Vec<String> {
    vec![
        "advfirewall".to_string(),
        "firewall".to_string(),
        "add".to_string(),
        "rule".to_string(),
        format!("name={}", rule.name),
        "dir=out".to_string(),
        "action=block".to_string(),
        format!("program={}", executable.display()),
        "enable=yes".to_string(),
    ]
}

fn delete_rule_args(rule: &RuleId) -> Vec<String> {
    vec![
        "advfirewall".to_string(),
        "firewall".to_string(),
        "delete".to_string(),
        "rule".to_string(),
        format!("name={}", rule.name),
    ]
}

fn show_rules_args() -> Vec<String> {
    ["advfirewall", "firewall", "show", "rule", "name=all"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl RuleEnforcer for NetshEnforcer {
    fn name(&self) -> &'static str {
        "netsh"
    }

    fn install(&mut self, rule: &RuleId, executable: &Path) -> Result<(), EnforcementError> {
        self.runner.run_checked(NETSH, &add_rule_args(rule, executable))?;
        log::info!("Installed firewall rule {} for {}", rule.name, executable.display());
        Ok(())
    }

    fn remove(&mut self, rule: &RuleId) -> Result<(), EnforcementError> {
        let output = self.runner.run(NETSH, &delete_rule_args(rule))?;
        if output.success {
            log::info!("Removed firewall rule {}", rule.name);
            return Ok(());
        }
        if output.stdout.contains(NO_MATCHING_RULES) {
            log::info!("Firewall rule {} already absent", rule.name);
            return Ok(());
        }
        Err(EnforcementError::Failed {
            command: NETSH.to_string(),
            exit_code: output.exit_code,
            detail: output.detail(),
        })
    }

    fn list_rules(&mut self) -> Result<Vec<RuleId>, EnforcementError> {
        let output = self.runner.run(NETSH, &show_rules_args())?;
        // Exit code 1 with "No rules match" when the firewall has none at all
        Ok(self.naming.find_in(&output.stdout))
    }
}
