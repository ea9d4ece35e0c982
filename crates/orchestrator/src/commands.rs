//! Remote shell command construction.
//!
//! Every command the orchestrator sends to the VPS is built here. This is also the
//! only place where a trading password is turned into command text: see
//! [`launch_terminal`].

use core_types::{InstanceCredentials, Secret, SlotId};
use remote_session::RemoteCommand;

/// Image name the terminal runs under inside Wine.
pub const TERMINAL_IMAGE: &str = "terminal64.exe";
const TERMINAL_PATH: &str = "/app/MetaTrader5/terminal64.exe";
const LOG_DIR: &str = "/app/MetaTrader5/MQL5/Logs";

/// Wraps `s` in single quotes for a POSIX shell.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Anchored docker name filter so `mt5-instance-1` does not also match `-10`..`-19`.
fn name_filter(slot: SlotId) -> String {
    format!("name=^{}$", slot.instance_name())
}

pub fn list_running_instances() -> RemoteCommand {
    RemoteCommand::new("docker ps --format '{{.Names}}'")
}

/// Prints the container id when the slot's container is running, nothing otherwise.
pub fn container_running(slot: SlotId) -> RemoteCommand {
    RemoteCommand::new(format!("docker ps -q --filter '{}'", name_filter(slot)))
}

pub fn container_status(slot: SlotId) -> RemoteCommand {
    RemoteCommand::new(format!(
        "docker ps -a --filter '{}' --format '{{{{.Status}}}}'",
        name_filter(slot)
    ))
}

pub fn start_container(slot: SlotId) -> RemoteCommand {
    RemoteCommand::new(format!("docker start {}", slot.instance_name()))
}

pub fn stop_container(slot: SlotId) -> RemoteCommand {
    RemoteCommand::new(format!("docker stop {}", slot.instance_name()))
}

pub fn terminal_process(slot: SlotId) -> RemoteCommand {
    RemoteCommand::new(format!(
        "docker exec {} wine tasklist /FI \"IMAGENAME eq {}\" /NH",
        slot.instance_name(),
        TERMINAL_IMAGE
    ))
}

pub fn terminate_terminal(slot: SlotId) -> RemoteCommand {
    RemoteCommand::new(format!(
        "docker exec {} wine taskkill /F /IM {}",
        slot.instance_name(),
        TERMINAL_IMAGE
    ))
}

/// Launches the terminal detached, logged in with `credentials`.
///
/// The returned command's display form carries a placeholder instead of the
/// password, so it can be logged like any other command.
pub fn launch_terminal(slot: SlotId, credentials: &InstanceCredentials) -> RemoteCommand {
    let render = |password: &str| {
        format!(
            "docker exec -d {} wine {} --login {} --password {} --server {} --auto-start",
            slot.instance_name(),
            TERMINAL_PATH,
            shell_quote(credentials.account_id()),
            password,
            shell_quote(credentials.server()),
        )
    };
    RemoteCommand::redacted(
        render(&shell_quote(credentials.secret().expose())),
        render(Secret::REDACTED),
    )
}

/// Reads the terminal's log for the host's current day.
///
/// `$(date ...)` is expanded by the VPS shell, so "today" follows the host clock.
pub fn read_today_log(slot: SlotId) -> RemoteCommand {
    RemoteCommand::new(format!(
        "docker exec {} cat \"{}/$(date +%Y%m%d).log\"",
        slot.instance_name(),
        LOG_DIR
    ))
}

pub fn list_symbols(slot: SlotId) -> RemoteCommand {
    RemoteCommand::new(format!(
        "docker exec {} wine {} --list-symbols",
        slot.instance_name(),
        TERMINAL_PATH
    ))
}

pub fn select_symbol(slot: SlotId, pair: &str) -> RemoteCommand {
    RemoteCommand::new(format!(
        "docker exec {} wine {} --symbol {}",
        slot.instance_name(),
        TERMINAL_PATH,
        shell_quote(pair)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(n: u32) -> SlotId {
        SlotId::new(n).unwrap()
    }

    #[test]
    fn quotes_embedded_single_quotes() {
        assert_eq!(shell_quote("plain"), "'plain'");
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
    }

    #[test]
    fn launch_command_keeps_secret_out_of_display() {
        let creds = InstanceCredentials::new("5012345", Secret::new("p@ss'word"), "Deriv-Demo").unwrap();
        let cmd = launch_terminal(slot(4), &creds);

        assert!(cmd.text().contains("--password 'p@ss'\\''word'"));
        assert!(cmd.text().starts_with("docker exec -d mt5-instance-4 wine"));
        assert!(!cmd.display().contains("p@ss"));
        assert!(cmd.display().contains("--password ********"));
        assert!(cmd.display().contains("--server 'Deriv-Demo'"));
        assert!(cmd.display().ends_with("--auto-start"));
    }

    #[test]
    fn container_filters_are_anchored() {
        assert_eq!(
            container_running(slot(1)).text(),
            "docker ps -q --filter 'name=^mt5-instance-1$'"
        );
        assert_eq!(
            container_status(slot(12)).text(),
            "docker ps -a --filter 'name=^mt5-instance-12$' --format '{{.Status}}'"
        );
    }

    #[test]
    fn log_path_uses_remote_date() {
        assert_eq!(
            read_today_log(slot(2)).text(),
            "docker exec mt5-instance-2 cat \"/app/MetaTrader5/MQL5/Logs/$(date +%Y%m%d).log\""
        );
    }

    #[test]
    fn symbol_is_quoted() {
        assert!(select_symbol(slot(3), "EUR USD").text().ends_with("--symbol 'EUR USD'"));
    }
}
