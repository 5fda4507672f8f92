//! Operator console — line-oriented front end over the dispatcher
//!
//! Reads one command per line, validates input before anything runs, and
//! prints every result as it arrives. Background completions are printed
//! between commands in whatever order the workers finish.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::dispatcher::{Action, Completion, Dispatched, Dispatcher};
use crate::error::InputError;
use crate::event_log::LogEntry;

const HELP: &str = "\
Commands:
  dns <host>                                   resolve a host name
  tcp <host> <port>                            open and close a TCP connection
  http <url>                                   GET a URL (first bytes of the body only)
  reg <key_path> [value_name]                  query the registry (or its simulation)
  file [--dir <folder>] <filename> [content]   create a file and report its SHA-256
  lock <name>                                  create a named mutex / lock file
  unlock                                       release the held mutex / lock file
  allow on|off                                 allow or block external network targets
  status                                       show policy, backends and pending actions
  logs                                         reload the persistent log file
  save <path>                                  save this session's log view to a file
  help                                         show this text
  quit                                         abort pending actions and exit
Quote arguments containing spaces: reg \"HKCU\\Software\\My App\" Version";

/// A parsed console line
#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Run(Action),
    Allow(bool),
    Status,
    Logs,
    Save(PathBuf),
    Help,
    Quit,
    Empty,
}

/// Split a line into words; double quotes group words containing spaces.
/// Backslashes are literal so registry paths survive.
pub fn split_args(line: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_token = false;

    for c in line.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                has_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_token {
                    args.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }
    if has_token {
        args.push(current);
    }
    args
}

pub fn parse_command(line: &str) -> Result<Command, InputError> {
    let args = split_args(line);
    let Some((verb, rest)) = args.split_first() else {
        return Ok(Command::Empty);
    };
    let arg = |i: usize| rest.get(i).map(String::as_str).unwrap_or("");

    let command = match verb.to_ascii_lowercase().as_str() {
        "dns" => Command::Run(Action::dns(arg(0))?),
        "tcp" => Command::Run(Action::tcp_connect(arg(0), arg(1))?),
        "http" => Command::Run(Action::http_get(arg(0))?),
        "reg" => Command::Run(Action::registry_query(
            arg(0),
            rest.get(1).map(String::as_str),
        )?),
        "file" => {
            let (folder, rest) = match rest.split_first() {
                Some((flag, tail)) if flag == "--dir" => match tail.split_first() {
                    Some((dir, tail)) => (Some(dir.as_str()), tail),
                    None => {
                        return Err(InputError::Usage(
                            "file [--dir <folder>] <filename> [content...]",
                        ))
                    }
                },
                _ => (None, rest),
            };
            let filename = rest.first().map(String::as_str).unwrap_or("");
            let content = rest.get(1..).unwrap_or_default().join(" ");
            Command::Run(Action::create_file(folder, filename, &content)?)
        }
        "lock" => Command::Run(Action::acquire_lock(arg(0))?),
        "unlock" => Command::Run(Action::ReleaseLock),
        "allow" => match arg(0).to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" => Command::Allow(true),
            "off" | "no" | "false" => Command::Allow(false),
            _ => return Err(InputError::Usage("allow on|off")),
        },
        "status" => Command::Status,
        "logs" => Command::Logs,
        "save" => match rest.first() {
            Some(path) => Command::Save(PathBuf::from(path)),
            None => return Err(InputError::Missing("a path to save the log to")),
        },
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(InputError::UnknownCommand(other.to_string())),
    };
    Ok(command)
}

pub struct Console {
    dispatcher: Dispatcher,
    completions: mpsc::UnboundedReceiver<Completion>,
    /// Process-wide policy flag; always starts denied
    allow_external: bool,
    /// Entries shown during this session
    view: Vec<LogEntry>,
}

impl Console {
    pub fn new(dispatcher: Dispatcher, completions: mpsc::UnboundedReceiver<Completion>) -> Self {
        Self {
            dispatcher,
            completions,
            allow_external: false,
            view: Vec::new(),
        }
    }

    /// Serve commands until `quit` or end of input.
    ///
    /// At end of input, pending background actions are waited for so piped
    /// scripts see every result; `quit` aborts them.
    pub async fn run<R, W>(mut self, input: R, mut out: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let started = self.dispatcher.log().record("App started");
        self.show(&mut out, started).await?;

        let mut lines = input.lines();
        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line.context("failed to read console input")? else {
                        self.dispatcher.wait_idle().await;
                        self.drain(&mut out).await?;
                        break;
                    };
                    if !self.handle_line(&line, &mut out).await? {
                        self.dispatcher.shutdown();
                        break;
                    }
                }
                Some(done) = self.completions.recv() => {
                    debug!("Completed: id={} action={}", done.id, done.action);
                    self.show(&mut out, done.entry).await?;
                }
            }
        }
        out.flush().await?;
        info!("Console closed");
        Ok(())
    }

    /// Returns `false` when the operator asked to quit
    async fn handle_line<W: AsyncWrite + Unpin>(
        &mut self,
        line: &str,
        out: &mut W,
    ) -> Result<bool> {
        let command = match parse_command(line) {
            Ok(command) => command,
            Err(e) => {
                warn!("Rejected input: {e}");
                write_line(out, &format!("! {e}")).await?;
                return Ok(true);
            }
        };

        match command {
            Command::Run(action) => match self.dispatcher.dispatch(action, self.allow_external) {
                Dispatched::Spawned(id) => debug!("Running in background: id={id}"),
                Dispatched::Completed(entry) => self.show(out, entry).await?,
                Dispatched::Blocked(warning) => {
                    write_line(out, &format!("Blocked: {warning}")).await?
                }
            },
            Command::Allow(allow) => {
                self.allow_external = allow;
                warn!("External network {}", if allow { "ALLOWED" } else { "blocked" });
                let state = if allow { "allowed (dangerous)" } else { "blocked" };
                write_line(out, &format!("External network {state}")).await?;
            }
            Command::Status => {
                let in_flight = self.dispatcher.in_flight();
                let status = format!(
                    "allow_external={} registry={} locks={} held={} in_flight={} log={}",
                    if self.allow_external { "on" } else { "off" },
                    self.dispatcher.registry_backend(),
                    self.dispatcher.lock_backend(),
                    self.dispatcher.held_lock().unwrap_or("<none>"),
                    in_flight,
                    self.dispatcher.log().path().display(),
                );
                write_line(out, &status).await?;
            }
            Command::Logs => {
                let text = match self.dispatcher.log().read_all() {
                    Ok(Some(text)) => text,
                    Ok(None) => "<no log found>\n".to_string(),
                    Err(e) => format!("<cannot read log: {e:#}>\n"),
                };
                out.write_all(text.as_bytes()).await?;
            }
            Command::Save(path) => {
                let body: String = self
                    .view
                    .iter()
                    .map(|e| format!("{}\n", e.to_line()))
                    .collect();
                let msg = match tokio::fs::write(&path, body).await {
                    Ok(()) => format!("Log saved to {}", path.display()),
                    Err(e) => format!("! cannot save log to {}: {e}", path.display()),
                };
                write_line(out, &msg).await?;
            }
            Command::Help => write_line(out, HELP).await?,
            Command::Quit => return Ok(false),
            Command::Empty => {}
        }
        Ok(true)
    }

    async fn drain<W: AsyncWrite + Unpin>(&mut self, out: &mut W) -> Result<()> {
        while let Ok(done) = self.completions.try_recv() {
            self.show(out, done.entry).await?;
        }
        Ok(())
    }

    async fn show<W: AsyncWrite + Unpin>(&mut self, out: &mut W, entry: LogEntry) -> Result<()> {
        write_line(out, &entry.to_line()).await?;
        self.view.push(entry);
        Ok(())
    }
}

async fn write_line<W: AsyncWrite + Unpin>(out: &mut W, line: &str) -> Result<()> {
    out.write_all(line.as_bytes()).await?;
    out.write_all(b"\n").await?;
    out.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetworkConfig;
    use crate::event_log::EventLog;
    use crate::mutex::{LockAdapter, LockFileBackend};
    use crate::registry::SimulatedRegistry;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::io::BufReader;

    #[test]
    fn test_split_args_quotes_and_backslashes() {
        assert_eq!(
            split_args(r#"reg "HKCU\Software\My App" Version"#),
            vec!["reg", r"HKCU\Software\My App", "Version"]
        );
        assert_eq!(split_args("  dns   example.com  "), vec!["dns", "example.com"]);
        assert_eq!(split_args(r#"file a.txt """#), vec!["file", "a.txt", ""]);
        assert!(split_args("   ").is_empty());
    }

    #[test]
    fn test_parse_network_commands() {
        assert_eq!(
            parse_command("dns example.com").unwrap(),
            Command::Run(Action::Dns {
                host: "example.com".into()
            })
        );
        assert_eq!(
            parse_command("TCP 127.0.0.1 9").unwrap(),
            Command::Run(Action::TcpConnect {
                host: "127.0.0.1".into(),
                port: 9
            })
        );
        assert_eq!(parse_command("tcp 127.0.0.1"), Err(InputError::Missing("IP and port")));
        assert_eq!(parse_command("http"), Err(InputError::Missing("a URL")));
    }

    #[test]
    fn test_parse_file_command() {
        assert_eq!(
            parse_command("file --dir \"/tmp/my ioc\" drop.ps1 Invoke-Thing -NoProfile").unwrap(),
            Command::Run(Action::CreateFile {
                folder: Some(PathBuf::from("/tmp/my ioc")),
                filename: "drop.ps1".into(),
                content: "Invoke-Thing -NoProfile".into(),
            })
        );
        assert_eq!(
            parse_command("file note.txt").unwrap(),
            Command::Run(Action::CreateFile {
                folder: None,
                filename: "note.txt".into(),
                content: String::new(),
            })
        );
        assert_eq!(parse_command("file"), Err(InputError::Missing("a filename")));
        assert!(matches!(parse_command("file --dir"), Err(InputError::Usage(_))));
    }

    #[test]
    fn test_parse_misc_commands() {
        assert_eq!(parse_command("").unwrap(), Command::Empty);
        assert_eq!(parse_command("allow on").unwrap(), Command::Allow(true));
        assert_eq!(parse_command("allow OFF").unwrap(), Command::Allow(false));
        assert!(matches!(parse_command("allow maybe"), Err(InputError::Usage(_))));
        assert_eq!(parse_command("unlock").unwrap(), Command::Run(Action::ReleaseLock));
        assert_eq!(parse_command("exit").unwrap(), Command::Quit);
        assert_eq!(
            parse_command("launch missiles"),
            Err(InputError::UnknownCommand("launch".into()))
        );
    }

    fn console(dir: &TempDir) -> Console {
        let log = Arc::new(EventLog::new(dir.path().join("ioc_sim.log")).unwrap());
        let store =
            Arc::new(SimulatedRegistry::open(dir.path().join("sim_registry.json")).unwrap());
        let locks = LockAdapter::new(Box::new(LockFileBackend::new(dir.path()).unwrap()));
        let (dispatcher, rx) =
            Dispatcher::new(log, store, locks, &NetworkConfig::default(), dir.path().join("out"));
        Console::new(dispatcher, rx)
    }

    async fn run_script(dir: &TempDir, script: &str) -> Vec<String> {
        let mut out = Vec::new();
        console(dir)
            .run(BufReader::new(script.as_bytes()), &mut out)
            .await
            .unwrap();
        String::from_utf8(out).unwrap().lines().map(str::to_string).collect()
    }

    /// Strip the timestamp from a log-formatted output line
    fn message(line: &str) -> &str {
        line.split_once(' ').map(|(_, m)| m).unwrap_or(line)
    }

    #[tokio::test]
    async fn test_session_script() {
        let dir = TempDir::new().unwrap();
        let script = "\
tcp 8.8.8.8 53
lock test1
lock test1
unlock
unlock
reg HKCU
";
        let out = run_script(&dir, script).await;

        assert_eq!(message(&out[0]), "App started");
        assert_eq!(out[1], format!("Blocked: {}", crate::policy::TCP_BLOCKED));
        assert!(message(&out[2]).starts_with("Created lockfile '"));
        assert_eq!(message(&out[3]), "Mutex/lock 'test1' already exists");
        assert!(message(&out[4]).starts_with("Removed lockfile "));
        assert_eq!(message(&out[5]), "No mutex/lock to release");
        // background result arrives before the console exits at end of input
        assert_eq!(message(&out[6]), "Simulated registry HKCU = {}");
        assert_eq!(out.len(), 7);

        let persisted = std::fs::read_to_string(dir.path().join("ioc_sim.log")).unwrap();
        // the blocked attempt is shown but never persisted
        assert_eq!(persisted.lines().count(), 6);
    }

    #[tokio::test]
    async fn test_allow_toggle_is_session_state() {
        let dir = TempDir::new().unwrap();
        let out = run_script(&dir, "allow on\nstatus\nallow off\nstatus\n").await;
        assert_eq!(out[1], "External network allowed (dangerous)");
        assert!(out[2]
            .starts_with("allow_external=on registry=simulated locks=lockfile held=<none>"));
        assert_eq!(out[3], "External network blocked");
        assert!(out[4].starts_with("allow_external=off"));

        // a fresh console starts denied again
        let out = run_script(&dir, "status\n").await;
        assert!(out[1].starts_with("allow_external=off"));
    }

    #[tokio::test]
    async fn test_status_reports_held_lock_and_pending_work() {
        let dir = TempDir::new().unwrap();
        let out = run_script(&dir, "lock s1\nstatus\nunlock\nstatus\n").await;

        assert!(message(&out[1]).starts_with("Created lockfile '"));
        assert!(out[2].contains(" held=s1 in_flight=0 log="), "{}", out[2]);
        assert!(out[2].ends_with("ioc_sim.log"), "{}", out[2]);
        assert!(out[4].contains(" held=<none> in_flight=0 "), "{}", out[4]);
    }

    #[tokio::test]
    async fn test_input_errors_are_reported_not_run() {
        let dir = TempDir::new().unwrap();
        let out = run_script(&dir, "tcp 127.0.0.1 http\nlock\nbogus\n").await;
        assert_eq!(out[1], "! Please enter a valid numeric port (1-65535), got 'http'.");
        assert_eq!(out[2], "! Please enter a mutex/lock name.");
        assert!(out[3].starts_with("! Unknown command 'bogus'"));
        let persisted = std::fs::read_to_string(dir.path().join("ioc_sim.log")).unwrap();
        assert_eq!(persisted.lines().count(), 1);
    }

    #[tokio::test]
    async fn test_logs_and_save() {
        let dir = TempDir::new().unwrap();
        let saved = dir.path().join("export.log");
        let script = format!("file hello.txt hi\nlogs\nsave \"{}\"\nquit\n", saved.display());
        let out = run_script(&dir, &script).await;

        assert!(message(&out[1]).starts_with("Created file "));
        // `logs` replays the two persisted lines
        assert_eq!(out[2], out[0]);
        assert_eq!(out[3], out[1]);
        assert_eq!(out[4], format!("Log saved to {}", saved.display()));

        let exported = std::fs::read_to_string(&saved).unwrap();
        assert_eq!(exported, format!("{}\n{}\n", out[0], out[1]));
    }
}
