//! Interactive command loop for CLI
//!
//! Reads one command per line from stdin and drives the bridge. Lines and
//! columns typed or printed here are 1-based; the bridge works 0-based.

use serde::Serialize;
use sqbridge_core::Bridge;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Notify;

const HELP: &str = "\
Commands:
  c, continue        resume execution
  n, next            step over
  s, step            step in
  o, out             step out
  p, pause           pause execution
  b FILE:LINE        set a breakpoint
  d FILE:LINE        remove a breakpoint
  bc FILE            remove every breakpoint in FILE
  cols FILE:LINE     list break columns of a line
  bt                 print the stack
  scopes FRAME       list scopes of a frame
  v REF              expand a variable reference
  h, help            show this help
  q, quit            disconnect and exit";

/// A parsed user command. Lines are already 0-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Continue,
    Next,
    StepIn,
    StepOut,
    Pause,
    Break { path: String, line: u32 },
    Delete { path: String, line: u32 },
    ClearAll { path: String },
    Columns { path: String, line: u32 },
    Backtrace,
    Scopes { frame: u32 },
    Variables { reference: i64 },
    Help,
    Quit,
}

/// Parse one input line; `Ok(None)` for a blank line
pub fn parse_command(input: &str) -> Result<Option<Command>, String> {
    let mut words = input.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let rest: Vec<&str> = words.collect();
    let arg = rest.join(" ");

    let command = match verb {
        "c" | "continue" => Command::Continue,
        "n" | "next" => Command::Next,
        "s" | "step" => Command::StepIn,
        "o" | "out" => Command::StepOut,
        "p" | "pause" => Command::Pause,
        "bt" => Command::Backtrace,
        "h" | "help" => Command::Help,
        "q" | "quit" => Command::Quit,
        "b" => {
            let (path, line) = parse_location(&arg)?;
            Command::Break { path, line }
        }
        "d" => {
            let (path, line) = parse_location(&arg)?;
            Command::Delete { path, line }
        }
        "cols" => {
            let (path, line) = parse_location(&arg)?;
            Command::Columns { path, line }
        }
        "bc" => {
            if arg.is_empty() {
                return Err("usage: bc FILE".to_string());
            }
            Command::ClearAll { path: arg }
        }
        "scopes" => Command::Scopes {
            frame: arg
                .parse()
                .map_err(|_| format!("invalid frame index '{arg}'"))?,
        },
        "v" => Command::Variables {
            reference: arg
                .parse()
                .map_err(|_| format!("invalid variable reference '{arg}'"))?,
        },
        other => return Err(format!("unknown command '{other}' (try 'help')")),
    };

    Ok(Some(command))
}

/// Split `FILE:LINE` and convert the 1-based line to 0-based
fn parse_location(arg: &str) -> Result<(String, u32), String> {
    let (path, line) = arg
        .rsplit_once(':')
        .ok_or_else(|| format!("expected FILE:LINE, got '{arg}'"))?;
    if path.is_empty() {
        return Err(format!("missing file in '{arg}'"));
    }

    let line: u32 = line
        .parse()
        .map_err(|_| format!("invalid line number '{line}'"))?;
    if line == 0 {
        return Err("line numbers start at 1".to_string());
    }

    Ok((path.to_string(), line - 1))
}

/// Prints command results as text or JSON lines
#[derive(Debug, Clone, Copy)]
pub struct Output {
    pub json: bool,
}

impl Output {
    fn print<T: Serialize>(&self, value: &T, text: impl FnOnce(&T) -> String) {
        if self.json {
            match serde_json::to_string(value) {
                Ok(json) => println!("{json}"),
                Err(e) => tracing::error!("Failed to serialize result: {}", e),
            }
        } else {
            println!("{}", text(value));
        }
    }
}

async fn execute(bridge: &Bridge, output: Output, command: Command) {
    match command {
        Command::Continue => bridge.continue_execution().await,
        Command::Next => bridge.step_over().await,
        Command::StepIn => bridge.step_in().await,
        Command::StepOut => bridge.step_out().await,
        Command::Pause => bridge.pause().await,
        Command::Break { path, line } => {
            let bp = bridge.set_breakpoint(&path, line).await;
            output.print(&bp, |bp| {
                let state = if bp.verified { "verified" } else { "pending" };
                format!(
                    "Breakpoint {} at {}:{} ({state})",
                    bp.id,
                    bp.source_path,
                    bp.line + 1
                )
            });
        }
        Command::Delete { path, line } => match bridge.clear_breakpoint(&path, line).await {
            Some(bp) => output.print(&bp, |bp| format!("Removed breakpoint {}", bp.id)),
            None => eprintln!("No breakpoint at {}:{}", path, line + 1),
        },
        Command::ClearAll { path } => {
            let removed = bridge.breakpoints(&path).await.len();
            bridge.clear_all_breakpoints(&path).await;
            output.print(&removed, |n| format!("Removed {n} breakpoint(s) in {path}"));
        }
        Command::Columns { path, line } => match bridge.list_break_columns(&path, line).await {
            Ok(columns) => {
                let columns: Vec<usize> = columns.into_iter().map(|c| c + 1).collect();
                output.print(&columns, |columns| {
                    let list: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
                    format!("Columns: {}", list.join(" "))
                });
            }
            Err(e) => eprintln!("Error: {e}"),
        },
        Command::Backtrace => {
            let frames = bridge.get_stack().await;
            output.print(&frames, |frames| {
                if frames.is_empty() {
                    return "No stack (not stopped)".to_string();
                }
                frames
                    .iter()
                    .map(|f| {
                        format!("#{} {} at {}:{}", f.index, f.function_name, f.file, f.line + 1)
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            });
        }
        Command::Scopes { frame } => {
            let scopes = bridge.scopes(frame).await;
            output.print(&scopes, |scopes| {
                scopes
                    .iter()
                    .map(|s| format!("{} (ref {})", s.name, s.variables_reference))
                    .collect::<Vec<_>>()
                    .join("\n")
            });
        }
        Command::Variables { reference } => match bridge.resolve_variables(reference).await {
            Ok(variables) => output.print(&variables, |variables| {
                if variables.is_empty() {
                    return "(no variables)".to_string();
                }
                variables
                    .iter()
                    .map(|v| {
                        let mut line = format!("{}: {} = {}", v.name, v.type_name, v.value);
                        if v.variables_reference != 0 {
                            line.push_str(&format!(" (ref {})", v.variables_reference));
                        }
                        line
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            }),
            Err(e) => eprintln!("Error: {e}"),
        },
        Command::Help => println!("{HELP}"),
        // Handled by the loop
        Command::Quit => {}
    }
}

/// Run the command loop until quit, stdin EOF, Ctrl-C or session end.
/// Disconnects the bridge on the way out.
pub async fn run(bridge: &Bridge, output: Output, ended: Arc<Notify>) {
    let mut stdin_reader = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = stdin_reader.next_line() => {
                match line {
                    Ok(Some(line)) => match parse_command(&line) {
                        Ok(Some(Command::Quit)) => break,
                        Ok(Some(command)) => execute(bridge, output, command).await,
                        Ok(None) => {}
                        Err(e) => eprintln!("{e}"),
                    },
                    Ok(None) => {
                        tracing::info!("stdin closed");
                        break;
                    }
                    Err(e) => {
                        tracing::error!("Error reading stdin: {}", e);
                        break;
                    }
                }
            }

            _ = ended.notified() => {
                tracing::info!("Session ended");
                break;
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        }
    }

    bridge.disconnect().await;
}
