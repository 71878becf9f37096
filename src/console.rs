//! Stdin console for stepped runs.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use nodeflow_core::error::Result as FlowResult;
use nodeflow_core::event::EventBus;
use nodeflow_core::types::FlowEvent;
use nodeflow_engine::{RunReport, StepController};

const HELP: &str =
    "commands: s(tep) | c(ontinue) | p(ause) | b(reak) <node> | d(elete) <node> | speed <x> | state | reset | q(uit)";

#[derive(Debug, PartialEq)]
enum Command {
    Step,
    Resume,
    Pause,
    Break(String),
    Clear(String),
    Speed(f32),
    State,
    Reset,
    Help,
    Quit,
}

fn parse(line: &str) -> Option<Command> {
    let mut parts = line.split_whitespace();
    let head = parts.next()?;
    let arg = parts.next().map(str::to_string);
    let command = match (head, arg) {
        ("s" | "step" | "n" | "next", None) => Command::Step,
        ("c" | "continue" | "resume", None) => Command::Resume,
        ("p" | "pause", None) => Command::Pause,
        ("b" | "break", Some(node)) => Command::Break(node),
        ("d" | "delete", Some(node)) => Command::Clear(node),
        ("speed", Some(x)) => Command::Speed(x.parse().ok()?),
        ("state" | "st", None) => Command::State,
        ("reset", None) => Command::Reset,
        ("h" | "help" | "?", None) => Command::Help,
        ("q" | "quit" | "exit", None) => Command::Quit,
        _ => return None,
    };
    Some(command)
}

/// Print gate and node activity to stderr while the run is in flight.
pub fn spawn_progress(event_bus: &EventBus) -> JoinHandle<()> {
    let mut rx = event_bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(FlowEvent::Paused { node_id, reason, .. }) => {
                    eprintln!("-- paused before {} ({:?})", node_id, reason);
                }
                Ok(FlowEvent::NodeFinished {
                    node_id,
                    result_type,
                    summary,
                    ..
                }) => {
                    eprintln!("   {} [{}] {}", node_id, result_type, summary);
                }
                Ok(FlowEvent::Warning { message, .. }) => eprintln!("   warning: {}", message),
                Ok(FlowEvent::FlowFinished { status, .. }) => {
                    eprintln!("-- finished ({})", status);
                    break;
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Read commands until the run completes. Closing stdin clears breakpoints
/// and lets the run finish.
pub async fn drive(
    controller: &StepController,
    mut run: JoinHandle<FlowResult<RunReport>>,
) -> anyhow::Result<FlowResult<RunReport>> {
    eprintln!("{}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            joined = &mut run => return Ok(joined?),
            line = lines.next_line(), if stdin_open => {
                let Some(line) = line? else {
                    stdin_open = false;
                    for id in controller.state().await.breakpoints {
                        controller.clear_breakpoint(&id).await;
                    }
                    controller.resume().await;
                    continue;
                };
                match parse(&line) {
                    Some(Command::Step) => {
                        if !controller.step().await {
                            eprintln!("step queued");
                        }
                    }
                    Some(Command::Resume) => {
                        controller.resume().await;
                    }
                    Some(Command::Pause) => controller.pause().await,
                    Some(Command::Break(id)) => controller.set_breakpoint(&id).await,
                    Some(Command::Clear(id)) => {
                        if !controller.clear_breakpoint(&id).await {
                            eprintln!("no breakpoint on {}", id);
                        }
                    }
                    Some(Command::Speed(x)) => controller.set_speed(x).await,
                    Some(Command::State) => {
                        let state = controller.state().await;
                        eprintln!("{}", serde_json::to_string_pretty(&state)?);
                    }
                    Some(Command::Reset) | Some(Command::Quit) => {
                        controller.reset().await;
                        return Ok(run.await?);
                    }
                    Some(Command::Help) => eprintln!("{}", HELP),
                    None if line.trim().is_empty() => {}
                    None => eprintln!("unknown command; {}", HELP),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_short_and_long_forms() {
        assert_eq!(parse("s"), Some(Command::Step));
        assert_eq!(parse("continue"), Some(Command::Resume));
        assert_eq!(parse("b tool-1"), Some(Command::Break("tool-1".into())));
        assert_eq!(parse("speed 2.5"), Some(Command::Speed(2.5)));
        assert_eq!(parse("  q  "), Some(Command::Quit));
    }

    #[test]
    fn rejects_malformed_input() {
        assert_eq!(parse(""), None);
        assert_eq!(parse("break"), None);
        assert_eq!(parse("speed fast"), None);
        assert_eq!(parse("dance"), None);
    }
}
