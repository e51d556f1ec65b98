use std::env;
use std::io;
use std::process::ExitCode;

use thruport_cli::{parse_args, run, DEFAULT_PORT, DEFAULT_RETRY_MS, DEFAULT_TIMEOUT_MS};

fn main() -> ExitCode {
    let args = env::args().skip(1).collect::<Vec<_>>();
    if args.iter().any(|arg| arg == "-h" || arg == "--help") {
        println!("{}", usage_text());
        return ExitCode::SUCCESS;
    }

    let result = parse_args(&args)
        .map_err(|message| format!("{message}\n\n{}", usage_text()))
        .and_then(|invocation| run(invocation.command, invocation.options, &mut io::stdout()));
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::from(1)
        }
    }
}

fn usage_text() -> String {
    format!(
        "thruport_cli - tilehand intent client

Usage: thruport_cli [flags] <command> [operands]

Intents (each waits for its outcome):
  move <x> <y>              walk to a tile (move_to)
  path <x> <y>              plan without moving (find_path)
  stop                      cancel the current walk
  use [slot]                one tool press (use_tool_once)
  swing <count> [slot]      repeated swings (use_tool_repeat)
  hold <ticks> [slot]       charged press (hold_tool)
  status                    position, tool and active action
  send <kind> [params-json] any intent kind with raw params

Session:
  wait-ready                connect and wait for the ready line
  script <file>             one `kind {{params}}` per line, run in order

Flags:
  --port <u16>              default {DEFAULT_PORT}
  --timeout-ms <u64>        default {DEFAULT_TIMEOUT_MS}
  --retry-ms <u64>          default {DEFAULT_RETRY_MS}
  --include-telemetry       also print frame lines"
    )
}
