use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::net::TcpStream;
use std::process;
use std::str::FromStr;
use std::thread;
use std::time::{Duration, Instant};

use engine::{parse_wire_line, CorrelationId, LineChannel, Outcome, ParsedLine, Request, ServerMessage};
use serde_json::{json, Map, Value};

pub const DEFAULT_PORT: u16 = 46001;
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_RETRY_MS: u64 = 100;
const MAX_RETRY_BACKOFF_MS: u64 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommonOptions {
    pub port: u16,
    pub timeout_ms: u64,
    pub retry_ms: u64,
    pub include_telemetry: bool,
}

impl Default for CommonOptions {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            retry_ms: DEFAULT_RETRY_MS,
            include_telemetry: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandKind {
    WaitReady,
    Send { kind: String, params: Value },
    Script { path: String },
}

/// Parsed command line: connection options plus what to do once the host is ready.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub options: CommonOptions,
    pub command: CommandKind,
}

/// Flags may appear anywhere; the first bare word picks the command and the rest are
/// its operands.
pub fn parse_args(args: &[String]) -> Result<Invocation, String> {
    let mut options = CommonOptions::default();
    let mut words = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--port" => options.port = flag_value("--port", iter.next(), "u16")?,
            "--timeout-ms" => options.timeout_ms = flag_value("--timeout-ms", iter.next(), "u64")?,
            "--retry-ms" => options.retry_ms = flag_value("--retry-ms", iter.next(), "u64")?,
            "--include-telemetry" => options.include_telemetry = true,
            flag if flag.starts_with("--") && flag.len() > 2 => {
                return Err(format!("unknown flag '{flag}'"));
            }
            word => words.push(word),
        }
    }

    let (verb, operands) = words
        .split_first()
        .ok_or_else(|| "missing command".to_string())?;
    let command = parse_command(verb, operands)?;
    Ok(Invocation { options, command })
}

fn parse_command(verb: &str, operands: &[&str]) -> Result<CommandKind, String> {
    let send = |kind: &str, params: Value| CommandKind::Send {
        kind: kind.to_string(),
        params,
    };
    match (verb, operands) {
        ("wait-ready", []) => Ok(CommandKind::WaitReady),
        ("send", [kind, params @ ..]) => {
            let params = (!params.is_empty()).then(|| params.join(" "));
            Ok(send(*kind, parse_params(params.as_deref())?))
        }
        ("script", [path]) => Ok(CommandKind::Script {
            path: path.to_string(),
        }),
        ("move" | "path", [x, y]) => {
            let x: i32 = operand(verb, "x", x)?;
            let y: i32 = operand(verb, "y", y)?;
            let kind = if verb == "move" { "move_to" } else { "find_path" };
            Ok(send(kind, json!({ "x": x, "y": y })))
        }
        ("stop", []) => Ok(send("stop", Value::Null)),
        ("status", []) => Ok(send("status", Value::Null)),
        ("use", slot) if slot.len() <= 1 => Ok(send("use_tool_once", slot_params(verb, slot)?)),
        ("swing", [count, slot @ ..]) if slot.len() <= 1 => {
            let mut params = slot_params(verb, slot)?;
            params["count"] = json!(operand::<u32>(verb, "count", count)?);
            Ok(send("use_tool_repeat", params))
        }
        ("hold", [ticks, slot @ ..]) if slot.len() <= 1 => {
            let mut params = slot_params(verb, slot)?;
            params["ticks"] = json!(operand::<u32>(verb, "ticks", ticks)?);
            Ok(send("hold_tool", params))
        }
        (
            "wait-ready" | "send" | "script" | "move" | "path" | "stop" | "status" | "use"
            | "swing" | "hold",
            _,
        ) => Err(format!("wrong operands for '{verb}'; see --help")),
        (other, _) => Err(format!("unknown command '{other}'")),
    }
}

fn flag_value<T: FromStr>(flag: &str, value: Option<&String>, expected: &str) -> Result<T, String> {
    let value = value.ok_or_else(|| format!("missing value for {flag}"))?;
    value
        .parse::<T>()
        .map_err(|_| format!("invalid {flag} value '{value}' (expected {expected})"))
}

fn operand<T: FromStr>(verb: &str, name: &str, raw: &str) -> Result<T, String> {
    raw.parse::<T>()
        .map_err(|_| format!("{verb}: invalid {name} '{raw}'"))
}

fn slot_params(verb: &str, slot: &[&str]) -> Result<Value, String> {
    let mut params = Map::new();
    if let Some(raw) = slot.first() {
        params.insert("slot".to_string(), json!(operand::<u8>(verb, "slot", raw)?));
    }
    Ok(Value::Object(params))
}

/// One intent to submit: the `kind` name and its params object.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptStep {
    pub kind: String,
    pub params: Value,
}

struct Session {
    writer: TcpStream,
    reader: BufReader<TcpStream>,
    next_request: u64,
}

impl Session {
    fn next_id(&mut self) -> CorrelationId {
        self.next_request = self.next_request.saturating_add(1);
        CorrelationId::new(format!("cli-{}-{}", process::id(), self.next_request))
    }
}

pub fn should_print_line(line: &ParsedLine, include_telemetry: bool) -> bool {
    match line.channel {
        LineChannel::Control => true,
        LineChannel::Telemetry => include_telemetry,
        LineChannel::Unknown => false,
    }
}

pub fn is_ready_payload(payload: &str) -> bool {
    matches!(
        ServerMessage::decode_payload(payload),
        Some(ServerMessage::Ready { .. })
    )
}

/// The outcome for `id`, if this payload carries it.
pub fn outcome_for(payload: &str, id: &CorrelationId) -> Option<Outcome> {
    match ServerMessage::decode_payload(payload) {
        Some(ServerMessage::Outcome(outcome)) if &outcome.id == id => Some(outcome),
        _ => None,
    }
}

/// Parses `--params` style JSON; an absent argument means no params.
pub fn parse_params(raw: Option<&str>) -> Result<Value, String> {
    match raw {
        None => Ok(Value::Null),
        Some(text) => {
            let value: Value = serde_json::from_str(text)
                .map_err(|error| format!("invalid params JSON '{text}': {error}"))?;
            if value.is_object() || value.is_null() {
                Ok(value)
            } else {
                Err(format!("params must be a JSON object, got '{text}'"))
            }
        }
    }
}

/// Script lines are `kind` or `kind {params}`; blank lines and `#` comments are skipped.
pub fn parse_script_steps(content: &str) -> Result<Vec<ScriptStep>, String> {
    let mut steps = Vec::new();
    for (index, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let (kind, rest) = match trimmed.split_once(char::is_whitespace) {
            Some((kind, rest)) => (kind, Some(rest.trim())),
            None => (trimmed, None),
        };
        let params = parse_params(rest.filter(|rest| !rest.is_empty()))
            .map_err(|error| format!("script line {}: {error}", index + 1))?;
        steps.push(ScriptStep {
            kind: kind.to_string(),
            params,
        });
    }
    Ok(steps)
}

pub fn run<W: Write>(kind: CommandKind, opts: CommonOptions, stdout: &mut W) -> Result<(), String> {
    let timeout = Duration::from_millis(opts.timeout_ms);
    let retry_base = Duration::from_millis(opts.retry_ms.max(1));
    let mut session = connect_and_wait_ready(opts.port, timeout, retry_base, |line| {
        emit_line(stdout, line, opts.include_telemetry)
    })?;

    match kind {
        CommandKind::WaitReady => Ok(()),
        CommandKind::Send { kind, params } => {
            let step = ScriptStep { kind, params };
            submit_and_wait(&mut session, &step, timeout, |line| {
                emit_line(stdout, line, opts.include_telemetry)
            })
        }
        CommandKind::Script { path } => {
            let content = fs::read_to_string(&path)
                .map_err(|error| format!("failed to read script file '{path}': {error}"))?;
            for step in parse_script_steps(&content)? {
                submit_and_wait(&mut session, &step, timeout, |line| {
                    emit_line(stdout, line, opts.include_telemetry)
                })?;
            }
            Ok(())
        }
    }
}

fn submit_and_wait<F>(
    session: &mut Session,
    step: &ScriptStep,
    timeout: Duration,
    mut on_line: F,
) -> Result<(), String>
where
    F: FnMut(&ParsedLine),
{
    let id = session.next_id();
    let request = Request {
        id: id.clone(),
        kind: step.kind.clone(),
        params: step.params.clone(),
    };
    let line = serde_json::to_string(&request)
        .map_err(|error| format!("failed to encode request: {error}"))?;
    send_line(&mut session.writer, &line)?;

    let deadline = Instant::now() + timeout;
    loop {
        match read_one_line(&mut session.reader, deadline) {
            ReadOutcome::Line(raw) => {
                let parsed = parse_wire_line(&raw);
                on_line(&parsed);
                if parsed.channel != LineChannel::Control {
                    continue;
                }
                if let Some(outcome) = outcome_for(&parsed.payload, &id) {
                    return if outcome.success {
                        Ok(())
                    } else {
                        Err(format!("{} {id} failed: {}", step.kind, outcome.message))
                    };
                }
            }
            ReadOutcome::NoData => {}
            ReadOutcome::Disconnected => {
                return Err(format!("socket disconnected while waiting for outcome of {id}"))
            }
            ReadOutcome::DeadlineExceeded => {
                return Err(format!("timed out waiting for outcome of {id}"))
            }
            ReadOutcome::IoError(error) => {
                return Err(format!(
                    "socket read error while waiting for outcome of {id}: {error}"
                ))
            }
        }
    }
}

fn connect_and_wait_ready<F>(
    port: u16,
    timeout: Duration,
    retry_base: Duration,
    mut on_line: F,
) -> Result<Session, String>
where
    F: FnMut(&ParsedLine),
{
    let deadline = Instant::now() + timeout;
    let mut attempt = 0u32;

    while Instant::now() < deadline {
        match TcpStream::connect(("127.0.0.1", port)) {
            Ok(writer) => {
                writer
                    .set_read_timeout(Some(Duration::from_millis(100)))
                    .map_err(|error| format!("failed to set socket read timeout: {error}"))?;
                let reader_stream = writer
                    .try_clone()
                    .map_err(|error| format!("failed to clone socket stream: {error}"))?;
                let mut session = Session {
                    writer,
                    reader: BufReader::new(reader_stream),
                    next_request: 0,
                };

                match wait_for_ready(&mut session.reader, deadline, &mut on_line) {
                    WaitReadyOutcome::Ready => return Ok(session),
                    WaitReadyOutcome::Timeout => break,
                    WaitReadyOutcome::Disconnected => {
                        if Instant::now() >= deadline {
                            break;
                        }
                    }
                    WaitReadyOutcome::IoError(error) => {
                        return Err(format!(
                            "socket read error while waiting for ready: {error}"
                        ));
                    }
                }
            }
            Err(_) => {
                if Instant::now() >= deadline {
                    break;
                }
            }
        }

        let sleep_for = retry_backoff(retry_base, attempt);
        if Instant::now() + sleep_for >= deadline {
            break;
        }
        thread::sleep(sleep_for);
        attempt = attempt.saturating_add(1);
    }

    Err(format!(
        "timed out waiting for thruport ready on 127.0.0.1:{port}"
    ))
}

fn retry_backoff(retry_base: Duration, attempt: u32) -> Duration {
    let shift = attempt.min(8);
    let backoff_ms = (retry_base.as_millis() as u64)
        .saturating_mul(1u64 << shift)
        .min(MAX_RETRY_BACKOFF_MS);
    Duration::from_millis(backoff_ms.max(1))
}

enum WaitReadyOutcome {
    Ready,
    Timeout,
    Disconnected,
    IoError(io::Error),
}

fn wait_for_ready<F>(
    reader: &mut BufReader<TcpStream>,
    deadline: Instant,
    on_line: &mut F,
) -> WaitReadyOutcome
where
    F: FnMut(&ParsedLine),
{
    loop {
        match read_one_line(reader, deadline) {
            ReadOutcome::Line(raw) => {
                let parsed = parse_wire_line(&raw);
                on_line(&parsed);
                if parsed.channel == LineChannel::Control && is_ready_payload(&parsed.payload) {
                    return WaitReadyOutcome::Ready;
                }
            }
            ReadOutcome::NoData => {}
            ReadOutcome::Disconnected => return WaitReadyOutcome::Disconnected,
            ReadOutcome::DeadlineExceeded => return WaitReadyOutcome::Timeout,
            ReadOutcome::IoError(error) => return WaitReadyOutcome::IoError(error),
        }
    }
}

fn emit_line<W: Write>(stdout: &mut W, line: &ParsedLine, include_telemetry: bool) {
    if should_print_line(line, include_telemetry) {
        let _ = writeln!(stdout, "{}", line.payload);
    }
}

fn send_line(writer: &mut TcpStream, line: &str) -> Result<(), String> {
    writer
        .write_all(line.as_bytes())
        .map_err(|error| format!("failed to send request: {error}"))?;
    writer
        .write_all(b"\n")
        .map_err(|error| format!("failed to terminate request line: {error}"))?;
    writer
        .flush()
        .map_err(|error| format!("failed to flush request line: {error}"))
}

enum ReadOutcome {
    Line(String),
    NoData,
    Disconnected,
    DeadlineExceeded,
    IoError(io::Error),
}

fn read_one_line(reader: &mut BufReader<TcpStream>, deadline: Instant) -> ReadOutcome {
    if Instant::now() >= deadline {
        return ReadOutcome::DeadlineExceeded;
    }

    let mut line = String::new();
    match reader.read_line(&mut line) {
        Ok(0) => ReadOutcome::Disconnected,
        Ok(_) => ReadOutcome::Line(line),
        Err(error)
            if error.kind() == io::ErrorKind::WouldBlock
                || error.kind() == io::ErrorKind::TimedOut =>
        {
            ReadOutcome::NoData
        }
        Err(error) => ReadOutcome::IoError(error),
    }
}
