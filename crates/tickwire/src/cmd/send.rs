use std::fs;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use tickwire_channel::{ChannelConfig, ChannelError, ChannelEvent, ChannelManager, ServiceType};
use tickwire_frame::{FramedHelper, Packet};

use crate::cmd::{split_host_port, SendArgs};
use crate::exit::{
    channel_error, io_error, manager_error, CliError, CliResult, FAILURE, SUCCESS, TIMEOUT, USAGE,
};
use crate::output::{print_packet, OutputFormat};

const TICK: Duration = Duration::from_millis(10);

/// What the channel reported while the command was ticking it.
#[derive(Default)]
struct Observed {
    error: Option<ChannelError>,
    closed: bool,
    reply: Option<Packet>,
}

type Shared = Arc<Mutex<Observed>>;

fn observe<R>(observed: &Shared, f: impl FnOnce(&mut Observed) -> R) -> R {
    f(&mut observed.lock().unwrap_or_else(PoisonError::into_inner))
}

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let (host, port) = split_host_port(&args.addr)?;
    let payload = resolve_payload(&args)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .map_err(|err| io_error("runtime start failed", err))?;
    let manager = ChannelManager::new(runtime.handle().clone());

    let observed: Shared = Arc::new(Mutex::new(Observed::default()));
    {
        let observed = Arc::clone(&observed);
        manager.subscribe(move |channel, event| {
            tracing::debug!(channel, event = event.kind_name(), "channel event");
            observe(&observed, |o| match event {
                ChannelEvent::Error(err) if o.error.is_none() => o.error = Some(err.clone()),
                ChannelEvent::Closed => o.closed = true,
                _ => {}
            });
        });
    }

    let service_type = if args.sync_receive {
        ServiceType::TcpWithSyncReceive
    } else {
        ServiceType::Tcp
    };
    let channel = manager
        .create_channel(
            "cli",
            service_type,
            Arc::new(FramedHelper::new()),
            ChannelConfig {
                timeout,
                ..ChannelConfig::default()
            },
        )
        .map_err(|err| manager_error("channel setup failed", err))?;
    {
        let observed = Arc::clone(&observed);
        channel.handlers().register(args.id, move |_, packet| {
            observe(&observed, |o| o.reply = Some(packet.clone()));
        });
    }

    let deadline = Instant::now() + timeout;
    channel
        .connect(host, port, None)
        .map_err(|err| channel_error("connect failed", &err))?;
    tick_until(&manager, &observed, deadline, "connect", || {
        channel.is_connected()
    })?;

    channel
        .send(Packet::new(args.id, payload))
        .map_err(|err| channel_error("send failed", &err))?;
    tick_until(&manager, &observed, deadline, "send", || {
        channel.sent_packet_count() > 0
    })?;

    if args.wait {
        tick_until(&manager, &observed, deadline, "receive", || {
            observe(&observed, |o| o.reply.is_some())
        })?;
        if let Some(reply) = observe(&observed, |o| o.reply.take()) {
            print_packet(&reply, channel.name(), format);
        }
    }

    manager.shutdown();
    Ok(SUCCESS)
}

/// Drive the manager until `done` holds, the channel fails, or `deadline` passes.
fn tick_until(
    manager: &ChannelManager,
    observed: &Shared,
    deadline: Instant,
    stage: &str,
    mut done: impl FnMut() -> bool,
) -> CliResult<()> {
    let mut last = Instant::now();
    loop {
        let now = Instant::now();
        let elapsed = now.duration_since(last).as_secs_f32();
        last = now;
        manager.update(elapsed, elapsed);

        if done() {
            return Ok(());
        }
        if let Some(err) = observe(observed, |o| o.error.take()) {
            return Err(channel_error(&format!("{stage} failed"), &err));
        }
        if observe(observed, |o| o.closed) {
            return Err(CliError::new(
                FAILURE,
                format!("{stage} failed: connection closed by peer"),
            ));
        }
        if now >= deadline {
            return Err(CliError::new(TIMEOUT, format!("{stage} timed out")));
        }
        thread::sleep(TICK);
    }
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(json) = &args.json {
        serde_json::from_str::<serde_json::Value>(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;
        return Ok(json.as_bytes().to_vec());
    }
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Ok(Vec::new())
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}
