use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use localsock_channel::{Channel, ChannelError, LocalServer};
use localsock_frame::MessageConfig;
use localsock_transport::{EndpointId, TransportError};

use crate::cmd::ServeArgs;
use crate::exit::{channel_error, CliError, CliResult, SUCCESS};
use crate::output::{print_message, OutputFormat};

/// Accept/receive slice; long enough to idle cheaply, short enough to
/// notice Ctrl-C promptly.
const SLICE: Duration = Duration::from_millis(500);

const REPLY_TIMEOUT: Duration = Duration::from_secs(30);

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let mut config = MessageConfig::default();
    if let Some(max) = args.max_payload {
        config.max_payload = max;
    }
    let id = match &args.endpoint {
        Some(name) => EndpointId::from_name(name),
        None => EndpointId::generate(),
    };
    let server = LocalServer::bind_with_config(&id, config)
        .map_err(|err| channel_error("bind failed", err))?;

    // The identifier line on stdout is the hand-off to clients; a parent
    // process typically captures it.
    println!("{}", server.id());
    let _ = std::io::stdout().flush();

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut served = 0usize;

    while running.load(Ordering::SeqCst) {
        let channel = match server.accept(SLICE) {
            Ok(channel) => channel,
            Err(err) if err.is_timeout() => continue,
            Err(err) => return Err(channel_error("accept failed", err)),
        };

        match serve_channel(&channel, server.id().as_str(), &args, format, &running, &mut served)? {
            Session::LimitReached => return Ok(SUCCESS),
            Session::Disconnected => {}
        }
    }

    Ok(SUCCESS)
}

enum Session {
    Disconnected,
    LimitReached,
}

fn serve_channel(
    channel: &Channel,
    endpoint: &str,
    args: &ServeArgs,
    format: OutputFormat,
    running: &AtomicBool,
    served: &mut usize,
) -> CliResult<Session> {
    while running.load(Ordering::SeqCst) {
        let message = match channel.receive(SLICE) {
            Ok(message) => message,
            Err(err) if err.is_timeout() => continue,
            Err(ChannelError::Transport(TransportError::ConnectionClosed)) => {
                return Ok(Session::Disconnected)
            }
            Err(err) => return Err(channel_error("receive failed", err)),
        };

        print_message(endpoint, &message, format);
        *served = served.saturating_add(1);

        if args.echo {
            channel
                .send(&message, REPLY_TIMEOUT)
                .map_err(|err| channel_error("echo failed", err))?;
        }

        if let Some(count) = args.count {
            if *served >= count {
                return Ok(Session::LimitReached);
            }
        }
    }
    Ok(Session::Disconnected)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
