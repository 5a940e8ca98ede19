#[macro_use]
extern crate tracing;

use std::{path::PathBuf, time::Duration};

use futures::{SinkExt, StreamExt};
use sandgrid::{
    api::{JsonLinesCodec, LedCommand, LedReply, ScanMessage},
    coordinator::Coordinator,
    leds::{Device, LedOutput},
    models::Config,
    scan::{MockReader, Poller, ScanHandle, ScanState},
};
use structopt::StructOpt;
use tokio::{runtime::Builder, signal, sync::broadcast};
use tokio_util::{
    codec::{FramedRead, FramedWrite},
    sync::CancellationToken,
};

#[derive(Debug, StructOpt)]
struct Opts {
    #[structopt(short, long, parse(from_occurrences))]
    verbose: u32,
    #[structopt(short, long = "config")]
    config_path: Option<PathBuf>,
    #[structopt(long)]
    dump_config: bool,
    /// Simulate tag placements instead of polling a reader
    #[structopt(long)]
    mock_reader: bool,
    /// Tag ids placed by the simulated reader
    #[structopt(long = "mock-tag")]
    mock_tags: Vec<String>,
}

async fn run(opts: Opts) -> color_eyre::eyre::Result<()> {
    // Load configuration
    let config = if let Some(config_path) = opts.config_path.as_deref() {
        Config::load_file(config_path).await?
    } else {
        Config::default()
    };

    // Dump configuration if this was asked
    if opts.dump_config {
        print!("{}", config.to_string()?);
        return Ok(());
    }

    let led_count = config.grid.layout().capacity();
    let output: LedOutput = Device::new("grid", config.device.clone(), led_count).into();

    // Tag polling
    let (scan_tx, scan_rx) = tokio::sync::mpsc::channel(config.scan.queue_capacity as usize);
    let scan = ScanHandle::new(ScanState::new(config.scan.grace_period()));
    let cancel = CancellationToken::new();

    let poller = if opts.mock_reader {
        let tags = if opts.mock_tags.is_empty() {
            vec!["04:A2:2B:1A:6C:80:00".to_owned(), "04:5F:91:C2:6C:80:01".to_owned()]
        } else {
            opts.mock_tags.clone()
        };

        let reader = MockReader::new(tags, Duration::from_secs(4), Duration::from_secs(6));
        Some(
            Poller::new(
                reader,
                scan,
                scan_tx,
                config.scan.poll_interval(),
                cancel.clone(),
            )
            .spawn(),
        )
    } else {
        warn!("no tag reader configured, scanning disabled");
        None
    };

    // LED coordination
    let (coordinator, handle) = Coordinator::new(&config, output, scan_rx);
    let coordinator = tokio::spawn(coordinator.run());

    let mut scans = handle.subscribe_scans();
    let mut requests = FramedRead::new(tokio::io::stdin(), JsonLinesCodec::<LedCommand>::new());
    let mut replies = FramedWrite::new(tokio::io::stdout(), JsonLinesCodec::<LedCommand>::new());

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("interrupted, shutting down");
                break;
            }

            request = requests.next() => {
                match request {
                    Some(Ok(Ok(command))) => {
                        trace!(command = ?command, "request");
                        let reply = handle.command(command).await?;
                        replies.send(reply).await?;
                    }
                    Some(Ok(Err(error))) => {
                        warn!(error = %error, "invalid request");
                        replies.send(LedReply::error(&error)).await?;
                    }
                    Some(Err(error)) => {
                        error!(error = %error, "failed to read requests");
                        break;
                    }
                    None => {
                        info!("input closed, shutting down");
                        break;
                    }
                }
            }

            event = scans.recv() => {
                match event {
                    Ok(event) => {
                        replies.send(ScanMessage::from(event)).await?;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped = %skipped, "skipped scan events");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
        }
    }

    // ok: the coordinator may already be gone
    handle.stop().await.ok();
    coordinator.await?;

    cancel.cancel();
    if let Some(poller) = poller {
        poller.await?;
    }

    Ok(())
}

fn install_tracing(opts: &Opts) -> Result<(), tracing_subscriber::util::TryInitError> {
    use tracing_error::ErrorLayer;
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    // stdout carries the protocol
    let fmt_layer = fmt::layer().with_writer(std::io::stderr);

    let filter_layer = EnvFilter::try_from_env("SANDGRID_LOG").unwrap_or_else(|_| {
        EnvFilter::new(match opts.verbose {
            0 => "sandgrid=warn,sandgridd=warn",
            1 => "sandgrid=info,sandgridd=info",
            2 => "sandgrid=debug,sandgridd=debug",
            _ => "sandgrid=trace,sandgridd=trace",
        })
    });

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .with(ErrorLayer::default())
        .try_init()
}

#[paw::main]
fn main(opts: Opts) -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;
    install_tracing(&opts)?;

    // Create tokio runtime
    let thd_count = match num_cpus::get() {
        1 => 2,
        other => other.min(4),
    };

    let rt = Builder::new_multi_thread()
        .worker_threads(thd_count)
        .enable_all()
        .build()?;

    let result = rt.block_on(run(opts));

    // The stdin reader thread may still be blocked on a read
    rt.shutdown_timeout(Duration::from_secs(1));

    result
}
