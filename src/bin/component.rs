use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use bytes::Bytes;
use mercury::config::MercuryConfig;
use mercury::logging::{LogArg, LogForwarder, LogFrame, LogReceiver};
use mercury::network::{
    Address, InterfaceMinder, LengthStyle, LengthWidth, Nub, Reason, UnpackedMessageHeader,
};
use mercury::servers::AnonymousChannelClient;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_ansi(std::io::IsTerminal::is_terminal(&std::io::stderr()))
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut conf_file = "conf/component.yaml".to_string();

    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "--h" | "--?" | "/?" => {
                println!("Usage: component [--conf FILE]");
                return Ok(());
            }
            "--conf" => {
                if i + 1 < args.len() {
                    i += 1;
                    conf_file = args[i].clone();
                } else {
                    return Err(anyhow::anyhow!("--conf requires a FILE argument"));
                }
            }
            _ => {}
        }
        i += 1;
    }

    let config = MercuryConfig::from_file(&conf_file)
        .with_context(|| format!("Cannot load config: {}", conf_file))?;
    let name = config.component_name.clone();

    let nub = Arc::new(Nub::from_config(&config).await?);

    // Every component speaks the same small interface.
    let mut minder = InterfaceMinder::new("Component");
    let birth = minder.add("watchedBirth", LengthStyle::Fixed(8));
    let keepalive = minder.add("keepalive", LengthStyle::Variable(LengthWidth::One));
    let log_frame = minder.add("logFrame", LengthStyle::Variable(LengthWidth::Two));
    let minder = Arc::new(minder);

    minder.handler(
        keepalive.id(),
        Arc::new(|source: &Address, _: &UnpackedMessageHeader, data: &mut Bytes| {
            tracing::info!(
                "[component] [keepalive] from={} sender={}",
                source,
                String::from_utf8_lossy(data)
            );
        }),
    );
    let receiver = Mutex::new(LogReceiver::new());
    minder.handler(
        log_frame.id(),
        Arc::new(move |source: &Address, _: &UnpackedMessageHeader, data: &mut Bytes| {
            let frame = match LogFrame::decode(data.clone()) {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::warn!("[component] [bad_log_frame] from={} error={}", source, e);
                    return;
                }
            };
            let mut receiver = receiver.lock().unwrap_or_else(PoisonError::into_inner);
            match receiver.receive(frame) {
                Ok(Some(line)) => {
                    tracing::info!("[remote] [{}] {}", line.component, line.text);
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("[component] [log_frame_rejected] from={} error={}", source, e),
            }
        }),
    );
    nub.serve_interface(Arc::clone(&minder));

    nub.register_interface(&name, config.component_index)
        .await
        .with_context(|| format!("Cannot register {} with machined", name))?;
    tracing::info!("[component] [started] name={} addr={}", name, nub.address());

    let mut watcher = None;
    if let Some(watch) = config.watch_component.clone() {
        let (client, result) = AnonymousChannelClient::init(
            &*nub,
            Arc::clone(&minder),
            &birth,
            &watch,
            config.find_retries,
        )
        .await;
        if let Err(e) = result {
            tracing::warn!("[component] [watch_degraded] watch={} error={}", watch, e);
        }
        let client = Arc::new(client);

        let ticking = Arc::clone(&client);
        let sender = name.clone();
        let mut forwarder = config.log_forwarding.then(|| LogForwarder::new(&sender));
        let mut ticks: u64 = 0;
        let timer = nub.register_timer(config.tick_interval(), "keepalive", move |nub, _| {
            ticks += 1;
            let mut owner = ticking.channel();
            let channel = owner.channel_mut();

            // an unbound channel keeps one keepalive queued, not one per tick
            if !(channel.is_dead() && channel.has_unsent_data()) {
                if let Err(e) = channel.add_message(&keepalive, sender.as_bytes()) {
                    tracing::warn!("[component] [queue_failed] message=keepalive error={}", e);
                }
                if let Some(forwarder) = forwarder.as_mut() {
                    let status = [
                        LogArg::from(sender.as_str()),
                        LogArg::UInt(ticks),
                        LogArg::Int(i64::from(!channel.is_dead())),
                        LogArg::UInt(channel.packets_sent()),
                    ];
                    match forwarder.log("%s tick %llu bound=%d sent=%llu", &status) {
                        Ok(frames) => {
                            for frame in frames {
                                let queued = frame
                                    .encode()
                                    .map_err(anyhow::Error::from)
                                    .and_then(|body| Ok(channel.add_message(&log_frame, &body)?));
                                if let Err(e) = queued {
                                    tracing::warn!("[component] [queue_failed] message=logFrame error={}", e);
                                }
                            }
                        }
                        Err(e) => tracing::warn!("[component] [forward_failed] error={}", e),
                    }
                }
            }

            match nub.send(channel) {
                Ok(bytes) => tracing::trace!("[component] [tick] n={} bytes={}", ticks, bytes),
                Err(Reason::NoSuchPort) => {
                    tracing::debug!("[component] [tick_unbound] n={} watch={}", ticks, ticking.name())
                }
                Err(reason) => tracing::warn!("[component] [send_failed] reason={}", reason),
            }
        });
        watcher = Some((client, timer));
    }

    let runner = Arc::clone(&nub);
    let event_loop = tokio::spawn(async move { runner.process_until_break().await });

    tokio::signal::ctrl_c().await.context("Cannot listen for ctrl-c")?;
    tracing::info!("[component] [shutdown] name={}", name);
    nub.break_processing();
    event_loop.await.context("event loop panicked")?;

    if let Some((client, timer)) = watcher {
        nub.cancel_timer(timer);
        match Arc::try_unwrap(client) {
            Ok(client) => {
                if let Err(reason) = client.close(&*nub).await {
                    tracing::warn!("[component] [close_failed] reason={}", reason);
                }
            }
            Err(_) => tracing::warn!("[component] [close_skipped] client still shared"),
        }
    }

    nub.deregister_interface(&name, config.component_index)
        .await
        .with_context(|| format!("Cannot deregister {} from machined", name))?;
    Ok(())
}
