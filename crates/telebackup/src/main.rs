use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::info;

use telebackup_core::{
    config::Config,
    copier::Copier,
    messaging::throttled::ThrottledClient,
    shutdown::{watch_interrupts, Interrupts, FORCED_EXIT_CODE},
    store::{FileIdStore, IdStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telebackup_core::logging::init("telebackup")?;

    // Nothing touches the network until the config is valid.
    let cfg = Config::load()?;
    cfg.ensure_dir()
        .with_context(|| format!("creating {}", cfg.config_dir.display()))?;

    let sent = FileIdStore::load(&cfg.sent_ids_path)
        .with_context(|| format!("loading {}", cfg.sent_ids_path.display()))?;
    info!(
        "{} ids already sent ({})",
        sent.len(),
        cfg.sent_ids_path.display()
    );

    let client = telebackup_mtproto::auth::connect(&cfg).await?;
    let client = ThrottledClient::new(client, cfg.send_interval);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if watch_interrupts(tokio::signal::ctrl_c, on_signal).await == Interrupts::Forced {
            std::process::exit(FORCED_EXIT_CODE);
        }
    });

    let mut copier = Copier::new(client, sent)
        .with_retry_policy(cfg.retry_policy())
        .with_cancellation(cancel);
    if let Some(path) = &cfg.failed_ids_path {
        let failed = FileIdStore::load(path)
            .with_context(|| format!("loading {}", path.display()))?;
        info!("{} ids previously failed ({})", failed.len(), path.display());
        copier = copier.with_failed_store(failed);
    }

    let report = copier
        .run(&cfg.source_channels, &cfg.destination_channel)
        .await?;
    info!("done: {report}");

    copier.client().inner().save_session()?;
    Ok(())
}
