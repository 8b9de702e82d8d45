use crate::dispatch::Session;
use executor_core::Config;
use std::collections::BTreeMap;

pub async fn run(config: &Config, refresh: bool, json: bool) -> anyhow::Result<()> {
    let session = Session::start(config).await?;
    if refresh {
        let installed = session.manager.force_refresh().await;
        tracing::info!("refreshed cluster executors, installed: {}", installed);
    }
    let listing = session.manager.list_executors();
    session.close().await;

    if json {
        let listing: BTreeMap<String, Vec<String>> = listing
            .into_iter()
            .map(|(kind, names)| {
                (
                    kind.to_string(),
                    names.into_iter().map(|n| n.to_string()).collect(),
                )
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    if listing.is_empty() {
        println!("No executors.");
        return Ok(());
    }

    println!("{:<12} NAME", "KIND");
    for (kind, names) in &listing {
        for name in names {
            println!("{:<12} {}", kind.to_string(), name);
        }
    }
    Ok(())
}
