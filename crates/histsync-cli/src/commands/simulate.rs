//! `hsync simulate`: scroll a provider through a synthetic list.

use anyhow::{ensure, Context, Result};
use comfy_table::{presets::UTF8_FULL, Cell, Color, Table};
use histsync_config::HistsyncConfig;
use histsync_core::{Hid, ListHandle, ListId, MemoryCache, ScrollPosition, SyntheticServer};
use histsync_provider::{ContentProvider, ProviderState};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::cli::{OutputFormat, SimulateArgs};

/// One settled step of the simulation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepReport {
    pub step: String,
    pub target_key: Option<Hid>,
    pub start_key: Option<Hid>,
    pub top_rows: u64,
    pub rows: usize,
    pub bottom_rows: u64,
    pub total_matches: u64,
    pub hids: Vec<Hid>,
    pub error: Option<String>,
}

impl StepReport {
    pub fn new(step: impl Into<String>, state: &ProviderState) -> Self {
        let payload = &state.payload;
        Self {
            step: step.into(),
            target_key: payload.target_key,
            start_key: payload.start_key,
            top_rows: payload.top_rows,
            rows: payload.contents.len(),
            bottom_rows: payload.bottom_rows,
            total_matches: payload.total_matches,
            hids: payload.hids(),
            error: state.last_error.clone(),
        }
    }

    fn window(&self) -> String {
        match (self.hids.first(), self.hids.last()) {
            (Some(first), Some(last)) => format!("{}..{}", first, last),
            _ => "-".to_string(),
        }
    }
}

/// Execute the simulate subcommand
pub async fn execute(config: HistsyncConfig, args: SimulateArgs, format: OutputFormat) -> Result<()> {
    let reports = run(config, args).await?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
        OutputFormat::Table => println!("{}", render_table(&reports)),
    }
    Ok(())
}

/// Run the simulation and collect one report per step.
pub async fn run(config: HistsyncConfig, args: SimulateArgs) -> Result<Vec<StepReport>> {
    let mut provider_config = config.provider;
    if let Some(page_size) = args.page_size {
        provider_config.page_size = page_size;
    }
    // Polling only matters while the list grows
    provider_config.poll.enabled = args.grow > 0;
    let poll_interval = provider_config.poll.initial_interval();

    let list = ListId::new("simulated");
    let mut server = SyntheticServer::new();
    if args.latency_ms > 0 {
        server = server.with_latency(Duration::from_millis(args.latency_ms));
    }
    let server = server.with_rows(list.clone(), args.rows);
    if let Some(every) = args.delete_every {
        ensure!(every > 0, "--delete-every must be at least 1");
        for hid in (every..=args.rows).step_by(every) {
            server.delete(&list, hid as Hid)?;
        }
    }
    let server = Arc::new(server);

    let mut handle = ListHandle::new(list.clone());
    if let Some(head) = server.head(&list) {
        handle = handle.with_head_hint(head);
    }
    let mut builder = ContentProvider::builder(handle, server.clone(), Arc::new(MemoryCache::new()))
        .with_config(provider_config)
        .with_mutations(Arc::new(server.mutations().clone()));
    if let Some(filters) = args.filter {
        builder = builder.with_filters(filters);
    }
    let provider = builder.spawn().context("Failed to start content provider")?;

    let wait = Duration::from_secs(args.timeout);
    let positions = if args.positions.is_empty() {
        vec![ScrollPosition::top()]
    } else {
        args.positions
    };

    let mut reports = Vec::with_capacity(positions.len() + 1);
    for position in positions {
        provider.set_scroll_position(position)?;
        let state = tokio::time::timeout(
            wait,
            provider.wait_until(|state| state.position == Some(position) && state.is_settled()),
        )
        .await
        .with_context(|| format!("Position {} did not settle within {:?}", position, wait))??;
        info!(%position, target = ?state.payload.target_key, "settled");
        reports.push(StepReport::new(position.to_string(), &state));
    }

    if args.grow > 0 {
        for n in 1..=args.grow {
            server.append(&list, format!("new upload {}", n));
        }
        let head = server.head(&list);
        let step = format!("grow +{}", args.grow);
        let followed = tokio::time::timeout(
            wait + poll_interval,
            provider.wait_until(|state| state.is_settled() && state.payload.start_key == head),
        )
        .await;
        match followed {
            Ok(state) => reports.push(StepReport::new(step, &state?)),
            Err(_) => {
                warn!(?head, "view did not follow the new head");
                reports.push(StepReport::new(format!("{} (not following)", step), &provider.state()));
            }
        }
    }

    provider.shutdown().await;
    Ok(reports)
}

/// Render reports as a table.
pub fn render_table(reports: &[StepReport]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(
        [
            "Step", "Target", "Start", "Top", "Rows", "Bottom", "Total", "Window", "Error",
        ]
        .into_iter()
        .map(|header| Cell::new(header).fg(Color::Cyan))
        .collect::<Vec<_>>(),
    );

    let or_dash = |value: Option<Hid>| value.map_or_else(|| "-".to_string(), |v| v.to_string());
    for report in reports {
        table.add_row(vec![
            report.step.clone(),
            or_dash(report.target_key),
            or_dash(report.start_key),
            report.top_rows.to_string(),
            report.rows.to_string(),
            report.bottom_rows.to_string(),
            report.total_matches.to_string(),
            report.window(),
            report.error.clone().unwrap_or_default(),
        ]);
    }
    table
}
