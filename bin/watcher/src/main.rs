// Copyright 2025 RISC Zero, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Follow the chain and print matching transactions as JSON lines.

use anyhow::Context;
use clap::Parser;
use log::info;
use roundwatch::{
    AlgorandSubscriber, FileWatermark, SubscriberConfig, SubscriberFilter, SyncBehaviour,
};
use roundwatch_client::{new_algod, new_indexer};
use roundwatch_core::filter::TransactionFilter;
use roundwatch_core::transaction::TxnType;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "roundwatch")]
#[command(bin_name = "roundwatch")]
#[command(author, version, about = "Subscribe to Algorand transactions", long_about = None)]
struct Args {
    /// URL of the algod node
    #[arg(short = 'u', long, default_value = "http://localhost:4001")]
    algod_url: String,

    /// API token for the algod node
    #[arg(long, env = "ALGOD_TOKEN")]
    algod_token: Option<String>,

    /// URL of the indexer; required for catchup-with-indexer
    #[arg(short = 'i', long)]
    indexer_url: Option<String>,

    /// API token for the indexer
    #[arg(long, env = "INDEXER_TOKEN")]
    indexer_token: Option<String>,

    /// Filter to transactions sent from this address
    #[arg(short = 's', long)]
    sender: Option<String>,

    /// Filter to transactions received by this address
    #[arg(short = 'r', long)]
    receiver: Option<String>,

    /// Filter to a transaction type (pay, axfer, appl, ...)
    #[arg(short = 't', long)]
    txn_type: Option<String>,

    /// Filter to transactions against this app id
    #[arg(long)]
    app_id: Option<u64>,

    /// Filter to transactions against this asset id
    #[arg(long)]
    asset_id: Option<u64>,

    /// Filter to transactions moving at least this amount
    #[arg(long)]
    min_amount: Option<u64>,

    /// Filter to transactions whose note starts with this prefix
    #[arg(long)]
    note_prefix: Option<String>,

    /// What to do when the chain is further ahead than one poll can cover
    #[arg(long, default_value = "sync-oldest-start-now")]
    sync_behaviour: String,

    /// Maximum rounds to sync from algod per poll
    #[arg(long, default_value_t = 500)]
    max_rounds: u64,

    /// Maximum rounds to bridge via indexer per poll
    #[arg(long)]
    max_indexer_rounds: Option<u64>,

    /// File holding the watermark
    #[arg(short = 'w', long, default_value = "roundwatch.watermark")]
    watermark_file: PathBuf,

    /// Seconds to sleep between polls
    #[arg(short = 'f', long, default_value_t = 1)]
    frequency: u64,

    /// Long-poll the node for the next block once the tip is reached
    #[arg(long, default_value_t = false)]
    wait_for_block: bool,

    /// Poll once and exit instead of following the chain
    #[arg(long, default_value_t = false)]
    once: bool,
}

impl Args {
    fn filter(&self) -> anyhow::Result<TransactionFilter> {
        let txn_type = match &self.txn_type {
            Some(name) => Some(
                TxnType::from_str(name)
                    .with_context(|| format!("invalid transaction type '{name}'"))?
                    .into(),
            ),
            None => None,
        };
        Ok(TransactionFilter {
            txn_type,
            sender: self.sender.clone().map(Into::into),
            receiver: self.receiver.clone().map(Into::into),
            note_prefix: self.note_prefix.clone(),
            app_id: self.app_id.map(Into::into),
            asset_id: self.asset_id.map(Into::into),
            min_amount: self.min_amount,
            ..Default::default()
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let sync_behaviour = SyncBehaviour::from_str(&args.sync_behaviour)
        .map_err(|reason| anyhow::anyhow!(reason))?;

    let algod = new_algod(&args.algod_url, args.algod_token.clone())?;
    let indexer = match &args.indexer_url {
        Some(url) => Some(new_indexer(url, args.indexer_token.clone())?),
        None => None,
    };

    let config = SubscriberConfig {
        filters: vec![SubscriberFilter::new("watch", args.filter()?)],
        sync_behaviour,
        max_rounds_to_sync: args.max_rounds,
        max_indexer_rounds_to_sync: args.max_indexer_rounds,
        frequency: Duration::from_secs(args.frequency),
        wait_for_block_when_at_tip: args.wait_for_block,
        watermark: Arc::new(FileWatermark::new(args.watermark_file.clone())),
        ..Default::default()
    };

    let subscriber = Arc::new(AlgorandSubscriber::new(config, algod, indexer)?);

    subscriber.on("watch", |txn, _| {
        println!("{}", serde_json::to_string(txn)?);
        Ok(())
    })?;

    if args.once {
        let result = subscriber.poll_once().await?;
        info!(
            "synced rounds {}-{}: {} matching transactions",
            result.synced_round_range.0,
            result.synced_round_range.1,
            result.subscribed_transactions.len()
        );
        return Ok(());
    }

    let handle = subscriber.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.stop("interrupted");
        }
    });

    subscriber.start(None).await?;
    Ok(())
}
