//! Command-line client for DocMind jobs.
//!
//! Drives DocMind directly with explicit credentials; the gateway is not
//! involved. Used by the `docmind` binary:
//!
//! ```bash
//! docmind structure-url https://example.com/report.pdf report.pdf \
//!     --access-key-id LTAI... --access-key-secret ...
//! docmind wait docmind-20240101-abc --interval-ms 2000 --max-wait-ms 120000
//! ```
//!
//! Credentials may also come from `ALIBABA_CLOUD_ACCESS_KEY_ID`,
//! `ALIBABA_CLOUD_ACCESS_KEY_SECRET` and `ALIBABA_CLOUD_SECURITY_TOKEN`.
//! The camelCase spellings (`--accessKeyId`, `--intervalMs`, ...) are
//! accepted as aliases.

use std::time::Duration;

use anyhow::Result;
use clap::{ArgAction, Args, Parser, Subcommand};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::credentials::CredentialSet;
use crate::poller::{PollOptions, wait_for};
use crate::providers::aliyun::{DocMindClient, RpcClient};
use crate::providers::build_http_client;

const DEFAULT_REGION: &str = "cn-hangzhou";
const DEFAULT_ENDPOINT: &str = "docmind-api.cn-hangzhou.aliyuncs.com";

#[derive(Parser)]
#[command(
    name = "docmind",
    version,
    about = "Submit Alibaba Cloud DocMind jobs and wait for their results",
    long_about = None
)]
pub struct Cli {
    #[arg(short = 'v', long, global = true, action = ArgAction::Count, help = "Increase verbosity (-v info, -vv debug)")]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[command(about = "Submit a structure job for a document reachable by URL")]
    StructureUrl(StructureUrlCommand),
    #[command(about = "Poll a structure job until it completes and print the result")]
    Wait(WaitCommand),
}

#[derive(Args)]
pub struct StructureUrlCommand {
    #[arg(help = "Publicly reachable document URL")]
    pub url: String,

    #[arg(help = "File name including its extension")]
    pub name: String,

    #[command(flatten)]
    pub credentials: CredentialArgs,
}

#[derive(Args)]
pub struct WaitCommand {
    #[arg(help = "Job id returned by structure-url")]
    pub id: String,

    #[arg(long, alias = "intervalMs", default_value_t = 2000, help = "Poll interval in milliseconds")]
    pub interval_ms: u64,

    #[arg(long, alias = "maxWaitMs", default_value_t = 120_000, help = "Give up after this many milliseconds")]
    pub max_wait_ms: u64,

    #[command(flatten)]
    pub credentials: CredentialArgs,
}

#[derive(Args)]
pub struct CredentialArgs {
    #[arg(long, alias = "accessKeyId", env = "ALIBABA_CLOUD_ACCESS_KEY_ID")]
    pub access_key_id: String,

    #[arg(
        long,
        alias = "accessKeySecret",
        env = "ALIBABA_CLOUD_ACCESS_KEY_SECRET",
        hide_env_values = true
    )]
    pub access_key_secret: String,

    #[arg(
        long,
        alias = "securityToken",
        env = "ALIBABA_CLOUD_SECURITY_TOKEN",
        hide_env_values = true,
        help = "STS security token, for temporary credentials"
    )]
    pub security_token: Option<String>,

    #[arg(long, alias = "regionId", default_value = DEFAULT_REGION)]
    pub region_id: String,

    #[arg(long, default_value = DEFAULT_ENDPOINT, help = "DocMind endpoint host or URL")]
    pub endpoint: String,

    #[arg(long, default_value_t = 30, help = "Per-request timeout in seconds")]
    pub timeout_secs: u64,
}

impl CredentialArgs {
    fn credential_set(&self) -> CredentialSet {
        let credentials = CredentialSet::aliyun(&self.access_key_id, &self.access_key_secret)
            .with_region(&self.region_id)
            .with_endpoint(&self.endpoint);
        match &self.security_token {
            Some(token) => credentials.with_session_token(token),
            None => credentials,
        }
    }

    fn client(&self) -> Result<DocMindClient> {
        let http = build_http_client(Duration::from_secs(self.timeout_secs))?;
        Ok(DocMindClient::new(RpcClient::new(http), &self.endpoint))
    }
}

impl Command {
    /// Run the command and return the provider's JSON.
    ///
    /// `cancel` stops a `wait` early with `Cancelled`.
    pub async fn execute(self, cancel: &CancellationToken) -> Result<Value> {
        match self {
            Command::StructureUrl(cmd) => {
                let client = cmd.credentials.client()?;
                let credentials = cmd.credentials.credential_set();
                let body = client
                    .submit_structure_job(&credentials, &cmd.url, &cmd.name)
                    .await?;
                info!(file_name = %cmd.name, "Structure job submitted");
                Ok(body)
            }
            Command::Wait(cmd) => {
                let client = cmd.credentials.client()?;
                let credentials = cmd.credentials.credential_set();
                let options = PollOptions::default()
                    .with_overrides(Some(cmd.interval_ms), Some(cmd.max_wait_ms));
                let status = wait_for(
                    &cmd.id,
                    || client.structure_status(&credentials, &cmd.id),
                    options,
                    cancel,
                )
                .await?;
                Ok(status.body)
            }
        }
    }
}
