//! DocMind (document mind) job API, version 2022-07-11.
//!
//! Jobs are opaque: the gateway submits them, reports their status and hands
//! back the provider's JSON untouched. Structure jobs signal completion with a
//! `Completed` flag, parser jobs with `Data.Status`.

use serde_json::Value;
use tracing::instrument;

use super::rpc::{RpcClient, RpcRequest};
use crate::credentials::{CredentialSet, Provider};
use crate::error::{AppError, AppResult};
use crate::poller::JobStatus;

pub const DOCMIND_VERSION: &str = "2022-07-11";

const DEFAULT_ERROR_CODE: &str = "AliyunError";

/// Optional knobs for `SubmitDocParserJob`.
#[derive(Debug, Clone, Default)]
pub struct ParserJobOptions {
    pub formula_enhancement: Option<bool>,
    pub llm_enhancement: Option<bool>,
    pub option: Option<String>,
    pub oss_bucket: Option<String>,
    pub oss_endpoint: Option<String>,
    pub page_index: Option<String>,
    pub output_html_table: Option<bool>,
    pub vl_parse_prompt: Option<String>,
}

impl ParserJobOptions {
    fn apply(&self, request: RpcRequest) -> RpcRequest {
        request
            .param_opt("FormulaEnhancement", self.formula_enhancement.map(|b| b.to_string()))
            .param_opt("LlmEnhancement", self.llm_enhancement.map(|b| b.to_string()))
            .param_opt("Option", self.option.clone())
            .param_opt("OssBucket", self.oss_bucket.clone())
            .param_opt("OssEndpoint", self.oss_endpoint.clone())
            .param_opt("PageIndex", self.page_index.clone())
            .param_opt("OutputHtmlTable", self.output_html_table.map(|b| b.to_string()))
            .param_opt("VlParsePrompt", self.vl_parse_prompt.clone())
    }
}

#[derive(Clone)]
pub struct DocMindClient {
    rpc: RpcClient,
    default_endpoint: String,
}

impl DocMindClient {
    pub fn new(rpc: RpcClient, default_endpoint: impl Into<String>) -> Self {
        Self {
            rpc,
            default_endpoint: default_endpoint.into(),
        }
    }

    async fn call(&self, credentials: &CredentialSet, request: RpcRequest) -> AppResult<Value> {
        if credentials.provider != Provider::Aliyun {
            return Err(AppError::BadRequest(
                "Token does not carry Alibaba Cloud credentials".to_string(),
            ));
        }
        let endpoint = credentials.endpoint_or(&self.default_endpoint);
        self.rpc
            .call(endpoint, &request, credentials, DEFAULT_ERROR_CODE)
            .await
    }

    #[instrument(skip(self, credentials))]
    pub async fn submit_structure_job(
        &self,
        credentials: &CredentialSet,
        file_url: &str,
        file_name: &str,
    ) -> AppResult<Value> {
        let request = RpcRequest::new("SubmitDocStructureJob", DOCMIND_VERSION)
            .param("FileUrl", file_url)
            .param("FileName", file_name);
        self.call(credentials, request).await
    }

    #[instrument(skip(self, credentials))]
    pub async fn structure_result(&self, credentials: &CredentialSet, id: &str) -> AppResult<Value> {
        let request = RpcRequest::new("GetDocStructureResult", DOCMIND_VERSION).param("Id", id);
        self.call(credentials, request).await
    }

    #[instrument(skip(self, credentials, options))]
    pub async fn submit_parser_job(
        &self,
        credentials: &CredentialSet,
        file_url: &str,
        file_name: &str,
        options: &ParserJobOptions,
    ) -> AppResult<Value> {
        let request = options.apply(
            RpcRequest::new("SubmitDocParserJob", DOCMIND_VERSION)
                .param("FileUrl", file_url)
                .param("FileName", file_name),
        );
        self.call(credentials, request).await
    }

    /// Structure job state, as the poller sees it.
    pub async fn structure_status(
        &self,
        credentials: &CredentialSet,
        id: &str,
    ) -> AppResult<JobStatus> {
        let body = self.structure_result(credentials, id).await?;
        Ok(JobStatus::from_provider_body(id, body))
    }

    #[instrument(skip(self, credentials))]
    pub async fn parser_status(&self, credentials: &CredentialSet, id: &str) -> AppResult<JobStatus> {
        let request = RpcRequest::new("QueryDocParserStatus", DOCMIND_VERSION).param("Id", id);
        let body = self.call(credentials, request).await?;
        Ok(JobStatus::from_status_body(id, body))
    }

    #[instrument(skip(self, credentials))]
    pub async fn parser_result(
        &self,
        credentials: &CredentialSet,
        id: &str,
        layout_step_size: Option<u32>,
        layout_num: Option<u32>,
    ) -> AppResult<Value> {
        let request = RpcRequest::new("GetDocParserResult", DOCMIND_VERSION)
            .param("Id", id)
            .param_opt("LayoutStepSize", layout_step_size.map(|n| n.to_string()))
            .param_opt("LayoutNum", layout_num.map(|n| n.to_string()));
        self.call(credentials, request).await
    }
}
