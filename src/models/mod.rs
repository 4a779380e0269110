mod api;

pub use api::{
    ApiResponse, AssumeRoleBody, AssumeRoleResponse, DelegatedCredentials, HealthResponse,
    IssueTokenRequest, JobIdRequest, JobKind, ParserResultRequest, SignedRequest,
    SubmitParserRequest, SubmitUrlRequest, TencentCallRequest, TencentResultRequest,
    TencentSignRequest, WaitRequest,
};
