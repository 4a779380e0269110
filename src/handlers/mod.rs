mod auth;
mod docmind;
mod health;
mod tencent;

pub use auth::{assume_role, issue_token};
pub use docmind::{
    parser_result, parser_status, structure_result, submit_parser_url, submit_url, wait_job,
    wait_structure,
};
pub use health::health_check;
pub use tencent::{
    call as tencent_call, parser_result as tencent_parser_result,
    parser_submit as tencent_parser_submit, sign as tencent_sign,
};
