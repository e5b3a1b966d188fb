//! CometD endpoint. Every Bayeux message for a version goes through one POST.

use super::{ApiResponse, parse_json, respond};
use crate::facade::MockOrg;

pub async fn cometd(org: &MockOrg, body: &[u8]) -> ApiResponse {
    let result = async {
        let body = parse_json(body)?;
        Ok(ApiResponse::ok(org.bayeux().handle(body).await))
    };
    respond(result.await)
}
