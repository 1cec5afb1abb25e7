//! Client Credentials Flow

use std::collections::BTreeSet;

use super::{FlowContext, token_request};
use crate::error::Result;
use crate::types::{TokenSet, join_scopes};

pub(super) async fn acquire(ctx: &FlowContext<'_>, scopes: &BTreeSet<String>) -> Result<TokenSet> {
    ctx.identity.require_secret()?;

    let mut fields = vec![("grant_type".to_string(), "client_credentials".to_string())];
    if !scopes.is_empty() {
        fields.push(("scope".to_string(), join_scopes(scopes)));
    }

    let token = token_request(ctx, fields, scopes).await?;
    tracing::debug!(provider = %ctx.provider.name, "client credentials token issued");
    Ok(token)
}
