use crate::{
    Result,
    auth::describe_expiry,
    credentials::{TokenState, now_epoch},
    ctx::Ctx,
    storage::CredentialKey,
};

pub async fn status_command(ctx: &Ctx) -> Result<()> {
    let storage = ctx.storage();
    let credentials = storage.load()?;

    ctx.output.heading("Strava credentials")?;
    ctx.output.text("")?;
    ctx.output
        .text(format!("File: {}", storage.path().display()))?;
    if !storage.path().exists() {
        ctx.output.warn("The credential file does not exist yet.")?;
        ctx.output.text(format!(
            "Create it with {} and {} from your Strava API application settings.",
            CredentialKey::ClientId.as_str(),
            CredentialKey::ClientSecret.as_str()
        ))?;
        return Ok(());
    }
    ctx.output.text("")?;

    let present = [
        credentials.client_id.is_some(),
        credentials.client_secret.is_some(),
        credentials.access_token.is_some(),
        credentials.refresh_token.is_some(),
        credentials.expires_at.is_some(),
    ];
    let width = CredentialKey::ALL
        .iter()
        .map(|key| key.as_str().len())
        .max()
        .unwrap_or(0);
    for (key, present) in CredentialKey::ALL.iter().zip(present) {
        let state = if present { "set" } else { "missing" };
        ctx.output
            .text(format!("  {:<width$}  {state}", key.as_str()))?;
    }
    ctx.output.text("")?;

    let now = now_epoch();
    match credentials.token_state(now) {
        TokenState::Valid => ctx.output.success(describe_expiry(&credentials, now))?,
        TokenState::Expired => ctx
            .output
            .warn("Token is expired or about to expire; it will be refreshed on the next call.")?,
        TokenState::NoToken => ctx
            .output
            .warn("No access token. Run 'stravamcp auth login' to authorize.")?,
    }

    Ok(())
}
