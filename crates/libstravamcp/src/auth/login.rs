use crate::{
    Result,
    authflow::AuthorizationFlow,
    auth::describe_expiry,
    credentials::{TokenState, now_epoch},
    ctx::Ctx,
};

pub async fn login_command(ctx: &Ctx) -> Result<()> {
    ctx.output.heading("Authorizing with Strava")?;

    let storage = ctx.storage();
    ctx.output
        .text(format!("Credential file: {}", storage.path().display()))?;

    // Fail before touching the network if the client pair is missing
    storage.load()?.client_credentials()?;

    ctx.output.text("")?;
    ctx.output.text(format!(
        "Local callback listener: {} (redirect URI {})",
        ctx.config.callback_addr,
        ctx.config.redirect_url.as_str()
    ))?;
    ctx.output
        .warn("The redirect host must be registered as the callback domain of your Strava application!")?;
    ctx.output.text(format!(
        "Waiting up to {}s for the browser to come back. Press Ctrl+C to cancel.",
        ctx.config.callback_timeout.as_secs()
    ))?;
    ctx.output.text("")?;

    let flow = AuthorizationFlow::new(ctx.config.clone(), ctx.config.http_client()?);
    tokio::select! {
        result = flow.run(&storage) => result?,
        _ = tokio::signal::ctrl_c() => {
            ctx.output.text("")?;
            ctx.output.warn("Cancelled.")?;
            return Ok(());
        }
    }

    let credentials = storage.load()?;
    let now = now_epoch();
    match credentials.token_state(now) {
        TokenState::NoToken => {
            ctx.output
                .error("Authorization did not produce an access token. See the log above.")?;
        }
        _ => {
            ctx.output.success("Authorization successful!")?;
            ctx.output.text(format!("  {}", describe_expiry(&credentials, now)))?;
        }
    }

    Ok(())
}
