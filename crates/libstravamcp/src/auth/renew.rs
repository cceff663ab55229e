use crate::{Result, auth::describe_expiry, credentials::now_epoch, ctx::Ctx};

pub async fn renew_command(ctx: &Ctx) -> Result<()> {
    ctx.output.heading("Renewing Strava access token")?;

    let mut client = ctx.client()?;

    ctx.output.text("Current token status:")?;
    ctx.output.text(format!(
        "  {}",
        describe_expiry(client.credentials(), now_epoch())
    ))?;

    ctx.output.text("")?;
    ctx.output.text("Refreshing token...")?;
    client.refresh().await?;
    ctx.output.success("Token refreshed successfully!")?;

    ctx.output.text("")?;
    ctx.output.text("New token status:")?;
    ctx.output.text(format!(
        "  {}",
        describe_expiry(client.credentials(), now_epoch())
    ))?;

    Ok(())
}
