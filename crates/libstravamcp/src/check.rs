use crate::{Result, ctx::Ctx};

/// Query the athlete profile to prove the whole token chain works.
pub async fn check_command(ctx: &Ctx, show_profile: bool) -> Result<()> {
    let mut client = ctx.client()?;
    let profile = client.athlete_profile().await?;

    ctx.output.success("Successfully queried Strava API!")?;
    let field = |name: &str| {
        profile
            .get(name)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    };
    ctx.output.text(format!(
        "Athlete: {} {}",
        field("firstname"),
        field("lastname")
    ))?;
    if let Some(id) = profile.get("id") {
        ctx.output.text(format!("ID: {id}"))?;
    }

    if show_profile {
        ctx.output.text("")?;
        ctx.output.json(&profile)?;
    }

    Ok(())
}
