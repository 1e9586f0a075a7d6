//! One-shot record commands: list, get, create, update, delete.

use serde_json::Value;

use sailor_core::{CoreError, Entity, Filter, ResourcePath, check_response};

use crate::cli::{CreateArgs, ListArgs, RecordArgs, UpdateArgs};
use crate::error::CliError;
use crate::output;

use super::{Context, util};

pub async fn list(ctx: &Context<'_>, args: ListArgs) -> Result<(), CliError> {
    let filter = util::build_filter(&args.filter.conditions);
    let collection = ctx.sailor.registry().get(&args.model, None, None, &filter)?;
    let records = collection.loaded().await?;

    let values: Vec<Value> = records.iter().map(Entity::to_value).collect();
    let out = output::render_records(ctx.format, &values);
    output::print_output(&out, ctx.global.quiet);
    Ok(())
}

pub async fn get(ctx: &Context<'_>, args: RecordArgs) -> Result<(), CliError> {
    let entity = fetch(ctx, &args.model, &args.id).await?;
    let out = output::render_record(ctx.format, &entity.to_value());
    output::print_output(&out, ctx.global.quiet);
    Ok(())
}

/// Creates go straight to the transport: a one-shot command has no use
/// for loading the model's collection first.
pub async fn create(ctx: &Context<'_>, args: CreateArgs) -> Result<(), CliError> {
    let data = util::read_object(&args.data)?;
    let path = ResourcePath::new(&args.model);
    let response = ctx
        .sailor
        .registry()
        .transport()
        .put(&path.create(), &data)
        .await
        .map_err(CoreError::from)?;
    let record = check_response(response)?;

    let out = output::render_record(ctx.format, &record);
    output::print_output(&out, ctx.global.quiet);
    Ok(())
}

pub async fn update(ctx: &Context<'_>, args: UpdateArgs) -> Result<(), CliError> {
    let data = util::read_object(&args.data)?;
    let entity = fetch(ctx, &args.model, &args.id).await?;
    entity.update(data, true).await?;

    let out = output::render_record(ctx.format, &entity.to_value());
    output::print_output(&out, ctx.global.quiet);
    Ok(())
}

pub async fn delete(ctx: &Context<'_>, args: RecordArgs) -> Result<(), CliError> {
    let prompt = format!("Delete {} '{}'?", args.model, args.id);
    if !util::confirm(&prompt, "delete", ctx.global.yes)? {
        return Ok(());
    }

    let entity = fetch(ctx, &args.model, &args.id).await?;
    entity.destroy().await?;
    if !ctx.global.quiet {
        eprintln!("✓ Deleted {} '{}'", args.model, args.id);
    }
    Ok(())
}

/// Load the record with identifier `id` through an id-filtered collection.
async fn fetch(ctx: &Context<'_>, model: &str, id: &str) -> Result<Entity, CliError> {
    let wanted = util::record_id(id);
    let filter = Filter::new().with("id", wanted.to_json());
    let collection = ctx.sailor.registry().get(model, None, None, &filter)?;
    collection.loaded().await?;

    collection.by_id(&wanted).ok_or_else(|| CliError::NotFound {
        model: model.into(),
        id: id.into(),
    })
}
