use std::path::Path;

use anyhow::Context;
use tracing::info;

use super::repo_types::NewIngredient;
use crate::store::IngredientRepo;

/// Parses a JSON array of `{name, measurement_unit}` objects, dropping blank
/// rows and trimming whitespace.
pub fn parse_catalog(raw: &str) -> anyhow::Result<Vec<NewIngredient>> {
    let rows: Vec<NewIngredient> =
        serde_json::from_str(raw).context("ingredient file must be a JSON array")?;
    Ok(normalize(rows))
}

/// Parses a CSV catalog with a `name,measurement_unit` header row.
pub fn parse_catalog_csv(raw: &str) -> anyhow::Result<Vec<NewIngredient>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(raw.as_bytes());
    let mut rows = Vec::new();
    for (idx, record) in reader.deserialize::<NewIngredient>().enumerate() {
        // header is line 1
        rows.push(record.with_context(|| format!("ingredient csv line {}", idx + 2))?);
    }
    Ok(normalize(rows))
}

fn normalize(rows: Vec<NewIngredient>) -> Vec<NewIngredient> {
    rows.into_iter()
        .map(|r| NewIngredient {
            name: r.name.trim().to_string(),
            measurement_unit: r.measurement_unit.trim().to_string(),
        })
        .filter(|r| !r.name.is_empty() && !r.measurement_unit.is_empty())
        .collect()
}

/// Loads the catalog file into the store; returns how many rows were new.
/// `.csv` files are read as CSV, anything else as JSON.
pub async fn load_from_path<R>(repo: &R, path: &Path) -> anyhow::Result<u64>
where
    R: IngredientRepo + ?Sized,
{
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("read {}", path.display()))?;
    let is_csv = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
    let rows = if is_csv {
        parse_catalog_csv(&raw)?
    } else {
        parse_catalog(&raw)?
    };
    let inserted = repo
        .insert_ingredients(&rows)
        .await
        .context("insert ingredients")?;
    info!(file = %path.display(), parsed = rows.len(), inserted, "ingredients loaded");
    Ok(inserted)
}
