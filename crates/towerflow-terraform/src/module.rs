//! Terraform module inspection

use crate::error::{Result, TerraformError};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

static VARIABLE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?m)^\s*variable\s+"([^"]+)"\s*\{"#).unwrap());

static DEFAULT_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*default\s*=").unwrap());

/// Names of variables declared without a default in `source`
pub fn required_variables(source: &str) -> Vec<String> {
    VARIABLE_BLOCK
        .captures_iter(source)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let name = caps.get(1)?.as_str();
            let body = block_body(&source[whole.end()..]);
            (!DEFAULT_ATTR.is_match(body)).then(|| name.to_string())
        })
        .collect()
}

/// Text up to the brace closing a block whose opening brace was just
/// consumed
fn block_body(rest: &str) -> &str {
    let mut depth = 1usize;
    for (i, c) in rest.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return &rest[..i];
                }
            }
            _ => {}
        }
    }
    rest
}

/// Required variables across every `*.tf` file of a module directory
pub async fn module_required_variables(dir: &Path) -> Result<Vec<String>> {
    if !dir.is_dir() {
        return Err(TerraformError::ModuleNotFound(dir.display().to_string()));
    }

    let mut required = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "tf") {
            let source = tokio::fs::read_to_string(&path).await?;
            required.extend(required_variables(&source));
        }
    }
    required.sort();
    required.dedup();
    Ok(required)
}
