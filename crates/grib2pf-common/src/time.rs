//! Time template rendering for time-indexed upstream paths.

use std::fmt::Write;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Utc};

use crate::error::{PfError, PfResult};

/// Render a strftime template (e.g. `rtma2p5_ru.%Y%m%d/rtma2p5_ru.t%H%Mz.grb2`) at `time`.
///
/// Invalid specifiers are reported instead of panicking inside `Display`.
pub fn render_time_template(template: &str, time: DateTime<Utc>) -> PfResult<String> {
    let items: Vec<Item<'_>> = StrftimeItems::new(template).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(PfError::InvalidTemplate(template.to_string()));
    }

    let mut out = String::with_capacity(template.len() + 16);
    write!(out, "{}", time.format_with_items(items.into_iter()))
        .map_err(|_| PfError::InvalidTemplate(template.to_string()))?;
    Ok(out)
}
