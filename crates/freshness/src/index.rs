//! GRIB2 inventory (`.idx`) parsing.
//!
//! Inventory lines are colon-delimited:
//!
//! ```text
//! 1:0:d=2025010112:REFC:entire atmosphere:anl:
//! 2:405627:d=2025010112:RETOP:cloud top:anl:
//! ```
//!
//! Field 1 is the byte offset of the message, field 3 the variable and
//! field 4 the level. A wanted product is matched either by variable
//! (`REFC`) or by `VARIABLE:LEVEL` (`REFC:entire atmosphere`).

use std::collections::{BTreeMap, HashMap};

use tracing::warn;

use grib2pf_common::{PfError, PfResult};

const OFFSET_FIELD: usize = 1;
const VARIABLE_FIELD: usize = 3;
const LEVEL_FIELD: usize = 4;

/// Product identifier → byte offset, rebuilt every poll cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexOffsetMap {
    offsets: HashMap<String, u64>,
}

impl IndexOffsetMap {
    /// Parse inventory text, keeping only the `wanted` products.
    ///
    /// The first line matching a product wins. An unparseable offset on a
    /// wanted product's line is an error; other malformed lines are skipped.
    pub fn parse(text: &str, wanted: &[String], source: &str) -> PfResult<Self> {
        let mut offsets = HashMap::new();

        for (i, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let fields: Vec<&str> = line.split(':').collect();
            let Some(variable) = fields.get(VARIABLE_FIELD) else {
                continue;
            };

            let qualified = fields
                .get(LEVEL_FIELD)
                .map(|level| format!("{}:{}", variable, level));

            let product = match qualified {
                Some(q) if wanted.contains(&q) => q,
                _ if wanted.iter().any(|w| w == variable) => variable.to_string(),
                _ => continue,
            };

            if offsets.contains_key(&product) {
                continue;
            }

            let offset: u64 = fields
                .get(OFFSET_FIELD)
                .and_then(|f| f.trim().parse().ok())
                .ok_or_else(|| PfError::IndexParse {
                    url: source.to_string(),
                    line: i + 1,
                    content: line.to_string(),
                })?;

            offsets.insert(product, offset);
        }

        Ok(Self { offsets })
    }

    pub fn get(&self, product: &str) -> Option<u64> {
        self.offsets.get(product).copied()
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Offsets for every wanted product; missing ones fall back to 0.
    pub fn resolve(&self, wanted: &[String]) -> BTreeMap<String, u64> {
        wanted
            .iter()
            .map(|product| {
                let offset = self.get(product).unwrap_or_else(|| {
                    warn!(product = %product, "Product missing from index, using offset 0");
                    0
                });
                (product.clone(), offset)
            })
            .collect()
    }
}
