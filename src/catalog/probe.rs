//! Reachability probe
//!
//! Refreshes `website_status_code` for every outlet of a catalog document with
//! a HEAD request (redirects followed). The document is edited in place as a
//! `serde_json::Value`, so fields the catalog model does not know survive.

use super::Catalog;
use crate::discovery::PageFetcher;
use crate::models::REACHABLE_STATUS;
use crate::utils::error::CatalogError;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Status counts of one probe run; `None` is a transport failure
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeSummary {
    pub statuses: BTreeMap<Option<u16>, usize>,
}

impl ProbeSummary {
    pub fn total(&self) -> usize {
        self.statuses.values().sum()
    }

    pub fn reachable(&self) -> usize {
        self.statuses
            .iter()
            .filter(|(status, _)| status.is_some_and(|code| REACHABLE_STATUS.contains(&code)))
            .map(|(_, count)| count)
            .sum()
    }
}

/// Position of one outlet entry inside the document
struct Slot {
    region: String,
    category: String,
    index: usize,
    website: String,
}

fn collect_slots(document: &Value) -> Result<Vec<Slot>, CatalogError> {
    // Shape check shared with the loader
    Catalog::from_value(document)?;

    let mut slots = Vec::new();
    let Some(regions) = document.as_object() else {
        return Ok(slots);
    };
    for (region, categories) in regions {
        let Some(categories) = categories.as_object() else {
            continue;
        };
        for (category, outlets) in categories {
            let Some(outlets) = outlets.as_array() else {
                continue;
            };
            for (index, outlet) in outlets.iter().enumerate() {
                if let Some(website) = outlet.get("website").and_then(Value::as_str) {
                    slots.push(Slot {
                        region: region.clone(),
                        category: category.clone(),
                        index,
                        website: website.to_string(),
                    });
                }
            }
        }
    }
    Ok(slots)
}

/// Probe every outlet website and write the observed status into `document`
///
/// # Errors
///
/// `CatalogError::Shape` if the document is not a catalog.
pub async fn probe_document(
    fetcher: &PageFetcher,
    document: &mut Value,
    concurrency: usize,
    timeout: Duration,
) -> Result<ProbeSummary, CatalogError> {
    let slots = collect_slots(document)?;
    info!(outlets = slots.len(), concurrency, "Probing outlet websites");

    let results: Vec<(Slot, Option<u16>)> = stream::iter(slots)
        .map(|slot| async move {
            let status = fetcher.probe_status(&slot.website, timeout).await;
            (slot, status)
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let mut summary = ProbeSummary::default();
    for (slot, status) in results {
        *summary.statuses.entry(status).or_default() += 1;

        let entry = document
            .get_mut(&slot.region)
            .and_then(|categories| categories.get_mut(&slot.category))
            .and_then(|outlets| outlets.get_mut(slot.index))
            .and_then(Value::as_object_mut);
        match entry {
            Some(entry) => {
                entry.insert(
                    "website_status_code".to_string(),
                    status.map_or(Value::Null, Value::from),
                );
            }
            None => warn!(website = %slot.website, "Outlet entry vanished while probing"),
        }
    }

    for (status, count) in &summary.statuses {
        match status {
            Some(code) => info!(status = code, count, "Probe status"),
            None => info!(status = "unreachable", count, "Probe status"),
        }
    }
    info!(
        total = summary.total(),
        reachable = summary.reachable(),
        "Probe finished"
    );
    Ok(summary)
}

/// Probe the catalog at `input` and write the refreshed copy to `output`
///
/// # Errors
///
/// I/O, JSON and shape errors on either file.
pub async fn probe_file(
    fetcher: &PageFetcher,
    input: &Path,
    output: &Path,
    concurrency: usize,
    timeout: Duration,
) -> Result<ProbeSummary, CatalogError> {
    let content = tokio::fs::read_to_string(input)
        .await
        .map_err(|source| CatalogError::Io {
            path: input.to_path_buf(),
            source,
        })?;
    let mut document: Value = serde_json::from_str(&content)?;

    let summary = probe_document(fetcher, &mut document, concurrency, timeout).await?;

    let rendered = serde_json::to_string_pretty(&document)?;
    tokio::fs::write(output, rendered)
        .await
        .map_err(|source| CatalogError::Io {
            path: output.to_path_buf(),
            source,
        })?;
    info!(output = %output.display(), "Catalog written");
    Ok(summary)
}
